//! # Placeholder expansion.
//!
//! Descriptor values may reference environment variables as `%NAME%` or
//! `${NAME}`. Expansion is a pure function of the value and an explicit
//! variable map; the process environment is never read or written here.
//! Unknown names are left verbatim.

use std::collections::BTreeMap;

/// Expands `%NAME%` and `${NAME}` placeholders in `value` using `vars`.
///
/// # Example
/// ```
/// use std::collections::BTreeMap;
/// use servicevisor::expand_placeholders;
///
/// let mut vars = BTreeMap::new();
/// vars.insert("BASE".to_string(), "/srv/app".to_string());
///
/// assert_eq!(expand_placeholders("%BASE%/logs", &vars), "/srv/app/logs");
/// assert_eq!(expand_placeholders("${BASE}/bin", &vars), "/srv/app/bin");
/// assert_eq!(expand_placeholders("%MISSING%", &vars), "%MISSING%");
/// ```
pub fn expand_placeholders(value: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find(['%', '$']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        let (name, consumed) = if let Some(after) = tail.strip_prefix('%') {
            match after.find('%') {
                Some(end) => (&after[..end], end + 2),
                None => ("", 0),
            }
        } else if let Some(after) = tail.strip_prefix("${") {
            match after.find('}') {
                Some(end) => (&after[..end], end + 3),
                None => ("", 0),
            }
        } else {
            ("", 0)
        };

        match vars.get(name).filter(|_| is_name(name)) {
            Some(v) => {
                out.push_str(v);
                rest = &tail[consumed..];
            }
            None => {
                // Not a placeholder we can resolve: keep the marker character and move on.
                out.push_str(&tail[..1]);
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn is_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '(' || c == ')')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_expands_both_syntaxes() {
        let v = vars(&[("SERVICE_ID", "demo"), ("BASE", "/opt/demo")]);
        assert_eq!(
            expand_placeholders("%BASE%/%SERVICE_ID%.log", &v),
            "/opt/demo/demo.log"
        );
        assert_eq!(expand_placeholders("${BASE}:${SERVICE_ID}", &v), "/opt/demo:demo");
    }

    #[test]
    fn test_unknown_and_unterminated_are_verbatim() {
        let v = vars(&[("A", "1")]);
        assert_eq!(expand_placeholders("100% done", &v), "100% done");
        assert_eq!(expand_placeholders("%NOPE% %A%", &v), "%NOPE% 1");
        assert_eq!(expand_placeholders("${A", &v), "${A");
        assert_eq!(expand_placeholders("$A", &v), "$A");
        assert_eq!(expand_placeholders("%%", &v), "%%");
    }

    #[test]
    fn test_no_recursive_expansion() {
        let v = vars(&[("A", "%B%"), ("B", "x")]);
        assert_eq!(expand_placeholders("%A%", &v), "%B%");
    }
}
