//! Log file naming and date patterns.
//!
//! ```text
//! live (plain / size)   <dir>/<base><pattern>                 svc.out.log
//! size generation n     <dir>/<base>.<n><pattern>             svc.3.out.log
//! live (dated)          <dir>/<base>.<date><pattern>          svc.20240131.out.log
//! dated generation n    <dir>/<base>.<date>.<n><pattern>      svc.20240131.2.out.log
//! archive               <dir>/<base>.<zipdate><pattern>.zip   svc.202401.out.log.zip
//! ```

use std::path::{Path, PathBuf};

use chrono::format::{Item, Parsed, StrftimeItems};

use crate::error::FormatError;

/// Path builder for one stream: directory, base name and suffix pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LogPaths {
    dir: PathBuf,
    base: String,
    pattern: String,
}

impl LogPaths {
    pub(crate) fn new(dir: impl Into<PathBuf>, base: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base: base.into(),
            pattern: pattern.into(),
        }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn live(&self) -> PathBuf {
        self.dir.join(format!("{}{}", self.base, self.pattern))
    }

    pub(crate) fn numbered(&self, n: u32) -> PathBuf {
        self.dir.join(format!("{}.{}{}", self.base, n, self.pattern))
    }

    pub(crate) fn dated(&self, date: &str) -> PathBuf {
        self.dir.join(format!("{}.{}{}", self.base, date, self.pattern))
    }

    pub(crate) fn dated_numbered(&self, date: &str, n: u32) -> PathBuf {
        self.dir
            .join(format!("{}.{}.{}{}", self.base, date, n, self.pattern))
    }

    pub(crate) fn archive(&self, zip_date: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}{}.zip", self.base, zip_date, self.pattern))
    }

    /// `<x>` of `<base>.<x><pattern>`, if `file_name` has that shape.
    fn middle<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        file_name
            .strip_prefix(&self.base)
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(|rest| rest.strip_suffix(&self.pattern))
    }

    /// Date part of a dated live file (`<base>.<date><pattern>`) whose date
    /// matches the `strftime` format `fmt`.
    pub(crate) fn dated_live_date<'a>(&self, file_name: &'a str, fmt: &str) -> Option<&'a str> {
        self.middle(file_name)
            .filter(|date| !date.is_empty() && matches_format(date, fmt))
    }

    /// Whether `file_name` is a rotated dated file of this stream
    /// (`<base>.<date>.<n><pattern>`).
    pub(crate) fn is_dated_generation(&self, file_name: &str) -> bool {
        let Some(middle) = self.middle(file_name) else {
            return false;
        };
        match middle.rsplit_once('.') {
            Some((date, n)) => !date.is_empty() && !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()),
            None => false,
        }
    }
}

/// Converts a date pattern to a validated `strftime` string.
///
/// Patterns containing `%` are taken as `strftime` already; otherwise the
/// tokens `yyyy yy MM dd HH hh mm ss` are translated and every other
/// character is literal.
pub(crate) fn strftime(pattern: &str) -> Result<String, FormatError> {
    if pattern.is_empty() {
        return Err(FormatError::date_pattern(pattern));
    }

    let fmt = if pattern.contains('%') {
        pattern.to_string()
    } else {
        translate(pattern)
    };

    if StrftimeItems::new(&fmt).any(|item| matches!(item, Item::Error)) {
        return Err(FormatError::date_pattern(pattern));
    }
    Ok(fmt)
}

/// Whether `text` is exactly something `fmt` could have produced.
pub(crate) fn matches_format(text: &str, fmt: &str) -> bool {
    let mut parsed = Parsed::default();
    chrono::format::parse(&mut parsed, text, StrftimeItems::new(fmt)).is_ok()
}

const TOKENS: &[(&str, &str)] = &[
    ("yyyy", "%Y"),
    ("yy", "%y"),
    ("MM", "%m"),
    ("dd", "%d"),
    ("HH", "%H"),
    ("hh", "%I"),
    ("mm", "%M"),
    ("ss", "%S"),
];

fn translate(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    'outer: while let Some(c) = rest.chars().next() {
        for (token, spec) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = tail;
                continue 'outer;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}
