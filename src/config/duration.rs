//! # Textual durations.
//!
//! Service descriptors express timeouts as text with an optional unit suffix:
//! `"15 sec"`, `"10min"`, `"1 day"`. [`parse_duration`] turns such a value into a
//! millisecond-resolution [`Duration`].
//!
//! | suffix                    | factor (ms)  |
//! |---------------------------|--------------|
//! | `ms`                      | 1            |
//! | `sec`, `secs`             | 1 000        |
//! | `min`, `mins`             | 60 000       |
//! | `hr`, `hrs`, `hour`, `hours` | 3 600 000 |
//! | `day`, `days`             | 86 400 000   |
//!
//! A value without a known suffix is a plain millisecond count.

use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer, Visitor};

use crate::error::FormatError;

/// Suffix table. Suffixes are disjoint: no entry is a suffix of another
/// entry's valid input, so the first match is the only match.
const SUFFIXES: &[(&str, u64)] = &[
    ("ms", 1),
    ("sec", 1_000),
    ("secs", 1_000),
    ("min", 60_000),
    ("mins", 60_000),
    ("hr", 3_600_000),
    ("hrs", 3_600_000),
    ("hour", 3_600_000),
    ("hours", 3_600_000),
    ("day", 86_400_000),
    ("days", 86_400_000),
];

/// Parses a textual duration such as `"60sec"`, `"20 min"` or `"500"`.
///
/// # Errors
/// Returns [`FormatError`] when the numeric part is not a base-10 unsigned
/// integer or when the result does not fit into a `u64` millisecond count.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use servicevisor::parse_duration;
///
/// assert_eq!(parse_duration("10min").unwrap(), Duration::from_secs(600));
/// assert_eq!(parse_duration("500").unwrap(), Duration::from_millis(500));
/// assert!(parse_duration("abc").is_err());
/// ```
pub fn parse_duration(value: &str) -> Result<Duration, FormatError> {
    let value = value.trim();
    let (number, factor) = SUFFIXES
        .iter()
        .find_map(|(suffix, factor)| value.strip_suffix(suffix).map(|n| (n, *factor)))
        .unwrap_or((value, 1));

    let number: u64 = number
        .trim()
        .parse()
        .map_err(|_| FormatError::duration(value))?;
    let millis = number
        .checked_mul(factor)
        .ok_or_else(|| FormatError::duration(value))?;

    Ok(Duration::from_millis(millis))
}

/// Serde adapter: accepts either a textual duration (see [`parse_duration`])
/// or an integer number of milliseconds.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(DurationVisitor)
}

struct DurationVisitor;

impl<'de> Visitor<'de> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a duration such as \"15 sec\" or a millisecond count")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
        Ok(Duration::from_millis(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
        u64::try_from(v)
            .map(Duration::from_millis)
            .map_err(|_| E::custom(FormatError::duration(&v.to_string())))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
        parse_duration(v).map_err(E::custom)
    }
}
