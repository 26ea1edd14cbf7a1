//! # Log rotation policies.
//!
//! [`RotationPolicy`] selects how the child's stdout/stderr files are rolled.
//! Each variant carries only the parameters that make sense for it, so an
//! invalid combination (a keep-count on a time policy, say) cannot be expressed.
//!
//! | mode                    | rotates when                              | on disk                                  |
//! |-------------------------|-------------------------------------------|------------------------------------------|
//! | `none`                  | never (output discarded)                  | nothing                                  |
//! | `append`                | never                                     | `svc.out.log`                            |
//! | `reset`                 | never; truncated on every start           | `svc.out.log`                            |
//! | `roll-by-size`          | size ≥ threshold                          | `svc.out.log`, `svc.1.out.log` … `svc.N.out.log` |
//! | `roll-by-time`          | every `period_days` (local midnight)      | `svc.20240131.out.log`                   |
//! | `roll-by-size-and-time` | size ≥ threshold or daily `roll_at`       | `svc.20240131.out.log`, `svc.20240131.1.out.log`, `svc.202401.out.log.zip` |

use chrono::NaiveTime;
use serde::Deserialize;

use crate::error::{ConfigError, FormatError};
use crate::logs::naming;

/// Default size threshold: 10 MiB.
pub const DEFAULT_SIZE_THRESHOLD: u64 = 10 * 1024 * 1024;
/// Default number of rotated files kept by `roll-by-size`.
pub const DEFAULT_FILES_TO_KEEP: u32 = 8;
/// Default date pattern of dated policies.
pub const DEFAULT_DATE_PATTERN: &str = "yyyyMMdd";
/// Default archive date pattern: one archive per month.
pub const DEFAULT_ZIP_DATE_FORMAT: &str = "yyyyMM";

/// Rotation rule applied to both output streams of the child.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum RotationPolicy {
    /// Capture disabled; bytes are read from the pipes and discarded.
    None,
    /// Unbounded append to one file (default).
    Append,
    /// Truncate at each start, then unbounded append.
    Reset,
    /// Roll when the live file reaches `size_threshold` bytes.
    RollBySize {
        /// Bytes written to the live file that trigger a rotation.
        #[serde(default = "default_size_threshold")]
        size_threshold: u64,
        /// Rotated generations kept on disk; older ones are deleted.
        #[serde(default = "default_files_to_keep")]
        files_to_keep: u32,
    },
    /// Start a new dated file every `period_days`.
    RollByTime {
        /// Date pattern embedded in the file name.
        pattern: String,
        /// Period length in days.
        #[serde(default = "default_period_days")]
        period_days: u32,
    },
    /// Roll on size or at a daily time of day, archiving old files.
    #[serde(alias = "roll-by-size-time")]
    RollBySizeAndTime {
        /// Bytes written to the live file that trigger a rotation.
        #[serde(default = "default_size_threshold")]
        size_threshold: u64,
        /// Date pattern embedded in the file name.
        #[serde(default = "default_date_pattern")]
        pattern: String,
        /// Daily roll time (local).
        #[serde(default = "NaiveTime::default")]
        roll_at: NaiveTime,
        /// Rotated files older than this many days are zipped; `None` disables archival.
        #[serde(default)]
        zip_older_than_days: Option<u32>,
        /// Date pattern of the archive name.
        #[serde(default = "default_zip_date_format")]
        zip_date_format: String,
    },
}

impl Default for RotationPolicy {
    /// Returns [`RotationPolicy::Append`].
    fn default() -> Self {
        RotationPolicy::Append
    }
}

impl RotationPolicy {
    /// `roll-by-size` with the default threshold and keep count.
    pub fn roll_by_size() -> Self {
        RotationPolicy::RollBySize {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            files_to_keep: DEFAULT_FILES_TO_KEEP,
        }
    }

    /// Short stable mode name, as used in descriptors.
    pub fn mode(&self) -> &'static str {
        match self {
            RotationPolicy::None => "none",
            RotationPolicy::Append => "append",
            RotationPolicy::Reset => "reset",
            RotationPolicy::RollBySize { .. } => "roll-by-size",
            RotationPolicy::RollByTime { .. } => "roll-by-time",
            RotationPolicy::RollBySizeAndTime { .. } => "roll-by-size-and-time",
        }
    }

    /// Whether the policy embeds a date in the live file name.
    pub fn is_dated(&self) -> bool {
        matches!(
            self,
            RotationPolicy::RollByTime { .. } | RotationPolicy::RollBySizeAndTime { .. }
        )
    }

    /// Checks parameters that serde cannot: thresholds and date patterns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            RotationPolicy::None | RotationPolicy::Append | RotationPolicy::Reset => Ok(()),
            RotationPolicy::RollBySize { size_threshold, .. } => nonzero_threshold(*size_threshold),
            RotationPolicy::RollByTime {
                pattern,
                period_days,
            } => {
                if *period_days == 0 {
                    return Err(ConfigError::InvalidLogSettings {
                        reason: "period_days must be at least 1".to_string(),
                    });
                }
                naming::strftime(pattern).map(drop).map_err(ConfigError::from)
            }
            RotationPolicy::RollBySizeAndTime {
                size_threshold,
                pattern,
                zip_date_format,
                ..
            } => {
                nonzero_threshold(*size_threshold)?;
                naming::strftime(pattern)?;
                naming::strftime(zip_date_format)?;
                Ok(())
            }
        }
    }
}

/// Parses a descriptor time of day (`"00:00:00"` or `"23:30"`).
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, FormatError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| FormatError::time_of_day(value))
}

fn nonzero_threshold(size_threshold: u64) -> Result<(), ConfigError> {
    if size_threshold == 0 {
        return Err(ConfigError::InvalidLogSettings {
            reason: "size_threshold must be greater than zero".to_string(),
        });
    }
    Ok(())
}

fn default_size_threshold() -> u64 {
    DEFAULT_SIZE_THRESHOLD
}

fn default_files_to_keep() -> u32 {
    DEFAULT_FILES_TO_KEEP
}

fn default_period_days() -> u32 {
    1
}

fn default_date_pattern() -> String {
    DEFAULT_DATE_PATTERN.to_string()
}

fn default_zip_date_format() -> String {
    DEFAULT_ZIP_DATE_FORMAT.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_modes() {
        let p: RotationPolicy = serde_json::from_str(r#"{ "mode": "append" }"#).unwrap();
        assert_eq!(p, RotationPolicy::Append);

        let p: RotationPolicy =
            serde_json::from_str(r#"{ "mode": "roll-by-size", "size_threshold": 2048 }"#).unwrap();
        assert_eq!(
            p,
            RotationPolicy::RollBySize {
                size_threshold: 2048,
                files_to_keep: DEFAULT_FILES_TO_KEEP
            }
        );

        let p: RotationPolicy = serde_json::from_str(
            r#"{ "mode": "roll-by-size-time", "roll_at": "03:00:00", "zip_older_than_days": 7 }"#,
        )
        .unwrap();
        assert_eq!(p.mode(), "roll-by-size-and-time");
        match p {
            RotationPolicy::RollBySizeAndTime {
                roll_at,
                zip_older_than_days,
                zip_date_format,
                ..
            } => {
                assert_eq!(roll_at, NaiveTime::from_hms_opt(3, 0, 0).unwrap());
                assert_eq!(zip_older_than_days, Some(7));
                assert_eq!(zip_date_format, DEFAULT_ZIP_DATE_FORMAT);
            }
            other => panic!("unexpected policy {other:?}"),
        }
    }

    #[test]
    fn test_roll_by_time_requires_pattern() {
        let res: Result<RotationPolicy, _> = serde_json::from_str(r#"{ "mode": "roll-by-time" }"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_threshold_and_period() {
        let p = RotationPolicy::RollBySize {
            size_threshold: 0,
            files_to_keep: 1,
        };
        assert_eq!(p.validate().unwrap_err().as_label(), "config_invalid_log_settings");

        let p = RotationPolicy::RollByTime {
            pattern: "yyyyMMdd".into(),
            period_days: 0,
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_broken_strftime() {
        let p = RotationPolicy::RollByTime {
            pattern: "%Y-%".into(),
            period_days: 1,
        };
        assert_eq!(p.validate().unwrap_err().as_label(), "format_date_pattern");
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(
            parse_time_of_day("00:00:00").unwrap(),
            NaiveTime::from_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_time_of_day("23:30").unwrap(),
            NaiveTime::from_hms_opt(23, 30, 0).unwrap()
        );
        assert!(parse_time_of_day("25:00").is_err());
    }
}
