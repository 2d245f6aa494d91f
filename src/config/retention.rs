//! Data retention configuration.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! days = 30
//! dry_run = false
//! ```

use serde::Deserialize;

/// Data retention configuration.
///
/// Records older than `days` are deleted from every collection with a
/// recognized name prefix.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Days of history to keep.
    /// Signed so that a negative value is reported as a configuration error
    /// when the run is built, after any `--days` override, rather than as a
    /// parse error.
    /// Default: 30
    #[serde(default = "default_days")]
    pub days: i64,

    /// If true, report what would be deleted without deleting or compacting.
    /// Default: true (mutation must be requested explicitly)
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_days(),
            dry_run: default_dry_run(),
        }
    }
}

fn default_days() -> i64 {
    30
}

fn default_dry_run() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetentionConfig::default();
        assert_eq!(config.days, 30);
        assert!(config.dry_run);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            days = 14
            dry_run = false
        "#;
        let config: RetentionConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.days, 14);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_out_of_range_days_still_parse() {
        let config: RetentionConfig = toml::from_str("days = -7").unwrap();
        assert_eq!(config.days, -7);
        let config: RetentionConfig = toml::from_str("days = 0").unwrap();
        assert_eq!(config.days, 0);
    }
}
