use hifz_core::{ExamScoringConfig, HifzConfig, RuleDefaults};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawCliConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub exam: RawExamConfig,

    /// Rule point overrides, keyed like [`RuleDefaults`] fields
    #[serde(default)]
    pub rules: toml::Table,
}

/// Exam config as stored in TOML (optional fields for proper merging)
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawExamConfig {
    pub current_part_weight: Option<u32>,
    pub cumulative_weight: Option<u32>,
    pub pass_threshold: Option<f64>,
    pub award_on_fail: Option<bool>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub exam: ExamScoringConfig,

    #[serde(default)]
    pub rules: RuleDefaults,
}

impl CliConfig {
    /// The engine settings without the CLI-only sections.
    pub fn hifz(&self) -> HifzConfig {
        HifzConfig {
            exam: self.exam.clone(),
            rules: self.rules.clone(),
        }
    }

    /// A copy safe to print: the storage token is masked.
    pub fn redacted(&self) -> CliConfig {
        let mut config = self.clone();
        if config.storage.token.is_some() {
            config.storage.token = Some(REDACTED.to_string());
        }
        config
    }
}

const REDACTED: &str = "<redacted>";

/// Where the ledger database lives.
///
/// A `url` selects a remote Turso database and needs a `token`. Otherwise
/// `path` (or the platform data directory) holds a local database file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Local database file
    pub path: Option<PathBuf>,

    /// Remote Turso database URL
    pub url: Option<String>,

    /// Auth token for the remote database
    pub token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hifz_core::{DEFAULT_PASS_THRESHOLD, RuleKey};

    #[test]
    fn test_default_values() {
        let config = CliConfig::default();
        assert!(config.storage.path.is_none());
        assert!(config.storage.url.is_none());
        assert_eq!(config.exam.pass_threshold, DEFAULT_PASS_THRESHOLD);
        assert_eq!(config.rules.points_for(RuleKey::ExamPassed), 50);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = CliConfig::default();
        config.storage.path = Some(PathBuf::from("/var/lib/hifz/ledger.db"));
        config.exam.award_on_fail = true;
        config.rules.attendance_late = 1;

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: CliConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(
            parsed.storage.path,
            Some(PathBuf::from("/var/lib/hifz/ledger.db"))
        );
        assert!(parsed.exam.award_on_fail);
        assert_eq!(parsed.rules.attendance_late, 1);
        assert_eq!(parsed.hifz().exam, config.exam);
    }

    #[test]
    fn test_redacted_masks_token_only() {
        let mut config = CliConfig::default();
        config.storage.url = Some("libsql://hifz-circle.turso.io".to_string());
        config.storage.token = Some("eyJhbGciOiJFZERTQSJ9.secret".to_string());

        let redacted = config.redacted();
        let rendered = toml::to_string_pretty(&redacted).unwrap();

        assert_eq!(redacted.storage.token.as_deref(), Some(REDACTED));
        assert_eq!(redacted.storage.url, config.storage.url);
        assert!(!rendered.contains("secret"));
        assert!(CliConfig::default().redacted().storage.token.is_none());
    }

    #[test]
    fn test_raw_config_rejects_unknown_exam_key() {
        let result: Result<RawCliConfig, _> = toml::from_str("[exam]\npass_treshold = 70.0\n");

        assert!(result.is_err());
    }

    #[test]
    fn test_raw_config_partial_parsing() {
        let toml_str = r#"
[exam]
pass_threshold = 75.0

[rules]
exam_passed = 100
"#;
        let raw: RawCliConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(raw.exam.pass_threshold, Some(75.0));
        assert!(raw.exam.current_part_weight.is_none());
        assert_eq!(raw.rules.get("exam_passed").and_then(|v| v.as_integer()), Some(100));
        assert!(raw.storage.url.is_none());
    }

    #[test]
    fn test_raw_config_empty_uses_none() {
        let raw: RawCliConfig = toml::from_str("").unwrap();

        assert!(raw.exam.pass_threshold.is_none());
        assert!(raw.exam.award_on_fail.is_none());
        assert!(raw.rules.is_empty());
    }
}
