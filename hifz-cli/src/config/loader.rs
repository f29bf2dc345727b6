use super::types::{CliConfig, RawCliConfig, RawExamConfig, StorageConfig};
use anyhow::Result;
use directories::ProjectDirs;
use hifz_core::{ExamScoringConfig, RuleDefaults};
use std::path::PathBuf;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<CliConfig> {
        let mut raw = RawCliConfig::default();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path()
            && user_path.exists()
        {
            let contents = std::fs::read_to_string(&user_path)?;
            let user_config: RawCliConfig = toml::from_str(&contents)?;
            raw = Self::merge_raw(raw, user_config);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            let contents = std::fs::read_to_string(&project_path)?;
            let project_config: RawCliConfig = toml::from_str(&contents)?;
            raw = Self::merge_raw(raw, project_config);
        }

        Self::finalize(raw)
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with HIFZ_PROJECT_CONFIG_DIR env var (useful for isolated e2e tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("HIFZ_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".hifz/config.toml")
        }
    }

    /// Database file used when no storage location is configured
    pub fn default_database_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().join("hifz.db"))
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "hifz")
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawCliConfig, overlay: RawCliConfig) -> RawCliConfig {
        let mut rules = base.rules;
        for (key, value) in overlay.rules {
            rules.insert(key, value);
        }

        RawCliConfig {
            storage: StorageConfig {
                path: overlay.storage.path.or(base.storage.path),
                url: overlay.storage.url.or(base.storage.url),
                token: overlay.storage.token.or(base.storage.token),
            },
            exam: RawExamConfig {
                current_part_weight: overlay
                    .exam
                    .current_part_weight
                    .or(base.exam.current_part_weight),
                cumulative_weight: overlay
                    .exam
                    .cumulative_weight
                    .or(base.exam.cumulative_weight),
                pass_threshold: overlay.exam.pass_threshold.or(base.exam.pass_threshold),
                award_on_fail: overlay.exam.award_on_fail.or(base.exam.award_on_fail),
            },
            rules,
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawCliConfig) -> Result<CliConfig> {
        let defaults = ExamScoringConfig::default();
        let exam = ExamScoringConfig {
            current_part_weight: raw
                .exam
                .current_part_weight
                .unwrap_or(defaults.current_part_weight),
            cumulative_weight: raw
                .exam
                .cumulative_weight
                .unwrap_or(defaults.cumulative_weight),
            pass_threshold: raw.exam.pass_threshold.unwrap_or(defaults.pass_threshold),
            award_on_fail: raw.exam.award_on_fail.unwrap_or(defaults.award_on_fail),
        };
        exam.validate()?;

        let rules: RuleDefaults = toml::Value::Table(raw.rules).try_into()?;

        Ok(CliConfig {
            storage: raw.storage,
            exam,
            rules,
        })
    }

    /// Load config from a specific path (for testing)
    #[cfg(test)]
    pub fn load_from_path(path: &std::path::Path) -> Result<CliConfig> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Self::finalize(toml::from_str(&contents)?)
        } else {
            Self::finalize(RawCliConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn raw(toml_str: &str) -> RawCliConfig {
        toml::from_str(toml_str).unwrap()
    }

    // ==================== Load Tests ====================

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nonexistent.toml");

        let config = ConfigLoader::load_from_path(&path).unwrap();

        assert_eq!(config.exam, ExamScoringConfig::default());
        assert_eq!(config.rules, RuleDefaults::default());
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn test_load_from_valid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[storage]
path = "/srv/hifz/ledger.db"

[exam]
current_part_weight = 60
cumulative_weight = 40
award_on_fail = true

[rules]
attendance_absent = -10
"#
        )
        .unwrap();

        let config = ConfigLoader::load_from_path(&path).unwrap();

        assert_eq!(
            config.storage.path,
            Some(PathBuf::from("/srv/hifz/ledger.db"))
        );
        assert_eq!(config.exam.current_part_weight, 60);
        assert_eq!(config.exam.cumulative_weight, 40);
        assert_eq!(config.exam.pass_threshold, 80.0);
        assert!(config.exam.award_on_fail);
        assert_eq!(config.rules.attendance_absent, -10);
        assert_eq!(config.rules.exam_passed, 50);
    }

    #[test]
    fn test_load_invalid_toml_returns_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("invalid.toml");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "this is not valid toml {{{{").unwrap();

        let result = ConfigLoader::load_from_path(&path);
        assert!(result.is_err());
    }

    #[test]
    fn test_finalize_rejects_unusable_exam_weights() {
        let result = ConfigLoader::finalize(raw(
            r#"
[exam]
current_part_weight = 0
cumulative_weight = 0
"#,
        ));

        assert!(result.is_err());
    }

    #[test]
    fn test_finalize_rejects_mistyped_rule_points() {
        let result = ConfigLoader::finalize(raw(
            r#"
[rules]
exam_passed = "lots"
"#,
        ));

        assert!(result.is_err());
    }

    #[test]
    fn test_finalize_rejects_unknown_rule_key() {
        let result = ConfigLoader::finalize(raw(
            r#"
[rules]
exam_pased = 75
"#,
        ));

        let err = result.unwrap_err().to_string();
        assert!(err.contains("exam_pased"), "unexpected error: {err}");
    }

    #[test]
    fn test_merge_raw_overlay_overrides_base() {
        let base = raw(
            r#"
[storage]
path = "/base.db"
token = "base-token"

[exam]
pass_threshold = 85.0
award_on_fail = true

[rules]
exam_passed = 40
attendance_late = 1
"#,
        );
        let overlay = raw(
            r#"
[storage]
path = "/overlay.db"

[exam]
pass_threshold = 75.0

[rules]
exam_passed = 60
"#,
        );

        let merged = ConfigLoader::merge_raw(base, overlay);

        assert_eq!(merged.storage.path, Some(PathBuf::from("/overlay.db")));
        // overlay's None falls through to base value via .or()
        assert_eq!(merged.storage.token, Some("base-token".to_string()));
        assert_eq!(merged.exam.pass_threshold, Some(75.0));
        assert_eq!(merged.exam.award_on_fail, Some(true));

        let config = ConfigLoader::finalize(merged).unwrap();
        assert_eq!(config.rules.exam_passed, 60);
        assert_eq!(config.rules.attendance_late, 1);
    }

    #[test]
    fn test_merge_raw_none_preserves_base() {
        let base = raw(
            r#"
[exam]
current_part_weight = 50
cumulative_weight = 50
"#,
        );

        let merged = ConfigLoader::merge_raw(base, RawCliConfig::default());

        assert_eq!(merged.exam.current_part_weight, Some(50));
        assert_eq!(merged.exam.cumulative_weight, Some(50));
        assert!(merged.exam.pass_threshold.is_none());
    }

    #[test]
    fn test_user_config_path_returns_some() {
        // This should always return Some on platforms with home directories
        let path = ConfigLoader::user_config_path();
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.to_string_lossy().contains("hifz"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_default_database_path_is_in_data_dir() {
        let path = ConfigLoader::default_database_path().unwrap();
        assert!(path.ends_with("hifz.db"));
    }
}
