use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::{LearningSteps, SchedulerSettings};
use crate::error::AppError;
use crate::model::{DailyQuotas, SchedulerModel};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Quotas seeded into every new collection.
    #[serde(default)]
    pub training: DailyQuotas,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kbox")
        .join("kbox.db")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_steps")]
    pub learning_steps_minutes: Vec<u32>,
    #[serde(default = "default_steps")]
    pub relearning_steps_minutes: Vec<u32>,
    #[serde(default = "default_retention")]
    pub request_retention: f64,
    #[serde(default = "default_max_interval")]
    pub maximum_interval_days: u32,
    /// Model given to collections created without an explicit choice.
    #[serde(default)]
    pub default_model: SchedulerModel,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            learning_steps_minutes: default_steps(),
            relearning_steps_minutes: default_steps(),
            request_retention: default_retention(),
            maximum_interval_days: default_max_interval(),
            default_model: SchedulerModel::default(),
        }
    }
}

fn default_steps() -> Vec<u32> {
    vec![1, 10]
}

fn default_retention() -> f64 {
    0.9
}

fn default_max_interval() -> u32 {
    36_500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing` filter directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "kbox=info".to_string()
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config file {}: {e}", path.display())))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `explicit` when given, else from the first default location
    /// that exists, else fall back to defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, AppError> {
        match explicit {
            Some(path) => Self::load(path),
            None => match Self::find_config_file() {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let mut candidates = vec![PathBuf::from("kbox.toml")];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("kbox").join("config.toml"));
        }
        candidates.into_iter().find(|p| p.exists())
    }

    /// Where `kbox init` writes when no path is given.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kbox")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.training.validate()?;
        self.scheduler_settings()?;
        Ok(())
    }

    /// Scheduling parameters shared by every collection.
    pub fn scheduler_settings(&self) -> Result<SchedulerSettings, AppError> {
        let s = &self.scheduler;
        if !(s.request_retention > 0.0 && s.request_retention < 1.0) {
            return Err(AppError::Validation(format!(
                "request_retention must be between 0 and 1, got {}",
                s.request_retention
            )));
        }
        if s.maximum_interval_days == 0 {
            return Err(AppError::Validation(
                "maximum_interval_days must be at least 1".into(),
            ));
        }
        Ok(SchedulerSettings {
            learning_steps: LearningSteps::from_minutes(&s.learning_steps_minutes)?,
            relearning_steps: LearningSteps::from_minutes(&s.relearning_steps_minutes)?,
            request_retention: s.request_retention,
            maximum_interval_days: s.maximum_interval_days,
        })
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# kbox configuration

[database]
# path = "/home/me/.local/share/kbox/kbox.db"

[training]
# Daily quotas given to new collections (each at most 9999)
max_new_cards = 20
max_review_cards = 50
max_learning_cards = 10

[scheduler]
# Sub-day steps, in minutes, walked before a card reaches review
learning_steps_minutes = [1, 10]
relearning_steps_minutes = [1, 10]
# Target recall probability for the fsrs model
request_retention = 0.9
maximum_interval_days = 36500
# "fsrs" or "legacy"
default_model = "fsrs"

[log]
# Overridden by RUST_LOG
filter = "kbox=info"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn generated_default_parses_to_defaults() {
        let config: Config = toml::from_str(&Config::generate_default()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.training, DailyQuotas::default());
        assert_eq!(config.scheduler.learning_steps_minutes, vec![1, 10]);
        assert_eq!(config.scheduler.default_model, SchedulerModel::Fsrs);
        assert_eq!(config.log.filter, "kbox=info");
        let settings = config.scheduler_settings().unwrap();
        assert_eq!(settings, SchedulerSettings::default());
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: Config = toml::from_str("[training]\nmax_new_cards = 5\n").unwrap();
        assert_eq!(config.training.max_new_cards, 5);
        assert_eq!(config.training.max_review_cards, 50);
        assert_eq!(config.scheduler.maximum_interval_days, 36_500);
    }

    #[test]
    fn load_reads_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\ndefault_model = \"legacy\"\nlearning_steps_minutes = [5]").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.scheduler.default_model, SchedulerModel::Legacy);
        assert_eq!(
            config.scheduler_settings().unwrap().learning_steps.minutes(),
            &[5]
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kbox.toml");

        std::fs::write(&path, "[scheduler]\nrequest_retention = 1.5\n").unwrap();
        assert!(matches!(Config::load(&path), Err(AppError::Validation(_))));

        std::fs::write(&path, "[scheduler]\nlearning_steps_minutes = []\n").unwrap();
        assert!(matches!(Config::load(&path), Err(AppError::Validation(_))));

        std::fs::write(&path, "[training]\nmax_new_cards = 10000\n").unwrap();
        assert!(matches!(Config::load(&path), Err(AppError::Validation(_))));

        std::fs::write(&path, "[training\n").unwrap();
        assert!(matches!(Config::load(&path), Err(AppError::Config(_))));
    }

    #[test]
    fn missing_explicit_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::resolve(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
