use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    /// Path to the JSON graph description
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Output used when a call does not name one
    #[serde(default)]
    pub default_output: Option<String>,
    /// Time steps per sequence input for `check` dry runs
    #[serde(default = "default_dry_run_steps")]
    pub dry_run_steps: usize,
}

fn default_dry_run_steps() -> usize {
    1
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: None,
            default_output: None,
            dry_run_steps: default_dry_run_steps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("model.dry_run_steps", 1)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("LWGRAPH_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (LWGRAPH__MODEL__PATH, etc.)
            .add_source(
                Environment::with_prefix("LWGRAPH")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            errors.push(format!("unknown log level: {}", self.logging.level));
        }

        if let Some(path) = &self.model.path {
            if path.as_os_str().is_empty() {
                errors.push("model.path must not be empty".to_string());
            }
        }

        if matches!(&self.model.default_output, Some(name) if name.is_empty()) {
            errors.push("model.default_output must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_defaults_without_files() {
        let dir = std::env::temp_dir().join("lwgraph-config-defaults");
        let config = AppConfig::load_from(&dir).unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert_eq!(config.model.dry_run_steps, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_toml_file() {
        let dir = std::env::temp_dir().join(format!("lwgraph-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("default.toml"),
            "[model]\npath = \"models/tagger.json\"\ndefault_output = \"score\"\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&dir).unwrap();
        assert_eq!(
            config.model.path.as_deref(),
            Some(Path::new("models/tagger.json"))
        );
        assert_eq!(config.model.default_output.as_deref(), Some("score"));
        assert_eq!(config.logging.level, "debug");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn rejects_unknown_level() {
        let config = AppConfig {
            model: ModelSettings::default(),
            logging: LoggingConfig {
                level: "loud".to_string(),
                json: false,
            },
        };
        assert_eq!(config.validate().unwrap_err().len(), 1);
    }
}
