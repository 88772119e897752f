//! Configuration for wikiclean

mod logging;
mod pipeline;

pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use pipeline::{CleaningConfig, ExtractConfig, PipelineConfig, SinkConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on transform workers
pub const MAX_WORKERS: usize = 1024;

/// Default config file name written by `wikiclean init`
pub const DEFAULT_CONFIG_FILE: &str = "wikiclean.toml";

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Worker and channel sizing
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Page selection
    #[serde(default)]
    pub extract: ExtractConfig,
    /// Wikitext cleaning rules
    #[serde(default)]
    pub cleaning: CleaningConfig,
    /// Output store
    #[serde(default)]
    pub sink: SinkConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config = Self::from_toml(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e))?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together so the user
    /// can fix everything in one pass.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.pipeline.workers == 0 {
            errors.push("workers must be positive".to_string());
        }
        if self.pipeline.workers > MAX_WORKERS {
            errors.push(format!("workers must be <= {}", MAX_WORKERS));
        }
        if self.pipeline.input_capacity == 0 {
            errors.push("input_capacity must be positive".to_string());
        }
        if self.pipeline.output_capacity == 0 {
            errors.push("output_capacity must be positive".to_string());
        }
        if self.pipeline.monitor_interval_ms == 0 {
            errors.push("monitor_interval_ms must be positive".to_string());
        }

        if !self.extract.all_namespaces && self.extract.namespaces.is_empty() {
            errors.push("namespaces must not be empty unless all_namespaces is set".to_string());
        }
        if self.extract.max_pages == Some(0) {
            errors.push("max_pages must be positive when set".to_string());
        }

        if self.sink.tree.trim().is_empty() {
            errors.push("sink tree name must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn default_config_passes_validation() {
        let cfg = valid_config();
        assert!(cfg.validate().is_ok(), "default config should be valid");
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = valid_config();
        assert_eq!(cfg.pipeline.workers, 15);
        assert_eq!(cfg.pipeline.input_capacity, 1000);
        assert_eq!(cfg.pipeline.output_capacity, 1000);
        assert_eq!(cfg.extract.namespaces, vec![0]);
        assert_eq!(cfg.sink.tree, "pages");
        assert!(cfg.sink.sync_writes);
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut cfg = valid_config();
        cfg.pipeline.workers = 0;
        let err = cfg.validate().unwrap_err();
        assert!(
            err.to_string().contains("workers must be positive"),
            "unexpected error message: {}",
            err
        );
    }

    #[test]
    fn validate_rejects_too_many_workers() {
        let mut cfg = valid_config();
        cfg.pipeline.workers = MAX_WORKERS + 1;
        assert!(cfg.validate().is_err());

        cfg.pipeline.workers = MAX_WORKERS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_namespaces_only_when_filtering() {
        let mut cfg = valid_config();
        cfg.extract.namespaces.clear();
        assert!(cfg.validate().is_err());

        cfg.extract.all_namespaces = true;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_collects_all_errors() {
        let mut cfg = valid_config();
        cfg.pipeline.input_capacity = 0;
        cfg.pipeline.output_capacity = 0;
        cfg.sink.tree = "  ".to_string();

        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("input_capacity must be positive"), "missing input_capacity: {}", msg);
        assert!(msg.contains("output_capacity must be positive"), "missing output_capacity: {}", msg);
        assert!(msg.contains("sink tree name must not be empty"), "missing tree: {}", msg);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg = Config::from_toml(
            r#"
[pipeline]
workers = 4

[extract]
namespaces = [0, 14]
skip_redirects = true

[logging]
level = "debug"
"#,
        )
        .unwrap();

        assert_eq!(cfg.pipeline.workers, 4);
        assert_eq!(cfg.pipeline.input_capacity, 1000);
        assert_eq!(cfg.extract.namespaces, vec![0, 14]);
        assert!(cfg.extract.skip_redirects);
        assert!(cfg.cleaning.remove_refs);
        assert_eq!(cfg.logging.level, LogLevel::Debug);
        assert_eq!(cfg.logging.format, LogFormat::Text);
    }

    #[test]
    fn invalid_toml_values_are_rejected() {
        let err = Config::from_toml("[pipeline]\nworkers = 0\n").unwrap_err();
        assert!(err.to_string().contains("workers must be positive"));
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let cfg = valid_config();
        let rendered = cfg.to_toml().unwrap();
        assert_eq!(Config::from_toml(&rendered).unwrap(), cfg);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/wikiclean.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
