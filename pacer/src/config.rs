// Configuration management with layered configuration (file, env)

use crate::rate_limit::RateLimitOptions;
use crate::scheduler::SchedulerConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Named scheduler definitions
    #[serde(default)]
    pub schedulers: BTreeMap<String, SchedulerSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_json_logs")]
    pub json_logs: bool,
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json_logs() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: default_json_logs(),
            metrics_port: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Edges and max_wait exactly as configured
    #[default]
    Debounce,
    /// Leading and trailing on by default, max_wait forced to wait
    RateLimit,
}

/// One named scheduler as written in configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default)]
    pub preset: Preset,
    pub wait_ms: u64,
    pub leading: Option<bool>,
    pub trailing: Option<bool>,
    pub max_wait_ms: Option<u64>,
}

impl SchedulerSettings {
    /// Resolve the preset into a scheduler configuration
    ///
    /// For `rate_limit`, `max_wait_ms` is ignored and edges default to on;
    /// for `debounce`, edges default to off.
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        let wait = Duration::from_millis(self.wait_ms);
        match self.preset {
            Preset::Debounce => SchedulerConfig {
                wait,
                leading: self.leading.unwrap_or(false),
                trailing: self.trailing.unwrap_or(false),
                max_wait: self.max_wait_ms.map(Duration::from_millis),
            },
            Preset::RateLimit => RateLimitOptions {
                leading: self.leading.unwrap_or(true),
                trailing: self.trailing.unwrap_or(true),
            }
            .config(wait),
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment-specific configuration
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Look up a named scheduler
    pub fn scheduler(&self, name: &str) -> Option<&SchedulerSettings> {
        self.schedulers.get(name)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.observability.log_level.is_empty() {
            return Err("Log level cannot be empty".to_string());
        }
        if self.observability.metrics_port == Some(0) {
            return Err("Metrics port must be greater than 0".to_string());
        }

        for (name, scheduler) in &self.schedulers {
            if name.is_empty() {
                return Err("Scheduler name cannot be empty".to_string());
            }
            scheduler
                .to_scheduler_config()
                .validate(name)
                .map_err(|e| e.to_string())?;
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        let mut schedulers = BTreeMap::new();
        schedulers.insert(
            "search".to_string(),
            SchedulerSettings {
                preset: Preset::Debounce,
                wait_ms: 300,
                leading: Some(false),
                trailing: Some(true),
                max_wait_ms: Some(1_000),
            },
        );
        schedulers.insert(
            "sync".to_string(),
            SchedulerSettings {
                preset: Preset::RateLimit,
                wait_ms: 1_000,
                leading: None,
                trailing: None,
                max_wait_ms: None,
            },
        );

        Self {
            observability: ObservabilityConfig::default(),
            schedulers,
        }
    }
}
