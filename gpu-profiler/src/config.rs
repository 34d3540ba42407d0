//! Event profiler configuration

use crate::error::GpuError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "APERTURE_GPU_CONFIG";

/// Environment variable that disables event profiling when present
pub const DISABLE_EVENT_PROFILER_ENV: &str = "APERTURE_DISABLE_EVENT_PROFILER";

/// Configuration file used when [`CONFIG_PATH_ENV`] is unset
pub const DEFAULT_CONFIG_PATH: &str = "/etc/aperture-gpu.toml";

/// Whether event profiling is disabled through the environment
pub fn event_profiler_disabled_by_env() -> bool {
    std::env::var_os(DISABLE_EVENT_PROFILER_ENV).is_some()
}

/// Baseline configuration handed to the event engine when a session starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventProfilerConfig {
    /// Counter event names to collect
    pub events: Vec<String>,

    /// Derived metric names to collect
    pub metrics: Vec<String>,

    /// Counter sampling period in milliseconds
    pub sample_period_ms: u64,

    /// Event group multiplexing period in milliseconds
    pub multiplex_period_ms: u64,

    /// Reporting period in seconds
    pub report_period_secs: u64,

    /// Number of samples aggregated into each report
    pub samples_per_report: u32,

    /// Live session count above which every new session logs a warning
    pub session_warn_threshold: usize,
}

impl Default for EventProfilerConfig {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            metrics: Vec::new(),
            sample_period_ms: 1000,
            multiplex_period_ms: 1000,
            report_period_secs: 1,
            samples_per_report: 1,
            session_warn_threshold: 64,
        }
    }
}

impl EventProfilerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), GpuError> {
        if self.sample_period_ms == 0 {
            return Err(GpuError::InvalidConfig(
                "sample period must be greater than 0".to_string(),
            ));
        }

        if self.multiplex_period_ms < self.sample_period_ms {
            return Err(GpuError::InvalidConfig(format!(
                "multiplex period ({} ms) is shorter than the sample period ({} ms)",
                self.multiplex_period_ms, self.sample_period_ms
            )));
        }

        if self.report_period_secs.saturating_mul(1000) < self.sample_period_ms {
            return Err(GpuError::InvalidConfig(format!(
                "report period ({} s) is shorter than the sample period ({} ms)",
                self.report_period_secs, self.sample_period_ms
            )));
        }

        Ok(())
    }
}

/// Source of the baseline configuration consumed when starting a session
pub trait ConfigLoader: Send + Sync {
    /// (Re)load the baseline configuration
    fn init_base_config(&self) -> Result<(), GpuError>;

    /// The most recently loaded baseline configuration
    fn base_config(&self) -> EventProfilerConfig;
}

/// Loads the baseline configuration from a file. The format follows the
/// file extension (TOML, JSON, YAML, ...).
#[derive(Debug)]
pub struct FileConfigLoader {
    path: PathBuf,
    current: RwLock<EventProfilerConfig>,
}

impl FileConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(EventProfilerConfig::default()),
        }
    }

    /// Use the path from [`CONFIG_PATH_ENV`], falling back to [`DEFAULT_CONFIG_PATH`]
    pub fn from_env() -> Self {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<EventProfilerConfig, GpuError> {
        let config: EventProfilerConfig = config::Config::builder()
            .add_source(config::File::from(self.path.as_path()).required(false))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

impl ConfigLoader for FileConfigLoader {
    fn init_base_config(&self) -> Result<(), GpuError> {
        let config = self.load()?;
        debug!("Loaded event profiler config from {:?}: {:?}", self.path, config);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    fn base_config(&self) -> EventProfilerConfig {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Fixed configuration, mostly useful for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct StaticConfigLoader {
    config: EventProfilerConfig,
}

impl StaticConfigLoader {
    pub fn new(config: EventProfilerConfig) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn init_base_config(&self) -> Result<(), GpuError> {
        self.config.validate()
    }

    fn base_config(&self) -> EventProfilerConfig {
        self.config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EventProfilerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_zero_sample_period() {
        let config = EventProfilerConfig {
            sample_period_ms: 0,
            ..EventProfilerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_multiplex_shorter_than_sample() {
        let config = EventProfilerConfig {
            sample_period_ms: 500,
            multiplex_period_ms: 100,
            ..EventProfilerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_report_shorter_than_sample() {
        let config = EventProfilerConfig {
            sample_period_ms: 5000,
            multiplex_period_ms: 5000,
            report_period_secs: 1,
            ..EventProfilerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FileConfigLoader::new(dir.path().join("absent.toml"));

        loader.init_base_config().unwrap();
        assert_eq!(loader.base_config(), EventProfilerConfig::default());
    }

    #[test]
    fn test_loads_toml_file() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
events = ["inst_executed", "active_cycles"]
sample_period_ms = 200
multiplex_period_ms = 400
"#
        )
        .unwrap();

        let loader = FileConfigLoader::new(file.path());
        loader.init_base_config().unwrap();

        let config = loader.base_config();
        assert_eq!(config.events, vec!["inst_executed", "active_cycles"]);
        assert_eq!(config.sample_period_ms, 200);
        assert_eq!(config.multiplex_period_ms, 400);
        assert_eq!(config.report_period_secs, 1);
    }

    #[test]
    fn test_invalid_file_keeps_previous_config() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "sample_period_ms = 0").unwrap();

        let loader = FileConfigLoader::new(file.path());
        assert!(matches!(
            loader.init_base_config(),
            Err(GpuError::InvalidConfig(_))
        ));
        assert_eq!(loader.base_config(), EventProfilerConfig::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "events = [unterminated").unwrap();

        let loader = FileConfigLoader::new(file.path());
        assert!(matches!(loader.init_base_config(), Err(GpuError::Config(_))));
    }
}
