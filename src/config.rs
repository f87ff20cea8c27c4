//! Layered application configuration: defaults, optional file, environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use formpilot_dispatcher::DispatcherConfig;
use formpilot_driver::WaitPolicy;
use formpilot_element_locator::ResolverConfig;
use formpilot_learning_store::OptimizerConfig;

use crate::runner::RunnerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    pub max_concurrent_jobs: usize,
    pub worker_count: Option<usize>,
    pub dequeue_timeout_secs: u64,
    pub max_requeues: u32,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        let defaults = DispatcherConfig::default();
        Self {
            max_concurrent_jobs: defaults.max_concurrent_jobs,
            worker_count: defaults.worker_count,
            dequeue_timeout_secs: defaults.dequeue_timeout.as_secs(),
            max_requeues: defaults.max_requeues,
        }
    }
}

impl From<DispatcherSettings> for DispatcherConfig {
    fn from(settings: DispatcherSettings) -> Self {
        DispatcherConfig {
            max_concurrent_jobs: settings.max_concurrent_jobs,
            worker_count: settings.worker_count,
            dequeue_timeout: Duration::from_secs(settings.dequeue_timeout_secs),
            max_requeues: settings.max_requeues,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    pub visibility_wait_ms: u64,
    pub candidate_wait_ms: u64,
    /// Tunable acceptance threshold for the visual strategy.
    pub confidence_threshold: f64,
    pub navigation_timeout_secs: u64,
    pub navigation_wait: WaitPolicy,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        let defaults = ResolverConfig::default();
        Self {
            visibility_wait_ms: defaults.visibility_wait.as_millis() as u64,
            candidate_wait_ms: defaults.candidate_wait.as_millis() as u64,
            confidence_threshold: defaults.confidence_threshold,
            navigation_timeout_secs: 30,
            navigation_wait: WaitPolicy::NetworkIdle,
        }
    }
}

impl ResolverSettings {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            navigation_timeout: Duration::from_secs(self.navigation_timeout_secs),
            navigation_wait: self.navigation_wait,
            resolver: ResolverConfig {
                visibility_wait: Duration::from_millis(self.visibility_wait_ms),
                candidate_wait: Duration::from_millis(self.candidate_wait_ms),
                confidence_threshold: self.confidence_threshold,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub interval_secs: u64,
    pub window_secs: u64,
    pub top_n: usize,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        let defaults = OptimizerConfig::default();
        Self {
            interval_secs: defaults.interval.as_secs(),
            window_secs: defaults.window.as_secs(),
            top_n: defaults.top_n,
        }
    }
}

impl From<OptimizerSettings> for OptimizerConfig {
    fn from(settings: OptimizerSettings) -> Self {
        OptimizerConfig {
            interval: Duration::from_secs(settings.interval_secs),
            window: Duration::from_secs(settings.window_secs),
            top_n: settings.top_n,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageSettings,
    pub dispatcher: DispatcherSettings,
    pub resolver: ResolverSettings,
    pub optimizer: OptimizerSettings,
}

impl AppConfig {
    /// Defaults, overlaid by an optional TOML file, overlaid by
    /// `FORMPILOT__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(Environment::with_prefix("FORMPILOT").separator("__"));
        builder.build()?.try_deserialize()
    }
}
