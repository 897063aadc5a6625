//! Scheduler configuration, loadable from TOML.

use std::path::Path;
use std::sync::Arc;

use mplane_error::{SchedulerError, SchedulerResult};
use mplane_types::{RegistryProvider, CORE_REGISTRY_URI};
use serde::{Deserialize, Serialize};

/// Component runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Results retained per repeated job; zero keeps all of them
    pub max_results: usize,

    /// Base registry the component's statements refer to
    pub registry_uri: String,

    /// Registry documents to preload before initialization
    pub registry_files: Vec<String>,

    /// Default tracing filter, overridden by `RUST_LOG`
    pub log_level: String,

    /// Emit logs as JSON lines
    pub json_logs: bool,

    /// Completed jobs older than this are dropped by `prune_jobs`
    pub job_retention_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_results: 0,
            registry_uri: CORE_REGISTRY_URI.to_string(),
            registry_files: Vec::new(),
            log_level: "info".to_string(),
            json_logs: false,
            job_retention_secs: 3600,
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(content: &str) -> SchedulerResult<Self> {
        toml::from_str(content).map_err(|e| SchedulerError::config(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> SchedulerResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SchedulerError::config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> SchedulerResult<String> {
        toml::to_string_pretty(self).map_err(|e| SchedulerError::config(e.to_string()))
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_registry_uri(mut self, uri: impl Into<String>) -> Self {
        self.registry_uri = uri.into();
        self
    }

    pub fn with_registry_file(mut self, path: impl Into<String>) -> Self {
        self.registry_files.push(path.into());
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    pub fn with_job_retention_secs(mut self, secs: u64) -> Self {
        self.job_retention_secs = secs;
        self
    }

    /// Build a registry provider: preload the configured files, then
    /// initialize from `registry_uri`.
    pub fn registry_provider(&self) -> SchedulerResult<Arc<RegistryProvider>> {
        let provider = RegistryProvider::new();
        for file in &self.registry_files {
            provider.preload_file(file)?;
        }
        provider.initialize(&self.registry_uri)?;
        Ok(Arc::new(provider))
    }
}
