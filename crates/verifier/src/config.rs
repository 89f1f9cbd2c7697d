//! Agent configuration

use anyhow::Result;
use serde::Deserialize;
use tracing::warn;
use verifier_lib::topology::DEFAULT_THREADS_PER_CORE;
use verifier_lib::DEFAULT_ALLOCATION_ANNOTATION;

/// Agent configuration, read from `VERIFIER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct VerifierConfig {
    /// Node name from Kubernetes downward API
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Over-quota ratio the node is configured with
    #[serde(default = "default_over_quota_ratio")]
    pub over_quota_ratio: f64,

    /// Hyperthreads per physical core
    #[serde(default = "default_threads_per_core")]
    pub threads_per_core: u32,

    /// Physical core count override; derived from node capacity when unset
    #[serde(default)]
    pub physical_cores: Option<u32>,

    /// Pod annotation carrying the allocation spec
    #[serde(default = "default_allocation_annotation")]
    pub allocation_annotation: String,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_over_quota_ratio() -> f64 {
    1.0
}

fn default_threads_per_core() -> u32 {
    DEFAULT_THREADS_PER_CORE
}

fn default_allocation_annotation() -> String {
    DEFAULT_ALLOCATION_ANNOTATION.to_string()
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            over_quota_ratio: default_over_quota_ratio(),
            threads_per_core: default_threads_per_core(),
            physical_cores: None,
            allocation_annotation: default_allocation_annotation(),
        }
    }
}

impl VerifierConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("VERIFIER").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|err| {
            warn!(error = %err, "Invalid verifier configuration, using defaults");
            VerifierConfig::default()
        }))
    }
}
