//! Cpuset Verifier - per-node CPU-topology allocation verifier
//!
//! This binary runs as a DaemonSet on each Kubernetes node and serves
//! placement/over-quota checks and node audits over HTTP.

use anyhow::Result;
use cpuset_verifier::{api, config::VerifierConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use verifier_lib::{AuditOptions, KubeInventory, NodeInventory, StructuredLogger, VerifierMetrics};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting cpuset-verifier");

    let config = VerifierConfig::load()?;
    info!(
        node_name = %config.node_name,
        over_quota_ratio = config.over_quota_ratio,
        "Verifier configured"
    );

    let metrics = VerifierMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(AGENT_VERSION, config.over_quota_ratio);

    // Checker endpoints keep working without a cluster connection.
    let inventory: Option<Arc<dyn NodeInventory>> =
        match KubeInventory::try_default(config.allocation_annotation.clone()).await {
            Ok(inventory) => Some(Arc::new(inventory)),
            Err(err) => {
                warn!(error = %err, "Kubernetes client unavailable, node endpoints disabled");
                metrics.inc_inventory_errors();
                None
            }
        };

    let audit_defaults = AuditOptions {
        physical_core_count: config.physical_cores,
        over_quota_ratio: config.over_quota_ratio,
        skip_strategy: false,
        threads_per_core: config.threads_per_core,
    };

    let app_state = Arc::new(api::AppState::new(
        inventory,
        metrics,
        logger.clone(),
        audit_defaults,
    ));

    tokio::select! {
        result = api::serve(config.api_port, app_state) => {
            result?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
