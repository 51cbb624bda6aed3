//! # synclog Agent
//!
//! Keeps a change log compact: on every interval it rebases the log when the
//! planner judges it worthwhile.

use anyhow::Result;
use synclog_agent::{Agent, AgentConfig};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting synclog agent");

    // Load configuration
    let config = AgentConfig::from_env()?;

    let replica_id = config
        .replica_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    tracing::info!(%replica_id, "Agent initialized");

    Agent::new(config, replica_id).run().await?;

    Ok(())
}
