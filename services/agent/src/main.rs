//! Fleet agent
//!
//! Connects to the controller, runs payload instances on command and
//! reports their state.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use fleet_agent::{
    config::{Args, Config},
    Agent, ProcessRuntime,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_args(Args::parse())?;

    // Initialize tracing (prefer RUST_LOG, fallback to --log-level)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        agent_id = %config.agent_id,
        controller_url = %config.controller_url,
        payload = ?config.payload,
        "Configuration loaded"
    );

    let runtime = Arc::new(ProcessRuntime::new(config.payload.clone())?);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let agent = Agent::new(config, runtime);
    let mut agent_handle = tokio::spawn(agent.run(shutdown_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut agent_handle => {
            if let Err(e) = result {
                error!(error = %e, "Agent task panicked");
            }
            return Ok(());
        }
    }

    let _ = shutdown_tx.send(true);

    let shutdown_timeout = std::time::Duration::from_secs(10);
    if let Err(e) = tokio::time::timeout(shutdown_timeout, agent_handle).await {
        warn!(error = %e, "Agent did not shut down in time");
    }

    info!("Agent shutdown complete");
    Ok(())
}
