//! Fleet controller
//!
//! Accepts agent links over WebSocket, keeps the fleet registry, and drives
//! the number of running service instances toward the desired replica count.
//! An HTTP admin API exposes status and scaling.

use anyhow::Result;
use fleet_controller::{api, config, controller::ControllerActor, state::AppState, transport};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to FLEET_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting fleet controller");
    info!(
        listen_addr = %config.listen_addr,
        agent_listen_addr = %config.agent_listen_addr,
        desired = config.desired_replicas.get(),
        "Configuration loaded"
    );

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (controller, handle) =
        ControllerActor::new(config.desired_replicas, config.reconcile_interval);
    let controller_handle = tokio::spawn(controller.run(shutdown_rx.clone()));

    let state = AppState::new(handle);

    let agent_listener = tokio::net::TcpListener::bind(&config.agent_listen_addr).await?;
    info!(addr = %config.agent_listen_addr, "Listening for agents");
    let agent_server = tokio::spawn({
        let app = transport::create_router(state.clone());
        let shutdown_rx = shutdown_rx.clone();
        async move {
            axum::serve(agent_listener, app)
                .with_graceful_shutdown(wait_for_shutdown(shutdown_rx, "Agent server"))
                .await
        }
    });

    let api_listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for API requests");
    let api_server = tokio::spawn({
        let app = api::create_router(state);
        let shutdown_rx = shutdown_rx.clone();
        async move {
            axum::serve(api_listener, app)
                .with_graceful_shutdown(wait_for_shutdown(shutdown_rx, "HTTP server"))
                .await
        }
    });

    // Wait for shutdown signal (Ctrl+C)
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = agent_server => log_server_exit("Agent server", result),
        result = api_server => log_server_exit("HTTP server", result),
    }

    let _ = shutdown_tx.send(true);

    let shutdown_timeout = std::time::Duration::from_secs(10);
    if let Err(e) = tokio::time::timeout(shutdown_timeout, controller_handle).await {
        warn!(error = %e, "Controller did not shut down in time");
    }

    info!("Fleet controller shutdown complete");
    Ok(())
}

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>, name: &'static str) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }
    info!(server = name, "Server shutting down");
}

fn log_server_exit(
    name: &'static str,
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(())) => info!(server = name, "Server exited normally"),
        Ok(Err(e)) => error!(server = name, error = %e, "Server error"),
        Err(e) => error!(server = name, error = %e, "Server task panicked"),
    }
}
