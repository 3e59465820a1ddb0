use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use fleet_reconcile::{DesiredReplicas, DEFAULT_RECONCILE_INTERVAL};

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP admin surface.
    pub listen_addr: SocketAddr,
    /// WebSocket endpoint agents connect to.
    pub agent_listen_addr: SocketAddr,
    pub log_level: String,
    pub desired_replicas: DesiredReplicas,
    pub reconcile_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("FLEET_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .context("invalid FLEET_LISTEN_ADDR")?;

        let agent_listen_addr = std::env::var("FLEET_AGENT_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .context("invalid FLEET_AGENT_LISTEN_ADDR")?;

        let log_level = std::env::var("FLEET_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let desired_replicas = match std::env::var("FLEET_DESIRED_REPLICAS") {
            Ok(v) => DesiredReplicas::new(v.parse().context("invalid FLEET_DESIRED_REPLICAS")?),
            Err(_) => DesiredReplicas::new(3),
        };

        let reconcile_interval = match std::env::var("FLEET_RECONCILE_INTERVAL_SECS") {
            Ok(v) => {
                let secs: u64 = v.parse().context("invalid FLEET_RECONCILE_INTERVAL_SECS")?;
                anyhow::ensure!(secs > 0, "FLEET_RECONCILE_INTERVAL_SECS must be positive");
                Duration::from_secs(secs)
            }
            Err(_) => DEFAULT_RECONCILE_INTERVAL,
        };

        Ok(Self {
            listen_addr,
            agent_listen_addr,
            log_level,
            desired_replicas,
            reconcile_interval,
        })
    }
}
