//! Configuration for the agent.

use std::time::Duration;

use anyhow::{ensure, Result};
use clap::Parser;
use fleet_id::AgentId;
use fleet_proto::DEFAULT_REPORT_INTERVAL;

/// Fleet agent - runs service instances on command from the controller.
#[derive(Debug, Clone, Parser)]
#[command(name = "fleet-agent")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Agent identity. A random `agent-<n>` is used when omitted.
    #[arg(short, long, env = "FLEET_AGENT_ID")]
    pub id: Option<AgentId>,

    /// Controller WebSocket URL.
    #[arg(
        short,
        long,
        env = "FLEET_CONTROLLER_URL",
        default_value = "ws://localhost:8080"
    )]
    pub url: String,

    /// Payload command, split on whitespace into program and arguments.
    #[arg(long, env = "FLEET_PAYLOAD", default_value = "node payload-service.js")]
    pub payload: String,

    /// Seconds between full status reports.
    #[arg(long, env = "FLEET_REPORT_INTERVAL_SECS", default_value_t = DEFAULT_REPORT_INTERVAL.as_secs())]
    pub report_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "FLEET_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub agent_id: AgentId,

    /// Controller WebSocket URL.
    pub controller_url: String,

    /// Payload program followed by its arguments.
    pub payload: Vec<String>,

    pub report_interval: Duration,

    pub log_level: String,
}

impl Config {
    /// Resolve parsed arguments into a configuration.
    pub fn from_args(args: Args) -> Result<Self> {
        let payload: Vec<String> = args.payload.split_whitespace().map(String::from).collect();
        ensure!(!payload.is_empty(), "payload command must not be empty");
        ensure!(
            args.report_interval_secs > 0,
            "report interval must be positive"
        );

        Ok(Self {
            agent_id: args.id.unwrap_or_else(AgentId::fallback),
            controller_url: args.url,
            payload,
            report_interval: Duration::from_secs(args.report_interval_secs),
            log_level: args.log_level,
        })
    }

    /// Configuration for connecting `agent_id` to `controller_url` with
    /// default settings.
    pub fn new(agent_id: AgentId, controller_url: impl Into<String>) -> Self {
        Self {
            agent_id,
            controller_url: controller_url.into(),
            payload: vec!["node".to_string(), "payload-service.js".to_string()],
            report_interval: DEFAULT_REPORT_INTERVAL,
            log_level: "info".to_string(),
        }
    }
}
