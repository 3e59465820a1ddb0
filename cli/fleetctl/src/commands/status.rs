//! Status command - show agents, services and the desired count.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{FleetStatus, ServiceInfo};
use crate::output::{print_output, print_single, OutputFormat};

use super::CommandContext;

/// Status command - show the fleet as the controller sees it.
#[derive(Debug, Args)]
pub struct StatusCommand {}

#[derive(Debug, serde::Serialize, Tabled)]
struct AgentRow {
    #[tabled(rename = "Agent")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Load")]
    load: usize,
}

#[derive(Debug, serde::Serialize, Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    id: String,
    #[tabled(rename = "Agent")]
    agent_id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Started")]
    start_time: String,
}

impl StatusCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let status: FleetStatus = ctx.client.get("/status").await?;

        match ctx.format {
            OutputFormat::Json => print_single(&status, ctx.format),
            OutputFormat::Table => {
                let running = status.services.len();
                let desired = status.desired_replica_count;
                let summary = format!("{running}/{desired} running");
                let summary = if running as u64 == u64::from(desired) {
                    summary.green()
                } else {
                    summary.yellow()
                };
                println!("{} {}", "Replicas:".bold(), summary);

                println!("\n{}", "Agents".bold());
                print_output(&agent_rows(&status), ctx.format);

                println!("\n{}", "Services".bold());
                print_output(&service_rows(&status), ctx.format);
            }
        }

        Ok(())
    }
}

fn agent_rows(status: &FleetStatus) -> Vec<AgentRow> {
    status
        .agents
        .iter()
        .map(|agent| AgentRow {
            id: agent.id.clone(),
            status: agent.status.clone(),
            load: agent.load,
        })
        .collect()
}

fn service_rows(status: &FleetStatus) -> Vec<ServiceRow> {
    status
        .services
        .iter()
        .map(|(id, ServiceInfo { agent_id, status, start_time })| ServiceRow {
            id: id.clone(),
            agent_id: agent_id.clone(),
            status: status.clone(),
            start_time: start_time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect()
}
