//! Scale commands - change the desired replica count.

use anyhow::Result;
use clap::Args;

use crate::client::{ScaleRequest, ScaleResponse};
use crate::output::{print_single, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Clone, Copy)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn path(self) -> &'static str {
        match self {
            Direction::Up => "/scale-up",
            Direction::Down => "/scale-down",
        }
    }
}

/// Scale command - apply a delta to the desired replica count.
#[derive(Debug, Args)]
pub struct ScaleCommand {
    /// Number of replicas to add or remove.
    count: u32,
}

impl ScaleCommand {
    pub async fn run(self, ctx: CommandContext, direction: Direction) -> Result<()> {
        let response: ScaleResponse = ctx
            .client
            .post(direction.path(), &ScaleRequest { count: self.count })
            .await?;

        match ctx.format {
            OutputFormat::Json => print_single(&response, ctx.format),
            OutputFormat::Table => print_success(&format!(
                "{}. Desired replicas: {}",
                response.message, response.desired_replica_count
            )),
        }

        Ok(())
    }
}
