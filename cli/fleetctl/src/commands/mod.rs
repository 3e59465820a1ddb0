//! CLI commands.

mod scale;
mod status;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::client::ApiClient;
use crate::output::OutputFormat;

/// fleetctl - inspect and scale a fleet.
#[derive(Debug, Parser)]
#[command(name = "fleetctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Controller admin API URL.
    #[arg(
        long,
        global = true,
        env = "FLEET_API_URL",
        default_value = "http://127.0.0.1:3000"
    )]
    url: String,

    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show agents, services and the desired replica count.
    Status(status::StatusCommand),

    /// Increase the desired replica count.
    ScaleUp(scale::ScaleCommand),

    /// Decrease the desired replica count (clamped at zero).
    ScaleDown(scale::ScaleCommand),
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let format = match self.format.as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Table,
        };

        let ctx = CommandContext {
            client: ApiClient::new(&self.url)?,
            format,
        };

        match self.command {
            Commands::Status(cmd) => cmd.run(ctx).await,
            Commands::ScaleUp(cmd) => cmd.run(ctx, scale::Direction::Up).await,
            Commands::ScaleDown(cmd) => cmd.run(ctx, scale::Direction::Down).await,
        }
    }
}

/// Context passed to every command.
pub struct CommandContext {
    pub client: ApiClient,
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scale_up() {
        let cli = Cli::try_parse_from(["fleetctl", "scale-up", "2"]).unwrap();
        assert!(matches!(cli.command, Commands::ScaleUp(_)));
        assert_eq!(cli.url, "http://127.0.0.1:3000");
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "fleetctl",
            "status",
            "--format",
            "json",
            "--url",
            "http://ctl:3000",
        ])
        .unwrap();
        assert_eq!(cli.format, "json");
        assert_eq!(cli.url, "http://ctl:3000");
    }

    #[test]
    fn test_negative_count_rejected() {
        assert!(Cli::try_parse_from(["fleetctl", "scale-down", "-1"]).is_err());
    }
}
