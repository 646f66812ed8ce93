//! Core library for the `mantis-mcp` server.
//!
//! This crate wires a Mantis bug tracker into the model context protocol:
//! the [`handler`] module advertises and dispatches the tracker tools, the
//! [`compress`] module shrinks oversized issue listings, and [`run`] hosts
//! the whole thing over stdio. The `doctor` subcommand prints a
//! configuration and connectivity report for setup debugging.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use rmcp::service::serve_server;
use rmcp::transport;
use tokio::runtime::Runtime;

use mantis_state::MantisConfig;

pub mod compress;
pub mod doctor;
pub mod handler;

pub use handler::MantisService;

#[derive(Debug, Parser)]
#[command(
    name = "mantis-mcp",
    about = "MCP server exposing a Mantis bug tracker as callable tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run as MCP server over stdio
    Serve,
    /// Print a configuration and connectivity report
    Doctor,
}

pub fn run() -> Result<()> {
    // Logs go to stderr: stdout belongs to the MCP transport.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let config = MantisConfig::from_env()?;
            let service = MantisService::new(&config)?;
            tracing::info!(
                target: "mantis::startup",
                base_url = %config.base_url,
                cache_enabled = config.cache_enabled,
                "serving tracker tools over stdio"
            );
            let rt = Runtime::new()?;
            let running = rt.block_on(async {
                serve_server(service, transport::stdio())
                    .await
                    .map_err(|e| anyhow!("failed to start server: {e}"))
            })?;
            rt.block_on(async {
                running
                    .waiting()
                    .await
                    .map_err(|e| anyhow!("server task ended: {e}"))
            })?;
            Ok(())
        }
        Commands::Doctor => {
            let rt = Runtime::new()?;
            rt.block_on(doctor::doctor_report())
        }
    }
}
