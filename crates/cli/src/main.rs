//! Command-line interface for the `mantis-mcp` application.
//!
//! This crate serves as the main entry point for the executable, delegating
//! its core functionality to the `mantis-server` crate.

fn main() -> anyhow::Result<()> {
    mantis_server::run()
}
