//! Main entry point for the asic-fleet daemon.

use anyhow::Context;

use asic_fleet::{config::FleetConfig, daemon::Daemon, tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();

    let config = FleetConfig::from_env().context("invalid configuration")?;
    Daemon::new(config).run().await
}
