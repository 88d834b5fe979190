use anyhow::{Context, Result};
use clap::Parser;

use kiosk_bridge::config::Config;
use kiosk_bridge::core::Compositor;
use kiosk_bridge::util::logging::{self, MAIN};

fn main() -> Result<()> {
    let config = Config::parse();
    logging::init();

    tracing::info!(target: MAIN, "Starting kiosk-bridge {}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(target: MAIN, "{:?}", config);

    let compositor = Compositor::new(&config).context("Failed to start compositor")?;
    compositor.run()?;

    tracing::info!(target: MAIN, "Exiting");
    Ok(())
}
