//! Command line configuration.

use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "kiosk-bridge", about = "Nested Wayland kiosk with host clipboard and pointer constraint bridging")]
pub struct Config {
    /// Guest Wayland socket name (default: first free wayland-N)
    #[arg(long)]
    pub socket: Option<String>,

    /// Forced refresh period in milliseconds
    #[arg(long, default_value_t = 16, value_parser = clap::value_parser!(u64).range(1..))]
    pub forced_refresh_ms: u64,

    /// Do not mirror the clipboard with the host
    #[arg(long)]
    pub no_clipboard: bool,

    /// Do not offer pointer constraints to guest clients
    #[arg(long)]
    pub no_pointer_constraints: bool,

    /// Nested window width until the host configures it
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Nested window height until the host configures it
    #[arg(long, default_value_t = 720)]
    pub height: u32,
}

impl Config {
    pub fn forced_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.forced_refresh_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket: None,
            forced_refresh_ms: 16,
            no_clipboard: false,
            no_pointer_constraints: false,
            width: 1280,
            height: 720,
        }
    }
}
