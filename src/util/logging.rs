//! Logging setup and per-area targets.
//!
//! Every line follows the `YYYY-MM-DD HH:MM:SS LEVEL target: message`
//! layout. Targets live under the crate name so the default
//! `kiosk_bridge=debug` directive covers them.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,kiosk_bridge=debug";

/// Log lifecycle messages under one of the area targets below.
#[macro_export]
macro_rules! wlog {
    ($module:expr, $($arg:tt)*) => {{
        tracing::info!(target: $module, $($arg)*);
    }};
}

/// Standardized area targets
pub const MAIN: &str = "kiosk_bridge::main";
pub const COMPOSITOR: &str = "kiosk_bridge::compositor";
pub const SEAT: &str = "kiosk_bridge::seat";
pub const CLIPBOARD: &str = "kiosk_bridge::clipboard";
pub const CONSTRAINTS: &str = "kiosk_bridge::constraints";
pub const IPC: &str = "kiosk_bridge::ipc";
pub const REMOTE: &str = "kiosk_bridge::remote";

/// Install the global subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(
            "%Y-%m-%d %H:%M:%S".to_string(),
        ))
        .with_ansi(false)
        .with_env_filter(filter)
        .try_init();
}
