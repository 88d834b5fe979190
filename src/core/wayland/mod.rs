//! Wayland protocol implementations served to guest clients.
//!
//! Protocols are registered in [`register`], called once at startup.

pub mod compositor;
pub mod data_device;
pub mod output;
pub mod pointer_constraints;
pub mod seat;

use wayland_server::DisplayHandle;

use crate::config::Config;
use crate::core::bridge::ConstraintHost;
use crate::core::state::CompositorState;
use crate::util::logging::COMPOSITOR;

/// Create the guest globals.
///
/// `zwp_pointer_constraints_v1` is only advertised when the host can back
/// it and it was not disabled on the command line.
pub fn register(state: &mut CompositorState, dh: &DisplayHandle, config: &Config) {
    compositor::register_compositor(dh);
    seat::register_seat(dh);
    data_device::register_data_device_manager(dh);

    let outputs: Vec<u32> = state.outputs.ids().collect();
    for id in outputs {
        output::register_output(&mut state.outputs, dh, id);
    }

    if config.no_pointer_constraints {
        crate::wlog!(COMPOSITOR, "Pointer constraints disabled");
    } else if !state.remote.supports_pointer_constraints() {
        tracing::warn!(target: COMPOSITOR, "Host lacks zwp_pointer_constraints_v1, not advertising it");
    } else {
        pointer_constraints::register_pointer_constraints(dh);
    }
}
