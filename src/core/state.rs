//! Global compositor state.
//!
//! `CompositorState` is the dispatch state of the guest display. It owns the
//! host connection and both bridges, so every guest request handler can
//! reach the other domain through plain field borrows.

use std::time::Instant;

use wayland_server::backend::{ClientData, ClientId, DisconnectReason};
use wayland_server::DisplayHandle;

use crate::config::Config;
use crate::core::bridge::{
    Admission, ClipboardBridge, ClipboardHost, ConstraintKind, GuestSeat, GuestSelection, GuestSourceId,
    PointerConstraintBridge,
};
use crate::core::ipc::ControlHandler;
use crate::core::remote::{RemoteDisplay, RemoteEvent};
use crate::core::wayland::compositor::SurfaceRegistry;
use crate::core::wayland::output::OutputRegistry;
use crate::core::wayland::pointer_constraints::ConstraintResource;
use crate::core::wayland::seat::SeatState;
use crate::util::logging::{CLIPBOARD, COMPOSITOR, CONSTRAINTS, IPC};

// ============================================================================
// Client Data
// ============================================================================

/// Per-client data stored with each guest connection
#[derive(Debug, Default)]
pub struct ClientState;

impl ClientData for ClientState {
    fn initialized(&self, client_id: ClientId) {
        tracing::info!(target: COMPOSITOR, "Client {:?} connected", client_id);
    }

    fn disconnected(&self, client_id: ClientId, reason: DisconnectReason) {
        let reason = match reason {
            DisconnectReason::ConnectionClosed => "connection closed",
            DisconnectReason::ProtocolError(_) => "protocol error",
        };
        tracing::info!(target: COMPOSITOR, "Client {:?} disconnected: {}", client_id, reason);
    }
}

// ============================================================================
// Compositor State
// ============================================================================

pub struct CompositorState {
    /// Host connection
    pub remote: RemoteDisplay,
    pub seat: SeatState,
    pub outputs: OutputRegistry,
    pub surfaces: SurfaceRegistry,
    /// `None` when the host has no data-control support, mirroring is
    /// disabled, or the host device went away
    pub clipboard: Option<ClipboardBridge>,
    pub constraints: PointerConstraintBridge<ConstraintResource>,
    /// Frame callbacks are completed on a timer instead of host frames
    pub force_refresh: bool,
    pub running: bool,
    start_time: Instant,
}

impl CompositorState {
    /// Build the state around an established host connection.
    ///
    /// The nested window becomes the single output; the clipboard bridge is
    /// opened unless disabled.
    pub fn new(mut remote: RemoteDisplay, dh: DisplayHandle, config: &Config) -> Self {
        let mut outputs = OutputRegistry::new();
        let (width, height) = remote.window_size().unwrap_or((config.width, config.height));
        outputs.add(width, height, remote.host_surface());

        let clipboard = if config.no_clipboard {
            tracing::info!(target: CLIPBOARD, "Clipboard mirroring disabled");
            None
        } else {
            ClipboardBridge::new(&mut remote)
        };

        Self {
            remote,
            seat: SeatState::new(dh),
            outputs,
            surfaces: SurfaceRegistry::default(),
            clipboard,
            constraints: PointerConstraintBridge::new(),
            force_refresh: false,
            running: true,
            start_time: Instant::now(),
        }
    }

    /// Milliseconds since startup, the clock of frame callbacks.
    pub fn time_ms(&self) -> u32 {
        self.start_time.elapsed().as_millis() as u32
    }

    // =========================================================================
    // Surfaces & frames
    // =========================================================================

    /// A guest surface is gone; constraints on it are released.
    pub fn handle_surface_destroyed(&mut self, surface: u32) {
        self.surfaces.remove(surface);
        self.constraints.handle_surface_destroyed(&mut self.remote, surface);
    }

    /// A surface committed frame callbacks.
    ///
    /// With forced refresh the timer completes them; otherwise the next host
    /// frame of the nested window does.
    pub fn schedule_frame(&mut self) {
        if !self.force_refresh {
            self.remote.request_frame();
        }
    }

    /// Complete every committed frame callback.
    pub fn send_frame_callbacks(&mut self) {
        let time = self.time_ms();
        let sent = self.surfaces.send_frame_callbacks(time);
        if sent > 0 {
            tracing::trace!(target: COMPOSITOR, "Completed {} frame callbacks at {}", sent, time);
        }
    }

    // =========================================================================
    // Pointer constraints
    // =========================================================================

    pub(crate) fn admit_constraint(&mut self, kind: ConstraintKind) -> Option<Admission> {
        match self.constraints.admit(&self.remote, &self.outputs) {
            Ok(admission) => Some(admission),
            Err(e) => {
                tracing::error!(target: CONSTRAINTS, "Refusing {:?} request: {}", kind, e);
                None
            }
        }
    }

    // =========================================================================
    // Host events
    // =========================================================================

    /// Drain queued host events into the bridges and the seat.
    pub fn handle_remote_events(&mut self) {
        for event in self.remote.take_events() {
            match event {
                RemoteEvent::Clipboard(event) => {
                    if let Some(clipboard) = self.clipboard.as_mut() {
                        clipboard.handle_host_event(&mut self.remote, &mut self.seat, event);
                    }
                }
                RemoteEvent::Constraint(event) => self.constraints.handle_host_event(event),
                RemoteEvent::PointerMotion { x, y } => self.seat.pointer_motion(x, y),
                RemoteEvent::Resized { width, height } => {
                    let ids: Vec<u32> = self.outputs.ids().collect();
                    for id in ids {
                        self.outputs.resize(id, width, height);
                    }
                }
                RemoteEvent::Frame { .. } => {
                    if !self.force_refresh {
                        self.send_frame_callbacks();
                    }
                }
                RemoteEvent::Close => {
                    tracing::debug!(target: COMPOSITOR, "Stopping on host close");
                    self.running = false;
                }
            }
        }
        self.reap_clipboard();
    }

    /// Tear down the clipboard bridge once the host device is gone.
    fn reap_clipboard(&mut self) {
        if self.clipboard.as_ref().is_some_and(ClipboardBridge::is_finished) {
            if let Some(clipboard) = self.clipboard.take() {
                clipboard.teardown(&mut self.remote, &mut self.seat);
            }
        }
    }

    /// Release every host object held by the bridges.
    pub fn shutdown(&mut self) {
        if let Some(clipboard) = self.clipboard.take() {
            clipboard.teardown(&mut self.remote, &mut self.seat);
        }
        self.constraints.teardown(&mut self.remote);
        self.remote.shutdown();
        tracing::info!(target: COMPOSITOR, "Compositor state shut down");
    }
}

/// Make `source` the guest seat selection and mirror it on the host.
///
/// Host clipboard events dispatched earlier in the same cycle are applied
/// first, the way they would have been had the host connection been
/// drained before the guest one. Returns `false` for an unknown source.
pub(crate) fn select_guest_source<H, S>(
    mut clipboard: Option<&mut ClipboardBridge>,
    host: &mut H,
    seat: &mut S,
    source: Option<GuestSourceId>,
) -> bool
where
    H: ClipboardHost,
    S: GuestSeat,
{
    if let Some(clipboard) = clipboard.as_deref_mut() {
        clipboard.apply_queued(host, seat);
    }

    if !seat.select_client_source(source) {
        return false;
    }

    let Some(clipboard) = clipboard else {
        return true;
    };
    let mime_types = source.and_then(|id| seat.client_mime_types(id));
    let selection = source
        .zip(mime_types.as_deref())
        .map(|(source, mime_types)| GuestSelection { source, mime_types });
    clipboard.handle_guest_selection(host, seat, selection);
    true
}

impl ControlHandler for CompositorState {
    fn cursor_position(&self) -> (f64, f64) {
        self.seat.cursor_position()
    }

    fn set_force_refresh(&mut self, enabled: bool) {
        if self.force_refresh != enabled {
            tracing::info!(target: IPC, "Forced refresh {}", if enabled { "enabled" } else { "disabled" });
        }
        self.force_refresh = enabled;
    }
}
