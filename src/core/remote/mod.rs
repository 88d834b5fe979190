//! Host compositor connection.
//!
//! The kiosk is itself a client of the host compositor. This module owns
//! that connection: the event queue, the globals bound from the host
//! registry, the nested output window, and every host proxy the bridges
//! refer to by handle. Host events are not acted upon during dispatch;
//! they are queued as [`RemoteEvent`]s and drained by the compositor after
//! each dispatch cycle.

use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::os::unix::io::{AsFd, BorrowedFd, OwnedFd};

use wayland_client::{
    backend::WaylandError,
    protocol::{
        wl_compositor::WlCompositor, wl_pointer::WlPointer, wl_seat::WlSeat, wl_shm::WlShm,
    },
    Connection, EventQueue, Proxy, QueueHandle,
};
use wayland_protocols::wp::pointer_constraints::zv1::client::{
    zwp_confined_pointer_v1::ZwpConfinedPointerV1,
    zwp_locked_pointer_v1::ZwpLockedPointerV1,
    zwp_pointer_constraints_v1::{self, ZwpPointerConstraintsV1},
};
use wayland_protocols::xdg::shell::client::xdg_wm_base::XdgWmBase;
use wayland_protocols_wlr::data_control::v1::client::{
    zwlr_data_control_device_v1::ZwlrDataControlDeviceV1,
    zwlr_data_control_manager_v1::ZwlrDataControlManagerV1,
    zwlr_data_control_offer_v1::ZwlrDataControlOfferV1,
    zwlr_data_control_source_v1::ZwlrDataControlSourceV1,
};

use crate::core::bridge::{
    ClipboardEvent, ClipboardHost, ConstraintEvent, ConstraintHost, ConstraintLifetime,
    HostConstraintId, HostSurfaceId, OfferId, SourceId,
};
use crate::core::errors::RemoteError;
use crate::util::logging::REMOTE;

mod dispatch;
pub mod window;

pub use window::NestedWindow;

/// Host events queued for the compositor.
#[derive(Debug)]
pub enum RemoteEvent {
    Clipboard(ClipboardEvent),
    Constraint(ConstraintEvent),
    /// Host pointer moved over the nested window (surface-local)
    PointerMotion { x: f64, y: f64 },
    /// The nested window was resized by the host
    Resized { width: u32, height: u32 },
    /// The host presented a frame of the nested window
    Frame { time: u32 },
    /// The host asked the nested window to close
    Close,
}

/// Globals bound from the host registry.
#[derive(Debug, Default)]
pub struct HostGlobals {
    pub compositor: Option<WlCompositor>,
    pub shm: Option<WlShm>,
    pub wm_base: Option<XdgWmBase>,
    pub seat: Option<WlSeat>,
    pub data_control: Option<ZwlrDataControlManagerV1>,
    pub pointer_constraints: Option<ZwpPointerConstraintsV1>,
}

/// Dispatch state of the host event queue.
#[derive(Debug, Default)]
pub struct RemoteState {
    pub(crate) globals: HostGlobals,
    pub(crate) pointer: Option<WlPointer>,
    /// Host pointer is over the nested window
    pub(crate) pointer_focus: bool,
    pub(crate) device: Option<ZwlrDataControlDeviceV1>,
    pub(crate) offers: HashMap<OfferId, ZwlrDataControlOfferV1>,
    pub(crate) sources: HashMap<SourceId, ZwlrDataControlSourceV1>,
    pub(crate) locks: HashMap<HostConstraintId, ZwpLockedPointerV1>,
    pub(crate) confines: HashMap<HostConstraintId, ZwpConfinedPointerV1>,
    pub(crate) window: Option<NestedWindow>,
    pub(crate) pending: VecDeque<RemoteEvent>,
}

/// Connection to the host compositor.
pub struct RemoteDisplay {
    conn: Connection,
    queue: EventQueue<RemoteState>,
    qh: QueueHandle<RemoteState>,
    state: RemoteState,
}

impl RemoteDisplay {
    /// Connect using `WAYLAND_DISPLAY`/`WAYLAND_SOCKET` and bind the host globals.
    pub fn connect() -> Result<Self, RemoteError> {
        let conn = Connection::connect_to_env()?;
        let mut queue = conn.new_event_queue();
        let qh = queue.handle();

        conn.display().get_registry(&qh, ());

        let mut state = RemoteState::default();
        // First roundtrip binds globals, second one collects seat capabilities
        queue.roundtrip(&mut state)?;
        queue.roundtrip(&mut state)?;

        if state.globals.compositor.is_none() {
            return Err(RemoteError::MissingGlobal("wl_compositor"));
        }
        if state.globals.shm.is_none() {
            return Err(RemoteError::MissingGlobal("wl_shm"));
        }
        if state.globals.wm_base.is_none() {
            return Err(RemoteError::MissingGlobal("xdg_wm_base"));
        }

        tracing::info!(
            target: REMOTE,
            "Connected to host (data control: {}, pointer constraints: {}, pointer: {})",
            state.globals.data_control.is_some(),
            state.globals.pointer_constraints.is_some(),
            state.pointer.is_some()
        );

        Ok(Self { conn, queue, qh, state })
    }

    /// Map the nested output window and wait for its first configure.
    pub fn create_window(&mut self, title: &str, width: u32, height: u32) -> Result<HostSurfaceId, RemoteError> {
        let (Some(compositor), Some(wm_base)) = (&self.state.globals.compositor, &self.state.globals.wm_base) else {
            return Err(RemoteError::MissingGlobal("xdg_wm_base"));
        };

        let surface = compositor.create_surface(&self.qh, ());
        let xdg_surface = wm_base.get_xdg_surface(&surface, &self.qh, ());
        let toplevel = xdg_surface.get_toplevel(&self.qh, ());
        toplevel.set_title(title.to_string());
        toplevel.set_app_id("kiosk-bridge".to_string());
        surface.commit();

        let window = NestedWindow::new(surface, xdg_surface, toplevel, width, height);
        let id = window.host_surface();
        self.state.window = Some(window);

        self.queue.roundtrip(&mut self.state)?;
        tracing::info!(target: REMOTE, "Nested output window {:?} mapped", id);
        Ok(id)
    }

    pub fn host_surface(&self) -> Option<HostSurfaceId> {
        self.state.window.as_ref().map(NestedWindow::host_surface)
    }

    pub fn window_size(&self) -> Option<(u32, u32)> {
        self.state.window.as_ref().map(NestedWindow::size)
    }

    /// Duplicate of the connection fd, for registering with the event loop.
    pub fn poll_fd(&self) -> std::io::Result<OwnedFd> {
        self.conn.backend().poll_fd().as_fd().try_clone_to_owned()
    }

    /// Read whatever the socket holds and dispatch it into the event queue.
    pub fn dispatch(&mut self) -> Result<usize, RemoteError> {
        if let Some(guard) = self.queue.prepare_read() {
            match guard.read() {
                Ok(_) => {}
                Err(WaylandError::Io(e)) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.queue.dispatch_pending(&mut self.state)?)
    }

    pub fn flush(&mut self) -> Result<(), RemoteError> {
        match self.queue.flush() {
            Ok(()) => Ok(()),
            Err(WaylandError::Io(e)) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn flush_logged(&mut self) {
        if let Err(e) = self.flush() {
            tracing::error!(target: REMOTE, "Failed to flush host connection: {}", e);
        }
    }

    /// Take every queued host event.
    pub fn take_events(&mut self) -> Vec<RemoteEvent> {
        self.state.pending.drain(..).collect()
    }

    /// Request one host frame callback on the nested window.
    pub fn request_frame(&mut self) {
        if let Some(window) = self.state.window.as_mut() {
            window.request_frame(&self.qh);
        }
    }

    /// Destroy the nested window and drop every host proxy still held.
    pub fn shutdown(&mut self) {
        for (_, lock) in self.state.locks.drain() {
            lock.destroy();
        }
        for (_, confine) in self.state.confines.drain() {
            confine.destroy();
        }
        if let Some(window) = self.state.window.take() {
            window.destroy();
        }
        self.flush_logged();
    }

    fn window_surface(&self, surface: HostSurfaceId) -> Option<&wayland_client::protocol::wl_surface::WlSurface> {
        self.state
            .window
            .as_ref()
            .filter(|w| w.host_surface() == surface)
            .map(|w| &w.surface)
    }
}

// ============================================================================
// Clipboard
// ============================================================================

impl ClipboardHost for RemoteDisplay {
    fn supports_data_control(&self) -> bool {
        self.state.globals.data_control.is_some()
    }

    fn open_data_device(&mut self) -> bool {
        let (Some(manager), Some(seat)) = (&self.state.globals.data_control, &self.state.globals.seat) else {
            return false;
        };
        self.state.device = Some(manager.get_data_device(seat, &self.qh, ()));
        true
    }

    fn close_data_device(&mut self) {
        if let Some(device) = self.state.device.take() {
            device.destroy();
        }
    }

    fn create_source(&mut self) -> Option<SourceId> {
        let manager = self.state.globals.data_control.as_ref()?;
        let source = manager.create_data_source(&self.qh, ());
        let id = SourceId(source.id().protocol_id());
        self.state.sources.insert(id, source);
        Some(id)
    }

    fn offer(&mut self, source: SourceId, mime_type: &str) {
        if let Some(source) = self.state.sources.get(&source) {
            source.offer(mime_type.to_string());
        }
    }

    fn set_selection(&mut self, source: SourceId) {
        match (&self.state.device, self.state.sources.get(&source)) {
            (Some(device), Some(source)) => device.set_selection(Some(source)),
            _ => tracing::debug!(target: REMOTE, "set_selection on unknown source {:?}", source),
        }
    }

    fn destroy_source(&mut self, source: SourceId) {
        if let Some(source) = self.state.sources.remove(&source) {
            source.destroy();
        }
    }

    fn receive(&mut self, offer: OfferId, mime_type: &str, fd: BorrowedFd<'_>) {
        match self.state.offers.get(&offer) {
            Some(offer) => offer.receive(mime_type.to_string(), fd),
            None => tracing::debug!(target: REMOTE, "receive on unknown offer {:?}", offer),
        }
    }

    fn destroy_offer(&mut self, offer: OfferId) {
        if let Some(offer) = self.state.offers.remove(&offer) {
            offer.destroy();
        }
    }

    fn flush(&mut self) {
        self.flush_logged();
    }

    fn take_queued(&mut self) -> Vec<ClipboardEvent> {
        take_clipboard_events(&mut self.state.pending)
    }

    fn roundtrip(&mut self) -> Vec<ClipboardEvent> {
        if let Err(e) = self.queue.roundtrip(&mut self.state) {
            tracing::error!(target: REMOTE, "Host roundtrip failed: {}", e);
        }
        take_clipboard_events(&mut self.state.pending)
    }
}

/// Split the clipboard events out of `pending`.
///
/// Both the returned events and the ones left behind keep their arrival
/// order.
fn take_clipboard_events(pending: &mut VecDeque<RemoteEvent>) -> Vec<ClipboardEvent> {
    let mut clipboard = Vec::new();
    let mut rest = VecDeque::with_capacity(pending.len());
    for event in pending.drain(..) {
        match event {
            RemoteEvent::Clipboard(event) => clipboard.push(event),
            other => rest.push_back(other),
        }
    }
    *pending = rest;
    clipboard
}

// ============================================================================
// Pointer constraints
// ============================================================================

fn host_lifetime(lifetime: ConstraintLifetime) -> zwp_pointer_constraints_v1::Lifetime {
    match lifetime {
        ConstraintLifetime::Oneshot => zwp_pointer_constraints_v1::Lifetime::Oneshot,
        ConstraintLifetime::Persistent => zwp_pointer_constraints_v1::Lifetime::Persistent,
    }
}

impl ConstraintHost for RemoteDisplay {
    fn supports_pointer_constraints(&self) -> bool {
        self.state.globals.pointer_constraints.is_some()
    }

    fn has_pointer(&self) -> bool {
        self.state.pointer.is_some()
    }

    fn lock_pointer(&mut self, surface: HostSurfaceId, lifetime: ConstraintLifetime) -> Option<HostConstraintId> {
        let manager = self.state.globals.pointer_constraints.as_ref()?;
        let pointer = self.state.pointer.as_ref()?;
        let surface = self.window_surface(surface)?;

        let lock = manager.lock_pointer(surface, pointer, None, host_lifetime(lifetime), &self.qh, ());
        let id = HostConstraintId(lock.id().protocol_id());
        self.state.locks.insert(id, lock);
        Some(id)
    }

    fn confine_pointer(&mut self, surface: HostSurfaceId, lifetime: ConstraintLifetime) -> Option<HostConstraintId> {
        let manager = self.state.globals.pointer_constraints.as_ref()?;
        let pointer = self.state.pointer.as_ref()?;
        let surface = self.window_surface(surface)?;

        let confine = manager.confine_pointer(surface, pointer, None, host_lifetime(lifetime), &self.qh, ());
        let id = HostConstraintId(confine.id().protocol_id());
        self.state.confines.insert(id, confine);
        Some(id)
    }

    fn set_cursor_position_hint(&mut self, constraint: HostConstraintId, x: f64, y: f64) {
        if let Some(lock) = self.state.locks.get(&constraint) {
            lock.set_cursor_position_hint(x, y);
        }
    }

    fn destroy_constraint(&mut self, constraint: HostConstraintId) {
        if let Some(lock) = self.state.locks.remove(&constraint) {
            lock.destroy();
        } else if let Some(confine) = self.state.confines.remove(&constraint) {
            confine.destroy();
        }
    }

    fn flush(&mut self) {
        self.flush_logged();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clipboard_events_leave_queue_in_order() {
        let mut pending = VecDeque::from(vec![
            RemoteEvent::Clipboard(ClipboardEvent::DataOffer { offer: OfferId(1) }),
            RemoteEvent::PointerMotion { x: 1.0, y: 2.0 },
            RemoteEvent::Clipboard(ClipboardEvent::Selection { offer: Some(OfferId(1)) }),
            RemoteEvent::Resized { width: 800, height: 600 },
            RemoteEvent::Clipboard(ClipboardEvent::DataOffer { offer: OfferId(2) }),
        ]);

        let clipboard = take_clipboard_events(&mut pending);
        assert_eq!(clipboard.len(), 3);
        assert!(matches!(clipboard[0], ClipboardEvent::DataOffer { offer: OfferId(1) }));
        assert!(matches!(clipboard[1], ClipboardEvent::Selection { offer: Some(OfferId(1)) }));
        assert!(matches!(clipboard[2], ClipboardEvent::DataOffer { offer: OfferId(2) }));

        assert_eq!(pending.len(), 2);
        assert!(matches!(pending[0], RemoteEvent::PointerMotion { .. }));
        assert!(matches!(pending[1], RemoteEvent::Resized { width: 800, height: 600 }));
    }

    #[test]
    fn test_events_queued_before_a_sync_are_returned_too() {
        // A selection dispatched before the roundtrip started must not be
        // left behind for the main loop
        let mut pending = VecDeque::from(vec![
            RemoteEvent::Clipboard(ClipboardEvent::Selection { offer: Some(OfferId(4)) }),
            RemoteEvent::Frame { time: 16 },
        ]);
        pending.push_back(RemoteEvent::Clipboard(ClipboardEvent::Selection { offer: Some(OfferId(5)) }));

        let clipboard = take_clipboard_events(&mut pending);
        assert!(matches!(clipboard[0], ClipboardEvent::Selection { offer: Some(OfferId(4)) }));
        assert!(matches!(clipboard[1], ClipboardEvent::Selection { offer: Some(OfferId(5)) }));
        assert_eq!(pending.len(), 1);
        assert!(take_clipboard_events(&mut pending).is_empty());
    }
}
