//! wl_seat protocol implementation.
//!
//! The kiosk seat only has a pointer. Its position mirrors the host pointer
//! over the nested window and is what the control channel reports.

use std::collections::HashMap;

use wayland_server::{
    protocol::{wl_data_device::WlDataDevice, wl_data_source::WlDataSource, wl_pointer, wl_seat},
    Dispatch, DisplayHandle, GlobalDispatch, Resource,
};

use crate::core::bridge::{GuestSourceId, HostSelection};
use crate::core::state::CompositorState;
use crate::util::logging::SEAT;

/// Seat global data
pub struct SeatGlobal {
    pub name: String,
}

impl Default for SeatGlobal {
    fn default() -> Self {
        Self {
            name: "seat0".to_string(),
        }
    }
}

/// A guest `wl_data_source` and the MIME types it offered so far.
#[derive(Debug)]
pub struct GuestSource {
    pub resource: WlDataSource,
    pub mime_types: Vec<String>,
}

/// Current seat selection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum SeatSelection {
    #[default]
    None,
    /// Owned by a guest client
    Client(GuestSourceId),
    /// Mirrored from the host by the clipboard bridge
    Host(HostSelection),
}

/// Guest seat state.
#[derive(Debug)]
pub struct SeatState {
    pub(crate) dh: DisplayHandle,
    serial: u32,
    /// Pointer position in output coordinates
    pub cursor: (f64, f64),
    pub(crate) pointers: Vec<wl_pointer::WlPointer>,
    pub(crate) data_devices: Vec<WlDataDevice>,
    pub(crate) sources: HashMap<GuestSourceId, GuestSource>,
    pub(crate) next_source_id: u32,
    pub(crate) selection: SeatSelection,
}

impl SeatState {
    pub fn new(dh: DisplayHandle) -> Self {
        Self {
            dh,
            serial: 1,
            cursor: (0.0, 0.0),
            pointers: Vec::new(),
            data_devices: Vec::new(),
            sources: HashMap::new(),
            next_source_id: 1,
            selection: SeatSelection::None,
        }
    }

    pub(crate) fn bump_serial(&mut self) -> u32 {
        let serial = self.serial;
        self.serial = self.serial.wrapping_add(1);
        serial
    }

    /// Host pointer moved over the nested window.
    pub fn pointer_motion(&mut self, x: f64, y: f64) {
        self.cursor = (x, y);
        tracing::trace!(target: SEAT, "Cursor at ({:.1}, {:.1})", x, y);
    }

    pub fn cursor_position(&self) -> (f64, f64) {
        self.cursor
    }

    pub fn selection(&self) -> &SeatSelection {
        &self.selection
    }
}

// ============================================================================
// wl_seat
// ============================================================================

impl GlobalDispatch<wl_seat::WlSeat, SeatGlobal> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &wayland_server::Client,
        resource: wayland_server::New<wl_seat::WlSeat>,
        global_data: &SeatGlobal,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        let seat = data_init.init(resource, ());
        seat.capabilities(wl_seat::Capability::Pointer);
        if seat.version() >= 2 {
            seat.name(global_data.name.clone());
        }
        tracing::debug!(target: SEAT, "Bound wl_seat v{} with pointer capability", seat.version());
    }
}

impl Dispatch<wl_seat::WlSeat, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wl_seat::WlSeat,
        request: wl_seat::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        match request {
            wl_seat::Request::GetPointer { id } => {
                let pointer = data_init.init(id, ());
                state.seat.pointers.push(pointer);
            }
            wl_seat::Request::GetKeyboard { .. } | wl_seat::Request::GetTouch { .. } => {
                tracing::warn!(target: SEAT, "Client asked for a device the seat does not advertise");
            }
            _ => {}
        }
    }
}

// ============================================================================
// wl_pointer
// ============================================================================

impl Dispatch<wl_pointer::WlPointer, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wl_pointer::WlPointer,
        request: wl_pointer::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        if let wl_pointer::Request::SetCursor { surface, .. } = request {
            tracing::debug!(target: SEAT, "wl_pointer.set_cursor: surface={:?}", surface.map(|s| s.id()));
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: wayland_server::backend::ClientId,
        resource: &wl_pointer::WlPointer,
        _data: &(),
    ) {
        state.seat.pointers.retain(|p| p != resource);
    }
}

/// Register the wl_seat global
pub fn register_seat(dh: &DisplayHandle) -> wayland_server::backend::GlobalId {
    dh.create_global::<CompositorState, wl_seat::WlSeat, SeatGlobal>(7, SeatGlobal::default())
}
