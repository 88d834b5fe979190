//! wl_data_device_manager and related protocols implementation
//!
//! Selection only; drag-and-drop requests are refused. The seat selection
//! is either a guest `wl_data_source` or a host selection installed by the
//! clipboard bridge. Every selection change is announced to all data
//! devices with a fresh `wl_data_offer`.

use std::os::unix::io::{AsFd, OwnedFd};

use wayland_server::{
    protocol::{
        wl_data_device::{self, WlDataDevice},
        wl_data_device_manager::{self, WlDataDeviceManager},
        wl_data_offer::{self, WlDataOffer},
        wl_data_source::{self, WlDataSource},
    },
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};

use crate::core::bridge::{GuestSeat, GuestSourceId, HostSelection, OfferId};
use crate::core::state::{select_guest_source, CompositorState};
use crate::core::wayland::seat::{GuestSource, SeatSelection, SeatState};
use crate::util::logging::SEAT;

/// Where the contents of a guest `wl_data_offer` come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOrigin {
    Client(GuestSourceId),
    Host(OfferId),
}

#[derive(Debug)]
pub struct DataOfferData {
    pub origin: OfferOrigin,
}

// ============================================================================
// Seat selection
// ============================================================================

impl SeatState {
    pub(crate) fn allocate_source_id(&mut self) -> GuestSourceId {
        let id = GuestSourceId(self.next_source_id);
        self.next_source_id = self.next_source_id.wrapping_add(1).max(1);
        id
    }

    pub(crate) fn add_source(&mut self, id: GuestSourceId, resource: WlDataSource) {
        self.sources.insert(
            id,
            GuestSource {
                resource,
                mime_types: Vec::new(),
            },
        );
    }

    pub fn source_mime_types(&self, id: GuestSourceId) -> Option<&[String]> {
        self.sources.get(&id).map(|s| s.mime_types.as_slice())
    }

    /// Install a guest source, or clear the selection.
    ///
    /// Returns `false` when `source` is unknown; nothing changes then.
    pub fn set_client_selection(&mut self, source: Option<GuestSourceId>) -> bool {
        if source.is_some_and(|id| !self.sources.contains_key(&id)) {
            return false;
        }

        let selection = match source {
            Some(id) => SeatSelection::Client(id),
            None => SeatSelection::None,
        };
        self.replace_selection(selection);
        true
    }

    /// Forget a destroyed guest source.
    ///
    /// Returns whether it was the seat selection; the selection is cleared
    /// and announced in that case.
    pub fn remove_source(&mut self, id: GuestSourceId) -> bool {
        self.sources.remove(&id);
        if self.selection != SeatSelection::Client(id) {
            return false;
        }
        self.selection = SeatSelection::None;
        self.broadcast_selection();
        true
    }

    pub fn add_data_device(&mut self, device: WlDataDevice) {
        self.offer_selection(&device);
        self.data_devices.push(device);
    }

    fn replace_selection(&mut self, selection: SeatSelection) {
        if let SeatSelection::Client(previous) = self.selection {
            if selection != SeatSelection::Client(previous) {
                if let Some(source) = self.sources.get(&previous) {
                    source.resource.cancelled();
                }
            }
        }
        self.selection = selection;
        self.broadcast_selection();
    }

    fn broadcast_selection(&mut self) {
        self.data_devices.retain(|d| d.is_alive());
        for device in &self.data_devices {
            self.offer_selection(device);
        }
    }

    /// Announce the current selection to one data device.
    fn offer_selection(&self, device: &WlDataDevice) {
        let (origin, mime_types) = match &self.selection {
            SeatSelection::None => {
                device.selection(None);
                return;
            }
            SeatSelection::Client(id) => match self.sources.get(id) {
                Some(source) => (OfferOrigin::Client(*id), source.mime_types.as_slice()),
                None => {
                    device.selection(None);
                    return;
                }
            },
            SeatSelection::Host(selection) => (OfferOrigin::Host(selection.offer), selection.mime_types.as_slice()),
        };

        let Some(client) = device.client() else {
            return;
        };
        let offer = match client.create_resource::<WlDataOffer, DataOfferData, CompositorState>(
            &self.dh,
            device.version(),
            DataOfferData { origin },
        ) {
            Ok(offer) => offer,
            Err(e) => {
                tracing::warn!(target: SEAT, "Failed to create wl_data_offer: {}", e);
                return;
            }
        };

        device.data_offer(&offer);
        for mime_type in mime_types {
            offer.offer(mime_type.clone());
        }
        device.selection(Some(&offer));
    }
}

impl GuestSeat for SeatState {
    fn next_serial(&mut self) -> u32 {
        self.bump_serial()
    }

    fn set_host_selection(&mut self, selection: Option<HostSelection>, serial: u32) {
        tracing::debug!(
            target: SEAT,
            "Host selection {:?} installed (serial {})",
            selection.as_ref().map(|s| s.offer),
            serial
        );
        let selection = match selection {
            Some(selection) => SeatSelection::Host(selection),
            None => SeatSelection::None,
        };
        self.replace_selection(selection);
    }

    fn send_client_selection(&mut self, source: GuestSourceId, mime_type: &str, fd: OwnedFd) {
        match self.sources.get(&source) {
            Some(source) => source.resource.send(mime_type.to_string(), fd.as_fd()),
            None => tracing::debug!(target: SEAT, "Send request for destroyed source {:?}", source),
        }
    }

    fn select_client_source(&mut self, source: Option<GuestSourceId>) -> bool {
        self.set_client_selection(source)
    }

    fn client_mime_types(&self, source: GuestSourceId) -> Option<Vec<String>> {
        self.source_mime_types(source).map(<[String]>::to_vec)
    }
}

// ============================================================================
// wl_data_device_manager implementation
// ============================================================================

impl GlobalDispatch<WlDataDeviceManager, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WlDataDeviceManager>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
    }
}

impl Dispatch<WlDataDeviceManager, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &WlDataDeviceManager,
        request: wl_data_device_manager::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_data_device_manager::Request::CreateDataSource { id } => {
                let source_id = state.seat.allocate_source_id();
                let source = data_init.init(id, source_id);
                state.seat.add_source(source_id, source);
                tracing::debug!(target: SEAT, "Created data source {:?}", source_id);
            }
            wl_data_device_manager::Request::GetDataDevice { id, .. } => {
                let device = data_init.init(id, ());
                state.seat.add_data_device(device);
            }
            _ => {}
        }
    }
}

// ============================================================================
// wl_data_source implementation
// ============================================================================

impl Dispatch<WlDataSource, GuestSourceId> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &WlDataSource,
        request: wl_data_source::Request,
        data: &GuestSourceId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_data_source::Request::Offer { mime_type } => {
                if let Some(source) = state.seat.sources.get_mut(data) {
                    tracing::debug!(target: SEAT, "{:?} offers {}", data, mime_type);
                    source.mime_types.push(mime_type);
                }
            }
            wl_data_source::Request::SetActions { .. } => {
                tracing::debug!(target: SEAT, "Ignoring DnD actions on {:?}", data);
            }
            _ => {}
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: wayland_server::backend::ClientId,
        _resource: &WlDataSource,
        data: &GuestSourceId,
    ) {
        state.handle_guest_source_destroyed(*data);
    }
}

// ============================================================================
// wl_data_device implementation
// ============================================================================

impl Dispatch<WlDataDevice, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WlDataDevice,
        request: wl_data_device::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_data_device::Request::StartDrag { .. } => {
                tracing::debug!(target: SEAT, "Drag-and-drop is not supported");
            }
            wl_data_device::Request::SetSelection { source, serial } => {
                let source = source.as_ref().and_then(|s| s.data::<GuestSourceId>().copied());
                tracing::debug!(target: SEAT, "Set selection {:?} (serial {})", source, serial);
                state.set_client_selection(source);
            }
            wl_data_device::Request::Release => {
                state.seat.data_devices.retain(|d| d != resource);
            }
            _ => {}
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: wayland_server::backend::ClientId,
        resource: &WlDataDevice,
        _data: &(),
    ) {
        state.seat.data_devices.retain(|d| d != resource);
    }
}

// ============================================================================
// wl_data_offer implementation
// ============================================================================

impl Dispatch<WlDataOffer, DataOfferData> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &WlDataOffer,
        request: wl_data_offer::Request,
        data: &DataOfferData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_data_offer::Request::Receive { mime_type, fd } = request {
            state.receive_selection(data.origin, &mime_type, fd);
        }
    }
}

impl CompositorState {
    /// A guest client changed the seat selection.
    pub fn set_client_selection(&mut self, source: Option<GuestSourceId>) {
        if !select_guest_source(self.clipboard.as_mut(), &mut self.remote, &mut self.seat, source) {
            tracing::warn!(target: SEAT, "Selection names unknown source {:?}", source);
        }
    }

    fn handle_guest_source_destroyed(&mut self, source: GuestSourceId) {
        if self.seat.remove_source(source) {
            tracing::debug!(target: SEAT, "Selection source {:?} destroyed", source);
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            clipboard.handle_guest_source_destroyed(&mut self.remote, source);
        }
    }

    /// A guest client reads the selection through one of its offers.
    fn receive_selection(&mut self, origin: OfferOrigin, mime_type: &str, fd: OwnedFd) {
        match origin {
            OfferOrigin::Client(source) => self.seat.send_client_selection(source, mime_type, fd),
            OfferOrigin::Host(offer) => match self.clipboard.as_mut() {
                Some(clipboard) => clipboard.send_inbound(&mut self.remote, offer, mime_type, fd),
                None => tracing::debug!(target: SEAT, "Read of host offer {:?} without clipboard bridge", offer),
            },
        }
    }
}

/// Register wl_data_device_manager global
pub fn register_data_device_manager(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, WlDataDeviceManager, ()>(3, ())
}
