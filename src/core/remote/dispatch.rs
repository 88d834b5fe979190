//! Host event handlers.
//!
//! Handlers only update proxy bookkeeping and queue [`RemoteEvent`]s; the
//! bridges consume those after dispatch returns.

use wayland_client::{
    delegate_noop, event_created_child,
    protocol::{
        wl_buffer::WlBuffer, wl_callback, wl_compositor::WlCompositor, wl_pointer, wl_registry,
        wl_seat, wl_shm::WlShm, wl_shm_pool::WlShmPool, wl_surface::WlSurface,
    },
    Connection, Dispatch, Proxy, QueueHandle, WEnum,
};
use wayland_protocols::wp::pointer_constraints::zv1::client::{
    zwp_confined_pointer_v1::{self, ZwpConfinedPointerV1},
    zwp_locked_pointer_v1::{self, ZwpLockedPointerV1},
    zwp_pointer_constraints_v1::ZwpPointerConstraintsV1,
};
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel, xdg_wm_base};
use wayland_protocols_wlr::data_control::v1::client::{
    zwlr_data_control_device_v1::{self, ZwlrDataControlDeviceV1},
    zwlr_data_control_manager_v1::ZwlrDataControlManagerV1,
    zwlr_data_control_offer_v1::{self, ZwlrDataControlOfferV1},
    zwlr_data_control_source_v1::{self, ZwlrDataControlSourceV1},
};

use super::{RemoteEvent, RemoteState};
use crate::core::bridge::{
    ClipboardEvent, ConstraintEvent, ConstraintEventKind, HostConstraintId, OfferId, SourceId,
};
use crate::util::logging::REMOTE;

fn offer_id(offer: &ZwlrDataControlOfferV1) -> OfferId {
    OfferId(offer.id().protocol_id())
}

impl RemoteState {
    fn push_clipboard(&mut self, event: ClipboardEvent) {
        self.pending.push_back(RemoteEvent::Clipboard(event));
    }

    fn push_constraint(&mut self, constraint: HostConstraintId, kind: ConstraintEventKind) {
        self.pending
            .push_back(RemoteEvent::Constraint(ConstraintEvent { constraint, kind }));
    }
}

// ============================================================================
// Registry
// ============================================================================

impl Dispatch<wl_registry::WlRegistry, ()> for RemoteState {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_registry::Event::Global { name, interface, version } = event else {
            return;
        };

        let globals = &mut state.globals;
        match &interface[..] {
            "wl_compositor" => globals.compositor = Some(registry.bind(name, version.min(4), qh, ())),
            "wl_shm" => globals.shm = Some(registry.bind(name, 1, qh, ())),
            "xdg_wm_base" => globals.wm_base = Some(registry.bind(name, version.min(2), qh, ())),
            "wl_seat" if globals.seat.is_none() => {
                globals.seat = Some(registry.bind(name, version.min(5), qh, ()));
            }
            "zwlr_data_control_manager_v1" => {
                globals.data_control = Some(registry.bind(name, version.min(2), qh, ()));
            }
            "zwp_pointer_constraints_v1" => {
                globals.pointer_constraints = Some(registry.bind(name, 1, qh, ()));
            }
            _ => return,
        }
        tracing::debug!(target: REMOTE, "Bound host global {} v{}", interface, version);
    }
}

// ============================================================================
// Seat & pointer
// ============================================================================

impl Dispatch<wl_seat::WlSeat, ()> for RemoteState {
    fn event(
        state: &mut Self,
        seat: &wl_seat::WlSeat,
        event: wl_seat::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_seat::Event::Capabilities { capabilities: WEnum::Value(caps) } = event else {
            return;
        };

        let has_pointer = caps.contains(wl_seat::Capability::Pointer);
        if has_pointer && state.pointer.is_none() {
            state.pointer = Some(seat.get_pointer(qh, ()));
            tracing::debug!(target: REMOTE, "Host pointer acquired");
        } else if !has_pointer {
            if let Some(pointer) = state.pointer.take() {
                if pointer.version() >= 3 {
                    pointer.release();
                }
                state.pointer_focus = false;
                tracing::debug!(target: REMOTE, "Host pointer withdrawn");
            }
        }
    }
}

impl Dispatch<wl_pointer::WlPointer, ()> for RemoteState {
    fn event(
        state: &mut Self,
        _: &wl_pointer::WlPointer,
        event: wl_pointer::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_pointer::Event::Enter { surface, surface_x, surface_y, .. } => {
                let ours = state
                    .window
                    .as_ref()
                    .is_some_and(|w| w.surface.id() == surface.id());
                state.pointer_focus = ours;
                if ours {
                    state.pending.push_back(RemoteEvent::PointerMotion { x: surface_x, y: surface_y });
                }
            }
            wl_pointer::Event::Leave { .. } => state.pointer_focus = false,
            wl_pointer::Event::Motion { surface_x, surface_y, .. } if state.pointer_focus => {
                state.pending.push_back(RemoteEvent::PointerMotion { x: surface_x, y: surface_y });
            }
            _ => {}
        }
    }
}

// ============================================================================
// Data control
// ============================================================================

impl Dispatch<ZwlrDataControlDeviceV1, ()> for RemoteState {
    fn event(
        state: &mut Self,
        _: &ZwlrDataControlDeviceV1,
        event: zwlr_data_control_device_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            zwlr_data_control_device_v1::Event::DataOffer { id } => {
                let offer = offer_id(&id);
                state.offers.insert(offer, id);
                state.push_clipboard(ClipboardEvent::DataOffer { offer });
            }
            zwlr_data_control_device_v1::Event::Selection { id } => {
                let offer = id.as_ref().map(offer_id);
                state.push_clipboard(ClipboardEvent::Selection { offer });
            }
            zwlr_data_control_device_v1::Event::PrimarySelection { id } => {
                let offer = id.as_ref().map(offer_id);
                state.push_clipboard(ClipboardEvent::PrimarySelection { offer });
            }
            zwlr_data_control_device_v1::Event::Finished => {
                state.push_clipboard(ClipboardEvent::Finished);
            }
            _ => {}
        }
    }

    event_created_child!(RemoteState, ZwlrDataControlDeviceV1, [
        zwlr_data_control_device_v1::EVT_DATA_OFFER_OPCODE => (ZwlrDataControlOfferV1, ()),
    ]);
}

impl Dispatch<ZwlrDataControlOfferV1, ()> for RemoteState {
    fn event(
        state: &mut Self,
        offer: &ZwlrDataControlOfferV1,
        event: zwlr_data_control_offer_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let zwlr_data_control_offer_v1::Event::Offer { mime_type } = event {
            state.push_clipboard(ClipboardEvent::OfferMimeType {
                offer: offer_id(offer),
                mime_type,
            });
        }
    }
}

impl Dispatch<ZwlrDataControlSourceV1, ()> for RemoteState {
    fn event(
        state: &mut Self,
        source: &ZwlrDataControlSourceV1,
        event: zwlr_data_control_source_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let source = SourceId(source.id().protocol_id());
        match event {
            zwlr_data_control_source_v1::Event::Send { mime_type, fd } => {
                state.push_clipboard(ClipboardEvent::SourceSend { source, mime_type, fd });
            }
            zwlr_data_control_source_v1::Event::Cancelled => {
                state.push_clipboard(ClipboardEvent::SourceCancelled { source });
            }
            _ => {}
        }
    }
}

// ============================================================================
// Pointer constraints
// ============================================================================

impl Dispatch<ZwpLockedPointerV1, ()> for RemoteState {
    fn event(
        state: &mut Self,
        lock: &ZwpLockedPointerV1,
        event: zwp_locked_pointer_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let id = HostConstraintId(lock.id().protocol_id());
        match event {
            zwp_locked_pointer_v1::Event::Locked => state.push_constraint(id, ConstraintEventKind::Locked),
            zwp_locked_pointer_v1::Event::Unlocked => state.push_constraint(id, ConstraintEventKind::Unlocked),
            _ => {}
        }
    }
}

impl Dispatch<ZwpConfinedPointerV1, ()> for RemoteState {
    fn event(
        state: &mut Self,
        confine: &ZwpConfinedPointerV1,
        event: zwp_confined_pointer_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let id = HostConstraintId(confine.id().protocol_id());
        match event {
            zwp_confined_pointer_v1::Event::Confined => state.push_constraint(id, ConstraintEventKind::Confined),
            zwp_confined_pointer_v1::Event::Unconfined => {
                state.push_constraint(id, ConstraintEventKind::Unconfined)
            }
            _ => {}
        }
    }
}

// ============================================================================
// Nested window
// ============================================================================

impl Dispatch<xdg_wm_base::XdgWmBase, ()> for RemoteState {
    fn event(
        _: &mut Self,
        wm_base: &xdg_wm_base::XdgWmBase,
        event: xdg_wm_base::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<xdg_surface::XdgSurface, ()> for RemoteState {
    fn event(
        state: &mut Self,
        xdg_surface: &xdg_surface::XdgSurface,
        event: xdg_surface::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let xdg_surface::Event::Configure { serial } = event else {
            return;
        };
        xdg_surface.ack_configure(serial);

        let (Some(window), Some(shm)) = (state.window.as_mut(), state.globals.shm.as_ref()) else {
            return;
        };

        let resized = match window.pending_size.take() {
            Some(size) if size != window.size() => {
                (window.width, window.height) = size;
                true
            }
            _ => false,
        };

        if resized || !window.configured {
            window.configured = true;
            if let Err(e) = window.redraw(shm, qh) {
                tracing::error!(target: REMOTE, "Failed to draw nested window: {}", e);
                return;
            }
            let (width, height) = window.size();
            state.pending.push_back(RemoteEvent::Resized { width, height });
        } else {
            window.surface.commit();
        }
    }
}

impl Dispatch<xdg_toplevel::XdgToplevel, ()> for RemoteState {
    fn event(
        state: &mut Self,
        _: &xdg_toplevel::XdgToplevel,
        event: xdg_toplevel::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => {
                if let Some(window) = state.window.as_mut() {
                    if width > 0 && height > 0 {
                        window.pending_size = Some((width as u32, height as u32));
                    }
                }
            }
            xdg_toplevel::Event::Close => {
                tracing::info!(target: REMOTE, "Host closed the nested window");
                state.pending.push_back(RemoteEvent::Close);
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_callback::WlCallback, ()> for RemoteState {
    fn event(
        state: &mut Self,
        _: &wl_callback::WlCallback,
        event: wl_callback::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { callback_data } = event {
            if let Some(window) = state.window.as_mut() {
                window.frame_pending = false;
            }
            state.pending.push_back(RemoteEvent::Frame { time: callback_data });
        }
    }
}

delegate_noop!(RemoteState: WlCompositor);
delegate_noop!(RemoteState: ignore WlSurface);
delegate_noop!(RemoteState: ignore WlShm);
delegate_noop!(RemoteState: WlShmPool);
delegate_noop!(RemoteState: ignore WlBuffer);
delegate_noop!(RemoteState: ZwlrDataControlManagerV1);
delegate_noop!(RemoteState: ZwpPointerConstraintsV1);
