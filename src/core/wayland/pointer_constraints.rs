//! WP Pointer Constraints protocol implementation.
//!
//! Guest lock/confine requests are relayed to the host through the
//! pointer-constraint bridge. A request the bridge refuses still gets its
//! object (the protocol leaves no way to reject a `new_id`), but that object
//! is inert: it never receives an event and its requests are ignored.

use wayland_protocols::wp::pointer_constraints::zv1::server::{
    zwp_confined_pointer_v1::{self, ZwpConfinedPointerV1},
    zwp_locked_pointer_v1::{self, ZwpLockedPointerV1},
    zwp_pointer_constraints_v1::{self, Lifetime, ZwpPointerConstraintsV1},
};
use wayland_server::{
    backend::ClientId, protocol::wl_surface::WlSurface, Client, DataInit, Dispatch, DisplayHandle,
    GlobalDispatch, New, Resource, WEnum,
};

use crate::core::bridge::{ConstraintId, ConstraintKind, ConstraintLifetime, GuestConstraint};
use crate::core::state::CompositorState;
use crate::util::logging::CONSTRAINTS;

// ============================================================================
// Data Types
// ============================================================================

impl From<WEnum<Lifetime>> for ConstraintLifetime {
    fn from(l: WEnum<Lifetime>) -> Self {
        match l {
            WEnum::Value(Lifetime::Persistent) => Self::Persistent,
            _ => Self::Oneshot,
        }
    }
}

/// User data of a guest lock/confine object; `None` when it was refused.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintData {
    pub id: Option<ConstraintId>,
}

/// Guest-facing constraint object tracked by the bridge.
#[derive(Debug)]
pub enum ConstraintResource {
    Locked(ZwpLockedPointerV1),
    Confined(ZwpConfinedPointerV1),
}

impl GuestConstraint for ConstraintResource {
    fn locked(&self) {
        if let Self::Locked(resource) = self {
            resource.locked();
        }
    }

    fn unlocked(&self) {
        if let Self::Locked(resource) = self {
            resource.unlocked();
        }
    }

    fn confined(&self) {
        if let Self::Confined(resource) = self {
            resource.confined();
        }
    }

    fn unconfined(&self) {
        if let Self::Confined(resource) = self {
            resource.unconfined();
        }
    }
}

// ============================================================================
// zwp_pointer_constraints_v1
// ============================================================================

impl GlobalDispatch<ZwpPointerConstraintsV1, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<ZwpPointerConstraintsV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
        tracing::debug!(target: CONSTRAINTS, "Bound zwp_pointer_constraints_v1");
    }
}

impl Dispatch<ZwpPointerConstraintsV1, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &ZwpPointerConstraintsV1,
        request: zwp_pointer_constraints_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwp_pointer_constraints_v1::Request::LockPointer {
                id,
                surface,
                region,
                lifetime,
                ..
            } => {
                let Some(admitted) = state.admit_constraint(ConstraintKind::Lock) else {
                    data_init.init(id, ConstraintData { id: None });
                    return;
                };
                let resource = data_init.init(id, ConstraintData { id: Some(admitted.id()) });
                state.constraints.create(
                    &mut state.remote,
                    admitted,
                    ConstraintKind::Lock,
                    surface_id(&surface),
                    lifetime.into(),
                    ConstraintResource::Locked(resource),
                    region.is_some(),
                );
            }
            zwp_pointer_constraints_v1::Request::ConfinePointer {
                id,
                surface,
                region,
                lifetime,
                ..
            } => {
                let Some(admitted) = state.admit_constraint(ConstraintKind::Confine) else {
                    data_init.init(id, ConstraintData { id: None });
                    return;
                };
                let resource = data_init.init(id, ConstraintData { id: Some(admitted.id()) });
                state.constraints.create(
                    &mut state.remote,
                    admitted,
                    ConstraintKind::Confine,
                    surface_id(&surface),
                    lifetime.into(),
                    ConstraintResource::Confined(resource),
                    region.is_some(),
                );
            }
            _ => {}
        }
    }
}

fn surface_id(surface: &WlSurface) -> u32 {
    surface.data::<u32>().copied().unwrap_or_default()
}

// ============================================================================
// zwp_locked_pointer_v1
// ============================================================================

impl Dispatch<ZwpLockedPointerV1, ConstraintData> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &ZwpLockedPointerV1,
        request: zwp_locked_pointer_v1::Request,
        data: &ConstraintData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let Some(id) = data.id else {
            return;
        };
        match request {
            zwp_locked_pointer_v1::Request::SetCursorPositionHint { surface_x, surface_y } => {
                state
                    .constraints
                    .set_cursor_position_hint(&mut state.remote, id, surface_x, surface_y);
            }
            zwp_locked_pointer_v1::Request::SetRegion { .. } => {
                tracing::info!(target: CONSTRAINTS, "region not yet supported");
            }
            _ => {}
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, _resource: &ZwpLockedPointerV1, data: &ConstraintData) {
        if let Some(id) = data.id {
            state.constraints.destroy(&mut state.remote, id);
        }
    }
}

// ============================================================================
// zwp_confined_pointer_v1
// ============================================================================

impl Dispatch<ZwpConfinedPointerV1, ConstraintData> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &ZwpConfinedPointerV1,
        request: zwp_confined_pointer_v1::Request,
        data: &ConstraintData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if data.id.is_some() {
            if let zwp_confined_pointer_v1::Request::SetRegion { .. } = request {
                tracing::info!(target: CONSTRAINTS, "region not yet supported");
            }
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, _resource: &ZwpConfinedPointerV1, data: &ConstraintData) {
        if let Some(id) = data.id {
            state.constraints.destroy(&mut state.remote, id);
        }
    }
}

/// Register zwp_pointer_constraints_v1 global
pub fn register_pointer_constraints(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, ZwpPointerConstraintsV1, ()>(1, ())
}
