//! Guest ↔ host protocol bridges.
//!
//! The kiosk runs two Wayland domains at once: the guest display it serves
//! to sandboxed clients, and the host connection it is nested in. The
//! bridges in this module mirror state between them:
//! - [`clipboard`]: selection and primary selection, both directions
//! - [`constraints`]: pointer lock/confine requests and their state events
//!
//! Both bridges are plain state machines. They never hold protocol objects
//! from the other domain; every cross-domain reference is one of the handle
//! newtypes below, and every side effect goes through one of the
//! collaborator traits. The Wayland adapters in `core::remote` and
//! `core::wayland` implement those traits for the real connections.

use std::os::unix::io::{BorrowedFd, OwnedFd};

pub mod clipboard;
pub mod constraints;

#[cfg(test)]
pub(crate) mod mock;

pub use clipboard::{ClipboardBridge, ClipboardEvent, GuestSelection, HostSelection};
pub use constraints::{
    Admission, ConstraintError, ConstraintEvent, ConstraintEventKind, ConstraintKind,
    ConstraintLifetime, ConstraintState, PointerConstraintBridge,
};

// ============================================================================
// Handles
// ============================================================================

/// Host `zwlr_data_control_offer_v1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OfferId(pub u32);

/// Host `zwlr_data_control_source_v1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u32);

/// Host `zwp_locked_pointer_v1` or `zwp_confined_pointer_v1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostConstraintId(pub u32);

/// Host `wl_surface` backing a nested output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostSurfaceId(pub u32);

/// Guest `wl_data_source`, allocated by the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuestSourceId(pub u32);

/// Guest-facing constraint object, allocated by the constraint bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintId(pub u32);

// ============================================================================
// Host collaborators
// ============================================================================

/// Clipboard side of the host connection (`zwlr_data_control_*`).
pub trait ClipboardHost {
    /// Whether the host advertised the data-control manager.
    fn supports_data_control(&self) -> bool;

    /// Open the mirrored data device on the host seat.
    ///
    /// Returns `false` when the device cannot be created (no host seat).
    fn open_data_device(&mut self) -> bool;

    /// Destroy the mirrored data device.
    fn close_data_device(&mut self);

    /// Allocate a host-side selection source.
    fn create_source(&mut self) -> Option<SourceId>;

    /// Advertise one MIME type on a host-side source.
    fn offer(&mut self, source: SourceId, mime_type: &str);

    /// Make `source` the host selection.
    fn set_selection(&mut self, source: SourceId);

    fn destroy_source(&mut self, source: SourceId);

    /// Ask the host to write the offer's `mime_type` contents into `fd`.
    fn receive(&mut self, offer: OfferId, mime_type: &str, fd: BorrowedFd<'_>);

    fn destroy_offer(&mut self, offer: OfferId);

    fn flush(&mut self);

    /// Clipboard events already dispatched but not applied yet, in arrival
    /// order. Other host events stay queued for the main loop.
    fn take_queued(&mut self) -> Vec<ClipboardEvent>;

    /// Blocking sync with the host.
    ///
    /// Returns every queued clipboard event, including those dispatched
    /// while waiting, in arrival order. Other host events stay queued for
    /// the main loop.
    fn roundtrip(&mut self) -> Vec<ClipboardEvent>;
}

/// Pointer-constraint side of the host connection (`zwp_pointer_constraints_v1`).
pub trait ConstraintHost {
    fn supports_pointer_constraints(&self) -> bool;

    /// Whether the host seat currently exposes a pointer.
    fn has_pointer(&self) -> bool;

    /// Returns `None` when the host objects needed for the request are gone.
    fn lock_pointer(&mut self, surface: HostSurfaceId, lifetime: ConstraintLifetime) -> Option<HostConstraintId>;

    fn confine_pointer(&mut self, surface: HostSurfaceId, lifetime: ConstraintLifetime) -> Option<HostConstraintId>;

    fn set_cursor_position_hint(&mut self, constraint: HostConstraintId, x: f64, y: f64);

    fn destroy_constraint(&mut self, constraint: HostConstraintId);

    fn flush(&mut self);
}

// ============================================================================
// Guest collaborators
// ============================================================================

/// Guest seat selection plumbing driven by the clipboard bridge.
pub trait GuestSeat {
    /// Next event serial of the guest display.
    fn next_serial(&mut self) -> u32;

    /// Install a host-backed selection, or clear the selection with `None`.
    ///
    /// Does not notify the clipboard bridge back.
    fn set_host_selection(&mut self, selection: Option<HostSelection>, serial: u32);

    /// Have the guest client owning `source` write `mime_type` into `fd`.
    fn send_client_selection(&mut self, source: GuestSourceId, mime_type: &str, fd: OwnedFd);

    /// Make a guest source, or nothing, the seat selection.
    ///
    /// Returns `false` for an unknown source.
    fn select_client_source(&mut self, source: Option<GuestSourceId>) -> bool;

    /// MIME types a guest source advertised.
    fn client_mime_types(&self, source: GuestSourceId) -> Option<Vec<String>>;
}

/// Guest-facing `zwp_locked_pointer_v1` / `zwp_confined_pointer_v1`.
pub trait GuestConstraint {
    fn locked(&self);
    fn unlocked(&self);
    fn confined(&self);
    fn unconfined(&self);
}

/// Output topology as seen by the constraint bridge.
pub trait OutputLayout {
    /// One entry per active output; `None` for an output that is not
    /// nested inside a host surface.
    fn host_surfaces(&self) -> Vec<Option<HostSurfaceId>>;
}
