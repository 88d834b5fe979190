//! Pointer-constraint relay.
//!
//! Guest lock/confine requests are re-issued against the host surface of the
//! single nested output, and host `locked`/`unlocked`/`confined`/`unconfined`
//! events are re-emitted to the guest object. Regions are not supported.

use std::collections::HashMap;

use crate::core::bridge::{
    ConstraintHost, ConstraintId, GuestConstraint, HostConstraintId, HostSurfaceId, OutputLayout,
};
use crate::util::logging::CONSTRAINTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Lock,
    Confine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintLifetime {
    Oneshot,
    Persistent,
}

/// `Requested → Active (host acked) → Released`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintState {
    Requested,
    Active,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintEventKind {
    Locked,
    Unlocked,
    Confined,
    Unconfined,
}

/// State event emitted by a host lock or confine object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintEvent {
    pub constraint: HostConstraintId,
    pub kind: ConstraintEventKind,
}

/// Why a constraint request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintError {
    #[error("host does not support zwp_pointer_constraints_v1")]
    Unsupported,
    #[error("could not find host pointer")]
    NoPointer,
    #[error("host has {0} outputs, only a single output is supported")]
    OutputCount(usize),
    #[error("output is not nested in a host surface")]
    NotNested,
}

/// Proof that a request passed validation.
///
/// Only [`PointerConstraintBridge::admit`] hands these out, so a guest
/// resource is never tracked (and no host request is issued) without one.
#[derive(Debug)]
pub struct Admission {
    id: ConstraintId,
    surface: HostSurfaceId,
}

impl Admission {
    pub fn id(&self) -> ConstraintId {
        self.id
    }
}

#[derive(Debug)]
struct PointerConstraint<R> {
    kind: ConstraintKind,
    /// Guest surface the client constrained
    surface: u32,
    host: Option<HostConstraintId>,
    state: ConstraintState,
    resource: R,
}

/// Tracks every live guest constraint and its host counterpart.
#[derive(Debug)]
pub struct PointerConstraintBridge<R> {
    constraints: HashMap<ConstraintId, PointerConstraint<R>>,
    by_host: HashMap<HostConstraintId, ConstraintId>,
    next_id: u32,
}

impl<R> Default for PointerConstraintBridge<R> {
    fn default() -> Self {
        Self {
            constraints: HashMap::new(),
            by_host: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<R: GuestConstraint> PointerConstraintBridge<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a lock/confine request before anything is created.
    pub fn admit<H, O>(&mut self, host: &H, outputs: &O) -> Result<Admission, ConstraintError>
    where
        H: ConstraintHost,
        O: OutputLayout,
    {
        if !host.supports_pointer_constraints() {
            return Err(ConstraintError::Unsupported);
        }
        if !host.has_pointer() {
            return Err(ConstraintError::NoPointer);
        }

        let surfaces = outputs.host_surfaces();
        let surface = match surfaces.as_slice() {
            [Some(surface)] => *surface,
            [None] => return Err(ConstraintError::NotNested),
            other => return Err(ConstraintError::OutputCount(other.len())),
        };

        let id = ConstraintId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        Ok(Admission { id, surface })
    }

    /// Track the guest object and issue the matching host request.
    #[allow(clippy::too_many_arguments)]
    pub fn create<H: ConstraintHost>(
        &mut self,
        host: &mut H,
        admission: Admission,
        kind: ConstraintKind,
        surface: u32,
        lifetime: ConstraintLifetime,
        resource: R,
        has_region: bool,
    ) -> ConstraintId {
        if has_region {
            tracing::info!(target: CONSTRAINTS, "region not yet supported");
        }

        let remote = match kind {
            ConstraintKind::Lock => host.lock_pointer(admission.surface, lifetime),
            ConstraintKind::Confine => host.confine_pointer(admission.surface, lifetime),
        };
        host.flush();

        tracing::debug!(
            target: CONSTRAINTS,
            "{:?} {:?} on surface {} ({:?}, host {:?})",
            kind,
            admission.id,
            surface,
            lifetime,
            remote
        );

        match remote {
            Some(remote) => {
                self.by_host.insert(remote, admission.id);
            }
            None => {
                tracing::error!(target: CONSTRAINTS, "Host refused {:?} for {:?}", kind, admission.id);
            }
        }
        self.constraints.insert(
            admission.id,
            PointerConstraint {
                kind,
                surface,
                host: remote,
                state: ConstraintState::Requested,
                resource,
            },
        );
        admission.id
    }

    /// Relay a host state event to the guest object.
    pub fn handle_host_event(&mut self, event: ConstraintEvent) {
        let Some(id) = self.by_host.get(&event.constraint) else {
            tracing::debug!(target: CONSTRAINTS, "Event for released host constraint {:?}", event.constraint);
            return;
        };
        let Some(constraint) = self.constraints.get_mut(id) else {
            return;
        };

        match (constraint.kind, event.kind) {
            (ConstraintKind::Lock, ConstraintEventKind::Locked) => {
                constraint.state = ConstraintState::Active;
                constraint.resource.locked();
            }
            (ConstraintKind::Lock, ConstraintEventKind::Unlocked) => {
                constraint.state = ConstraintState::Requested;
                constraint.resource.unlocked();
            }
            (ConstraintKind::Confine, ConstraintEventKind::Confined) => {
                constraint.state = ConstraintState::Active;
                constraint.resource.confined();
            }
            (ConstraintKind::Confine, ConstraintEventKind::Unconfined) => {
                constraint.state = ConstraintState::Requested;
                constraint.resource.unconfined();
            }
            (kind, event) => {
                tracing::warn!(target: CONSTRAINTS, "Ignoring {:?} for a {:?} constraint", event, kind);
            }
        }
    }

    /// Forward a cursor position hint, only while a lock is host-acknowledged.
    pub fn set_cursor_position_hint<H: ConstraintHost>(&mut self, host: &mut H, id: ConstraintId, x: f64, y: f64) {
        let Some(constraint) = self.constraints.get(&id) else {
            return;
        };
        if constraint.kind != ConstraintKind::Lock || constraint.state != ConstraintState::Active {
            tracing::debug!(target: CONSTRAINTS, "Dropping cursor hint for inactive {:?}", id);
            return;
        }
        if let Some(remote) = constraint.host {
            tracing::info!(target: CONSTRAINTS, "Warping to ({}, {})", x as i32, y as i32);
            host.set_cursor_position_hint(remote, x, y);
        }
    }

    /// The guest object was destroyed.
    ///
    /// The host handle is released and flushed before returning, so the
    /// host sees it before any later request on the same surface.
    pub fn destroy<H: ConstraintHost>(&mut self, host: &mut H, id: ConstraintId) {
        if let Some(constraint) = self.constraints.remove(&id) {
            self.release(host, id, constraint);
        }
    }

    /// The constrained guest surface is gone.
    ///
    /// Affected constraints are released; their guest objects stay alive
    /// but inert until the client destroys them.
    pub fn handle_surface_destroyed<H: ConstraintHost>(&mut self, host: &mut H, surface: u32) {
        let ids: Vec<ConstraintId> = self
            .constraints
            .iter()
            .filter(|(_, c)| c.surface == surface)
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            if let Some(constraint) = self.constraints.remove(&id) {
                tracing::debug!(target: CONSTRAINTS, "Surface {} destroyed, releasing {:?}", surface, id);
                self.release(host, id, constraint);
            }
        }
    }

    /// Release every host handle.
    pub fn teardown<H: ConstraintHost>(&mut self, host: &mut H) {
        let ids: Vec<ConstraintId> = self.constraints.keys().copied().collect();
        for id in ids {
            if let Some(constraint) = self.constraints.remove(&id) {
                self.release(host, id, constraint);
            }
        }
    }

    /// Untracked ids report `Released`.
    pub fn state(&self, id: ConstraintId) -> ConstraintState {
        self.constraints
            .get(&id)
            .map(|c| c.state)
            .unwrap_or(ConstraintState::Released)
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    fn release<H: ConstraintHost>(&mut self, host: &mut H, id: ConstraintId, mut constraint: PointerConstraint<R>) {
        constraint.state = ConstraintState::Released;
        if let Some(remote) = constraint.host.take() {
            self.by_host.remove(&remote);
            host.destroy_constraint(remote);
            host.flush();
        }
        tracing::debug!(target: CONSTRAINTS, "{:?} released", id);
    }
}

// ============================================================================
// Tests
// ============================================================================
