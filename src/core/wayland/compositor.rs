//! wl_compositor, wl_surface, wl_region and a minimal wl_shm.
//!
//! Surfaces are never composited; the nested window stays blank. What the
//! kiosk keeps per surface is what guest clients wait on: frame callbacks
//! and buffer releases. Each surface gets a compositor-wide `u32` id as its
//! user data, which is also how pointer constraints refer to it.

use std::collections::HashMap;

use wayland_server::{
    protocol::{wl_buffer, wl_callback, wl_compositor, wl_region, wl_shm, wl_shm_pool, wl_surface},
    Dispatch, DisplayHandle, GlobalDispatch, Resource,
};

use crate::core::state::CompositorState;
use crate::util::logging::COMPOSITOR;

/// Per-surface state.
#[derive(Debug, Default)]
pub struct SurfaceState {
    /// Attached, not yet committed
    pending_buffer: Option<wl_buffer::WlBuffer>,
    /// Requested, not yet committed
    pending_callbacks: Vec<wl_callback::WlCallback>,
    /// Committed, waiting for the next frame
    frame_callbacks: Vec<wl_callback::WlCallback>,
}

impl SurfaceState {
    /// Apply pending state. Returns whether a frame is now awaited.
    fn commit(&mut self) -> bool {
        // Nothing samples the buffer, so it is free again right away
        if let Some(buffer) = self.pending_buffer.take() {
            if buffer.is_alive() {
                buffer.release();
            }
        }
        self.frame_callbacks.append(&mut self.pending_callbacks);
        !self.frame_callbacks.is_empty()
    }

    pub fn has_frame_callbacks(&self) -> bool {
        !self.frame_callbacks.is_empty()
    }

    /// Complete every committed frame callback.
    pub fn send_frame_callbacks(&mut self, time: u32) -> usize {
        let count = self.frame_callbacks.len();
        for callback in self.frame_callbacks.drain(..) {
            callback.done(time);
        }
        count
    }
}

/// Guest surfaces keyed by compositor id.
#[derive(Debug)]
pub struct SurfaceRegistry {
    surfaces: HashMap<u32, SurfaceState>,
    next_id: u32,
}

impl Default for SurfaceRegistry {
    fn default() -> Self {
        Self {
            surfaces: HashMap::new(),
            next_id: 1,
        }
    }
}

impl SurfaceRegistry {
    pub fn create(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.surfaces.insert(id, SurfaceState::default());
        id
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut SurfaceState> {
        self.surfaces.get_mut(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<SurfaceState> {
        self.surfaces.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Whether any surface has committed callbacks waiting.
    pub fn awaiting_frame(&self) -> bool {
        self.surfaces.values().any(SurfaceState::has_frame_callbacks)
    }

    /// Complete committed frame callbacks on every surface.
    pub fn send_frame_callbacks(&mut self, time: u32) -> usize {
        self.surfaces.values_mut().map(|s| s.send_frame_callbacks(time)).sum()
    }
}

// ============================================================================
// wl_compositor
// ============================================================================

impl GlobalDispatch<wl_compositor::WlCompositor, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        client: &wayland_server::Client,
        resource: wayland_server::New<wl_compositor::WlCompositor>,
        _global_data: &(),
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
        crate::wlog!(COMPOSITOR, "wl_compositor bound by client {:?}", client.id());
    }
}

impl Dispatch<wl_compositor::WlCompositor, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wl_compositor::WlCompositor,
        request: wl_compositor::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        match request {
            wl_compositor::Request::CreateSurface { id } => {
                let surface_id = state.surfaces.create();
                data_init.init(id, surface_id);
                tracing::debug!(target: COMPOSITOR, "Created surface {}", surface_id);
            }
            wl_compositor::Request::CreateRegion { id } => {
                data_init.init(id, ());
            }
            _ => {}
        }
    }
}

// ============================================================================
// wl_surface
// ============================================================================

impl Dispatch<wl_surface::WlSurface, u32> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wl_surface::WlSurface,
        request: wl_surface::Request,
        data: &u32,
        _dhandle: &DisplayHandle,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        let surface_id = *data;
        match request {
            wl_surface::Request::Attach { buffer, .. } => {
                if let Some(surface) = state.surfaces.get_mut(surface_id) {
                    surface.pending_buffer = buffer;
                }
            }
            wl_surface::Request::Frame { callback } => {
                let callback = data_init.init(callback, ());
                if let Some(surface) = state.surfaces.get_mut(surface_id) {
                    surface.pending_callbacks.push(callback);
                }
            }
            wl_surface::Request::Commit => {
                let awaiting = state
                    .surfaces
                    .get_mut(surface_id)
                    .is_some_and(SurfaceState::commit);
                if awaiting {
                    state.schedule_frame();
                }
            }
            _ => {}
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: wayland_server::backend::ClientId,
        _resource: &wl_surface::WlSurface,
        data: &u32,
    ) {
        state.handle_surface_destroyed(*data);
    }
}

// ============================================================================
// wl_region
// ============================================================================

impl Dispatch<wl_region::WlRegion, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wl_region::WlRegion,
        _request: wl_region::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        // Regions only matter for constraints, which ignore them
    }
}

impl Dispatch<wl_callback::WlCallback, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wl_callback::WlCallback,
        _request: wl_callback::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
    }
}

// ============================================================================
// wl_shm
// ============================================================================

impl GlobalDispatch<wl_shm::WlShm, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &wayland_server::Client,
        resource: wayland_server::New<wl_shm::WlShm>,
        _global_data: &(),
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        let shm = data_init.init(resource, ());
        shm.format(wl_shm::Format::Argb8888);
        shm.format(wl_shm::Format::Xrgb8888);
    }
}

impl Dispatch<wl_shm::WlShm, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wl_shm::WlShm,
        request: wl_shm::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        if let wl_shm::Request::CreatePool { id, size, .. } = request {
            // The pool fd is closed here; buffers are never read
            data_init.init(id, ());
            tracing::debug!(target: COMPOSITOR, "wl_shm.create_pool: size={}", size);
        }
    }
}

impl Dispatch<wl_shm_pool::WlShmPool, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wl_shm_pool::WlShmPool,
        request: wl_shm_pool::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        if let wl_shm_pool::Request::CreateBuffer { id, width, height, .. } = request {
            data_init.init(id, ());
            tracing::debug!(target: COMPOSITOR, "wl_shm_pool.create_buffer: {}x{}", width, height);
        }
    }
}

impl Dispatch<wl_buffer::WlBuffer, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wl_buffer::WlBuffer,
        _request: wl_buffer::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
    }
}

/// Register wl_compositor and wl_shm globals
pub fn register_compositor(dh: &DisplayHandle) {
    dh.create_global::<CompositorState, wl_compositor::WlCompositor, ()>(6, ());
    dh.create_global::<CompositorState, wl_shm::WlShm, ()>(1, ());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_ids_are_unique() {
        let mut registry = SurfaceRegistry::default();
        let a = registry.create();
        let b = registry.create();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(a).is_some());
        assert!(registry.remove(a).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_commit_without_callbacks_awaits_nothing() {
        let mut registry = SurfaceRegistry::default();
        let id = registry.create();
        assert!(!registry.get_mut(id).unwrap().commit());
        assert!(!registry.awaiting_frame());
        assert_eq!(registry.send_frame_callbacks(0), 0);
    }
}
