//! wl_output protocol implementation and the output registry.
//!
//! The kiosk has exactly one output in normal operation: the nested host
//! window. Its size follows the host configure.

use wayland_server::{
    backend::GlobalId,
    protocol::wl_output::{self, Subpixel, Transform, WlOutput},
    Dispatch, DisplayHandle, GlobalDispatch, Resource,
};

use crate::core::bridge::{HostSurfaceId, OutputLayout};
use crate::core::state::CompositorState;
use crate::util::logging::COMPOSITOR;

/// Refresh rate advertised to clients, in mHz.
const REFRESH_MHZ: i32 = 60_000;

/// Output global data - references an output by ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputGlobal {
    pub output_id: u32,
}

#[derive(Debug)]
pub struct OutputState {
    pub id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Host surface when the output is a nested window
    pub host_surface: Option<HostSurfaceId>,
    global: Option<GlobalId>,
    resources: Vec<WlOutput>,
}

impl OutputState {
    fn send_info(&self, output: &WlOutput) {
        output.geometry(
            0,
            0,
            0,
            0,
            Subpixel::Unknown,
            "kiosk-bridge".to_string(),
            self.name.clone(),
            Transform::Normal,
        );
        self.send_mode(output);
        if output.version() >= 2 {
            output.scale(1);
        }
        if output.version() >= 4 {
            output.name(self.name.clone());
            output.description(format!("Nested output ({}x{})", self.width, self.height));
        }
        if output.version() >= 2 {
            output.done();
        }
    }

    fn send_mode(&self, output: &WlOutput) {
        output.mode(
            wl_output::Mode::Current | wl_output::Mode::Preferred,
            self.width as i32,
            self.height as i32,
            REFRESH_MHZ,
        );
    }
}

/// Every active output, in creation order.
#[derive(Debug)]
pub struct OutputRegistry {
    outputs: Vec<OutputState>,
    next_id: u32,
}

impl Default for OutputRegistry {
    fn default() -> Self {
        Self {
            outputs: Vec::new(),
            next_id: 1,
        }
    }
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new output; its global is created by [`register_output`].
    pub fn add(&mut self, width: u32, height: u32, host_surface: Option<HostSurfaceId>) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.outputs.push(OutputState {
            id,
            name: format!("NESTED-{}", id),
            width,
            height,
            host_surface,
            global: None,
            resources: Vec::new(),
        });
        tracing::info!(target: COMPOSITOR, "Output {} added ({}x{}, host {:?})", id, width, height, host_surface);
        id
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.outputs.iter().map(|o| o.id)
    }

    pub fn get(&self, id: u32) -> Option<&OutputState> {
        self.outputs.iter().find(|o| o.id == id)
    }

    /// The output backed by `surface`.
    pub fn by_host_surface(&self, surface: HostSurfaceId) -> Option<&OutputState> {
        self.outputs.iter().find(|o| o.host_surface == Some(surface))
    }

    /// Apply a new mode and tell every bound client. Returns `false` for
    /// unknown outputs.
    pub fn resize(&mut self, id: u32, width: u32, height: u32) -> bool {
        let Some(output) = self.outputs.iter_mut().find(|o| o.id == id) else {
            return false;
        };
        if (output.width, output.height) == (width, height) {
            return true;
        }

        output.width = width;
        output.height = height;
        output.resources.retain(|r| r.is_alive());
        for resource in &output.resources {
            output.send_mode(resource);
            if resource.version() >= 2 {
                resource.done();
            }
        }
        tracing::debug!(target: COMPOSITOR, "Output {} resized to {}x{}", id, width, height);
        true
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

impl OutputLayout for OutputRegistry {
    fn host_surfaces(&self) -> Vec<Option<HostSurfaceId>> {
        self.outputs.iter().map(|o| o.host_surface).collect()
    }
}

// ============================================================================
// wl_output
// ============================================================================

impl GlobalDispatch<WlOutput, OutputGlobal> for CompositorState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        _client: &wayland_server::Client,
        resource: wayland_server::New<WlOutput>,
        global_data: &OutputGlobal,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        let output = data_init.init(resource, ());
        let Some(output_state) = state.outputs.outputs.iter_mut().find(|o| o.id == global_data.output_id) else {
            tracing::warn!(target: COMPOSITOR, "wl_output bound for removed output {}", global_data.output_id);
            return;
        };

        output_state.send_info(&output);
        output_state.resources.push(output.clone());
        tracing::debug!(target: COMPOSITOR, "Bound wl_output v{} for output {}", output.version(), output_state.id);
    }
}

impl Dispatch<WlOutput, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &wayland_server::Client,
        resource: &WlOutput,
        request: wl_output::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        if let wl_output::Request::Release = request {
            for output in &mut state.outputs.outputs {
                output.resources.retain(|r| r != resource);
            }
        }
    }
}

/// Create the wl_output global for a tracked output.
pub fn register_output(registry: &mut OutputRegistry, dh: &DisplayHandle, id: u32) {
    if let Some(output) = registry.outputs.iter_mut().find(|o| o.id == id) {
        let global = dh.create_global::<CompositorState, WlOutput, OutputGlobal>(4, OutputGlobal { output_id: id });
        output.global = Some(global);
    }
}
