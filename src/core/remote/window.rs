//! The nested output: one host toplevel showing a blank buffer.

use std::fs::File;
use std::os::unix::io::{AsFd, OwnedFd};

use nix::sys::memfd::{memfd_create, MFdFlags};

use wayland_client::{
    protocol::{wl_buffer::WlBuffer, wl_shm, wl_surface::WlSurface},
    Proxy, QueueHandle,
};
use wayland_protocols::xdg::shell::client::{xdg_surface::XdgSurface, xdg_toplevel::XdgToplevel};

use super::RemoteState;
use crate::core::bridge::HostSurfaceId;

/// Host toplevel backing the single guest output.
#[derive(Debug)]
pub struct NestedWindow {
    pub(super) surface: WlSurface,
    pub(super) xdg_surface: XdgSurface,
    pub(super) toplevel: XdgToplevel,
    buffer: Option<WlBuffer>,
    pub(super) width: u32,
    pub(super) height: u32,
    /// Size from the last toplevel configure, applied on the surface configure
    pub(super) pending_size: Option<(u32, u32)>,
    pub(super) frame_pending: bool,
    pub(super) configured: bool,
}

impl NestedWindow {
    pub(super) fn new(
        surface: WlSurface,
        xdg_surface: XdgSurface,
        toplevel: XdgToplevel,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            surface,
            xdg_surface,
            toplevel,
            buffer: None,
            width,
            height,
            pending_size: None,
            frame_pending: false,
            configured: false,
        }
    }

    pub fn host_surface(&self) -> HostSurfaceId {
        HostSurfaceId(self.surface.id().protocol_id())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Attach a fresh blank buffer of the current size and commit.
    pub(super) fn redraw(&mut self, shm: &wl_shm::WlShm, qh: &QueueHandle<RemoteState>) -> std::io::Result<()> {
        let buffer = blank_buffer(shm, self.width, self.height, qh)?;
        self.surface.attach(Some(&buffer), 0, 0);
        self.surface.damage(0, 0, self.width as i32, self.height as i32);
        self.surface.commit();

        if let Some(old) = self.buffer.replace(buffer) {
            old.destroy();
        }
        Ok(())
    }

    /// Ask the host for one frame callback on the nested surface.
    pub(super) fn request_frame(&mut self, qh: &QueueHandle<RemoteState>) {
        if self.frame_pending || !self.configured {
            return;
        }
        self.surface.frame(qh, ());
        self.surface.commit();
        self.frame_pending = true;
    }

    pub(super) fn destroy(mut self) {
        if let Some(buffer) = self.buffer.take() {
            buffer.destroy();
        }
        self.toplevel.destroy();
        self.xdg_surface.destroy();
        self.surface.destroy();
    }
}

/// Create a zero-filled XRGB buffer; it shows up black on the host.
fn blank_buffer(
    shm: &wl_shm::WlShm,
    width: u32,
    height: u32,
    qh: &QueueHandle<RemoteState>,
) -> std::io::Result<WlBuffer> {
    let stride = width.saturating_mul(4);
    let size = stride.saturating_mul(height);
    let size = i32::try_from(size)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "buffer too large"))?;

    let file = File::from(create_shm_fd()?);
    file.set_len(size as u64)?;

    let pool = shm.create_pool(file.as_fd(), size, qh, ());
    let buffer = pool.create_buffer(
        0,
        width as i32,
        height as i32,
        stride as i32,
        wl_shm::Format::Xrgb8888,
        qh,
        (),
    );
    pool.destroy();
    Ok(buffer)
}

fn create_shm_fd() -> std::io::Result<OwnedFd> {
    memfd_create(c"kiosk-bridge-output", MFdFlags::MFD_CLOEXEC).map_err(std::io::Error::from)
}
