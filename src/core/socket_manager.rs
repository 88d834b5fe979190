//! Socket Manager - listening sockets guest clients connect to.
//!
//! Normally a single `wayland-N` socket in `$XDG_RUNTIME_DIR`, exported to
//! guest clients through `WAYLAND_DISPLAY`.

use std::os::unix::io::{AsFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use wayland_server::ListeningSocket;

use crate::util::logging::COMPOSITOR;

/// Socket numbers tried by [`SocketManager::bind_auto`].
const AUTO_RANGE: std::ops::Range<usize> = 1..33;

#[derive(Debug)]
struct BoundSocket {
    socket: ListeningSocket,
    name: String,
    path: PathBuf,
}

/// Manages the guest listening sockets
#[derive(Debug)]
pub struct SocketManager {
    sockets: Vec<BoundSocket>,
    runtime_dir: PathBuf,
}

impl SocketManager {
    /// Create a new socket manager
    pub fn new(runtime_dir: impl AsRef<Path>) -> Result<Self> {
        let runtime_dir = runtime_dir.as_ref().to_path_buf();

        if !runtime_dir.exists() {
            std::fs::create_dir_all(&runtime_dir).context("Failed to create runtime directory")?;
        }

        Ok(Self {
            sockets: Vec::new(),
            runtime_dir,
        })
    }

    /// Socket manager for `$XDG_RUNTIME_DIR`.
    pub fn from_env() -> Result<Self> {
        let dir = std::env::var_os("XDG_RUNTIME_DIR").context("XDG_RUNTIME_DIR is not set")?;
        Self::new(dir)
    }

    /// Bind a socket with a fixed name.
    pub fn bind(&mut self, socket_name: &str) -> Result<&str> {
        let path = self.runtime_dir.join(socket_name);
        let socket = ListeningSocket::bind_absolute(path.clone())
            .with_context(|| format!("Failed to bind socket at {}", path.display()))?;
        Ok(self.push(socket, socket_name.to_string(), path))
    }

    /// Bind the first free `wayland-N`.
    pub fn bind_auto(&mut self) -> Result<&str> {
        for n in AUTO_RANGE {
            let name = format!("wayland-{}", n);
            let path = self.runtime_dir.join(&name);
            match ListeningSocket::bind_absolute(path.clone()) {
                Ok(socket) => return Ok(self.push(socket, name, path)),
                Err(e) => tracing::debug!(target: COMPOSITOR, "{} unavailable: {}", name, e),
            }
        }
        anyhow::bail!("No free wayland socket in {}", self.runtime_dir.display())
    }

    fn push(&mut self, socket: ListeningSocket, name: String, path: PathBuf) -> &str {
        tracing::info!(target: COMPOSITOR, "Listening on {}", path.display());
        self.sockets.push(BoundSocket { socket, name, path });
        self.sockets.last().map(|s| s.name.as_str()).unwrap_or_default()
    }

    /// Name of the first bound socket, for `WAYLAND_DISPLAY`.
    pub fn primary_socket_name(&self) -> Option<&str> {
        self.sockets.first().map(|s| s.name.as_str())
    }

    pub fn socket_paths(&self) -> Vec<&Path> {
        self.sockets.iter().map(|s| s.path.as_path()).collect()
    }

    /// Duplicated descriptors for registering with the event loop.
    pub fn poll_fds(&self) -> std::io::Result<Vec<OwnedFd>> {
        self.sockets
            .iter()
            .map(|s| s.socket.as_fd().try_clone_to_owned())
            .collect()
    }

    /// Accept a connection from any socket
    ///
    /// Returns `None` if no connections are pending
    pub fn accept_any(&self) -> Option<UnixStream> {
        for bound in &self.sockets {
            match bound.socket.accept() {
                Ok(Some(stream)) => return Some(stream),
                Ok(None) => {}
                Err(e) => tracing::warn!(target: COMPOSITOR, "accept on {} failed: {}", bound.name, e),
            }
        }
        None
    }

    /// Close all sockets; their files are removed as they drop.
    pub fn close_all(&mut self) {
        tracing::info!(target: COMPOSITOR, "Closing {} socket(s)", self.sockets.len());
        self.sockets.clear();
    }
}
