//! Control channel listening socket.

use std::os::unix::io::{AsFd, BorrowedFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::socket::{listen, Backlog, UnixAddr};
use nix::unistd::unlink;

use crate::core::errors::IpcError;
use crate::util::logging::IPC;

pub const SOCKET_NAME: &str = "cage-ipc.sock";

/// `$XDG_RUNTIME_DIR/cage-ipc.sock`
pub fn default_socket_path() -> Result<PathBuf, IpcError> {
    let dir = std::env::var_os("XDG_RUNTIME_DIR").ok_or(IpcError::NoRuntimeDir)?;
    Ok(Path::new(&dir).join(SOCKET_NAME))
}

/// Listening control socket; the socket file is removed on drop.
#[derive(Debug)]
pub struct ControlListener {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlListener {
    /// Bind with a backlog of one, replacing any stale socket file.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self, IpcError> {
        let path = path.as_ref();
        UnixAddr::new(path).map_err(|_| IpcError::PathTooLong(path.display().to_string()))?;

        match unlink(path) {
            Ok(()) | Err(Errno::ENOENT) => {}
            Err(e) => tracing::warn!(target: IPC, "Failed to remove stale {}: {}", path.display(), e),
        }

        let listener = UnixListener::bind(path)?;
        listen(&listener, Backlog::new(1)?)?;
        listener.set_nonblocking(true)?;

        tracing::info!(target: IPC, "Control socket listening on {}", path.display());
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Accept one pending connection as a non-blocking stream.
    pub fn accept(&self) -> Result<Option<UnixStream>, IpcError> {
        match self.listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(true)?;
                Ok(Some(stream))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsFd for ControlListener {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.listener.as_fd()
    }
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        if let Err(e) = unlink(&self.path) {
            tracing::debug!(target: IPC, "Failed to remove {}: {}", self.path.display(), e);
        }
    }
}
