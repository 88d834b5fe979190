//! Core error types

use thiserror::Error;

/// Core compositor errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Event loop error: {0}")]
    EventLoopError(String),

    #[error("Socket error: {0}")]
    SocketError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn event_loop_error(msg: impl Into<String>) -> Self {
        Self::EventLoopError(msg.into())
    }

    pub fn socket_error(msg: impl Into<String>) -> Self {
        Self::SocketError(msg.into())
    }
}

/// Host connection errors
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Failed to connect to host compositor: {0}")]
    Connect(#[from] wayland_client::ConnectError),

    #[error("Host compositor does not advertise {0}")]
    MissingGlobal(&'static str),

    #[error("Host dispatch failed: {0}")]
    Dispatch(#[from] wayland_client::DispatchError),

    #[error("Host connection failed: {0}")]
    Backend(#[from] wayland_client::backend::WaylandError),

    #[error("Failed to allocate host buffer: {0}")]
    Buffer(#[from] std::io::Error),
}

/// Control channel errors
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("XDG_RUNTIME_DIR is not set")]
    NoRuntimeDir,

    #[error("Socket path too long: {0}")]
    PathTooLong(String),

    #[error("Invalid frame length {0}")]
    InvalidLength(usize),

    #[error("Write buffer full, dropping reply")]
    Overflow,

    #[error(transparent)]
    Errno(#[from] nix::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
