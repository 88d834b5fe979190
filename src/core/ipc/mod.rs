//! Control channel: a local stream socket for external tooling.
//!
//! Clients may query the guest cursor position and toggle forced frame
//! refresh. Each connection keeps a 512 byte buffer in each direction;
//! overflowing either closes that connection only.

pub mod client;
pub mod codec;
pub mod server;

pub use client::{ClientStatus, ControlHandler, IpcClient};
pub use codec::{Command, ControlCodec, Reply};
pub use server::{default_socket_path, ControlListener, SOCKET_NAME};
