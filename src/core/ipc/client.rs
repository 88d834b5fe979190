//! One control channel connection.

use std::io::{ErrorKind, Read, Write};

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::codec::{Command, ControlCodec, Reply, BUFFER_CAP};
use crate::core::errors::IpcError;
use crate::util::logging::IPC;

/// Compositor operations reachable over the control channel.
pub trait ControlHandler {
    /// Current guest cursor position in output coordinates.
    fn cursor_position(&self) -> (f64, f64);

    fn set_force_refresh(&mut self, enabled: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Open,
    /// Peer hung up; the connection must be dropped.
    Closed,
}

/// Buffered state of one control connection.
#[derive(Debug)]
pub struct IpcClient {
    codec: ControlCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IpcClient {
    pub fn new() -> Self {
        Self {
            codec: ControlCodec::default(),
            read_buf: BytesMut::with_capacity(BUFFER_CAP),
            write_buf: BytesMut::with_capacity(BUFFER_CAP),
        }
    }

    /// Service a readiness notification.
    ///
    /// Reads everything available, runs the complete commands, then writes
    /// as much of the pending output as the socket accepts. Any error means
    /// the connection must be closed.
    pub fn on_ready<S, H>(&mut self, mut io: S, readable: bool, handler: &mut H) -> Result<ClientStatus, IpcError>
    where
        S: Read + Write,
        H: ControlHandler,
    {
        if readable && self.read_from(&mut io, handler)? == ClientStatus::Closed {
            return Ok(ClientStatus::Closed);
        }
        self.flush_to(&mut io)?;
        Ok(ClientStatus::Open)
    }

    fn read_from<R, H>(&mut self, io: &mut R, handler: &mut H) -> Result<ClientStatus, IpcError>
    where
        R: Read,
        H: ControlHandler,
    {
        let mut chunk = [0u8; BUFFER_CAP];
        loop {
            let room = BUFFER_CAP - self.read_buf.len();
            match io.read(&mut chunk[..room]) {
                Ok(0) => return Ok(ClientStatus::Closed),
                Ok(n) => {
                    self.read_buf.extend_from_slice(&chunk[..n]);
                    self.handle_input(handler)?;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(ClientStatus::Open),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!(target: IPC, "Failed to read from client: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    /// Run every complete command sitting in the read buffer.
    pub fn handle_input<H: ControlHandler>(&mut self, handler: &mut H) -> Result<(), IpcError> {
        while let Some(command) = self.codec.decode(&mut self.read_buf)? {
            tracing::debug!(target: IPC, "Command {:?}", command);
            match command {
                Command::GetCursorPos => {
                    let (x, y) = handler.cursor_position();
                    self.queue_reply(Reply::cursor(x, y))?;
                }
                Command::EnableForceRefresh => handler.set_force_refresh(true),
                Command::DisableForceRefresh => handler.set_force_refresh(false),
                Command::Invalid => {
                    tracing::error!(target: IPC, "IPC invalid command");
                    self.queue_reply(Reply::InvalidCommand)?;
                }
            }
        }
        Ok(())
    }

    fn queue_reply(&mut self, reply: Reply) -> Result<(), IpcError> {
        self.codec.encode(reply, &mut self.write_buf).inspect_err(|_| {
            tracing::error!(target: IPC, "IPC client write overflow");
        })
    }

    /// Write pending output; whatever the socket refuses stays buffered.
    pub fn flush_to<W: Write>(&mut self, io: &mut W) -> Result<(), IpcError> {
        while !self.write_buf.is_empty() {
            match io.write(&self.write_buf) {
                Ok(0) => return Err(IpcError::Io(ErrorKind::WriteZero.into())),
                Ok(n) => self.write_buf.advance(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!(target: IPC, "IPC write error: {}", e);
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    pub fn pending_output(&self) -> usize {
        self.write_buf.len()
    }
}
