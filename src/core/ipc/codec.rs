//! Control channel framing.
//!
//! Framing: `[2 bytes: total length, little-endian u16][payload]`. The
//! length counts the header itself, so the smallest frame is 2 bytes.
//! Commands are matched on their ASCII prefix; trailing bytes are ignored.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::errors::IpcError;

pub const HEADER_LEN: usize = 2;

/// Per-connection buffer capacity, in each direction.
pub const BUFFER_CAP: usize = 512;

pub const GET_CURSOR_POS: &[u8] = b"get_cursor_pos";
pub const ENABLE_FORCE_REFRESH: &[u8] = b"enable_force_refresh";
pub const DISABLE_FORCE_REFRESH: &[u8] = b"disable_force_refresh";
pub const INVALID_COMMAND: &[u8] = b"invalid_command";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetCursorPos,
    EnableForceRefresh,
    DisableForceRefresh,
    Invalid,
}

impl Command {
    pub fn parse(payload: &[u8]) -> Self {
        if payload.starts_with(GET_CURSOR_POS) {
            Self::GetCursorPos
        } else if payload.starts_with(ENABLE_FORCE_REFRESH) {
            Self::EnableForceRefresh
        } else if payload.starts_with(DISABLE_FORCE_REFRESH) {
            Self::DisableForceRefresh
        } else {
            Self::Invalid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    CursorPos { x: u32, y: u32 },
    InvalidCommand,
}

impl Reply {
    /// Cursor reply from compositor coordinates; negatives clamp to 0.
    pub fn cursor(x: f64, y: f64) -> Self {
        Self::CursorPos {
            x: x.max(0.0) as u32,
            y: y.max(0.0) as u32,
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            Self::CursorPos { .. } => 8,
            Self::InvalidCommand => INVALID_COMMAND.len(),
        }
    }
}

/// Codec for one control connection.
#[derive(Debug)]
pub struct ControlCodec {
    /// Total length of the frame being read, once its header is consumed
    pending_len: Option<usize>,
    max_frame: usize,
}

impl Default for ControlCodec {
    fn default() -> Self {
        Self::new(BUFFER_CAP)
    }
}

impl ControlCodec {
    pub fn new(max_frame: usize) -> Self {
        Self {
            pending_len: None,
            max_frame,
        }
    }
}

impl Decoder for ControlCodec {
    type Item = Command;
    type Error = IpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let total = match self.pending_len {
            Some(len) => len,
            None => {
                if src.len() < HEADER_LEN {
                    return Ok(None);
                }
                let len = src.get_u16_le() as usize;
                if !(HEADER_LEN..=self.max_frame).contains(&len) {
                    return Err(IpcError::InvalidLength(len));
                }
                self.pending_len = Some(len);
                len
            }
        };

        let payload_len = total - HEADER_LEN;
        if src.len() < payload_len {
            return Ok(None);
        }

        let payload = src.split_to(payload_len);
        self.pending_len = None;
        Ok(Some(Command::parse(&payload)))
    }
}

impl Encoder<Reply> for ControlCodec {
    type Error = IpcError;

    /// Fails with [`IpcError::Overflow`] when `dst` cannot hold the frame
    /// within the buffer capacity.
    fn encode(&mut self, item: Reply, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total = HEADER_LEN + item.payload_len();
        if dst.len() + total > self.max_frame {
            return Err(IpcError::Overflow);
        }

        dst.reserve(total);
        dst.put_u16_le(total as u16);
        match item {
            Reply::CursorPos { x, y } => {
                dst.put_u32_le(x);
                dst.put_u32_le(y);
            }
            Reply::InvalidCommand => dst.extend_from_slice(INVALID_COMMAND),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u16_le((payload.len() + HEADER_LEN) as u16);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_parse_prefix_match() {
        assert_eq!(Command::parse(b"get_cursor_pos"), Command::GetCursorPos);
        assert_eq!(Command::parse(b"get_cursor_pos\0"), Command::GetCursorPos);
        assert_eq!(Command::parse(b"enable_force_refresh_now"), Command::EnableForceRefresh);
        assert_eq!(Command::parse(b"disable_force_refresh"), Command::DisableForceRefresh);
        assert_eq!(Command::parse(b"get_cursor"), Command::Invalid);
        assert_eq!(Command::parse(b""), Command::Invalid);
        assert_eq!(Command::parse(b"hello"), Command::Invalid);
    }

    #[test]
    fn test_decode_waits_for_full_frame() {
        let mut codec = ControlCodec::default();
        let full = frame(b"get_cursor_pos");

        let mut buf = BytesMut::from(&full[..1]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&full[1..6]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&full[6..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::GetCursorPos));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_back_to_back_frames() {
        let mut codec = ControlCodec::default();
        let mut buf = frame(b"enable_force_refresh");
        buf.extend_from_slice(&frame(b"bogus"));
        buf.extend_from_slice(&frame(b"disable_force_refresh"));

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::EnableForceRefresh));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::Invalid));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::DisableForceRefresh));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_decode_empty_payload_is_invalid_command() {
        let mut codec = ControlCodec::default();
        let mut buf = frame(b"");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::Invalid));
    }

    #[test]
    fn test_decode_rejects_bad_lengths() {
        let mut codec = ControlCodec::default();
        let mut short = BytesMut::from(&[1u8, 0][..]);
        assert!(matches!(codec.decode(&mut short), Err(IpcError::InvalidLength(1))));

        let mut codec = ControlCodec::default();
        let mut long = BytesMut::new();
        long.put_u16_le((BUFFER_CAP + 1) as u16);
        assert!(matches!(codec.decode(&mut long), Err(IpcError::InvalidLength(513))));
    }

    #[test]
    fn test_encode_cursor_reply() {
        let mut codec = ControlCodec::default();
        let mut dst = BytesMut::new();
        codec.encode(Reply::CursorPos { x: 300, y: 2 }, &mut dst).unwrap();
        assert_eq!(&dst[..], &[10, 0, 0x2c, 0x01, 0, 0, 2, 0, 0, 0]);
    }

    #[test]
    fn test_encode_invalid_reply() {
        let mut codec = ControlCodec::default();
        let mut dst = BytesMut::new();
        codec.encode(Reply::InvalidCommand, &mut dst).unwrap();
        assert_eq!(u16::from_le_bytes([dst[0], dst[1]]) as usize, 2 + INVALID_COMMAND.len());
        assert_eq!(&dst[2..], INVALID_COMMAND);
    }

    #[test]
    fn test_encode_overflow() {
        let mut codec = ControlCodec::default();
        let mut dst = BytesMut::new();
        // 51 cursor replies of 10 bytes fit in 512, the 52nd does not
        for _ in 0..51 {
            codec.encode(Reply::CursorPos { x: 0, y: 0 }, &mut dst).unwrap();
        }
        assert!(matches!(
            codec.encode(Reply::CursorPos { x: 0, y: 0 }, &mut dst),
            Err(IpcError::Overflow)
        ));
        assert_eq!(dst.len(), 510);
    }

    #[test]
    fn test_cursor_reply_truncates_and_clamps() {
        assert_eq!(Reply::cursor(10.9, 20.2), Reply::CursorPos { x: 10, y: 20 });
        assert_eq!(Reply::cursor(-4.0, 7.0), Reply::CursorPos { x: 0, y: 7 });
    }
}
