//! Frame types exchanged with the serial gateway.
//!
//! Two frame families share the wire. Command/response frames carry a
//! sequence number and are used for everything the bridge initiates.
//! Push frames are emitted by the unit on its own (or after a status poll)
//! and carry no sequence number.

use bytes::Bytes;

/// First byte of every frame.
pub const FRAME_HEAD: u8 = 0xAA;
/// Second byte of a command/response frame.
pub const COMMAND_MARKER: u8 = 0x55;
/// Bit set on the command byte of every response.
pub const RESPONSE_FLAG: u8 = 0x80;

/// Status poll request.
pub const CMD_STATUS_POLL: u8 = 0x41;
/// Command byte carried by unsolicited status pushes.
pub const CMD_STATUS_PUSH: u8 = 0xAC;
/// Command byte of an error-flagged response. The payload is
/// `[original_command, error_code]`.
pub const CMD_ERROR: u8 = 0xFF;

/// Bytes surrounding the payload of a command/response frame:
/// head, marker, sequence, command, length and checksum.
pub const COMMAND_OVERHEAD: usize = 6;

/// Which of the two families a frame belongs to, and its direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Command/response frame without the response flag.
    Request,
    /// Command/response frame with the response flag set.
    Response,
    /// Push frame.
    Status,
    /// Response flagged as an error by the device.
    Error,
}

/// A complete frame lifted off the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Sequence number, absent for push frames.
    pub sequence: Option<u8>,
    /// Command byte.
    pub command: u8,
    /// Payload without framing or checksum.
    pub payload: Bytes,
    /// Family and direction.
    pub kind: FrameKind,
    /// Number of wire bytes the frame occupied.
    pub frame_length: usize,
}

impl DecodedFrame {
    /// Returns `true` for push frames tagged as status snapshots.
    #[must_use]
    pub fn is_status_push(&self) -> bool {
        self.kind == FrameKind::Status && self.command == CMD_STATUS_PUSH
    }

    /// Returns `true` when the frame answers a status poll.
    #[must_use]
    pub fn is_poll_response(&self) -> bool {
        self.kind == FrameKind::Response && self.command == CMD_STATUS_POLL | RESPONSE_FLAG
    }

    /// Error code carried by an error-flagged response.
    #[must_use]
    pub fn error_code(&self) -> Option<(u8, u8)> {
        if self.kind != FrameKind::Error {
            return None;
        }
        match self.payload.as_ref() {
            [command, code, ..] => Some((*command, *code)),
            [code] => Some((0, *code)),
            [] => Some((0, 0)),
        }
    }
}

/// Command/response frame queued for transmission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Sequence number in `1..=255`.
    pub sequence: u8,
    /// Command byte.
    pub command: u8,
    /// Payload, at most 255 bytes.
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Construct a frame from its parts.
    #[must_use]
    pub fn new(sequence: u8, command: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            command,
            payload: payload.into(),
        }
    }

    /// Wire length of the encoded frame.
    #[must_use]
    pub fn wire_len(&self) -> usize { self.payload.len() + COMMAND_OVERHEAD }
}
