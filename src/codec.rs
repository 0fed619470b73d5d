//! Frame codec for the gateway wire protocol.
//!
//! Two frame families share the byte stream:
//!
//! | Family | Layout | Checksum |
//! |---|---|---|
//! | command/response | `AA 55 seq cmd len payload[len] chk` | sum of all preceding bytes |
//! | push | `AA len cmd payload.. chk`, `len + 1` bytes in total | two's complement of the interior sum |
//!
//! [`decode_frame`] never consumes anything: it reports either that more
//! bytes are needed, or a frame (or error) together with the exact number of
//! bytes it spans. [`HvacFrameCodec`] wraps it as a `tokio_util` decoder that
//! advances the receive buffer by that amount, so a corrupt frame is dropped
//! without losing the framing of whatever follows it.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    datapoint::{CommandSpec, DatapointValue},
    frame::{
        CMD_ERROR,
        COMMAND_MARKER,
        COMMAND_OVERHEAD,
        DecodedFrame,
        FRAME_HEAD,
        FrameKind,
        OutboundFrame,
        RESPONSE_FLAG,
    },
};

pub mod error;

pub use error::FrameError;

/// Bytes needed before a command/response frame length is known.
const COMMAND_HEADER_LEN: usize = 5;
/// Bytes needed before a push frame length is known.
const PUSH_HEADER_LEN: usize = 2;
/// Smallest valid push declared length: length, command and checksum bytes.
const MIN_PUSH_DECLARED_LEN: u8 = 3;

/// Checksum arithmetic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumScheme {
    /// Sum of the covered bytes modulo 256.
    Sum,
    /// `(256 - sum) mod 256` over the covered bytes.
    #[default]
    TwosComplement,
}

impl ChecksumScheme {
    /// Compute the checksum of `bytes`.
    #[must_use]
    pub fn compute(self, bytes: &[u8]) -> u8 {
        let sum = bytes.iter().fold(0_u8, |acc, byte| acc.wrapping_add(*byte));
        match self {
            Self::Sum => sum,
            Self::TwosComplement => 0_u8.wrapping_sub(sum),
        }
    }
}

/// Outcome of inspecting the head of the receive buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A complete, checksum-valid frame.
    Frame(DecodedFrame),
    /// Bytes that had to be dropped.
    Rejected(FrameError),
}

impl Inbound {
    /// Number of buffer bytes this outcome accounts for.
    #[must_use]
    pub fn consumed(&self) -> usize {
        match self {
            Self::Frame(frame) => frame.frame_length,
            Self::Rejected(error) => error.consumed(),
        }
    }
}

/// Inspect the start of `buf` without consuming it.
///
/// Returns `None` while the frame length cannot yet be determined or the
/// frame is not yet complete. Push frame checksums use `push_checksum`;
/// command/response frames always use a plain sum.
#[must_use]
pub fn decode_frame(buf: &[u8], push_checksum: ChecksumScheme) -> Option<Inbound> {
    let &first = buf.first()?;
    if first != FRAME_HEAD {
        let skipped = buf
            .iter()
            .position(|byte| *byte == FRAME_HEAD)
            .unwrap_or(buf.len());
        return Some(Inbound::Rejected(FrameError::InvalidHeader {
            byte: first,
            skipped,
        }));
    }
    let &second = buf.get(1)?;
    if second == COMMAND_MARKER {
        decode_command(buf)
    } else {
        decode_push(buf, second, push_checksum)
    }
}

fn decode_command(buf: &[u8]) -> Option<Inbound> {
    if buf.len() < COMMAND_HEADER_LEN {
        return None;
    }
    let frame_length = usize::from(buf[4]) + COMMAND_OVERHEAD;
    let frame = buf.get(..frame_length)?;
    let (body, trailer) = frame.split_at(frame_length - 1);
    let expected = ChecksumScheme::Sum.compute(body);
    if let Some(rejected) = check(expected, trailer[0], frame_length) {
        return Some(rejected);
    }

    let command = buf[3];
    let kind = if command == CMD_ERROR {
        FrameKind::Error
    } else if command & RESPONSE_FLAG != 0 {
        FrameKind::Response
    } else {
        FrameKind::Request
    };
    Some(Inbound::Frame(DecodedFrame {
        sequence: Some(buf[2]),
        command,
        payload: Bytes::copy_from_slice(&body[COMMAND_HEADER_LEN..]),
        kind,
        frame_length,
    }))
}

fn decode_push(buf: &[u8], declared: u8, scheme: ChecksumScheme) -> Option<Inbound> {
    if declared < MIN_PUSH_DECLARED_LEN {
        return Some(Inbound::Rejected(FrameError::InvalidLength { declared }));
    }
    let frame_length = usize::from(declared) + 1;
    let frame = buf.get(..frame_length)?;
    debug_assert!(frame.len() >= PUSH_HEADER_LEN + 2);
    let interior = &frame[1..frame_length - 1];
    let expected = scheme.compute(interior);
    if let Some(rejected) = check(expected, frame[frame_length - 1], frame_length) {
        return Some(rejected);
    }
    Some(Inbound::Frame(DecodedFrame {
        sequence: None,
        command: frame[2],
        payload: Bytes::copy_from_slice(&frame[3..frame_length - 1]),
        kind: FrameKind::Status,
        frame_length,
    }))
}

fn check(expected: u8, actual: u8, frame_length: usize) -> Option<Inbound> {
    (expected != actual).then_some(Inbound::Rejected(FrameError::ChecksumMismatch {
        expected,
        actual,
        frame_length,
    }))
}

/// Build a command frame from a command definition.
///
/// # Errors
///
/// Returns [`FrameError::PayloadTooLong`] if the built payload exceeds 255
/// bytes.
pub fn encode_frame(
    spec: &CommandSpec,
    value: Option<&DatapointValue>,
    sequence: u8,
) -> Result<Bytes, FrameError> {
    let frame = OutboundFrame::new(sequence, spec.command, spec.build(value));
    let mut dst = BytesMut::with_capacity(frame.wire_len());
    put_command(&frame, &mut dst)?;
    Ok(dst.freeze())
}

fn put_command(frame: &OutboundFrame, dst: &mut BytesMut) -> Result<(), FrameError> {
    let len = u8::try_from(frame.payload.len()).map_err(|_| FrameError::PayloadTooLong {
        len: frame.payload.len(),
    })?;
    let start = dst.len();
    dst.reserve(frame.wire_len());
    dst.put_u8(FRAME_HEAD);
    dst.put_u8(COMMAND_MARKER);
    dst.put_u8(frame.sequence);
    dst.put_u8(frame.command);
    dst.put_u8(len);
    dst.extend_from_slice(&frame.payload);
    let checksum = ChecksumScheme::Sum.compute(&dst[start..]);
    dst.put_u8(checksum);
    Ok(())
}

/// Build a push frame, as emitted by the unit.
///
/// Used by gateway emulators and tests.
///
/// # Errors
///
/// Returns [`FrameError::PayloadTooLong`] if the frame would not fit the
/// one-byte length field.
pub fn encode_push(command: u8, payload: &[u8], scheme: ChecksumScheme) -> Result<Bytes, FrameError> {
    // length byte + command + payload + checksum
    let declared = u8::try_from(payload.len() + 3).map_err(|_| FrameError::PayloadTooLong {
        len: payload.len(),
    })?;
    if declared == COMMAND_MARKER {
        // A declared length of 0x55 reads as a command/response frame.
        return Err(FrameError::PayloadTooLong { len: payload.len() });
    }
    let mut dst = BytesMut::with_capacity(usize::from(declared) + 1);
    dst.put_u8(FRAME_HEAD);
    dst.put_u8(declared);
    dst.put_u8(command);
    dst.extend_from_slice(payload);
    let checksum = scheme.compute(&dst[1..]);
    dst.put_u8(checksum);
    Ok(dst.freeze())
}

/// `tokio_util` codec for the gateway stream.
///
/// Decodes [`Inbound`] items (frames and rejected byte runs) and encodes
/// [`OutboundFrame`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct HvacFrameCodec {
    push_checksum: ChecksumScheme,
}

impl HvacFrameCodec {
    /// Construct a codec using `push_checksum` for push frames.
    #[must_use]
    pub fn new(push_checksum: ChecksumScheme) -> Self { Self { push_checksum } }
}

impl Decoder for HvacFrameCodec {
    type Item = Inbound;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(inbound) = decode_frame(src, self.push_checksum) else {
            return Ok(None);
        };
        if let Inbound::Rejected(error) = &inbound {
            tracing::debug!(%error, buffered = src.len(), "dropping malformed input");
        }
        src.advance(inbound.consumed());
        Ok(Some(inbound))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(inbound) => Ok(Some(inbound)),
            None if src.is_empty() => Ok(None),
            None => {
                tracing::debug!(remaining = src.len(), "connection closed mid-frame");
                src.clear();
                Ok(None)
            }
        }
    }
}

impl Encoder<OutboundFrame> for HvacFrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: OutboundFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        put_command(&item, dst).map_err(io::Error::from)
    }
}
