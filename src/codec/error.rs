//! Error types for the frame codec.
//!
//! Every variant that is produced while decoding carries the frame length
//! that was already determined, so the caller can drop exactly that many
//! bytes and resynchronise on the next frame.

use std::io;

use thiserror::Error;

/// Wire-level problems found while framing the byte stream.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Trailing checksum does not match the frame contents.
    #[error("frame checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// Checksum computed over the received bytes.
        expected: u8,
        /// Checksum byte found on the wire.
        actual: u8,
        /// Length of the rejected frame.
        frame_length: usize,
    },

    /// Buffer does not start with the frame head byte.
    #[error("invalid frame head byte {byte:#04x}, skipping {skipped} bytes")]
    InvalidHeader {
        /// Offending byte.
        byte: u8,
        /// Bytes discarded up to the next candidate head byte.
        skipped: usize,
    },

    /// Push frame declares a length too short to hold a command and checksum.
    #[error("declared push frame length {declared} is too short")]
    InvalidLength {
        /// Declared length byte.
        declared: u8,
    },

    /// Outbound payload does not fit the one-byte length field.
    #[error("payload of {len} bytes exceeds the 255 byte limit")]
    PayloadTooLong {
        /// Payload length that was rejected.
        len: usize,
    },
}

impl FrameError {
    /// Number of buffered bytes that belong to the rejected input.
    ///
    /// Garbage before a head byte is skipped in one step; a bad length
    /// only discards the head byte itself.
    #[must_use]
    pub fn consumed(&self) -> usize {
        match self {
            Self::ChecksumMismatch { frame_length, .. } => *frame_length,
            Self::InvalidHeader { skipped, .. } => *skipped,
            Self::InvalidLength { .. } | Self::PayloadTooLong { .. } => 1,
        }
    }
}

impl From<FrameError> for io::Error {
    fn from(error: FrameError) -> Self { io::Error::new(io::ErrorKind::InvalidData, error) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_error_consumes_whole_frame() {
        let error = FrameError::ChecksumMismatch {
            expected: 0x10,
            actual: 0x11,
            frame_length: 9,
        };
        assert_eq!(error.consumed(), 9);
        assert_eq!(FrameError::InvalidHeader { byte: 0, skipped: 3 }.consumed(), 3);
        assert_eq!(FrameError::InvalidLength { declared: 1 }.consumed(), 1);
    }

    #[test]
    fn converts_into_invalid_data() {
        let io_error: io::Error = FrameError::PayloadTooLong { len: 300 }.into();
        assert_eq!(io_error.kind(), io::ErrorKind::InvalidData);
    }
}
