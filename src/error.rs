//! Canonical error and result types for the crate.
//!
//! `BridgeError` is the single error surface of the public API. Frame
//! corruption never reaches callers through it on the receive path; the
//! `Frame` variant only appears when an outbound frame cannot be built.

use std::{io, sync::Arc, time::Duration};

use thiserror::Error;

use crate::{codec::FrameError, value::ValueError};

/// Errors returned by [`crate::HvacBridge`] operations.
#[derive(Clone, Debug, Error)]
pub enum BridgeError {
    /// Socket-level failure. Triggers reconnect scheduling.
    #[error("transport error: {0}")]
    Transport(Arc<io::Error>),
    /// Frame could not be built or parsed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    /// A request or wait did not complete in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being waited for.
        operation: &'static str,
        /// Configured limit.
        after: Duration,
    },
    /// The device answered with an error-flagged response.
    #[error("device rejected command {command:#04x} with code {code:#04x}")]
    Protocol {
        /// Command the device refused.
        command: u8,
        /// Device error code.
        code: u8,
    },
    /// The device answered with a payload that could not be interpreted.
    #[error("unexpected response to command {command:#04x}")]
    UnexpectedResponse {
        /// Command that was answered.
        command: u8,
    },
    /// Caller supplied an invalid value.
    #[error(transparent)]
    Value(#[from] ValueError),
    /// The connection dropped while the operation was outstanding.
    #[error("connection lost")]
    Disconnected,
    /// No connection is established.
    #[error("not connected")]
    NotConnected,
    /// Every sequence number is taken by an outstanding request.
    #[error("sequence number {0} is still awaiting a response")]
    SequenceInUse(u8),
    /// The bridge was shut down.
    #[error("bridge closed")]
    Closed,
}

impl From<io::Error> for BridgeError {
    fn from(error: io::Error) -> Self { Self::Transport(Arc::new(error)) }
}

impl BridgeError {
    /// Returns `true` for socket-level failures.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Disconnected | Self::NotConnected)
    }

    /// Returns `true` for timeouts.
    #[must_use]
    pub fn is_timeout(&self) -> bool { matches!(self, Self::Timeout { .. }) }

    pub(crate) fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout { operation, after }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;
