//! Events published by the bridge.
//!
//! Events fan out over a `tokio::sync::broadcast` channel. Slow subscribers
//! lose the oldest events rather than stalling the reader.

use bytes::Bytes;
use tokio::sync::broadcast;

use crate::{error::BridgeError, frame::DecodedFrame, status::StatusValues};

/// Something observable happened on the gateway link.
#[derive(Clone, Debug)]
pub enum BridgeEvent {
    /// A connection to the gateway was established.
    Connected,
    /// The connection was lost or closed.
    Disconnected,
    /// A status snapshot was decoded and recorded.
    StatusData {
        /// Decoded datapoints.
        values: StatusValues,
        /// Cache version the snapshot was recorded under.
        version: u64,
        /// Status payload as received, without header or checksum.
        payload: Bytes,
    },
    /// A frame that matched no pending request.
    Frame(DecodedFrame),
    /// A non-fatal error, such as a failed connect attempt.
    Error(BridgeError),
}

/// Sending half shared by the connection tasks.
#[derive(Clone, Debug)]
pub(crate) struct EventSink(broadcast::Sender<BridgeEvent>);

impl EventSink {
    pub(crate) fn new(capacity: usize) -> Self { Self(broadcast::channel(capacity).0) }

    /// Publish `event`; having no subscriber is not an error.
    pub(crate) fn emit(&self, event: BridgeEvent) { let _ = self.0.send(event); }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> { self.0.subscribe() }
}
