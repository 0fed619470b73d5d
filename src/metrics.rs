//! Metric helpers for `hvac_bridge`.
//!
//! Names and thin wrappers around the [`metrics`](https://docs.rs/metrics)
//! crate. With the `metrics` feature disabled every helper is a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Counter of frames seen on the wire, labelled by direction.
pub const FRAMES_TOTAL: &str = "hvac_bridge_frames_total";
/// Counter of malformed inbound frames.
pub const FRAME_ERRORS_TOTAL: &str = "hvac_bridge_frame_errors_total";
/// Counter of reconnect attempts.
pub const RECONNECTS_TOTAL: &str = "hvac_bridge_reconnects_total";
/// Gauge set to 1 while a gateway connection is up.
pub const CONNECTED: &str = "hvac_bridge_connected";
/// Counter of requests that got no response in time.
pub const REQUEST_TIMEOUTS_TOTAL: &str = "hvac_bridge_request_timeouts_total";

/// Direction of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Received from the gateway.
    Inbound,
    /// Sent to the gateway.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Record one frame for `direction`.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a malformed inbound frame.
pub fn inc_frame_errors() {
    #[cfg(feature = "metrics")]
    counter!(FRAME_ERRORS_TOTAL).increment(1);
}

/// Record a reconnect attempt.
pub fn inc_reconnects() {
    #[cfg(feature = "metrics")]
    counter!(RECONNECTS_TOTAL).increment(1);
}

/// Record a request timeout.
pub fn inc_request_timeouts() {
    #[cfg(feature = "metrics")]
    counter!(REQUEST_TIMEOUTS_TOTAL).increment(1);
}

/// Set the connection gauge.
pub fn set_connected(connected: bool) {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTED).set(if connected { 1.0 } else { 0.0 });
    #[cfg(not(feature = "metrics"))]
    let _ = connected;
}
