//! Bridge configuration.
//!
//! `BridgeConfig` deserializes from any serde format with every field
//! optional, and offers builder-style setters for programmatic use.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    codec::ChecksumScheme,
    connection::SocketOptions,
    status::ProtocolRevision,
    value::EnumRepresentation,
};

/// Lower bound on the interval between status polls.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(200);

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Settings for one bridge instance.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use hvac_bridge::{BridgeConfig, status::ProtocolRevision};
///
/// let config = BridgeConfig::new("192.168.1.40", 8899)
///     .revision(ProtocolRevision::Extended)
///     .reconnect_interval(Duration::from_secs(10));
/// assert_eq!(config.port, 8899);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Gateway host name or address.
    pub host: String,
    /// Gateway TCP port.
    pub port: u16,
    /// Fixed delay between reconnect attempts.
    #[serde(with = "duration_ms", rename = "reconnect_interval_ms")]
    pub reconnect_interval: Duration,
    /// Reconnect after the connection drops.
    pub auto_reconnect: bool,
    /// Limit on establishing the TCP connection.
    #[serde(with = "duration_ms", rename = "connect_timeout_ms")]
    pub connect_timeout: Duration,
    /// Limit on waiting for a command response.
    #[serde(with = "duration_ms", rename = "request_timeout_ms")]
    pub request_timeout: Duration,
    /// Limit on waiting for a status update.
    #[serde(with = "duration_ms", rename = "status_timeout_ms")]
    pub status_timeout: Duration,
    /// Minimum spacing of status polls.
    #[serde(with = "duration_ms", rename = "min_poll_interval_ms")]
    pub min_poll_interval: Duration,
    /// Status layout spoken by the unit.
    pub revision: ProtocolRevision,
    /// Checksum arithmetic of push frames.
    pub push_checksum: ChecksumScheme,
    /// Symbolic or numeric presentation of enum values.
    pub representation: EnumRepresentation,
    /// Options applied to the TCP socket.
    pub socket: SocketOptions,
    /// Depth of the event broadcast channel.
    pub event_capacity: usize,
    /// Depth of the outbound frame queue.
    pub send_queue_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8899,
            reconnect_interval: Duration::from_secs(5),
            auto_reconnect: true,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(3),
            status_timeout: Duration::from_secs(5),
            min_poll_interval: MIN_POLL_INTERVAL,
            revision: ProtocolRevision::default(),
            push_checksum: ChecksumScheme::default(),
            representation: EnumRepresentation::default(),
            socket: SocketOptions::default().nodelay(true),
            event_capacity: 64,
            send_queue_capacity: 32,
        }
    }
}

impl BridgeConfig {
    /// Default configuration for `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Set the reconnect delay.
    #[must_use]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Enable or disable reconnecting.
    #[must_use]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the response timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the status wait timeout.
    #[must_use]
    pub fn status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Set the protocol revision.
    #[must_use]
    pub fn revision(mut self, revision: ProtocolRevision) -> Self {
        self.revision = revision;
        self
    }

    /// Set the push frame checksum scheme.
    #[must_use]
    pub fn push_checksum(mut self, scheme: ChecksumScheme) -> Self {
        self.push_checksum = scheme;
        self
    }

    /// Set the enum representation.
    #[must_use]
    pub fn representation(mut self, representation: EnumRepresentation) -> Self {
        self.representation = representation;
        self
    }

    /// Set socket options.
    #[must_use]
    pub fn socket(mut self, socket: SocketOptions) -> Self {
        self.socket = socket;
        self
    }

    /// `host:port` of the gateway.
    #[must_use]
    pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

    /// Clamp values to workable bounds.
    ///
    /// Zero durations become 1 ms, the poll interval is raised to
    /// [`MIN_POLL_INTERVAL`] and channel depths to at least one.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use hvac_bridge::{BridgeConfig, config::MIN_POLL_INTERVAL};
    ///
    /// let mut config = BridgeConfig::default().request_timeout(Duration::ZERO);
    /// config.min_poll_interval = Duration::from_millis(10);
    /// let normalized = config.normalized();
    /// assert_eq!(normalized.request_timeout, Duration::from_millis(1));
    /// assert_eq!(normalized.min_poll_interval, MIN_POLL_INTERVAL);
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let floor = Duration::from_millis(1);
        self.reconnect_interval = self.reconnect_interval.max(floor);
        self.connect_timeout = self.connect_timeout.max(floor);
        self.request_timeout = self.request_timeout.max(floor);
        self.status_timeout = self.status_timeout.max(floor);
        self.min_poll_interval = self.min_poll_interval.max(MIN_POLL_INTERVAL);
        self.event_capacity = self.event_capacity.max(1);
        self.send_queue_capacity = self.send_queue_capacity.max(1);
        self
    }
}
