//! Public façade over the gateway connection.
//!
//! [`HvacBridge`] ties the connection manager, request correlator and status
//! cache together. Reads come in two flavours: [`HvacBridge::query`] polls
//! the unit for a status snapshot and reads the cache, [`HvacBridge::read`]
//! sends a datapoint's query command and waits for its response. Writes go
//! through [`HvacBridge::set`], which waits for a status snapshot confirming
//! the datapoint and degrades to the cached or requested value if none
//! arrives in time.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use bytes::Bytes;
use leaky_bucket::RateLimiter;
use log::debug;
use serde::Serialize;
use tokio::sync::{Mutex, broadcast, oneshot, watch};

use crate::{
    cache::{CachedValue, StatusWaiter, WaitOutcome},
    config::BridgeConfig,
    connection::{ConnectionManager, ConnectionState, Connector, Supervisor, TcpConnector},
    datapoint::{DatapointId, DatapointValue, STATUS_POLL},
    error::{BridgeError, Result},
    event::BridgeEvent,
    frame::DecodedFrame,
    value::{Value, ValueError},
};

/// Options for [`HvacBridge::query`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Ignore the cache and wait for a snapshot newer than the call.
    pub require_fresh: bool,
    /// Override the configured status timeout.
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    /// Options demanding a fresh snapshot.
    #[must_use]
    pub fn fresh() -> Self {
        Self {
            require_fresh: true,
            timeout: None,
        }
    }
}

/// Options for [`HvacBridge::set`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetOptions {
    /// Poll for status after writing instead of waiting for a push.
    pub refresh: bool,
    /// Override the configured status timeout.
    pub timeout: Option<Duration>,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            refresh: true,
            timeout: None,
        }
    }
}

/// How the value returned by [`HvacBridge::set`] was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// A status snapshot reported the datapoint after the write.
    Confirmed,
    /// No confirmation arrived; the last cached value is returned.
    Cached,
    /// No confirmation and nothing cached; the requested value is echoed.
    Optimistic,
}

/// Result of [`HvacBridge::set`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SetOutcome {
    pub datapoint: DatapointId,
    pub value: Value,
    pub confirmation: Confirmation,
}

/// Raw command for [`HvacBridge::send_command`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawCommand {
    pub command: u8,
    pub payload: Bytes,
    /// Wait for the response carrying the same sequence number.
    pub expect_response: bool,
}

impl RawCommand {
    /// Command expecting a response.
    #[must_use]
    pub fn new(command: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
            expect_response: true,
        }
    }

    /// Do not wait for a response.
    #[must_use]
    pub fn fire_and_forget(mut self) -> Self {
        self.expect_response = false;
        self
    }
}

/// Every cached datapoint at one cache version.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub version: u64,
    pub values: BTreeMap<DatapointId, Value>,
}

/// Bridge to one HVAC unit behind a serial gateway.
///
/// # Examples
///
/// ```no_run
/// use hvac_bridge::{BridgeConfig, HvacBridge, QueryOptions, SetOptions, datapoint::DatapointId};
///
/// # #[tokio::main]
/// # async fn main() -> hvac_bridge::Result<()> {
/// let bridge = HvacBridge::new(BridgeConfig::new("192.168.1.40", 8899));
/// bridge.connect().await?;
/// let mode = bridge
///     .query(DatapointId::Mode, QueryOptions::default())
///     .await?;
/// println!("mode is {mode}");
/// bridge
///     .set(DatapointId::TargetTemperature, 22.5.into(), SetOptions::default())
///     .await?;
/// bridge.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct HvacBridge<C: Connector = TcpConnector> {
    manager: Arc<ConnectionManager>,
    connector: Arc<C>,
    poll_limiter: RateLimiter,
    supervisor: Mutex<Option<Supervisor>>,
}

impl HvacBridge<TcpConnector> {
    /// Create a bridge that connects over TCP.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self { Self::with_connector(config, TcpConnector) }
}

impl<C: Connector> HvacBridge<C> {
    /// Create a bridge using `connector` to open streams.
    #[must_use]
    pub fn with_connector(config: BridgeConfig, connector: C) -> Self {
        let config = config.normalized();
        let poll_limiter = RateLimiter::builder()
            .initial(1)
            .refill(1)
            .max(1)
            .interval(config.min_poll_interval)
            .build();
        Self {
            manager: Arc::new(ConnectionManager::new(config)),
            connector: Arc::new(connector),
            poll_limiter,
            supervisor: Mutex::new(None),
        }
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig { &self.manager.config }

    /// Connect to the gateway.
    ///
    /// Starts the connection supervisor and waits for the first connect
    /// attempt. With `auto_reconnect` the supervisor keeps retrying in the
    /// background even when that attempt fails. Calling `connect` while
    /// the supervisor runs waits for the link to come up.
    ///
    /// # Errors
    ///
    /// Returns the error of the first connect attempt, or
    /// [`BridgeError::Timeout`] when an already running supervisor does not
    /// connect within the connect timeout.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.supervisor.lock().await;
        if slot.as_ref().is_some_and(Supervisor::is_running) {
            drop(slot);
            return self.wait_connected().await;
        }
        if let Some(finished) = slot.take() {
            finished.stop().await;
        }
        let (first_attempt, outcome) = oneshot::channel();
        *slot = Some(self.manager.spawn(Arc::clone(&self.connector), first_attempt));
        drop(slot);
        outcome.await.map_err(|_| BridgeError::Closed)?
    }

    async fn wait_connected(&self) -> Result<()> {
        let limit = self.manager.config.connect_timeout;
        let mut state = self.manager.watch_state();
        match tokio::time::timeout(
            limit,
            state.wait_for(|state| *state == ConnectionState::Connected),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => Err(BridgeError::timeout("connect", limit)),
        }
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Every pending request and waiter is rejected with
    /// [`BridgeError::Closed`].
    pub async fn disconnect(&self) {
        let supervisor = self.supervisor.lock().await.take();
        if let Some(supervisor) = supervisor {
            supervisor.stop().await;
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.manager.state() }

    /// Observe connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> { self.manager.watch_state() }

    /// Subscribe to bridge events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> { self.manager.events.subscribe() }

    /// Cached value of `datapoint`, without I/O.
    #[must_use]
    pub fn cached(&self, datapoint: DatapointId) -> Option<CachedValue> {
        self.manager.cache.get(datapoint)
    }

    /// Every cached datapoint.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let (version, values) = self.manager.cache.snapshot();
        Snapshot {
            version,
            values: values
                .into_iter()
                .map(|(id, cached)| (id, self.present(cached.value)))
                .collect(),
        }
    }

    fn present(&self, value: DatapointValue) -> Value {
        value.to_value(self.manager.config.representation)
    }

    /// Read one datapoint from the status cache.
    ///
    /// A cached value is returned straight away unless
    /// `options.require_fresh` is set. Otherwise a status poll is sent and
    /// the call resolves once a snapshot newer than the call reports the
    /// datapoint.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Timeout`] if no such snapshot arrives, or a
    /// transport error if the poll cannot be sent.
    pub async fn query(&self, datapoint: DatapointId, options: QueryOptions) -> Result<Value> {
        let cache = &self.manager.cache;
        if let Some(cached) = cache.get(datapoint).filter(|_| !options.require_fresh) {
            return Ok(self.present(cached.value));
        }
        let baseline = cache.version();
        let timeout = options.timeout.unwrap_or(self.manager.config.status_timeout);
        let waiter = cache.register(Some(datapoint), baseline);
        let outcome = self.poll_then_wait(waiter, timeout).await?;
        outcome
            .value
            .map(|value| self.present(value))
            .ok_or(BridgeError::timeout("status update", timeout))
    }

    /// Poll the unit for status and wait for a snapshot newer than
    /// `baseline`.
    ///
    /// Polls are rate limited to one per `min_poll_interval`; a poll inside
    /// the interval is skipped and the call only waits.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotConnected`] without a live session and
    /// [`BridgeError::Timeout`] if the cache version does not pass
    /// `baseline` within `timeout`.
    pub async fn request_status(&self, baseline: u64, timeout: Duration) -> Result<u64> {
        let waiter = self.manager.cache.register(None, baseline);
        self.poll_then_wait(waiter, timeout)
            .await
            .map(|outcome| outcome.version)
    }

    async fn poll_then_wait(&self, waiter: StatusWaiter, timeout: Duration) -> Result<WaitOutcome> {
        if let Err(error) = self.poll().await {
            self.manager.cache.cancel(waiter.id(), error.clone());
            return Err(error);
        }
        self.manager.cache.wait(waiter, timeout).await
    }

    async fn poll(&self) -> Result<()> {
        self.manager.ensure_linked()?;
        if !self.poll_limiter.try_acquire(1) {
            debug!(
                "status poll skipped, previous poll is under {:?} old",
                self.manager.config.min_poll_interval
            );
            return Ok(());
        }
        self.manager
            .send(STATUS_POLL.command, STATUS_POLL.build(None))
            .await
            .map(|_| ())
    }

    /// Write a datapoint.
    ///
    /// The value is validated before anything is sent. After the write the
    /// call waits for a snapshot reporting the datapoint; without one it
    /// falls back to the cached value, then to the requested value, and says
    /// which through [`SetOutcome::confirmation`].
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Value`] for invalid or read-only input and a
    /// transport error if the command cannot be written. Timeouts are not
    /// errors here.
    pub async fn set(
        &self,
        datapoint: DatapointId,
        value: Value,
        options: SetOptions,
    ) -> Result<SetOutcome> {
        let definition = datapoint.definition();
        let requested = definition.parse_value(&value)?;
        let spec = definition
            .set
            .ok_or(ValueError::ReadOnly(datapoint.as_str()))?;

        let cache = &self.manager.cache;
        let waiter = cache.register(Some(datapoint), cache.version());
        if let Err(error) = self
            .manager
            .send(spec.command, spec.build(Some(&requested)))
            .await
        {
            cache.cancel(waiter.id(), error.clone());
            return Err(error);
        }
        let refreshed = if options.refresh { self.poll().await } else { Ok(()) };
        if let Err(error) = refreshed {
            debug!("status refresh after setting {datapoint} failed: {error}");
        }

        let timeout = options.timeout.unwrap_or(self.manager.config.status_timeout);
        let (value, confirmation) = match cache.wait(waiter, timeout).await {
            Ok(WaitOutcome {
                value: Some(confirmed),
                ..
            }) => (confirmed, Confirmation::Confirmed),
            outcome => {
                if let Err(error) = outcome {
                    debug!("{datapoint} not confirmed: {error}");
                }
                match cache.get(datapoint) {
                    Some(cached) => (cached.value, Confirmation::Cached),
                    None => (requested, Confirmation::Optimistic),
                }
            }
        };
        Ok(SetOutcome {
            datapoint,
            value: self.present(value),
            confirmation,
        })
    }

    /// Ask the unit for one datapoint with its query command.
    ///
    /// Datapoints without a query command are read with a fresh
    /// [`query`](Self::query).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Timeout`] without a response,
    /// [`BridgeError::Protocol`] for an error response and
    /// [`BridgeError::UnexpectedResponse`] if the payload cannot be parsed.
    pub async fn read(&self, datapoint: DatapointId) -> Result<Value> {
        let definition = datapoint.definition();
        let Some(spec) = definition.query else {
            return self.query(datapoint, QueryOptions::fresh()).await;
        };
        let response = self
            .manager
            .request(spec.command, spec.build(None), self.manager.config.request_timeout)
            .await?;
        definition
            .parse_response(&response.payload)
            .map(|value| self.present(value))
            .ok_or(BridgeError::UnexpectedResponse {
                command: response.command,
            })
    }

    /// Send a raw command frame.
    ///
    /// Returns the response frame when `expect_response` is set.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Frame`] for payloads over 255 bytes,
    /// [`BridgeError::Protocol`] for error responses and
    /// [`BridgeError::Timeout`] when no response arrives.
    pub async fn send_command(&self, command: RawCommand) -> Result<Option<DecodedFrame>> {
        let RawCommand {
            command,
            payload,
            expect_response,
        } = command;
        if expect_response {
            self.manager
                .request(command, payload, self.manager.config.request_timeout)
                .await
                .map(Some)
        } else {
            self.manager.send(command, payload).await.map(|_| None)
        }
    }
}
