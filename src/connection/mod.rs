//! Connection manager for the gateway link.
//!
//! One supervisor task owns the connect/reconnect cycle. Each live session
//! splits the stream into a reader, which decodes frames with
//! [`HvacFrameCodec`] and dispatches them, and a single writer task that
//! drains an ordered send queue. Every queued frame carries a completion
//! slot so callers learn when their bytes reached the socket.
//!
//! When a session ends, every pending request and status waiter is rejected
//! once and the supervisor sleeps for the fixed reconnect interval. Only the
//! supervisor schedules reconnects, so at most one reconnect timer exists.

mod socket;

use std::{
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
pub use socket::{Connector, SocketOptions, TcpConnector};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    select,
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::sleep,
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};

use crate::{
    cache::StatusCache,
    codec::{FrameError, HvacFrameCodec, Inbound},
    config::BridgeConfig,
    correlator::Correlator,
    error::{BridgeError, Result},
    event::{BridgeEvent, EventSink},
    frame::{DecodedFrame, OutboundFrame},
    metrics::{self, Direction},
    sequence::SequenceCounter,
};

/// Lifecycle of the gateway connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session; a reconnect may be pending.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// A session is live.
    Connected,
    /// The bridge was shut down.
    Closed,
}

struct WriteRequest {
    frame: OutboundFrame,
    done: oneshot::Sender<io::Result<()>>,
}

/// Handle to the live session's send queue.
#[derive(Clone)]
struct Link {
    queue: mpsc::Sender<WriteRequest>,
    sequence: Arc<SequenceCounter>,
}

/// State shared between the public bridge and the connection tasks.
pub(crate) struct ConnectionManager {
    pub(crate) config: BridgeConfig,
    pub(crate) correlator: Correlator,
    pub(crate) cache: StatusCache,
    pub(crate) events: EventSink,
    state: watch::Sender<ConnectionState>,
    link: Mutex<Option<Link>>,
}

/// Running supervisor task.
pub(crate) struct Supervisor {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Supervisor {
    pub(crate) fn is_running(&self) -> bool { !self.task.is_finished() }

    /// Cancel the supervisor and wait for it to finish tearing down.
    pub(crate) async fn stop(mut self) {
        self.shutdown.cancel();
        if let Err(error) = (&mut self.task).await {
            warn!("connection supervisor ended abnormally: {error}");
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) { self.shutdown.cancel(); }
}

impl ConnectionManager {
    pub(crate) fn new(config: BridgeConfig) -> Self {
        let events = EventSink::new(config.event_capacity);
        Self {
            config,
            correlator: Correlator::new(),
            cache: StatusCache::new(),
            events,
            state: watch::channel(ConnectionState::Disconnected).0,
            link: Mutex::new(None),
        }
    }

    fn link_slot(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn link(&self) -> Result<Link> { self.link_slot().clone().ok_or(BridgeError::NotConnected) }

    /// Fail with [`BridgeError::NotConnected`] unless a session is live.
    pub(crate) fn ensure_linked(&self) -> Result<()> { self.link().map(|_| ()) }

    pub(crate) fn state(&self) -> ConnectionState { *self.state.borrow() }

    pub(crate) fn watch_state(&self) -> watch::Receiver<ConnectionState> { self.state.subscribe() }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("connection state {previous:?} -> {state:?}");
        }
    }

    /// Start the supervisor.
    ///
    /// `first_attempt` receives the outcome of the first connect attempt.
    pub(crate) fn spawn<C: Connector>(
        self: &Arc<Self>,
        connector: Arc<C>,
        first_attempt: oneshot::Sender<Result<()>>,
    ) -> Supervisor {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(self).supervise(
            connector,
            shutdown.clone(),
            first_attempt,
        ));
        Supervisor { shutdown, task }
    }

    async fn supervise<C: Connector>(
        self: Arc<Self>,
        connector: Arc<C>,
        shutdown: CancellationToken,
        first_attempt: oneshot::Sender<Result<()>>,
    ) {
        let mut first_attempt = Some(first_attempt);
        loop {
            self.set_state(ConnectionState::Connecting);
            let attempt = select! {
                biased;
                () = shutdown.cancelled() => break,
                attempt = self.open(connector.as_ref()) => attempt,
            };
            match attempt {
                Ok(stream) => {
                    self.run_session(stream, &shutdown, first_attempt.take())
                        .await;
                }
                Err(error) => {
                    warn!(
                        "connecting to {} failed: {error}",
                        self.config.address()
                    );
                    self.events.emit(BridgeEvent::Error(error.clone()));
                    if let Some(reply) = first_attempt.take() {
                        let _ = reply.send(Err(error));
                    }
                }
            }
            self.set_state(ConnectionState::Disconnected);

            if shutdown.is_cancelled() || !self.config.auto_reconnect {
                break;
            }
            debug!(
                "reconnecting to {} in {:?}",
                self.config.address(),
                self.config.reconnect_interval
            );
            select! {
                biased;
                () = shutdown.cancelled() => break,
                () = sleep(self.config.reconnect_interval) => metrics::inc_reconnects(),
            }
        }

        if shutdown.is_cancelled() {
            self.correlator.fail_all(&BridgeError::Closed);
            self.cache.fail_all(&BridgeError::Closed);
            self.set_state(ConnectionState::Closed);
        }
        if let Some(reply) = first_attempt.take() {
            let _ = reply.send(Err(BridgeError::Closed));
        }
        debug!("connection supervisor for {} stopped", self.config.address());
    }

    async fn open<C: Connector>(&self, connector: &C) -> Result<C::Stream> {
        let limit = self.config.connect_timeout;
        let connecting = connector.connect(&self.config.host, self.config.port, &self.config.socket);
        match tokio::time::timeout(limit, connecting).await {
            Ok(stream) => Ok(stream?),
            Err(_) => Err(BridgeError::timeout("connect", limit)),
        }
    }

    /// Drive one connection until it fails or `shutdown` fires.
    ///
    /// `ready` is answered once the link accepts commands.
    async fn run_session<S>(
        &self,
        stream: S,
        shutdown: &CancellationToken,
        ready: Option<oneshot::Sender<Result<()>>>,
    ) where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let codec = HvacFrameCodec::new(self.config.push_checksum);
        let (read_half, write_half) = tokio::io::split(stream);
        let mut frames = FramedRead::new(read_half, codec);
        let (queue, pending_writes) = mpsc::channel(self.config.send_queue_capacity);
        let session = shutdown.child_token();
        let writer = tokio::spawn(write_loop(
            FramedWrite::new(write_half, codec),
            pending_writes,
            session.clone(),
        ));

        *self.link_slot() = Some(Link {
            queue,
            sequence: Arc::new(SequenceCounter::new()),
        });
        self.set_state(ConnectionState::Connected);
        metrics::set_connected(true);
        info!("connected to {}", self.config.address());
        self.events.emit(BridgeEvent::Connected);
        if let Some(reply) = ready {
            let _ = reply.send(Ok(()));
        }

        loop {
            select! {
                biased;
                () = session.cancelled() => break,
                next = frames.next() => match next {
                    Some(Ok(inbound)) => self.dispatch(inbound),
                    Some(Err(error)) => {
                        warn!("read from {} failed: {error}", self.config.address());
                        self.events.emit(BridgeEvent::Error(error.into()));
                        break;
                    }
                    None => {
                        info!("{} closed the connection", self.config.address());
                        break;
                    }
                },
            }
        }

        session.cancel();
        self.link_slot().take();
        if let Err(error) = writer.await {
            warn!("writer task ended abnormally: {error}");
        }

        let reason = if shutdown.is_cancelled() {
            BridgeError::Closed
        } else {
            BridgeError::Disconnected
        };
        let requests = self.correlator.fail_all(&reason);
        let waiters = self.cache.fail_all(&reason);
        if requests + waiters > 0 {
            debug!("rejected {requests} pending requests and {waiters} waiters");
        }
        metrics::set_connected(false);
        self.events.emit(BridgeEvent::Disconnected);
    }

    fn dispatch(&self, inbound: Inbound) {
        let frame = match inbound {
            Inbound::Frame(frame) => frame,
            Inbound::Rejected(error) => {
                metrics::inc_frame_errors();
                warn!("discarding malformed input: {error}");
                return;
            }
        };
        metrics::inc_frames(Direction::Inbound);
        let Some(frame) = self.correlator.resolve(frame) else {
            return;
        };
        if frame.is_status_push() || frame.is_poll_response() {
            self.accept_status(frame);
        } else {
            debug!(
                "unsolicited frame {:#04x} ({:?})",
                frame.command, frame.kind
            );
            self.events.emit(BridgeEvent::Frame(frame));
        }
    }

    fn accept_status(&self, frame: DecodedFrame) {
        match self.config.revision.decode_status(&frame.payload) {
            Some(values) => {
                let version = self.cache.record(&values);
                self.events.emit(BridgeEvent::StatusData {
                    values,
                    version,
                    payload: frame.payload,
                });
            }
            None => {
                debug!(
                    "status payload of {} bytes is too short to decode",
                    frame.payload.len()
                );
                self.events.emit(BridgeEvent::Frame(frame));
            }
        }
    }

    /// Queue a command frame and wait until it is written.
    ///
    /// Returns the sequence number the frame was sent with.
    pub(crate) async fn send(&self, command: u8, payload: Bytes) -> Result<u8> {
        let link = self.link()?;
        let sequence = link.sequence.next();
        self.submit(&link, OutboundFrame::new(sequence, command, payload))
            .await?;
        Ok(sequence)
    }

    /// Send a command frame and wait for the response with its sequence.
    pub(crate) async fn request(
        &self,
        command: u8,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<DecodedFrame> {
        let link = self.link()?;
        let sequence = link.sequence.next();
        let reply = self.correlator.register(sequence, command)?;
        if let Err(error) = self
            .submit(&link, OutboundFrame::new(sequence, command, payload))
            .await
        {
            self.correlator.cancel(sequence, error.clone());
            return Err(error);
        }
        self.correlator.wait(reply, timeout).await
    }

    async fn submit(&self, link: &Link, frame: OutboundFrame) -> Result<()> {
        if frame.payload.len() > usize::from(u8::MAX) {
            return Err(FrameError::PayloadTooLong {
                len: frame.payload.len(),
            }
            .into());
        }
        let limit = self.config.request_timeout;
        let (done, written) = oneshot::channel();
        let queued = async {
            link.queue
                .send(WriteRequest { frame, done })
                .await
                .map_err(|_| BridgeError::Disconnected)?;
            written.await.map_err(|_| BridgeError::Disconnected)?
                .map_err(BridgeError::from)
        };
        match tokio::time::timeout(limit, queued).await {
            Ok(outcome) => outcome,
            Err(_) => Err(BridgeError::timeout("write", limit)),
        }
    }
}

async fn write_loop<W>(
    mut sink: FramedWrite<W, HvacFrameCodec>,
    mut queue: mpsc::Receiver<WriteRequest>,
    session: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let request = select! {
            biased;
            () = session.cancelled() => break,
            request = queue.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };
        let WriteRequest { frame, done } = request;
        let sequence = frame.sequence;
        match sink.send(frame).await {
            Ok(()) => {
                metrics::inc_frames(Direction::Outbound);
                let _ = done.send(Ok(()));
            }
            Err(error) => {
                warn!("writing sequence {sequence} failed: {error}");
                let _ = done.send(Err(error));
                session.cancel();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests;
