//! Scripted serial gateway on a TCP loopback socket.
//!
//! [`FakeGateway`] accepts one bridge connection at a time, records every
//! command frame it receives and answers the way a unit would: status polls
//! with a push frame, set commands by updating its status, query commands
//! with the current value. [`Behaviour`] switches each reaction off for
//! timeout and fallback tests.

use std::{
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use hvac_bridge::{
    HvacFrameCodec,
    codec::Inbound,
    frame::{CMD_ERROR, CMD_STATUS_POLL, DecodedFrame, FrameKind, OutboundFrame, RESPONSE_FLAG},
};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::{
    codec::{Encoder, FramedRead},
    sync::CancellationToken,
};

use crate::status::StatusBuilder;

/// How the gateway reacts to commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Behaviour {
    /// Answer status polls with a push frame.
    pub answer_polls: bool,
    /// Apply set commands to the status and push it.
    pub confirm_sets: bool,
    /// Answer query commands with the current value.
    pub answer_queries: bool,
    /// Answer every other command by echoing its payload.
    pub echo_unknown: bool,
    /// Reject this command with an error response carrying the code.
    pub reject: Option<(u8, u8)>,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            answer_polls: true,
            confirm_sets: true,
            answer_queries: true,
            echo_unknown: true,
            reject: None,
        }
    }
}

impl Behaviour {
    /// Ignore every command.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            answer_polls: false,
            confirm_sets: false,
            answer_queries: false,
            echo_unknown: false,
            reject: None,
        }
    }
}

#[derive(Default)]
struct GatewayState {
    status: StatusBuilder,
    behaviour: Behaviour,
    client: Option<Client>,
    connections: usize,
}

struct Client {
    outbound: mpsc::UnboundedSender<Bytes>,
    close: CancellationToken,
}

type Shared = Arc<Mutex<GatewayState>>;

fn lock(state: &Shared) -> MutexGuard<'_, GatewayState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fake gateway bound to `127.0.0.1` on an ephemeral port.
pub struct FakeGateway {
    port: u16,
    state: Shared,
    received: tokio::sync::Mutex<mpsc::UnboundedReceiver<DecodedFrame>>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl FakeGateway {
    /// Start a gateway with the default [`Behaviour`].
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> io::Result<Self> { Self::with_behaviour(Behaviour::default()).await }

    /// Start a gateway with `behaviour`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn with_behaviour(behaviour: Behaviour) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let state: Shared = Arc::new(Mutex::new(GatewayState {
            behaviour,
            ..GatewayState::default()
        }));
        let (frames, received) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&state),
            frames,
            shutdown.clone(),
        ));
        Ok(Self {
            port,
            state,
            received: tokio::sync::Mutex::new(received),
            shutdown,
            task,
        })
    }

    /// Listening port.
    #[must_use]
    pub fn port(&self) -> u16 { self.port }

    /// Number of connections accepted so far.
    #[must_use]
    pub fn connections(&self) -> usize { lock(&self.state).connections }

    /// Wait until `count` connections have been accepted.
    ///
    /// # Panics
    ///
    /// Panics if that does not happen within two seconds.
    pub async fn wait_for_connections(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.connections() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("bridge did not connect in time");
    }

    /// Replace the behaviour.
    pub fn set_behaviour(&self, behaviour: Behaviour) { lock(&self.state).behaviour = behaviour; }

    /// Modify the simulated unit state without pushing it.
    pub fn update_status(&self, update: impl FnOnce(&mut StatusBuilder)) {
        update(&mut lock(&self.state).status);
    }

    /// Current simulated unit state.
    #[must_use]
    pub fn status(&self) -> StatusBuilder { lock(&self.state).status }

    /// Send a status push for the current state to the connected bridge.
    pub fn push_status(&self) {
        let frame = lock(&self.state).status.push_frame();
        self.send_raw(frame);
    }

    /// Write arbitrary bytes to the connected bridge.
    pub fn send_raw(&self, bytes: impl Into<Bytes>) {
        if let Some(client) = &lock(&self.state).client {
            let _ = client.outbound.send(bytes.into());
        }
    }

    /// Close the current bridge connection.
    pub fn drop_connection(&self) {
        if let Some(client) = lock(&self.state).client.take() {
            client.close.cancel();
        }
    }

    /// Next command frame received from the bridge.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives within two seconds.
    pub async fn next_frame(&self) -> DecodedFrame {
        let mut received = self.received.lock().await;
        tokio::time::timeout(Duration::from_secs(2), received.recv())
            .await
            .expect("gateway received no frame in time")
            .expect("gateway stopped")
    }

    /// Every frame received so far that has not been taken yet.
    pub async fn drain_frames(&self) -> Vec<DecodedFrame> {
        let mut received = self.received.lock().await;
        let mut frames = Vec::new();
        while let Ok(frame) = received.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

impl Drop for FakeGateway {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Shared,
    frames: mpsc::UnboundedSender<DecodedFrame>,
    shutdown: CancellationToken,
) {
    loop {
        let stream = tokio::select! {
            () = shutdown.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(_) => continue,
            },
        };
        let close = shutdown.child_token();
        let (outbound, queue) = mpsc::unbounded_channel();
        {
            let mut guard = lock(&state);
            if let Some(previous) = guard.client.replace(Client {
                outbound: outbound.clone(),
                close: close.clone(),
            }) {
                previous.close.cancel();
            }
            guard.connections += 1;
        }
        tokio::spawn(serve(stream, Arc::clone(&state), frames.clone(), outbound, queue, close));
    }
}

async fn serve(
    stream: TcpStream,
    state: Shared,
    frames: mpsc::UnboundedSender<DecodedFrame>,
    outbound: mpsc::UnboundedSender<Bytes>,
    mut queue: mpsc::UnboundedReceiver<Bytes>,
    close: CancellationToken,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, HvacFrameCodec::default());
    loop {
        tokio::select! {
            () = close.cancelled() => break,
            bytes = queue.recv() => {
                let Some(bytes) = bytes else { break };
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
            }
            inbound = reader.next() => match inbound {
                Some(Ok(Inbound::Frame(frame))) => {
                    for reply in react(&state, &frame) {
                        let _ = outbound.send(reply);
                    }
                    let _ = frames.send(frame);
                }
                Some(Ok(Inbound::Rejected(_))) => {}
                Some(Err(_)) | None => break,
            },
        }
    }
}

fn command_frame(sequence: u8, command: u8, payload: Vec<u8>) -> Bytes {
    let mut dst = BytesMut::new();
    match HvacFrameCodec::default().encode(OutboundFrame::new(sequence, command, payload), &mut dst) {
        Ok(()) => dst.freeze(),
        Err(error) => unreachable!("gateway replies are short: {error}"),
    }
}

/// Frames the simulated unit sends back for `frame`.
fn react(state: &Shared, frame: &DecodedFrame) -> Vec<Bytes> {
    let mut guard = lock(state);
    let behaviour = guard.behaviour;
    let (Some(sequence), FrameKind::Request | FrameKind::Response) = (frame.sequence, frame.kind)
    else {
        return Vec::new();
    };

    if let Some((command, code)) = behaviour.reject.filter(|(command, _)| *command == frame.command) {
        return vec![command_frame(sequence, CMD_ERROR, vec![command, code])];
    }
    let code = frame.payload.first().copied().unwrap_or_default();
    match frame.command {
        CMD_STATUS_POLL if behaviour.answer_polls => vec![guard.status.push_frame()],
        CMD_STATUS_POLL => Vec::new(),
        command @ 0x11..=0x1a => {
            if behaviour.confirm_sets && guard.status.apply(command, code) {
                vec![guard.status.push_frame()]
            } else {
                Vec::new()
            }
        }
        command @ 0x81..=0x8a => match guard.status.query(command) {
            Some(value) if behaviour.answer_queries => {
                vec![command_frame(sequence, command, vec![value])]
            }
            _ => Vec::new(),
        },
        command if behaviour.echo_unknown => vec![command_frame(
            sequence,
            command | RESPONSE_FLAG,
            frame.payload.to_vec(),
        )],
        _ => Vec::new(),
    }
}
