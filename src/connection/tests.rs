//! Unit tests for the connection supervisor and session tasks.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rstest::{fixture, rstest};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex},
    sync::broadcast,
};

use super::*;
use crate::{
    codec::{ChecksumScheme, encode_push},
    frame::{CMD_STATUS_PUSH, COMMAND_OVERHEAD, FrameKind},
    status::{MIN_STATUS_LEN, StatusValues},
    value::Mode,
};

/// Hands the far end of an in-memory pipe to the test for every connect.
struct DuplexConnector {
    peers: mpsc::UnboundedSender<DuplexStream>,
    attempts: AtomicUsize,
    refuse: bool,
}

#[async_trait]
impl Connector for DuplexConnector {
    type Stream = DuplexStream;

    async fn connect(&self, _: &str, _: u16, _: &SocketOptions) -> io::Result<DuplexStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }
        let (near, far) = duplex(1024);
        self.peers
            .send(far)
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(near)
    }
}

struct Harness {
    manager: Arc<ConnectionManager>,
    connector: Arc<DuplexConnector>,
    peers: mpsc::UnboundedReceiver<DuplexStream>,
    events: broadcast::Receiver<BridgeEvent>,
}

impl Harness {
    fn new(refuse: bool) -> Self {
        let config = BridgeConfig::default()
            .reconnect_interval(Duration::from_secs(2))
            .request_timeout(Duration::from_millis(500));
        let manager = Arc::new(ConnectionManager::new(config));
        let (tx, peers) = mpsc::unbounded_channel();
        let connector = Arc::new(DuplexConnector {
            peers: tx,
            attempts: AtomicUsize::new(0),
            refuse,
        });
        let events = manager.events.subscribe();
        Self {
            manager,
            connector,
            peers,
            events,
        }
    }

    async fn start(&mut self) -> (Supervisor, DuplexStream) {
        let (tx, rx) = oneshot::channel();
        let supervisor = self.manager.spawn(Arc::clone(&self.connector), tx);
        rx.await.expect("first attempt reported").expect("connected");
        let peer = self.peers.recv().await.expect("peer stream");
        (supervisor, peer)
    }

    async fn next_status(&mut self) -> (StatusValues, u64) {
        loop {
            if let BridgeEvent::StatusData {
                values, version, ..
            } = self.events.recv().await.expect("event")
            {
                return (values, version);
            }
        }
    }
}

#[fixture]
fn harness() -> Harness { Harness::new(false) }

fn status_push() -> Bytes {
    let mut payload = [0_u8; MIN_STATUS_LEN];
    payload[1] = 0x01;
    payload[2] = (2 << 5) | 8;
    payload[11] = 0xFF;
    payload[12] = 0xFF;
    encode_push(CMD_STATUS_PUSH, &payload, ChecksumScheme::TwosComplement).expect("encode push")
}

async fn read_command(peer: &mut DuplexStream) -> Vec<u8> {
    let mut header = [0_u8; 5];
    peer.read_exact(&mut header).await.expect("header");
    let mut rest = vec![0_u8; usize::from(header[4]) + 1];
    peer.read_exact(&mut rest).await.expect("body");
    let mut frame = header.to_vec();
    frame.extend(rest);
    frame
}

fn response(sequence: u8, command: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0xAA, 0x55, sequence, command, u8::try_from(payload.len()).expect("len")];
    frame.extend_from_slice(payload);
    frame.push(ChecksumScheme::Sum.compute(&frame));
    frame
}

#[rstest]
#[tokio::test]
async fn push_split_into_single_bytes_is_dispatched_once(mut harness: Harness) {
    let (supervisor, mut peer) = harness.start().await;
    let wire = status_push();

    for byte in wire.iter() {
        peer.write_all(&[*byte]).await.expect("write byte");
        peer.flush().await.expect("flush");
        tokio::task::yield_now().await;
    }
    let (split, version) = harness.next_status().await;

    peer.write_all(&wire).await.expect("write whole");
    let (whole, next_version) = harness.next_status().await;

    assert_eq!(split, whole);
    assert_eq!(split.mode, Some(Mode::Cool));
    assert_eq!((version, next_version), (1, 2));
    assert_eq!(harness.manager.cache.version(), 2);
    supervisor.stop().await;
}

#[rstest]
#[tokio::test]
async fn corrupt_frame_is_dropped_and_stream_recovers(mut harness: Harness) {
    let (supervisor, mut peer) = harness.start().await;
    let mut corrupt = status_push().to_vec();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0x01;

    peer.write_all(&corrupt).await.expect("write corrupt");
    peer.write_all(&status_push()).await.expect("write valid");
    let (_, version) = harness.next_status().await;

    assert_eq!(version, 1);
    assert_eq!(harness.manager.state(), ConnectionState::Connected);
    supervisor.stop().await;
}

#[rstest]
#[tokio::test]
async fn responses_are_matched_by_sequence(mut harness: Harness) {
    let (supervisor, mut peer) = harness.start().await;
    let manager = Arc::clone(&harness.manager);
    let first = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move {
            manager
                .request(0x81, Bytes::new(), Duration::from_secs(1))
                .await
        }
    });
    let a = read_command(&mut peer).await;
    let second = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move {
            manager
                .request(0x82, Bytes::new(), Duration::from_secs(1))
                .await
        }
    });
    let b = read_command(&mut peer).await;
    assert_eq!((a[2], a[3], b[2], b[3]), (1, 0x81, 2, 0x82));

    peer.write_all(&response(b[2], 0x82, &[4])).await.expect("reply b");
    peer.write_all(&response(a[2], 0x81, &[1])).await.expect("reply a");

    let a = first.await.expect("join").expect("response a");
    let b = second.await.expect("join").expect("response b");
    assert_eq!(a.payload.as_ref(), &[1]);
    assert_eq!(b.payload.as_ref(), &[4]);
    assert_eq!(a.kind, FrameKind::Response);
    assert_eq!(b.frame_length, 1 + COMMAND_OVERHEAD);
    supervisor.stop().await;
}

#[rstest]
#[tokio::test]
async fn sends_keep_call_order_on_the_wire(mut harness: Harness) {
    let (supervisor, mut peer) = harness.start().await;
    for command in [0x11_u8, 0x12, 0x13] {
        harness
            .manager
            .send(command, Bytes::from_static(&[1]))
            .await
            .expect("send");
    }
    let mut seen = Vec::new();
    for _ in 0..3 {
        let frame = read_command(&mut peer).await;
        seen.push((frame[2], frame[3]));
    }
    assert_eq!(seen, vec![(1, 0x11), (2, 0x12), (3, 0x13)]);
    supervisor.stop().await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn dropped_connection_rejects_pending_and_reconnects(mut harness: Harness) {
    let (supervisor, mut peer) = harness.start().await;
    let manager = Arc::clone(&harness.manager);
    let pending = tokio::spawn(async move {
        manager
            .request(0x83, Bytes::new(), Duration::from_secs(30))
            .await
    });
    let waiter = harness.manager.cache.register(None, 0);
    read_command(&mut peer).await;

    drop(peer);
    let err = pending.await.expect("join").expect_err("connection dropped");
    assert!(matches!(err, BridgeError::Disconnected));
    let err = harness
        .manager
        .cache
        .wait(waiter, Duration::from_secs(1))
        .await
        .expect_err("waiter rejected");
    assert!(matches!(err, BridgeError::Disconnected));
    assert!(harness.manager.correlator.is_empty());

    // Second session after the fixed interval, with a fresh sequence space.
    let mut peer = harness.peers.recv().await.expect("reconnected");
    assert_eq!(harness.connector.attempts.load(Ordering::SeqCst), 2);
    let mut state = harness.manager.watch_state();
    state
        .wait_for(|state| *state == ConnectionState::Connected)
        .await
        .expect("state channel open");
    harness
        .manager
        .send(0x11, Bytes::from_static(&[0]))
        .await
        .expect("send after reconnect");
    assert_eq!(read_command(&mut peer).await[2], 1);
    supervisor.stop().await;
    assert_eq!(harness.manager.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn refused_connect_reports_first_failure_and_keeps_retrying() {
    let harness = Harness::new(true);
    let (tx, rx) = oneshot::channel();
    let supervisor = harness.manager.spawn(Arc::clone(&harness.connector), tx);

    let err = rx.await.expect("reported").expect_err("refused");
    assert!(err.is_transport());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.connector.attempts.load(Ordering::SeqCst), 3);
    assert!(supervisor.is_running());
    supervisor.stop().await;
    assert!(matches!(
        harness.manager.send(0x11, Bytes::new()).await,
        Err(BridgeError::NotConnected)
    ));
}

#[rstest]
#[tokio::test]
async fn unmatched_responses_surface_as_frame_events(mut harness: Harness) {
    let (supervisor, mut peer) = harness.start().await;
    peer.write_all(&response(42, 0x93, &[7])).await.expect("write");
    let frame = loop {
        if let BridgeEvent::Frame(frame) = harness.events.recv().await.expect("event") {
            break frame;
        }
    };
    assert_eq!(frame.sequence, Some(42));
    assert_eq!(frame.payload.as_ref(), &[7]);
    supervisor.stop().await;
}
