//! Correlation of command responses with outstanding requests.
//!
//! Every request registers a one-shot reply slot under its sequence number.
//! The slot is removed from the table by whichever of response, timeout or
//! connection teardown gets there first; removal is the only way a slot is
//! completed, so each request settles exactly once. Responses are matched by
//! sequence number, not arrival order, and must answer the command the slot
//! was registered for.

use std::time::{Duration, Instant};

use dashmap::{DashMap, mapref::entry::Entry};
use log::{debug, warn};
use tokio::sync::oneshot;

use crate::{
    error::{BridgeError, Result},
    frame::{DecodedFrame, FrameKind, RESPONSE_FLAG},
};

type Reply = oneshot::Sender<Result<DecodedFrame>>;

struct PendingRequest {
    command: u8,
    reply: Reply,
    issued: Instant,
}

impl PendingRequest {
    /// Whether `frame` answers this request.
    ///
    /// Echoed requests and responses to another command do not.
    fn answered_by(&self, frame: &DecodedFrame) -> bool {
        match frame.kind {
            FrameKind::Response => frame.command == self.command | RESPONSE_FLAG,
            FrameKind::Error => frame
                .error_code()
                .is_some_and(|(command, _)| command == 0 || command == self.command),
            FrameKind::Request | FrameKind::Status => false,
        }
    }
}

/// Receiver half handed to the caller of [`Correlator::register`].
#[derive(Debug)]
pub struct PendingReply {
    sequence: u8,
    rx: oneshot::Receiver<Result<DecodedFrame>>,
}

/// Table of in-flight requests keyed by sequence number.
#[derive(Default)]
pub struct Correlator {
    pending: DashMap<u8, PendingRequest>,
}

impl Correlator {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register a request about to be sent.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SequenceInUse`] if a request with the same
    /// sequence number is still outstanding, which only happens with more
    /// than 255 concurrent requests.
    pub fn register(&self, sequence: u8, command: u8) -> Result<PendingReply> {
        match self.pending.entry(sequence) {
            Entry::Occupied(_) => {
                warn!("sequence {sequence} still outstanding, refusing command {command:#04x}");
                Err(BridgeError::SequenceInUse(sequence))
            }
            Entry::Vacant(slot) => {
                let (reply, rx) = oneshot::channel();
                slot.insert(PendingRequest {
                    command,
                    reply,
                    issued: Instant::now(),
                });
                Ok(PendingReply { sequence, rx })
            }
        }
    }

    /// Hand a command/response frame to its waiting request.
    ///
    /// Returns the frame back when no request is waiting for it. A frame
    /// that carries a pending sequence number but does not answer that
    /// request leaves the request in place.
    pub fn resolve(&self, frame: DecodedFrame) -> Option<DecodedFrame> {
        let Some(sequence) = frame.sequence else {
            return Some(frame);
        };
        let Some((_, pending)) = self
            .pending
            .remove_if(&sequence, |_, pending| pending.answered_by(&frame))
        else {
            if self.pending.contains_key(&sequence) {
                debug!(
                    "frame {:#04x} ({:?}) does not answer sequence {sequence}",
                    frame.command, frame.kind
                );
            } else {
                debug!("no request waiting for sequence {sequence}");
            }
            return Some(frame);
        };
        debug!(
            "sequence {sequence} answered after {:?}",
            pending.issued.elapsed()
        );
        let outcome = match (frame.kind, frame.error_code()) {
            (FrameKind::Error, Some((command, code))) => Err(BridgeError::Protocol {
                command: if command == 0 { pending.command } else { command },
                code,
            }),
            _ => Ok(frame),
        };
        // The caller may have given up already; nothing left to settle then.
        let _ = pending.reply.send(outcome);
        None
    }

    /// Settle one request with `error`, e.g. after its write failed.
    pub fn cancel(&self, sequence: u8, error: BridgeError) -> bool {
        match self.pending.remove(&sequence) {
            Some((_, pending)) => {
                let _ = pending.reply.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Settle every outstanding request with `error` and clear the table.
    pub fn fail_all(&self, error: &BridgeError) -> usize {
        let sequences: Vec<u8> = self.pending.iter().map(|entry| *entry.key()).collect();
        sequences
            .into_iter()
            .filter(|sequence| self.cancel(*sequence, error.clone()))
            .count()
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize { self.pending.len() }

    /// Returns `true` when nothing is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.pending.is_empty() }

    /// Wait for the reply registered as `reply`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Timeout`] when no response arrives within
    /// `timeout`, the error the request was cancelled with, or
    /// [`BridgeError::Protocol`] for error-flagged responses.
    pub async fn wait(&self, reply: PendingReply, timeout: Duration) -> Result<DecodedFrame> {
        let PendingReply { sequence, rx } = reply;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(BridgeError::Disconnected),
            Err(_) => {
                self.pending.remove(&sequence);
                crate::metrics::inc_request_timeouts();
                Err(BridgeError::timeout("request", timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::frame::CMD_ERROR;

    #[fixture]
    fn correlator() -> Correlator { Correlator::new() }

    fn response(sequence: u8, command: u8, payload: &'static [u8]) -> DecodedFrame {
        DecodedFrame {
            sequence: Some(sequence),
            command,
            payload: Bytes::from_static(payload),
            kind: if command == CMD_ERROR {
                FrameKind::Error
            } else {
                FrameKind::Response
            },
            frame_length: payload.len() + 6,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn out_of_order_responses_match_by_sequence(correlator: Correlator) {
        let first = correlator.register(1, 0x81).expect("register 1");
        let second = correlator.register(2, 0x82).expect("register 2");

        assert!(correlator.resolve(response(2, 0x82, &[2])).is_none());
        assert!(correlator.resolve(response(1, 0x81, &[1])).is_none());

        let timeout = Duration::from_secs(1);
        let a = correlator.wait(first, timeout).await.expect("first reply");
        let b = correlator.wait(second, timeout).await.expect("second reply");
        assert_eq!(a.payload.as_ref(), &[1]);
        assert_eq!(b.payload.as_ref(), &[2]);
        assert!(correlator.is_empty());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn timeout_removes_the_entry(correlator: Correlator) {
        let reply = correlator.register(5, 0x83).expect("register");
        let err = correlator
            .wait(reply, Duration::from_millis(100))
            .await
            .expect_err("no response was sent");
        assert!(err.is_timeout());
        assert!(correlator.is_empty());

        let late = response(5, 0x83, &[]);
        assert_eq!(correlator.resolve(late.clone()), Some(late));
    }

    #[rstest]
    fn duplicate_sequence_is_refused(correlator: Correlator) {
        let _reply = correlator.register(9, 0x81).expect("register");
        assert!(matches!(
            correlator.register(9, 0x82),
            Err(BridgeError::SequenceInUse(9))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn error_frames_become_protocol_errors(correlator: Correlator) {
        let reply = correlator.register(3, 0x13).expect("register");
        correlator.resolve(response(3, CMD_ERROR, &[0x13, 0x04]));
        let err = correlator
            .wait(reply, Duration::from_secs(1))
            .await
            .expect_err("error response");
        assert!(matches!(
            err,
            BridgeError::Protocol {
                command: 0x13,
                code: 0x04
            }
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn fail_all_settles_each_request_once(correlator: Correlator) {
        let replies: Vec<_> = (1..=3)
            .map(|seq| correlator.register(seq, 0x81).expect("register"))
            .collect();

        assert_eq!(correlator.fail_all(&BridgeError::Disconnected), 3);
        assert_eq!(correlator.fail_all(&BridgeError::Disconnected), 0);

        for reply in replies {
            let err = correlator
                .wait(reply, Duration::from_secs(1))
                .await
                .expect_err("cancelled");
            assert!(matches!(err, BridgeError::Disconnected));
        }
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn echoed_request_leaves_the_entry_pending(correlator: Correlator) {
        let reply = correlator.register(1, 0x11).expect("register");
        let echo = DecodedFrame {
            kind: FrameKind::Request,
            ..response(1, 0x11, &[1])
        };

        assert_eq!(correlator.resolve(echo.clone()), Some(echo));
        assert_eq!(correlator.len(), 1);

        assert!(correlator.resolve(response(1, 0x91, &[1])).is_none());
        let answer = correlator
            .wait(reply, Duration::from_secs(1))
            .await
            .expect("real response");
        assert_eq!(answer.command, 0x91);
    }

    #[rstest]
    #[case(0x97)]
    #[case(0x82)]
    fn response_to_another_command_is_handed_back(correlator: Correlator, #[case] command: u8) {
        let _reply = correlator.register(2, 0x81).expect("register");
        let stray = response(2, command, &[0]);

        assert_eq!(correlator.resolve(stray.clone()), Some(stray));
        assert_eq!(correlator.len(), 1);
    }

    #[rstest]
    fn error_for_another_command_is_handed_back(correlator: Correlator) {
        let _reply = correlator.register(4, 0x12).expect("register");
        let stray = response(4, CMD_ERROR, &[0x16, 0x01]);

        assert_eq!(correlator.resolve(stray.clone()), Some(stray));
        assert_eq!(correlator.len(), 1);
    }

    #[rstest]
    fn push_frames_are_not_correlated(correlator: Correlator) {
        let push = DecodedFrame {
            sequence: None,
            command: 0xAC,
            payload: Bytes::new(),
            kind: FrameKind::Status,
            frame_length: 4,
        };
        assert_eq!(correlator.resolve(push.clone()), Some(push));
    }
}
