//! Versioned status cache and waiter registry.
//!
//! The cache keeps the latest value of each datapoint together with the
//! version of the snapshot that reported it. The version is a single
//! counter bumped once per accepted snapshot. Waiters register a baseline
//! version and resolve as soon as a newer snapshot is recorded, either for
//! a specific datapoint or for any datapoint. A waiter registered after the
//! version already moved past its baseline resolves immediately, so callers
//! can capture a baseline, send a request and then register without racing
//! the response.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::trace;
use tokio::sync::oneshot;

use crate::{
    datapoint::{DatapointId, DatapointValue},
    error::{BridgeError, Result},
    status::StatusValues,
};

/// A cached datapoint value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CachedValue {
    pub value: DatapointValue,
    /// Version of the snapshot that reported the value.
    pub version: u64,
}

/// Resolution of a waiter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaitOutcome {
    /// Version that satisfied the waiter.
    pub version: u64,
    /// Value of the awaited datapoint, `None` for "any update" waiters.
    pub value: Option<DatapointValue>,
}

type Reply = oneshot::Sender<Result<WaitOutcome>>;

struct Waiter {
    id: u64,
    datapoint: Option<DatapointId>,
    min_version: u64,
    reply: Reply,
}

#[derive(Default)]
struct State {
    version: u64,
    values: HashMap<DatapointId, CachedValue>,
    waiters: Vec<Waiter>,
    next_waiter: u64,
}

impl State {
    /// Outcome for a waiter if its condition already holds.
    fn ready(&self, datapoint: Option<DatapointId>, min_version: u64) -> Option<WaitOutcome> {
        match datapoint {
            None => (self.version > min_version).then_some(WaitOutcome {
                version: self.version,
                value: None,
            }),
            Some(id) => self
                .values
                .get(&id)
                .filter(|cached| cached.version > min_version)
                .map(|cached| WaitOutcome {
                    version: cached.version,
                    value: Some(cached.value),
                }),
        }
    }
}

/// Handle returned by [`StatusCache::register`].
#[derive(Debug)]
pub struct StatusWaiter {
    id: u64,
    rx: oneshot::Receiver<Result<WaitOutcome>>,
}

impl StatusWaiter {
    /// Registry identifier, used with [`StatusCache::cancel`].
    #[must_use]
    pub fn id(&self) -> u64 { self.id }
}

/// Latest known datapoint values plus pending waiters.
#[derive(Default)]
pub struct StatusCache {
    state: Mutex<State>,
}

impl StatusCache {
    /// Create an empty cache at version zero.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current snapshot version.
    #[must_use]
    pub fn version(&self) -> u64 { self.lock().version }

    /// Cached value of one datapoint.
    #[must_use]
    pub fn get(&self, id: DatapointId) -> Option<CachedValue> { self.lock().values.get(&id).copied() }

    /// Every cached datapoint in catalog order, with the current version.
    #[must_use]
    pub fn snapshot(&self) -> (u64, Vec<(DatapointId, CachedValue)>) {
        let state = self.lock();
        let values = DatapointId::ALL
            .into_iter()
            .filter_map(|id| state.values.get(&id).map(|cached| (id, *cached)))
            .collect();
        (state.version, values)
    }

    /// Accept a snapshot, bump the version and wake satisfied waiters.
    ///
    /// Returns the new version.
    pub fn record(&self, values: &StatusValues) -> u64 {
        let mut state = self.lock();
        state.version += 1;
        let version = state.version;
        for (id, value) in values.iter() {
            state.values.insert(id, CachedValue { value, version });
        }

        let waiters = std::mem::take(&mut state.waiters);
        let mut woken = 0_usize;
        for waiter in waiters {
            if let Some(outcome) = state.ready(waiter.datapoint, waiter.min_version) {
                let _ = waiter.reply.send(Ok(outcome));
                woken += 1;
            } else {
                state.waiters.push(waiter);
            }
        }
        trace!(
            "status version {version} recorded, woke {woken} waiters, {} still waiting",
            state.waiters.len()
        );
        version
    }

    /// Register interest in an update newer than `min_version`.
    ///
    /// `datapoint = None` waits for any snapshot.
    pub fn register(&self, datapoint: Option<DatapointId>, min_version: u64) -> StatusWaiter {
        let (reply, rx) = oneshot::channel();
        let mut state = self.lock();
        state.next_waiter += 1;
        let id = state.next_waiter;
        match state.ready(datapoint, min_version) {
            Some(outcome) => {
                let _ = reply.send(Ok(outcome));
            }
            None => state.waiters.push(Waiter {
                id,
                datapoint,
                min_version,
                reply,
            }),
        }
        StatusWaiter { id, rx }
    }

    /// Reject one waiter outside the normal resolve path.
    pub fn cancel(&self, id: u64, error: BridgeError) -> bool {
        let mut state = self.lock();
        let Some(index) = state.waiters.iter().position(|waiter| waiter.id == id) else {
            return false;
        };
        let waiter = state.waiters.swap_remove(index);
        drop(state);
        let _ = waiter.reply.send(Err(error));
        true
    }

    /// Reject every registered waiter and clear the registry.
    pub fn fail_all(&self, error: &BridgeError) -> usize {
        let waiters = std::mem::take(&mut self.lock().waiters);
        let count = waiters.len();
        for waiter in waiters {
            let _ = waiter.reply.send(Err(error.clone()));
        }
        count
    }

    /// Number of registered waiters.
    #[must_use]
    pub fn waiter_count(&self) -> usize { self.lock().waiters.len() }

    /// Wait for `waiter` to resolve.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Timeout`] if no qualifying snapshot arrives in
    /// time, or the error the waiter was rejected with.
    pub async fn wait(&self, waiter: StatusWaiter, timeout: Duration) -> Result<WaitOutcome> {
        let StatusWaiter { id, rx } = waiter;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                self.cancel(id, BridgeError::timeout("status update", timeout));
                Err(BridgeError::timeout("status update", timeout))
            }
        }
    }
}
