use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::bindings::NamespaceView;
use crate::store::StoreShared;
use crate::{Namespace, StoreError, StoreResult};

pub type TxnId = u64;

/// Deferred work run once, after the owning transaction commits.
pub type CommitAction = Box<dyn FnOnce() + Send>;

/// A committed-state `next` lookup over `(after, limit)` observed by a
/// transaction. Commit fails if the same lookup would now return something
/// else; keys at or above `limit` never affect it.
pub(crate) struct RangeRead {
    pub(crate) after: String,
    pub(crate) limit: String,
    pub(crate) seen: Option<String>,
}

#[derive(Default)]
pub(crate) struct AccessSet {
    /// Committed version observed per key (`None` = observed absent).
    pub(crate) reads: BTreeMap<String, Option<u64>>,
    pub(crate) ranges: Vec<RangeRead>,
    /// Buffered writes; `None` marks an unbind.
    pub(crate) writes: BTreeMap<String, Option<Vec<u8>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    Committed(u64),
    Aborted,
}

struct TxnState {
    status: Status,
    access: AccessSet,
    on_commit: Vec<CommitAction>,
}

impl TxnState {
    fn finish(&mut self, status: Status) {
        self.status = status;
        self.access = AccessSet::default();
        self.on_commit.clear();
    }
}

struct TxnInner {
    id: TxnId,
    store: Arc<StoreShared>,
    started: Instant,
    deadline: Instant,
    state: Mutex<TxnState>,
}

impl Drop for TxnInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state.status == Status::Active {
            log::debug!("transaction {} dropped while active; aborting", self.id);
        }
    }
}

/// Handle to one transaction. Clones refer to the same transaction; once it
/// commits or aborts every further operation fails with
/// [`StoreError::NoActiveTransaction`].
///
/// Reads see the latest committed bindings overlaid with this transaction's
/// own writes. Writes are buffered until [`Transaction::commit`], which
/// re-validates every read and fails with [`StoreError::Conflict`] if another
/// transaction changed what this one observed.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TxnInner>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("status", &self.lock_state().status)
            .finish()
    }
}

impl Transaction {
    pub(crate) fn begin(store: Arc<StoreShared>) -> Self {
        let started = Instant::now();
        let deadline = started + store.config.txn_timeout;
        let id = store.alloc_txn_id();
        Self {
            inner: Arc::new(TxnInner {
                id,
                store,
                started,
                deadline,
                state: Mutex::new(TxnState {
                    status: Status::Active,
                    access: AccessSet::default(),
                    on_commit: Vec::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> TxnId {
        self.inner.id
    }

    pub fn is_active(&self) -> bool {
        self.lock_state().status == Status::Active && Instant::now() <= self.inner.deadline
    }

    /// Commit sequence number, once committed.
    pub fn committed_seq(&self) -> Option<u64> {
        match self.lock_state().status {
            Status::Committed(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn app(&self) -> NamespaceView<'_> {
        self.bindings(Namespace::App)
    }

    pub fn service(&self) -> NamespaceView<'_> {
        self.bindings(Namespace::Service)
    }

    pub fn bindings(&self, namespace: Namespace) -> NamespaceView<'_> {
        NamespaceView::new(self, namespace)
    }

    /// Register `action` to run after a successful commit. Actions are dropped
    /// without running if the transaction aborts.
    pub fn on_commit(&self, action: impl FnOnce() + Send + 'static) -> StoreResult<()> {
        self.with_active(|state| {
            state.on_commit.push(Box::new(action));
            Ok(())
        })
    }

    /// Validate and apply this transaction's writes, then run commit actions.
    pub fn commit(&self) -> StoreResult<u64> {
        let mut state = self.lock_state();
        self.check_active(&mut state)?;
        let access = std::mem::take(&mut state.access);
        match self.inner.store.commit(self.inner.id, access) {
            Ok(seq) => {
                let actions = std::mem::take(&mut state.on_commit);
                state.finish(Status::Committed(seq));
                drop(state);
                log::debug!("transaction {} committed at seq {seq}", self.inner.id);
                for action in actions {
                    action();
                }
                Ok(seq)
            }
            Err(err) => {
                state.finish(Status::Aborted);
                log::debug!("transaction {} failed to commit: {err}", self.inner.id);
                Err(err)
            }
        }
    }

    /// Discard all buffered writes. Aborting a finished transaction is a no-op.
    pub fn abort(&self) {
        let mut state = self.lock_state();
        if state.status == Status::Active {
            state.finish(Status::Aborted);
            log::debug!("transaction {} aborted", self.inner.id);
        }
    }

    pub(crate) fn recorder(&self) -> &dyn crate::OpRecorder {
        self.inner.store.recorder.as_ref()
    }

    pub(crate) fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.with_active(|state| {
            if let Some(local) = state.access.writes.get(key) {
                return Ok(local.clone());
            }
            let (value, version) = self.inner.store.lock().read(key);
            state.access.reads.entry(key.to_string()).or_insert(version);
            Ok(value)
        })
    }

    pub(crate) fn contains(&self, key: &str) -> StoreResult<bool> {
        self.with_active(|state| {
            if let Some(local) = state.access.writes.get(key) {
                return Ok(local.is_some());
            }
            let version = self.inner.store.lock().version(key);
            state.access.reads.entry(key.to_string()).or_insert(version);
            Ok(version.is_some())
        })
    }

    pub(crate) fn put(&self, key: String, value: Vec<u8>) -> StoreResult<()> {
        self.with_active(|state| {
            state.access.writes.insert(key, Some(value));
            Ok(())
        })
    }

    /// Returns whether the key was bound before the call.
    pub(crate) fn remove(&self, key: &str) -> StoreResult<bool> {
        self.with_active(|state| {
            let existed = match state.access.writes.get(key) {
                Some(local) => local.is_some(),
                None => {
                    let version = self.inner.store.lock().version(key);
                    state.access.reads.entry(key.to_string()).or_insert(version);
                    version.is_some()
                }
            };
            if existed {
                state.access.writes.insert(key.to_string(), None);
            }
            Ok(existed)
        })
    }

    /// Smallest key in the open interval `(after, limit)`, merging committed
    /// keys with this transaction's own binds and unbinds. Only that interval
    /// is validated at commit.
    pub(crate) fn next_between(&self, after: &str, limit: &str) -> StoreResult<Option<String>> {
        self.with_active(|state| {
            if after >= limit {
                return Ok(None);
            }
            let committed = {
                let store = self.inner.store.lock();
                let mut cursor = after.to_string();
                loop {
                    let seen = store.next_between(&cursor, limit);
                    state.access.ranges.push(RangeRead {
                        after: cursor,
                        limit: limit.to_string(),
                        seen: seen.clone(),
                    });
                    match seen {
                        Some(key) if matches!(state.access.writes.get(&key), Some(None)) => {
                            cursor = key;
                        }
                        other => break other,
                    }
                }
            };
            let local = state
                .access
                .writes
                .range::<str, _>((Bound::Excluded(after), Bound::Excluded(limit)))
                .find(|(_, value)| value.is_some())
                .map(|(key, _)| key.clone());
            Ok(match (committed, local) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            })
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, TxnState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check_active(&self, state: &mut TxnState) -> StoreResult<()> {
        if state.status != Status::Active {
            return Err(StoreError::NoActiveTransaction);
        }
        let now = Instant::now();
        if now > self.inner.deadline {
            state.finish(Status::Aborted);
            let elapsed_ms = now.duration_since(self.inner.started).as_millis() as u64;
            log::warn!(
                "transaction {} exceeded its timeout ({elapsed_ms} ms); aborting",
                self.inner.id
            );
            return Err(StoreError::Timeout {
                txn: self.inner.id,
                elapsed_ms,
            });
        }
        Ok(())
    }

    fn with_active<T>(&self, f: impl FnOnce(&mut TxnState) -> StoreResult<T>) -> StoreResult<T> {
        let mut state = self.lock_state();
        self.check_active(&mut state)?;
        f(&mut state)
    }
}
