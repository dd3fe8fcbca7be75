use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::commit_log::{CommitLog, CommitRecord, WriteOp, fs::FsCommitLog, mem::MemCommitLog};
use crate::txn::{AccessSet, Transaction, TxnId};
use crate::{Namespace, NoopRecorder, SharedRecorder, StoreConfig, StoreError, StoreResult};

struct Slot {
    value: Vec<u8>,
    /// Sequence number of the commit that last bound this name.
    version: u64,
}

pub(crate) struct StoreState {
    slots: BTreeMap<String, Slot>,
    last_seq: u64,
    log: Box<dyn CommitLog>,
}

impl StoreState {
    fn new(log: Box<dyn CommitLog>) -> Self {
        Self {
            slots: BTreeMap::new(),
            last_seq: 0,
            log,
        }
    }

    pub(crate) fn read(&self, key: &str) -> (Option<Vec<u8>>, Option<u64>) {
        match self.slots.get(key) {
            Some(slot) => (Some(slot.value.clone()), Some(slot.version)),
            None => (None, None),
        }
    }

    pub(crate) fn version(&self, key: &str) -> Option<u64> {
        self.slots.get(key).map(|slot| slot.version)
    }

    /// Smallest committed key in the open interval `(after, limit)`.
    pub(crate) fn next_between(&self, after: &str, limit: &str) -> Option<String> {
        if after >= limit {
            return None;
        }
        self.slots
            .range::<str, _>((Bound::Excluded(after), Bound::Excluded(limit)))
            .next()
            .map(|(key, _)| key.clone())
    }

    fn apply(&mut self, record: &CommitRecord) {
        for op in &record.writes {
            match op {
                WriteOp::Bind { name, value } => {
                    self.slots.insert(
                        name.clone(),
                        Slot {
                            value: value.clone(),
                            version: record.seq,
                        },
                    );
                }
                WriteOp::Unbind { name } => {
                    self.slots.remove(name);
                }
            }
        }
        self.last_seq = record.seq;
    }

    fn validate(&self, txn: TxnId, access: &AccessSet) -> StoreResult<()> {
        for (key, observed) in &access.reads {
            if self.version(key) != *observed {
                return Err(StoreError::Conflict {
                    txn,
                    name: key.clone(),
                });
            }
        }
        for range in &access.ranges {
            if self.next_between(&range.after, &range.limit) != range.seen {
                return Err(StoreError::Conflict {
                    txn,
                    name: range.seen.clone().unwrap_or_else(|| range.after.clone()),
                });
            }
        }
        Ok(())
    }
}

pub(crate) struct StoreShared {
    state: Mutex<StoreState>,
    pub(crate) config: StoreConfig,
    pub(crate) recorder: SharedRecorder,
    next_txn: AtomicU64,
}

impl StoreShared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn alloc_txn_id(&self) -> TxnId {
        self.next_txn.fetch_add(1, Ordering::Relaxed)
    }

    /// Validate the access set against the current committed state, then log
    /// and apply its writes. Returns the commit sequence number; read-only
    /// transactions return the last sequence without logging.
    pub(crate) fn commit(&self, txn: TxnId, access: AccessSet) -> StoreResult<u64> {
        let mut state = self.lock();
        state.validate(txn, &access)?;
        if access.writes.is_empty() {
            return Ok(state.last_seq);
        }
        let seq = state.last_seq + 1;
        let writes = access
            .writes
            .into_iter()
            .map(|(name, value)| match value {
                Some(value) => WriteOp::Bind { name, value },
                None => WriteOp::Unbind { name },
            })
            .collect();
        let record = CommitRecord::new(seq, txn, writes)?;
        state.log.append(&record)?;
        state.apply(&record);
        Ok(seq)
    }
}

/// Snapshot of store-wide counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub last_seq: u64,
    pub app_bindings: usize,
    pub service_bindings: usize,
}

/// Handle to a binding store. Clones share the same underlying state.
#[derive(Clone)]
pub struct BindingStore {
    shared: Arc<StoreShared>,
}

impl fmt::Debug for BindingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("BindingStore")
            .field("bindings", &state.slots.len())
            .field("last_seq", &state.last_seq)
            .finish()
    }
}

impl Default for BindingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingStore {
    /// Empty in-memory store with default configuration.
    pub fn new() -> Self {
        Self::from_state(
            StoreState::new(Box::new(MemCommitLog::new())),
            StoreConfig::default(),
            Arc::new(NoopRecorder),
        )
    }

    pub fn builder() -> BindingStoreBuilder {
        BindingStoreBuilder::default()
    }

    /// Open (or create) a file-backed store rooted at `root`, replaying every
    /// committed record.
    pub fn open_fs(root: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        Self::builder()
            .config(config)
            .log(FsCommitLog::open(root)?)
            .build()
    }

    fn from_state(state: StoreState, config: StoreConfig, recorder: SharedRecorder) -> Self {
        Self {
            shared: Arc::new(StoreShared {
                state: Mutex::new(state),
                config,
                recorder,
                next_txn: AtomicU64::new(1),
            }),
        }
    }

    /// Start a new transaction.
    pub fn begin(&self) -> Transaction {
        Transaction::begin(self.shared.clone())
    }

    /// Run `f` in a fresh transaction, committing on success and aborting on error.
    pub fn transact<T, E>(&self, f: impl FnOnce(&Transaction) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let txn = self.begin();
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                txn.abort();
                Err(err)
            }
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    pub fn recorder(&self) -> &SharedRecorder {
        &self.shared.recorder
    }

    pub fn status(&self) -> StoreStatus {
        let state = self.shared.lock();
        let count = |ns: Namespace| {
            state
                .slots
                .keys()
                .filter(|key| Namespace::from_key(key) == Some(ns))
                .count()
        };
        StoreStatus {
            last_seq: state.last_seq,
            app_bindings: count(Namespace::App),
            service_bindings: count(Namespace::Service),
        }
    }
}

#[derive(Default)]
pub struct BindingStoreBuilder {
    config: StoreConfig,
    recorder: Option<SharedRecorder>,
    log: Option<Box<dyn CommitLog>>,
}

impl BindingStoreBuilder {
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn recorder(mut self, recorder: SharedRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn log(mut self, log: impl CommitLog + 'static) -> Self {
        self.log = Some(Box::new(log));
        self
    }

    /// Build the store, replaying any records already present in the log.
    pub fn build(self) -> StoreResult<BindingStore> {
        let log = self
            .log
            .unwrap_or_else(|| Box::new(MemCommitLog::new()));
        let records = log.load_all()?;
        let mut state = StoreState::new(log);
        for record in &records {
            record.verify()?;
            if record.seq <= state.last_seq {
                return Err(StoreError::Corrupt(format!(
                    "commit {} follows commit {}",
                    record.seq, state.last_seq
                )));
            }
            state.apply(record);
        }
        if !records.is_empty() {
            log::debug!(
                "replayed {} commit(s) up to seq {}",
                records.len(),
                state.last_seq
            );
        }
        Ok(BindingStore::from_state(
            state,
            self.config,
            self.recorder.unwrap_or_else(|| Arc::new(NoopRecorder)),
        ))
    }
}
