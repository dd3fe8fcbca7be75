//! Transactional binding store: named bindings, serializable optimistic
//! transactions, and in-memory or filesystem commit logs.
//!
//! The store exposes exactly four primitives per namespace (`bind`, `lookup`,
//! `unbind`, `next_bound_name`), all of which require an active
//! [`Transaction`]. Everything else in the workspace is built on top of them.

mod bindings;
pub mod codec;
pub mod commit_log;
mod config;
pub mod stats;
mod store;
mod txn;

pub use bindings::{Bindings, NamespaceView};
pub use commit_log::{CommitLog, CommitRecord, WriteOp, fs::FsCommitLog, mem::MemCommitLog};
pub use config::StoreConfig;
pub use stats::{NoopRecorder, OpCounters, OpRecorder, SharedRecorder};
pub use store::{BindingStore, BindingStoreBuilder, StoreStatus};
pub use txn::{CommitAction, Transaction, TxnId};

use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf};

pub type StoreResult<T> = Result<T, StoreError>;

/// Binding namespaces. Application code and services bind names in separate
/// spaces so a service's internal bindings never shadow application names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    App,
    Service,
}

impl Namespace {
    /// Prefix every qualified key in this namespace starts with.
    pub(crate) fn tag(self) -> &'static str {
        match self {
            Namespace::App => "a.",
            Namespace::Service => "s.",
        }
    }

    /// A key strictly below every key of the namespace.
    pub(crate) fn floor(self) -> &'static str {
        match self {
            Namespace::App => "a",
            Namespace::Service => "s",
        }
    }

    /// A key strictly above every key of the namespace.
    pub(crate) fn ceiling(self) -> &'static str {
        match self {
            Namespace::App => "a/",
            Namespace::Service => "s/",
        }
    }

    pub(crate) fn qualify(self, name: &str) -> String {
        let tag = self.tag();
        let mut key = String::with_capacity(tag.len() + name.len());
        key.push_str(tag);
        key.push_str(name);
        key
    }

    pub(crate) fn strip(self, key: &str) -> Option<&str> {
        key.strip_prefix(self.tag())
    }

    pub(crate) fn from_key(key: &str) -> Option<Self> {
        [Namespace::App, Namespace::Service]
            .into_iter()
            .find(|ns| key.starts_with(ns.tag()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::App => "app",
            Namespace::Service => "service",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no active transaction")]
    NoActiveTransaction,
    #[error("transaction {txn} conflicted on binding '{name}'")]
    Conflict { txn: TxnId, name: String },
    #[error("transaction {txn} timed out after {elapsed_ms} ms")]
    Timeout { txn: TxnId, elapsed_ms: u64 },
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("CBOR serialization error: {0}")]
    Cbor(#[from] serde_cbor::Error),
    #[error("corrupt commit log: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Errors after which the same unit of work may succeed in a new transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Timeout { .. })
    }
}

pub(crate) fn io_error(path: impl Into<PathBuf>, err: io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source: err,
    }
}
