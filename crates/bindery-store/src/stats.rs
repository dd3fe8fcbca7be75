//! Per-operation call counters.
//!
//! Recording is fire-and-forget: a recorder never fails and never influences
//! the outcome of the operation being counted.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

pub type SharedRecorder = Arc<dyn OpRecorder>;

pub trait OpRecorder: Send + Sync {
    fn record(&self, op: &'static str);
}

/// Recorder that drops every occurrence.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl OpRecorder for NoopRecorder {
    fn record(&self, _op: &'static str) {}
}

/// Thread-safe named counters. Clones share the same counts.
#[derive(Debug, Default, Clone)]
pub struct OpCounters {
    counts: Arc<Mutex<BTreeMap<&'static str, u64>>>,
}

impl OpCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> SharedRecorder {
        Arc::new(self.clone())
    }

    pub fn count(&self, op: &str) -> u64 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(op)
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(op, count)| ((*op).to_string(), *count))
            .collect()
    }
}

impl OpRecorder for OpCounters {
    fn record(&self, op: &'static str) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        *counts.entry(op).or_insert(0) += 1;
    }
}
