use std::sync::{Arc, Mutex, PoisonError};

use super::{CommitLog, CommitRecord};
use crate::StoreResult;

/// In-memory commit log. Clones share records, so a store rebuilt from a
/// clone observes everything committed through the original.
#[derive(Debug, Default, Clone)]
pub struct MemCommitLog {
    records: Arc<Mutex<Vec<CommitRecord>>>,
}

impl MemCommitLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CommitRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CommitLog for MemCommitLog {
    fn append(&mut self, record: &CommitRecord) -> StoreResult<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    fn load_all(&self) -> StoreResult<Vec<CommitRecord>> {
        Ok(self.records())
    }
}
