pub mod fs;
pub mod mem;

use serde::{Deserialize, Serialize};

use crate::codec::Checksum;
use crate::{StoreError, StoreResult, TxnId};

/// One mutation of a committed write set. Names are namespace-qualified keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    Bind {
        name: String,
        #[serde(with = "serde_bytes")]
        value: Vec<u8>,
    },
    Unbind {
        name: String,
    },
}

impl WriteOp {
    pub fn name(&self) -> &str {
        match self {
            WriteOp::Bind { name, .. } | WriteOp::Unbind { name } => name,
        }
    }
}

/// A committed transaction as persisted by a [`CommitLog`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitRecord {
    pub seq: u64,
    pub txn: TxnId,
    pub writes: Vec<WriteOp>,
    pub checksum: String,
}

impl CommitRecord {
    pub fn new(seq: u64, txn: TxnId, writes: Vec<WriteOp>) -> StoreResult<Self> {
        let checksum = Checksum::of_cbor(&writes)?.to_hex();
        Ok(Self {
            seq,
            txn,
            writes,
            checksum,
        })
    }

    /// Recompute the write-set checksum and compare with the stored one.
    pub fn verify(&self) -> StoreResult<()> {
        let actual = Checksum::of_cbor(&self.writes)?.to_hex();
        if actual != self.checksum {
            return Err(StoreError::Corrupt(format!(
                "commit {} checksum mismatch: expected {}, got {actual}",
                self.seq, self.checksum
            )));
        }
        Ok(())
    }
}

/// Append-only sink for committed write sets. Records are appended in
/// strictly increasing `seq` order while the store lock is held.
pub trait CommitLog: Send {
    fn append(&mut self, record: &CommitRecord) -> StoreResult<()>;
    fn load_all(&self) -> StoreResult<Vec<CommitRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tampered_record_fails_verification() {
        let mut record = CommitRecord::new(
            3,
            9,
            vec![WriteOp::Bind {
                name: "a.listener".into(),
                value: vec![1, 2, 3],
            }],
        )
        .unwrap();
        record.verify().unwrap();
        record.writes.push(WriteOp::Unbind {
            name: "a.other".into(),
        });
        assert!(matches!(record.verify(), Err(StoreError::Corrupt(_))));
    }
}
