use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use super::{CommitLog, CommitRecord};
use crate::codec::{from_cbor, to_canonical_cbor};
use crate::{StoreError, StoreResult, io_error};

const LOG_DIR: &str = "bindings";
const LOG_FILE: &str = "commits.log";

/// Filesystem-backed commit log storing length-prefixed canonical CBOR records
/// under `<root>/bindings/commits.log`.
#[derive(Debug)]
pub struct FsCommitLog {
    path: PathBuf,
}

impl FsCommitLog {
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = root.as_ref().join(LOG_DIR);
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        let path = dir.join(LOG_FILE);
        if !path.exists() {
            File::create(&path).map_err(|e| io_error(&path, e))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `root` already holds a commit log.
    pub fn exists(root: impl AsRef<Path>) -> bool {
        root.as_ref().join(LOG_DIR).join(LOG_FILE).is_file()
    }
}

impl CommitLog for FsCommitLog {
    fn append(&mut self, record: &CommitRecord) -> StoreResult<()> {
        let bytes = to_canonical_cbor(record)?;
        if bytes.len() > u32::MAX as usize {
            return Err(StoreError::Corrupt(format!(
                "commit {} larger than 4GiB",
                record.seq
            )));
        }
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| io_error(&self.path, e))?;
        write_or_rewind(&mut file, |file| {
            file.write_all(&(bytes.len() as u32).to_le_bytes())?;
            file.write_all(&bytes)?;
            file.sync_all()
        })
        .map_err(|e| io_error(&self.path, e))
    }

    fn load_all(&self) -> StoreResult<Vec<CommitRecord>> {
        read_all_records(&self.path)
    }
}

/// Run `write` against `file`; on failure, truncate back to the length the
/// file had before so a partial record never reaches the log.
fn write_or_rewind(
    file: &mut File,
    write: impl FnOnce(&mut File) -> io::Result<()>,
) -> io::Result<()> {
    let start = file.metadata()?.len();
    let result = write(file);
    if result.is_err()
        && let Err(err) = file.set_len(start).and_then(|_| file.sync_all())
    {
        log::error!("failed to discard partial commit record: {err}");
    }
    result
}

fn read_all_records(path: &Path) -> StoreResult<Vec<CommitRecord>> {
    let mut file = File::open(path).map_err(|e| io_error(path, e))?;
    let mut records = Vec::new();
    loop {
        let mut len_buf = [0u8; 4];
        let read = file.read(&mut len_buf).map_err(|e| io_error(path, e))?;
        if read == 0 {
            break;
        }
        if read < len_buf.len() {
            return Err(StoreError::Corrupt(format!(
                "truncated length header (read {read} bytes)"
            )));
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        if let Err(err) = file.read_exact(&mut buf) {
            if err.kind() == ErrorKind::UnexpectedEof {
                return Err(StoreError::Corrupt("truncated commit record".into()));
            }
            return Err(io_error(path, err));
        }
        let record: CommitRecord = from_cbor(&buf)?;
        records.push(record);
    }
    Ok(records)
}
