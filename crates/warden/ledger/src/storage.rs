use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, info};
use warden_types::now_ms;

use crate::error::LedgerError;

/// One persisted record as raw bytes, tagged with its chain index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRecord {
    pub index: u64,
    pub bytes: Vec<u8>,
}

/// Storage backend trait: file-backed or in-memory.
///
/// Records are written once per index and never overwritten. Removal only
/// happens through [`quarantine`](LedgerStorage::quarantine), which moves
/// records aside instead of deleting them.
pub trait LedgerStorage: Send + Sync {
    /// Durably write the record at `index`. Fails if `index` already exists.
    fn persist(&self, index: u64, bytes: &[u8]) -> Result<(), LedgerError>;
    /// The live record at `index`, if any.
    fn read(&self, index: u64) -> Result<Option<Vec<u8>>, LedgerError>;
    /// All live records in index order.
    fn load_all(&self) -> Result<Vec<StoredRecord>, LedgerError>;
    /// Move every record with index `>= from_index` out of the live set.
    /// Returns how many records were moved.
    fn quarantine(&self, from_index: u64) -> Result<usize, LedgerError>;
}

// ---- File-backed storage ----

const RECORD_PREFIX: &str = "approval-";
const RECORD_SUFFIX: &str = ".json";
const QUARANTINE_DIR: &str = "quarantine";

/// One JSON file per record: `approval-{index:016x}.json`.
///
/// Each write goes to a temp file in the same directory, is fsynced, renamed
/// into place, and the directory is fsynced, so a crash never leaves a
/// half-written record under a live name.
pub struct FileLedgerStorage {
    data_dir: PathBuf,
    sync_writes: bool,
}

impl FileLedgerStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            sync_writes: true,
        })
    }

    /// Skip fsync calls. Only for tests and throwaway ledgers.
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn record_path(&self, index: u64) -> PathBuf {
        self.data_dir
            .join(format!("{RECORD_PREFIX}{index:016x}{RECORD_SUFFIX}"))
    }

    fn parse_index(name: &str) -> Option<u64> {
        let hex = name
            .strip_prefix(RECORD_PREFIX)?
            .strip_suffix(RECORD_SUFFIX)?;
        if hex.len() != 16 {
            return None;
        }
        u64::from_str_radix(hex, 16).ok()
    }

    fn list_indices(&self) -> Result<Vec<u64>, LedgerError> {
        let mut indices = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(index) = Self::parse_index(&name.to_string_lossy()) {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    fn sync_dir(&self, dir: &Path) -> Result<(), LedgerError> {
        if self.sync_writes {
            #[cfg(unix)]
            fs::File::open(dir)?.sync_all()?;
        }
        Ok(())
    }
}

impl LedgerStorage for FileLedgerStorage {
    fn persist(&self, index: u64, bytes: &[u8]) -> Result<(), LedgerError> {
        let path = self.record_path(index);
        if path.exists() {
            return Err(LedgerError::Storage(format!(
                "record {index} already persisted"
            )));
        }

        let tmp = self.data_dir.join(format!(".{RECORD_PREFIX}{index:016x}.tmp"));
        {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(bytes)?;
            if self.sync_writes {
                file.sync_all()?;
            }
        }
        fs::rename(&tmp, &path)?;
        self.sync_dir(&self.data_dir)?;

        debug!(index, path = %path.display(), "approval record persisted");
        Ok(())
    }

    fn read(&self, index: u64) -> Result<Option<Vec<u8>>, LedgerError> {
        match fs::read(self.record_path(index)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn load_all(&self) -> Result<Vec<StoredRecord>, LedgerError> {
        self.list_indices()?
            .into_iter()
            .map(|index| {
                Ok(StoredRecord {
                    index,
                    bytes: fs::read(self.record_path(index))?,
                })
            })
            .collect()
    }

    fn quarantine(&self, from_index: u64) -> Result<usize, LedgerError> {
        let moving: Vec<u64> = self
            .list_indices()?
            .into_iter()
            .filter(|i| *i >= from_index)
            .collect();
        if moving.is_empty() {
            return Ok(0);
        }

        let dest = self
            .data_dir
            .join(QUARANTINE_DIR)
            .join(format!("{}-from-{from_index:016x}", now_ms()));
        fs::create_dir_all(&dest)?;
        for index in &moving {
            let from = self.record_path(*index);
            let to = dest.join(format!("{RECORD_PREFIX}{index:016x}{RECORD_SUFFIX}"));
            fs::rename(&from, &to)?;
        }
        self.sync_dir(&dest)?;
        self.sync_dir(&self.data_dir)?;

        info!(
            moved = moving.len(),
            from_index,
            quarantine = %dest.display(),
            "approval records quarantined"
        );
        Ok(moving.len())
    }
}

// ---- In-memory storage (for testing) ----

/// In-memory storage with hooks for simulating tampering and write failures.
#[derive(Default)]
pub struct MemoryLedgerStorage {
    records: Mutex<BTreeMap<u64, Vec<u8>>>,
    quarantined: Mutex<Vec<StoredRecord>>,
    fail_writes: AtomicBool,
    fail_after_write: AtomicBool,
}

impl MemoryLedgerStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `persist` calls fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `persist` calls store the record and then report an
    /// I/O error, as a failed directory sync after the rename would.
    pub fn set_fail_after_write(&self, fail: bool) {
        self.fail_after_write.store(fail, Ordering::SeqCst);
    }

    /// Mutate the raw bytes of a persisted record in place.
    pub fn tamper<F>(&self, index: u64, f: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&mut Vec<u8>),
    {
        let mut records = self.records.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let bytes = records
            .get_mut(&index)
            .ok_or_else(|| LedgerError::Storage(format!("no record at {index}")))?;
        f(bytes);
        Ok(())
    }

    /// Write raw bytes at `index`, bypassing the append-only check.
    pub fn insert_raw(&self, index: u64, bytes: Vec<u8>) -> Result<(), LedgerError> {
        self.records
            .lock()
            .map_err(|_| LedgerError::LockPoisoned)?
            .insert(index, bytes);
        Ok(())
    }

    pub fn remove_raw(&self, index: u64) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self
            .records
            .lock()
            .map_err(|_| LedgerError::LockPoisoned)?
            .remove(&index))
    }

    pub fn raw(&self, index: u64) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self
            .records
            .lock()
            .map_err(|_| LedgerError::LockPoisoned)?
            .get(&index)
            .cloned())
    }

    pub fn quarantined(&self) -> Result<Vec<StoredRecord>, LedgerError> {
        Ok(self
            .quarantined
            .lock()
            .map_err(|_| LedgerError::LockPoisoned)?
            .clone())
    }
}

impl LedgerStorage for MemoryLedgerStorage {
    fn persist(&self, index: u64, bytes: &[u8]) -> Result<(), LedgerError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated write failure",
            )));
        }
        let mut records = self.records.lock().map_err(|_| LedgerError::LockPoisoned)?;
        if records.contains_key(&index) {
            return Err(LedgerError::Storage(format!(
                "record {index} already persisted"
            )));
        }
        records.insert(index, bytes.to_vec());
        if self.fail_after_write.load(Ordering::SeqCst) {
            return Err(LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated sync failure",
            )));
        }
        Ok(())
    }

    fn read(&self, index: u64) -> Result<Option<Vec<u8>>, LedgerError> {
        self.raw(index)
    }

    fn load_all(&self) -> Result<Vec<StoredRecord>, LedgerError> {
        let records = self.records.lock().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(records
            .iter()
            .map(|(index, bytes)| StoredRecord {
                index: *index,
                bytes: bytes.clone(),
            })
            .collect())
    }

    fn quarantine(&self, from_index: u64) -> Result<usize, LedgerError> {
        let mut records = self.records.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let tail = records.split_off(&from_index);
        let moved = tail.len();
        self.quarantined
            .lock()
            .map_err(|_| LedgerError::LockPoisoned)?
            .extend(
                tail.into_iter()
                    .map(|(index, bytes)| StoredRecord { index, bytes }),
            );
        Ok(moved)
    }
}
