//! # SiltDB
//!
//! An embedded, single-process, ordered key-value store organised as a
//! log-structured merge-tree.
//!
//! Writes are appended to a write-ahead log and buffered in an in-memory
//! sorted table; when the buffer passes a size threshold it is flushed to an
//! immutable on-disk table (data + dense index + sparse index), and when the
//! on-disk tables pile up the two oldest are merged pairwise. Reads layer
//! the memtable over the disk tables newest-to-oldest.
//!
//! The engine is **not** safe for concurrent access: callers that need
//! concurrency must wrap [`Db`] in a mutex. All I/O is synchronous and every
//! operation, including any flush or compaction it triggers, completes
//! before returning.
//!
//! ## Example
//! ```no_run
//! use siltdb::Db;
//!
//! # fn main() -> siltdb::Result<()> {
//! let mut db = Db::open("/tmp/silt")?;
//! db.put(b"Hi!", b"Hello world!")?;
//! assert_eq!(db.get(b"Hi!")?, Some(b"Hello world!".to_vec()));
//! db.delete(b"Hi!")?;
//! assert_eq!(db.get(b"Hi!")?, None);
//! db.close()
//! # }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use codec::Value;
use memtable::Memtable;
use thiserror::Error;
use tracing::{debug, info, warn};
use wal::Wal;

/// Maximum allowed key size in bytes. Hard-coded; the on-disk encoding
/// depends on it staying within 16 bits.
pub const MAX_KEY_SIZE: usize = 65535;

/// Maximum allowed value size in bytes.
pub const MAX_VALUE_SIZE: usize = 65535;

#[derive(Debug, Error)]
pub enum Error {
    /// A zero-length or missing key was passed to `put`.
    #[error("key required")]
    KeyRequired,
    /// A zero-length or missing value was passed to `put`.
    #[error("value required")]
    ValueRequired,
    /// The key exceeds [`MAX_KEY_SIZE`].
    #[error("key too large")]
    KeyTooLarge,
    /// The value exceeds [`MAX_VALUE_SIZE`].
    #[error("value too large")]
    ValueTooLarge,
    /// The database directory must exist before `open`.
    #[error("directory {} does not exist", .0.display())]
    DirNotFound(PathBuf),
    /// WAL or codec failure: I/O, or a corrupt log discovered at open.
    #[error(transparent)]
    Wal(#[from] codec::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Disk-table failure: I/O or a corrupt table discovered during a read,
    /// flush or compaction.
    #[error(transparent)]
    DiskTable(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Engine tunables with field-wise defaults.
///
/// ```
/// use siltdb::Options;
///
/// let options = Options::default()
///     .mem_table_threshold(1_000_000)
///     .sparse_key_distance(64);
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    mem_table_threshold: usize,
    sparse_key_distance: usize,
    disk_table_num_threshold: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            mem_table_threshold: 64_000,
            sparse_key_distance: 128,
            disk_table_num_threshold: 10,
        }
    }
}

impl Options {
    /// Memtable size (key + value bytes) at which a write triggers a flush
    /// to a new disk table. Default 64 kB.
    pub fn mem_table_threshold(mut self, bytes: usize) -> Self {
        self.mem_table_threshold = bytes;
        self
    }

    /// Distance between keys anchored in the sparse index. Default 128.
    pub fn sparse_key_distance(mut self, distance: usize) -> Self {
        self.sparse_key_distance = distance;
        self
    }

    /// Number of disk tables at which a write triggers a merge of the two
    /// oldest. Default 10.
    pub fn disk_table_num_threshold(mut self, num: u64) -> Self {
        self.disk_table_num_threshold = num;
        self
    }
}

/// The LSM-tree engine.
///
/// Owns the WAL handle and the memtable between [`open`](Db::open) and
/// [`close`](Db::close). Give every instance its own dedicated directory.
pub struct Db {
    db_dir: PathBuf,

    /// Every write lands here, fsynced, before it touches the memtable.
    wal: Wal,

    /// Changes durable in the WAL but not yet flushed to a disk table.
    memtable: Memtable,

    /// Highest disk-table index allocated so far; -1 before the first flush.
    max_disk_table_index: i64,

    /// Count of live disk tables.
    disk_table_num: u64,

    options: Options,
}

impl Db {
    /// Opens the database in an existing directory with default options.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(db_dir, Options::default())
    }

    /// Opens the database in an existing directory.
    ///
    /// Replays the WAL into the memtable and reads the disk-table meta, so
    /// every acknowledged write from the previous run is visible. Stale
    /// `merge-*` files left by a crashed compaction are swept best-effort.
    pub fn open_with(db_dir: impl AsRef<Path>, options: Options) -> Result<Self> {
        let db_dir = db_dir.as_ref().to_path_buf();
        if !db_dir.is_dir() {
            return Err(Error::DirNotFound(db_dir));
        }

        sweep_stale_merge_files(&db_dir);

        let mut wal = Wal::open(&db_dir)?;
        let memtable = wal.load()?;
        let (disk_table_num, max_disk_table_index) = disktable::read_meta(&db_dir)?;

        debug!(
            dir = %db_dir.display(),
            tables = disk_table_num,
            max_index = max_disk_table_index,
            wal_entries = memtable.len(),
            "opened database"
        );

        Ok(Self {
            db_dir,
            wal,
            memtable,
            max_disk_table_index,
            disk_table_num,
            options,
        })
    }

    /// Stores a key-value pair.
    ///
    /// The record is durable when this returns. May trigger a flush (when
    /// the memtable passes its threshold) and then a compaction (when the
    /// table count passes its threshold); both complete before returning.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyRequired);
        } else if key.len() > MAX_KEY_SIZE {
            return Err(Error::KeyTooLarge);
        } else if value.is_empty() {
            return Err(Error::ValueRequired);
        } else if value.len() > MAX_VALUE_SIZE {
            return Err(Error::ValueTooLarge);
        }

        let value = Value::Data(value.to_vec());
        self.wal.append(key, &value)?;
        self.memtable.put(key.to_vec(), value);

        if self.memtable.bytes() >= self.options.mem_table_threshold {
            self.flush_memtable()?;
        }

        if self.disk_table_num >= self.options.disk_table_num_threshold {
            self.merge_oldest_disk_tables()?;
        }

        Ok(())
    }

    /// Looks up a key.
    ///
    /// The memtable decides first: a live value or a tombstone there
    /// shadows every disk table. Only a key entirely absent from the
    /// memtable falls through to the disk-table window, newest first.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.memtable.get(key) {
            return Ok(value.as_data().map(|v| v.to_vec()));
        }

        let found = disktable::search_disk_tables(
            &self.db_dir,
            self.max_disk_table_index,
            self.disk_table_num,
            key,
        )?;

        Ok(found.and_then(Value::into_data))
    }

    /// Marks a key as deleted.
    ///
    /// Appends a tombstone to the WAL and the memtable; the tombstone
    /// shadows older values until compaction eventually drops the key.
    /// Deletes never trigger a flush or compaction.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.wal.append(key, &Value::Tombstone)?;
        self.memtable.delete(key.to_vec());

        Ok(())
    }

    /// Closes the database, releasing the WAL handle.
    ///
    /// The memtable is discarded; its contents are already durable in the
    /// WAL and will be replayed by the next `open`.
    pub fn close(self) -> Result<()> {
        drop(self.wal);

        Ok(())
    }

    /// Flushes the memtable to a new disk table and starts a fresh WAL.
    ///
    /// Ordering is what makes this crash-safe: the table files are synced,
    /// then the meta makes the table live, and only then is the WAL
    /// truncated and the memtable cleared.
    fn flush_memtable(&mut self) -> Result<()> {
        let new_num = self.disk_table_num + 1;
        let new_index = self.max_disk_table_index + 1;
        let flushed_bytes = self.memtable.bytes();

        disktable::create_disk_table(
            &self.memtable,
            &self.db_dir,
            new_index as u64,
            self.options.sparse_key_distance,
        )?;
        disktable::write_meta(&self.db_dir, new_num, new_index as u64)?;

        self.wal.rotate()?;
        self.memtable.clear();
        self.disk_table_num = new_num;
        self.max_disk_table_index = new_index;

        info!(index = new_index, bytes = flushed_bytes, "flushed memtable");

        Ok(())
    }

    /// Merges the two oldest disk tables into one, shrinking the window by
    /// one from the old end.
    fn merge_oldest_disk_tables(&mut self) -> Result<()> {
        let oldest = self.max_disk_table_index - self.disk_table_num as i64 + 1;
        disktable::merge_disk_tables(
            &self.db_dir,
            oldest as u64,
            oldest as u64 + 1,
            self.options.sparse_key_distance,
        )?;

        let new_num = self.disk_table_num - 1;
        disktable::write_meta(&self.db_dir, new_num, self.max_disk_table_index as u64)?;
        self.disk_table_num = new_num;

        info!(older = oldest, newer = oldest + 1, "merged disk tables");

        Ok(())
    }
}

/// Removes `merge-*` leftovers from a compaction that died before its swap.
/// The inputs of that compaction are still intact, so the leftovers are
/// garbage by definition. Failures are logged and ignored.
fn sweep_stale_merge_files(db_dir: &Path) {
    for path in disktable::table_file_paths(db_dir, disktable::MERGE_PREFIX) {
        if path.exists() {
            match fs::remove_file(&path) {
                Ok(()) => warn!(file = %path.display(), "removed stale merge file"),
                Err(e) => warn!(file = %path.display(), error = %e, "failed to remove stale merge file"),
            }
        }
    }
}
