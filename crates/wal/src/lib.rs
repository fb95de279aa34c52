//! # WAL
//!
//! Append-only write-ahead log for the SiltDB storage engine.
//!
//! Every mutation is appended to `wal.db` and fsynced before it touches the
//! memtable, so the memtable can always be rebuilt by replaying the log. The
//! log mirrors the memtable exactly: after a flush makes the entries durable
//! in a disk table, the log is rotated (truncated to zero).
//!
//! Records use the shared [`codec`] frame. There are no record boundaries
//! beyond the length prefix; a torn tail (an `append` that died mid-write)
//! surfaces as [`codec::Error::Corrupt`] on the next load and is fatal to
//! opening the database.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use codec::{Error, Value};
use memtable::Memtable;

/// WAL file name inside the database directory.
pub const WAL_FILE_NAME: &str = "wal.db";

/// The write-ahead log, owning the open `wal.db` handle for the lifetime of
/// the engine.
pub struct Wal {
    path: PathBuf,
    file: File,
}

impl Wal {
    /// Opens (creating if missing) the WAL inside `db_dir`.
    pub fn open(db_dir: &Path) -> Result<Self, Error> {
        let path = db_dir.join(WAL_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        Ok(Self { path, file })
    }

    /// Appends one record and fsyncs it. Durability for the write is
    /// complete when this returns; failures are surfaced and not retried.
    pub fn append(&mut self, key: &[u8], value: &Value) -> Result<(), Error> {
        // the handle is open read-write, so reposition explicitly
        self.file.seek(SeekFrom::End(0))?;
        codec::encode(key, value, &mut self.file)?;
        self.file.sync_all()?;

        Ok(())
    }

    /// Replays the whole log into a fresh memtable.
    ///
    /// Called once at open. Corruption anywhere in the log is fatal: the
    /// memtable must mirror the log exactly or not at all.
    pub fn load(&mut self) -> Result<Memtable, Error> {
        self.file.seek(SeekFrom::Start(0))?;

        let mut memtable = Memtable::new();
        let mut reader = BufReader::new(&mut self.file);
        while let Some((key, value)) = codec::decode(&mut reader)? {
            memtable.put(key, value);
        }

        Ok(memtable)
    }

    /// Truncates the log to zero by reopening it.
    ///
    /// Called only by the flush path, after the new disk table and the meta
    /// file are durable; the entries being dropped all live in the new
    /// table.
    pub fn rotate(&mut self) -> Result<(), Error> {
        self.file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn data(v: &[u8]) -> Value {
        Value::Data(v.to_vec())
    }

    #[test]
    fn append_and_load() {
        let dir = tempdir().unwrap();

        let mut wal = Wal::open(dir.path()).unwrap();
        wal.append(b"k", &data(b"v1")).unwrap();
        wal.append(b"k2", &data(b"v2")).unwrap();
        wal.append(b"k", &Value::Tombstone).unwrap();

        let memtable = wal.load().unwrap();
        assert_eq!(memtable.len(), 2);
        assert_eq!(memtable.get(b"k"), Some(&Value::Tombstone));
        assert_eq!(memtable.get(b"k2"), Some(&data(b"v2")));
    }

    #[test]
    fn load_empty_log() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path()).unwrap();
        let memtable = wal.load().unwrap();
        assert!(memtable.is_empty());
    }

    #[test]
    fn load_survives_reopen() {
        let dir = tempdir().unwrap();

        {
            let mut wal = Wal::open(dir.path()).unwrap();
            wal.append(b"a", &data(b"1")).unwrap();
            wal.append(b"b", &data(b"2")).unwrap();
        }

        let mut wal = Wal::open(dir.path()).unwrap();
        let memtable = wal.load().unwrap();
        assert_eq!(memtable.get(b"a"), Some(&data(b"1")));
        assert_eq!(memtable.get(b"b"), Some(&data(b"2")));
    }

    #[test]
    fn append_after_load_goes_to_the_end() {
        let dir = tempdir().unwrap();

        let mut wal = Wal::open(dir.path()).unwrap();
        wal.append(b"a", &data(b"1")).unwrap();
        wal.load().unwrap();
        wal.append(b"b", &data(b"2")).unwrap();

        let memtable = wal.load().unwrap();
        assert_eq!(memtable.len(), 2);
    }

    #[test]
    fn rotate_truncates() {
        let dir = tempdir().unwrap();

        let mut wal = Wal::open(dir.path()).unwrap();
        wal.append(b"k", &data(b"v")).unwrap();
        wal.rotate().unwrap();

        assert_eq!(fs::metadata(dir.path().join(WAL_FILE_NAME)).unwrap().len(), 0);
        assert!(wal.load().unwrap().is_empty());

        // the rotated handle accepts new appends
        wal.append(b"k2", &data(b"v2")).unwrap();
        let memtable = wal.load().unwrap();
        assert_eq!(memtable.len(), 1);
        assert_eq!(memtable.get(b"k2"), Some(&data(b"v2")));
    }

    #[test]
    fn torn_tail_is_corrupt() {
        let dir = tempdir().unwrap();

        {
            let mut wal = Wal::open(dir.path()).unwrap();
            wal.append(b"k", &data(b"value")).unwrap();
        }

        // chop the last two bytes off the record
        let path = dir.path().join(WAL_FILE_NAME);
        let content = fs::read(&path).unwrap();
        fs::write(&path, &content[..content.len() - 2]).unwrap();

        let mut wal = Wal::open(dir.path()).unwrap();
        assert!(matches!(wal.load(), Err(Error::Corrupt)));
    }
}
