use std::fs::{File, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};
use codec::Value;
use memtable::Memtable;

use crate::{data_path, index_path, sparse_path, table_prefix};

/// Writes one disk table: data, dense index and sparse index files under a
/// common prefix.
///
/// Keys must be fed in ascending order (the memtable iterator and the merge
/// loop both guarantee this). The writer tracks the running positions of the
/// data and index files itself, so records go straight to disk in one pass.
pub struct DiskTableWriter {
    data_file: File,
    index_file: File,
    sparse_file: File,

    sparse_key_distance: usize,

    key_num: usize,
    data_pos: u64,
    index_pos: u64,
}

impl DiskTableWriter {
    /// Opens the three table files under `prefix`, truncating leftovers.
    pub fn create(db_dir: &Path, prefix: &str, sparse_key_distance: usize) -> Result<Self> {
        let open = |path: &Path| -> Result<File> {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .with_context(|| format!("failed to open {}", path.display()))
        };

        Ok(Self {
            data_file: open(&data_path(db_dir, prefix))?,
            index_file: open(&index_path(db_dir, prefix))?,
            sparse_file: open(&sparse_path(db_dir, prefix))?,
            sparse_key_distance,
            key_num: 0,
            data_pos: 0,
            index_pos: 0,
        })
    }

    /// Appends one record: the data file gets the record itself, the index
    /// file gets `key -> data offset`, and every `sparse_key_distance`-th
    /// key (the first one always) additionally anchors the sparse file with
    /// `key -> index offset`.
    pub fn write(&mut self, key: &[u8], value: &Value) -> Result<()> {
        let data_bytes = codec::encode(key, value, &mut self.data_file)
            .context("failed to write to the data file")?;

        let index_bytes = codec::encode_key_offset(key, self.data_pos, &mut self.index_file)
            .context("failed to write to the index file")?;

        if self.key_num % self.sparse_key_distance == 0 {
            codec::encode_key_offset(key, self.index_pos, &mut self.sparse_file)
                .context("failed to write to the sparse index file")?;
        }

        self.data_pos += data_bytes as u64;
        self.index_pos += index_bytes as u64;
        self.key_num += 1;

        Ok(())
    }

    /// Commits all written contents to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.data_file
            .sync_all()
            .context("failed to sync data file")?;
        self.index_file
            .sync_all()
            .context("failed to sync index file")?;
        self.sparse_file
            .sync_all()
            .context("failed to sync sparse index file")?;

        Ok(())
    }
}

/// Flushes a memtable to a new disk table with the given index.
///
/// A partial failure leaves stale files behind; the caller decides whether
/// the table became live by writing (or not writing) the meta file.
pub fn create_disk_table(
    memtable: &Memtable,
    db_dir: &Path,
    index: u64,
    sparse_key_distance: usize,
) -> Result<()> {
    let prefix = table_prefix(index);
    let mut writer = DiskTableWriter::create(db_dir, &prefix, sparse_key_distance)
        .context("failed to create disk table writer")?;

    for (key, value) in memtable.iter() {
        writer
            .write(key, value)
            .with_context(|| format!("failed to write to disk table {index}"))?;
    }

    writer.sync()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;
    use tempfile::tempdir;

    fn sample_memtable() -> Memtable {
        let mut m = Memtable::new();
        for key in [b"b", b"c", b"d", b"e", b"f", b"g", b"h"] {
            let mut value = b"v".to_vec();
            value.extend_from_slice(key);
            m.put(key.to_vec(), Value::Data(value));
        }
        m
    }

    fn decode_all(path: &Path) -> Vec<(Vec<u8>, Value)> {
        let mut r = BufReader::new(File::open(path).unwrap());
        let mut out = Vec::new();
        while let Some(entry) = codec::decode(&mut r).unwrap() {
            out.push(entry);
        }
        out
    }

    #[test]
    fn writes_all_three_files() {
        let dir = tempdir().unwrap();
        create_disk_table(&sample_memtable(), dir.path(), 0, 3).unwrap();

        for path in crate::table_file_paths(dir.path(), "0-") {
            assert!(path.exists(), "{} missing", path.display());
        }
    }

    #[test]
    fn data_file_holds_sorted_records() {
        let dir = tempdir().unwrap();
        create_disk_table(&sample_memtable(), dir.path(), 0, 3).unwrap();

        let records = decode_all(&data_path(dir.path(), "0-"));
        let keys: Vec<_> = records.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(
            keys,
            vec![
                b"b".to_vec(),
                b"c".to_vec(),
                b"d".to_vec(),
                b"e".to_vec(),
                b"f".to_vec(),
                b"g".to_vec(),
                b"h".to_vec()
            ]
        );
        assert_eq!(records[0].1, Value::Data(b"vb".to_vec()));
    }

    #[test]
    fn index_entries_point_at_data_records() {
        let dir = tempdir().unwrap();
        create_disk_table(&sample_memtable(), dir.path(), 0, 3).unwrap();

        // each data record is 8 + 8 + 1 + 2 = 19 bytes
        let entries = decode_all(&index_path(dir.path(), "0-"));
        assert_eq!(entries.len(), 7);
        for (i, (_, value)) in entries.iter().enumerate() {
            assert_eq!(codec::decode_offset(value).unwrap(), i as u64 * 19);
        }
    }

    #[test]
    fn sparse_file_samples_every_nth_key() {
        let dir = tempdir().unwrap();
        create_disk_table(&sample_memtable(), dir.path(), 0, 3).unwrap();

        // each index entry is 8 + 8 + 1 + 8 = 25 bytes; anchors at keys 0, 3, 6
        let entries = decode_all(&sparse_path(dir.path(), "0-"));
        let decoded: Vec<_> = entries
            .iter()
            .map(|(k, v)| (k.clone(), codec::decode_offset(v).unwrap()))
            .collect();
        assert_eq!(
            decoded,
            vec![
                (b"b".to_vec(), 0),
                (b"e".to_vec(), 75),
                (b"h".to_vec(), 150)
            ]
        );
    }

    #[test]
    fn tombstones_are_flushed() {
        let dir = tempdir().unwrap();
        let mut m = Memtable::new();
        m.put(b"a".to_vec(), Value::Data(b"va".to_vec()));
        m.delete(b"b".to_vec());
        create_disk_table(&m, dir.path(), 0, 3).unwrap();

        let records = decode_all(&data_path(dir.path(), "0-"));
        assert_eq!(records[1], (b"b".to_vec(), Value::Tombstone));
    }

    #[test]
    fn first_key_is_always_a_sparse_anchor() {
        let dir = tempdir().unwrap();
        let mut m = Memtable::new();
        m.put(b"only".to_vec(), Value::Data(b"v".to_vec()));
        create_disk_table(&m, dir.path(), 0, 128).unwrap();

        let entries = decode_all(&sparse_path(dir.path(), "0-"));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, b"only".to_vec());
    }
}
