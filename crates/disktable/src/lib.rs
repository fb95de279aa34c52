//! # Disk table
//!
//! Immutable, on-disk sorted runs for the SiltDB storage engine.
//!
//! When the memtable exceeds its size threshold the engine flushes it to a
//! disk table: three files sharing a numeric prefix. A table is written
//! once and then only ever read; the single way it leaves the directory is
//! being consumed by a compaction.
//!
//! ## File layout
//!
//! ```text
//! <i>-data.db    sorted key/value records (tombstones included)
//! <i>-index.db   one entry per record: key -> offset into data.db
//! <i>-sparse.db  every Nth index entry: key -> offset into index.db
//! ```
//!
//! All three files use the shared [`codec`] frame; index and sparse entries
//! are frames whose value is an 8-byte big-endian offset. A point lookup
//! walks sparse -> index -> data, so only a small slice of the dense index
//! is ever scanned.
//!
//! Disk tables carry strictly increasing indices; index `i+1` is newer than
//! `i` and shadows it. The live set is always the contiguous window
//! `[max_index - num + 1, max_index]` recorded in the meta file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

mod iter;
mod merge;
mod meta;
mod search;
mod writer;

pub use iter::DataFileIter;
pub use merge::merge_disk_tables;
pub use meta::{read_meta, write_meta, META_FILE_NAME};
pub use search::{search_disk_table, search_disk_tables};
pub use writer::{create_disk_table, DiskTableWriter};

pub const DATA_FILE_SUFFIX: &str = "data.db";
pub const INDEX_FILE_SUFFIX: &str = "index.db";
pub const SPARSE_FILE_SUFFIX: &str = "sparse.db";

/// Prefix of the transient table written by a compaction before the swap.
pub const MERGE_PREFIX: &str = "merge-";

/// File prefix of the disk table with the given index.
pub fn table_prefix(index: u64) -> String {
    format!("{index}-")
}

/// The three file paths of a table with the given prefix, in
/// data/index/sparse order.
pub fn table_file_paths(db_dir: &Path, prefix: &str) -> [PathBuf; 3] {
    [
        db_dir.join(format!("{prefix}{DATA_FILE_SUFFIX}")),
        db_dir.join(format!("{prefix}{INDEX_FILE_SUFFIX}")),
        db_dir.join(format!("{prefix}{SPARSE_FILE_SUFFIX}")),
    ]
}

pub(crate) fn data_path(db_dir: &Path, prefix: &str) -> PathBuf {
    db_dir.join(format!("{prefix}{DATA_FILE_SUFFIX}"))
}

pub(crate) fn index_path(db_dir: &Path, prefix: &str) -> PathBuf {
    db_dir.join(format!("{prefix}{INDEX_FILE_SUFFIX}"))
}

pub(crate) fn sparse_path(db_dir: &Path, prefix: &str) -> PathBuf {
    db_dir.join(format!("{prefix}{SPARSE_FILE_SUFFIX}"))
}

/// Removes the three files of each given table prefix.
pub fn delete_disk_tables(db_dir: &Path, prefixes: &[&str]) -> Result<()> {
    for prefix in prefixes {
        for path in table_file_paths(db_dir, prefix) {
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
    }

    Ok(())
}

/// Renames a table's three files from one prefix to another.
pub fn rename_disk_table(db_dir: &Path, old_prefix: &str, new_prefix: &str) -> Result<()> {
    let old = table_file_paths(db_dir, old_prefix);
    let new = table_file_paths(db_dir, new_prefix);
    for (from, to) in old.iter().zip(new.iter()) {
        std::fs::rename(from, to)
            .with_context(|| format!("failed to rename {} to {}", from.display(), to.display()))?;
    }

    Ok(())
}
