use std::cmp::Ordering;
use std::path::Path;

use anyhow::{Context, Result};
use codec::Value;

use crate::{
    data_path, delete_disk_tables, rename_disk_table, table_prefix, DataFileIter,
    DiskTableWriter, MERGE_PREFIX,
};

/// Merges the disk tables `a` and `b` into one table occupying index `b`.
///
/// `a` must be less than `b`: table `b` is newer and wins key collisions.
/// The merged table is first written under the `merge-` prefix, then the two
/// inputs are deleted and the result renamed into the `b` slot, so a crash
/// mid-merge leaves the inputs untouched.
pub fn merge_disk_tables(db_dir: &Path, a: u64, b: u64, sparse_key_distance: usize) -> Result<()> {
    let a_prefix = table_prefix(a);
    let b_prefix = table_prefix(b);

    let a_path = data_path(db_dir, &a_prefix);
    let a_it = DataFileIter::open(&a_path)
        .with_context(|| format!("failed to open iterator for {}", a_path.display()))?;

    let b_path = data_path(db_dir, &b_prefix);
    let b_it = DataFileIter::open(&b_path)
        .with_context(|| format!("failed to open iterator for {}", b_path.display()))?;

    let mut writer = DiskTableWriter::create(db_dir, MERGE_PREFIX, sparse_key_distance)
        .context("failed to create disk table writer")?;

    merge(a_it, b_it, &mut writer).context("failed to merge disk tables")?;
    writer.sync()?;
    drop(writer);

    delete_disk_tables(db_dir, &[&a_prefix, &b_prefix])
        .context("failed to delete merged inputs")?;
    rename_disk_table(db_dir, MERGE_PREFIX, &b_prefix)
        .context("failed to rename merged disk table")?;

    Ok(())
}

/// Two-way sorted merge, newer side (`b`) winning ties.
///
/// Tombstones pass through: tables older than `a` may still hold values for
/// the same keys, so dropping a tombstone here would resurrect them.
fn merge(
    mut a_it: DataFileIter,
    mut b_it: DataFileIter,
    writer: &mut DiskTableWriter,
) -> Result<()> {
    let mut a_buf: Option<(Vec<u8>, Value)> = None;
    let mut b_buf: Option<(Vec<u8>, Value)> = None;

    loop {
        if a_buf.is_none() {
            a_buf = a_it.next().transpose().context("failed to get next for a")?;
        }
        if b_buf.is_none() {
            b_buf = b_it.next().transpose().context("failed to get next for b")?;
        }

        match (a_buf.take(), b_buf.take()) {
            (None, None) => return Ok(()),
            (Some((key, value)), None) | (None, Some((key, value))) => {
                writer.write(&key, &value).context("failed to write")?;
            }
            (Some(a), Some(b)) => match a.0.cmp(&b.0) {
                Ordering::Equal => {
                    writer.write(&b.0, &b.1).context("failed to write")?;
                }
                Ordering::Less => {
                    writer.write(&a.0, &a.1).context("failed to write")?;
                    b_buf = Some(b);
                }
                Ordering::Greater => {
                    writer.write(&b.0, &b.1).context("failed to write")?;
                    a_buf = Some(a);
                }
            },
        }
    }
}
