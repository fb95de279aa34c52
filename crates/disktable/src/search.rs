use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result};
use codec::Value;

use crate::{data_path, index_path, sparse_path, table_prefix};

/// Searches the live disk tables newest-to-oldest.
///
/// The live set is the contiguous window `[max_index - num + 1, max_index]`;
/// indices below it were consumed by compaction and their files no longer
/// exist. The first table that knows the key wins; its value may well be a
/// tombstone, which shadows anything older.
pub fn search_disk_tables(
    db_dir: &Path,
    max_index: i64,
    num: u64,
    key: &[u8],
) -> Result<Option<Value>> {
    let oldest = max_index - num as i64 + 1;
    let mut index = max_index;
    while index >= oldest {
        let found = search_disk_table(db_dir, index as u64, key)
            .with_context(|| format!("failed to search in disk table with index {index}"))?;
        if found.is_some() {
            return Ok(found);
        }
        index -= 1;
    }

    Ok(None)
}

/// Point lookup in a single disk table: sparse scan narrows to a dense-index
/// range, the dense index yields the data offset, the data file yields the
/// record. Read handles are opened per call and released on return.
pub fn search_disk_table(db_dir: &Path, index: u64, key: &[u8]) -> Result<Option<Value>> {
    let prefix = table_prefix(index);

    let sparse = sparse_path(db_dir, &prefix);
    let mut sparse_file = BufReader::new(
        File::open(&sparse)
            .with_context(|| format!("failed to open sparse index file {}", sparse.display()))?,
    );
    let range = search_in_sparse_index(&mut sparse_file, key)
        .with_context(|| format!("failed to search in sparse index file {}", sparse.display()))?;
    let (from, to) = match range {
        Some(range) => range,
        None => return Ok(None),
    };

    let index_p = index_path(db_dir, &prefix);
    let mut index_file = BufReader::new(
        File::open(&index_p)
            .with_context(|| format!("failed to open index file {}", index_p.display()))?,
    );
    let offset = match search_in_index(&mut index_file, from, to, key)
        .with_context(|| format!("failed to search in index file {}", index_p.display()))?
    {
        Some(offset) => offset,
        None => return Ok(None),
    };

    let data = data_path(db_dir, &prefix);
    let mut data_file = BufReader::new(
        File::open(&data)
            .with_context(|| format!("failed to open data file {}", data.display()))?,
    );
    search_in_data_file(&mut data_file, offset, key)
        .with_context(|| format!("failed to search in data file {}", data.display()))
}

/// Scans the sparse index for the dense-index byte range that may hold the
/// key.
///
/// Anchors are keys actually present in the table, so:
/// - an exact hit collapses the range to `(off, off)`;
/// - a key below the first anchor cannot be in this table at all;
/// - a key above the last anchor gets `(last_anchor, 0)`, where `to = 0`
///   means "scan to the end of the dense index" (the `to > from` guard in
///   [`search_in_index`] never engages for it).
fn search_in_sparse_index<R: Read>(r: &mut R, search_key: &[u8]) -> Result<Option<(u64, u64)>> {
    let mut from: Option<u64> = None;
    loop {
        let (key, value) = match codec::decode(r).context("failed to read")? {
            Some(entry) => entry,
            None => return Ok(from.map(|f| (f, 0))),
        };
        let offset = codec::decode_offset(&value).context("bad sparse index entry")?;

        match key.as_slice().cmp(search_key) {
            std::cmp::Ordering::Equal => return Ok(Some((offset, offset))),
            std::cmp::Ordering::Less => from = Some(offset),
            std::cmp::Ordering::Greater => {
                return Ok(from.map(|f| (f, offset)));
            }
        }
    }
}

/// Scans the dense index inside `[from, to]` for the key's data offset.
///
/// `to` only bounds the scan when `to > from`; otherwise the scan runs to
/// key match or EOF.
fn search_in_index<R: Read + Seek>(
    r: &mut R,
    from: u64,
    to: u64,
    search_key: &[u8],
) -> Result<Option<u64>> {
    r.seek(SeekFrom::Start(from)).context("failed to seek")?;

    loop {
        let (key, value) = match codec::decode(r).context("failed to read")? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let offset = codec::decode_offset(&value).context("bad index entry")?;

        if key == search_key {
            return Ok(Some(offset));
        }

        if to > from {
            let current = r.stream_position().context("failed to seek")?;
            if current > to {
                return Ok(None);
            }
        }
    }
}

/// Reads the data file forward from `offset` until the exact key.
///
/// The offset always points at the beginning of a record; with a consistent
/// index the match is the very first record, but scanning forward tolerates
/// a coarser starting point.
fn search_in_data_file<R: Read + Seek>(
    r: &mut R,
    offset: u64,
    search_key: &[u8],
) -> Result<Option<Value>> {
    r.seek(SeekFrom::Start(offset)).context("failed to seek")?;

    loop {
        match codec::decode(r).context("failed to read")? {
            Some((key, value)) if key == search_key => return Ok(Some(value)),
            Some(_) => continue,
            None => return Ok(None),
        }
    }
}
