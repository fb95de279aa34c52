use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use codec::Value;

/// Forward cursor over one data file.
///
/// Holds a one-record look-ahead so the merge loop can interleave two
/// cursors without losing records: opening the iterator eagerly decodes the
/// first record, and each `next` hands out the buffered record while
/// refilling the slot. An empty slot means the file is exhausted.
pub struct DataFileIter {
    reader: BufReader<File>,
    buffered: Option<(Vec<u8>, Value)>,
}

impl DataFileIter {
    /// Opens a data file and primes the look-ahead.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open data file {}", path.display()))?;
        let mut reader = BufReader::new(file);
        let buffered = codec::decode(&mut reader).context("failed to read")?;

        Ok(Self { reader, buffered })
    }
}

impl Iterator for DataFileIter {
    type Item = Result<(Vec<u8>, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.buffered.take()?;
        match codec::decode(&mut self.reader) {
            Ok(next) => self.buffered = next,
            Err(e) => return Some(Err(anyhow::Error::new(e).context("failed to read"))),
        }

        Some(Ok(current))
    }
}
