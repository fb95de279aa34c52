use std::fs;
use std::io;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Meta file name inside the database directory.
pub const META_FILE_NAME: &str = "maxdisktable";

/// Reads `(num, max_index)`: the count of live disk tables and the highest
/// index ever allocated. A missing file reads as `(0, -1)`, meaning no
/// table has existed yet.
pub fn read_meta(db_dir: &Path) -> Result<(u64, i64)> {
    let path = db_dir.join(META_FILE_NAME);
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((0, -1)),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    let buf: [u8; 16] = match data.as_slice().try_into() {
        Ok(buf) => buf,
        Err(_) => bail!("corrupt meta file {}: {} bytes", path.display(), data.len()),
    };
    let (num, max_index) = codec::decode_u64_pair(&buf);

    Ok((num, max_index as i64))
}

/// Overwrites the meta file with `(num, max_index)`.
///
/// Called after every flush and every compaction, once the table files
/// themselves are durable; the meta file is what makes a table live.
pub fn write_meta(db_dir: &Path, num: u64, max_index: u64) -> Result<()> {
    let path = db_dir.join(META_FILE_NAME);
    fs::write(&path, codec::encode_u64_pair(num, max_index))
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_defaults() {
        let dir = tempdir().unwrap();
        assert_eq!(read_meta(dir.path()).unwrap(), (0, -1));
    }

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        write_meta(dir.path(), 3, 7).unwrap();
        assert_eq!(read_meta(dir.path()).unwrap(), (3, 7));
    }

    #[test]
    fn overwrite_replaces() {
        let dir = tempdir().unwrap();
        write_meta(dir.path(), 3, 7).unwrap();
        write_meta(dir.path(), 2, 7).unwrap();
        assert_eq!(read_meta(dir.path()).unwrap(), (2, 7));
        assert_eq!(
            std::fs::metadata(dir.path().join(META_FILE_NAME)).unwrap().len(),
            16
        );
    }

    #[test]
    fn short_file_is_corrupt() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(META_FILE_NAME), [0u8; 7]).unwrap();
        assert!(read_meta(dir.path()).is_err());
    }
}
