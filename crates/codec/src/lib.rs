//! # Codec
//!
//! Binary framing shared by the WAL and the disk-table files of the SiltDB
//! storage engine.
//!
//! Every record (a WAL entry, a data-file entry, a dense- or sparse-index
//! entry) uses the same frame:
//!
//! ```text
//! [total_len: u64 BE][key_len: u64 BE][key bytes][value bytes]
//! ```
//!
//! `total_len` counts the bytes *after* the `total_len` field itself, i.e.
//! `8 + key.len() + value.len()`. A tombstone is a frame with an empty value
//! region (`total_len == 8 + key.len()`). Index entries reuse the same frame
//! with the value being exactly the 8-byte big-endian encoding of a file
//! offset, so one decoder serves all files.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt record")]
    Corrupt,
}

/// A stored value: either live bytes or a deletion marker.
///
/// Tombstones are first-class entries: they are written to the WAL and to
/// disk-table data files, and shadow older values for the same key until
/// compacted away. On the wire a tombstone is simply the absence of a value
/// region; the engine forbids empty live values, so the two cannot collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Data(Vec<u8>),
    Tombstone,
}

impl Value {
    /// Length in bytes; tombstones count as zero.
    pub fn len(&self) -> usize {
        match self {
            Value::Data(v) => v.len(),
            Value::Tombstone => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Value::Tombstone)
    }

    /// The live bytes, or `None` for a tombstone.
    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Value::Data(v) => Some(v),
            Value::Tombstone => None,
        }
    }

    pub fn into_data(self) -> Option<Vec<u8>> {
        match self {
            Value::Data(v) => Some(v),
            Value::Tombstone => None,
        }
    }
}

/// Encodes one record and writes it to `w`. Returns the number of bytes
/// written, which the disk-table writer uses to maintain file offsets.
pub fn encode<W: Write>(key: &[u8], value: &Value, w: &mut W) -> Result<usize, Error> {
    let value_bytes = value.as_data().unwrap_or(&[]);
    let total_len = 8 + key.len() + value_bytes.len();

    w.write_u64::<BigEndian>(total_len as u64)?;
    w.write_u64::<BigEndian>(key.len() as u64)?;
    w.write_all(key)?;
    w.write_all(value_bytes)?;

    Ok(8 + total_len)
}

/// Encodes an index entry mapping `key` to a file offset.
pub fn encode_key_offset<W: Write>(key: &[u8], offset: u64, w: &mut W) -> Result<usize, Error> {
    encode(key, &Value::Data(offset.to_be_bytes().to_vec()), w)
}

/// Decodes one record from `r`.
///
/// Returns `Ok(None)` on a clean end of stream, i.e. when zero bytes are
/// available at a record boundary. A partial length prefix, or a payload
/// shorter than the length prefix promises, is [`Error::Corrupt`].
pub fn decode<R: Read>(r: &mut R) -> Result<Option<(Vec<u8>, Value)>, Error> {
    let mut len_buf = [0u8; 8];
    if !fill_or_eof(r, &mut len_buf)? {
        return Ok(None);
    }
    let total_len = u64::from_be_bytes(len_buf) as usize;
    if total_len < 8 {
        return Err(Error::Corrupt);
    }

    let mut payload = vec![0u8; total_len];
    r.read_exact(&mut payload).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::Corrupt,
        _ => Error::Io(e),
    })?;

    let key_len = u64::from_be_bytes(payload[..8].try_into().unwrap()) as usize;
    if 8 + key_len > payload.len() {
        return Err(Error::Corrupt);
    }

    let key = payload[8..8 + key_len].to_vec();
    let value = if 8 + key_len == payload.len() {
        Value::Tombstone
    } else {
        Value::Data(payload[8 + key_len..].to_vec())
    };

    Ok(Some((key, value)))
}

/// Decodes the 8-byte big-endian offset stored in an index entry's value.
pub fn decode_offset(value: &Value) -> Result<u64, Error> {
    let mut bytes = value.as_data().ok_or(Error::Corrupt)?;
    if bytes.len() != 8 {
        return Err(Error::Corrupt);
    }
    Ok(bytes.read_u64::<BigEndian>()?)
}

/// Encodes two integers as the 16-byte payload of the meta file.
pub fn encode_u64_pair(x: u64, y: u64) -> [u8; 16] {
    let mut buf = [0u8; 16];
    buf[..8].copy_from_slice(&x.to_be_bytes());
    buf[8..].copy_from_slice(&y.to_be_bytes());
    buf
}

/// Decodes the 16-byte meta payload back into two integers.
pub fn decode_u64_pair(buf: &[u8; 16]) -> (u64, u64) {
    let x = u64::from_be_bytes(buf[..8].try_into().unwrap());
    let y = u64::from_be_bytes(buf[8..].try_into().unwrap());
    (x, y)
}

/// Fills `buf` completely, or reports a clean EOF if the stream is already
/// exhausted. Running dry after the first byte is corruption: a record
/// boundary is the only place a stream may legally end.
fn fill_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<bool, Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(Error::Corrupt),
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(true)
}
