//! On-disk cache format.
//!
//! Every cache artifact carries a small fixed header — magic bytes, a format
//! version, and a CRC32 checksum of the body — ahead of its payload. A
//! version bump or a checksum mismatch forces a rebuild (`CacheStale`)
//! instead of silently misreading bytes from a previous format, the same
//! reasoning behind the teacher's `persistence::format` segment footers.
//!
//! The four inverted-index artifacts (`postings`, `doc_map`,
//! `term_frequencies`, `doc_lengths`) are `postcard`-encoded structured data.
//! The chunk-embedding matrix is a raw little-endian `f32` array with its own
//! header carrying row count and dimension, deliberately not a
//! language-native pickle.

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};

/// Magic bytes identifying a reelrank cache artifact.
pub const MAGIC_BYTES: [u8; 4] = *b"RLRK";

/// Current on-disk format version. Bump on any incompatible layout change.
pub const FORMAT_VERSION: u32 = 1;

const STRUCT_HEADER_LEN: usize = 4 + 4 + 4; // magic + version + crc32

/// Write a serde-serializable value as a versioned, checksummed artifact.
pub fn write_struct<T: Serialize>(path: impl AsRef<Path>, value: &T) -> EngineResult<()> {
    let body = postcard::to_allocvec(value)?;
    let checksum = crc32fast::hash(&body);

    let mut buf = Vec::with_capacity(STRUCT_HEADER_LEN + body.len());
    buf.extend_from_slice(&MAGIC_BYTES);
    buf.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    buf.write_u32::<LittleEndian>(checksum)?;
    buf.extend_from_slice(&body);

    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, buf)?;
    Ok(())
}

/// Read and validate a versioned, checksummed artifact written by [`write_struct`].
pub fn read_struct<T: DeserializeOwned>(path: impl AsRef<Path>) -> EngineResult<T> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(EngineError::CacheMissing(path.to_path_buf()));
    }
    let buf = fs::read(path)?;
    if buf.len() < STRUCT_HEADER_LEN {
        return Err(EngineError::CacheStale(format!(
            "{}: truncated header",
            path.display()
        )));
    }

    let mut cursor = Cursor::new(&buf[..STRUCT_HEADER_LEN]);
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    if magic != MAGIC_BYTES {
        return Err(EngineError::CacheStale(format!(
            "{}: bad magic bytes",
            path.display()
        )));
    }
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(EngineError::CacheStale(format!(
            "{}: format version {} != {}",
            path.display(),
            version,
            FORMAT_VERSION
        )));
    }
    let checksum = cursor.read_u32::<LittleEndian>()?;

    let body = &buf[STRUCT_HEADER_LEN..];
    if crc32fast::hash(body) != checksum {
        return Err(EngineError::CacheStale(format!(
            "{}: checksum mismatch",
            path.display()
        )));
    }

    Ok(postcard::from_bytes(body)?)
}

const MATRIX_HEADER_LEN: usize = 4 + 4 + 4 + 4; // magic + version + rows + dim

/// Write a row-major `f32` matrix (e.g. the chunk embedding matrix).
pub fn write_matrix(path: impl AsRef<Path>, rows: usize, dim: usize, data: &[f32]) -> EngineResult<()> {
    debug_assert_eq!(rows * dim, data.len());

    let mut buf = Vec::with_capacity(MATRIX_HEADER_LEN + data.len() * 4);
    buf.extend_from_slice(&MAGIC_BYTES);
    buf.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    buf.write_u32::<LittleEndian>(rows as u32)?;
    buf.write_u32::<LittleEndian>(dim as u32)?;
    for &value in data {
        buf.write_f32::<LittleEndian>(value)?;
    }

    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, buf)?;
    Ok(())
}

/// Read a row-major `f32` matrix written by [`write_matrix`].
///
/// Returns `(rows, dim, data)`.
pub fn read_matrix(path: impl AsRef<Path>) -> EngineResult<(usize, usize, Vec<f32>)> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(EngineError::CacheMissing(path.to_path_buf()));
    }
    let buf = fs::read(path)?;
    if buf.len() < MATRIX_HEADER_LEN {
        return Err(EngineError::CacheStale(format!(
            "{}: truncated header",
            path.display()
        )));
    }

    let mut cursor = Cursor::new(&buf[..]);
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    if magic != MAGIC_BYTES {
        return Err(EngineError::CacheStale(format!(
            "{}: bad magic bytes",
            path.display()
        )));
    }
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(EngineError::CacheStale(format!(
            "{}: format version {} != {}",
            path.display(),
            version,
            FORMAT_VERSION
        )));
    }
    let rows = cursor.read_u32::<LittleEndian>()? as usize;
    let dim = cursor.read_u32::<LittleEndian>()? as usize;

    let expected_len = MATRIX_HEADER_LEN + rows * dim * 4;
    if buf.len() != expected_len {
        return Err(EngineError::CacheStale(format!(
            "{}: expected {} bytes, found {}",
            path.display(),
            expected_len,
            buf.len()
        )));
    }

    let mut data = Vec::with_capacity(rows * dim);
    for _ in 0..(rows * dim) {
        data.push(cursor.read_f32::<LittleEndian>()?);
    }
    Ok((rows, dim, data))
}

/// Write an arbitrary JSON-serializable value (used for chunk metadata,
/// which downstream tooling may want to inspect by hand).
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> EngineResult<()> {
    let body = serde_json::to_vec_pretty(value)?;
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    file.write_all(&body)?;
    Ok(())
}

/// Read a JSON artifact written by [`write_json`].
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> EngineResult<T> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(EngineError::CacheMissing(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Standard artifact filenames within a cache directory.
pub struct ArtifactPaths {
    pub postings: PathBuf,
    pub doc_map: PathBuf,
    pub term_frequencies: PathBuf,
    pub doc_lengths: PathBuf,
    pub chunk_embeddings: PathBuf,
    pub chunk_metadata: PathBuf,
}

impl ArtifactPaths {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        let dir = cache_dir.as_ref();
        Self {
            postings: dir.join("postings.bin"),
            doc_map: dir.join("doc_map.bin"),
            term_frequencies: dir.join("term_frequencies.bin"),
            doc_lengths: dir.join("doc_lengths.bin"),
            chunk_embeddings: dir.join("chunk_embeddings.bin"),
            chunk_metadata: dir.join("chunk_metadata.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn struct_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc_lengths.bin");

        let mut value: HashMap<u32, u32> = HashMap::new();
        value.insert(1, 42);
        value.insert(2, 7);

        write_struct(&path, &value).unwrap();
        let loaded: HashMap<u32, u32> = read_struct(&path).unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn struct_missing_is_cache_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        let err = read_struct::<HashMap<u32, u32>>(&path).unwrap_err();
        assert!(matches!(err, EngineError::CacheMissing(_)));
    }

    #[test]
    fn struct_version_bump_is_cache_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc_lengths.bin");

        let value: HashMap<u32, u32> = HashMap::new();
        write_struct(&path, &value).unwrap();

        // Corrupt the version field in place.
        let mut buf = fs::read(&path).unwrap();
        buf[4] = 0xFF;
        fs::write(&path, buf).unwrap();

        let err = read_struct::<HashMap<u32, u32>>(&path).unwrap_err();
        assert!(matches!(err, EngineError::CacheStale(_)));
    }

    #[test]
    fn matrix_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk_embeddings.bin");

        let data = vec![1.0, 0.0, 0.0, 1.0, 0.5, 0.5];
        write_matrix(&path, 3, 2, &data).unwrap();

        let (rows, dim, loaded) = read_matrix(&path).unwrap();
        assert_eq!(rows, 3);
        assert_eq!(dim, 2);
        assert_eq!(loaded, data);
    }

    #[test]
    fn matrix_row_count_mismatch_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk_embeddings.bin");
        write_matrix(&path, 2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();

        // Truncate a byte off the body to simulate a shape mismatch.
        let mut buf = fs::read(&path).unwrap();
        buf.pop();
        fs::write(&path, buf).unwrap();

        let err = read_matrix(&path).unwrap_err();
        assert!(matches!(err, EngineError::CacheStale(_)));
    }
}
