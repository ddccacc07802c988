//! `id_index.bin`: little-endian packed binary id<->path index (spec.md §6).
//!
//! Format: `[u32 count][record*]`, each record
//! `[u16 id_len][id bytes][u16 path_len][path bytes]`, both strings UTF-8.
//! Memory-mapped for reads so a cold load stays well under 20ms even for
//! large collections.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdIndexError {
    #[error("failed to read id index `{path}`: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("id index `{path}` is truncated or corrupt")]
    Corrupt { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdIndexEntry {
    pub id: String,
    pub path: String,
}

/// Serialise `entries` to the on-disk format and atomically replace
/// `path` (write-to-temp + rename, so readers never observe a partial
/// file).
pub fn write(path: &Path, entries: &[IdIndexEntry]) -> Result<(), IdIndexError> {
    let mut buf = Vec::with_capacity(4 + entries.len() * 32);
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for entry in entries {
        write_lp_string(&mut buf, &entry.id);
        write_lp_string(&mut buf, &entry.path);
    }

    let tmp_path = path.with_extension("bin.tmp");
    let mut file = File::create(&tmp_path).map_err(|source| IdIndexError::Io {
        path: tmp_path.display().to_string(),
        source,
    })?;
    file.write_all(&buf).map_err(|source| IdIndexError::Io {
        path: tmp_path.display().to_string(),
        source,
    })?;
    file.sync_all().map_err(|source| IdIndexError::Io {
        path: tmp_path.display().to_string(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| IdIndexError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(())
}

fn write_lp_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// Reads the whole index eagerly, for callers that don't need mmap (e.g.
/// tests, or rebuilding from the on-disk vector set).
pub fn read(path: &Path) -> Result<Vec<IdIndexEntry>, IdIndexError> {
    let bytes = fs::read(path).map_err(|source| IdIndexError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse(&bytes, path)
}

/// Memory-maps `path` and parses it into entries. The mmap is dropped
/// once parsing completes; callers needing a persistently mapped view
/// should keep the file open themselves and use [`parse`] directly.
pub fn read_mmap(path: &Path) -> Result<Vec<IdIndexEntry>, IdIndexError> {
    let file = File::open(path).map_err(|source| IdIndexError::Io {
        path: path.display().to_string(),
        source,
    })?;
    // SAFETY: the file is opened read-only for the duration of this call
    // and not concurrently truncated by anything in this process; writers
    // elsewhere replace the file via rename, which never mutates bytes
    // already mapped here.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|source| IdIndexError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse(&mmap, path)
}

fn parse(bytes: &[u8], path: &Path) -> Result<Vec<IdIndexEntry>, IdIndexError> {
    let corrupt = || IdIndexError::Corrupt { path: path.display().to_string() };

    if bytes.len() < 4 {
        return Err(corrupt());
    }
    let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let mut offset = 4;
    let mut entries = Vec::with_capacity(count);

    for _ in 0..count {
        let id = read_lp_string(bytes, &mut offset).ok_or_else(corrupt)?;
        let path_str = read_lp_string(bytes, &mut offset).ok_or_else(corrupt)?;
        entries.push(IdIndexEntry { id, path: path_str });
    }

    Ok(entries)
}

fn read_lp_string(bytes: &[u8], offset: &mut usize) -> Option<String> {
    if bytes.len() < *offset + 2 {
        return None;
    }
    let len = u16::from_le_bytes(bytes[*offset..*offset + 2].try_into().ok()?) as usize;
    *offset += 2;
    if bytes.len() < *offset + len {
        return None;
    }
    let s = std::str::from_utf8(&bytes[*offset..*offset + len]).ok()?.to_string();
    *offset += len;
    Some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_index.bin");
        let entries = vec![
            IdIndexEntry { id: "11111111-1111-1111-1111-111111111111".into(), path: "src/a.rs".into() },
            IdIndexEntry { id: "22222222-2222-2222-2222-222222222222".into(), path: "src/b.rs".into() },
        ];
        write(&path, &entries).unwrap();
        let read_back = read(&path).unwrap();
        assert_eq!(read_back, entries);
        let via_mmap = read_mmap(&path).unwrap();
        assert_eq!(via_mmap, entries);
    }

    #[test]
    fn empty_index_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_index.bin");
        write(&path, &[]).unwrap();
        assert!(read(&path).unwrap().is_empty());
    }

    #[test]
    fn rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_index.bin");
        fs::write(&path, [1, 2, 3]).unwrap();
        assert!(matches!(read(&path), Err(IdIndexError::Corrupt { .. })));
    }
}
