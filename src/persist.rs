//! Atomic JSON persistence for the on-disk data files.
//!
//! Every document (users, sessions, dashboard config) is written through
//! [`write_json_atomic`]: serialize, write to a temp file in the target's
//! directory, fsync, then rename over the target. A crash mid-write leaves
//! either the old file or the new one, never a torn file.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors that can occur while reading or writing a data file
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cannot write {0}: path has no parent directory")]
    NoParent(String),
}

/// Atomically replace `path` with the pretty-printed JSON form of `payload`.
pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    payload: &T,
) -> Result<(), PersistError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !parent.exists() {
        return Err(PersistError::NoParent(path.display().to_string()));
    }

    let mut raw = serde_json::to_vec_pretty(payload)?;
    raw.push(b'\n');

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(&raw)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PersistError::Io(e.error))?;
    Ok(())
}

/// Read and parse a JSON document. Returns `Ok(None)` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&raw)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        write_json_atomic(&path, &json!({"a": 1})).unwrap();
        let back: serde_json::Value = read_json(&path).unwrap().unwrap();
        assert_eq!(back, json!({"a": 1}));
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        write_json_atomic(&path, &json!({"v": 1})).unwrap();
        write_json_atomic(&path, &json!({"v": 2})).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let back: serde_json::Value = read_json(&path).unwrap().unwrap();
        assert_eq!(back["v"], 2);
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing: Option<serde_json::Value> = read_json(&dir.path().join("nope.json")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_read_garbage_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{not json").unwrap();
        let res: Result<Option<serde_json::Value>, _> = read_json(&path);
        assert!(matches!(res, Err(PersistError::Serialization(_))));
    }

    #[test]
    fn test_missing_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let err = write_json_atomic(&path, &json!({})).unwrap_err();
        assert!(matches!(err, PersistError::NoParent(_)));
    }
}
