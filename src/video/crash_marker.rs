//! Encoder crash marker: a single on-disk record
//! written before invoking the encoder, removed on clean end or failure. Its
//! presence on startup means the last encode was interrupted.
//!
//! Writes atomically via a temp file + rename, so a crash mid-write never
//! leaves a half-written marker that recovery would misread.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashMarker {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub started_at_ms: u64,
}

pub fn read(marker_path: &Path) -> Option<CrashMarker> {
    let data = fs::read(marker_path).ok()?;
    serde_json::from_slice(&data).ok()
}

pub fn write(marker_path: &Path, marker: &CrashMarker) -> anyhow::Result<()> {
    if let Some(parent) = marker_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = marker_path.with_extension("tmp");
    let file = fs::File::create(&tmp_path)?;
    if let Err(err) = serde_json::to_writer_pretty(&file, marker) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    drop(file);
    fs::rename(&tmp_path, marker_path)?;
    Ok(())
}

pub fn clear(marker_path: &Path) -> anyhow::Result<()> {
    match fs::remove_file(marker_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".encoding_state.json");
        let marker = CrashMarker {
            input_path: "/tmp/downloaded/1_a.mkv".into(),
            output_path: "/tmp/encoded/1_a.mkv".into(),
            started_at_ms: 1000,
        };
        write(&path, &marker).unwrap();
        assert_eq!(read(&path), Some(marker));
    }

    #[test]
    fn clear_on_missing_marker_is_not_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(clear(&path).is_ok());
    }

    #[test]
    fn read_on_absent_marker_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert_eq!(read(&path), None);
    }
}
