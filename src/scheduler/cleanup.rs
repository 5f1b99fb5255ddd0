//! Scratch cleanup policy: once a job finishes, its
//! downloaded/encoded scratch files are either moved into a mirrored backup
//! tree or deleted, governed by the `keep_original`/`keep_encoded` config
//! flags. Locked-file deletions retry with backoff (50ms-scale polling
//! rather than unbounded spinning), since a just-uploaded file can stay
//! briefly locked by an antivirus scanner or a lingering file handle.

use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_RETRIES: u32 = 5;

/// Disposes of one scratch file: if `keep` is set, moves it under
/// `backup_root` preserving `remote_path`'s directory structure; otherwise
/// deletes it. Retries a locked file up to 5 times with linear backoff
/// before giving up.
pub fn dispose_scratch_file(scratch_path: &Path, backup_root: &Path, remote_path: &str, keep: bool) -> anyhow::Result<()> {
    if !scratch_path.exists() {
        return Ok(());
    }

    if keep {
        let dest = mirrored_backup_path(backup_root, remote_path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        retry_with_backoff(|| std::fs::rename(scratch_path, &dest).map_err(anyhow::Error::from))
    } else {
        retry_with_backoff(|| std::fs::remove_file(scratch_path).map_err(anyhow::Error::from))
    }
}

/// Mirrors `remote_path` under `backup_root`, stripping any leading `/` so
/// it composes into a relative subtree.
pub fn mirrored_backup_path(backup_root: &Path, remote_path: &str) -> PathBuf {
    backup_root.join(remote_path.trim_start_matches('/'))
}

fn retry_with_backoff(mut attempt: impl FnMut() -> anyhow::Result<()>) -> anyhow::Result<()> {
    let mut last_err = None;
    for try_index in 0..MAX_RETRIES {
        match attempt() {
            Ok(()) => return Ok(()),
            Err(err) => {
                last_err = Some(err);
                std::thread::sleep(Duration::from_millis(100 * (try_index as u64 + 1)));
            }
        }
    }
    Err(last_err.expect("loop always sets last_err before exhausting retries"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mirrored_backup_path_strips_leading_slash() {
        let root = Path::new("/srv/backup");
        assert_eq!(
            mirrored_backup_path(root, "/media/movies/a.mkv"),
            PathBuf::from("/srv/backup/media/movies/a.mkv")
        );
    }

    #[test]
    fn dispose_with_keep_moves_file_into_mirrored_backup_tree() {
        let dir = tempdir().unwrap();
        let scratch = dir.path().join("scratch.mkv");
        std::fs::write(&scratch, b"data").unwrap();
        let backup_root = dir.path().join("backup");

        dispose_scratch_file(&scratch, &backup_root, "/media/a.mkv", true).unwrap();
        assert!(!scratch.exists());
        assert!(backup_root.join("media/a.mkv").exists());
    }

    #[test]
    fn dispose_without_keep_deletes_file() {
        let dir = tempdir().unwrap();
        let scratch = dir.path().join("scratch.mkv");
        std::fs::write(&scratch, b"data").unwrap();

        dispose_scratch_file(&scratch, &dir.path().join("backup"), "/media/a.mkv", false).unwrap();
        assert!(!scratch.exists());
    }

    #[test]
    fn dispose_on_missing_scratch_file_is_a_no_op() {
        let dir = tempdir().unwrap();
        let scratch = dir.path().join("missing.mkv");
        assert!(dispose_scratch_file(&scratch, &dir.path().join("backup"), "/media/a.mkv", false).is_ok());
    }
}
