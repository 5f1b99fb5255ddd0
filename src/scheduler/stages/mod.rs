//! Stage runners: one module per pipeline stage of the job state machine.
//! Each exposes a `try_claim_and_*` function that claims at most one
//! eligible job, does its I/O, and persists the resulting transition; the
//! scheduler facade wraps each in a dedicated thread that loops while
//! holding the `Inner` condvar between rounds.

pub mod download;
pub mod encode;
pub mod upload;

use std::path::PathBuf;

use crate::domain::Job;

pub(super) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Final path segment of a job's remote path, so scratch filenames stay
/// inspectable during manual debugging.
fn remote_basename(remote_path: &str) -> &str {
    match remote_path.rsplit_once('/') {
        Some((_, name)) if !name.is_empty() => name,
        _ => remote_path,
    }
}

/// Path to a job's downloaded-but-not-yet-encoded scratch file.
pub(super) fn download_scratch_path(scratch_dir: &std::path::Path, job: &Job) -> PathBuf {
    scratch_dir.join(format!("{}_{}", job.id, remote_basename(&job.remote_path)))
}

/// Path to a job's encoded scratch file, distinct from the download scratch
/// path because the two live under separate `scratch_dir` roots
/// (`download_scratch_dir()` vs. `encode_scratch_dir()`), so a crash between
/// encode and upload can't confuse the two.
pub(super) fn encode_scratch_path(scratch_dir: &std::path::Path, job: &Job) -> PathBuf {
    scratch_dir.join(format!("{}_{}", job.id, remote_basename(&job.remote_path)))
}
