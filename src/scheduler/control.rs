//! Job control surface: the operations addressed externally
//! through the CLI — add/remove/pause/resume/retry/clear_all/stats — kept
//! distinct from the approval gate (`approval.rs`) and the stage runners
//! themselves.

use crate::domain::{Job, JobStatus};
use crate::sync_ext::MutexExt;

use super::cleanup::dispose_scratch_file;
use super::stages::{download_scratch_path, encode_scratch_path};
use super::state::Inner;

/// Inserts a new `waiting` job for `remote_path`. A no-op (returns the
/// existing id) if a non-terminal job for the same path already exists,
/// honoring the "`path` unique among non-terminal jobs" precondition.
pub fn add_job(inner: &Inner, remote_path: String, source_size: u64, now_ms: u64) -> anyhow::Result<u64> {
    if let Some(existing) = inner.store.get_job_by_remote_path(&remote_path)? {
        if !existing.status.is_terminal() {
            return Ok(existing.id);
        }
    }
    let id = inner.store.next_job_id()?;
    let job = Job::new(id, remote_path, source_size, now_ms);
    inner.store.insert_job(&job)?;
    inner.cv.notify_all();
    Ok(id)
}

/// Cancels an active job if necessary, cleans its scratch files, and
/// deletes its row.
pub fn remove_job(inner: &Inner, job_id: u64) -> anyhow::Result<()> {
    let Some(job) = inner.store.get_job(job_id)? else {
        return Ok(());
    };

    if job.status == JobStatus::Encoding {
        let state = inner.state.lock_unpoisoned();
        if let Some(stop) = state.encode_stop_handles.get(&job_id) {
            stop.request_stop();
        }
    }

    let _ = std::fs::remove_file(download_scratch_path(&inner.config.download_scratch_dir(), &job));
    let _ = std::fs::remove_file(encode_scratch_path(&inner.config.encode_scratch_dir(), &job));
    inner.store.delete_job(job_id)?;
    inner.cv.notify_all();
    Ok(())
}

/// Moves a non-terminal job to `paused`, taking it out of every stage's
/// claim pool without discarding it.
pub fn pause_job(inner: &Inner, job_id: u64) -> anyhow::Result<()> {
    let Some(mut job) = inner.store.get_job(job_id)? else {
        anyhow::bail!("job {job_id} not found");
    };
    if job.status.is_terminal() {
        return Ok(());
    }
    job.status = JobStatus::Paused;
    inner.store.update_job(&job)?;
    Ok(())
}

/// Returns a `paused` job to `waiting` so it re-enters the claim pool.
pub fn resume_job(inner: &Inner, job_id: u64) -> anyhow::Result<()> {
    let Some(mut job) = inner.store.get_job(job_id)? else {
        anyhow::bail!("job {job_id} not found");
    };
    if job.status != JobStatus::Paused {
        return Ok(());
    }
    job.status = JobStatus::Waiting;
    inner.store.update_job(&job)?;
    inner.cv.notify_all();
    Ok(())
}

/// Resets a terminal job back to `waiting`, cleaning any scratch left
/// behind by the run that failed.
pub fn retry_job(inner: &Inner, job_id: u64) -> anyhow::Result<()> {
    let Some(mut job) = inner.store.get_job(job_id)? else {
        anyhow::bail!("job {job_id} not found");
    };
    if !job.status.is_terminal() {
        return Ok(());
    }

    let download_path = download_scratch_path(&inner.config.download_scratch_dir(), &job);
    let _ = dispose_scratch_file(&download_path, &inner.config.backup_originals_dir(), &job.remote_path, false);
    let encode_path = encode_scratch_path(&inner.config.encode_scratch_dir(), &job);
    let _ = dispose_scratch_file(&encode_path, &inner.config.backup_encoded_dir(), &job.remote_path, false);

    job.status = JobStatus::Waiting;
    job.progress = 0.0;
    job.started_at_ms = None;
    job.finished_at_ms = None;
    job.failure_message = None;
    job.codec_after = None;
    job.retry_count += 1;
    inner.store.update_job(&job)?;
    inner.cv.notify_all();
    Ok(())
}

/// Removes every job not currently `completed`.
pub fn clear_all(inner: &Inner) -> anyhow::Result<()> {
    for job in inner.store.list_jobs()? {
        if job.status != JobStatus::Completed {
            remove_job(inner, job.id)?;
        }
    }
    Ok(())
}

/// Job counts by status.
pub fn stats(inner: &Inner) -> anyhow::Result<Vec<(JobStatus, u64)>> {
    inner.store.job_stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::remote_fs::TransportRouter;
    use crate::store::DurableStore;
    use crate::video::VideoAdapterConfig;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_inner(dir: &std::path::Path) -> Arc<Inner> {
        let store = Arc::new(DurableStore::open(&dir.join("jobs.db"), &dir.join("jobs.db")).unwrap());
        let router = Arc::new(TransportRouter::new(None, None));
        let video = Arc::new(crate::video::VideoAdapter::new(VideoAdapterConfig {
            ffmpeg_path: "ffmpeg".into(),
            ffprobe_path: "ffprobe".into(),
            local_probe_timeout: Duration::from_secs(1),
            remote_probe_timeout: Duration::from_secs(1),
        }));
        let config = Config { data_root: dir.to_path_buf(), ..Config::default() };
        Inner::new(store, router, video, config)
    }

    #[test]
    fn add_job_is_idempotent_for_a_non_terminal_path() {
        let dir = tempdir().unwrap();
        let inner = test_inner(dir.path());
        let first = add_job(&inner, "/m/a.mkv".into(), 10, 0).unwrap();
        let second = add_job(&inner, "/m/a.mkv".into(), 10, 0).unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.store.list_jobs().unwrap().len(), 1);
    }

    #[test]
    fn add_job_after_completion_inserts_a_new_row() {
        let dir = tempdir().unwrap();
        let inner = test_inner(dir.path());
        let first = add_job(&inner, "/m/a.mkv".into(), 10, 0).unwrap();
        let mut job = inner.store.get_job(first).unwrap().unwrap();
        job.status = JobStatus::Completed;
        inner.store.update_job(&job).unwrap();

        let second = add_job(&inner, "/m/a.mkv".into(), 10, 0).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn retry_requires_terminal_state() {
        let dir = tempdir().unwrap();
        let inner = test_inner(dir.path());
        let id = add_job(&inner, "/m/a.mkv".into(), 10, 0).unwrap();
        retry_job(&inner, id).unwrap();
        assert_eq!(inner.store.get_job(id).unwrap().unwrap().status, JobStatus::Waiting);
    }

    #[test]
    fn clear_all_keeps_only_completed_jobs() {
        let dir = tempdir().unwrap();
        let inner = test_inner(dir.path());
        let keep = add_job(&inner, "/m/a.mkv".into(), 10, 0).unwrap();
        let mut job = inner.store.get_job(keep).unwrap().unwrap();
        job.status = JobStatus::Completed;
        inner.store.update_job(&job).unwrap();
        add_job(&inner, "/m/b.mkv".into(), 10, 0).unwrap();

        clear_all(&inner).unwrap();
        let remaining = inner.store.list_jobs().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep);
    }
}
