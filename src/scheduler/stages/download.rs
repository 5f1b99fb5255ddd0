//! Download stage runner: claims the oldest `waiting`
//! job, preflights disk space, and streams the remote source into local
//! scratch via the [`TransportRouter`].

use std::io::Seek;

use crate::domain::{Job, JobStatus};
use crate::sync_ext::MutexExt;

use super::super::state::Inner;
use super::{download_scratch_path, now_ms};

/// Claims and fully processes at most one `waiting` job. Returns whether a
/// job was claimed, so the caller's poll loop can skip its inter-round sleep
/// when there's more work queued up.
pub fn try_claim_and_download(inner: &Inner) -> anyhow::Result<bool> {
    let Some(job) = claim_next(inner)? else {
        return Ok(false);
    };

    let result = run(inner, &job);
    finish(inner, job, result)?;
    Ok(true)
}

fn claim_next(inner: &Inner) -> anyhow::Result<Option<Job>> {
    let mut state = inner.state.lock_unpoisoned();
    if !state.running || state.paused || state.shutting_down {
        return Ok(None);
    }
    if state.active_downloads.len() >= inner.config.max_downloads {
        return Ok(None);
    }
    let Some(mut job) = inner.store.list_jobs_by_status(JobStatus::Waiting)?.into_iter().next() else {
        return Ok(None);
    };

    job.status = JobStatus::Downloading;
    job.started_at_ms = Some(now_ms());
    inner.store.update_job(&job)?;
    state.active_downloads.insert(job.id);
    Ok(Some(job))
}

fn run(inner: &Inner, job: &Job) -> anyhow::Result<()> {
    let scratch_path = download_scratch_path(&inner.config.download_scratch_dir(), job);
    if let Some(parent) = scratch_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let required = job.source_size.saturating_mul(3);
    let available = fs2::available_space(&inner.config.data_root)?;
    if available < required {
        anyhow::bail!(
            "insufficient disk space for {}: need {} bytes, have {} available",
            job.remote_path,
            required,
            available
        );
    }

    let remote_size = inner.router.stat(&job.remote_path)?.size;
    let existing_len = std::fs::metadata(&scratch_path).map(|m| m.len()).unwrap_or(0);

    if existing_len > 0 && existing_len == remote_size {
        // Local partial already matches the remote byte count; nothing to transfer.
        return Ok(());
    }
    let offset = if existing_len > 0 && existing_len < remote_size { existing_len } else { 0 };

    let mut reader = inner.router.open_read(&job.remote_path, offset)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(offset == 0)
        .open(&scratch_path)?;
    if offset > 0 {
        file.seek(std::io::SeekFrom::End(0))?;
    }

    let store = &inner.store;
    let mut progress_job = job.clone();
    let mut sink = crate::remote_fs::TransferProgressSink::new(Some(job.source_size), move |p| {
        progress_job.progress = p.total.map(|t| (p.transferred as f64 / t as f64) * 100.0).unwrap_or(0.0);
        progress_job.eta_seconds = p.eta_seconds;
        let _ = store.update_job_progress_throttled(&progress_job);
    });

    let mut buf = [0u8; 64 * 1024];
    let mut transferred: u64 = offset;
    loop {
        let n = std::io::Read::read(&mut reader, &mut buf)?;
        if n == 0 {
            break;
        }
        std::io::Write::write_all(&mut file, &buf[..n])?;
        transferred += n as u64;
        sink.report(transferred);
    }
    Ok(())
}

fn finish(inner: &Inner, mut job: Job, result: anyhow::Result<()>) -> anyhow::Result<()> {
    {
        let mut state = inner.state.lock_unpoisoned();
        state.active_downloads.remove(&job.id);
    }

    match result {
        Ok(()) => {
            job.status = JobStatus::ReadyEncode;
            job.progress = 100.0;
        }
        Err(err) => {
            let scratch_path = download_scratch_path(&inner.config.download_scratch_dir(), &job);
            let _ = std::fs::remove_file(&scratch_path);
            job.status = JobStatus::Failed;
            job.failure_message = Some(err.to_string());
            job.finished_at_ms = Some(now_ms());
        }
    }
    inner.store.update_job(&job)?;
    inner.cv.notify_all();
    Ok(())
}
