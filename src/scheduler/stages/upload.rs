//! Upload stage runner: backs up the remote original,
//! streams the encoded scratch file to the (possibly renamed) upload
//! target, and rolls back on failure.

use crate::domain::{Job, JobStatus};
use crate::error::ErrorKind;
use crate::sync_ext::MutexExt;

use super::super::cleanup::dispose_scratch_file;
use super::super::naming::apply_output_naming;
use super::super::state::Inner;
use super::{download_scratch_path, encode_scratch_path, now_ms};

pub fn try_claim_and_upload(inner: &Inner) -> anyhow::Result<bool> {
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
    if state.active_uploads.len() >= inner.config.max_uploads {
        return Ok(None);
    }
    let Some(mut job) = inner.store.list_jobs_by_status(JobStatus::ReadyUpload)?.into_iter().next() else {
        return Ok(None);
    };

    job.status = JobStatus::Uploading;
    job.started_at_ms = Some(now_ms());
    inner.store.update_job(&job)?;
    state.active_uploads.insert(job.id);
    Ok(Some(job))
}

struct UploadOutcome {
    target_path: String,
    backup_path: Option<String>,
}

fn run(inner: &Inner, job: &Job) -> anyhow::Result<UploadOutcome> {
    let scratch_path = encode_scratch_path(&inner.config.encode_scratch_dir(), job);
    let release_tag = inner.config.encode.release_tag.as_deref();
    let target_codec = job.codec_after.as_deref().unwrap_or("");
    let target_path = apply_output_naming(&job.remote_path, release_tag, target_codec);
    let backup_path_candidate = backup_path_for(&job.remote_path);

    let backup_path = if inner.config.backups_enabled {
        match inner.router.rename(&job.remote_path, &backup_path_candidate) {
            Ok(()) => Some(backup_path_candidate.clone()),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        }
    } else {
        None
    };

    let stat = inner.router.stat(&target_path)?;
    let source_size = std::fs::metadata(&scratch_path)?.len();
    if stat.exists && stat.size == source_size {
        // Already fully uploaded (resumed after a crash between upload and
        // the status transition persisting).
    } else if stat.exists && inner.router.delete(&target_path).is_ok() {
        upload_stream(inner, &scratch_path, &target_path)?;
    } else if stat.exists {
        // Target present and undeletable: stage to a tmp path and rename
        // into place.
        let tmp_path = format!("{target_path}.tmp.{}", now_ms());
        upload_stream(inner, &scratch_path, &tmp_path)?;
        inner.router.rename(&tmp_path, &target_path)?;
    } else {
        upload_stream(inner, &scratch_path, &target_path)?;
    }

    Ok(UploadOutcome { target_path, backup_path })
}

fn upload_stream(inner: &Inner, scratch_path: &std::path::Path, target_path: &str) -> anyhow::Result<()> {
    let mut file = std::fs::File::open(scratch_path)?;
    let mut writer = inner.router.open_write(target_path, 0, true)?;
    std::io::copy(&mut file, &mut writer)?;
    Ok(())
}

fn backup_path_for(remote_path: &str) -> String {
    let (stem, ext) = strip_ext(remote_path);
    format!("{stem}.bak{ext}")
}

fn strip_ext(path: &str) -> (String, String) {
    match path.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => (stem.to_string(), format!(".{ext}")),
        _ => (path.to_string(), String::new()),
    }
}

fn finish(inner: &Inner, mut job: Job, result: anyhow::Result<UploadOutcome>) -> anyhow::Result<()> {
    {
        let mut state = inner.state.lock_unpoisoned();
        state.active_uploads.remove(&job.id);
    }

    match result {
        Ok(outcome) => {
            job.status = JobStatus::Completed;
            job.finished_at_ms = Some(now_ms());
            job.backup_remote_path = outcome.backup_path;

            let download_path = download_scratch_path(&inner.config.download_scratch_dir(), &job);
            let _ = dispose_scratch_file(&download_path, &inner.config.backup_originals_dir(), &job.remote_path, inner.config.keep_original);
            let encode_path = encode_scratch_path(&inner.config.encode_scratch_dir(), &job);
            let _ = dispose_scratch_file(&encode_path, &inner.config.backup_encoded_dir(), &job.remote_path, inner.config.keep_encoded);
        }
        Err(err) => {
            let release_tag = inner.config.encode.release_tag.as_deref();
            let target_codec = job.codec_after.as_deref().unwrap_or("");
            let target_path = apply_output_naming(&job.remote_path, release_tag, target_codec);
            let _ = inner.router.delete(&target_path);

            if inner.config.backups_enabled {
                let backup = backup_path_for(&job.remote_path);
                let _ = inner.router.rename(&backup, &job.remote_path);
            }
            job.status = JobStatus::Failed;
            job.failure_message = Some(err.to_string());
            job.finished_at_ms = Some(now_ms());
        }
    }

    inner.store.update_job(&job)?;
    inner.cv.notify_all();
    Ok(())
}
