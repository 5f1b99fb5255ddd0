//! Approval Gate: the two external actions on a job parked
//! in `awaiting_approval`. Both are idempotent when applied against a job
//! that isn't actually waiting on approval.

use crate::domain::JobStatus;

use super::stages::encode_scratch_path;
use super::state::Inner;

/// `approve` → `ready_upload`. A no-op if `job_id` isn't currently
/// `awaiting_approval`.
pub fn approve(inner: &Inner, job_id: u64) -> anyhow::Result<()> {
    let Some(mut job) = inner.store.get_job(job_id)? else {
        anyhow::bail!("job {job_id} not found");
    };
    if job.status != JobStatus::AwaitingApproval {
        return Ok(());
    }
    job.status = JobStatus::ReadyUpload;
    inner.store.update_job(&job)?;
    inner.cv.notify_all();
    Ok(())
}

/// `reject` → deletes the encoded artifact and resets the job to
/// `ready_encode` so the encode stage can retry it. A no-op if `job_id`
/// isn't currently `awaiting_approval`.
pub fn reject(inner: &Inner, job_id: u64) -> anyhow::Result<()> {
    let Some(mut job) = inner.store.get_job(job_id)? else {
        anyhow::bail!("job {job_id} not found");
    };
    if job.status != JobStatus::AwaitingApproval {
        return Ok(());
    }
    let encoded_path = encode_scratch_path(&inner.config.encode_scratch_dir(), &job);
    let _ = std::fs::remove_file(&encoded_path);

    job.status = JobStatus::ReadyEncode;
    job.codec_after = None;
    job.progress = 0.0;
    inner.store.update_job(&job)?;
    inner.cv.notify_all();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::Job;
    use crate::remote_fs::TransportRouter;
    use crate::store::DurableStore;
    use crate::video::{VideoAdapter, VideoAdapterConfig};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_inner(dir: &std::path::Path) -> Arc<Inner> {
        let store = Arc::new(DurableStore::open(&dir.join("jobs.db"), &dir.join("jobs.db")).unwrap());
        let router = Arc::new(TransportRouter::new(None, None));
        let video = Arc::new(VideoAdapter::new(VideoAdapterConfig {
            ffmpeg_path: "ffmpeg".into(),
            ffprobe_path: "ffprobe".into(),
            local_probe_timeout: Duration::from_secs(1),
            remote_probe_timeout: Duration::from_secs(1),
        }));
        let config = Config { data_root: dir.to_path_buf(), ..Config::default() };
        Inner::new(store, router, video, config)
    }

    #[test]
    fn approve_moves_awaiting_approval_job_to_ready_upload() {
        let dir = tempdir().unwrap();
        let inner = test_inner(dir.path());
        let mut job = Job::new(1, "/m/a.mkv".into(), 10, 0);
        job.status = JobStatus::AwaitingApproval;
        inner.store.insert_job(&job).unwrap();

        approve(&inner, 1).unwrap();
        assert_eq!(inner.store.get_job(1).unwrap().unwrap().status, JobStatus::ReadyUpload);
    }

    #[test]
    fn approve_on_job_not_awaiting_approval_is_a_no_op() {
        let dir = tempdir().unwrap();
        let inner = test_inner(dir.path());
        let job = Job::new(1, "/m/a.mkv".into(), 10, 0);
        inner.store.insert_job(&job).unwrap();

        approve(&inner, 1).unwrap();
        assert_eq!(inner.store.get_job(1).unwrap().unwrap().status, JobStatus::Waiting);
    }

    #[test]
    fn reject_resets_to_ready_encode_and_clears_codec_after() {
        let dir = tempdir().unwrap();
        let inner = test_inner(dir.path());
        let mut job = Job::new(1, "/m/a.mkv".into(), 10, 0);
        job.status = JobStatus::AwaitingApproval;
        job.codec_after = Some("hevc".into());
        inner.store.insert_job(&job).unwrap();

        reject(&inner, 1).unwrap();
        let reloaded = inner.store.get_job(1).unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::ReadyEncode);
        assert!(reloaded.codec_after.is_none());
    }
}
