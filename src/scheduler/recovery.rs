//! Startup recovery: reconciles jobs caught mid-stage the
//! last time the process stopped, before the stage runners start claiming
//! new work.

use crate::domain::{Job, JobStatus};
use crate::video::crash_marker;

use super::stages::{download_scratch_path, encode_scratch_path};
use super::state::Inner;

/// Walks every non-terminal job and resolves `downloading`/`encoding`/
/// `uploading` states left over from an unclean shutdown:
/// - `uploading` with an encoded artifact still on disk → `ready_upload`
///   (the upload can simply be retried).
/// - `downloading` → returns to `waiting`, but a local partial that still
///   lines up with the remote file's current size is left in place so the
///   download stage's own resume logic can pick up where it left off.
/// - anything else caught mid-stage → scratch cleaned, job returns to
///   `waiting`.
///
/// Also clears a leftover encoder crash marker, deleting the ghost output
/// it names, since that file is necessarily partial.
pub fn reconcile_on_start(inner: &Inner) -> anyhow::Result<()> {
    for mut job in inner.store.list_jobs()? {
        if !job.status.is_active_stage() {
            continue;
        }

        if job.status == JobStatus::Uploading {
            let encoded_path = encode_scratch_path(&inner.config.encode_scratch_dir(), &job);
            if encoded_path.exists() {
                job.status = JobStatus::ReadyUpload;
                inner.store.update_job(&job)?;
                continue;
            }
        }

        if job.status == JobStatus::Downloading {
            reconcile_crashed_download(inner, &mut job)?;
            continue;
        }

        let download_path = download_scratch_path(&inner.config.download_scratch_dir(), &job);
        let encoded_path = encode_scratch_path(&inner.config.encode_scratch_dir(), &job);
        let _ = std::fs::remove_file(&download_path);
        let _ = std::fs::remove_file(&encoded_path);

        job.status = JobStatus::Waiting;
        job.started_at_ms = None;
        job.progress = 0.0;
        inner.store.update_job(&job)?;
    }

    reconcile_crash_marker(inner)?;
    Ok(())
}

fn reconcile_crashed_download(inner: &Inner, job: &mut Job) -> anyhow::Result<()> {
    let download_path = download_scratch_path(&inner.config.download_scratch_dir(), job);
    let keep_partial = match (std::fs::metadata(&download_path), inner.router.stat(&job.remote_path)) {
        (Ok(meta), Ok(stat)) => meta.len() > 0 && meta.len() <= stat.size,
        _ => false,
    };
    if !keep_partial {
        let _ = std::fs::remove_file(&download_path);
    }

    job.status = JobStatus::Waiting;
    job.started_at_ms = None;
    job.progress = 0.0;
    inner.store.update_job(job)?;
    Ok(())
}

fn reconcile_crash_marker(inner: &Inner) -> anyhow::Result<()> {
    let marker_path = inner.config.crash_marker_path();
    if let Some(marker) = crash_marker::read(&marker_path) {
        let _ = std::fs::remove_file(&marker.output_path);
        crash_marker::clear(&marker_path)?;
    }
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
    fn uploading_job_with_encoded_artifact_present_resumes_as_ready_upload() {
        let dir = tempdir().unwrap();
        let inner = test_inner(dir.path());
        let mut job = Job::new(1, "/m/a.mkv".into(), 10, 0);
        job.status = JobStatus::Uploading;
        inner.store.insert_job(&job).unwrap();

        let encoded_path = encode_scratch_path(&inner.config.encode_scratch_dir(), &job);
        std::fs::create_dir_all(encoded_path.parent().unwrap()).unwrap();
        std::fs::write(&encoded_path, b"data").unwrap();

        reconcile_on_start(&inner).unwrap();
        assert_eq!(inner.store.get_job(1).unwrap().unwrap().status, JobStatus::ReadyUpload);
    }

    #[test]
    fn downloading_job_with_no_scratch_returns_to_waiting() {
        let dir = tempdir().unwrap();
        let inner = test_inner(dir.path());
        let mut job = Job::new(1, "/m/a.mkv".into(), 10, 0);
        job.status = JobStatus::Downloading;
        job.started_at_ms = Some(1000);
        inner.store.insert_job(&job).unwrap();

        reconcile_on_start(&inner).unwrap();
        let reloaded = inner.store.get_job(1).unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Waiting);
        assert!(reloaded.started_at_ms.is_none());
    }

    struct FixedSizeFs {
        size: u64,
    }

    impl crate::remote_fs::RemoteFs for FixedSizeFs {
        fn list(&self, _path: &str) -> crate::error::CoreResult<Vec<crate::remote_fs::DirEntry>> {
            Ok(vec![])
        }
        fn stat(&self, _path: &str) -> crate::error::CoreResult<crate::remote_fs::Stat> {
            Ok(crate::remote_fs::Stat { size: self.size, mtime: None, exists: true })
        }
        fn open_read(&self, _path: &str, _offset: u64) -> crate::error::CoreResult<Box<dyn crate::remote_fs::ReadStream>> {
            unimplemented!()
        }
        fn open_write(&self, _path: &str, _offset: u64, _overwrite: bool) -> crate::error::CoreResult<Box<dyn crate::remote_fs::WriteStream>> {
            unimplemented!()
        }
        fn rename(&self, _src: &str, _dst: &str) -> crate::error::CoreResult<()> {
            unimplemented!()
        }
        fn delete(&self, _path: &str) -> crate::error::CoreResult<()> {
            unimplemented!()
        }
        fn exists(&self, _path: &str) -> crate::error::CoreResult<bool> {
            unimplemented!()
        }
        fn supports_write_resume(&self) -> bool {
            true
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn test_inner_with_remote_size(dir: &std::path::Path, size: u64) -> Arc<Inner> {
        let store = Arc::new(DurableStore::open(&dir.join("jobs.db"), &dir.join("jobs.db")).unwrap());
        let router = Arc::new(TransportRouter::new(Some(Box::new(FixedSizeFs { size })), None));
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
    fn downloading_job_with_byte_exact_partial_keeps_scratch_for_resume() {
        let dir = tempdir().unwrap();
        let inner = test_inner_with_remote_size(dir.path(), 4);
        let mut job = Job::new(1, "/m/a.mkv".into(), 4, 0);
        job.status = JobStatus::Downloading;
        job.started_at_ms = Some(1000);
        inner.store.insert_job(&job).unwrap();

        let scratch_path = download_scratch_path(&inner.config.download_scratch_dir(), &job);
        std::fs::create_dir_all(scratch_path.parent().unwrap()).unwrap();
        std::fs::write(&scratch_path, b"data").unwrap();

        reconcile_on_start(&inner).unwrap();
        let reloaded = inner.store.get_job(1).unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Waiting);
        assert!(scratch_path.exists(), "byte-exact partial should be kept for resume");
    }

    #[test]
    fn downloading_job_with_stale_oversized_partial_is_deleted() {
        let dir = tempdir().unwrap();
        let inner = test_inner_with_remote_size(dir.path(), 2);
        let mut job = Job::new(1, "/m/a.mkv".into(), 2, 0);
        job.status = JobStatus::Downloading;
        inner.store.insert_job(&job).unwrap();

        let scratch_path = download_scratch_path(&inner.config.download_scratch_dir(), &job);
        std::fs::create_dir_all(scratch_path.parent().unwrap()).unwrap();
        std::fs::write(&scratch_path, b"way too much data").unwrap();

        reconcile_on_start(&inner).unwrap();
        assert!(!scratch_path.exists(), "stale partial larger than the remote file should be dropped");
    }

    #[test]
    fn leftover_crash_marker_deletes_ghost_output_and_clears_itself() {
        let dir = tempdir().unwrap();
        let inner = test_inner(dir.path());
        let ghost_output = dir.path().join("temp/encoded/1_a.mkv");
        std::fs::create_dir_all(ghost_output.parent().unwrap()).unwrap();
        std::fs::write(&ghost_output, b"partial").unwrap();

        let marker_path = inner.config.crash_marker_path();
        crash_marker::write(
            &marker_path,
            &crash_marker::CrashMarker {
                input_path: dir.path().join("temp/downloaded/1_a.mkv"),
                output_path: ghost_output.clone(),
                started_at_ms: 1000,
            },
        )
        .unwrap();

        reconcile_on_start(&inner).unwrap();
        assert!(!ghost_output.exists());
        assert!(!marker_path.exists());
    }

    #[test]
    fn terminal_jobs_are_left_untouched() {
        let dir = tempdir().unwrap();
        let inner = test_inner(dir.path());
        let mut job = Job::new(1, "/m/a.mkv".into(), 10, 0);
        job.status = JobStatus::Completed;
        inner.store.insert_job(&job).unwrap();

        reconcile_on_start(&inner).unwrap();
        assert_eq!(inner.store.get_job(1).unwrap().unwrap().status, JobStatus::Completed);
    }
}
