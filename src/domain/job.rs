use serde::{Deserialize, Serialize};

/// Lifecycle states a job moves through.
///
/// `Waiting` is the initial state; `Completed` and `Failed` are terminal;
/// `Paused` and `AwaitingApproval` are stall states that hold a job out of
/// every stage's claim pool without discarding it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Downloading,
    ReadyEncode,
    Encoding,
    AwaitingApproval,
    ReadyUpload,
    Uploading,
    Completed,
    Failed,
    Paused,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// States the recovery pass in `scheduler::recovery` must reconcile on
    /// startup: any job caught mid-stage when the process last stopped.
    pub fn is_active_stage(self) -> bool {
        matches!(
            self,
            JobStatus::Downloading | JobStatus::Encoding | JobStatus::Uploading
        )
    }
}

/// Pre-probed media metadata captured before encoding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub duration_seconds: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub bitrate_bps: Option<u64>,
    pub video_codec: Option<String>,
    pub audio_streams: u32,
    pub subtitle_streams: u32,
    pub container: Option<String>,
}

/// One external-binary invocation for a job: the initial encode, or a
/// re-run after a crash-recovery restart, so pause/resume/restart
/// scenarios stay debuggable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    pub command: String,
    pub started_at_ms: u64,
    pub finished_at_ms: Option<u64>,
    pub exit_success: Option<bool>,
}

/// A unit of work: one remote video file to be downloaded, transcoded, and
/// uploaded back in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: u64,
    pub remote_path: String,
    pub source_size: u64,
    pub status: JobStatus,
    pub progress: f64,
    pub eta_seconds: Option<u64>,
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub finished_at_ms: Option<u64>,
    pub retry_count: u32,
    pub media_info: Option<MediaInfo>,
    pub codec_before: Option<String>,
    pub codec_after: Option<String>,
    pub pause_before_upload: bool,
    pub failure_message: Option<String>,
    #[serde(default)]
    pub runs: Vec<JobRun>,
    /// Backup sibling path recorded once an upload has renamed the remote
    /// original aside.
    pub backup_remote_path: Option<String>,
}

impl Job {
    pub fn new(id: u64, remote_path: String, source_size: u64, created_at_ms: u64) -> Self {
        Self {
            id,
            remote_path,
            source_size,
            status: JobStatus::Waiting,
            progress: 0.0,
            eta_seconds: None,
            created_at_ms,
            started_at_ms: None,
            finished_at_ms: None,
            retry_count: 0,
            media_info: None,
            codec_before: None,
            codec_after: None,
            pause_before_upload: false,
            failure_message: None,
            runs: Vec::new(),
            backup_remote_path: None,
        }
    }

    /// Whether this job may be deleted right now.
    pub fn is_deletable(&self) -> bool {
        self.status.is_terminal() || self.status == JobStatus::Paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_starts_waiting_with_zero_progress() {
        let job = Job::new(1, "/m/a.mkv".into(), 1024, 0);
        assert_eq!(job.status, JobStatus::Waiting);
        assert_eq!(job.progress, 0.0);
        assert!(job.runs.is_empty());
    }

    #[test]
    fn only_terminal_or_paused_jobs_are_deletable() {
        let mut job = Job::new(1, "/m/a.mkv".into(), 1024, 0);
        job.status = JobStatus::Downloading;
        assert!(!job.is_deletable());
        job.status = JobStatus::Paused;
        assert!(job.is_deletable());
        job.status = JobStatus::Completed;
        assert!(job.is_deletable());
        job.status = JobStatus::Failed;
        assert!(job.is_deletable());
    }

    #[test]
    fn active_stage_states_are_encoding_downloading_uploading() {
        assert!(JobStatus::Downloading.is_active_stage());
        assert!(JobStatus::Encoding.is_active_stage());
        assert!(JobStatus::Uploading.is_active_stage());
        assert!(!JobStatus::Waiting.is_active_stage());
        assert!(!JobStatus::AwaitingApproval.is_active_stage());
        assert!(!JobStatus::Paused.is_active_stage());
    }
}
