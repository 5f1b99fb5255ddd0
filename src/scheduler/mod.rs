//! Pipeline Scheduler: lifecycle control over the three
//! stage-runner pools (bounded download, singleton encode, bounded upload).
//!
//! One `std::thread` per stage slot, each looping wait-on-condvar /
//! claim-one-job / do-I/O / persist / notify.

mod approval;
mod cleanup;
mod control;
mod naming;
mod recovery;
mod stages;
mod state;

pub use state::{Inner, SchedulerState};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::Config;
use crate::domain::JobStatus;
use crate::remote_fs::TransportRouter;
use crate::store::DurableStore;
use crate::sync_ext::{CondvarExt, MutexExt};
use crate::video::VideoAdapter;

/// How long a stage-runner thread sleeps between rounds when it found no
/// eligible job.
const ROUND_SLEEP: Duration = Duration::from_millis(500);

pub struct Scheduler {
    inner: Arc<Inner>,
    threads: std::sync::Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Scheduler {
    pub fn new(store: Arc<DurableStore>, router: Arc<TransportRouter>, video: Arc<VideoAdapter>, config: Config) -> anyhow::Result<Self> {
        let inner = Inner::new(store, router, video, config);
        recovery::reconcile_on_start(&inner)?;
        Ok(Self {
            inner,
            threads: std::sync::Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Starts the stage-runner thread pools. Idempotent: calling this twice
    /// has no effect beyond the first call.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut state = self.inner.state.lock_unpoisoned();
            state.running = true;
            state.paused = false;
            state.shutting_down = false;
        }

        let mut threads = self.threads.lock_unpoisoned();
        for _ in 0..self.inner.config.max_downloads.max(1) {
            threads.push(spawn_stage_thread(Arc::clone(&self.inner), "download", stages::download::try_claim_and_download));
        }
        threads.push(spawn_stage_thread(Arc::clone(&self.inner), "encode", stages::encode::try_claim_and_encode));
        for _ in 0..self.inner.config.max_uploads.max(1) {
            threads.push(spawn_stage_thread(Arc::clone(&self.inner), "upload", stages::upload::try_claim_and_upload));
        }
    }

    /// Halts dispatch of new claims but lets in-flight transfers/encodes
    /// finish. Idempotent.
    pub fn pause(&self) {
        let mut state = self.inner.state.lock_unpoisoned();
        state.paused = true;
    }

    /// Resumes claim dispatch after [`Scheduler::pause`].
    pub fn resume(&self) {
        let mut state = self.inner.state.lock_unpoisoned();
        state.paused = false;
        self.inner.cv.notify_all();
    }

    /// Cancels the active encoder, returns every non-terminal processing
    /// state to `waiting`, and joins every stage thread.
    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock_unpoisoned();
            state.shutting_down = true;
            for stop_handle in state.encode_stop_handles.values() {
                stop_handle.request_stop();
            }
            self.inner.cv.notify_all();
        }

        let handles: Vec<_> = self.threads.lock_unpoisoned().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        self.started.store(false, Ordering::Release);
    }

    pub fn approve(&self, job_id: u64) -> anyhow::Result<()> {
        approval::approve(&self.inner, job_id)
    }

    pub fn reject(&self, job_id: u64) -> anyhow::Result<()> {
        approval::reject(&self.inner, job_id)
    }

    pub fn add_job(&self, remote_path: String, source_size: u64, now_ms: u64) -> anyhow::Result<u64> {
        control::add_job(&self.inner, remote_path, source_size, now_ms)
    }

    pub fn remove_job(&self, job_id: u64) -> anyhow::Result<()> {
        control::remove_job(&self.inner, job_id)
    }

    pub fn pause_job(&self, job_id: u64) -> anyhow::Result<()> {
        control::pause_job(&self.inner, job_id)
    }

    pub fn resume_job(&self, job_id: u64) -> anyhow::Result<()> {
        control::resume_job(&self.inner, job_id)
    }

    pub fn retry_job(&self, job_id: u64) -> anyhow::Result<()> {
        control::retry_job(&self.inner, job_id)
    }

    pub fn clear_all(&self) -> anyhow::Result<()> {
        control::clear_all(&self.inner)
    }

    pub fn stats(&self) -> anyhow::Result<Vec<(JobStatus, u64)>> {
        control::stats(&self.inner)
    }

    pub fn inner(&self) -> &Arc<Inner> {
        &self.inner
    }
}

fn spawn_stage_thread(
    inner: Arc<Inner>,
    label: &'static str,
    claim: fn(&Inner) -> anyhow::Result<bool>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("sharkoder-{label}"))
        .spawn(move || loop {
            {
                let state = inner.state.lock_unpoisoned();
                if state.shutting_down {
                    break;
                }
            }

            match claim(&inner) {
                Ok(true) => continue,
                Ok(false) => {
                    let state = inner.state.lock_unpoisoned();
                    if state.shutting_down {
                        break;
                    }
                    let _ = inner.cv.wait_timeout_unpoisoned(state, ROUND_SLEEP);
                }
                Err(err) => {
                    tracing::error!(stage = label, error = %err, "stage runner round failed");
                    std::thread::sleep(ROUND_SLEEP);
                }
            }
        })
        .expect("failed to spawn stage runner thread")
}
