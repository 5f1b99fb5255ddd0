//! Shared scheduler state: `Inner` bundles every adapter the stage runners
//! need plus a `Mutex`-guarded mutable core and a `Condvar` for wakeups,
//! split the same way as the worker pool's own shared state, generalized
//! from N interchangeable workers to three differently-shaped stage runners.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex};

use crate::config::Config;
use crate::remote_fs::TransportRouter;
use crate::store::DurableStore;
use crate::video::{StopHandle, VideoAdapter};

/// Mutable scheduler core, guarded by `Inner::cv_lock` and woken through
/// `Inner::cv`.
pub struct SchedulerState {
    /// `false` until `Scheduler::start`; new claims are not dispatched.
    pub running: bool,
    /// `true` after `Scheduler::pause`: halts new claims but leaves active
    /// transfers/encodes to finish.
    pub paused: bool,
    /// `true` once `Scheduler::stop` has been called, so stage runner
    /// threads know to exit instead of looping for more work.
    pub shutting_down: bool,
    pub active_downloads: HashSet<u64>,
    pub active_uploads: HashSet<u64>,
    pub encoding_job: Option<u64>,
    /// Cooperative-stop handles for the job currently occupying the
    /// singleton encode slot, so `Scheduler::stop` can cancel it.
    pub encode_stop_handles: HashMap<u64, StopHandle>,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            running: false,
            paused: false,
            shutting_down: false,
            active_downloads: HashSet::new(),
            active_uploads: HashSet::new(),
            encoding_job: None,
            encode_stop_handles: HashMap::new(),
        }
    }
}

/// Everything a stage runner thread needs, shared via `Arc`.
pub struct Inner {
    pub store: Arc<DurableStore>,
    pub router: Arc<TransportRouter>,
    pub video: Arc<VideoAdapter>,
    pub config: Config,
    pub state: Mutex<SchedulerState>,
    pub cv: Condvar,
}

impl Inner {
    pub fn new(store: Arc<DurableStore>, router: Arc<TransportRouter>, video: Arc<VideoAdapter>, config: Config) -> Arc<Self> {
        Arc::new(Self {
            store,
            router,
            video,
            config,
            state: Mutex::new(SchedulerState::new()),
            cv: Condvar::new(),
        })
    }
}
