//! Metadata Cache facade: hierarchical mirror of the
//! remote tree with folder aggregates and per-file probe data.

mod full_scan;
mod incremental;
mod queries;

pub use queries::ListedEntry;

use std::sync::Arc;
use std::time::Duration;

use crate::remote_fs::TransportRouter;
use crate::store::{DurableStore, FileRow, FolderRow};
use crate::video::VideoAdapter;

/// Builds the URL handed to the probe adapter for a remote path — the one
/// piece that differs between an HTTP-backed and an SSH/SFTP-backed
/// library.
pub type ProbeUrlBuilder = Arc<dyn Fn(&str) -> String + Send + Sync>;

pub struct MetadataCache {
    store: Arc<DurableStore>,
    router: Arc<TransportRouter>,
    video: Arc<VideoAdapter>,
    probe_url: ProbeUrlBuilder,
    root: String,
    probe_workers: usize,
    probe_timeout: Duration,
}

impl MetadataCache {
    pub fn new(
        store: Arc<DurableStore>,
        router: Arc<TransportRouter>,
        video: Arc<VideoAdapter>,
        probe_url: ProbeUrlBuilder,
        root: String,
        probe_workers: usize,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            store,
            router,
            video,
            probe_url,
            root,
            probe_workers,
            probe_timeout,
        }
    }

    /// Runs a full rebuild of the cache: delete, explore, probe, aggregate.
    pub fn full_scan(&self, now_ms: i64) -> anyhow::Result<()> {
        full_scan::run(
            &self.store,
            &self.router,
            &self.video,
            &self.probe_url,
            &self.root,
            self.probe_workers,
            self.probe_timeout,
            now_ms,
        )
    }

    /// Reconciles the cache against the live server tree without
    /// re-probing existing video rows.
    pub fn incremental_sync(&self, now_ms: i64) -> anyhow::Result<()> {
        incremental::sync(&self.store, &self.router, &self.root, now_ms)
    }

    pub fn list_directory(&self, path: &str) -> anyhow::Result<Vec<ListedEntry>> {
        queries::list_directory(&self.store, &self.router, path)
    }

    pub fn search(
        &self,
        term: &str,
        video_only: bool,
        min_size: Option<u64>,
        max_size: Option<u64>,
    ) -> anyhow::Result<Vec<FileRow>> {
        queries::search(&self.store, term, video_only, min_size, max_size)
    }

    pub fn folder_stats(&self, path: &str) -> anyhow::Result<Option<FolderRow>> {
        queries::folder_stats(&self.store, path)
    }
}
