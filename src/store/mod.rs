//! Durable Store: relational persistence for jobs and the metadata cache.
//!
//! Backed by SQLite (`rusqlite`, bundled), in place of a JSON-sidecar
//! approach, because the job table needs to be queried by id and by status
//! and the metadata cache needs its own relation set alongside it (see
//! DESIGN.md). A single writer [`Mutex`] enforces a serialized-writes
//! discipline; SQLite's WAL journal mode lets independent read-only
//! connections proceed without blocking on it.

mod cache;
mod jobs;
mod manifest;
mod schema;

pub use cache::{FileRow, FolderRow};
pub use manifest::{ManifestRecord, ManifestSummary};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::domain::{Job, JobStatus};
use crate::sync_ext::MutexExt;

/// Handle onto the jobs table and the metadata-cache relations.
///
/// Jobs and cache rows may live in the same physical database file (the
/// schema uses disjoint table names) or in two separate files; both are
/// supported: `jobs_db_path()` and `cache_db_path()` name independent
/// artifacts by default, but the cache may share the jobs database file.
pub struct DurableStore {
    jobs_path: PathBuf,
    cache_path: PathBuf,
    conn: Mutex<Connection>,
    /// Per-job last-persisted-progress timestamp, enforcing the "at most one
    /// persisted write per job per second" throttle.
    progress_throttle: Mutex<HashMap<u64, Instant>>,
}

impl DurableStore {
    /// Opens (creating if absent) the jobs and cache databases and applies
    /// migrations. When `jobs_path == cache_path` both relation sets share
    /// one connection and one file.
    pub fn open(jobs_path: &Path, cache_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = jobs_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(jobs_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        schema::migrate_jobs(&conn)?;

        if jobs_path == cache_path {
            schema::migrate_cache(&conn)?;
        } else {
            if let Some(parent) = cache_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            conn.execute(
                "ATTACH DATABASE ?1 AS cachedb",
                [cache_path.to_string_lossy().to_string()],
            )?;
            // Re-run cache migrations against the attached database by
            // operating on a throwaway connection scoped to that file, then
            // re-attach; simpler and avoids cross-db DDL quirks.
            let cache_conn = Connection::open(cache_path)?;
            cache_conn.pragma_update(None, "journal_mode", "WAL")?;
            schema::migrate_cache(&cache_conn)?;
            drop(cache_conn);
        }

        Ok(Self {
            jobs_path: jobs_path.to_path_buf(),
            cache_path: cache_path.to_path_buf(),
            conn: Mutex::new(conn),
            progress_throttle: Mutex::new(HashMap::new()),
        })
    }

    /// Opens an independent read-only connection for concurrent queries,
    /// honoring "reads may proceed in parallel".
    fn read_conn(&self) -> anyhow::Result<Connection> {
        let conn = Connection::open(&self.jobs_path)?;
        if self.jobs_path != self.cache_path {
            conn.execute(
                "ATTACH DATABASE ?1 AS cachedb",
                [self.cache_path.to_string_lossy().to_string()],
            )?;
        }
        Ok(conn)
    }

    // -- Jobs -----------------------------------------------------------

    pub fn insert_job(&self, job: &Job) -> anyhow::Result<()> {
        let conn = self.conn.lock_unpoisoned();
        jobs::insert(&conn, job)?;
        Ok(())
    }

    /// Persists `job`'s full mutable state. Callers making a state
    /// transition must call this before the transition's side effect
    /// becomes externally observable.
    pub fn update_job(&self, job: &Job) -> anyhow::Result<()> {
        let conn = self.conn.lock_unpoisoned();
        jobs::update(&conn, job)?;
        Ok(())
    }

    /// Like [`update_job`](Self::update_job) but throttled to at most one
    /// write per job per second, for the high-frequency
    /// progress-percentage updates emitted during a stage's I/O. Returns
    /// whether the write actually happened.
    pub fn update_job_progress_throttled(&self, job: &Job) -> anyhow::Result<bool> {
        {
            let mut throttle = self.progress_throttle.lock_unpoisoned();
            if let Some(last) = throttle.get(&job.id) {
                if last.elapsed() < Duration::from_secs(1) {
                    return Ok(false);
                }
            }
            throttle.insert(job.id, Instant::now());
        }
        self.update_job(job)?;
        Ok(true)
    }

    pub fn delete_job(&self, id: u64) -> anyhow::Result<()> {
        let conn = self.conn.lock_unpoisoned();
        jobs::delete(&conn, id)?;
        self.progress_throttle.lock_unpoisoned().remove(&id);
        Ok(())
    }

    pub fn get_job(&self, id: u64) -> anyhow::Result<Option<Job>> {
        let conn = self.read_conn()?;
        Ok(jobs::get(&conn, id)?)
    }

    pub fn get_job_by_remote_path(&self, remote_path: &str) -> anyhow::Result<Option<Job>> {
        let conn = self.read_conn()?;
        Ok(jobs::get_by_remote_path(&conn, remote_path)?)
    }

    pub fn list_jobs(&self) -> anyhow::Result<Vec<Job>> {
        let conn = self.read_conn()?;
        Ok(jobs::list_all(&conn)?)
    }

    pub fn list_jobs_by_status(&self, status: JobStatus) -> anyhow::Result<Vec<Job>> {
        let conn = self.read_conn()?;
        Ok(jobs::list_by_status(&conn, status)?)
    }

    pub fn job_stats(&self) -> anyhow::Result<Vec<(JobStatus, u64)>> {
        let conn = self.read_conn()?;
        Ok(jobs::stats_by_status(&conn)?)
    }

    pub fn next_job_id(&self) -> anyhow::Result<u64> {
        let conn = self.conn.lock_unpoisoned();
        Ok(jobs::next_job_id(&conn)?)
    }

    // -- Metadata cache ---------------------------------------------------

    pub fn clear_cache(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock_unpoisoned();
        cache::clear_all(&conn)?;
        Ok(())
    }

    pub fn upsert_folder(&self, row: &FolderRow) -> anyhow::Result<()> {
        let conn = self.conn.lock_unpoisoned();
        cache::upsert_folder(&conn, row)?;
        Ok(())
    }

    pub fn upsert_file(&self, row: &FileRow) -> anyhow::Result<()> {
        let conn = self.conn.lock_unpoisoned();
        cache::upsert_file(&conn, row)?;
        Ok(())
    }

    pub fn delete_file(&self, path: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock_unpoisoned();
        cache::delete_file(&conn, path)?;
        Ok(())
    }

    pub fn delete_folder(&self, path: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock_unpoisoned();
        cache::delete_folder(&conn, path)?;
        Ok(())
    }

    pub fn delete_subtree(&self, path: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock_unpoisoned();
        cache::delete_subtree(&conn, path)?;
        Ok(())
    }

    pub fn files_in_folder(&self, parent: &str) -> anyhow::Result<Vec<FileRow>> {
        let conn = self.read_conn()?;
        Ok(cache::files_in_folder(&conn, parent)?)
    }

    pub fn folders_with_parent(&self, parent: &str) -> anyhow::Result<Vec<FolderRow>> {
        let conn = self.read_conn()?;
        Ok(cache::folders_with_parent(&conn, parent)?)
    }

    pub fn get_folder(&self, path: &str) -> anyhow::Result<Option<FolderRow>> {
        let conn = self.read_conn()?;
        Ok(cache::get_folder(&conn, path)?)
    }

    pub fn get_file(&self, path: &str) -> anyhow::Result<Option<FileRow>> {
        let conn = self.read_conn()?;
        Ok(cache::get_file(&conn, path)?)
    }

    pub fn all_folder_paths_deepest_first(&self) -> anyhow::Result<Vec<String>> {
        let conn = self.read_conn()?;
        Ok(cache::all_folder_paths_deepest_first(&conn)?)
    }

    pub fn search_files(
        &self,
        term: &str,
        video_only: bool,
        min_size: Option<u64>,
        max_size: Option<u64>,
    ) -> anyhow::Result<Vec<FileRow>> {
        let conn = self.read_conn()?;
        Ok(cache::search(&conn, term, video_only, min_size, max_size)?)
    }

    pub fn set_last_full_scan(&self, at_ms: i64) -> anyhow::Result<()> {
        let conn = self.conn.lock_unpoisoned();
        cache::set_last_full_scan(&conn, at_ms)?;
        Ok(())
    }

    pub fn set_last_incremental_sync(&self, at_ms: i64) -> anyhow::Result<()> {
        let conn = self.conn.lock_unpoisoned();
        cache::set_last_incremental_sync(&conn, at_ms)?;
        Ok(())
    }

    pub fn last_sync_timestamps(&self) -> anyhow::Result<(Option<i64>, Option<i64>)> {
        let conn = self.read_conn()?;
        Ok(cache::last_sync_timestamps(&conn)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn shared_file_stores_jobs_and_cache_together() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.db");
        let store = DurableStore::open(&path, &path).unwrap();

        store.insert_job(&Job::new(1, "/m/a.mkv".into(), 100, 0)).unwrap();
        store
            .upsert_file(&FileRow {
                path: "/m/a.mkv".into(),
                parent: "/m".into(),
                name: "a.mkv".into(),
                size: 100,
                mtime: None,
                is_video: true,
                codec: None,
                width: None,
                height: None,
                bitrate_bps: None,
                duration: None,
                last_sync_ms: None,
            })
            .unwrap();

        assert!(store.get_job(1).unwrap().is_some());
        assert!(store.get_file("/m/a.mkv").unwrap().is_some());
    }

    #[test]
    fn separate_files_both_work_via_attach() {
        let dir = tempdir().unwrap();
        let jobs_path = dir.path().join("jobs.db");
        let cache_path = dir.path().join("cache.db");
        let store = DurableStore::open(&jobs_path, &cache_path).unwrap();

        store.insert_job(&Job::new(1, "/m/a.mkv".into(), 100, 0)).unwrap();
        store.set_last_full_scan(123).unwrap();

        assert!(store.get_job(1).unwrap().is_some());
        let (full, _incr) = store.last_sync_timestamps().unwrap();
        assert_eq!(full, Some(123));
    }

    #[test]
    fn progress_throttle_suppresses_rapid_updates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.db");
        let store = DurableStore::open(&path, &path).unwrap();
        let job = Job::new(1, "/m/a.mkv".into(), 100, 0);
        store.insert_job(&job).unwrap();

        assert!(store.update_job_progress_throttled(&job).unwrap());
        assert!(!store.update_job_progress_throttled(&job).unwrap());
    }
}
