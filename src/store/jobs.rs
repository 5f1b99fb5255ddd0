use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::{Job, JobRun, JobStatus, MediaInfo};

fn status_to_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Waiting => "waiting",
        JobStatus::Downloading => "downloading",
        JobStatus::ReadyEncode => "ready_encode",
        JobStatus::Encoding => "encoding",
        JobStatus::AwaitingApproval => "awaiting_approval",
        JobStatus::ReadyUpload => "ready_upload",
        JobStatus::Uploading => "uploading",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Paused => "paused",
    }
}

fn status_from_str(s: &str) -> JobStatus {
    match s {
        "downloading" => JobStatus::Downloading,
        "ready_encode" => JobStatus::ReadyEncode,
        "encoding" => JobStatus::Encoding,
        "awaiting_approval" => JobStatus::AwaitingApproval,
        "ready_upload" => JobStatus::ReadyUpload,
        "uploading" => JobStatus::Uploading,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "paused" => JobStatus::Paused,
        _ => JobStatus::Waiting,
    }
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    let media_info_json: Option<String> = row.get("media_info_json")?;
    let runs_json: String = row.get("runs_json")?;
    Ok(Job {
        id: row.get::<_, i64>("id")? as u64,
        remote_path: row.get("remote_path")?,
        source_size: row.get::<_, i64>("source_size")? as u64,
        status: status_from_str(&row.get::<_, String>("status")?),
        progress: row.get("progress")?,
        eta_seconds: row
            .get::<_, Option<i64>>("eta_seconds")?
            .map(|v| v as u64),
        created_at_ms: row.get::<_, i64>("created_at_ms")? as u64,
        started_at_ms: row
            .get::<_, Option<i64>>("started_at_ms")?
            .map(|v| v as u64),
        finished_at_ms: row
            .get::<_, Option<i64>>("finished_at_ms")?
            .map(|v| v as u64),
        retry_count: row.get::<_, i64>("retry_count")? as u32,
        media_info: media_info_json
            .as_deref()
            .and_then(|s| serde_json::from_str::<MediaInfo>(s).ok()),
        codec_before: row.get("codec_before")?,
        codec_after: row.get("codec_after")?,
        pause_before_upload: row.get::<_, i64>("pause_before_upload")? != 0,
        failure_message: row.get("failure_message")?,
        runs: serde_json::from_str::<Vec<JobRun>>(&runs_json).unwrap_or_default(),
        backup_remote_path: row.get("backup_remote_path")?,
    })
}

/// Inserts a new job in the `waiting` state.
///
/// Fails (via the `remote_path` UNIQUE constraint) if a non-terminal job
/// already targets this path, enforcing "only one in-flight upload per
/// remote path".
pub(super) fn insert(conn: &Connection, job: &Job) -> rusqlite::Result<()> {
    conn.execute(
        r"INSERT INTO jobs (
            id, remote_path, source_size, status, progress, eta_seconds,
            created_at_ms, started_at_ms, finished_at_ms, retry_count,
            media_info_json, codec_before, codec_after, pause_before_upload,
            failure_message, runs_json, backup_remote_path
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
        params![
            job.id as i64,
            job.remote_path,
            job.source_size as i64,
            status_to_str(job.status),
            job.progress,
            job.eta_seconds.map(|v| v as i64),
            job.created_at_ms as i64,
            job.started_at_ms.map(|v| v as i64),
            job.finished_at_ms.map(|v| v as i64),
            job.retry_count as i64,
            job.media_info
                .as_ref()
                .map(|m| serde_json::to_string(m).unwrap_or_default()),
            job.codec_before,
            job.codec_after,
            job.pause_before_upload as i64,
            job.failure_message,
            serde_json::to_string(&job.runs).unwrap_or_else(|_| "[]".to_string()),
            job.backup_remote_path,
        ],
    )?;
    Ok(())
}

/// Persists the full mutable state of `job`.
pub(super) fn update(conn: &Connection, job: &Job) -> rusqlite::Result<()> {
    conn.execute(
        r"UPDATE jobs SET
            status = ?2, progress = ?3, eta_seconds = ?4, started_at_ms = ?5,
            finished_at_ms = ?6, retry_count = ?7, media_info_json = ?8,
            codec_before = ?9, codec_after = ?10, pause_before_upload = ?11,
            failure_message = ?12, runs_json = ?13, backup_remote_path = ?14
        WHERE id = ?1",
        params![
            job.id as i64,
            status_to_str(job.status),
            job.progress,
            job.eta_seconds.map(|v| v as i64),
            job.started_at_ms.map(|v| v as i64),
            job.finished_at_ms.map(|v| v as i64),
            job.retry_count as i64,
            job.media_info
                .as_ref()
                .map(|m| serde_json::to_string(m).unwrap_or_default()),
            job.codec_before,
            job.codec_after,
            job.pause_before_upload as i64,
            job.failure_message,
            serde_json::to_string(&job.runs).unwrap_or_else(|_| "[]".to_string()),
            job.backup_remote_path,
        ],
    )?;
    Ok(())
}

pub(super) fn delete(conn: &Connection, id: u64) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM jobs WHERE id = ?1", params![id as i64])?;
    Ok(())
}

pub(super) fn get(conn: &Connection, id: u64) -> rusqlite::Result<Option<Job>> {
    conn.query_row("SELECT * FROM jobs WHERE id = ?1", params![id as i64], row_to_job)
        .optional()
}

pub(super) fn get_by_remote_path(conn: &Connection, remote_path: &str) -> rusqlite::Result<Option<Job>> {
    conn.query_row(
        "SELECT * FROM jobs WHERE remote_path = ?1",
        params![remote_path],
        row_to_job,
    )
    .optional()
}

pub(super) fn list_all(conn: &Connection) -> rusqlite::Result<Vec<Job>> {
    let mut stmt = conn.prepare("SELECT * FROM jobs ORDER BY id ASC")?;
    let rows = stmt.query_map([], row_to_job)?;
    rows.collect()
}

pub(super) fn list_by_status(conn: &Connection, status: JobStatus) -> rusqlite::Result<Vec<Job>> {
    let mut stmt = conn.prepare("SELECT * FROM jobs WHERE status = ?1 ORDER BY id ASC")?;
    let rows = stmt.query_map(params![status_to_str(status)], row_to_job)?;
    rows.collect()
}

pub(super) fn stats_by_status(conn: &Connection) -> rusqlite::Result<Vec<(JobStatus, u64)>> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
    let rows = stmt.query_map([], |row| {
        let status: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok((status_from_str(&status), count as u64))
    })?;
    rows.collect()
}

pub(super) fn next_job_id(conn: &Connection) -> rusqlite::Result<u64> {
    let max: Option<i64> = conn.query_row("SELECT MAX(id) FROM jobs", [], |r| r.get(0))?;
    Ok(max.unwrap_or(0) as u64 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::migrate_jobs;

    fn conn() -> Connection {
        let c = Connection::open_in_memory().unwrap();
        migrate_jobs(&c).unwrap();
        c
    }

    #[test]
    fn insert_then_get_round_trips() {
        let c = conn();
        let job = Job::new(1, "/m/a.mkv".into(), 1024, 1000);
        insert(&c, &job).unwrap();
        let fetched = get(&c, 1).unwrap().unwrap();
        assert_eq!(fetched.remote_path, "/m/a.mkv");
        assert_eq!(fetched.status, JobStatus::Waiting);
    }

    #[test]
    fn duplicate_remote_path_is_rejected() {
        let c = conn();
        insert(&c, &Job::new(1, "/m/a.mkv".into(), 1024, 0)).unwrap();
        let err = insert(&c, &Job::new(2, "/m/a.mkv".into(), 2048, 0));
        assert!(err.is_err());
    }

    #[test]
    fn update_persists_status_transition() {
        let c = conn();
        let mut job = Job::new(1, "/m/a.mkv".into(), 1024, 0);
        insert(&c, &job).unwrap();
        job.status = JobStatus::Downloading;
        job.started_at_ms = Some(500);
        update(&c, &job).unwrap();
        let fetched = get(&c, 1).unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Downloading);
        assert_eq!(fetched.started_at_ms, Some(500));
    }

    #[test]
    fn list_by_status_filters_correctly() {
        let c = conn();
        let mut a = Job::new(1, "/m/a.mkv".into(), 1, 0);
        let b = Job::new(2, "/m/b.mkv".into(), 1, 0);
        a.status = JobStatus::Completed;
        insert(&c, &a).unwrap();
        insert(&c, &b).unwrap();
        let waiting = list_by_status(&c, JobStatus::Waiting).unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, 2);
    }

    #[test]
    fn next_job_id_increments_from_max() {
        let c = conn();
        assert_eq!(next_job_id(&c).unwrap(), 1);
        insert(&c, &Job::new(5, "/m/a.mkv".into(), 1, 0)).unwrap();
        assert_eq!(next_job_id(&c).unwrap(), 6);
    }
}
