use rusqlite::Connection;

/// Applies the jobs-table schema to `conn`.
///
/// Idempotent: safe to call against an already-migrated database.
pub(super) fn migrate_jobs(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS jobs (
            id                  INTEGER PRIMARY KEY,
            remote_path         TEXT NOT NULL UNIQUE,
            source_size         INTEGER NOT NULL,
            status              TEXT NOT NULL,
            progress            REAL NOT NULL DEFAULT 0,
            eta_seconds         INTEGER,
            created_at_ms       INTEGER NOT NULL,
            started_at_ms       INTEGER,
            finished_at_ms      INTEGER,
            retry_count         INTEGER NOT NULL DEFAULT 0,
            media_info_json     TEXT,
            codec_before        TEXT,
            codec_after         TEXT,
            pause_before_upload INTEGER NOT NULL DEFAULT 0,
            failure_message     TEXT,
            runs_json           TEXT NOT NULL DEFAULT '[]',
            backup_remote_path  TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
        ",
    )
}

/// Applies the metadata-cache relation schema to `conn`.
pub(super) fn migrate_cache(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS folders (
            path            TEXT PRIMARY KEY,
            parent          TEXT,
            last_seen_mtime INTEGER,
            file_count      INTEGER NOT NULL DEFAULT 0,
            video_count     INTEGER NOT NULL DEFAULT 0,
            total_size      INTEGER NOT NULL DEFAULT 0,
            total_duration  REAL NOT NULL DEFAULT 0,
            last_sync_ms    INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent);

        CREATE TABLE IF NOT EXISTS files (
            path         TEXT PRIMARY KEY,
            parent       TEXT NOT NULL,
            name         TEXT NOT NULL,
            size         INTEGER NOT NULL,
            mtime        INTEGER,
            is_video     INTEGER NOT NULL DEFAULT 0,
            codec        TEXT,
            width        INTEGER,
            height       INTEGER,
            bitrate_bps  INTEGER,
            duration     REAL,
            last_sync_ms INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_files_parent ON files(parent);
        CREATE INDEX IF NOT EXISTS idx_files_name ON files(name);

        CREATE TABLE IF NOT EXISTS cache_metadata (
            id                      INTEGER PRIMARY KEY CHECK (id = 1),
            last_full_scan_ms       INTEGER,
            last_incremental_sync_ms INTEGER
        );
        INSERT OR IGNORE INTO cache_metadata (id) VALUES (1);
        ",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_jobs(&conn).unwrap();
        migrate_jobs(&conn).unwrap();
        migrate_cache(&conn).unwrap();
        migrate_cache(&conn).unwrap();

        let row_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cache_metadata", [], |r| r.get(0))
            .unwrap();
        assert_eq!(row_count, 1);
    }
}
