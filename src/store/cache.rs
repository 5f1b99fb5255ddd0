use rusqlite::{params, Connection, OptionalExtension};

/// A cached folder row with bottom-up aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderRow {
    pub path: String,
    pub parent: Option<String>,
    pub last_seen_mtime: Option<i64>,
    pub file_count: u64,
    pub video_count: u64,
    pub total_size: u64,
    pub total_duration: f64,
    pub last_sync_ms: Option<i64>,
}

/// A cached file row, with video probe fields populated only for videos.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRow {
    pub path: String,
    pub parent: String,
    pub name: String,
    pub size: u64,
    pub mtime: Option<i64>,
    pub is_video: bool,
    pub codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bitrate_bps: Option<u64>,
    pub duration: Option<f64>,
    pub last_sync_ms: Option<i64>,
}

pub(super) fn clear_all(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM folders", [])?;
    conn.execute("DELETE FROM files", [])?;
    Ok(())
}

pub(super) fn upsert_folder(conn: &Connection, row: &FolderRow) -> rusqlite::Result<()> {
    conn.execute(
        r"INSERT INTO folders (path, parent, last_seen_mtime, file_count, video_count, total_size, total_duration, last_sync_ms)
          VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
          ON CONFLICT(path) DO UPDATE SET
            parent = excluded.parent,
            last_seen_mtime = excluded.last_seen_mtime,
            file_count = excluded.file_count,
            video_count = excluded.video_count,
            total_size = excluded.total_size,
            total_duration = excluded.total_duration,
            last_sync_ms = excluded.last_sync_ms",
        params![
            row.path,
            row.parent,
            row.last_seen_mtime,
            row.file_count as i64,
            row.video_count as i64,
            row.total_size as i64,
            row.total_duration,
            row.last_sync_ms,
        ],
    )?;
    Ok(())
}

pub(super) fn upsert_file(conn: &Connection, row: &FileRow) -> rusqlite::Result<()> {
    conn.execute(
        r"INSERT INTO files (path, parent, name, size, mtime, is_video, codec, width, height, bitrate_bps, duration, last_sync_ms)
          VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)
          ON CONFLICT(path) DO UPDATE SET
            parent = excluded.parent,
            name = excluded.name,
            size = excluded.size,
            mtime = excluded.mtime,
            is_video = excluded.is_video,
            codec = excluded.codec,
            width = excluded.width,
            height = excluded.height,
            bitrate_bps = excluded.bitrate_bps,
            duration = excluded.duration,
            last_sync_ms = excluded.last_sync_ms",
        params![
            row.path,
            row.parent,
            row.name,
            row.size as i64,
            row.mtime,
            row.is_video as i64,
            row.codec,
            row.width,
            row.height,
            row.bitrate_bps.map(|v| v as i64),
            row.duration,
            row.last_sync_ms,
        ],
    )?;
    Ok(())
}

pub(super) fn delete_file(conn: &Connection, path: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM files WHERE path = ?1", params![path])?;
    Ok(())
}

pub(super) fn delete_folder(conn: &Connection, path: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM folders WHERE path = ?1", params![path])?;
    Ok(())
}

/// Deletes a folder and every cached row nested under it, for when the
/// folder itself has vanished from the server during an incremental sync.
pub(super) fn delete_subtree(conn: &Connection, path: &str) -> rusqlite::Result<()> {
    let like = format!("{path}/%");
    conn.execute("DELETE FROM files WHERE path = ?1 OR path LIKE ?2", params![path, like])?;
    conn.execute("DELETE FROM folders WHERE path = ?1 OR path LIKE ?2", params![path, like])?;
    Ok(())
}

pub(super) fn files_in_folder(conn: &Connection, parent: &str) -> rusqlite::Result<Vec<FileRow>> {
    let mut stmt = conn.prepare("SELECT * FROM files WHERE parent = ?1 ORDER BY name ASC")?;
    let rows = stmt.query_map(params![parent], row_to_file)?;
    rows.collect()
}

pub(super) fn folders_with_parent(conn: &Connection, parent: &str) -> rusqlite::Result<Vec<FolderRow>> {
    let mut stmt = conn.prepare("SELECT * FROM folders WHERE parent = ?1 ORDER BY path ASC")?;
    let rows = stmt.query_map(params![parent], row_to_folder)?;
    rows.collect()
}

pub(super) fn get_folder(conn: &Connection, path: &str) -> rusqlite::Result<Option<FolderRow>> {
    conn.query_row("SELECT * FROM folders WHERE path = ?1", params![path], row_to_folder)
        .optional()
}

pub(super) fn get_file(conn: &Connection, path: &str) -> rusqlite::Result<Option<FileRow>> {
    conn.query_row("SELECT * FROM files WHERE path = ?1", params![path], row_to_file)
        .optional()
}

/// All folder paths in the tree, deepest-first, for bottom-up aggregation.
pub(super) fn all_folder_paths_deepest_first(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT path FROM folders ORDER BY LENGTH(path) DESC, path ASC")?;
    let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
    rows.collect()
}

pub(super) fn search(
    conn: &Connection,
    term: &str,
    video_only: bool,
    min_size: Option<u64>,
    max_size: Option<u64>,
) -> rusqlite::Result<Vec<FileRow>> {
    let like = format!("%{term}%");
    let mut sql =
        "SELECT * FROM files WHERE (name LIKE ?1 OR path LIKE ?1)".to_string();
    if video_only {
        sql.push_str(" AND is_video = 1");
    }
    if min_size.is_some() {
        sql.push_str(" AND size >= ?2");
    }
    if max_size.is_some() {
        sql.push_str(" AND size <= ?3");
    }
    sql.push_str(" ORDER BY path ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![like, min_size.unwrap_or(0) as i64, max_size.unwrap_or(i64::MAX as u64) as i64],
        row_to_file,
    )?;
    rows.collect()
}

pub(super) fn set_last_full_scan(conn: &Connection, at_ms: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE cache_metadata SET last_full_scan_ms = ?1 WHERE id = 1",
        params![at_ms],
    )?;
    Ok(())
}

pub(super) fn set_last_incremental_sync(conn: &Connection, at_ms: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE cache_metadata SET last_incremental_sync_ms = ?1 WHERE id = 1",
        params![at_ms],
    )?;
    Ok(())
}

pub(super) fn last_sync_timestamps(conn: &Connection) -> rusqlite::Result<(Option<i64>, Option<i64>)> {
    conn.query_row(
        "SELECT last_full_scan_ms, last_incremental_sync_ms FROM cache_metadata WHERE id = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}

fn row_to_folder(row: &rusqlite::Row<'_>) -> rusqlite::Result<FolderRow> {
    Ok(FolderRow {
        path: row.get("path")?,
        parent: row.get("parent")?,
        last_seen_mtime: row.get("last_seen_mtime")?,
        file_count: row.get::<_, i64>("file_count")? as u64,
        video_count: row.get::<_, i64>("video_count")? as u64,
        total_size: row.get::<_, i64>("total_size")? as u64,
        total_duration: row.get("total_duration")?,
        last_sync_ms: row.get("last_sync_ms")?,
    })
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRow> {
    Ok(FileRow {
        path: row.get("path")?,
        parent: row.get("parent")?,
        name: row.get("name")?,
        size: row.get::<_, i64>("size")? as u64,
        mtime: row.get("mtime")?,
        is_video: row.get::<_, i64>("is_video")? != 0,
        codec: row.get("codec")?,
        width: row.get("width")?,
        height: row.get("height")?,
        bitrate_bps: row.get::<_, Option<i64>>("bitrate_bps")?.map(|v| v as u64),
        duration: row.get("duration")?,
        last_sync_ms: row.get("last_sync_ms")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::migrate_cache;

    fn conn() -> Connection {
        let c = Connection::open_in_memory().unwrap();
        migrate_cache(&c).unwrap();
        c
    }

    #[test]
    fn upsert_file_then_get_round_trips() {
        let c = conn();
        let row = FileRow {
            path: "/m/a.mkv".into(),
            parent: "/m".into(),
            name: "a.mkv".into(),
            size: 100,
            mtime: Some(10),
            is_video: true,
            codec: Some("h264".into()),
            width: Some(1920),
            height: Some(1080),
            bitrate_bps: Some(5_000_000),
            duration: Some(120.0),
            last_sync_ms: Some(99),
        };
        upsert_file(&c, &row).unwrap();
        let fetched = get_file(&c, "/m/a.mkv").unwrap().unwrap();
        assert_eq!(fetched, row);
    }

    #[test]
    fn search_filters_by_video_only_and_substring() {
        let c = conn();
        upsert_file(
            &c,
            &FileRow {
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
            },
        )
        .unwrap();
        upsert_file(
            &c,
            &FileRow {
                path: "/m/notes.txt".into(),
                parent: "/m".into(),
                name: "notes.txt".into(),
                size: 5,
                mtime: None,
                is_video: false,
                codec: None,
                width: None,
                height: None,
                bitrate_bps: None,
                duration: None,
                last_sync_ms: None,
            },
        )
        .unwrap();

        let results = search(&c, "a", true, None, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "/m/a.mkv");
    }

    #[test]
    fn deepest_first_ordering_puts_leaves_before_root() {
        let c = conn();
        for p in ["/m", "/m/sub", "/m/sub/deep"] {
            upsert_folder(
                &c,
                &FolderRow {
                    path: p.into(),
                    parent: None,
                    last_seen_mtime: None,
                    file_count: 0,
                    video_count: 0,
                    total_size: 0,
                    total_duration: 0.0,
                    last_sync_ms: None,
                },
            )
            .unwrap();
        }
        let ordered = all_folder_paths_deepest_first(&c).unwrap();
        assert_eq!(ordered[0], "/m/sub/deep");
        assert_eq!(ordered.last().unwrap(), "/m");
    }
}
