//! Incremental sync: per directory, reconcile the
//! server listing against cached rows without re-probing existing videos.

use crate::remote_fs::TransportRouter;
use crate::store::{DurableStore, FileRow};

use super::full_scan::{is_video_extension, join_path};

/// Walks the remote tree from `root`, inserting new items, updating items
/// whose server mtime outran the cached one, and deleting cache rows with
/// no server counterpart, recursing into subdirectories. Stamps
/// `last_incremental_sync` on completion.
///
/// Folder aggregates are deliberately left untouched here — they may go
/// stale between full scans, and that's fine; only [`super::full_scan`]
/// recomputes them.
pub fn sync(store: &DurableStore, router: &TransportRouter, root: &str, now_ms: i64) -> anyhow::Result<()> {
    sync_dir(store, router, root)?;
    store.set_last_incremental_sync(now_ms)?;
    Ok(())
}

fn sync_dir(store: &DurableStore, router: &TransportRouter, dir: &str) -> anyhow::Result<()> {
    let live_entries = router.list(dir)?;
    let cached_files = store.files_in_folder(dir)?;
    let cached_folders = store.folders_with_parent(dir)?;

    let mut seen_files = std::collections::HashSet::new();
    let mut seen_folders = std::collections::HashSet::new();

    for entry in &live_entries {
        let path = join_path(dir, &entry.name);
        if entry.is_dir {
            seen_folders.insert(path.clone());
            if !cached_folders.iter().any(|f| f.path == path) {
                store.upsert_folder(&crate::store::FolderRow {
                    path: path.clone(),
                    parent: Some(dir.to_string()),
                    last_seen_mtime: entry.mtime,
                    file_count: 0,
                    video_count: 0,
                    total_size: 0,
                    total_duration: 0.0,
                    last_sync_ms: None,
                })?;
            }
            sync_dir(store, router, &path)?;
        } else {
            seen_files.insert(path.clone());
            match cached_files.iter().find(|f| f.path == path) {
                None => {
                    let is_video = is_video_extension(&entry.name);
                    store.upsert_file(&FileRow {
                        path,
                        parent: dir.to_string(),
                        name: entry.name.clone(),
                        size: entry.size,
                        mtime: entry.mtime,
                        is_video,
                        codec: None,
                        width: None,
                        height: None,
                        bitrate_bps: None,
                        duration: None,
                        last_sync_ms: None,
                    })?;
                }
                Some(cached) if entry.mtime.unwrap_or(0) > cached.mtime.unwrap_or(0) => {
                    let mut updated = cached.clone();
                    updated.size = entry.size;
                    updated.mtime = entry.mtime;
                    store.upsert_file(&updated)?;
                }
                Some(_) => {}
            }
        }
    }

    for cached in &cached_files {
        if !seen_files.contains(&cached.path) {
            store.delete_file(&cached.path)?;
        }
    }
    for cached in &cached_folders {
        if !seen_folders.contains(&cached.path) {
            store.delete_subtree(&cached.path)?;
        }
    }

    Ok(())
}
