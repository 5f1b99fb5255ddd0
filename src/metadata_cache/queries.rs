//! Directory listing, substring search, and folder-stats queries.

use crate::remote_fs::TransportRouter;
use crate::store::{DurableStore, FileRow, FolderRow};

use super::full_scan::join_path;

/// One row in a merged directory listing: either a cached file/folder row
/// or a live entry the cache hasn't indexed yet.
#[derive(Debug, Clone, PartialEq)]
pub enum ListedEntry {
    Folder(FolderRow),
    File(FileRow),
    /// A live entry with no cache row at all, so a newly created remote
    /// folder or file shows up immediately.
    Uncached { name: String, is_dir: bool, size: u64 },
}

/// Merges cached rows for `path` with a live listing through `router`, so
/// folders created on the server since the last sync still appear.
pub fn list_directory(store: &DurableStore, router: &TransportRouter, path: &str) -> anyhow::Result<Vec<ListedEntry>> {
    let cached_folders = store.folders_with_parent(path)?;
    let cached_files = store.files_in_folder(path)?;
    let live = router.list(path)?;

    let mut entries = Vec::new();
    for entry in live {
        let full_path = join_path(path, &entry.name);
        if entry.is_dir {
            match cached_folders.iter().find(|f| f.path == full_path) {
                Some(row) => entries.push(ListedEntry::Folder(row.clone())),
                None => entries.push(ListedEntry::Uncached {
                    name: entry.name,
                    is_dir: true,
                    size: 0,
                }),
            }
        } else {
            match cached_files.iter().find(|f| f.path == full_path) {
                Some(row) => entries.push(ListedEntry::File(row.clone())),
                None => entries.push(ListedEntry::Uncached {
                    name: entry.name,
                    is_dir: false,
                    size: entry.size,
                }),
            }
        }
    }
    Ok(entries)
}

/// Substring search across name/path with optional filters.
pub fn search(
    store: &DurableStore,
    term: &str,
    video_only: bool,
    min_size: Option<u64>,
    max_size: Option<u64>,
) -> anyhow::Result<Vec<FileRow>> {
    store.search_files(term, video_only, min_size, max_size)
}

/// O(1) folder statistics retrieval from the precomputed aggregate row.
pub fn folder_stats(store: &DurableStore, path: &str) -> anyhow::Result<Option<FolderRow>> {
    store.get_folder(path)
}
