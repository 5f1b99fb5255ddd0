//! Full indexation: delete cache, single-threaded
//! directory-listing exploration feeding a shared unbounded queue of files
//! to a pool of probe workers, then bottom-up folder aggregation.
//!
//! `std::thread` workers draining a shared channel, the same pool shape
//! used elsewhere for the encode/upload stage runners, adapted here to "N
//! probe workers".

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::remote_fs::TransportRouter;
use crate::store::{DurableStore, FileRow, FolderRow};
use crate::video::VideoAdapter;

struct FileTask {
    path: String,
    parent: String,
    name: String,
    size: u64,
    mtime: Option<i64>,
    is_video: bool,
}

/// Runs a full scan rooted at `root`, writing file/folder rows to `store`.
/// `probe_url` builds the URL passed to the probe adapter for a given
/// remote path.
pub fn run(
    store: &Arc<DurableStore>,
    router: &TransportRouter,
    video: &Arc<VideoAdapter>,
    probe_url: &Arc<dyn Fn(&str) -> String + Send + Sync>,
    root: &str,
    probe_workers: usize,
    probe_timeout: Duration,
    now_ms: i64,
) -> anyhow::Result<()> {
    store.clear_cache()?;

    let (tx, rx) = mpsc::channel::<FileTask>();
    let rx = Arc::new(Mutex::new(rx));

    let workers: Vec<_> = (0..probe_workers.max(1))
        .map(|_| {
            let rx = Arc::clone(&rx);
            let store = Arc::clone(store);
            let video = Arc::clone(video);
            let probe_url = Arc::clone(probe_url);
            std::thread::spawn(move || probe_worker_loop(rx, probe_url, store, video, probe_timeout))
        })
        .collect();

    explore(store, router, root, &tx)?;
    drop(tx);

    for worker in workers {
        let _ = worker.join();
    }

    aggregate_folders(store)?;
    store.set_last_full_scan(now_ms)?;
    Ok(())
}

fn probe_worker_loop(
    rx: Arc<Mutex<mpsc::Receiver<FileTask>>>,
    probe_url: Arc<dyn Fn(&str) -> String + Send + Sync>,
    store: Arc<DurableStore>,
    video: Arc<VideoAdapter>,
    probe_timeout: Duration,
) {
    loop {
        let task = {
            let rx = rx.lock().unwrap_or_else(|e| e.into_inner());
            rx.recv()
        };
        let Ok(task) = task else { break };

        if !task.is_video {
            let _ = store.upsert_file(&FileRow {
                path: task.path,
                parent: task.parent,
                name: task.name,
                size: task.size,
                mtime: task.mtime,
                is_video: false,
                codec: None,
                width: None,
                height: None,
                bitrate_bps: None,
                duration: None,
                last_sync_ms: None,
            });
            continue;
        }

        let url = probe_url(&task.path);
        let info = video.probe_remote_bounded(&url, probe_timeout).ok();
        let _ = store.upsert_file(&FileRow {
            path: task.path,
            parent: task.parent,
            name: task.name,
            size: task.size,
            mtime: task.mtime,
            is_video: true,
            codec: info.as_ref().and_then(|i| i.video_codec.clone()),
            width: info.as_ref().and_then(|i| i.width),
            height: info.as_ref().and_then(|i| i.height),
            bitrate_bps: info.as_ref().and_then(|i| i.bitrate_bps),
            duration: info.as_ref().and_then(|i| i.duration_seconds),
            last_sync_ms: None,
        });
    }
}

fn explore(store: &DurableStore, router: &TransportRouter, root: &str, tx: &mpsc::Sender<FileTask>) -> anyhow::Result<()> {
    store.upsert_folder(&FolderRow {
        path: root.to_string(),
        parent: parent_of(root),
        last_seen_mtime: None,
        file_count: 0,
        video_count: 0,
        total_size: 0,
        total_duration: 0.0,
        last_sync_ms: None,
    })?;

    let mut stack = vec![root.to_string()];
    while let Some(dir) = stack.pop() {
        let entries = router.list(&dir)?;
        for entry in entries {
            let path = join_path(&dir, &entry.name);
            if entry.is_dir {
                store.upsert_folder(&FolderRow {
                    path: path.clone(),
                    parent: Some(dir.clone()),
                    last_seen_mtime: entry.mtime,
                    file_count: 0,
                    video_count: 0,
                    total_size: 0,
                    total_duration: 0.0,
                    last_sync_ms: None,
                })?;
                stack.push(path);
            } else {
                let is_video = is_video_extension(&entry.name);
                let _ = tx.send(FileTask {
                    path,
                    parent: dir.clone(),
                    name: entry.name,
                    size: entry.size,
                    mtime: entry.mtime,
                    is_video,
                });
            }
        }
    }
    Ok(())
}

fn aggregate_folders(store: &DurableStore) -> anyhow::Result<()> {
    for path in store.all_folder_paths_deepest_first()? {
        let files = store.files_in_folder(&path)?;
        let child_folders = store.folders_with_parent(&path)?;

        let mut file_count = files.len() as u64;
        let mut video_count = files.iter().filter(|f| f.is_video).count() as u64;
        let mut total_size: u64 = files.iter().map(|f| f.size).sum();
        let mut total_duration: f64 = files.iter().filter_map(|f| f.duration).sum();

        for child in &child_folders {
            file_count += child.file_count;
            video_count += child.video_count;
            total_size += child.total_size;
            total_duration += child.total_duration;
        }

        if let Some(mut row) = store.get_folder(&path)? {
            row.file_count = file_count;
            row.video_count = video_count;
            row.total_size = total_size;
            row.total_duration = total_duration;
            store.upsert_folder(&row)?;
        } else {
            store.upsert_folder(&FolderRow {
                path: path.clone(),
                parent: parent_of(&path),
                last_seen_mtime: None,
                file_count,
                video_count,
                total_size,
                total_duration,
                last_sync_ms: None,
            })?;
        }
    }
    Ok(())
}

pub(super) fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

pub(super) fn parent_of(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(trimmed[..idx].to_string()),
        None => None,
    }
}

pub(super) fn is_video_extension(name: &str) -> bool {
    const VIDEO_EXTENSIONS: &[&str] = &[
        "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "ts", "mpg", "mpeg",
    ];
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote_fs::{DirEntry, ReadStream, RemoteFs, Stat, WriteStream};
    use crate::video::VideoAdapterConfig;
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;

    struct FakeTreeFs;

    impl RemoteFs for FakeTreeFs {
        fn list(&self, path: &str) -> crate::error::CoreResult<Vec<DirEntry>> {
            Ok(match path {
                "/media" => vec![
                    DirEntry { name: "sub".into(), is_dir: true, size: 0, mtime: None },
                    DirEntry { name: "note.txt".into(), is_dir: false, size: 10, mtime: None },
                ],
                "/media/sub" => vec![DirEntry { name: "video.mkv".into(), is_dir: false, size: 100, mtime: None }],
                _ => vec![],
            })
        }
        fn stat(&self, _path: &str) -> crate::error::CoreResult<Stat> {
            unimplemented!()
        }
        fn open_read(&self, _path: &str, _offset: u64) -> crate::error::CoreResult<Box<dyn ReadStream>> {
            unimplemented!()
        }
        fn open_write(&self, _path: &str, _offset: u64, _overwrite: bool) -> crate::error::CoreResult<Box<dyn WriteStream>> {
            unimplemented!()
        }
        fn rename(&self, _src: &str, _dst: &str) -> crate::error::CoreResult<()> {
            unimplemented!()
        }
        fn delete(&self, _path: &str) -> crate::error::CoreResult<()> {
            unimplemented!()
        }
        fn exists(&self, _path: &str) -> crate::error::CoreResult<bool> {
            unimplemented!()
        }
        fn supports_write_resume(&self) -> bool {
            false
        }
        fn name(&self) -> &'static str {
            "fake-tree"
        }
    }

    #[test]
    fn full_scan_aggregates_folder_stats_bottom_up() {
        let dir = tempdir().unwrap();
        let store = Arc::new(DurableStore::open(&dir.path().join("jobs.db"), &dir.path().join("cache.db")).unwrap());
        let router = TransportRouter::new(Some(Box::new(FakeTreeFs)), None);
        let video = Arc::new(VideoAdapter::new(VideoAdapterConfig {
            ffmpeg_path: "ffmpeg".into(),
            ffprobe_path: "ffprobe".into(),
            local_probe_timeout: StdDuration::from_millis(50),
            remote_probe_timeout: StdDuration::from_millis(50),
        }));
        let probe_url: Arc<dyn Fn(&str) -> String + Send + Sync> = Arc::new(|p: &str| format!("http://x{p}"));

        run(&store, &router, &video, &probe_url, "/media", 2, StdDuration::from_millis(50), 1).unwrap();

        let root_stats = store.get_folder("/media").unwrap().expect("root folder row must exist");
        assert_eq!(root_stats.file_count, 2);
        assert_eq!(root_stats.video_count, 1);
        assert_eq!(root_stats.total_size, 110);

        let sub_stats = store.get_folder("/media/sub").unwrap().expect("child folder row must exist");
        assert_eq!(sub_stats.file_count, 1);
        assert_eq!(sub_stats.video_count, 1);
        assert_eq!(sub_stats.total_size, 100);
    }

    #[test]
    fn join_path_avoids_double_slash() {
        assert_eq!(join_path("/media", "a.mkv"), "/media/a.mkv");
        assert_eq!(join_path("/media/", "a.mkv"), "/media/a.mkv");
    }

    #[test]
    fn parent_of_root_child_is_root() {
        assert_eq!(parent_of("/media"), Some("/".to_string()));
        assert_eq!(parent_of("/"), None);
    }

    #[test]
    fn recognizes_common_video_extensions_case_insensitively() {
        assert!(is_video_extension("a.MKV"));
        assert!(is_video_extension("b.mp4"));
        assert!(!is_video_extension("notes.txt"));
    }
}
