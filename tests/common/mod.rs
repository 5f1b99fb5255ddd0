//! Shared test fixtures: a local-directory-backed `RemoteFs` fake so
//! integration tests can drive the real scheduler/metadata-cache logic
//! without a live SSH or HTTP server, plus [`mock_transcoder_path`] for
//! pointing `ffmpeg`/`ffprobe` at the `mock_transcoder` test binary.

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sharkoder::error::{CoreError, CoreResult, ErrorKind};
use sharkoder::remote_fs::{DirEntry, ReadStream, RemoteFs, Stat, WriteStream};

/// Treats a local directory as the "remote" tree, so the transport layer
/// under test is the real `TransportRouter` dispatch/failover logic while
/// the actual bytes just live on the local filesystem.
pub struct LocalDirFs {
    root: PathBuf,
}

impl LocalDirFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        fs::create_dir_all(&root).expect("fixture root must be creatable");
        Self { root }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl RemoteFs for LocalDirFs {
    fn list(&self, path: &str) -> CoreResult<Vec<DirEntry>> {
        let dir = self.resolve(path);
        let read_dir = fs::read_dir(&dir)
            .map_err(|e| CoreError::with_source(ErrorKind::NotFound, "list failed", e))?;
        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| CoreError::with_source(ErrorKind::Fatal, "list entry failed", e))?;
            let metadata = entry.metadata().map_err(|e| CoreError::with_source(ErrorKind::Fatal, "stat failed", e))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: metadata.is_dir(),
                size: metadata.len(),
                mtime: metadata.modified().ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs() as i64),
            });
        }
        Ok(entries)
    }

    fn stat(&self, path: &str) -> CoreResult<Stat> {
        let target = self.resolve(path);
        match fs::metadata(&target) {
            Ok(metadata) => Ok(Stat {
                size: metadata.len(),
                mtime: metadata.modified().ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs() as i64),
                exists: true,
            }),
            Err(_) => Ok(Stat { size: 0, mtime: None, exists: false }),
        }
    }

    fn open_read(&self, path: &str, offset: u64) -> CoreResult<Box<dyn ReadStream>> {
        let target = self.resolve(path);
        let mut file = fs::File::open(&target).map_err(|e| CoreError::with_source(ErrorKind::NotFound, "open_read failed", e))?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).map_err(|e| CoreError::with_source(ErrorKind::Fatal, "seek failed", e))?;
        }
        Ok(Box::new(file))
    }

    fn open_write(&self, path: &str, offset: u64, overwrite: bool) -> CoreResult<Box<dyn WriteStream>> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| CoreError::with_source(ErrorKind::Fatal, "mkdir failed", e))?;
        }
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(overwrite && offset == 0)
            .open(&target)
            .map_err(|e| CoreError::with_source(ErrorKind::Fatal, "open_write failed", e))?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).map_err(|e| CoreError::with_source(ErrorKind::Fatal, "seek failed", e))?;
        }
        Ok(Box::new(file))
    }

    fn rename(&self, src: &str, dst: &str) -> CoreResult<()> {
        let src = self.resolve(src);
        let dst = self.resolve(dst);
        if !src.exists() {
            return Err(CoreError::new(ErrorKind::NotFound, "rename source missing"));
        }
        if let Some(parent) = dst.parent() {
            let _ = fs::create_dir_all(parent);
        }
        fs::rename(&src, &dst).map_err(|e| CoreError::with_source(ErrorKind::Fatal, "rename failed", e))
    }

    fn delete(&self, path: &str) -> CoreResult<()> {
        let target = self.resolve(path);
        fs::remove_file(&target).map_err(|e| CoreError::with_source(ErrorKind::NotFound, "delete failed", e))
    }

    fn exists(&self, path: &str) -> CoreResult<bool> {
        Ok(self.resolve(path).exists())
    }

    fn supports_write_resume(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "local-fixture"
    }
}

/// Path to the `mock_transcoder` test binary, built by the `test-support`
/// feature's `[[bin]]` target.
pub fn mock_transcoder_path() -> PathBuf {
    let mut path = std::env::current_exe().expect("test binary path");
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push(if cfg!(windows) { "mock_transcoder.exe" } else { "mock_transcoder" });
    path
}

/// Serializes tests that mutate `SHARKODER_MOCK_*` process environment
/// variables read by the `mock_transcoder` child process, since the process
/// environment is global and tests run concurrently by default.
static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

pub fn lock_mock_env() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn set_mock_env(key: &str, value: &str) {
    unsafe { std::env::set_var(key, value) };
}

pub fn clear_mock_env(keys: &[&str]) {
    for key in keys {
        unsafe { std::env::remove_var(key) };
    }
}

pub fn write_file(path: &Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut file = fs::File::create(path).unwrap();
    file.write_all(contents).unwrap();
}
