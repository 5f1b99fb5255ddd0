//! Remote FS Adapter: a uniform interface over the SSH/SFTP-based and
//! HTTP-based transports.

mod http_adapter;
mod progress;
mod router;
mod ssh_adapter;

pub use http_adapter::HttpAdapter;
pub use progress::{TransferProgress, TransferProgressSink};
pub use router::{Op, TransportRouter};
pub use ssh_adapter::SshAdapter;

use std::io::{Read, Write};

use crate::error::CoreResult;

/// One entry returned by [`RemoteFs::list`].
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub mtime: Option<i64>,
}

/// Result of [`RemoteFs::stat`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stat {
    pub size: u64,
    pub mtime: Option<i64>,
    pub exists: bool,
}

/// A readable byte stream over a remote file, closed on drop.
pub trait ReadStream: Read + Send {}
impl<T: Read + Send> ReadStream for T {}

/// A writable byte sink to a remote file, closed on drop.
pub trait WriteStream: Write + Send {}
impl<T: Write + Send> WriteStream for T {}

/// Transport-agnostic capability set implemented by both concrete adapters.
/// The [`TransportRouter`] is the only caller; the metadata cache and
/// scheduler stages never hold a concrete adapter directly.
pub trait RemoteFs: Send + Sync {
    fn list(&self, path: &str) -> CoreResult<Vec<DirEntry>>;
    fn stat(&self, path: &str) -> CoreResult<Stat>;

    /// Opens `path` for reading starting at `offset`, so interrupted
    /// downloads can resume by byte offset.
    fn open_read(&self, path: &str, offset: u64) -> CoreResult<Box<dyn ReadStream>>;

    /// Opens `path` for writing starting at `offset`. `overwrite` controls
    /// whether an existing file at `path` is truncated first.
    fn open_write(&self, path: &str, offset: u64, overwrite: bool)
        -> CoreResult<Box<dyn WriteStream>>;

    fn rename(&self, src: &str, dst: &str) -> CoreResult<()>;
    fn delete(&self, path: &str) -> CoreResult<()>;
    fn exists(&self, path: &str) -> CoreResult<bool>;

    /// Whether this adapter supports resuming a partial upload by byte
    /// offset. The HTTP-based adapter does not.
    fn supports_write_resume(&self) -> bool;

    /// Short label for logging (`"ssh"`, `"http"`).
    fn name(&self) -> &'static str;
}
