//! Transport Router: adapter selection, read-only latch, failover.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{CoreResult, ErrorKind};
use crate::sync_ext::MutexExt;

use super::{DirEntry, ReadStream, RemoteFs, Stat, WriteStream};

/// The kind of call being routed, so list/stat can prefer HTTP while
/// download/upload apply the router's failover policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    List,
    Stat,
    Download,
    Upload,
}

struct AdapterSlot {
    fs: Box<dyn RemoteFs>,
    read_only: AtomicBool,
    connected: AtomicBool,
}

/// Routes every remote operation across the HTTP-based and SSH/SFTP-based
/// adapters, preferring HTTP, failing over to SSH on `Timeout` /
/// `ConnectionLost` / `Transient`, and latching an adapter read-only the
/// first time it returns `Forbidden` on a write.
pub struct TransportRouter {
    http: Option<AdapterSlot>,
    ssh: Option<AdapterSlot>,
}

impl TransportRouter {
    pub fn new(http: Option<Box<dyn RemoteFs>>, ssh: Option<Box<dyn RemoteFs>>) -> Self {
        Self {
            http: http.map(|fs| AdapterSlot {
                fs,
                read_only: AtomicBool::new(false),
                connected: AtomicBool::new(true),
            }),
            ssh: ssh.map(|fs| AdapterSlot {
                fs,
                read_only: AtomicBool::new(false),
                connected: AtomicBool::new(true),
            }),
        }
    }

    /// Ordered adapter preference for `op`: list/stat and download prefer
    /// HTTP when connected; writes skip any adapter already latched
    /// read-only.
    fn candidates(&self, op: Op) -> Vec<&AdapterSlot> {
        let is_write = matches!(op, Op::Upload);
        let mut order: Vec<&AdapterSlot> = Vec::new();
        if let Some(http) = &self.http {
            if http.connected.load(Ordering::Acquire) && !(is_write && http.read_only.load(Ordering::Acquire)) {
                order.push(http);
            }
        }
        if let Some(ssh) = &self.ssh {
            if ssh.connected.load(Ordering::Acquire) && !(is_write && ssh.read_only.load(Ordering::Acquire)) {
                order.push(ssh);
            }
        }
        order
    }

    /// Runs `op` via the preferred adapter for `kind`, retrying once on the
    /// other connected, non-read-only adapter on a retryable error.
    fn dispatch<T>(
        &self,
        kind: Op,
        op: impl Fn(&dyn RemoteFs) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let candidates = self.candidates(kind);
        let mut last_err = None;
        for (i, slot) in candidates.iter().enumerate() {
            match op(slot.fs.as_ref()) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if err.kind() == ErrorKind::Forbidden && kind == Op::Upload {
                        slot.read_only.store(true, Ordering::Release);
                        tracing::warn!(adapter = slot.fs.name(), "adapter latched read-only after Forbidden");
                    }
                    if err.kind() == ErrorKind::ConnectionLost {
                        slot.connected.store(false, Ordering::Release);
                    }
                    let retryable = err.kind().is_retryable() || err.kind() == ErrorKind::Forbidden;
                    last_err = Some(err);
                    if !retryable || i + 1 >= candidates.len() {
                        break;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            crate::error::CoreError::new(ErrorKind::Fatal, "no remote adapter configured")
        }))
    }

    pub fn list(&self, path: &str) -> CoreResult<Vec<DirEntry>> {
        self.dispatch(Op::List, |fs| fs.list(path))
    }

    pub fn stat(&self, path: &str) -> CoreResult<Stat> {
        self.dispatch(Op::Stat, |fs| fs.stat(path))
    }

    pub fn open_read(&self, path: &str, offset: u64) -> CoreResult<Box<dyn ReadStream>> {
        self.dispatch(Op::Download, |fs| fs.open_read(path, offset))
    }

    pub fn open_write(
        &self,
        path: &str,
        offset: u64,
        overwrite: bool,
    ) -> CoreResult<Box<dyn WriteStream>> {
        self.dispatch(Op::Upload, |fs| fs.open_write(path, offset, overwrite))
    }

    pub fn rename(&self, src: &str, dst: &str) -> CoreResult<()> {
        self.dispatch(Op::Upload, |fs| fs.rename(src, dst))
    }

    pub fn delete(&self, path: &str) -> CoreResult<()> {
        self.dispatch(Op::Upload, |fs| fs.delete(path))
    }

    pub fn exists(&self, path: &str) -> CoreResult<bool> {
        self.dispatch(Op::Stat, |fs| fs.exists(path))
    }
}
