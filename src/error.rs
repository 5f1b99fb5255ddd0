//! Error taxonomy shared by every adapter boundary.
//!
//! Adapters (remote FS, video probe/encoder, durable store) return
//! [`CoreError`] so stage runners can match on `.kind()` rather than string
//! content. Orchestration code (the scheduler, the CLI) composes these with
//! `anyhow::Context` to narrate `anyhow` errors on top of typed
//! lower-level failures.

use std::fmt;

/// The authoritative error kind set. Stage runners decide retry/fail/surface
/// based on this, never on error message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Timeout,
    ConnectionLost,
    Corrupt,
    Transient,
    Fatal,
    EncodeFailed,
    DiskSpace,
    FileLocked,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionLost => "connection_lost",
            ErrorKind::Corrupt => "corrupt",
            ErrorKind::Transient => "transient",
            ErrorKind::Fatal => "fatal",
            ErrorKind::EncodeFailed => "encode_failed",
            ErrorKind::DiskSpace => "disk_space",
            ErrorKind::FileLocked => "file_locked",
        };
        f.write_str(label)
    }
}

impl ErrorKind {
    /// Whether the Router/adapter should retry this kind within its own
    /// bounded attempts before surfacing to the caller (§7).
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Timeout | ErrorKind::ConnectionLost)
    }

    /// Whether this kind should latch an adapter read-only for writes (§4.2, §7).
    pub fn marks_read_only(self) -> bool {
        matches!(self, ErrorKind::Forbidden)
    }
}

/// A typed, contextual error carried across adapter boundaries.
#[derive(Debug)]
pub struct CoreError {
    kind: ErrorKind,
    message: String,
    #[allow(dead_code)]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
