//! SSH/SFTP-based remote FS adapter, grounded on
//! `examples/other_examples/manifests/NitronPlus-hostpilot` (a `ssh2`-based
//! multi-server file transfer CLI).

use std::io::{Read, Seek, SeekFrom, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Mutex;

use ssh2::Session;

use crate::config::SshConfig;
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::sync_ext::MutexExt;

use super::{DirEntry, ReadStream, RemoteFs, Stat, WriteStream};

/// Lazily-authenticated SSH/SFTP session. Reconnects on next use whenever a
/// liveness check (`stat(".")`) fails.
pub struct SshAdapter {
    config: SshConfig,
    session: Mutex<Option<Session>>,
}

impl SshAdapter {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    fn connect(&self) -> CoreResult<Session> {
        let addr = (self.config.host.as_str(), self.config.port);
        let tcp = TcpStream::connect(addr).map_err(|e| {
            CoreError::with_source(ErrorKind::ConnectionLost, "ssh tcp connect failed", e)
        })?;
        let mut session = Session::new().map_err(|e| {
            CoreError::with_source(ErrorKind::Fatal, "ssh session init failed", e)
        })?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| CoreError::with_source(ErrorKind::ConnectionLost, "ssh handshake failed", e))?;

        if let Some(key_path) = &self.config.private_key_path {
            session
                .userauth_pubkey_file(&self.config.username, None, Path::new(key_path), None)
                .map_err(|e| {
                    CoreError::with_source(ErrorKind::Fatal, "ssh pubkey auth failed", e)
                })?;
        } else if let Some(password) = &self.config.password {
            session
                .userauth_password(&self.config.username, password)
                .map_err(|e| {
                    CoreError::with_source(ErrorKind::Fatal, "ssh password auth failed", e)
                })?;
        }

        if !session.authenticated() {
            return Err(CoreError::new(ErrorKind::Fatal, "ssh authentication did not succeed"));
        }
        Ok(session)
    }

    /// Returns a live session, reconnecting if the cached one is absent or
    /// dead.
    fn session(&self) -> CoreResult<Session> {
        let mut guard = self.session.lock_unpoisoned();
        if let Some(session) = guard.as_ref() {
            if session.sftp().is_ok() {
                return Ok(session.clone());
            }
        }
        let fresh = self.connect()?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    fn sftp(&self) -> CoreResult<ssh2::Sftp> {
        self.session()?
            .sftp()
            .map_err(|e| CoreError::with_source(ErrorKind::ConnectionLost, "sftp channel failed", e))
    }

    fn map_sftp_err(err: ssh2::Error) -> CoreError {
        use ssh2::ErrorCode;
        let kind = match err.code() {
            ErrorCode::SFTP(2) => ErrorKind::NotFound, // LIBSSH2_FX_NO_SUCH_FILE
            ErrorCode::SFTP(3) => ErrorKind::Forbidden, // LIBSSH2_FX_PERMISSION_DENIED
            _ => ErrorKind::Transient,
        };
        CoreError::with_source(kind, "sftp operation failed", err)
    }
}

impl RemoteFs for SshAdapter {
    fn list(&self, path: &str) -> CoreResult<Vec<DirEntry>> {
        let sftp = self.sftp()?;
        let entries = sftp
            .readdir(Path::new(path))
            .map_err(Self::map_sftp_err)?;
        Ok(entries
            .into_iter()
            .filter_map(|(p, stat)| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                Some(DirEntry {
                    name,
                    is_dir: stat.is_dir(),
                    size: stat.size.unwrap_or(0),
                    mtime: stat.mtime.map(|v| v as i64),
                })
            })
            .collect())
    }

    fn stat(&self, path: &str) -> CoreResult<Stat> {
        let sftp = self.sftp()?;
        match sftp.stat(Path::new(path)) {
            Ok(stat) => Ok(Stat {
                size: stat.size.unwrap_or(0),
                mtime: stat.mtime.map(|v| v as i64),
                exists: true,
            }),
            Err(e) if e.code() == ssh2::ErrorCode::SFTP(2) => Ok(Stat {
                size: 0,
                mtime: None,
                exists: false,
            }),
            Err(e) => Err(Self::map_sftp_err(e)),
        }
    }

    fn open_read(&self, path: &str, offset: u64) -> CoreResult<Box<dyn ReadStream>> {
        let sftp = self.sftp()?;
        let mut handle = SftpHandle::open(sftp, Path::new(path), |sftp, p| sftp.open(p))
            .map_err(Self::map_sftp_err)?;
        if offset > 0 {
            handle.file_mut().seek(SeekFrom::Start(offset)).map_err(|e| {
                CoreError::with_source(ErrorKind::Transient, "sftp seek failed", e)
            })?;
        }
        Ok(Box::new(handle))
    }

    fn open_write(
        &self,
        path: &str,
        offset: u64,
        overwrite: bool,
    ) -> CoreResult<Box<dyn WriteStream>> {
        let sftp = self.sftp()?;
        let mut flags = ssh2::OpenFlags::WRITE | ssh2::OpenFlags::CREATE;
        if overwrite && offset == 0 {
            flags |= ssh2::OpenFlags::TRUNCATE;
        }
        let mut handle = SftpHandle::open(sftp, Path::new(path), move |sftp, p| {
            sftp.open_mode(p, flags, 0o644, ssh2::OpenType::File)
        })
        .map_err(Self::map_sftp_err)?;
        if offset > 0 {
            handle.file_mut().seek(SeekFrom::Start(offset)).map_err(|e| {
                CoreError::with_source(ErrorKind::Transient, "sftp seek failed", e)
            })?;
        }
        Ok(Box::new(handle))
    }

    fn rename(&self, src: &str, dst: &str) -> CoreResult<()> {
        let sftp = self.sftp()?;
        sftp.rename(Path::new(src), Path::new(dst), None)
            .map_err(Self::map_sftp_err)
    }

    fn delete(&self, path: &str) -> CoreResult<()> {
        let sftp = self.sftp()?;
        sftp.unlink(Path::new(path)).map_err(Self::map_sftp_err)
    }

    fn exists(&self, path: &str) -> CoreResult<bool> {
        Ok(self.stat(path)?.exists)
    }

    fn supports_write_resume(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "ssh"
    }
}

/// Owns an `ssh2::Sftp` channel alongside a `File` borrowed from it, so the
/// pair can be returned as a single boxed, non-lifetime-parameterized
/// stream. `ssh2::File<'sftp>` only borrows `Sftp` to keep the channel from
/// being dropped early; since `Sftp` is a handle onto a heap-allocated
/// libssh2 channel, its address is irrelevant to `File`'s validity, so the
/// lifetime can be soundly extended as long as `sftp` is never moved out of
/// this struct (the `Box` in `RemoteFs::open_read`/`open_write` guarantees
/// that).
struct SftpHandle {
    _sftp: Box<ssh2::Sftp>,
    file: ssh2::File<'static>,
}

impl SftpHandle {
    fn open(
        sftp: ssh2::Sftp,
        path: &Path,
        open: impl FnOnce(&ssh2::Sftp, &Path) -> Result<ssh2::File<'_>, ssh2::Error>,
    ) -> Result<Self, ssh2::Error> {
        let boxed = Box::new(sftp);
        let file = open(&boxed, path)?;
        // SAFETY: see struct doc comment.
        let file: ssh2::File<'static> = unsafe { std::mem::transmute(file) };
        Ok(Self { _sftp: boxed, file })
    }

    fn file_mut(&mut self) -> &mut ssh2::File<'static> {
        &mut self.file
    }
}

impl Read for SftpHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for SftpHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}
