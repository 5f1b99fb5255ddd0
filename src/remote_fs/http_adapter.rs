//! HTTP-based remote FS adapter, built on `reqwest::blocking`. WebDAV-flavored
//! verbs model the transport: `PROPFIND` for listing, `GET`/`PUT`/`DELETE`/
//! `MOVE` for everything else.
//!
//! No partial-upload resume: `open_write` ignores a nonzero `offset` unless
//! `overwrite` is false, in which case it is rejected as unsupported.

use std::io::{Cursor, Read, Write};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::{header, StatusCode};

use crate::config::HttpConfig;
use crate::error::{CoreError, CoreResult, ErrorKind};

use super::{DirEntry, ReadStream, RemoteFs, Stat, WriteStream};

pub struct HttpAdapter {
    config: HttpConfig,
    client: Client,
}

impl HttpAdapter {
    pub fn new(config: HttpConfig) -> CoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| CoreError::with_source(ErrorKind::Fatal, "http client build failed", e))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn map_status(status: StatusCode) -> ErrorKind {
        match status {
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => ErrorKind::Forbidden,
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Timeout,
            s if s.is_server_error() => ErrorKind::Transient,
            _ => ErrorKind::Fatal,
        }
    }

    fn authed(&self, builder: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.config.username {
            Some(username) => builder.basic_auth(username, self.config.password.as_ref()),
            None => builder,
        }
    }
}

impl RemoteFs for HttpAdapter {
    fn list(&self, path: &str) -> CoreResult<Vec<DirEntry>> {
        let request = self
            .authed(self.client.request(
                reqwest::Method::from_bytes(b"PROPFIND").expect("static method literal"),
                self.url(path),
            ))
            .header("Depth", "1");
        let response = request.send().map_err(|e| {
            CoreError::with_source(ErrorKind::ConnectionLost, "http propfind failed", e)
        })?;
        if !response.status().is_success() {
            return Err(CoreError::new(
                Self::map_status(response.status()),
                format!("propfind returned {}", response.status()),
            ));
        }
        let body = response
            .text()
            .map_err(|e| CoreError::with_source(ErrorKind::Transient, "propfind body read failed", e))?;
        Ok(parse_propfind_listing(&body))
    }

    fn stat(&self, path: &str) -> CoreResult<Stat> {
        let response = self
            .authed(self.client.head(self.url(path)))
            .send()
            .map_err(|e| CoreError::with_source(ErrorKind::ConnectionLost, "http head failed", e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Stat {
                size: 0,
                mtime: None,
                exists: false,
            });
        }
        if !response.status().is_success() {
            return Err(CoreError::new(
                Self::map_status(response.status()),
                format!("head returned {}", response.status()),
            ));
        }
        let size = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let mtime = response
            .headers()
            .get(header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| chrono::DateTime::parse_from_rfc2822(v).ok())
            .map(|t| t.timestamp());
        Ok(Stat {
            size,
            mtime,
            exists: true,
        })
    }

    fn open_read(&self, path: &str, offset: u64) -> CoreResult<Box<dyn ReadStream>> {
        let mut builder = self.authed(self.client.get(self.url(path)));
        if offset > 0 {
            builder = builder.header(header::RANGE, format!("bytes={offset}-"));
        }
        let response = builder
            .send()
            .map_err(|e| CoreError::with_source(ErrorKind::ConnectionLost, "http get failed", e))?;
        if !response.status().is_success() {
            return Err(CoreError::new(
                Self::map_status(response.status()),
                format!("get returned {}", response.status()),
            ));
        }
        let bytes = response
            .bytes()
            .map_err(|e| CoreError::with_source(ErrorKind::Transient, "http body read failed", e))?;
        Ok(Box::new(Cursor::new(bytes.to_vec())))
    }

    fn open_write(
        &self,
        path: &str,
        offset: u64,
        overwrite: bool,
    ) -> CoreResult<Box<dyn WriteStream>> {
        if offset > 0 {
            return Err(CoreError::new(
                ErrorKind::Fatal,
                "http-based adapter does not support resumable writes",
            ));
        }
        Ok(Box::new(HttpUploadBuffer {
            adapter_url: self.url(path),
            client: self.client.clone(),
            username: self.config.username.clone(),
            password: self.config.password.clone(),
            overwrite,
            buffer: Vec::new(),
        }))
    }

    fn rename(&self, src: &str, dst: &str) -> CoreResult<()> {
        let response = self
            .authed(self.client.request(
                reqwest::Method::from_bytes(b"MOVE").expect("static method literal"),
                self.url(src),
            ))
            .header("Destination", self.url(dst))
            .header("Overwrite", "T")
            .send()
            .map_err(|e| CoreError::with_source(ErrorKind::ConnectionLost, "http move failed", e))?;
        if !response.status().is_success() {
            return Err(CoreError::new(
                Self::map_status(response.status()),
                format!("move returned {}", response.status()),
            ));
        }
        Ok(())
    }

    fn delete(&self, path: &str) -> CoreResult<()> {
        let response = self
            .authed(self.client.delete(self.url(path)))
            .send()
            .map_err(|e| CoreError::with_source(ErrorKind::ConnectionLost, "http delete failed", e))?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(CoreError::new(
                Self::map_status(response.status()),
                format!("delete returned {}", response.status()),
            ));
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> CoreResult<bool> {
        Ok(self.stat(path)?.exists)
    }

    fn supports_write_resume(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Buffers the full file in memory, then issues a single `PUT` on
/// `flush`/`drop`. Callers are expected to write to a `.tmp.<ts>` sibling
/// path and rename via [`RemoteFs::rename`] themselves once the upload
/// succeeds, so a crash mid-transfer never leaves a partial file at the
/// final path.
struct HttpUploadBuffer {
    adapter_url: String,
    client: Client,
    username: Option<String>,
    password: Option<String>,
    overwrite: bool,
    buffer: Vec<u8>,
}

impl Write for HttpUploadBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut builder = self.client.put(&self.adapter_url);
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_ref());
        }
        if !self.overwrite {
            builder = builder.header(header::IF_NONE_MATCH, "*");
        }
        let response = builder
            .body(std::mem::take(&mut self.buffer))
            .send()
            .map_err(std::io::Error::other)?;
        if !response.status().is_success() {
            return Err(std::io::Error::other(format!(
                "http put returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

impl Drop for HttpUploadBuffer {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Minimal WebDAV multistatus parser: extracts `<D:href>` text nodes as
/// entry names. Real servers' XML is more elaborate; this covers the shape
/// emitted by common WebDAV gateways used as the "HTTP-based" transport.
fn parse_propfind_listing(body: &str) -> Vec<DirEntry> {
    let mut entries = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("<D:href>").or_else(|| rest.find("<d:href>")) {
        let after = &rest[start + "<D:href>".len()..];
        let Some(end) = after.find("</D:href>").or_else(|| after.find("</d:href>")) else {
            break;
        };
        let href = after[..end].trim();
        if let Some(name) = href.rsplit('/').find(|s| !s.is_empty()) {
            entries.push(DirEntry {
                name: name.to_string(),
                is_dir: href.ends_with('/'),
                size: 0,
                mtime: None,
            });
        }
        rest = &after[end..];
    }
    // The collection itself is always the first `href`; drop it so only
    // children remain.
    if !entries.is_empty() {
        entries.remove(0);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propfind_listing_skips_the_collection_itself() {
        let body = r#"<?xml version="1.0"?>
        <D:multistatus xmlns:D="DAV:">
          <D:response><D:href>/media/</D:href></D:response>
          <D:response><D:href>/media/a.mkv</D:href></D:response>
          <D:response><D:href>/media/sub/</D:href></D:response>
        </D:multistatus>"#;
        let entries = parse_propfind_listing(body);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.mkv");
        assert!(!entries[0].is_dir);
        assert_eq!(entries[1].name, "sub");
        assert!(entries[1].is_dir);
    }
}
