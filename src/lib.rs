//! sharkoder: unattended bulk video transcoding over a remote library
//! (SSH/SFTP or HTTP), with a durable job queue, a pipelined
//! download/encode/upload scheduler, an approval gate, and a metadata cache
//! indexer.

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod metadata_cache;
pub mod remote_fs;
pub mod scheduler;
pub mod store;
pub(crate) mod sync_ext;
pub mod video;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::metadata_cache::MetadataCache;
use crate::remote_fs::{HttpAdapter, RemoteFs, SshAdapter, TransportRouter};
use crate::scheduler::Scheduler;
use crate::store::DurableStore;
use crate::video::{VideoAdapter, VideoAdapterConfig};

/// Everything a long-running `sharkoderd` process or a one-shot CLI
/// invocation needs, built from one [`Config`] snapshot.
pub struct App {
    pub store: Arc<DurableStore>,
    pub router: Arc<TransportRouter>,
    pub video: Arc<VideoAdapter>,
    pub scheduler: Scheduler,
    pub metadata_cache: MetadataCache,
}

impl App {
    /// Wires the durable store, transport router, video adapter, scheduler,
    /// and metadata cache from one config snapshot. Does not start the
    /// scheduler's stage-runner threads; call `scheduler.start()` for that.
    pub fn build(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(DurableStore::open(&config.jobs_db_path(), &config.cache_db_path())?);

        let http: Option<Box<dyn RemoteFs>> = match &config.http {
            Some(http_config) => Some(Box::new(HttpAdapter::new(http_config.clone())?)),
            None => None,
        };
        let ssh: Option<Box<dyn RemoteFs>> = config
            .ssh
            .clone()
            .map(|ssh_config| Box::new(SshAdapter::new(ssh_config)) as Box<dyn RemoteFs>);
        let router = Arc::new(TransportRouter::new(http, ssh));

        let video = Arc::new(VideoAdapter::new(VideoAdapterConfig {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            local_probe_timeout: Duration::from_secs(config.local_probe_timeout_seconds),
            remote_probe_timeout: Duration::from_secs(config.remote_probe_timeout_seconds),
        }));

        let scheduler = Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&router),
            Arc::clone(&video),
            config.clone(),
        )?;

        let root = config
            .ssh
            .as_ref()
            .map(|c| c.root_path.clone())
            .or_else(|| config.http.as_ref().map(|_| String::from("/")))
            .unwrap_or_else(|| String::from("/"));

        let probe_url = probe_url_builder(&config);
        let metadata_cache = MetadataCache::new(
            Arc::clone(&store),
            Arc::clone(&router),
            Arc::clone(&video),
            probe_url,
            root,
            config.probe_workers,
            Duration::from_secs(config.remote_probe_timeout_seconds),
        );

        Ok(Self { store, router, video, scheduler, metadata_cache })
    }
}

/// Builds the URL the probe adapter invokes ffprobe against for a given
/// remote path. HTTP libraries probe the base URL directly; SSH/SFTP
/// libraries are probed over SFTP via the local ffprobe's `sftp://` input
/// support, so no download is required either way.
fn probe_url_builder(config: &Config) -> metadata_cache::ProbeUrlBuilder {
    if let Some(http) = &config.http {
        let base = http.base_url.trim_end_matches('/').to_string();
        return Arc::new(move |path: &str| format!("{base}{path}"));
    }
    if let Some(ssh) = &config.ssh {
        let user = ssh.username.clone();
        let host = ssh.host.clone();
        let port = ssh.port;
        return Arc::new(move |path: &str| format!("sftp://{user}@{host}:{port}{path}"));
    }
    Arc::new(|path: &str| path.to_string())
}
