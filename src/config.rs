//! Immutable configuration snapshot.
//!
//! Loading/watching `sharkoder.config.json` from disk is out of scope for
//! this type; it is what the core receives at adapter construct time and
//! at job-claim time. "Reload" is modeled externally as
//! discard-adapter-and-rebuild-from-a-new-snapshot.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub private_key_path: Option<PathBuf>,
    pub root_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HardwareMode {
    Gpu,
    Cpu,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeDefaults {
    pub hardware_mode: HardwareMode,
    pub preset: String,
    pub quality: u32,
    pub audio_codec: String,
    pub skip_same_codec: bool,
    pub simulation_mode: bool,
    pub block_larger_encoded: bool,
    pub gpu_limit_percent: u8,
    pub release_tag: Option<String>,
}

impl Default for EncodeDefaults {
    fn default() -> Self {
        Self {
            hardware_mode: HardwareMode::Auto,
            preset: "medium".to_string(),
            quality: 23,
            audio_codec: "copy".to_string(),
            skip_same_codec: true,
            simulation_mode: false,
            block_larger_encoded: true,
            gpu_limit_percent: 100,
            release_tag: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub data_root: PathBuf,
    pub ssh: Option<SshConfig>,
    pub http: Option<HttpConfig>,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub max_downloads: usize,
    pub max_uploads: usize,
    pub probe_workers: usize,
    pub remote_probe_timeout_seconds: u64,
    pub local_probe_timeout_seconds: u64,
    pub connection_timeout_seconds: u64,
    pub keep_original: bool,
    pub keep_encoded: bool,
    pub backups_enabled: bool,
    pub encode: EncodeDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("."),
            ssh: None,
            http: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            max_downloads: 1,
            max_uploads: 1,
            probe_workers: 10,
            remote_probe_timeout_seconds: 10,
            local_probe_timeout_seconds: 30,
            connection_timeout_seconds: 30,
            keep_original: false,
            keep_encoded: false,
            backups_enabled: true,
            encode: EncodeDefaults::default(),
        }
    }
}

impl Config {
    pub fn jobs_db_path(&self) -> PathBuf {
        self.data_root.join("jobs.db")
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.data_root.join("cache.db")
    }

    pub fn crash_marker_path(&self) -> PathBuf {
        self.data_root.join(".encoding_state.json")
    }

    pub fn download_scratch_dir(&self) -> PathBuf {
        self.data_root.join("temp").join("downloaded")
    }

    pub fn encode_scratch_dir(&self) -> PathBuf {
        self.data_root.join("temp").join("encoded")
    }

    pub fn backup_originals_dir(&self) -> PathBuf {
        self.data_root.join("backup").join("originals")
    }

    pub fn backup_encoded_dir(&self) -> PathBuf {
        self.data_root.join("backup").join("encoded")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_root.join("logs")
    }
}
