//! Probe/encode adapter facade: the one type a stage
//! runner talks to, hiding the external-binary plumbing in `probe`/`encoder`.

mod config;
pub(crate) mod crash_marker;
mod encoder;
mod hwaccel;
mod probe;

pub use config::{derate_for_gpu_limit, AudioCodec, EncodeConfig, RateControl};
pub use crash_marker::CrashMarker;
pub use encoder::{EncodeOutcome, EncodeProgress, StopHandle};

use std::path::Path;
use std::time::Duration;

use crate::domain::MediaInfo;
use crate::error::CoreResult;

#[derive(Debug, Clone)]
pub struct VideoAdapterConfig {
    pub ffmpeg_path: std::path::PathBuf,
    pub ffprobe_path: std::path::PathBuf,
    pub local_probe_timeout: Duration,
    pub remote_probe_timeout: Duration,
}

/// Wraps the external ffmpeg/ffprobe binaries behind the probe/encode
/// surface the scheduler's encode stage runner calls.
pub struct VideoAdapter {
    config: VideoAdapterConfig,
    gpu_detected: once_cell::sync::OnceCell<bool>,
}

impl VideoAdapter {
    pub fn new(config: VideoAdapterConfig) -> Self {
        Self { config, gpu_detected: once_cell::sync::OnceCell::new() }
    }

    /// Whether a GPU encoder is usable on this host, detected once per
    /// process via a synthetic one-frame encode and memoized thereafter.
    pub fn gpu_available(&self) -> bool {
        *self
            .gpu_detected
            .get_or_init(|| hwaccel::probe_gpu_available(&self.config.ffmpeg_path))
    }

    /// Probes a local file, bounded by the local probe timeout.
    pub fn probe_local(&self, path: &Path) -> CoreResult<MediaInfo> {
        probe::probe(&self.config.ffprobe_path, &path.to_string_lossy(), self.config.local_probe_timeout)
    }

    /// Probes an authenticated remote URL, bounded by the remote probe
    /// timeout.
    pub fn probe_remote(&self, url: &str) -> CoreResult<MediaInfo> {
        probe::probe(&self.config.ffprobe_path, url, self.config.remote_probe_timeout)
    }

    /// Probes a remote URL with an explicit timeout override, for callers
    /// (the metadata cache's full-scan probe workers) that carry their own
    /// configured timeout rather than the adapter's default.
    pub fn probe_remote_bounded(&self, url: &str, timeout: Duration) -> CoreResult<MediaInfo> {
        probe::probe(&self.config.ffprobe_path, url, timeout)
    }

    pub fn encode(
        &self,
        input_path: &Path,
        output_path: &Path,
        marker_path: &Path,
        encode_config: &EncodeConfig,
        stop: &StopHandle,
        on_progress: impl FnMut(EncodeProgress),
    ) -> CoreResult<EncodeOutcome> {
        encoder::encode(
            &self.config.ffmpeg_path,
            &self.config.ffprobe_path,
            input_path,
            output_path,
            marker_path,
            encode_config,
            self.config.local_probe_timeout,
            stop,
            on_progress,
        )
    }
}
