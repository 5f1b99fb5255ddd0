//! One-time GPU availability detection for `hardware_mode: auto`.

use std::path::Path;
use std::process::{Command, Stdio};

/// Runs a one-frame synthetic NVENC encode and reports whether it succeeded.
/// Cheap enough to run once per process; callers memoize the result.
pub fn probe_gpu_available(ffmpeg_path: &Path) -> bool {
    Command::new(ffmpeg_path)
        .args([
            "-v", "error",
            "-f", "lavfi",
            "-i", "color=c=black:s=64x64:d=0.1",
            "-frames:v", "1",
            "-c:v", "hevc_nvenc",
            "-f", "null",
            "-",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
