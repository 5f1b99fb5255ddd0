//! Probe: a metadata-only invocation of the external video binary. Never
//! transcodes; returns null fields on timeout or parse failure rather than
//! aborting the caller.

use std::process::{Command, Stdio};
use std::time::Duration;

use serde::Deserialize;

use crate::domain::MediaInfo;
use crate::error::{CoreError, CoreResult, ErrorKind};

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeDocument {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

/// Runs `ffprobe_path` against `target` (a local path or an authenticated
/// remote URL), bounded by `timeout`. Returns a best-effort [`MediaInfo`]:
/// fields are `None`/zero rather than an error when a field can't be
/// parsed, but a failure to even run the binary or a timeout propagates as
/// a typed error so the caller can still write a file row with null probe
/// fields.
pub fn probe(ffprobe_path: &std::path::Path, target: &str, timeout: Duration) -> CoreResult<MediaInfo> {
    let mut child = Command::new(ffprobe_path)
        .args([
            "-v", "error",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
            target,
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CoreError::with_source(ErrorKind::Fatal, "failed to spawn ffprobe", e))?;

    let deadline = std::time::Instant::now() + timeout;
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| CoreError::with_source(ErrorKind::Fatal, "ffprobe wait failed", e))?
        {
            use std::io::Read;
            let mut stdout = String::new();
            if let Some(mut out) = child.stdout.take() {
                let _ = out.read_to_string(&mut stdout);
            }
            if !status.success() {
                return Err(CoreError::new(ErrorKind::Transient, "ffprobe exited with an error"));
            }
            return Ok(parse_probe_document(&stdout));
        }
        if std::time::Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CoreError::new(ErrorKind::Timeout, "ffprobe timed out"));
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn parse_probe_document(json: &str) -> MediaInfo {
    let Ok(doc) = serde_json::from_str::<ProbeDocument>(json) else {
        return MediaInfo::default();
    };

    let video_stream = doc.streams.iter().find(|s| s.codec_type.as_deref() == Some("video"));
    let audio_streams = doc
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("audio"))
        .count() as u32;
    let subtitle_streams = doc
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("subtitle"))
        .count() as u32;

    MediaInfo {
        duration_seconds: doc
            .format
            .as_ref()
            .and_then(|f| f.duration.as_ref())
            .and_then(|d| d.parse::<f64>().ok()),
        width: video_stream.and_then(|s| s.width),
        height: video_stream.and_then(|s| s.height),
        frame_rate: video_stream
            .and_then(|s| s.r_frame_rate.as_ref())
            .and_then(|r| parse_rational_fps(r)),
        bitrate_bps: doc
            .format
            .as_ref()
            .and_then(|f| f.bit_rate.as_ref())
            .and_then(|b| b.parse::<u64>().ok()),
        video_codec: video_stream.and_then(|s| s.codec_name.clone()),
        audio_streams,
        subtitle_streams,
        container: doc.format.and_then(|f| f.format_name),
    }
}

/// Evaluates a rational frame-rate string (`"30000/1001"` style)
/// arithmetically; never via `eval`.
fn parse_rational_fps(expr: &str) -> Option<f64> {
    match expr.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 { None } else { Some(num / den) }
        }
        None => expr.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fractional_frame_rate_expression() {
        assert_eq!(parse_rational_fps("30000/1001"), Some(30000.0 / 1001.0));
    }

    #[test]
    fn parses_plain_integer_frame_rate() {
        assert_eq!(parse_rational_fps("25"), Some(25.0));
    }

    #[test]
    fn zero_denominator_does_not_panic() {
        assert_eq!(parse_rational_fps("30/0"), None);
    }

    #[test]
    fn parses_full_probe_document() {
        let json = r#"{
            "format": {"duration": "120.500000", "bit_rate": "5000000", "format_name": "matroska,webm"},
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "r_frame_rate": "30000/1001"},
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "subtitle", "codec_name": "subrip"}
            ]
        }"#;
        let info = parse_probe_document(json);
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
        assert_eq!(info.width, Some(1920));
        assert_eq!(info.audio_streams, 1);
        assert_eq!(info.subtitle_streams, 1);
        assert_eq!(info.duration_seconds, Some(120.5));
    }

    #[test]
    fn malformed_json_yields_default_media_info_instead_of_panicking() {
        let info = parse_probe_document("not json");
        assert_eq!(info.video_codec, None);
        assert_eq!(info.duration_seconds, None);
    }
}
