//! Encode invocation, progress parsing, and ETA.
//!
//! Spawn/poll pattern: piped stdin/stderr, a dedicated stderr-pump thread,
//! a 50ms poll loop, cooperative stop via a stop handle.
//! Progress-line parsing prefers frame counts over timestamps when both are
//! available, since `-progress` timestamps can stall on some containers
//! while the frame counter keeps advancing.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::{CoreError, CoreResult, ErrorKind};

use super::config::{AudioCodec, EncodeConfig, RateControl};
use super::crash_marker::{self, CrashMarker};
use super::probe;

/// One encode progress sample: `progress(percent, currentTime, fps, eta,
/// framesDone, framesTotal)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EncodeProgress {
    pub percent: f64,
    pub current_time_seconds: f64,
    pub fps: Option<f64>,
    pub eta_seconds: Option<u64>,
    pub frames_done: Option<u64>,
    pub frames_total: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct EncodeOutcome {
    pub elapsed: Duration,
    pub input_info: crate::domain::MediaInfo,
    pub output_info: crate::domain::MediaInfo,
    pub effective_params: EncodeConfig,
}

/// Cooperative stop handle: setting this requests a graceful shutdown of
/// the active encode; [`encode`] escalates to a hard kill after 3s if the
/// child hasn't exited.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Idempotent: calling this more than once has no additional effect.
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Runs one encode of `input_path` to `output_path` under `config`,
/// reporting [`EncodeProgress`] samples through `on_progress`.
///
/// Implements two shortcuts around the real encoder invocation:
/// `simulation_mode` copies the input through unchanged and reports the
/// input codec with a `(simulation)` suffix; `skip_same_codec` copies
/// through without invoking the encoder when the input codec already
/// matches `config.target_codec`.
pub fn encode(
    ffmpeg_path: &std::path::Path,
    ffprobe_path: &std::path::Path,
    input_path: &std::path::Path,
    output_path: &std::path::Path,
    marker_path: &std::path::Path,
    config: &EncodeConfig,
    probe_timeout: Duration,
    stop: &StopHandle,
    mut on_progress: impl FnMut(EncodeProgress),
) -> CoreResult<EncodeOutcome> {
    let start = Instant::now();
    let input_info = probe::probe(ffprobe_path, &input_path.to_string_lossy(), probe_timeout)
        .unwrap_or_default();

    let started_at_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let marker = CrashMarker {
        input_path: input_path.to_path_buf(),
        output_path: output_path.to_path_buf(),
        started_at_ms,
    };
    crash_marker::write(marker_path, &marker)
        .map_err(|e| CoreError::new(ErrorKind::Fatal, format!("failed to write crash marker: {e}")))?;

    let same_codec = input_info
        .video_codec
        .as_deref()
        .is_some_and(|c| codec_family_matches(c, &config.target_codec));

    let result = if config.simulation_mode {
        copy_through(input_path, output_path).map(|_| {
            let mut info = input_info.clone();
            info.video_codec = info.video_codec.map(|c| format!("{c} (simulation)"));
            info
        })
    } else if config.skip_same_codec && same_codec {
        copy_through(input_path, output_path).map(|_| input_info.clone())
    } else {
        run_ffmpeg(
            ffmpeg_path,
            input_path,
            output_path,
            config,
            &input_info,
            stop,
            &mut on_progress,
        )
    };

    let _ = crash_marker::clear(marker_path);

    match result {
        Ok(_) => {
            let output_info = probe::probe(ffprobe_path, &output_path.to_string_lossy(), probe_timeout)
                .unwrap_or_default();
            Ok(EncodeOutcome {
                elapsed: start.elapsed(),
                input_info,
                output_info,
                effective_params: config.clone(),
            })
        }
        Err(err) => {
            let _ = std::fs::remove_file(output_path);
            Err(err)
        }
    }
}

/// Compares codec *families* rather than literal strings, since
/// `target_codec` is the actual ffmpeg encoder name (e.g. `hevc_nvenc`,
/// `libx265`) while ffprobe reports the bare codec name (e.g. `hevc`).
fn codec_family_matches(input_codec: &str, target_codec: &str) -> bool {
    normalize_codec_family(input_codec) == normalize_codec_family(target_codec)
}

fn normalize_codec_family(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.contains("265") || lower.contains("hevc") {
        "hevc"
    } else if lower.contains("264") || lower.contains("avc") {
        "h264"
    } else if lower.contains("vp9") {
        "vp9"
    } else if lower.contains("av1") {
        "av1"
    } else if lower.contains("vp8") {
        "vp8"
    } else {
        "unknown"
    }
}

fn copy_through(input_path: &std::path::Path, output_path: &std::path::Path) -> CoreResult<()> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CoreError::with_source(ErrorKind::Fatal, "failed to create output dir", e))?;
    }
    std::fs::copy(input_path, output_path)
        .map_err(|e| CoreError::with_source(ErrorKind::EncodeFailed, "simulation/skip copy failed", e))?;
    Ok(())
}

fn run_ffmpeg(
    ffmpeg_path: &std::path::Path,
    input_path: &std::path::Path,
    output_path: &std::path::Path,
    config: &EncodeConfig,
    input_info: &crate::domain::MediaInfo,
    stop: &StopHandle,
    on_progress: &mut impl FnMut(EncodeProgress),
) -> CoreResult<()> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CoreError::with_source(ErrorKind::Fatal, "failed to create output dir", e))?;
    }
    let tmp_output = output_path.with_extension("tmp.encoding");
    let args = build_ffmpeg_args(input_path, &tmp_output, config);

    let mut child = Command::new(ffmpeg_path)
        .args(&args)
        .stdin(Stdio::piped())
        .stderr(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()
        .map_err(|e| CoreError::with_source(ErrorKind::Fatal, "failed to spawn ffmpeg", e))?;

    let mut child_stdin = child.stdin.take();
    let mut pump = StderrPump::spawn(&mut child);
    let poll = Duration::from_millis(50);
    let total_duration = input_info.duration_seconds;
    let total_frames = total_duration
        .zip(input_info.frame_rate)
        .map(|(d, fps)| (d * fps).round() as u64);

    let mut quit_sent_at: Option<Instant> = None;
    let status = loop {
        if stop.is_requested() && quit_sent_at.is_none() {
            send_graceful_quit(&mut child_stdin);
            quit_sent_at = Some(Instant::now());
        }
        if let Some(sent_at) = quit_sent_at {
            if sent_at.elapsed() >= Duration::from_secs(3) {
                let _ = child.kill();
            }
        }

        if let Some(line) = pump.recv_timeout(poll) {
            if let Some(sample) = parse_progress_sample(&line, total_duration, total_frames) {
                on_progress(sample);
            }
        }

        if let Some(status) = child
            .try_wait()
            .map_err(|e| CoreError::with_source(ErrorKind::Fatal, "ffmpeg wait failed", e))?
        {
            pump.join();
            break status;
        }
    };

    if stop.is_requested() {
        let _ = std::fs::remove_file(&tmp_output);
        return Err(CoreError::new(ErrorKind::EncodeFailed, "encode stopped"));
    }

    if !status.success() {
        let _ = std::fs::remove_file(&tmp_output);
        let reason = status
            .code()
            .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {c}"));
        return Err(CoreError::new(ErrorKind::EncodeFailed, format!("ffmpeg failed: {reason}")));
    }

    std::fs::rename(&tmp_output, output_path)
        .map_err(|e| CoreError::with_source(ErrorKind::Fatal, "failed to rename encoded output", e))?;
    Ok(())
}

fn send_graceful_quit(stdin: &mut Option<std::process::ChildStdin>) {
    use std::io::Write;
    if let Some(stdin) = stdin.as_mut() {
        let _ = stdin.write_all(b"q\n");
        let _ = stdin.flush();
    }
}

fn build_ffmpeg_args(
    input_path: &std::path::Path,
    tmp_output: &std::path::Path,
    config: &EncodeConfig,
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        input_path.to_string_lossy().into_owned(),
        "-c:v".to_string(),
        config.target_codec.clone(),
        "-preset".to_string(),
        config.preset.clone(),
    ];

    match config.rate_control {
        RateControl::Cqp => {
            args.push("-rc".to_string());
            args.push("constqp".to_string());
            args.push("-cq".to_string());
            args.push(config.quality.to_string());
        }
        RateControl::Vbr => {
            args.push("-rc".to_string());
            args.push("vbr".to_string());
            args.push("-cq".to_string());
            args.push(config.quality.to_string());
            if let Some(bitrate) = config.bitrate_kbps {
                args.push("-b:v".to_string());
                args.push(format!("{bitrate}k"));
            }
            if let Some(maxrate) = config.maxrate_kbps {
                args.push("-maxrate".to_string());
                args.push(format!("{maxrate}k"));
            }
        }
        RateControl::Cbr => {
            args.push("-rc".to_string());
            args.push("cbr".to_string());
            if let Some(bitrate) = config.bitrate_kbps {
                args.push("-b:v".to_string());
                args.push(format!("{bitrate}k"));
            }
        }
    }

    if let Some(lookahead) = config.lookahead {
        args.push("-rc-lookahead".to_string());
        args.push(lookahead.to_string());
    }
    if let Some(bframes) = config.bframes {
        args.push("-bf".to_string());
        args.push(bframes.to_string());
    }
    if let Some(b_ref_mode) = &config.b_ref_mode {
        args.push("-b_ref_mode".to_string());
        args.push(b_ref_mode.clone());
    }
    if config.spatial_aq {
        args.push("-spatial_aq".to_string());
        args.push("1".to_string());
    }
    if config.temporal_aq {
        args.push("-temporal_aq".to_string());
        args.push("1".to_string());
    }
    if let Some(aq_strength) = config.aq_strength {
        args.push("-aq-strength".to_string());
        args.push(aq_strength.to_string());
    }
    if config.multipass {
        args.push("-multipass".to_string());
        args.push("qres".to_string());
    }
    if config.two_pass {
        args.push("-2pass".to_string());
        args.push("1".to_string());
    }
    if let Some(profile) = &config.profile {
        args.push("-profile:v".to_string());
        args.push(profile.clone());
    }
    if let Some(pixel_format) = &config.pixel_format {
        args.push("-pix_fmt".to_string());
        args.push(pixel_format.clone());
    }

    match config.audio_codec {
        AudioCodec::Copy => {
            args.push("-c:a".to_string());
            args.push("copy".to_string());
        }
        AudioCodec::Aac | AudioCodec::Opus => {
            args.push("-c:a".to_string());
            args.push(if config.audio_codec == AudioCodec::Aac { "aac" } else { "libopus" }.to_string());
            if let Some(audio_bitrate) = config.audio_bitrate_kbps {
                args.push("-b:a".to_string());
                args.push(format!("{audio_bitrate}k"));
            }
        }
    }

    args.push("-progress".to_string());
    args.push("pipe:2".to_string());
    args.push("-nostats".to_string());
    args.push(tmp_output.to_string_lossy().into_owned());
    args
}

struct StderrPump {
    rx: Option<Receiver<String>>,
    join: Option<JoinHandle<()>>,
}

impl StderrPump {
    fn spawn(child: &mut Child) -> Self {
        let Some(stderr) = child.stderr.take() else {
            return Self { rx: None, join: None };
        };
        let (tx, rx) = mpsc::channel::<String>();
        let join = std::thread::spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });
        Self { rx: Some(rx), join: Some(join) }
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Option<String> {
        let rx = self.rx.as_ref()?;
        rx.recv_timeout(timeout).ok()
    }

    fn join(&mut self) {
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

/// Parses one `-progress pipe:2` key=value line into a running
/// [`EncodeProgress`] sample. ffmpeg emits one key per line and repeats the
/// whole key set every ~0.5s ending in `progress=continue`/`progress=end`;
/// this function is called once per line and only returns `Some` on the
/// line that reports `out_time`/`frame`, letting the caller accumulate the
/// rest from the most recent sample it already has.
fn parse_progress_sample(
    line: &str,
    total_duration: Option<f64>,
    total_frames: Option<u64>,
) -> Option<EncodeProgress> {
    let (key, value) = line.split_once('=')?;
    let elapsed_from = |v: &str| -> Option<f64> {
        if let Some(rest) = v.strip_suffix("us") {
            return rest.parse::<f64>().ok().map(|us| us / 1_000_000.0);
        }
        v.parse::<f64>().ok().map(|us| us / 1_000_000.0)
    };

    match key {
        "frame" => {
            let frames_done = value.trim().parse::<u64>().ok()?;
            let percent = match total_frames {
                Some(total) if total > 0 => (frames_done as f64 / total as f64 * 100.0).clamp(0.0, 100.0),
                _ => 0.0,
            };
            Some(EncodeProgress {
                percent,
                current_time_seconds: 0.0,
                fps: None,
                eta_seconds: None,
                frames_done: Some(frames_done),
                frames_total: total_frames,
            })
        }
        "out_time_us" | "out_time_ms" => {
            let elapsed = elapsed_from(value.trim())?;
            let percent = match total_duration {
                Some(total) if total > 0.0 => (elapsed / total * 100.0).clamp(0.0, 100.0),
                _ => 0.0,
            };
            let eta = estimate_eta(elapsed, percent);
            Some(EncodeProgress {
                percent,
                current_time_seconds: elapsed,
                fps: None,
                eta_seconds: eta,
                frames_done: None,
                frames_total: total_frames,
            })
        }
        "fps" => {
            let fps = value.trim().parse::<f64>().ok()?;
            Some(EncodeProgress {
                percent: 0.0,
                current_time_seconds: 0.0,
                fps: Some(fps),
                eta_seconds: None,
                frames_done: None,
                frames_total: total_frames,
            })
        }
        _ => None,
    }
}

/// ETA is only meaningful once the encode has run long enough to form a
/// stable rate estimate, so it is gated on ≥5s elapsed and ≥0.1% progress
/// and bounded to ≤48h.
fn estimate_eta(elapsed_seconds: f64, percent: f64) -> Option<u64> {
    if elapsed_seconds < 5.0 || percent < 0.1 || percent >= 100.0 {
        return None;
    }
    let total_estimated = elapsed_seconds / (percent / 100.0);
    let remaining = total_estimated - elapsed_seconds;
    if !remaining.is_finite() || remaining < 0.0 {
        return None;
    }
    let bounded = remaining.min(48.0 * 3600.0);
    Some(bounded.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_line_computes_percent_from_frame_counts() {
        let sample = parse_progress_sample("frame=50", None, Some(100)).unwrap();
        assert_eq!(sample.frames_done, Some(50));
        assert_eq!(sample.percent, 50.0);
    }

    #[test]
    fn out_time_line_falls_back_to_timestamp_percent_without_frame_totals() {
        let sample = parse_progress_sample("out_time_us=30000000", Some(60.0), None).unwrap();
        assert_eq!(sample.current_time_seconds, 30.0);
        assert_eq!(sample.percent, 50.0);
    }

    #[test]
    fn eta_is_none_before_five_seconds_elapsed() {
        assert_eq!(estimate_eta(2.0, 50.0), None);
    }

    #[test]
    fn eta_is_none_below_tenth_percent_progress() {
        assert_eq!(estimate_eta(10.0, 0.01), None);
    }

    #[test]
    fn eta_is_bounded_to_forty_eight_hours() {
        let eta = estimate_eta(10.0, 0.001_f64.max(0.11)).unwrap_or(0);
        assert!(eta <= 48 * 3600);
    }

    #[test]
    fn eta_estimates_remaining_time_from_current_rate() {
        // 10s elapsed at 50% progress implies another 10s remaining.
        let eta = estimate_eta(10.0, 50.0).unwrap();
        assert_eq!(eta, 10);
    }

    #[test]
    fn unrecognized_key_yields_no_sample() {
        assert!(parse_progress_sample("bitrate=128kbits/s", None, None).is_none());
    }

    #[test]
    fn codec_family_matches_gpu_encoder_name_against_bare_probe_codec() {
        assert!(codec_family_matches("hevc", "hevc_nvenc"));
        assert!(codec_family_matches("h264", "libx264"));
        assert!(!codec_family_matches("h264", "hevc_nvenc"));
    }
}
