//! Encode stage runner: the singleton encoder slot.
//! Claims the oldest `ready_encode` job, builds an [`EncodeConfig`] from the
//! configured defaults and `hardware_mode`, and runs it through
//! [`VideoAdapter::encode`].

use crate::config::HardwareMode;
use crate::domain::{Job, JobStatus};
use crate::sync_ext::MutexExt;
use crate::video::{AudioCodec, EncodeConfig, RateControl, StopHandle};

use super::super::state::Inner;
use super::{download_scratch_path, encode_scratch_path, now_ms};

pub fn try_claim_and_encode(inner: &Inner) -> anyhow::Result<bool> {
    let Some((job, stop)) = claim_next(inner)? else {
        return Ok(false);
    };

    let input_path = download_scratch_path(&inner.config.download_scratch_dir(), &job);
    let output_path = encode_scratch_path(&inner.config.encode_scratch_dir(), &job);
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let marker_path = inner.config.crash_marker_path();
    let encode_config = build_encode_config(inner);

    let store = inner.store.clone();
    let mut progress_job = job.clone();
    let outcome = inner.video.encode(&input_path, &output_path, &marker_path, &encode_config, &stop, move |p| {
        progress_job.progress = p.percent;
        progress_job.eta_seconds = p.eta_seconds;
        let _ = store.update_job_progress_throttled(&progress_job);
    });

    finish(inner, job, input_path, output_path, outcome)?;
    Ok(true)
}

fn claim_next(inner: &Inner) -> anyhow::Result<Option<(Job, StopHandle)>> {
    let mut state = inner.state.lock_unpoisoned();
    if !state.running || state.paused || state.shutting_down {
        return Ok(None);
    }
    if state.encoding_job.is_some() {
        return Ok(None);
    }
    let Some(mut job) = inner.store.list_jobs_by_status(JobStatus::ReadyEncode)?.into_iter().next() else {
        return Ok(None);
    };

    job.status = JobStatus::Encoding;
    job.started_at_ms = Some(now_ms());
    inner.store.update_job(&job)?;

    let stop = StopHandle::new();
    state.encoding_job = Some(job.id);
    state.encode_stop_handles.insert(job.id, stop.clone());
    Ok(Some((job, stop)))
}

/// Maps `hardware_mode` to the ffmpeg encoder name and the configured
/// defaults onto an [`EncodeConfig`], applying GPU-limit derating.
fn build_encode_config(inner: &Inner) -> EncodeConfig {
    let defaults = &inner.config.encode;
    let target_codec = match defaults.hardware_mode {
        HardwareMode::Gpu => "hevc_nvenc".to_string(),
        HardwareMode::Cpu => "libx265".to_string(),
        HardwareMode::Auto => {
            if inner.video.gpu_available() {
                "hevc_nvenc".to_string()
            } else {
                "libx265".to_string()
            }
        }
    };
    let audio_codec = match defaults.audio_codec.as_str() {
        "aac" => AudioCodec::Aac,
        "opus" => AudioCodec::Opus,
        _ => AudioCodec::Copy,
    };

    let mut config = EncodeConfig {
        hardware_mode: defaults.hardware_mode,
        preset: defaults.preset.clone(),
        quality: defaults.quality,
        rate_control: RateControl::Vbr,
        bitrate_kbps: None,
        maxrate_kbps: None,
        lookahead: Some(20),
        bframes: Some(4),
        b_ref_mode: None,
        spatial_aq: true,
        temporal_aq: true,
        aq_strength: None,
        multipass: true,
        two_pass: false,
        audio_codec,
        audio_bitrate_kbps: None,
        profile: None,
        pixel_format: None,
        gpu_limit_percent: defaults.gpu_limit_percent,
        simulation_mode: defaults.simulation_mode,
        skip_same_codec: defaults.skip_same_codec,
        target_codec,
    };
    crate::video::derate_for_gpu_limit(&mut config);
    config
}

fn finish(
    inner: &Inner,
    mut job: Job,
    input_path: std::path::PathBuf,
    output_path: std::path::PathBuf,
    outcome: crate::error::CoreResult<crate::video::EncodeOutcome>,
) -> anyhow::Result<()> {
    {
        let mut state = inner.state.lock_unpoisoned();
        state.encoding_job = None;
        state.encode_stop_handles.remove(&job.id);
    }

    match outcome {
        Ok(result) => {
            let input_size = std::fs::metadata(&input_path).map(|m| m.len()).unwrap_or(0);
            let output_size = std::fs::metadata(&output_path).map(|m| m.len()).unwrap_or(u64::MAX);

            if inner.config.encode.block_larger_encoded && output_size > input_size && input_size > 0 {
                let pct = (output_size as f64 / input_size as f64 - 1.0) * 100.0;
                job.status = JobStatus::Failed;
                job.failure_message = Some(format!(
                    "encoded output ({output_size} bytes, +{pct:.1}%) is not smaller than input ({input_size} bytes); both kept for inspection"
                ));
                job.finished_at_ms = Some(now_ms());
            } else {
                job.codec_before = result.input_info.video_codec.clone();
                job.codec_after = result.output_info.video_codec.clone();
                job.media_info = Some(result.output_info);
                job.progress = 100.0;
                job.status = if job.pause_before_upload {
                    JobStatus::AwaitingApproval
                } else {
                    JobStatus::ReadyUpload
                };
            }
        }
        Err(err) => {
            let _ = std::fs::remove_file(&output_path);
            job.status = JobStatus::Failed;
            job.failure_message = Some(err.to_string());
            job.finished_at_ms = Some(now_ms());
        }
    }

    inner.store.update_job(&job)?;
    inner.cv.notify_all();
    Ok(())
}
