//! Encode configuration enumeration.

use serde::{Deserialize, Serialize};

use crate::config::HardwareMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateControl {
    Cqp,
    Vbr,
    Cbr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    Copy,
    Aac,
    Opus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeConfig {
    pub hardware_mode: HardwareMode,
    pub preset: String,
    pub quality: u32,
    pub rate_control: RateControl,
    pub bitrate_kbps: Option<u32>,
    pub maxrate_kbps: Option<u32>,
    pub lookahead: Option<u32>,
    pub bframes: Option<u32>,
    pub b_ref_mode: Option<String>,
    pub spatial_aq: bool,
    pub temporal_aq: bool,
    pub aq_strength: Option<u32>,
    pub multipass: bool,
    pub two_pass: bool,
    pub audio_codec: AudioCodec,
    pub audio_bitrate_kbps: Option<u32>,
    pub profile: Option<String>,
    pub pixel_format: Option<String>,
    /// Percent of full GPU capability to target; <100 derates lookahead,
    /// bframes, and multipass per the GPU derating tiers below.
    pub gpu_limit_percent: u8,
    pub simulation_mode: bool,
    pub skip_same_codec: bool,
    pub target_codec: String,
}

/// Applies the `gpu_limit_percent` derating tiers.
/// Lower tiers trade lookahead/bframes/multipass for less GPU contention
/// when multiple encodes might compete for the same hardware encoder.
pub fn derate_for_gpu_limit(config: &mut EncodeConfig) {
    if config.gpu_limit_percent >= 100 {
        return;
    }
    let tier = config.gpu_limit_percent;
    config.lookahead = config.lookahead.map(|v| scale_down(v, tier));
    config.bframes = config.bframes.map(|v| scale_down(v, tier));
    if tier < 50 {
        config.multipass = false;
        config.two_pass = false;
    }
}

fn scale_down(value: u32, tier_percent: u8) -> u32 {
    ((value as u64 * tier_percent as u64) / 100).max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> EncodeConfig {
        EncodeConfig {
            hardware_mode: HardwareMode::Gpu,
            preset: "p4".into(),
            quality: 23,
            rate_control: RateControl::Vbr,
            bitrate_kbps: None,
            maxrate_kbps: None,
            lookahead: Some(20),
            bframes: Some(4),
            b_ref_mode: None,
            spatial_aq: true,
            temporal_aq: true,
            aq_strength: Some(8),
            multipass: true,
            two_pass: false,
            audio_codec: AudioCodec::Copy,
            audio_bitrate_kbps: None,
            profile: None,
            pixel_format: None,
            gpu_limit_percent: 100,
            simulation_mode: false,
            skip_same_codec: true,
            target_codec: "hevc".into(),
        }
    }

    #[test]
    fn full_gpu_limit_leaves_config_unchanged() {
        let mut config = base_config();
        derate_for_gpu_limit(&mut config);
        assert_eq!(config.lookahead, Some(20));
        assert!(config.multipass);
    }

    #[test]
    fn low_gpu_limit_scales_lookahead_and_disables_multipass() {
        let mut config = base_config();
        config.gpu_limit_percent = 25;
        derate_for_gpu_limit(&mut config);
        assert_eq!(config.lookahead, Some(5));
        assert_eq!(config.bframes, Some(1));
        assert!(!config.multipass);
    }
}
