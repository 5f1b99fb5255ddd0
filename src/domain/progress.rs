use serde::{Deserialize, Serialize};

/// Which pipeline stage a progress event originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Encode,
    Upload,
}

/// Progress event streamed to external observers.
///
/// Best-effort and may be dropped under throttling; the last observed value
/// per stage is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: u64,
    pub stage: Stage,
    pub percent: f64,
    pub speed: Option<f64>,
    pub fps: Option<f64>,
    pub eta_seconds: Option<u64>,
}
