//! Progress manifest: an optional external artifact, one JSON line appended
//! per completion, following the same atomic-write discipline (temp file +
//! rename) used elsewhere, adapted to append-only since a manifest
//! accumulates over the process's lifetime rather than being rewritten
//! wholesale each time.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRecord {
    pub path: String,
    pub original_bytes: u64,
    pub encoded_bytes: u64,
    pub codec_before: Option<String>,
    pub codec_after: Option<String>,
    pub duration_seconds: Option<f64>,
    pub encoding_time_seconds: f64,
    pub completed_at_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestSummary {
    pub completed_count: u64,
    pub total_original_bytes: u64,
    pub total_encoded_bytes: u64,
}

pub fn append_record(manifest_path: &Path, record: &ManifestRecord) -> anyhow::Result<()> {
    if let Some(parent) = manifest_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(manifest_path)?;
    let line = serde_json::to_string(record)?;
    writeln!(file, "{line}")?;
    Ok(())
}

pub fn summarize(manifest_path: &Path) -> anyhow::Result<ManifestSummary> {
    let mut summary = ManifestSummary::default();
    let Ok(file) = std::fs::File::open(manifest_path) else {
        return Ok(summary);
    };
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<ManifestRecord>(&line) {
            summary.completed_count += 1;
            summary.total_original_bytes += record.original_bytes;
            summary.total_encoded_bytes += record.encoded_bytes;
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_summarize_accumulates_across_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress_manifest.jsonl");

        for (orig, enc) in [(1000u64, 600u64), (2000, 900)] {
            append_record(
                &path,
                &ManifestRecord {
                    path: "/m/a.mkv".into(),
                    original_bytes: orig,
                    encoded_bytes: enc,
                    codec_before: Some("h264".into()),
                    codec_after: Some("hevc".into()),
                    duration_seconds: Some(10.0),
                    encoding_time_seconds: 5.0,
                    completed_at_ms: 0,
                },
            )
            .unwrap();
        }

        let summary = summarize(&path).unwrap();
        assert_eq!(summary.completed_count, 2);
        assert_eq!(summary.total_original_bytes, 3000);
        assert_eq!(summary.total_encoded_bytes, 1500);
    }

    #[test]
    fn summarize_on_missing_file_returns_zeroed_summary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.jsonl");
        let summary = summarize(&path).unwrap();
        assert_eq!(summary.completed_count, 0);
    }
}
