//! Output filename policy: when a release tag is
//! configured, rewrite bracketed/inline codec tokens and the trailing
//! release tag; otherwise upload to the original path unchanged.
//!
//! Token substitution is regex-driven stem rewriting via the `regex` crate.

use once_cell::sync::Lazy;
use regex::Regex;

/// Codec tokens release filenames commonly carry, checked in this order so
/// e.g. `x265` doesn't get clobbered by a looser later pattern.
const KNOWN_CODEC_TOKENS: &[&str] = &["x264", "x265", "h264", "h265", "hevc", "avc", "xvid", "divx", "vp9", "vp8", "av1"];

static TRAILING_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"-[A-Za-z0-9]+$").unwrap());

/// The conventional release-filename token for a target codec identifier.
fn target_token(target_codec: &str) -> String {
    let lower = target_codec.to_ascii_lowercase();
    if lower.contains("265") || lower.contains("hevc") {
        "x265".to_string()
    } else if lower.contains("vp9") {
        "vp9".to_string()
    } else if lower.contains("av1") {
        "av1".to_string()
    } else if lower.contains("264") || lower.contains("avc") {
        "x264".to_string()
    } else {
        target_codec.to_string()
    }
}

/// Rewrites `remote_path`'s basename per the output naming policy: when
/// `release_tag` is `Some`, codec tokens naming any known
/// source codec are replaced with the target codec's conventional release
/// token and the trailing release tag is replaced/appended. Without a
/// release tag the original path passes through unchanged.
pub fn apply_output_naming(remote_path: &str, release_tag: Option<&str>, target_codec: &str) -> String {
    let Some(release_tag) = release_tag else {
        return remote_path.to_string();
    };

    let (dir, basename) = match remote_path.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, remote_path),
    };
    let (stem, ext) = match basename.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (basename, None),
    };

    let mut stem = replace_codec_tokens(stem, &target_token(target_codec));
    stem = TRAILING_TAG.replace(&stem, "").to_string();
    stem = format!("{stem}-{release_tag}");

    let new_basename = match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    };
    match dir {
        Some(dir) => format!("{dir}/{new_basename}"),
        None => new_basename,
    }
}

fn replace_codec_tokens(stem: &str, replacement: &str) -> String {
    let mut result = stem.to_string();
    for token in KNOWN_CODEC_TOKENS {
        if token.eq_ignore_ascii_case(replacement) {
            continue;
        }
        let pattern = format!(r"(?i)\b{token}\b");
        if let Ok(re) = Regex::new(&pattern) {
            result = re.replace_all(&result, replacement).to_string();
        }
    }
    result
}
