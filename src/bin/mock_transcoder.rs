//! Stand-in for `ffmpeg`/`ffprobe` in tests: one binary, behavior steered
//! entirely by environment variables, dispatching on its own argv shape
//! with no real decoding. Built only under the `test-support` feature.
//!
//! ffprobe-style invocations (recognized by `-show_streams`) print a JSON
//! probe document (`SHARKODER_MOCK_*` env vars override the defaults);
//! ffmpeg-style invocations copy the input bytes to the output path named
//! by the last argument and emit `-progress pipe:2` key=value lines to
//! stderr, so `video::encoder` and `video::probe` exercise their real
//! parsing logic end to end.

use std::env;
use std::io::Write;

fn main() {
    let argv: Vec<String> = env::args().skip(1).collect();

    if argv.iter().any(|a| a == "-show_streams") {
        run_probe(&argv);
    } else {
        run_encode(&argv);
    }
}

fn run_probe(argv: &[String]) {
    let codec = env::var("SHARKODER_MOCK_VIDEO_CODEC").unwrap_or_else(|_| "h264".to_string());
    let width: u32 = env::var("SHARKODER_MOCK_WIDTH").ok().and_then(|v| v.parse().ok()).unwrap_or(1920);
    let height: u32 = env::var("SHARKODER_MOCK_HEIGHT").ok().and_then(|v| v.parse().ok()).unwrap_or(1080);
    let duration = env::var("SHARKODER_MOCK_DURATION_SECONDS").unwrap_or_else(|_| "10.0".to_string());
    let bitrate = env::var("SHARKODER_MOCK_BITRATE_BPS").unwrap_or_else(|_| "4000000".to_string());

    if argv.iter().any(|a| a == "error-missing-target") {
        eprintln!("mock ffprobe: target not found");
        std::process::exit(1);
    }

    println!(
        r#"{{"format":{{"duration":"{duration}","bit_rate":"{bitrate}","format_name":"matroska,webm"}},"streams":[{{"codec_type":"video","codec_name":"{codec}","width":{width},"height":{height},"r_frame_rate":"30000/1001"}},{{"codec_type":"audio","codec_name":"aac"}}]}}"#
    );
}

fn run_encode(argv: &[String]) {
    let input_path = argv
        .iter()
        .position(|a| a == "-i")
        .and_then(|i| argv.get(i + 1))
        .cloned();
    let output_path = argv.last().cloned();

    let exit_code: i32 = env::var("SHARKODER_MOCK_ENCODE_EXIT_CODE").ok().and_then(|v| v.parse().ok()).unwrap_or(0);

    if exit_code == 0 {
        if let (Some(input_path), Some(output_path)) = (input_path, output_path) {
            let mut bytes = std::fs::read(&input_path).unwrap_or_else(|_| b"mock-encoded-output".to_vec());
            let pad_bytes: usize = env::var("SHARKODER_MOCK_PAD_BYTES").ok().and_then(|v| v.parse().ok()).unwrap_or(0);
            bytes.extend(std::iter::repeat(0u8).take(pad_bytes));
            if let Some(parent) = std::path::Path::new(&output_path).parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = std::fs::write(&output_path, bytes);
        }
    }

    if env::var("SHARKODER_MOCK_EMIT_PROGRESS").map(|v| v != "0").unwrap_or(true) {
        let stderr = std::io::stderr();
        let mut lock = stderr.lock();
        let _ = writeln!(lock, "frame=50");
        let _ = writeln!(lock, "fps=25.0");
        let _ = writeln!(lock, "out_time_ms=2000000");
        let _ = writeln!(lock, "progress=continue");
        let _ = writeln!(lock, "frame=100");
        let _ = writeln!(lock, "fps=25.0");
        let _ = writeln!(lock, "out_time_ms=4000000");
        let _ = writeln!(lock, "progress=end");
    }

    std::process::exit(exit_code);
}
