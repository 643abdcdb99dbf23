//! Best-effort re-encode of a video into a browser-friendly MP4
//!
//! Requires an `ffmpeg` binary on `PATH`. Every failure degrades to "serve
//! the original file", so callers never need to handle an error here.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{info, instrument, warn};

/// `<dir>/<stem>_web.<ext>` next to the input
pub fn web_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    let name = match input.extension() {
        Some(ext) => format!("{}_web.{}", stem, ext.to_string_lossy()),
        None => format!("{}_web", stem),
    };
    input.with_file_name(name)
}

fn ffmpeg_args(input: &Path, output: &Path) -> Vec<std::ffi::OsString> {
    let mut args: Vec<std::ffi::OsString> = vec!["-y".into(), "-i".into(), input.into()];
    for arg in [
        "-c:v", "libx264", "-preset", "fast", "-crf", "23", "-c:a", "aac", "-movflags", "+faststart",
    ] {
        args.push(arg.into());
    }
    args.push(output.into());
    args
}

/// Re-encode `input` for progressive playback and return the file to serve
///
/// Writes to `output` or, when `None`, to [`web_output_path`]. Returns
/// `input` unchanged if ffmpeg is missing or exits unsuccessfully.
#[instrument]
pub fn optimize_for_web(input: &Path, output: Option<&Path>) -> PathBuf {
    let ffmpeg = match which::which("ffmpeg") {
        Ok(p) => p,
        Err(e) => {
            warn!("ffmpeg not available ({}), using original {}", e, input.display());
            return input.to_path_buf();
        }
    };

    let output = output.map_or_else(|| web_output_path(input), Path::to_path_buf);

    let status = Command::new(&ffmpeg)
        .args(ffmpeg_args(input, &output))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(s) if s.success() => {
            info!("Optimized {} -> {}", input.display(), output.display());
            output
        }
        Ok(s) => {
            warn!("ffmpeg exited with {} for {}, using original", s, input.display());
            input.to_path_buf()
        }
        Err(e) => {
            warn!("Failed to run ffmpeg for {}: {}", input.display(), e);
            input.to_path_buf()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_output_path() {
        assert_eq!(web_output_path(Path::new("videos/fox.mp4")), PathBuf::from("videos/fox_web.mp4"));
        assert_eq!(web_output_path(Path::new("clip.MOV")), PathBuf::from("clip_web.MOV"));
        assert_eq!(web_output_path(Path::new("raw")), PathBuf::from("raw_web"));
    }

    #[test]
    fn test_ffmpeg_arguments() {
        let args = ffmpeg_args(Path::new("in.avi"), Path::new("out.avi"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert_eq!(args.last().map(String::as_str), Some("out.avi"));
        assert!(args.windows(2).any(|w| w == ["-crf", "23"]));
        assert!(args.windows(2).any(|w| w == ["-movflags", "+faststart"]));
    }

    #[test]
    fn test_unconvertible_input_falls_back_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.mp4");
        std::fs::write(&input, b"not a video").unwrap();

        assert_eq!(optimize_for_web(&input, None), input);
    }
}
