// Telemetry extraction: pulls the embedded GPS stream out of a video and
// converts it into a GPS JSON track next to the video.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// ffmpeg executable
    pub ffmpeg: String,
    /// Converter from the raw telemetry stream to GPS JSON
    pub gopro2json: String,
    /// Stream specifier passed to `-map`
    pub stream: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".into(),
            gopro2json: "gopro2json".into(),
            stream: "0:3".into(),
        }
    }
}

/// Intermediate binary and final JSON paths for `video`: `<stem>.bin`, `<stem>.json`.
pub fn telemetry_paths(video: &Path) -> (PathBuf, PathBuf) {
    (video.with_extension("bin"), video.with_extension("json"))
}

pub fn ffmpeg_args(video: &Path, binary: &Path, stream: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), video.into()];
    args.extend(
        ["-codec", "copy", "-map", stream, "-f", "rawvideo"]
            .into_iter()
            .map(OsString::from),
    );
    args.push(binary.into());
    args
}

pub fn gopro2json_args(binary: &Path, json: &Path) -> Vec<OsString> {
    vec!["-i".into(), binary.into(), "-o".into(), json.into()]
}

fn run_tool(program: &str, args: &[OsString]) -> Result<()> {
    tracing::debug!("Running {} {:?}", program, args);
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| Error::ExternalTool {
            tool: program.to_string(),
            reason: e.to_string(),
        })?;

    if !status.success() {
        return Err(Error::ExternalTool {
            tool: program.to_string(),
            reason: format!("exited with {}", status),
        });
    }
    Ok(())
}

/// Runs both extraction steps and returns the JSON track path.
pub fn extract_telemetry(video: &Path, config: &TelemetryConfig) -> Result<PathBuf> {
    let (binary, json) = telemetry_paths(video);

    run_tool(&config.ffmpeg, &ffmpeg_args(video, &binary, &config.stream))?;
    tracing::info!("Extracted telemetry stream from {}", video.display());

    run_tool(&config.gopro2json, &gopro2json_args(&binary, &json))?;
    if !json.is_file() {
        return Err(Error::ExternalTool {
            tool: config.gopro2json.clone(),
            reason: format!("no output written to {}", json.display()),
        });
    }
    tracing::info!("Converted telemetry to {}", json.display());
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_follow_video_stem() {
        let (bin, json) = telemetry_paths(Path::new("/drive/GH010042.MP4"));
        assert_eq!(bin, PathBuf::from("/drive/GH010042.bin"));
        assert_eq!(json, PathBuf::from("/drive/GH010042.json"));
    }

    #[test]
    fn test_ffmpeg_args() {
        let args = ffmpeg_args(Path::new("in.MP4"), Path::new("in.bin"), "0:3");
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec!["-y", "-i", "in.MP4", "-codec", "copy", "-map", "0:3", "-f", "rawvideo", "in.bin"]
        );
    }

    #[test]
    fn test_missing_tool_is_reported() {
        let config = TelemetryConfig {
            ffmpeg: "geoframes-no-such-ffmpeg".into(),
            ..Default::default()
        };
        let err = extract_telemetry(Path::new("in.MP4"), &config).unwrap_err();
        match err {
            Error::ExternalTool { tool, .. } => assert_eq!(tool, "geoframes-no-such-ffmpeg"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
