use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::pipeline::aligner::AlignerState;
use crate::pipeline::planner::SamplingPolicy;
use crate::pipeline::types::{AlignStats, ExportStats};
use crate::track::TrackFormat;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const SUMMARY_FILE: &str = "run.json";

/// Extensions considered track files during discovery.
const TRACK_EXTENSIONS: [&str; 2] = ["json", "csv"];

/// Files directly inside `dir` whose extension matches one of `extensions`,
/// ignoring case. Sorted by path.
pub fn list_files(dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| extensions.iter().any(|ext| s.eq_ignore_ascii_case(ext)))
                .unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

fn explicit(path: &Path, kind: &'static str) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(Error::InputNotFound {
            kind,
            dir: path.to_path_buf(),
        })
    }
}

fn single(mut candidates: Vec<PathBuf>, kind: &'static str, dir: &Path) -> Result<PathBuf> {
    match candidates.len() {
        0 => Err(Error::InputNotFound {
            kind,
            dir: dir.to_path_buf(),
        }),
        1 => Ok(candidates.remove(0)),
        _ => Err(Error::AmbiguousInput { kind, candidates }),
    }
}

pub fn find_video(config: &RunConfig) -> Result<PathBuf> {
    if let Some(path) = &config.video {
        return explicit(path, "video");
    }
    let candidates = list_files(&config.input_dir, &[config.video_extension.as_str()]);
    single(candidates, "video", &config.input_dir)
}

/// Finds the track for `video`. When several track files are present, the ones
/// sharing the video's file stem win.
pub fn find_track(config: &RunConfig, video: &Path) -> Result<PathBuf> {
    if let Some(path) = &config.track {
        return explicit(path, "track");
    }
    let candidates = list_files(&config.input_dir, &TRACK_EXTENSIONS);
    if candidates.len() > 1 {
        let stem = video.file_stem();
        let matching: Vec<PathBuf> = candidates
            .iter()
            .filter(|c| c.file_stem() == stem)
            .cloned()
            .collect();
        if !matching.is_empty() {
            return single(matching, "track", &config.input_dir);
        }
    }
    single(candidates, "track", &config.input_dir)
}

/// Creates the output directory; an existing one is reused.
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        tracing::info!("Reusing output directory {}", dir.display());
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Summary persisted next to the exported images.
#[derive(Serialize, Debug, Clone)]
pub struct RunSummary {
    pub video: PathBuf,
    pub track: PathBuf,
    pub track_format: TrackFormat,
    pub created_at: DateTime<Utc>,
    pub policy: SamplingPolicy,
    pub fps: f64,
    pub plan_entries: usize,
    pub state: AlignerState,
    pub alignment: AlignStats,
    pub export: ExportStats,
    pub config: RunConfig,
}

pub fn write_summary(output_dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
    let path = output_dir.join(SUMMARY_FILE);
    let content = serde_json::to_string_pretty(summary)?;
    fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::Parser;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"").unwrap();
        path
    }

    fn config_for(dir: &Path, extra: &[&str]) -> RunConfig {
        let dir = dir.to_string_lossy().to_string();
        let mut argv = vec!["geoframes", "--input-dir", dir.as_str()];
        argv.extend_from_slice(extra);
        RunConfig::from_args(&Args::try_parse_from(argv).unwrap()).unwrap()
    }

    #[test]
    fn test_video_discovery_is_case_insensitive_and_flat() {
        let tmp = TempDir::new().unwrap();
        let video = touch(tmp.path(), "GH010042.mp4");
        touch(tmp.path(), "notes.txt");
        fs::create_dir(tmp.path().join("nested")).unwrap();
        touch(&tmp.path().join("nested"), "other.MP4");

        let config = config_for(tmp.path(), &[]);
        assert_eq!(find_video(&config).unwrap(), video);
    }

    #[test]
    fn test_missing_and_ambiguous_video() {
        let tmp = TempDir::new().unwrap();
        let config = config_for(tmp.path(), &[]);
        assert!(matches!(
            find_video(&config),
            Err(Error::InputNotFound { kind: "video", .. })
        ));

        touch(tmp.path(), "a.MP4");
        touch(tmp.path(), "b.MP4");
        match find_video(&config) {
            Err(Error::AmbiguousInput { candidates, .. }) => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_explicit_paths_override_discovery() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.MP4");
        touch(tmp.path(), "b.MP4");
        let chosen = touch(tmp.path(), "trip.csv");
        let video = tmp.path().join("b.MP4");
        let video_arg = video.to_string_lossy().to_string();
        let track_arg = chosen.to_string_lossy().to_string();
        let config = config_for(
            tmp.path(),
            &["--video", video_arg.as_str(), "--track", track_arg.as_str()],
        );
        assert_eq!(find_video(&config).unwrap(), video);
        assert_eq!(find_track(&config, &video).unwrap(), chosen);

        let missing = tmp.path().join("missing.MP4");
        let missing_arg = missing.to_string_lossy().to_string();
        let config = config_for(tmp.path(), &["--video", missing_arg.as_str()]);
        assert!(matches!(find_video(&config), Err(Error::InputNotFound { .. })));
    }

    #[test]
    fn test_track_prefers_video_stem() {
        let tmp = TempDir::new().unwrap();
        let video = touch(tmp.path(), "GH010042.MP4");
        touch(tmp.path(), "trip.csv");
        let json = touch(tmp.path(), "GH010042.json");
        let config = config_for(tmp.path(), &[]);
        assert_eq!(find_track(&config, &video).unwrap(), json);

        fs::remove_file(&json).unwrap();
        touch(tmp.path(), "other.csv");
        assert!(matches!(
            find_track(&config, &video),
            Err(Error::AmbiguousInput { kind: "track", .. })
        ));
    }

    #[test]
    fn test_summary_is_written() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("output");
        prepare_output_dir(&out).unwrap();
        prepare_output_dir(&out).unwrap();

        let summary = RunSummary {
            video: tmp.path().join("a.MP4"),
            track: tmp.path().join("a.json"),
            track_format: TrackFormat::GpsJson,
            created_at: Utc::now(),
            policy: SamplingPolicy::SnapToFix,
            fps: 30.0,
            plan_entries: 3,
            state: AlignerState::Done,
            alignment: AlignStats {
                matched: 3,
                ..Default::default()
            },
            export: ExportStats::default(),
            config: config_for(tmp.path(), &[]),
        };
        let path = write_summary(&out, &summary).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["policy"], "snap-to-fix");
        assert_eq!(value["state"], "done");
        assert_eq!(value["alignment"]["matched"], 3);
        assert_eq!(value["config"]["batch_size"], 100);
    }
}
