// Pipeline orchestrator: drives one extraction run end to end
//
// inputs -> track -> plan -> aligner (batches) -> exporter -> run.json

use crate::config::RunConfig;
use crate::geotag::{ExiftoolWriter, TagWriter};
use crate::pipeline::aligner::{AlignerConfig, AlignerState, FrameAligner};
use crate::pipeline::export::{Exporter, ImageFormat, ImageSink, OpencvImageSink};
use crate::pipeline::planner::{self, PlannerConfig, SamplingPolicy};
use crate::pipeline::types::{AlignStats, ExportStats, PlanEntry};
use crate::run_context::{self, RunSummary};
use crate::telemetry;
use crate::track::{self, TrackFormat};
use crate::video::{self, FrameSource};
use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Settings for the align-and-export loop.
pub struct ExportSettings<'a> {
    pub output_dir: &'a Path,
    pub image_format: ImageFormat,
    pub batch_size: usize,
    pub aligner: AlignerConfig,
    pub attach_metadata: bool,
    pub tagger: Option<&'a dyn TagWriter>,
    pub origin_epoch: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AlignOutcome {
    pub fps: f64,
    pub state: AlignerState,
    pub alignment: AlignStats,
    pub export: ExportStats,
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} targets ({eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Aligns `plan` against `source` and writes every matched frame through `sink`,
/// `batch_size` frames at a time.
pub fn align_and_export<S: FrameSource>(
    source: S,
    plan: Vec<PlanEntry>,
    settings: &ExportSettings<'_>,
    sink: &mut dyn ImageSink<S::Frame>,
) -> Result<AlignOutcome> {
    let total = plan.len();
    let mut aligner = FrameAligner::new(source, plan, settings.aligner)?;
    let mut exporter = Exporter::new(settings.output_dir, settings.image_format, total, sink)
        .with_metadata(settings.attach_metadata);
    if let Some(tagger) = settings.tagger {
        exporter = exporter.with_tagger(tagger, settings.origin_epoch);
    }

    let pb = progress_bar(total)?;
    while aligner.state() == AlignerState::Seeking {
        let batch = aligner.next_batch(settings.batch_size);
        if batch.is_empty() {
            continue;
        }
        let written = exporter.flush(batch);
        pb.set_position((total - aligner.remaining()) as u64);
        tracing::info!(
            "Batch {}: wrote {} images ({} targets left)",
            exporter.stats().batches,
            written.len(),
            aligner.remaining()
        );
    }
    pb.finish_and_clear();

    let outcome = AlignOutcome {
        fps: aligner.fps(),
        state: aligner.state(),
        alignment: aligner.stats().clone(),
        export: exporter.stats().clone(),
    };
    tracing::info!(
        "Alignment {:?}: matched {}, missed {}, collapsed {}, dropped {} over {} frames",
        outcome.state,
        outcome.alignment.matched,
        outcome.alignment.missed,
        outcome.alignment.collapsed,
        outcome.alignment.dropped,
        outcome.alignment.decoded
    );
    Ok(outcome)
}

/// Runs a full extraction as configured and writes the run summary.
pub fn run(config: &RunConfig) -> Result<RunSummary> {
    let video_path = run_context::find_video(config)?;
    tracing::info!("Using video {}", video_path.display());

    let track_path = match &config.telemetry {
        Some(telemetry_config) => telemetry::extract_telemetry(&video_path, telemetry_config)
            .context("Telemetry extraction failed")?,
        None => run_context::find_track(config, &video_path)?,
    };
    let track_format = TrackFormat::from_path(&track_path)?;
    let track = track::load_track(&track_path, &config.text_layout)
        .with_context(|| format!("Failed to load track {}", track_path.display()))?;

    if track.is_empty() {
        tracing::warn!("Track {} has no fixes; nothing to extract", track_path.display());
    }
    tracing::info!(
        "Track covers {:.3} km",
        track::distance::total_distance_km(&track)
    );

    let policy = config
        .policy
        .unwrap_or_else(|| SamplingPolicy::for_format(track_format));
    let plan = planner::plan(
        &track,
        &PlannerConfig {
            interval_km: config.interval_km,
            policy,
        },
    );
    tracing::info!(
        "Planned {} captures every {} km ({:?})",
        plan.len(),
        config.interval_km,
        policy
    );

    run_context::prepare_output_dir(&config.output_dir)?;

    let tagger = match (&config.exiftool, track.is_positioned()) {
        (Some(program), true) => Some(ExiftoolWriter::new(program.as_str())),
        (Some(_), false) => {
            tracing::warn!("Track has no positions; images will not be geotagged");
            None
        }
        (None, _) => None,
    };

    let source = video::open_source(&video_path, config.backend)
        .with_context(|| format!("Failed to open video {}", video_path.display()))?;
    tracing::info!("Opened video at {:.2} fps", source.fps());

    let settings = ExportSettings {
        output_dir: &config.output_dir,
        image_format: config.image_format,
        batch_size: config.batch_size,
        aligner: config.aligner,
        attach_metadata: track.is_positioned(),
        tagger: tagger.as_ref().map(|t| t as &dyn TagWriter),
        origin_epoch: track.origin_epoch(),
    };
    let plan_entries = plan.len();
    let mut sink = OpencvImageSink;
    let outcome = align_and_export(source, plan, &settings, &mut sink)?;

    let summary = RunSummary {
        video: video_path,
        track: track_path,
        track_format,
        created_at: Utc::now(),
        policy,
        fps: outcome.fps,
        plan_entries,
        state: outcome.state,
        alignment: outcome.alignment,
        export: outcome.export,
        config: config.clone(),
    };
    let summary_path = run_context::write_summary(&config.output_dir, &summary)?;
    tracing::info!("Wrote run summary to {}", summary_path.display());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geotag::GeoTag;
    use crate::pipeline::aligner::FailureCounting;
    use anyhow::anyhow;
    use std::cell::RefCell;
    use std::path::PathBuf;

    struct FakeSource {
        fps: f64,
        len: u64,
        failing: Vec<u64>,
        next: u64,
    }

    impl FrameSource for FakeSource {
        type Frame = u64;

        fn fps(&self) -> f64 {
            self.fps
        }

        fn decode_next(&mut self) -> Result<u64> {
            let index = self.next;
            self.next += 1;
            if index >= self.len || self.failing.contains(&index) {
                Err(anyhow!("no frame {}", index))
            } else {
                Ok(index)
            }
        }
    }

    fn source(len: u64, failing: Vec<u64>) -> FakeSource {
        FakeSource {
            fps: 10.0,
            len,
            failing,
            next: 0,
        }
    }

    fn entry(t: f64) -> PlanEntry {
        PlanEntry {
            target_time: t,
            latitude: 45.0,
            longitude: 15.0,
            altitude: 120.0,
        }
    }

    fn settings<'a>(batch_size: usize, tagger: Option<&'a dyn TagWriter>) -> ExportSettings<'a> {
        ExportSettings {
            output_dir: Path::new("out"),
            image_format: ImageFormat::Png,
            batch_size,
            aligner: AlignerConfig::default(),
            attach_metadata: true,
            tagger,
            origin_epoch: None,
        }
    }

    #[derive(Default)]
    struct CountingTagger {
        tagged: RefCell<Vec<PathBuf>>,
    }

    impl TagWriter for CountingTagger {
        fn write_tag(&self, image_path: &Path, _tag: &GeoTag) -> crate::error::Result<()> {
            self.tagged.borrow_mut().push(image_path.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn test_frames_written_in_plan_order() {
        let plan: Vec<PlanEntry> = [0.05, 0.25, 1.0, 2.55].into_iter().map(entry).collect();
        let mut saved = Vec::new();
        let mut sink = |path: &Path, frame: &u64| -> Result<()> {
            saved.push((path.to_path_buf(), *frame));
            Ok(())
        };
        let outcome = align_and_export(source(100, vec![]), plan, &settings(3, None), &mut sink).unwrap();

        assert_eq!(outcome.state, AlignerState::Done);
        assert_eq!(outcome.alignment.matched, 4);
        assert_eq!(outcome.export.written, 4);
        assert_eq!(outcome.export.batches, 2);
        assert_eq!(
            saved,
            vec![
                (PathBuf::from("out/0.png"), 0),
                (PathBuf::from("out/1.png"), 2),
                (PathBuf::from("out/2.png"), 10),
                (PathBuf::from("out/3.png"), 25),
            ]
        );
    }

    #[test]
    fn test_batch_size_does_not_change_output() {
        let plan: Vec<PlanEntry> = (0..25).map(|i| entry(i as f64 * 0.37)).collect();
        let mut outputs = Vec::new();
        for batch_size in [1, 4, 100] {
            let mut frames = Vec::new();
            let mut sink = |_: &Path, frame: &u64| -> Result<()> {
                frames.push(*frame);
                Ok(())
            };
            align_and_export(
                source(1_000, vec![7, 8]),
                plan.clone(),
                &settings(batch_size, None),
                &mut sink,
            )
            .unwrap();
            outputs.push(frames);
        }
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[1], outputs[2]);
    }

    #[test]
    fn test_exhausted_video_keeps_written_frames() {
        let plan: Vec<PlanEntry> = [0.5, 1.5, 50.0].into_iter().map(entry).collect();
        let mut count = 0;
        let mut sink = |_: &Path, _: &u64| -> Result<()> {
            count += 1;
            Ok(())
        };
        let mut config = settings(10, None);
        config.aligner = AlignerConfig {
            max_decode_failures: 5,
            failure_counting: FailureCounting::Cumulative,
        };
        let outcome = align_and_export(source(20, vec![]), plan, &config, &mut sink).unwrap();
        assert_eq!(outcome.state, AlignerState::Exhausted);
        assert_eq!(outcome.alignment.matched, 2);
        assert_eq!(outcome.alignment.dropped, 1);
        assert_eq!(outcome.export.written, 2);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_tagger_sees_every_written_image() {
        let tagger = CountingTagger::default();
        let plan: Vec<PlanEntry> = [0.1, 0.2].into_iter().map(entry).collect();
        let mut sink = |_: &Path, _: &u64| -> Result<()> { Ok(()) };
        let outcome =
            align_and_export(source(10, vec![]), plan, &settings(1, Some(&tagger)), &mut sink)
                .unwrap();
        assert_eq!(outcome.export.tagged, 2);
        assert_eq!(
            *tagger.tagged.borrow(),
            vec![PathBuf::from("out/0.png"), PathBuf::from("out/1.png")]
        );
    }

    #[test]
    fn test_empty_plan_writes_nothing() {
        let mut sink = |_: &Path, _: &u64| -> Result<()> { panic!("nothing to write") };
        let outcome = align_and_export(source(10, vec![]), Vec::new(), &settings(5, None), &mut sink)
            .unwrap();
        assert_eq!(outcome.state, AlignerState::Done);
        assert_eq!(outcome.alignment.decoded, 0);
        assert_eq!(outcome.export.batches, 0);
    }
}
