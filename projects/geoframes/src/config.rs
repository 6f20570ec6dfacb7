use crate::cli::Args;
use crate::error::{Error, Result};
use crate::pipeline::aligner::AlignerConfig;
use crate::pipeline::export::ImageFormat;
use crate::pipeline::planner::SamplingPolicy;
use crate::telemetry::TelemetryConfig;
use crate::track::TextExportLayout;
use crate::video::Backend;
use serde::Serialize;
use std::path::PathBuf;

/// Validated settings for one extraction run.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    pub video: Option<PathBuf>,
    pub track: Option<PathBuf>,
    pub video_extension: String,
    pub output_dir: PathBuf,
    pub interval_km: f64,
    /// `None` picks the policy from the track format
    pub policy: Option<SamplingPolicy>,
    pub aligner: AlignerConfig,
    pub batch_size: usize,
    pub backend: Backend,
    pub image_format: ImageFormat,
    /// exiftool program when geotagging is enabled
    pub exiftool: Option<String>,
    pub telemetry: Option<TelemetryConfig>,
    pub text_layout: TextExportLayout,
}

impl RunConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let output_dir = if args.output_dir.is_absolute() {
            args.output_dir.clone()
        } else {
            args.input_dir.join(&args.output_dir)
        };

        let config = Self {
            input_dir: args.input_dir.clone(),
            video: args.video.clone(),
            track: args.track.clone(),
            video_extension: args.video_extension.trim_start_matches('.').to_string(),
            output_dir,
            interval_km: args.interval_km,
            policy: args.policy,
            aligner: AlignerConfig {
                max_decode_failures: args.max_decode_failures,
                failure_counting: args.failure_counting,
            },
            batch_size: args.batch_size,
            backend: args.backend,
            image_format: args.image_format,
            exiftool: args.geotag.then(|| args.exiftool.clone()),
            telemetry: args.extract_telemetry.then(|| TelemetryConfig {
                ffmpeg: args.ffmpeg.clone(),
                gopro2json: args.gopro2json.clone(),
                stream: args.telemetry_stream.clone(),
            }),
            text_layout: TextExportLayout {
                time_column: args.csv_time_column,
                distance_column: args.csv_distance_column,
                latitude_column: args.csv_lat_column,
                longitude_column: args.csv_lon_column,
                altitude_column: args.csv_alt_column,
                leading_rows: args.csv_leading_rows,
                trailing_rows: args.csv_trailing_rows,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.interval_km.is_finite() || self.interval_km <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "interval must be a positive distance, got {} km",
                self.interval_km
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be at least 1".into()));
        }
        if self.aligner.max_decode_failures == 0 {
            return Err(Error::InvalidConfig(
                "decode failure threshold must be at least 1".into(),
            ));
        }
        if self.video_extension.is_empty() {
            return Err(Error::InvalidConfig("video extension is empty".into()));
        }
        let positions = [
            self.text_layout.latitude_column,
            self.text_layout.longitude_column,
        ];
        if positions.iter().filter(|c| c.is_some()).count() == 1 {
            return Err(Error::InvalidConfig(
                "latitude and longitude columns must be given together".into(),
            ));
        }
        Ok(())
    }
}
