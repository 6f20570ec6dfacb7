use crate::pipeline::aligner::{FailureCounting, DEFAULT_MAX_DECODE_FAILURES};
use crate::pipeline::export::ImageFormat;
use crate::pipeline::planner::{SamplingPolicy, DEFAULT_INTERVAL_KM};
use crate::video::Backend;
use clap::Parser;
use std::path::PathBuf;

/// Extract geotagged stills from a dashcam video at fixed distance intervals.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory scanned for the video and track files
    #[arg(long, env = "GEOFRAMES_INPUT_DIR", default_value = ".")]
    pub input_dir: PathBuf,

    /// Video file to use instead of scanning the input directory
    #[arg(long, env = "GEOFRAMES_VIDEO")]
    pub video: Option<PathBuf>,

    /// Track file (.json or .csv) to use instead of scanning the input directory
    #[arg(long, env = "GEOFRAMES_TRACK")]
    pub track: Option<PathBuf>,

    /// Extension identifying the video file during the scan
    #[arg(long, env = "GEOFRAMES_VIDEO_EXTENSION", default_value = "MP4")]
    pub video_extension: String,

    /// Output directory; relative paths are resolved against the input directory
    #[arg(long, env = "GEOFRAMES_OUTPUT_DIR", default_value = "output")]
    pub output_dir: PathBuf,

    /// Distance between exported frames, in km
    #[arg(long, env = "GEOFRAMES_INTERVAL_KM", default_value_t = DEFAULT_INTERVAL_KM)]
    pub interval_km: f64,

    /// Sampling policy; defaults to snap-to-fix for JSON tracks and
    /// interpolate-time for text exports
    #[arg(long, env = "GEOFRAMES_POLICY", value_enum)]
    pub policy: Option<SamplingPolicy>,

    /// Decode failures after which the video is considered finished
    #[arg(long, env = "GEOFRAMES_MAX_DECODE_FAILURES", default_value_t = DEFAULT_MAX_DECODE_FAILURES)]
    pub max_decode_failures: u32,

    /// Whether a good frame resets the decode failure count
    #[arg(long, env = "GEOFRAMES_FAILURE_COUNTING", value_enum, default_value = "cumulative")]
    pub failure_counting: FailureCounting,

    /// Matched frames held in memory before they are written out
    #[arg(long, env = "GEOFRAMES_BATCH_SIZE", default_value_t = 100)]
    pub batch_size: usize,

    /// Video decoder backend
    #[arg(long, env = "GEOFRAMES_BACKEND", value_enum, default_value = "opencv")]
    pub backend: Backend,

    /// Output image format
    #[arg(long, env = "GEOFRAMES_IMAGE_FORMAT", value_enum, default_value = "png")]
    pub image_format: ImageFormat,

    /// Write GPS position and capture time into each image
    #[arg(long, env = "GEOFRAMES_GEOTAG")]
    pub geotag: bool,

    /// exiftool executable used for geotagging
    #[arg(long, env = "GEOFRAMES_EXIFTOOL", default_value = "exiftool")]
    pub exiftool: String,

    /// Extract GPS telemetry from the video before loading the track
    #[arg(long, env = "GEOFRAMES_EXTRACT_TELEMETRY")]
    pub extract_telemetry: bool,

    /// ffmpeg executable used for telemetry extraction
    #[arg(long, env = "GEOFRAMES_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: String,

    /// Telemetry-to-JSON converter executable
    #[arg(long, env = "GEOFRAMES_GOPRO2JSON", default_value = "gopro2json")]
    pub gopro2json: String,

    /// ffmpeg stream specifier of the telemetry stream
    #[arg(long, env = "GEOFRAMES_TELEMETRY_STREAM", default_value = "0:3")]
    pub telemetry_stream: String,

    /// Text export: column holding "<date> <time>"
    #[arg(long, env = "GEOFRAMES_CSV_TIME_COLUMN", default_value_t = 1)]
    pub csv_time_column: usize,

    /// Text export: column holding the cumulative distance in km
    #[arg(long, env = "GEOFRAMES_CSV_DISTANCE_COLUMN", default_value_t = 8)]
    pub csv_distance_column: usize,

    /// Text export: latitude column, if any
    #[arg(long, env = "GEOFRAMES_CSV_LAT_COLUMN")]
    pub csv_lat_column: Option<usize>,

    /// Text export: longitude column, if any
    #[arg(long, env = "GEOFRAMES_CSV_LON_COLUMN")]
    pub csv_lon_column: Option<usize>,

    /// Text export: altitude column, if any
    #[arg(long, env = "GEOFRAMES_CSV_ALT_COLUMN")]
    pub csv_alt_column: Option<usize>,

    /// Text export: rows before the first record (title and header)
    #[arg(long, env = "GEOFRAMES_CSV_LEADING_ROWS", default_value_t = 2)]
    pub csv_leading_rows: usize,

    /// Text export: rows after the last record
    #[arg(long, env = "GEOFRAMES_CSV_TRAILING_ROWS", default_value_t = 1)]
    pub csv_trailing_rows: usize,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, env = "GEOFRAMES_VERBOSE")]
    pub verbose: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["geoframes"]).unwrap();
        assert_eq!(args.interval_km, 0.01);
        assert_eq!(args.max_decode_failures, 100);
        assert_eq!(args.batch_size, 100);
        assert_eq!(args.policy, None);
        assert_eq!(args.failure_counting, FailureCounting::Cumulative);
        assert_eq!(args.backend, Backend::Opencv);
        assert_eq!(args.image_format, ImageFormat::Png);
        assert!(!args.geotag);
    }

    #[test]
    fn test_policy_values() {
        let args = Args::try_parse_from(["geoframes", "--policy", "interpolate-time"]).unwrap();
        assert_eq!(args.policy, Some(SamplingPolicy::InterpolateTime));
        let args = Args::try_parse_from(["geoframes", "--policy", "snap-to-fix"]).unwrap();
        assert_eq!(args.policy, Some(SamplingPolicy::SnapToFix));
    }

    #[test]
    fn test_csv_layout_from_env() {
        std::env::set_var("GEOFRAMES_CSV_TRAILING_ROWS", "3");
        let args = Args::try_parse_from(["geoframes"]);
        std::env::remove_var("GEOFRAMES_CSV_TRAILING_ROWS");
        assert_eq!(args.unwrap().csv_trailing_rows, 3);

        let args = Args::try_parse_from(["geoframes", "--csv-trailing-rows", "0"]).unwrap();
        assert_eq!(args.csv_trailing_rows, 0);
    }
}
