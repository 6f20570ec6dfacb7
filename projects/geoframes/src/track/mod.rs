// GPS track store: ordered fixes plus the loaders that produce them

pub mod distance;
pub mod gps_json;
pub mod text_export;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use gps_json::GpsJsonLoader;
pub use text_export::{TextExportLayout, TextExportLoader};

/// One GPS sample. `time` is seconds relative to the first fix of its track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    pub time: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl GeoFix {
    pub fn new(time: f64, latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            time,
            latitude,
            longitude,
            altitude,
        }
    }
}

/// Which source format a track came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackFormat {
    GpsJson,
    TextExport,
}

impl TrackFormat {
    /// Picks the loader strategy from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(Self::GpsJson),
            Some("csv") | Some("txt") => Ok(Self::TextExport),
            _ => Err(Error::UnsupportedTrackFormat(path.to_path_buf())),
        }
    }
}

/// Immutable, chronologically ordered sequence of fixes.
#[derive(Debug, Clone)]
pub struct Track {
    fixes: Vec<GeoFix>,
    /// Cumulative distance in km per fix, when the source records it directly.
    odometer_km: Option<Vec<f64>>,
    /// Absolute time of the first fix, seconds since the Unix epoch.
    origin_epoch: Option<f64>,
    positioned: bool,
}

impl Track {
    /// Builds a track, shifting time so the first fix sits at 0.
    ///
    /// Fails on the first fix whose timestamp is earlier than its predecessor.
    pub fn from_fixes(mut fixes: Vec<GeoFix>) -> Result<Self> {
        for (i, pair) in fixes.windows(2).enumerate() {
            if pair[1].time < pair[0].time {
                return Err(Error::malformed(
                    i + 1,
                    format!(
                        "timestamp {} precedes previous timestamp {}",
                        pair[1].time, pair[0].time
                    ),
                ));
            }
        }

        if let Some(first) = fixes.first().map(|f| f.time) {
            for fix in fixes.iter_mut() {
                fix.time -= first;
            }
        }

        Ok(Self {
            fixes,
            odometer_km: None,
            origin_epoch: None,
            positioned: true,
        })
    }

    pub fn with_origin_epoch(mut self, origin_epoch: Option<f64>) -> Self {
        self.origin_epoch = origin_epoch;
        self
    }

    /// Attaches per-fix cumulative distances; segment distances then come from these.
    pub fn with_odometer(mut self, odometer_km: Vec<f64>) -> Result<Self> {
        if odometer_km.len() != self.fixes.len() {
            return Err(Error::InvalidConfig(format!(
                "odometer has {} values for {} fixes",
                odometer_km.len(),
                self.fixes.len()
            )));
        }
        self.odometer_km = Some(odometer_km);
        Ok(self)
    }

    /// Marks the fixes as carrying no real coordinates.
    pub fn without_positions(mut self) -> Self {
        self.positioned = false;
        self
    }

    pub fn fixes(&self) -> &[GeoFix] {
        &self.fixes
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    pub fn odometer_km(&self) -> Option<&[f64]> {
        self.odometer_km.as_deref()
    }

    pub fn origin_epoch(&self) -> Option<f64> {
        self.origin_epoch
    }

    pub fn is_positioned(&self) -> bool {
        self.positioned
    }

    pub fn duration(&self) -> f64 {
        self.fixes.last().map(|f| f.time).unwrap_or(0.0)
    }
}

/// A strategy that turns one track file into a [`Track`].
pub trait TrackLoader {
    fn format(&self) -> TrackFormat;
    fn load(&self, path: &Path) -> Result<Track>;
}

/// Selects the loader for `path` by extension.
pub fn loader_for(path: &Path, layout: &TextExportLayout) -> Result<Box<dyn TrackLoader>> {
    let loader: Box<dyn TrackLoader> = match TrackFormat::from_path(path)? {
        TrackFormat::GpsJson => Box::new(GpsJsonLoader),
        TrackFormat::TextExport => Box::new(TextExportLoader::new(layout.clone())),
    };
    Ok(loader)
}

pub fn load_track(path: &Path, layout: &TextExportLayout) -> Result<Track> {
    let loader = loader_for(path, layout)?;
    let track = loader.load(path)?;
    tracing::info!(
        "Loaded {:?} track from {}: {} fixes over {:.1}s",
        loader.format(),
        path.display(),
        track.len(),
        track.duration()
    );
    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fixes_normalizes_origin() {
        let track = Track::from_fixes(vec![
            GeoFix::new(100.0, 1.0, 2.0, 3.0),
            GeoFix::new(101.5, 1.0, 2.0, 3.0),
        ])
        .unwrap();
        assert_eq!(track.fixes()[0].time, 0.0);
        assert_eq!(track.fixes()[1].time, 1.5);
        assert!(track.is_positioned());
    }

    #[test]
    fn test_from_fixes_rejects_time_going_backwards() {
        let err = Track::from_fixes(vec![
            GeoFix::new(0.0, 0.0, 0.0, 0.0),
            GeoFix::new(2.0, 0.0, 0.0, 0.0),
            GeoFix::new(1.0, 0.0, 0.0, 0.0),
        ])
        .unwrap_err();
        match err {
            Error::MalformedTrackRecord { index, .. } => assert_eq!(index, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_odometer_length_must_match() {
        let track = Track::from_fixes(vec![GeoFix::new(0.0, 0.0, 0.0, 0.0)]).unwrap();
        assert!(track.with_odometer(vec![0.0, 1.0]).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            TrackFormat::from_path(Path::new("GH010001.json")).unwrap(),
            TrackFormat::GpsJson
        );
        assert_eq!(
            TrackFormat::from_path(Path::new("trip.CSV")).unwrap(),
            TrackFormat::TextExport
        );
        assert!(TrackFormat::from_path(Path::new("trip.gpx")).is_err());
    }
}
