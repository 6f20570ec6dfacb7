use super::{GeoFix, Track, TrackFormat, TrackLoader};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// A telemetry record as written by the GPMF-to-JSON converter.
/// Fields are optional here so missing ones can be reported with their index.
#[derive(Debug, Deserialize)]
struct RawRecord {
    /// Epoch microseconds
    utc: Option<f64>,
    lat: Option<f64>,
    lon: Option<f64>,
    alt: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Document {
    Wrapped { data: Vec<RawRecord> },
    Bare(Vec<RawRecord>),
}

impl Document {
    fn into_records(self) -> Vec<RawRecord> {
        match self {
            Document::Wrapped { data } => data,
            Document::Bare(records) => records,
        }
    }
}

fn required(value: Option<f64>, index: usize, field: &str) -> Result<f64> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(Error::malformed(index, format!("field `{field}` is {v}"))),
        None => Err(Error::malformed(index, format!("missing field `{field}`"))),
    }
}

/// Parses a JSON telemetry document into a track. Time origin is the first record.
pub fn parse_gps_json_from_str(s: &str) -> Result<Track> {
    let records = serde_json::from_str::<Document>(s)?.into_records();

    let mut fixes = Vec::with_capacity(records.len());
    let mut first_utc = None;
    for (i, r) in records.into_iter().enumerate() {
        let utc = required(r.utc, i, "utc")?;
        let lat = required(r.lat, i, "lat")?;
        let lon = required(r.lon, i, "lon")?;
        let alt = required(r.alt, i, "alt")?;
        let origin = *first_utc.get_or_insert(utc);
        fixes.push(GeoFix::new((utc - origin) / 1e6, lat, lon, alt));
    }

    Ok(Track::from_fixes(fixes)?.with_origin_epoch(first_utc.map(|us| us / 1e6)))
}

/// Loader for fixed-rate GPS JSON telemetry.
pub struct GpsJsonLoader;

impl TrackLoader for GpsJsonLoader {
    fn format(&self) -> TrackFormat {
        TrackFormat::GpsJson
    }

    fn load(&self, path: &Path) -> Result<Track> {
        let s = fs::read_to_string(path)?;
        parse_gps_json_from_str(&s)
    }
}
