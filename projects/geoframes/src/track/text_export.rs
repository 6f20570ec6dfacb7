use super::{GeoFix, Track, TrackFormat, TrackLoader};
use crate::error::{Error, Result};
use chrono::{Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
];

/// Column layout of a delimited trip-log export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextExportLayout {
    /// Column holding "<date> <time>"
    pub time_column: usize,
    /// Column holding the cumulative distance traveled, in km
    pub distance_column: usize,
    pub latitude_column: Option<usize>,
    pub longitude_column: Option<usize>,
    pub altitude_column: Option<usize>,
    /// Non-blank rows dropped from the top (title and header)
    pub leading_rows: usize,
    /// Non-blank rows dropped from the bottom
    pub trailing_rows: usize,
}

impl Default for TextExportLayout {
    fn default() -> Self {
        Self {
            time_column: 1,
            distance_column: 8,
            latitude_column: None,
            longitude_column: None,
            altitude_column: None,
            leading_rows: 2,
            trailing_rows: 1,
        }
    }
}

impl TextExportLayout {
    pub fn is_positioned(&self) -> bool {
        self.latitude_column.is_some() && self.longitude_column.is_some()
    }
}

/// Decodes the raw export. These files are normally UTF-16 with a BOM; BOM-less
/// UTF-16LE and plain UTF-8 are also accepted.
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    let utf16 = |body: &[u8], big_endian: bool| -> Result<String> {
        if body.len() % 2 != 0 {
            return Err(Error::malformed(0, "UTF-16 input has an odd byte count"));
        }
        let units = body.chunks_exact(2).map(|c| {
            if big_endian {
                u16::from_be_bytes([c[0], c[1]])
            } else {
                u16::from_le_bytes([c[0], c[1]])
            }
        });
        char::decode_utf16(units)
            .collect::<std::result::Result<String, _>>()
            .map_err(|e| Error::malformed(0, format!("invalid UTF-16: {e}")))
    };

    match bytes {
        [0xFF, 0xFE, rest @ ..] => utf16(rest, false),
        [0xFE, 0xFF, rest @ ..] => utf16(rest, true),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8(rest.to_vec())
            .map_err(|e| Error::malformed(0, format!("invalid UTF-8: {e}"))),
        [_, 0x00, ..] => utf16(bytes, false),
        _ => String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::malformed(0, format!("invalid UTF-8: {e}"))),
    }
}

/// Seconds since midnight from the time part of a "<date> <H:M:S>" field.
/// Does not handle tracks that cross midnight.
pub fn time_of_day_secs(field: &str) -> Option<f64> {
    let time = field.split_whitespace().last()?;
    let mut parts = time.split(':');
    let h: u32 = parts.next()?.parse().ok()?;
    let m: u32 = parts.next()?.parse().ok()?;
    let s: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(h as f64 * 3600.0 + m as f64 * 60.0 + s)
}

/// Absolute epoch seconds of a local "<date> <time>" field, if the date layout is known.
pub fn local_epoch_secs(field: &str) -> Option<f64> {
    let field = field.trim();
    let naive = DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(field, fmt).ok())?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(local.timestamp() as f64 + local.timestamp_subsec_micros() as f64 / 1e6)
}

fn parse_column(record: &csv::StringRecord, column: usize, index: usize, name: &str) -> Result<f64> {
    let raw = record
        .get(column)
        .ok_or_else(|| Error::malformed(index, format!("missing {name} column {column}")))?;
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(Error::malformed(index, format!("bad {name} value `{raw}`"))),
    }
}

pub fn parse_text_export_from_str(text: &str, layout: &TextExportLayout) -> Result<Track> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let skipped = layout.leading_rows + layout.trailing_rows;
    if lines.len() <= skipped {
        return Track::from_fixes(Vec::new());
    }
    let body = lines[layout.leading_rows..lines.len() - layout.trailing_rows].join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut fixes = Vec::new();
    let mut odometer = Vec::new();
    let mut first_secs = None;
    let mut origin_epoch = None;

    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let stamp = record
            .get(layout.time_column)
            .ok_or_else(|| Error::malformed(i, format!("missing time column {}", layout.time_column)))?;
        let secs = time_of_day_secs(stamp)
            .ok_or_else(|| Error::malformed(i, format!("bad time value `{stamp}`")))?;
        if first_secs.is_none() {
            first_secs = Some(secs);
            origin_epoch = local_epoch_secs(stamp);
        }

        let distance = parse_column(&record, layout.distance_column, i, "distance")?;
        let lat = match layout.latitude_column {
            Some(c) => parse_column(&record, c, i, "latitude")?,
            None => 0.0,
        };
        let lon = match layout.longitude_column {
            Some(c) => parse_column(&record, c, i, "longitude")?,
            None => 0.0,
        };
        let alt = match layout.altitude_column {
            Some(c) => parse_column(&record, c, i, "altitude")?,
            None => 0.0,
        };

        fixes.push(GeoFix::new(secs - first_secs.unwrap_or(secs), lat, lon, alt));
        odometer.push(distance);
    }

    let track = Track::from_fixes(fixes)?
        .with_odometer(odometer)?
        .with_origin_epoch(origin_epoch);
    Ok(if layout.is_positioned() {
        track
    } else {
        track.without_positions()
    })
}

/// Loader for UTF-16 trip-log exports with a cumulative distance column.
pub struct TextExportLoader {
    layout: TextExportLayout,
}

impl TextExportLoader {
    pub fn new(layout: TextExportLayout) -> Self {
        Self { layout }
    }
}

impl TrackLoader for TextExportLoader {
    fn format(&self) -> TrackFormat {
        TrackFormat::TextExport
    }

    fn load(&self, path: &Path) -> Result<Track> {
        let bytes = fs::read(path)?;
        let text = decode_text(&bytes)?;
        parse_text_export_from_str(&text, &self.layout)
    }
}
