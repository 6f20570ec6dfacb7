// Geotag conversions and the tag writer seam
//
// The conversions produce EXIF-ready values; writing them into files is left to a
// `TagWriter` implementation.

pub mod exiftool;

use crate::error::Result;
use crate::pipeline::types::PlanEntry;
use chrono::{Local, TimeZone};
use serde::Serialize;
use std::fmt;
use std::path::Path;

pub use exiftool::ExiftoolWriter;

/// EXIF date-time layout
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Exact fraction. The denominator is always positive and the fraction is reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rational {
    pub numerator: i64,
    pub denominator: i64,
}

impl Rational {
    pub fn value(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs()
}

/// Rational equal to the shortest decimal form of `value` (so 0.1 becomes 1/10).
/// Values whose decimal form does not fit in 64 bits are rounded to 1e-9.
pub fn to_rational(value: f64) -> Rational {
    if !value.is_finite() {
        return Rational {
            numerator: 0,
            denominator: 1,
        };
    }

    let text = format!("{}", value);
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let exact = 10_i64
        .checked_pow(frac_part.len() as u32)
        .and_then(|den| {
            format!("{int_part}{frac_part}")
                .parse::<i64>()
                .ok()
                .map(|num| (num, den))
        });

    let (numerator, denominator) = exact.unwrap_or_else(|| {
        let den = 1_000_000_000_i64;
        ((value * den as f64).round() as i64, den)
    });

    let g = gcd(numerator, denominator).max(1);
    Rational {
        numerator: numerator / g,
        denominator: denominator / g,
    }
}

/// Degrees, minutes and seconds plus hemisphere reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Dms {
    pub degrees: u32,
    pub minutes: u32,
    pub seconds: f64,
    pub reference: &'static str,
}

impl Dms {
    pub fn to_decimal(&self) -> f64 {
        self.degrees as f64 + self.minutes as f64 / 60.0 + self.seconds / 3600.0
    }

    /// (degrees, minutes, seconds) as EXIF rationals
    pub fn to_rationals(&self) -> [Rational; 3] {
        [
            to_rational(self.degrees as f64),
            to_rational(self.minutes as f64),
            to_rational(self.seconds),
        ]
    }
}

/// Splits a signed decimal angle into DMS. `refs` is `[negative, positive]`,
/// e.g. `["S", "N"]` for latitude. Seconds are rounded to 5 decimals.
pub fn to_deg(value: f64, refs: [&'static str; 2]) -> Dms {
    let reference = if value < 0.0 { refs[0] } else { refs[1] };
    let abs = value.abs();
    let degrees = abs.trunc();
    let minutes_f = (abs - degrees) * 60.0;
    let mut minutes = minutes_f.trunc();
    let mut seconds = ((minutes_f - minutes) * 60.0 * 1e5).round() / 1e5;
    let mut degrees = degrees;
    if seconds >= 60.0 {
        seconds -= 60.0;
        minutes += 1.0;
    }
    if minutes >= 60.0 {
        minutes -= 60.0;
        degrees += 1.0;
    }
    Dms {
        degrees: degrees as u32,
        minutes: minutes as u32,
        seconds,
        reference,
    }
}

/// Local calendar time of `origin_epoch + relative_secs`, in EXIF layout.
pub fn to_datetime_string(origin_epoch: f64, relative_secs: f64) -> Option<String> {
    let t = origin_epoch + relative_secs;
    if !t.is_finite() {
        return None;
    }
    let secs = t.floor();
    let nanos = ((t - secs) * 1e9) as u32;
    Local
        .timestamp_opt(secs as i64, nanos.min(999_999_999))
        .single()
        .map(|dt| dt.format(EXIF_DATETIME_FORMAT).to_string())
}

/// Everything written into one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoTag {
    pub latitude: Dms,
    pub longitude: Dms,
    pub altitude: Rational,
    /// 0 above sea level, 1 below
    pub altitude_ref: u8,
    pub datetime: Option<String>,
}

impl GeoTag {
    pub fn from_entry(entry: &PlanEntry, origin_epoch: Option<f64>) -> Self {
        Self {
            latitude: to_deg(entry.latitude, ["S", "N"]),
            longitude: to_deg(entry.longitude, ["W", "E"]),
            altitude: to_rational(entry.altitude.abs()),
            altitude_ref: u8::from(entry.altitude < 0.0),
            datetime: origin_epoch.and_then(|o| to_datetime_string(o, entry.target_time)),
        }
    }
}

/// Embeds a geotag into a saved image.
pub trait TagWriter {
    fn write_tag(&self, image_path: &Path, tag: &GeoTag) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_to_deg_southern_hemisphere() {
        let dms = to_deg(-73.567, ["S", "N"]);
        assert_eq!(dms.reference, "S");
        assert_eq!(dms.degrees, 73);
        assert_eq!(dms.minutes, 34);
        assert_relative_eq!(dms.seconds, 1.2, epsilon = 1e-4);
        assert_relative_eq!(dms.to_decimal(), 73.567, epsilon = 1e-4);
    }

    #[test]
    fn test_to_deg_positive_and_zero() {
        let dms = to_deg(15.9819, ["W", "E"]);
        assert_eq!(dms.reference, "E");
        assert_relative_eq!(dms.to_decimal(), 15.9819, epsilon = 1e-6);
        assert_eq!(to_deg(0.0, ["S", "N"]).reference, "N");
    }

    #[test]
    fn test_to_deg_carries_rounded_seconds() {
        let dms = to_deg(10.9999999999, ["S", "N"]);
        assert_eq!(dms.degrees, 11);
        assert_eq!(dms.minutes, 0);
        assert_eq!(dms.seconds, 0.0);

        let dms = to_deg(-45.49999999999, ["W", "E"]);
        assert_eq!((dms.degrees, dms.minutes, dms.seconds), (45, 30, 0.0));
        assert_eq!(dms.reference, "W");
    }

    #[test]
    fn test_to_rational_is_exact_for_decimals() {
        assert_eq!(
            to_rational(0.1),
            Rational {
                numerator: 1,
                denominator: 10
            }
        );
        assert_eq!(
            to_rational(1.2),
            Rational {
                numerator: 6,
                denominator: 5
            }
        );
        assert_eq!(
            to_rational(250.0),
            Rational {
                numerator: 250,
                denominator: 1
            }
        );
        assert_eq!(
            to_rational(-0.75),
            Rational {
                numerator: -3,
                denominator: 4
            }
        );
        assert_eq!(to_rational(123.456).to_string(), "15432/125");
    }

    #[test]
    fn test_to_rational_long_expansion() {
        let r = to_rational(1.0 / 3.0);
        assert_relative_eq!(r.value(), 1.0 / 3.0, epsilon = 1e-9);
        assert!(r.denominator > 0);
    }

    #[test]
    fn test_datetime_string_layout() {
        let s = to_datetime_string(1_581_933_600.0, 90.5).unwrap();
        assert_eq!(s.len(), 19);
        assert_eq!(&s[4..5], ":");
        assert_eq!(&s[7..8], ":");
        assert_eq!(&s[10..11], " ");
        let expected = Local
            .timestamp_opt(1_581_933_690, 0)
            .single()
            .unwrap()
            .format(EXIF_DATETIME_FORMAT)
            .to_string();
        assert_eq!(s, expected);
        assert!(to_datetime_string(f64::NAN, 0.0).is_none());
    }

    #[test]
    fn test_geotag_from_entry() {
        let entry = PlanEntry {
            target_time: 10.0,
            latitude: 45.5,
            longitude: -0.25,
            altitude: -12.5,
        };
        let tag = GeoTag::from_entry(&entry, None);
        assert_eq!(tag.latitude.reference, "N");
        assert_eq!(tag.longitude.reference, "W");
        assert_eq!(tag.longitude.minutes, 15);
        assert_eq!(tag.altitude_ref, 1);
        assert_eq!(
            tag.altitude,
            Rational {
                numerator: 25,
                denominator: 2
            }
        );
        assert!(tag.datetime.is_none());
    }
}
