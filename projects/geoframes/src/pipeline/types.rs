use crate::track::GeoFix;
use serde::{Deserialize, Serialize};

/// A video time at which a frame should be captured, with the position it stands for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    /// Seconds from the start of the track (and video)
    pub target_time: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl PlanEntry {
    pub fn at_fix(fix: &GeoFix) -> Self {
        Self {
            target_time: fix.time,
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude: fix.altitude,
        }
    }

    /// Linear blend between two fixes at fraction `frac` of the way from `a` to `b`.
    pub fn between(a: &GeoFix, b: &GeoFix, frac: f64) -> Self {
        let lerp = |x: f64, y: f64| x + (y - x) * frac;
        Self {
            target_time: lerp(a.time, b.time),
            latitude: lerp(a.latitude, b.latitude),
            longitude: lerp(a.longitude, b.longitude),
            altitude: lerp(a.altitude, b.altitude),
        }
    }
}

/// A decoded frame matched to a plan entry
#[derive(Debug)]
pub struct AlignedFrame<F> {
    /// 0-based index of the frame in decode order
    pub frame_index: u64,
    /// frame_index / fps
    pub presentation_time: f64,
    pub entry: PlanEntry,
    pub image: F,
}

/// A frame ready for persistence
#[derive(Debug)]
pub struct ExportedImage<F> {
    pub sequence_index: usize,
    pub image: F,
    pub metadata: Option<PlanEntry>,
}

/// Counters kept by the frame aligner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlignStats {
    /// Decode attempts, successful or not
    pub decoded: u64,
    pub decode_failures: u64,
    pub matched: usize,
    /// Entries whose frame failed to decode
    pub missed: usize,
    /// Entries that shared a frame with an earlier entry
    pub collapsed: usize,
    /// Entries left when decoding was exhausted
    pub dropped: usize,
}

/// Counters kept by the exporter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub written: usize,
    pub write_failures: usize,
    pub tagged: usize,
    pub tag_failures: usize,
    pub batches: usize,
}
