// Sampling planner: turns traveled distance into capture times
//
// The accumulator sums segment distances fix by fix. Once it is strictly greater
// than the interval, entries are emitted for the segment that crossed it and the
// accumulator restarts at zero (the overshoot is discarded).

use crate::pipeline::types::PlanEntry;
use crate::track::distance::segment_distances;
use crate::track::{GeoFix, Track, TrackFormat};
use serde::{Deserialize, Serialize};

pub const DEFAULT_INTERVAL_KM: f64 = 0.01;

/// How entries are placed when the accumulator crosses the interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingPolicy {
    /// One entry at the fix that crossed the interval.
    SnapToFix,
    /// floor(accumulated / interval) entries spread evenly in time across the
    /// crossing segment, starting at its first fix.
    InterpolateTime,
}

impl SamplingPolicy {
    /// Policy that matches how each track format is sampled.
    pub fn for_format(format: TrackFormat) -> Self {
        match format {
            TrackFormat::GpsJson => Self::SnapToFix,
            TrackFormat::TextExport => Self::InterpolateTime,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlannerConfig {
    pub interval_km: f64,
    pub policy: SamplingPolicy,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            interval_km: DEFAULT_INTERVAL_KM,
            policy: SamplingPolicy::SnapToFix,
        }
    }
}

fn emit(
    policy: SamplingPolicy,
    from: &GeoFix,
    to: &GeoFix,
    accumulated: f64,
    interval_km: f64,
    out: &mut Vec<PlanEntry>,
) {
    match policy {
        SamplingPolicy::SnapToFix => out.push(PlanEntry::at_fix(to)),
        SamplingPolicy::InterpolateTime => {
            let count = (accumulated / interval_km).floor() as usize;
            out.extend((0..count).map(|k| PlanEntry::between(from, to, k as f64 / count as f64)));
        }
    }
}

/// Computes capture targets for `track`, ordered by target time.
///
/// Tracks with fewer than two fixes yield an empty plan.
pub fn plan(track: &Track, config: &PlannerConfig) -> Vec<PlanEntry> {
    if track.len() < 2 {
        return Vec::new();
    }

    let segments = segment_distances(track);
    let fixes = track.fixes();

    let (_, entries) = (1..fixes.len()).fold(
        (0.0_f64, Vec::new()),
        |(accumulated, mut out), i| {
            let accumulated = accumulated + segments[i];
            if accumulated > config.interval_km {
                emit(
                    config.policy,
                    &fixes[i - 1],
                    &fixes[i],
                    accumulated,
                    config.interval_km,
                    &mut out,
                );
                (0.0, out)
            } else {
                (accumulated, out)
            }
        },
    );

    tracing::debug!(
        "Planned {} entries over {} fixes ({:?}, interval {} km)",
        entries.len(),
        fixes.len(),
        config.policy,
        config.interval_km
    );
    entries
}
