// Frame aligner: matches planned capture times against a one-pass frame stream
//
// Frame k (0-based decode attempt) is presented over [k / fps, (k + 1) / fps).
// A plan entry is satisfied by the frame whose interval contains its target time.
// Every decode attempt advances the clock by one frame period, failed or not.

use crate::pipeline::types::{AlignStats, AlignedFrame, PlanEntry};
use crate::video::FrameSource;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_MAX_DECODE_FAILURES: u32 = 100;

/// How decode failures are counted towards the stop threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCounting {
    /// Failures add up over the whole run; a good frame does not reset the count.
    Cumulative,
    /// A good frame resets the count, so only an unbroken run of failures stops.
    Consecutive,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AlignerConfig {
    pub max_decode_failures: u32,
    pub failure_counting: FailureCounting,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            max_decode_failures: DEFAULT_MAX_DECODE_FAILURES,
            failure_counting: FailureCounting::Cumulative,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignerState {
    Seeking,
    /// Every plan entry has been resolved.
    Done,
    /// The failure threshold was reached; unresolved entries were dropped.
    Exhausted,
}

pub struct FrameAligner<S: FrameSource> {
    source: S,
    fps: f64,
    config: AlignerConfig,
    pending: VecDeque<PlanEntry>,
    /// Presentation time of the next frame to decode
    previous: f64,
    /// Decode attempts so far
    count: u64,
    failures: u32,
    state: AlignerState,
    stats: AlignStats,
}

impl<S: FrameSource> FrameAligner<S> {
    /// Takes exclusive ownership of `source` for the rest of the run.
    /// `plan` must be ordered by target time.
    pub fn new(source: S, plan: Vec<PlanEntry>, config: AlignerConfig) -> Result<Self> {
        let fps = source.fps();
        if !(fps.is_finite() && fps > 0.0) {
            return Err(anyhow!("Frame source reports invalid fps {}", fps));
        }
        let state = if plan.is_empty() {
            AlignerState::Done
        } else {
            AlignerState::Seeking
        };
        Ok(Self {
            source,
            fps,
            config,
            pending: plan.into(),
            previous: 0.0,
            count: 0,
            failures: 0,
            state,
            stats: AlignStats::default(),
        })
    }

    pub fn state(&self) -> AlignerState {
        self.state
    }

    pub fn stats(&self) -> &AlignStats {
        &self.stats
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Decodes one frame and resolves the plan entries that fall into its interval.
    /// Returns the frame when it satisfies an entry.
    pub fn step(&mut self) -> Option<AlignedFrame<S::Frame>> {
        if self.state != AlignerState::Seeking {
            return None;
        }
        if self.pending.is_empty() {
            self.state = AlignerState::Done;
            return None;
        }
        if self.failures >= self.config.max_decode_failures {
            self.exhaust();
            return None;
        }

        let frame_index = self.count;
        let decoded = self.source.decode_next();
        self.count += 1;
        self.stats.decoded += 1;
        let timestamp = self.count as f64 / self.fps;

        let image = match decoded {
            Ok(image) => {
                if self.config.failure_counting == FailureCounting::Consecutive {
                    self.failures = 0;
                }
                Some(image)
            }
            Err(e) => {
                self.failures += 1;
                self.stats.decode_failures += 1;
                tracing::debug!(
                    "Decode failure {} at frame {}: {}",
                    self.failures,
                    frame_index,
                    e
                );
                None
            }
        };

        let mut matched = None;
        if let Some(front) = self.pending.front().copied() {
            if front.target_time >= self.previous && front.target_time < timestamp {
                self.pending.pop_front();
                match image {
                    Some(image) => {
                        tracing::debug!(
                            "Frame {} ({:.3}s) matches target {:.3}s",
                            frame_index,
                            self.previous,
                            front.target_time
                        );
                        self.stats.matched += 1;
                        matched = Some(AlignedFrame {
                            frame_index,
                            presentation_time: self.previous,
                            entry: front,
                            image,
                        });
                    }
                    None => {
                        tracing::warn!(
                            "Target {:.3}s fell on undecodable frame {}",
                            front.target_time,
                            frame_index
                        );
                        self.stats.missed += 1;
                    }
                }
                // Later entries inside the same interval cannot get a frame of their own.
                while self
                    .pending
                    .front()
                    .is_some_and(|next| next.target_time < timestamp)
                {
                    self.pending.pop_front();
                    self.stats.collapsed += 1;
                }
            }
        }

        self.previous = timestamp;
        if self.pending.is_empty() {
            self.state = AlignerState::Done;
        }
        matched
    }

    /// Steps until `limit` frames are matched or a terminal state is reached.
    /// Batch boundaries do not change which frames are selected.
    pub fn next_batch(&mut self, limit: usize) -> Vec<AlignedFrame<S::Frame>> {
        let mut batch = Vec::with_capacity(limit.min(self.pending.len()));
        while batch.len() < limit && self.state == AlignerState::Seeking {
            if let Some(frame) = self.step() {
                batch.push(frame);
            }
        }
        batch
    }

    fn exhaust(&mut self) {
        self.stats.dropped += self.pending.len();
        if !self.pending.is_empty() {
            tracing::info!(
                "Decoding exhausted after {} failures at frame {}; dropping {} unmatched targets",
                self.failures,
                self.count,
                self.pending.len()
            );
        }
        self.pending.clear();
        self.state = AlignerState::Exhausted;
    }
}
