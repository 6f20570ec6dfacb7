pub mod ffmpeg_reader;
pub mod opencv_reader;

use anyhow::Result;
use opencv::core::Mat;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fallback used when the container does not report a usable frame rate.
pub const FALLBACK_FPS: f64 = 30.0;

/// A one-pass stream of decoded frames. Frames come out strictly in order and the
/// stream cannot be rewound; reopen the file to start over.
pub trait FrameSource {
    type Frame;

    fn fps(&self) -> f64;

    /// Decodes the next frame. An error is one decode failure; the caller decides
    /// whether to keep reading.
    fn decode_next(&mut self) -> Result<Self::Frame>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    type Frame = S::Frame;

    fn fps(&self) -> f64 {
        (**self).fps()
    }

    fn decode_next(&mut self) -> Result<Self::Frame> {
        (**self).decode_next()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    Opencv,
    Ffmpeg,
}

pub fn open_source(path: &Path, backend: Backend) -> Result<Box<dyn FrameSource<Frame = Mat>>> {
    let source: Box<dyn FrameSource<Frame = Mat>> = match backend {
        Backend::Opencv => Box::new(opencv_reader::OpencvReader::new(path)?),
        Backend::Ffmpeg => Box::new(ffmpeg_reader::FfmpegReader::new(path)?),
    };
    Ok(source)
}

pub(crate) fn usable_fps(fps: f64, backend: &str) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        tracing::warn!(
            "{}: failed to get FPS from metadata, falling back to {:.1}",
            backend,
            FALLBACK_FPS
        );
        FALLBACK_FPS
    }
}
