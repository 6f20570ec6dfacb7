use super::{usable_fps, FrameSource};
use anyhow::{anyhow, Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT},
};
use std::path::Path;

/// Sequential decoder backed by OpenCV's `VideoCapture`.
pub struct OpencvReader {
    capture: VideoCapture,
    fps: f64,
}

impl OpencvReader {
    pub fn new(path: &Path) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Non UTF-8 video path: {}", path.display()))?;
        let capture = VideoCapture::from_file(path_str, CAP_ANY)
            .with_context(|| format!("Failed to open video at: '{}'", path_str))?;
        if !capture.is_opened()? {
            return Err(anyhow!("Failed to open video file: {}", path_str));
        }

        let fps = usable_fps(capture.get(CAP_PROP_FPS)?, "OpencvReader");
        let raw_count = capture.get(CAP_PROP_FRAME_COUNT)?.max(0.0) as usize;

        tracing::info!(
            "OpencvReader: opened {}, duration={:.2}s, fps={:.2}, stream_frames={}",
            path_str,
            raw_count as f64 / fps,
            fps,
            raw_count
        );

        Ok(Self { capture, fps })
    }
}

impl FrameSource for OpencvReader {
    type Frame = Mat;

    fn fps(&self) -> f64 {
        self.fps
    }

    fn decode_next(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        let success = self.capture.read(&mut frame)?;
        if !success || frame.empty() {
            return Err(anyhow!("Failed to read frame"));
        }
        Ok(frame)
    }
}
