use super::{usable_fps, FrameSource};
use anyhow::{anyhow, Context, Result};
use ffmpeg_next::ffi;
use opencv::{core, prelude::*};
use std::path::Path;

/// Sequential software decoder backed by FFmpeg via ffmpeg-next.
/// Frames are converted to BGR24 and handed out as OpenCV `Mat`s.
pub struct FfmpegReader {
    input_ctx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::codec::decoder::Video,
    video_stream_index: usize,
    /// Created on the first frame, once the decoded pixel format is known.
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    width: u32,
    height: u32,
    fps: f64,
    packet: ffmpeg_next::codec::packet::Packet,
    eof_sent: bool,
}

impl FfmpegReader {
    pub fn new(path: &Path) -> Result<Self> {
        ffmpeg_next::init().context("Failed to initialize FFmpeg")?;

        if !path.exists() {
            return Err(anyhow!("Video file not found: {}", path.display()));
        }

        let input_ctx = ffmpeg_next::format::input(&path)
            .with_context(|| format!("Failed to open video with ffmpeg at: '{}'", path.display()))?;

        let video_stream = input_ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| anyhow!("No video stream found in {}", path.display()))?;
        let video_stream_index = video_stream.index();

        let rational_fps = video_stream.avg_frame_rate();
        let raw_fps = if rational_fps.denominator() > 0 {
            rational_fps.numerator() as f64 / rational_fps.denominator() as f64
        } else {
            0.0
        };
        let fps = usable_fps(raw_fps, "FfmpegReader");
        let duration_secs = input_ctx.duration() as f64 / ffi::AV_TIME_BASE as f64;

        let decoder = ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())
            .context("Failed to create decoder context")?
            .decoder()
            .video()
            .context("Failed to open video decoder")?;

        let width = decoder.width();
        let height = decoder.height();

        tracing::info!(
            "FfmpegReader: opened {}, duration={:.2}s, fps={:.2}, {}x{}",
            path.display(),
            duration_secs,
            fps,
            width,
            height
        );

        Ok(Self {
            input_ctx,
            decoder,
            video_stream_index,
            scaler: None,
            width,
            height,
            fps,
            packet: ffmpeg_next::codec::packet::Packet::empty(),
            eof_sent: false,
        })
    }

    /// Pulls the next decoded frame, feeding packets until one comes out.
    fn decode_loop(&mut self, target: &mut ffmpeg_next::util::frame::Video) -> Result<()> {
        loop {
            match self.decoder.receive_frame(target) {
                Ok(()) => return Ok(()),
                Err(ffmpeg_next::Error::Other { errno: ffi::EAGAIN }) => {
                    if self.eof_sent {
                        return Err(anyhow!("End of stream"));
                    }
                }
                Err(ffmpeg_next::Error::Eof) => return Err(anyhow!("End of stream")),
                Err(e) => return Err(anyhow!("Decoder error: {}", e)),
            }

            let mut found_packet = false;
            while self.packet.read(&mut self.input_ctx).is_ok() {
                if self.packet.stream() == self.video_stream_index {
                    self.decoder
                        .send_packet(&self.packet)
                        .context("Failed to send packet to decoder")?;
                    found_packet = true;
                    break;
                }
            }

            if !found_packet {
                // Input exhausted: flush the decoder, then drain what it still holds.
                self.decoder
                    .send_eof()
                    .context("Failed to send EOF to decoder")?;
                self.eof_sent = true;
            }
        }
    }

    fn to_bgr(&mut self, frame: &ffmpeg_next::util::frame::Video) -> Result<ffmpeg_next::util::frame::Video> {
        if self.scaler.is_none() {
            let scaler = ffmpeg_next::software::scaling::Context::get(
                frame.format(),
                self.width,
                self.height,
                ffmpeg_next::format::Pixel::BGR24,
                self.width,
                self.height,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )
            .context("Failed to create scaler")?;
            self.scaler = Some(scaler);
        }
        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| anyhow!("Scaler unavailable"))?;

        let mut bgr = ffmpeg_next::util::frame::Video::empty();
        scaler.run(frame, &mut bgr).context("Scaler failed")?;
        Ok(bgr)
    }
}

/// Deep-copies a BGR24 frame into an owned OpenCV `Mat`.
fn bgr_frame_to_mat(frame: &ffmpeg_next::util::frame::Video) -> Result<core::Mat> {
    let width = frame.width() as usize;
    let height = frame.height() as i32;
    let data = frame.data(0);
    let stride = frame.stride(0);
    let row_bytes = width * 3;

    let mut mat = unsafe { core::Mat::new_rows_cols(height, width as i32, core::CV_8UC3)? };
    for y in 0..height as usize {
        let src_row = &data[y * stride..y * stride + row_bytes];
        let dst_ptr = mat.ptr_mut(y as i32)?;
        // SAFETY: each Mat row holds `width * 3` bytes for CV_8UC3.
        unsafe {
            std::ptr::copy_nonoverlapping(src_row.as_ptr(), dst_ptr, row_bytes);
        }
    }
    Ok(mat)
}

impl FrameSource for FfmpegReader {
    type Frame = core::Mat;

    fn fps(&self) -> f64 {
        self.fps
    }

    fn decode_next(&mut self) -> Result<core::Mat> {
        let mut raw = ffmpeg_next::util::frame::Video::empty();
        self.decode_loop(&mut raw)?;
        let bgr = self.to_bgr(&raw)?;
        bgr_frame_to_mat(&bgr)
    }
}
