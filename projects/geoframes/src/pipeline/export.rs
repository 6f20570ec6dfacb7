// Export: persists matched frames batch by batch and geotags them

use crate::geotag::{GeoTag, TagWriter};
use crate::pipeline::types::{AlignedFrame, ExportStats, ExportedImage};
use anyhow::{anyhow, Result};
use opencv::core::{Mat, Vector};
use opencv::imgcodecs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ImageFormat {
    Png,
    Jpg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
        }
    }
}

/// Writes one image to disk.
pub trait ImageSink<F> {
    fn save(&mut self, path: &Path, image: &F) -> Result<()>;
}

/// Blanket implementation so closures can act as sinks.
impl<F, C> ImageSink<F> for C
where
    C: FnMut(&Path, &F) -> Result<()>,
{
    fn save(&mut self, path: &Path, image: &F) -> Result<()> {
        self(path, image)
    }
}

pub struct OpencvImageSink;

impl ImageSink<Mat> for OpencvImageSink {
    fn save(&mut self, path: &Path, image: &Mat) -> Result<()> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Non UTF-8 output path: {}", path.display()))?;
        if !imgcodecs::imwrite(path_str, image, &Vector::new())? {
            return Err(anyhow!("imwrite refused {}", path_str));
        }
        Ok(())
    }
}

/// Digits needed to name `total` images, e.g. 100 -> 3.
pub fn index_width(total: usize) -> usize {
    total.to_string().len()
}

pub fn image_name(index: usize, width: usize, extension: &str) -> String {
    format!("{:0width$}.{}", index, extension, width = width)
}

/// Writes batches of matched frames into `output_dir` with stable, zero-padded names.
pub struct Exporter<'a, F> {
    output_dir: PathBuf,
    extension: &'static str,
    width: usize,
    next_index: usize,
    sink: &'a mut dyn ImageSink<F>,
    tagger: Option<&'a dyn TagWriter>,
    origin_epoch: Option<f64>,
    attach_metadata: bool,
    stats: ExportStats,
}

impl<'a, F> Exporter<'a, F> {
    /// `capacity` is the most images this run can produce (the plan length); it fixes
    /// the name width up front so names stay consistent across batches.
    pub fn new(
        output_dir: &Path,
        format: ImageFormat,
        capacity: usize,
        sink: &'a mut dyn ImageSink<F>,
    ) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            extension: format.extension(),
            width: index_width(capacity),
            next_index: 0,
            sink,
            tagger: None,
            origin_epoch: None,
            attach_metadata: false,
            stats: ExportStats::default(),
        }
    }

    /// Keeps plan positions with each image (positioned tracks only).
    pub fn with_metadata(mut self, attach: bool) -> Self {
        self.attach_metadata = attach;
        self
    }

    pub fn with_tagger(mut self, tagger: &'a dyn TagWriter, origin_epoch: Option<f64>) -> Self {
        self.tagger = Some(tagger);
        self.origin_epoch = origin_epoch;
        self
    }

    pub fn stats(&self) -> &ExportStats {
        &self.stats
    }

    pub fn path_for(&self, sequence_index: usize) -> PathBuf {
        self.output_dir
            .join(image_name(sequence_index, self.width, self.extension))
    }

    /// Writes a batch in order. A failed write or tag is logged and counted; the rest
    /// of the batch continues. Returns the paths written.
    pub fn flush(&mut self, batch: Vec<AlignedFrame<F>>) -> Vec<PathBuf> {
        let mut written = Vec::with_capacity(batch.len());
        for aligned in batch {
            tracing::debug!(
                "Exporting frame {} ({:.3}s) for target {:.3}s",
                aligned.frame_index,
                aligned.presentation_time,
                aligned.entry.target_time
            );
            let exported = ExportedImage {
                sequence_index: self.next_index,
                metadata: self.attach_metadata.then_some(aligned.entry),
                image: aligned.image,
            };
            self.next_index += 1;

            let path = self.path_for(exported.sequence_index);
            if let Err(e) = self.sink.save(&path, &exported.image) {
                tracing::warn!("Failed to write image {}: {}", path.display(), e);
                self.stats.write_failures += 1;
                continue;
            }
            self.stats.written += 1;

            if let (Some(tagger), Some(entry)) = (self.tagger, exported.metadata.as_ref()) {
                let tag = GeoTag::from_entry(entry, self.origin_epoch);
                match tagger.write_tag(&path, &tag) {
                    Ok(()) => self.stats.tagged += 1,
                    Err(e) => {
                        tracing::warn!("{}", e);
                        self.stats.tag_failures += 1;
                    }
                }
            }
            written.push(path);
        }
        self.stats.batches += 1;
        written
    }
}
