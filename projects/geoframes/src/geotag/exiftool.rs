use super::{Dms, GeoTag, TagWriter};
use crate::error::{Error, Result};
use std::path::Path;
use std::process::Command;

/// Writes geotags by running the external `exiftool` program.
pub struct ExiftoolWriter {
    program: String,
}

impl ExiftoolWriter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

fn dms_arg(dms: &Dms) -> String {
    let [d, m, s] = dms.to_rationals();
    format!("{} {} {}", d.value(), m.value(), s.value())
}

/// Tag assignments passed to exiftool for one image.
pub fn tag_args(tag: &GeoTag) -> Vec<String> {
    let mut args = vec![
        "-overwrite_original".to_string(),
        format!("-GPSLatitude={}", dms_arg(&tag.latitude)),
        format!("-GPSLatitudeRef={}", tag.latitude.reference),
        format!("-GPSLongitude={}", dms_arg(&tag.longitude)),
        format!("-GPSLongitudeRef={}", tag.longitude.reference),
        format!("-GPSAltitude={}", tag.altitude.value()),
        format!("-GPSAltitudeRef#={}", tag.altitude_ref),
    ];
    if let Some(datetime) = &tag.datetime {
        args.push(format!("-DateTimeOriginal={}", datetime));
    }
    args
}

impl TagWriter for ExiftoolWriter {
    fn write_tag(&self, image_path: &Path, tag: &GeoTag) -> Result<()> {
        tracing::debug!(
            "Tagging {} at {:.6}{}, {:.6}{}",
            image_path.display(),
            tag.latitude.to_decimal(),
            tag.latitude.reference,
            tag.longitude.to_decimal(),
            tag.longitude.reference
        );
        let output = Command::new(&self.program)
            .args(tag_args(tag))
            .arg(image_path)
            .output()
            .map_err(|e| Error::TagWrite {
                path: image_path.to_path_buf(),
                reason: format!("failed to run {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            return Err(Error::TagWrite {
                path: image_path.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
