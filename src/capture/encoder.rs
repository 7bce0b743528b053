use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use super::frame::Frame;
use super::source::SourceKind;
use crate::config::CaptureConfig;
use crate::error::TranslateError;

/// Turns frames into the JPEG payload sent to the analyze endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameEncoder {
    quality: u8,
    mirror: bool,
}

impl FrameEncoder {
    pub fn new(encode_quality: f32, mirror: bool) -> Self {
        Self {
            quality: jpeg_quality(encode_quality),
            mirror,
        }
    }

    /// Front cameras are previewed mirrored, so their frames are flipped to
    /// match. Uploads are sent as-is.
    pub fn for_source(config: &CaptureConfig, kind: SourceKind) -> Self {
        Self::new(config.encode_quality, config.mirror && kind == SourceKind::Camera)
    }

    pub fn mirrors(&self) -> bool {
        self.mirror
    }

    /// `Ok(None)` when the frame has no area yet; the caller skips this cycle.
    pub fn encode(&self, frame: &Frame) -> Result<Option<Vec<u8>>, TranslateError> {
        let Some(image) = self.prepare(frame)? else {
            return Ok(None);
        };

        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, self.quality)
            .encode_image(&image)
            .map_err(|e| TranslateError::Encode(format!("JPEG encode failed: {}", e)))?;
        Ok(Some(buffer))
    }

    pub(crate) fn prepare(&self, frame: &Frame) -> Result<Option<RgbImage>, TranslateError> {
        if !frame.has_dimensions() {
            return Ok(None);
        }
        if frame.data.len() != frame.expected_len() {
            return Err(TranslateError::Encode(format!(
                "{}x{} frame carries {} bytes, expected {}",
                frame.width,
                frame.height,
                frame.data.len(),
                frame.expected_len()
            )));
        }

        let mut image = RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| TranslateError::Encode("frame buffer rejected".into()))?;
        if self.mirror {
            image::imageops::flip_horizontal_in_place(&mut image);
        }
        Ok(Some(image))
    }
}

fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}
