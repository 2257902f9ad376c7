use crate::error::DetectorError;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// JPEG compressed frame
    Mjpeg,
    /// Packed 8-bit RGB, no row padding
    Rgb24,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Mjpeg => 0, // Variable size, compressed
            FrameFormat::Rgb24 => 3,
        }
    }

    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// Frame data structure containing raw frame data and metadata
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Source-assigned frame identifier
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw frame data (shared ownership, clones never copy pixels)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame format
    pub format: FrameFormat,
}

impl FrameData {
    /// Create a new frame data instance
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Get the expected frame size for uncompressed formats
    pub fn expected_size(&self) -> Option<usize> {
        if self.format.is_compressed() {
            None
        } else {
            Some(self.width as usize * self.height as usize * self.format.bytes_per_pixel())
        }
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        match self.expected_size() {
            Some(expected) => self.data.len() == expected,
            None => !self.data.is_empty(),
        }
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Decode the frame into an RGB image for inference and annotation
    pub fn to_rgb_image(&self) -> Result<RgbImage, DetectorError> {
        match self.format {
            FrameFormat::Rgb24 => {
                if !self.validate_size() {
                    return Err(DetectorError::Decode {
                        details: format!(
                            "frame {} has {} bytes, expected {}",
                            self.id,
                            self.data.len(),
                            self.expected_size().unwrap_or_default()
                        ),
                    });
                }
                RgbImage::from_raw(self.width, self.height, self.data.as_ref().clone()).ok_or_else(
                    || DetectorError::Decode {
                        details: format!("frame {} does not fit {}x{}", self.id, self.width, self.height),
                    },
                )
            }
            FrameFormat::Mjpeg => image::load_from_memory_with_format(&self.data, image::ImageFormat::Jpeg)
                .map(|img| img.to_rgb8())
                .map_err(|e| DetectorError::Decode {
                    details: format!("JPEG decode of frame {} failed: {}", self.id, e),
                }),
        }
    }
}
