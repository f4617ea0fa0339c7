use crate::errors::{HistogramError, Result};
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A borrowed 8-bit RGB view over a frame's pixel buffer
pub type RgbView<'a> = ImageBuffer<Rgb<u8>, &'a [u8]>;

/// Storage size of a single channel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelDepth {
    U8,
    U16,
    F32,
}

impl PixelDepth {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            PixelDepth::U8 => 1,
            PixelDepth::U16 => 2,
            PixelDepth::F32 => 4,
        }
    }

    fn from_sample_size(bytes: usize) -> Option<Self> {
        match bytes {
            1 => Some(PixelDepth::U8),
            2 => Some(PixelDepth::U16),
            4 => Some(PixelDepth::F32),
            _ => None,
        }
    }
}

/// A decoded frame with tightly packed, interleaved rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: u32,
    depth: PixelDepth,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, channels: u32, depth: PixelDepth, data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(channels as usize))
            .and_then(|n| n.checked_mul(depth.bytes_per_sample()))
            .ok_or(HistogramError::FrameSizeMismatch {
                width,
                height,
                expected: usize::MAX,
                actual: data.len(),
            })?;
        if data.len() != expected {
            return Err(HistogramError::FrameSizeMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            channels,
            depth,
            data,
        })
    }

    pub fn from_rgb8(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            channels: 3,
            depth: PixelDepth::U8,
            data: image.into_raw(),
        }
    }

    /// Wraps a decoded image keeping its channel layout and sample depth,
    /// so that frames which are not 8-bit RGB still reach validation as-is.
    pub fn from_dynamic_image(image: &DynamicImage) -> Result<Self> {
        let color = image.color();
        let channels = color.channel_count() as u32;
        let sample_size = color.bytes_per_pixel() as usize / channels.max(1) as usize;
        let depth = PixelDepth::from_sample_size(sample_size).ok_or_else(|| {
            HistogramError::InvalidOperation {
                message: format!("unsupported image color type {:?}", color),
            }
        })?;

        Self::new(image.width(), image.height(), channels, depth, image.as_bytes().to_vec())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn depth(&self) -> PixelDepth {
        self.depth
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Checks that the frame can be binned as 8-bit, 3-channel intensities.
    /// `index` is the frame's row in the batch and is reported on failure.
    pub fn validate_for_histogram(&self, index: usize) -> Result<()> {
        if self.channels != 3 {
            return Err(HistogramError::UnsupportedChannels {
                index,
                channels: self.channels,
            });
        }
        if self.depth != PixelDepth::U8 {
            return Err(HistogramError::UnsupportedDepth {
                index,
                depth: self.depth,
            });
        }
        // Bin counts are u32 in the record
        if self.pixel_count() > u32::MAX as u64 {
            return Err(HistogramError::FrameTooLarge {
                index,
                pixels: self.pixel_count(),
            });
        }
        Ok(())
    }

    /// Interprets the frame as a 3-channel 8-bit image.
    /// Returns `None` for any other layout.
    pub fn as_rgb_view(&self) -> Option<RgbView<'_>> {
        if self.channels != 3 || self.depth != PixelDepth::U8 {
            return None;
        }
        ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
    }
}

/// Decodes an image file into an 8-bit RGB frame
pub fn load_frame(path: &Path) -> Result<Frame> {
    if !path.exists() {
        return Err(HistogramError::ImageLoadError {
            path: path.to_path_buf(),
            message: "file not found".to_string(),
        });
    }

    let image = image::open(path).map_err(|e| HistogramError::ImageLoadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    tracing::trace!(path = %path.display(), width = image.width(), height = image.height(), "decoded frame");
    Ok(Frame::from_rgb8(image.to_rgb8()))
}
