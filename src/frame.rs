// src/frame.rs

use crate::error::{Result, VidsimError};
use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};

/// One decoded picture, stored row-major as `height × width × channels` 8-bit samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl Frame {
    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        let expected = frame_size(width, height, channels);
        if channels == 0 || data.len() != expected {
            return Err(VidsimError::Decode(format!(
                "frame buffer holds {} bytes, expected {} for {}x{}x{}",
                data.len(),
                expected,
                width,
                height,
                channels
            )));
        }
        Ok(Frame {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Array shape in `(height, width, channels)` order.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, self.channels as usize)
    }

    pub fn is_rgb(&self) -> bool {
        self.channels() == 3
    }

    /// Widens (or narrows) the frame to 8-bit RGB. Gray planes are replicated
    /// and alpha is dropped.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let (w, h) = (self.width, self.height);
        let data = self.data.clone();
        let image = match self.channels {
            1 => GrayImage::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
            2 => GrayAlphaImage::from_raw(w, h, data).map(DynamicImage::ImageLumaA8),
            3 => return RgbImage::from_raw(w, h, data).ok_or_else(|| self.layout_error()),
            4 => RgbaImage::from_raw(w, h, data).map(DynamicImage::ImageRgba8),
            _ => None,
        };
        image
            .map(|img| img.into_rgb8())
            .ok_or_else(|| self.layout_error())
    }

    fn layout_error(&self) -> VidsimError {
        VidsimError::Decode(format!(
            "cannot build an image from a {}x{} frame with {} channel(s)",
            self.width, self.height, self.channels
        ))
    }
}

/// Byte length of one raw frame.
pub fn frame_size(width: u32, height: u32, channels: u8) -> usize {
    width as usize * height as usize * channels as usize
}

/// A stream of frames read one at a time, in order.
///
/// `read` returns `Ok(None)` once the stream has no more frames; a stream can
/// stay open after it is exhausted.
pub trait FrameSource {
    fn is_opened(&self) -> bool;

    fn read(&mut self) -> Result<Option<Frame>>;
}
