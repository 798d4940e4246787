use a2c_core::env::Observation;
use anyhow::{Context, Result, ensure};
use image::{RgbImage, imageops::FilterType};

/// Row major (H, W, 3) pixels, as returned by the emulator.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbFrame {
    pub pixels: Vec<u8>,
    pub height: usize,
    pub width: usize,
}

impl RgbFrame {
    pub fn new(pixels: Vec<u8>, height: usize, width: usize) -> Result<Self> {
        ensure!(
            pixels.len() == height * width * 3,
            "frame of {height}x{width} needs {} bytes, got {}",
            height * width * 3,
            pixels.len()
        );
        Ok(Self {
            pixels,
            height,
            width,
        })
    }
}

/// Resizes frames with an antialiasing filter and lays them out channel first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePreprocessor {
    pub width: usize,
    pub height: usize,
}

impl Default for FramePreprocessor {
    fn default() -> Self {
        Self {
            width: 82,
            height: 82,
        }
    }
}

impl FramePreprocessor {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn output_shape(&self) -> [usize; 3] {
        [3, self.height, self.width]
    }

    pub fn process(&self, frame: &RgbFrame) -> Result<Observation> {
        ensure!(
            self.width > 0 && self.height > 0,
            "frames cannot be resized to zero"
        );
        let image = RgbImage::from_raw(
            frame.width as u32,
            frame.height as u32,
            frame.pixels.clone(),
        )
        .context("frame buffer does not match its dimensions")?;
        let resized = if frame.width == self.width && frame.height == self.height {
            image
        } else {
            image::imageops::resize(
                &image,
                self.width as u32,
                self.height as u32,
                FilterType::Lanczos3,
            )
        };
        let plane = self.width * self.height;
        let mut data = vec![0f32; 3 * plane];
        for (idx, pixel) in resized.pixels().enumerate() {
            for channel in 0..3 {
                data[channel * plane + idx] = pixel[channel] as f32;
            }
        }
        Observation::new(data, self.output_shape().to_vec())
    }
}
