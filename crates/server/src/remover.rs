use std::{collections::VecDeque, io::Cursor};

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_TOLERANCE: u8 = 30;

#[derive(Debug, Error)]
pub enum RemoveError {
    #[error("cannot identify image file: {0}")]
    Decode(String),
    #[error("failed to encode PNG: {0}")]
    Encode(String),
}

/// Turns an encoded image into a PNG whose background is transparent.
pub trait BackgroundRemover: Send + Sync {
    fn remove(&self, input: &[u8]) -> Result<Vec<u8>, RemoveError>;
}

/// Clears every pixel connected to the image border whose color stays within
/// `tolerance` (per channel) of the average border color.
#[derive(Debug, Clone, Copy)]
pub struct BorderFloodRemover {
    tolerance: u8,
}

impl Default for BorderFloodRemover {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl BorderFloodRemover {
    pub fn new(tolerance: u8) -> Self {
        Self { tolerance }
    }

    fn clear_background(&self, image: &mut RgbaImage) -> usize {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return 0;
        }

        let reference = border_average(image);
        let mut visited = vec![false; width as usize * height as usize];
        let mut queue = VecDeque::new();
        for (x, y) in border_coordinates(width, height) {
            queue.push_back((x, y));
        }

        let mut cleared = 0;
        while let Some((x, y)) = queue.pop_front() {
            let index = y as usize * width as usize + x as usize;
            if visited[index] {
                continue;
            }
            visited[index] = true;

            let pixel = image.get_pixel_mut(x, y);
            if !self.matches(pixel, reference) {
                continue;
            }
            pixel.0[3] = 0;
            cleared += 1;

            if x > 0 {
                queue.push_back((x - 1, y));
            }
            if x + 1 < width {
                queue.push_back((x + 1, y));
            }
            if y > 0 {
                queue.push_back((x, y - 1));
            }
            if y + 1 < height {
                queue.push_back((x, y + 1));
            }
        }
        cleared
    }

    fn matches(&self, pixel: &Rgba<u8>, reference: [u8; 3]) -> bool {
        pixel.0[3] == 0
            || pixel.0[..3]
                .iter()
                .zip(reference)
                .all(|(channel, expected)| channel.abs_diff(expected) <= self.tolerance)
    }
}

impl BackgroundRemover for BorderFloodRemover {
    fn remove(&self, input: &[u8]) -> Result<Vec<u8>, RemoveError> {
        let decoded =
            image::load_from_memory(input).map_err(|err| RemoveError::Decode(err.to_string()))?;
        debug!(
            width = decoded.width(),
            height = decoded.height(),
            color = ?decoded.color(),
            "image opened"
        );

        let mut rgba = decoded.to_rgba8();
        let cleared = self.clear_background(&mut rgba);
        debug!(cleared, "background pixels cleared");

        let mut out = Vec::new();
        DynamicImage::ImageRgba8(rgba)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .map_err(|err| RemoveError::Encode(err.to_string()))?;
        Ok(out)
    }
}

fn border_coordinates(width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    let horizontal = (0..width).flat_map(move |x| [(x, 0), (x, height - 1)]);
    let vertical = (0..height).flat_map(move |y| [(0, y), (width - 1, y)]);
    horizontal.chain(vertical)
}

fn border_average(image: &RgbaImage) -> [u8; 3] {
    let (width, height) = image.dimensions();
    let mut sums = [0u64; 3];
    let mut count = 0u64;
    for (x, y) in border_coordinates(width, height) {
        let pixel = image.get_pixel(x, y);
        for (sum, channel) in sums.iter_mut().zip(pixel.0) {
            *sum += u64::from(channel);
        }
        count += 1;
    }
    sums.map(|sum| (sum / count.max(1)) as u8)
}

#[cfg(test)]
#[path = "tests/remover_tests.rs"]
mod tests;
