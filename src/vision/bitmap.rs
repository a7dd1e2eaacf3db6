//! Pixel buffer snapshots and ink analysis
//!
//! A `PixelBuffer` is an immutable RGBA snapshot of a drawing surface. The ink
//! intensity of a pixel is its alpha channel, independent of color.

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building a pixel buffer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BitmapError {
    #[error("pixel buffer dimensions must be positive, got {width}x{height}")]
    EmptyDimensions { width: u32, height: u32 },
    #[error("expected {expected} bytes of pixel data, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Errors raised by ink analysis
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// Centroid requested on a buffer with no ink at all
    #[error("center of mass is undefined for a buffer without ink")]
    DivisionByZero,
}

/// Immutable snapshot of a drawing surface
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    /// Wrap an existing RGBA image
    pub fn from_image(image: RgbaImage) -> Result<Self, BitmapError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(BitmapError::EmptyDimensions { width, height });
        }
        Ok(Self { image })
    }

    /// Build from one intensity byte per pixel, drawn as black ink
    pub fn from_intensities(width: u32, height: u32, intensities: &[u8]) -> Result<Self, BitmapError> {
        if width == 0 || height == 0 {
            return Err(BitmapError::EmptyDimensions { width, height });
        }
        let expected = width as usize * height as usize;
        if intensities.len() != expected {
            return Err(BitmapError::LengthMismatch {
                expected,
                actual: intensities.len(),
            });
        }
        let image = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([0, 0, 0, intensities[(y * width + x) as usize]])
        });
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Borrow the underlying image
    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }
}

/// Minimal axis-aligned rectangle around all inked pixels. A buffer without
/// ink reports the `{0,0,0,0}` default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Real-valued point in buffer coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Compute the bounding box of every pixel with non-zero ink
pub fn bounding_box(buffer: &PixelBuffer) -> BoundingBox {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut inked = false;

    for (x, y, pixel) in buffer.image.enumerate_pixels() {
        if pixel[3] > 0 {
            inked = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if !inked {
        return BoundingBox::default();
    }

    BoundingBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    }
}

/// Sum of all ink intensities
pub fn total_mass(buffer: &PixelBuffer) -> u64 {
    buffer.image.pixels().map(|p| p[3] as u64).sum()
}

/// Intensity-weighted centroid of the ink
pub fn center_of_mass(buffer: &PixelBuffer) -> Result<Point, AnalysisError> {
    let mut mass = 0u64;
    let mut moment_x = 0u64;
    let mut moment_y = 0u64;

    for (x, y, pixel) in buffer.image.enumerate_pixels() {
        let m = pixel[3] as u64;
        mass += m;
        moment_x += m * x as u64;
        moment_y += m * y as u64;
    }

    if mass == 0 {
        return Err(AnalysisError::DivisionByZero);
    }

    Ok(Point {
        x: moment_x as f64 / mass as f64,
        y: moment_y as f64 / mass as f64,
    })
}

/// Ink intensity of every pixel, row-major
pub fn channel_values(buffer: &PixelBuffer) -> Vec<u8> {
    buffer.image.pixels().map(|p| p[3]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::from_image(RgbaImage::new(width, height)).unwrap()
    }

    fn single_pixel(width: u32, height: u32, x: u32, y: u32, value: u8) -> PixelBuffer {
        let mut data = vec![0u8; (width * height) as usize];
        data[(y * width + x) as usize] = value;
        PixelBuffer::from_intensities(width, height, &data).unwrap()
    }

    #[test]
    fn test_bounding_box_blank_is_degenerate() {
        let buffer = blank(40, 30);
        let bounds = bounding_box(&buffer);
        assert_eq!(bounds, BoundingBox { x: 0, y: 0, width: 0, height: 0 });
    }

    #[test]
    fn test_bounding_box_single_pixel() {
        let buffer = single_pixel(28, 28, 10, 10, 255);
        let bounds = bounding_box(&buffer);
        assert_eq!(bounds, BoundingBox { x: 10, y: 10, width: 0, height: 0 });
        assert_ne!(bounds, BoundingBox::default());
    }

    #[test]
    fn test_bounding_box_full_buffer() {
        let buffer = PixelBuffer::from_intensities(28, 28, &[255; 784]).unwrap();
        assert_eq!(bounding_box(&buffer), BoundingBox { x: 0, y: 0, width: 27, height: 27 });
    }

    #[test]
    fn test_bounding_box_stays_inside_buffer() {
        let (w, h) = (17u32, 11u32);
        let mut data = vec![0u8; (w * h) as usize];
        for (i, value) in data.iter_mut().enumerate() {
            if i % 7 == 3 || i % 13 == 0 {
                *value = (i % 251) as u8 + 1;
            }
        }
        let buffer = PixelBuffer::from_intensities(w, h, &data).unwrap();
        let b = bounding_box(&buffer);
        assert!(b.x + b.width <= w);
        assert!(b.y + b.height <= h);
        assert!(b.width > 0 && b.height > 0);
    }

    #[test]
    fn test_center_of_mass_full_buffer() {
        let buffer = PixelBuffer::from_intensities(28, 28, &[255; 784]).unwrap();
        let center = center_of_mass(&buffer).unwrap();
        assert!((center.x - 13.5).abs() < 1e-9);
        assert!((center.y - 13.5).abs() < 1e-9);
    }

    #[test]
    fn test_center_of_mass_weighted() {
        // Two pixels on a row, the right one three times heavier
        let mut data = vec![0u8; 10 * 5];
        data[2 * 10] = 50;
        data[2 * 10 + 8] = 150;
        let buffer = PixelBuffer::from_intensities(10, 5, &data).unwrap();
        let center = center_of_mass(&buffer).unwrap();
        assert!((center.x - 6.0).abs() < 1e-9);
        assert!((center.y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_center_of_mass_without_ink() {
        let buffer = blank(8, 8);
        assert_eq!(center_of_mass(&buffer), Err(AnalysisError::DivisionByZero));
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let buffer = single_pixel(20, 20, 4, 15, 99);
        assert_eq!(bounding_box(&buffer), bounding_box(&buffer));
        assert_eq!(center_of_mass(&buffer), center_of_mass(&buffer));
    }

    #[test]
    fn test_channel_values_length_and_order() {
        let buffer = single_pixel(5, 3, 1, 2, 77);
        let values = channel_values(&buffer);
        assert_eq!(values.len(), 15);
        assert_eq!(values[2 * 5 + 1], 77);
        assert_eq!(total_mass(&buffer), 77);
    }

    #[test]
    fn test_alpha_is_the_ink_channel() {
        // Bright color with no alpha is not ink
        let data = vec![255, 255, 255, 0, 10, 20, 30, 200];
        let buffer = PixelBuffer::from_image(RgbaImage::from_raw(2, 1, data).unwrap()).unwrap();
        assert_eq!(channel_values(&buffer), vec![0, 200]);
        assert_eq!(bounding_box(&buffer), BoundingBox { x: 1, y: 0, width: 0, height: 0 });
    }

    #[test]
    fn test_rejects_bad_dimensions() {
        assert_eq!(
            PixelBuffer::from_image(RgbaImage::new(0, 4)).unwrap_err(),
            BitmapError::EmptyDimensions { width: 0, height: 4 }
        );
        assert_eq!(
            PixelBuffer::from_intensities(2, 2, &[0; 3]).unwrap_err(),
            BitmapError::LengthMismatch { expected: 4, actual: 3 }
        );
    }
}
