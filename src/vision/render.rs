//! Region rendering between pixel buffers
//!
//! The normalizer only needs one drawing primitive: copy a rectangular source
//! region of a buffer into a rectangle of a fresh square target, scaling as
//! needed. `ImageRenderer` does this with the `image` crate.

use image::{imageops, imageops::FilterType, Rgba, RgbaImage};
use tracing::debug;

use super::bitmap::{BitmapError, PixelBuffer};

/// Real-valued rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    /// Center point as (x, y)
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Draws a source region into a new square target buffer
pub trait Renderer {
    /// Render `source` restricted to `src` into `dest` of a transparent
    /// `target_size` x `target_size` buffer. Parts of `src` outside the source
    /// buffer contribute no ink.
    fn draw_region(
        &self,
        source: &PixelBuffer,
        src: Region,
        dest: Region,
        target_size: u32,
    ) -> Result<PixelBuffer, BitmapError>;
}

/// `Renderer` backed by `image::imageops` resampling
#[derive(Debug, Clone, Copy)]
pub struct ImageRenderer {
    filter: FilterType,
}

impl Default for ImageRenderer {
    fn default() -> Self {
        Self::with_filter(FilterType::Triangle)
    }
}

impl ImageRenderer {
    /// Use a specific resampling filter
    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }
}

impl Renderer for ImageRenderer {
    fn draw_region(
        &self,
        source: &PixelBuffer,
        src: Region,
        dest: Region,
        target_size: u32,
    ) -> Result<PixelBuffer, BitmapError> {
        let mut target = RgbaImage::new(target_size, target_size);

        // Resample whole pixels, then shift by the fractional part of the
        // source origin so sub-pixel source offsets survive the scaling
        let (crop, x0, y0) = crop_padded(source.as_image(), src);
        let scale_x = dest.width / src.width.max(f64::EPSILON);
        let scale_y = dest.height / src.height.max(f64::EPSILON);
        let scaled_w = (crop.width() as f64 * scale_x).round().max(1.0) as u32;
        let scaled_h = (crop.height() as f64 * scale_y).round().max(1.0) as u32;
        let scaled = imageops::resize(&crop, scaled_w, scaled_h, self.filter);

        let x = (dest.x - (src.x - x0 as f64) * scale_x).round() as i64;
        let y = (dest.y - (src.y - y0 as f64) * scale_y).round() as i64;
        debug!(
            "Rendering {}x{} source pixels as {}x{} at ({}, {})",
            crop.width(),
            crop.height(),
            scaled_w,
            scaled_h,
            x,
            y
        );
        imageops::overlay(&mut target, &scaled, x, y);

        PixelBuffer::from_image(target)
    }
}

/// Copy the whole pixels covering `region` out of `image`, using transparent
/// pixels where it overhangs. Returns the crop and its integer origin.
fn crop_padded(image: &RgbaImage, region: Region) -> (RgbaImage, i64, i64) {
    let x0 = region.x.floor() as i64;
    let y0 = region.y.floor() as i64;
    let x1 = ((region.x + region.width).ceil() as i64).max(x0 + 1);
    let y1 = ((region.y + region.height).ceil() as i64).max(y0 + 1);
    let (width, height) = ((x1 - x0) as u32, (y1 - y0) as u32);

    let (img_w, img_h) = (image.width() as i64, image.height() as i64);
    let crop = RgbaImage::from_fn(width, height, |x, y| {
        let sx = x0 + x as i64;
        let sy = y0 + y as i64;
        if sx >= 0 && sy >= 0 && sx < img_w && sy < img_h {
            *image.get_pixel(sx as u32, sy as u32)
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    (crop, x0, y0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::bitmap::{bounding_box, channel_values, total_mass};

    #[test]
    fn test_region_center() {
        let region = Region { x: 2.0, y: 4.0, width: 10.0, height: 6.0 };
        assert_eq!(region.center(), (7.0, 7.0));
    }

    #[test]
    fn test_crop_padded_overhang_is_transparent() {
        let source = PixelBuffer::from_intensities(4, 4, &[255; 16]).unwrap();
        let (crop, x0, y0) = crop_padded(
            source.as_image(),
            Region { x: -2.0, y: 0.0, width: 4.0, height: 2.0 },
        );
        assert_eq!((x0, y0), (-2, 0));
        assert_eq!(crop.dimensions(), (4, 2));
        assert_eq!(crop.get_pixel(0, 0)[3], 0);
        assert_eq!(crop.get_pixel(1, 1)[3], 0);
        assert_eq!(crop.get_pixel(2, 0)[3], 255);
    }

    #[test]
    fn test_draw_region_places_ink_inside_dest() {
        let source = PixelBuffer::from_intensities(10, 10, &[255; 100]).unwrap();
        let renderer = ImageRenderer::default();
        let out = renderer.draw_region(
            &source,
            Region { x: 0.0, y: 0.0, width: 10.0, height: 10.0 },
            Region { x: 4.0, y: 4.0, width: 20.0, height: 20.0 },
            28,
        ).unwrap();

        assert_eq!((out.width(), out.height()), (28, 28));
        let bounds = bounding_box(&out);
        assert_eq!((bounds.x, bounds.y), (4, 4));
        assert_eq!((bounds.width, bounds.height), (19, 19));
        assert_eq!(channel_values(&out).len(), 784);
    }

    #[test]
    fn test_draw_region_of_empty_source_is_blank() {
        let source = PixelBuffer::from_image(RgbaImage::new(12, 12)).unwrap();
        let out = ImageRenderer::default().draw_region(
            &source,
            Region { x: 1.0, y: 1.0, width: 5.0, height: 5.0 },
            Region { x: 4.0, y: 4.0, width: 20.0, height: 20.0 },
            28,
        ).unwrap();
        assert_eq!(total_mass(&out), 0);
    }
}
