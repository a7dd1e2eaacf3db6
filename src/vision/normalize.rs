//! Sample normalization
//!
//! Maps the ink of an arbitrary pixel buffer into the 28x28 sample layout used
//! by the classifiers: the squared ink box is scaled to 20x20 and placed so
//! that the ink's center of mass, not its bounding box, sits in the middle of
//! the sample.

use thiserror::Error;
use tracing::debug;

use super::bitmap::{
    bounding_box, center_of_mass, channel_values, total_mass, AnalysisError, BitmapError, BoundingBox,
    PixelBuffer, Point,
};
use super::render::{ImageRenderer, Region, Renderer};
use super::sample::{IntensityVector, SampleError, SAMPLE_SIZE};

/// Side length of the ink box inside a sample
pub const SAMPLE_BOUNDING_SIZE: u32 = 20;

/// Side used when the ink box has no extent at all (a single inked pixel)
const MIN_BOX_EXTENT: f64 = 1.0;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Render(#[from] BitmapError),
    #[error(transparent)]
    Sample(#[from] SampleError),
}

/// Where the ink is read from and where it lands in the sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Squared ink box in source coordinates
    pub source: Region,
    /// Target rectangle in sample coordinates
    pub dest: Region,
}

/// Grow the shorter side of `bounds` symmetrically until the box is square
pub fn square_box(bounds: BoundingBox) -> Region {
    let mut region = Region {
        x: bounds.x as f64,
        y: bounds.y as f64,
        width: bounds.width as f64,
        height: bounds.height as f64,
    };

    if region.width > region.height {
        region.y -= (region.width - region.height) / 2.0;
        region.height = region.width;
    } else {
        region.x -= (region.height - region.width) / 2.0;
        region.width = region.height;
    }

    if region.width <= 0.0 {
        region.x -= MIN_BOX_EXTENT / 2.0;
        region.y -= MIN_BOX_EXTENT / 2.0;
        region.width = MIN_BOX_EXTENT;
        region.height = MIN_BOX_EXTENT;
    }

    region
}

/// Compute the affine placement of the ink inside the sample
pub fn placement(bounds: BoundingBox, center: Point) -> Placement {
    let source = square_box(bounds);
    let margin = (SAMPLE_SIZE - SAMPLE_BOUNDING_SIZE) as f64 / 2.0;

    let (box_x, box_y) = source.center();
    let scale = SAMPLE_BOUNDING_SIZE as f64 / source.width;
    let offset_x = (center.x - box_x) * scale;
    let offset_y = (center.y - box_y) * scale;

    Placement {
        source,
        dest: Region {
            x: margin - offset_x,
            y: margin - offset_y,
            width: SAMPLE_BOUNDING_SIZE as f64,
            height: SAMPLE_BOUNDING_SIZE as f64,
        },
    }
}

/// Converts pixel buffers into classifier samples
#[derive(Debug, Clone, Default)]
pub struct Normalizer<R = ImageRenderer> {
    renderer: R,
}

impl Normalizer {
    /// Normalizer using the default `image` based renderer
    pub fn new() -> Self {
        Self::with_renderer(ImageRenderer::default())
    }
}

impl<R: Renderer> Normalizer<R> {
    /// Create a normalizer drawing through `renderer`
    pub fn with_renderer(renderer: R) -> Self {
        Self { renderer }
    }

    /// Produce the 784-value sample for `buffer`
    ///
    /// A buffer without ink yields the all-zero vector.
    pub fn normalize(&self, buffer: &PixelBuffer) -> Result<IntensityVector, NormalizeError> {
        if total_mass(buffer) == 0 {
            debug!("Normalizing an empty drawing");
            return Ok(IntensityVector::zeros());
        }

        let bounds = bounding_box(buffer);
        let center = center_of_mass(buffer)?;
        let Placement { source, dest } = placement(bounds, center);
        debug!("Ink box {:?}, center {:?}, placed at {:?}", bounds, center, dest);

        let rendered = self.renderer.draw_region(buffer, source, dest, SAMPLE_SIZE)?;
        let values: Vec<f64> = channel_values(&rendered)
            .into_iter()
            .map(|c| 1.0 - c as f64 / 255.0)
            .collect();

        Ok(IntensityVector::try_from(values)?)
    }
}
