//! Vision Layer
//!
//! Turns raw ink into classifier input:
//! - `bitmap`: pixel buffers plus bounding box, centroid and channel extraction
//! - `normalize`: centering and scaling into the 28x28 sample
//! - `render`: the region-drawing primitive used by the normalizer
//! - `models`: the classifiers that consume samples

pub mod bitmap;
pub mod models;
pub mod normalize;
pub mod render;
pub mod sample;

pub use bitmap::{BitmapError, PixelBuffer, Point};
pub use models::{Classification, JsonModelLoader, Model, ModelLoader};
pub use normalize::{NormalizeError, Normalizer};
pub use render::Renderer;
pub use sample::{IntensityVector, SAMPLE_SIZE};
