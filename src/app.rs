//! Application Coordinator
//!
//! Loads the configured classifier, wires its callbacks into the shared
//! state, and runs drawings or images through normalization and
//! classification.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::classify::{Classifier, ClassifierStore};
use crate::config::{AppConfig, DrawingConfig};
use crate::drawing::{load_strokes, Drawing, StrokeEvent};
use crate::shared::{AppState, ClassifierStatus};
use crate::vision::{
    Classification, IntensityVector, JsonModelLoader, ModelLoader, Normalizer, PixelBuffer, SAMPLE_SIZE,
};

/// Shades from no ink to full ink
const PREVIEW_RAMP: &[u8] = b" .:-=+*#%@";

/// Main application coordinator
pub struct DigitSketchApp {
    /// State shared with the classifier callbacks
    pub shared_state: Arc<RwLock<AppState>>,
    classifier: Classifier,
    normalizer: Normalizer,
}

impl DigitSketchApp {
    /// Fetch the configured classifier and wait until it is loaded
    pub fn start(config: AppConfig) -> Result<Self> {
        let store = ClassifierStore::new()?
            .timeout(config.fetch.timeout())
            .offline(config.fetch.offline)
            .cache_downloads(config.classifier.cache_downloads);
        Self::start_with(config, &store, JsonModelLoader)
    }

    /// Like `start`, with an explicit store and model loader
    pub fn start_with<L>(config: AppConfig, store: &ClassifierStore, loader: L) -> Result<Self>
    where
        L: ModelLoader + 'static,
    {
        let source = config.classifier.source();
        let shared_state = Arc::new(RwLock::new(AppState::new(config)));

        let (on_load, on_error, on_classify) = (shared_state.clone(), shared_state.clone(), shared_state.clone());
        let mut classifier = Classifier::spawn(loader)
            .context("Failed to start classifier worker")?
            .on_load(move || {
                let mut state = on_load.write();
                state.runtime.classifier_status = ClassifierStatus::Ready;
                state.runtime.clear_error();
            })
            .on_error(move |e| {
                let mut state = on_error.write();
                state.runtime.classifier_status = ClassifierStatus::Failed;
                state.runtime.set_error(e.to_string());
            })
            .on_classify(move |label| on_classify.write().runtime.record_classification(label));

        info!("Loading classifier from {}", source);
        classifier.init_from(store.fetch(&source))?;
        classifier.wait()?;

        {
            let state = shared_state.read();
            if state.runtime.classifier_status != ClassifierStatus::Ready {
                let reason = state.runtime.last_error.clone().unwrap_or_default();
                anyhow::bail!("Classifier {} is unavailable: {}", source, reason);
            }
        }

        Ok(Self {
            shared_state,
            classifier,
            normalizer: Normalizer::new(),
        })
    }

    /// Empty drawing with the configured canvas
    pub fn new_drawing(&self) -> Drawing {
        Drawing::from_config(&self.shared_state.read().config.drawing)
    }

    /// Normalized sample for a pixel buffer
    pub fn sample_buffer(&self, buffer: &PixelBuffer) -> Result<IntensityVector> {
        Ok(self.normalizer.normalize(buffer)?)
    }

    /// Classify a pixel buffer, blocking until the result settles
    pub fn classify_buffer(&mut self, buffer: &PixelBuffer) -> Result<Option<Classification>> {
        let sample = self.sample_buffer(buffer)?;
        let before = self.delivered();
        self.classifier.classify(sample)?;
        self.classifier.wait()?;
        Ok(self.delivered_since(before))
    }

    /// Request a classification of `drawing` without waiting for it
    pub fn submit(&mut self, drawing: &Drawing) -> Result<()> {
        let sample = drawing.sample(&self.normalizer)?;
        self.classifier.classify(sample)?;
        Ok(())
    }

    /// Handle replies that already arrived. Returns the label delivered
    /// meanwhile, if any.
    pub fn pump(&mut self) -> Result<Option<Classification>> {
        let before = self.delivered();
        self.classifier.pump()?;
        Ok(self.delivered_since(before))
    }

    /// Block until nothing is in flight
    pub fn settle(&mut self) -> Result<Option<Classification>> {
        let before = self.delivered();
        self.classifier.wait()?;
        Ok(self.delivered_since(before))
    }

    /// Drop any queued request and suppress the pending result
    pub fn cancel(&mut self) {
        self.classifier.cancel();
    }

    /// Feed recorded pointer input through a fresh drawing. Each finished
    /// stroke requests a classification without waiting, and a reset cancels
    /// whatever is pending. Returns the labels delivered along the way.
    pub fn replay(&mut self, events: &[StrokeEvent]) -> Result<Vec<Classification>> {
        let mut drawing = self.new_drawing();
        let mut labels = Vec::new();

        for event in events {
            match *event {
                StrokeEvent::Start(p) => drawing.start_stroke(p),
                StrokeEvent::Move(p) => drawing.extend_stroke(p),
                StrokeEvent::End => {
                    if drawing.end_stroke() {
                        debug!("Stroke finished, {} in the drawing", drawing.paths().len());
                        self.submit(&drawing)?;
                    }
                }
                StrokeEvent::Reset => {
                    drawing.reset();
                    self.cancel();
                }
            }
            labels.extend(self.pump()?);
        }

        labels.extend(self.settle()?);
        Ok(labels)
    }

    fn delivered(&self) -> u64 {
        self.shared_state.read().runtime.delivered
    }

    fn delivered_since(&self, before: u64) -> Option<Classification> {
        let state = self.shared_state.read();
        if state.runtime.delivered > before {
            debug!("Classified as {:?}", state.runtime.last_classification);
            state.runtime.last_classification
        } else {
            None
        }
    }
}

/// Rasterize an input file: strokes JSON, or an image. Alpha is ink; images
/// without an alpha channel use inverted luminance instead.
pub fn load_input(path: &Path, drawing: &DrawingConfig) -> Result<PixelBuffer> {
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let buffer = if is_json {
        let strokes = load_strokes(path)?;
        Drawing::with_strokes(drawing.canvas_size, drawing.thickness, strokes).snapshot()?
    } else {
        let image = image::open(path).with_context(|| format!("Failed to open image {:?}", path))?;
        if image.color().has_alpha() {
            PixelBuffer::from_image(image.to_rgba8())?
        } else {
            info!("{:?} has no alpha channel, reading dark pixels as ink", path);
            let luma = image.to_luma8();
            let ink: Vec<u8> = luma.pixels().map(|p| 255 - p[0]).collect();
            PixelBuffer::from_intensities(luma.width(), luma.height(), &ink)?
        }
    };

    debug!("Loaded {:?} as a {}x{} buffer", path, buffer.width(), buffer.height());
    Ok(buffer)
}

/// Text rendering of a sample, one line per row
pub fn preview(vector: &IntensityVector) -> String {
    let mut out = String::with_capacity((SAMPLE_SIZE as usize + 1) * SAMPLE_SIZE as usize);
    for y in 0..SAMPLE_SIZE {
        for x in 0..SAMPLE_SIZE {
            let ink = (1.0 - vector.at(x, y)).clamp(0.0, 1.0);
            let index = (ink * (PREVIEW_RAMP.len() - 1) as f64).round() as usize;
            out.push(PREVIEW_RAMP[index] as char);
        }
        out.push('\n');
    }
    out
}
