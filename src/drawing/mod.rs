//! Drawing surface
//!
//! Holds the strokes of a freehand digit and rasterizes them into a
//! `PixelBuffer` as black ink on a transparent square canvas. Strokes use
//! round caps and joins with a width proportional to the canvas size.
//!
//! Recorded pointer input can be replayed as a list of `StrokeEvent`s.

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_polygon_mut};
use imageproc::point::Point as PolyPoint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::config::DrawingConfig;
use crate::vision::{
    BitmapError, IntensityVector, NormalizeError, Normalizer, PixelBuffer, Point, Renderer,
};

const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// A stroke is the sequence of points visited between press and release
pub type Stroke = Vec<Point>;

/// Pointer input on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeEvent {
    /// Pointer pressed
    Start(Point),
    /// Pointer moved while pressed
    Move(Point),
    /// Pointer released
    End,
    /// Canvas cleared
    Reset,
}

/// Freehand drawing on a square canvas
#[derive(Debug, Clone, PartialEq)]
pub struct Drawing {
    size: u32,
    thickness: f64,
    paths: Vec<Stroke>,
    stroking: bool,
}

impl Drawing {
    /// Empty drawing on a `size` x `size` canvas; `thickness` is the line
    /// width as a fraction of `size`
    pub fn new(size: u32, thickness: f64) -> Self {
        Self {
            size,
            thickness,
            paths: Vec::new(),
            stroking: false,
        }
    }

    pub fn from_config(config: &DrawingConfig) -> Self {
        Self::new(config.canvas_size, config.thickness)
    }

    /// Drawing made of already finished strokes
    pub fn with_strokes(size: u32, thickness: f64, strokes: Vec<Stroke>) -> Self {
        let mut drawing = Self::new(size, thickness);
        drawing.paths = strokes.into_iter().filter(|s| !s.is_empty()).collect();
        drawing
    }

    /// Begin a new stroke at `p`
    pub fn start_stroke(&mut self, p: Point) {
        self.paths.push(vec![p]);
        self.stroking = true;
    }

    /// Continue the current stroke; ignored when no stroke is active
    pub fn extend_stroke(&mut self, p: Point) {
        if !self.stroking {
            debug!("Ignoring point outside of a stroke");
            return;
        }
        if let Some(path) = self.paths.last_mut() {
            path.push(p);
        }
    }

    /// Finish the current stroke. Returns true when a stroke was active,
    /// meaning the drawing changed and may be classified again.
    pub fn end_stroke(&mut self) -> bool {
        std::mem::replace(&mut self.stroking, false)
    }

    /// Remove every stroke
    pub fn reset(&mut self) {
        self.paths.clear();
        self.stroking = false;
    }

    pub fn paths(&self) -> &[Stroke] {
        &self.paths
    }

    fn radius(&self) -> f64 {
        (self.thickness * self.size as f64 / 2.0).max(0.5)
    }

    /// Rasterize the strokes into a fresh pixel buffer
    pub fn snapshot(&self) -> Result<PixelBuffer, BitmapError> {
        let mut canvas = RgbaImage::new(self.size, self.size);
        let radius = self.radius();
        for path in &self.paths {
            draw_path(&mut canvas, path, radius);
        }
        PixelBuffer::from_image(canvas)
    }

    /// Normalized classifier sample of the current drawing
    pub fn sample<R: Renderer>(&self, normalizer: &Normalizer<R>) -> Result<IntensityVector, NormalizeError> {
        normalizer.normalize(&self.snapshot()?)
    }
}

fn draw_path(canvas: &mut RgbaImage, path: &[Point], radius: f64) {
    let r = radius.round().max(1.0) as i32;

    // Discs at every vertex give round caps and joins
    for p in path {
        draw_filled_circle_mut(canvas, (p.x.round() as i32, p.y.round() as i32), r, INK);
    }

    for segment in path.windows(2) {
        if let Some(quad) = segment_quad(segment[0], segment[1], radius) {
            draw_polygon_mut(canvas, &quad, INK);
        }
    }
}

/// Rectangle covering a thick segment, or None when it collapses
fn segment_quad(a: Point, b: Point, radius: f64) -> Option<[PolyPoint<i32>; 4]> {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len = (dx * dx + dy * dy).sqrt();
    if len < f64::EPSILON {
        return None;
    }
    let (nx, ny) = (-dy / len * radius, dx / len * radius);
    let corner = |x: f64, y: f64| PolyPoint::new(x.round() as i32, y.round() as i32);

    let quad = [
        corner(a.x + nx, a.y + ny),
        corner(b.x + nx, b.y + ny),
        corner(b.x - nx, b.y - ny),
        corner(a.x - nx, a.y - ny),
    ];
    // imageproc rejects polygons whose first and last points coincide
    if quad[0] == quad[3] {
        return None;
    }
    Some(quad)
}

/// Parse strokes from JSON: `[[{"x":..,"y":..}, ...], ...]`
pub fn parse_strokes(json: &str) -> serde_json::Result<Vec<Stroke>> {
    serde_json::from_str(json)
}

/// Parse pointer events from JSON:
/// `[{"start":{"x":..,"y":..}}, {"move":{..}}, "end", "reset", ...]`
pub fn parse_events(json: &str) -> serde_json::Result<Vec<StrokeEvent>> {
    serde_json::from_str(json)
}

/// Load pointer events from a JSON file
pub fn load_events(path: &Path) -> Result<Vec<StrokeEvent>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read events from {:?}", path))?;
    let events = parse_events(&content).with_context(|| format!("Invalid events file {:?}", path))?;
    debug!("Loaded {} pointer events from {:?}", events.len(), path);
    Ok(events)
}

/// Load strokes from a JSON file
pub fn load_strokes(path: &Path) -> Result<Vec<Stroke>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read strokes from {:?}", path))?;
    let strokes = parse_strokes(&content).with_context(|| format!("Invalid strokes file {:?}", path))?;
    Ok(strokes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::bitmap::{bounding_box, center_of_mass, channel_values, total_mass};

    fn pt(x: f64, y: f64) -> Point {
        Point { x, y }
    }

    #[test]
    fn test_stroke_lifecycle() {
        let mut drawing = Drawing::from_config(&DrawingConfig::default());
        assert!(drawing.paths().is_empty());

        drawing.extend_stroke(pt(1.0, 1.0));
        assert!(drawing.paths().is_empty());
        assert!(!drawing.end_stroke());

        drawing.start_stroke(pt(10.0, 10.0));
        drawing.extend_stroke(pt(20.0, 10.0));
        assert!(drawing.end_stroke());
        drawing.extend_stroke(pt(30.0, 10.0));
        assert_eq!(drawing.paths(), &[vec![pt(10.0, 10.0), pt(20.0, 10.0)]]);

        drawing.reset();
        assert!(drawing.paths().is_empty());
    }

    #[test]
    fn test_empty_snapshot_has_no_ink() {
        let drawing = Drawing::new(280, 0.07);
        let buffer = drawing.snapshot().unwrap();
        assert_eq!((buffer.width(), buffer.height()), (280, 280));
        assert_eq!(total_mass(&buffer), 0);
        assert_eq!(drawing.sample(&Normalizer::new()).unwrap(), IntensityVector::zeros());
    }

    #[test]
    fn test_single_point_is_a_disc() {
        let mut drawing = Drawing::new(280, 0.07);
        drawing.start_stroke(pt(140.0, 140.0));
        drawing.end_stroke();

        let buffer = drawing.snapshot().unwrap();
        let bounds = bounding_box(&buffer);
        assert_eq!((bounds.x, bounds.y, bounds.width, bounds.height), (130, 130, 20, 20));
        let center = center_of_mass(&buffer).unwrap();
        assert!((center.x - 140.0).abs() < 0.5);
        assert!((center.y - 140.0).abs() < 0.5);
    }

    #[test]
    fn test_segment_covers_its_length() {
        let mut drawing = Drawing::new(280, 0.07);
        drawing.start_stroke(pt(60.0, 140.0));
        drawing.extend_stroke(pt(220.0, 140.0));
        drawing.end_stroke();

        let buffer = drawing.snapshot().unwrap();
        let bounds = bounding_box(&buffer);
        assert!((179..=181).contains(&bounds.width), "{:?}", bounds);
        assert!((19..=21).contains(&bounds.height), "{:?}", bounds);
        // Midway along the segment is solid ink
        let ink = channel_values(&buffer);
        assert_eq!(ink[140 * 280 + 140], 255);
        assert_eq!(ink[100 * 280 + 140], 0);
    }

    #[test]
    fn test_vertical_line_sample_is_centered() {
        let strokes = vec![vec![pt(140.0, 40.0), pt(140.0, 240.0)]];
        let drawing = Drawing::with_strokes(280, 0.07, strokes);
        let vector = drawing.sample(&Normalizer::new()).unwrap();

        assert!(vector.at(14, 14) < 0.5);
        assert!((vector.at(2, 14) - 1.0).abs() < 1e-9);
        assert!((vector.at(25, 14) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_strokes() {
        let strokes = parse_strokes(r#"[[{"x":1.0,"y":2.0},{"x":3.5,"y":4}],[]]"#).unwrap();
        assert_eq!(strokes.len(), 2);
        assert_eq!(strokes[0][1], pt(3.5, 4.0));

        let drawing = Drawing::with_strokes(100, 0.1, strokes);
        assert_eq!(drawing.paths().len(), 1);
        assert!(parse_strokes("{}").is_err());
    }

    #[test]
    fn test_parse_events() {
        let events = parse_events(r#"[{"start":{"x":1,"y":2}},{"move":{"x":3,"y":4}},"end","reset"]"#).unwrap();
        assert_eq!(
            events,
            vec![
                StrokeEvent::Start(pt(1.0, 2.0)),
                StrokeEvent::Move(pt(3.0, 4.0)),
                StrokeEvent::End,
                StrokeEvent::Reset,
            ]
        );
        assert!(parse_events(r#"["lift"]"#).is_err());
    }

    #[test]
    fn test_load_strokes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("seven.json");
        std::fs::write(&path, r#"[[{"x":10,"y":10},{"x":90,"y":10},{"x":40,"y":90}]]"#).unwrap();

        let strokes = load_strokes(&path).unwrap();
        assert_eq!(strokes[0].len(), 3);
        assert!(load_strokes(&dir.path().join("missing.json")).is_err());
    }
}
