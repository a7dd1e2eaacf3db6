//! Classifier models
//!
//! The coordinator treats a classifier as an opaque function from sample to
//! label. `ModelLoader` turns fetched classifier bytes into a `Model` on the
//! worker thread; `JsonModelLoader` understands the two model files shipped
//! with the tool (a linear scorer and a nearest-neighbors prototype set).

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use super::sample::{IntensityVector, SAMPLE_LEN};

/// Label produced by a classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Classification(pub usize);

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classifier bytes were rejected by the worker
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitError {
    #[error("malformed classifier data: {0}")]
    Malformed(String),
    #[error("incompatible classifier: {0}")]
    Incompatible(String),
}

/// A loaded classifier
pub trait Model: Send {
    fn classify(&self, sample: &IntensityVector) -> Classification;
}

/// Builds a model from fetched classifier bytes
pub trait ModelLoader: Send {
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn Model>, InitError>;
}

/// One labeled prototype of a neighbors model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledSample {
    pub label: usize,
    pub pixels: IntensityVector,
}

/// On-disk classifier formats
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelFile {
    /// One weight row and bias per label; the best score wins
    Linear { weights: Vec<Vec<f64>>, biases: Vec<f64> },
    /// Majority vote among the `k` closest prototypes
    Neighbors { k: usize, samples: Vec<LabeledSample> },
}

impl ModelFile {
    /// Validate shapes and build the runnable model
    pub fn build(self) -> Result<Box<dyn Model>, InitError> {
        match self {
            ModelFile::Linear { weights, biases } => Ok(Box::new(LinearModel::new(weights, biases)?)),
            ModelFile::Neighbors { k, samples } => Ok(Box::new(NeighborsModel::new(k, samples)?)),
        }
    }
}

/// Linear scorer over the raw intensities
#[derive(Debug, Clone)]
pub struct LinearModel {
    weights: Array2<f64>,
    biases: Array1<f64>,
}

impl LinearModel {
    pub fn new(weights: Vec<Vec<f64>>, biases: Vec<f64>) -> Result<Self, InitError> {
        let labels = weights.len();
        if labels == 0 {
            return Err(InitError::Incompatible("linear model has no labels".to_string()));
        }
        if biases.len() != labels {
            return Err(InitError::Incompatible(format!(
                "{} weight rows but {} biases",
                labels,
                biases.len()
            )));
        }
        if let Some(row) = weights.iter().position(|r| r.len() != SAMPLE_LEN) {
            return Err(InitError::Incompatible(format!(
                "weight row {} has {} values, expected {}",
                row,
                weights[row].len(),
                SAMPLE_LEN
            )));
        }

        let flat: Vec<f64> = weights.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((labels, SAMPLE_LEN), flat)
            .map_err(|e| InitError::Incompatible(e.to_string()))?;

        Ok(Self {
            weights,
            biases: Array1::from(biases),
        })
    }

    /// Raw score per label
    pub fn scores(&self, sample: &IntensityVector) -> Array1<f64> {
        let x = ArrayView1::from(sample.as_slice());
        self.weights.dot(&x) + &self.biases
    }
}

impl Model for LinearModel {
    fn classify(&self, sample: &IntensityVector) -> Classification {
        let scores = self.scores(sample);
        let best = scores
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (label, &score)| {
                if score > best.1 {
                    (label, score)
                } else {
                    best
                }
            });
        Classification(best.0)
    }
}

/// k-nearest-neighbors over stored prototypes
#[derive(Debug, Clone)]
pub struct NeighborsModel {
    k: usize,
    samples: Vec<LabeledSample>,
}

impl NeighborsModel {
    pub fn new(k: usize, samples: Vec<LabeledSample>) -> Result<Self, InitError> {
        if k == 0 {
            return Err(InitError::Incompatible("k must be at least 1".to_string()));
        }
        if samples.is_empty() {
            return Err(InitError::Incompatible("neighbors model has no samples".to_string()));
        }
        Ok(Self { k, samples })
    }
}

impl Model for NeighborsModel {
    fn classify(&self, sample: &IntensityVector) -> Classification {
        let mut ranked: Vec<(f64, usize)> = self
            .samples
            .iter()
            .map(|s| (squared_distance(sample, &s.pixels), s.label))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        ranked.truncate(self.k);

        let mut votes: HashMap<usize, usize> = HashMap::new();
        for (_, label) in &ranked {
            *votes.entry(*label).or_default() += 1;
        }
        let top = votes.values().copied().max().unwrap_or(0);

        // Ties go to the label whose prototype is nearest
        let label = ranked
            .iter()
            .map(|(_, label)| *label)
            .find(|label| votes.get(label) == Some(&top))
            .unwrap_or(ranked[0].1);
        Classification(label)
    }
}

fn squared_distance(a: &IntensityVector, b: &IntensityVector) -> f64 {
    a.as_slice()
        .iter()
        .zip(b.as_slice())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

/// Loads `ModelFile` JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonModelLoader;

impl ModelLoader for JsonModelLoader {
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn Model>, InitError> {
        debug!("Parsing {} bytes of classifier data", bytes.len());
        let file: ModelFile =
            serde_json::from_slice(bytes).map_err(|e| InitError::Malformed(e.to_string()))?;
        let kind = match &file {
            ModelFile::Linear { weights, .. } => format!("linear ({} labels)", weights.len()),
            ModelFile::Neighbors { k, samples } => format!("neighbors (k={}, {} samples)", k, samples.len()),
        };
        let model = file.build()?;
        info!("Loaded {} classifier", kind);
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_with(index: usize, value: f64) -> IntensityVector {
        let mut values = vec![0.0; SAMPLE_LEN];
        values[index] = value;
        IntensityVector::try_from(values).unwrap()
    }

    fn one_hot_weights(labels: usize) -> Vec<Vec<f64>> {
        (0..labels)
            .map(|label| {
                let mut row = vec![0.0; SAMPLE_LEN];
                row[label] = 1.0;
                row
            })
            .collect()
    }

    #[test]
    fn test_linear_model_picks_best_score() {
        let model = LinearModel::new(one_hot_weights(10), vec![0.0; 10]).unwrap();
        assert_eq!(model.classify(&sample_with(7, 1.0)), Classification(7));
        assert_eq!(model.scores(&sample_with(3, 0.5))[3], 0.5);
    }

    #[test]
    fn test_linear_model_biases() {
        let mut biases = vec![0.0; 10];
        biases[4] = 2.0;
        let model = LinearModel::new(one_hot_weights(10), biases).unwrap();
        assert_eq!(model.classify(&sample_with(7, 1.0)), Classification(4));
    }

    #[test]
    fn test_linear_model_rejects_bad_shapes() {
        assert!(matches!(
            LinearModel::new(one_hot_weights(3), vec![0.0; 2]),
            Err(InitError::Incompatible(_))
        ));
        assert!(matches!(
            LinearModel::new(vec![vec![0.0; 10]], vec![0.0]),
            Err(InitError::Incompatible(_))
        ));
        assert!(LinearModel::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_neighbors_majority_vote() {
        let samples = vec![
            LabeledSample { label: 1, pixels: sample_with(0, 1.0) },
            LabeledSample { label: 1, pixels: sample_with(0, 0.9) },
            LabeledSample { label: 8, pixels: sample_with(0, 0.95) },
            LabeledSample { label: 8, pixels: sample_with(500, 1.0) },
        ];
        let model = NeighborsModel::new(3, samples).unwrap();
        assert_eq!(model.classify(&sample_with(0, 1.0)), Classification(1));
    }

    #[test]
    fn test_neighbors_tie_goes_to_nearest() {
        let samples = vec![
            LabeledSample { label: 2, pixels: sample_with(0, 0.5) },
            LabeledSample { label: 5, pixels: sample_with(0, 1.0) },
        ];
        let model = NeighborsModel::new(2, samples).unwrap();
        assert_eq!(model.classify(&sample_with(0, 0.9)), Classification(5));
    }

    #[test]
    fn test_json_loader() {
        let file = ModelFile::Linear {
            weights: one_hot_weights(10),
            biases: vec![0.0; 10],
        };
        let bytes = serde_json::to_vec(&file).unwrap();
        let model = JsonModelLoader.load(&bytes).unwrap();
        assert_eq!(model.classify(&sample_with(9, 1.0)), Classification(9));
    }

    #[test]
    fn test_json_loader_rejects_garbage() {
        assert!(matches!(
            JsonModelLoader.load(b"not a model"),
            Err(InitError::Malformed(_))
        ));
        assert!(matches!(
            JsonModelLoader.load(br#"{"kind":"neighbors","k":0,"samples":[]}"#),
            Err(InitError::Incompatible(_))
        ));
    }
}
