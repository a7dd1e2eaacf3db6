//! Fixed-size classifier input

use serde::{Deserialize, Serialize};
use std::ops::Index;
use thiserror::Error;

/// Side length of a sample in pixels
pub const SAMPLE_SIZE: u32 = 28;

/// Number of values in a sample
pub const SAMPLE_LEN: usize = (SAMPLE_SIZE * SAMPLE_SIZE) as usize;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("intensity vector must hold 784 values, got {0}")]
    WrongLength(usize),
}

/// 28x28 row-major intensities in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct IntensityVector {
    values: Box<[f64]>,
}

impl IntensityVector {
    /// The vector reported for a drawing without ink
    pub fn zeros() -> Self {
        Self {
            values: vec![0.0; SAMPLE_LEN].into_boxed_slice(),
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Value at column `x`, row `y`
    pub fn at(&self, x: u32, y: u32) -> f64 {
        self.values[(y * SAMPLE_SIZE + x) as usize]
    }
}

impl TryFrom<Vec<f64>> for IntensityVector {
    type Error = SampleError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        if values.len() != SAMPLE_LEN {
            return Err(SampleError::WrongLength(values.len()));
        }
        Ok(Self {
            values: values.into_boxed_slice(),
        })
    }
}

impl From<IntensityVector> for Vec<f64> {
    fn from(vector: IntensityVector) -> Self {
        vector.values.into_vec()
    }
}

impl Index<usize> for IntensityVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.values[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_wrong_length() {
        assert_eq!(
            IntensityVector::try_from(vec![0.5; 10]).unwrap_err(),
            SampleError::WrongLength(10)
        );
        assert!(IntensityVector::try_from(vec![0.5; SAMPLE_LEN]).is_ok());
    }

    #[test]
    fn test_deserialize_enforces_length() {
        let short = serde_json::to_string(&vec![1.0; 783]).unwrap();
        assert!(serde_json::from_str::<IntensityVector>(&short).is_err());

        let exact = serde_json::to_string(&vec![1.0; 784]).unwrap();
        let vector: IntensityVector = serde_json::from_str(&exact).unwrap();
        assert_eq!(vector.as_slice().len(), SAMPLE_LEN);
    }

    #[test]
    fn test_row_major_indexing() {
        let mut values = vec![0.0; SAMPLE_LEN];
        values[3 * 28 + 5] = 0.25;
        let vector = IntensityVector::try_from(values).unwrap();
        assert_eq!(vector.at(5, 3), 0.25);
        assert_eq!(vector[3 * 28 + 5], 0.25);
    }
}
