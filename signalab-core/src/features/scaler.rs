//! Standard (z-score) feature scaler.
//!
//! Per-column mean and population standard deviation. Zero-variance columns
//! scale by 1 so they map to 0 instead of NaN.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ScalerError {
    #[error("feature width mismatch: scaler fitted on {expected} columns, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on a rows × columns matrix. An empty matrix fits the identity.
    pub fn fit(data: &Array2<f64>) -> Self {
        let width = data.ncols();
        if data.nrows() == 0 {
            return Self {
                mean: vec![0.0; width],
                scale: vec![1.0; width],
            };
        }

        let mean = data
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_else(|| vec![0.0; width]);
        let scale = data
            .std_axis(Axis(0), 0.0)
            .iter()
            .map(|&s| if s > 0.0 && s.is_finite() { s } else { 1.0 })
            .collect();

        Self { mean, scale }
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>, ScalerError> {
        self.check_width(data.ncols())?;
        Ok(self.apply(data))
    }

    /// Scale a single feature vector.
    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, ScalerError> {
        self.check_width(row.len())?;
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn fit_transform(data: &Array2<f64>) -> (Self, Array2<f64>) {
        let scaler = Self::fit(data);
        let scaled = scaler.apply(data);
        (scaler, scaled)
    }

    /// Caller guarantees `data` has `self.width()` columns.
    fn apply(&self, data: &Array2<f64>) -> Array2<f64> {
        let mut out = data.clone();
        for mut row in out.rows_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (*v - self.mean[j]) / self.scale[j];
            }
        }
        out
    }

    fn check_width(&self, actual: usize) -> Result<(), ScalerError> {
        if actual != self.width() {
            return Err(ScalerError::WidthMismatch {
                expected: self.width(),
                actual,
            });
        }
        Ok(())
    }
}
