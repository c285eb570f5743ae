use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{MetricError, MetricResult};

/// Learned per-dimension weights `w = sqrt(quad_u)`.
///
/// Distances are `sqrt(Σ_k w_k² (x_k - y_k)²)`, i.e. Euclidean distance after
/// scaling every coordinate by `w_k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagonalMetric {
    weights: DVector<f64>,
}

impl DiagonalMetric {
    pub fn from_quad(quad_u: &DVector<f64>) -> MetricResult<Self> {
        if let Some((idx, value)) = quad_u
            .iter()
            .enumerate()
            .find(|(_, w)| **w < 0.0 || !w.is_finite())
        {
            return Err(MetricError::NegativeWeight {
                index: idx,
                value: *value,
            });
        }
        Ok(Self {
            weights: quad_u.map(f64::sqrt),
        })
    }

    pub fn weights(&self) -> &DVector<f64> {
        &self.weights
    }

    pub fn dim(&self) -> usize {
        self.weights.len()
    }

    pub fn matrix(&self) -> DMatrix<f64> {
        DMatrix::from_diagonal(&self.weights)
    }

    pub fn distance(&self, x: &[f64], y: &[f64]) -> MetricResult<f64> {
        for len in [x.len(), y.len()] {
            if len != self.dim() {
                return Err(MetricError::ShapeMismatch {
                    expected: self.dim(),
                    found: len,
                });
            }
        }
        let sum: f64 = self
            .weights
            .iter()
            .zip(x.iter().zip(y))
            .map(|(w, (a, b))| {
                let scaled = w * (a - b);
                scaled * scaled
            })
            .sum();
        Ok(sum.sqrt())
    }
}
