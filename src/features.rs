use nalgebra::DMatrix;

use crate::error::{MetricError, MetricResult};

pub type Label = i64;

#[derive(Debug, Clone)]
pub struct LabeledFeatures {
    features: DMatrix<f64>,
    labels: Vec<Label>,
}

impl LabeledFeatures {
    pub fn new(features: DMatrix<f64>, labels: Vec<Label>) -> MetricResult<Self> {
        if features.nrows() == 0 || features.ncols() == 0 {
            return Err(MetricError::EmptyInput);
        }
        if features.nrows() != labels.len() {
            return Err(MetricError::LabelMismatch {
                rows: features.nrows(),
                labels: labels.len(),
            });
        }
        check_entries(&features, f64::is_finite)?;
        Ok(Self { features, labels })
    }

    pub fn from_rows(rows: &[Vec<f64>], labels: Vec<Label>) -> MetricResult<Self> {
        let Some(first) = rows.first() else {
            return Err(MetricError::EmptyInput);
        };
        let dim = first.len();
        if let Some(bad) = rows.iter().find(|row| row.len() != dim) {
            return Err(MetricError::ShapeMismatch {
                expected: dim,
                found: bad.len(),
            });
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Self::new(DMatrix::from_row_slice(rows.len(), dim, &flat), labels)
    }

    pub fn features(&self) -> &DMatrix<f64> {
        &self.features
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.features.ncols()
    }

    pub fn select(&self, indices: &[usize]) -> MetricResult<Self> {
        if indices.is_empty() {
            return Err(MetricError::EmptyInput);
        }
        if let Some(&bad) = indices.iter().find(|&&idx| idx >= self.len()) {
            return Err(MetricError::Dimension {
                requested: bad,
                available: self.len().saturating_sub(1),
            });
        }
        let features = self.features.select_rows(indices);
        let labels = indices.iter().map(|&idx| self.labels[idx]).collect();
        Ok(Self { features, labels })
    }

    /// `ln(x + 1)` on every entry.
    pub fn log1p(&self) -> MetricResult<Self> {
        check_entries(&self.features, |v| v > -1.0)?;
        Ok(Self {
            features: self.features.map(f64::ln_1p),
            labels: self.labels.clone(),
        })
    }

    pub fn with_features(&self, features: DMatrix<f64>) -> MetricResult<Self> {
        Self::new(features, self.labels.clone())
    }
}

/// Fails with the first entry (column-major) rejected by `valid`.
pub(crate) fn check_entries(
    features: &DMatrix<f64>,
    valid: impl Fn(f64) -> bool,
) -> MetricResult<()> {
    for (col, column) in features.column_iter().enumerate() {
        if let Some((row, value)) = column.iter().enumerate().find(|(_, v)| !valid(**v)) {
            return Err(MetricError::InvalidFeature {
                row,
                col,
                value: *value,
            });
        }
    }
    Ok(())
}
