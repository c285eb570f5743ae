use indexmap::IndexMap;
use log::trace;
use nalgebra::DVector;
use rayon::prelude::*;

use crate::error::{MetricError, MetricResult};
use crate::features::{Label, LabeledFeatures};

/// Class-count normalisation applied to both aggregates. Fixed at 1 rather than
/// the number of distinct labels.
pub const CLASS_NORMALIZATION: f64 = 1.0;

/// Row indices grouped by label, in first-seen label order.
#[derive(Debug, Clone)]
pub struct LabelBuckets {
    buckets: Vec<Vec<usize>>,
}

impl LabelBuckets {
    pub fn from_labels(labels: &[Label]) -> Self {
        let mut slots: IndexMap<Label, Vec<usize>> = IndexMap::new();
        for (row, label) in labels.iter().enumerate() {
            slots.entry(*label).or_default().push(row);
        }
        Self {
            buckets: slots.into_values().collect(),
        }
    }

    pub fn class_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn groups(&self) -> &[Vec<usize>] {
        &self.buckets
    }

    pub fn same_label_pairs(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| bucket.len() * bucket.len().saturating_sub(1) / 2)
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct CrossLabelGradient {
    pub objective: f64,
    pub gradient: DVector<f64>,
    pub pairs: usize,
    // Pairs at zero weighted distance; they add nothing to either sum.
    pub coincident: usize,
}

/// Pairwise squared-difference statistics over a labeled feature set.
///
/// Rows are copied into a contiguous row-major buffer once so the O(N²·D)
/// passes stream through memory.
#[derive(Debug, Clone)]
pub struct PairAggregator {
    rows: Vec<f64>,
    dim: usize,
    labels: Vec<Label>,
    buckets: LabelBuckets,
}

impl PairAggregator {
    pub fn new(data: &LabeledFeatures) -> Self {
        let features = data.features();
        let dim = features.ncols();
        let mut rows = Vec::with_capacity(features.nrows() * dim);
        for row in features.row_iter() {
            rows.extend(row.iter().copied());
        }
        Self {
            rows,
            dim,
            labels: data.labels().to_vec(),
            buckets: LabelBuckets::from_labels(data.labels()),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn row(&self, idx: usize) -> &[f64] {
        &self.rows[idx * self.dim..(idx + 1) * self.dim]
    }

    /// Sum of `(xi - xj)²` over every unordered same-label pair, independent
    /// of row order.
    pub fn same_label_target(&self) -> DVector<f64> {
        let dim = self.dim;
        let sum = self
            .buckets
            .groups()
            .par_iter()
            .fold(
                || vec![0.0f64; dim],
                |mut acc, bucket| {
                    for (pos, &i) in bucket.iter().enumerate() {
                        let xi = self.row(i);
                        for &j in &bucket[pos + 1..] {
                            let xj = self.row(j);
                            for ((a, left), right) in acc.iter_mut().zip(xi).zip(xj) {
                                let diff = left - right;
                                *a += diff * diff;
                            }
                        }
                    }
                    acc
                },
            )
            .reduce(|| vec![0.0f64; dim], add_into);

        trace!(
            "same-label target over {} pairs in {} classes",
            self.buckets.same_label_pairs(),
            self.buckets.class_count()
        );
        DVector::from_vec(sum) / CLASS_NORMALIZATION
    }

    /// `g = Σ sqrt(u·d²)` and `dg = Σ d² / 2r` over every unordered
    /// cross-label pair.
    pub fn cross_label_gradient(
        &self,
        quad_u: &DVector<f64>,
    ) -> MetricResult<CrossLabelGradient> {
        if quad_u.len() != self.dim {
            return Err(MetricError::ShapeMismatch {
                expected: self.dim,
                found: quad_u.len(),
            });
        }
        if let Some((index, value)) = quad_u
            .iter()
            .enumerate()
            .find(|(_, w)| **w < 0.0 || !w.is_finite())
        {
            return Err(MetricError::NegativeWeight {
                index,
                value: *value,
            });
        }
        let weights = quad_u.as_slice();
        let dim = self.dim;
        let n = self.len();

        let accumulator = (0..n)
            .into_par_iter()
            .fold(
                || GradientAccumulator::new(dim),
                |mut acc, i| {
                    let xi = self.row(i);
                    for j in (i + 1)..n {
                        if self.labels[i] == self.labels[j] {
                            continue;
                        }
                        acc.consume(xi, self.row(j), weights);
                    }
                    acc
                },
            )
            .reduce(|| GradientAccumulator::new(dim), GradientAccumulator::combine);

        Ok(CrossLabelGradient {
            objective: accumulator.objective,
            gradient: DVector::from_vec(accumulator.gradient) / CLASS_NORMALIZATION.sqrt(),
            pairs: accumulator.pairs,
            coincident: accumulator.coincident,
        })
    }
}

struct GradientAccumulator {
    objective: f64,
    gradient: Vec<f64>,
    pairs: usize,
    coincident: usize,
}

impl GradientAccumulator {
    fn new(dim: usize) -> Self {
        Self {
            objective: 0.0,
            gradient: vec![0.0; dim],
            pairs: 0,
            coincident: 0,
        }
    }

    fn consume(&mut self, xi: &[f64], xj: &[f64], weights: &[f64]) {
        self.pairs += 1;
        let r2: f64 = xi
            .iter()
            .zip(xj)
            .zip(weights)
            .map(|((left, right), w)| {
                let diff = left - right;
                w * diff * diff
            })
            .sum();
        let r = r2.sqrt();
        if r == 0.0 {
            self.coincident += 1;
            return;
        }
        self.objective += r;
        let scale = 0.5 / r;
        for ((g, left), right) in self.gradient.iter_mut().zip(xi).zip(xj) {
            let diff = left - right;
            *g += diff * diff * scale;
        }
    }

    fn combine(mut self, other: Self) -> Self {
        self.objective += other.objective;
        self.gradient = add_into(self.gradient, other.gradient);
        self.pairs += other.pairs;
        self.coincident += other.coincident;
        self
    }
}

fn add_into(mut left: Vec<f64>, right: Vec<f64>) -> Vec<f64> {
    left.iter_mut().zip(right).for_each(|(l, r)| *l += r);
    left
}
