use log::{debug, info};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{MetricError, MetricResult};
use crate::features::LabeledFeatures;
use crate::metric::DiagonalMetric;
use crate::pairs::{CrossLabelGradient, PairAggregator};
use crate::projection::FeasibilityProjector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub max_iter: usize,
    pub alpha: f64,
    /// Convergence threshold on the relative step `‖Δu‖ / ‖u‖`.
    pub tol: f64,
    pub tol_f: f64,
    pub obj_f: f64,
    /// Cap on projections within one feasibility restoration.
    pub max_projections: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iter: 10,
            alpha: 1e-11,
            tol: 1e-1,
            tol_f: 1e-3,
            obj_f: 1.0,
            max_projections: 10_000,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> MetricResult<()> {
        let invalid = |name: &'static str, value: f64| {
            Err(MetricError::InvalidHyperparameter { name, value })
        };
        if self.max_iter == 0 {
            return invalid("max_iter", 0.0);
        }
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return invalid("alpha", self.alpha);
        }
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return invalid("tol", self.tol);
        }
        if !(self.tol_f.is_finite() && self.tol_f > 0.0) {
            return invalid("tol_f", self.tol_f);
        }
        if !self.obj_f.is_finite() {
            return invalid("obj_f", self.obj_f);
        }
        if self.max_projections == 0 {
            return invalid("max_projections", 0.0);
        }
        Ok(())
    }
}

enum OptimizerState {
    RestoreFeasibility,
    ComputeGradient,
    Ascend(CrossLabelGradient),
    Converged,
    MaxIterReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    Converged,
    MaxIterReached,
}

#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub metric: DiagonalMetric,
    pub quad_u: DVector<f64>,
    pub target: DVector<f64>,
    pub iterations: usize,
    pub objective: f64,
    pub feasibility: f64,
    pub step: f64,
    pub projections: usize,
    pub termination: Termination,
}

/// Learns a non-negative diagonal metric by alternating feasibility
/// restoration with gradient ascent on the cross-label objective.
#[derive(Debug, Clone, Default)]
pub struct MetricOptimizer {
    config: OptimizerConfig,
}

impl MetricOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn optimize(&self, data: &LabeledFeatures) -> MetricResult<OptimizationOutcome> {
        self.optimize_pairs(&PairAggregator::new(data))
    }

    pub fn optimize_pairs(&self, pairs: &PairAggregator) -> MetricResult<OptimizationOutcome> {
        self.config.validate()?;
        let dim = pairs.dim();
        if dim == 0 || pairs.is_empty() {
            return Err(MetricError::EmptyInput);
        }
        let config = &self.config;

        let target = pairs.same_label_target();
        let projector = FeasibilityProjector::new(target, config.obj_f)?;
        let mut quad_u = DVector::from_element(dim, 1.0 / dim as f64);

        let mut iterations = 0usize;
        let mut projections = 0usize;
        let mut feasibility = projector.feasibility(&quad_u);
        let mut step = f64::INFINITY;
        let mut objective = 0.0;

        let mut state = OptimizerState::RestoreFeasibility;
        let termination = loop {
            state = match state {
                OptimizerState::RestoreFeasibility => {
                    let restored =
                        projector.restore(quad_u, config.tol_f, config.max_projections)?;
                    quad_u = restored.quad_u;
                    feasibility = restored.feasibility;
                    projections += restored.projections;
                    OptimizerState::ComputeGradient
                }
                OptimizerState::ComputeGradient => {
                    let evaluated = pairs.cross_label_gradient(&quad_u)?;
                    objective = evaluated.objective;
                    OptimizerState::Ascend(evaluated)
                }
                OptimizerState::Ascend(evaluated) => {
                    let next = &quad_u + config.alpha * &evaluated.gradient;
                    step = relative_step(&quad_u, &next);
                    quad_u = next;
                    iterations += 1;
                    debug!(
                        "iteration {}: g = {:.4}, f = {:.4}, eps = {:.6}, nnz {}, coincident {}",
                        iterations,
                        objective,
                        feasibility,
                        step,
                        quad_u.iter().filter(|w| **w != 0.0).count(),
                        evaluated.coincident
                    );
                    if step <= config.tol {
                        OptimizerState::Converged
                    } else if iterations >= config.max_iter {
                        OptimizerState::MaxIterReached
                    } else {
                        OptimizerState::RestoreFeasibility
                    }
                }
                OptimizerState::Converged => break Termination::Converged,
                OptimizerState::MaxIterReached => break Termination::MaxIterReached,
            };
        };

        // The last ascent step is unprojected; restore once more so the
        // returned weights are feasible and non-negative.
        let restored = projector.restore(quad_u, config.tol_f, config.max_projections)?;
        projections += restored.projections;
        info!(
            "metric optimization: {} iterations ({:?}), g = {:.4}, f = {:.4}, {} projections",
            iterations, termination, objective, restored.feasibility, projections
        );

        Ok(OptimizationOutcome {
            metric: DiagonalMetric::from_quad(&restored.quad_u)?,
            quad_u: restored.quad_u,
            target: projector.target().clone(),
            iterations,
            objective,
            feasibility: restored.feasibility,
            step,
            projections,
            termination,
        })
    }
}

fn relative_step(current: &DVector<f64>, next: &DVector<f64>) -> f64 {
    let delta = (next - current).norm();
    let norm = current.norm();
    if norm > 0.0 {
        delta / norm
    } else if delta == 0.0 {
        0.0
    } else {
        f64::INFINITY
    }
}
