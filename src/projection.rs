use log::trace;
use nalgebra::DVector;

use crate::error::{MetricError, MetricResult};

/// Alternating projection onto `{u : u·y2 = obj_f}` and the non-negative orthant.
///
/// Clamping can move `u·y2` off `obj_f` again, so [`restore`](Self::restore)
/// repeats the step under a cap.
#[derive(Debug, Clone)]
pub struct FeasibilityProjector {
    target: DVector<f64>,
    target_norm_sq: f64,
    obj_f: f64,
}

#[derive(Debug, Clone)]
pub struct Restored {
    pub quad_u: DVector<f64>,
    pub feasibility: f64,
    pub projections: usize,
}

impl FeasibilityProjector {
    pub fn new(target: DVector<f64>, obj_f: f64) -> MetricResult<Self> {
        let target_norm_sq = target.norm_squared();
        if target_norm_sq == 0.0 || !target_norm_sq.is_finite() {
            return Err(MetricError::DegenerateTarget);
        }
        Ok(Self {
            target,
            target_norm_sq,
            obj_f,
        })
    }

    pub fn target(&self) -> &DVector<f64> {
        &self.target
    }

    pub fn feasibility(&self, quad_u: &DVector<f64>) -> f64 {
        quad_u.dot(&self.target)
    }

    /// `u - lam·y2` with `lam = (f - obj_f) / (y2·y2)`, before clamping.
    pub fn hyperplane_step(&self, quad_u: &DVector<f64>, f: f64) -> MetricResult<DVector<f64>> {
        if quad_u.len() != self.target.len() {
            return Err(MetricError::ShapeMismatch {
                expected: self.target.len(),
                found: quad_u.len(),
            });
        }
        let lam = (f - self.obj_f) / self.target_norm_sq;
        Ok(quad_u - lam * &self.target)
    }

    pub fn project(&self, quad_u: &DVector<f64>, f: f64) -> MetricResult<DVector<f64>> {
        let mut next = self.hyperplane_step(quad_u, f)?;
        next.iter_mut().filter(|w| **w < 0.0).for_each(|w| *w = 0.0);
        Ok(next)
    }

    /// Projects repeatedly until `|u·y2 - obj_f| <= tol_f`.
    pub fn restore(
        &self,
        quad_u: DVector<f64>,
        tol_f: f64,
        max_projections: usize,
    ) -> MetricResult<Restored> {
        let mut quad_u = quad_u;
        let mut f = self.feasibility(&quad_u);
        let mut projections = 0usize;
        while (f - self.obj_f).abs() > tol_f {
            if projections >= max_projections {
                return Err(MetricError::NonConvergence {
                    attempts: projections,
                    residual: (f - self.obj_f).abs(),
                });
            }
            quad_u = self.project(&quad_u, f)?;
            f = self.feasibility(&quad_u);
            projections += 1;
            trace!("projection {}: f = {:.6}", projections, f);
        }
        Ok(Restored {
            quad_u,
            feasibility: f,
            projections,
        })
    }
}
