//! Levenberg-Marquardt weighted least squares
use log::trace;
use nalgebra::{DMatrix, DVector};

use crate::{cfg::SolverOpts, error::NumericalError};

/// Damping applied on first iteration, relative to the
/// diagonal of the information matrix.
const INITIAL_DAMPING: f64 = 1.0E-3;

/// Damping past which no descent direction can be found anymore:
/// we're sitting on the minimum, within numerical precision.
const MAX_DAMPING: f64 = 1.0E16;

/// Floor of the damped diagonal, protects against parameters
/// with (locally) vanishing sensitivity.
const MIN_DIAGONAL: f64 = 1.0E-12;

/// Weighted least squares problem: minimizes Σ r_i(x)²
/// where r_i is the residual normalized by its standard deviation.
pub(crate) trait LeastSquaresProblem {
    /// Number of unknowns
    fn num_parameters(&self) -> usize;

    /// Number of observations
    fn num_observations(&self) -> usize;

    /// Evaluates weighted residual (model - observation) / σ of observation `index`
    /// at `x`, and stores its partial derivatives in `jacobian`.
    fn residual(&self, index: usize, x: &DVector<f64>, jacobian: &mut [f64]) -> f64;
}

/// Levenberg-Marquardt solution
#[derive(Debug, Clone)]
pub(crate) struct Fit {
    /// Solution
    pub x: DVector<f64>,
    /// χ² at the solution
    pub chi2: f64,
    /// JᵀJ information matrix at the solution
    pub information: DMatrix<f64>,
    /// Number of observations
    pub num_observations: usize,
    /// Number of iterations we needed
    pub iterations: usize,
}

impl Fit {
    /// Mean squared (weighted) error, when degrees of freedom remain.
    pub fn mse(&self) -> Option<f64> {
        let dof = self.num_observations.checked_sub(self.x.nrows())?;
        if dof > 0 {
            Some(self.chi2 / dof as f64)
        } else {
            None
        }
    }

    /// Covariance of the solution: (JᵀWJ)⁻¹, optionally scaled by
    /// the mean squared error, when degrees of freedom remain.
    pub fn covariance(&self, adjust: bool) -> Result<DMatrix<f64>, NumericalError> {
        let covariance = self
            .information
            .clone()
            .try_inverse()
            .ok_or(NumericalError::SingularCovariance)?;

        if !covariance.iter().all(|v| v.is_finite()) {
            return Err(NumericalError::SingularCovariance);
        }

        match (adjust, self.mse()) {
            (true, Some(mse)) => Ok(covariance * mse),
            _ => Ok(covariance),
        }
    }
}

/// Levenberg-Marquardt solver
#[derive(Debug, Clone)]
pub(crate) struct LevenbergMarquardt {
    max_iterations: usize,
    tolerance: f64,
}

impl From<&SolverOpts> for LevenbergMarquardt {
    fn from(opts: &SolverOpts) -> Self {
        Self {
            max_iterations: opts.max_iterations,
            tolerance: opts.tolerance,
        }
    }
}

impl LevenbergMarquardt {
    /// Forms J and r at `x`
    fn linearize<P: LeastSquaresProblem>(
        problem: &P,
        x: &DVector<f64>,
    ) -> (DMatrix<f64>, DVector<f64>) {
        let (m, n) = (problem.num_observations(), problem.num_parameters());
        let mut j = DMatrix::<f64>::zeros(m, n);
        let mut r = DVector::<f64>::zeros(m);
        let mut row = vec![0.0; n];

        for i in 0..m {
            row.iter_mut().for_each(|v| *v = 0.0);
            r[i] = problem.residual(i, x, &mut row);
            for k in 0..n {
                j[(i, k)] = row[k];
            }
        }
        (j, r)
    }

    /// Minimizes the [LeastSquaresProblem], starting from `x0`.
    /// ## Returns
    /// - [Fit] on convergence
    /// - [NumericalError::DidNotConverge] when the iteration cap is reached
    pub fn fit<P: LeastSquaresProblem>(
        &self,
        problem: &P,
        x0: DVector<f64>,
    ) -> Result<Fit, NumericalError> {
        let (m, n) = (problem.num_observations(), problem.num_parameters());

        if m < n || n == 0 {
            return Err(NumericalError::Underdetermined);
        }

        let mut x = x0;
        let (mut j, mut r) = Self::linearize(problem, &x);
        let mut chi2 = r.norm_squared();

        if !chi2.is_finite() {
            return Err(NumericalError::DegenerateGeometry);
        }

        let mut damping = INITIAL_DAMPING;

        for iter in 0..self.max_iterations {
            let jt = j.transpose();
            let information = &jt * &j;
            let gradient = &jt * &r;

            let mut damped = information.clone();
            for k in 0..n {
                damped[(k, k)] += damping * information[(k, k)].max(MIN_DIAGONAL);
            }

            let step = match damped.cholesky() {
                Some(chol) => chol.solve(&(-&gradient)),
                None => {
                    damping *= 10.0;
                    if damping > MAX_DAMPING {
                        return Err(NumericalError::DegenerateGeometry);
                    }
                    continue;
                },
            };

            let small_step = step.norm() <= self.tolerance * (x.norm() + self.tolerance);

            let candidate = &x + &step;
            let (j_c, r_c) = Self::linearize(problem, &candidate);
            let chi2_c = r_c.norm_squared();

            trace!(
                "lm iter={} chi2={:.6E} candidate={:.6E} damping={:.3E}",
                iter,
                chi2,
                chi2_c,
                damping
            );

            if chi2_c.is_finite() && chi2_c <= chi2 {
                x = candidate;
                j = j_c;
                r = r_c;
                chi2 = chi2_c;
                damping = (damping / 10.0).max(f64::EPSILON);
            } else {
                damping *= 10.0;
            }

            if small_step || chi2 <= f64::MIN_POSITIVE || damping > MAX_DAMPING {
                let information = j.transpose() * &j;
                return Ok(Fit {
                    x,
                    chi2,
                    information,
                    num_observations: m,
                    iterations: iter + 1,
                });
            }
        }

        Err(NumericalError::DidNotConverge)
    }
}
