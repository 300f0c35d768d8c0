use nalgebra::DVector;

use super::Sphere;
use crate::{fitting::LeastSquaresProblem, prelude::Point};

/// Range residuals (|x - p_i| - d_i) / σ_i over a subset of [Sphere]s.
pub(crate) struct RangeProblem<'a, const D: usize> {
    spheres: &'a [Sphere<D>],
    subset: &'a [usize],
    /// Effective standard deviation, per subset entry
    std_devs: Vec<f64>,
}

impl<'a, const D: usize> RangeProblem<'a, D> {
    /// Builds new [RangeProblem]. When `fold_covariance` is set, the reference
    /// position uncertainty is projected on the line of sight to `seed` and added
    /// to the distance variance (first order, independent errors).
    pub fn new(
        spheres: &'a [Sphere<D>],
        subset: &'a [usize],
        seed: &Point<D>,
        fold_covariance: bool,
    ) -> Self {
        let std_devs = subset
            .iter()
            .map(|i| {
                let sphere = &spheres[*i];
                let mut variance = sphere.std_dev.powi(2);
                if fold_covariance {
                    variance += sphere.reference.distance_variance(seed);
                }
                variance.sqrt()
            })
            .collect();

        Self {
            spheres,
            subset,
            std_devs,
        }
    }
}

impl<const D: usize> LeastSquaresProblem for RangeProblem<'_, D> {
    fn num_parameters(&self) -> usize {
        D
    }

    fn num_observations(&self) -> usize {
        self.subset.len()
    }

    fn residual(&self, index: usize, x: &DVector<f64>, jacobian: &mut [f64]) -> f64 {
        let sphere = &self.spheres[self.subset[index]];
        let sigma = self.std_devs[index];
        let center = sphere.center();

        let mut range = 0.0;
        for k in 0..D {
            range += (x[k] - center[k]).powi(2);
        }
        let range = range.sqrt();

        if range > 0.0 {
            for k in 0..D {
                jacobian[k] = (x[k] - center[k]) / range / sigma;
            }
        }

        (range - sphere.radius) / sigma
    }
}
