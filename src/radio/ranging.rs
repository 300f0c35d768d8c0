use crate::{
    lateration::{Lateration, Sphere},
    prelude::Point,
    robust::ConsensusProblem,
};

/// Ranging stage problem: source position from distances.
pub(crate) struct RangingProblem<'a, const D: usize> {
    spheres: &'a [Sphere<D>],
    lateration: &'a Lateration<D>,
}

impl<'a, const D: usize> RangingProblem<'a, D> {
    pub fn new(spheres: &'a [Sphere<D>], lateration: &'a Lateration<D>) -> Self {
        Self {
            spheres,
            lateration,
        }
    }
}

impl<const D: usize> ConsensusProblem for RangingProblem<'_, D> {
    type Solution = Point<D>;

    fn num_samples(&self) -> usize {
        self.spheres.len()
    }

    fn subset_size(&self) -> usize {
        Lateration::<D>::MIN_SPHERES
    }

    fn candidates(&self, subset: &[usize]) -> Vec<Point<D>> {
        self.lateration.preliminary(self.spheres, subset)
    }

    /// Absolute range error, in meters
    fn residual(&self, solution: &Point<D>, index: usize) -> f64 {
        let sphere = &self.spheres[index];
        ((solution - sphere.center()).norm() - sphere.radius).abs()
    }
}
