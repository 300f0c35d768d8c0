//! Lateration: position from distances to known reference points
use log::debug;
use nalgebra::DVector;

use crate::{
    cfg::{LaterationMethod, SolverOpts},
    error::NumericalError,
    fitting::LevenbergMarquardt,
    prelude::{Covariance, Error, Point, ReferencePosition},
};

mod linear;
mod nonlinear;

use nonlinear::RangeProblem;

/// Sphere (circle in 2D) centered on a known reference position,
/// with radius equal to the measured distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere<const D: usize> {
    /// [ReferencePosition] at the center
    pub reference: ReferencePosition<D>,
    /// Measured distance (m)
    pub radius: f64,
    /// Distance standard deviation (m)
    pub std_dev: f64,
}

impl<const D: usize> Sphere<D> {
    /// Builds new [Sphere]
    pub fn new(reference: ReferencePosition<D>, radius: f64, std_dev: f64) -> Self {
        Self {
            reference,
            radius,
            std_dev,
        }
    }

    /// Center coordinates
    pub fn center(&self) -> Point<D> {
        self.reference.position
    }
}

/// Solution obtained by [Lateration]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaterationSolution<const D: usize> {
    /// Estimated position
    pub position: Point<D>,
    /// Position covariance, only provided by the iterative solver
    pub covariance: Option<Covariance<D>>,
    /// Number of iterations (1 for linear solvers)
    pub iterations: usize,
}

/// [Lateration] solves a position from a set of [Sphere]s.
#[derive(Debug, Clone)]
pub struct Lateration<const D: usize> {
    /// [LaterationMethod] being used
    method: LaterationMethod,
    /// Iterative solver
    solver: LevenbergMarquardt,
    /// Possible initial position (iterative solver)
    initial: Option<Point<D>>,
    /// Inflate distance variances with reference position uncertainty
    fold_covariance: bool,
    /// Scale covariance by the residual variance
    adjust_covariance: bool,
}

impl<const D: usize> Lateration<D> {
    /// Minimal number of [Sphere]s to determine a position
    pub const MIN_SPHERES: usize = D + 1;

    /// Builds new [Lateration] solver using desired [LaterationMethod],
    /// and default [SolverOpts].
    pub fn new(method: LaterationMethod) -> Self {
        Self {
            method,
            solver: LevenbergMarquardt::from(&SolverOpts::default()),
            initial: None,
            fold_covariance: false,
            adjust_covariance: true,
        }
    }

    /// Copies and returns [Lateration] with iterative [SolverOpts]
    pub fn with_solver_opts(&self, opts: &SolverOpts) -> Self {
        let mut s = self.clone();
        s.solver = LevenbergMarquardt::from(opts);
        s
    }

    /// Copies and returns [Lateration] with initial position,
    /// for the iterative solver. Centroid of the references is used otherwise.
    pub fn with_initial_position(&self, initial: Point<D>) -> Self {
        let mut s = self.clone();
        s.initial = Some(initial);
        s
    }

    /// Copies and returns [Lateration] that inflates each distance variance
    /// with its reference position uncertainty (iterative solver only).
    pub fn with_position_covariance(&self, fold: bool) -> Self {
        let mut s = self.clone();
        s.fold_covariance = fold;
        s
    }

    /// Copies and returns [Lateration] with covariance scaling preference.
    pub fn with_covariance_adjustment(&self, adjust: bool) -> Self {
        let mut s = self.clone();
        s.adjust_covariance = adjust;
        s
    }

    /// [LaterationMethod] in use
    pub fn method(&self) -> LaterationMethod {
        self.method
    }

    /// Solves position using all [Sphere]s.
    pub fn solve(&self, spheres: &[Sphere<D>]) -> Result<LaterationSolution<D>, Error> {
        if spheres.len() < Self::MIN_SPHERES {
            return Err(Error::NotEnoughReadings {
                required: Self::MIN_SPHERES,
                provided: spheres.len(),
            });
        }

        let indices = (0..spheres.len()).collect::<Vec<_>>();

        let solution = match self.method {
            LaterationMethod::Homogeneous => linear::homogeneous(spheres, &indices).map(|position| {
                LaterationSolution {
                    position,
                    covariance: None,
                    iterations: 1,
                }
            }),
            LaterationMethod::Inhomogeneous => {
                linear::inhomogeneous(spheres, &indices).map(|position| LaterationSolution {
                    position,
                    covariance: None,
                    iterations: 1,
                })
            },
            LaterationMethod::NonLinear => {
                let initial = self
                    .initial
                    .unwrap_or_else(|| centroid(spheres, &indices));
                self.nonlinear(spheres, &indices, initial)
            },
        }
        .map_err(Error::Estimation)?;

        debug!(
            "{} lateration: {:?} ({} iterations)",
            self.method,
            solution.position.as_slice(),
            solution.iterations
        );

        Ok(solution)
    }

    /// Solves a minimal subset of [Sphere]s, as used by robust estimators.
    /// Returns zero or one candidate position: numerical failures simply yield none.
    pub fn preliminary(&self, spheres: &[Sphere<D>], subset: &[usize]) -> Vec<Point<D>> {
        let position = match self.method {
            LaterationMethod::Homogeneous => linear::homogeneous(spheres, subset).ok(),
            LaterationMethod::Inhomogeneous => linear::inhomogeneous(spheres, subset).ok(),
            LaterationMethod::NonLinear => {
                let initial = centroid(spheres, subset);
                self.nonlinear(spheres, subset, initial)
                    .ok()
                    .map(|solution| solution.position)
            },
        };

        position
            .filter(|p| p.iter().all(|v| v.is_finite()))
            .into_iter()
            .collect()
    }

    /// Iterative solution over `subset`, seeded at `initial`.
    /// Also used to refine consensus solutions.
    pub(crate) fn nonlinear(
        &self,
        spheres: &[Sphere<D>],
        subset: &[usize],
        initial: Point<D>,
    ) -> Result<LaterationSolution<D>, NumericalError> {
        let problem = RangeProblem::new(spheres, subset, &initial, self.fold_covariance);
        let fit = self
            .solver
            .fit(&problem, DVector::from_column_slice(initial.as_slice()))?;

        let position = Point::<D>::from_column_slice(fit.x.as_slice());

        let covariance = match fit.covariance(self.adjust_covariance) {
            Ok(covariance) => Some(Covariance::<D>::from_column_slice(covariance.as_slice())),
            Err(e) => {
                debug!("lateration covariance: {}", e);
                None
            },
        };

        Ok(LaterationSolution {
            position,
            covariance,
            iterations: fit.iterations,
        })
    }
}

/// Centroid of the [Sphere]s centers, for `subset`.
pub(crate) fn centroid<const D: usize>(spheres: &[Sphere<D>], subset: &[usize]) -> Point<D> {
    let sum = subset
        .iter()
        .fold(Point::<D>::zeros(), |acc, i| acc + spheres[*i].center());
    sum / (subset.len().max(1) as f64)
}

#[cfg(test)]
mod test {
    use super::{centroid, Lateration, Sphere};
    use crate::{
        cfg::LaterationMethod,
        prelude::{Error, ReferencePosition},
    };
    use nalgebra::{Vector2, Vector3};
    use rstest::*;

    fn spheres_2d(truth: Vector2<f64>, refs: &[(f64, f64)]) -> Vec<Sphere<2>> {
        refs.iter()
            .map(|(x, y)| {
                let center = Vector2::new(*x, *y);
                Sphere::new(
                    ReferencePosition::new(center),
                    (truth - center).norm(),
                    1.0,
                )
            })
            .collect()
    }

    #[rstest]
    #[case(LaterationMethod::Homogeneous)]
    #[case(LaterationMethod::Inhomogeneous)]
    #[case(LaterationMethod::NonLinear)]
    fn three_circles_around_origin(#[case] method: LaterationMethod) {
        let spheres = spheres_2d(
            Vector2::new(0.0, 0.0),
            &[(10.0, 0.0), (0.0, 10.0), (-10.0, 0.0)],
        );

        for sphere in spheres.iter() {
            assert_eq!(sphere.radius, 10.0);
        }

        let solution = Lateration::new(method).solve(&spheres).unwrap();
        assert!(solution.position.norm() < 1.0E-6, "{:?}", solution.position);
    }

    #[rstest]
    #[case(LaterationMethod::Homogeneous)]
    #[case(LaterationMethod::Inhomogeneous)]
    #[case(LaterationMethod::NonLinear)]
    fn spheres_3d(#[case] method: LaterationMethod) {
        let truth = Vector3::new(1.5, -2.0, 0.75);
        let spheres = [
            (0.0, 0.0, 0.0),
            (10.0, 0.0, 1.0),
            (0.0, 10.0, 2.0),
            (3.0, 4.0, 10.0),
            (-5.0, -5.0, -3.0),
        ]
        .iter()
        .map(|(x, y, z)| {
            let center = Vector3::new(*x, *y, *z);
            Sphere::new(ReferencePosition::new(center), (truth - center).norm(), 0.1)
        })
        .collect::<Vec<_>>();

        let solution = Lateration::new(method).solve(&spheres).unwrap();
        assert!((solution.position - truth).norm() < 1.0E-6);

        // minimal subset
        let solution = Lateration::new(method).solve(&spheres[..4]).unwrap();
        assert!((solution.position - truth).norm() < 1.0E-6);
    }

    #[test]
    fn not_enough_spheres() {
        let spheres = spheres_2d(Vector2::new(1.0, 1.0), &[(0.0, 0.0), (5.0, 0.0)]);
        assert_eq!(
            Lateration::new(LaterationMethod::Inhomogeneous)
                .solve(&spheres)
                .err(),
            Some(Error::NotEnoughReadings {
                required: 3,
                provided: 2
            })
        );
    }

    #[rstest]
    #[case(LaterationMethod::Homogeneous)]
    #[case(LaterationMethod::Inhomogeneous)]
    fn collinear_references(#[case] method: LaterationMethod) {
        let spheres = spheres_2d(
            Vector2::new(2.0, 5.0),
            &[(0.0, 0.0), (5.0, 0.0), (10.0, 0.0)],
        );
        match Lateration::new(method).solve(&spheres) {
            Err(Error::Estimation(_)) => {},
            other => panic!("should have failed, got {:?}", other),
        }
        assert!(Lateration::new(method)
            .preliminary(&spheres, &[0, 1, 2])
            .is_empty());
    }

    #[test]
    fn nonlinear_covariance() {
        let truth = Vector2::new(3.0, 4.0);
        let mut spheres = spheres_2d(
            truth,
            &[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)],
        );
        // slightly inconsistent distances
        spheres[0].radius += 0.01;
        spheres[3].radius -= 0.01;

        let solution = Lateration::new(LaterationMethod::NonLinear)
            .with_initial_position(Vector2::new(1.0, 1.0))
            .solve(&spheres)
            .unwrap();

        assert!((solution.position - truth).norm() < 0.05);

        let covariance = solution.covariance.unwrap();
        assert!(covariance[(0, 0)] > 0.0);
        assert!(covariance[(1, 1)] > 0.0);
        assert!((covariance[(0, 1)] - covariance[(1, 0)]).abs() < 1.0E-12);
    }

    #[test]
    fn preliminary_solutions() {
        let truth = Vector2::new(-1.0, 2.0);
        let spheres = spheres_2d(
            truth,
            &[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0), (5.0, -5.0)],
        );

        for method in [
            LaterationMethod::Homogeneous,
            LaterationMethod::Inhomogeneous,
            LaterationMethod::NonLinear,
        ] {
            let candidates = Lateration::new(method).preliminary(&spheres, &[4, 1, 2]);
            assert_eq!(candidates.len(), 1, "{} failed", method);
            assert!((candidates[0] - truth).norm() < 1.0E-6, "{} failed", method);
        }

        assert_eq!(
            centroid(&spheres, &[0, 1, 2, 3]),
            Vector2::new(5.0, 5.0)
        );
    }
}
