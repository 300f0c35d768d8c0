//! Log-distance path loss model: Pr = Pt - 10 n log10(d / d0)
use std::f64::consts::LN_10;

use log::trace;
use nalgebra::{DMatrix, DVector};

use crate::{
    error::NumericalError,
    fitting::{Fit, LeastSquaresProblem, LevenbergMarquardt},
    prelude::Point,
    robust::ConsensusProblem,
};

/// The model diverges at the source: shorter distances are clamped.
const MIN_DISTANCE_M: f64 = 1.0E-6;

/// Relative tolerance used to determine the numerical rank.
const RANK_TOLERANCE: f64 = 1.0E-10;

/// Received power (dBm) predicted at `distance_m` from a source emitting `power_dbm`.
pub(crate) fn received_power(
    power_dbm: f64,
    exponent: f64,
    distance_m: f64,
    reference_distance_m: f64,
) -> f64 {
    power_dbm - 10.0 * exponent * (distance_m.max(MIN_DISTANCE_M) / reference_distance_m).log10()
}

/// Received power observation
#[derive(Debug, Clone, Copy)]
pub(crate) struct RssiObservation<const D: usize> {
    pub reference: Point<D>,
    pub rssi_dbm: f64,
    pub std_dev_db: f64,
}

/// Radio source candidate, as hypothesized by the RSSI stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RssiSolution<const D: usize> {
    pub position: Point<D>,
    pub power_dbm: f64,
    pub exponent: f64,
}

impl<const D: usize> RssiSolution<D> {
    fn is_finite(&self) -> bool {
        self.power_dbm.is_finite()
            && self.exponent.is_finite()
            && self.position.iter().all(|v| v.is_finite())
    }
}

/// Unknowns of the RSSI stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Unknowns {
    pub position: bool,
    pub power: bool,
    pub exponent: bool,
}

impl Unknowns {
    /// Number of RSSI specific (power, exponent) unknowns
    pub fn num_rssi(&self) -> usize {
        self.power as usize + self.exponent as usize
    }

    /// Minimal number of observations. Position estimation requires one more
    /// observation than the spatial dimension, even when nothing else is unknown.
    pub fn min_observations<const D: usize>(&self) -> usize {
        if self.position {
            D + self.num_rssi().max(1)
        } else {
            self.num_rssi()
        }
    }
}

/// RSSI stage problem
pub(crate) struct RssiProblem<'a, const D: usize> {
    observations: &'a [RssiObservation<D>],
    unknowns: Unknowns,
    /// Frozen position, or initial guess when estimated
    position: Option<Point<D>>,
    /// Frozen power (dBm), or initial guess when estimated
    power_dbm: Option<f64>,
    /// Frozen exponent, or initial guess when estimated
    exponent: f64,
    reference_distance_m: f64,
    solver: LevenbergMarquardt,
}

impl<'a, const D: usize> RssiProblem<'a, D> {
    /// Builds new [RssiProblem]. Frozen unknowns must be defined.
    pub fn new(
        observations: &'a [RssiObservation<D>],
        unknowns: Unknowns,
        position: Option<Point<D>>,
        power_dbm: Option<f64>,
        exponent: f64,
        reference_distance_m: f64,
        solver: LevenbergMarquardt,
    ) -> Option<Self> {
        if !unknowns.position && position.is_none() {
            return None;
        }
        if !unknowns.power && power_dbm.is_none() {
            return None;
        }
        Some(Self {
            observations,
            unknowns,
            position,
            power_dbm,
            exponent,
            reference_distance_m,
            solver,
        })
    }

    fn num_parameters(&self) -> usize {
        let position = if self.unknowns.position { D } else { 0 };
        position + self.unknowns.num_rssi()
    }

    /// Parameter vector: position (if estimated), power (if estimated), exponent (if estimated)
    pub fn pack(&self, solution: &RssiSolution<D>) -> DVector<f64> {
        let mut x = DVector::<f64>::zeros(self.num_parameters());
        let mut col = 0;
        if self.unknowns.position {
            for k in 0..D {
                x[k] = solution.position[k];
            }
            col = D;
        }
        if self.unknowns.power {
            x[col] = solution.power_dbm;
            col += 1;
        }
        if self.unknowns.exponent {
            x[col] = solution.exponent;
        }
        x
    }

    /// Parameter vector to [RssiSolution], completed with the frozen unknowns.
    pub fn unpack(&self, x: &DVector<f64>) -> RssiSolution<D> {
        let mut col = 0;
        let position = if self.unknowns.position {
            col = D;
            Point::<D>::from_iterator(x.iter().take(D).copied())
        } else {
            self.position.unwrap_or_else(Point::<D>::zeros)
        };
        let power_dbm = if self.unknowns.power {
            col += 1;
            x[col - 1]
        } else {
            self.power_dbm.unwrap_or(0.0)
        };
        let exponent = if self.unknowns.exponent {
            x[col]
        } else {
            self.exponent
        };
        RssiSolution {
            position,
            power_dbm,
            exponent,
        }
    }

    fn centroid(&self, subset: &[usize]) -> Point<D> {
        let sum = subset
            .iter()
            .fold(Point::<D>::zeros(), |acc, i| acc + self.observations[*i].reference);
        sum / (subset.len().max(1) as f64)
    }

    /// Initial solution for `subset`. The transmitted power is deduced from
    /// the strongest reading, assumed at least at the reference distance.
    pub fn seed(&self, subset: &[usize]) -> RssiSolution<D> {
        let position = self.position.unwrap_or_else(|| self.centroid(subset));

        let power_dbm = self.power_dbm.unwrap_or_else(|| {
            subset
                .iter()
                .map(|i| &self.observations[*i])
                .max_by(|a, b| a.rssi_dbm.total_cmp(&b.rssi_dbm))
                .map(|obs| {
                    let distance = (position - obs.reference)
                        .norm()
                        .max(self.reference_distance_m);
                    obs.rssi_dbm + 10.0 * self.exponent * (distance / self.reference_distance_m).log10()
                })
                .unwrap_or(0.0)
        });

        RssiSolution {
            position,
            power_dbm,
            exponent: self.exponent,
        }
    }

    /// Direct least squares solution of (power, exponent) at frozen position.
    /// The model is linear in these unknowns: Pr = Pt + n g(d) with g(d) = -10 log10(d / d0).
    fn linear(&self, subset: &[usize]) -> Option<RssiSolution<D>> {
        let seed = self.seed(subset);
        let ncols = self.unknowns.num_rssi();

        if ncols == 0 || subset.len() < ncols {
            return None;
        }

        let mut a = DMatrix::<f64>::zeros(subset.len(), ncols);
        let mut b = DVector::<f64>::zeros(subset.len());

        for (row, index) in subset.iter().enumerate() {
            let obs = &self.observations[*index];
            let distance = (seed.position - obs.reference).norm().max(MIN_DISTANCE_M);
            let g = -10.0 * (distance / self.reference_distance_m).log10();

            match (self.unknowns.power, self.unknowns.exponent) {
                (true, true) => {
                    a[(row, 0)] = 1.0;
                    a[(row, 1)] = g;
                    b[row] = obs.rssi_dbm;
                },
                (true, false) => {
                    a[(row, 0)] = 1.0;
                    b[row] = obs.rssi_dbm - seed.exponent * g;
                },
                (false, true) => {
                    a[(row, 0)] = g;
                    b[row] = obs.rssi_dbm - seed.power_dbm;
                },
                (false, false) => return None,
            }
        }

        let svd = a.svd(true, true);
        let eps = svd.singular_values.max() * RANK_TOLERANCE;
        if svd.rank(eps) < ncols {
            trace!("rssi: rank deficient subset {:?}", subset);
            return None;
        }

        let x = svd.solve(&b, eps).ok()?;

        let mut solution = seed;
        let mut col = 0;
        if self.unknowns.power {
            solution.power_dbm = x[0];
            col += 1;
        }
        if self.unknowns.exponent {
            solution.exponent = x[col];
        }
        Some(solution)
    }

    /// Iterative fit over `subset`, starting from `seed`.
    pub fn fit(
        &self,
        subset: &[usize],
        seed: &RssiSolution<D>,
    ) -> Result<(RssiSolution<D>, Fit), NumericalError> {
        let problem = SubsetFit {
            problem: self,
            subset,
        };
        let fit = self.solver.fit(&problem, self.pack(seed))?;
        Ok((self.unpack(&fit.x), fit))
    }
}

impl<const D: usize> ConsensusProblem for RssiProblem<'_, D> {
    type Solution = RssiSolution<D>;

    fn num_samples(&self) -> usize {
        self.observations.len()
    }

    fn subset_size(&self) -> usize {
        self.unknowns.min_observations::<D>()
    }

    fn candidates(&self, subset: &[usize]) -> Vec<RssiSolution<D>> {
        let solution = if self.unknowns.position {
            self.fit(subset, &self.seed(subset))
                .ok()
                .map(|(solution, _)| solution)
        } else {
            self.linear(subset)
        };

        solution.filter(|s| s.is_finite()).into_iter().collect()
    }

    /// Absolute received power error, in dB
    fn residual(&self, solution: &RssiSolution<D>, index: usize) -> f64 {
        let obs = &self.observations[index];
        let distance = (solution.position - obs.reference).norm();
        let predicted = received_power(
            solution.power_dbm,
            solution.exponent,
            distance,
            self.reference_distance_m,
        );
        (predicted - obs.rssi_dbm).abs()
    }
}

/// [RssiProblem] restricted to a subset of observations
struct SubsetFit<'p, 'a, const D: usize> {
    problem: &'p RssiProblem<'a, D>,
    subset: &'p [usize],
}

impl<const D: usize> LeastSquaresProblem for SubsetFit<'_, '_, D> {
    fn num_parameters(&self) -> usize {
        self.problem.num_parameters()
    }

    fn num_observations(&self) -> usize {
        self.subset.len()
    }

    fn residual(&self, index: usize, x: &DVector<f64>, jacobian: &mut [f64]) -> f64 {
        let problem = self.problem;
        let obs = &problem.observations[self.subset[index]];
        let solution = problem.unpack(x);
        let sigma = obs.std_dev_db;

        let delta = solution.position - obs.reference;
        let distance = delta.norm().max(MIN_DISTANCE_M);

        let mut col = 0;
        if problem.unknowns.position {
            let scale = -10.0 * solution.exponent / (LN_10 * distance.powi(2));
            for k in 0..D {
                jacobian[k] = scale * delta[k] / sigma;
            }
            col = D;
        }
        if problem.unknowns.power {
            jacobian[col] = 1.0 / sigma;
            col += 1;
        }
        if problem.unknowns.exponent {
            jacobian[col] = -10.0 * (distance / problem.reference_distance_m).log10() / sigma;
        }

        let predicted = received_power(
            solution.power_dbm,
            solution.exponent,
            distance,
            problem.reference_distance_m,
        );

        (predicted - obs.rssi_dbm) / sigma
    }
}
