//! Linear lateration solvers.
//!
//! Each sphere equation |x - p_i|² = d_i² is differenced with the first one,
//! which cancels the quadratic term. Expressed relatively to p_0:
//!
//! 2 (p_i - p_0)·(x - p_0) = |p_i - p_0|² - d_i² + d_0²
use log::trace;
use nalgebra::{DMatrix, DVector};

use super::Sphere;
use crate::{error::NumericalError, prelude::Point};

/// Relative tolerance used to determine the numerical rank.
const RANK_TOLERANCE: f64 = 1.0E-10;

/// Forms the differenced system (A, b), relative to the first sphere of `subset`.
fn differenced_system<const D: usize>(
    spheres: &[Sphere<D>],
    subset: &[usize],
) -> (DMatrix<f64>, DVector<f64>) {
    let first = &spheres[subset[0]];
    let p0 = first.center();
    let d0_sq = first.radius.powi(2);

    let nrows = subset.len() - 1;
    let mut a = DMatrix::<f64>::zeros(nrows, D);
    let mut b = DVector::<f64>::zeros(nrows);

    for (row, index) in subset.iter().skip(1).enumerate() {
        let sphere = &spheres[*index];
        let delta = sphere.center() - p0;
        for k in 0..D {
            a[(row, k)] = 2.0 * delta[k];
        }
        b[row] = delta.norm_squared() - sphere.radius.powi(2) + d0_sq;
    }

    (a, b)
}

fn rank_tolerance(singular_values: &DVector<f64>) -> f64 {
    singular_values.max() * RANK_TOLERANCE
}

/// Solves the inhomogeneous form A x = b by least squares.
pub(crate) fn inhomogeneous<const D: usize>(
    spheres: &[Sphere<D>],
    subset: &[usize],
) -> Result<Point<D>, NumericalError> {
    if subset.len() < D + 1 {
        return Err(NumericalError::Underdetermined);
    }

    let (a, b) = differenced_system(spheres, subset);

    let svd = a.svd(true, true);
    let eps = rank_tolerance(&svd.singular_values);

    if svd.rank(eps) < D {
        trace!("inhomogeneous lateration: rank deficient");
        return Err(NumericalError::RankDeficient);
    }

    let x = svd
        .solve(&b, eps)
        .map_err(|_| NumericalError::RankDeficient)?;

    Ok(spheres[subset[0]].center() + Point::<D>::from_column_slice(x.as_slice()))
}

/// Solves the homogeneous form [A | -b] [x 1]ᵀ = 0: the solution is
/// the right singular vector associated to the smallest singular value,
/// normalized by its last coordinate.
pub(crate) fn homogeneous<const D: usize>(
    spheres: &[Sphere<D>],
    subset: &[usize],
) -> Result<Point<D>, NumericalError> {
    if subset.len() < D + 1 {
        return Err(NumericalError::Underdetermined);
    }

    let (a, b) = differenced_system(spheres, subset);

    // zero padding so the decomposition exposes the complete right singular basis
    let nrows = a.nrows().max(D + 1);
    let mut h = DMatrix::<f64>::zeros(nrows, D + 1);

    for row in 0..a.nrows() {
        for k in 0..D {
            h[(row, k)] = a[(row, k)];
        }
        h[(row, D)] = -b[row];
    }

    let svd = h.svd(false, true);
    let eps = rank_tolerance(&svd.singular_values);

    if svd.rank(eps) < D {
        trace!("homogeneous lateration: rank deficient");
        return Err(NumericalError::RankDeficient);
    }

    let v_t = svd.v_t.as_ref().ok_or(NumericalError::RankDeficient)?;
    let null = v_t.row(svd.singular_values.imin());

    let scale = null[D];
    if scale.abs() <= f64::EPSILON * null.norm() {
        // point at infinity
        return Err(NumericalError::RankDeficient);
    }

    let mut x = Point::<D>::zeros();
    for k in 0..D {
        x[k] = null[k] / scale;
    }

    Ok(spheres[subset[0]].center() + x)
}
