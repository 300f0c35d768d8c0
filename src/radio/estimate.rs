use nalgebra::DMatrix;

use crate::{
    error::NumericalError,
    power::{dbm_to_mw, dbm_variance_to_mw},
    prelude::{Covariance, Point},
    robust::InliersData,
};

/// Outcome of the refinement step of a stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Refinement {
    /// Refinement was not requested: no covariance is available
    NotRequested,
    /// Consensus solution was refined over its inliers
    Refined {
        /// Number of solver iterations
        iterations: usize,
    },
    /// Refinement failed: the consensus solution is kept, unrefined.
    Failed(NumericalError),
}

impl Refinement {
    /// True when the solution was refined
    pub fn is_refined(&self) -> bool {
        matches!(self, Self::Refined { .. })
    }
}

/// Report of one estimation stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    /// [InliersData], when kept
    pub inliers: Option<InliersData>,
    /// Number of inliers
    pub num_inliers: usize,
    /// Number of subsets that were drawn
    pub iterations: usize,
    /// [Refinement] outcome
    pub refinement: Refinement,
}

/// [RadioSourceEstimate] obtained by the
/// [RadioSourceEstimator](crate::prelude::RadioSourceEstimator)
#[derive(Debug, Clone, PartialEq)]
pub struct RadioSourceEstimate<const D: usize> {
    /// Source position, estimated or held fixed
    pub position: Point<D>,
    /// Position covariance, when estimated and refined
    pub position_covariance: Option<Covariance<D>>,
    /// Transmitted power (dBm), when estimated or initially known
    pub transmitted_power_dbm: Option<f64>,
    /// Transmitted power variance (dBm²), when estimated and refined
    pub transmitted_power_variance: Option<f64>,
    /// Path loss exponent, estimated or held fixed
    pub path_loss_exponent: f64,
    /// Path loss exponent variance, when estimated and refined
    pub path_loss_exponent_variance: Option<f64>,
    /// Covariance of all estimated unknowns, ordered as position, power
    /// then exponent. Block diagonal when the position comes from the ranging
    /// stage: both stages are assumed independent.
    pub covariance: Option<DMatrix<f64>>,
    /// Ranging stage [StageReport], if it took place
    pub ranging: Option<StageReport>,
    /// RSSI stage [StageReport], if it took place
    pub rssi: Option<StageReport>,
}

impl<const D: usize> RadioSourceEstimate<D> {
    /// Transmitted power (mW)
    pub fn transmitted_power_mw(&self) -> Option<f64> {
        self.transmitted_power_dbm.map(dbm_to_mw)
    }

    /// Transmitted power variance (mW²), propagated at first order
    pub fn transmitted_power_mw_variance(&self) -> Option<f64> {
        let power = self.transmitted_power_dbm?;
        let variance = self.transmitted_power_variance?;
        Some(dbm_variance_to_mw(power, variance))
    }

    /// Position standard deviation, per axis
    pub fn position_std_dev(&self) -> Option<Point<D>> {
        self.position_covariance
            .map(|covariance| covariance.diagonal().map(|v| v.max(0.0).sqrt()))
    }
}

/// Block diagonal matrix made of `blocks`. Empty blocks are skipped.
pub(crate) fn block_diagonal(blocks: &[&DMatrix<f64>]) -> DMatrix<f64> {
    let size = blocks.iter().map(|b| b.nrows()).sum();
    let mut matrix = DMatrix::<f64>::zeros(size, size);
    let mut offset = 0;
    for block in blocks {
        let n = block.nrows();
        matrix.view_mut((offset, offset), (n, n)).copy_from(block);
        offset += n;
    }
    matrix
}
