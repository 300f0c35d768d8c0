#![doc = include_str!("../README.md")]
#![cfg_attr(docrs, feature(doc_cfg))]

// private modules
mod cfg;
mod constants;
mod error;
mod fitting;
mod lateration;
mod power;
mod radio;
mod reading;
mod robust;

#[cfg(test)]
mod tests;

// prelude
pub mod prelude {
    pub use crate::cfg::{
        Config, LaterationMethod, Method, RangingOpts, RobustOpts, RssiOpts, SolverOpts,
    };
    pub use crate::constants::{
        DEFAULT_DISTANCE_STD_DEV_M, DEFAULT_PATH_LOSS_EXPONENT, DEFAULT_REFERENCE_DISTANCE_M,
        DEFAULT_RSSI_STD_DEV_DB, SPEED_OF_LIGHT_M_S,
    };
    pub use crate::error::{Error, NumericalError};
    pub use crate::lateration::{Lateration, LaterationSolution, Sphere};
    pub use crate::power::{dbm_to_mw, dbm_variance_to_mw, mw_to_dbm};
    pub use crate::radio::{RadioSourceEstimate, RadioSourceEstimator, Refinement, StageReport};
    pub use crate::reading::{
        Covariance, Point, RangingAndRssiReading, RangingReading, Reading, ReferencePosition,
        RssiReading,
    };
    pub use crate::robust::{
        Consensus, ConsensusProblem, EstimatorState, Event, InliersData, Listener,
        RobustEstimator, Score,
    };
    // re-export
    pub use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
}

// pub export
pub use error::Error;
