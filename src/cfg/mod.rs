#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        DEFAULT_DISTANCE_STD_DEV_M, DEFAULT_PATH_LOSS_EXPONENT, DEFAULT_REFERENCE_DISTANCE_M,
        DEFAULT_RSSI_STD_DEV_DB, SPEED_OF_LIGHT_M_S,
    },
    prelude::Error,
};

mod method;
pub use method::Method;

/// Lateration solver technique
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LaterationMethod {
    /// Linear solver using the homogeneous form of the
    /// differenced sphere equations (solved by SVD null space).
    Homogeneous,
    /// Linear solver using the inhomogeneous (least squares) form of the
    /// differenced sphere equations. Generally better conditioned.
    #[default]
    Inhomogeneous,
    /// Iterative (Levenberg-Marquardt) solver minimizing
    /// the weighted squared range residuals.
    NonLinear,
}

impl std::fmt::Display for LaterationMethod {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Homogeneous => write!(fmt, "homogeneous"),
            Self::Inhomogeneous => write!(fmt, "inhomogeneous"),
            Self::NonLinear => write!(fmt, "non-linear"),
        }
    }
}

fn default_confidence() -> f64 {
    0.99
}

fn default_max_iterations() -> usize {
    5000
}

fn default_progress_delta() -> f32 {
    0.05
}

fn default_inlier_factor() -> f64 {
    1.5
}

fn default_seed() -> u64 {
    0
}

fn default_keep_inliers() -> bool {
    true
}

fn default_keep_residuals() -> bool {
    true
}

fn default_ranging_threshold() -> f64 {
    0.1
}

fn default_ranging_stop_threshold() -> f64 {
    1.0E-6
}

fn default_distance_std_dev() -> f64 {
    DEFAULT_DISTANCE_STD_DEV_M
}

fn default_rssi_threshold() -> f64 {
    1.0
}

fn default_rssi_stop_threshold() -> f64 {
    1.0E-6
}

fn default_rssi_std_dev() -> f64 {
    DEFAULT_RSSI_STD_DEV_DB
}

fn default_reference_distance() -> f64 {
    DEFAULT_REFERENCE_DISTANCE_M
}

fn default_exponent() -> f64 {
    DEFAULT_PATH_LOSS_EXPONENT
}

fn default_estimate_power() -> bool {
    true
}

fn default_estimate_exponent() -> bool {
    false
}

fn default_estimate_position() -> bool {
    true
}

fn default_refine() -> bool {
    true
}

fn default_adjust_covariance() -> bool {
    true
}

fn default_solver_max_iterations() -> usize {
    100
}

fn default_solver_tolerance() -> f64 {
    1.0E-12
}

/// Robust (resampling) estimator options, shared by all estimation stages.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RobustOpts {
    /// Robust estimation [Method]
    #[cfg_attr(feature = "serde", serde(default))]
    pub method: Method,
    /// Probability that at least one drawn subset is free of outliers.
    /// Drives the adaptive number of iterations. Must lie within ]0, 1[.
    #[cfg_attr(feature = "serde", serde(default = "default_confidence"))]
    pub confidence: f64,
    /// Hard cap on the number of subsets drawn.
    #[cfg_attr(feature = "serde", serde(default = "default_max_iterations"))]
    pub max_iterations: usize,
    /// Progress notifications are emitted every time
    /// progress increases by this amount, within [0, 1].
    #[cfg_attr(feature = "serde", serde(default = "default_progress_delta"))]
    pub progress_delta: f32,
    /// LMedS and PROMedS: inlier threshold, expressed in
    /// robust standard deviations.
    #[cfg_attr(feature = "serde", serde(default = "default_inlier_factor"))]
    pub inlier_factor: f64,
    /// Random generator seed. Identical seeds and inputs yield identical results.
    #[cfg_attr(feature = "serde", serde(default = "default_seed"))]
    pub seed: u64,
    /// Expose the inliers of the winning solution
    #[cfg_attr(feature = "serde", serde(default = "default_keep_inliers"))]
    pub keep_inliers: bool,
    /// Expose the residuals of the winning solution
    #[cfg_attr(feature = "serde", serde(default = "default_keep_residuals"))]
    pub keep_residuals: bool,
}

impl Default for RobustOpts {
    fn default() -> Self {
        Self {
            method: Method::default(),
            confidence: default_confidence(),
            max_iterations: default_max_iterations(),
            progress_delta: default_progress_delta(),
            inlier_factor: default_inlier_factor(),
            seed: default_seed(),
            keep_inliers: default_keep_inliers(),
            keep_residuals: default_keep_residuals(),
        }
    }
}

impl RobustOpts {
    /// Verifies these [RobustOpts]
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(Error::InvalidConfidence);
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidMaxIterations);
        }
        if !(0.0..=1.0).contains(&self.progress_delta) {
            return Err(Error::InvalidProgressDelta);
        }
        if !(self.inlier_factor > 0.0) {
            return Err(Error::InvalidInlierFactor);
        }
        Ok(())
    }
}

/// Ranging (distance based) stage options
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RangingOpts {
    /// [LaterationMethod] used to solve minimal subsets
    #[cfg_attr(feature = "serde", serde(default))]
    pub solver: LaterationMethod,
    /// RANSAC, MSAC, PROSAC: inlier threshold, in meters.
    #[cfg_attr(feature = "serde", serde(default = "default_ranging_threshold"))]
    pub threshold_m: f64,
    /// LMedS, PROMedS: stop as soon as the median residual
    /// falls below this value, in meters.
    #[cfg_attr(feature = "serde", serde(default = "default_ranging_stop_threshold"))]
    pub stop_threshold_m: f64,
    /// Standard deviation (m) assigned to readings that do not specify one
    #[cfg_attr(feature = "serde", serde(default = "default_distance_std_dev"))]
    pub default_distance_std_dev_m: f64,
    /// Inflate each distance variance with the uncertainty
    /// of its reference position, when known.
    #[cfg_attr(feature = "serde", serde(default))]
    pub use_position_covariance: bool,
}

impl Default for RangingOpts {
    fn default() -> Self {
        Self {
            solver: LaterationMethod::default(),
            threshold_m: default_ranging_threshold(),
            stop_threshold_m: default_ranging_stop_threshold(),
            default_distance_std_dev_m: default_distance_std_dev(),
            use_position_covariance: false,
        }
    }
}

impl RangingOpts {
    /// Verifies these [RangingOpts]
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.threshold_m > 0.0) {
            return Err(Error::InvalidThreshold);
        }
        if !(self.stop_threshold_m > 0.0) {
            return Err(Error::InvalidStopThreshold);
        }
        if !(self.default_distance_std_dev_m > 0.0) {
            return Err(Error::InvalidStandardDeviation);
        }
        Ok(())
    }
}

/// RSSI (received power) stage options
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RssiOpts {
    /// Estimate the transmitted power. When disabled,
    /// the initial power is held fixed.
    #[cfg_attr(feature = "serde", serde(default = "default_estimate_power"))]
    pub estimate_power: bool,
    /// Estimate the path loss exponent. When disabled,
    /// [Self::initial_exponent] is held fixed.
    #[cfg_attr(feature = "serde", serde(default = "default_estimate_exponent"))]
    pub estimate_exponent: bool,
    /// RANSAC, MSAC, PROSAC: inlier threshold, in dB.
    #[cfg_attr(feature = "serde", serde(default = "default_rssi_threshold"))]
    pub threshold_db: f64,
    /// LMedS, PROMedS: stop as soon as the median residual
    /// falls below this value, in dB.
    #[cfg_attr(feature = "serde", serde(default = "default_rssi_stop_threshold"))]
    pub stop_threshold_db: f64,
    /// Standard deviation (dB) assigned to readings that do not specify one
    #[cfg_attr(feature = "serde", serde(default = "default_rssi_std_dev"))]
    pub default_rssi_std_dev_db: f64,
    /// Path loss model reference distance d0 (m):
    /// Pr = Pt - 10 n log10(d / d0)
    #[cfg_attr(feature = "serde", serde(default = "default_reference_distance"))]
    pub reference_distance_m: f64,
    /// Path loss exponent, used as initial value when estimated.
    #[cfg_attr(feature = "serde", serde(default = "default_exponent"))]
    pub initial_exponent: f64,
}

impl Default for RssiOpts {
    fn default() -> Self {
        Self {
            estimate_power: default_estimate_power(),
            estimate_exponent: default_estimate_exponent(),
            threshold_db: default_rssi_threshold(),
            stop_threshold_db: default_rssi_stop_threshold(),
            default_rssi_std_dev_db: default_rssi_std_dev(),
            reference_distance_m: default_reference_distance(),
            initial_exponent: default_exponent(),
        }
    }
}

impl RssiOpts {
    /// Copies and returns [RssiOpts] with path loss reference distance
    /// deduced from the carrier frequency (Hz): d0 = c / (4π f).
    /// The log-distance model then matches the Friis free space equation.
    pub fn with_frequency(&self, frequency_hz: f64) -> Result<Self, Error> {
        if !(frequency_hz > 0.0) {
            return Err(Error::InvalidReferenceDistance);
        }
        let mut s = self.clone();
        s.reference_distance_m = SPEED_OF_LIGHT_M_S / (4.0 * std::f64::consts::PI * frequency_hz);
        Ok(s)
    }

    /// Number of RSSI specific unknowns (power, exponent) being estimated.
    pub fn num_unknowns(&self) -> usize {
        self.estimate_power as usize + self.estimate_exponent as usize
    }

    /// Verifies these [RssiOpts]
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.threshold_db > 0.0) {
            return Err(Error::InvalidThreshold);
        }
        if !(self.stop_threshold_db > 0.0) {
            return Err(Error::InvalidStopThreshold);
        }
        if !(self.default_rssi_std_dev_db > 0.0) {
            return Err(Error::InvalidStandardDeviation);
        }
        if !(self.reference_distance_m > 0.0) {
            return Err(Error::InvalidReferenceDistance);
        }
        Ok(())
    }
}

/// Levenberg-Marquardt solver options, used by the non linear
/// lateration solver and the refinement stage.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverOpts {
    /// Maximal number of iterations before declaring divergence.
    #[cfg_attr(feature = "serde", serde(default = "default_solver_max_iterations"))]
    pub max_iterations: usize,
    /// Relative step size under which we declare convergence.
    #[cfg_attr(feature = "serde", serde(default = "default_solver_tolerance"))]
    pub tolerance: f64,
}

impl Default for SolverOpts {
    fn default() -> Self {
        Self {
            max_iterations: default_solver_max_iterations(),
            tolerance: default_solver_tolerance(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// Estimate the source position. When disabled, the
    /// initial position must be provided and is held fixed.
    #[cfg_attr(feature = "serde", serde(default = "default_estimate_position"))]
    pub estimate_position: bool,
    /// Refine the consensus solution over its inliers, which also
    /// provides the covariance of the estimate.
    #[cfg_attr(feature = "serde", serde(default = "default_refine"))]
    pub refine: bool,
    /// Scale refined covariances by the residual variance (χ² / (m - p)).
    #[cfg_attr(feature = "serde", serde(default = "default_adjust_covariance"))]
    pub adjust_covariance: bool,
    /// [RobustOpts] shared by all stages
    #[cfg_attr(feature = "serde", serde(default))]
    pub robust: RobustOpts,
    /// [RangingOpts]
    #[cfg_attr(feature = "serde", serde(default))]
    pub ranging: RangingOpts,
    /// [RssiOpts]
    #[cfg_attr(feature = "serde", serde(default))]
    pub rssi: RssiOpts,
    /// Iterative [SolverOpts]
    #[cfg_attr(feature = "serde", serde(default))]
    pub solver: SolverOpts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            estimate_position: default_estimate_position(),
            refine: default_refine(),
            adjust_covariance: default_adjust_covariance(),
            robust: RobustOpts::default(),
            ranging: RangingOpts::default(),
            rssi: RssiOpts::default(),
            solver: SolverOpts::default(),
        }
    }
}

impl Config {
    /// Returns [Config] for position only estimation, from ranging readings,
    /// with desired robust [Method]. You can then customize [Self] as you will.
    pub fn ranging_preset(method: Method) -> Self {
        let mut s = Self::default();
        s.robust.method = method;
        s.rssi.estimate_power = false;
        s.rssi.estimate_exponent = false;
        s
    }

    /// Returns [Config] for complete radio source estimation (position, transmitted
    /// power and path loss exponent) with desired robust [Method].
    /// You can then customize [Self] as you will.
    pub fn rssi_preset(method: Method) -> Self {
        let mut s = Self::default();
        s.robust.method = method;
        s.rssi.estimate_power = true;
        s.rssi.estimate_exponent = true;
        s
    }

    /// Copies and returns [Config] with updated robust [Method]
    pub fn with_method(&self, method: Method) -> Self {
        let mut s = self.clone();
        s.robust.method = method;
        s
    }

    /// Verifies this [Config], reporting the first inconsistency.
    pub fn validate(&self) -> Result<(), Error> {
        self.robust.validate()?;
        self.ranging.validate()?;
        self.rssi.validate()?;
        if self.solver.max_iterations == 0 {
            return Err(Error::InvalidMaxIterations);
        }
        if !(self.solver.tolerance > 0.0) {
            return Err(Error::InvalidThreshold);
        }
        Ok(())
    }
}
