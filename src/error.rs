use thiserror::Error;

/// Numerical failures raised by the solvers. These are wrapped into
/// [Error::Estimation] when they abort an estimation run.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum NumericalError {
    /// The linearized lateration system does not have full rank:
    /// reference positions are collinear (2D) or coplanar (3D).
    #[error("rank deficient system (degenerate reference geometry)")]
    RankDeficient,

    /// Iterative solver exceeded its iteration cap.
    #[error("iterative solver did not converge")]
    DidNotConverge,

    /// The normal equations information matrix could not be inverted.
    #[error("singular information matrix: covariance not available")]
    SingularCovariance,

    /// Less observations than unknowns.
    #[error("underdetermined system")]
    Underdetermined,

    /// Estimate collapsed onto a reference position, or produced
    /// non finite values.
    #[error("degenerate geometry (non finite model)")]
    DegenerateGeometry,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Failed to parse robust estimation method
    #[error("unknown robust estimation method")]
    UnknownMethod,

    /// Inlier threshold must be strictly positive.
    #[error("invalid threshold: must be > 0")]
    InvalidThreshold,

    /// LMedS / PROMedS stop threshold must be strictly positive.
    #[error("invalid stop threshold: must be > 0")]
    InvalidStopThreshold,

    /// Confidence must lie in the open interval (0, 1).
    #[error("invalid confidence: must be within ]0, 1[")]
    InvalidConfidence,

    #[error("invalid max iterations: must be > 0")]
    InvalidMaxIterations,

    #[error("invalid progress delta: must be within [0, 1]")]
    InvalidProgressDelta,

    #[error("invalid inlier factor: must be > 0")]
    InvalidInlierFactor,

    /// Standard deviations, when specified, must be strictly positive.
    #[error("invalid standard deviation: must be > 0")]
    InvalidStandardDeviation,

    /// Measured distances cannot be negative.
    #[error("invalid distance: must be >= 0")]
    InvalidDistance,

    /// Path loss reference distance (or carrier frequency) must be strictly positive.
    #[error("invalid path loss reference distance")]
    InvalidReferenceDistance,

    /// PROSAC and PROMedS need exactly one quality score per sample.
    #[error("quality scores mismatch: {provided} scores for {expected} samples")]
    QualityScoresMismatch { expected: usize, provided: usize },

    /// Not enough readings for the unknowns being estimated.
    #[error("not enough readings: {provided} provided, {required} required")]
    NotEnoughReadings { required: usize, provided: usize },

    /// Any mutation attempted while an estimation is running.
    #[error("estimator is locked: estimation in progress")]
    Locked,

    /// Estimation attempted without sufficient or valid setup.
    #[error("estimator is not ready")]
    NotReady,

    /// Numerical failure that aborted the estimation.
    #[error("estimation failure: {0}")]
    Estimation(NumericalError),

    /// The robust estimator exhausted its iterations without
    /// finding a consensus large enough.
    #[error("not enough inliers: no consensus reached")]
    NotEnoughInliers,
}
