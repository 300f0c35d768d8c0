/// Speed of light in vacuum (m.s⁻¹)
pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

/// Nominal ranging standard deviation (m) applied to readings
/// that do not specify one.
pub const DEFAULT_DISTANCE_STD_DEV_M: f64 = 1.0E-3;

/// Nominal RSSI standard deviation (dB) applied to readings
/// that do not specify one.
pub const DEFAULT_RSSI_STD_DEV_DB: f64 = 1.0;

/// Free space path loss exponent
pub const DEFAULT_PATH_LOSS_EXPONENT: f64 = 2.0;

/// Path loss model reference distance (m)
pub const DEFAULT_REFERENCE_DISTANCE_M: f64 = 1.0;

/// Consistency constant of the median absolute deviation
/// for normally distributed residuals.
pub const MEDIAN_STD_DEV_FACTOR: f64 = 1.4826;
