//! Power unit conversions
use num_traits::Float;

/// Converts power expressed in dBm to mW.
pub fn dbm_to_mw<T: Float>(dbm: T) -> T {
    let ten = T::from(10.0).unwrap_or_else(T::one);
    ten.powf(dbm / ten)
}

/// Converts power expressed in mW to dBm.
/// Non positive power yields -∞ or NaN, as does the log10 function.
pub fn mw_to_dbm<T: Float>(mw: T) -> T {
    let ten = T::from(10.0).unwrap_or_else(T::one);
    ten * mw.log10()
}

/// Propagates a power variance expressed in dBm² to mW²,
/// at first order around `dbm`.
pub fn dbm_variance_to_mw<T: Float>(dbm: T, variance_dbm: T) -> T {
    let ten = T::from(10.0).unwrap_or_else(T::one);
    let slope = dbm_to_mw(dbm) * ten.ln() / ten;
    slope * slope * variance_dbm
}
