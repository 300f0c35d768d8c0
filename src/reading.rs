//! Readings: observations tying a known reference position to a measurement.
use nalgebra::{SMatrix, SVector};

use crate::prelude::Error;

/// Point (or vector) in D dimensional space.
pub type Point<const D: usize> = SVector<f64, D>;

/// D×D covariance matrix.
pub type Covariance<const D: usize> = SMatrix<f64, D, D>;

fn checked_std_dev(std_dev: f64) -> Result<f64, Error> {
    if std_dev > 0.0 && std_dev.is_finite() {
        Ok(std_dev)
    } else {
        Err(Error::InvalidStandardDeviation)
    }
}

/// Known reference position, with possible uncertainty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePosition<const D: usize> {
    /// Position coordinates
    pub position: Point<D>,
    /// Possible position covariance
    pub covariance: Option<Covariance<D>>,
}

impl<const D: usize> From<Point<D>> for ReferencePosition<D> {
    fn from(position: Point<D>) -> Self {
        Self::new(position)
    }
}

impl<const D: usize> ReferencePosition<D> {
    /// Builds new [ReferencePosition] with perfectly known coordinates.
    pub fn new(position: Point<D>) -> Self {
        Self {
            position,
            covariance: None,
        }
    }

    /// Copies and returns [ReferencePosition] with position covariance.
    pub fn with_covariance(&self, covariance: Covariance<D>) -> Self {
        let mut s = *self;
        s.covariance = Some(covariance);
        s
    }

    /// Variance of the distance between this reference position and `point`,
    /// due to the reference position uncertainty, at first order.
    /// Returns 0 when the covariance is unknown or the points coincide.
    pub(crate) fn distance_variance(&self, point: &Point<D>) -> f64 {
        let covariance = match self.covariance {
            Some(covariance) => covariance,
            None => return 0.0,
        };
        let delta = point - self.position;
        let norm = delta.norm();
        if norm > 0.0 {
            let u = delta / norm;
            (u.transpose() * covariance * u)[(0, 0)].max(0.0)
        } else {
            0.0
        }
    }
}

/// Distance measured to a [ReferencePosition]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangingReading<const D: usize> {
    /// [ReferencePosition]
    pub reference: ReferencePosition<D>,
    /// Distance (m)
    pub distance_m: f64,
    /// Possible distance standard deviation (m)
    pub std_dev_m: Option<f64>,
}

impl<const D: usize> RangingReading<D> {
    /// Builds new [RangingReading]. Distance must be positive.
    pub fn new(reference: ReferencePosition<D>, distance_m: f64) -> Result<Self, Error> {
        if !(distance_m >= 0.0 && distance_m.is_finite()) {
            return Err(Error::InvalidDistance);
        }
        Ok(Self {
            reference,
            distance_m,
            std_dev_m: None,
        })
    }

    /// Copies and returns [RangingReading] with distance standard deviation (m),
    /// which must be strictly positive.
    pub fn with_std_dev(&self, std_dev_m: f64) -> Result<Self, Error> {
        let mut s = *self;
        s.std_dev_m = Some(checked_std_dev(std_dev_m)?);
        Ok(s)
    }
}

/// Received power measured at a [ReferencePosition]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RssiReading<const D: usize> {
    /// [ReferencePosition]
    pub reference: ReferencePosition<D>,
    /// Received power (dBm)
    pub rssi_dbm: f64,
    /// Possible RSSI standard deviation (dB)
    pub std_dev_db: Option<f64>,
}

impl<const D: usize> RssiReading<D> {
    /// Builds new [RssiReading]
    pub fn new(reference: ReferencePosition<D>, rssi_dbm: f64) -> Self {
        Self {
            reference,
            rssi_dbm,
            std_dev_db: None,
        }
    }

    /// Copies and returns [RssiReading] with RSSI standard deviation (dB),
    /// which must be strictly positive.
    pub fn with_std_dev(&self, std_dev_db: f64) -> Result<Self, Error> {
        let mut s = *self;
        s.std_dev_db = Some(checked_std_dev(std_dev_db)?);
        Ok(s)
    }
}

/// Both distance and received power measured at a [ReferencePosition]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangingAndRssiReading<const D: usize> {
    /// [ReferencePosition]
    pub reference: ReferencePosition<D>,
    /// Distance (m)
    pub distance_m: f64,
    /// Possible distance standard deviation (m)
    pub distance_std_dev_m: Option<f64>,
    /// Received power (dBm)
    pub rssi_dbm: f64,
    /// Possible RSSI standard deviation (dB)
    pub rssi_std_dev_db: Option<f64>,
}

impl<const D: usize> RangingAndRssiReading<D> {
    /// Builds new [RangingAndRssiReading]. Distance must be positive.
    pub fn new(
        reference: ReferencePosition<D>,
        distance_m: f64,
        rssi_dbm: f64,
    ) -> Result<Self, Error> {
        if !(distance_m >= 0.0 && distance_m.is_finite()) {
            return Err(Error::InvalidDistance);
        }
        Ok(Self {
            reference,
            distance_m,
            rssi_dbm,
            distance_std_dev_m: None,
            rssi_std_dev_db: None,
        })
    }

    /// Copies and returns [RangingAndRssiReading] with both standard deviations,
    /// which must be strictly positive.
    pub fn with_std_devs(&self, distance_std_dev_m: f64, rssi_std_dev_db: f64) -> Result<Self, Error> {
        let mut s = *self;
        s.distance_std_dev_m = Some(checked_std_dev(distance_std_dev_m)?);
        s.rssi_std_dev_db = Some(checked_std_dev(rssi_std_dev_db)?);
        Ok(s)
    }
}

/// Any kind of reading. Readings of different kinds may be mixed
/// within a single estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading<const D: usize> {
    Ranging(RangingReading<D>),
    Rssi(RssiReading<D>),
    RangingAndRssi(RangingAndRssiReading<D>),
}

impl<const D: usize> From<RangingReading<D>> for Reading<D> {
    fn from(reading: RangingReading<D>) -> Self {
        Self::Ranging(reading)
    }
}

impl<const D: usize> From<RssiReading<D>> for Reading<D> {
    fn from(reading: RssiReading<D>) -> Self {
        Self::Rssi(reading)
    }
}

impl<const D: usize> From<RangingAndRssiReading<D>> for Reading<D> {
    fn from(reading: RangingAndRssiReading<D>) -> Self {
        Self::RangingAndRssi(reading)
    }
}

impl<const D: usize> Reading<D> {
    /// [ReferencePosition] of this [Reading]
    pub fn reference(&self) -> &ReferencePosition<D> {
        match self {
            Self::Ranging(r) => &r.reference,
            Self::Rssi(r) => &r.reference,
            Self::RangingAndRssi(r) => &r.reference,
        }
    }

    /// Returns (distance, possible standard deviation) in meters,
    /// if this [Reading] carries a distance.
    pub fn ranging(&self) -> Option<(f64, Option<f64>)> {
        match self {
            Self::Ranging(r) => Some((r.distance_m, r.std_dev_m)),
            Self::RangingAndRssi(r) => Some((r.distance_m, r.distance_std_dev_m)),
            Self::Rssi(_) => None,
        }
    }

    /// Returns (received power in dBm, possible standard deviation in dB),
    /// if this [Reading] carries a received power.
    pub fn rssi(&self) -> Option<(f64, Option<f64>)> {
        match self {
            Self::Rssi(r) => Some((r.rssi_dbm, r.std_dev_db)),
            Self::RangingAndRssi(r) => Some((r.rssi_dbm, r.rssi_std_dev_db)),
            Self::Ranging(_) => None,
        }
    }
}
