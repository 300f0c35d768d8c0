use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::prelude::{
    Point, RangingAndRssiReading, RangingReading, Reading, ReferencePosition, RssiReading,
    Vector2,
};

/// Synthetic radio source and its surrounding references
#[derive(Debug, Clone)]
pub struct Dataset<const D: usize> {
    pub source: Point<D>,
    pub power_dbm: f64,
    pub exponent: f64,
    pub reference_distance_m: f64,
    pub references: Vec<Point<D>>,
}

/// `count` points evenly spaced on a circle
pub fn ring(center: (f64, f64), radius: f64, count: usize) -> Vec<Vector2<f64>> {
    (0..count)
        .map(|i| {
            let angle = 2.0 * std::f64::consts::PI * i as f64 / count as f64 + 0.1;
            Vector2::new(
                center.0 + radius * angle.cos(),
                center.1 + radius * angle.sin(),
            )
        })
        .collect()
}

impl<const D: usize> Dataset<D> {
    /// Builds new [Dataset]: 0 dBm isotropic source in free space
    pub fn new(source: Point<D>, references: Vec<Point<D>>) -> Self {
        Self {
            source,
            references,
            power_dbm: 0.0,
            exponent: 2.0,
            reference_distance_m: 1.0,
        }
    }

    pub fn with_power_dbm(&self, power_dbm: f64) -> Self {
        let mut s = self.clone();
        s.power_dbm = power_dbm;
        s
    }

    pub fn with_exponent(&self, exponent: f64) -> Self {
        let mut s = self.clone();
        s.exponent = exponent;
        s
    }

    pub fn source_coordinates(&self) -> [f64; D] {
        let mut coords = [0.0; D];
        coords.copy_from_slice(self.source.as_slice());
        coords
    }

    /// True distance to reference #i
    pub fn distance(&self, i: usize) -> f64 {
        (self.source - self.references[i]).norm()
    }

    /// True received power at reference #i
    pub fn rssi_dbm(&self, i: usize) -> f64 {
        self.power_dbm
            - 10.0 * self.exponent * (self.distance(i) / self.reference_distance_m).log10()
    }

    /// Ranging readings, with uniform noise within ±`noise_m`.
    /// `outliers` are pushed away from the source by 20 to 50 m.
    pub fn ranging(&self, noise_m: f64, outliers: &[usize], seed: u64) -> Vec<Reading<D>> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..self.references.len())
            .map(|i| {
                let distance = self.distance(i) + perturbation(&mut rng, noise_m, outliers, i, 20.0);
                RangingReading::new(ReferencePosition::new(self.references[i]), distance.abs())
                    .unwrap()
                    .into()
            })
            .collect()
    }

    /// RSSI readings, with uniform noise within ±`noise_db`.
    /// `outliers` are attenuated by 20 to 50 dB.
    pub fn rssi(&self, noise_db: f64, outliers: &[usize], seed: u64) -> Vec<Reading<D>> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..self.references.len())
            .map(|i| {
                let rssi = self.rssi_dbm(i) - perturbation(&mut rng, noise_db, outliers, i, 20.0);
                RssiReading::new(ReferencePosition::new(self.references[i]), rssi).into()
            })
            .collect()
    }

    /// Combined readings. Only the distances are noisy (±`noise_m`),
    /// `outliers` are affected on both measurements.
    pub fn combined(&self, noise_m: f64, outliers: &[usize], seed: u64) -> Vec<Reading<D>> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..self.references.len())
            .map(|i| {
                let offset = perturbation(&mut rng, noise_m, outliers, i, 20.0);
                let distance = self.distance(i) + offset;
                let rssi = if outliers.contains(&i) {
                    self.rssi_dbm(i) - offset
                } else {
                    self.rssi_dbm(i)
                };
                RangingAndRssiReading::new(
                    ReferencePosition::new(self.references[i]),
                    distance.abs(),
                    rssi,
                )
                .unwrap()
                .into()
            })
            .collect()
    }
}

/// Noise (or gross error for outliers) to apply to measurement #i
fn perturbation(rng: &mut SmallRng, noise: f64, outliers: &[usize], i: usize, gross: f64) -> f64 {
    if outliers.contains(&i) {
        rng.random_range(gross..gross + 30.0)
    } else if noise > 0.0 {
        rng.random_range(-noise..noise)
    } else {
        0.0
    }
}
