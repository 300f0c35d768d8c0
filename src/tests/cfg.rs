use crate::prelude::RadioSourceEstimate;

/// Acceptance criteria of a test scenario
#[derive(Debug, Copy, Clone)]
pub struct TestConfig {
    pub max_position_err_m: f64,
    pub max_power_err_db: f64,
    pub max_exponent_err: f64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            max_position_err_m: 1.0E-6,
            max_power_err_db: 1.0E-6,
            max_exponent_err: 1.0E-6,
        }
    }
}

impl TestConfig {
    /// Builds [TestConfig] for noisy scenarios
    pub fn noisy(max_position_err_m: f64, max_power_err_db: f64, max_exponent_err: f64) -> Self {
        Self {
            max_position_err_m,
            max_power_err_db,
            max_exponent_err,
        }
    }

    /// Verifies position
    pub fn check_position<const D: usize>(
        &self,
        estimate: &RadioSourceEstimate<D>,
        truth: &[f64; D],
    ) {
        let err = estimate
            .position
            .iter()
            .zip(truth.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt();

        assert!(
            err <= self.max_position_err_m,
            "position error {:.3E} m exceeds {:.3E} m ({:?})",
            err,
            self.max_position_err_m,
            estimate.position.as_slice()
        );
    }

    /// Verifies transmitted power (dBm)
    pub fn check_power<const D: usize>(&self, estimate: &RadioSourceEstimate<D>, truth: f64) {
        let power = estimate
            .transmitted_power_dbm
            .expect("missing transmitted power");
        let err = (power - truth).abs();
        assert!(
            err <= self.max_power_err_db,
            "power error {:.3E} dB exceeds {:.3E} dB ({} dBm)",
            err,
            self.max_power_err_db,
            power
        );
    }

    /// Verifies path loss exponent
    pub fn check_exponent<const D: usize>(&self, estimate: &RadioSourceEstimate<D>, truth: f64) {
        let err = (estimate.path_loss_exponent - truth).abs();
        assert!(
            err <= self.max_exponent_err,
            "exponent error {:.3E} exceeds {:.3E} ({})",
            err,
            self.max_exponent_err,
            estimate.path_loss_exponent
        );
    }
}
