use crate::prelude::Error;

/// Estimator state machine. Guards the configuration of an estimator:
/// nothing may be modified while [EstimatorState::Running].
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorState {
    /// Never ran, or last run failed
    #[default]
    Idle,
    /// Estimation in progress
    Running,
    /// Last run succeeded
    Done,
}

impl EstimatorState {
    /// True while an estimation is in progress
    pub fn is_locked(&self) -> bool {
        *self == Self::Running
    }

    /// Fails with [Error::Locked] while an estimation is in progress.
    pub(crate) fn check_unlocked(&self) -> Result<(), Error> {
        if self.is_locked() {
            Err(Error::Locked)
        } else {
            Ok(())
        }
    }

    /// Enters [EstimatorState::Running]
    pub(crate) fn lock(&mut self) -> Result<(), Error> {
        self.check_unlocked()?;
        *self = Self::Running;
        Ok(())
    }

    /// Leaves [EstimatorState::Running]
    pub(crate) fn release(&mut self, success: bool) {
        *self = if success { Self::Done } else { Self::Idle };
    }
}

#[cfg(test)]
mod test {
    use super::EstimatorState;
    use crate::prelude::Error;

    #[test]
    fn state_transitions() {
        let mut state = EstimatorState::default();
        assert!(!state.is_locked());
        assert!(state.lock().is_ok());
        assert!(state.is_locked());
        assert_eq!(state.lock(), Err(Error::Locked));
        assert_eq!(state.check_unlocked(), Err(Error::Locked));

        state.release(true);
        assert_eq!(state, EstimatorState::Done);
        assert!(state.check_unlocked().is_ok());

        assert!(state.lock().is_ok());
        state.release(false);
        assert_eq!(state, EstimatorState::Idle);
    }
}
