//! Reconnect backoff policy

use std::time::Duration;

use tiara_core::{TiaraError, TiaraResult};

/// `delay(attempt) = base_delay * factor^attempt`, for attempts `0..max_attempts`.
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub factor: f64,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            base_delay: Duration::from_millis(3000),
            factor: 2.0,
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    pub fn validate(&self) -> TiaraResult<()> {
        if self.base_delay.is_zero() {
            return Err(TiaraError::InvalidConfig(
                "reconnect base delay must be non-zero".to_string(),
            ));
        }
        if !(self.factor.is_finite() && self.factor >= 1.0) {
            return Err(TiaraError::InvalidConfig(format!(
                "reconnect factor must be >= 1, got {}",
                self.factor
            )));
        }
        if self.max_attempts == 0 {
            return Err(TiaraError::InvalidConfig(
                "reconnect max attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay before the retry that follows `attempt` previous retries
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = self.base_delay.as_secs_f64() * self.factor.powi(attempt as i32);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Every delay the policy will ever produce, in order
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts).map(|a| self.delay_for(a)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let expected: Vec<Duration> = [3000, 6000, 12000, 24000, 48000]
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect();
        assert_eq!(BackoffPolicy::default().schedule(), expected);
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(10_000), Duration::MAX);
    }

    #[test]
    fn test_validation() {
        assert!(BackoffPolicy::default().validate().is_ok());

        let mut policy = BackoffPolicy::default();
        policy.factor = 0.5;
        assert!(policy.validate().is_err());

        let mut policy = BackoffPolicy::default();
        policy.max_attempts = 0;
        assert!(policy.validate().is_err());

        let mut policy = BackoffPolicy::default();
        policy.base_delay = Duration::ZERO;
        assert!(policy.validate().is_err());
    }
}
