use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded exponential backoff for transport failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self { Self { max_attempts: 3, base_delay_ms: 1000, factor: 2.0 } }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 { self.max_attempts.max(1) }

    /// Sleep after the `failed`-th attempt (1-based): base, base*factor, base*factor^2, ...
    pub fn delay_after(&self, failed: u32) -> Duration {
        let exp = failed.saturating_sub(1).min(16) as i32;
        let factor = if self.factor.is_finite() && self.factor >= 1.0 { self.factor } else { 1.0 };
        let ms = self.base_delay_ms as f64 * factor.powi(exp);
        Duration::from_millis(ms.min(u64::MAX as f64) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_is_one_then_two_seconds() {
        let p = RetryPolicy::default();
        assert_eq!(p.attempts(), 3);
        assert_eq!(p.delay_after(1), Duration::from_secs(1));
        assert_eq!(p.delay_after(2), Duration::from_secs(2));
    }

    #[test]
    fn nonsense_values_are_clamped() {
        let p = RetryPolicy { max_attempts: 0, base_delay_ms: 10, factor: f64::NAN };
        assert_eq!(p.attempts(), 1);
        assert_eq!(p.delay_after(5), Duration::from_millis(10));
    }
}
