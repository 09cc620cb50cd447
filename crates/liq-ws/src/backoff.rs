//! Reconnect backoff policy.

use std::time::Duration;

/// Exponential reconnect policy: `2^attempt` seconds, a bounded number
/// of attempts, then fatal.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_secs(1),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), or `None`
    /// once the attempt budget is spent.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt > self.max_attempts {
            return None;
        }
        let factor = 1u64 << attempt.min(10);
        Some(self.base.saturating_mul(factor as u32).saturating_add(jitter()))
    }
}

/// Small jitter (0-999ms) to avoid thundering reconnects.
fn jitter() -> Duration {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    Duration::from_millis((nanos % 1000) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = ReconnectPolicy::default();
        let d1 = policy.delay(1).unwrap();
        let d2 = policy.delay(2).unwrap();
        let d3 = policy.delay(3).unwrap();
        assert!(d1 >= Duration::from_secs(2) && d1 < Duration::from_secs(3));
        assert!(d2 >= Duration::from_secs(4) && d2 < Duration::from_secs(5));
        assert!(d3 >= Duration::from_secs(8) && d3 < Duration::from_secs(9));
    }

    #[test]
    fn test_backoff_exhausts_after_cap() {
        let policy = ReconnectPolicy::default();
        assert!(policy.delay(5).is_some());
        assert!(policy.delay(6).is_none());
    }
}
