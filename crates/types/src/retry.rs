use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::Result;

/// Backoff schedule for transient failures. `max_attempts` counts the first try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt: every failure is final.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (1-based): exponential, capped, ±10% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let pow = attempt.saturating_sub(1).min(30);
        let capped = self
            .base_delay_ms
            .saturating_mul(1u64 << pow)
            .min(self.max_delay_ms);
        let spread = capped / 10;
        if spread == 0 {
            return Duration::from_millis(capped);
        }
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::from(d.subsec_nanos()))
            .unwrap_or(0);
        let offset = seed % (spread * 2 + 1);
        let jittered = (capped + offset).saturating_sub(spread).min(self.max_delay_ms);
        Duration::from_millis(jittered)
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up.
pub fn retry<T, F>(policy: RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0u32;
    loop {
        attempt = attempt.saturating_add(1);
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !e.is_transient() || attempt >= policy.max_attempts {
                    return Err(e);
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                std::thread::sleep(delay);
            }
        }
    }
}
