//! Exponential-backoff schedule for channel adapter reconnection (§4.2).
//!
//! A pure scheduling oracle: it computes delays but never sleeps. Callers
//! own the actual timing so the component can be exercised in tests without
//! real wall-clock waits.

pub const DEFAULT_BASE_MS: u64 = 2_000;
pub const DEFAULT_MAX_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy)]
pub struct ReconnectorConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectorConfig {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_BASE_MS,
            max_ms: DEFAULT_MAX_MS,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextDelay {
    Wait(u64),
    Exhausted,
}

pub struct Reconnector {
    config: ReconnectorConfig,
    attempt: u32,
}

impl Reconnector {
    #[must_use]
    pub fn new(config: ReconnectorConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Return the delay for the next reconnection attempt and advance the
    /// internal attempt counter, or `Exhausted` once `max_attempts` is hit.
    pub fn next(&mut self) -> NextDelay {
        if let Some(max) = self.config.max_attempts {
            if self.attempt >= max {
                return NextDelay::Exhausted;
            }
        }
        let factor = 1u64.checked_shl(self.attempt).unwrap_or(u64::MAX);
        let delay = self
            .config
            .base_ms
            .saturating_mul(factor)
            .min(self.config.max_ms);
        self.attempt += 1;
        NextDelay::Wait(delay)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_up_to_the_cap() {
        let mut r = Reconnector::new(ReconnectorConfig {
            base_ms: 1_000,
            max_ms: 10_000,
            max_attempts: None,
        });
        assert_eq!(r.next(), NextDelay::Wait(1_000));
        assert_eq!(r.next(), NextDelay::Wait(2_000));
        assert_eq!(r.next(), NextDelay::Wait(4_000));
        assert_eq!(r.next(), NextDelay::Wait(8_000));
        assert_eq!(r.next(), NextDelay::Wait(10_000)); // capped
        assert_eq!(r.next(), NextDelay::Wait(10_000));
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let mut r = Reconnector::new(ReconnectorConfig {
            base_ms: 1_000,
            max_ms: 10_000,
            max_attempts: Some(2),
        });
        assert_eq!(r.next(), NextDelay::Wait(1_000));
        assert_eq!(r.next(), NextDelay::Wait(2_000));
        assert_eq!(r.next(), NextDelay::Exhausted);
    }

    #[test]
    fn reset_clears_attempt_counter() {
        let mut r = Reconnector::new(ReconnectorConfig {
            base_ms: 1_000,
            max_ms: 10_000,
            max_attempts: Some(1),
        });
        assert_eq!(r.next(), NextDelay::Wait(1_000));
        assert_eq!(r.next(), NextDelay::Exhausted);
        r.reset();
        assert_eq!(r.next(), NextDelay::Wait(1_000));
    }

    #[test]
    fn defaults_match_specification() {
        let r = Reconnector::new(ReconnectorConfig::default());
        assert_eq!(r.config.base_ms, 2_000);
        assert_eq!(r.config.max_ms, 30_000);
        assert_eq!(r.config.max_attempts, None);
    }
}
