//! Reconnect backoff for the secondary (broker-transport) ingest path
//! (§4.2 "Secondary transport path"): on read failure, computes the next
//! reconnect deadline so the main multiplexed wait can unblock exactly when
//! it elapses, rather than busy-polling.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_mins(1),
            backoff_multiplier: 2.0,
        }
    }
}

/// Tracks reconnect attempts against the secondary transport and computes
/// the delay before the next attempt.
#[derive(Debug)]
pub struct ReconnectBackoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Records a failure and returns the delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay_ms = self.config.initial_delay.as_millis() as f64
            * self.config.backoff_multiplier.powi(self.attempt as i32);
        self.attempt += 1;
        Duration::from_millis(delay_ms as u64).min(self.config.max_delay)
    }

    /// Resets the attempt counter after a successful reconnect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}
