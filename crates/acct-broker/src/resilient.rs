//! Resilience decorators over [`BrokerClient`]: automatic retry with
//! exponential backoff and a circuit breaker that fails fast while the
//! broker is unhealthy. Composed via [`ResilientBrokerBuilder`].
//!
//! No rate limiter here: nothing in the publication engine needs to throttle
//! its own publish rate, so that half of the pattern is left out.

use crate::client::{BrokerClient, BrokerError, BrokerMessage};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries, just the initial attempt).
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }
}

/// Retries a failed publish with exponential backoff, up to `config.max_retries` times.
pub struct RetryingClient<B: BrokerClient> {
    inner: B,
    config: RetryConfig,
    total_retries: AtomicU64,
    recovered_publishes: AtomicU64,
}

impl<B: BrokerClient> RetryingClient<B> {
    pub fn new(inner: B, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            total_retries: AtomicU64::new(0),
            recovered_publishes: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(inner: B) -> Self {
        Self::new(inner, RetryConfig::default())
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    pub fn recovered_publishes(&self) -> u64 {
        self.recovered_publishes.load(Ordering::Relaxed)
    }
}

impl<B: BrokerClient> BrokerClient for RetryingClient<B> {
    async fn publish(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        let max_attempts = self.config.max_retries + 1;

        for attempt in 0..max_attempts {
            let delay = self.config.delay_for_attempt(attempt);
            if !delay.is_zero() {
                self.total_retries.fetch_add(1, Ordering::Relaxed);
                sleep(delay).await;
            }

            match self.inner.publish(message.clone()).await {
                Ok(()) => {
                    if attempt > 0 {
                        self.recovered_publishes.fetch_add(1, Ordering::Relaxed);
                    }
                    return Ok(());
                }
                Err(e) => {
                    if matches!(e, BrokerError::CircuitOpen) {
                        return Err(e);
                    }
                }
            }
        }

        Err(BrokerError::RetriesExhausted {
            attempts: max_attempts,
        })
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

struct CircuitBreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_time: Option<Instant>,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_time: None,
        }
    }
}

/// Fails fast once the inner client has failed `failure_threshold` times in a
/// row, re-probing after `reset_timeout` (§7: a broker outage should not stall
/// every flush behind a connect timeout).
pub struct CircuitBreakerClient<B: BrokerClient> {
    inner: B,
    config: CircuitBreakerConfig,
    state: Mutex<CircuitBreakerState>,
    times_opened: AtomicU32,
}

impl<B: BrokerClient> CircuitBreakerClient<B> {
    pub fn new(inner: B, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            config,
            state: Mutex::new(CircuitBreakerState::new()),
            times_opened: AtomicU32::new(0),
        }
    }

    pub fn with_defaults(inner: B) -> Self {
        Self::new(inner, CircuitBreakerConfig::default())
    }

    pub fn state(&self) -> CircuitState {
        self.state.lock().unwrap().state
    }

    pub fn times_opened(&self) -> u32 {
        self.times_opened.load(Ordering::Relaxed)
    }

    fn should_allow_request(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if let Some(last_failure) = state.last_failure_time {
                    if last_failure.elapsed() >= self.config.reset_timeout {
                        state.state = CircuitState::HalfOpen;
                        state.consecutive_successes = 0;
                        return true;
                    }
                }
                false
            }
            CircuitState::HalfOpen => true,
        }
    }

    fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        match state.state {
            CircuitState::Closed => state.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                state.consecutive_successes += 1;
                if state.consecutive_successes >= self.config.success_threshold {
                    state.state = CircuitState::Closed;
                    state.consecutive_failures = 0;
                }
            }
            CircuitState::Open => {
                state.state = CircuitState::Closed;
                state.consecutive_failures = 0;
            }
        }
    }

    fn record_failure(&self) {
        let mut state = self.state.lock().unwrap();
        state.last_failure_time = Some(Instant::now());
        state.consecutive_successes = 0;
        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.config.failure_threshold {
                    state.state = CircuitState::Open;
                    self.times_opened.fetch_add(1, Ordering::Relaxed);
                }
            }
            CircuitState::HalfOpen => {
                state.state = CircuitState::Open;
                self.times_opened.fetch_add(1, Ordering::Relaxed);
            }
            CircuitState::Open => {}
        }
    }
}

impl<B: BrokerClient> BrokerClient for CircuitBreakerClient<B> {
    async fn publish(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        if !self.should_allow_request() {
            return Err(BrokerError::CircuitOpen);
        }

        match self.inner.publish(message).await {
            Ok(()) => {
                self.record_success();
                Ok(())
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Builds a broker client wrapped in retry and/or circuit-breaker layers.
///
/// Composition order (outer to inner): circuit breaker, then retry, then the
/// base client — so a failing probe trips the breaker before the retry layer
/// burns attempts against a known-dead broker.
pub struct ResilientBrokerBuilder<B: BrokerClient> {
    inner: B,
    retry_config: Option<RetryConfig>,
    circuit_config: Option<CircuitBreakerConfig>,
}

impl<B: BrokerClient + 'static> ResilientBrokerBuilder<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            retry_config: None,
            circuit_config: None,
        }
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_config = Some(config);
        self
    }

    pub fn build_retry_only(self) -> RetryingClient<B> {
        RetryingClient::new(self.inner, self.retry_config.unwrap_or_default())
    }

    pub fn build_circuit_breaker_only(self) -> CircuitBreakerClient<B> {
        CircuitBreakerClient::new(self.inner, self.circuit_config.unwrap_or_default())
    }

    pub fn build_with_retry_and_circuit_breaker(self) -> CircuitBreakerClient<RetryingClient<B>> {
        let retrying = RetryingClient::new(self.inner, self.retry_config.unwrap_or_default());
        CircuitBreakerClient::new(retrying, self.circuit_config.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32 as TestCounter;

    struct FailingClient {
        failures_remaining: TestCounter,
    }

    impl FailingClient {
        fn new(fail_count: u32) -> Self {
            Self {
                failures_remaining: TestCounter::new(fail_count),
            }
        }
    }

    impl BrokerClient for FailingClient {
        async fn publish(&self, _message: BrokerMessage) -> Result<(), BrokerError> {
            let remaining = self.failures_remaining.fetch_sub(1, Ordering::Relaxed);
            if remaining > 0 {
                Err(BrokerError::Transport("simulated failure".into()))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn msg() -> BrokerMessage {
        BrokerMessage {
            topic: "flows".into(),
            payload: b"{}".to_vec(),
            partition: None,
            partition_key: None,
        }
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let retrying = RetryingClient::new(
            FailingClient::new(2),
            RetryConfig {
                max_retries: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
                backoff_multiplier: 2.0,
            },
        );

        assert!(retrying.publish(msg()).await.is_ok());
        assert_eq!(retrying.total_retries(), 2);
        assert_eq!(retrying.recovered_publishes(), 1);
    }

    #[tokio::test]
    async fn retry_exhausted_returns_typed_error() {
        let retrying = RetryingClient::new(
            FailingClient::new(100),
            RetryConfig {
                max_retries: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
                backoff_multiplier: 2.0,
            },
        );

        let result = retrying.publish(msg()).await;
        assert!(matches!(result, Err(BrokerError::RetriesExhausted { attempts: 3 })));
    }

    #[tokio::test]
    async fn circuit_breaker_opens_after_threshold_and_fails_fast() {
        let cb = CircuitBreakerClient::new(
            FailingClient::new(100),
            CircuitBreakerConfig {
                failure_threshold: 3,
                reset_timeout: Duration::from_mins(1),
                success_threshold: 1,
            },
        );

        for _ in 0..3 {
            let _ = cb.publish(msg()).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.times_opened(), 1);

        assert!(matches!(cb.publish(msg()).await, Err(BrokerError::CircuitOpen)));
    }

    #[tokio::test]
    async fn circuit_breaker_half_opens_and_recovers() {
        let cb = CircuitBreakerClient::new(
            FailingClient::new(3),
            CircuitBreakerConfig {
                failure_threshold: 3,
                reset_timeout: Duration::from_millis(10),
                success_threshold: 1,
            },
        );

        for _ in 0..3 {
            let _ = cb.publish(msg()).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        sleep(Duration::from_millis(20)).await;

        assert!(cb.publish(msg()).await.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn builder_composes_retry_and_circuit_breaker() {
        use crate::client::NullBrokerClient;
        let client = ResilientBrokerBuilder::new(NullBrokerClient)
            .with_retry(RetryConfig::default())
            .with_circuit_breaker(CircuitBreakerConfig::default())
            .build_with_retry_and_circuit_breaker();

        assert!(client.publish(msg()).await.is_ok());
    }
}
