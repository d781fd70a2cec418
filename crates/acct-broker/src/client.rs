use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Error taxonomy for the broker-publish path (§7 fatal-to-flush /
/// recoverable-with-reconnect).
#[derive(Debug, Error, Clone)]
pub enum BrokerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("all retry attempts exhausted after {attempts} tries")]
    RetriesExhausted { attempts: u32 },
    #[error("publish timed out")]
    Timeout,
    #[error("circuit breaker open: broker unavailable")]
    CircuitOpen,
}

/// One message ready for the wire: a destination topic plus the composed
/// payload bytes (textual JSON, or a binary schema-encoded chunk).
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub partition: Option<i32>,
    pub partition_key: Option<String>,
}

/// Trait for publishing to the message broker. Uses native async fn in
/// traits; see [`BrokerClientBoxed`] for the object-safe twin used by the
/// resilience decorators and the daemon's dynamic dispatch.
pub trait BrokerClient: Send + Sync {
    fn publish(&self, message: BrokerMessage) -> impl Future<Output = Result<(), BrokerError>> + Send;

    fn name(&self) -> &'static str;
}

/// Object-safe version of [`BrokerClient`] for dynamic dispatch.
pub trait BrokerClientBoxed: Send + Sync {
    fn publish_boxed(
        &self,
        message: BrokerMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;

    fn name(&self) -> &'static str;
}

impl<T: BrokerClient> BrokerClientBoxed for T {
    fn publish_boxed(
        &self,
        message: BrokerMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(self.publish(message))
    }

    fn name(&self) -> &'static str {
        BrokerClient::name(self)
    }
}

/// Discards every message; used for benchmarking and as a safe default.
#[derive(Default)]
pub struct NullBrokerClient;

impl BrokerClient for NullBrokerClient {
    async fn publish(&self, _message: BrokerMessage) -> Result<(), BrokerError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Prints every message to stdout; used for local development.
#[derive(Default)]
pub struct StdoutBrokerClient {
    verbose: bool,
}

impl StdoutBrokerClient {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl BrokerClient for StdoutBrokerClient {
    async fn publish(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        if self.verbose {
            println!(
                "[{}] {} bytes -> {}",
                BrokerClient::name(self),
                message.payload.len(),
                message.topic
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// Records every published message for test assertions.
#[cfg(test)]
use std::sync::Mutex;

#[cfg(test)]
pub struct TestBrokerClient {
    published: Mutex<Vec<BrokerMessage>>,
    fail_next: Mutex<usize>,
}

#[cfg(test)]
impl Default for TestBrokerClient {
    fn default() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail_next: Mutex::new(0),
        }
    }
}

#[cfg(test)]
impl TestBrokerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` publish calls fail with `Transport`, then succeed.
    pub fn fail_next(&self, n: usize) {
        *self.fail_next.lock().unwrap() = n;
    }

    pub fn published(&self) -> Vec<BrokerMessage> {
        self.published.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl BrokerClient for TestBrokerClient {
    async fn publish(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        let mut remaining = self.fail_next.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(BrokerError::Transport("injected failure".into()));
        }
        drop(remaining);
        self.published.lock().unwrap().push(message);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "test"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(topic: &str) -> BrokerMessage {
        BrokerMessage {
            topic: topic.to_string(),
            payload: b"{}".to_vec(),
            partition: None,
            partition_key: None,
        }
    }

    #[tokio::test]
    async fn null_client_always_succeeds() {
        let client = NullBrokerClient;
        assert!(client.publish(msg("flows")).await.is_ok());
    }

    #[tokio::test]
    async fn test_client_records_published_messages() {
        let client = TestBrokerClient::new();
        client.publish(msg("flows")).await.unwrap();
        assert_eq!(client.published().len(), 1);
    }

    #[tokio::test]
    async fn test_client_fails_injected_count_then_succeeds() {
        let client = TestBrokerClient::new();
        client.fail_next(1);
        assert!(client.publish(msg("flows")).await.is_err());
        assert!(client.publish(msg("flows")).await.is_ok());
        assert_eq!(client.published().len(), 1);
    }
}
