//! Publication engine (C5): composes, batches, and publishes committed cache
//! entries to a message broker topic, plus the resilience decorators and
//! schema re-advertisement task that run alongside it.

mod client;
mod compose;
mod publication;
mod resilient;

pub use client::{BrokerClient, BrokerClientBoxed, BrokerError, BrokerMessage, NullBrokerClient, StdoutBrokerClient};
pub use compose::{
    binary_schema_json, compose_binary, compose_textual, BinaryBatcher, BinaryWrite, ComposeError,
    ContentType, TextualBatcher, TextualPush, ENCODED_LEN,
};
pub use publication::{
    dump_schema_to_file, publish_flush, publish_schema, run_post_flush_hook, FlushTotals,
    PublicationConfig, PublicationError,
};
pub use resilient::{
    CircuitBreakerClient, CircuitBreakerConfig, CircuitState, ResilientBrokerBuilder, RetryConfig,
    RetryingClient,
};
