//! The publication engine (C5): walks a flush snapshot, composes and batches
//! each committed entry, resolves its destination topic, publishes it, and
//! emits start/end lifecycle markers. Also runs the independent schema
//! re-advertisement task (C5.bis).

use crate::client::{BrokerClient, BrokerError, BrokerMessage};
use crate::compose::{
    binary_schema_json, compose_binary, compose_textual, BinaryBatcher, BinaryWrite, ComposeError,
    ContentType, TextualBatcher, TextualPush,
};
use acct_model::{CacheEntry, TopicResolution, TopicResolver};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PublicationError {
    #[error("publish failed: {0}")]
    Publish(#[from] BrokerError),
    #[error("compose failed: {0}")]
    Compose(#[from] ComposeError),
    #[error("configuration incompatible: {0}")]
    IncompatibleConfig(&'static str),
}

/// Static configuration for one flush's publication run (§4.5 setup, §6 config table).
#[derive(Debug, Clone)]
pub struct PublicationConfig {
    pub content_type: ContentType,
    pub topic_resolution: TopicResolution,
    pub multi_values: usize,
    pub buffer_size: usize,
    pub print_markers: bool,
    pub writer_name: String,
    pub writer_pid: u32,
    pub partition: Option<i32>,
    pub partition_key: Option<String>,
}

/// Totals accumulated over one flush, mirroring the `purge_close` marker fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushTotals {
    pub qn: u64,
    pub entries_seen: u64,
}

/// Runs one complete publication pass over a flush snapshot (§4.5).
///
/// Aborts the per-entry loop on the first publish error, per §7's
/// fatal-to-flush policy: remaining entries are dropped, but the end marker
/// is still emitted with whatever totals were reached.
pub async fn publish_flush<B: BrokerClient>(
    client: &B,
    config: &PublicationConfig,
    entries: Vec<CacheEntry>,
) -> Result<FlushTotals, PublicationError> {
    config
        .topic_resolution
        .validate(config.multi_values, None)
        .map_err(PublicationError::IncompatibleConfig)?;

    let mut resolver = TopicResolver::new(config.topic_resolution.clone());
    let mut totals = FlushTotals::default();

    if config.print_markers && config.content_type == ContentType::Textual {
        emit_marker(
            client,
            &static_topic_hint(config),
            serde_json::json!({
                "event": "purge_init",
                "writer_name": config.writer_name,
                "writer_pid": config.writer_pid,
            }),
        )
        .await?;
    }

    let mut textual_batcher = TextualBatcher::new(config.multi_values);
    let mut binary_batcher = BinaryBatcher::new(config.buffer_size, config.multi_values);

    let committed: Vec<&CacheEntry> = entries.iter().filter(|e| e.is_committed()).collect();
    let mut index = 0;
    while index < committed.len() {
        let entry = committed[index];
        totals.entries_seen += 1;

        let result = match config.content_type {
            ContentType::Textual => {
                let value = compose_textual(entry, &config.writer_name, config.writer_pid);
                match textual_batcher.push(value) {
                    TextualPush::Buffered => None,
                    TextualPush::Emit { bytes, count } => Some((bytes, count, false)),
                }
            }
            ContentType::Binary => {
                let encoded = compose_binary(entry);
                match binary_batcher.write(&encoded)? {
                    BinaryWrite::Buffered => None,
                    BinaryWrite::Emitted { bytes, count } => Some((bytes, count, false)),
                    BinaryWrite::FlushedThenBuffered { bytes, count } => Some((bytes, count, true)),
                }
            }
        };

        if let Some((bytes, count, _reprocess)) = result {
            // `_reprocess` (buffer-full) already re-buffered the current value
            // into the fresh buffer as part of the batcher's own write call,
            // so the "retry this index" the spec describes has already
            // happened internally; the loop just advances normally.
            let topic = resolver.resolve(&entry.sample);
            let message = BrokerMessage {
                topic,
                payload: bytes,
                partition: config.partition,
                partition_key: config.partition_key.clone(),
            };
            // Fatal-to-flush (§7): a publish failure here drops the
            // remaining entries but must not skip the end marker below, so
            // the error is logged and the loop is abandoned rather than
            // propagated with `?`.
            match client.publish(message).await {
                Ok(()) => totals.qn += count as u64,
                Err(err) => {
                    warn!(%err, "publish failed mid-flush; dropping remaining entries");
                    break;
                }
            }
        }

        index += 1;
    }

    let remainder = match config.content_type {
        ContentType::Textual => textual_batcher.close(),
        ContentType::Binary => binary_batcher.close(),
    };
    if let Some((bytes, count)) = remainder {
        let topic = match committed.last() {
            Some(entry) => resolver.resolve(&entry.sample),
            None => static_topic_hint(config),
        };
        let message = BrokerMessage {
            topic,
            payload: bytes,
            partition: config.partition,
            partition_key: config.partition_key.clone(),
        };
        match client.publish(message).await {
            Ok(()) => totals.qn += count as u64,
            Err(err) => warn!(%err, "publish failed on the trailing partial batch"),
        }
    }

    if config.print_markers && config.content_type == ContentType::Textual {
        emit_marker(
            client,
            &static_topic_hint(config),
            serde_json::json!({
                "event": "purge_close",
                "writer_name": config.writer_name,
                "writer_pid": config.writer_pid,
                "qn": totals.qn,
                "entries_seen": totals.entries_seen,
            }),
        )
        .await?;
    }

    info!(qn = totals.qn, entries_seen = totals.entries_seen, "flush published");
    Ok(totals)
}

async fn emit_marker<B: BrokerClient>(
    client: &B,
    topic: &str,
    marker: serde_json::Value,
) -> Result<(), BrokerError> {
    let payload = serde_json::to_vec(&marker).expect("marker values always serialize");
    client
        .publish(BrokerMessage {
            topic: topic.to_string(),
            payload,
            partition: None,
            partition_key: None,
        })
        .await
}

fn static_topic_hint(config: &PublicationConfig) -> String {
    match &config.topic_resolution {
        TopicResolution::Static(name) => name.clone(),
        TopicResolution::Dynamic(template) => template.clone(),
        TopicResolution::RoundRobin(topics) => topics.first().cloned().unwrap_or_default(),
    }
}

/// Schema re-advertisement task (§4.5 C5.bis). Driven independently of flush
/// cadence by the caller's own refresh-deadline scheduler; this function runs
/// one advertisement.
pub async fn publish_schema<B: BrokerClient>(client: &B, schema_topic: &str) -> Result<(), BrokerError> {
    let payload = serde_json::to_vec(&binary_schema_json()).expect("schema json always serializes");
    client
        .publish(BrokerMessage {
            topic: schema_topic.to_string(),
            payload,
            partition: None,
            partition_key: None,
        })
        .await?;
    info!(topic = schema_topic, "schema advertised");
    Ok(())
}

/// One-shot dump of the current schema to a file at startup (§4.5: "failure
/// to write it is fatal").
pub fn dump_schema_to_file(path: &std::path::Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(&binary_schema_json()).expect("schema json always serializes");
    std::fs::write(path, json)
}

/// Post-flush hook (§4.5 C5.ter): spawns `command` as a detached child,
/// passing the flush totals and duration as environment variables. A spawn
/// failure is logged, never fatal — the flush itself already completed.
pub fn run_post_flush_hook(command: &str, totals: FlushTotals, duration_secs: f64) {
    let result = std::process::Command::new(command)
        .env("QN", totals.qn.to_string())
        .env("ENTRIES_SEEN", totals.entries_seen.to_string())
        .env("DURATION", duration_secs.to_string())
        .spawn();

    match result {
        Ok(_) => {}
        Err(err) => warn!(command, %err, "post-flush hook failed to spawn"),
    }
}
