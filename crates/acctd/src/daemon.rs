//! The multiplexed ingest/flush/schema/shutdown loop (§5): one actor, one
//! blocking wait primitive expressed as a `tokio::select!` over the ring
//! consumer's poll, the schema-refresh tick, the reconnect timer, and a
//! shutdown signal — generalizing the grounding crate's async bridge loop
//! from a fixed two-branch select to this spec's N-deadline minimum.

use crate::config::DaemonConfig;
use crate::error::DaemonError;
use acct_broker::{publish_flush, publish_schema, run_post_flush_hook, BrokerClient, FlushTotals};
use acct_cache::AggregationCache;
use acct_ingest::{ConsumeOutcome, DecoratorPipeline, ReconnectBackoff, RingConsumer};
#[cfg(unix)]
use acct_ingest::ParentLiveness;
use acct_model::RefreshDeadline;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;
use tracing::{error, info, warn};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Runs the daemon loop to completion: `shutdown` resolves when a graceful
/// stop has been requested (e.g. `ctrl_c`), at which point one final flush
/// of whatever is COMMITTED runs before returning.
pub async fn run<B: BrokerClient>(
    config: DaemonConfig,
    broker: B,
    decorators: DecoratorPipeline,
    mut consumer: RingConsumer,
    shutdown: Arc<Notify>,
) -> Result<(), DaemonError> {
    let start = now_secs();
    let mut cache = AggregationCache::new(config.cache, start);
    let mut basetime = start;
    let mut flush_deadline = config.flush_deadline(start);
    let mut schema_deadline = config.schema_deadline(start);
    let mut reconnect = ReconnectBackoff::new(config.reconnect.clone());
    #[cfg(unix)]
    let parent_liveness = ParentLiveness::capture();

    loop {
        let mut deadlines = vec![flush_deadline];
        if let Some(schema) = schema_deadline {
            deadlines.push(schema);
        }
        let now = now_secs();
        let timeout_ms = acct_model::min_timeout_ms(&deadlines, now).clamp(1, 5_000);

        tokio::select! {
            // `last_written_seq` comes from the upstream producer's shared
            // status, an out-of-scope collaborator (§1); 0 means "no resync
            // offset available", which only matters on a sustained mismatch.
            outcome = consumer.next_batch(timeout_ms, 0) => {
                #[cfg(unix)]
                if let Err(err) = parent_liveness.check() {
                    error!(%err, "upstream collector is gone; exiting");
                    return Err(err.into());
                }

                match outcome {
                    Ok(ConsumeOutcome::Batch { mut records, producer_pid }) => {
                        decorators.decorate_batch(&mut records);
                        let now = now_secs();
                        for record in &records {
                            cache.insert(record, now);
                        }
                        info!(count = records.len(), producer_pid, "ingested batch");
                        reconnect.reset();
                    }
                    Ok(ConsumeOutcome::Timeout) => {}
                    Ok(ConsumeOutcome::Closed) => {
                        info!("upstream channel closed; running final flush");
                        run_flush(&mut cache, &broker, &config, &mut flush_deadline, &mut basetime).await?;
                        return Ok(());
                    }
                    Err(err) => {
                        warn!(%err, "secondary transport read failed; scheduling reconnect");
                        tokio::time::sleep(reconnect.next_delay()).await;
                    }
                }
            }

            () = shutdown.notified() => {
                info!("shutdown requested; running final flush");
                run_flush(&mut cache, &broker, &config, &mut flush_deadline, &mut basetime).await?;
                return Ok(());
            }
        }

        let now = now_secs();
        if flush_deadline.has_elapsed(now) {
            run_flush(&mut cache, &broker, &config, &mut flush_deadline, &mut basetime).await?;
        }
        if let Some(deadline) = schema_deadline {
            if deadline.has_elapsed(now) {
                if let Some(topic) = &config.schema_topic {
                    if let Err(err) = publish_schema(&broker, topic).await {
                        warn!(%err, "schema advertisement failed");
                    }
                }
                schema_deadline = Some(deadline.advance());
            }
        }
    }
}

async fn run_flush<B: BrokerClient>(
    cache: &mut AggregationCache,
    broker: &B,
    config: &DaemonConfig,
    flush_deadline: &mut RefreshDeadline,
    basetime: &mut u64,
) -> Result<FlushTotals, DaemonError> {
    let start = std::time::Instant::now();
    let steps = config.sql_history_howmany.filter(|_| config.cache.historical).unwrap_or(1).max(1);
    let period = config.cache_period();
    let mut next_basetime = *basetime;
    for _ in 0..steps {
        next_basetime = acct_model::advance_basetime(next_basetime, period);
    }
    let snapshot = cache.handle_flush_event(next_basetime);
    *basetime = next_basetime;
    let totals = publish_flush(broker, &config.publication, snapshot).await?;
    *flush_deadline = flush_deadline.advance();

    let duration_secs = start.elapsed().as_secs_f64();
    if let Some(command) = &config.sql_trigger_exec {
        run_post_flush_hook(command, totals, duration_secs);
    }
    info!(qn = totals.qn, entries_seen = totals.entries_seen, duration_secs, "flush complete");
    Ok(totals)
}

/// Spawns a task that resolves `shutdown` on `ctrl_c`, the way the grounding
/// crate's stream crate wires its own `Notify`-based shutdown signal.
pub fn spawn_ctrl_c_shutdown() -> Arc<Notify> {
    let notify = Arc::new(Notify::new());
    let notify_clone = Arc::clone(&notify);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            notify_clone.notify_one();
        }
    });
    notify
}
