//! CLI configuration (§6): a single value parsed once at startup via `clap`
//! and threaded explicitly through every collaborator's constructor — no
//! ambient/global config reads (§10 Configuration).

use acct_broker::{CircuitBreakerConfig, ContentType, PublicationConfig, RetryConfig};
use acct_cache::{CacheConfig, InsertPolicy};
use acct_ingest::{DecoratorPipeline, LengthDistributionBucketer, NetworkClassifier, NetworkPrefix, PortRemapper, ReconnectConfig};
use acct_model::{RefreshDeadline, Roundoff, TimeslotPeriod, TopicResolution};
use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;

/// Command-line surface for the accounting-record shipping daemon.
#[derive(Parser, Debug)]
#[command(name = "acctd", about = "Accounting-record shipping core for a traffic-accounting daemon's broker plugin")]
pub struct Args {
    /// `textual` or `binary` (§6 `message_broker_output`).
    #[arg(long, env = "ACCTD_OUTPUT", default_value = "textual")]
    pub message_broker_output: String,

    /// Broker host (§6 `sql_host`); defaults apply if unset.
    #[arg(long, env = "ACCTD_BROKER_HOST", default_value = "localhost")]
    pub sql_host: String,

    /// Broker port (§6 `kafka_broker_port`).
    #[arg(long, env = "ACCTD_BROKER_PORT", default_value_t = 9092)]
    pub kafka_broker_port: u16,

    /// Destination topic or `$`-template (§6 `sql_table`).
    #[arg(long, env = "ACCTD_TOPIC", default_value = "flows")]
    pub sql_table: String,

    /// Round-robin topic list, comma-separated (§6 `amqp_routing_key_rr`).
    #[arg(long, env = "ACCTD_ROUND_ROBIN_TOPICS")]
    pub amqp_routing_key_rr: Option<String>,

    /// Kafka partition number (§6 `kafka_partition`).
    #[arg(long)]
    pub kafka_partition: Option<i32>,

    /// Kafka partition key (§6 `kafka_partition_key`).
    #[arg(long)]
    pub kafka_partition_key: Option<String>,

    /// Batch size; 0 disables batching (§6 `sql_multi_values`).
    #[arg(long, default_value_t = 0)]
    pub sql_multi_values: usize,

    /// Binary batch buffer size in bytes (§6 `avro_buffer_size`).
    #[arg(long, default_value_t = 65_536)]
    pub avro_buffer_size: usize,

    /// Flush period in seconds (§6 `sql_refresh_time`).
    #[arg(long, default_value_t = 60)]
    pub sql_refresh_time: u64,

    /// Startup delay in seconds before the first flush (§6 `sql_startup_delay`).
    #[arg(long, default_value_t = 0)]
    pub sql_startup_delay: u64,

    /// Rounding unit for the flush deadline: `s`/`m`/`h`/`d` (§6 `sql_history_roundoff`).
    #[arg(long, default_value_t = 'm')]
    pub sql_history_roundoff: char,

    /// Route out-of-window records into historical generations instead of
    /// dropping them (§6 `sql_history`).
    #[arg(long, default_value_t = false)]
    pub sql_history: bool,

    /// Historical window width in calendar months; only meaningful with
    /// `sql_history` set. Unset falls back to fixed-width windows of
    /// `sql_refresh_time` (§6 `sql_history_howmany`).
    #[arg(long)]
    pub sql_history_howmany: Option<u64>,

    /// Emit `purge_init`/`purge_close` markers (§6 `print_markers`).
    #[arg(long, default_value_t = true)]
    pub print_markers: bool,

    /// Post-flush hook command (§6 `sql_trigger_exec`).
    #[arg(long)]
    pub sql_trigger_exec: Option<String>,

    /// Schema re-advertisement topic (§6 `kafka_avro_schema_topic`).
    #[arg(long)]
    pub kafka_avro_schema_topic: Option<String>,

    /// Schema re-advertisement period in seconds (§6 `kafka_avro_schema_refresh_time`).
    #[arg(long, default_value_t = 3600)]
    pub kafka_avro_schema_refresh_time: u64,

    /// One-shot schema dump path at startup (§6 `avro_schema_output_file`).
    #[arg(long)]
    pub avro_schema_output_file: Option<PathBuf>,

    /// Network-prefix table for classification, `network/prefix_len=label` per line (§6 `networks_file`).
    #[arg(long)]
    pub networks_file: Option<PathBuf>,

    /// Port allow-list, one port per line (§6 `ports_file`).
    #[arg(long)]
    pub ports_file: Option<PathBuf>,

    /// Comma-separated length-distribution bin edges (§6 `pkt_len_distrib_bins_str`).
    #[arg(long)]
    pub pkt_len_distrib_bins_str: Option<String>,

    /// In-process channel sizing in place of raw shared memory, power of 2 (§6 `ring_bits`).
    #[arg(long, default_value_t = 16)]
    pub ring_bits: u8,

    /// Maximum registered producers (§6 `max_producers`).
    #[arg(long, default_value_t = 16)]
    pub max_producers: usize,

    /// Identity reported in textual composition and flush markers.
    #[arg(long, default_value = "acctd")]
    pub writer_name: String,

    /// Enable publish retries around transient broker errors.
    #[arg(long, default_value_t = true)]
    pub retry: bool,

    /// Enable the circuit breaker around the broker client.
    #[arg(long, default_value_t = true)]
    pub circuit_breaker: bool,

    /// Log verbosity (`error`/`warn`/`info`/`debug`/`trace`) (§6 `log_level`).
    #[arg(long, env = "ACCTD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// `pretty` or `json` (§6 `log_format`).
    #[arg(long, env = "ACCTD_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Resolved runtime configuration, built once from [`Args`] and threaded
/// through every collaborator explicitly (§10: "no ambient/global config reads").
pub struct DaemonConfig {
    pub cache: CacheConfig,
    pub publication: PublicationConfig,
    pub reconnect: ReconnectConfig,
    pub retry: Option<RetryConfig>,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub flush_period_secs: u64,
    pub flush_startup_delay_secs: u64,
    pub flush_roundoff: Roundoff,
    pub schema_topic: Option<String>,
    pub schema_refresh_secs: u64,
    pub schema_output_file: Option<PathBuf>,
    pub sql_trigger_exec: Option<String>,
    pub ring_bits: u8,
    pub max_producers: usize,
    /// Number of calendar months each historical window advances by; `None`
    /// when historical mode is off or uses fixed-width windows instead.
    pub sql_history_howmany: Option<u64>,
}

/// Raised at startup for invalid or mutually incompatible configuration
/// (§6 "Incompatibilities (fatal at startup)").
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported message_broker_output: {0:?} (expected \"textual\" or \"binary\")")]
    UnsupportedOutputMode(String),
    #[error("invalid sql_history_roundoff: {0:?} (expected one of s/m/h/d)")]
    InvalidRoundoff(char),
    #[error("failed to read {path}: {source}")]
    TableRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed networks_file line: {0:?}")]
    MalformedNetworksLine(String),
    #[error("dynamic topic is incompatible with multi-values batching")]
    DynamicTopicWithMultiValues,
    #[error("dynamic topic is incompatible with round-robin topics")]
    DynamicTopicWithRoundRobin,
}

impl DaemonConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let content_type = match args.message_broker_output.as_str() {
            "textual" => ContentType::Textual,
            "binary" => ContentType::Binary,
            other => return Err(ConfigError::UnsupportedOutputMode(other.to_string())),
        };

        let roundoff = Roundoff::from_char(args.sql_history_roundoff)
            .ok_or(ConfigError::InvalidRoundoff(args.sql_history_roundoff))?;

        let round_robin: Option<Vec<String>> = args
            .amqp_routing_key_rr
            .as_deref()
            .map(|list| list.split(',').map(str::trim).map(str::to_string).collect());
        let topic_resolution = TopicResolution::classify(&args.sql_table, round_robin.clone());
        topic_resolution
            .validate(args.sql_multi_values, round_robin.as_deref())
            .map_err(|reason| {
                if reason.contains("round-robin") {
                    ConfigError::DynamicTopicWithRoundRobin
                } else {
                    ConfigError::DynamicTopicWithMultiValues
                }
            })?;

        let publication = PublicationConfig {
            content_type,
            topic_resolution,
            multi_values: args.sql_multi_values,
            buffer_size: args.avro_buffer_size,
            print_markers: args.print_markers,
            writer_name: args.writer_name.clone(),
            writer_pid: std::process::id(),
            partition: args.kafka_partition,
            partition_key: args.kafka_partition_key.clone(),
        };

        Ok(Self {
            cache: CacheConfig {
                policy: InsertPolicy::PerFingerprint,
                timeslot_secs: args.sql_refresh_time,
                historical: args.sql_history,
            },
            publication,
            reconnect: ReconnectConfig::default(),
            retry: args.retry.then(RetryConfig::default),
            circuit_breaker: args.circuit_breaker.then(CircuitBreakerConfig::default),
            flush_period_secs: args.sql_refresh_time,
            flush_startup_delay_secs: args.sql_startup_delay,
            flush_roundoff: roundoff,
            schema_topic: args.kafka_avro_schema_topic.clone(),
            schema_refresh_secs: args.kafka_avro_schema_refresh_time,
            schema_output_file: args.avro_schema_output_file.clone(),
            sql_trigger_exec: args.sql_trigger_exec.clone(),
            ring_bits: args.ring_bits,
            max_producers: args.max_producers,
            sql_history_howmany: args.sql_history_howmany,
        })
    }

    pub fn flush_deadline(&self, now: u64) -> RefreshDeadline {
        RefreshDeadline::init(now, self.flush_period_secs, self.flush_startup_delay_secs, self.flush_roundoff)
    }

    pub fn schema_deadline(&self, now: u64) -> Option<RefreshDeadline> {
        self.schema_topic
            .as_ref()
            .map(|_| RefreshDeadline::init(now, self.schema_refresh_secs, 0, Roundoff::Second))
    }

    /// Period the cache's basetime advances by on each flush (§9 historical
    /// mode). `sql_history_howmany` selects calendar-month-wide windows;
    /// historical mode without it keeps the fixed `timeslot_secs` width.
    pub fn cache_period(&self) -> TimeslotPeriod {
        if self.cache.historical && self.sql_history_howmany.is_some() {
            TimeslotPeriod::Monthly
        } else {
            TimeslotPeriod::Fixed(self.cache.timeslot_secs)
        }
    }
}

/// Builds the C3 decorator pipeline from the configured tables (§6
/// `networks_file`, `ports_file`, `pkt_len_distrib_bins_str`). Missing
/// files fall back to the permissive/no-op shape each decorator defines.
pub fn build_decorator_pipeline(args: &Args) -> Result<DecoratorPipeline, ConfigError> {
    let mut decorators: Vec<Box<dyn acct_ingest::Decorator>> = Vec::new();

    if let Some(path) = &args.networks_file {
        decorators.push(Box::new(NetworkClassifier::new(load_networks_file(path)?)));
    }

    decorators.push(Box::new(match &args.ports_file {
        Some(path) => PortRemapper::new(load_ports_file(path)?),
        None => PortRemapper::allow_all(),
    }));

    if let Some(bins) = &args.pkt_len_distrib_bins_str {
        let edges = bins
            .split(',')
            .filter_map(|s| s.trim().parse::<u64>().ok())
            .collect();
        decorators.push(Box::new(LengthDistributionBucketer::new(edges)));
    }

    Ok(DecoratorPipeline::new(decorators))
}

fn load_networks_file(path: &std::path::Path) -> Result<Vec<NetworkPrefix>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::TableRead {
        path: path.to_path_buf(),
        source,
    })?;

    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let (cidr, label) = line
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedNetworksLine(line.to_string()))?;
            let (network, prefix_len) = cidr
                .split_once('/')
                .ok_or_else(|| ConfigError::MalformedNetworksLine(line.to_string()))?;
            Ok(NetworkPrefix {
                network: network
                    .parse()
                    .map_err(|_| ConfigError::MalformedNetworksLine(line.to_string()))?,
                prefix_len: prefix_len
                    .parse()
                    .map_err(|_| ConfigError::MalformedNetworksLine(line.to_string()))?,
                label: label.to_string(),
            })
        })
        .collect()
}

fn load_ports_file(path: &std::path::Path) -> Result<HashSet<u16>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::TableRead {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.parse().ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            message_broker_output: "textual".into(),
            sql_host: "localhost".into(),
            kafka_broker_port: 9092,
            sql_table: "flows".into(),
            amqp_routing_key_rr: None,
            kafka_partition: None,
            kafka_partition_key: None,
            sql_multi_values: 0,
            avro_buffer_size: 4096,
            sql_refresh_time: 60,
            sql_startup_delay: 0,
            sql_history_roundoff: 'm',
            sql_history: false,
            sql_history_howmany: None,
            print_markers: true,
            sql_trigger_exec: None,
            kafka_avro_schema_topic: None,
            kafka_avro_schema_refresh_time: 3600,
            avro_schema_output_file: None,
            networks_file: None,
            ports_file: None,
            pkt_len_distrib_bins_str: None,
            ring_bits: 16,
            max_producers: 16,
            writer_name: "acctd".into(),
            retry: true,
            circuit_breaker: true,
            log_level: "info".into(),
            log_format: "pretty".into(),
        }
    }

    #[test]
    fn valid_args_resolve_to_config() {
        let config = DaemonConfig::from_args(&base_args()).unwrap();
        assert_eq!(config.flush_period_secs, 60);
        assert!(config.retry.is_some());
    }

    #[test]
    fn unsupported_output_mode_is_rejected() {
        let mut args = base_args();
        args.message_broker_output = "xml".into();
        assert!(matches!(
            DaemonConfig::from_args(&args),
            Err(ConfigError::UnsupportedOutputMode(_))
        ));
    }

    #[test]
    fn dynamic_topic_with_multi_values_is_rejected_at_startup() {
        let mut args = base_args();
        args.sql_table = "flows.$peer_src_ip".into();
        args.sql_multi_values = 2;
        assert!(matches!(
            DaemonConfig::from_args(&args),
            Err(ConfigError::DynamicTopicWithMultiValues)
        ));
    }

    #[test]
    fn dynamic_topic_with_round_robin_topics_is_rejected_at_startup() {
        let mut args = base_args();
        args.sql_table = "flows.$peer_src_ip".into();
        args.amqp_routing_key_rr = Some("a,b".into());
        assert!(matches!(
            DaemonConfig::from_args(&args),
            Err(ConfigError::DynamicTopicWithRoundRobin)
        ));
    }

    #[test]
    fn invalid_roundoff_char_is_rejected() {
        let mut args = base_args();
        args.sql_history_roundoff = 'x';
        assert!(matches!(
            DaemonConfig::from_args(&args),
            Err(ConfigError::InvalidRoundoff('x'))
        ));
    }

    #[test]
    fn sql_history_flag_enables_historical_cache_mode() {
        let mut args = base_args();
        args.sql_history = true;
        let config = DaemonConfig::from_args(&args).unwrap();
        assert!(config.cache.historical);
        assert_eq!(config.cache_period(), TimeslotPeriod::Fixed(60));
    }

    #[test]
    fn sql_history_howmany_selects_monthly_cache_period() {
        let mut args = base_args();
        args.sql_history = true;
        args.sql_history_howmany = Some(2);
        let config = DaemonConfig::from_args(&args).unwrap();
        assert_eq!(config.cache_period(), TimeslotPeriod::Monthly);
    }

    #[test]
    fn decorator_pipeline_builds_with_no_tables_configured() {
        let pipeline = build_decorator_pipeline(&base_args()).unwrap();
        let mut records = vec![];
        pipeline.decorate_batch(&mut records);
    }
}
