//! Wire composition for cache entries: the textual (self-describing JSON)
//! and binary (schema-governed, fixed-width) content types, plus the two
//! distinct batch-closing policies each mode uses.

use acct_model::CacheEntry;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Textual,
    Binary,
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("binary value of {size} bytes exceeds the configured buffer of {buffer_size} bytes")]
    ValueExceedsBuffer { size: usize, buffer_size: usize },
}

/// Builds one self-describing JSON object for a committed entry. Field names
/// follow the fingerprint's `what_to_count` mask; `writer_name`/`writer_pid`
/// are attached unconditionally, mirroring the textual composer's contract.
pub fn compose_textual(entry: &CacheEntry, writer_name: &str, writer_pid: u32) -> Value {
    let sample = &entry.sample;
    json!({
        "peer_src_ip": sample.src_addr.to_string(),
        "peer_dst_ip": sample.dst_addr.to_string(),
        "src_port": sample.src_port,
        "dst_port": sample.dst_port,
        "proto": sample.protocol,
        "src_as": sample.src_as,
        "dst_as": sample.dst_as,
        "vlan": entry.adjuncts.vlan,
        "mpls_label": entry.adjuncts.mpls_label,
        "nat_event": entry.adjuncts.nat_event,
        "bytes": entry.counters.bytes,
        "packets": entry.counters.packets,
        "flows": entry.counters.flows,
        "tcp_flags": entry.counters.tcp_flags,
        "basetime": entry.basetime,
        "stitch_interval": entry.sample.stitch_interval(),
        "writer_name": writer_name,
        "writer_pid": writer_pid,
    })
}

/// Fixed-width binary encoding standing in for the external schema-governed
/// serializer: big-endian primitive fields followed by the counter block.
/// `ENCODED_LEN` is the `avro_value_size` this spec's buffer math is in
/// terms of.
pub const ENCODED_LEN: usize = 64;

pub fn compose_binary(entry: &CacheEntry) -> [u8; ENCODED_LEN] {
    let mut out = [0u8; ENCODED_LEN];
    let sample = &entry.sample;
    out[0..2].copy_from_slice(&sample.src_port.to_be_bytes());
    out[2..4].copy_from_slice(&sample.dst_port.to_be_bytes());
    out[4] = sample.protocol;
    out[8..12].copy_from_slice(&sample.src_as.to_be_bytes());
    out[12..16].copy_from_slice(&sample.dst_as.to_be_bytes());
    out[16..24].copy_from_slice(&entry.counters.bytes.to_be_bytes());
    out[24..32].copy_from_slice(&entry.counters.packets.to_be_bytes());
    out[32..40].copy_from_slice(&entry.counters.flows.to_be_bytes());
    out[40..48].copy_from_slice(&entry.basetime.to_be_bytes());
    out
}

/// The full JSON schema description published on `schema_topic` (§4.5 C5.bis)
/// and optionally dumped to `avro_schema_output_file` at startup.
pub fn binary_schema_json() -> Value {
    json!({
        "type": "record",
        "name": "AcctRecord",
        "fields": [
            {"name": "src_port", "type": "int", "offset": 0},
            {"name": "dst_port", "type": "int", "offset": 2},
            {"name": "protocol", "type": "int", "offset": 4},
            {"name": "src_as", "type": "long", "offset": 8},
            {"name": "dst_as", "type": "long", "offset": 12},
            {"name": "bytes", "type": "long", "offset": 16},
            {"name": "packets", "type": "long", "offset": 24},
            {"name": "flows", "type": "long", "offset": 32},
            {"name": "basetime", "type": "long", "offset": 40},
        ],
        "encoded_len": ENCODED_LEN,
    })
}

/// Accumulates composed JSON objects and closes a batch on count threshold.
/// `multi_values == 0` disables batching: every push emits immediately.
pub struct TextualBatcher {
    multi_values: usize,
    buffer: Vec<Value>,
}

pub enum TextualPush {
    /// Object accumulated; batch not yet full.
    Buffered,
    /// Batch closed; serialize and publish these `count` objects.
    Emit { bytes: Vec<u8>, count: usize },
}

impl TextualBatcher {
    pub fn new(multi_values: usize) -> Self {
        Self {
            multi_values,
            buffer: Vec::new(),
        }
    }

    pub fn push(&mut self, value: Value) -> TextualPush {
        if self.multi_values == 0 {
            let bytes = serde_json::to_vec(&value).expect("json values always serialize");
            return TextualPush::Emit { bytes, count: 1 };
        }

        self.buffer.push(value);
        if self.buffer.len() >= self.multi_values {
            let batch = std::mem::take(&mut self.buffer);
            let count = batch.len();
            let bytes = serde_json::to_vec(&batch).expect("json values always serialize");
            TextualPush::Emit { bytes, count }
        } else {
            TextualPush::Buffered
        }
    }

    /// Serializes and returns any partial batch still held, for end-of-flush.
    pub fn close(&mut self) -> Option<(Vec<u8>, usize)> {
        if self.buffer.is_empty() {
            return None;
        }
        let batch = std::mem::take(&mut self.buffer);
        let count = batch.len();
        let bytes = serde_json::to_vec(&batch).expect("json values always serialize");
        Some((bytes, count))
    }
}

/// Accumulates fixed-width binary values into a backing buffer and closes a
/// batch on buffer-full or count threshold, whichever comes first.
/// `multi_values == 0` means count never triggers a close on its own; only
/// the buffer filling up does.
pub struct BinaryBatcher {
    buffer_size: usize,
    multi_values: usize,
    buffer: Vec<u8>,
    mv_num: usize,
}

#[derive(Debug)]
pub enum BinaryWrite {
    /// Value accumulated; batch not yet full.
    Buffered,
    /// Batch closed after this value was accumulated.
    Emitted { bytes: Vec<u8>, count: usize },
    /// The value did not fit in the remaining buffer space: the previously
    /// accumulated batch was flushed and the caller must reprocess this same
    /// value (it has now been written into the fresh buffer).
    FlushedThenBuffered { bytes: Vec<u8>, count: usize },
}

impl BinaryBatcher {
    pub fn new(buffer_size: usize, multi_values: usize) -> Self {
        Self {
            buffer_size,
            multi_values,
            buffer: Vec::new(),
            mv_num: 0,
        }
    }

    pub fn write(&mut self, value: &[u8; ENCODED_LEN]) -> Result<BinaryWrite, ComposeError> {
        if value.len() > self.buffer_size {
            return Err(ComposeError::ValueExceedsBuffer {
                size: value.len(),
                buffer_size: self.buffer_size,
            });
        }

        let remaining = self.buffer_size - self.buffer.len();
        if value.len() >= remaining {
            let bytes = std::mem::take(&mut self.buffer);
            let count = self.mv_num;
            self.mv_num = 0;
            self.buffer.extend_from_slice(value);
            self.mv_num = 1;
            return Ok(BinaryWrite::FlushedThenBuffered { bytes, count });
        }

        self.buffer.extend_from_slice(value);
        self.mv_num += 1;
        if self.multi_values != 0 && self.mv_num >= self.multi_values {
            let bytes = std::mem::take(&mut self.buffer);
            let count = self.mv_num;
            self.mv_num = 0;
            return Ok(BinaryWrite::Emitted { bytes, count });
        }

        Ok(BinaryWrite::Buffered)
    }

    pub fn close(&mut self) -> Option<(Vec<u8>, usize)> {
        if self.buffer.is_empty() {
            return None;
        }
        let bytes = std::mem::take(&mut self.buffer);
        let count = self.mv_num;
        self.mv_num = 0;
        Some((bytes, count))
    }
}
