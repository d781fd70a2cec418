//! Top-level error taxonomy (§7): one small tree per component boundary,
//! composed here into the daemon's fatal-to-process surface.

use crate::config::ConfigError;
use acct_broker::PublicationError;
use acct_ingest::IngestError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Publication(#[from] PublicationError),
    #[error("failed to dump schema to {path}: {source}")]
    SchemaDump {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
