//! Error handling for the flan-scan engine

use thiserror::Error;

/// Main error type for scan operations.
///
/// Errors local to a single probe never surface here; the dissector and TLS
/// inspector fold them into `closed`/`unknown`/`None` results. `ScanError`
/// covers startup validation and the non-probe IO paths.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Port range error: {0}")]
    PortRange(String),

    #[error("Resolution failed for {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Output error: {0}")]
    Output(String),

    #[error("Worker pool closed")]
    PoolClosed,
}
