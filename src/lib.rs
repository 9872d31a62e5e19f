//! Flan Scan - a concurrent TCP service scanner with TLS inspection and
//! resumable checkpoints.
//!
//! The scan pipeline fans out over `(address, port)` pairs: hostnames resolve
//! through a TTL cache, completed probes are filtered by a persistent
//! checkpoint watermark, a counting semaphore bounds in-flight sockets, a
//! token bucket paces outbound connects, and each admitted probe runs the
//! protocol dissector plus an optional TLS inspection before its result is
//! emitted.

pub mod config;
pub mod dns;
pub mod error;
pub mod output;
pub mod scanner;

// Re-export commonly used types
pub use config::Config;
pub use error::ScanError;
pub use scanner::{ScanEngine, ScanResult, Service};

pub type Result<T> = std::result::Result<T, ScanError>;
