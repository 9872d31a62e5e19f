//! Configuration for scan runs
//!
//! The TOML sections mirror the runtime components: `[scan]` drives the probe
//! pipeline, `[dns]` the resolver cache, `[output]` the report writer, and
//! `[checkpoint]` the resume watermark. Every section is optional; missing
//! fields fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ScanError;

/// Top-level configuration, loaded from a TOML file or built from defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanSection,

    #[serde(default)]
    pub dns: DnsSection,

    #[serde(default)]
    pub output: OutputSection,

    #[serde(default)]
    pub checkpoint: CheckpointSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSection {
    /// Per-step I/O timeout in milliseconds: TCP connect, each socket read or
    /// write, and the TLS handshake as a whole.
    pub timeout: u64,

    /// Comma list of ports and inclusive ranges, e.g. `"22,80-82"`.
    /// Ascending order keeps the checkpoint watermark meaningful on resume.
    pub ports: String,

    /// Outbound connect budget in probes per second; 0 disables pacing.
    pub rate_limit: u64,

    /// Ceiling on concurrent probes; values <= 0 fall back to 100.
    pub workers: i64,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            timeout: 3000,
            ports: "1-1024".to_string(),
            rate_limit: 100,
            workers: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsSection {
    /// Resolver cache entry lifetime in milliseconds.
    pub ttl: u64,
}

impl Default for DnsSection {
    fn default() -> Self {
        Self { ttl: 300_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Report format: `json`, `csv`, or `text`.
    pub format: String,

    /// Directory for report files, created if missing.
    pub directory: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            directory: "reports".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    /// Path of the persistent per-address watermark file.
    pub file: String,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            file: "checkpoint.json".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ScanError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| ScanError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Per-step I/O timeout as a Duration.
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.scan.timeout)
    }

    /// Resolver cache TTL as a Duration.
    pub fn dns_ttl(&self) -> Duration {
        Duration::from_millis(self.dns.ttl)
    }

    /// The configured port list, in the order given.
    pub fn port_list(&self) -> crate::Result<Vec<u16>> {
        parse_port_spec(&self.scan.ports)
    }
}

/// Parse a port specification: comma-separated ports and inclusive `A-B`
/// ranges, all in `[1, 65535]`. Order is preserved.
pub fn parse_port_spec(spec: &str) -> crate::Result<Vec<u16>> {
    let mut ports = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(ScanError::PortRange(format!("empty entry in {spec:?}")));
        }
        if let Some((start, end)) = part.split_once('-') {
            let start = parse_port(start)?;
            let end = parse_port(end)?;
            if start > end {
                return Err(ScanError::PortRange(format!("descending range {part:?}")));
            }
            ports.extend(start..=end);
        } else {
            ports.push(parse_port(part)?);
        }
    }
    Ok(ports)
}

fn parse_port(s: &str) -> crate::Result<u16> {
    let s = s.trim();
    let value: u32 = s
        .parse()
        .map_err(|_| ScanError::PortRange(format!("not a port number: {s:?}")))?;
    if value == 0 || value > 65535 {
        return Err(ScanError::PortRange(format!("port {value} out of [1, 65535]")));
    }
    Ok(value as u16)
}
