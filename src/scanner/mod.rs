//! Scanner components: pacing, admission, probing, dissection, TLS
//! inspection, and orchestration

pub mod checkpoint;
pub mod engine;
pub mod pool;
pub mod probe;
pub mod rate_limiter;
pub mod service;
pub mod targets;
pub mod tls;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

pub use engine::ScanEngine;
pub use tls::TlsInfo;

/// Service identity assigned by the dissector. Closed set; `Closed` means the
/// TCP connect failed, `Unknown` that the connect succeeded but no
/// fingerprint matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Closed,
    Unknown,
    Ssh,
    Ftp,
    Telnet,
    Smtp,
    Dns,
    Http,
    Pop3,
    Imap,
    Mysql,
    Postgresql,
    Redis,
    Rdp,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Closed => "closed",
            Service::Unknown => "unknown",
            Service::Ssh => "ssh",
            Service::Ftp => "ftp",
            Service::Telnet => "telnet",
            Service::Smtp => "smtp",
            Service::Dns => "dns",
            Service::Http => "http",
            Service::Pop3 => "pop3",
            Service::Imap => "imap",
            Service::Mysql => "mysql",
            Service::Postgresql => "postgresql",
            Service::Redis => "redis",
            Service::Rdp => "rdp",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the dissector concluded about one connected socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceResult {
    pub name: Service,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
}

impl ServiceResult {
    pub(crate) fn closed() -> Self {
        Self {
            name: Service::Closed,
            version: None,
            banner: None,
        }
    }

    pub(crate) fn unknown(banner: Option<String>) -> Self {
        Self {
            name: Service::Unknown,
            version: None,
            banner,
        }
    }
}

/// One emitted probe outcome. Only produced for ports whose TCP connect
/// succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub service: Service,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsInfo>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

/// Process-wide cancellation flag. The orchestrator checks it between
/// fan-out iterations and at task entry; the rate limiter unblocks on it.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_tokens_are_lowercase() {
        assert_eq!(Service::Postgresql.to_string(), "postgresql");
        assert_eq!(
            serde_json::to_string(&Service::Ssh).unwrap(),
            "\"ssh\"".to_string()
        );
        let parsed: Service = serde_json::from_str("\"rdp\"").unwrap();
        assert_eq!(parsed, Service::Rdp);
    }

    #[test]
    fn optional_fields_are_omitted() {
        let result = ScanResult {
            host: "10.0.0.1".to_string(),
            port: 22,
            protocol: "tcp".to_string(),
            service: Service::Ssh,
            version: None,
            banner: None,
            tls: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("version"));
        assert!(!json.contains("banner"));
        assert!(!json.contains("tls"));
    }

    #[tokio::test]
    async fn cancel_token_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        token.cancel();
        assert!(token.is_cancelled());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_set() {
        let token = CancelToken::new();
        token.cancel();
        token.cancelled().await;
    }
}
