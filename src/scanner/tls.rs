//! TLS endpoint inspection
//!
//! Certificate verification is deliberately disabled: the scanner reports on
//! endpoints as-is, so expired and self-signed certificates must still
//! complete the handshake. This is an observation tool, not a trust decision.

use std::net::IpAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore, ServerName};
use tokio_rustls::TlsConnector;
use x509_parser::prelude::*;

use super::probe;

/// Metadata captured from a completed handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsInfo {
    pub enabled: bool,
    pub version: String,
    pub cipher_suite: String,
    pub subject: String,
    pub issuer: String,
    pub not_before: String,
    pub not_after: String,
    pub sans: Vec<String>,
    pub expired: bool,
    pub self_signed: bool,
}

struct NoVerifier;

impl rustls::client::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

fn connector() -> TlsConnector {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    let config = CONFIG.get_or_init(|| {
        let mut config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(RootCertStore::empty())
            .with_no_client_auth();
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerifier));
        Arc::new(config)
    });
    TlsConnector::from(config.clone())
}

/// Map a wire protocol version to its display name; unknown values keep
/// their raw hex.
pub fn tls_version_string(version: u16) -> String {
    match version {
        0x0301 => "TLS1.0".to_string(),
        0x0302 => "TLS1.1".to_string(),
        0x0303 => "TLS1.2".to_string(),
        0x0304 => "TLS1.3".to_string(),
        other => format!("0x{other:04x}"),
    }
}

/// Handshake against `(addr, port)` on a fresh connection and extract the
/// negotiated parameters and leaf-certificate facts. Any failure, from
/// connect to certificate parse, yields `None`.
pub async fn inspect(addr: IpAddr, port: u16, limit: Duration) -> Option<TlsInfo> {
    let stream = probe::connect(addr, port, limit).await.ok()?;
    let server_name = ServerName::IpAddress(addr);
    let tls_stream = timeout(limit, connector().connect(server_name, stream))
        .await
        .ok()?
        .ok()?;
    let (_, conn) = tls_stream.get_ref();

    let version = conn
        .protocol_version()
        .map(|v| tls_version_string(v.get_u16()))
        .unwrap_or_default();
    let cipher_suite = conn
        .negotiated_cipher_suite()
        .map(|suite| format!("{:?}", suite.suite()))
        .unwrap_or_default();

    let certs = conn.peer_certificates()?;
    let leaf = certs.first()?;
    let (_, cert) = X509Certificate::from_der(&leaf.0).ok()?;

    let subject = cert.subject().to_string();
    let issuer = cert.issuer().to_string();
    let not_after_ts = cert.validity().not_after.timestamp();

    Some(TlsInfo {
        enabled: true,
        version,
        cipher_suite,
        self_signed: subject == issuer,
        expired: Utc::now().timestamp() > not_after_ts,
        not_before: format_validity(cert.validity().not_before.timestamp()),
        not_after: format_validity(not_after_ts),
        sans: dns_names(&cert),
        subject,
        issuer,
    })
}

fn format_validity(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

fn dns_names(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut sans = Vec::new();
    for ext in cert.extensions() {
        if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
            for name in &san.general_names {
                if let GeneralName::DNSName(dns) = name {
                    sans.push(dns.to_string());
                }
            }
        }
    }
    sans
}
