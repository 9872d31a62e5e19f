//! Port-indexed service dissection
//!
//! Each probe owns one connected socket. Passive probes read a single banner;
//! the telnet, DNS, HTTP, redis, and RDP probes write their discriminator
//! first. Every read takes a fresh deadline and at most 1024 bytes, except
//! the HTTP probe's line reader which is bounded by the same deadline. Ports
//! 443/8443 still report `http`; TLS facts belong to the TLS inspector.

use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::probe;
use super::{Service, ServiceResult};

fn ssh_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"SSH-[\d.]+-(\S+)").expect("ssh version pattern"))
}

fn smtp_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"220\s+\S+\s+(?:ESMTP\s+)?(\S+)").expect("smtp version pattern"))
}

fn ftp_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"220.*?(\S+\s+\d+\.\d+\S*)").expect("ftp version pattern"))
}

/// Standard A query for www.google.com with transaction ID 0x1234, carrying
/// the two-byte TCP length prefix. The reply is matched on the ID echoed at
/// offset 2..4.
const DNS_PROBE: [u8; 34] = [
    0x00, 0x1c, 0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03,
    b'w', b'w', b'w', 0x06, b'g', b'o', b'o', b'g', b'l', b'e', 0x03, b'c', b'o', b'm', 0x00,
    0x00, 0x01, 0x00, 0x01,
];

/// X.224 connection request with the RDP negotiation payload.
const RDP_NEG_REQUEST: [u8; 19] = [
    0x03, 0x00, 0x00, 0x13, 0x0e, 0xe0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x08, 0x00,
    0x03, 0x00, 0x00, 0x00,
];

/// Identify the service behind `(addr, port)`. A failed connect yields
/// `closed`; a connect with no matching fingerprint yields `unknown`. The
/// socket is closed before returning.
pub async fn detect(addr: IpAddr, port: u16, limit: Duration) -> ServiceResult {
    let mut stream = match probe::connect(addr, port, limit).await {
        Ok(stream) => stream,
        Err(_) => return ServiceResult::closed(),
    };

    match port {
        21 => detect_ftp(&mut stream, limit).await,
        22 => detect_ssh(&mut stream, limit).await,
        23 => detect_telnet(&mut stream, limit).await,
        25 | 465 | 587 => detect_smtp(&mut stream, limit).await,
        53 => detect_dns(&mut stream, limit).await,
        80 | 443 | 8080 | 8443 => detect_http(&mut stream, addr, limit).await,
        110 => detect_pop3(&mut stream, limit).await,
        143 | 993 => detect_imap(&mut stream, limit).await,
        3306 => detect_mysql(&mut stream, limit).await,
        5432 => detect_postgres(&mut stream, limit).await,
        6379 => detect_redis(&mut stream, limit).await,
        3389 => detect_rdp(&mut stream, limit).await,
        _ => detect_by_banner(&mut stream, limit).await,
    }
}

async fn read_text(stream: &mut TcpStream, limit: Duration) -> String {
    let bytes = probe::read_banner(stream, limit).await;
    String::from_utf8_lossy(&bytes).into_owned()
}

async fn write_probe(stream: &mut TcpStream, payload: &[u8], limit: Duration) {
    // A failed write still falls through to the read; the reply (or lack of
    // one) decides the verdict.
    let _ = timeout(limit, stream.write_all(payload)).await;
}

fn non_empty(banner: String) -> Option<String> {
    if banner.is_empty() {
        None
    } else {
        Some(banner)
    }
}

async fn detect_ftp(stream: &mut TcpStream, limit: Duration) -> ServiceResult {
    let banner = read_text(stream, limit).await;
    if !banner.starts_with("220") {
        return ServiceResult::unknown(non_empty(banner));
    }
    ServiceResult {
        name: Service::Ftp,
        version: ftp_version(&banner),
        banner: non_empty(banner),
    }
}

async fn detect_ssh(stream: &mut TcpStream, limit: Duration) -> ServiceResult {
    let banner = read_text(stream, limit).await;
    ServiceResult {
        name: Service::Ssh,
        version: ssh_version(&banner),
        banner: non_empty(banner.trim().to_string()),
    }
}

async fn detect_telnet(stream: &mut TcpStream, limit: Duration) -> ServiceResult {
    let bytes = probe::read_banner(stream, limit).await;
    // 0xFF is IAC, the telnet option-negotiation lead byte.
    if bytes.first() == Some(&0xff) {
        return ServiceResult {
            name: Service::Telnet,
            version: None,
            banner: None,
        };
    }
    ServiceResult::unknown(None)
}

async fn detect_smtp(stream: &mut TcpStream, limit: Duration) -> ServiceResult {
    let banner = read_text(stream, limit).await;
    if !banner.starts_with("220") {
        return ServiceResult::unknown(non_empty(banner));
    }
    ServiceResult {
        name: Service::Smtp,
        version: smtp_version(&banner),
        banner: non_empty(banner),
    }
}

async fn detect_dns(stream: &mut TcpStream, limit: Duration) -> ServiceResult {
    write_probe(stream, &DNS_PROBE, limit).await;
    let reply = probe::read_banner(stream, limit).await;
    if reply.len() > 3 && reply[2] == 0x12 && reply[3] == 0x34 {
        return ServiceResult {
            name: Service::Dns,
            version: None,
            banner: None,
        };
    }
    ServiceResult::unknown(None)
}

async fn detect_http(stream: &mut TcpStream, addr: IpAddr, limit: Duration) -> ServiceResult {
    let host = match addr {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    };
    let request = format!("HEAD / HTTP/1.0\r\nHost: {host}\r\n\r\n");
    write_probe(stream, request.as_bytes(), limit).await;

    let mut reader = BufReader::new(stream);
    let mut version = None;
    let mut line = String::new();
    // Headers only; the deadline bounds each line and EOF or a blank line
    // ends the scan.
    for _ in 0..64 {
        line.clear();
        match timeout(limit, reader.read_line(&mut line)).await {
            Ok(Ok(n)) if n > 0 => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    break;
                }
                let header_matches = trimmed
                    .get(..7)
                    .map(|prefix| prefix.eq_ignore_ascii_case("server:"))
                    .unwrap_or(false);
                if header_matches {
                    version = non_empty(trimmed[7..].trim().to_string());
                }
            }
            _ => break,
        }
    }
    ServiceResult {
        name: Service::Http,
        version,
        banner: None,
    }
}

async fn detect_pop3(stream: &mut TcpStream, limit: Duration) -> ServiceResult {
    let banner = read_text(stream, limit).await;
    if banner.starts_with("+OK") {
        return ServiceResult {
            name: Service::Pop3,
            version: None,
            banner: non_empty(banner),
        };
    }
    ServiceResult::unknown(non_empty(banner))
}

async fn detect_imap(stream: &mut TcpStream, limit: Duration) -> ServiceResult {
    let banner = read_text(stream, limit).await;
    if banner.contains("* OK") {
        return ServiceResult {
            name: Service::Imap,
            version: None,
            banner: non_empty(banner),
        };
    }
    ServiceResult::unknown(non_empty(banner))
}

async fn detect_mysql(stream: &mut TcpStream, limit: Duration) -> ServiceResult {
    let payload = probe::read_banner(stream, limit).await;
    // Protocol version 10 greeting.
    if payload.first() != Some(&0x0a) {
        return ServiceResult::unknown(None);
    }
    ServiceResult {
        name: Service::Mysql,
        version: mysql_version(&payload),
        banner: None,
    }
}

async fn detect_postgres(stream: &mut TcpStream, limit: Duration) -> ServiceResult {
    let banner = read_text(stream, limit).await;
    if banner.contains("PostgreSQL") {
        return ServiceResult {
            name: Service::Postgresql,
            version: None,
            banner: non_empty(banner),
        };
    }
    ServiceResult::unknown(non_empty(banner))
}

async fn detect_redis(stream: &mut TcpStream, limit: Duration) -> ServiceResult {
    write_probe(stream, b"INFO server\r\n", limit).await;
    let reply = read_text(stream, limit).await;
    if reply.contains("redis") {
        return ServiceResult {
            name: Service::Redis,
            version: redis_version(&reply),
            banner: None,
        };
    }

    write_probe(stream, b"PING\r\n", limit).await;
    let reply = read_text(stream, limit).await;
    if reply.starts_with("+PONG") {
        return ServiceResult {
            name: Service::Redis,
            version: None,
            banner: None,
        };
    }
    ServiceResult::unknown(None)
}

async fn detect_rdp(stream: &mut TcpStream, limit: Duration) -> ServiceResult {
    write_probe(stream, &RDP_NEG_REQUEST, limit).await;
    let reply = probe::read_banner(stream, limit).await;
    // TPKT replies lead with 0x03.
    if reply.first() == Some(&0x03) {
        return ServiceResult {
            name: Service::Rdp,
            version: None,
            banner: None,
        };
    }
    ServiceResult::unknown(None)
}

async fn detect_by_banner(stream: &mut TcpStream, limit: Duration) -> ServiceResult {
    let banner = read_text(stream, limit).await;
    classify_banner(banner)
}

/// Fallback classifier for ports without a dedicated probe: first matching
/// token wins, in the order ssh, ftp, smtp, http.
fn classify_banner(banner: String) -> ServiceResult {
    let lower = banner.to_lowercase();
    let name = if lower.contains("ssh") {
        Service::Ssh
    } else if lower.contains("ftp") {
        Service::Ftp
    } else if lower.contains("smtp") {
        Service::Smtp
    } else if lower.contains("http") {
        Service::Http
    } else {
        return ServiceResult::unknown(non_empty(banner));
    };

    let version = if name == Service::Ssh {
        ssh_version(&banner)
    } else {
        None
    };
    ServiceResult {
        name,
        version,
        banner: non_empty(banner),
    }
}

fn ssh_version(banner: &str) -> Option<String> {
    ssh_version_re()
        .captures(banner)
        .map(|caps| caps[1].to_string())
}

fn smtp_version(banner: &str) -> Option<String> {
    smtp_version_re()
        .captures(banner)
        .map(|caps| caps[1].to_string())
}

fn ftp_version(banner: &str) -> Option<String> {
    ftp_version_re()
        .captures(banner)
        .map(|caps| caps[1].to_string())
}

/// Greeting bytes after the protocol marker, up to the NUL terminator.
fn mysql_version(payload: &[u8]) -> Option<String> {
    let tail = payload.get(1..)?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    let version = String::from_utf8_lossy(&tail[..end]).into_owned();
    non_empty(version)
}

fn redis_version(info: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.strip_prefix("redis_version:"))
        .and_then(|value| non_empty(value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn ssh_versions_are_extracted() {
        assert_eq!(
            ssh_version("SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.1\r\n").as_deref(),
            Some("OpenSSH_8.9p1")
        );
        assert_eq!(
            ssh_version("SSH-2.0-dropbear_2022.83\r\n").as_deref(),
            Some("dropbear_2022.83")
        );
        assert_eq!(ssh_version("SSH-2.0-\r\n"), None);
    }

    #[test]
    fn smtp_versions_are_extracted() {
        assert_eq!(
            smtp_version("220 mail.example.com ESMTP Postfix\r\n").as_deref(),
            Some("Postfix")
        );
        assert_eq!(
            smtp_version("220 smtp.example.com Sendmail\r\n").as_deref(),
            Some("Sendmail")
        );
    }

    #[test]
    fn ftp_versions_are_extracted() {
        assert_eq!(
            ftp_version("220 ProFTPD 1.3.5 Server ready\r\n").as_deref(),
            Some("ProFTPD 1.3.5")
        );
        assert_eq!(ftp_version("220 welcome\r\n"), None);
    }

    #[test]
    fn mysql_greeting_version_stops_at_nul() {
        let payload = b"\x0a8.0.32\x00rest-of-handshake";
        assert_eq!(mysql_version(payload).as_deref(), Some("8.0.32"));
        assert_eq!(mysql_version(b"\x0a"), None);
    }

    #[test]
    fn redis_info_version_line_is_parsed() {
        let info = "# Server\r\nredis_version:7.0.11\r\nredis_mode:standalone\r\n";
        assert_eq!(redis_version(info).as_deref(), Some("7.0.11"));
        assert_eq!(redis_version("# Server\r\n"), None);
    }

    #[test]
    fn classifier_matches_in_priority_order() {
        // "sshftp" carries both tokens; ssh wins.
        let result = classify_banner("sshftp service".to_string());
        assert_eq!(result.name, Service::Ssh);

        let result = classify_banner("Pure-FTPd ready".to_string());
        assert_eq!(result.name, Service::Ftp);

        let result = classify_banner("ESMTP smtp gateway".to_string());
        assert_eq!(result.name, Service::Smtp);

        let result = classify_banner("HTTP/1.1 400 Bad Request".to_string());
        assert_eq!(result.name, Service::Http);
    }

    #[test]
    fn classifier_keeps_the_banner_it_matched() {
        let result = classify_banner("SSH-2.0-OpenSSH_9.0\r\n".to_string());
        assert_eq!(result.name, Service::Ssh);
        assert_eq!(result.version.as_deref(), Some("OpenSSH_9.0"));
        assert!(result.banner.unwrap().to_lowercase().contains("ssh"));
    }

    #[test]
    fn unmatched_banners_are_unknown() {
        let result = classify_banner("greetings from nowhere".to_string());
        assert_eq!(result.name, Service::Unknown);
        assert_eq!(result.banner.as_deref(), Some("greetings from nowhere"));

        let silent = classify_banner(String::new());
        assert_eq!(silent.name, Service::Unknown);
        assert_eq!(silent.banner, None);
    }

    #[test]
    fn probe_payloads_are_wire_exact() {
        assert_eq!(DNS_PROBE.len(), 34);
        assert_eq!(&DNS_PROBE[2..4], &[0x12, 0x34]);
        assert_eq!(RDP_NEG_REQUEST.len(), 19);
        assert_eq!(RDP_NEG_REQUEST[0], 0x03);
        assert_eq!(RDP_NEG_REQUEST[3], 0x13);
    }

    #[tokio::test]
    async fn refused_connect_is_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = detect(LOCALHOST, port, Duration::from_millis(500)).await;
        assert_eq!(result.name, Service::Closed);
        assert_eq!(result.banner, None);
    }

    #[tokio::test]
    async fn banner_fallback_identifies_ssh_on_odd_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"SSH-2.0-OpenSSH_9.0\r\n")
                .await
                .unwrap();
        });

        let result = detect(LOCALHOST, port, Duration::from_secs(1)).await;
        assert_eq!(result.name, Service::Ssh);
        assert_eq!(result.version.as_deref(), Some("OpenSSH_9.0"));
    }

    #[tokio::test]
    async fn silent_listener_is_unknown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let result = detect(LOCALHOST, port, Duration::from_millis(300)).await;
        assert_eq!(result.name, Service::Unknown);
        assert_eq!(result.banner, None);
    }
}
