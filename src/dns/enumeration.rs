//! Wordlist-driven subdomain discovery
//!
//! Feeds the scan pipeline with hostnames: every label of the compile-time
//! wordlist is resolved against the domain with bounded concurrency, and the
//! labels that answer (plus the apex itself) come back as scan targets.

use std::time::Duration;

use anyhow::{bail, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use log::debug;
use tokio::net::lookup_host;
use tokio::time::timeout;

/// Common subdomain labels, most-likely first.
const COMMON_SUBDOMAINS: &[&str] = &[
    "www", "mail", "ftp", "localhost", "webmail", "smtp", "pop", "ns1", "webdisk",
    "ns2", "cpanel", "whm", "autodiscover", "autoconfig", "m", "imap", "test",
    "ns", "blog", "pop3", "dev", "www2", "admin", "store", "dns1", "dns2",
    "mail2", "new", "mysql", "old", "lists", "support", "mobile", "mx", "demo",
    "ash", "blog2", "mx1", "chat", "dns", "www3", "git", "stats", "ns3", "wiki",
    "vpn", "mxs", "mx2", "sec", "vps", "mail3", "ns4", "app", "irc", "relay",
    "logs", "mx0", "git2", "sftp", "ftps", "ssh", "git3", "corp", "nas", "proxy",
    "redis", "sync", "edge", "sync2", "db", "manage", "git1", "stage", "svn",
    "git4", "api", "api2", "api3", "jira", "test2", "beta", "backup", "owa",
    "git5", "ns5", "ns6", "ns7", "ns8", "ns9", "ns10", "v2", "beta2", "test3",
    "web1", "web2", "web3", "web4", "server", "server1", "server2", "server3",
    "cdn", "cdn2", "static", "files", "download", "download2", "upload",
    "upload2", "cdn3", "assets", "img", "images", "img2", "static2", "media",
    "media2", "files2", "docs", "docs2", "public", "private", "crm", "erp",
    "helpdesk", "portal", "web", "portal2", "shop", "store2", "mall", "pay",
    "payment", "checkout", "cart", "orders", "billing", "account", "accounts",
    "secure", "login", "sso", "auth", "oauth", "token", "idp", "ldap", "admin2",
    "manager", "manage2", "hr", "intranet", "internal", "dev2", "staging",
    "staging2", "prod", "production", "cloud", "cloud2", "aws", "azure", "gcp",
    "kubernetes", "k8s", "docker", "registry", "jenkins", "ci", "cd",
    "pipelines", "build", "deploy", "sonar", "nexus", "artifactory", "grafana",
    "prometheus", "kibana", "logs2", "elasticsearch", "monitor", "monitoring",
    "alert", "alerts", "metrics", "stats2", "analytics", "data", "data2",
    "warehouse", "etl", "spark", "hadoop", "kafka", "rabbitmq", "nats", "grpc",
    "websocket", "realtime", "socket", "push", "notification", "notify",
    "mailer", "smtp2", "smtp3", "mta", "incoming", "outgoing", "filters",
    "spam", "quarantine", "archiver", "archive", "webhook", "hooks", "hook",
    "bot", "bots", "chatbot", "ai", "ml", "model", "models", "training",
    "inference", "lambda", "function", "functions", "faas", "serverless",
    "global", "regional", "east", "west", "north", "south", "us", "eu", "ap",
    "au", "jp", "sg", "in", "br", "ca", "uk", "de", "fr", "es", "it", "nl",
    "se", "no", "fi", "dk", "pl", "ru", "cn", "kr", "tw", "hk", "id", "my",
    "th", "vn", "ph", "nz", "za", "eg", "sa", "ae", "il", "ng", "ke", "ma",
];

/// Concurrent wordlist resolver for one domain.
pub struct Enumerator {
    timeout: Duration,
    workers: usize,
}

impl Enumerator {
    pub fn new(timeout: Duration, workers: usize) -> Self {
        Self {
            timeout,
            workers: workers.max(1),
        }
    }

    /// Resolve `label.domain` for every wordlist label and return the
    /// hostnames that answered, in completion order, apex last.
    pub async fn enumerate(&self, domain: &str) -> Result<Vec<String>> {
        let domain = domain.trim().to_ascii_lowercase();
        if !domain.contains('.') {
            bail!("invalid domain: {domain}");
        }

        let mut found = Vec::new();
        let mut labels = COMMON_SUBDOMAINS.iter();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < self.workers {
                let Some(label) = labels.next() else { break };
                let host = format!("{label}.{domain}");
                let limit = self.timeout;
                in_flight.push(async move {
                    let lookup_target = host.clone();
                    let result = timeout(limit, lookup_host((lookup_target.as_str(), 0))).await;
                    match result {
                        Ok(Ok(mut addrs)) => {
                            if addrs.next().is_some() {
                                Some(host)
                            } else {
                                None
                            }
                        }
                        _ => None,
                    }
                });
            }
            match in_flight.next().await {
                Some(Some(host)) => {
                    debug!("subdomain hit: {host}");
                    found.push(host);
                }
                Some(None) => {}
                None => break,
            }
        }

        let lookup_target = domain.clone();
        let apex_result = timeout(self.timeout, lookup_host((lookup_target.as_str(), 0))).await;
        if let Ok(Ok(mut addrs)) = apex_result {
            if addrs.next().is_some() {
                found.push(domain);
            }
        }

        Ok(found)
    }
}
