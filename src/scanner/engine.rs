//! Scan orchestration: host and port fan-out, probe tasks, result collection

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::dns::ResolverCache;
use crate::error::ScanError;

use super::checkpoint::Checkpoint;
use super::pool::WorkerPool;
use super::rate_limiter::RateLimiter;
use super::{service, tls, CancelToken, ScanResult, Service};

/// Backpressure bound on the result channel between probe tasks and the
/// collector.
const RESULT_BUFFER: usize = 256;

/// Drives the probe pipeline over every `(address, port)` pair: resolve,
/// checkpoint filter, worker admission, rate pacing, dissection, TLS
/// inspection, emission.
pub struct ScanEngine {
    ports: Vec<u16>,
    timeout: Duration,
    resolver: Arc<ResolverCache>,
    checkpoint: Arc<Checkpoint>,
    limiter: Arc<RateLimiter>,
    pool: WorkerPool,
    cancel: CancelToken,
}

impl ScanEngine {
    pub fn new(config: &Config, cancel: CancelToken) -> crate::Result<Self> {
        let ports = config.port_list()?;
        Ok(Self {
            ports,
            timeout: config.timeout_duration(),
            resolver: Arc::new(ResolverCache::new(config.dns_ttl())),
            checkpoint: Arc::new(Checkpoint::load(&config.checkpoint.file)),
            limiter: Arc::new(RateLimiter::new(config.scan.rate_limit)),
            pool: WorkerPool::new(config.scan.workers),
            cancel,
        })
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the full pipeline over `targets`. Results arrive in completion
    /// order, not issue order; pairs probed in an earlier run are skipped via
    /// the checkpoint. On cancellation the fan-out stops immediately and
    /// whatever completed is still returned.
    pub async fn run(&self, targets: &[String]) -> crate::Result<Vec<ScanResult>> {
        let (tx, mut rx) = mpsc::channel::<ScanResult>(RESULT_BUFFER);
        let collector = tokio::spawn(async move {
            let mut results = Vec::new();
            while let Some(result) = rx.recv().await {
                results.push(result);
            }
            results
        });

        let mut tasks = FuturesUnordered::new();

        'fanout: for host in targets {
            if self.cancel.is_cancelled() {
                break;
            }
            let addrs = match self.resolver.lookup(host).await {
                Ok(addrs) => addrs,
                Err(e) => {
                    warn!("skipping {host}: {e}");
                    continue;
                }
            };
            for addr in addrs {
                let addr_str = addr.to_string();
                for &port in &self.ports {
                    if self.cancel.is_cancelled() {
                        break 'fanout;
                    }
                    if self.checkpoint.should_skip(&addr_str, port).await {
                        debug!("checkpoint skip {addr_str}:{port}");
                        continue;
                    }
                    let permit = self.pool.acquire().await?;
                    let tx = tx.clone();
                    let probe = ProbeTask {
                        checkpoint: Arc::clone(&self.checkpoint),
                        limiter: Arc::clone(&self.limiter),
                        cancel: self.cancel.clone(),
                        timeout: self.timeout,
                    };
                    let host = addr_str.clone();
                    tasks.push(tokio::spawn(async move {
                        let _permit = permit;
                        probe.run(host, addr, port, tx).await;
                    }));
                }
            }
        }
        drop(tx);

        while let Some(joined) = tasks.next().await {
            if let Err(e) = joined {
                warn!("probe task failed: {e}");
            }
        }

        let results = collector
            .await
            .map_err(|e| ScanError::Output(format!("result collector failed: {e}")))?;
        info!("scan finished: {} open services", results.len());
        Ok(results)
    }
}

struct ProbeTask {
    checkpoint: Arc<Checkpoint>,
    limiter: Arc<RateLimiter>,
    cancel: CancelToken,
    timeout: Duration,
}

impl ProbeTask {
    async fn run(&self, host: String, addr: IpAddr, port: u16, tx: mpsc::Sender<ScanResult>) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.limiter.wait(&self.cancel).await;
        if self.cancel.is_cancelled() {
            return;
        }

        let svc = service::detect(addr, port, self.timeout).await;
        if svc.name == Service::Closed {
            return;
        }

        let tls = tls::inspect(addr, port, self.timeout).await;

        let result = ScanResult {
            host: host.clone(),
            port,
            protocol: "tcp".to_string(),
            service: svc.name,
            version: svc.version,
            banner: svc.banner,
            tls,
        };
        // The collector hanging up just means the run is being torn down.
        let _ = tx.send(result).await;

        if let Err(e) = self.checkpoint.save(&host, port).await {
            warn!("checkpoint save failed for {host}:{port}: {e}");
        }
    }
}
