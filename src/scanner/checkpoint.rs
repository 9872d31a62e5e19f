//! Resume watermarks for interrupted scans
//!
//! The store keeps one port per address: the last port whose probe ran to
//! completion. `save` is last-write-wins, not a running max, so the engine
//! iterates ports in the configured order and an ascending port list makes
//! the watermark effectively monotonic.

use std::collections::HashMap;
use std::path::PathBuf;

use log::warn;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Persistent `{address -> last completed port}` map. The whole file is
/// rewritten and flushed on every save; all operations share one mutex.
pub struct Checkpoint {
    path: PathBuf,
    progress: Mutex<HashMap<String, u16>>,
}

impl Checkpoint {
    /// Open the store at `path`. A missing, unreadable, or corrupt file
    /// starts an empty checkpoint; resuming is best-effort, never fatal.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let progress = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                warn!("ignoring corrupt checkpoint {}: {}", path.display(), e);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            progress: Mutex::new(progress),
        }
    }

    /// True iff a watermark exists for `addr` and `port` is at or below it.
    pub async fn should_skip(&self, addr: &str, port: u16) -> bool {
        let progress = self.progress.lock().await;
        match progress.get(addr) {
            Some(&last) => port <= last,
            None => false,
        }
    }

    /// Record `port` as the watermark for `addr` and rewrite the file. The
    /// write happens under the map lock so the file never mixes two updates.
    pub async fn save(&self, addr: &str, port: u16) -> crate::Result<()> {
        let mut progress = self.progress.lock().await;
        progress.insert(addr.to_string(), port);
        let data = serde_json::to_string_pretty(&*progress)?;

        let mut file = tokio::fs::File::create(&self.path).await?;
        file.write_all(data.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn temp_path(tag: &str) -> PathBuf {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "flan-checkpoint-{tag}-{}-{n}.json",
            std::process::id()
        ))
    }

    #[tokio::test]
    async fn saved_ports_are_skipped() {
        let path = temp_path("skip");
        let cp = Checkpoint::load(&path);
        assert!(!cp.should_skip("10.0.0.1", 80).await);

        cp.save("10.0.0.1", 80).await.unwrap();
        assert!(cp.should_skip("10.0.0.1", 80).await);
        assert!(cp.should_skip("10.0.0.1", 79).await);
        assert!(!cp.should_skip("10.0.0.1", 81).await);
        assert!(!cp.should_skip("10.0.0.2", 80).await);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn last_write_wins() {
        let path = temp_path("lww");
        let cp = Checkpoint::load(&path);
        cp.save("10.0.0.1", 443).await.unwrap();
        cp.save("10.0.0.1", 22).await.unwrap();
        assert!(cp.should_skip("10.0.0.1", 22).await);
        assert!(!cp.should_skip("10.0.0.1", 443).await);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn survives_reload() {
        let path = temp_path("reload");
        {
            let cp = Checkpoint::load(&path);
            cp.save("192.0.2.1", 8080).await.unwrap();
        }
        let cp = Checkpoint::load(&path);
        assert!(cp.should_skip("192.0.2.1", 8080).await);
        assert!(cp.should_skip("192.0.2.1", 21).await);
        assert!(!cp.should_skip("192.0.2.1", 8081).await);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let cp = Checkpoint::load(temp_path("missing"));
        assert!(!cp.should_skip("10.0.0.1", 1).await);
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "not json at all").unwrap();
        let cp = Checkpoint::load(&path);
        assert!(!cp.should_skip("10.0.0.1", 1).await);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn file_is_human_readable_json() {
        let path = temp_path("pretty");
        let cp = Checkpoint::load(&path);
        cp.save("10.0.0.1", 80).await.unwrap();
        let data = std::fs::read_to_string(&path).unwrap();
        assert!(data.contains('\n'));
        let parsed: HashMap<String, u16> = serde_json::from_str(&data).unwrap();
        assert_eq!(parsed.get("10.0.0.1"), Some(&80));
        assert!(Path::new(&path).exists());
        std::fs::remove_file(&path).ok();
    }
}
