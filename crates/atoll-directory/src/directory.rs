// crates/atoll-directory/src/directory.rs
//
// PeerDirectory: concurrent map of known peers keyed by identity.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;

use atoll_core::{PeerAddress, PeerRecord};

/// Concurrent map of known peers with liveness metadata.
///
/// Reads may come from any number of callers; writes take the map lock
/// exclusively. The directory is explicitly constructed and passed to
/// each component at construction time; there is no ambient singleton.
#[derive(Debug, Clone)]
pub struct PeerDirectory {
    peers: Arc<RwLock<HashMap<String, PeerRecord>>>,
}

impl PeerDirectory {
    /// Create a new, empty directory.
    pub fn new() -> Self {
        Self {
            peers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a peer or refresh an existing entry.
    ///
    /// Refreshing updates the address, metadata, and last-seen timestamp.
    /// Returns `true` if the identity was newly added.
    pub async fn upsert(&self, record: PeerRecord) -> bool {
        let mut peers = self.peers.write().await;
        match peers.get_mut(&record.identity) {
            Some(existing) => {
                existing.address = record.address;
                existing.metadata = record.metadata;
                existing.last_seen = record.last_seen;
                false
            }
            None => {
                tracing::info!(
                    "Directory: new peer {} at {}",
                    record.identity,
                    record.address
                );
                peers.insert(record.identity.clone(), record);
                true
            }
        }
    }

    /// Look up a peer by identity.
    pub async fn get(&self, identity: &str) -> Option<PeerRecord> {
        let peers = self.peers.read().await;
        peers.get(identity).cloned()
    }

    /// True if the identity is currently known.
    pub async fn contains(&self, identity: &str) -> bool {
        let peers = self.peers.read().await;
        peers.contains_key(identity)
    }

    /// True when the identity is already present under a different address.
    pub async fn address_conflict(&self, identity: &str, address: &PeerAddress) -> bool {
        let peers = self.peers.read().await;
        peers
            .get(identity)
            .map(|existing| existing.address != *address)
            .unwrap_or(false)
    }

    /// Number of peers currently tracked.
    pub async fn len(&self) -> usize {
        let peers = self.peers.read().await;
        peers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Cloned snapshot of every entry, for fanout and export.
    pub async fn snapshot(&self) -> Vec<PeerRecord> {
        let peers = self.peers.read().await;
        peers.values().cloned().collect()
    }

    /// Evict peers not heard from within the silence window.
    ///
    /// This is the only path that removes entries. Returns the evicted
    /// identities.
    pub async fn sweep(&self, silence_window: Duration) -> Vec<String> {
        let window = match chrono::Duration::from_std(silence_window) {
            Ok(window) => window,
            // A window too large to represent evicts nothing.
            Err(_) => return Vec::new(),
        };
        let cutoff = match Utc::now().checked_sub_signed(window) {
            Some(cutoff) => cutoff,
            None => return Vec::new(),
        };

        let mut peers = self.peers.write().await;
        let stale: Vec<String> = peers
            .values()
            .filter(|p| p.last_seen < cutoff)
            .map(|p| p.identity.clone())
            .collect();

        for identity in &stale {
            peers.remove(identity);
        }

        if !stale.is_empty() {
            tracing::info!("Directory: evicted {} silent peers", stale.len());
        }
        stale
    }
}

impl Default for PeerDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn record(identity: &str, host: &str, port: u16) -> PeerRecord {
        PeerRecord {
            identity: identity.to_string(),
            address: PeerAddress {
                host: host.to_string(),
                port,
            },
            last_seen: Utc::now(),
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn upsert_inserts_then_refreshes() {
        let dir = PeerDirectory::new();
        assert!(dir.upsert(record("peer-a", "10.0.0.1", 9000)).await);
        assert!(!dir.upsert(record("peer-a", "10.0.0.1", 9000)).await);
        assert_eq!(dir.len().await, 1);
    }

    #[tokio::test]
    async fn refresh_updates_address_and_last_seen() {
        let dir = PeerDirectory::new();
        let mut old = record("peer-a", "10.0.0.1", 9000);
        old.last_seen = Utc::now() - chrono::Duration::seconds(120);
        dir.upsert(old).await;

        dir.upsert(record("peer-a", "10.0.0.2", 9001)).await;
        let current = dir.get("peer-a").await.unwrap();
        assert_eq!(current.address.host, "10.0.0.2");
        assert!(current.last_seen > Utc::now() - chrono::Duration::seconds(5));
    }

    #[tokio::test]
    async fn conflict_detected_for_same_identity_different_address() {
        let dir = PeerDirectory::new();
        dir.upsert(record("peer-a", "10.0.0.1", 9000)).await;

        let same = PeerAddress {
            host: "10.0.0.1".to_string(),
            port: 9000,
        };
        let other = PeerAddress {
            host: "10.0.0.9".to_string(),
            port: 9000,
        };
        assert!(!dir.address_conflict("peer-a", &same).await);
        assert!(dir.address_conflict("peer-a", &other).await);
        // Unknown identities never conflict.
        assert!(!dir.address_conflict("peer-z", &other).await);
    }

    #[tokio::test]
    async fn sweep_evicts_only_silent_peers() {
        let dir = PeerDirectory::new();
        let mut silent = record("peer-silent", "10.0.0.1", 9000);
        silent.last_seen = Utc::now() - chrono::Duration::seconds(300);
        dir.upsert(silent).await;
        dir.upsert(record("peer-live", "10.0.0.2", 9001)).await;

        let evicted = dir.sweep(Duration::from_secs(90)).await;
        assert_eq!(evicted, vec!["peer-silent".to_string()]);
        assert!(!dir.contains("peer-silent").await);
        assert!(dir.contains("peer-live").await);
    }

    #[tokio::test]
    async fn snapshot_clones_all_entries() {
        let dir = PeerDirectory::new();
        dir.upsert(record("peer-a", "10.0.0.1", 9000)).await;
        dir.upsert(record("peer-b", "10.0.0.2", 9001)).await;
        let snap = dir.snapshot().await;
        assert_eq!(snap.len(), 2);
    }
}
