// crates/atoll-p2p/src/fanout.rs
//
// Broadcast fanout: concurrent delivery of one message to many peers
// with per-peer retry and exponential backoff.
//
// Per-peer failures are collected, never fatal to the batch, and a
// round's report never blocks subsequent broadcasts.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use uuid::Uuid;

use atoll_core::{AtollError, BroadcastEnvelope, PeerRecord};

/// Configuration for broadcast fanout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Send attempts per peer before it is marked failed for the round.
    pub attempts: u32,
    /// Base backoff delay; doubles after each failed attempt.
    pub backoff: Duration,
    /// Deadline for one connect-and-send attempt.
    pub send_timeout: Duration,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(250),
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of one broadcast round, consumed by the monitoring side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub round_id: Uuid,
    /// Identities of peers the message reached.
    pub delivered: Vec<String>,
    /// Identities of peers that failed every attempt.
    pub failed: Vec<String>,
    pub elapsed: Duration,
}

impl BroadcastReport {
    /// Fraction of the peer set reached, in [0, 1].
    pub fn delivery_ratio(&self) -> f64 {
        let total = self.delivered.len() + self.failed.len();
        if total == 0 {
            return 1.0;
        }
        self.delivered.len() as f64 / total as f64
    }
}

/// Send an envelope to every peer in the set concurrently.
///
/// Each peer gets `config.attempts` tries with exponentially growing
/// backoff between them; the round completes when every peer has
/// either been delivered to or exhausted its attempts.
pub async fn broadcast(
    config: &FanoutConfig,
    envelope: &BroadcastEnvelope,
    peers: &[PeerRecord],
) -> BroadcastReport {
    let round_id = Uuid::now_v7();
    let started = std::time::Instant::now();

    let mut payload = match serde_json::to_vec(envelope) {
        Ok(bytes) => bytes,
        Err(e) => {
            // An unserializable envelope fails the whole round before
            // any socket is touched.
            tracing::warn!("Fanout {}: cannot serialize envelope: {}", round_id, e);
            return BroadcastReport {
                round_id,
                delivered: Vec::new(),
                failed: peers.iter().map(|p| p.identity.clone()).collect(),
                elapsed: started.elapsed(),
            };
        }
    };
    payload.push(b'\n');

    tracing::debug!(
        "Fanout {}: broadcasting {:?} to {} peers",
        round_id,
        envelope.kind,
        peers.len()
    );

    let mut handles = Vec::with_capacity(peers.len());
    for peer in peers {
        let config = config.clone();
        let payload = payload.clone();
        let peer = peer.clone();
        handles.push(tokio::spawn(async move {
            let delivered = send_with_retry(&config, &peer, &payload).await;
            (peer.identity, delivered)
        }));
    }

    let mut delivered = Vec::new();
    let mut failed = Vec::new();
    for handle in handles {
        match handle.await {
            Ok((identity, true)) => delivered.push(identity),
            Ok((identity, false)) => failed.push(identity),
            Err(e) => tracing::warn!("Fanout {}: send task panicked: {}", round_id, e),
        }
    }

    let report = BroadcastReport {
        round_id,
        delivered,
        failed,
        elapsed: started.elapsed(),
    };
    tracing::debug!(
        "Fanout {}: {}/{} peers reached in {:?}",
        round_id,
        report.delivered.len(),
        report.delivered.len() + report.failed.len(),
        report.elapsed
    );
    report
}

/// Attempt delivery to one peer, retrying with exponential backoff.
async fn send_with_retry(config: &FanoutConfig, peer: &PeerRecord, payload: &[u8]) -> bool {
    let attempts = config.attempts.max(1);
    for attempt in 0..attempts {
        match send_once(config, peer, payload).await {
            Ok(()) => {
                tracing::trace!("Fanout: delivered to {}", peer.identity);
                return true;
            }
            Err(e) => {
                tracing::debug!(
                    "Fanout: attempt {}/{} to {} failed: {}",
                    attempt + 1,
                    attempts,
                    peer.identity,
                    e
                );
                if attempt + 1 < attempts {
                    tokio::time::sleep(config.backoff * 2u32.saturating_pow(attempt)).await;
                }
            }
        }
    }
    tracing::warn!(
        "Fanout: {} marked failed after {} attempts",
        peer.identity,
        attempts
    );
    false
}

/// One connect-and-send attempt under the configured deadline.
async fn send_once(
    config: &FanoutConfig,
    peer: &PeerRecord,
    payload: &[u8],
) -> Result<(), AtollError> {
    let target = (peer.address.host.as_str(), peer.address.port);
    let attempt = async {
        let mut stream = TcpStream::connect(target).await?;
        stream.write_all(payload).await?;
        stream.flush().await?;
        Ok::<(), std::io::Error>(())
    };
    match timeout(config.send_timeout, attempt).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(AtollError::Network(e.to_string())),
        Err(_) => Err(AtollError::Timeout(format!(
            "send to {} exceeded {:?}",
            peer.address, config.send_timeout
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atoll_core::{EnvelopeKind, PeerAddress};
    use chrono::Utc;
    use std::collections::HashMap;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn envelope() -> BroadcastEnvelope {
        BroadcastEnvelope {
            kind: EnvelopeKind::AdmissionUpdate,
            payload: serde_json::json!({"decision": "accept", "identity": "peer-x"}),
            origin: "node-local".to_string(),
            sequence: Some(7),
        }
    }

    fn record(identity: &str, port: u16) -> PeerRecord {
        PeerRecord {
            identity: identity.to_string(),
            address: PeerAddress {
                host: "127.0.0.1".to_string(),
                port,
            },
            last_seen: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    fn quick_config() -> FanoutConfig {
        FanoutConfig {
            attempts: 2,
            backoff: Duration::from_millis(10),
            send_timeout: Duration::from_millis(500),
        }
    }

    /// Accept connections and drain them so sends complete.
    async fn sink_listener() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if let Ok((mut stream, _)) = listener.accept().await {
                    tokio::spawn(async move {
                        let mut buf = Vec::new();
                        let _ = stream.read_to_end(&mut buf).await;
                    });
                }
            }
        });
        port
    }

    async fn dead_port() -> u16 {
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);
        port
    }

    #[tokio::test]
    async fn delivers_to_reachable_peers() {
        let port = sink_listener().await;
        let peers = vec![record("peer-a", port), record("peer-b", port)];

        let report = broadcast(&quick_config(), &envelope(), &peers).await;
        assert_eq!(report.delivered.len(), 2);
        assert!(report.failed.is_empty());
        assert!((report.delivery_ratio() - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn partial_failure_is_collected_not_fatal() {
        let live = sink_listener().await;
        let dead = dead_port().await;
        let peers = vec![record("peer-live", live), record("peer-dead", dead)];

        let report = broadcast(&quick_config(), &envelope(), &peers).await;
        assert_eq!(report.delivered, vec!["peer-live".to_string()]);
        assert_eq!(report.failed, vec!["peer-dead".to_string()]);
        assert!((report.delivery_ratio() - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn empty_peer_set_reports_clean_round() {
        let report = broadcast(&quick_config(), &envelope(), &[]).await;
        assert!(report.delivered.is_empty());
        assert!(report.failed.is_empty());
        assert!((report.delivery_ratio() - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn failing_peer_exhausts_all_attempts() {
        let dead = dead_port().await;
        let config = FanoutConfig {
            attempts: 3,
            backoff: Duration::from_millis(5),
            send_timeout: Duration::from_millis(200),
        };
        let started = std::time::Instant::now();
        let report = broadcast(&config, &envelope(), &[record("peer-dead", dead)]).await;
        assert_eq!(report.failed.len(), 1);
        // Two backoff sleeps (5ms, 10ms) must have elapsed.
        assert!(started.elapsed() >= Duration::from_millis(15));
    }
}
