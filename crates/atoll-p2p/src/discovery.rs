// crates/atoll-p2p/src/discovery.rs
//
// UDP broadcast peer discovery for the Atoll overlay.
//
// Periodically announces local presence on an unreliable broadcast
// channel and ingests announcements from others into the peer
// directory. Malformed datagrams are dropped silently; no response is
// ever generated to an unauthenticated sender.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

use atoll_core::{AtollError, PeerAddress, PeerHello, PeerRecord};
use atoll_directory::PeerDirectory;

/// Maximum accepted discovery datagram size.
const MAX_DATAGRAM: usize = 2048;

/// Callback invoked for every freshly upserted peer, so the admission
/// engine may pre-score it.
pub type DiscoveryCallback = Arc<dyn Fn(PeerRecord) + Send + Sync>;

/// Configuration for peer discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// UDP port announcements are broadcast on.
    pub port: u16,
    /// Interval between announcements; the sweep runs on the same tick.
    pub announce_interval: Duration,
    /// Peers silent for longer than this are evicted by the sweep.
    pub silence_window: Duration,
}

/// Maintains network presence visibility without a central directory.
pub struct DiscoveryListener {
    identity: String,
    /// Address advertised in our own announcements.
    advertised: PeerAddress,
    metadata: HashMap<String, String>,
    config: DiscoveryConfig,
    directory: PeerDirectory,
    callback: Option<DiscoveryCallback>,
}

impl DiscoveryListener {
    pub fn new(
        identity: String,
        advertised: PeerAddress,
        metadata: HashMap<String, String>,
        config: DiscoveryConfig,
        directory: PeerDirectory,
    ) -> Self {
        Self {
            identity,
            advertised,
            metadata,
            config,
            directory,
            callback: None,
        }
    }

    /// Register a callback invoked for every ingested announcement.
    pub fn with_callback(mut self, callback: DiscoveryCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Broadcast one announcement datagram.
    pub async fn announce_once(&self, socket: &UdpSocket) -> Result<(), AtollError> {
        let hello = PeerHello {
            identity: Some(self.identity.clone()),
            address: Some(self.advertised.clone()),
            timestamp: Some(Utc::now().timestamp()),
            metadata: self.metadata.clone(),
        };
        let payload = serde_json::to_vec(&hello)?;
        socket
            .send_to(&payload, ("255.255.255.255", self.config.port))
            .await?;
        Ok(())
    }

    /// Run the announce + sweep loop.
    ///
    /// A failed announcement (e.g. no broadcast-capable interface) is
    /// logged and retried on the next tick, never fatal.
    pub async fn run_announcer(self: Arc<Self>) -> Result<(), AtollError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;

        let mut interval = tokio::time::interval(self.config.announce_interval);
        loop {
            interval.tick().await;

            if let Err(e) = self.announce_once(&socket).await {
                tracing::warn!("Discovery: announce failed, retrying next tick: {}", e);
            } else {
                tracing::trace!("Discovery: presence announced");
            }

            let evicted = self.directory.sweep(self.config.silence_window).await;
            for identity in evicted {
                tracing::debug!("Discovery: evicted silent peer {}", identity);
            }
        }
    }

    /// Run the announcement listener loop.
    pub async fn run_listener(self: Arc<Self>) -> Result<(), AtollError> {
        let socket = UdpSocket::bind(("0.0.0.0", self.config.port)).await?;
        socket.set_broadcast(true)?;
        tracing::info!("Discovery: listening on udp/{}", self.config.port);

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, addr) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!("Discovery: receive error: {}", e);
                    continue;
                }
            };
            self.handle_datagram(&buf[..len], &addr.ip().to_string()).await;
        }
    }

    /// Ingest one inbound datagram.
    ///
    /// Structurally valid announcements upsert the directory and fire
    /// the registered callback; everything else is dropped at debug
    /// level with no response.
    pub async fn handle_datagram(&self, data: &[u8], source: &str) {
        let hello: PeerHello = match serde_json::from_slice(data) {
            Ok(hello) => hello,
            Err(e) => {
                tracing::debug!("Discovery: dropped malformed datagram from {}: {}", source, e);
                return;
            }
        };

        if !hello.is_well_formed() {
            tracing::debug!("Discovery: dropped incomplete datagram from {}", source);
            return;
        }

        let identity = hello.identity.clone().unwrap_or_default();
        if identity == self.identity {
            // Our own broadcast echoed back.
            return;
        }

        let record = match hello.into_candidate().into_record(Utc::now()) {
            Some(record) => record,
            None => return,
        };

        let newly_added = self.directory.upsert(record.clone()).await;
        if newly_added {
            tracing::info!(
                "Discovery: peer {} announced from {} ({})",
                record.identity,
                source,
                record.address
            );
        }

        if let Some(callback) = &self.callback {
            callback(record);
        }
    }
}
