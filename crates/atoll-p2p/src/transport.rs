// crates/atoll-p2p/src/transport.rs
//
// TCP transport for the Atoll overlay.
//
// Owns all stream-level I/O. Every inbound connection is handled in its
// own task: the first message is a handshake carrying the same shape as
// a discovery datagram, so inbound peers are judged by the same
// admission path as discovered peers. Messages are newline-delimited
// JSON.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use atoll_core::{AdmissionJudge, AtollError, HandshakeReply, PeerHello, PeerRecord};
use atoll_directory::PeerDirectory;

/// Configuration for the TCP transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub listen_host: String,
    pub listen_port: u16,
    /// Deadline for outbound connection establishment.
    pub connect_timeout: Duration,
    /// Deadline for reading the handshake from an inbound connection.
    pub handshake_timeout: Duration,
}

/// Accepts inbound connections and dials outbound ones.
pub struct Transport {
    identity: String,
    config: TransportConfig,
    directory: PeerDirectory,
    judge: Arc<dyn AdmissionJudge>,
}

impl Transport {
    pub fn new(
        identity: String,
        config: TransportConfig,
        directory: PeerDirectory,
        judge: Arc<dyn AdmissionJudge>,
    ) -> Self {
        Self {
            identity,
            config,
            directory,
            judge,
        }
    }

    /// Accept inbound connections until the task is cancelled.
    ///
    /// Each connection is served concurrently and independently; no
    /// failure on one connection affects any other.
    pub async fn listen(self: Arc<Self>) -> Result<(), AtollError> {
        let listener =
            TcpListener::bind((self.config.listen_host.as_str(), self.config.listen_port)).await?;
        let local = listener.local_addr()?;
        tracing::info!("Transport: listening on tcp/{}", local);

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Transport: accept error: {}", e);
                    continue;
                }
            };

            let transport = self.clone();
            tokio::spawn(async move {
                if let Err(e) = transport.serve_connection(stream).await {
                    tracing::debug!("Transport: connection from {} ended: {}", addr, e);
                }
            });
        }
    }

    /// Serve one inbound connection: read the handshake, judge the
    /// candidate, reply with the decision.
    async fn serve_connection(&self, stream: TcpStream) -> Result<(), AtollError> {
        let peer_addr = stream.peer_addr()?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut line = String::new();
        let read = timeout(self.config.handshake_timeout, reader.read_line(&mut line)).await;
        let bytes = match read {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(AtollError::Network(e.to_string())),
            Err(_) => {
                return Err(AtollError::Timeout(format!(
                    "handshake read from {} exceeded {:?}",
                    peer_addr, self.config.handshake_timeout
                )))
            }
        };
        if bytes == 0 {
            return Err(AtollError::Network("connection closed before handshake".into()));
        }

        let hello: PeerHello = match serde_json::from_str(line.trim()) {
            Ok(hello) => hello,
            Err(e) => {
                // Malformed handshake: drop with no response.
                tracing::debug!("Transport: malformed handshake from {}: {}", peer_addr, e);
                return Ok(());
            }
        };

        let candidate = hello.into_candidate();
        let identity = candidate.identity.clone();
        let complete = candidate.is_complete();
        let outcome = self.judge.judge(candidate.clone()).await?;

        let reply = HandshakeReply {
            status: if outcome.accepted {
                "accepted".to_string()
            } else {
                "rejected".to_string()
            },
            origin: self.identity.clone(),
            score: outcome.score,
            sequence: outcome.sequence,
        };
        let mut payload = serde_json::to_vec(&reply)?;
        payload.push(b'\n');
        write_half.write_all(&payload).await?;

        if outcome.accepted && complete {
            if let Some(record) = candidate.into_record(Utc::now()) {
                self.directory.upsert(record).await;
            }
            // Reply delivered: the handshake succeeded and the peer
            // becomes active.
            self.judge.confirm(&identity).await;
        }
        Ok(())
    }

    /// Open an outbound connection with a bounded timeout.
    ///
    /// Never retried here; retry policy lives in the caller.
    pub async fn connect(&self, record: &PeerRecord) -> Result<TcpStream, AtollError> {
        let target = (record.address.host.as_str(), record.address.port);
        match timeout(self.config.connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(AtollError::Network(format!(
                "connect to {} failed: {}",
                record.address, e
            ))),
            Err(_) => Err(AtollError::Timeout(format!(
                "connect to {} exceeded {:?}",
                record.address, self.config.connect_timeout
            ))),
        }
    }

    /// Dial a peer, present our handshake, and read the decision.
    pub async fn dial(
        &self,
        record: &PeerRecord,
        hello: &PeerHello,
    ) -> Result<HandshakeReply, AtollError> {
        let stream = self.connect(record).await?;
        let (read_half, mut write_half) = stream.into_split();

        let mut payload = serde_json::to_vec(hello)?;
        payload.push(b'\n');
        write_half.write_all(&payload).await?;

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        let read = timeout(self.config.handshake_timeout, reader.read_line(&mut line)).await;
        match read {
            Ok(Ok(0)) => Err(AtollError::Network(format!(
                "{} closed without a handshake reply",
                record.address
            ))),
            Ok(Ok(_)) => Ok(serde_json::from_str(line.trim())?),
            Ok(Err(e)) => Err(AtollError::Network(e.to_string())),
            Err(_) => Err(AtollError::Timeout(format!(
                "handshake reply from {} exceeded {:?}",
                record.address, self.config.handshake_timeout
            ))),
        }
    }
}
