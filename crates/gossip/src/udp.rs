//! UDP peer transport
//!
//! One socket serves both directions: [`UdpGossip::publish`] fans the encoded
//! report out to every configured peer, and the receive loop decodes inbound
//! datagrams onto a delivery channel. Peers are symmetric - every instance
//! lists every other instance (or a shared broadcast address) and nobody is
//! special.
//!
//! Sending is best-effort: an unreachable peer is logged and skipped, never
//! an error. Collective throttling degrades to local throttling when gossip
//! is lost, which is the permissive failure mode this service wants.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::net::{UdpSocket, lookup_host};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dthrottle_engine::Report;

use crate::codec::{self, Delivery, MAX_DATAGRAM};
use crate::error::{GossipError, Result};

/// Delivery channel depth; inbound reports are small and drained quickly.
const DELIVERY_QUEUE: usize = 64;

/// Gossip transport configuration
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Bind address (e.g. "0.0.0.0")
    pub bind: String,

    /// UDP port to bind; 0 lets the OS pick (used by tests)
    pub port: u16,

    /// Peer addresses ("host:port") to publish reports to
    pub peers: Vec<String>,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 6970,
            peers: Vec::new(),
        }
    }
}

impl GossipConfig {
    /// Get the socket address to bind to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// UDP publish/deliver transport for throttle reports.
pub struct UdpGossip {
    socket: Arc<UdpSocket>,
    peers: Vec<SocketAddr>,
    instance_id: u64,
}

impl UdpGossip {
    /// Bind the gossip socket and resolve the peer list.
    ///
    /// Peers that fail to resolve are logged and dropped; only the bind
    /// itself is fatal.
    pub async fn bind(config: &GossipConfig) -> Result<Self> {
        let address = config.bind_address();
        let socket = UdpSocket::bind(&address)
            .await
            .map_err(|e| GossipError::Bind {
                address: address.clone(),
                source: e,
            })?;

        let mut peers = Vec::with_capacity(config.peers.len());
        for peer in &config.peers {
            match lookup_host(peer.as_str()).await {
                Ok(mut addrs) => match addrs.next() {
                    Some(addr) => peers.push(addr),
                    None => tracing::warn!(peer, "peer resolved to no addresses, dropping"),
                },
                Err(e) => tracing::warn!(peer, error = %e, "cannot resolve peer, dropping"),
            }
        }

        let instance_id = generate_instance_id();
        tracing::info!(
            address = %address,
            peers = peers.len(),
            instance_id,
            "gossip socket bound"
        );

        Ok(Self {
            socket: Arc::new(socket),
            peers,
            instance_id,
        })
    }

    /// The id stamped on every datagram this instance publishes.
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    #[cfg(test)]
    pub(crate) fn add_peer(&mut self, addr: SocketAddr) {
        self.peers.push(addr);
    }

    /// Address the gossip socket actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Publish a report to every peer under `subject`.
    ///
    /// Per-peer send failures are logged and skipped.
    pub async fn publish(&self, subject: &str, report: &Report) -> Result<()> {
        let datagrams = codec::encode_report(subject, self.instance_id, report);

        for datagram in &datagrams {
            for peer in &self.peers {
                if let Err(e) = self.send_datagram(datagram, peer).await {
                    tracing::warn!(peer = %peer, error = %e, "gossip send failed");
                }
            }
        }

        tracing::debug!(
            subject,
            entries = report.len(),
            datagrams = datagrams.len(),
            peers = self.peers.len(),
            "report published"
        );
        Ok(())
    }

    async fn send_datagram(&self, datagram: &Bytes, peer: &SocketAddr) -> Result<()> {
        self.socket.send_to(datagram, peer).await?;
        Ok(())
    }

    /// Spawn the receive loop and return the delivery channel.
    ///
    /// The loop decodes each inbound datagram, flags deliveries originating
    /// from this instance, and stops when `cancel` fires or the consumer
    /// drops the receiver. Malformed datagrams are logged and dropped.
    pub fn spawn_receiver(&self, cancel: CancellationToken) -> mpsc::Receiver<Delivery> {
        let (tx, rx) = mpsc::channel(DELIVERY_QUEUE);
        let socket = Arc::clone(&self.socket);
        let instance_id = self.instance_id;

        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = socket.recv_from(&mut buf) => match result {
                        Ok((n, from)) => {
                            let datagram = Bytes::copy_from_slice(&buf[..n]);
                            match codec::decode_datagram(datagram, instance_id) {
                                Ok(delivery) => {
                                    tracing::debug!(
                                        peer = %from,
                                        entries = delivery.report.len(),
                                        local = delivery.local,
                                        "report received"
                                    );
                                    if tx.send(delivery).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    tracing::debug!(peer = %from, error = %e, "dropping malformed datagram");
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "gossip receive error");
                        }
                    }
                }
            }
            tracing::debug!("gossip receiver stopped");
        });

        rx
    }
}

/// A process-unique id, stable for the process lifetime.
///
/// Uniqueness only needs to hold within one peer group at one time; clock
/// nanos mixed with the pid is plenty.
fn generate_instance_id() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    nanos ^ (u64::from(std::process::id()) << 32)
}

#[cfg(test)]
#[path = "udp_test.rs"]
mod tests;
