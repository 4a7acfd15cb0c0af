//! Live peer membership and broadcast.
//!
//! The registry owns the write half of every connected peer. A single async
//! mutex covers membership changes and the whole broadcast iteration, so
//! broadcasts are serialized with each other and with add/remove. Writes are
//! not timed out: one stalled peer holds up the broadcast in progress.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use tlschat_protocol::{Message, MessageWriter, ProtocolError, ProtocolResult, encode_message};

/// Identity of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

struct Peer<W> {
    id: PeerId,
    addr: SocketAddr,
    writer: MessageWriter<W>,
}

/// A peer that could not be written to during a broadcast.
#[derive(Debug)]
pub struct PeerFailure {
    pub peer: PeerId,
    pub addr: SocketAddr,
    pub error: ProtocolError,
}

/// Outcome of one broadcast.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Number of peers the frame was written to.
    pub delivered: usize,
    /// Peers whose write failed.
    pub failures: Vec<PeerFailure>,
}

/// Ordered set of connections eligible for broadcast.
pub struct PeerRegistry<W> {
    peers: Mutex<Vec<Peer<W>>>,
    next_id: AtomicU64,
}

impl<W> Default for PeerRegistry<W> {
    fn default() -> Self {
        Self {
            peers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> PeerRegistry<W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a connection and returns its identity.
    pub async fn add(&self, addr: SocketAddr, writer: W) -> PeerId {
        let id = PeerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut peers = self.peers.lock().await;
        peers.push(Peer {
            id,
            addr,
            writer: MessageWriter::new(writer),
        });
        debug!(%id, peer = %addr, members = peers.len(), "Peer added");
        id
    }

    /// Removes the connection registered as `id`.
    ///
    /// Returns `false` if it was not (or no longer) registered.
    pub async fn remove(&self, id: PeerId) -> bool {
        let mut peers = self.peers.lock().await;
        match peers.iter().position(|peer| peer.id == id) {
            Some(index) => {
                let peer = peers.remove(index);
                debug!(%id, peer = %peer.addr, members = peers.len(), "Peer removed");
                true
            }
            None => {
                trace!(%id, "Peer already removed");
                false
            }
        }
    }

    /// Writes `message` to every registered peer.
    ///
    /// The message is encoded once. A failed write is recorded in the report
    /// and delivery continues with the next peer.
    pub async fn broadcast(&self, message: &Message) -> ProtocolResult<BroadcastReport> {
        let frame = encode_message(message)?;
        let mut report = BroadcastReport::default();

        let mut peers = self.peers.lock().await;
        for peer in peers.iter_mut() {
            match peer.writer.write_frame(&frame).await {
                Ok(()) => report.delivered += 1,
                Err(error) => report.failures.push(PeerFailure {
                    peer: peer.id,
                    addr: peer.addr,
                    error,
                }),
            }
        }

        trace!(
            delivered = report.delivered,
            failed = report.failures.len(),
            "Broadcast complete"
        );
        Ok(report)
    }

    pub async fn len(&self) -> usize {
        self.peers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.lock().await.is_empty()
    }

    /// Snapshot of registered identities, in registration order.
    pub async fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.lock().await.iter().map(|peer| peer.id).collect()
    }

    /// Snapshot of registered peer addresses, in registration order.
    pub async fn peer_addrs(&self) -> Vec<SocketAddr> {
        self.peers.lock().await.iter().map(|peer| peer.addr).collect()
    }
}
