//! The transport boundary: a trait the Raft core programs against, plus a
//! real UDP implementation and an in-memory one used by tests.
//!
//! The core never opens a socket itself — it only ever calls
//! [`Transport::send`] and [`Transport::recv_timeout`], matching the
//! design's framing of the datagram socket as an external collaborator
//! (§1: "the core consumes a message-send and a bounded-wait message-receive
//! primitive").

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};

use crate::message::{Message, ReplicaId, BROADCAST_ID};
use crate::utils::RaftKvResult;

/// Max UDP datagram size this crate will ever send or accept.
const MAX_DATAGRAM_BYTES: usize = 64 * 1024;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `msg` (its `dst` field says where it's headed; `BROADCAST_ID`
    /// means "every other replica").
    async fn send(&self, msg: &Message) -> RaftKvResult<()>;

    /// Waits up to `timeout` for the next inbound message. `Ok(None)` means
    /// the wait elapsed with nothing received.
    async fn recv_timeout(&self, timeout: Duration) -> RaftKvResult<Option<Message>>;
}

/// Real transport: one UDP socket per replica, talking to a local relay
/// process at `("127.0.0.1", port)` that fans messages out by the `dst`
/// field embedded in the JSON payload (the "local control plane" of §1).
/// The socket binds an OS-assigned ephemeral local port so the relay's
/// replies land back on the same socket.
pub struct UdpTransport {
    socket: UdpSocket,
    relay_addr: SocketAddr,
}

impl UdpTransport {
    /// Binds a fresh ephemeral local socket and remembers the relay address
    /// to send to, `("127.0.0.1", port)`.
    pub async fn bind(port: u16) -> RaftKvResult<Self> {
        let socket = UdpSocket::bind(("127.0.0.1", 0)).await?;
        let relay_addr: SocketAddr = (std::net::Ipv4Addr::LOCALHOST, port).into();
        Ok(UdpTransport { socket, relay_addr })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, msg: &Message) -> RaftKvResult<()> {
        let json = msg.to_json()?;
        self.socket.send_to(json.as_bytes(), self.relay_addr).await?;
        Ok(())
    }

    async fn recv_timeout(&self, timeout: Duration) -> RaftKvResult<Option<Message>> {
        let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
        match tokio::time::timeout(timeout, self.socket.recv(&mut buf)).await {
            Err(_elapsed) => Ok(None),
            Ok(Err(io_err)) => Err(io_err.into()),
            Ok(Ok(n)) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                match Message::from_json(&text) {
                    Ok(msg) => Ok(Some(msg)),
                    Err(e) => {
                        crate::pf_warn!("dropping malformed datagram: {}", e);
                        Ok(None)
                    }
                }
            }
        }
    }
}

/// In-memory transport backed by per-replica channels, for deterministic
/// tests that simulate a whole cluster in one process without touching a
/// real socket.
pub struct ChannelTransport {
    id: ReplicaId,
    peers: HashMap<ReplicaId, mpsc::UnboundedSender<Message>>,
    all_ids: Vec<ReplicaId>,
    inbox: Mutex<mpsc::UnboundedReceiver<Message>>,
}

impl ChannelTransport {
    /// Builds one `ChannelTransport` per id in `ids`, all wired to each
    /// other, returned in the same order as `ids`.
    pub fn cluster(ids: &[ReplicaId]) -> Vec<ChannelTransport> {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for id in ids {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(id.clone(), tx);
            receivers.insert(id.clone(), rx);
        }
        ids.iter()
            .map(|id| ChannelTransport {
                id: id.clone(),
                peers: senders.clone(),
                all_ids: ids.to_vec(),
                inbox: Mutex::new(receivers.remove(id).expect("receiver for id")),
            })
            .collect()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, msg: &Message) -> RaftKvResult<()> {
        if msg.dst == BROADCAST_ID {
            for id in &self.all_ids {
                if *id != self.id {
                    if let Some(tx) = self.peers.get(id) {
                        let _ = tx.send(msg.clone());
                    }
                }
            }
        } else if let Some(tx) = self.peers.get(&msg.dst) {
            let _ = tx.send(msg.clone());
        }
        Ok(())
    }

    async fn recv_timeout(&self, timeout: Duration) -> RaftKvResult<Option<Message>> {
        let mut inbox = self.inbox.lock().await;
        match tokio::time::timeout(timeout, inbox.recv()).await {
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => Ok(None), // all senders dropped
            Err(_elapsed) => Ok(None),
        }
    }
}
