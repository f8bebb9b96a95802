//! The IPC transport collaborator (spec §1, §6.1): framing, authentication
//! and serialization are explicitly out of scope for the core, but the
//! dispatcher still needs *a* typed, ordered, per-peer channel to drive.
//! This defines that boundary as a trait plus two implementations: a real
//! one over a length-prefixed bincode stream on a Unix domain socket, and
//! an in-process mock used by the dispatcher's own tests and by the seed
//! scenario integration tests (spec §8).
//!
//! Grounded in the teacher's `launcher-client` (bincode-over-channel typed
//! messages) generalized from a single fixed peer to the many-peer,
//! many-connection shape this spec's dispatcher needs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fabric_protocol::{Notification, Request};
use futures::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use fabric_protocol::Reply;

/// Identifies one live connection, independent of whatever requester-id
/// (if any) later registers over it.
pub type ConnectionId = u64;

/// One inbound request plus the means to answer it. The reply channel is
/// a one-shot because a request's reply is produced on operation
/// completion, not on dispatch (spec §4.6).
pub struct Inbound {
    pub connection: ConnectionId,
    pub request: Request,
    pub reply: oneshot::Sender<Reply>,
}

/// What the dispatcher needs from the transport: pull inbound requests,
/// learn which connection a requester registered over, and push
/// notifications addressed to a requester (or broadcast node-wide ones).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn recv(&self) -> Option<Inbound>;

    /// Bind a requester-id to the connection it registered over, so later
    /// notifications addressed to that requester-id know where to go.
    async fn associate(&self, connection: ConnectionId, peer_id: String);

    async fn forget(&self, peer_id: &str);

    async fn notify(&self, peer_id: &str, notification: Notification);

    /// Node-wide notifications (`NodeEnabled`/`NodeDisabled`) have no
    /// single addressee; broadcast to every associated peer.
    async fn broadcast(&self, notification: Notification);
}

// --- in-process mock, for dispatcher unit tests and seed scenarios ---

/// An in-process double: `submit` plays the role of "a peer sent a
/// request", returning the eventual `Reply`; `notifications_for` lets a
/// test assert what was published to a given peer.
pub struct MockTransport {
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    next_connection: AtomicU64,
    peers: Mutex<HashMap<String, ConnectionId>>,
    published: Mutex<Vec<(String, Notification)>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        MockTransport {
            inbound_tx: tx,
            inbound_rx: Mutex::new(rx),
            next_connection: AtomicU64::new(1),
            peers: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a peer connection sending `request`; resolves once the
    /// dispatcher answers it.
    pub async fn submit(&self, request: Request) -> Reply {
        self.submit_on(self.next_connection.fetch_add(1, Ordering::SeqCst), request).await
    }

    /// Same as `submit`, but on a caller-chosen connection id so a test
    /// can send several requests from "the same peer".
    pub async fn submit_on(&self, connection: ConnectionId, request: Request) -> Reply {
        let (tx, rx) = oneshot::channel();
        self.inbound_tx
            .send(Inbound { connection, request, reply: tx })
            .expect("dispatcher task is not running");
        rx.await.expect("dispatcher dropped the reply channel")
    }

    pub async fn notifications_for(&self, peer_id: &str) -> Vec<Notification> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|(target, _)| target == peer_id)
            .map(|(_, n)| n.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn recv(&self) -> Option<Inbound> {
        self.inbound_rx.lock().await.recv().await
    }

    async fn associate(&self, connection: ConnectionId, peer_id: String) {
        self.peers.lock().await.insert(peer_id, connection);
    }

    async fn forget(&self, peer_id: &str) {
        self.peers.lock().await.remove(peer_id);
    }

    async fn notify(&self, peer_id: &str, notification: Notification) {
        self.published.lock().await.push((peer_id.to_string(), notification));
    }

    async fn broadcast(&self, notification: Notification) {
        let peers: Vec<String> = self.peers.lock().await.keys().cloned().collect();
        let mut published = self.published.lock().await;
        for peer in peers {
            published.push((peer, notification.clone()));
        }
    }
}

// --- real transport: length-prefixed bincode over a unix domain socket ---

type WireFramed = Framed<UnixStream, LengthDelimitedCodec>;

enum OutboundMessage {
    Reply(Reply),
    Notification(Notification),
}

/// One accepted connection's write half, so `notify`/`broadcast` can push
/// a frame without racing the read loop over the same socket.
struct PeerHandle {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
}

pub struct UnixSocketTransport {
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    next_connection: AtomicU64,
    connections: Arc<Mutex<HashMap<ConnectionId, PeerHandle>>>,
    peers: Arc<Mutex<HashMap<String, ConnectionId>>>,
}

impl UnixSocketTransport {
    /// Binds and starts listening immediately, so late-binding clients
    /// that connect before `Host::open` finishes driving its other
    /// subcomponents are still accepted (spec §4.8).
    pub async fn bind(path: &std::path::Path) -> std::io::Result<Arc<Self>> {
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(UnixSocketTransport {
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            next_connection: AtomicU64::new(1),
            connections: Arc::new(Mutex::new(HashMap::new())),
            peers: Arc::new(Mutex::new(HashMap::new())),
        });
        let accepting = Arc::clone(&transport);
        tokio::spawn(async move { accepting.accept_loop(listener).await });
        Ok(transport)
    }

    async fn accept_loop(self: Arc<Self>, listener: UnixListener) {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let connection = self.next_connection.fetch_add(1, Ordering::SeqCst);
                    let this = Arc::clone(&self);
                    tokio::spawn(async move { this.serve_connection(connection, stream).await });
                }
                Err(err) => {
                    log::warn!("error accepting IPC connection: {}", err);
                    return;
                }
            }
        }
    }

    async fn serve_connection(self: Arc<Self>, connection: ConnectionId, stream: UnixStream) {
        let framed: WireFramed = Framed::new(stream, LengthDelimitedCodec::new());
        let (mut write_half, mut read_half) = framed.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundMessage>();
        self.connections.lock().await.insert(connection, PeerHandle { outbound: outbound_tx });

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let bytes = match msg {
                    OutboundMessage::Reply(r) => fabric_protocol::encode(&r),
                    OutboundMessage::Notification(n) => fabric_protocol::encode(&n),
                };
                match bytes {
                    Ok(bytes) => {
                        if write_half.send(bytes.into()).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => log::warn!("failed to encode outbound message: {}", err),
                }
            }
        });

        while let Some(frame) = read_half.next().await {
            let frame = match frame {
                Ok(f) => f,
                Err(err) => {
                    log::warn!("IPC read error on connection {}: {}", connection, err);
                    break;
                }
            };
            let request: Request = match fabric_protocol::decode(&frame) {
                Ok(r) => r,
                Err(err) => {
                    log::warn!("failed to decode inbound request: {}", err);
                    continue;
                }
            };
            let (reply_tx, reply_rx) = oneshot::channel();
            if self.inbound_tx.send(Inbound { connection, request, reply: reply_tx }).is_err() {
                break;
            }
            let connections = Arc::clone(&self.connections);
            tokio::spawn(async move {
                if let Ok(reply) = reply_rx.await {
                    if let Some(peer) = connections.lock().await.get(&connection) {
                        let _ = peer.outbound.send(OutboundMessage::Reply(reply));
                    }
                }
            });
        }

        writer.abort();
        self.connections.lock().await.remove(&connection);
    }
}

#[async_trait]
impl Transport for UnixSocketTransport {
    async fn recv(&self) -> Option<Inbound> {
        self.inbound_rx.lock().await.recv().await
    }

    async fn associate(&self, connection: ConnectionId, peer_id: String) {
        self.peers.lock().await.insert(peer_id, connection);
    }

    async fn forget(&self, peer_id: &str) {
        self.peers.lock().await.remove(peer_id);
    }

    async fn notify(&self, peer_id: &str, notification: Notification) {
        let connection = self.peers.lock().await.get(peer_id).copied();
        if let Some(connection) = connection {
            if let Some(peer) = self.connections.lock().await.get(&connection) {
                let _ = peer.outbound.send(OutboundMessage::Notification(notification));
            }
        }
    }

    async fn broadcast(&self, notification: Notification) {
        let connections: Vec<ConnectionId> = self.peers.lock().await.values().copied().collect();
        let live = self.connections.lock().await;
        for connection in connections {
            if let Some(peer) = live.get(&connection) {
                let _ = peer.outbound.send(OutboundMessage::Notification(notification.clone()));
            }
        }
    }
}
