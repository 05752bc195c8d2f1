//! Connection hub: the single coordinator for membership and fan-out.
//!
//! All membership changes and broadcasts are funneled through three
//! channels into one loop that owns the membership map exclusively, so
//! register, unregister and broadcast never race with each other.

use crate::error::RealtimeError;
use crate::protocol;
use murmur_storage::{Message, MessageStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Default number of serialized frames buffered per connection.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Default capacity of each hub input channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Unique identifier for a registered connection.
pub type ConnectionId = String;

/// A serialized outbound frame, shared by every recipient of a broadcast.
pub type OutboundFrame = Arc<str>;

/// Receiving end of a connection's outbound queue.
///
/// The hub holds the only sender; the queue closes when the hub drops the
/// connection.
pub type OutboundReceiver = mpsc::Receiver<OutboundFrame>;

/// Hub tuning.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Frames buffered per connection before it is considered stalled and
    /// evicted.
    pub outbound_capacity: usize,
    /// Capacity of the register, unregister and broadcast channels.
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Current number of connections.
    pub current_connections: usize,
    /// Total connections registered since start.
    pub total_connections: u64,
    /// Total messages persisted and fanned out since start.
    pub total_messages: u64,
    /// Connections evicted because their queue was full.
    pub total_evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    current_connections: AtomicUsize,
    total_connections: AtomicU64,
    total_messages: AtomicU64,
    total_evictions: AtomicU64,
}

struct Registration {
    id: ConnectionId,
    sender: String,
    outbound: mpsc::Sender<OutboundFrame>,
    registered: oneshot::Sender<()>,
}

struct Unregistration {
    id: ConnectionId,
    unregistered: oneshot::Sender<()>,
}

struct BroadcastRequest {
    sender: String,
    content: String,
    reply: oneshot::Sender<Result<Message, RealtimeError>>,
}

struct Member {
    sender: String,
    outbound: mpsc::Sender<OutboundFrame>,
}

/// Handle to a running hub. Cheap to clone.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::Sender<Unregistration>,
    broadcast_tx: mpsc::Sender<BroadcastRequest>,
    counters: Arc<Counters>,
    outbound_capacity: usize,
}

impl std::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubHandle")
            .field("clients", &self.client_count())
            .field("outbound_capacity", &self.outbound_capacity)
            .finish()
    }
}

impl HubHandle {
    /// Registers a new connection labelled `sender`.
    ///
    /// Returns once the hub has added the connection to its membership, so a
    /// broadcast issued afterwards is delivered to it.
    pub async fn register(
        &self,
        sender: impl Into<String>,
    ) -> Result<(ConnectionId, OutboundReceiver), RealtimeError> {
        let id = uuid::Uuid::new_v4().to_string();
        let (outbound, receiver) = mpsc::channel(self.outbound_capacity);
        let (registered, ack) = oneshot::channel();

        self.register_tx
            .send(Registration {
                id: id.clone(),
                sender: sender.into(),
                outbound,
                registered,
            })
            .await
            .map_err(|_| RealtimeError::HubClosed)?;
        ack.await.map_err(|_| RealtimeError::HubClosed)?;

        Ok((id, receiver))
    }

    /// Removes a connection and closes its outbound queue. A no-op if the
    /// connection is already gone.
    ///
    /// Returns once the hub has dropped the connection, so a broadcast issued
    /// afterwards no longer reaches it.
    pub async fn unregister(&self, id: &str) -> Result<(), RealtimeError> {
        let (unregistered, ack) = oneshot::channel();

        self.unregister_tx
            .send(Unregistration {
                id: id.to_string(),
                unregistered,
            })
            .await
            .map_err(|_| RealtimeError::HubClosed)?;
        ack.await.map_err(|_| RealtimeError::HubClosed)
    }

    /// Persists a new message and fans it out to every registered connection.
    ///
    /// A storage failure is returned to the caller and nothing is delivered.
    pub async fn broadcast(
        &self,
        sender: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Message, RealtimeError> {
        let (reply, response) = oneshot::channel();

        self.broadcast_tx
            .send(BroadcastRequest {
                sender: sender.into(),
                content: content.into(),
                reply,
            })
            .await
            .map_err(|_| RealtimeError::HubClosed)?;

        response.await.map_err(|_| RealtimeError::HubClosed)?
    }

    /// Get current connection count.
    pub fn client_count(&self) -> usize {
        self.counters.current_connections.load(Ordering::Acquire)
    }

    /// Get hub statistics.
    pub fn stats(&self) -> HubStats {
        HubStats {
            current_connections: self.client_count(),
            total_connections: self.counters.total_connections.load(Ordering::Relaxed),
            total_messages: self.counters.total_messages.load(Ordering::Relaxed),
            total_evictions: self.counters.total_evictions.load(Ordering::Relaxed),
        }
    }
}

/// The coordination loop. Owns the membership set exclusively.
pub struct Hub<S> {
    store: S,
    members: HashMap<ConnectionId, Member>,
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::Receiver<Unregistration>,
    broadcast_rx: mpsc::Receiver<BroadcastRequest>,
    counters: Arc<Counters>,
}

impl<S: MessageStore + 'static> Hub<S> {
    /// Create a hub and the handle used to reach it. The hub does nothing
    /// until [`Hub::run`] is polled.
    pub fn new(store: S, config: HubConfig) -> (Self, HubHandle) {
        let capacity = config.channel_capacity.max(1);
        let (register_tx, register_rx) = mpsc::channel(capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(capacity);
        let counters = Arc::new(Counters::default());

        let hub = Self {
            store,
            members: HashMap::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            counters: counters.clone(),
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            counters,
            outbound_capacity: config.outbound_capacity.max(1),
        };

        (hub, handle)
    }

    /// Create a hub and run it on the current tokio runtime.
    pub fn spawn(store: S, config: HubConfig) -> HubHandle {
        let (hub, handle) = Self::new(store, config);
        tokio::spawn(hub.run());
        handle
    }

    /// Process register, unregister and broadcast requests one at a time,
    /// whichever channel is ready first.
    ///
    /// Returns only once every [`HubHandle`] has been dropped.
    pub async fn run(mut self) {
        info!("Hub running");

        loop {
            tokio::select! {
                Some(registration) = self.register_rx.recv() => {
                    self.register(registration);
                }
                Some(unregistration) = self.unregister_rx.recv() => {
                    self.unregister(&unregistration.id);
                    let _ = unregistration.unregistered.send(());
                }
                Some(request) = self.broadcast_rx.recv() => {
                    let result = self.broadcast(request.sender, request.content).await;
                    // The caller may have given up waiting
                    let _ = request.reply.send(result);
                }
                else => break,
            }
        }

        debug!("Hub stopped");
    }

    fn register(&mut self, registration: Registration) {
        let Registration {
            id,
            sender,
            outbound,
            registered,
        } = registration;

        self.members.insert(
            id.clone(),
            Member {
                sender: sender.clone(),
                outbound,
            },
        );
        self.counters.total_connections.fetch_add(1, Ordering::Relaxed);
        self.publish_count();

        info!(
            connection_id = %id,
            sender = %sender,
            total = self.members.len(),
            "Client registered"
        );

        let _ = registered.send(());
    }

    fn unregister(&mut self, id: &str) {
        // Dropping the member drops the only outbound sender, closing the queue
        if let Some(member) = self.members.remove(id) {
            self.publish_count();
            info!(
                connection_id = %id,
                sender = %member.sender,
                total = self.members.len(),
                "Client unregistered"
            );
        }
    }

    async fn broadcast(
        &mut self,
        sender: String,
        content: String,
    ) -> Result<Message, RealtimeError> {
        let message = Message::new(sender, content)?;

        if let Err(e) = self.store.save(&message).await {
            error!(error = %e, sender = %message.sender, "Failed to save message");
            return Err(e.into());
        }

        let frame: OutboundFrame = protocol::encode_outbound(&message)?.into();
        self.counters.total_messages.fetch_add(1, Ordering::Relaxed);

        let mut dropped = Vec::new();
        let mut recipients = 0usize;

        for (id, member) in &self.members {
            match member.outbound.try_send(frame.clone()) {
                Ok(()) => recipients += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        connection_id = %id,
                        sender = %member.sender,
                        "Outbound queue full, evicting client"
                    );
                    self.counters.total_evictions.fetch_add(1, Ordering::Relaxed);
                    dropped.push(id.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(connection_id = %id, "Outbound queue already closed");
                    dropped.push(id.clone());
                }
            }
        }

        for id in dropped {
            self.members.remove(&id);
        }
        self.publish_count();

        debug!(
            message_id = %message.id,
            sender = %message.sender,
            recipients,
            "Message broadcast"
        );

        Ok(message)
    }

    fn publish_count(&self) {
        self.counters
            .current_connections
            .store(self.members.len(), Ordering::Release);
    }
}
