//! One live peer: an inbound reader, an outbound writer and liveness probing.
//!
//! The transport is any [`Sink`] of [`Frame`]s paired with a [`Stream`] of
//! received frames, so the same loops serve axum websockets in production
//! and in-memory channels in tests.

use crate::error::RealtimeError;
use crate::hub::{ConnectionId, HubHandle, OutboundFrame, OutboundReceiver};
use crate::protocol::{self, Frame};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Maximum time allowed for a single write burst or ping.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time allowed between pongs before the peer is considered gone.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);

/// Largest inbound frame payload accepted, in bytes.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 512;

/// Frames written in one burst at most.
const MAX_BURST_FRAMES: usize = 64;

/// Per-connection timing and size limits.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Deadline for each write.
    pub write_wait: Duration,
    /// Read deadline, extended on every pong.
    pub pong_wait: Duration,
    /// Ping interval. Must be shorter than `pong_wait`.
    pub ping_period: Duration,
    /// Largest inbound frame payload in bytes.
    pub max_frame_size: usize,
}

impl ConnectionConfig {
    /// Derives the ping period as nine tenths of `pong_wait`.
    pub fn with_pong_wait(pong_wait: Duration) -> Self {
        Self {
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            ..Self::default()
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            write_wait: DEFAULT_WRITE_WAIT,
            pong_wait: DEFAULT_PONG_WAIT,
            ping_period: DEFAULT_PONG_WAIT * 9 / 10,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Registers the peer with the hub and serves it until the transport closes.
///
/// The writer runs on its own task; the reader runs on the caller's task.
/// When the reader stops, for any reason, the connection unregisters itself,
/// which closes its outbound queue and lets the writer send a final close
/// frame. A writer failure cancels the reader.
pub async fn serve_connection<Si, St, E>(
    hub: HubHandle,
    sender: String,
    sink: Si,
    stream: St,
    config: ConnectionConfig,
) -> Result<(), RealtimeError>
where
    Si: Sink<Frame> + Unpin + Send + 'static,
    Si::Error: Display + Send,
    St: Stream<Item = Result<Frame, E>> + Unpin,
    E: Display,
{
    let (id, outbound) = hub.register(sender.clone()).await?;
    let shutdown = CancellationToken::new();

    let writer = tokio::spawn(write_loop(
        id.clone(),
        sink,
        outbound,
        config.clone(),
        shutdown.clone(),
    ));

    let result = read_loop(&hub, &id, &sender, stream, &config, &shutdown).await;

    match &result {
        Ok(()) => debug!(connection_id = %id, "Connection closed by peer"),
        Err(e) => {
            info!(connection_id = %id, sender = %sender, error = %e, "Connection terminated")
        }
    }

    if hub.unregister(&id).await.is_err() {
        debug!(connection_id = %id, "Hub already stopped");
    }
    if let Err(e) = writer.await {
        warn!(connection_id = %id, error = %e, "Writer task failed");
    }

    result
}

async fn read_loop<St, E>(
    hub: &HubHandle,
    id: &ConnectionId,
    sender: &str,
    mut stream: St,
    config: &ConnectionConfig,
    shutdown: &CancellationToken,
) -> Result<(), RealtimeError>
where
    St: Stream<Item = Result<Frame, E>> + Unpin,
    E: Display,
{
    let mut deadline = Instant::now() + config.pong_wait;

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            next = tokio::time::timeout_at(deadline, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => return Err(RealtimeError::DeadlineExpired),
            Ok(None) => return Ok(()),
            Ok(Some(Err(e))) => return Err(RealtimeError::Transport(e.to_string())),
            Ok(Some(Ok(frame))) => frame,
        };

        let size = frame.payload_len();
        if size > config.max_frame_size {
            return Err(RealtimeError::FrameTooLarge {
                size,
                max: config.max_frame_size,
            });
        }

        match frame {
            Frame::Text(text) => handle_text(hub, id, sender, &text).await?,
            Frame::Pong(_) => deadline = Instant::now() + config.pong_wait,
            Frame::Close => return Ok(()),
            Frame::Ping(_) | Frame::Binary(_) => {
                debug!(connection_id = %id, "Ignoring non-text frame");
            }
        }
    }
}

async fn handle_text(
    hub: &HubHandle,
    id: &ConnectionId,
    sender: &str,
    text: &str,
) -> Result<(), RealtimeError> {
    let content = match protocol::decode_inbound(text) {
        Ok(Some(content)) => content,
        Ok(None) => return Ok(()),
        Err(e) => {
            warn!(connection_id = %id, error = %e, "Dropping malformed frame");
            return Ok(());
        }
    };

    match hub.broadcast(sender, content).await {
        Ok(_) => Ok(()),
        Err(RealtimeError::HubClosed) => Err(RealtimeError::HubClosed),
        Err(e) => {
            warn!(connection_id = %id, error = %e, "Failed to broadcast message");
            Ok(())
        }
    }
}

async fn write_loop<Si>(
    id: ConnectionId,
    mut sink: Si,
    mut outbound: OutboundReceiver,
    config: ConnectionConfig,
    shutdown: CancellationToken,
) where
    Si: Sink<Frame> + Unpin,
    Si::Error: Display + Send,
{
    let mut ticker =
        tokio::time::interval_at(Instant::now() + config.ping_period, config.ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    let written =
                        write_burst(&mut sink, frame, &mut outbound, config.write_wait).await;
                    if let Err(e) = written {
                        debug!(connection_id = %id, error = %e, "Write failed");
                        break;
                    }
                }
                None => {
                    // The hub closed the queue
                    let _ = write_with_deadline(&mut sink, Frame::Close, config.write_wait).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                let ping = Frame::Ping(Bytes::new());
                if let Err(e) = write_with_deadline(&mut sink, ping, config.write_wait).await {
                    debug!(connection_id = %id, error = %e, "Ping failed");
                    break;
                }
            }
        }
    }

    shutdown.cancel();
    let _ = tokio::time::timeout(config.write_wait, sink.close()).await;
    debug!(connection_id = %id, "Writer stopped");
}

/// Writes `first` and every frame already queued behind it, in order, then
/// flushes once.
async fn write_burst<Si>(
    sink: &mut Si,
    first: OutboundFrame,
    outbound: &mut OutboundReceiver,
    write_wait: Duration,
) -> Result<(), RealtimeError>
where
    Si: Sink<Frame> + Unpin,
    Si::Error: Display,
{
    let burst = async {
        sink.feed(Frame::Text(first.to_string())).await?;
        for _ in 1..MAX_BURST_FRAMES {
            match outbound.try_recv() {
                Ok(frame) => sink.feed(Frame::Text(frame.to_string())).await?,
                Err(_) => break,
            }
        }
        sink.flush().await
    };

    match tokio::time::timeout(write_wait, burst).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(RealtimeError::Transport(e.to_string())),
        Err(_) => Err(RealtimeError::Transport("write deadline expired".to_string())),
    }
}

async fn write_with_deadline<Si>(
    sink: &mut Si,
    frame: Frame,
    write_wait: Duration,
) -> Result<(), RealtimeError>
where
    Si: Sink<Frame> + Unpin,
    Si::Error: Display,
{
    match tokio::time::timeout(write_wait, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(RealtimeError::Transport(e.to_string())),
        Err(_) => Err(RealtimeError::Transport("write deadline expired".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{Hub, HubConfig};
    use futures::channel::mpsc;
    use murmur_storage::{MemoryStore, MessageStore};
    use std::sync::Arc;

    type PeerTx = mpsc::UnboundedSender<Result<Frame, std::io::Error>>;
    type PeerRx = mpsc::UnboundedReceiver<Frame>;

    struct Peer {
        tx: PeerTx,
        rx: PeerRx,
        task: tokio::task::JoinHandle<Result<(), RealtimeError>>,
    }

    fn connect(hub: &HubHandle, sender: &str, config: ConnectionConfig) -> Peer {
        let (tx, server_rx) = mpsc::unbounded();
        let (server_tx, rx) = mpsc::unbounded();
        let task = tokio::spawn(serve_connection(
            hub.clone(),
            sender.to_string(),
            server_tx,
            server_rx,
            config,
        ));
        Peer { tx, rx, task }
    }

    fn text(json: &str) -> Result<Frame, std::io::Error> {
        Ok(Frame::Text(json.to_string()))
    }

    async fn wait_for_clients(hub: &HubHandle, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.client_count() != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("clients did not reach expected count");
    }

    async fn next_text(rx: &mut PeerRx) -> serde_json::Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), rx.next())
                .await
                .expect("no frame received")
                .expect("transport closed");
            if let Frame::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_chat_frame_reaches_every_peer() {
        let store = Arc::new(MemoryStore::new());
        let hub = Hub::spawn(store.clone(), HubConfig::default());
        let mut alice = connect(&hub, "alice", ConnectionConfig::default());
        let mut bob = connect(&hub, "bob", ConnectionConfig::default());
        wait_for_clients(&hub, 2).await;

        alice
            .tx
            .unbounded_send(text(r#"{"type":"message","content":"Hi"}"#))
            .unwrap();

        for rx in [&mut alice.rx, &mut bob.rx] {
            let json = next_text(rx).await;
            assert_eq!(json["type"], "message");
            assert_eq!(json["sender"], "alice");
            assert_eq!(json["content"], "Hi");
        }

        let messages = store.list().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "Hi");
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_frames_are_dropped() {
        let store = Arc::new(MemoryStore::new());
        let hub = Hub::spawn(store.clone(), HubConfig::default());
        let mut alice = connect(&hub, "alice", ConnectionConfig::default());
        wait_for_clients(&hub, 1).await;

        alice
            .tx
            .unbounded_send(text(r#"{"type":"typing","content":"..."}"#))
            .unwrap();
        alice.tx.unbounded_send(text("{not json")).unwrap();
        alice
            .tx
            .unbounded_send(Ok(Frame::Binary(Bytes::from_static(b"\x00"))))
            .unwrap();
        alice
            .tx
            .unbounded_send(text(r#"{"type":"message","content":"still here"}"#))
            .unwrap();

        let json = next_text(&mut alice.rx).await;
        assert_eq!(json["content"], "still here");
        assert_eq!(store.len(), 1);
        assert_eq!(hub.client_count(), 1);
    }

    #[tokio::test]
    async fn test_frames_arrive_in_broadcast_order() {
        let hub = Hub::spawn(MemoryStore::new(), HubConfig::default());
        let mut bob = connect(&hub, "bob", ConnectionConfig::default());
        wait_for_clients(&hub, 1).await;

        for i in 0..10 {
            hub.broadcast("alice", format!("message {i}")).await.unwrap();
        }

        for i in 0..10 {
            let json = next_text(&mut bob.rx).await;
            assert_eq!(json["content"], format!("message {i}"));
        }
    }

    #[tokio::test]
    async fn test_peer_close_unregisters() {
        let hub = Hub::spawn(MemoryStore::new(), HubConfig::default());
        let mut alice = connect(&hub, "alice", ConnectionConfig::default());
        wait_for_clients(&hub, 1).await;

        alice.tx.unbounded_send(Ok(Frame::Close)).unwrap();

        alice.task.await.unwrap().unwrap();
        assert_eq!(hub.client_count(), 0);

        // The writer notifies the peer once its queue is closed
        let frames: Vec<Frame> = alice.rx.collect().await;
        assert_eq!(frames.last(), Some(&Frame::Close));
    }

    #[tokio::test]
    async fn test_oversized_frame_terminates_connection() {
        let store = Arc::new(MemoryStore::new());
        let hub = Hub::spawn(store.clone(), HubConfig::default());
        let config = ConnectionConfig {
            max_frame_size: 64,
            ..ConnectionConfig::default()
        };
        let alice = connect(&hub, "alice", config);
        wait_for_clients(&hub, 1).await;

        let content = "x".repeat(100);
        alice
            .tx
            .unbounded_send(text(&format!(
                r#"{{"type":"message","content":"{content}"}}"#
            )))
            .unwrap();

        let result = alice.task.await.unwrap();
        assert!(matches!(result, Err(RealtimeError::FrameTooLarge { .. })));
        assert_eq!(hub.client_count(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_terminates_connection() {
        let hub = Hub::spawn(MemoryStore::new(), HubConfig::default());
        let alice = connect(&hub, "alice", ConnectionConfig::default());
        wait_for_clients(&hub, 1).await;

        alice
            .tx
            .unbounded_send(Err(std::io::Error::other("connection reset")))
            .unwrap();

        let result = alice.task.await.unwrap();
        assert!(matches!(result, Err(RealtimeError::Transport(_))));
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_ends_reader() {
        let hub = Hub::spawn(MemoryStore::new(), HubConfig::default());
        let alice = connect(&hub, "alice", ConnectionConfig::default());
        wait_for_clients(&hub, 1).await;

        // The peer stops reading: every write now fails
        drop(alice.rx);
        hub.broadcast("bob", "Hi").await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), alice.task)
            .await
            .expect("reader did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pong_expires_read_deadline() {
        let hub = Hub::spawn(MemoryStore::new(), HubConfig::default());
        let alice = connect(&hub, "alice", ConnectionConfig::default());

        let result = alice.task.await.unwrap();
        assert!(matches!(result, Err(RealtimeError::DeadlineExpired)));
        assert_eq!(hub.client_count(), 0);

        let frames: Vec<Frame> = alice.rx.collect().await;
        assert!(frames.iter().any(|f| matches!(f, Frame::Ping(_))));
        drop(alice.tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_extends_read_deadline() {
        let hub = Hub::spawn(MemoryStore::new(), HubConfig::default());
        let mut alice = connect(&hub, "alice", ConnectionConfig::default());

        for _ in 0..3 {
            match alice.rx.next().await {
                Some(Frame::Ping(_)) => {
                    alice.tx.unbounded_send(Ok(Frame::Pong(Bytes::new()))).unwrap();
                }
                other => panic!("expected ping, got {other:?}"),
            }
        }

        // Three ping periods is well past a single pong wait
        assert_eq!(hub.client_count(), 1);

        drop(alice.tx);
        alice.task.await.unwrap().unwrap();
        assert_eq!(hub.client_count(), 0);
    }

    #[test]
    fn test_config_ping_period() {
        let config = ConnectionConfig::with_pong_wait(Duration::from_secs(10));
        assert_eq!(config.ping_period, Duration::from_secs(9));
        assert!(ConnectionConfig::default().ping_period < ConnectionConfig::default().pong_wait);
    }
}
