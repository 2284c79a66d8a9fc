use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use eyre::WrapErr;
use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use wire::{DebuggerMessage, RuntimeCodec, RuntimeMessage};

/// Identifies one live runtime connection for the duration of its lifetime.
/// Ids are never reused within a session.
pub type ConnectionId = u64;

/// Socket-originated events, delivered in arrival order per connection.
#[derive(Debug)]
pub enum Inbound {
    /// A runtime connected and its read loop is running.
    Connected(ConnectionId),
    /// A decoded message from a connected runtime.
    Message {
        connection: ConnectionId,
        message: RuntimeMessage,
    },
    /// The connection ended (stream end, I/O error, or explicit close) and
    /// has been removed. Emitted at most once per connection.
    Disconnected(ConnectionId),
}

/// Outbound messages queued per connection before its writer task stalls
/// the peer out of the session.
const DEFAULT_OUTBOX_CAPACITY: usize = 256;

struct Peer {
    outbox: mpsc::Sender<DebuggerMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Peer {
    fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

struct Inner {
    peers: Mutex<HashMap<ConnectionId, Peer>>,
    next_id: AtomicU64,
    inbound: mpsc::UnboundedSender<Inbound>,
    outbox_capacity: usize,
}

/// Tracks every live runtime connection and fans outbound messages out to
/// them.
///
/// Outbound delivery goes through a bounded per-connection queue drained by
/// that connection's writer task, so [`ConnectionManager::broadcast`] never
/// blocks on a peer. A connection whose queue overflows is treated as dead
/// and dropped.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a manager that reports socket events on `inbound`.
    pub fn new(inbound: mpsc::UnboundedSender<Inbound>) -> Self {
        Self::with_outbox_capacity(inbound, DEFAULT_OUTBOX_CAPACITY)
    }

    /// As [`ConnectionManager::new`] with a custom per-connection queue
    /// capacity.
    pub fn with_outbox_capacity(
        inbound: mpsc::UnboundedSender<Inbound>,
        outbox_capacity: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                peers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                inbound,
                outbox_capacity,
            }),
        }
    }

    /// Open the TCP listener and start accepting runtime connections.
    ///
    /// Pass port 0 to bind an ephemeral port; the bound address is available
    /// on the returned [`Listener`]. Dropping the listener stops the accept
    /// loop but leaves established connections alone.
    pub async fn listen(&self, port: u16) -> eyre::Result<Listener> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .wrap_err("binding runtime listener")?;
        let local_addr = listener
            .local_addr()
            .wrap_err("reading listener address")?;
        tracing::debug!(%local_addr, "listening for runtime connections");

        let manager = self.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        tracing::debug!(%peer_addr, "accepted runtime connection");
                        manager.register(stream);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accepting runtime connection");
                    }
                }
            }
        });

        Ok(Listener {
            local_addr,
            accept_task,
        })
    }

    fn register(&self, stream: TcpStream) {
        let connection = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (read, write) = stream.into_split();
        let (outbox, outbox_rx) = mpsc::channel(self.inner.outbox_capacity);

        let reader = tokio::spawn(read_loop(
            connection,
            FramedRead::new(read, RuntimeCodec::new()),
            self.inner.inbound.clone(),
            self.clone(),
        ));
        let writer = tokio::spawn(write_loop(
            connection,
            FramedWrite::new(write, RuntimeCodec::new()),
            outbox_rx,
            self.clone(),
        ));

        self.inner.peers.lock().unwrap().insert(
            connection,
            Peer {
                outbox,
                reader,
                writer,
            },
        );
        let _ = self.inner.inbound.send(Inbound::Connected(connection));
    }

    /// Queue `message` for every live connection.
    ///
    /// A connection whose queue is gone or full is removed; the remaining
    /// connections still get the message.
    pub fn broadcast(&self, message: DebuggerMessage) {
        let mut dropped = Vec::new();
        {
            let mut peers = self.inner.peers.lock().unwrap();
            peers.retain(|&connection, peer| {
                if let Err(e) = peer.outbox.try_send(message.clone()) {
                    tracing::warn!(connection, error = %e, "dropping stalled connection");
                    peer.abort();
                    dropped.push(connection);
                    false
                } else {
                    true
                }
            });
        }
        for connection in dropped {
            let _ = self.inner.inbound.send(Inbound::Disconnected(connection));
        }
    }

    /// Queue `message` for a single connection. Returns false if the
    /// connection is not (or no longer) live, or its queue is full.
    pub fn send_to(&self, connection: ConnectionId, message: DebuggerMessage) -> bool {
        let peers = self.inner.peers.lock().unwrap();
        match peers.get(&connection) {
            Some(peer) => peer.outbox.try_send(message).is_ok(),
            None => false,
        }
    }

    /// Drop a connection and cancel its tasks. Removing a connection that
    /// is already gone is a no-op.
    pub fn remove(&self, connection: ConnectionId) {
        let peer = self.inner.peers.lock().unwrap().remove(&connection);
        if let Some(peer) = peer {
            peer.abort();
            tracing::debug!(connection, "removed runtime connection");
            let _ = self.inner.inbound.send(Inbound::Disconnected(connection));
        }
    }

    /// Number of currently live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.peers.lock().unwrap().len()
    }

    /// Close every connection without emitting disconnect events.
    pub fn shutdown(&self) {
        let peers: Vec<_> = {
            let mut peers = self.inner.peers.lock().unwrap();
            peers.drain().collect()
        };
        for (connection, peer) in peers {
            tracing::debug!(connection, "closing runtime connection");
            peer.abort();
        }
    }
}

/// Handle to the accept loop. Dropping it stops accepting new connections.
pub struct Listener {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl Listener {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        tracing::debug!(local_addr = %self.local_addr, "closing runtime listener");
        self.accept_task.abort();
    }
}

async fn read_loop(
    connection: ConnectionId,
    mut frames: FramedRead<OwnedReadHalf, RuntimeCodec>,
    inbound: mpsc::UnboundedSender<Inbound>,
    manager: ConnectionManager,
) {
    while let Some(next) = frames.next().await {
        match next {
            Ok(message) => {
                if inbound
                    .send(Inbound::Message {
                        connection,
                        message,
                    })
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(connection, error = %e, "read failure, dropping connection");
                break;
            }
        }
    }
    tracing::debug!(connection, "runtime connection closed");
    manager.remove(connection);
}

async fn write_loop(
    connection: ConnectionId,
    mut frames: FramedWrite<OwnedWriteHalf, RuntimeCodec>,
    mut outbox: mpsc::Receiver<DebuggerMessage>,
    manager: ConnectionManager,
) {
    while let Some(message) = outbox.recv().await {
        if let Err(e) = frames.send(message).await {
            tracing::warn!(connection, error = %e, "write failure, dropping connection");
            manager.remove(connection);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use wire::{ExecutionCommand, SourceLocation};

    use super::*;

    fn init_test_logger() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    async fn setup() -> (
        ConnectionManager,
        Listener,
        mpsc::UnboundedReceiver<Inbound>,
    ) {
        init_test_logger();
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(tx);
        let listener = manager.listen(0).await.unwrap();
        (manager, listener, rx)
    }

    async fn expect_connected(rx: &mut mpsc::UnboundedReceiver<Inbound>) -> ConnectionId {
        match rx.recv().await.unwrap() {
            Inbound::Connected(connection) => connection,
            other => panic!("expected connected event, got {other:?}"),
        }
    }

    async fn read_lines(stream: &mut BufReader<TcpStream>, n: usize) -> Vec<String> {
        let mut lines = Vec::with_capacity(n);
        for _ in 0..n {
            let mut line = String::new();
            stream.read_line(&mut line).await.unwrap();
            lines.push(line.trim_end().to_string());
        }
        lines
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let (manager, listener, mut rx) = setup().await;

        let a = TcpStream::connect(listener.local_addr()).await.unwrap();
        let b = TcpStream::connect(listener.local_addr()).await.unwrap();
        expect_connected(&mut rx).await;
        expect_connected(&mut rx).await;

        manager.broadcast(DebuggerMessage::Breakpoints(vec![SourceLocation {
            path: "a.as".to_string(),
            line: 5,
        }]));

        for stream in [a, b] {
            let mut reader = BufReader::new(stream);
            let lines = read_lines(&mut reader, 3).await;
            assert_eq!(lines, ["BREAKPOINTS", "a.as,5", "END_BREAKPOINTS"]);
        }
    }

    #[tokio::test]
    async fn inbound_messages_are_tagged_with_their_connection() {
        let (_manager, listener, mut rx) = setup().await;

        let mut stream = TcpStream::connect(listener.local_addr()).await.unwrap();
        let id = expect_connected(&mut rx).await;

        stream.write_all(b"GET_BREAKPOINTS\n").await.unwrap();

        match rx.recv().await.unwrap() {
            Inbound::Message {
                connection,
                message,
            } => {
                assert_eq!(connection, id);
                assert_eq!(message, RuntimeMessage::GetBreakpoints);
            }
            other => panic!("expected message event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_to_targets_one_connection() {
        let (manager, listener, mut rx) = setup().await;

        let a = TcpStream::connect(listener.local_addr()).await.unwrap();
        let b = TcpStream::connect(listener.local_addr()).await.unwrap();
        let first = expect_connected(&mut rx).await;
        expect_connected(&mut rx).await;

        assert!(manager.send_to(first, DebuggerMessage::Command(ExecutionCommand::Continue)));

        // first connection accepted is the first registered
        let mut reader = BufReader::new(a);
        let lines = read_lines(&mut reader, 2).await;
        assert_eq!(lines, ["COMMAND", "CONTINUE"]);

        // the other connection must stay idle; probe it with a broadcast
        manager.broadcast(DebuggerMessage::Command(ExecutionCommand::StepIn));
        let mut reader = BufReader::new(b);
        let lines = read_lines(&mut reader, 2).await;
        assert_eq!(lines, ["COMMAND", "STEP_IN"]);
    }

    #[tokio::test]
    async fn dead_connection_is_removed_and_others_still_receive() {
        let (manager, listener, mut rx) = setup().await;

        let live = TcpStream::connect(listener.local_addr()).await.unwrap();
        let dead = TcpStream::connect(listener.local_addr()).await.unwrap();
        expect_connected(&mut rx).await;
        expect_connected(&mut rx).await;

        drop(dead);
        // the reader task notices the closed stream and removes the peer
        loop {
            match rx.recv().await.unwrap() {
                Inbound::Disconnected(_) => break,
                _ => continue,
            }
        }
        assert_eq!(manager.connection_count(), 1);

        manager.broadcast(DebuggerMessage::Command(ExecutionCommand::StepOver));
        let mut reader = BufReader::new(live);
        let lines = read_lines(&mut reader, 2).await;
        assert_eq!(lines, ["COMMAND", "STEP_OVER"]);
    }

    #[tokio::test]
    async fn removal_is_idempotent() {
        let (manager, listener, mut rx) = setup().await;

        let _stream = TcpStream::connect(listener.local_addr()).await.unwrap();
        let id = expect_connected(&mut rx).await;

        manager.remove(id);
        manager.remove(id);
        assert_eq!(manager.connection_count(), 0);

        // exactly one disconnect notification
        match rx.recv().await.unwrap() {
            Inbound::Disconnected(connection) => assert_eq!(connection, id),
            other => panic!("expected disconnected event, got {other:?}"),
        }
        assert!(
            tokio::time::timeout(Duration::from_millis(100), rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn stalled_connection_is_dropped_when_its_queue_overflows() {
        init_test_logger();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::with_outbox_capacity(tx, 1);
        let listener = manager.listen(0).await.unwrap();

        let _stream = TcpStream::connect(listener.local_addr()).await.unwrap();
        let id = expect_connected(&mut rx).await;

        // on this single-threaded runtime the writer task cannot run
        // between the two sends, so the second one overflows the queue
        manager.broadcast(DebuggerMessage::Command(ExecutionCommand::Continue));
        manager.broadcast(DebuggerMessage::Command(ExecutionCommand::Continue));

        assert_eq!(manager.connection_count(), 0);
        match rx.recv().await.unwrap() {
            Inbound::Disconnected(connection) => assert_eq!(connection, id),
            other => panic!("expected disconnected event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_to_unknown_connection_reports_failure() {
        let (manager, _listener, _rx) = setup().await;
        assert!(!manager.send_to(42, DebuggerMessage::Command(ExecutionCommand::Continue)));
    }
}
