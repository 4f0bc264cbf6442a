// mock_relay: A mock upstream relay for testing the proxy.
//
// Accepts WebSocket connections on 127.0.0.1:<port>, records every text
// frame it receives, and can push arbitrary text frames to all connected
// peers.  Connections can be dropped on demand to exercise reconnection.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::protocol::Message;

#[derive(Debug)]
enum PeerCmd {
    Send(String),
    Close,
}

#[derive(Default)]
struct Shared {
    received: Mutex<Vec<String>>,
    peers: Mutex<HashMap<u64, mpsc::Sender<PeerCmd>>>,
    accepted: AtomicU64,
}

/// A mock relay for integration testing.
///
/// Binds to port 0 (random) and exposes the actual bound address. Each
/// test can spin up its own isolated relay instance.
pub struct MockRelay {
    addr: SocketAddr,
    shared: Arc<Shared>,
    /// Handle to the background accept loop; dropped when the relay is dropped.
    _task: tokio::task::JoinHandle<()>,
}

impl MockRelay {
    /// Start the mock relay, binding to a random available port.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared::default());

        let loop_shared = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            Self::accept_loop(listener, loop_shared).await;
        });

        Ok(Self {
            addr,
            shared,
            _task: task,
        })
    }

    /// The address the relay is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// `ws://` URL for this relay.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Total connections accepted since start (reconnects included).
    pub fn accepted_count(&self) -> u64 {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Number of currently live peer connections.
    pub async fn peer_count(&self) -> usize {
        self.shared.peers.lock().await.len()
    }

    /// Snapshot of every text frame received so far, in arrival order.
    pub async fn received(&self) -> Vec<String> {
        self.shared.received.lock().await.clone()
    }

    /// Push a text frame to every connected peer.
    pub async fn push(&self, frame: &str) {
        let peers = self.shared.peers.lock().await;
        for tx in peers.values() {
            let _ = tx.send(PeerCmd::Send(frame.to_owned())).await;
        }
    }

    /// Drop every live connection (simulates an upstream failure).
    pub async fn disconnect_all(&self) {
        let peers = self.shared.peers.lock().await;
        for tx in peers.values() {
            let _ = tx.send(PeerCmd::Close).await;
        }
    }

    // -- internal --

    async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
        let mut next_id = 0u64;
        loop {
            match listener.accept().await {
                Ok((stream, _peer)) => {
                    let id = next_id;
                    next_id += 1;
                    shared.accepted.fetch_add(1, Ordering::SeqCst);
                    let conn_shared = Arc::clone(&shared);
                    tokio::spawn(async move {
                        let _ = Self::handle_connection(stream, id, conn_shared).await;
                    });
                }
                Err(_) => break,
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        id: u64,
        shared: Arc<Shared>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws = tokio_tungstenite::accept_async(stream).await?;
        let (mut write, mut read) = ws.split();
        let (tx, mut rx) = mpsc::channel(64);
        shared.peers.lock().await.insert(id, tx);

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(PeerCmd::Send(frame)) => {
                        if write.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(PeerCmd::Close) | None => break,
                },
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        shared.received.lock().await.push(text.to_string());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                },
            }
        }

        shared.peers.lock().await.remove(&id);
        Ok(())
    }
}
