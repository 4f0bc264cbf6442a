//! Client listener and per-client sessions.
//!
//! The listener accepts inbound WebSocket connections and spawns one
//! session task per client.  A session registers the client for broadcast,
//! routes every frame the client sends, and deregisters on disconnect.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{info, warn};

use crate::engine::{PeerHandle, ProxyEngine, write_loop};
use crate::router;

/// Accepts inbound client connections.
pub struct Listener {
    listener: TcpListener,
}

impl Listener {
    /// Bind the client listener.  A bind failure is fatal to the process;
    /// the caller decides the exit path.
    pub async fn bind(ip: IpAddr, port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind((ip, port)).await?;
        Ok(Listener { listener })
    }

    /// The bound local address (useful when port 0 was requested).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients forever, one session task each.
    pub async fn run(self, engine: Arc<ProxyEngine>) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let engine = Arc::clone(&engine);
                    tokio::spawn(handle_client(engine, stream, addr));
                }
                Err(e) => {
                    warn!(error = %e, "failed to accept client connection");
                }
            }
        }
    }
}

/// Drive one client session from accept to disconnect.
async fn handle_client(engine: Arc<ProxyEngine>, stream: TcpStream, addr: SocketAddr) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(client = %addr, error = %e, "websocket handshake failed");
            return;
        }
    };

    let (sink, mut stream) = ws.split();
    let (handle, rx) = PeerHandle::new(engine.next_peer_id(), addr.to_string());
    let id = handle.id;
    let pong_tx = handle.tx.clone();
    let closed = handle.closed_signal();
    engine.register_client(handle);
    let writer = tokio::spawn(write_loop(sink, rx));
    info!(client = %addr, "client connected");

    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    router::route(&engine, &text);
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = pong_tx.try_send(Message::Pong(data));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(client = %addr, error = %e, "client read error");
                    break;
                }
            },
            // The broadcaster found the send side dead; end the session
            // without waiting for a read error.
            () = closed.notified() => break,
        }
    }

    engine.remove_client(id);
    writer.abort();
    warn!(client = %addr, "client disconnected");
}
