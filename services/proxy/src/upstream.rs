//! Upstream connection supervision.
//!
//! One supervisor task per configured endpoint keeps exactly one live
//! connection to that relay, reconnecting forever after drops.
//!
//! # State machine
//! - `Connecting`: open the socket; on failure sleep the connect-retry
//!   interval and try again.
//! - `Running`: the connection is registered in its pool and the reader
//!   loop is live.
//! - `Recovering`: the reader exited; sleep a uniform random backoff,
//!   then reconnect.

use std::sync::Arc;

use futures_util::StreamExt;
use rand::Rng;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use crate::broadcast;
use crate::config::{ProxyConfig, RelayEndpoint};
use crate::engine::{PeerHandle, ProxyEngine, write_loop};
use crate::media::MediaFilter;
use crate::validator::{Verdict, validate_frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum SupervisorState {
    Connecting,
    Running(WsStream),
    Recovering,
}

/// Supervise one upstream endpoint for the life of the process.
pub async fn supervise(
    engine: Arc<ProxyEngine>,
    filter: Option<Arc<MediaFilter>>,
    endpoint: RelayEndpoint,
    config: ProxyConfig,
) {
    let target = endpoint.target();
    let mut state = SupervisorState::Connecting;

    loop {
        state = match state {
            SupervisorState::Connecting => match connect_async(target.as_str()).await {
                Ok((ws, _response)) => {
                    info!(upstream = %target, pool = %endpoint.pool, "connected to upstream");
                    SupervisorState::Running(ws)
                }
                Err(e) => {
                    error!(upstream = %target, error = %e, "connect failed, retrying");
                    tokio::time::sleep(config.connect_retry).await;
                    SupervisorState::Connecting
                }
            },
            SupervisorState::Running(ws) => {
                run_connection(&engine, filter.as_deref(), &endpoint, ws).await;
                SupervisorState::Recovering
            }
            SupervisorState::Recovering => {
                let backoff = {
                    let mut rng = rand::thread_rng();
                    rng.gen_range(config.recover_backoff_min..=config.recover_backoff_max)
                };
                warn!(
                    upstream = %target,
                    backoff_ms = backoff.as_millis() as u64,
                    "upstream dropped, reconnecting after backoff"
                );
                tokio::time::sleep(backoff).await;
                SupervisorState::Connecting
            }
        };
    }
}

/// Drive one live upstream connection until it drops.
///
/// Registers the handle in its pool, spawns the writer, reads frames
/// through the validator, and deregisters on the way out.  The connection
/// handle never outlives this call.
async fn run_connection(
    engine: &ProxyEngine,
    filter: Option<&MediaFilter>,
    endpoint: &RelayEndpoint,
    ws: WsStream,
) {
    let (sink, mut stream) = ws.split();
    let (handle, rx) = PeerHandle::new(engine.next_peer_id(), endpoint.target());
    let id = handle.id;
    let pong_tx = handle.tx.clone();
    let closed = handle.closed_signal();
    engine.register_upstream(endpoint.pool, handle);
    let writer = tokio::spawn(write_loop(sink, rx));

    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if validate_frame(engine, filter, &text).await == Verdict::Forward {
                        broadcast::publish(engine, &text);
                        debug!(upstream = %endpoint.target(), "frame relayed to clients");
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = pong_tx.try_send(Message::Pong(data));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(upstream = %endpoint.target(), error = %e, "upstream read error");
                    break;
                }
            },
            // The router found the send side dead; recycle the connection
            // without waiting for a read error.
            () = closed.notified() => {
                warn!(upstream = %endpoint.target(), "send path closed, recycling connection");
                break;
            }
        }
    }

    engine.remove_upstream(endpoint.pool, id);
    writer.abort();
}
