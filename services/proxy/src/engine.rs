//! Shared proxy state: membership sets, peer handles, and counters.
//!
//! Every live connection is represented by a [`PeerHandle`] registered in
//! exactly one of three sets: clients, public upstreams, or private
//! upstreams.  A handle is a bounded queue feeding the connection's writer
//! task; fan-out code sends without awaiting and without holding a lock,
//! so set iteration never races set mutation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::SinkExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::warn;

use crate::config::PoolKind;
use crate::dedup::DedupCache;

/// Depth of each peer's outbound queue.  A peer that falls this far behind
/// has frames dropped rather than stalling the fan-out.
const SEND_QUEUE_DEPTH: usize = 64;

pub type PeerId = u64;

/// Sending side of one live connection.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    pub id: PeerId,
    /// Connect target for upstreams, socket address for clients.
    pub label: String,
    pub(crate) tx: mpsc::Sender<Message>,
    /// Fired by fan-out code when a send finds the peer dead, so the
    /// owning reader task tears the connection down immediately.
    closed: Arc<Notify>,
}

impl PeerHandle {
    pub fn new(id: PeerId, label: String) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        let handle = PeerHandle {
            id,
            label,
            tx,
            closed: Arc::new(Notify::new()),
        };
        (handle, rx)
    }

    /// Queue a text frame for this peer.
    ///
    /// Returns `false` when the peer's writer is gone and the handle should
    /// be removed.  A full queue drops the frame but keeps the peer.
    pub fn send_text(&self, frame: &str) -> bool {
        match self.tx.try_send(Message::Text(frame.to_owned().into())) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(peer = %self.label, "peer send queue full, dropping frame");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Notification handle the owning reader task waits on.
    pub fn closed_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.closed)
    }

    /// Tell the owning reader task the peer is dead.  The notification is
    /// buffered, so firing before the reader waits is not lost.
    pub fn signal_closed(&self) {
        self.closed.notify_one();
    }
}

/// Drain a peer's queue into its WebSocket sink until the queue closes or
/// the socket errors.
pub(crate) async fn write_loop<S>(mut sink: S, mut rx: mpsc::Receiver<Message>)
where
    S: futures_util::Sink<Message, Error = WsError> + Unpin,
{
    while let Some(msg) = rx.recv().await {
        if sink.send(msg).await.is_err() {
            break;
        }
    }
}

/// Process-wide proxy state.  One instance per proxy, shared via `Arc`.
pub struct ProxyEngine {
    clients: Mutex<HashMap<PeerId, PeerHandle>>,
    public_upstreams: Mutex<HashMap<PeerId, PeerHandle>>,
    private_upstreams: Mutex<HashMap<PeerId, PeerHandle>>,
    next_id: AtomicU64,
    pub dedup: DedupCache,
    duplicates_count: AtomicU64,
    large_media_files_count: AtomicU64,
}

impl ProxyEngine {
    pub fn new(note_cache_time: Duration) -> Self {
        ProxyEngine {
            clients: Mutex::new(HashMap::new()),
            public_upstreams: Mutex::new(HashMap::new()),
            private_upstreams: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            dedup: DedupCache::new(note_cache_time),
            duplicates_count: AtomicU64::new(0),
            large_media_files_count: AtomicU64::new(0),
        }
    }

    pub fn next_peer_id(&self) -> PeerId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn pool(&self, pool: PoolKind) -> &Mutex<HashMap<PeerId, PeerHandle>> {
        match pool {
            PoolKind::Public => &self.public_upstreams,
            PoolKind::Private => &self.private_upstreams,
        }
    }

    pub fn register_client(&self, handle: PeerHandle) {
        self.clients
            .lock()
            .expect("clients lock poisoned")
            .insert(handle.id, handle);
    }

    pub fn remove_client(&self, id: PeerId) {
        self.clients
            .lock()
            .expect("clients lock poisoned")
            .remove(&id);
    }

    pub fn register_upstream(&self, pool: PoolKind, handle: PeerHandle) {
        self.pool(pool)
            .lock()
            .expect("pool lock poisoned")
            .insert(handle.id, handle);
    }

    pub fn remove_upstream(&self, pool: PoolKind, id: PeerId) {
        self.pool(pool)
            .lock()
            .expect("pool lock poisoned")
            .remove(&id);
    }

    /// Snapshot of the client set; fan-out iterates the snapshot and
    /// applies removals to the authoritative set afterwards.
    pub fn clients_snapshot(&self) -> Vec<PeerHandle> {
        self.clients
            .lock()
            .expect("clients lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn upstreams_snapshot(&self, pool: PoolKind) -> Vec<PeerHandle> {
        self.pool(pool)
            .lock()
            .expect("pool lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().expect("clients lock poisoned").len()
    }

    pub fn upstream_count(&self, pool: PoolKind) -> usize {
        self.pool(pool).lock().expect("pool lock poisoned").len()
    }

    pub fn note_duplicate(&self) -> u64 {
        self.duplicates_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates_count.load(Ordering::Relaxed)
    }

    pub fn note_large_media(&self) -> u64 {
        self.large_media_files_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn large_media_files(&self) -> u64 {
        self.large_media_files_count.load(Ordering::Relaxed)
    }
}
