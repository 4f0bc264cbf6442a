//! Upstream-to-client fan-out.
//!
//! Accepted upstream frames are delivered to every connected client.  No
//! durability and no cross-publisher ordering; a dead client is removed on
//! send failure and its session task cleans up the socket.

use tracing::warn;

use crate::engine::ProxyEngine;

/// Deliver one accepted frame to every connected client.
pub fn publish(engine: &ProxyEngine, frame: &str) {
    for client in engine.clients_snapshot() {
        if !client.send_text(frame) {
            warn!(client = %client.label, "send failed, removing client handle");
            engine.remove_client(client.id);
            // Wake the session's reader so it closes the socket now.
            client.signal_closed();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::protocol::Message;

    use super::*;
    use crate::engine::PeerHandle;

    fn engine() -> ProxyEngine {
        ProxyEngine::new(Duration::from_secs(120))
    }

    fn register_client(engine: &ProxyEngine, label: &str) -> mpsc::Receiver<Message> {
        let (handle, rx) = PeerHandle::new(engine.next_peer_id(), label.to_owned());
        engine.register_client(handle);
        rx
    }

    #[tokio::test]
    async fn every_client_receives_the_frame() {
        let engine = engine();
        let mut rx_a = register_client(&engine, "a");
        let mut rx_b = register_client(&engine, "b");

        publish(&engine, "[\"NOTICE\",\"hi\"]");

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.try_recv() {
                Ok(Message::Text(text)) => assert_eq!(text.as_str(), "[\"NOTICE\",\"hi\"]"),
                other => panic!("expected text frame, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn dead_client_is_removed_and_others_still_receive() {
        let engine = engine();
        let (dead, dead_rx) = PeerHandle::new(engine.next_peer_id(), "dead".to_owned());
        let closed = dead.closed_signal();
        engine.register_client(dead);
        let mut live_rx = register_client(&engine, "live");
        drop(dead_rx);

        publish(&engine, "frame");

        assert_eq!(engine.client_count(), 1);
        assert!(matches!(live_rx.try_recv(), Ok(Message::Text(_))));

        // The removal also wakes the dead client's session.
        tokio::time::timeout(Duration::from_millis(100), closed.notified())
            .await
            .expect("client session was not signalled");
    }

    #[tokio::test]
    async fn publish_to_empty_client_set_is_a_no_op() {
        let engine = engine();
        publish(&engine, "frame");
        assert_eq!(engine.client_count(), 0);
    }
}
