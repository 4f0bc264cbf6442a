//! Client-to-upstream routing.
//!
//! Private relays receive all client traffic; public relays receive only
//! frames without the privacy tag.  The tag is a publication hint embedded
//! by the client, not a protocol field, so the test is a plain substring
//! match on the raw frame.

use tracing::{debug, warn};

use crate::config::PoolKind;
use crate::engine::ProxyEngine;

/// Literal substring that keeps a frame off the public pool.
pub const PRIVATE_TAG: &str = "[private]";

/// Fan a client frame out to the upstream pools.
pub fn route(engine: &ProxyEngine, frame: &str) {
    send_to_pool(engine, PoolKind::Private, frame);

    if frame.contains(PRIVATE_TAG) {
        debug!("private frame withheld from public pool");
        return;
    }

    send_to_pool(engine, PoolKind::Public, frame);
}

fn send_to_pool(engine: &ProxyEngine, pool: PoolKind, frame: &str) {
    for peer in engine.upstreams_snapshot(pool) {
        if !peer.send_text(frame) {
            warn!(upstream = %peer.label, %pool, "send failed, removing upstream handle");
            engine.remove_upstream(pool, peer.id);
            // Wake the supervisor's reader so it recycles the connection
            // now instead of on its next read error.
            peer.signal_closed();
        }
    }
}
