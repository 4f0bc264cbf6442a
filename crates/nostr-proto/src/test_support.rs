//! Helpers for building correctly signed events in tests.
//!
//! Compiled for this crate's own tests and, behind the `test-support`
//! feature, for downstream dev-dependencies.

use std::time::{SystemTime, UNIX_EPOCH};

use secp256k1::{Keypair, Message, Secp256k1, XOnlyPublicKey};

use crate::event::Event;

/// Build a signed kind-1 event with the given content and a fresh keypair.
pub fn signed_event(content: &str) -> Event {
    signed_event_with(1, Vec::new(), content)
}

/// Build a signed event with explicit kind and tags.
pub fn signed_event_with(kind: u32, tags: Vec<Vec<String>>, content: &str) -> Event {
    let secp = Secp256k1::new();
    let keypair = Keypair::new(&secp, &mut secp256k1::rand::thread_rng());
    let (xonly, _parity) = XOnlyPublicKey::from_keypair(&keypair);

    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs();

    let mut event = Event {
        id: String::new(),
        pubkey: hex::encode(xonly.serialize()),
        created_at,
        kind,
        tags,
        content: content.to_owned(),
        sig: String::new(),
    };

    let digest = event.id_digest();
    event.id = hex::encode(digest);
    let sig = secp.sign_schnorr(&Message::from_digest(digest), &keypair);
    event.sig = hex::encode(sig.serialize());
    event
}

/// Render an `["EVENT", <sub>, <event>]` frame the way a relay would.
pub fn event_frame(subscription_id: &str, event: &Event) -> String {
    serde_json::to_string(&serde_json::json!(["EVENT", subscription_id, event]))
        .expect("event frames always serialize")
}
