//! Signed Nostr events.
//!
//! An event binds `{pubkey, created_at, kind, tags, content}` under a
//! BIP340 Schnorr signature.  The event `id` is the SHA-256 digest of the
//! canonical serialization `[0, pubkey, created_at, kind, tags, content]`,
//! and `sig` signs that digest with the x-only key in `pubkey`.
//!
//! # Hex fields
//!
//! `id`, `pubkey`, and `sig` are lowercase hex strings on the wire.  They
//! are kept as received; decoding happens only inside [`Event::verify`].

use std::sync::OnceLock;

use secp256k1::schnorr::Signature;
use secp256k1::{Message, Secp256k1, VerifyOnly, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

fn verifier() -> &'static Secp256k1<VerifyOnly> {
    static VERIFIER: OnceLock<Secp256k1<VerifyOnly>> = OnceLock::new();
    VERIFIER.get_or_init(Secp256k1::verification_only)
}

/// A signed protocol event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl Event {
    /// SHA-256 digest of the canonical id preimage
    /// `[0, pubkey, created_at, kind, tags, content]`.
    pub fn id_digest(&self) -> [u8; 32] {
        let preimage = serde_json::json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content,
        ]);
        // Serializing a Value built from plain strings and numbers cannot fail.
        let bytes = preimage.to_string().into_bytes();
        Sha256::digest(&bytes).into()
    }

    /// Verify that `id` matches the canonical digest and that `sig` is a
    /// valid Schnorr signature over it by `pubkey`.
    ///
    /// Any malformed field (bad hex, wrong length, off-curve key) counts
    /// as verification failure.
    pub fn verify(&self) -> bool {
        let digest = self.id_digest();

        let Ok(claimed_id) = hex::decode(&self.id) else {
            return false;
        };
        if claimed_id != digest {
            return false;
        }

        let Ok(pubkey_bytes) = hex::decode(&self.pubkey) else {
            return false;
        };
        let Ok(pubkey) = XOnlyPublicKey::from_slice(&pubkey_bytes) else {
            return false;
        };

        let Ok(sig_bytes) = hex::decode(&self.sig) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(&sig_bytes) else {
            return false;
        };

        let msg = Message::from_digest(digest);
        verifier().verify_schnorr(&sig, &msg, &pubkey).is_ok()
    }
}
