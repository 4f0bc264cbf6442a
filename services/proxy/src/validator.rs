//! Upstream frame validation.
//!
//! Every frame read from an upstream passes through here before broadcast.
//! EVENT frames must verify, must be unseen within the dedup TTL, and may
//! additionally pass the large-media filter; other recognized message
//! kinds forward untouched.  Rejected frames are dropped silently; the
//! upstream connection is never penalized for a bad frame.

use nostr_proto::RelayFrame;
use tracing::debug;

use crate::dedup::Admission;
use crate::engine::ProxyEngine;
use crate::media::MediaFilter;

/// Validator decision for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Forward,
    Drop,
}

/// Run the validation pipeline on one raw upstream frame.
pub async fn validate_frame(
    engine: &ProxyEngine,
    filter: Option<&MediaFilter>,
    raw: &str,
) -> Verdict {
    let frame = match RelayFrame::parse(raw) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "dropping invalid upstream frame");
            return Verdict::Drop;
        }
    };

    let event = match frame {
        RelayFrame::Event { event, .. } => event,
        // Non-EVENT kinds forward without verification or dedup.
        RelayFrame::Other(_) => return Verdict::Forward,
    };

    if !event.verify() {
        debug!(id = %event.id, "dropping event with invalid signature");
        return Verdict::Drop;
    }

    if engine.dedup.check_and_record(&event.sig) == Admission::Duplicate {
        let total = engine.note_duplicate();
        debug!(id = %event.id, duplicates_count = total, "dropping duplicate event");
        return Verdict::Drop;
    }

    if let Some(filter) = filter {
        if filter.should_drop(&event).await {
            let total = engine.note_large_media();
            debug!(
                id = %event.id,
                large_media_files_count = total,
                "dropping event referencing oversized media"
            );
            return Verdict::Drop;
        }
    }

    Verdict::Forward
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use nostr_proto::test_support::{event_frame, signed_event};

    use super::*;

    fn engine() -> ProxyEngine {
        ProxyEngine::new(Duration::from_secs(120))
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let engine = engine();
        for raw in ["", "not json", "[\"EVENT\",\"sub\"]", "[\"REQ\",\"sub\"]"] {
            assert_eq!(validate_frame(&engine, None, raw).await, Verdict::Drop);
        }
    }

    #[tokio::test]
    async fn non_event_kinds_forward_unverified() {
        let engine = engine();
        assert_eq!(
            validate_frame(&engine, None, "[\"NOTICE\",\"maintenance\"]").await,
            Verdict::Forward
        );
        assert_eq!(
            validate_frame(&engine, None, "[\"EOSE\",\"sub\"]").await,
            Verdict::Forward
        );
    }

    #[tokio::test]
    async fn valid_event_forwards_once_then_deduplicates() {
        let engine = engine();
        let frame = event_frame("sub", &signed_event("hello"));

        assert_eq!(validate_frame(&engine, None, &frame).await, Verdict::Forward);
        assert_eq!(validate_frame(&engine, None, &frame).await, Verdict::Drop);
        assert_eq!(engine.duplicates(), 1);
    }

    #[tokio::test]
    async fn same_sig_under_different_subscription_is_still_duplicate() {
        let engine = engine();
        let event = signed_event("hello");
        let first = event_frame("sub-a", &event);
        let second = event_frame("sub-b", &event);

        assert_eq!(validate_frame(&engine, None, &first).await, Verdict::Forward);
        assert_eq!(validate_frame(&engine, None, &second).await, Verdict::Drop);
    }

    #[tokio::test]
    async fn invalid_signature_is_dropped_before_dedup() {
        let engine = engine();
        let mut event = signed_event("hello");
        event.content = "tampered".to_owned();
        let frame = event_frame("sub", &event);

        assert_eq!(validate_frame(&engine, None, &frame).await, Verdict::Drop);
        assert_eq!(engine.duplicates(), 0);
        assert_eq!(engine.dedup.size(), 0);
    }

    #[tokio::test]
    async fn trailing_newline_frames_still_validate() {
        let engine = engine();
        let frame = format!("{}\n", event_frame("sub", &signed_event("hello")));
        assert_eq!(validate_frame(&engine, None, &frame).await, Verdict::Forward);
    }
}
