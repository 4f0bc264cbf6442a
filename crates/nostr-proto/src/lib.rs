// nostr-proto: Nostr event model, relay frame classification, and
// signature verification.
//
// Relay frames are JSON arrays whose first element is a `kind`
// discriminator.  EVENT frames carry a signed event object as their third
// element; all other recognized kinds are structural pass-through.

pub mod event;
pub mod frame;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use event::Event;
pub use frame::{FrameError, RelayFrame, RelayMessageKind};
