//! Relay frame classification.
//!
//! A relay frame is a JSON array whose first element names the message
//! kind.  EVENT frames have exactly three elements, the third being the
//! event object.  The parser rejects early with the reason; callers that
//! relay frames forward the original text untouched, so no re-serialization
//! happens here.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::event::Event;

/// Relay-to-client message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMessageKind {
    Event,
    Eose,
    Ok,
    Notice,
    Auth,
    Closed,
    Count,
}

impl RelayMessageKind {
    /// Case-sensitive wire discriminator match.
    fn from_discriminator(kind: &str) -> Option<Self> {
        match kind {
            "EVENT" => Some(RelayMessageKind::Event),
            "EOSE" => Some(RelayMessageKind::Eose),
            "OK" => Some(RelayMessageKind::Ok),
            "NOTICE" => Some(RelayMessageKind::Notice),
            "AUTH" => Some(RelayMessageKind::Auth),
            "CLOSED" => Some(RelayMessageKind::Closed),
            "COUNT" => Some(RelayMessageKind::Count),
            _ => None,
        }
    }
}

impl fmt::Display for RelayMessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            RelayMessageKind::Event => "EVENT",
            RelayMessageKind::Eose => "EOSE",
            RelayMessageKind::Ok => "OK",
            RelayMessageKind::Notice => "NOTICE",
            RelayMessageKind::Auth => "AUTH",
            RelayMessageKind::Closed => "CLOSED",
            RelayMessageKind::Count => "COUNT",
        };
        write!(f, "{}", kind)
    }
}

/// Why a frame was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("frame is not a bracketed list")]
    NotAList,
    #[error("frame payload is not a JSON array: {0}")]
    Json(String),
    #[error("unknown relay message type: {0}")]
    UnknownKind(String),
    #[error("EVENT frame must have exactly 3 elements, got {0}")]
    EventArity(usize),
    #[error("EVENT payload does not match the event shape: {0}")]
    EventShape(String),
}

/// A structurally valid relay frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    /// `["EVENT", <subscription id>, <event object>]`
    Event {
        subscription_id: String,
        event: Event,
    },
    /// Any other recognized kind; contents are opaque to the proxy.
    Other(RelayMessageKind),
}

impl RelayFrame {
    /// Classify one raw text frame.
    ///
    /// Trailing newlines are trimmed first; the remainder must be a
    /// bracketed JSON array with a recognized discriminator.
    pub fn parse(raw: &str) -> Result<RelayFrame, FrameError> {
        let trimmed = raw.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            return Err(FrameError::Empty);
        }
        if !trimmed.starts_with('[') || !trimmed.ends_with(']') {
            return Err(FrameError::NotAList);
        }

        let elements: Vec<Value> =
            serde_json::from_str(trimmed).map_err(|e| FrameError::Json(e.to_string()))?;

        let discriminator = match elements.first() {
            Some(Value::String(s)) => s.as_str(),
            Some(other) => return Err(FrameError::UnknownKind(other.to_string())),
            None => return Err(FrameError::UnknownKind("<empty list>".to_owned())),
        };
        let kind = RelayMessageKind::from_discriminator(discriminator)
            .ok_or_else(|| FrameError::UnknownKind(discriminator.to_owned()))?;

        if kind != RelayMessageKind::Event {
            return Ok(RelayFrame::Other(kind));
        }

        if elements.len() != 3 {
            return Err(FrameError::EventArity(elements.len()));
        }
        let subscription_id = elements[1].as_str().unwrap_or_default().to_owned();
        let event: Event = serde_json::from_value(elements[2].clone())
            .map_err(|e| FrameError::EventShape(e.to_string()))?;

        Ok(RelayFrame::Event {
            subscription_id,
            event,
        })
    }
}
