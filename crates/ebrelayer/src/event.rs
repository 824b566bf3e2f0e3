//! Classification of raw source-chain events.
//!
//! Raw events arrive as an event-type string plus a key/value attribute
//! list. They are decoded exactly once, here, into [`ChainEvent`]; nothing
//! downstream dispatches on strings.

use crate::types::RelayerError;
use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Lock,
    Burn,
    ProphecyCompleted,
    Unsupported,
}

impl EventKind {
    pub const LOCK: &'static str = "lock";
    pub const BURN: &'static str = "burn";
    pub const PROPHECY_COMPLETED: &'static str = "prophecy_completed";

    /// Total mapping from an event-type string to its kind. Unknown names
    /// are `Unsupported`, never an error.
    pub fn classify(event_type: &str) -> Self {
        match event_type {
            Self::LOCK => Self::Lock,
            Self::BURN => Self::Burn,
            Self::PROPHECY_COMPLETED => Self::ProphecyCompleted,
            _ => Self::Unsupported,
        }
    }

    pub fn is_lock_or_burn(self) -> bool {
        matches!(self, Self::Lock | Self::Burn)
    }
}

/// How the source chain renders attribute keys and values on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeEncoding {
    /// Tendermint 0.34 and earlier
    #[default]
    Base64,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

impl EventAttribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// One event as delivered by the block results endpoint, still encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub event_type: String,
    pub attributes: Vec<EventAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    Lock(Vec<EventAttribute>),
    Burn(Vec<EventAttribute>),
    ProphecyCompleted(Vec<EventAttribute>),
    Unsupported(String),
}

impl ChainEvent {
    /// Classifies `raw` and decodes its attributes. Attributes of
    /// unsupported events are never decoded, so a malformed attribute on an
    /// unrelated event cannot produce an error.
    pub fn decode(raw: RawEvent, encoding: AttributeEncoding) -> Result<Self, RelayerError> {
        let decode_all = |attributes: Vec<EventAttribute>| {
            attributes
                .into_iter()
                .map(|attribute| decode_attribute(attribute, encoding))
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(match EventKind::classify(&raw.event_type) {
            EventKind::Lock => Self::Lock(decode_all(raw.attributes)?),
            EventKind::Burn => Self::Burn(decode_all(raw.attributes)?),
            EventKind::ProphecyCompleted => Self::ProphecyCompleted(decode_all(raw.attributes)?),
            EventKind::Unsupported => Self::Unsupported(raw.event_type),
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Lock(_) => EventKind::Lock,
            Self::Burn(_) => EventKind::Burn,
            Self::ProphecyCompleted(_) => EventKind::ProphecyCompleted,
            Self::Unsupported(_) => EventKind::Unsupported,
        }
    }

    /// Attributes of a lock or burn event; `None` for every other kind.
    pub fn lock_burn_attributes(&self) -> Option<&[EventAttribute]> {
        match self {
            Self::Lock(attributes) | Self::Burn(attributes) => Some(attributes),
            _ => None,
        }
    }
}

fn decode_attribute(
    attribute: EventAttribute,
    encoding: AttributeEncoding,
) -> Result<EventAttribute, RelayerError> {
    match encoding {
        AttributeEncoding::Plain => Ok(attribute),
        AttributeEncoding::Base64 => {
            let key = decode_base64_text("attribute key", &attribute.key)?;
            let value = decode_base64_text(&key, &attribute.value)?;
            Ok(EventAttribute { key, value })
        }
    }
}

fn decode_base64_text(field: &str, encoded: &str) -> Result<String, RelayerError> {
    let parse_error = |reason: String| RelayerError::Parse {
        field: field.to_string(),
        reason,
    };
    let bytes = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| parse_error(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| parse_error(e.to_string()))
}
