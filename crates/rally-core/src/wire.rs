//! Rally wire format — JSON text frames exchanged over the client transport.
//!
//! Inbound frames carry an `event` discriminator, outbound frames a `type`
//! discriminator. Event and type names are part of the protocol; legacy
//! clients match on them verbatim.

use serde::{Deserialize, Serialize};

pub const EVENT_REGISTER: &str = "register";
pub const EVENT_LIST_REQUEST: &str = "list-request";
pub const EVENT_DEREGISTER: &str = "deregister";

/// Separator that starts SIP-style parameters on an address,
/// e.g. `10.0.0.1:5000;transport=udp`.
const ADDRESS_PARAM_SEPARATOR: char = ';';

// ── Inbound ──────────────────────────────────────────────────────────────────

/// A validated event received from a client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Announce a reachable address for this session.
    Register { address: String },
    /// Ask for the peer list. The tag is echoed back untouched.
    ListRequest { tag: String },
    /// Withdraw an address.
    Deregister { address: String },
}

/// Loose shape of an inbound frame, validated into [`ClientEvent`].
#[derive(Deserialize)]
struct RawEvent {
    event: String,
    address: Option<String>,
    tag: Option<String>,
}

impl ClientEvent {
    /// Decode and validate an inbound text frame.
    ///
    /// Addresses are normalized (see [`normalize_address`]) so the registry
    /// only ever sees canonical keys.
    pub fn decode(text: &str, max_address_len: usize) -> Result<Self, WireError> {
        let raw: RawEvent =
            serde_json::from_str(text).map_err(|e| WireError::InvalidJson(e.to_string()))?;

        match raw.event.as_str() {
            EVENT_REGISTER => {
                let address = require(raw.address, EVENT_REGISTER, "address")?;
                let address = normalize_address(EVENT_REGISTER, &address, max_address_len)?;
                Ok(Self::Register { address })
            }
            EVENT_DEREGISTER => {
                let address = require(raw.address, EVENT_DEREGISTER, "address")?;
                let address = normalize_address(EVENT_DEREGISTER, &address, max_address_len)?;
                Ok(Self::Deregister { address })
            }
            EVENT_LIST_REQUEST => {
                let tag = require(raw.tag, EVENT_LIST_REQUEST, "tag")?;
                Ok(Self::ListRequest { tag })
            }
            other => Err(WireError::UnknownEvent(other.to_string())),
        }
    }

    /// Encode as a text frame. Used by clients and tests.
    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(|e| WireError::Encode(e.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => EVENT_REGISTER,
            Self::ListRequest { .. } => EVENT_LIST_REQUEST,
            Self::Deregister { .. } => EVENT_DEREGISTER,
        }
    }
}

fn require(
    value: Option<String>,
    event: &'static str,
    field: &'static str,
) -> Result<String, WireError> {
    value.ok_or(WireError::MissingField { event, field })
}

/// Canonicalize a peer address.
///
/// Drops anything from the first `;` (transport parameters) and trims
/// whitespace. The result must be non-empty and at most `max_len` bytes.
pub fn normalize_address(
    event: &'static str,
    raw: &str,
    max_len: usize,
) -> Result<String, WireError> {
    let base = raw
        .split(ADDRESS_PARAM_SEPARATOR)
        .next()
        .unwrap_or_default()
        .trim();

    if base.is_empty() {
        return Err(WireError::EmptyAddress { event });
    }
    if base.len() > max_len {
        return Err(WireError::AddressTooLong {
            event,
            len: base.len(),
            max: max_len,
        });
    }
    Ok(base.to_string())
}

// ── Outbound ─────────────────────────────────────────────────────────────────

/// A message pushed from the relay to a client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Broadcast answer to a list-request.
    Peers { tag: String, peers: Vec<String> },
    /// Rejection of a malformed event, sent to the originating session only.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<String>,
        reason: String,
    },
    /// A new address entered the registry.
    PeerJoined { address: String },
    /// An address left the registry.
    PeerLeft { address: String },
}

impl ServerMessage {
    pub fn rejection(err: &WireError) -> Self {
        Self::Error {
            event: err.event().map(str::to_string),
            reason: err.to_string(),
        }
    }

    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(|e| WireError::Encode(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(|e| WireError::InvalidJson(e.to_string()))
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("invalid frame: {0}")]
    InvalidJson(String),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("{event}: missing field `{field}`")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },

    #[error("{event}: address is empty")]
    EmptyAddress { event: &'static str },

    #[error("{event}: address length {len} exceeds maximum {max}")]
    AddressTooLong {
        event: &'static str,
        len: usize,
        max: usize,
    },

    #[error("binary frames must be UTF-8 JSON")]
    BinaryFrame,

    #[error("failed to encode frame: {0}")]
    Encode(String),
}

impl WireError {
    /// The event kind the error belongs to, when it got that far.
    pub fn event(&self) -> Option<&str> {
        match self {
            Self::MissingField { event, .. }
            | Self::EmptyAddress { event }
            | Self::AddressTooLong { event, .. } => Some(*event),
            Self::UnknownEvent(name) => Some(name.as_str()),
            Self::InvalidJson(_) | Self::BinaryFrame | Self::Encode(_) => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
