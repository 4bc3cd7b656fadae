//! Wire types for the tunnel signaling protocol
//!
//! All structures serialize with camelCase field names to match the broker
//! protocol. Payloads travel double-encoded: the typed payload is serialized
//! to a JSON string, that exact string is signed, and the string rides in
//! the `data` field of a [`SignedEnvelope`].

use serde::{Deserialize, Serialize};

/// Protocol type requested from the broker for new tunnels
pub const PROTOCOL_TYPE_WSS: &str = "wss";

/// Message type used when an inbound message payload cannot be decoded
pub const MESSAGE_TYPE_UNKNOWN_RAW: &str = "UnknownRaw";

/// The `{data, signature}` pair proving a payload originated from a holder
/// of the shared secret. Client identity is attached only on the
/// URL-issuance call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedEnvelope {
    /// Exact serialized JSON payload the signature was computed over
    pub data: String,

    pub signature: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tc_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tc_key: Option<String>,
}

/// Payload sent to request a new tunnel connect URL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub receive_url: String,
    pub protocol_type: String,
}

impl ConnectRequest {
    pub fn new(receive_url: impl Into<String>) -> Self {
        Self {
            receive_url: receive_url.into(),
            protocol_type: PROTOCOL_TYPE_WSS.to_string(),
        }
    }
}

/// Generic broker reply shape; `data` and `signature` are only present on
/// the URL-issuance call
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerReply {
    pub code: i64,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub data: Option<serde_json::Value>,

    #[serde(default)]
    pub signature: Option<String>,
}

/// Decoded contents of a successful URL-issuance reply
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelInfo {
    pub tunnel_id: String,
    pub connect_url: String,
}

/// Tunnel lifecycle event kinds carried by packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketKind {
    Connect,
    Message,
    Close,
}

/// Outbound lifecycle event, addressed to one or more tunnels.
///
/// The wire format is a one-element array of these; see
/// [`BrokerClient::emit_packet`](crate::broker::BrokerClient::emit_packet).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Packet {
    pub tunnel_ids: Vec<String>,

    #[serde(rename = "type")]
    pub kind: PacketKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Inbound lifecycle event relayed by the broker, addressed from a single
/// tunnel. `kind` is kept as a raw string so unrecognized types can be
/// dropped by the dispatcher instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundPacket {
    pub tunnel_id: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Typed message nested as a JSON string inside `Packet.content` when
/// `kind` is `message`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    #[serde(rename = "type")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Decode an inbound message payload into `(message_type, message_content)`.
///
/// Best effort with a documented fallback: a missing payload yields
/// `("UnknownRaw", None)`; a payload that fails to decode or carries no
/// `type` yields `("UnknownRaw", Some(raw))` with the payload passed
/// through undecoded.
pub fn decode_message_content(content: Option<String>) -> (String, Option<String>) {
    let Some(raw) = content else {
        return (MESSAGE_TYPE_UNKNOWN_RAW.to_string(), None);
    };

    match serde_json::from_str::<MessageEnvelope>(&raw) {
        Ok(MessageEnvelope {
            kind: Some(kind),
            content,
        }) => (kind, content),
        _ => (MESSAGE_TYPE_UNKNOWN_RAW.to_string(), Some(raw)),
    }
}
