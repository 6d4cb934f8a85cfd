//! Decoded messages, as stored in the [`crate::index::MessageIndex`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::header::{Code, Header, PartyId, Verb};
use crate::packet::Packet;

/// Compute the `plk` key: the ordered non-null payload keys joined and
/// framed with `|`, so that `contains(plk = "some_key")` can be answered
/// with a plain substring match against `"|some_key|"` without false
/// positives from key names that are prefixes/suffixes of one another.
pub fn compute_plk(payload: &JsonValue) -> String {
    let keys: Vec<&str> = match payload {
        JsonValue::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k.as_str())
            .collect(),
        _ => Vec::new(),
    };
    if keys.is_empty() {
        return String::new();
    }
    format!("|{}|", keys.join("|"))
}

/// A decoded [`Packet`] with its parsed payload and pre-computed `plk`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Canonical routing header; the primary key in the message index.
    pub hdr: Header,
    /// Message type code.
    pub code: Code,
    /// Message verb.
    pub verb: Verb,
    /// Originating device id.
    pub src: PartyId,
    /// Destination device id.
    pub dst: PartyId,
    /// Secondary sub-key, if any.
    pub ctx: Option<String>,
    /// Timestamp the underlying packet was observed.
    pub dtm: DateTime<Utc>,
    /// Pipe-framed string of non-null payload keys, see [`compute_plk`].
    pub plk: String,
    /// Decoded payload, keyed by field name.
    pub payload: JsonValue,
}

impl Message {
    /// Decode a packet's payload into a [`Message`].
    ///
    /// This core treats frame decoding as an external concern (see
    /// spec's out-of-scope list); this constructor exists so the index
    /// and FSM have a message shape to work with, accepting the already
    /// decoded payload from that external decoder.
    pub fn from_packet(packet: &Packet, payload: JsonValue) -> Self {
        Self {
            hdr: packet.hdr.clone(),
            code: packet.code,
            verb: packet.verb,
            src: packet.src.clone(),
            dst: packet.dst.clone(),
            ctx: packet.ctx.clone(),
            dtm: packet.dtm,
            plk: compute_plk(&payload),
            payload,
        }
    }
}
