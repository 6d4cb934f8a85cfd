//! On-wire frame representation, as handed to the core by the (external)
//! frame parser/transport layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::header::{Code, Header, PartyId, Verb};

/// Derive the canonical header for a set of addressing fields.
///
/// RAMSES-II headers key on whichever party is *not* the gateway issuing
/// the request: outbound-shaped verbs (`RQ`, `W`) key on the destination
/// (the device being asked to act), inbound-shaped verbs (`I`, `RP`) key
/// on the source (the device reporting or replying). This is what makes a
/// command's `rx_header` equal the header of the reply packet it expects,
/// even though the command names the device as `dst` and the reply packet
/// names it as `src`.
pub fn compute_header(code: Code, verb: Verb, src: &PartyId, dst: &PartyId, ctx: Option<String>) -> Header {
    let party_id = match verb {
        Verb::RQ | Verb::W => dst.clone(),
        Verb::I | Verb::RP => src.clone(),
    };
    Header::new(code, verb, party_id, ctx)
}

/// An immutable on-wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Canonical routing header, see [`compute_header`].
    pub hdr: Header,
    /// Message type code.
    pub code: Code,
    /// Message verb.
    pub verb: Verb,
    /// Originating device id.
    pub src: PartyId,
    /// Destination device id.
    pub dst: PartyId,
    /// Secondary sub-key (zone index, fragment index, …), if any.
    pub ctx: Option<String>,
    /// Timestamp the frame was observed on the wire.
    pub dtm: DateTime<Utc>,
    /// Raw ASCII payload, still hex-encoded as received.
    pub payload: String,
}

impl Packet {
    /// Construct a packet, deriving its canonical header from the
    /// addressing fields.
    pub fn new(
        code: Code,
        verb: Verb,
        src: PartyId,
        dst: PartyId,
        ctx: Option<String>,
        dtm: DateTime<Utc>,
        payload: impl Into<String>,
    ) -> Self {
        let hdr = compute_header(code, verb, &src, &dst, ctx.clone());
        Self {
            hdr,
            code,
            verb,
            src,
            dst,
            ctx,
            dtm,
            payload: payload.into(),
        }
    }
}
