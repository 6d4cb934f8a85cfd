//! Canonical packet headers and the RAMSES-II device id / verb alphabet.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Sentinel id worn by a bare HGI80-style gateway before it has learned its
/// own address. Headers carrying it are rewritten to the local interface's
/// real id before correlation, see [`Header::with_local_id`].
pub const HGI_DEVICE_ID: &str = "18:000730";

/// RAMSES-II message verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    /// Inform: an unsolicited broadcast or announcement.
    I,
    /// Request.
    RQ,
    /// Reply to a request.
    RP,
    /// Write.
    W,
}

impl Verb {
    /// Two-character wire form, space-padded for the single-letter verbs.
    pub fn as_wire_str(self) -> &'static str {
        match self {
            Verb::I => " I",
            Verb::RQ => "RQ",
            Verb::RP => "RP",
            Verb::W => " W",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_str().trim())
    }
}

impl std::str::FromStr for Verb {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "I" => Ok(Verb::I),
            "RQ" => Ok(Verb::RQ),
            "RP" => Ok(Verb::RP),
            "W" => Ok(Verb::W),
            other => Err(ProtocolError::Malformed(format!("unknown verb {other:?}"))),
        }
    }
}

/// A RAMSES-II device id of the canonical form `NN:DDDDDD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(String);

impl PartyId {
    /// Parse and validate a device id string.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let (class, serial) = raw
            .split_once(':')
            .ok_or_else(|| ProtocolError::Malformed(format!("device id missing ':': {raw:?}")))?;
        if class.len() != 2 || !class.chars().all(|c| c.is_ascii_digit()) {
            return Err(ProtocolError::Malformed(format!(
                "device id class must be 2 digits: {raw:?}"
            )));
        }
        if serial.len() != 6 || !serial.chars().all(|c| c.is_ascii_digit()) {
            return Err(ProtocolError::Malformed(format!(
                "device id serial must be 6 digits: {raw:?}"
            )));
        }
        Ok(Self(raw.to_owned()))
    }

    /// The sentinel gateway id, see [`HGI_DEVICE_ID`].
    pub fn hgi_sentinel() -> Self {
        Self(HGI_DEVICE_ID.to_owned())
    }

    /// Borrow the underlying `NN:DDDDDD` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id is the bare HGI80 sentinel.
    pub fn is_hgi_sentinel(&self) -> bool {
        self.0 == HGI_DEVICE_ID
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A four-hex-digit RAMSES message code, e.g. `2309`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Code(pub u16);

impl Code {
    /// Render as the canonical uppercase 4-hex-digit form.
    pub fn as_hex(&self) -> String {
        format!("{:04X}", self.0)
    }

    /// Parse a 4-hex-digit code string.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        if raw.len() != 4 {
            return Err(ProtocolError::Malformed(format!(
                "code must be 4 hex digits: {raw:?}"
            )));
        }
        u16::from_str_radix(raw, 16)
            .map(Code)
            .map_err(|_| ProtocolError::Malformed(format!("code is not valid hex: {raw:?}")))
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_hex())
    }
}

/// Canonical routing header: `CODE|VERB|PARTY_ID[|CTX]`.
///
/// Used both as the key a command's echo is expected to carry (`tx_header`)
/// and as the key a reply is expected to carry (`rx_header`), and as the
/// primary key of a [`crate::message::Message`] stored in the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Header {
    /// Message type code.
    pub code: Code,
    /// Message verb.
    pub verb: Verb,
    /// Device id the header is addressed to (the echo's source, the
    /// reply's source — whichever party this header correlates against).
    pub party_id: PartyId,
    /// Optional context token: zone index, fragment index, schedule
    /// session id, or similar. `None` when the message type carries no
    /// sub-key.
    pub ctx: Option<String>,
}

impl Header {
    /// Construct a header from its parts.
    pub fn new(code: Code, verb: Verb, party_id: PartyId, ctx: Option<String>) -> Self {
        Self {
            code,
            verb,
            party_id,
            ctx,
        }
    }

    /// Parse the canonical `CODE|VERB|PARTY_ID[|CTX]` string form.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let mut parts = raw.split('|');
        let code = parts
            .next()
            .ok_or_else(|| ProtocolError::Malformed(format!("empty header: {raw:?}")))?;
        let verb = parts
            .next()
            .ok_or_else(|| ProtocolError::Malformed(format!("header missing verb: {raw:?}")))?;
        let party_id = parts.next().ok_or_else(|| {
            ProtocolError::Malformed(format!("header missing party id: {raw:?}"))
        })?;
        let ctx = parts.next().map(|s| s.to_owned());
        if parts.next().is_some() {
            return Err(ProtocolError::Malformed(format!(
                "header has too many fields: {raw:?}"
            )));
        }
        Ok(Self {
            code: Code::parse(code)?,
            verb: verb.parse()?,
            party_id: PartyId::parse(party_id)?,
            ctx,
        })
    }

    /// Return a copy with any occurrence of [`HGI_DEVICE_ID`] in `party_id`
    /// rewritten to `local_id`. Matching in the FSM always normalizes both
    /// the live command headers and incoming packet headers this way before
    /// comparing, so a bare gateway and a gateway that has learned its real
    /// id correlate identically.
    pub fn with_local_id(&self, local_id: &PartyId) -> Self {
        if self.party_id.is_hgi_sentinel() {
            Self {
                party_id: local_id.clone(),
                ..self.clone()
            }
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.code, self.verb, self.party_id)?;
        if let Some(ctx) = &self.ctx {
            write!(f, "|{ctx}")?;
        }
        Ok(())
    }
}
