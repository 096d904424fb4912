#[cfg(test)]
mod attr_test;

use std::fmt;

use ring::hmac;
use stun::attributes::*;
use stun::message::*;

/// NOMINATION, from the ICE re-nomination draft.
pub const ATTR_NOMINATION: AttrType = AttrType(0xC001);
/// GOOG-NETWORK-INFO, network id and cost of the sending interface.
pub const ATTR_GOOG_NETWORK_INFO: AttrType = AttrType(0xC057);
/// GOOG-MISC-INFO, a list of uint16 tagged by position.
pub const ATTR_GOOG_MISC_INFO: AttrType = AttrType(0xC059);
/// GOOG-DELTA, opaque piggybacked payload.
pub const ATTR_GOOG_DELTA: AttrType = AttrType(0xC05B);
/// GOOG-DELTA-ACK, acknowledgement for a previously sent GOOG-DELTA.
pub const ATTR_GOOG_DELTA_ACK: AttrType = AttrType(0xC05C);
/// GOOG-MESSAGE-INTEGRITY-32, reduced HMAC trailer used by GOOG_PING.
pub const ATTR_GOOG_MESSAGE_INTEGRITY_32: AttrType = AttrType(0xC060);
/// META-DTLS-IN-STUN, handshake bytes piggybacked on a check.
pub const ATTR_GOOG_DTLS_IN_STUN: AttrType = AttrType(0xC070);

/// Position of the goog-ping version in GOOG-MISC-INFO, both directions.
pub const GOOG_MISC_INFO_PING_VERSION_INDEX: usize = 0;
/// Version of the goog-ping handshake this implementation speaks.
pub const SUPPORT_GOOG_PING_VERSION: u16 = 1;

const GOOG_PING_REQUEST_TYPE: u16 = 0x200;
const GOOG_PING_RESPONSE_TYPE: u16 = 0x300;
const GOOG_PING_ERROR_RESPONSE_TYPE: u16 = 0x310;

fn goog_message_type(value: u16) -> MessageType {
    let mut typ = MessageType::new(METHOD_BINDING, CLASS_REQUEST);
    typ.read_value(value);
    typ
}

/// GOOG_PING request message type, a compact refresh of a cached Binding Request.
pub fn goog_ping_request() -> MessageType {
    goog_message_type(GOOG_PING_REQUEST_TYPE)
}

/// GOOG_PING success response message type.
pub fn goog_ping_response() -> MessageType {
    goog_message_type(GOOG_PING_RESPONSE_TYPE)
}

/// GOOG_PING error response message type.
pub fn goog_ping_error_response() -> MessageType {
    goog_message_type(GOOG_PING_ERROR_RESPONSE_TYPE)
}

pub fn is_goog_ping_request(typ: MessageType) -> bool {
    typ.value() == GOOG_PING_REQUEST_TYPE
}

pub fn is_goog_ping_response(typ: MessageType) -> bool {
    typ.value() == GOOG_PING_RESPONSE_TYPE
}

/// Common helper for ICE-{CONTROLLED,CONTROLLING} and represents the so-called Tiebreaker number.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub struct TieBreaker(pub u64);

pub(crate) const TIE_BREAKER_SIZE: usize = 8; // 64 bit

impl TieBreaker {
    /// Adds Tiebreaker value to m as t attribute.
    pub fn add_to_as(self, m: &mut Message, t: AttrType) -> Result<(), stun::Error> {
        m.add(t, &self.0.to_be_bytes());
        Ok(())
    }

    /// Decodes Tiebreaker value in message getting it as for t type.
    pub fn get_from_as(&mut self, m: &Message, t: AttrType) -> Result<(), stun::Error> {
        let v = m.get(t)?;
        if v.len() != TIE_BREAKER_SIZE {
            return Err(stun::Error::ErrAttributeSizeInvalid);
        }
        self.0 = u64::from_be_bytes([v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]]);
        Ok(())
    }
}

/// Represents ICE-CONTROLLED attribute.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub struct AttrControlled(pub u64);

impl Setter for AttrControlled {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        TieBreaker(self.0).add_to_as(m, ATTR_ICE_CONTROLLED)
    }
}

impl Getter for AttrControlled {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        let mut t = TieBreaker::default();
        t.get_from_as(m, ATTR_ICE_CONTROLLED)?;
        self.0 = t.0;
        Ok(())
    }
}

/// Represents ICE-CONTROLLING attribute.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub struct AttrControlling(pub u64);

impl Setter for AttrControlling {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        TieBreaker(self.0).add_to_as(m, ATTR_ICE_CONTROLLING)
    }
}

impl Getter for AttrControlling {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        let mut t = TieBreaker::default();
        t.get_from_as(m, ATTR_ICE_CONTROLLING)?;
        self.0 = t.0;
        Ok(())
    }
}

/// Represents PRIORITY attribute.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub struct PriorityAttr(pub u32);

const PRIORITY_SIZE: usize = 4; // 32 bit

impl Setter for PriorityAttr {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        m.add(ATTR_PRIORITY, &self.0.to_be_bytes());
        Ok(())
    }
}

impl Getter for PriorityAttr {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        let v = m.get(ATTR_PRIORITY)?;
        if v.len() != PRIORITY_SIZE {
            return Err(stun::Error::ErrAttributeSizeInvalid);
        }
        self.0 = u32::from_be_bytes([v[0], v[1], v[2], v[3]]);
        Ok(())
    }
}

/// Represents USE-CANDIDATE attribute.
#[derive(Default)]
pub struct UseCandidateAttr;

impl Setter for UseCandidateAttr {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        m.add(ATTR_USE_CANDIDATE, &[]);
        Ok(())
    }
}

impl UseCandidateAttr {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns true if USE-CANDIDATE attribute is set.
    #[must_use]
    pub fn is_set(m: &Message) -> bool {
        m.get(ATTR_USE_CANDIDATE).is_ok()
    }
}

/// Represents the NOMINATION attribute carrying a controlling agent's
/// nomination value.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub struct NominationAttr(pub u32);

impl Setter for NominationAttr {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        m.add(ATTR_NOMINATION, &self.0.to_be_bytes());
        Ok(())
    }
}

impl Getter for NominationAttr {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        let v = m.get(ATTR_NOMINATION)?;
        if v.len() != 4 {
            return Err(stun::Error::ErrAttributeSizeInvalid);
        }
        self.0 = u32::from_be_bytes([v[0], v[1], v[2], v[3]]);
        Ok(())
    }
}

/// Represents GOOG-NETWORK-INFO, the id and cost of the network interface
/// a check was sent from, packed into one 32-bit value.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub struct GoogNetworkInfo {
    pub network_id: u16,
    pub network_cost: u16,
}

impl Setter for GoogNetworkInfo {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        let v = (u32::from(self.network_id) << 16) | u32::from(self.network_cost);
        m.add(ATTR_GOOG_NETWORK_INFO, &v.to_be_bytes());
        Ok(())
    }
}

impl Getter for GoogNetworkInfo {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        let v = m.get(ATTR_GOOG_NETWORK_INFO)?;
        if v.len() != 4 {
            return Err(stun::Error::ErrAttributeSizeInvalid);
        }
        let value = u32::from_be_bytes([v[0], v[1], v[2], v[3]]);
        self.network_id = (value >> 16) as u16;
        self.network_cost = (value & 0xFFFF) as u16;
        Ok(())
    }
}

/// Represents GOOG-MISC-INFO, a position-tagged list of uint16 values.
#[derive(Default, PartialEq, Eq, Debug, Clone)]
pub struct GoogMiscInfo(pub Vec<u16>);

impl Setter for GoogMiscInfo {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        let mut v = Vec::with_capacity(self.0.len() * 2);
        for x in &self.0 {
            v.extend_from_slice(&x.to_be_bytes());
        }
        m.add(ATTR_GOOG_MISC_INFO, &v);
        Ok(())
    }
}

impl Getter for GoogMiscInfo {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        let v = m.get(ATTR_GOOG_MISC_INFO)?;
        if v.len() % 2 != 0 {
            return Err(stun::Error::ErrAttributeSizeInvalid);
        }
        self.0 = v.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
        Ok(())
    }
}

impl GoogMiscInfo {
    /// Returns the goog-ping version advertised in the list, if any.
    pub fn ping_version(&self) -> Option<u16> {
        self.0.get(GOOG_MISC_INFO_PING_VERSION_INDEX).copied()
    }
}

/// Represents GOOG-DELTA, an opaque byte string piggybacked on a check.
#[derive(Default, PartialEq, Eq, Debug, Clone)]
pub struct GoogDelta(pub Vec<u8>);

impl Setter for GoogDelta {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        m.add(ATTR_GOOG_DELTA, &self.0);
        Ok(())
    }
}

impl Getter for GoogDelta {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        self.0 = m.get(ATTR_GOOG_DELTA)?;
        Ok(())
    }
}

/// Represents GOOG-DELTA-ACK, a 64-bit acknowledgement for GOOG-DELTA.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub struct GoogDeltaAck(pub u64);

impl Setter for GoogDeltaAck {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        m.add(ATTR_GOOG_DELTA_ACK, &self.0.to_be_bytes());
        Ok(())
    }
}

impl Getter for GoogDeltaAck {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        let v = m.get(ATTR_GOOG_DELTA_ACK)?;
        if v.len() != 8 {
            return Err(stun::Error::ErrAttributeSizeInvalid);
        }
        self.0 = u64::from_be_bytes([v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]]);
        Ok(())
    }
}

/// Represents META-DTLS-IN-STUN, opaque handshake bytes carried by a check
/// or its response.
#[derive(Default, PartialEq, Eq, Debug, Clone)]
pub struct GoogDtlsInStun(pub Vec<u8>);

impl Setter for GoogDtlsInStun {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        m.add(ATTR_GOOG_DTLS_IN_STUN, &self.0);
        Ok(())
    }
}

impl Getter for GoogDtlsInStun {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        self.0 = m.get(ATTR_GOOG_DTLS_IN_STUN)?;
        Ok(())
    }
}

pub(crate) const MESSAGE_INTEGRITY_32_SIZE: usize = 4;

fn new_hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mac = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key);
    hmac::sign(&mac, message).as_ref().to_vec()
}

fn nearest_padded_value_length(l: usize) -> usize {
    let mut n = 4 * (l / 4);
    if n < l {
        n += 4;
    }
    n
}

/// Represents GOOG-MESSAGE-INTEGRITY-32, the reduced 4-byte HMAC-SHA1
/// trailer of GOOG_PING messages, keyed with the short-term credential.
#[derive(Default, Clone)]
pub struct MessageIntegrity32(pub Vec<u8>);

impl fmt::Display for MessageIntegrity32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KEY: 0x{:x?}", self.0)
    }
}

impl MessageIntegrity32 {
    /// Returns a trailer keyed for short-term credentials.
    /// Password must be SASL-prepared.
    pub fn new_short_term_integrity(password: String) -> Self {
        Self(password.as_bytes().to_vec())
    }

    /// Checks the GOOG-MESSAGE-INTEGRITY-32 attribute.
    pub fn check(&self, m: &mut Message) -> Result<(), stun::Error> {
        let v = m.get(ATTR_GOOG_MESSAGE_INTEGRITY_32)?;
        if v.len() != MESSAGE_INTEGRITY_32_SIZE {
            return Err(stun::Error::ErrAttributeSizeInvalid);
        }

        // Adjust the header length to what it was when the HMAC was
        // computed, i.e. without any attribute following the trailer.
        let length = m.length;
        let mut after_integrity = false;
        let mut size_reduced = 0usize;
        for a in &m.attributes.0 {
            if after_integrity {
                size_reduced += nearest_padded_value_length(a.length as usize);
                size_reduced += ATTRIBUTE_HEADER_SIZE;
            }
            if a.typ == ATTR_GOOG_MESSAGE_INTEGRITY_32 {
                after_integrity = true;
            }
        }
        m.length -= size_reduced as u32;
        m.write_length();

        let start_of_hmac = MESSAGE_HEADER_SIZE + m.length as usize
            - (ATTRIBUTE_HEADER_SIZE + MESSAGE_INTEGRITY_32_SIZE);
        let expected = new_hmac(&self.0, &m.raw[..start_of_hmac]);

        m.length = length;
        m.write_length();

        if v[..] != expected[..MESSAGE_INTEGRITY_32_SIZE] {
            return Err(stun::Error::ErrIntegrityMismatch);
        }
        Ok(())
    }
}

impl Setter for MessageIntegrity32 {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        for a in &m.attributes.0 {
            // Message should not contain FINGERPRINT attribute before the trailer.
            if a.typ == ATTR_FINGERPRINT {
                return Err(stun::Error::ErrFingerprintBeforeIntegrity);
            }
        }

        let length = m.length;
        // Adjusting m.length to contain the trailer TLV.
        m.length += (MESSAGE_INTEGRITY_32_SIZE + ATTRIBUTE_HEADER_SIZE) as u32;
        m.write_length();
        let v = new_hmac(&self.0, &m.raw);
        m.length = length;

        m.add(ATTR_GOOG_MESSAGE_INTEGRITY_32, &v[..MESSAGE_INTEGRITY_32_SIZE]);

        Ok(())
    }
}
