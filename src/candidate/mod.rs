#[cfg(test)]
mod candidate_test;

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crc::{Crc, CRC_32_ISCSI};
use serde::Serialize;

pub(crate) const DEFAULT_LOCAL_PREFERENCE: u16 = 65535;

/// Indicates that the candidate is used for RTP.
pub(crate) const COMPONENT_RTP: u16 = 1;

/// Transport protocol of a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Protocol {
    #[serde(rename = "udp")]
    Udp,
    #[serde(rename = "tcp")]
    Tcp,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::Udp
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        };
        write!(f, "{s}")
    }
}

/// Represents the type of candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CandidateType {
    #[serde(rename = "unspecified")]
    Unspecified,
    #[serde(rename = "host")]
    Host,
    #[serde(rename = "srflx")]
    ServerReflexive,
    #[serde(rename = "prflx")]
    PeerReflexive,
    #[serde(rename = "relay")]
    Relay,
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relay => "relay",
            CandidateType::Unspecified => "Unknown candidate type",
        };
        write!(f, "{s}")
    }
}

impl Default for CandidateType {
    fn default() -> Self {
        Self::Unspecified
    }
}

impl CandidateType {
    /// Returns the preference weight of a `CandidateType`.
    ///
    /// 4.1.2.2.  Guidelines for Choosing Type and Local Preferences
    /// The RECOMMENDED values are 126 for host candidates, 100
    /// for server reflexive candidates, 110 for peer reflexive candidates,
    /// and 0 for relayed candidates.
    #[must_use]
    pub const fn preference(self) -> u16 {
        match self {
            Self::Host => 126,
            Self::PeerReflexive => 110,
            Self::ServerReflexive => 100,
            Self::Relay | CandidateType::Unspecified => 0,
        }
    }
}

/// Endpoint descriptor for one end of a candidate pair.
#[derive(Clone, Debug, Serialize)]
pub struct Candidate {
    pub addr: SocketAddr,
    pub protocol: Protocol,
    pub candidate_type: CandidateType,
    pub component: u16,
    /// Explicit priority; 0 means derive from the RFC 5245 formula.
    pub priority: u32,
    pub ufrag: String,
    pub pwd: String,
    pub generation: u32,
    pub network_cost: u16,
    pub network_id: u16,
    /// STUN/TURN server this candidate was gathered from, when any.
    pub url: String,
    /// Explicit foundation; empty means derive from type/address/protocol.
    pub foundation: String,
}

impl Default for Candidate {
    fn default() -> Self {
        Self {
            addr: unspecified_addr(),
            protocol: Protocol::default(),
            candidate_type: CandidateType::default(),
            component: COMPONENT_RTP,
            priority: 0,
            ufrag: String::new(),
            pwd: String::new(),
            generation: 0,
            network_cost: 0,
            network_id: 0,
            url: String::new(),
            foundation: String::new(),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{}",
            self.protocol,
            self.candidate_type,
            self.addr.ip(),
            self.addr.port(),
        )
    }
}

impl Candidate {
    /// Returns a host candidate with defaults suitable for tests and
    /// peer-reflexive derivation.
    pub fn host(addr: SocketAddr, ufrag: String, pwd: String) -> Self {
        Self {
            addr,
            protocol: Protocol::Udp,
            candidate_type: CandidateType::Host,
            component: COMPONENT_RTP,
            ufrag,
            pwd,
            ..Default::default()
        }
    }

    /// Computes the priority for this ICE candidate.
    pub fn priority(&self) -> u32 {
        if self.priority != 0 {
            return self.priority;
        }

        // The local preference MUST be an integer from 0 (lowest preference) to
        // 65535 (highest preference) inclusive.  When there is only a single IP
        // address, this value SHOULD be set to 65535.
        (1 << 24) * u32::from(self.candidate_type.preference())
            + (1 << 8) * u32::from(DEFAULT_LOCAL_PREFERENCE)
            + (256 - u32::from(self.component))
    }

    /// The priority a check on this candidate advertises for the
    /// peer-reflexive candidate it may create on the remote side
    /// (RFC 5245 §4.1.2.1, type preference replaced with prflx).
    pub fn prflx_priority(&self) -> u32 {
        (u32::from(CandidateType::PeerReflexive.preference()) << 24)
            | (self.priority() & 0x00FF_FFFF)
    }

    /// An arbitrary string, the same for two candidates that have the same
    /// type, base IP address and protocol.
    pub fn foundation(&self) -> String {
        if !self.foundation.is_empty() {
            return self.foundation.clone();
        }

        let mut buf = vec![];
        buf.extend_from_slice(self.candidate_type.to_string().as_bytes());
        buf.extend_from_slice(self.addr.ip().to_string().as_bytes());
        buf.extend_from_slice(self.protocol.to_string().as_bytes());

        let checksum = Crc::<u32>::new(&CRC_32_ISCSI).checksum(&buf);

        format!("{checksum}")
    }

    /// Used to compare two candidates.
    pub fn equal(&self, other: &Candidate) -> bool {
        self.protocol == other.protocol
            && self.candidate_type == other.candidate_type
            && self.addr == other.addr
    }

    /// Same endpoint regardless of how the candidate was learned.
    pub fn equal_modulo_type(&self, other: &Candidate) -> bool {
        self.protocol == other.protocol && self.addr == other.addr
    }

    /// Derives the peer-reflexive candidate a check response revealed at
    /// `mapped`, inheriting everything but address and type.
    pub fn to_peer_reflexive(&self, mapped: SocketAddr) -> Candidate {
        let mut c = self.clone();
        c.addr = mapped;
        c.candidate_type = CandidateType::PeerReflexive;
        c.priority = 0;
        c.foundation = String::new();
        c
    }
}

/// Represent the ICE candidate pair state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CandidatePairState {
    #[serde(rename = "unspecified")]
    Unspecified = 0,

    /// Means a check has not been performed for this pair.
    #[serde(rename = "waiting")]
    Waiting = 1,

    /// Means a check has been sent for this pair, but the transaction is in progress.
    #[serde(rename = "in-progress")]
    InProgress = 2,

    /// Means a check for this pair was already done and failed, either never producing any response
    /// or producing an unrecoverable failure response.
    #[serde(rename = "failed")]
    Failed = 3,

    /// Means a check for this pair was already done and produced a successful result.
    #[serde(rename = "succeeded")]
    Succeeded = 4,
}

impl From<u8> for CandidatePairState {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Waiting,
            2 => Self::InProgress,
            3 => Self::Failed,
            4 => Self::Succeeded,
            _ => Self::Unspecified,
        }
    }
}

impl Default for CandidatePairState {
    fn default() -> Self {
        Self::Unspecified
    }
}

impl fmt::Display for CandidatePairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Waiting => "waiting",
            Self::InProgress => "in-progress",
            Self::Failed => "failed",
            Self::Succeeded => "succeeded",
            Self::Unspecified => "unspecified",
        };

        write!(f, "{s}")
    }
}

/// Short-term ICE credentials for one agent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IceParameters {
    pub ufrag: String,
    pub pwd: String,
}

/// RFC 5245 - 5.7.2.  Computing Pair Priority and Ordering Pairs
/// Let G be the priority for the candidate provided by the controlling
/// agent.  Let D be the priority for the candidate provided by the
/// controlled agent.
/// pair priority = 2^32*MIN(G,D) + 2*MAX(G,D) + (G>D?1:0)
pub fn candidate_pair_priority(controlling: bool, local: u32, remote: u32) -> u64 {
    let (g, d) = if controlling {
        (local, remote)
    } else {
        (remote, local)
    };

    // 1<<32 overflows uint32; and if both g && d are
    // maxUint32, this result would overflow uint64
    ((1 << 32_u64) - 1) * u64::from(std::cmp::min(g, d))
        + 2 * u64::from(std::cmp::max(g, d))
        + u64::from(g > d)
}

pub(crate) fn unspecified_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::from([0, 0, 0, 0]), 0)
}
