use std::net::SocketAddr;
use std::str::FromStr;

use super::*;
use crate::error::Result;

pub(crate) fn host_candidate(addr: &str) -> Candidate {
    Candidate {
        addr: SocketAddr::from_str(addr).unwrap(),
        protocol: Protocol::Udp,
        candidate_type: CandidateType::Host,
        ..Default::default()
    }
}

#[test]
fn test_candidate_priority() -> Result<()> {
    let tests = vec![
        (CandidateType::Host, 2130706431),
        (CandidateType::PeerReflexive, 1862270975),
        (CandidateType::ServerReflexive, 1694498815),
        (CandidateType::Relay, 16777215),
    ];

    for (candidate_type, expected) in tests {
        let c = Candidate {
            candidate_type,
            ..Default::default()
        };
        assert_eq!(
            c.priority(),
            expected,
            "Candidate({candidate_type}) priority mismatch"
        );
    }

    Ok(())
}

#[test]
fn test_candidate_priority_override() -> Result<()> {
    let c = Candidate {
        candidate_type: CandidateType::Host,
        priority: 12345,
        ..Default::default()
    };
    assert_eq!(c.priority(), 12345);
    Ok(())
}

#[test]
fn test_prflx_priority() -> Result<()> {
    let c = host_candidate("10.0.0.1:4000");
    let p = c.prflx_priority();
    assert_eq!(p >> 24, u32::from(CandidateType::PeerReflexive.preference()));
    assert_eq!(p & 0x00ff_ffff, c.priority() & 0x00ff_ffff);
    Ok(())
}

#[test]
fn test_candidate_pair_priority() -> Result<()> {
    let host = host_candidate("0.0.0.0:0").priority();
    let prflx = Candidate {
        candidate_type: CandidateType::PeerReflexive,
        ..Default::default()
    }
    .priority();

    assert_eq!(
        candidate_pair_priority(false, host, host),
        9151314440652587007
    );
    assert_eq!(
        candidate_pair_priority(true, host, host),
        9151314440652587007
    );
    assert_eq!(
        candidate_pair_priority(true, host, prflx),
        7998392936314175488
    );
    assert_eq!(
        candidate_pair_priority(false, host, prflx),
        7998392936314175487
    );

    Ok(())
}

#[test]
fn test_peer_reflexive_upgrade() -> Result<()> {
    let local = host_candidate("192.168.1.1:2000");
    let mapped = SocketAddr::from_str("73.5.1.2:31000").unwrap();

    let prflx = local.to_peer_reflexive(mapped);
    assert_eq!(prflx.candidate_type, CandidateType::PeerReflexive);
    assert_eq!(prflx.addr, mapped);
    assert!(!prflx.equal(&local));
    assert_ne!(prflx.foundation(), local.foundation());

    Ok(())
}

#[test]
fn test_candidate_foundation_stability() -> Result<()> {
    let a = host_candidate("10.0.0.1:1111");
    let mut b = host_candidate("10.0.0.1:9999");
    // Same type, base address and protocol share a foundation; port is
    // not part of the hash.
    assert_eq!(a.foundation(), b.foundation());

    b.candidate_type = CandidateType::ServerReflexive;
    assert_ne!(a.foundation(), b.foundation());

    Ok(())
}

#[test]
fn test_candidate_serialization() -> Result<()> {
    let c = host_candidate("10.0.0.1:4000");
    let json = serde_json::to_string(&c).expect("serializable");
    assert!(json.contains("\"host\""));
    assert!(json.contains("\"udp\""));
    assert!(json.contains("10.0.0.1:4000"));
    Ok(())
}

#[test]
fn test_candidate_pair_state_from_u8() {
    for (v, expected) in [
        (1u8, CandidatePairState::Waiting),
        (2, CandidatePairState::InProgress),
        (3, CandidatePairState::Failed),
        (4, CandidatePairState::Succeeded),
        (9, CandidatePairState::Unspecified),
    ] {
        assert_eq!(CandidatePairState::from(v), expected);
    }
}
