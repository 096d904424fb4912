use stun::fingerprint::FINGERPRINT;
use stun::textattrs::Username;

use super::*;
use crate::error::Result;

#[test]
fn test_tie_breaker_round_trip() -> Result<()> {
    let mut m = Message::new();
    m.build(&[
        Box::new(BINDING_REQUEST),
        Box::new(AttrControlling(4321)),
    ])?;

    let mut m1 = Message::new();
    m1.write(&m.raw)?;

    let mut c = AttrControlling::default();
    c.get_from(&m1)?;
    assert_eq!(c.0, 4321, "not equal");

    let mut controlled = AttrControlled::default();
    let result = controlled.get_from(&m1);
    if let Err(err) = result {
        assert_eq!(err, stun::Error::ErrAttributeNotFound, "unexpected error");
    } else {
        panic!("expected error, but got ok");
    }

    Ok(())
}

#[test]
fn test_priority_and_nomination_round_trip() -> Result<()> {
    let mut m = Message::new();
    m.build(&[
        Box::new(BINDING_REQUEST),
        Box::new(PriorityAttr(1845501695)),
        Box::new(NominationAttr(7)),
    ])?;

    let mut m1 = Message::new();
    m1.write(&m.raw)?;

    let mut p = PriorityAttr::default();
    p.get_from(&m1)?;
    assert_eq!(p.0, 1845501695);

    let mut n = NominationAttr::default();
    n.get_from(&m1)?;
    assert_eq!(n.0, 7);

    //"IncorrectSize"
    {
        let mut m2 = Message::new();
        m2.add(ATTR_NOMINATION, &[0; 100]);
        let mut n2 = NominationAttr::default();
        let result = n2.get_from(&m2);
        if let Err(err) = result {
            assert_eq!(err, stun::Error::ErrAttributeSizeInvalid);
        } else {
            panic!("expected error, but got ok");
        }
    }

    Ok(())
}

#[test]
fn test_goog_network_info_round_trip() -> Result<()> {
    let mut m = Message::new();
    m.build(&[
        Box::new(BINDING_REQUEST),
        Box::new(GoogNetworkInfo {
            network_id: 3,
            network_cost: 900,
        }),
    ])?;

    let mut info = GoogNetworkInfo::default();
    info.get_from(&m)?;
    assert_eq!(info.network_id, 3);
    assert_eq!(info.network_cost, 900);

    //"IncorrectSize"
    {
        let mut m2 = Message::new();
        m2.add(ATTR_GOOG_NETWORK_INFO, &[0; 2]);
        let mut info2 = GoogNetworkInfo::default();
        let result = info2.get_from(&m2);
        if let Err(err) = result {
            assert_eq!(err, stun::Error::ErrAttributeSizeInvalid);
        } else {
            panic!("expected error, but got ok");
        }
    }

    Ok(())
}

#[test]
fn test_goog_misc_info_ping_version() -> Result<()> {
    let mut m = Message::new();
    m.build(&[
        Box::new(BINDING_REQUEST),
        Box::new(GoogMiscInfo(vec![SUPPORT_GOOG_PING_VERSION])),
    ])?;

    let mut info = GoogMiscInfo::default();
    info.get_from(&m)?;
    assert_eq!(info.ping_version(), Some(SUPPORT_GOOG_PING_VERSION));

    Ok(())
}

#[test]
fn test_goog_delta_round_trip() -> Result<()> {
    let payload = vec![0xde, 0xad, 0xbe, 0xef, 0x01];

    let mut m = Message::new();
    m.build(&[
        Box::new(BINDING_REQUEST),
        Box::new(GoogDelta(payload.clone())),
        Box::new(GoogDeltaAck(0x1122334455667788)),
    ])?;

    let mut delta = GoogDelta::default();
    delta.get_from(&m)?;
    assert_eq!(delta.0, payload);

    let mut ack = GoogDeltaAck::default();
    ack.get_from(&m)?;
    assert_eq!(ack.0, 0x1122334455667788);

    Ok(())
}

#[test]
fn test_goog_ping_message_types() {
    assert!(is_goog_ping_request(goog_ping_request()));
    assert!(is_goog_ping_response(goog_ping_response()));
    assert!(!is_goog_ping_request(BINDING_REQUEST));
    assert!(!is_goog_ping_response(goog_ping_error_response()));
}

#[test]
fn test_message_integrity_32_check() -> Result<()> {
    let pwd = "somepassword".to_owned();

    let mut m = Message::new();
    m.build(&[
        Box::new(goog_ping_request()),
        Box::new(stun::agent::TransactionId::new()),
        Box::new(MessageIntegrity32::new_short_term_integrity(pwd.clone())),
    ])?;

    let mut decoded = Message::new();
    decoded.write(&m.raw)?;

    let i = MessageIntegrity32::new_short_term_integrity(pwd);
    i.check(&mut decoded)?;

    let wrong = MessageIntegrity32::new_short_term_integrity("wrong".to_owned());
    let result = wrong.check(&mut decoded);
    if let Err(err) = result {
        assert_eq!(err, stun::Error::ErrIntegrityMismatch);
    } else {
        panic!("expected error, but got ok");
    }

    Ok(())
}

#[test]
fn test_full_binding_request_shape() -> Result<()> {
    // The attribute order of a connectivity check.
    let mut m = Message::new();
    m.build(&[
        Box::new(BINDING_REQUEST),
        Box::new(stun::agent::TransactionId::new()),
        Box::new(Username::new(ATTR_USERNAME, "remote:local".to_owned())),
        Box::new(AttrControlling(1)),
        Box::new(PriorityAttr(1)),
        Box::new(stun::integrity::MessageIntegrity::new_short_term_integrity(
            "pwd".to_owned(),
        )),
        Box::new(FINGERPRINT),
    ])?;

    assert!(m.contains(ATTR_USERNAME));
    assert!(m.contains(ATTR_ICE_CONTROLLING));
    assert!(m.contains(ATTR_PRIORITY));
    assert!(m.contains(ATTR_MESSAGE_INTEGRITY));
    assert!(m.contains(ATTR_FINGERPRINT));

    Ok(())
}
