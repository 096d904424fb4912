use super::*;
use crate::error::Result;

fn request(now: Instant, rto: Duration) -> ConnectionRequest {
    ConnectionRequest::new(
        TransactionId::new(),
        vec![1, 2, 3],
        now,
        0,
        false,
        rto,
    )
}

#[test]
fn test_initial_rto() {
    assert_eq!(
        initial_rto(Duration::from_secs(0), DEFAULT_RTO),
        Duration::from_millis(500)
    );
    assert_eq!(
        initial_rto(Duration::from_millis(400), DEFAULT_RTO),
        Duration::from_millis(800)
    );
    assert_eq!(
        initial_rto(Duration::from_secs(30), DEFAULT_RTO),
        MAX_RTO,
        "twice a huge RTT is capped"
    );
}

#[test]
fn test_match_by_transaction_id() -> Result<()> {
    let now = Instant::now();
    let mut mgr = StunRequestManager::default();

    let req = request(now, DEFAULT_RTO);
    let id = req.id;
    mgr.send(req);

    assert!(mgr.has(id));
    assert!(mgr.handle_response(TransactionId::new()).is_none());
    assert!(mgr.has(id), "foreign response must not consume");

    let matched = mgr.handle_response(id).expect("in-flight");
    assert_eq!(matched.sent_time, now);
    assert!(mgr.is_empty());

    // A duplicate response falls out of the table silently.
    assert!(mgr.handle_response(id).is_none());

    Ok(())
}

#[test]
fn test_backoff_schedule() -> Result<()> {
    let now = Instant::now();
    let rto = Duration::from_millis(500);
    let mut mgr = StunRequestManager::default();
    mgr.send(request(now, rto));

    // Nothing is due before the first RTO elapses.
    let c = mgr.collect(now + Duration::from_millis(499));
    assert!(c.retransmits.is_empty() && c.timeouts.is_empty());

    // Intervals double per retransmit: 1x, 2x, 4x, 8x, 16x RTO with the
    // per-interval cap; attempts 2..=6 are retransmits, the 7th exhausts.
    let mut at = now + rto;
    let mut sent = 1;
    loop {
        let c = mgr.collect(at);
        if !c.timeouts.is_empty() {
            assert_eq!(sent, MAX_REQUEST_ATTEMPTS, "all attempts used first");
            assert!(c.retransmits.is_empty());
            break;
        }
        assert_eq!(c.retransmits.len(), 1);
        sent += 1;
        let exp = sent - 1;
        let delay = std::cmp::min(rto * (1 << exp), MAX_RTO);
        at += delay;
    }
    assert!(mgr.is_empty(), "timed-out transaction is forgotten");

    Ok(())
}

#[test]
fn test_cancel_all_is_silent() -> Result<()> {
    let now = Instant::now();
    let mut mgr = StunRequestManager::default();
    mgr.send(request(now, DEFAULT_RTO));
    mgr.send(request(now, DEFAULT_RTO));
    assert_eq!(mgr.len(), 2);

    mgr.cancel_all();
    assert!(mgr.is_empty());

    let c = mgr.collect(now + Duration::from_secs(60));
    assert!(c.retransmits.is_empty());
    assert!(c.timeouts.is_empty());

    Ok(())
}
