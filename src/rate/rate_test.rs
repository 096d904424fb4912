use super::*;
use crate::error::Result;

#[test]
fn test_rate_over_full_window() -> Result<()> {
    let mut t = RateTracker::new(Duration::from_millis(100), 10);
    let start = Instant::now();

    // 100 bytes every 100ms for one second = 1000 bytes/s.
    for i in 0..10u64 {
        t.update(start + Duration::from_millis(i * 100), 100);
    }

    let rate = t.rate(start + Duration::from_millis(900));
    assert!((rate - 1000.0).abs() < 1.0, "unexpected rate {rate}");
    assert_eq!(t.total_bytes(), 1000);
    assert_eq!(t.total_packets(), 10);

    Ok(())
}

#[test]
fn test_rate_decays_when_idle() -> Result<()> {
    let mut t = RateTracker::new(Duration::from_millis(100), 10);
    let start = Instant::now();

    t.update(start, 500);
    assert!(t.rate(start) > 0.0);

    // Idle past the window: the rate is zero but totals survive.
    let rate = t.rate(start + Duration::from_secs(2));
    assert_eq!(rate, 0.0);
    assert_eq!(t.total_bytes(), 500);

    // New traffic after the idle gap starts a fresh window.
    t.update(start + Duration::from_secs(3), 200);
    assert!(t.rate(start + Duration::from_secs(3)) > 0.0);
    assert_eq!(t.total_bytes(), 700);

    Ok(())
}

#[test]
fn test_empty_tracker() -> Result<()> {
    let t = RateTracker::default();
    assert_eq!(t.rate(Instant::now()), 0.0);
    assert_eq!(t.total_packets(), 0);
    Ok(())
}
