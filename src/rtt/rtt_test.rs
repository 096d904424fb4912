use super::*;
use crate::error::Result;

#[test]
fn test_first_sample_snaps() -> Result<()> {
    let mut e = RttEstimator::default();
    assert_eq!(e.rtt(), Duration::from_secs(0));

    let now = Instant::now();
    e.add_sample(now, Duration::from_millis(50));

    assert_eq!(e.rtt(), Duration::from_millis(50));
    assert_eq!(e.samples(), 1);
    assert_eq!(e.current_round_trip_time(), Some(Duration::from_millis(50)));
    assert_eq!(e.total_round_trip_time(), Duration::from_millis(50));

    Ok(())
}

#[test]
fn test_smoothing_weight() -> Result<()> {
    let mut e = RttEstimator::default();
    let now = Instant::now();

    e.add_sample(now, Duration::from_millis(80));
    e.add_sample(now + Duration::from_millis(100), Duration::from_millis(160));

    // 80 * 7/8 + 160 * 1/8 = 90
    assert_eq!(e.rtt(), Duration::from_millis(90));
    assert_eq!(
        e.total_round_trip_time(),
        Duration::from_millis(240),
        "total accumulates raw samples"
    );

    Ok(())
}

#[test]
fn test_convergence_predicate() -> Result<()> {
    let mut e = RttEstimator::default();
    let mut now = Instant::now();

    for i in 0..=RTT_CONVERGENCE_SAMPLES {
        assert!(!e.converged(), "converged after only {i} samples");
        e.add_sample(now, Duration::from_millis(40));
        now += Duration::from_millis(500);
    }
    assert!(e.converged());

    e.reset();
    assert!(!e.converged());
    assert_eq!(e.rtt(), Duration::from_secs(0));

    Ok(())
}

#[test]
fn test_event_based_average_decay() -> Result<()> {
    let half_time = Duration::from_secs(1);
    let mut avg = EventBasedExponentialMovingAverage::new(half_time);
    let now = Instant::now();

    assert_eq!(avg.value(), None);

    avg.add_sample(now, 100.0);
    assert_eq!(avg.value(), Some(100.0));

    // One half-life later the old value and the new sample weigh the same.
    avg.add_sample(now + half_time, 200.0);
    let v = avg.value().unwrap();
    assert!((v - 150.0).abs() < 1e-9, "expected 150, got {v}");
    assert!(avg.confidence_interval() > 0.0);

    Ok(())
}
