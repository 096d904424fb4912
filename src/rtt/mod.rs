#[cfg(test)]
mod rtt_test;

use tokio::time::{Duration, Instant};

/// Weight of the running estimate; a new sample moves the smoothed RTT by
/// 1/(RTT_RATIO + 1) of the difference.
pub(crate) const RTT_RATIO: u32 = 7;

/// Samples required before the estimate is considered converged.
pub(crate) const RTT_CONVERGENCE_SAMPLES: u32 = 4;

/// Decay half-life of the event-based average.
pub(crate) const DEFAULT_RTT_ESTIMATE_HALF_TIME: Duration = Duration::from_secs(3);

/// Exponential moving average whose decay is driven by the time between
/// samples rather than a fixed per-sample weight, plus a variance estimate
/// of the same shape.
#[derive(Debug, Clone)]
pub struct EventBasedExponentialMovingAverage {
    half_time: Duration,
    value: f64,
    sample_variance: f64,
    last_observed: Option<Instant>,
}

impl EventBasedExponentialMovingAverage {
    pub fn new(half_time: Duration) -> Self {
        Self {
            half_time,
            value: 0.0,
            sample_variance: 0.0,
            last_observed: None,
        }
    }

    pub fn add_sample(&mut self, now: Instant, sample: f64) {
        match self.last_observed {
            None => {
                self.value = sample;
                self.sample_variance = 0.0;
            }
            Some(prev) => {
                let age = now.checked_duration_since(prev).unwrap_or_default();
                // A sample half_time old carries the same weight as the
                // accumulated history.
                let alpha =
                    0.5_f64.powf(age.as_secs_f64() / self.half_time.as_secs_f64());
                let diff = sample - self.value;
                self.value = alpha * self.value + (1.0 - alpha) * sample;
                self.sample_variance =
                    alpha * self.sample_variance + (1.0 - alpha) * diff * diff;
            }
        }
        self.last_observed = Some(now);
    }

    pub fn value(&self) -> Option<f64> {
        self.last_observed.map(|_| self.value)
    }

    /// 95% confidence half-width around the current value.
    pub fn confidence_interval(&self) -> f64 {
        1.96 * self.sample_variance.sqrt()
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
        self.sample_variance = 0.0;
        self.last_observed = None;
    }
}

/// Round-trip estimator fed by matched ping responses. Tracks the smoothed
/// scalar used for retransmit scheduling, the event-based average, and the
/// aggregate counters surfaced as stats.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    smoothed: Option<Duration>,
    estimate: EventBasedExponentialMovingAverage,
    samples: u32,
    total: Duration,
    current: Option<Duration>,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_RTT_ESTIMATE_HALF_TIME)
    }
}

impl RttEstimator {
    pub fn new(half_time: Duration) -> Self {
        Self {
            smoothed: None,
            estimate: EventBasedExponentialMovingAverage::new(half_time),
            samples: 0,
            total: Duration::from_secs(0),
            current: None,
        }
    }

    pub fn add_sample(&mut self, now: Instant, sample: Duration) {
        self.smoothed = Some(match self.smoothed {
            // The first sample is taken as-is; averaging against the zero
            // start value would underestimate for the whole warmup.
            None => sample,
            Some(prev) => (prev * RTT_RATIO + sample) / (RTT_RATIO + 1),
        });
        self.estimate.add_sample(now, sample.as_secs_f64() * 1000.0);
        self.samples += 1;
        self.total += sample;
        self.current = Some(sample);
    }

    /// Smoothed RTT; zero until the first response arrives.
    pub fn rtt(&self) -> Duration {
        self.smoothed.unwrap_or_default()
    }

    pub fn estimate(&self) -> &EventBasedExponentialMovingAverage {
        &self.estimate
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn total_round_trip_time(&self) -> Duration {
        self.total
    }

    pub fn current_round_trip_time(&self) -> Option<Duration> {
        self.current
    }

    /// Whether enough responses have been observed for the estimate to be
    /// trusted by pruning decisions.
    pub fn converged(&self) -> bool {
        self.samples > RTT_CONVERGENCE_SAMPLES
    }

    pub fn reset(&mut self) {
        self.smoothed = None;
        self.estimate.reset();
        self.samples = 0;
        self.total = Duration::from_secs(0);
        self.current = None;
    }
}
