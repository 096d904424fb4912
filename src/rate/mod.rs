#[cfg(test)]
mod rate_test;

use tokio::time::{Duration, Instant};

pub(crate) const DEFAULT_BUCKET_WIDTH: Duration = Duration::from_millis(100);
pub(crate) const DEFAULT_BUCKET_COUNT: usize = 10;

#[derive(Default, Debug, Clone, Copy)]
struct Bucket {
    bytes: u64,
    packets: u64,
}

/// Byte and packet rate over a sliding window, kept as a ring of
/// fixed-width buckets. One tracker per direction.
#[derive(Debug, Clone)]
pub struct RateTracker {
    bucket_width: Duration,
    buckets: Vec<Bucket>,
    newest_index: usize,
    newest_start: Option<Instant>,
    total_bytes: u64,
    total_packets: u64,
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_WIDTH, DEFAULT_BUCKET_COUNT)
    }
}

impl RateTracker {
    pub fn new(bucket_width: Duration, bucket_count: usize) -> Self {
        Self {
            bucket_width,
            buckets: vec![Bucket::default(); bucket_count],
            newest_index: 0,
            newest_start: None,
            total_bytes: 0,
            total_packets: 0,
        }
    }

    /// Records one packet of `bytes` at `now`.
    pub fn update(&mut self, now: Instant, bytes: u64) {
        self.advance(now);
        let bucket = &mut self.buckets[self.newest_index];
        bucket.bytes += bytes;
        bucket.packets += 1;
        self.total_bytes += bytes;
        self.total_packets += 1;
    }

    /// Bytes per second over the window ending at `now`.
    pub fn rate(&self, now: Instant) -> f64 {
        self.windowed(now, |b| b.bytes)
    }

    /// Packets per second over the window ending at `now`.
    pub fn packet_rate(&self, now: Instant) -> f64 {
        self.windowed(now, |b| b.packets)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn total_packets(&self) -> u64 {
        self.total_packets
    }

    fn window(&self) -> Duration {
        self.bucket_width * self.buckets.len() as u32
    }

    fn windowed(&self, now: Instant, f: impl Fn(&Bucket) -> u64) -> f64 {
        let Some(newest_start) = self.newest_start else {
            return 0.0;
        };

        let idle = now.checked_duration_since(newest_start).unwrap_or_default();
        if idle >= self.window() + self.bucket_width {
            return 0.0;
        }

        // Count only the buckets still inside the window.
        let live = self
            .buckets
            .len()
            .saturating_sub(idle.as_micros() as usize / self.bucket_width.as_micros().max(1) as usize);
        let sum: u64 = (0..live)
            .map(|i| {
                let idx =
                    (self.newest_index + self.buckets.len() - i) % self.buckets.len();
                f(&self.buckets[idx])
            })
            .sum();

        sum as f64 / self.window().as_secs_f64()
    }

    fn advance(&mut self, now: Instant) {
        let Some(newest_start) = self.newest_start else {
            self.newest_start = Some(now);
            return;
        };

        let elapsed = now.checked_duration_since(newest_start).unwrap_or_default();
        let mut steps = (elapsed.as_micros() / self.bucket_width.as_micros().max(1)) as usize;
        if steps >= self.buckets.len() {
            // The whole window went idle.
            for b in &mut self.buckets {
                *b = Bucket::default();
            }
            self.newest_index = 0;
            self.newest_start = Some(now);
            return;
        }

        let mut start = newest_start;
        while steps > 0 {
            self.newest_index = (self.newest_index + 1) % self.buckets.len();
            self.buckets[self.newest_index] = Bucket::default();
            start += self.bucket_width;
            steps -= 1;
        }
        self.newest_start = Some(start);
    }
}
