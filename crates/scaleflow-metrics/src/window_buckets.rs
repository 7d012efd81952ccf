//! Fixed-granularity circular time buckets.
//!
//! One `TimedBuckets` covers one averaging window: a ring of
//! `{sum, count}` slots indexed by bucket number modulo ring length.
//! Recording appends to the bucket covering the sample's timestamp and
//! eviction is an index advance, so there is no per-sample allocation
//! and no background timer. Buckets strictly older than
//! `now - window` are skipped at read time.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// One read of a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowReading {
    /// Sample-weighted mean over the non-evicted buckets (sum of bucket
    /// sums over sum of bucket counts, so sparsely-sampled buckets do
    /// not bias the result). 0.0 when the window holds no samples.
    pub average: f64,
    /// Samples currently retained in the window.
    pub sample_count: u64,
    /// False until a full window duration has elapsed since the first
    /// recorded sample; early averages are biased by too few samples and
    /// must be treated conservatively by the decider.
    pub is_full: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    sum: f64,
    count: u64,
}

/// Circular accumulation buffer for one window of one metric.
#[derive(Debug)]
pub struct TimedBuckets {
    granularity: Duration,
    window: Duration,
    buckets: Vec<Bucket>,
    /// Ring position of the newest bucket. Only meaningful once a sample
    /// has been recorded.
    newest: usize,
    /// Absolute bucket number (epoch seconds / granularity) of the
    /// newest bucket.
    newest_tick: u64,
    /// Timestamp of the first sample ever recorded; drives `is_full`.
    first_sample: Option<SystemTime>,
}

impl TimedBuckets {
    /// Buffer covering `window` at `granularity`. The window is assumed
    /// to be at least one bucket; resolution guarantees this upstream.
    pub fn new(window: Duration, granularity: Duration) -> Self {
        let len = window
            .as_secs()
            .div_ceil(granularity.as_secs().max(1))
            .max(1) as usize;
        Self {
            granularity,
            window,
            buckets: vec![Bucket::default(); len],
            newest: 0,
            newest_tick: 0,
            first_sample: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether any sample was ever recorded. Distinguishes "no data yet"
    /// (no decision possible) from "window currently empty" (candidate
    /// for scale-to-zero).
    pub fn ever_recorded(&self) -> bool {
        self.first_sample.is_some()
    }

    fn tick_of(&self, t: SystemTime) -> u64 {
        let secs = t.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        secs / self.granularity.as_secs().max(1)
    }

    /// Record one value at its observation time.
    ///
    /// Returns false when the sample falls before the oldest retained
    /// bucket; such samples cannot affect a decision that has already
    /// been made and retaining them would break monotonic eviction.
    pub fn record(&mut self, at: SystemTime, value: f64) -> bool {
        let tick = self.tick_of(at);
        let len = self.buckets.len() as u64;

        if self.first_sample.is_none() {
            self.first_sample = Some(at);
            self.newest = 0;
            self.newest_tick = tick;
            self.buckets[0] = Bucket::default();
        } else if tick > self.newest_tick {
            let advance = tick - self.newest_tick;
            if advance >= len {
                // The gap exceeds the whole ring: all retained buckets
                // are stale.
                self.buckets.fill(Bucket::default());
                self.newest = 0;
            } else {
                for _ in 0..advance {
                    self.newest = (self.newest + 1) % self.buckets.len();
                    self.buckets[self.newest] = Bucket::default();
                }
            }
            self.newest_tick = tick;
        } else if self.newest_tick - tick >= len {
            return false;
        }

        let offset = (self.newest_tick - tick) as usize;
        let idx = (self.newest + self.buckets.len() - offset) % self.buckets.len();
        let bucket = &mut self.buckets[idx];
        bucket.sum += value;
        bucket.count += 1;
        true
    }

    /// Average over the window ending at `now`.
    pub fn read(&self, now: SystemTime) -> WindowReading {
        let mut sum = 0.0;
        let mut count = 0u64;

        if self.first_sample.is_some() {
            let now_secs = now
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64;
            let granularity = self.granularity.as_secs().max(1) as i64;
            let window = self.window.as_secs() as i64;

            for offset in 0..self.buckets.len() as u64 {
                if offset > self.newest_tick {
                    break;
                }
                let tick = self.newest_tick - offset;
                // A bucket is evicted once its entire span precedes the
                // window's start.
                let bucket_end = (tick as i64 + 1) * granularity;
                if bucket_end <= now_secs - window {
                    continue;
                }
                let idx = (self.newest + self.buckets.len() - offset as usize)
                    % self.buckets.len();
                sum += self.buckets[idx].sum;
                count += self.buckets[idx].count;
            }
        }

        let is_full = self
            .first_sample
            .is_some_and(|t| now.duration_since(t).unwrap_or_default() >= self.window);

        WindowReading {
            average: if count == 0 { 0.0 } else { sum / count as f64 },
            sample_count: count,
            is_full,
        }
    }
}
