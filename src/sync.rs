// ABOUTME: Clock synchronization between controller and player
// ABOUTME: Median-filtered offset estimation from round-trip samples

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Instant;

/// Maximum number of retained offset samples
const MAX_SAMPLES: usize = 10;

/// Samples required before the offset is considered usable
const MIN_SAMPLES_FOR_SYNC: usize = 3;

/// Monotonic local clock in microseconds.
///
/// All local timestamps in the crate come from one of these, anchored at
/// creation time. Wall-clock adjustments never affect it.
#[derive(Debug)]
pub struct LocalClock {
    start: Instant,
}

impl LocalClock {
    /// Create a clock starting now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Current local time in microseconds.
    #[inline]
    pub fn now_micros(&self) -> i64 {
        self.start.elapsed().as_micros() as i64
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the offset between the controller's clock and the local clock.
///
/// `server_time = local_time + offset`. Each round trip contributes one
/// offset sample; the published offset is the median of at most the last
/// [`MAX_SAMPLES`] samples, which bounds the influence of any single
/// outlier. The published value lives in an `AtomicI64` so the playback
/// loop can read it while the sync scheduler mutates the sample history.
#[derive(Debug)]
pub struct ClockSync {
    samples: Mutex<VecDeque<i64>>,
    offset: AtomicI64,
    synced: AtomicBool,
}

impl ClockSync {
    /// Create a synchronizer with no samples.
    pub fn new() -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(MAX_SAMPLES)),
            offset: AtomicI64::new(0),
            synced: AtomicBool::new(false),
        }
    }

    /// Record one round-trip sample.
    ///
    /// `client_transmitted` (t0) and `client_received` (t3) are local
    /// microseconds; `server_received` (t1) and `server_transmitted` (t2)
    /// are the controller's timestamps echoed in server/time. Assumes a
    /// symmetric network path when halving the round trip.
    pub fn add_sample(
        &self,
        client_transmitted: i64,
        server_received: i64,
        server_transmitted: i64,
        client_received: i64,
    ) {
        let round_trip =
            (client_received - client_transmitted) - (server_transmitted - server_received);
        let one_way_delay = round_trip / 2;
        let estimated_remote_now = server_transmitted + one_way_delay;
        let sample = estimated_remote_now - client_received;

        let mut samples = self.samples.lock();
        if samples.len() == MAX_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(sample);

        self.offset.store(median(&samples), Ordering::Release);
        if samples.len() >= MIN_SAMPLES_FOR_SYNC {
            self.synced.store(true, Ordering::Release);
        }
    }

    /// Current offset estimate in microseconds.
    #[inline]
    pub fn offset_micros(&self) -> i64 {
        self.offset.load(Ordering::Acquire)
    }

    /// Whether enough samples have been collected to trust the offset.
    ///
    /// Once true, stays true until [`reset`](Self::reset).
    #[inline]
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Number of retained samples.
    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }

    /// Discard all samples and revert to the unsynced state.
    pub fn reset(&self) {
        let mut samples = self.samples.lock();
        samples.clear();
        self.offset.store(0, Ordering::Release);
        self.synced.store(false, Ordering::Release);
    }

    /// Convert a controller timestamp to local microseconds.
    #[inline]
    pub fn server_to_local(&self, server_micros: i64) -> i64 {
        server_micros - self.offset_micros()
    }

    /// Convert a local timestamp to controller microseconds.
    #[inline]
    pub fn local_to_server(&self, local_micros: i64) -> i64 {
        local_micros + self.offset_micros()
    }

    /// Microseconds from `now_local` until a controller timestamp is due.
    ///
    /// Negative when the timestamp is already in the past.
    #[inline]
    pub fn delay_until(&self, server_micros: i64, now_local: i64) -> i64 {
        self.server_to_local(server_micros) - now_local
    }
}

impl Default for ClockSync {
    fn default() -> Self {
        Self::new()
    }
}

fn median(samples: &VecDeque<i64>) -> i64 {
    if samples.is_empty() {
        return 0;
    }
    let mut sorted: Vec<i64> = samples.iter().copied().collect();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2
    }
}
