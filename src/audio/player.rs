// ABOUTME: Timestamp-aware playback engine
// ABOUTME: Drains the chunk buffer and paces device writes with the synced clock

use crate::audio::chunk_buffer::ChunkBuffer;
use crate::audio::output::{AudioOutput, CpalOutput};
use crate::audio::StreamFormat;
use crate::player::state::StatusHandle;
use crate::sync::{ClockSync, LocalClock};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Default bounded wait for the buffer to fill before playback starts
pub const DEFAULT_PREBUFFER_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for the pre-buffer target
const PREBUFFER_POLL: Duration = Duration::from_millis(20);

/// Sleep when the buffer is empty in steady state
const EMPTY_POLL: Duration = Duration::from_millis(5);

/// Granularity of paced sleeps, bounds cancellation latency
const SLEEP_SLICE_US: i64 = 10_000;

/// Chunks due further out than this are slept on before writing
const PACE_THRESHOLD_US: i64 = 100_000;

/// Upper bound on any single paced sleep
const MAX_SLEEP_US: i64 = 500_000;

/// Safety margin subtracted from paced sleeps so writes land early, not late
const SLEEP_MARGIN_US: i64 = 2_000;

/// Chunks later than this are dropped instead of played
const MAX_LATE_US: i64 = 1_000_000;

/// Startup backlog beyond this age is discarded once synced
const FAST_FORWARD_US: i64 = 500_000;

/// Minimum interval between repeated diagnostic log lines
const LOG_THROTTLE: Duration = Duration::from_secs(5);

/// Shared volume and mute state applied at the output device.
///
/// Written by whoever handles commands, read by the playback loop on
/// every pass. The protocol's 0-100 volume scale is converted to a [0, 1]
/// gain here; mute forces the gain to zero without losing the volume.
#[derive(Debug)]
pub struct GainControl {
    volume: AtomicU8,
    muted: AtomicBool,
}

impl GainControl {
    /// Create with an initial volume (0-100) and mute state.
    pub fn new(volume: u8, muted: bool) -> Self {
        Self {
            volume: AtomicU8::new(volume.min(100)),
            muted: AtomicBool::new(muted),
        }
    }

    /// Set volume on the 0-100 scale; values above 100 are clamped.
    pub fn set_volume(&self, volume: u8) {
        self.volume.store(volume.min(100), Ordering::Relaxed);
    }

    /// Set the mute state.
    pub fn set_mute(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Current volume (0-100).
    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    /// Current mute state.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Effective device gain in [0, 1].
    pub fn effective_gain(&self) -> f32 {
        if self.is_muted() {
            0.0
        } else {
            self.volume() as f32 / 100.0
        }
    }
}

/// Builds the output device on the playback thread.
///
/// Construction is deferred into the thread because some host APIs hand
/// out streams that must not cross threads.
pub type OutputFactory = Box<dyn FnOnce() -> crate::Result<Box<dyn AudioOutput>> + Send + 'static>;

struct ActivePlayback {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

/// Drains the chunk buffer and paces writes to an audio output device.
///
/// One playback thread exists per active stream. The thread pre-buffers,
/// fast-forwards past startup backlog, then applies a three-tier pacing
/// policy per chunk: sleep when well ahead of schedule, drop when more
/// than a second late, write immediately otherwise. Device write failures
/// are logged and skipped; only construction failures end a stream
/// attempt.
pub struct PlaybackEngine {
    buffer: Arc<ChunkBuffer>,
    sync: Arc<ClockSync>,
    clock: Arc<LocalClock>,
    status: StatusHandle,
    gain: Arc<GainControl>,
    prebuffer_timeout: Duration,
    active: Option<ActivePlayback>,
}

impl PlaybackEngine {
    /// Create an idle engine over the shared buffer and clock sync.
    pub fn new(
        buffer: Arc<ChunkBuffer>,
        sync: Arc<ClockSync>,
        clock: Arc<LocalClock>,
        status: StatusHandle,
    ) -> Self {
        Self {
            buffer,
            sync,
            clock,
            status,
            gain: Arc::new(GainControl::new(100, false)),
            prebuffer_timeout: DEFAULT_PREBUFFER_TIMEOUT,
            active: None,
        }
    }

    /// Override the pre-buffer timeout.
    pub fn with_prebuffer_timeout(mut self, timeout: Duration) -> Self {
        self.prebuffer_timeout = timeout;
        self
    }

    /// Whether a playback thread is currently running.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Set volume on the 0-100 scale.
    pub fn set_volume(&self, volume: u8) {
        self.gain.set_volume(volume);
    }

    /// Set the mute state.
    pub fn set_mute(&self, muted: bool) {
        self.gain.set_mute(muted);
    }

    /// Shared volume/mute control.
    pub fn gain(&self) -> Arc<GainControl> {
        Arc::clone(&self.gain)
    }

    /// Start playback for a stream format on the default output device.
    ///
    /// Any previous playback thread is stopped first.
    pub fn start(&mut self, format: &StreamFormat) {
        let format = format.clone();
        self.start_with_output(Box::new(move || {
            CpalOutput::new(&format).map(|out| Box::new(out) as Box<dyn AudioOutput>)
        }));
    }

    /// Start playback with an explicit output factory.
    pub fn start_with_output(&mut self, factory: OutputFactory) {
        self.stop();

        let stop = Arc::new(AtomicBool::new(false));
        let worker = PlaybackWorker {
            buffer: Arc::clone(&self.buffer),
            sync: Arc::clone(&self.sync),
            clock: Arc::clone(&self.clock),
            status: self.status.clone(),
            gain: Arc::clone(&self.gain),
            stop: Arc::clone(&stop),
            prebuffer_timeout: self.prebuffer_timeout,
        };
        let handle = thread::spawn(move || worker.run(factory));
        self.active = Some(ActivePlayback { stop, handle });
    }

    /// Stop playback and release the output device.
    ///
    /// Returns once the playback thread has exited; the thread polls its
    /// stop flag every few milliseconds, so this is prompt.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.store(true, Ordering::Release);
            let _ = active.handle.join();
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PlaybackWorker {
    buffer: Arc<ChunkBuffer>,
    sync: Arc<ClockSync>,
    clock: Arc<LocalClock>,
    status: StatusHandle,
    gain: Arc<GainControl>,
    stop: Arc<AtomicBool>,
    prebuffer_timeout: Duration,
}

impl PlaybackWorker {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn run(self, factory: OutputFactory) {
        let mut output = match factory() {
            Ok(output) => output,
            Err(e) => {
                log::error!("Failed to open audio output: {}", e);
                self.status.update(|s| {
                    s.error = Some(e.to_string());
                    s.stream_active = false;
                });
                return;
            }
        };

        self.status.update(|s| {
            s.stream_active = true;
            s.error = None;
        });

        self.prebuffer(output.min_buffer_bytes());
        self.fast_forward();
        self.play(output.as_mut());

        output.stop();
        self.status.update(|s| s.stream_active = false);
        log::debug!("Playback thread exited");
    }

    /// Wait, bounded, for one device-buffer of audio before starting.
    fn prebuffer(&self, target_bytes: usize) {
        let deadline = Instant::now() + self.prebuffer_timeout;
        while !self.stopped() && self.buffer.bytes() < target_bytes {
            if Instant::now() >= deadline {
                log::warn!(
                    "Pre-buffer timeout: starting with {}/{} bytes",
                    self.buffer.bytes(),
                    target_bytes
                );
                break;
            }
            thread::sleep(PREBUFFER_POLL);
        }
    }

    /// Discard backlog accumulated during startup latency.
    fn fast_forward(&self) {
        if !self.sync.is_synced() {
            return;
        }
        let mut skipped = 0usize;
        while let Some(chunk) = self.buffer.peek() {
            let delay = self
                .sync
                .delay_until(chunk.timestamp, self.clock.now_micros());
            if delay < -FAST_FORWARD_US {
                self.buffer.read();
                skipped += 1;
            } else {
                break;
            }
        }
        if skipped > 0 {
            log::info!("Fast-forward: skipped {} stale chunks at start", skipped);
        }
    }

    fn play(&self, output: &mut dyn AudioOutput) {
        let mut applied_gain = f32::NAN;
        let mut last_usage_pct = -1i64;
        let mut late_drops = Throttle::new();
        let mut write_failures = Throttle::new();

        while !self.stopped() {
            let gain = self.gain.effective_gain();
            if gain != applied_gain {
                output.set_volume(gain);
                applied_gain = gain;
            }

            let usage = self.buffer.usage_percent();
            if usage.round() as i64 != last_usage_pct {
                last_usage_pct = usage.round() as i64;
                self.status.update(|s| s.buffer_usage = usage);
            }

            let chunk = match self.buffer.read() {
                Some(chunk) => chunk,
                None => {
                    thread::sleep(EMPTY_POLL);
                    continue;
                }
            };

            if self.sync.is_synced() {
                let target = chunk.timestamp - output.latency_micros();
                let delay = self.sync.delay_until(target, self.clock.now_micros());
                if delay < -MAX_LATE_US {
                    if let Some(suppressed) = late_drops.tick() {
                        log::warn!(
                            "Dropping chunk {} ms late ({} more since last report)",
                            -delay / 1000,
                            suppressed
                        );
                    }
                    continue;
                }
                if delay > PACE_THRESHOLD_US {
                    self.paced_sleep(delay.min(MAX_SLEEP_US) - SLEEP_MARGIN_US);
                    if self.stopped() {
                        break;
                    }
                }
            }

            if let Err(e) = output.write(&chunk.payload) {
                if let Some(suppressed) = write_failures.tick() {
                    log::warn!(
                        "Audio output write failed: {} ({} more since last report)",
                        e,
                        suppressed
                    );
                }
            }
        }
    }

    /// Sleep in short slices so a stop request is noticed quickly.
    fn paced_sleep(&self, total_us: i64) {
        let mut remaining = total_us;
        while remaining > 0 && !self.stopped() {
            let slice = remaining.min(SLEEP_SLICE_US);
            thread::sleep(Duration::from_micros(slice as u64));
            remaining -= slice;
        }
    }
}

/// Suppresses repeated log lines, reporting how many were swallowed.
struct Throttle {
    last: Option<Instant>,
    suppressed: u64,
}

impl Throttle {
    fn new() -> Self {
        Self {
            last: None,
            suppressed: 0,
        }
    }

    /// Returns `Some(suppressed_count)` when it is time to log again.
    fn tick(&mut self) -> Option<u64> {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < LOG_THROTTLE => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.last = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioChunk;
    use crate::error::Error;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct MockLog {
        writes: Vec<Vec<u8>>,
        gains: Vec<f32>,
        stopped: bool,
        fail_writes: bool,
    }

    struct MockOutput {
        log: Arc<Mutex<MockLog>>,
        min_bytes: usize,
        latency: i64,
    }

    impl AudioOutput for MockOutput {
        fn write(&mut self, pcm: &[u8]) -> crate::Result<()> {
            let mut log = self.log.lock();
            if log.fail_writes {
                return Err(Error::Output("mock write failure".to_string()));
            }
            log.writes.push(pcm.to_vec());
            Ok(())
        }

        fn set_volume(&mut self, gain: f32) {
            self.log.lock().gains.push(gain);
        }

        fn min_buffer_bytes(&self) -> usize {
            self.min_bytes
        }

        fn latency_micros(&self) -> i64 {
            self.latency
        }

        fn stop(&mut self) {
            self.log.lock().stopped = true;
        }
    }

    fn mock_factory(log: Arc<Mutex<MockLog>>, min_bytes: usize) -> OutputFactory {
        Box::new(move || {
            Ok(Box::new(MockOutput {
                log,
                min_bytes,
                latency: 0,
            }) as Box<dyn AudioOutput>)
        })
    }

    fn synced_at_zero_offset(sync: &ClockSync) {
        for _ in 0..3 {
            sync.add_sample(0, 0, 0, 0);
        }
        assert!(sync.is_synced());
        assert_eq!(sync.offset_micros(), 0);
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn test_engine() -> (PlaybackEngine, Arc<ChunkBuffer>, Arc<ClockSync>, Arc<LocalClock>) {
        let buffer = Arc::new(ChunkBuffer::with_capacity(64 * 1024));
        let sync = Arc::new(ClockSync::new());
        let clock = Arc::new(LocalClock::new());
        let engine = PlaybackEngine::new(
            Arc::clone(&buffer),
            Arc::clone(&sync),
            Arc::clone(&clock),
            StatusHandle::new(),
        )
        .with_prebuffer_timeout(Duration::from_millis(50));
        (engine, buffer, sync, clock)
    }

    #[test]
    fn test_unsynced_chunks_written_in_order() {
        let (mut engine, buffer, _sync, _clock) = test_engine();
        let log = Arc::new(Mutex::new(MockLog::default()));

        buffer.write(AudioChunk::new(0, &[1, 1]));
        buffer.write(AudioChunk::new(0, &[2, 2]));

        engine.start_with_output(mock_factory(Arc::clone(&log), 4));
        assert!(wait_until(Duration::from_secs(1), || log.lock().writes.len() == 2));
        engine.stop();

        let log = log.lock();
        assert_eq!(log.writes[0], vec![1, 1]);
        assert_eq!(log.writes[1], vec![2, 2]);
        assert!(log.stopped);
    }

    #[test]
    fn test_late_chunk_dropped_loop_continues() {
        let (mut engine, buffer, sync, clock) = test_engine();
        synced_at_zero_offset(&sync);
        let log = Arc::new(Mutex::new(MockLog::default()));

        // Start against an empty buffer so the chunks below hit the
        // steady-state loop, not the startup fast-forward.
        engine.start_with_output(mock_factory(Arc::clone(&log), 1));
        thread::sleep(Duration::from_millis(80));

        let now = clock.now_micros();
        // Two seconds late: dropped without a device write.
        buffer.write(AudioChunk::new(now - 2_000_000, &[9, 9]));
        // Roughly on time: written.
        buffer.write(AudioChunk::new(now + 20_000, &[7, 7]));

        assert!(wait_until(Duration::from_secs(1), || !log.lock().writes.is_empty()));
        engine.stop();

        let log = log.lock();
        assert_eq!(log.writes.len(), 1);
        assert_eq!(log.writes[0], vec![7, 7]);
    }

    #[test]
    fn test_fast_forward_skips_startup_backlog() {
        let (mut engine, buffer, sync, clock) = test_engine();
        synced_at_zero_offset(&sync);
        let log = Arc::new(Mutex::new(MockLog::default()));

        let now = clock.now_micros();
        buffer.write(AudioChunk::new(now - 900_000, &[1]));
        buffer.write(AudioChunk::new(now - 700_000, &[2]));
        buffer.write(AudioChunk::new(now + 10_000, &[3]));

        engine.start_with_output(mock_factory(Arc::clone(&log), 1));
        assert!(wait_until(Duration::from_secs(1), || !log.lock().writes.is_empty()));
        engine.stop();

        let log = log.lock();
        assert_eq!(log.writes.len(), 1);
        assert_eq!(log.writes[0], vec![3]);
    }

    #[test]
    fn test_prebuffer_timeout_proceeds_on_empty_buffer() {
        let (mut engine, buffer, _sync, _clock) = test_engine();
        let log = Arc::new(Mutex::new(MockLog::default()));

        // Buffer starts empty; the 50ms pre-buffer window expires and the
        // loop must still pick up audio that arrives afterwards.
        engine.start_with_output(mock_factory(Arc::clone(&log), 1024));
        thread::sleep(Duration::from_millis(80));
        buffer.write(AudioChunk::new(0, &[5, 5]));

        assert!(wait_until(Duration::from_secs(1), || !log.lock().writes.is_empty()));
        engine.stop();
        assert_eq!(log.lock().writes[0], vec![5, 5]);
    }

    #[test]
    fn test_gain_changes_reach_device() {
        let (mut engine, buffer, _sync, _clock) = test_engine();
        let log = Arc::new(Mutex::new(MockLog::default()));

        buffer.write(AudioChunk::new(0, &[1]));
        engine.start_with_output(mock_factory(Arc::clone(&log), 1));
        assert!(wait_until(Duration::from_secs(1), || !log.lock().gains.is_empty()));

        engine.set_volume(50);
        assert!(wait_until(Duration::from_secs(1), || {
            log.lock().gains.last() == Some(&0.5)
        }));

        engine.set_mute(true);
        assert!(wait_until(Duration::from_secs(1), || {
            log.lock().gains.last() == Some(&0.0)
        }));
        engine.stop();
    }

    #[test]
    fn test_write_failure_not_fatal() {
        let (mut engine, buffer, _sync, _clock) = test_engine();
        let log = Arc::new(Mutex::new(MockLog::default()));
        log.lock().fail_writes = true;

        buffer.write(AudioChunk::new(0, &[1]));
        buffer.write(AudioChunk::new(0, &[2]));

        engine.start_with_output(mock_factory(Arc::clone(&log), 1));
        // Both chunks attempted and discarded; the loop keeps running.
        assert!(wait_until(Duration::from_secs(1), || buffer.is_empty()));
        assert!(engine.is_active());
        log.lock().fail_writes = false;
        buffer.write(AudioChunk::new(0, &[3]));
        assert!(wait_until(Duration::from_secs(1), || !log.lock().writes.is_empty()));
        engine.stop();
    }

    #[test]
    fn test_output_init_failure_sets_error_status() {
        let buffer = Arc::new(ChunkBuffer::new());
        let sync = Arc::new(ClockSync::new());
        let clock = Arc::new(LocalClock::new());
        let status = StatusHandle::new();
        let mut engine = PlaybackEngine::new(
            Arc::clone(&buffer),
            sync,
            clock,
            status.clone(),
        );

        engine.start_with_output(Box::new(|| {
            Err(Error::Output("unsupported bit depth: 24".to_string()))
        }));

        assert!(wait_until(Duration::from_secs(1), || {
            status.current().error.is_some()
        }));
        assert!(!status.current().stream_active);
        engine.stop();
    }

    #[test]
    fn test_gain_control_scale() {
        let gain = GainControl::new(100, false);
        assert_eq!(gain.effective_gain(), 1.0);
        gain.set_volume(40);
        assert_eq!(gain.effective_gain(), 0.4);
        gain.set_mute(true);
        assert_eq!(gain.effective_gain(), 0.0);
        assert_eq!(gain.volume(), 40);
        gain.set_mute(false);
        gain.set_volume(200);
        assert_eq!(gain.volume(), 100);
    }
}
