//! Acquisition state machine and capture thread management
//!
//! The instrument only hands out fresh points for a short while after it has been
//! re-armed, and tends to repeat itself when read sequentially. The acquisition
//! loop compensates in two ways:
//!
//! * **Power refresh** (reset ×2, store, trigger ×2) once per refresh interval and
//!   additionally after every `batch_refresh_every` successful reads.
//! * **Address hopping**: sequential addresses, with a random jump after every
//!   `jump_every`th successful read since the last interval refresh.
//!
//! The link is owned by whichever side is active: the controller while idle, the
//! acquisition thread while capturing. The thread hands it back when it exits.

use crate::error::{ConstellationError, Result};
use crate::link::{DeviceLink, ReadOutcome, Timing, Transport};
use crate::queue::{Sample, SampleProducer};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::Rng;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Noise injection registers (16-bit values, little-endian register pairs)
const REG_AWGN_LO: u8 = 0x00;
const REG_AWGN_HI: u8 = 0x01;
const REG_PN_LO: u8 = 0x02;
const REG_PN_HI: u8 = 0x03;

// Address reseed ranges per refresh trigger
const INTERVAL_RESEED: RangeInclusive<u8> = 0..=50;
const BATCH_RESEED: RangeInclusive<u8> = 0..=100;
const JUMP_RESEED: RangeInclusive<u8> = 0..=255;

/// Acquisition loop tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Maximum time between two scheduled power refreshes
    pub refresh_interval: Duration,
    /// Refresh again after this many successful reads since the last scheduled one
    pub batch_refresh_every: u64,
    /// Jump to a random address on every multiple of this many successful reads
    pub jump_every: u32,
    /// Pause after a read that produced no point
    pub timeout_backoff: Duration,
    /// How long `stop()` waits for the acquisition thread
    pub stop_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(1),
            batch_refresh_every: 100,
            jump_every: 3,
            timeout_backoff: Duration::from_millis(5),
            stop_timeout: Duration::from_secs(1),
        }
    }
}

/// Noise levels injected by the device under test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseParameters {
    pub awgn: u16,
    pub pn: u16,
}

impl Default for NoiseParameters {
    fn default() -> Self {
        Self {
            awgn: 0x0800,
            pn: 0x0100,
        }
    }
}

/// Mutable acquisition state, touched only by the side that owns the link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureState {
    pub running: bool,
    /// `None` until the first scheduled refresh, which makes one due immediately
    pub last_refresh: Option<Instant>,
    pub refresh_count: u64,
    pub current_address: u8,
    pub successful_reads_since_refresh: u64,
    pub total_captured: u64,
}

/// What caused a power refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshTrigger {
    Interval,
    Batch,
    Manual,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshTrigger::Interval => write!(f, "interval"),
            RefreshTrigger::Batch => write!(f, "batch"),
            RefreshTrigger::Manual => write!(f, "manual"),
        }
    }
}

/// Result of one acquisition loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Captured(Sample),
    TimedOut,
    Failed,
}

/// Counters published by the acquisition side for display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStatus {
    pub running: bool,
    pub refresh_count: u64,
    pub captured: u64,
}

#[derive(Default)]
struct SharedStatus {
    running: AtomicBool,
    refresh_count: AtomicU64,
    captured: AtomicU64,
}

enum LoopRequest {
    PowerRefresh,
}

/// Link, state and policy for the acquisition loop
struct Acquisition<T: Transport> {
    link: DeviceLink<T>,
    state: CaptureState,
    rng: StdRng,
    producer: SampleProducer,
    config: CaptureConfig,
    status: Arc<SharedStatus>,
}

impl<T: Transport> Acquisition<T> {
    /// Reset twice, store, trigger twice
    fn power_refresh(&mut self) -> Result<()> {
        for _ in 0..2 {
            self.link.reset()?;
        }
        self.link.store()?;
        for _ in 0..2 {
            self.link.trigger()?;
        }

        self.state.refresh_count += 1;
        self.status
            .refresh_count
            .store(self.state.refresh_count, Ordering::Relaxed);
        Ok(())
    }

    /// Power refresh whose failure is logged instead of returned
    fn refresh_logged(&mut self, trigger: RefreshTrigger) {
        match self.power_refresh() {
            Ok(()) => info!("Power refresh #{} ({})", self.state.refresh_count, trigger),
            Err(e) => warn!("Power refresh failed ({}): {}", trigger, e),
        }
    }

    fn write_noise_parameters(&mut self, noise: NoiseParameters) -> Result<()> {
        let [awgn_lo, awgn_hi] = noise.awgn.to_le_bytes();
        let [pn_lo, pn_hi] = noise.pn.to_le_bytes();

        self.link.set_register(REG_AWGN_LO, awgn_lo)?;
        self.link.set_register(REG_AWGN_HI, awgn_hi)?;
        self.link.set_register(REG_PN_LO, pn_lo)?;
        self.link.set_register(REG_PN_HI, pn_hi)?;
        self.link.reset()?;

        let settle = self.link.timing().noise_settle;
        if !settle.is_zero() {
            thread::sleep(settle);
        }
        Ok(())
    }

    fn reseed(&mut self, range: RangeInclusive<u8>) {
        self.state.current_address = self.rng.gen_range(range);
    }

    fn refresh_due(&self, now: Instant) -> bool {
        match self.state.last_refresh {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.config.refresh_interval,
        }
    }

    fn batch_refresh_due(&self) -> bool {
        let reads = self.state.successful_reads_since_refresh;
        reads > 0 && reads % self.config.batch_refresh_every == 0
    }

    /// Jump on every `jump_every`th success since the last scheduled refresh
    fn advance_address(&mut self) {
        let reads = self.state.successful_reads_since_refresh;
        if reads % u64::from(self.config.jump_every) == 0 {
            self.reseed(JUMP_RESEED);
        } else {
            self.state.current_address = self.state.current_address.wrapping_add(1);
        }
    }

    /// One iteration of the acquisition loop
    fn step(&mut self, now: Instant) -> StepOutcome {
        if self.refresh_due(now) {
            self.refresh_logged(RefreshTrigger::Interval);
            self.state.last_refresh = Some(now);
            self.state.successful_reads_since_refresh = 0;
            self.reseed(INTERVAL_RESEED);
        } else if self.batch_refresh_due() {
            self.refresh_logged(RefreshTrigger::Batch);
            self.reseed(BATCH_RESEED);
        }

        let addr = self.state.current_address;
        match self.link.read_point(addr) {
            Ok(ReadOutcome::Point { i, q }) => {
                let sample = Sample::new(i, q, Instant::now());
                if !self.producer.push(sample) {
                    trace!("Sample queue closed, dropping point");
                }
                self.state.successful_reads_since_refresh += 1;
                self.state.total_captured += 1;
                self.status
                    .captured
                    .store(self.state.total_captured, Ordering::Relaxed);
                self.advance_address();
                StepOutcome::Captured(sample)
            }
            Ok(ReadOutcome::Timeout) => {
                thread::sleep(self.config.timeout_backoff);
                StepOutcome::TimedOut
            }
            Err(e) => {
                debug!("Read at 0x{:02X} failed: {}", addr, e);
                thread::sleep(self.config.timeout_backoff);
                StepOutcome::Failed
            }
        }
    }

    /// Run pending manual refreshes, folding repeated requests into one
    fn serve_requests(&mut self, requests: &Receiver<LoopRequest>) -> bool {
        let pending = requests.try_iter().count();
        if pending > 0 {
            if pending > 1 {
                debug!("Merging {} manual refresh requests", pending);
            }
            self.refresh_logged(RefreshTrigger::Manual);
        }
        pending > 0
    }

    /// Acquisition loop; returns itself so the link can be handed back
    fn run(mut self, stop: &AtomicBool, requests: &Receiver<LoopRequest>) -> Self {
        info!("Starting capture at address {}", self.state.current_address);
        self.state.running = true;

        while !stop.load(Ordering::Acquire) {
            self.serve_requests(requests);
            self.step(Instant::now());
        }

        self.state.running = false;
        info!("Capture stopped after {} points", self.state.total_captured);
        self
    }
}

/// Handle to a running acquisition thread
struct ActiveCapture<T: Transport> {
    stop: Arc<AtomicBool>,
    requests: Sender<LoopRequest>,
    finished: Receiver<Acquisition<T>>,
    thread: Option<JoinHandle<()>>,
}

impl<T: Transport> ActiveCapture<T> {
    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Owner of the acquisition state machine
///
/// States are `Idle` (link held here) and `Capturing` (link held by the
/// acquisition thread). All device writes go through this type.
pub struct CaptureController<T: Transport + 'static> {
    worker: Option<Acquisition<T>>,
    active: Option<ActiveCapture<T>>,
    /// Thread that missed its stop deadline and still holds the link
    lingering: Option<ActiveCapture<T>>,
    status: Arc<SharedStatus>,
    timing: Timing,
    stop_timeout: Duration,
}

impl<T: Transport + 'static> CaptureController<T> {
    /// Create an idle controller
    ///
    /// # Arguments
    /// * `link` - Open device link
    /// * `producer` - Where captured samples go
    /// * `config` - Loop tuning
    /// * `rng` - Source of address reseeds; seed it for reproducible sequences
    pub fn new(
        link: DeviceLink<T>,
        producer: SampleProducer,
        config: CaptureConfig,
        rng: StdRng,
    ) -> Result<Self> {
        if config.batch_refresh_every == 0 {
            return Err(ConstellationError::InvalidParameter(
                "batch refresh period must be at least 1 read".to_string(),
            ));
        }
        if config.jump_every == 0 {
            return Err(ConstellationError::InvalidParameter(
                "address jump period must be at least 1 read".to_string(),
            ));
        }

        let status = Arc::new(SharedStatus::default());
        let timing = *link.timing();
        Ok(Self {
            worker: Some(Acquisition {
                link,
                state: CaptureState::default(),
                rng,
                producer,
                config,
                status: status.clone(),
            }),
            active: None,
            lingering: None,
            status,
            timing,
            stop_timeout: config.stop_timeout,
        })
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Counters for display; eventually consistent while capturing
    pub fn status(&self) -> CaptureStatus {
        CaptureStatus {
            running: self.status.running.load(Ordering::Relaxed),
            refresh_count: self.status.refresh_count.load(Ordering::Relaxed),
            captured: self.status.captured.load(Ordering::Relaxed),
        }
    }

    /// Acquisition state, available only while idle
    pub fn state(&self) -> Option<&CaptureState> {
        self.worker.as_ref().map(|w| &w.state)
    }

    /// Program AWGN and PN levels, then reset the device
    ///
    /// Each 16-bit level is written low byte first. Must be called while idle.
    pub fn set_noise_parameters(&mut self, awgn: u16, pn: u16) -> Result<()> {
        let noise = NoiseParameters { awgn, pn };
        info!("Setting noise: AWGN=0x{:04X}, PN=0x{:04X}", awgn, pn);
        self.idle_worker()?.write_noise_parameters(noise)?;
        info!("Noise parameters set");
        Ok(())
    }

    /// Power refresh outside the loop's own schedule
    ///
    /// While idle the refresh runs immediately and its result is returned. While
    /// capturing it is handed to the acquisition thread, which runs it before its
    /// next read.
    pub fn force_refresh(&mut self) -> Result<()> {
        if let Some(active) = &self.active {
            if active.requests.send(LoopRequest::PowerRefresh).is_ok() {
                return Ok(());
            }
            return Err(ConstellationError::CaptureThreadPanicked);
        }

        let worker = self.idle_worker()?;
        worker.power_refresh()?;
        info!("Manual power refresh #{}", worker.state.refresh_count);
        Ok(())
    }

    /// Idle → Capturing
    pub fn start(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Err(ConstellationError::AlreadyRunning);
        }
        self.idle_worker()?;
        let worker = self
            .worker
            .take()
            .ok_or(ConstellationError::LinkUnavailable)?;

        let stop = Arc::new(AtomicBool::new(false));
        let (request_tx, request_rx) = crossbeam_channel::unbounded();
        let (finished_tx, finished_rx) = crossbeam_channel::bounded(1);

        let thread_stop = stop.clone();
        let thread = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let worker = worker.run(&thread_stop, &request_rx);
                let _ = finished_tx.send(worker);
            })?;

        self.status.running.store(true, Ordering::Relaxed);
        self.active = Some(ActiveCapture {
            stop,
            requests: request_tx,
            finished: finished_rx,
            thread: Some(thread),
        });
        Ok(())
    }

    /// Capturing → Idle
    ///
    /// Signals the loop and waits up to the configured stop timeout. A sample
    /// being read at that moment may be discarded. If the thread misses the
    /// deadline the controller is still idle, but the link stays unavailable
    /// until the thread finishes its current iteration.
    pub fn stop(&mut self) -> Result<()> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };
        self.status.running.store(false, Ordering::Relaxed);
        active.stop.store(true, Ordering::Release);

        match active.finished.recv_timeout(self.stop_timeout) {
            Ok(worker) => {
                active.join();
                self.worker = Some(worker);
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Capture thread did not stop within {:?}, detaching",
                    self.stop_timeout
                );
                self.lingering = Some(active);
                Ok(())
            }
            Err(RecvTimeoutError::Disconnected) => {
                active.join();
                Err(ConstellationError::CaptureThreadPanicked)
            }
        }
    }

    /// The idle-side worker, reclaiming it from a late thread if needed
    fn idle_worker(&mut self) -> Result<&mut Acquisition<T>> {
        if self.worker.is_none() {
            if let Some(mut lingering) = self.lingering.take() {
                match lingering.finished.try_recv() {
                    Ok(worker) => {
                        lingering.join();
                        self.worker = Some(worker);
                    }
                    Err(TryRecvError::Empty) => {
                        self.lingering = Some(lingering);
                        return Err(ConstellationError::LinkUnavailable);
                    }
                    Err(TryRecvError::Disconnected) => {
                        lingering.join();
                        return Err(ConstellationError::CaptureThreadPanicked);
                    }
                }
            }
        }

        self.worker
            .as_mut()
            .ok_or(ConstellationError::LinkUnavailable)
    }
}

impl<T: Transport + 'static> Drop for CaptureController<T> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
