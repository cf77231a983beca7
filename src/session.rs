//! Capture session: one controller, one stats window, one control surface
//!
//! The session is the single value that ties acquisition and display together.
//! Binaries own it on their UI thread, forward control events to
//! [`Session::handle`] and call [`Session::tick_into`] at a fixed cadence.

use crate::capture::{CaptureConfig, CaptureController, NoiseParameters};
use crate::error::Result;
use crate::link::{DeviceLink, LinkConfig, SerialLink, Transport};
use crate::queue::SampleQueue;
use crate::stats::{DisplayBuffer, Snapshot, StatsConfig, StatsWindow};
use log::info;
use rand::rngs::StdRng;
use serialport::SerialPort;
use std::thread;
use std::time::Instant;

/// Discrete user controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Pause,
    Resume,
    /// Pause if running, resume if paused
    TogglePause,
    Clear,
    ForceRefresh,
    Quit,
}

impl ControlEvent {
    /// Keyboard mapping: space pauses/resumes, `c` clears, `r` refreshes, `q` quits
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            ' ' => Some(ControlEvent::TogglePause),
            'p' => Some(ControlEvent::Pause),
            's' => Some(ControlEvent::Resume),
            'c' => Some(ControlEvent::Clear),
            'r' => Some(ControlEvent::ForceRefresh),
            'q' => Some(ControlEvent::Quit),
            _ => None,
        }
    }
}

/// What the caller should do after handling an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Presentation of one tick's snapshot
pub trait Renderer {
    fn render(&mut self, snapshot: &Snapshot, points: &DisplayBuffer);
}

pub struct Session<T: Transport + 'static> {
    controller: CaptureController<T>,
    stats: StatsWindow,
}

impl Session<Box<dyn SerialPort>> {
    /// Open the serial link and build an idle session around it
    pub fn connect(
        link: &LinkConfig,
        capture: CaptureConfig,
        stats: StatsConfig,
        rng: StdRng,
    ) -> Result<Self> {
        let link = SerialLink::open(link)?;
        Self::new(link, capture, stats, rng)
    }
}

impl<T: Transport + 'static> Session<T> {
    pub fn new(
        link: DeviceLink<T>,
        capture: CaptureConfig,
        stats: StatsConfig,
        rng: StdRng,
    ) -> Result<Self> {
        let queue = SampleQueue::new();
        let controller = CaptureController::new(link, queue.producer(), capture, rng)?;
        Ok(Self {
            controller,
            stats: StatsWindow::new(queue, stats)?,
        })
    }

    pub fn controller(&self) -> &CaptureController<T> {
        &self.controller
    }

    pub fn stats(&self) -> &StatsWindow {
        &self.stats
    }

    /// Startup sequence: noise levels, initial refresh, settle, capture
    ///
    /// Any failure before capture begins is returned and leaves the session idle.
    pub fn launch(&mut self, noise: NoiseParameters) -> Result<()> {
        self.controller.set_noise_parameters(noise.awgn, noise.pn)?;

        info!("Initial refresh...");
        self.controller.force_refresh()?;
        let settle = self.controller.timing().startup_settle;
        if !settle.is_zero() {
            thread::sleep(settle);
        }

        self.controller.start()
    }

    /// Apply a control event
    pub fn handle(&mut self, event: ControlEvent) -> Result<Flow> {
        match event {
            ControlEvent::Pause => {
                self.controller.stop()?;
                info!("Paused");
            }
            ControlEvent::Resume => {
                if !self.controller.is_running() {
                    self.controller.start()?;
                    info!("Resumed");
                }
            }
            ControlEvent::TogglePause => {
                let next = if self.controller.is_running() {
                    ControlEvent::Pause
                } else {
                    ControlEvent::Resume
                };
                return self.handle(next);
            }
            ControlEvent::Clear => {
                self.stats.clear();
                info!("Data cleared");
            }
            ControlEvent::ForceRefresh => {
                self.controller.force_refresh()?;
                info!("Manual refresh");
            }
            ControlEvent::Quit => {
                self.controller.stop()?;
                info!("Exiting");
                return Ok(Flow::Quit);
            }
        }
        Ok(Flow::Continue)
    }

    /// Drain the queue and summarise; never blocks on the device
    pub fn tick(&mut self) -> Snapshot {
        let status = self.controller.status();
        self.stats.tick(Instant::now(), &status)
    }

    /// Tick and hand the result to a renderer
    pub fn tick_into<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> Snapshot {
        let snapshot = self.tick();
        renderer.render(&snapshot, self.stats.buffer());
        snapshot
    }

    /// Stop capture and close the link
    pub fn shutdown(mut self) -> Result<()> {
        self.controller.stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::testing::FakeDevice;
    use crate::link::Timing;
    use rand::SeedableRng;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingRenderer {
        frames: Vec<(Snapshot, usize)>,
    }

    impl Renderer for RecordingRenderer {
        fn render(&mut self, snapshot: &Snapshot, points: &DisplayBuffer) {
            self.frames.push((*snapshot, points.len()));
        }
    }

    fn session(device: &FakeDevice) -> Session<FakeDevice> {
        let capture = CaptureConfig {
            timeout_backoff: Duration::from_millis(1),
            ..CaptureConfig::default()
        };
        Session::new(
            DeviceLink::new(device.clone(), Timing::none()),
            capture,
            StatsConfig::default(),
            StdRng::seed_from_u64(21),
        )
        .unwrap()
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(ControlEvent::from_key(' '), Some(ControlEvent::TogglePause));
        assert_eq!(ControlEvent::from_key('C'), Some(ControlEvent::Clear));
        assert_eq!(ControlEvent::from_key('r'), Some(ControlEvent::ForceRefresh));
        assert_eq!(ControlEvent::from_key('q'), Some(ControlEvent::Quit));
        assert_eq!(ControlEvent::from_key('x'), None);
    }

    #[test]
    fn test_launch_sequence() {
        let device = FakeDevice::new();
        let mut session = session(&device);

        session.launch(NoiseParameters::default()).unwrap();
        assert!(session.controller().is_running());
        thread::sleep(Duration::from_millis(10));
        session.handle(ControlEvent::Pause).unwrap();

        let commands = device.commands();
        // Noise registers + reset, then the initial refresh
        assert_eq!(commands[0], vec![0x03, 0x00, 0x00]);
        assert_eq!(commands[3], vec![0x03, 0x03, 0x01]);
        assert_eq!(commands[4], vec![0x00]);
        assert_eq!(
            &commands[5..10],
            &[vec![0x00], vec![0x00], vec![0x01], vec![0x06], vec![0x06]]
        );
        assert!(session.controller().status().refresh_count >= 2);
    }

    #[test]
    fn test_launch_aborts_on_write_failure() {
        let device = FakeDevice::new();
        device.set_fail_writes(true);
        let mut session = session(&device);

        assert!(session.launch(NoiseParameters::default()).is_err());
        assert!(!session.controller().is_running());
    }

    #[test]
    fn test_tick_renders_captured_points() {
        let device = FakeDevice::new();
        let mut session = session(&device);
        let mut renderer = RecordingRenderer::default();

        session.handle(ControlEvent::Resume).unwrap();
        thread::sleep(Duration::from_millis(20));
        session.handle(ControlEvent::Pause).unwrap();

        let snapshot = session.tick_into(&mut renderer);
        assert!(snapshot.total_captured > 0);
        assert!(snapshot.buffered <= 1500);
        assert!(!snapshot.running);
        assert_eq!(renderer.frames.len(), 1);
        assert_eq!(renderer.frames[0].1, snapshot.buffered);
    }

    #[test]
    fn test_clear_resets_display() {
        let device = FakeDevice::new();
        let mut session = session(&device);

        session.handle(ControlEvent::Resume).unwrap();
        thread::sleep(Duration::from_millis(10));
        session.handle(ControlEvent::Pause).unwrap();
        session.tick();

        session.handle(ControlEvent::Clear).unwrap();
        assert_eq!(session.stats().buffer().len(), 0);
        assert_eq!(session.stats().total_captured(), 0);
    }

    #[test]
    fn test_toggle_pause() {
        let device = FakeDevice::new();
        device.set_silent(true);
        let mut session = session(&device);

        session.handle(ControlEvent::TogglePause).unwrap();
        assert!(session.controller().is_running());
        assert!(session.tick().running);
        session.handle(ControlEvent::TogglePause).unwrap();
        assert!(!session.controller().is_running());
        assert!(!session.tick().running);
    }

    #[test]
    fn test_force_refresh_event_while_paused() {
        let device = FakeDevice::new();
        let mut session = session(&device);

        session.handle(ControlEvent::ForceRefresh).unwrap();
        assert_eq!(session.controller().status().refresh_count, 1);
        assert_eq!(device.commands().len(), 5);
    }

    #[test]
    fn test_quit() {
        let device = FakeDevice::new();
        device.set_silent(true);
        let mut session = session(&device);

        session.handle(ControlEvent::Resume).unwrap();
        assert_eq!(session.handle(ControlEvent::Quit).unwrap(), Flow::Quit);
        assert!(!session.controller().is_running());
        session.shutdown().unwrap();
    }
}
