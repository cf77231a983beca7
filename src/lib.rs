//! Live I/Q constellation capture from a serial test instrument
//!
//! This library drives a constellation test instrument over its serial control
//! port, keeps a bounded window of recent (I, Q) points, and summarises them once
//! per display tick.
//!
//! Acquisition runs on its own thread and is the only user of the serial link.
//! Captured samples cross to the display side through a [`SampleQueue`], which the
//! [`StatsWindow`] drains on every tick.
//!
//! # Quick Start
//!
//! ## Single Point
//! ```no_run
//! use iq_constellation::{LinkConfig, ReadOutcome, SerialLink};
//!
//! let mut link = SerialLink::open(&LinkConfig::new("/dev/ttyUSB0"))?;
//! link.reset()?;
//! if let ReadOutcome::Point { i, q } = link.read_point(0x10)? {
//!     println!("I={} Q={}", i, q);
//! }
//! # Ok::<(), iq_constellation::ConstellationError>(())
//! ```
//!
//! ## Live Session
//! ```no_run
//! use iq_constellation::{
//!     CaptureConfig, LinkConfig, NoiseParameters, Session, StatsConfig, Ticker,
//! };
//! use rand::{rngs::StdRng, SeedableRng};
//! use std::time::Duration;
//!
//! let mut session = Session::connect(
//!     &LinkConfig::new("/dev/ttyUSB0"),
//!     CaptureConfig::default(),
//!     StatsConfig::default(),
//!     StdRng::from_entropy(),
//! )?;
//! session.launch(NoiseParameters::default())?;
//!
//! let mut ticker = Ticker::new(Duration::from_millis(80));
//! for _ in 0..100 {
//!     let snapshot = session.tick();
//!     println!("{} points, {:.1} pts/sec", snapshot.buffered, snapshot.capture_rate);
//!     ticker.wait();
//! }
//! session.shutdown()?;
//! # Ok::<(), iq_constellation::ConstellationError>(())
//! ```

pub mod args;
pub mod capture;
pub mod common;
pub mod error;
pub mod link;
pub mod queue;
pub mod session;
pub mod stats;

// Re-export public API
pub use args::Args;
pub use capture::{
    CaptureConfig, CaptureController, CaptureState, CaptureStatus, NoiseParameters,
};
pub use common::{parse_hex_u16, snapshot_lines, Ticker, DEFAULT_TICK};
pub use error::{ConstellationError, Result};
pub use link::{
    decode_point, DeviceLink, LinkConfig, ReadOutcome, SerialLink, Timing, Transport,
    DEFAULT_BAUD, DEFAULT_READ_TIMEOUT,
};
pub use queue::{Sample, SampleProducer, SampleQueue};
pub use session::{ControlEvent, Flow, Renderer, Session};
pub use stats::{DisplayBuffer, Snapshot, StatsConfig, StatsWindow};
