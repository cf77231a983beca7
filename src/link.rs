//! Byte-command protocol for the constellation test instrument
//!
//! Every command is a single opcode optionally followed by payload bytes. The
//! instrument needs a fixed amount of processing time after each command
//! before it accepts the next one, so every write is followed by the settle
//! delay listed in [`Timing`].

use crate::error::{ConstellationError, Result};
use log::{info, trace};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

// Protocol opcodes
const OP_RESET: u8 = 0x00;
const OP_STORE: u8 = 0x01;
const OP_SET_REGISTER: u8 = 0x03;
const OP_READ_POINT: u8 = 0x05;
const OP_TRIGGER: u8 = 0x06;

/// Bytes returned for a single point request (signed I, signed Q)
const POINT_REPLY_SIZE: usize = 2;

/// Default baud rate of the instrument's control port
pub const DEFAULT_BAUD: u32 = 9600;

/// Default read timeout for point replies
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Anything the link can talk through: a serial port or an in-memory device
pub trait Transport: Read + Write + Send {}
impl<T: Read + Write + Send> Transport for T {}

/// Link over a real serial port
pub type SerialLink = DeviceLink<Box<dyn SerialPort>>;

/// Serial connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Port identifier (e.g. `/dev/ttyUSB0` or `COM2`)
    pub port: String,
    pub baud: u32,
    pub read_timeout: Duration,
}

impl LinkConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud: DEFAULT_BAUD,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Settle delays the instrument requires after each command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub reset: Duration,
    pub store: Duration,
    pub trigger: Duration,
    pub set_register: Duration,
    /// Wait between a point request and reading its reply
    pub read_settle: Duration,
    /// Extra wait after the whole noise-parameter sequence
    pub noise_settle: Duration,
    /// Wait after the initial power refresh before capture starts
    pub startup_settle: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            reset: Duration::from_millis(100),
            store: Duration::from_millis(150),
            trigger: Duration::from_millis(100),
            set_register: Duration::from_millis(100),
            read_settle: Duration::from_millis(8),
            noise_settle: Duration::from_millis(1000),
            startup_settle: Duration::from_millis(1500),
        }
    }
}

impl Timing {
    /// No delays at all, for simulated devices that answer instantly
    pub fn none() -> Self {
        Self {
            reset: Duration::ZERO,
            store: Duration::ZERO,
            trigger: Duration::ZERO,
            set_register: Duration::ZERO,
            read_settle: Duration::ZERO,
            noise_settle: Duration::ZERO,
            startup_settle: Duration::ZERO,
        }
    }
}

/// Result of a single point request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Device answered with a full reply
    Point { i: i8, q: i8 },
    /// Reply missing or incomplete within the read timeout
    Timeout,
}

/// Decode a point reply; both bytes are two's-complement signed values
pub fn decode_point(reply: [u8; POINT_REPLY_SIZE]) -> ReadOutcome {
    ReadOutcome::Point {
        i: i8::from_ne_bytes([reply[0]]),
        q: i8::from_ne_bytes([reply[1]]),
    }
}

/// Command link to the instrument
pub struct DeviceLink<T: Transport> {
    transport: T,
    timing: Timing,
}

impl DeviceLink<Box<dyn SerialPort>> {
    /// Open the serial port with the protocol's default timing
    ///
    /// # Returns
    /// * `Ok(SerialLink)` - Port open and ready for commands
    /// * `Err(ConstellationError::Connection)` - Port missing, busy or misconfigured
    pub fn open(config: &LinkConfig) -> Result<Self> {
        let port = serialport::new(&config.port, config.baud)
            .timeout(config.read_timeout)
            .open()
            .map_err(|source| ConstellationError::Connection {
                port: config.port.clone(),
                source,
            })?;

        info!("Connected to {} at {} baud", config.port, config.baud);
        Ok(Self::new(port, Timing::default()))
    }
}

impl<T: Transport> DeviceLink<T> {
    pub fn new(transport: T, timing: Timing) -> Self {
        Self { transport, timing }
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Reset the instrument (0x00)
    pub fn reset(&mut self) -> Result<()> {
        self.command(&[OP_RESET], self.timing.reset)
    }

    /// Store the current sample buffer (0x01)
    pub fn store(&mut self) -> Result<()> {
        self.command(&[OP_STORE], self.timing.store)
    }

    /// Trigger a new capture (0x06)
    pub fn trigger(&mut self) -> Result<()> {
        self.command(&[OP_TRIGGER], self.timing.trigger)
    }

    /// Write `value` into register `index` (0x03)
    pub fn set_register(&mut self, index: u8, value: u8) -> Result<()> {
        self.command(&[OP_SET_REGISTER, index, value], self.timing.set_register)
    }

    /// Request the point stored at `addr` (0x05) and read its 2-byte reply
    ///
    /// A read timeout or a reply shorter than two bytes is reported as
    /// `Ok(ReadOutcome::Timeout)`. Any other I/O failure is returned as an error
    /// so the caller can decide between retrying and giving up.
    pub fn read_point(&mut self, addr: u8) -> Result<ReadOutcome> {
        self.send(&[OP_READ_POINT, addr])?;
        settle(self.timing.read_settle);

        let mut reply = [0u8; POINT_REPLY_SIZE];
        let mut filled = 0;
        while filled < reply.len() {
            match self.transport.read(&mut reply[filled..]) {
                Ok(0) => return Ok(ReadOutcome::Timeout),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    trace!(
                        "Point 0x{:02X}: {} of {} bytes before timeout",
                        addr,
                        filled,
                        reply.len()
                    );
                    return Ok(ReadOutcome::Timeout);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(decode_point(reply))
    }

    /// Give back the underlying transport, closing nothing
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.transport.write_all(bytes)?;
        self.transport.flush()?;
        Ok(())
    }

    fn command(&mut self, bytes: &[u8], delay: Duration) -> Result<()> {
        self.send(bytes)?;
        settle(delay);
        Ok(())
    }
}

fn settle(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

/// In-memory stand-in for the instrument
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::sync::{Arc, Mutex, MutexGuard};

    #[derive(Default)]
    struct DeviceState {
        commands: Vec<Vec<u8>>,
        partial: Vec<u8>,
        outgoing: VecDeque<u8>,
        scripted: VecDeque<Vec<u8>>,
        silent: bool,
        fail_writes: bool,
    }

    /// Parses written commands and answers point requests with `[addr, -addr]`
    /// unless a scripted reply is queued. Clones share the same device.
    #[derive(Clone, Default)]
    pub struct FakeDevice {
        state: Arc<Mutex<DeviceState>>,
    }

    impl FakeDevice {
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> MutexGuard<'_, DeviceState> {
            self.state.lock().unwrap()
        }

        /// Stop answering point requests
        pub fn set_silent(&self, silent: bool) {
            self.lock().silent = silent;
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.lock().fail_writes = fail;
        }

        /// Answer the next point request with exactly these bytes
        pub fn script_reply(&self, bytes: &[u8]) {
            self.lock().scripted.push_back(bytes.to_vec());
        }

        pub fn commands(&self) -> Vec<Vec<u8>> {
            self.lock().commands.clone()
        }

        /// Addresses of every point request so far, in order
        pub fn read_addresses(&self) -> Vec<u8> {
            self.lock()
                .commands
                .iter()
                .filter(|c| c[0] == 0x05)
                .map(|c| c[1])
                .collect()
        }

        pub fn clear_commands(&self) {
            self.lock().commands.clear();
        }
    }

    impl Write for FakeDevice {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut state = self.lock();
            if state.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link severed"));
            }

            state.partial.extend_from_slice(buf);
            while let Some(&op) = state.partial.first() {
                let len = match op {
                    0x03 => 3,
                    0x05 => 2,
                    _ => 1,
                };
                if state.partial.len() < len {
                    break;
                }
                let command: Vec<u8> = state.partial.drain(..len).collect();
                if command[0] == 0x05 && !state.silent {
                    let addr = command[1];
                    let reply = state
                        .scripted
                        .pop_front()
                        .unwrap_or_else(|| vec![addr, addr.wrapping_neg()]);
                    state.outgoing.extend(reply);
                }
                state.commands.push(command);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Read for FakeDevice {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut state = self.lock();
            if state.outgoing.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply"));
            }
            let n = buf.len().min(state.outgoing.len());
            for (slot, byte) in buf.iter_mut().zip(state.outgoing.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }
}
