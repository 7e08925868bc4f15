use std::io;
use std::time::Duration;

use haplo_timing::Timer;
use tracing::{debug, info, warn};

use crate::error::InputError;
use crate::ring::ByteRing;

/// Unmatched bytes kept between polls; older bytes are dropped first.
const KEYPAD_BUFFER_CAPACITY: usize = 64;
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Byte source behind a serial keypad.
pub trait SerialLine {
    fn bytes_waiting(&mut self) -> io::Result<usize>;
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl SerialLine for Box<dyn serialport::SerialPort> {
    fn bytes_waiting(&mut self) -> io::Result<usize> {
        Ok(self.bytes_to_read()? as usize)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut **self, buf)
    }
}

/// Response source that reports single symbols without blocking.
pub trait ResponseKeypad {
    /// First allowed symbol pressed since the last match, if any.
    fn poll(&mut self, allowed: &[&str]) -> Option<String>;
    /// Discards everything buffered so far.
    fn clear(&mut self);
    fn close(&mut self) {}
}

/// Keypad that sends ASCII digits over a serial line.
pub struct SerialKeypad<L: SerialLine> {
    line: Option<L>,
    buffer: ByteRing,
    label: String,
}

impl<L: SerialLine> SerialKeypad<L> {
    pub fn new(line: L, label: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            buffer: ByteRing::new(KEYPAD_BUFFER_CAPACITY),
            label: label.into(),
        }
    }

    pub fn buffered(&self) -> Vec<u8> {
        self.buffer.to_vec()
    }

    /// Moves every waiting byte into the ring. Non-ASCII bytes are dropped.
    fn drain_line(&mut self) {
        let Some(line) = self.line.as_mut() else {
            return;
        };
        let waiting = match line.bytes_waiting() {
            Ok(n) => n,
            Err(e) => {
                debug!("keypad {}: bytes_waiting failed: {}", self.label, e);
                0
            }
        };
        if waiting == 0 {
            return;
        }
        let mut chunk = vec![0u8; waiting];
        match line.read_bytes(&mut chunk) {
            Ok(n) => {
                for &b in chunk[..n].iter().filter(|b| b.is_ascii()) {
                    self.buffer.push(b);
                }
            }
            Err(e) => warn!("keypad {}: read failed: {}", self.label, e),
        }
    }

    /// Polls every 10 ms until an allowed key arrives or `max_wait` passes.
    pub fn wait_for_key<T: Timer>(
        &mut self,
        allowed: &[&str],
        max_wait: Duration,
        timer: &T,
    ) -> Option<String> {
        let start = timer.now();
        while timer.elapsed(start) <= max_wait {
            if let Some(key) = self.poll(allowed) {
                return Some(key);
            }
            timer.sleep(WAIT_POLL_INTERVAL);
        }
        None
    }
}

impl<L: SerialLine> ResponseKeypad for SerialKeypad<L> {
    fn poll(&mut self, allowed: &[&str]) -> Option<String> {
        if allowed.is_empty() {
            return None;
        }
        self.drain_line();
        let matched = self.buffer.take_first_match(|b| {
            allowed
                .iter()
                .any(|s| s.len() == 1 && s.as_bytes()[0] == b)
        })?;
        Some(char::from(matched).to_string())
    }

    fn clear(&mut self) {
        self.drain_line();
        self.buffer.clear();
    }

    fn close(&mut self) {
        if self.line.take().is_some() {
            info!("keypad {} closed", self.label);
        }
    }
}

/// Keypad on an opened serial port.
pub type PortKeypad = SerialKeypad<Box<dyn serialport::SerialPort>>;

/// Opens a serial keypad in non-blocking mode.
pub fn open_serial_keypad(port: &str, baud: u32) -> Result<PortKeypad, InputError> {
    let line = serialport::new(port, baud)
        .timeout(Duration::ZERO)
        .open()
        .map_err(|source| InputError::KeypadOpen {
            port: port.to_string(),
            source,
        })?;
    info!("keypad opened on {} at {} baud", port, baud);
    Ok(SerialKeypad::new(line, port))
}
