//! In-memory serial link for tests.
//!
//! `MockPort` is clonable: every clone shares the same device state, which
//! mirrors how a hardware port behaves behind [`SerialLink::try_clone_link`].
//! Tests keep one handle to feed "device" bytes and inspect writes while the
//! engine's reader drains another.

use super::error::PortError;
use super::traits::SerialLink;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct MockState {
    /// Pending device output, framed: one entry per `feed` call so chunk
    /// boundaries in tests are deterministic.
    frames: VecDeque<Vec<u8>>,
    /// Everything written through the link, one entry per write call.
    write_log: Vec<Vec<u8>>,
    /// When set, reads fail hard (device unplugged).
    read_fault: bool,
    /// When set, writes fail hard.
    write_fault: bool,
}

/// Simulated serial device.
#[derive(Clone)]
pub struct MockPort {
    name: String,
    read_window: Duration,
    state: Arc<Mutex<MockState>>,
}

impl MockPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            read_window: Duration::from_millis(20),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Queue bytes the "device" emits. Each call becomes one read frame.
    pub fn feed(&self, data: &[u8]) {
        self.state.lock().frames.push_back(data.to_vec());
    }

    /// All bytes written through the link, flattened in order.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().write_log.concat()
    }

    /// The write log with per-call framing preserved.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Make subsequent reads fail as if the device disappeared.
    pub fn break_reads(&self) {
        self.state.lock().read_fault = true;
    }

    /// Make subsequent writes fail.
    pub fn break_writes(&self) {
        self.state.lock().write_fault = true;
    }

    /// Bytes not yet consumed by the reader.
    pub fn unread(&self) -> usize {
        self.state.lock().frames.iter().map(Vec::len).sum()
    }
}

impl SerialLink for MockPort {
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let deadline = Instant::now() + self.read_window;
        loop {
            {
                let mut state = self.state.lock();
                if state.read_fault {
                    return Err(PortError::Io(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "simulated device loss",
                    )));
                }
                if let Some(mut frame) = state.frames.pop_front() {
                    let n = frame.len().min(buffer.len());
                    buffer[..n].copy_from_slice(&frame[..n]);
                    if n < frame.len() {
                        state.frames.push_front(frame.split_off(n));
                    }
                    return Ok(n);
                }
            }
            if Instant::now() >= deadline {
                return Err(PortError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "read window elapsed",
                )));
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if state.write_fault {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated device loss",
            )));
        }
        state.write_log.push(data.to_vec());
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), PortError> {
        Ok(())
    }

    fn try_clone_link(&self) -> Result<Box<dyn SerialLink>, PortError> {
        Ok(Box::new(self.clone()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MockPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPort")
            .field("name", &self.name)
            .field("unread", &self.unread())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_then_read() {
        let port = MockPort::new("MOCK0");
        port.feed(b"hello");

        let mut link: Box<dyn SerialLink> = Box::new(port.clone());
        let mut buffer = [0u8; 16];
        let n = link.read_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"hello");
    }

    #[test]
    fn frames_keep_their_boundaries() {
        let port = MockPort::new("MOCK0");
        port.feed(b"first");
        port.feed(b"second");

        let mut link: Box<dyn SerialLink> = Box::new(port.clone());
        let mut buffer = [0u8; 64];
        let n = link.read_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"first");
        let n = link.read_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"second");
    }

    #[test]
    fn oversized_frame_is_split() {
        let port = MockPort::new("MOCK0");
        port.feed(b"abcdef");

        let mut link: Box<dyn SerialLink> = Box::new(port.clone());
        let mut buffer = [0u8; 4];
        let n = link.read_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"abcd");
        let n = link.read_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"ef");
    }

    #[test]
    fn empty_read_times_out() {
        let port = MockPort::new("MOCK0");
        let mut link: Box<dyn SerialLink> = Box::new(port);
        let mut buffer = [0u8; 4];
        let err = link.read_bytes(&mut buffer).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn writes_are_logged_across_clones() {
        let port = MockPort::new("MOCK0");
        let mut link = port.try_clone_link().unwrap();
        link.write_bytes(b"AT\r\n").unwrap();
        assert_eq!(port.written(), b"AT\r\n");
    }

    #[test]
    fn broken_reads_are_fatal() {
        let port = MockPort::new("MOCK0");
        port.break_reads();
        let mut link: Box<dyn SerialLink> = Box::new(port);
        let mut buffer = [0u8; 4];
        let err = link.read_bytes(&mut buffer).unwrap_err();
        assert!(!err.is_transient());
    }
}
