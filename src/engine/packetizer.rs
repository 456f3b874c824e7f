//! Idle-timer packet assembly for the async stream.
//!
//! The packetizer is owned by the reader task alone; no locking. Three
//! triggers close a packet: the idle threshold elapsing, an Idle→Sync mode
//! switch (forced flush, so a partial unsolicited message never leaks into a
//! command response), and reader shutdown.

use super::chunk::AsyncPacket;
use super::store::AsyncStore;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Packetizer {
    buffer: Vec<u8>,
    last_rx: Instant,
    idle_threshold: Duration,
}

impl Packetizer {
    pub fn new(idle_threshold: Duration) -> Self {
        Self {
            buffer: Vec::new(),
            last_rx: Instant::now(),
            idle_threshold,
        }
    }

    /// Append idle-mode bytes and restart the idle clock.
    pub fn push(&mut self, bytes: &[u8], now: Instant) {
        self.buffer.extend_from_slice(bytes);
        self.last_rx = now;
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// True when a non-empty buffer has gone quiet past the threshold.
    pub fn idle_expired(&self, now: Instant) -> bool {
        !self.buffer.is_empty() && now.duration_since(self.last_rx) >= self.idle_threshold
    }

    /// Close the current buffer into a packet and publish it.
    ///
    /// No-op when the buffer is empty, so it is safe to call on every
    /// trigger without checking first.
    pub fn flush_into(&mut self, store: &AsyncStore) {
        if self.buffer.is_empty() {
            return;
        }
        let raw = std::mem::take(&mut self.buffer);
        store.push(AsyncPacket::from_raw(raw));
        self.last_rx = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_expiry_requires_data_and_silence() {
        let mut pkt = Packetizer::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(!pkt.idle_expired(t0 + Duration::from_millis(500)));

        pkt.push(b"+CMTI: ", t0);
        assert!(!pkt.idle_expired(t0 + Duration::from_millis(50)));
        assert!(pkt.idle_expired(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn new_bytes_restart_the_idle_clock() {
        let mut pkt = Packetizer::new(Duration::from_millis(100));
        let t0 = Instant::now();
        pkt.push(b"part1", t0);
        pkt.push(b"part2", t0 + Duration::from_millis(90));
        assert!(!pkt.idle_expired(t0 + Duration::from_millis(150)));
        assert!(pkt.idle_expired(t0 + Duration::from_millis(190)));
    }

    #[test]
    fn flush_publishes_one_packet() {
        let store = AsyncStore::new(10);
        let mut pkt = Packetizer::new(Duration::from_millis(100));
        pkt.push(b"\r\n+CMTI: ", Instant::now());
        pkt.flush_into(&store);

        assert!(pkt.is_empty());
        let (packets, _) = store.drain();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].raw, b"\r\n+CMTI: ");
    }

    #[test]
    fn empty_flush_publishes_nothing() {
        let store = AsyncStore::new(10);
        let mut pkt = Packetizer::new(Duration::from_millis(100));
        pkt.flush_into(&store);
        assert!(store.is_empty());
    }
}
