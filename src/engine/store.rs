//! Bounded FIFO of completed async packets.
//!
//! Overflow drops the oldest packet and counts it; the count is reported on
//! the next drain. The push path never blocks the reader.

use super::chunk::AsyncPacket;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct StoreInner {
    packets: VecDeque<AsyncPacket>,
    /// Packets discarded by overflow since the last drain.
    dropped_since_drain: u64,
}

/// Thread-safe packet store shared by the reader and the tool surface.
#[derive(Debug)]
pub struct AsyncStore {
    inner: Mutex<StoreInner>,
    cap: usize,
    published_total: AtomicU64,
    dropped_total: AtomicU64,
}

impl AsyncStore {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            cap: cap.max(1),
            published_total: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
        }
    }

    /// Publish a packet, evicting the oldest entry if the store is full.
    pub fn push(&self, packet: AsyncPacket) {
        let mut inner = self.inner.lock();
        if inner.packets.len() >= self.cap {
            inner.packets.pop_front();
            inner.dropped_since_drain += 1;
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
        }
        inner.packets.push_back(packet);
        self.published_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Take every stored packet in one atomic snapshot, plus the number of
    /// packets lost to overflow since the previous drain.
    pub fn drain(&self) -> (Vec<AsyncPacket>, u64) {
        let mut inner = self.inner.lock();
        let packets = inner.packets.drain(..).collect();
        let dropped = std::mem::take(&mut inner.dropped_since_drain);
        (packets, dropped)
    }

    /// Packets currently waiting to be drained.
    pub fn len(&self) -> usize {
        self.inner.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn published_total(&self) -> u64 {
        self.published_total.load(Ordering::Relaxed)
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(text: &str) -> AsyncPacket {
        AsyncPacket::from_raw(text.as_bytes().to_vec())
    }

    #[test]
    fn push_and_drain_preserve_order() {
        let store = AsyncStore::new(10);
        store.push(packet("one"));
        store.push(packet("two"));

        let (drained, dropped) = store.drain();
        assert_eq!(dropped, 0);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].text, "one");
        assert_eq!(drained[1].text, "two");
        assert!(store.is_empty());
    }

    #[test]
    fn overflow_drops_oldest_and_counts() {
        let store = AsyncStore::new(2);
        store.push(packet("a"));
        store.push(packet("b"));
        store.push(packet("c"));

        let (drained, dropped) = store.drain();
        assert_eq!(dropped, 1);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].text, "b");
        assert_eq!(drained[1].text, "c");
    }

    #[test]
    fn dropped_counter_resets_after_drain() {
        let store = AsyncStore::new(1);
        store.push(packet("a"));
        store.push(packet("b"));
        let (_, dropped) = store.drain();
        assert_eq!(dropped, 1);
        store.push(packet("c"));
        let (_, dropped) = store.drain();
        assert_eq!(dropped, 0);
        assert_eq!(store.dropped_total(), 1);
        assert_eq!(store.published_total(), 3);
    }
}
