//! Atomic two-state mode flag.
//!
//! The sync controller flips Idle→Sync before writing a command and
//! Sync→Idle after it has finished consuming the response. The reader
//! snapshots the flag once per chunk to pick a route. Sequentially
//! consistent ordering keeps the flip visible to the reader no later than
//! its next route decision.

use std::sync::atomic::{AtomicBool, Ordering};

/// Engine routing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Incoming bytes accumulate in the async packetizer.
    Idle,
    /// Incoming bytes belong to an in-flight synchronous command.
    Sync,
}

/// Shared flag the reader and sync controller both observe.
#[derive(Debug, Default)]
pub struct ModeGate {
    sync: AtomicBool,
}

impl ModeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current mode.
    pub fn current(&self) -> Mode {
        if self.sync.load(Ordering::SeqCst) {
            Mode::Sync
        } else {
            Mode::Idle
        }
    }

    pub fn is_sync(&self) -> bool {
        self.sync.load(Ordering::SeqCst)
    }

    pub fn enter_sync(&self) {
        self.sync.store(true, Ordering::SeqCst);
    }

    pub fn exit_sync(&self) {
        self.sync.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let gate = ModeGate::new();
        assert_eq!(gate.current(), Mode::Idle);
        assert!(!gate.is_sync());
    }

    #[test]
    fn flips_both_ways() {
        let gate = ModeGate::new();
        gate.enter_sync();
        assert_eq!(gate.current(), Mode::Sync);
        gate.exit_sync();
        assert_eq!(gate.current(), Mode::Idle);
    }

    #[test]
    fn flip_is_visible_across_threads() {
        let gate = std::sync::Arc::new(ModeGate::new());
        gate.enter_sync();
        let seen = {
            let gate = gate.clone();
            std::thread::spawn(move || gate.is_sync()).join().unwrap()
        };
        assert!(seen);
    }
}
