//! Background producer task.
//!
//! One long-running thread owns the read half of the link and is the only
//! code that ever reads from it. Each chunk is routed by a single snapshot
//! of the mode gate: Sync-mode chunks go to the sync channel, Idle-mode
//! chunks accumulate in the packetizer. Idle-timer checks run every
//! iteration, including empty polls, so a quiet packet still closes on
//! time.

use super::chunk::ByteChunk;
use super::packetizer::Packetizer;
use super::{Fault, Shared};
use crate::port::SerialLink;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

pub(super) struct ReaderTask {
    pub link: Box<dyn SerialLink>,
    pub shared: Arc<Shared>,
    pub sync_tx: Sender<ByteChunk>,
    pub chunk_size: usize,
    pub idle_threshold: Duration,
}

pub(super) fn run(mut task: ReaderTask) {
    let mut buffer = vec![0u8; task.chunk_size.max(1)];
    let mut packetizer = Packetizer::new(task.idle_threshold);
    debug!(port = task.link.name(), "reader started");

    loop {
        if task.shared.shutdown.load(Ordering::SeqCst) {
            break;
        }

        match task.link.read_bytes(&mut buffer) {
            Ok(n) if n > 0 => {
                let now = Instant::now();
                task.shared
                    .metrics
                    .bytes_received
                    .fetch_add(n as u64, Ordering::Relaxed);

                if task.shared.mode.is_sync() {
                    // A partial unsolicited message must not bleed into the
                    // response: close it out before routing sync bytes.
                    packetizer.flush_into(&task.shared.store);
                    trace!(len = n, "routing chunk to sync channel");
                    let chunk = ByteChunk {
                        bytes: buffer[..n].to_vec(),
                        received_at: now,
                    };
                    match task.sync_tx.try_send(chunk) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            error!("sync channel overflow, controller is not consuming");
                            task.shared.record_fault(Fault::Internal(
                                "sync channel overflow".to_string(),
                            ));
                            break;
                        }
                        // Engine is tearing the connection down.
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                } else {
                    trace!(len = n, "buffering chunk for async stream");
                    packetizer.push(&buffer[..n], now);
                }
            }
            Ok(_) => {}
            Err(e) if e.is_transient() => {}
            Err(e) => {
                error!(error = %e, "serial read failed, closing link");
                task.shared
                    .record_fault(Fault::Link(format!("serial read failed: {e}")));
                break;
            }
        }

        if packetizer.idle_expired(Instant::now()) {
            packetizer.flush_into(&task.shared.store);
        }
    }

    // Residual idle-mode bytes become one final packet.
    packetizer.flush_into(&task.shared.store);
    debug!(port = task.link.name(), "reader stopped");
}
