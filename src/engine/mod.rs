//! The serial I/O engine.
//!
//! One engine owns exactly one open port. A background reader task pulls
//! bytes off the wire and routes each chunk by the current [`Mode`]: Sync
//! chunks feed the in-flight command's response, Idle chunks accumulate
//! into unsolicited-message packets delimited by an inter-byte idle gap.
//!
//! Every byte read from the port ends up in exactly one of the two streams;
//! overflow is reported, never silent.

pub mod chunk;
pub mod mode;
pub mod packetizer;
pub mod policy;
pub mod store;

mod reader;

pub use chunk::{AsyncPacket, ByteChunk};
pub use mode::{Mode, ModeGate};
pub use policy::{WaitPolicy, AT_TERMINATORS};
pub use store::AsyncStore;

use crate::codec;
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::port::{PortSettings, SerialLink, SystemPort};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Upper bound on a caller-supplied send timeout.
const MAX_SEND_TIMEOUT: Duration = Duration::from_secs(300);

/// Highest baud rate accepted from the tool surface.
const MAX_BAUD: u32 = 1_500_000;

/// How often a blocked response wait rechecks shutdown and faults.
const WAIT_POLL: Duration = Duration::from_millis(100);

/// Identity of the open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkParams {
    pub port: String,
    pub baudrate: u32,
}

/// One synchronous exchange request.
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Wire bytes, already encoded by the codec.
    pub payload: Vec<u8>,
    pub policy: WaitPolicy,
    /// Stop pattern bytes, encoded the same way as the payload. Required
    /// (non-empty) for [`WaitPolicy::Keyword`].
    pub stop_pattern: Option<Vec<u8>>,
    /// Budget for the response wait. Ignored by [`WaitPolicy::None`].
    pub timeout: Duration,
}

/// Outcome of a synchronous exchange.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// Response text, or its hex rendering for binary responses.
    pub data: String,
    /// Raw response bytes.
    pub raw: Vec<u8>,
    pub is_hex: bool,
    /// `Some(..)` only for pattern-based policies. A `false` here is a
    /// reported outcome, not an error.
    pub found_stop_pattern: Option<bool>,
    /// The terminator that ended the wait, when one did.
    pub matched_stop_pattern: Option<String>,
    pub bytes_received: usize,
    /// Set when the response buffer cap was reached; overflow bytes were
    /// rerouted to the async stream.
    pub truncated: bool,
    /// Unsolicited packets waiting in the store at completion time.
    pub pending_async_count: usize,
}

/// Snapshot of engine state for the `status` tool.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub connected: bool,
    pub port: Option<String>,
    pub baudrate: Option<u32>,
    pub sync_mode: bool,
    pub pending_async_count: usize,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_published: u64,
    pub packets_dropped: u64,
    pub reader_faults: u64,
    pub fault: Option<String>,
}

/// A terminal condition recorded by the reader or a failed write.
#[derive(Debug, Clone)]
pub(crate) enum Fault {
    /// Device-level I/O loss.
    Link(String),
    /// Invariant violation inside the engine.
    Internal(String),
}

impl Fault {
    fn to_error(&self) -> EngineError {
        match self {
            Fault::Link(msg) => EngineError::connection(msg.clone()),
            Fault::Internal(msg) => EngineError::system(msg.clone()),
        }
    }

    fn message(&self) -> &str {
        match self {
            Fault::Link(msg) | Fault::Internal(msg) => msg,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Metrics {
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub reader_faults: AtomicU64,
}

/// State shared between the reader task and the engine front half.
#[derive(Debug)]
pub(crate) struct Shared {
    pub mode: ModeGate,
    pub store: AsyncStore,
    pub shutdown: AtomicBool,
    pub connected: AtomicBool,
    pub fault: Mutex<Option<Fault>>,
    pub metrics: Metrics,
}

impl Shared {
    pub(crate) fn record_fault(&self, fault: Fault) {
        self.metrics.reader_faults.fetch_add(1, Ordering::Relaxed);
        self.connected.store(false, Ordering::SeqCst);
        *self.fault.lock() = Some(fault);
    }
}

/// Everything tied to one open link; dropped as a unit on disconnect.
struct Connection {
    writer: Box<dyn SerialLink>,
    sync_rx: Receiver<ByteChunk>,
}

/// The engine. Construct once, pass explicitly to the tool layer.
pub struct Engine {
    config: Config,
    shared: Arc<Shared>,
    /// Doubles as the send mutex: one in-flight synchronous exchange at a
    /// time, and writes only happen while it is held.
    conn: Mutex<Option<Connection>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    params: Mutex<Option<LinkParams>>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let shared = Arc::new(Shared {
            mode: ModeGate::new(),
            store: AsyncStore::new(config.engine.async_store_cap),
            shutdown: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            fault: Mutex::new(None),
            metrics: Metrics::default(),
        });
        Self {
            config,
            shared,
            conn: Mutex::new(None),
            reader: Mutex::new(None),
            params: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Open the named port and start the reader.
    ///
    /// Connecting while already connected is a no-op when the parameters
    /// match the open link and an error otherwise. A link that has faulted
    /// is torn down and reopened.
    pub fn connect(&self, port: &str, baudrate: u32) -> EngineResult<()> {
        if baudrate == 0 || baudrate > MAX_BAUD {
            return Err(EngineError::invalid_input(format!(
                "baudrate {baudrate} outside supported range (1..={MAX_BAUD})"
            )));
        }

        let mut slot = self.conn.lock();
        if slot.is_some() && self.is_connected() {
            let current = self.params.lock().clone();
            return match current {
                Some(ref p) if p.port == port && p.baudrate == baudrate => {
                    debug!(port, baudrate, "connect is a no-op, parameters match");
                    Ok(())
                }
                Some(p) => Err(EngineError::connection(format!(
                    "already connected to {}@{}",
                    p.port, p.baudrate
                ))),
                None => Err(EngineError::system("connection state out of sync")),
            };
        }
        // Stale or faulted link: clean up before reopening.
        self.teardown_locked(&mut slot);

        let settings = PortSettings {
            baud_rate: baudrate,
            read_timeout: self.config.serial.read_timeout(),
            ..PortSettings::default()
        };
        let link = SystemPort::open(port, &settings)?;
        self.attach_locked(
            &mut slot,
            Box::new(link),
            LinkParams {
                port: port.to_string(),
                baudrate,
            },
        )
    }

    /// Attach an already-open link. This is how tests (and embedders with
    /// their own transport) drive the engine without hardware.
    pub fn attach(&self, link: Box<dyn SerialLink>, params: LinkParams) -> EngineResult<()> {
        let mut slot = self.conn.lock();
        if slot.is_some() && self.is_connected() {
            return Err(EngineError::connection("already connected"));
        }
        self.teardown_locked(&mut slot);
        self.attach_locked(&mut slot, link, params)
    }

    fn attach_locked(
        &self,
        slot: &mut Option<Connection>,
        link: Box<dyn SerialLink>,
        params: LinkParams,
    ) -> EngineResult<()> {
        let reader_half = link.try_clone_link()?;
        let (sync_tx, sync_rx) = bounded(self.config.engine.sync_channel_cap);

        self.shared.shutdown.store(false, Ordering::SeqCst);
        *self.shared.fault.lock() = None;
        self.shared.mode.exit_sync();

        let task = reader::ReaderTask {
            link: reader_half,
            shared: self.shared.clone(),
            sync_tx,
            chunk_size: self.config.serial.read_chunk_size,
            idle_threshold: self.config.engine.idle_threshold(),
        };
        let handle = std::thread::Builder::new()
            .name("serial-bridge-reader".to_string())
            .spawn(move || reader::run(task))
            .map_err(|e| EngineError::system(format!("failed to spawn reader: {e}")))?;

        *self.reader.lock() = Some(handle);
        *self.params.lock() = Some(params.clone());
        *slot = Some(Connection {
            writer: link,
            sync_rx,
        });
        self.shared.connected.store(true, Ordering::SeqCst);
        info!(port = %params.port, baudrate = params.baudrate, "serial link opened");
        Ok(())
    }

    /// Close the link and stop the reader. Idempotent; returns whether a
    /// link was actually open.
    pub fn disconnect(&self) -> bool {
        // Assert shutdown before taking the send mutex so an in-flight
        // send aborts within one poll interval instead of running out its
        // full timeout.
        self.shared.shutdown.store(true, Ordering::SeqCst);
        let mut slot = self.conn.lock();
        let was_open = slot.is_some();
        self.teardown_locked(&mut slot);
        was_open
    }

    fn teardown_locked(&self, slot: &mut Option<Connection>) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if let Some(conn) = slot.take() {
            if let Some(params) = self.params.lock().as_ref() {
                info!(port = %params.port, "serial link closed");
            }
            // Dropping the writer (and the channel receiver) releases the
            // descriptor half held here; the reader notices shutdown within
            // one read window and drops its own half.
            drop(conn);
        }
        if let Some(handle) = self.reader.lock().take() {
            if handle.join().is_err() {
                warn!("reader thread panicked during shutdown");
            }
        }
        *self.params.lock() = None;
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.mode.exit_sync();
        *self.shared.fault.lock() = None;
    }

    /// One synchronous exchange: write the payload, then wait according to
    /// the policy. Serialized by the send mutex; a concurrent call blocks
    /// until the first completes.
    pub fn send(&self, request: SendRequest) -> EngineResult<SendOutcome> {
        if request.timeout > MAX_SEND_TIMEOUT {
            return Err(EngineError::invalid_input(format!(
                "timeout {:?} exceeds the {:?} ceiling",
                request.timeout, MAX_SEND_TIMEOUT
            )));
        }
        if request.policy == WaitPolicy::Keyword
            && request.stop_pattern.as_deref().map_or(true, |p| p.is_empty())
        {
            return Err(EngineError::invalid_input(
                "keyword policy requires a non-empty stop_pattern",
            ));
        }
        if request.payload.is_empty() && request.policy != WaitPolicy::None {
            return Err(EngineError::data(
                "empty payload; only the none policy accepts one",
            ));
        }

        let mut guard = self.conn.lock();
        self.check_alive()?;
        let conn = guard
            .as_mut()
            .ok_or_else(|| EngineError::connection("port is not open"))?;

        // Fire and forget never enters Sync mode: the device's response
        // must land in the async stream, and a brief Sync window would
        // expose it to the exit drain instead.
        if request.policy == WaitPolicy::None {
            self.write_all(conn, &request.payload)?;
            return Ok(SendOutcome {
                data: String::new(),
                raw: Vec::new(),
                is_hex: false,
                found_stop_pattern: None,
                matched_stop_pattern: None,
                bytes_received: 0,
                truncated: false,
                pending_async_count: self.shared.store.len(),
            });
        }

        self.shared.mode.enter_sync();
        // Stale chunks from a previous exchange's trailer.
        while conn.sync_rx.try_recv().is_ok() {}

        let exchange = match self.write_all(conn, &request.payload) {
            Ok(()) => self.collect_response(conn, &request),
            Err(e) => Err(e),
        };

        // Sync→Idle: trailer bytes of a completed exchange are discarded,
        // but truncation overflow belongs to the response and is rerouted
        // to the async stream instead.
        if let Ok(collected) = &exchange {
            if collected.truncated {
                let mut overflow = collected.overflow.clone();
                while let Ok(chunk) = conn.sync_rx.try_recv() {
                    overflow.extend_from_slice(&chunk.bytes);
                }
                if !overflow.is_empty() {
                    self.shared.store.push(AsyncPacket::from_raw(overflow));
                }
            }
        }
        while conn.sync_rx.try_recv().is_ok() {}
        self.shared.mode.exit_sync();

        let collected = exchange?;
        let decoded = codec::decode_bytes(&collected.buffer);
        Ok(SendOutcome {
            data: decoded.text,
            is_hex: decoded.is_hex,
            found_stop_pattern: collected.found,
            matched_stop_pattern: collected.matched,
            bytes_received: collected.buffer.len(),
            truncated: collected.truncated,
            pending_async_count: self.shared.store.len(),
            raw: collected.buffer,
        })
    }

    /// Drain every pending unsolicited packet in one snapshot, plus the
    /// count of packets lost to store overflow since the previous drain.
    pub fn drain_async(&self) -> (Vec<AsyncPacket>, u64) {
        self.shared.store.drain()
    }

    pub fn pending_async_count(&self) -> usize {
        self.shared.store.len()
    }

    pub fn status(&self) -> EngineStatus {
        let params = self.params.lock().clone();
        EngineStatus {
            connected: self.is_connected(),
            port: params.as_ref().map(|p| p.port.clone()),
            baudrate: params.as_ref().map(|p| p.baudrate),
            sync_mode: self.shared.mode.is_sync(),
            pending_async_count: self.shared.store.len(),
            bytes_sent: self.shared.metrics.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.shared.metrics.bytes_received.load(Ordering::Relaxed),
            packets_published: self.shared.store.published_total(),
            packets_dropped: self.shared.store.dropped_total(),
            reader_faults: self.shared.metrics.reader_faults.load(Ordering::Relaxed),
            fault: self.shared.fault.lock().as_ref().map(|f| f.message().to_string()),
        }
    }

    fn check_alive(&self) -> EngineResult<()> {
        if let Some(fault) = self.shared.fault.lock().as_ref() {
            return Err(fault.to_error());
        }
        if !self.is_connected() {
            return Err(EngineError::connection("port is not open"));
        }
        Ok(())
    }

    fn write_all(&self, conn: &mut Connection, payload: &[u8]) -> EngineResult<()> {
        let mut offset = 0;
        while offset < payload.len() {
            let written = conn.writer.write_bytes(&payload[offset..]).map_err(|e| {
                let message = format!("serial write failed: {e}");
                self.shared.record_fault(Fault::Link(message.clone()));
                EngineError::connection(message)
            })?;
            if written == 0 {
                return Err(EngineError::connection("serial write made no progress"));
            }
            offset += written;
        }
        conn.writer.flush()?;
        self.shared
            .metrics
            .bytes_sent
            .fetch_add(payload.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn collect_response(
        &self,
        conn: &mut Connection,
        request: &SendRequest,
    ) -> EngineResult<Collected> {
        let cap = self.config.engine.response_buffer_cap;
        let deadline = Instant::now() + request.timeout;
        let mut collected = Collected::for_policy(request.policy);

        'wait: loop {
            if self.shared.shutdown.load(Ordering::SeqCst) {
                return Err(EngineError::connection("link closed during send"));
            }
            if let Some(fault) = self.shared.fault.lock().as_ref() {
                return Err(fault.to_error());
            }

            // Non-blocking sweep first, so a zero timeout still returns
            // whatever has already arrived.
            while let Ok(chunk) = conn.sync_rx.try_recv() {
                if collected.absorb(&chunk.bytes, request, cap) {
                    break 'wait;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = deadline.duration_since(now).min(WAIT_POLL);
            match conn.sync_rx.recv_timeout(wait) {
                Ok(chunk) => {
                    if collected.absorb(&chunk.bytes, request, cap) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(match self.shared.fault.lock().as_ref() {
                        Some(fault) => fault.to_error(),
                        None => EngineError::connection("reader stopped"),
                    });
                }
            }
        }
        Ok(collected)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Accumulated response state for one exchange.
#[derive(Debug)]
struct Collected {
    buffer: Vec<u8>,
    found: Option<bool>,
    matched: Option<String>,
    truncated: bool,
    /// Bytes past the buffer cap, rerouted to the async stream.
    overflow: Vec<u8>,
}

impl Collected {
    fn for_policy(policy: WaitPolicy) -> Self {
        let found = match policy {
            WaitPolicy::Keyword | WaitPolicy::AtCommand => Some(false),
            WaitPolicy::Timeout | WaitPolicy::None => None,
        };
        Self {
            buffer: Vec::new(),
            found,
            matched: None,
            truncated: false,
            overflow: Vec::new(),
        }
    }

    /// Append a chunk and evaluate the stop condition. Returns true when
    /// collection is done. The pattern test runs after every append, so a
    /// match wins even when trailing bytes share its chunk; those trailing
    /// bytes stay in the buffer.
    fn absorb(&mut self, bytes: &[u8], request: &SendRequest, cap: usize) -> bool {
        let room = cap.saturating_sub(self.buffer.len());
        if bytes.len() > room {
            self.buffer.extend_from_slice(&bytes[..room]);
            self.overflow = bytes[room..].to_vec();
            self.truncated = true;
            warn!(cap, "response buffer cap reached, rerouting overflow to async stream");
            return true;
        }
        self.buffer.extend_from_slice(bytes);

        match request.policy {
            WaitPolicy::Keyword => {
                let pattern = request.stop_pattern.as_deref().unwrap_or_default();
                if policy::contains_pattern(&self.buffer, pattern) {
                    self.found = Some(true);
                    self.matched = Some(codec::decode_bytes(pattern).text);
                    return true;
                }
            }
            WaitPolicy::AtCommand => {
                if let Some(term) = policy::match_at_terminator(&self.buffer) {
                    self.found = Some(true);
                    self.matched = Some(term.to_string());
                    return true;
                }
            }
            WaitPolicy::Timeout | WaitPolicy::None => {}
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collected_flags_match_policy() {
        assert_eq!(Collected::for_policy(WaitPolicy::Keyword).found, Some(false));
        assert_eq!(Collected::for_policy(WaitPolicy::AtCommand).found, Some(false));
        assert_eq!(Collected::for_policy(WaitPolicy::Timeout).found, None);
    }

    #[test]
    fn absorb_stops_on_keyword() {
        let request = SendRequest {
            payload: b"AT\r\n".to_vec(),
            policy: WaitPolicy::Keyword,
            stop_pattern: Some(b"OK".to_vec()),
            timeout: Duration::from_secs(1),
        };
        let mut collected = Collected::for_policy(request.policy);
        assert!(!collected.absorb(b"\r\n+CSQ: 22,99\r\n", &request, 4096));
        assert!(collected.absorb(b"\r\nOK\r\n", &request, 4096));
        assert_eq!(collected.found, Some(true));
        assert_eq!(collected.matched.as_deref(), Some("OK"));
        assert_eq!(collected.buffer, b"\r\n+CSQ: 22,99\r\n\r\nOK\r\n");
    }

    #[test]
    fn absorb_finds_pattern_straddling_chunks() {
        let request = SendRequest {
            payload: b"AT\r\n".to_vec(),
            policy: WaitPolicy::Keyword,
            stop_pattern: Some(b"OK".to_vec()),
            timeout: Duration::from_secs(1),
        };
        let mut collected = Collected::for_policy(request.policy);
        assert!(!collected.absorb(b"...O", &request, 4096));
        assert!(collected.absorb(b"K\r\n", &request, 4096));
        assert_eq!(collected.found, Some(true));
    }

    #[test]
    fn absorb_keeps_trailing_bytes_after_match() {
        let request = SendRequest {
            payload: b"AT\r\n".to_vec(),
            policy: WaitPolicy::Keyword,
            stop_pattern: Some(b"OK".to_vec()),
            timeout: Duration::from_secs(1),
        };
        let mut collected = Collected::for_policy(request.policy);
        assert!(collected.absorb(b"OK\r\n+EXTRA", &request, 4096));
        assert_eq!(collected.buffer, b"OK\r\n+EXTRA");
    }

    #[test]
    fn absorb_truncates_at_cap() {
        let request = SendRequest {
            payload: b"AT\r\n".to_vec(),
            policy: WaitPolicy::Timeout,
            stop_pattern: None,
            timeout: Duration::from_secs(1),
        };
        let mut collected = Collected::for_policy(request.policy);
        assert!(collected.absorb(&[0u8; 10], &request, 8));
        assert!(collected.truncated);
        assert_eq!(collected.buffer.len(), 8);
        assert_eq!(collected.overflow.len(), 2);
    }

    #[test]
    fn absorb_records_at_terminator() {
        let request = SendRequest {
            payload: b"ATE0\r\n".to_vec(),
            policy: WaitPolicy::AtCommand,
            stop_pattern: None,
            timeout: Duration::from_secs(1),
        };
        let mut collected = Collected::for_policy(request.policy);
        assert!(!collected.absorb(b"ATE0\r\n", &request, 4096));
        assert!(collected.absorb(b"OK\r\n", &request, 4096));
        assert_eq!(collected.matched.as_deref(), Some("OK\r\n"));
    }
}
