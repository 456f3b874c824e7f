//! Stream-level guarantees: no byte loss, per-stream ordering, and fault
//! propagation.

use serial_bridge::config::Config;
use serial_bridge::engine::{Engine, LinkParams, SendRequest, WaitPolicy};
use serial_bridge::port::MockPort;
use std::thread;
use std::time::Duration;

fn attached_engine(configure: impl FnOnce(&mut Config)) -> (Engine, MockPort) {
    let mut config = Config::default();
    configure(&mut config);
    let engine = Engine::new(config);
    let port = MockPort::new("MOCK0");
    engine
        .attach(
            Box::new(port.clone()),
            LinkParams {
                port: "MOCK0".to_string(),
                baudrate: 115_200,
            },
        )
        .expect("attach mock link");
    (engine, port)
}

#[test]
fn async_packets_preserve_arrival_order() {
    let (engine, port) = attached_engine(|c| c.engine.idle_threshold_ms = 60);

    port.feed(b"first message\r\n");
    thread::sleep(Duration::from_millis(150));
    port.feed(b"second message\r\n");
    thread::sleep(Duration::from_millis(150));

    let (packets, dropped) = engine.drain_async();
    assert_eq!(dropped, 0);
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].text, "first message\r\n");
    assert_eq!(packets[1].text, "second message\r\n");
    assert!(packets[0].received_at <= packets[1].received_at);
}

#[test]
fn every_device_byte_reaches_exactly_one_stream() {
    let (engine, port) = attached_engine(|c| c.engine.idle_threshold_ms = 60);

    // Idle traffic, closed by the idle timer.
    port.feed(b"URC-ONE\r\n");
    thread::sleep(Duration::from_millis(150));

    // Sync traffic, consumed by a timeout-policy exchange.
    let feeder = {
        let port = port.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            port.feed(b"RESPONSE\r\n");
        })
    };
    let outcome = engine
        .send(SendRequest {
            payload: b"CMD\r\n".to_vec(),
            policy: WaitPolicy::Timeout,
            stop_pattern: None,
            timeout: Duration::from_millis(300),
        })
        .unwrap();
    feeder.join().unwrap();

    // More idle traffic after the exchange.
    port.feed(b"URC-TWO\r\n");
    thread::sleep(Duration::from_millis(150));

    assert_eq!(outcome.raw, b"RESPONSE\r\n");
    let (packets, dropped) = engine.drain_async();
    assert_eq!(dropped, 0);
    let async_bytes: Vec<u8> = packets.iter().flat_map(|p| p.raw.clone()).collect();
    assert_eq!(async_bytes, b"URC-ONE\r\nURC-TWO\r\n".to_vec());
    assert_eq!(port.unread(), 0, "reader left bytes on the wire");
}

#[test]
fn idle_bytes_present_at_send_never_enter_the_response() {
    let (engine, port) = attached_engine(|c| c.engine.idle_threshold_ms = 500);

    port.feed(b"PARTIAL-URC");
    thread::sleep(Duration::from_millis(60));

    let feeder = {
        let port = port.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            port.feed(b"RESPONSE\r\n");
        })
    };
    let outcome = engine
        .send(SendRequest {
            payload: b"CMD\r\n".to_vec(),
            policy: WaitPolicy::Timeout,
            stop_pattern: None,
            timeout: Duration::from_millis(250),
        })
        .unwrap();
    feeder.join().unwrap();

    assert_eq!(outcome.raw, b"RESPONSE\r\n");
    let (packets, _) = engine.drain_async();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].raw, b"PARTIAL-URC");
}

#[test]
fn store_overflow_drops_oldest_and_reports_count() {
    let (engine, port) = attached_engine(|c| {
        c.engine.idle_threshold_ms = 60;
        c.engine.async_store_cap = 2;
    });

    for message in [b"one\r\n".as_slice(), b"two\r\n", b"three\r\n"] {
        port.feed(message);
        thread::sleep(Duration::from_millis(150));
    }

    let (packets, dropped) = engine.drain_async();
    assert_eq!(dropped, 1);
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].text, "two\r\n");
    assert_eq!(packets[1].text, "three\r\n");
}

#[test]
fn residual_idle_bytes_flush_on_disconnect() {
    let (engine, port) = attached_engine(|c| c.engine.idle_threshold_ms = 5000);

    port.feed(b"half a mess");
    thread::sleep(Duration::from_millis(60));
    engine.disconnect();

    let (packets, _) = engine.drain_async();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].raw, b"half a mess");
}

#[test]
fn reader_fault_transitions_engine_to_closed() {
    let (engine, port) = attached_engine(|_| {});

    port.break_reads();
    thread::sleep(Duration::from_millis(100));

    let err = engine
        .send(SendRequest {
            payload: b"AT\r\n".to_vec(),
            policy: WaitPolicy::Timeout,
            stop_pattern: None,
            timeout: Duration::from_millis(100),
        })
        .unwrap_err();
    assert_eq!(err.code(), "CONNECTION_ERROR");

    let status = engine.status();
    assert!(!status.connected);
    assert_eq!(status.reader_faults, 1);
    assert!(status.fault.is_some());
}

#[test]
fn status_reports_counters_and_link_identity() {
    let (engine, port) = attached_engine(|c| c.engine.idle_threshold_ms = 60);

    let status = engine.status();
    assert!(status.connected);
    assert_eq!(status.port.as_deref(), Some("MOCK0"));
    assert_eq!(status.baudrate, Some(115_200));
    assert!(!status.sync_mode);

    engine
        .send(SendRequest {
            payload: b"AT\r\n".to_vec(),
            policy: WaitPolicy::None,
            stop_pattern: None,
            timeout: Duration::ZERO,
        })
        .unwrap();
    port.feed(b"noise\r\n");
    thread::sleep(Duration::from_millis(150));

    let status = engine.status();
    assert_eq!(status.bytes_sent, 4);
    assert_eq!(status.bytes_received, 7);
    assert_eq!(status.packets_published, 1);
    assert_eq!(status.pending_async_count, 1);
}
