//! Integration tests for the acquisition lifecycle.
//!
//! These run the real acquisition thread against a scripted
//! [`MockTransport`], so no hardware is needed.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use co2mon_core::types::KEY;
use co2mon_core::{
    Co2Monitor, Error, FrameErrorPolicy, MockResponse, MockTransport, PollOptions, send_key,
};

const WAIT: Duration = Duration::from_secs(5);

fn fast_options() -> PollOptions {
    PollOptions::builder()
        .read_timeout(Duration::from_millis(1))
        .build()
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

#[test]
fn test_store_is_empty_before_first_reading() {
    let mut monitor = Co2Monitor::new(MockTransport::new());
    assert!(monitor.co2().is_none());
    assert!(monitor.temperature().is_none());

    monitor.start_monitoring(Duration::from_secs(60)).unwrap();
    assert!(monitor.is_monitoring());
    // An empty script only yields timeouts, so nothing is ever published.
    assert!(monitor.co2().is_none());
    assert!(monitor.temperature().is_none());
    monitor.stop_monitoring();
    assert!(!monitor.is_monitoring());
}

#[test]
fn test_start_returns_before_first_reading() {
    let transport = MockTransport::builder()
        .read_latency(Duration::from_millis(200))
        .response(MockResponse::co2(900))
        .build();
    let mut monitor = Co2Monitor::new(transport);

    let started = Instant::now();
    monitor.start_monitoring(Duration::from_secs(60)).unwrap();
    assert!(started.elapsed() < Duration::from_millis(200));
    monitor.stop_monitoring();
}

#[test]
fn test_readers_never_see_time_go_backwards() {
    let transport = MockTransport::builder()
        .responses((400..420).map(MockResponse::co2))
        .response(MockResponse::temperature(21.5))
        .repeat(true)
        .build();
    let mut monitor = Co2Monitor::with_options(transport, fast_options()).unwrap();
    monitor.start_monitoring(Duration::from_millis(1)).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = monitor.store();
            thread::spawn(move || {
                let mut last = None;
                let mut seen = 0;
                let deadline = Instant::now() + Duration::from_millis(200);
                while Instant::now() < deadline {
                    if let Some(reading) = store.co2() {
                        assert!((400..420).contains(&reading.value));
                        if let Some(previous) = last {
                            assert!(reading.captured_at >= previous);
                        }
                        last = Some(reading.captured_at);
                        seen += 1;
                    }
                }
                seen
            })
        })
        .collect();

    let seen: usize = readers.into_iter().map(|r| r.join().unwrap()).sum();
    monitor.stop_monitoring();
    assert!(seen > 0);
}

#[test]
fn test_double_start_runs_a_single_loop() {
    let transport = MockTransport::builder()
        .read_latency(Duration::from_millis(5))
        .repeat(true)
        .response(MockResponse::Timeout)
        .build();
    let probe = transport.probe();
    let mut monitor = Co2Monitor::with_options(transport, fast_options()).unwrap();

    monitor.start_monitoring(Duration::from_millis(1)).unwrap();
    monitor.start_monitoring(Duration::from_millis(1)).unwrap();
    assert_eq!(monitor.handle().unwrap().interval(), Duration::from_millis(1));

    assert!(wait_until(|| probe.reads() >= 10));
    monitor.stop_monitoring();

    assert_eq!(probe.max_concurrent_reads(), 1);
}

#[test]
fn test_stop_interrupts_long_interval() {
    let transport = MockTransport::builder()
        .responses([MockResponse::co2(600), MockResponse::temperature(19.0)])
        .build();
    let mut monitor = Co2Monitor::new(transport);
    let metrics = monitor.metrics();

    monitor.start_monitoring(Duration::from_secs(3600)).unwrap();
    assert!(wait_until(|| metrics.snapshot().cycles >= 1));

    let stopping = Instant::now();
    monitor.stop_monitoring();
    assert!(stopping.elapsed() < Duration::from_secs(2));
    assert!(!monitor.is_monitoring());
}

#[test]
fn test_stop_immediately_after_start() {
    let transport = MockTransport::builder()
        .read_latency(Duration::from_millis(1))
        .repeat(true)
        .response(MockResponse::co2(700))
        .build();
    let mut monitor = Co2Monitor::with_options(transport, fast_options()).unwrap();

    for _ in 0..20 {
        monitor.start_monitoring(Duration::from_millis(1)).unwrap();
        assert!(monitor.is_monitoring());
        monitor.stop_monitoring();
        assert!(!monitor.is_monitoring());
    }
}

#[test]
fn test_restart_after_stop() {
    let transport = MockTransport::builder()
        .responses([MockResponse::co2(500), MockResponse::temperature(20.0)])
        .build();
    let probe = transport.probe();
    let mut monitor = Co2Monitor::new(transport);

    monitor.start_monitoring(Duration::from_secs(3600)).unwrap();
    assert!(wait_until(|| monitor.temperature().is_some()));
    monitor.stop_monitoring();
    assert_eq!(monitor.co2().unwrap().value, 500);

    // Readings survive the stop and are replaced by the next run.
    probe.set_script([MockResponse::co2(1500), MockResponse::temperature(25.0)]);
    monitor.start_monitoring(Duration::from_secs(3600)).unwrap();
    assert!(wait_until(|| {
        monitor
            .temperature()
            .is_some_and(|r| (r.value - 25.0).abs() < 0.0625)
    }));
    monitor.stop_monitoring();

    assert_eq!(monitor.co2().unwrap().value, 1500);
    assert_eq!(monitor.metrics_snapshot().cycles, 2);
}

#[test]
fn test_frame_errors_do_not_stop_monitoring() {
    let transport = MockTransport::builder()
        .responses([
            MockResponse::bad_checksum(0x50, 1200),
            MockResponse::bad_marker(0x42, 4700, 0x00),
            MockResponse::co2(640),
            MockResponse::temperature(22.5),
        ])
        .build();
    let options = PollOptions::builder()
        .read_timeout(Duration::from_millis(1))
        .on_frame_error(FrameErrorPolicy::AbortCycle)
        .build();
    let mut monitor = Co2Monitor::with_options(transport, options).unwrap();
    let metrics = monitor.metrics();

    monitor.start_monitoring(Duration::from_millis(1)).unwrap();
    assert!(wait_until(|| monitor.temperature().is_some()));
    assert!(monitor.is_monitoring());
    monitor.stop_monitoring();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.frame_errors(), 2);
    assert!(snapshot.aborted_cycles >= 2);
    assert_eq!(monitor.co2().unwrap().value, 640);
}

#[test]
fn test_shared_store_outlives_monitor() {
    let transport = MockTransport::builder()
        .responses([MockResponse::temperature(30.0), MockResponse::co2(2000)])
        .build();
    let mut monitor = Co2Monitor::new(transport);
    let store = monitor.store();

    monitor.start_monitoring(Duration::from_secs(60)).unwrap();
    assert!(wait_until(|| store.co2().is_some()));
    monitor.close();

    assert_eq!(Arc::strong_count(&store), 1);
    assert_eq!(store.co2().unwrap().value, 2000);
}

#[test]
fn test_handshake_sends_zero_prefixed_key() {
    let mut transport = MockTransport::new();
    let probe = transport.probe();
    send_key(&mut transport, &KEY).unwrap();

    let report = probe.last_feature_report().unwrap();
    assert_eq!(report.len(), 9);
    assert_eq!(report[0], 0);
    assert_eq!(&report[1..], &KEY);
}

#[test]
fn test_partial_handshake_is_fatal() {
    let mut transport = MockTransport::builder().handshake_ack(4).build();
    let err = send_key(&mut transport, &KEY).unwrap_err();
    assert!(matches!(
        err,
        Error::Handshake {
            sent: 9,
            acknowledged: 4
        }
    ));
    assert!(err.is_open_error());
}
