//! Tests for time formatting and the virtual-time log subscriber

use std::io;
use std::sync::{Arc, Mutex};

use prometheus_des::core::Scheduler;
use prometheus_des::util::{format_hms, parse_filter, virtual_time_subscriber_with_writer};

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_format_hms_examples() {
    assert_eq!(format_hms(0.0), "00:00:00.000");
    assert_eq!(format_hms(59.999), "00:00:59.999");
    assert_eq!(format_hms(90.0), "00:01:30.000");
    assert_eq!(format_hms(36_000.5), "10:00:00.500");
}

#[test]
fn test_parse_filter() {
    assert!(parse_filter("debug").is_ok());
    assert!(parse_filter("prometheus_des=trace,warn").is_ok());
    assert!(parse_filter("prometheus_des=loud").is_err());
}

#[test]
fn test_log_lines_carry_virtual_time() {
    let sched = Scheduler::new();
    let capture = Capture::default();
    let sink = capture.clone();
    let subscriber =
        virtual_time_subscriber_with_writer(sched.clock(), "info", move || sink.clone()).unwrap();

    tracing::subscriber::with_default(subscriber, || {
        sched
            .schedule_at(3_661.25, || {
                tracing::info!("door opened");
                Ok(())
            })
            .unwrap();
        sched.run().unwrap();
    });

    let output = capture.contents();
    let line = output
        .lines()
        .find(|l| l.contains("door opened"))
        .expect("log line captured");
    assert!(line.starts_with("01:01:01.250"), "unexpected line: {line}");
}
