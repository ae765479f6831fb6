//! Tests for the execution trace

use prometheus_des::core::{EventOutcome, Scheduler, TraceRecord};

#[test]
fn test_trace_records_every_outcome() {
    let sched = Scheduler::new();
    sched.enable_trace(16);
    sched.schedule_at(1.0, || Ok(())).unwrap();
    let doomed = sched.schedule_at(2.0, || Ok(())).unwrap();
    sched
        .schedule_at(3.0, || Err(anyhow::anyhow!("bad input")))
        .unwrap();
    doomed.cancel();
    sched.run().unwrap();

    let outcomes: Vec<(f64, EventOutcome)> =
        sched.trace().iter().map(|r| (r.time, r.outcome)).collect();
    assert_eq!(
        outcomes,
        vec![
            (1.0, EventOutcome::Executed),
            (2.0, EventOutcome::Cancelled),
            (3.0, EventOutcome::Failed),
        ]
    );
}

#[test]
fn test_trace_disabled_by_default() {
    let sched = Scheduler::new();
    sched.schedule_now(|| Ok(())).unwrap();
    sched.run().unwrap();
    assert!(sched.trace().is_empty());
}

#[test]
fn test_trace_json_roundtrips_records() {
    let sched = Scheduler::new();
    sched.enable_trace(4);
    sched.schedule_at(0.5, || Ok(())).unwrap();
    sched.run().unwrap();

    let json = sched.trace_json().unwrap();
    let parsed: Vec<TraceRecord> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, sched.trace());
    assert!(json.contains("\"outcome\":\"executed\""));
    assert!(json.contains("trace_test.rs"));
}
