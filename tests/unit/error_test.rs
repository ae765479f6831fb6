//! Tests for the error taxonomy

use prometheus_des::core::{EventId, SchedulerError, TaskId};

#[test]
fn test_past_scheduling_display() {
    let err = SchedulerError::PastScheduling {
        requested: 2.0,
        current: 7.5,
    };
    assert_eq!(err.to_string(), "cannot schedule at 2s: current time is 7.5s");
}

#[test]
fn test_uncaught_failure_display_names_event() {
    let err = SchedulerError::UncaughtCallbackFailure {
        event: EventId::new(4),
        time: 12.0,
        message: "queue overflow".into(),
    };
    let msg = err.to_string();
    assert!(msg.contains("E#4"));
    assert!(msg.contains("queue overflow"));
}

#[test]
fn test_task_errors_name_the_task() {
    let id = TaskId::new(11);
    assert_eq!(
        SchedulerError::UnsupportedSuspension(id).to_string(),
        "task T11 suspended on something that is not a virtual-time event"
    );
    assert_eq!(SchedulerError::SelfAwait(id).to_string(), "task T11 cannot await itself");
}

#[test]
fn test_fatality() {
    assert!(SchedulerError::MonotonicityViolation {
        current: 1.0,
        requested: 0.5
    }
    .is_fatal());
    assert!(!SchedulerError::TaskAlreadyFinished(TaskId::new(0)).is_fatal());
    assert!(!SchedulerError::AlreadyRunning.is_fatal());
}

#[test]
fn test_anyhow_downcast_recovers_variant() {
    let err: anyhow::Error = SchedulerError::Timeout(3.0).into();
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::Timeout(d)) if (*d - 3.0).abs() < f64::EPSILON
    ));
}
