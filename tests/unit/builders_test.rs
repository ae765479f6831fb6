//! Tests for the simulation builder

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use prometheus_des::builders::SimBuilder;
use prometheus_des::config::SimConfig;
use prometheus_des::core::{SchedulerError, TaskState};

#[test]
fn test_build_applies_config() {
    let builder = SimBuilder::new().config(SimConfig::default().with_trace_capacity(8));
    let sched = builder.build().unwrap();
    sched.schedule_now(|| Ok(())).unwrap();
    sched.run().unwrap();
    assert_eq!(sched.trace().len(), 1);
    assert!(sched.now().abs() < f64::EPSILON);
}

#[test]
fn test_invalid_config_fails_before_running() {
    let ran = Rc::new(Cell::new(false));
    let flag = Rc::clone(&ran);
    let result = SimBuilder::new()
        .config(SimConfig::default().with_log_filter(""))
        .run(move |_sched| {
            flag.set(true);
            async { anyhow::Ok(()) }
        });
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    assert!(!ran.get());
}

#[test]
fn test_report_for_failed_entry() {
    let report = SimBuilder::new()
        .run(|sched| async move {
            sched.sleep(2.0).await?;
            Err::<(), _>(anyhow::anyhow!("reactor scrammed"))
        })
        .unwrap();
    assert!(!report.succeeded());
    assert_eq!(report.entry_state, TaskState::Failed);
    assert!(report
        .entry_failure
        .as_deref()
        .is_some_and(|f| f.contains("reactor scrammed")));
    assert_eq!(report.stats.callback_failures, 1);
}

#[test]
fn test_post_processing_runs_once_after_quiescence() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let report = SimBuilder::new()
        .post_processing(move |report| {
            sink.borrow_mut().push(report.final_time);
            Ok(())
        })
        .run(|sched| async move {
            sched.sleep(12.0).await?;
            anyhow::Ok(())
        })
        .unwrap();
    assert_eq!(*seen.borrow(), vec![12.0]);
    assert!(report.succeeded());
}

#[test]
fn test_failing_post_processing_does_not_fail_run() {
    let report = SimBuilder::new()
        .post_processing(|_| anyhow::bail!("plotting backend missing"))
        .run(|_sched| async { anyhow::Ok(()) })
        .unwrap();
    assert!(report.succeeded());
}

#[test]
fn test_child_failure_propagates_to_entry() {
    let report = SimBuilder::new()
        .run(|sched| async move {
            let s = sched.clone();
            let never = sched.spawn(async move {
                futures::future::pending::<()>().await;
                anyhow::Ok(())
            });
            s.sleep(1.0).await?;
            never.await?;
            anyhow::Ok(())
        })
        .unwrap();
    assert_eq!(report.entry_state, TaskState::Failed);
    assert!(report
        .entry_failure
        .as_deref()
        .is_some_and(|f| f.contains("not a virtual-time event")));
}
