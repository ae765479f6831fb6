//! Tests for the run_sim harness

use std::cell::Cell;
use std::rc::Rc;

use rand::Rng;

use prometheus_des::config::SimConfig;
use prometheus_des::runtime::{run_sim, run_sim_with};

#[test]
fn test_run_sim_starts_at_zero_and_drains() {
    let started_at = Rc::new(Cell::new(f64::NAN));
    let seen = Rc::clone(&started_at);
    let report = run_sim(move |sched| async move {
        seen.set(sched.now());
        sched.sleep(30.0).await?;
        anyhow::Ok(())
    })
    .unwrap();

    assert!(started_at.get().abs() < f64::EPSILON);
    assert!((report.final_time - 30.0).abs() < f64::EPSILON);
    assert_eq!(report.seed, 0);
    assert_eq!(report.unfinished_tasks, 0);
}

#[test]
fn test_each_run_gets_a_fresh_clock() {
    for _ in 0..2 {
        let report = run_sim(|sched| async move {
            assert!(sched.now().abs() < f64::EPSILON);
            sched.sleep(5.0).await?;
            anyhow::Ok(())
        })
        .unwrap();
        assert!((report.final_time - 5.0).abs() < f64::EPSILON);
    }
}

#[test]
fn test_default_seed_is_zero() {
    let draw = |config: SimConfig| {
        let value = Rc::new(Cell::new(0_u64));
        let out = Rc::clone(&value);
        run_sim_with(
            config,
            move |sched| async move {
                out.set(sched.with_rng(|rng| rng.random::<u64>()));
                anyhow::Ok(())
            },
            |_| Ok(()),
        )
        .unwrap();
        value.get()
    };

    assert_eq!(draw(SimConfig::default()), draw(SimConfig::default().with_seed(0)));
    assert_ne!(draw(SimConfig::default()), draw(SimConfig::default().with_seed(1)));
}

#[test]
fn test_post_processing_sees_report() {
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let report = run_sim_with(
        SimConfig::default(),
        |sched| async move {
            sched.sleep(1.0).await?;
            anyhow::Ok(())
        },
        move |report| {
            counter.set(counter.get() + 1);
            anyhow::ensure!(report.succeeded(), "entry failed");
            Ok(())
        },
    )
    .unwrap();
    assert_eq!(calls.get(), 1);
    assert!(report.succeeded());
}
