use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::bail;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pentago_mid::{PoolError, PoolKind, Scheduler, ThreadTime, TimeKind};

#[test]
fn runs_every_job() {
    let scheduler = Scheduler::new(4, 0).unwrap();
    assert_eq!(scheduler.threads(PoolKind::Cpu), 4);
    assert_eq!(scheduler.threads(PoolKind::Io), 0);
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..100 {
        let counter = Arc::clone(&counter);
        scheduler
            .schedule(
                PoolKind::Cpu,
                move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                },
                false,
            )
            .unwrap();
    }
    scheduler.wait(PoolKind::Cpu).unwrap();
    assert_eq!(counter.load(Ordering::Relaxed), 100);
    // waiting on an idle pool returns at once
    scheduler.wait_all().unwrap();
}

#[test]
fn locked_counter_under_random_interleavings() {
    let mut rng = StdRng::seed_from_u64(77);
    for _ in 0..10 {
        let threads = rng.random_range(1..=6);
        let jobs = rng.random_range(1..200);
        let scheduler = Scheduler::new(threads, 0).unwrap();
        let counter = Arc::new(Mutex::new(0usize));
        for _ in 0..jobs {
            let counter = Arc::clone(&counter);
            let spin = rng.random_range(0..50u64);
            let soon = rng.random_bool(0.3);
            scheduler
                .schedule(
                    PoolKind::Cpu,
                    move || {
                        let mut count = counter.lock().unwrap();
                        let seen = *count;
                        thread::sleep(Duration::from_micros(spin));
                        *count = seen + 1;
                        Ok(())
                    },
                    soon,
                )
                .unwrap();
        }
        scheduler.wait_all().unwrap();
        assert_eq!(*counter.lock().unwrap(), jobs);
    }
}

#[test]
fn soon_jobs_jump_the_queue() {
    let scheduler = Scheduler::new(1, 0).unwrap();
    let (release, blocked) = mpsc::channel::<()>();
    let order = Arc::new(Mutex::new(Vec::new()));
    scheduler
        .schedule(
            PoolKind::Cpu,
            move || {
                blocked.recv()?;
                Ok(())
            },
            false,
        )
        .unwrap();
    for (name, soon) in [("late", false), ("soon", true)] {
        let order = Arc::clone(&order);
        scheduler
            .schedule(
                PoolKind::Cpu,
                move || {
                    order.lock().unwrap().push(name);
                    Ok(())
                },
                soon,
            )
            .unwrap();
    }
    release.send(()).unwrap();
    scheduler.wait_all().unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["soon", "late"]);
}

#[test]
fn cpu_jobs_feed_the_io_pool() {
    let scheduler = Scheduler::new(2, 2).unwrap();
    let spawner = scheduler.spawner();
    let written = Arc::new(AtomicUsize::new(0));
    for i in 0..20 {
        let spawner = spawner.clone();
        let written = Arc::clone(&written);
        scheduler
            .schedule(
                PoolKind::Cpu,
                move || {
                    thread::sleep(Duration::from_millis(1));
                    spawner.schedule(
                        PoolKind::Io,
                        move || {
                            written.fetch_add(i, Ordering::Relaxed);
                            Ok(())
                        },
                        false,
                    )?;
                    Ok(())
                },
                false,
            )
            .unwrap();
    }
    scheduler.wait_all().unwrap();
    assert_eq!(written.load(Ordering::Relaxed), (0..20).sum::<usize>());
}

#[test]
fn failing_job_stops_the_pool() {
    let scheduler = Scheduler::new(2, 0).unwrap();
    scheduler
        .schedule(PoolKind::Cpu, || bail!("boom"), false)
        .unwrap();
    let err = scheduler.wait_all().unwrap_err();
    assert_eq!(
        err,
        PoolError::Job { pool: PoolKind::Cpu, message: "boom".to_string() }
    );
    // the failure sticks
    assert_eq!(scheduler.schedule(PoolKind::Cpu, || Ok(()), false), Err(err.clone()));
    assert_eq!(scheduler.wait(PoolKind::Cpu), Err(err));
}

#[test]
fn jobs_behind_a_failure_never_run() {
    let scheduler = Scheduler::new(1, 0).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    scheduler
        .schedule(PoolKind::Cpu, || bail!("first"), false)
        .unwrap();
    for _ in 0..5 {
        let ran = Arc::clone(&ran);
        // may already be refused if the failure landed first
        let _ = scheduler.schedule(
            PoolKind::Cpu,
            move || {
                ran.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
            false,
        );
    }
    assert!(matches!(scheduler.wait_all(), Err(PoolError::Job { .. })));
    assert_eq!(ran.load(Ordering::Relaxed), 0);
}

#[test]
fn panicking_job_is_reported() {
    let scheduler = Scheduler::new(1, 1).unwrap();
    scheduler
        .schedule(PoolKind::Io, || panic!("kaboom"), false)
        .unwrap();
    match scheduler.wait_all() {
        Err(PoolError::Job { pool, message }) => {
            assert_eq!(pool, PoolKind::Io);
            assert!(message.contains("kaboom"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn missing_io_pool() {
    let scheduler = Scheduler::new(1, 0).unwrap();
    assert_eq!(
        scheduler.schedule(PoolKind::Io, || Ok(()), false),
        Err(PoolError::NoPool(PoolKind::Io))
    );
    assert_eq!(
        scheduler.spawner().schedule(PoolKind::Io, || Ok(()), false),
        Err(PoolError::NoPool(PoolKind::Io))
    );
}

#[test]
fn only_the_master_waits() {
    let scheduler = Scheduler::new(1, 0).unwrap();
    let from_other = thread::scope(|s| s.spawn(|| scheduler.wait_all()).join().unwrap());
    assert_eq!(from_other, Err(PoolError::NotMaster));
    scheduler.wait_all().unwrap();
}

#[test]
fn time_is_charged_per_kind() {
    let scheduler = Scheduler::new(2, 0).unwrap();
    for _ in 0..4 {
        scheduler
            .schedule(
                PoolKind::Cpu,
                || {
                    let _time = ThreadTime::new(TimeKind::Midsolve);
                    thread::sleep(Duration::from_millis(20));
                    Ok(())
                },
                false,
            )
            .unwrap();
    }
    let first = scheduler.clear_thread_times().unwrap();
    assert!(first.get(TimeKind::Midsolve) >= 0.079, "{first}");
    assert!(first.get(TimeKind::MasterIdle) > 0.0);

    let second = scheduler.clear_thread_times().unwrap();
    assert!(second.get(TimeKind::Midsolve) < 0.01, "{second}");

    let total = scheduler.total_thread_times().unwrap();
    assert!(total.get(TimeKind::Midsolve) >= first.get(TimeKind::Midsolve));
}
