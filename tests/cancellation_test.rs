//! Comprehensive tests for job cancellation

use parking_lot::Mutex;
use rust_job_engine::prelude::*;
use rust_job_engine::CancellationReason;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn started_scheduler(num_workers: usize, main_loop: &MainLoop) -> Scheduler {
    let _ = env_logger::builder().is_test(true).try_init();
    let scheduler = Scheduler::with_config(SchedulerConfig::new(num_workers), main_loop.handle())
        .expect("Failed to create scheduler");
    scheduler.start().expect("Failed to start scheduler");
    scheduler
}

/// Submit a job that runs until cancelled, and wait until it is Running
fn submit_spinner(scheduler: &Scheduler, kind: JobKind, cancel_calls: &Arc<AtomicUsize>) -> Job {
    let (started_tx, started_rx) = mpsc::channel();
    let started_tx = Mutex::new(started_tx);
    let job = scheduler
        .submit(
            kind,
            ClosureTask::new(Arc::clone(cancel_calls))
                .with_run(move |_, ctx| {
                    started_tx.lock().send(()).ok();
                    while !ctx.token().sleep(Duration::from_millis(10)) {}
                    ctx.check_cancelled()
                })
                .with_cancel(|calls| {
                    calls.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .expect("Failed to submit spinner");
    started_rx.recv_timeout(WAIT).expect("spinner never started");
    job
}

#[test]
fn test_cancel_queued_job() {
    let main_loop = MainLoop::new();
    let scheduler = started_scheduler(1, &main_loop);
    let blocker_cancels = Arc::new(AtomicUsize::new(0));
    let blocker = submit_spinner(&scheduler, JobKind::Load, &blocker_cancels);

    let executed = Arc::new(AtomicBool::new(false));
    let cancel_calls = Arc::new(AtomicUsize::new(0));
    let queued = scheduler
        .submit(
            JobKind::Thumbnail,
            ClosureTask::new((Arc::clone(&executed), Arc::clone(&cancel_calls)))
                .with_run(|(executed, _), _| {
                    executed.store(true, Ordering::SeqCst);
                    Ok(())
                })
                .with_cancel(|(_, calls)| {
                    calls.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .expect("Failed to submit queued job");

    assert_eq!(scheduler.cancel(&queued), JobStatus::Canceled);
    assert!(scheduler.location(queued.id()).is_none());

    scheduler.cancel(&blocker);
    assert!(main_loop.run_until(|| scheduler.running_count() == 0, WAIT));

    assert!(!executed.load(Ordering::SeqCst));
    // nothing was running, so the cancel operation is not needed
    assert_eq!(cancel_calls.load(Ordering::SeqCst), 0);
    assert_eq!(blocker_cancels.load(Ordering::SeqCst), 1);

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_cancel_running_job() {
    let main_loop = MainLoop::new();
    let scheduler = started_scheduler(2, &main_loop);
    let cancel_calls = Arc::new(AtomicUsize::new(0));

    let job = submit_spinner(&scheduler, JobKind::DirectoryScan, &cancel_calls);
    assert_eq!(job.status(), JobStatus::Running);

    assert_eq!(scheduler.request_cancel(job.id()), Some(JobStatus::Canceled));
    // request_cancel does not wait for the run
    assert!(main_loop.run_until(|| scheduler.location(job.id()).is_none(), WAIT));

    assert_eq!(job.status(), JobStatus::Canceled);
    assert_eq!(cancel_calls.load(Ordering::SeqCst), 1);

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_cancellation_idempotent() {
    let main_loop = MainLoop::new();
    let scheduler = started_scheduler(1, &main_loop);
    let cancel_calls = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));

    let (started_tx, started_rx) = mpsc::channel();
    let started_tx = Mutex::new(started_tx);
    let job = scheduler
        .submit(
            JobKind::Load,
            ClosureTask::new((Arc::clone(&cancel_calls), Arc::clone(&finished)))
                .with_run(move |_, ctx| {
                    started_tx.lock().send(()).ok();
                    while !ctx.token().sleep(Duration::from_millis(10)) {}
                    ctx.check_cancelled()
                })
                .with_cancel(|(calls, _)| {
                    calls.fetch_add(1, Ordering::SeqCst);
                })
                .with_finished(|(_, finished), _, _| {
                    finished.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .expect("Failed to submit job");
    started_rx.recv_timeout(WAIT).expect("job never started");

    for _ in 0..5 {
        assert_eq!(scheduler.cancel(&job), JobStatus::Canceled);
    }
    assert!(main_loop.run_until(|| finished.load(Ordering::SeqCst) == 1, WAIT));

    // cancelling a terminal job changes nothing and dispatches nothing
    assert_eq!(scheduler.cancel(&job), JobStatus::Canceled);
    main_loop.dispatch_pending();

    assert_eq!(cancel_calls.load(Ordering::SeqCst), 1);
    assert_eq!(finished.load(Ordering::SeqCst), 1);

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_cancel_finished_job_is_noop() {
    let main_loop = MainLoop::new();
    let scheduler = started_scheduler(1, &main_loop);

    let job = scheduler
        .execute(JobKind::Save, (), |_, _| Ok(()))
        .expect("Failed to submit job");
    assert!(main_loop.run_until(|| scheduler.location(job.id()).is_none(), WAIT));

    assert_eq!(scheduler.request_cancel(job.id()), None);
    assert_eq!(scheduler.cancel(&job), JobStatus::Finished);
    assert!(job.succeeded());

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_token_reason_reflects_source() {
    let main_loop = MainLoop::new();
    let scheduler = started_scheduler(1, &main_loop);
    let reasons = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..2 {
        let (started_tx, started_rx) = mpsc::channel();
        let started_tx = Mutex::new(started_tx);
        let job = scheduler
            .execute(JobKind::Transform, Arc::clone(&reasons), move |reasons, ctx| {
                started_tx.lock().send(()).ok();
                while !ctx.token().sleep(Duration::from_millis(10)) {}
                reasons.lock().push(ctx.token().reason());
                ctx.check_cancelled()
            })
            .expect("Failed to submit job");
        started_rx.recv_timeout(WAIT).expect("job never started");

        if reasons.lock().is_empty() {
            scheduler.cancel(&job);
            assert!(main_loop.run_until(|| reasons.lock().len() == 1, WAIT));
        } else {
            scheduler.shutdown().expect("Failed to shutdown scheduler");
        }
    }

    assert_eq!(
        *reasons.lock(),
        vec![
            Some(CancellationReason::Requested),
            Some(CancellationReason::Shutdown)
        ]
    );
}

#[test]
fn test_job_ignoring_cancel_keeps_canceled_status() {
    let main_loop = MainLoop::new();
    let scheduler = started_scheduler(1, &main_loop);
    let (started_tx, started_rx) = mpsc::channel();
    let started_tx = Mutex::new(started_tx);
    let delivered = Arc::new(Mutex::new(None));

    let slot = Arc::clone(&delivered);
    let job = scheduler
        .submit(
            JobKind::Load,
            ClosureTask::new(())
                .with_run(move |_, _| {
                    started_tx.lock().send(()).ok();
                    // never polls the token
                    thread::sleep(Duration::from_millis(100));
                    Ok(())
                })
                .with_finished(move |_, job, err| {
                    *slot.lock() = Some((job.status(), err.is_some()));
                }),
        )
        .expect("Failed to submit job");
    started_rx.recv_timeout(WAIT).expect("job never started");

    assert_eq!(scheduler.cancel(&job), JobStatus::Canceled);
    assert!(main_loop.run_until(|| delivered.lock().is_some(), WAIT));

    // completion raced the cancel; cancel wins and no error is reported
    assert_eq!(*delivered.lock(), Some((JobStatus::Canceled, false)));
    assert!(!job.succeeded());

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_cancel_with_long_work() {
    let main_loop = MainLoop::new();
    let scheduler = started_scheduler(4, &main_loop);
    let cancel_calls = Arc::new(AtomicUsize::new(0));

    let jobs: Vec<Job> = (0..4)
        .map(|_| submit_spinner(&scheduler, JobKind::Thumbnail, &cancel_calls))
        .collect();
    assert_eq!(scheduler.running_count(), 4);

    let start = std::time::Instant::now();
    for job in &jobs {
        scheduler.cancel(job);
    }
    assert!(main_loop.run_until(|| scheduler.running_count() == 0, WAIT));

    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(jobs.iter().all(|j| j.status() == JobStatus::Canceled));
    assert_eq!(cancel_calls.load(Ordering::SeqCst), 4);

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_finished_notification_waits_for_run_to_return() {
    let main_loop = MainLoop::new();
    let scheduler = started_scheduler(1, &main_loop);
    let (started_tx, started_rx) = mpsc::channel();
    let started_tx = Mutex::new(started_tx);
    let run_returned = Arc::new(AtomicBool::new(false));
    let finished_after_run = Arc::new(Mutex::new(None));

    let slot = Arc::clone(&finished_after_run);
    let job = scheduler
        .submit(
            JobKind::Load,
            ClosureTask::new(Arc::clone(&run_returned))
                .with_run(move |returned, ctx| {
                    started_tx.lock().send(()).ok();
                    while !ctx.token().sleep(Duration::from_millis(5)) {}
                    // keep running for a while after the cancel request
                    thread::sleep(Duration::from_millis(100));
                    returned.store(true, Ordering::SeqCst);
                    Ok(())
                })
                .with_finished(move |returned, _, _| {
                    *slot.lock() = Some(returned.load(Ordering::SeqCst));
                }),
        )
        .expect("Failed to submit job");
    started_rx.recv_timeout(WAIT).expect("job never started");

    // the status is final immediately, the run is not
    assert_eq!(scheduler.cancel(&job), JobStatus::Canceled);
    assert!(job.status().is_terminal());
    assert!(!run_returned.load(Ordering::SeqCst));

    assert!(main_loop.run_until(|| finished_after_run.lock().is_some(), WAIT));
    assert_eq!(*finished_after_run.lock(), Some(true));

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}
