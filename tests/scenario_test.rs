//! End-to-end scheduling scenarios: ordering, priority, cancellation, shutdown

use parking_lot::Mutex;
use rust_job_engine::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn scheduler(num_workers: usize, main_loop: &MainLoop) -> Scheduler {
    let config = SchedulerConfig::new(num_workers).with_name("scenario");
    let scheduler =
        Scheduler::with_config(config, main_loop.handle()).expect("Failed to create scheduler");
    scheduler.start().expect("Failed to start scheduler");
    scheduler
}

/// Records what happened to each job, in order
#[derive(Default)]
struct Journal {
    runs: Mutex<Vec<&'static str>>,
    finished: Mutex<Vec<(&'static str, JobStatus)>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Journal {
    fn enter(&self, label: &'static str) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.runs.lock().push(label);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A task that blocks until released, so later submissions stay Waiting
struct GateTask {
    label: &'static str,
    journal: Arc<Journal>,
    started: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl JobTask for GateTask {
    fn run(&self, _ctx: &JobContext) -> Result<()> {
        self.journal.enter(self.label);
        self.started.lock().send(()).ok();
        self.release.lock().recv_timeout(WAIT).ok();
        self.journal.leave();
        Ok(())
    }

    fn on_finished(&self, job: &Job, _error: Option<&JobError>) {
        self.journal.finished.lock().push((self.label, job.status()));
    }

    fn name(&self) -> &str {
        "GateTask"
    }
}

fn gate(
    label: &'static str,
    journal: &Arc<Journal>,
) -> (GateTask, mpsc::Receiver<()>, mpsc::Sender<()>) {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let task = GateTask {
        label,
        journal: Arc::clone(journal),
        started: Mutex::new(started_tx),
        release: Mutex::new(release_rx),
    };
    (task, started_rx, release_tx)
}

type QuickTask = ClosureTask<(&'static str, Arc<Journal>)>;

/// A task that records its run and returns at once
fn quick(label: &'static str, journal: &Arc<Journal>) -> QuickTask {
    ClosureTask::new((label, Arc::clone(journal)))
        .with_run(|(label, journal), _| {
            journal.enter(*label);
            thread::sleep(Duration::from_millis(5));
            journal.leave();
            Ok(())
        })
        .with_finished(|(label, journal), job, _| {
            journal.finished.lock().push((*label, job.status()));
        })
}

#[test]
fn test_single_worker_runs_in_submission_order_skipping_cancelled() {
    init_logging();
    let main_loop = MainLoop::new();
    let scheduler = scheduler(1, &main_loop);
    let journal = Arc::new(Journal::default());

    let (first, first_started, release_first) = gate("thumb-1", &journal);
    let job1 = scheduler
        .submit(JobKind::Thumbnail, first)
        .expect("Failed to submit job 1");
    first_started.recv_timeout(WAIT).expect("job 1 never started");

    let job2 = scheduler
        .submit(JobKind::Thumbnail, quick("thumb-2", &journal))
        .expect("Failed to submit job 2");
    let job3 = scheduler
        .submit(JobKind::Thumbnail, quick("thumb-3", &journal))
        .expect("Failed to submit job 3");

    assert_eq!(job2.status(), JobStatus::Waiting);
    assert_eq!(scheduler.request_cancel(job2.id()), Some(JobStatus::Canceled));

    release_first.send(()).expect("Failed to release job 1");
    assert!(main_loop.run_until(|| journal.finished.lock().len() == 3, WAIT));

    assert_eq!(*journal.runs.lock(), vec!["thumb-1", "thumb-3"]);
    assert_eq!(journal.max_active.load(Ordering::SeqCst), 1);
    assert!(job1.succeeded());
    assert!(job3.succeeded());
    assert_eq!(job2.status(), JobStatus::Canceled);
    assert!(job2.info().started_at.is_none());

    let finished = journal.finished.lock().clone();
    assert!(finished.contains(&("thumb-2", JobStatus::Canceled)));

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_load_outranks_earlier_thumbnail() {
    init_logging();
    let main_loop = MainLoop::new();
    let scheduler = scheduler(1, &main_loop);
    let journal = Arc::new(Journal::default());

    let (running, started, release) = gate("thumb-running", &journal);
    scheduler
        .submit(JobKind::Thumbnail, running)
        .expect("Failed to submit running thumbnail");
    started.recv_timeout(WAIT).expect("thumbnail never started");

    scheduler
        .submit(JobKind::Thumbnail, quick("thumb-waiting", &journal))
        .expect("Failed to submit waiting thumbnail");
    scheduler
        .submit(JobKind::Load, quick("load", &journal))
        .expect("Failed to submit load");
    assert_eq!(scheduler.queued_len_for(JobKind::Thumbnail), 1);
    assert_eq!(scheduler.queued_len_for(JobKind::Load), 1);

    release.send(()).expect("Failed to release thumbnail");
    assert!(main_loop.run_until(|| journal.finished.lock().len() == 3, WAIT));

    assert_eq!(
        *journal.runs.lock(),
        vec!["thumb-running", "load", "thumb-waiting"]
    );

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_urgent_submission_jumps_its_partition() {
    init_logging();
    let main_loop = MainLoop::new();
    let scheduler = scheduler(1, &main_loop);
    let journal = Arc::new(Journal::default());

    let (running, started, release) = gate("blocker", &journal);
    scheduler
        .submit(JobKind::Load, running)
        .expect("Failed to submit blocker");
    started.recv_timeout(WAIT).expect("blocker never started");

    scheduler
        .submit(JobKind::Thumbnail, quick("thumb-a", &journal))
        .expect("Failed to submit thumb-a");
    scheduler
        .submit_with_options(
            JobKind::Thumbnail,
            quick("thumb-visible", &journal),
            JobOptions::new().urgent(),
        )
        .expect("Failed to submit urgent thumbnail");
    scheduler
        .submit(JobKind::Transform, quick("rotate", &journal))
        .expect("Failed to submit transform");

    release.send(()).expect("Failed to release blocker");
    assert!(main_loop.run_until(|| journal.finished.lock().len() == 4, WAIT));

    // urgency reorders within Thumbnail but never beats a higher kind
    assert_eq!(
        *journal.runs.lock(),
        vec!["blocker", "rotate", "thumb-visible", "thumb-a"]
    );

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_running_job_cancelled_within_few_iterations() {
    init_logging();
    let main_loop = MainLoop::new();
    let scheduler = scheduler(2, &main_loop);

    struct PollingTask {
        iterations: AtomicUsize,
        cancel_calls: AtomicUsize,
        started: Mutex<mpsc::Sender<()>>,
    }

    impl JobTask for PollingTask {
        fn run(&self, ctx: &JobContext) -> Result<()> {
            self.started.lock().send(()).ok();
            for _ in 0..1000 {
                if ctx.is_cancelled() {
                    return ctx.check_cancelled();
                }
                self.iterations.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
            }
            Ok(())
        }

        fn cancel(&self) {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    let (started_tx, started_rx) = mpsc::channel();
    let task = Arc::new(PollingTask {
        iterations: AtomicUsize::new(0),
        cancel_calls: AtomicUsize::new(0),
        started: Mutex::new(started_tx),
    });

    struct SharedPoller(Arc<PollingTask>);
    impl JobTask for SharedPoller {
        fn run(&self, ctx: &JobContext) -> Result<()> {
            self.0.run(ctx)
        }
        fn cancel(&self) {
            self.0.cancel()
        }
    }

    let job = scheduler
        .submit(JobKind::Load, SharedPoller(Arc::clone(&task)))
        .expect("Failed to submit polling job");
    started_rx.recv_timeout(WAIT).expect("polling job never started");

    let at_cancel = task.iterations.load(Ordering::SeqCst);
    assert_eq!(scheduler.request_cancel(job.id()), Some(JobStatus::Canceled));
    assert_eq!(job.status(), JobStatus::Canceled);

    // a second request neither re-invokes cancel nor changes the status
    assert_eq!(scheduler.cancel(&job), JobStatus::Canceled);

    assert!(main_loop.run_until(|| scheduler.running_count() == 0, WAIT));
    let extra = task.iterations.load(Ordering::SeqCst) - at_cancel;
    assert!(extra <= 2, "job kept running for {} iterations", extra);
    assert_eq!(task.cancel_calls.load(Ordering::SeqCst), 1);
    assert_eq!(job.status(), JobStatus::Canceled);
    assert!(job.error().is_none());

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_shutdown_cancels_waiting_and_waits_for_running() {
    init_logging();
    let main_loop = MainLoop::new();
    let scheduler = scheduler(1, &main_loop);
    let journal = Arc::new(Journal::default());
    let run_returned = Arc::new(AtomicBool::new(false));
    let cancel_calls = Arc::new(AtomicUsize::new(0));
    let (started_tx, started_rx) = mpsc::channel();
    let started_tx = Mutex::new(started_tx);

    let running = scheduler
        .submit(
            JobKind::Load,
            ClosureTask::new((Arc::clone(&run_returned), Arc::clone(&cancel_calls)))
                .with_run(move |(returned, _), ctx| {
                    started_tx.lock().send(()).ok();
                    while !ctx.token().sleep(Duration::from_millis(10)) {}
                    // wind down after the signal
                    thread::sleep(Duration::from_millis(50));
                    returned.store(true, Ordering::SeqCst);
                    ctx.check_cancelled()
                })
                .with_cancel(|(_, calls)| {
                    calls.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .expect("Failed to submit running job");
    started_rx.recv_timeout(WAIT).expect("running job never started");

    let waiting_a = scheduler
        .submit(JobKind::Thumbnail, quick("waiting-a", &journal))
        .expect("Failed to submit waiting job");
    let waiting_b = scheduler
        .submit(JobKind::Save, quick("waiting-b", &journal))
        .expect("Failed to submit waiting job");

    scheduler.shutdown().expect("Failed to shutdown scheduler");

    assert!(run_returned.load(Ordering::SeqCst));
    assert_eq!(cancel_calls.load(Ordering::SeqCst), 1);
    assert_eq!(running.status(), JobStatus::Canceled);
    assert_eq!(waiting_a.status(), JobStatus::Canceled);
    assert_eq!(waiting_b.status(), JobStatus::Canceled);

    main_loop.dispatch_pending();
    assert!(journal.runs.lock().is_empty());
    let mut finished = journal.finished.lock().clone();
    finished.sort_by_key(|(label, _)| *label);
    assert_eq!(
        finished,
        vec![
            ("waiting-a", JobStatus::Canceled),
            ("waiting-b", JobStatus::Canceled)
        ]
    );
}

#[test]
fn test_progress_reaches_owner_thread_in_order() {
    init_logging();
    let main_loop = MainLoop::new();
    let scheduler = scheduler(2, &main_loop);
    let owner = thread::current().id();

    let events = Arc::new(Mutex::new(Vec::new()));
    let task = ClosureTask::new(Arc::clone(&events))
        .with_run(|_, ctx| {
            for step in 1..=10 {
                ctx.report_progress(step as f32 / 10.0);
                thread::sleep(Duration::from_millis(2));
            }
            Ok(())
        })
        .with_progress(move |events, _, p| {
            assert_eq!(thread::current().id(), owner);
            events.lock().push(Some(p));
        })
        .with_finished(|events, _, _| events.lock().push(None));

    let job = scheduler
        .submit(JobKind::Transform, task)
        .expect("Failed to submit job");
    assert!(main_loop.run_until(|| events.lock().last() == Some(&None), WAIT));

    let events = events.lock().clone();
    let progress: Vec<f32> = events.iter().flatten().copied().collect();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(progress.iter().all(|p| (0.0..=1.0).contains(p)));
    // finished is the last notification and arrives once
    assert_eq!(events.iter().filter(|e| e.is_none()).count(), 1);
    assert_eq!(job.progress(), 1.0);

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}

#[test]
fn test_multi_part_progress() {
    init_logging();
    let main_loop = MainLoop::new();
    let scheduler = scheduler(1, &main_loop);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let task = ClosureTask::new(Arc::clone(&seen))
        .with_run(|_, ctx| {
            for _part in 0..4 {
                ctx.report_progress(1.0);
                ctx.part_finished();
            }
            Ok(())
        })
        .with_progress(|seen, job, _| seen.lock().push(job.progress()));

    let job = scheduler
        .submit_with_options(
            JobKind::Save,
            task,
            JobOptions::new().with_progress_parts(4),
        )
        .expect("Failed to submit job");
    assert!(main_loop.run_until(|| job.succeeded(), WAIT));
    main_loop.dispatch_pending();

    assert_eq!(job.progress(), 1.0);
    assert!(seen.lock().iter().all(|p| *p <= 1.0));
    assert_eq!(seen.lock().last().copied(), Some(1.0));

    scheduler.shutdown().expect("Failed to shutdown scheduler");
}
