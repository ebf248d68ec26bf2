//! Viewer session example
//!
//! Simulates an image viewer: a directory scan fills the model, thumbnails
//! are generated for every entry, the user opens two images and then leaves
//! the folder, cancelling whatever thumbnail work is still outstanding.
//! All notifications are handled on the main thread.
//!
//! Run with: cargo run --example viewer_session

use parking_lot::Mutex;
use rust_job_engine::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Scans a (simulated) directory, reporting progress per entry
struct ScanTask {
    folder: String,
    entries: Mutex<Vec<String>>,
}

impl JobTask for ScanTask {
    fn run(&self, ctx: &JobContext) -> Result<()> {
        const COUNT: usize = 12;
        for i in 0..COUNT {
            ctx.check_cancelled()?;
            thread::sleep(Duration::from_millis(5));
            self.entries
                .lock()
                .push(format!("{}/IMG_{:04}.jpg", self.folder, i));
            ctx.report_progress((i + 1) as f32 / COUNT as f32);
        }
        Ok(())
    }

    fn on_progress(&self, _job: &Job, progress: f32) {
        println!("[main] scanning {}: {:.0}%", self.folder, progress * 100.0);
    }

    fn on_finished(&self, job: &Job, error: Option<&JobError>) {
        match error {
            None => println!(
                "[main] scan {} {}: {} entries",
                job.id(),
                job.status(),
                self.entries.lock().len()
            ),
            Some(e) => println!("[main] scan {} failed: {}", job.id(), e),
        }
    }

    fn name(&self) -> &str {
        "ScanTask"
    }
}

/// Decodes a (simulated) image in two parts: header and pixels
struct LoadTask {
    path: String,
}

impl JobTask for LoadTask {
    fn run(&self, ctx: &JobContext) -> Result<()> {
        if self.path.ends_with("0007.jpg") {
            return Err(JobError::execution(
                ctx.job_id().get(),
                format!("{}: truncated file", self.path),
            ));
        }
        for step in 1..=4 {
            ctx.check_cancelled()?;
            thread::sleep(Duration::from_millis(2));
            ctx.report_progress(step as f32 / 4.0);
        }
        ctx.part_finished();
        for step in 1..=4 {
            ctx.check_cancelled()?;
            thread::sleep(Duration::from_millis(8));
            ctx.report_progress(step as f32 / 4.0);
        }
        Ok(())
    }

    fn on_progress(&self, _job: &Job, progress: f32) {
        println!("[main] loading {}: {:.0}%", self.path, progress * 100.0);
    }

    fn on_finished(&self, job: &Job, error: Option<&JobError>) {
        match error {
            None => println!("[main] {} {}", self.path, job.status()),
            Some(e) => println!("[main] {} could not be opened: {}", self.path, e),
        }
    }

    fn name(&self) -> &str {
        "LoadTask"
    }
}

fn thumbnail(scheduler: &Scheduler, path: String, done: Arc<Mutex<usize>>) -> Result<Job> {
    let task = ClosureTask::new(path)
        .with_name("ThumbnailTask")
        .with_run(|path, ctx| {
            // a token-aware sleep stands in for scaling work
            if ctx.token().sleep(Duration::from_millis(15)) {
                return ctx.check_cancelled();
            }
            println!("[worker {}] thumbnail {}", ctx.worker_id(), path);
            Ok(())
        })
        .with_finished(move |path, job, _| {
            if job.succeeded() {
                *done.lock() += 1;
            } else {
                println!("[main] thumbnail {} {}", path, job.status());
            }
        });
    scheduler.submit(JobKind::Thumbnail, task)
}

fn main() -> Result<()> {
    env_logger::init();

    println!("=== Viewer Session Example ===\n");

    let main_loop = MainLoop::new();
    let config = SchedulerConfig::new(2)
        .with_name("viewer")
        .with_thread_name_prefix("viewer-worker")
        .with_progress_threshold(0.25);
    let scheduler = Scheduler::with_config(config, main_loop.handle())?;
    scheduler.start()?;

    // 1. Scan the folder
    println!("--- Scanning folder ---");
    let scan_task = Arc::new(ScanTask {
        folder: "holiday".to_string(),
        entries: Mutex::new(Vec::new()),
    });
    let scan = scheduler.submit(JobKind::DirectoryScan, SharedScan(Arc::clone(&scan_task)))?;
    main_loop.run_until(|| scan.status().is_terminal(), Duration::from_secs(5));
    main_loop.dispatch_pending();

    // 2. Thumbnails for every entry
    println!("\n--- Generating thumbnails ---");
    let done = Arc::new(Mutex::new(0usize));
    let entries = scan_task.entries.lock().clone();
    let thumbnails: Vec<Job> = entries
        .iter()
        .map(|path| thumbnail(&scheduler, path.clone(), Arc::clone(&done)))
        .collect::<Result<_>>()?;

    // 3. The user opens two images; loads jump ahead of waiting thumbnails
    println!("\n--- Opening images ---");
    let opened: Vec<Job> = [&entries[3], &entries[7]]
        .iter()
        .map(|path| {
            scheduler.submit(
                JobKind::Load,
                LoadTask {
                    path: path.to_string(),
                },
            )
        })
        .collect::<Result<_>>()?;
    println!("{:#?}", scheduler.stats().queued_by_kind);
    main_loop.run_until(
        || opened.iter().all(|job| job.status().is_terminal()),
        Duration::from_secs(5),
    );

    // 4. Leaving the folder cancels the remaining thumbnails
    println!("\n--- Leaving folder ---");
    let mut canceled = 0;
    for job in &thumbnails {
        if !job.status().is_terminal() && scheduler.cancel(job) == JobStatus::Canceled {
            canceled += 1;
        }
    }
    main_loop.run_until(
        || thumbnails.iter().all(|job| job.status().is_terminal()),
        Duration::from_secs(5),
    );
    main_loop.dispatch_pending();
    println!("{} thumbnails done, {} canceled", *done.lock(), canceled);

    // 5. Statistics
    let stats = scheduler.stats();
    println!("\n--- Statistics ---");
    println!("Total submitted: {}", stats.total_submitted);
    println!("Processed: {}", stats.total_processed());
    println!("Failed: {}", stats.total_failed());
    println!("Cancelled: {}", stats.total_cancelled());
    for (i, worker) in stats.workers.iter().enumerate() {
        println!(
            "Worker {}: {} jobs, {}us busy",
            i, worker.jobs_processed, worker.total_processing_time_us
        );
    }

    scheduler.shutdown()?;
    main_loop.dispatch_pending();
    println!("\nScheduler shut down");

    Ok(())
}

/// Shares a scan task with the main thread, which reads its entries later
struct SharedScan(Arc<ScanTask>);

impl JobTask for SharedScan {
    fn run(&self, ctx: &JobContext) -> Result<()> {
        self.0.run(ctx)
    }

    fn on_progress(&self, job: &Job, progress: f32) {
        self.0.on_progress(job, progress);
    }

    fn on_finished(&self, job: &Job, error: Option<&JobError>) {
        self.0.on_finished(job, error);
    }

    fn name(&self) -> &str {
        self.0.name()
    }
}
