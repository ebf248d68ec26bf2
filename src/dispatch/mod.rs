//! Delivery of job notifications to the owner thread.
//!
//! Workers never call progress or finished callbacks themselves. They hand a
//! closure to a [`Dispatcher`], and the owner thread runs it from its event
//! loop. [`MainLoop`] is a ready-made loop for applications (and tests) that
//! do not already have one.
//!
//! # Example
//!
//! ```rust
//! use rust_job_engine::dispatch::{Dispatcher, MainLoop};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let main_loop = MainLoop::new();
//! let handle = main_loop.handle();
//! let hits = Arc::new(AtomicUsize::new(0));
//!
//! let counter = Arc::clone(&hits);
//! std::thread::spawn(move || {
//!     handle
//!         .post(Box::new(move || {
//!             counter.fetch_add(1, Ordering::SeqCst);
//!         }))
//!         .unwrap();
//! })
//! .join()
//! .unwrap();
//!
//! assert_eq!(main_loop.dispatch_pending(), 1);
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! ```

use crate::core::{JobError, Result};
use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

/// A callback to run on the owner thread
pub type DispatchTask = Box<dyn FnOnce() + Send + 'static>;

/// "Run this on the owner thread".
///
/// Implementations must not block the caller and must run tasks in the order
/// they were posted.
pub trait Dispatcher: Send + Sync {
    /// Queue `task` for execution on the owner thread
    ///
    /// # Errors
    ///
    /// Returns [`JobError::DispatcherClosed`] if the owner loop is gone.
    fn post(&self, task: DispatchTask) -> Result<()>;
}

/// An owner-thread event queue.
///
/// The thread that calls the `dispatch_*` methods is the owner thread; any
/// number of [`MainLoopHandle`]s can post to it from other threads.
pub struct MainLoop {
    sender: Sender<DispatchTask>,
    receiver: Receiver<DispatchTask>,
}

impl MainLoop {
    /// Create an empty loop
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self { sender, receiver }
    }

    /// A posting handle for schedulers and workers
    pub fn handle(&self) -> MainLoopHandle {
        MainLoopHandle {
            sender: self.sender.clone(),
        }
    }

    /// Number of tasks waiting to run
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Run every queued task, including ones posted while draining.
    ///
    /// Returns the number of tasks run.
    pub fn dispatch_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task();
            count += 1;
        }
        count
    }

    /// Wait up to `timeout` for one task and run it.
    ///
    /// Returns `true` if a task ran.
    pub fn dispatch_next_timeout(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(task) => {
                task();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Dispatch tasks until `done` returns `true` or `timeout` elapses.
    ///
    /// Returns the final value of `done`.
    pub fn run_until<F>(&self, mut done: F, timeout: Duration) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            // short slices so `done` is re-checked even without traffic
            let slice = (deadline - now).min(Duration::from_millis(10));
            self.dispatch_next_timeout(slice);
        }
    }
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MainLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainLoop")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Cloneable posting side of a [`MainLoop`]
#[derive(Clone)]
pub struct MainLoopHandle {
    sender: Sender<DispatchTask>,
}

impl Dispatcher for MainLoopHandle {
    fn post(&self, task: DispatchTask) -> Result<()> {
        self.sender
            .send(task)
            .map_err(|_| JobError::DispatcherClosed)
    }
}

impl std::fmt::Debug for MainLoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainLoopHandle").finish_non_exhaustive()
    }
}
