//! Cooperative cancellation
//!
//! Every job owns a [`CancellationToken`]. The scheduler trips it when the
//! owner requests cancellation or the scheduler shuts down; the job's run
//! operation polls it and returns early. Nothing is ever interrupted
//! forcibly.
//!
//! # Example
//!
//! ```rust
//! use rust_job_engine::CancellationToken;
//! use std::thread;
//! use std::time::Duration;
//!
//! let token = CancellationToken::new();
//! let token_clone = token.clone();
//!
//! let handle = thread::spawn(move || {
//!     for _ in 0..100 {
//!         if token_clone.sleep(Duration::from_millis(10)) {
//!             return "Cancelled";
//!         }
//!     }
//!     "Completed"
//! });
//!
//! thread::sleep(Duration::from_millis(25));
//! token.cancel();
//!
//! assert_eq!(handle.join().unwrap(), "Cancelled");
//! ```

use crate::core::{JobError, Result};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reason for cancellation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancellationReason {
    /// Explicitly cancelled via `cancel()`
    Manual,
    /// The owner asked the scheduler to cancel the job
    Requested,
    /// The scheduler is shutting down
    Shutdown,
    /// Custom cancellation reason
    Custom(String),
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancellationReason::Manual => write!(f, "manually cancelled"),
            CancellationReason::Requested => write!(f, "cancellation requested by owner"),
            CancellationReason::Shutdown => write!(f, "scheduler shutting down"),
            CancellationReason::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

struct CancellationTokenInner {
    job_id: u64,
    cancelled: AtomicBool,
    reason: RwLock<Option<CancellationReason>>,
    // Wakes threads parked in `sleep`
    lock: Mutex<()>,
    wakeup: Condvar,
}

/// A thread-safe cancellation flag shared between a job's run operation
/// and the scheduler.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationTokenInner>,
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("job_id", &self.inner.job_id)
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

impl CancellationToken {
    /// Create a new cancellation token (not cancelled)
    pub fn new() -> Self {
        Self::for_job(0)
    }

    pub(crate) fn for_job(job_id: u64) -> Self {
        Self {
            inner: Arc::new(CancellationTokenInner {
                job_id,
                cancelled: AtomicBool::new(false),
                reason: RwLock::new(None),
                lock: Mutex::new(()),
                wakeup: Condvar::new(),
            }),
        }
    }

    /// Cancel this token with default reason (Manual)
    ///
    /// Idempotent: only the first call records a reason.
    pub fn cancel(&self) {
        self.cancel_with_reason(CancellationReason::Manual);
    }

    /// Cancel this token with a specific reason
    ///
    /// Returns `true` if this call tripped the token.
    pub fn cancel_with_reason(&self, reason: CancellationReason) -> bool {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }

        *self.inner.reason.write() = Some(reason);

        let _guard = self.inner.lock.lock();
        self.inner.wakeup.notify_all();
        true
    }

    /// Check if this token has been cancelled
    ///
    /// Lock-free, suitable for hot loops.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Returns the cancellation reason (if cancelled)
    pub fn reason(&self) -> Option<CancellationReason> {
        self.inner.reason.read().clone()
    }

    /// Returns error if cancelled, `Ok(())` otherwise
    ///
    /// Lets run operations bail out with `?`:
    ///
    /// ```rust
    /// use rust_job_engine::{CancellationToken, JobError};
    ///
    /// fn scan_rows(token: &CancellationToken) -> Result<(), JobError> {
    ///     for _row in 0..480 {
    ///         token.check()?;
    ///         // decode row...
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            let reason = self
                .reason()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Err(JobError::cancelled(self.inner.job_id, reason))
        } else {
            Ok(())
        }
    }

    /// Sleep for up to `duration`, waking early on cancellation.
    ///
    /// Returns `true` if the token is cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.inner.lock.lock();
        while !self.is_cancelled() {
            if self
                .inner
                .wakeup
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                break;
            }
        }
        self.is_cancelled()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
