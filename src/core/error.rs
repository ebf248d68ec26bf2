//! Error types for the job engine

/// Result type for job engine operations
pub type Result<T> = std::result::Result<T, JobError>;

/// Coarse classification of a [`JobError`].
///
/// Owners use this to decide between surfacing an error to the user and
/// submitting a fresh job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The payload's underlying resource could not be read or written
    Io,
    /// The requested operation does not apply to the payload
    Unsupported,
    /// The job or the scheduler was set up incorrectly
    Configuration,
    /// The work was cancelled
    Cancelled,
    /// Scheduler or worker failure
    Internal,
}

/// Errors produced by jobs and by the scheduler
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum JobError {
    /// I/O or source failure while running a job
    #[error("I/O error: {message}")]
    Io {
        /// Error message
        message: String,
        /// Source IO error
        #[source]
        source: Option<std::io::Error>,
    },

    /// Operation not applicable to the payload
    #[error("Unsupported operation '{operation}': {message}")]
    Unsupported {
        /// Name of the rejected operation
        operation: String,
        /// Error message
        message: String,
    },

    /// Job submitted without a usable run operation
    #[error("Job misconfigured (job_id: {job_id}): {message}")]
    Configuration {
        /// ID of the misconfigured job
        job_id: u64,
        /// Error message
        message: String,
    },

    /// Job was cancelled with reason
    #[error("Job cancelled (job_id: {job_id}): {reason}")]
    Cancelled {
        /// ID of the cancelled job
        job_id: u64,
        /// Reason for cancellation
        reason: String,
    },

    /// Job execution failed with job details
    #[error("Job execution failed (job_id: {job_id}): {message}")]
    ExecutionError {
        /// ID of the failed job
        job_id: u64,
        /// Error message
        message: String,
    },

    /// The run operation panicked
    #[error("Job panicked (job_id: {job_id}): {message}")]
    Panicked {
        /// ID of the panicked job
        job_id: u64,
        /// Panic message
        message: String,
    },

    /// Scheduler is already running with details
    #[error("Scheduler '{name}' is already running with {worker_count} workers")]
    AlreadyRunning {
        /// Name of the scheduler
        name: String,
        /// Number of worker threads
        worker_count: usize,
    },

    /// Scheduler is not running
    #[error("Scheduler '{name}' is not running")]
    NotRunning {
        /// Name of the scheduler
        name: String,
    },

    /// Failed to spawn a worker thread with details
    #[error("Failed to spawn worker thread #{thread_id}: {message}")]
    SpawnError {
        /// ID of the thread that failed to spawn
        thread_id: usize,
        /// Error message
        message: String,
        /// Source IO error
        #[source]
        source: Option<std::io::Error>,
    },

    /// Failed to join a worker thread
    #[error("Failed to join worker thread #{thread_id}: {message}")]
    JoinError {
        /// ID of the thread that failed to join
        thread_id: usize,
        /// Error message
        message: String,
    },

    /// Invalid configuration with parameter
    #[error("Invalid configuration for '{parameter}': {message}")]
    InvalidConfig {
        /// Configuration parameter name
        parameter: String,
        /// Error message
        message: String,
    },

    /// The owner thread's event queue is gone
    #[error("Dispatcher closed: owner event loop no longer receives notifications")]
    DispatcherClosed,

    /// General error
    #[error("{0}")]
    Other(String),
}

impl JobError {
    /// Create an I/O error without an underlying source
    pub fn io(message: impl Into<String>) -> Self {
        JobError::Io {
            message: message.into(),
            source: None,
        }
    }

    /// Create an I/O error wrapping a `std::io::Error`
    pub fn io_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        JobError::Io {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(operation: impl Into<String>, message: impl Into<String>) -> Self {
        JobError::Unsupported {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(job_id: u64, message: impl Into<String>) -> Self {
        JobError::Configuration {
            job_id,
            message: message.into(),
        }
    }

    /// Create a cancelled error
    pub fn cancelled(job_id: u64, reason: impl Into<String>) -> Self {
        JobError::Cancelled {
            job_id,
            reason: reason.into(),
        }
    }

    /// Create an execution error
    pub fn execution(job_id: u64, message: impl Into<String>) -> Self {
        JobError::ExecutionError {
            job_id,
            message: message.into(),
        }
    }

    /// Create a panicked error
    pub fn panicked(job_id: u64, message: impl Into<String>) -> Self {
        JobError::Panicked {
            job_id,
            message: message.into(),
        }
    }

    /// Create an already running error
    pub fn already_running(name: impl Into<String>, worker_count: usize) -> Self {
        JobError::AlreadyRunning {
            name: name.into(),
            worker_count,
        }
    }

    /// Create a not running error
    pub fn not_running(name: impl Into<String>) -> Self {
        JobError::NotRunning { name: name.into() }
    }

    /// Create a spawn error with source
    pub fn spawn_with_source(
        thread_id: usize,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        JobError::SpawnError {
            thread_id,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a join error
    pub fn join(thread_id: usize, message: impl Into<String>) -> Self {
        JobError::JoinError {
            thread_id,
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        JobError::InvalidConfig {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        JobError::Other(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Io { .. } => ErrorKind::Io,
            JobError::Unsupported { .. } => ErrorKind::Unsupported,
            JobError::Configuration { .. } | JobError::InvalidConfig { .. } => {
                ErrorKind::Configuration
            }
            JobError::Cancelled { .. } => ErrorKind::Cancelled,
            _ => ErrorKind::Internal,
        }
    }

    /// Whether this error signals cancellation rather than failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobError::Cancelled { .. })
    }
}

impl From<std::io::Error> for JobError {
    fn from(err: std::io::Error) -> Self {
        JobError::io_with_source(err.to_string(), err)
    }
}
