//! Scheduler configuration

use crate::core::{JobError, Result};
use serde::{Deserialize, Serialize};

/// Number of workers when nothing else is configured
pub const DEFAULT_NUM_WORKERS: usize = 2;

/// Configuration for a [`Scheduler`](crate::Scheduler)
///
/// # Example
///
/// ```rust
/// use rust_job_engine::SchedulerConfig;
///
/// let config = SchedulerConfig::new(4)
///     .with_name("gallery")
///     .with_thread_name_prefix("gallery-worker")
///     .with_progress_threshold(0.05);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of worker threads (0 = number of CPUs)
    pub num_workers: usize,
    /// Worker thread name prefix
    pub thread_name_prefix: String,
    /// Scheduler name used in errors and log fields
    pub name: String,
    /// Default minimum progress step between progress notifications
    pub progress_threshold: f32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_workers: DEFAULT_NUM_WORKERS,
            thread_name_prefix: "job-worker".to_string(),
            name: "scheduler".to_string(),
            progress_threshold: 0.0,
        }
    }
}

impl SchedulerConfig {
    /// Create a new configuration with the specified number of workers
    #[must_use]
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: resolve_workers(num_workers),
            ..Default::default()
        }
    }

    /// Set thread name prefix
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set scheduler name
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Set the default progress threshold for submitted jobs
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_progress_threshold(mut self, threshold: f32) -> Self {
        self.progress_threshold = threshold;
        self
    }

    /// Parse and validate a JSON configuration.
    ///
    /// Missing fields take their defaults; `num_workers: 0` means one worker
    /// per CPU.
    ///
    /// ```rust
    /// use rust_job_engine::SchedulerConfig;
    ///
    /// let config = SchedulerConfig::from_json(r#"{ "num_workers": 3 }"#).unwrap();
    /// assert_eq!(config.num_workers, 3);
    /// assert_eq!(config.thread_name_prefix, "job-worker");
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: SchedulerConfig = serde_json::from_str(json)
            .map_err(|e| JobError::invalid_config("json", e.to_string()))?;
        config.num_workers = resolve_workers(config.num_workers);
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(JobError::invalid_config(
                "num_workers",
                "Number of workers must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.progress_threshold) {
            return Err(JobError::invalid_config(
                "progress_threshold",
                format!("{} is outside [0, 1]", self.progress_threshold),
            ));
        }
        Ok(())
    }
}

fn resolve_workers(num_workers: usize) -> usize {
    if num_workers == 0 {
        num_cpus::get()
    } else {
        num_workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.num_workers, DEFAULT_NUM_WORKERS);
        assert_eq!(config.thread_name_prefix, "job-worker");
        assert_eq!(config.progress_threshold, 0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_means_cpus() {
        assert_eq!(SchedulerConfig::new(0).num_workers, num_cpus::get());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SchedulerConfig::new(2);
        config.num_workers = 0;
        assert!(matches!(
            config.validate(),
            Err(JobError::InvalidConfig { ref parameter, .. }) if parameter == "num_workers"
        ));

        let config = SchedulerConfig::new(2).with_progress_threshold(1.5);
        assert!(matches!(
            config.validate(),
            Err(JobError::InvalidConfig { ref parameter, .. }) if parameter == "progress_threshold"
        ));

        let config = SchedulerConfig::new(2).with_progress_threshold(f32::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json() {
        let config = SchedulerConfig::from_json(
            r#"{ "num_workers": 4, "name": "viewer", "progress_threshold": 0.1 }"#,
        )
        .expect("Failed to parse config");
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.name, "viewer");
        assert_eq!(config.thread_name_prefix, "job-worker");

        let config = SchedulerConfig::from_json(r#"{ "num_workers": 0 }"#)
            .expect("Failed to parse config");
        assert_eq!(config.num_workers, num_cpus::get());
    }

    #[test]
    fn test_from_json_errors() {
        assert!(SchedulerConfig::from_json("{ not json").is_err());
        assert!(SchedulerConfig::from_json(r#"{ "progress_threshold": -0.5 }"#).is_err());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = SchedulerConfig::new(3).with_name("browser");
        let json = serde_json::to_string(&config).expect("Failed to serialize config");
        assert_eq!(SchedulerConfig::from_json(&json).expect("Failed to parse config"), config);
    }
}
