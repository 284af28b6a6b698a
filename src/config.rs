use std::path::PathBuf;
use std::time::Duration;

/// Default worker thread name.
pub const DEFAULT_WORKER_NAME: &str = "LoggerThread";

/// Default period between timer-driven flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1000);

/// Default log file, relative to the working directory.
pub const DEFAULT_LOG_PATH: &str = "LogData.txt";

/// Settings for a [`Worker`](crate::Worker).
///
/// # Examples
///
/// ```
/// # use worker_logger::WorkerConfig;
/// # use std::time::Duration;
/// let config = WorkerConfig::default()
///     .with_name("audit")
///     .with_flush_interval(Duration::from_millis(250))
///     .with_queue_capacity(1024);
/// assert_eq!(config.queue_capacity, Some(1024));
/// ```
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker thread name. The timer thread is named `<name>-timer`.
    pub name: String,
    /// Period of the timer thread's flush ticks.
    pub flush_interval: Duration,
    /// Path used by the default [`FileSink`](crate::FileSink).
    pub log_path: PathBuf,
    /// Maximum queued messages; `None` for an unbounded queue. Zero is
    /// treated as one.
    pub queue_capacity: Option<usize>,
    /// Flush pending lines one last time after the shutdown message.
    pub flush_on_shutdown: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_WORKER_NAME.to_string(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            queue_capacity: None,
            flush_on_shutdown: false,
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    /// Bounds the queue. A zero capacity is raised to one when the worker
    /// is built.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn with_flush_on_shutdown(mut self, enabled: bool) -> Self {
        self.flush_on_shutdown = enabled;
        self
    }
}
