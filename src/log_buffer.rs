use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::error::{Error, Result};

/// Destination for flushed log lines.
///
/// The sink is called from the worker thread only, once per flush, with the
/// whole pending sequence in write order. It either persists every line and
/// returns `Ok`, or returns an error and the buffer keeps the lines for the
/// next flush.
///
/// # Usage
///
/// ```
/// # use worker_logger::{LogSink, Result};
/// // Sink that collects lines in memory
/// struct VecSink(Vec<String>);
///
/// impl LogSink for VecSink {
///     fn write_lines(&mut self, lines: &[String]) -> Result<()> {
///         self.0.extend_from_slice(lines);
///         Ok(())
///     }
/// }
/// ```
pub trait LogSink: Send {
    /// Persists `lines` in order, one record per line.
    fn write_lines(&mut self, lines: &[String]) -> Result<()>;
}

/// Appends lines to a text file, one `\n`-terminated record per line.
///
/// The file is opened in append mode on every flush and closed afterwards,
/// so external rotation or deletion between flushes is picked up. Embedded
/// newlines are written as-is and will split a record.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn write_lines(&mut self, lines: &[String]) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| Error::SinkUnavailable {
                path: self.path.clone(),
                source,
            })?;

        let mut writer = BufWriter::new(file);
        for line in lines {
            writer.write_all(line.as_bytes()).map_err(Error::SinkWrite)?;
            writer.write_all(b"\n").map_err(Error::SinkWrite)?;
        }
        writer.flush().map_err(Error::SinkWrite)
    }
}

/// Handle returned by [`FlushObservers::add`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

type FlushObserver = Arc<dyn Fn(Duration) + Send + Sync>;

/// Multicast list of flush-timing observers.
///
/// Clones share the same list, so the worker thread can notify while other
/// threads register and unregister. Observers run synchronously on the
/// worker thread after each successful flush and must not block.
#[derive(Clone, Default)]
pub struct FlushObservers {
    inner: Arc<ObserverList>,
}

#[derive(Default)]
struct ObserverList {
    next_token: AtomicU64,
    observers: Mutex<Vec<(ObserverToken, FlushObserver)>>,
}

impl FlushObservers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `observer` and returns the token that removes it.
    pub fn add<F>(&self, observer: F) -> ObserverToken
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        let token = ObserverToken(self.inner.next_token.fetch_add(1, Ordering::Relaxed));
        self.inner.observers.lock().push((token, Arc::new(observer)));
        token
    }

    /// Unregisters the observer behind `token`. Returns `false` if it was
    /// already removed.
    pub fn remove(&self, token: ObserverToken) -> bool {
        let mut observers = self.inner.observers.lock();
        let before = observers.len();
        observers.retain(|(registered, _)| *registered != token);
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every registered observer with `elapsed`.
    ///
    /// The list is snapshotted first, so an observer may add or remove
    /// observers without deadlocking.
    pub fn notify(&self, elapsed: Duration) {
        let snapshot: Vec<FlushObserver> = self
            .inner
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();

        for observer in snapshot {
            observer(elapsed);
        }
    }
}

impl std::fmt::Debug for FlushObservers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushObservers")
            .field("len", &self.len())
            .finish()
    }
}

/// Pending log lines waiting for the next flush.
///
/// **Not thread-safe by contract.** A `LogBuffer` belongs to the worker
/// thread; other threads reach it only by sending an operation through the
/// worker's queue (see [`CrossThreadInvoker`](crate::CrossThreadInvoker)).
/// There is deliberately no lock around the pending lines.
///
/// Between flushes the buffer holds exactly the lines appended since the
/// last successful flush. A failed flush keeps them for the next attempt,
/// without any cap, so a sink that stays broken grows the buffer without
/// bound.
pub struct LogBuffer {
    lines: Vec<String>,
    sink: Box<dyn LogSink>,
    observers: FlushObservers,
}

impl LogBuffer {
    pub fn new(sink: impl LogSink + 'static) -> Self {
        Self::with_observers(sink, FlushObservers::new())
    }

    /// Creates a buffer that reports flush timings to an existing observer
    /// list.
    pub fn with_observers(sink: impl LogSink + 'static, observers: FlushObservers) -> Self {
        Self {
            lines: Vec::new(),
            sink: Box::new(sink),
            observers,
        }
    }

    /// Appends `line` to the tail of the pending sequence.
    ///
    /// Always succeeds; the return value exists so invoked operations can
    /// report it back across the thread boundary.
    pub fn append(&mut self, line: impl Into<String>) -> bool {
        self.lines.push(line.into());
        true
    }

    /// Writes every pending line to the sink in order and clears the buffer.
    ///
    /// On success the elapsed time is sent to the flush observers and `true`
    /// is returned. On failure nothing is cleared and `false` is returned.
    /// Flushing an empty buffer still touches the sink and succeeds.
    pub fn flush(&mut self) -> bool {
        match self.try_flush() {
            Ok(_) => true,
            Err(err) => {
                warn!(pending = self.lines.len(), error = %err, "flush failed, lines retained");
                false
            }
        }
    }

    /// Like [`flush`](Self::flush) but returns the error and the elapsed time.
    pub fn try_flush(&mut self) -> Result<Duration> {
        let start = Instant::now();
        self.sink.write_lines(&self.lines)?;
        let flushed = self.lines.len();
        self.lines.clear();
        let elapsed = start.elapsed();

        trace!(lines = flushed, elapsed_us = elapsed.as_micros() as u64, "flushed");
        self.observers.notify(elapsed);
        Ok(elapsed)
    }

    /// Drops every pending line without writing it.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn pending(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn observers(&self) -> &FlushObservers {
        &self.observers
    }
}

impl std::fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBuffer")
            .field("pending", &self.lines.len())
            .field("observers", &self.observers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectingSink;

    impl LogSink for RejectingSink {
        fn write_lines(&mut self, _lines: &[String]) -> Result<()> {
            Err(Error::SinkWrite(std::io::Error::other("rejected")))
        }
    }

    #[test]
    fn test_failed_flush_keeps_lines() {
        let mut buffer = LogBuffer::new(RejectingSink);
        buffer.append("one");
        buffer.append("two");

        assert!(!buffer.flush());
        assert_eq!(buffer.pending(), ["one", "two"]);
    }

    #[test]
    fn test_observer_removal_by_token() {
        let observers = FlushObservers::new();
        let first = observers.add(|_| {});
        let second = observers.add(|_| {});
        assert_ne!(first, second);

        assert!(observers.remove(first));
        assert!(!observers.remove(first));
        assert_eq!(observers.len(), 1);
    }
}
