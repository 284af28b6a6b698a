use parking_lot::Mutex;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use worker_logger::{Error, FileSink, FlushObservers, LogBuffer, LogSink, Result};

struct CollectingSink {
    lines: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
}

impl CollectingSink {
    fn new() -> Self {
        Self {
            lines: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl LogSink for CollectingSink {
    fn write_lines(&mut self, lines: &[String]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.lines.lock().extend_from_slice(lines);
        Ok(())
    }
}

/// Fails until `healthy` is set.
struct FlakySink {
    healthy: Arc<Mutex<bool>>,
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogSink for FlakySink {
    fn write_lines(&mut self, lines: &[String]) -> Result<()> {
        if !*self.healthy.lock() {
            return Err(Error::SinkWrite(std::io::Error::other("sink offline")));
        }
        self.lines.lock().extend_from_slice(lines);
        Ok(())
    }
}

#[test]
fn test_flush_preserves_order() {
    let sink = CollectingSink::new();
    let lines = sink.lines.clone();
    let mut buffer = LogBuffer::new(sink);

    for i in 0..20 {
        assert!(buffer.append(format!("line {i}")));
    }
    assert_eq!(buffer.len(), 20);
    assert!(buffer.flush());
    assert!(buffer.is_empty());

    let expected: Vec<String> = (0..20).map(|i| format!("line {i}")).collect();
    assert_eq!(*lines.lock(), expected);
}

#[test]
fn test_second_flush_writes_nothing() {
    let sink = CollectingSink::new();
    let (lines, calls) = (sink.lines.clone(), sink.calls.clone());
    let mut buffer = LogBuffer::new(sink);

    buffer.append("only");
    assert!(buffer.flush());
    assert!(buffer.flush(), "Flushing an empty buffer still succeeds");

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*lines.lock(), vec!["only".to_string()]);
}

#[test]
fn test_failed_flush_retries_everything() {
    let healthy = Arc::new(Mutex::new(false));
    let lines = Arc::new(Mutex::new(Vec::new()));
    let mut buffer = LogBuffer::new(FlakySink {
        healthy: healthy.clone(),
        lines: lines.clone(),
    });

    buffer.append("first");
    assert!(!buffer.flush());
    buffer.append("second");
    assert!(!buffer.flush());
    assert_eq!(buffer.pending(), ["first", "second"]);

    *healthy.lock() = true;
    assert!(buffer.flush());
    assert!(buffer.is_empty());
    assert_eq!(*lines.lock(), vec!["first".to_string(), "second".to_string()]);
}

#[test]
fn test_observers_only_on_success() {
    let healthy = Arc::new(Mutex::new(false));
    let observers = FlushObservers::new();
    let durations = Arc::new(Mutex::new(Vec::<Duration>::new()));
    let recorded = durations.clone();
    observers.add(move |elapsed| recorded.lock().push(elapsed));

    let mut buffer = LogBuffer::with_observers(
        FlakySink {
            healthy: healthy.clone(),
            lines: Arc::new(Mutex::new(Vec::new())),
        },
        observers.clone(),
    );

    buffer.append("x");
    assert!(!buffer.flush());
    assert!(durations.lock().is_empty(), "Failed flush must not notify observers");

    *healthy.lock() = true;
    assert!(buffer.flush());
    assert_eq!(durations.lock().len(), 1);
}

#[test]
fn test_observer_removed_is_not_called() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut buffer = LogBuffer::new(CollectingSink::new());

    let counter = calls.clone();
    let token = buffer.observers().add(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(buffer.flush());
    assert!(buffer.observers().remove(token));
    assert!(buffer.flush());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_observer_can_unregister_itself() {
    let observers = FlushObservers::new();
    let token_slot = Arc::new(Mutex::new(None));

    let list = observers.clone();
    let slot = token_slot.clone();
    let token = observers.add(move |_| {
        if let Some(token) = slot.lock().take() {
            list.remove(token);
        }
    });
    *token_slot.lock() = Some(token);

    observers.notify(Duration::from_millis(1));
    assert!(observers.is_empty());
}

#[test]
fn test_clear_drops_pending() {
    let sink = CollectingSink::new();
    let lines = sink.lines.clone();
    let mut buffer = LogBuffer::new(sink);

    buffer.append("discarded");
    buffer.clear();
    assert!(buffer.flush());
    assert!(lines.lock().is_empty());
}

#[test]
fn test_file_sink_appends_lines() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("LogData.txt");
    let mut buffer = LogBuffer::new(FileSink::new(&path));

    buffer.append("alpha");
    buffer.append("beta");
    assert!(buffer.flush());
    buffer.append("gamma");
    assert!(buffer.flush());

    assert_eq!(fs::read_to_string(&path).unwrap(), "alpha\nbeta\ngamma\n");
}

#[test]
fn test_file_sink_unavailable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("LogData.txt");
    let mut sink = FileSink::new(&path);

    let err = sink.write_lines(&["x".to_string()]).unwrap_err();
    assert!(matches!(err, Error::SinkUnavailable { .. }));

    let mut buffer = LogBuffer::new(sink);
    buffer.append("kept");
    assert!(!buffer.flush());
    assert_eq!(buffer.pending(), ["kept"]);

    fs::create_dir(dir.path().join("missing")).unwrap();
    assert!(buffer.flush(), "Flush should succeed once the sink can be opened");
    assert_eq!(fs::read_to_string(&path).unwrap(), "kept\n");
}
