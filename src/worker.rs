use std::any::Any;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace, warn};

use crate::bounded_queue::BoundedQueue;
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::confined::{self, OwnerKey};
use crate::invoker::{self, CrossThreadInvoker};
use crate::log_buffer::{FileSink, FlushObservers, LogBuffer, LogSink};
use crate::message::{Message, Status};
use crate::signal::WaitableSignal;

/// Shortest timer period; a zero interval would spin the timer thread.
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// Lifecycle of a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Built, thread not spawned yet. Writes are queued.
    Created,
    /// Event loop and timer threads are running.
    Running,
    /// Shutdown message queued, threads not joined yet.
    ShuttingDown,
    /// Both threads joined, or the worker was shut down before starting.
    Stopped,
}

type StatusCallback = Arc<dyn Fn(Status) + Send + Sync>;

/// The single registered status callback, shared with the worker thread.
#[derive(Clone, Default)]
struct StatusSlot {
    callback: Arc<Mutex<Option<StatusCallback>>>,
}

impl StatusSlot {
    fn set(&self, callback: StatusCallback) {
        *self.callback.lock() = Some(callback);
    }

    fn clear(&self) {
        *self.callback.lock() = None;
    }

    fn notify(&self, status: Status) {
        // Clone out so the callback may re-register without deadlocking.
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(status);
        }
    }
}

/// Logging subsystem running on its own thread.
///
/// All access to the [`LogBuffer`] happens on one dedicated thread that
/// drains a FIFO queue. Other threads only enqueue messages: lines through
/// [`write`](Self::write), arbitrary operations through
/// [`invoker`](Self::invoker). A second thread pushes a flush tick every
/// [`flush_interval`](WorkerConfig::flush_interval).
///
/// After each write and flush the registered status callback is called on the
/// worker thread with a [`Status`].
///
/// # Shutdown
///
/// [`shutdown`](Self::shutdown) appends a final shutdown message and closes
/// the queue in one step, so every message accepted before it is processed
/// and every later submission is rejected with [`Error::QueueClosed`]. Lines
/// still buffered when the loop stops are lost unless
/// [`flush_on_shutdown`](WorkerConfig::flush_on_shutdown) is set. Dropping the
/// worker shuts it down.
///
/// # Examples
///
/// ```no_run
/// # use worker_logger::{Worker, WorkerConfig};
/// let worker = Worker::spawn(WorkerConfig::default()).unwrap();
/// worker.set_status_callback(|status| println!("{status}"));
/// worker.write("Hello, world!").unwrap();
/// worker.shutdown();
/// ```
pub struct Worker {
    config: WorkerConfig,
    queue: Arc<BoundedQueue<Message>>,
    status: StatusSlot,
    observers: FlushObservers,
    state: Mutex<WorkerState>,
    stopped: Condvar,
    buffer: Mutex<Option<LogBuffer>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    worker_id: Mutex<Option<ThreadId>>,
}

impl Worker {
    /// Creates a worker that flushes to a [`FileSink`] at
    /// [`log_path`](WorkerConfig::log_path). The thread is not started.
    pub fn new(config: WorkerConfig) -> Self {
        let sink = FileSink::new(config.log_path.clone());
        Self::with_sink(config, sink)
    }

    /// Creates a worker that flushes to `sink`. The thread is not started.
    ///
    /// A [`queue_capacity`](WorkerConfig::queue_capacity) of zero is raised
    /// to one.
    pub fn with_sink(config: WorkerConfig, sink: impl LogSink + 'static) -> Self {
        let queue = match config.queue_capacity {
            Some(capacity) => BoundedQueue::with_capacity(capacity.max(1)),
            None => BoundedQueue::unbounded(),
        };
        let observers = FlushObservers::new();
        let buffer = LogBuffer::with_observers(sink, observers.clone());

        Self {
            config,
            queue: Arc::new(queue),
            status: StatusSlot::default(),
            observers,
            state: Mutex::new(WorkerState::Created),
            stopped: Condvar::new(),
            buffer: Mutex::new(Some(buffer)),
            thread: Mutex::new(None),
            worker_id: Mutex::new(None),
        }
    }

    /// Creates a worker with a file sink and starts it.
    pub fn spawn(config: WorkerConfig) -> Result<Self> {
        let worker = Self::new(config);
        worker.start()?;
        Ok(worker)
    }

    /// Spawns the timer and event loop threads.
    ///
    /// Fails with [`Error::AlreadyStarted`] unless the worker is `Created`,
    /// and with [`Error::Spawn`] if either thread cannot be created. A failed
    /// timer leaves the worker `Created`; a failed event loop stops it.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != WorkerState::Created {
            return Err(Error::AlreadyStarted);
        }
        let mut parked = self.buffer.lock();
        let Some(buffer) = parked.take() else {
            return Err(Error::AlreadyStarted);
        };

        let flush_interval = self.config.flush_interval.max(MIN_FLUSH_INTERVAL);
        let timer = match FlushTimer::spawn(&self.config.name, self.queue.clone(), flush_interval) {
            Ok(timer) => timer,
            Err(err) => {
                *parked = Some(buffer);
                error!(worker = %self.config.name, error = %err, "failed to spawn flush timer");
                return Err(err);
            }
        };
        let stop_timer = timer.stop.clone();

        let event_loop = EventLoop {
            name: self.config.name.clone(),
            owner: confined::owner_key(&self.queue),
            queue: self.queue.clone(),
            status: self.status.clone(),
            flush_on_shutdown: self.config.flush_on_shutdown,
        };
        let spawned = thread::Builder::new()
            .name(self.config.name.clone())
            .spawn(move || event_loop.run(buffer, timer));

        match spawned {
            Ok(handle) => {
                *self.worker_id.lock() = Some(handle.thread().id());
                *self.thread.lock() = Some(handle);
                *state = WorkerState::Running;
                info!(worker = %self.config.name, "worker started");
                Ok(())
            }
            Err(err) => {
                self.queue.close();
                stop_timer.signal();
                *state = WorkerState::Stopped;
                error!(worker = %self.config.name, error = %err, "failed to spawn worker thread");
                Err(Error::Spawn(err))
            }
        }
    }

    /// Queues `line` for the log buffer. Thread-safe and non-blocking unless
    /// a bounded queue is full. From the worker thread a full queue fails
    /// with [`Error::QueueFull`].
    pub fn write(&self, line: impl Into<String>) -> Result<()> {
        match invoker::submit(&self.queue, Message::WriteLine(line.into())) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(worker = %self.config.name, error = %err, "write rejected");
                Err(err)
            }
        }
    }

    /// Runs `operation` on the worker thread and waits up to `timeout` for
    /// its result. See [`CrossThreadInvoker::invoke`].
    pub fn invoke<F, R>(&self, operation: F, timeout: Duration) -> Option<R>
    where
        F: FnOnce(&mut LogBuffer) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.invoker().invoke(operation, timeout)
    }

    /// Returns a handle for running operations on the worker thread.
    pub fn invoker(&self) -> CrossThreadInvoker {
        CrossThreadInvoker::new(self.queue.clone())
    }

    /// Registers the status callback, replacing any previous one.
    ///
    /// The callback runs synchronously on the worker thread and must not
    /// block.
    pub fn set_status_callback<F>(&self, callback: F)
    where
        F: Fn(Status) + Send + Sync + 'static,
    {
        self.status.set(Arc::new(callback));
    }

    pub fn clear_status_callback(&self) {
        self.status.clear();
    }

    /// Observers called with the elapsed time of every successful flush.
    pub fn flush_observers(&self) -> &FlushObservers {
        &self.observers
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Messages waiting in the queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Effective queue bound, `None` when unbounded.
    pub fn queue_capacity(&self) -> Option<usize> {
        self.queue.capacity()
    }

    /// Id of the event loop thread, while it has not been joined.
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.thread.lock().as_ref().map(|handle| handle.thread().id())
    }

    /// Returns `true` when called from the event loop thread.
    pub fn is_worker_thread(&self) -> bool {
        *self.worker_id.lock() == Some(thread::current().id())
    }

    /// Stops the worker and joins its threads. Idempotent.
    ///
    /// Messages queued before this call are still processed. Every caller
    /// off the worker thread returns only once the worker is `Stopped`, even
    /// when another thread is already joining it. Called from the worker
    /// thread itself (from a callback or an invoked operation) it only queues
    /// the shutdown; the join happens on the next call from another thread or
    /// on drop.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                WorkerState::Created => {
                    self.queue.close();
                    *state = WorkerState::Stopped;
                    debug!(worker = %self.config.name, "worker stopped before start");
                    return;
                }
                WorkerState::Running => {
                    *state = WorkerState::ShuttingDown;
                    if let Err(err) = self.queue.close_with(Message::Shutdown) {
                        debug!(worker = %self.config.name, error = %err, "queue already closed");
                    }
                    info!(worker = %self.config.name, "worker shutting down");
                }
                WorkerState::ShuttingDown | WorkerState::Stopped => {}
            }
        }

        if self.is_worker_thread() {
            warn!(
                worker = %self.config.name,
                "shutdown called on the worker thread, join deferred"
            );
            return;
        }

        let handle = self.thread.lock().take();
        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    error!(worker = %self.config.name, "worker thread panicked");
                }
                *self.state.lock() = WorkerState::Stopped;
                self.stopped.notify_all();
                info!(worker = %self.config.name, "worker stopped");
            }
            None => {
                // Another caller holds the handle and is joining.
                let mut state = self.state.lock();
                self.stopped.wait_while(&mut state, |state| *state == WorkerState::ShuttingDown);
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("queued", &self.queued())
            .finish()
    }
}

/// Everything the event loop thread owns besides the buffer.
struct EventLoop {
    name: String,
    owner: OwnerKey,
    queue: Arc<BoundedQueue<Message>>,
    status: StatusSlot,
    flush_on_shutdown: bool,
}

impl EventLoop {
    fn run(self, buffer: LogBuffer, timer: FlushTimer) {
        debug!(worker = %self.name, "event loop started");
        confined::install(self.owner, buffer);

        while let Some(message) = self.queue.pop_blocking() {
            trace!(worker = %self.name, kind = message.kind(), "dispatch");
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(message)));
            match outcome {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => break,
                Err(payload) => {
                    error!(
                        worker = %self.name,
                        panic = panic_message(&*payload),
                        "message handler panicked"
                    );
                }
            }
        }

        timer.stop();

        let Some(mut buffer) = confined::uninstall(self.owner) else {
            return;
        };
        if self.flush_on_shutdown && !buffer.is_empty() {
            buffer.flush();
        }
        if !buffer.is_empty() {
            debug!(worker = %self.name, pending = buffer.len(), "unflushed lines dropped");
        }
        debug!(worker = %self.name, "event loop finished");
    }

    // Status callbacks run after the buffer borrow ends, so they may invoke
    // operations in place.
    fn dispatch(&self, message: Message) -> ControlFlow<()> {
        match message {
            Message::WriteLine(line) => {
                let appended = confined::with_buffer(self.owner, |buffer| buffer.append(line));
                if appended == Some(true) {
                    self.status.notify(Status::WriteSuccess);
                }
            }
            Message::TimerTick => {
                let status = match confined::with_buffer(self.owner, LogBuffer::flush) {
                    Some(true) => Status::FlushSuccess,
                    _ => Status::FlushFailure,
                };
                self.status.notify(status);
            }
            Message::Invoke(invocation) => {
                confined::with_buffer(self.owner, |buffer| invocation.run(buffer));
            }
            Message::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }
}

/// Thread that injects [`Message::TimerTick`] into the queue periodically.
///
/// It never touches the buffer. The interval wait is a wait on a stop signal,
/// so stopping does not have to sit out a full interval.
struct FlushTimer {
    stop: Arc<WaitableSignal>,
    handle: JoinHandle<()>,
}

impl FlushTimer {
    fn spawn(name: &str, queue: Arc<BoundedQueue<Message>>, interval: Duration) -> Result<Self> {
        let stop = Arc::new(WaitableSignal::new());
        let stop_requested = stop.clone();

        let handle = thread::Builder::new()
            .name(format!("{name}-timer"))
            .spawn(move || {
                while !stop_requested.wait(interval) {
                    match queue.try_push(Message::TimerTick) {
                        Ok(()) => {}
                        Err(Error::QueueFull) => debug!("queue full, timer tick skipped"),
                        Err(_) => break,
                    }
                }
            })
            .map_err(Error::Spawn)?;

        Ok(Self { stop, handle })
    }

    fn stop(self) {
        self.stop.signal();
        if self.handle.join().is_err() {
            error!("flush timer thread panicked");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
