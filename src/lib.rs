//! # Worker Logger
//!
//! A logging subsystem that runs on its own thread and serializes every
//! mutation of its state through a single FIFO message queue:
//!
//! * **No locks on the hot state**: the log buffer is owned by one thread and
//!   only ever touched by it
//! * **Strict ordering**: writes, timer ticks and cross-thread calls are
//!   processed in the order they were queued, whichever thread queued them
//! * **Bounded waits**: other threads can run operations on the worker thread
//!   and wait for the result with a timeout
//!
//! ## Main Components
//!
//! * `Worker`: owns the event loop thread, the periodic flush timer and the
//!   log buffer
//! * `CrossThreadInvoker`: runs closures on the worker thread, fire-and-forget
//!   or with a bounded wait for a typed result
//! * `LogBuffer`: pending log lines plus the sink they are flushed to
//! * `BoundedQueue`: the blocking FIFO the worker drains
//! * `WaitableSignal`: one-shot signal with a timed wait, for synchronising on
//!   asynchronous callbacks
//!
//! ## Quick Start
//!
//! ```no_run
//! use worker_logger::{Status, WaitableSignal, Worker, WorkerConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let worker = Worker::spawn(WorkerConfig::default().with_log_path("app.log")).unwrap();
//!
//! // Status callbacks run on the worker thread
//! let flushed = Arc::new(WaitableSignal::new());
//! let signal = flushed.clone();
//! worker.set_status_callback(move |status| {
//!     if status == Status::FlushSuccess {
//!         signal.signal();
//!     }
//! });
//!
//! worker.write("Hello, world!").unwrap();
//! assert!(flushed.wait(Duration::from_secs(2)));
//!
//! // Run an operation on the worker thread and wait for the result
//! let pending = worker.invoke(|buffer| buffer.len(), Duration::from_millis(100));
//! assert_eq!(pending, Some(0));
//!
//! worker.shutdown();
//! ```

pub mod bounded_queue;
pub mod config;
mod confined;
pub mod error;
pub mod invoker;
pub mod log_buffer;
pub mod message;
pub mod signal;
pub mod worker;

pub use bounded_queue::BoundedQueue;
pub use config::WorkerConfig;
pub use error::{Error, Result};
pub use invoker::CrossThreadInvoker;
pub use log_buffer::{FileSink, FlushObservers, LogBuffer, LogSink, ObserverToken};
pub use message::{Invocation, Message, Status};
pub use signal::WaitableSignal;
pub use worker::{Worker, WorkerState};
