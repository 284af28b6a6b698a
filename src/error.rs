use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the worker, its queue and its log sink.
///
/// Failures that happen while the worker thread processes a message never
/// reach the submitting thread as an `Error`; they are reported through
/// [`Status`](crate::Status) notifications instead. The variants below cover
/// the calling convention itself and the sink.
#[derive(Debug, Error)]
pub enum Error {
    /// A bounded queue is at capacity and the caller asked not to block.
    #[error("queue is full")]
    QueueFull,

    /// The queue was closed, usually because the worker is shutting down.
    #[error("queue is closed")]
    QueueClosed,

    /// The log sink could not be opened for append.
    #[error("log sink {} could not be opened: {source}", path.display())]
    SinkUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The sink was opened but writing the pending lines failed.
    #[error("log sink write failed: {0}")]
    SinkWrite(#[source] io::Error),

    /// The OS refused to create a worker or timer thread.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] io::Error),

    /// `start` was called on a worker that already left the `Created` state.
    #[error("worker already started")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, Error>;
