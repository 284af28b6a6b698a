use std::fmt;

use crate::log_buffer::LogBuffer;

/// Unit of work carried by the worker queue.
///
/// Queue position is the only ordering: there is no priority between kinds.
pub enum Message {
    /// Append a line to the log buffer.
    WriteLine(String),
    /// Periodic flush request injected by the timer thread.
    TimerTick,
    /// Run an operation on the worker thread.
    Invoke(Invocation),
    /// Stop the event loop. Always the last message a queue receives.
    Shutdown,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::WriteLine(_) => "write_line",
            Message::TimerTick => "timer_tick",
            Message::Invoke(_) => "invoke",
            Message::Shutdown => "shutdown",
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::WriteLine(line) => f.debug_tuple("WriteLine").field(line).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// A type-erased operation bound for the worker thread.
///
/// The typed result slot, if any, is captured inside the job; see
/// [`CrossThreadInvoker`](crate::CrossThreadInvoker).
pub struct Invocation {
    job: Box<dyn FnOnce(&mut LogBuffer) + Send>,
}

impl Invocation {
    pub fn new<F>(job: F) -> Self
    where
        F: FnOnce(&mut LogBuffer) + Send + 'static,
    {
        Self { job: Box::new(job) }
    }

    /// Runs the job against the worker-owned buffer.
    pub(crate) fn run(self, buffer: &mut LogBuffer) {
        (self.job)(buffer)
    }
}

/// Outcome reported to the status callback after each write or flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    WriteSuccess,
    FlushSuccess,
    FlushFailure,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::WriteSuccess => "Write success!",
            Status::FlushSuccess => "Flush success!",
            Status::FlushFailure => "Flush failure!",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
