use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, trace, warn};

use crate::bounded_queue::BoundedQueue;
use crate::confined::{self, Access};
use crate::error::Result;
use crate::log_buffer::LogBuffer;
use crate::message::{Invocation, Message};

/// Write side of a one-shot result slot. Consumed by the single write.
struct ResultSlot<R> {
    tx: Sender<R>,
}

/// Read side of a one-shot result slot.
struct ResultWaiter<R> {
    rx: Receiver<R>,
}

fn result_slot<R>() -> (ResultSlot<R>, ResultWaiter<R>) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (ResultSlot { tx }, ResultWaiter { rx })
}

impl<R> ResultSlot<R> {
    fn fulfil(self, value: R) {
        // The caller may have timed out and dropped its waiter.
        if self.tx.send(value).is_err() {
            trace!("invocation result discarded, caller stopped waiting");
        }
    }
}

impl<R> ResultWaiter<R> {
    fn wait(self, timeout: Duration) -> Option<R> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Some(value),
            Err(RecvTimeoutError::Timeout) => None,
            // Slot dropped unfulfilled: the worker stopped or the operation
            // panicked.
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Queues `message`. On the worker thread itself a full queue is an error
/// instead of a wait, since nothing else drains it.
pub(crate) fn submit(queue: &Arc<BoundedQueue<Message>>, message: Message) -> Result<()> {
    match confined::access(confined::owner_key(queue)) {
        Access::Elsewhere => queue.push(message),
        Access::Available | Access::Busy => queue.try_push(message),
    }
}

/// Runs operations on a worker thread on behalf of other threads.
///
/// Each operation receives the worker's [`LogBuffer`] and runs in queue
/// order with every other message, so an invocation never overtakes a write
/// or timer tick queued before it.
///
/// Timing out only abandons the wait. An operation that was already queued
/// still runs to completion on the worker thread; its result is dropped.
///
/// Called on the worker thread itself, for instance from a status callback,
/// [`invoke`](Self::invoke) runs the operation in place. Inside another
/// operation or a flush observer the buffer is already borrowed: the
/// operation is then queued behind the current message and `invoke` returns
/// `None` at once.
///
/// Obtained from [`Worker::invoker`](crate::Worker::invoker). Cheap to clone
/// and usable from any thread.
///
/// # Examples
///
/// ```no_run
/// # use worker_logger::{Worker, WorkerConfig};
/// # use std::time::Duration;
/// let worker = Worker::spawn(WorkerConfig::default()).unwrap();
/// let invoker = worker.invoker();
///
/// let pending = invoker.invoke(|buffer| buffer.len(), Duration::from_millis(100));
/// assert_eq!(pending, Some(0));
/// ```
#[derive(Debug, Clone)]
pub struct CrossThreadInvoker {
    queue: Arc<BoundedQueue<Message>>,
}

impl CrossThreadInvoker {
    pub(crate) fn new(queue: Arc<BoundedQueue<Message>>) -> Self {
        Self { queue }
    }

    /// Queues `operation` and waits up to `timeout` for its result.
    ///
    /// Returns `None` if the wait timed out, if the worker is shutting down
    /// or if the operation panicked. With a bounded queue the push itself may
    /// wait for room before the timeout starts counting.
    pub fn invoke<F, R>(&self, operation: F, timeout: Duration) -> Option<R>
    where
        F: FnOnce(&mut LogBuffer) -> R + Send + 'static,
        R: Send + 'static,
    {
        let owner = confined::owner_key(&self.queue);
        match confined::access(owner) {
            Access::Elsewhere => {}
            Access::Available => return run_in_place(owner, operation),
            Access::Busy => {
                debug!("buffer in use on the worker thread, invocation queued without waiting");
                let job = Invocation::new(move |buffer: &mut LogBuffer| {
                    operation(buffer);
                });
                if let Err(err) = self.queue.try_push(Message::Invoke(job)) {
                    warn!(error = %err, "nested invocation rejected");
                }
                return None;
            }
        }

        let (slot, waiter) = result_slot();
        let invocation =
            Invocation::new(move |buffer: &mut LogBuffer| slot.fulfil(operation(buffer)));

        if let Err(err) = self.queue.push(Message::Invoke(invocation)) {
            warn!(error = %err, "invocation rejected");
            return None;
        }

        let result = waiter.wait(timeout);
        if result.is_none() {
            trace!(timeout_ms = timeout.as_millis() as u64, "invocation produced no result");
        }
        result
    }

    /// Queues `operation` without waiting for it to run.
    pub fn invoke_fire_and_forget<F>(&self, operation: F) -> Result<()>
    where
        F: FnOnce(&mut LogBuffer) + Send + 'static,
    {
        submit(&self.queue, Message::Invoke(Invocation::new(operation)))
    }
}

fn run_in_place<F, R>(owner: confined::OwnerKey, operation: F) -> Option<R>
where
    F: FnOnce(&mut LogBuffer) -> R,
{
    match panic::catch_unwind(AssertUnwindSafe(|| confined::with_buffer(owner, operation))) {
        Ok(result) => result,
        Err(_) => {
            error!("in-place invocation panicked");
            None
        }
    }
}
