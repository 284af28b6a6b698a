use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A one-shot, auto-resetting signal with a bounded wait.
///
/// One thread calls [`signal`](Self::signal), another blocks in
/// [`wait`](Self::wait) until the signal arrives or the timeout expires. A
/// successful wait consumes the signal. Signals do not queue up: two calls to
/// `signal` before a `wait` still allow exactly one `wait` to succeed.
///
/// # Examples
///
/// ```
/// # use worker_logger::WaitableSignal;
/// # use std::time::Duration;
/// let signal = WaitableSignal::new();
/// signal.signal();
/// signal.signal();
/// assert!(signal.wait(Duration::from_millis(100)));
/// assert!(!signal.wait(Duration::from_millis(10)));
/// ```
#[derive(Debug, Default)]
pub struct WaitableSignal {
    is_set: Mutex<bool>,
    cv: Condvar,
}

impl WaitableSignal {
    pub fn new() -> Self {
        Self {
            is_set: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Blocks until the signal is set or `timeout` elapses.
    ///
    /// Returns `true` and clears the flag if the signal was observed. A signal
    /// that lands right at the deadline is still observed, because the flag is
    /// re-checked under the lock after the condition wait returns.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut is_set = self.is_set.lock();
        self.cv.wait_while_for(&mut is_set, |set| !*set, timeout);

        if *is_set {
            *is_set = false;
            true
        } else {
            false
        }
    }

    /// Sets the flag and wakes one waiter. Safe to call with nobody waiting;
    /// the flag stays set until a `wait` consumes it.
    pub fn signal(&self) {
        let mut is_set = self.is_set.lock();
        *is_set = true;
        self.cv.notify_one();
    }

    /// Returns whether a signal is pending, without consuming it.
    pub fn is_set(&self) -> bool {
        *self.is_set.lock()
    }
}
