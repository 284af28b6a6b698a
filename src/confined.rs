//! Worker-thread home of the [`LogBuffer`].
//!
//! The event loop installs its buffer in a thread-local slot for as long as
//! it runs. Every access, whether a dispatched message or an operation
//! invoked from the worker thread itself, borrows it through this module, so
//! the buffer stays confined to one thread without a lock. A borrow that is
//! already active (an operation or flush observer calling back into the
//! worker) is reported as [`Access::Busy`] instead of aliasing the buffer.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use crate::log_buffer::LogBuffer;

/// Identifies one worker; derived from its shared queue allocation.
pub(crate) type OwnerKey = usize;

thread_local! {
    static OWNER: Cell<Option<OwnerKey>> = const { Cell::new(None) };
    static BUFFER: RefCell<Option<LogBuffer>> = const { RefCell::new(None) };
}

/// What the current thread may do with a worker's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    /// Current thread is the worker and the buffer is free.
    Available,
    /// Current thread is the worker, but the buffer is borrowed further up
    /// the stack.
    Busy,
    /// Current thread is not this worker's thread.
    Elsewhere,
}

pub(crate) fn owner_key<T>(shared: &Arc<T>) -> OwnerKey {
    Arc::as_ptr(shared) as *const () as usize
}

/// Moves `buffer` into the current thread's slot.
pub(crate) fn install(owner: OwnerKey, buffer: LogBuffer) {
    BUFFER.with(|slot| *slot.borrow_mut() = Some(buffer));
    OWNER.with(|slot| slot.set(Some(owner)));
}

/// Takes the buffer back out of the current thread's slot.
pub(crate) fn uninstall(owner: OwnerKey) -> Option<LogBuffer> {
    if OWNER.with(Cell::get) != Some(owner) {
        return None;
    }
    OWNER.with(|slot| slot.set(None));
    BUFFER.with(|slot| slot.borrow_mut().take())
}

pub(crate) fn access(owner: OwnerKey) -> Access {
    if OWNER.with(Cell::get) != Some(owner) {
        return Access::Elsewhere;
    }
    BUFFER.with(|slot| match slot.try_borrow_mut() {
        Ok(buffer) if buffer.is_some() => Access::Available,
        Ok(_) => Access::Elsewhere,
        Err(_) => Access::Busy,
    })
}

/// Runs `f` with the buffer when [`access`] reports it available.
pub(crate) fn with_buffer<R>(owner: OwnerKey, f: impl FnOnce(&mut LogBuffer) -> R) -> Option<R> {
    if OWNER.with(Cell::get) != Some(owner) {
        return None;
    }
    BUFFER.with(|slot| {
        let mut guard = slot.try_borrow_mut().ok()?;
        let result = guard.as_mut().map(f);
        result
    })
}
