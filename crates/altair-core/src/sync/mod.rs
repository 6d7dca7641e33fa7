//! Thread synchronization primitive
//!
//! A [`SyncPoint`] pairs a mutex with a condition variable and a one-slot
//! [`SyncFlag`]. It hands a signal (start, exit) across a thread boundary:
//! the flag is consumed exactly once, and every check-and-wait happens while
//! the lock is held so a signal sent between the check and the wait is never
//! lost.
//!
//! [`WorkerThread`] builds the start/stop protocol for background threads on
//! top of it.

mod thread;

pub use thread::{Launch, ThreadError, WorkerContext, WorkerThread};

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// Timeout value meaning "wait indefinitely".
pub const AWAIT_FOREVER: Duration = Duration::MAX;

/// One-slot signal stored alongside a [`SyncPoint`]'s mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncFlag {
    /// No pending signal
    #[default]
    Unset,
    /// Deploy: start running
    Start,
    /// Stop running and acknowledge
    Exit,
}

/// Result of waiting on the condition variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitOutcome {
    Woken,
    TimedOut,
}

impl AwaitOutcome {
    pub fn timed_out(self) -> bool {
        self == AwaitOutcome::TimedOut
    }
}

#[derive(Debug, Default)]
struct SyncState {
    flag: SyncFlag,
    /// Set once a worker has consumed `Start` and entered its routine.
    entered: bool,
    /// Wake-back from a worker that has observed `Exit` and is terminating.
    acknowledged: bool,
}

/// Mutex + condition variable + sync flag.
#[derive(Debug, Default)]
pub struct SyncPoint {
    state: Mutex<SyncState>,
    condition: Condvar,
}

/// Scoped lock on a [`SyncPoint`]; released on drop.
pub struct SyncGuard<'a> {
    point: &'a SyncPoint,
    state: MutexGuard<'a, SyncState>,
}

impl SyncGuard<'_> {
    /// Current flag, without consuming it.
    pub fn flag(&self) -> SyncFlag {
        self.state.flag
    }

    pub fn set_flag(&mut self, flag: SyncFlag) {
        self.state.flag = flag;
    }

    /// Read the flag and reset it to [`SyncFlag::Unset`].
    pub fn take_flag(&mut self) -> SyncFlag {
        std::mem::take(&mut self.state.flag)
    }

    /// Release the lock, block until woken or `timeout` elapses, reacquire.
    ///
    /// Wakeups may be spurious: callers re-check their condition afterwards.
    pub fn await_condition(&mut self, timeout: Duration) -> AwaitOutcome {
        wait(&self.point.condition, &mut self.state, deadline_after(timeout))
    }
}

fn deadline_after(timeout: Duration) -> Option<Instant> {
    if timeout == AWAIT_FOREVER {
        return None;
    }
    Instant::now().checked_add(timeout)
}

fn wait(
    condition: &Condvar,
    state: &mut MutexGuard<'_, SyncState>,
    deadline: Option<Instant>,
) -> AwaitOutcome {
    match deadline {
        None => {
            condition.wait(state);
            AwaitOutcome::Woken
        }
        Some(deadline) => {
            if condition.wait_until(state, deadline).timed_out() {
                AwaitOutcome::TimedOut
            } else {
                AwaitOutcome::Woken
            }
        }
    }
}

impl SyncPoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a scoped critical section.
    pub fn lock(&self) -> SyncGuard<'_> {
        SyncGuard {
            point: self,
            state: self.state.lock(),
        }
    }

    /// Atomically read the flag and reset it to [`SyncFlag::Unset`].
    pub fn read_flag_and_reset(&self) -> SyncFlag {
        self.lock().take_flag()
    }

    /// Set the flag under the lock.
    pub fn write_flag(&self, flag: SyncFlag) {
        self.lock().set_flag(flag);
    }

    /// Wake exactly one waiter.
    pub fn wake_condition(&self) {
        self.condition.notify_one();
    }

    /// Write the flag, then wake one waiter.
    pub fn signal(&self, flag: SyncFlag) {
        self.write_flag(flag);
        self.wake_condition();
    }

    /// Block until the flag satisfies `accept`, consuming it.
    ///
    /// Returns `None` if `timeout` elapses first. The check and the wait are
    /// performed under one continuously held lock.
    pub fn await_flag<F>(&self, accept: F, timeout: Duration) -> Option<SyncFlag>
    where
        F: Fn(SyncFlag) -> bool,
    {
        let deadline = deadline_after(timeout);
        let mut guard = self.lock();

        loop {
            if accept(guard.flag()) {
                return Some(guard.take_flag());
            }
            if wait(&self.condition, &mut guard.state, deadline).timed_out() {
                return accept(guard.flag()).then(|| guard.take_flag());
            }
        }
    }

    /// Write the flag, then wake every waiter.
    pub(crate) fn broadcast(&self, flag: SyncFlag) {
        self.write_flag(flag);
        self.condition.notify_all();
    }

    /// Record that a worker consumed `Start` and wake every waiter.
    pub(crate) fn mark_entered(&self) {
        self.lock().state.entered = true;
        self.condition.notify_all();
    }

    /// Block until a worker has entered its routine or has already
    /// acknowledged exit without running it.
    pub(crate) fn await_entered(&self) {
        let mut guard = self.lock();
        while !guard.state.entered && !guard.state.acknowledged {
            wait(&self.condition, &mut guard.state, None);
        }
    }

    /// Record the wake-back of a terminating worker and wake every waiter.
    pub(crate) fn acknowledge(&self) {
        self.lock().state.acknowledged = true;
        self.condition.notify_all();
    }

    pub(crate) fn is_acknowledged(&self) -> bool {
        self.lock().state.acknowledged
    }

    /// Block until a worker acknowledges, or `timeout` elapses.
    pub(crate) fn await_acknowledged(&self, timeout: Duration) -> AwaitOutcome {
        let deadline = deadline_after(timeout);
        let mut guard = self.lock();

        while !guard.state.acknowledged {
            if wait(&self.condition, &mut guard.state, deadline).timed_out() {
                return if guard.state.acknowledged {
                    AwaitOutcome::Woken
                } else {
                    AwaitOutcome::TimedOut
                };
            }
        }
        AwaitOutcome::Woken
    }
}
