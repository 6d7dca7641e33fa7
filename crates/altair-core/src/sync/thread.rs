//! Worker threads with a start/exit handshake
//!
//! A freshly spawned worker blocks on its [`SyncPoint`] until it observes
//! [`SyncFlag::Start`] (run the routine) or [`SyncFlag::Exit`] (abort before
//! ever running). Teardown writes `Exit`, wakes the worker, and waits for the
//! worker's own acknowledgement before joining it.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{AWAIT_FOREVER, AwaitOutcome, SyncFlag, SyncPoint};

/// Errors raised by the worker-thread protocol.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ThreadError {
    #[error("Failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The worker did not acknowledge `Exit` in time. Nothing was freed.
    #[error("Thread '{name}' did not exit within {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("Thread '{0}' panicked")]
    Panicked(String),
}

/// Whether a worker starts running right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// Run as soon as the thread is up
    Immediately,
    /// Block until [`WorkerThread::start`]
    Suspended,
}

/// What a worker routine sees of its own thread.
#[derive(Debug)]
pub struct WorkerContext {
    name: String,
    sync: SyncPoint,
}

impl WorkerContext {
    fn new(name: String) -> Self {
        Self {
            name,
            sync: SyncPoint::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn sync(&self) -> &SyncPoint {
        &self.sync
    }

    /// Consume any pending signal; true if it was [`SyncFlag::Exit`].
    pub fn should_exit(&self) -> bool {
        self.sync.read_flag_and_reset() == SyncFlag::Exit
    }

    /// Sleep for up to `timeout`, returning early (true) if `Exit` arrives.
    pub fn wait_for_exit(&self, timeout: Duration) -> bool {
        self.sync
            .await_flag(|flag| flag == SyncFlag::Exit, timeout)
            .is_some()
    }

    /// Wake-back: tell the destroying thread this worker is done.
    pub fn acknowledge_exit(&self) {
        debug!("Thread '{}' acknowledging exit", self.name);
        self.sync.acknowledge();
    }

    /// Run `iteration` until `Exit` is observed, then acknowledge.
    pub fn run_until_exit<F: FnMut()>(&self, mut iteration: F) {
        while !self.should_exit() {
            iteration();
        }
        self.acknowledge_exit();
    }
}

/// Handle to a worker thread driven by a [`SyncPoint`] handshake.
#[derive(Debug)]
pub struct WorkerThread {
    context: Arc<WorkerContext>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Spawn a worker running `routine` once it is started.
    ///
    /// The routine is responsible for acknowledging `Exit` (see
    /// [`WorkerContext::run_until_exit`]); a routine that never does will
    /// make [`WorkerThread::destroy`] time out.
    pub fn spawn<F>(name: impl Into<String>, launch: Launch, routine: F) -> Result<Self, ThreadError>
    where
        F: FnOnce(&WorkerContext) + Send + 'static,
    {
        let name = name.into();
        let context = Arc::new(WorkerContext::new(name.clone()));

        let worker_context = context.clone();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || bootstrap(worker_context, routine))
            .map_err(|source| {
                error!("Could not create thread '{}': {}", name, source);
                ThreadError::Spawn {
                    name: name.clone(),
                    source,
                }
            })?;

        let thread = Self {
            context,
            handle: Some(handle),
        };

        match launch {
            Launch::Immediately => {
                thread.start();
                info!("Thread '{}' created and launched", thread.name());
            }
            Launch::Suspended => info!("Thread '{}' created", thread.name()),
        }
        Ok(thread)
    }

    pub fn name(&self) -> &str {
        self.context.name()
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.context
    }

    /// True until the thread has been joined by a successful `destroy`.
    pub fn is_alive(&self) -> bool {
        self.handle.is_some()
    }

    /// Let a suspended worker run its routine.
    ///
    /// Returns once the worker has consumed `Start`, so a `destroy` issued
    /// afterwards always reaches a running routine.
    pub fn start(&self) {
        self.context.sync.broadcast(SyncFlag::Start);
        self.context.sync.await_entered();
    }

    /// Ask the worker to exit and wait up to `timeout` for its acknowledgement.
    ///
    /// On timeout nothing is freed and the handle stays valid, so the call
    /// may be retried.
    pub fn destroy(&mut self, timeout: Duration) -> Result<(), ThreadError> {
        if self.handle.is_none() {
            return Ok(());
        }

        info!(
            "Thread '{}' requested to exit; awaiting with timeout of {:?}",
            self.name(),
            timeout
        );
        self.context.sync.broadcast(SyncFlag::Exit);

        if self.context.sync.await_acknowledged(timeout) == AwaitOutcome::TimedOut {
            warn!("Thread '{}' did not acknowledge exit", self.name());
            return Err(ThreadError::Timeout {
                name: self.name().to_string(),
                timeout,
            });
        }

        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| ThreadError::Panicked(self.name().to_string()))?;
        }
        info!("Thread '{}' returned", self.name());
        Ok(())
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            // Never block in drop; the thread is detached once the handle goes.
            debug!("Detaching thread '{}' without join", self.name());
            self.context.sync.signal(SyncFlag::Exit);
        }
    }
}

fn bootstrap<F>(context: Arc<WorkerContext>, routine: F)
where
    F: FnOnce(&WorkerContext),
{
    let deployed = context
        .sync
        .await_flag(|flag| matches!(flag, SyncFlag::Start | SyncFlag::Exit), AWAIT_FOREVER);

    if deployed != Some(SyncFlag::Start) {
        debug!("Thread '{}' aborted before running", context.name);
        context.acknowledge_exit();
        return;
    }

    context.sync.mark_entered();
    debug!("Thread '{}' deployed; entering routine", context.name);
    if catch_unwind(AssertUnwindSafe(|| routine(&context))).is_err() {
        // A dead thread cannot touch shared state any more.
        error!("Thread '{}' routine panicked", context.name);
        context.acknowledge_exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_suspended_worker_waits_for_start() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let mut worker = WorkerThread::spawn("suspended", Launch::Suspended, move |ctx| {
            flag.store(true, Ordering::SeqCst);
            ctx.run_until_exit(|| std::thread::sleep(Duration::from_millis(1)));
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(30));
        assert!(!ran.load(Ordering::SeqCst));

        worker.start();
        assert!(wait_until(Duration::from_secs(2), || ran.load(Ordering::SeqCst)));

        worker.destroy(Duration::from_secs(2)).unwrap();
        assert!(!worker.is_alive());
    }

    #[test]
    fn test_immediate_worker_runs_and_joins() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let counter = iterations.clone();
        let mut worker = WorkerThread::spawn("immediate", Launch::Immediately, move |ctx| {
            ctx.run_until_exit(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(1));
            });
        })
        .unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            iterations.load(Ordering::SeqCst) > 3
        }));
        worker.destroy(Duration::from_secs(2)).unwrap();

        let settled = iterations.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(iterations.load(Ordering::SeqCst), settled);
    }

    #[test]
    fn test_exit_before_start_aborts_routine() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let mut worker = WorkerThread::spawn("never-started", Launch::Suspended, move |_| {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

        worker.destroy(Duration::from_secs(2)).unwrap();
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_destroy_times_out_without_acknowledgement() {
        // A routine that never looks at the flag never wakes the destroyer.
        let entered = Arc::new(AtomicBool::new(false));
        let flag = entered.clone();
        let mut worker = WorkerThread::spawn("deaf", Launch::Immediately, move |_| {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
        assert!(wait_until(Duration::from_secs(2), || entered.load(Ordering::SeqCst)));

        let err = worker.destroy(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, ThreadError::Timeout { .. }));
        assert!(worker.is_alive());
    }

    #[test]
    fn test_destroy_right_after_start_still_runs_routine() {
        for _ in 0..20 {
            let ran = Arc::new(AtomicBool::new(false));
            let flag = ran.clone();
            let mut worker = WorkerThread::spawn("eager", Launch::Suspended, move |ctx| {
                flag.store(true, Ordering::SeqCst);
                ctx.run_until_exit(|| std::thread::sleep(Duration::from_millis(1)));
            })
            .unwrap();

            worker.start();
            worker.destroy(Duration::from_secs(2)).unwrap();
            assert!(ran.load(Ordering::SeqCst));
        }
    }

    #[test]
    fn test_no_op_routine_times_out_when_destroyed_immediately() {
        let mut worker = WorkerThread::spawn("no-op", Launch::Immediately, |_| {}).unwrap();

        let err = worker.destroy(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, ThreadError::Timeout { .. }));
    }

    #[test]
    fn test_destroy_is_idempotent_after_success() {
        let mut worker = WorkerThread::spawn("twice", Launch::Immediately, |ctx| {
            ctx.run_until_exit(|| std::thread::sleep(Duration::from_millis(1)));
        })
        .unwrap();

        worker.destroy(Duration::from_secs(2)).unwrap();
        worker.destroy(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_panicking_routine_still_acknowledges() {
        let mut worker = WorkerThread::spawn("panics", Launch::Immediately, |_| {
            panic!("routine failure");
        })
        .unwrap();

        worker.destroy(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_wait_for_exit_returns_early() {
        let mut worker = WorkerThread::spawn("sleeper", Launch::Immediately, |ctx| {
            while !ctx.wait_for_exit(Duration::from_secs(60)) {}
            ctx.acknowledge_exit();
        })
        .unwrap();

        let started = Instant::now();
        worker.destroy(Duration::from_secs(5)).unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
