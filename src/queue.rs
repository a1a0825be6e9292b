// Distributed under the Boost Software License, Version 1.0.
// See http://www.boost.org/LICENSE_1_0.txt

//! Cross-thread queued delivery.
//!
//! A slot connected via `SignalInstance::connect_on_thread` is never invoked
//! directly by the emitting thread. Instead the emit loop boxes up the call
//! and hands it to a [`Dispatcher`], which files it under the slot's
//! [`ThreadTarget`] for that target's owner to drain on its own schedule —
//! generalized to support more than one named destination.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{panic_message, DeadReference, EmitLoopError, PanicError};
use crate::weak_callback::{Invocable, SlotId};

/// Identifies a destination a slot can be pinned to via
/// `connect_on_thread`. Cheap to copy and share between threads; create one
/// per logical destination (typically one per worker thread or event loop)
/// with [`ThreadTarget::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadTarget(u64);

impl ThreadTarget {
    /// Allocates a fresh, globally unique target id.
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ThreadTarget(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ThreadTarget {
    fn default() -> Self {
        ThreadTarget::new()
    }
}

type Job = Box<dyn FnOnce() -> Result<(), EmitLoopError> + Send>;

/// Outcome of draining a target's queue.
#[derive(Debug, Default)]
pub struct DrainOutcome {
    /// Number of jobs run, including any that raised an error.
    pub ran: usize,
    /// Errors raised by jobs that panicked during this drain, in the order
    /// they occurred. Dead weak references are not errors: they're reaped
    /// silently, same as inline emission.
    pub errors: Vec<EmitLoopError>,
}

struct DispatcherInner {
    queues: Mutex<HashMap<ThreadTarget, VecDeque<Job>>>,
}

/// Per-target-thread FIFO queue of boxed slot invocations.
///
/// Cheap to clone: every clone shares the same underlying queues.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Creates a fresh, empty dispatcher.
    pub fn new() -> Self {
        Dispatcher {
            inner: Arc::new(DispatcherInner {
                queues: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The process-wide default dispatcher used by every signal unless it
    /// is constructed with its own.
    pub fn global() -> Self {
        static GLOBAL: std::sync::OnceLock<Dispatcher> = std::sync::OnceLock::new();
        GLOBAL.get_or_init(Dispatcher::new).clone()
    }

    pub(crate) fn enqueue<Args: Send + std::fmt::Debug + 'static>(
        &self,
        target: ThreadTarget,
        invocable: Arc<dyn Invocable<Args>>,
        args: Args,
        signal_name: String,
        slot_id: Option<SlotId>,
        depth: usize,
    ) {
        let job: Job = Box::new(move || {
            let args_debug = format!("{args:?}");
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| invocable.invoke(args))) {
                Ok(Ok(())) | Ok(Err(DeadReference)) => Ok(()),
                Err(panic_payload) => Err(EmitLoopError {
                    slot_id,
                    signal_name,
                    args_debug,
                    depth,
                    cause: Arc::new(PanicError(panic_message(panic_payload))),
                }),
            }
        });
        self.inner
            .queues
            .lock()
            .entry(target)
            .or_default()
            .push_back(job);
    }

    /// Number of jobs currently queued for `target`, not yet drained.
    pub fn pending(&self, target: ThreadTarget) -> usize {
        self.inner
            .queues
            .lock()
            .get(&target)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Runs every job currently queued for `target`, in FIFO order, on the
    /// calling thread. A job that panics is caught and reported in the
    /// returned [`DrainOutcome`] instead of unwinding into the drain caller.
    /// Jobs enqueued by a drained job itself are left for the next call.
    pub fn drain(&self, target: ThreadTarget) -> DrainOutcome {
        let jobs: Vec<Job> = {
            let mut queues = self.inner.queues.lock();
            match queues.get_mut(&target) {
                Some(queue) => queue.drain(..).collect(),
                None => Vec::new(),
            }
        };
        let n = jobs.len();
        if n > 0 {
            tracing::trace!(target = target.0, drained = n, "dispatcher drain");
        }
        let mut errors = Vec::new();
        for job in jobs {
            if let Err(err) = job() {
                errors.push(err);
            }
        }
        DrainOutcome { ran: n, errors }
    }

    /// Spawns a background thread that calls [`Dispatcher::drain`] for
    /// `target` on a fixed interval until the returned [`PumpHandle`] is
    /// stopped or dropped.
    pub fn start_pump(&self, target: ThreadTarget, interval: Duration) -> PumpHandle {
        let dispatcher = self.clone();
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let stop_thread = stop.clone();

        let handle = std::thread::Builder::new()
            .name(format!("signal-dispatch-pump-{}", target.0))
            .spawn(move || loop {
                let mut guard = stop_thread.0.lock();
                if *guard {
                    return;
                }
                stop_thread.1.wait_for(&mut guard, interval);
                let stopped = *guard;
                drop(guard);
                let outcome = dispatcher.drain(target);
                for err in outcome.errors {
                    tracing::error!(target = target.0, %err, "pumped slot panicked");
                }
                if stopped {
                    return;
                }
            })
            .expect("failed to spawn dispatcher pump thread");

        tracing::debug!(target = target.0, ?interval, "dispatcher pump started");

        PumpHandle {
            stop,
            handle: Some(handle),
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher::new()
    }
}

/// Handle to a background pump thread started by
/// [`Dispatcher::start_pump`]. Dropping it stops the pump and joins the
/// thread.
pub struct PumpHandle {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl PumpHandle {
    /// Signals the pump to stop and blocks until its thread has exited.
    pub fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        *self.stop.0.lock() = true;
        self.stop.1.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PumpHandle {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop_inner();
        }
    }
}
