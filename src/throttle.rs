// Distributed under the Boost Software License, Version 1.0.
// See http://www.boost.org/LICENSE_1_0.txt

//! Rate-limiting wrappers around a plain callback.
//!
//! [`Throttler`] and [`Debouncer`] both delay calls to an inner function
//! according to a fixed interval, differing only in when they fire:
//! a throttler fires on a fixed cadence no matter how often it's called, a
//! debouncer fires only once calls stop arriving. Neither is expressible
//! with `std::thread::sleep` alone without blocking the calling thread, and
//! the standard library has no cancellable timer the way the originating
//! design's `threading.Timer` is, so both are backed by one dedicated
//! worker thread parked on a `parking_lot::Condvar`, woken on every call and
//! on drop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::signal::SignalInstance;
use crate::signal_core::SignalArgs;

#[derive(Clone, Copy, PartialEq, Eq)]
enum EdgePolicy {
    Leading,
    Trailing,
    Both,
}

struct State<Args> {
    last_run: Option<Instant>,
    pending: Option<Args>,
    deadline: Option<Instant>,
    stopped: bool,
    /// A panic payload caught from a previous invocation of the wrapped
    /// function, waiting to be re-raised on the next `call`/`flush` from the
    /// owning thread.
    poisoned: Option<Box<dyn Any + Send>>,
}

/// Resumes a panic caught from a previous invocation, if one is waiting.
/// Must be called with `state` freshly locked and before any other work;
/// unwinding drops `state` (releasing the lock) on its way out.
fn resume_if_poisoned<Args>(state: &mut parking_lot::MutexGuard<'_, State<Args>>) {
    if let Some(payload) = state.poisoned.take() {
        panic::resume_unwind(payload);
    }
}

/// Invokes the wrapped function, catching a panic instead of letting it
/// unwind past this call. On success, fires `triggered`. On panic, stores
/// the payload so the next `call`/`flush` re-raises it instead of silently
/// continuing as if nothing happened.
fn invoke_guarded<Args: SignalArgs>(shared: &Shared<Args>, args: Args) {
    match panic::catch_unwind(AssertUnwindSafe(|| (shared.f)(args.clone()))) {
        Ok(()) => {
            let _ = shared.triggered.emit(args);
        }
        Err(payload) => {
            shared.state.lock().poisoned = Some(payload);
        }
    }
}

struct Shared<Args: SignalArgs> {
    interval: Duration,
    policy: EdgePolicy,
    f: Arc<dyn Fn(Args) + Send + Sync>,
    state: Mutex<State<Args>>,
    cv: Condvar,
    triggered: SignalInstance<Args>,
}

fn spawn_worker<Args: SignalArgs>(shared: Arc<Shared<Args>>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || loop {
        let mut state = shared.state.lock();
        loop {
            if state.stopped {
                return;
            }
            match state.deadline {
                None => shared.cv.wait(&mut state),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    shared.cv.wait_for(&mut state, deadline - now);
                }
            }
        }
        if state.stopped {
            return;
        }
        state.deadline = None;
        let fired = state.pending.take();
        if let Some(args) = fired {
            state.last_run = Some(Instant::now());
            drop(state);
            invoke_guarded(&shared, args);
        }
    })
}

/// Limits an inner callback to running at most once per `interval`, no
/// matter how often [`Throttler::call`] is invoked.
///
/// The default policy fires on the *leading* edge: the first call in a
/// quiet period runs immediately; further calls within the same interval
/// are dropped unless [`Throttler::with_trailing`] is used, in which case
/// the most recent call's arguments also run once at the end of the
/// interval.
pub struct Throttler<Args: SignalArgs> {
    shared: Arc<Shared<Args>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl<Args: SignalArgs> Throttler<Args> {
    /// A leading-edge throttler: the first call per interval runs
    /// immediately, later calls within the same interval are dropped.
    pub fn new(interval: Duration, f: impl Fn(Args) + Send + Sync + 'static) -> Self {
        Self::with_policy(interval, EdgePolicy::Leading, f)
    }

    /// A throttler that runs both on the leading edge and, if further calls
    /// arrived during the interval, once more on the trailing edge with the
    /// most recent arguments.
    pub fn with_trailing(interval: Duration, f: impl Fn(Args) + Send + Sync + 'static) -> Self {
        Self::with_policy(interval, EdgePolicy::Both, f)
    }

    fn with_policy(
        interval: Duration,
        policy: EdgePolicy,
        f: impl Fn(Args) + Send + Sync + 'static,
    ) -> Self {
        let shared = Arc::new(Shared {
            interval,
            policy,
            f: Arc::new(f),
            state: Mutex::new(State {
                last_run: None,
                pending: None,
                deadline: None,
                stopped: false,
                poisoned: None,
            }),
            cv: Condvar::new(),
            triggered: SignalInstance::new("triggered"),
        });
        let worker = spawn_worker(shared.clone());
        Throttler {
            shared,
            worker: Some(worker),
        }
    }

    /// Submits a call. Runs immediately on the calling thread if this is
    /// the first call since the last interval elapsed; otherwise schedules
    /// (or replaces a not-yet-fired) trailing call on the worker thread.
    pub fn call(&self, args: Args) {
        let mut state = self.shared.state.lock();
        resume_if_poisoned(&mut state);
        if state.stopped {
            return;
        }

        let now = Instant::now();
        let cold = state
            .last_run
            .map_or(true, |last| now.duration_since(last) >= self.shared.interval);

        if cold {
            state.last_run = Some(now);
            state.pending = None;
            state.deadline = None;
            drop(state);
            invoke_guarded(&self.shared, args);
            return;
        }

        if matches!(self.shared.policy, EdgePolicy::Trailing | EdgePolicy::Both) {
            let deadline = state
                .last_run
                .map(|last| last + self.shared.interval)
                .filter(|d| *d > now)
                .unwrap_or(now + self.shared.interval);
            state.pending = Some(args);
            state.deadline = Some(deadline);
            drop(state);
            self.shared.cv.notify_all();
        }
    }

    /// Cancels any scheduled trailing call without running it.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        state.pending = None;
        state.deadline = None;
        self.shared.cv.notify_all();
    }

    /// Runs any scheduled trailing call immediately, on the calling thread.
    pub fn flush(&self) {
        let mut state = self.shared.state.lock();
        resume_if_poisoned(&mut state);
        if let Some(args) = state.pending.take() {
            state.last_run = Some(Instant::now());
            state.deadline = None;
            drop(state);
            invoke_guarded(&self.shared, args);
        }
    }

    /// Fires once every time the inner callback actually runs, carrying
    /// the same arguments.
    pub fn triggered(&self) -> &SignalInstance<Args> {
        &self.shared.triggered
    }
}

impl<Args: SignalArgs> Drop for Throttler<Args> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.stopped = true;
        }
        self.shared.cv.notify_all();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

/// Delays an inner callback until calls stop arriving for `interval`.
///
/// The default policy fires on the *trailing* edge: every call resets the
/// timer, and the callback runs once, with the most recent arguments, once
/// `interval` has passed with no further calls.
pub struct Debouncer<Args: SignalArgs> {
    shared: Arc<Shared<Args>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl<Args: SignalArgs> Debouncer<Args> {
    /// A trailing-edge debouncer.
    pub fn new(interval: Duration, f: impl Fn(Args) + Send + Sync + 'static) -> Self {
        Self::with_policy(interval, EdgePolicy::Trailing, f)
    }

    /// A debouncer that also runs immediately on the first call of a new
    /// burst (the leading edge), in addition to the trailing call.
    pub fn with_leading(interval: Duration, f: impl Fn(Args) + Send + Sync + 'static) -> Self {
        Self::with_policy(interval, EdgePolicy::Both, f)
    }

    fn with_policy(
        interval: Duration,
        policy: EdgePolicy,
        f: impl Fn(Args) + Send + Sync + 'static,
    ) -> Self {
        let shared = Arc::new(Shared {
            interval,
            policy,
            f: Arc::new(f),
            state: Mutex::new(State {
                last_run: None,
                pending: None,
                deadline: None,
                stopped: false,
                poisoned: None,
            }),
            cv: Condvar::new(),
            triggered: SignalInstance::new("triggered"),
        });
        let worker = spawn_worker(shared.clone());
        Debouncer {
            shared,
            worker: Some(worker),
        }
    }

    /// Submits a call, resetting the quiet-period timer.
    pub fn call(&self, args: Args) {
        let mut state = self.shared.state.lock();
        resume_if_poisoned(&mut state);
        if state.stopped {
            return;
        }

        let starting_new_burst = state.deadline.is_none();

        if starting_new_burst && matches!(self.shared.policy, EdgePolicy::Leading | EdgePolicy::Both)
        {
            state.last_run = Some(Instant::now());
            let leading_args = args.clone();
            if matches!(self.shared.policy, EdgePolicy::Trailing | EdgePolicy::Both) {
                state.pending = Some(args);
            }
            state.deadline = Some(Instant::now() + self.shared.interval);
            drop(state);
            invoke_guarded(&self.shared, leading_args);
            self.shared.cv.notify_all();
            return;
        }

        state.pending = Some(args);
        state.deadline = Some(Instant::now() + self.shared.interval);
        drop(state);
        self.shared.cv.notify_all();
    }

    /// Cancels any scheduled call without running it.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        state.pending = None;
        state.deadline = None;
        self.shared.cv.notify_all();
    }

    /// Runs any scheduled call immediately, on the calling thread.
    pub fn flush(&self) {
        let mut state = self.shared.state.lock();
        resume_if_poisoned(&mut state);
        if let Some(args) = state.pending.take() {
            state.last_run = Some(Instant::now());
            state.deadline = None;
            drop(state);
            invoke_guarded(&self.shared, args);
        }
    }

    /// Fires once every time the inner callback actually runs.
    pub fn triggered(&self) -> &SignalInstance<Args> {
        &self.shared.triggered
    }
}

impl<Args: SignalArgs> Drop for Debouncer<Args> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.stopped = true;
        }
        self.shared.cv.notify_all();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}
