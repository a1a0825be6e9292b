// Distributed under the Boost Software License, Version 1.0.
// See http://www.boost.org/LICENSE_1_0.txt

//! The public signal types: [`Signal`] (a lazily-initialized field
//! descriptor), [`SignalInstance`] (the actual dispatch object it wraps),
//! and [`WeakSignalInstance`].

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, RwLock};

use crate::arity::{Truncate1, Truncate2, Truncate3};
use crate::connect::Connection;
use crate::error::{panic_message, ErrorPolicy, ReemissionPolicy, SignalError};
use crate::queue::{Dispatcher, ThreadTarget};
use crate::signal_core::{run_emit_loop, SignalArgs, SignalCore, SlotEntry};
use crate::signature::{check_compatibility, DeclaredSignature, SlotArity};
use crate::weak_callback::{
    DynStrongReceiver, DynWeakReceiver, Invocable, SetItem, SlotId, SlotKindTag, Strong,
    WeakReceiver, WeakSetattr, WeakSetitem,
};

thread_local! {
    static EMITTER_STACK: RefCell<Vec<EmitterHandle>> = const { RefCell::new(Vec::new()) };
}

/// Identifies the signal currently emitting on this thread, available to a
/// slot (or anything the slot calls) via [`current_emitter`] and
/// [`sender`].
#[derive(Clone)]
pub struct EmitterHandle {
    name: String,
    addr: usize,
    owner: Option<Weak<dyn Any + Send + Sync>>,
}

impl EmitterHandle {
    /// Name of the currently-emitting signal.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds a handle carrying only a name, with no identity or owner.
    /// Used by `SignalGroup` as a fallback when a member's relay forwarder
    /// is somehow invoked outside of that member's own emit loop.
    pub(crate) fn synthetic(name: &str) -> Self {
        EmitterHandle {
            name: name.to_string(),
            addr: 0,
            owner: None,
        }
    }
}

impl std::fmt::Debug for EmitterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitterHandle").field("name", &self.name).finish()
    }
}

struct EmitterGuard;

impl Drop for EmitterGuard {
    fn drop(&mut self) {
        EMITTER_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

fn push_emitter(handle: EmitterHandle) -> EmitterGuard {
    EMITTER_STACK.with(|stack| stack.borrow_mut().push(handle));
    EmitterGuard
}

fn reentrant_depth(addr: usize) -> usize {
    EMITTER_STACK.with(|stack| stack.borrow().iter().filter(|h| h.addr == addr).count())
}

/// The signal currently emitting on this thread, if any, innermost first.
pub fn current_emitter() -> Option<EmitterHandle> {
    EMITTER_STACK.with(|stack| stack.borrow().last().cloned())
}

/// The owner of the signal currently emitting on this thread, downcast to
/// `T`, if one was bound via [`SignalInstance::bind_owner`] and is still
/// alive.
pub fn sender<T: Any + Send + Sync>() -> Option<Arc<T>> {
    current_emitter()
        .and_then(|h| h.owner)
        .and_then(|w| w.upgrade())
        .and_then(|owner| owner.downcast::<T>().ok())
}

/// How a connection should be deduplicated against existing ones.
#[derive(Clone, Copy)]
pub enum Unique {
    /// No deduplication; always connects.
    None,
    /// Fail with [`SignalError::AlreadyConnected`] if `SlotId` is already
    /// connected.
    Require(SlotId),
}

/// Which slot(s) [`SignalInstance::disconnect`] should remove.
#[derive(Clone, Copy)]
pub enum Disconnect {
    /// Disconnect every currently connected slot. Never fails.
    All,
    /// Disconnect the slot connected with `Unique::Require(key)`.
    Key {
        /// The `SlotId` the slot was connected with.
        key: SlotId,
        /// If `true`, a missing key is treated as already-disconnected and
        /// returns `Ok(())` instead of `Err(SignalError::NotConnected)`.
        missing_ok: bool,
    },
}

/// A caller-constructed, type-erased receiver handle for
/// [`SignalInstance::connect_dyn`].
///
/// `Arc::downgrade` always works on any `Arc<T>` this crate can see, so the
/// only way a receiver genuinely lacks weak-reference capability is if it
/// was never `Arc`-held on this side at all — e.g. it arrived across an
/// FFI or plugin boundary as a bare handle. `Unweakable` models exactly
/// that case; `on_ref_error` decides what `connect_dyn` does about it.
pub enum DynWeakHandle {
    /// A receiver this crate can weakly reference; the slot self-disconnects
    /// once it is dropped, like [`SignalInstance::connect_weak`].
    Weak(Weak<dyn Any + Send + Sync>),
    /// A receiver with no weak-reference capability available.
    Unweakable(Arc<dyn Any + Send + Sync>),
}

/// What [`SignalInstance::connect_dyn`] does when given
/// `DynWeakHandle::Unweakable`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnRefError {
    /// Fail the connect with `SignalError::NoWeakCapability`.
    Raise,
    /// Log a warning via `tracing::warn!` and fall back to strongly
    /// retaining the receiver.
    Warn,
    /// Silently fall back to strongly retaining the receiver.
    Ignore,
}

/// Options accepted by [`SignalInstance::connect_with`].
#[derive(Clone, Copy)]
pub struct ConnectOptions {
    /// Slots run in descending priority order; ties broken by connection
    /// order. Default 0.
    pub priority: i32,
    /// Deduplication policy. Default `Unique::None`.
    pub unique: Unique,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            priority: 0,
            unique: Unique::None,
        }
    }
}

/// Handle returned by [`SignalInstance::emit_async`].
///
/// The emission itself runs to completion on its own worker thread
/// regardless of whether this handle is polled, joined, or dropped.
pub struct EmitHandle {
    done: Arc<AtomicBool>,
    result: Arc<Mutex<Option<Result<(), SignalError>>>>,
    handle: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl EmitHandle {
    /// True once the worker thread has finished running the emit loop.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Blocks the calling thread until the emission completes. A no-op if
    /// already joined or already done.
    pub fn join(&self) {
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    /// Blocks until the emission completes, then takes its result.
    /// Returns `None` if a previous call already took it.
    pub fn result(&self) -> Option<Result<(), SignalError>> {
        self.join();
        self.result.lock().take()
    }

    /// Waits up to `timeout` for the emission to complete. Returns `true` if
    /// it finished in time. The worker thread itself is never interrupted;
    /// a timed-out wait just stops waiting.
    pub fn join_timeout(&self, timeout: std::time::Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while !self.is_done() {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        true
    }
}

/// A lazily-initialized signal field.
///
/// `Signal::new` is a `const fn`, so a struct can declare
/// `pub changed: Signal<(i32,)> = Signal::new("changed")` as a plain field
/// initializer; the backing [`SignalInstance`] is built the first time the
/// field is touched, giving ordinary per-struct field ownership instead of
/// a separate registration step.
pub struct Signal<Args: SignalArgs> {
    name: &'static str,
    instance: OnceLock<SignalInstance<Args>>,
}

impl<Args: SignalArgs> Signal<Args> {
    /// Declares a signal field with the given name. Construction is cheap
    /// and does not allocate; the underlying `SignalInstance` is created on
    /// first access.
    pub const fn new(name: &'static str) -> Self {
        Signal {
            name,
            instance: OnceLock::new(),
        }
    }

    /// Forces initialization and returns the backing instance.
    pub fn instance(&self) -> &SignalInstance<Args> {
        self.instance.get_or_init(|| SignalInstance::new(self.name))
    }
}

impl<Args: SignalArgs> std::ops::Deref for Signal<Args> {
    type Target = SignalInstance<Args>;

    fn deref(&self) -> &SignalInstance<Args> {
        self.instance()
    }
}

impl<Args: SignalArgs> Default for Signal<Args> {
    fn default() -> Self {
        Signal::new("")
    }
}

/// The dispatch object backing a [`Signal`] field: a thread-safe list of
/// slots plus block/pause state.
pub struct SignalInstance<Args: SignalArgs> {
    core: Arc<RwLock<Arc<SignalCore<Args>>>>,
    name: String,
    owner: Arc<Mutex<Option<Weak<dyn Any + Send + Sync>>>>,
    blocked: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    pause_buffer: Arc<Mutex<Vec<Args>>>,
    requeue_buffer: Arc<Mutex<VecDeque<Args>>>,
    reemission: ReemissionPolicy,
    sequence_counter: Arc<AtomicU64>,
    dispatcher: Dispatcher,
}

impl<Args: SignalArgs> Clone for SignalInstance<Args> {
    fn clone(&self) -> Self {
        SignalInstance {
            core: self.core.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            blocked: self.blocked.clone(),
            paused: self.paused.clone(),
            pause_buffer: self.pause_buffer.clone(),
            requeue_buffer: self.requeue_buffer.clone(),
            reemission: self.reemission,
            sequence_counter: self.sequence_counter.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<Args: SignalArgs> SignalInstance<Args> {
    /// Builds a fresh, unconnected signal with the default error policy
    /// (`ErrorPolicy::Immediate`) and reemission policy
    /// (`ReemissionPolicy::Immediate`).
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_error_policy(name, ErrorPolicy::default())
    }

    /// Builds a fresh signal with an explicit [`ErrorPolicy`].
    pub fn with_error_policy(name: impl Into<String>, error_policy: ErrorPolicy) -> Self {
        SignalInstance {
            core: Arc::new(RwLock::new(Arc::new(SignalCore::new(error_policy)))),
            name: name.into(),
            owner: Arc::new(Mutex::new(None)),
            blocked: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            pause_buffer: Arc::new(Mutex::new(Vec::new())),
            requeue_buffer: Arc::new(Mutex::new(VecDeque::new())),
            reemission: ReemissionPolicy::default(),
            sequence_counter: Arc::new(AtomicU64::new(0)),
            dispatcher: Dispatcher::global(),
        }
    }

    /// Sets the policy applied when a slot re-emits this same signal from
    /// inside its own invocation. Consuming builder method, typically
    /// called right after construction.
    pub fn with_reemission(mut self, policy: ReemissionPolicy) -> Self {
        self.reemission = policy;
        self
    }

    /// Name this signal reports in diagnostics and `EmitLoopError`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records `owner` as the object this signal belongs to, so that
    /// [`sender`] can recover it from inside a slot. There is no automatic
    /// way to infer this in Rust (no descriptor protocol), so it must be
    /// set explicitly, typically once, in the owner's constructor.
    pub fn bind_owner<T: Any + Send + Sync>(&self, owner: &Arc<T>) {
        let weak: Weak<dyn Any + Send + Sync> = Arc::downgrade(owner);
        *self.owner.lock() = Some(weak);
    }

    fn self_addr(&self) -> usize {
        Arc::as_ptr(&self.core) as usize
    }

    #[allow(clippy::too_many_arguments)]
    fn connect_raw(
        &self,
        invocable: Arc<dyn Invocable<Args>>,
        tag: SlotKindTag,
        priority: i32,
        unique: Unique,
        thread_target: Option<ThreadTarget>,
        on_finalize: Option<Arc<dyn Fn() + Send + Sync>>,
    ) -> Result<Connection, SignalError> {
        let connected = Arc::new(AtomicBool::new(true));
        let blocker_count = Arc::new(AtomicUsize::new(0));
        let sequence = self.sequence_counter.fetch_add(1, Ordering::Relaxed);
        let weak_core = Arc::downgrade(&self.core);
        let disconnect: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            if let Some(core_handle) = weak_core.upgrade() {
                let mut lock = core_handle.write();
                *lock = Arc::new(lock.without_sequence(sequence));
            }
        });

        let unique_key = match unique {
            Unique::None => None,
            Unique::Require(key) => Some(key),
        };

        let entry = SlotEntry {
            invocable,
            tag,
            connected: connected.clone(),
            blocker_count: blocker_count.clone(),
            priority,
            sequence,
            unique_key,
            thread_target,
            on_finalize,
        };

        // The uniqueness check and the insert must happen under the same
        // write-lock critical section: checking with a read lock that is
        // dropped before a separately acquired write lock would let two
        // concurrent `connect`s with the same `unique_key` both observe
        // "not present" and both insert, violating invariant 2 (`connect`
        // is idempotent by `unique_key`).
        let mut lock = self.core.write();
        if let Unique::Require(key) = unique {
            if lock.has_unique_key(key) {
                return Err(SignalError::AlreadyConnected);
            }
        }
        *lock = Arc::new(lock.with_slot(entry));

        Ok(Connection::new(connected, blocker_count, disconnect))
    }

    fn connect_tagged(&self, invocable: Arc<dyn Invocable<Args>>, tag: SlotKindTag) -> Connection {
        self.connect_raw(invocable, tag, 0, Unique::None, None, None)
            .expect("connecting with default options is infallible")
    }

    /// Connects `f`, strongly retaining it for as long as the connection
    /// lives. The common case.
    pub fn connect(&self, f: impl Fn(Args) + Send + Sync + 'static) -> Connection {
        self.connect_tagged(Arc::new(Strong::new(f)), SlotKindTag::Strong)
    }

    /// Like [`connect`](Self::connect), but invoked before existing slots
    /// of lower priority and after slots of higher priority. Ties are
    /// broken by connection order.
    pub fn connect_priority(&self, priority: i32, f: impl Fn(Args) + Send + Sync + 'static) -> Connection {
        self.connect_raw(
            Arc::new(Strong::new(f)),
            SlotKindTag::Strong,
            priority,
            Unique::None,
            None,
            None,
        )
        .expect("connecting with default options is infallible")
    }

    /// Connects `f` with full control over priority and deduplication.
    pub fn connect_with(
        &self,
        f: impl Fn(Args) + Send + Sync + 'static,
        options: ConnectOptions,
    ) -> Result<Connection, SignalError> {
        self.connect_raw(
            Arc::new(Strong::new(f)),
            SlotKindTag::Strong,
            options.priority,
            options.unique,
            None,
            None,
        )
    }

    /// Connects `f`, ignoring every emitted argument. Valid for any arity.
    pub fn connect_take0(&self, f: impl Fn() + Send + Sync + 'static) -> Connection {
        self.connect(move |_args: Args| f())
    }

    /// Pins `f` to run only when `target`'s owner drains or pumps the
    /// shared [`crate::queue::Dispatcher`], instead of inline on the
    /// emitting thread.
    pub fn connect_on_thread(
        &self,
        target: ThreadTarget,
        f: impl Fn(Args) + Send + Sync + 'static,
    ) -> Connection {
        self.connect_raw(
            Arc::new(Strong::new(f)),
            SlotKindTag::Strong,
            0,
            Unique::None,
            Some(target),
            None,
        )
        .expect("connecting with default options is infallible")
    }

    /// Connects a closure that is dropped, and whose slot self-disconnects,
    /// as soon as `receiver` is.
    pub fn connect_weak<T: Send + Sync + 'static>(
        &self,
        receiver: &Arc<T>,
        f: impl Fn(&T, Args) + Send + Sync + 'static,
    ) -> Connection {
        self.connect_tagged(Arc::new(WeakReceiver::new(receiver, f)), SlotKindTag::Weak)
    }

    /// Connects a method-shaped closure bound to a weakly-held receiver.
    /// Behaves identically to [`connect_weak`](Self::connect_weak); kept as
    /// a distinct entry point for readers translating from a design where
    /// bound methods and plain functions are weakly referenced differently.
    pub fn connect_weak_method<T: Send + Sync + 'static>(
        &self,
        receiver: &Arc<T>,
        f: impl Fn(&T, Args) + Send + Sync + 'static,
    ) -> Connection {
        self.connect_tagged(Arc::new(WeakReceiver::new(receiver, f)), SlotKindTag::WeakMethod)
    }

    /// Connects a weakly-held receiver's builtin-method-shaped slot.
    /// Rust has no object model distinction between a "builtin" bound
    /// method and any other method, so this is identical to
    /// [`connect_weak_method`](Self::connect_weak_method).
    pub fn connect_weak_builtin<T: Send + Sync + 'static>(
        &self,
        receiver: &Arc<T>,
        f: impl Fn(&T, Args) + Send + Sync + 'static,
    ) -> Connection {
        self.connect_tagged(Arc::new(WeakReceiver::new(receiver, f)), SlotKindTag::WeakBuiltin)
    }

    /// Connect-time compatibility check against a slot whose true arity and
    /// element types are only known dynamically (an FFI trampoline, a
    /// scripting-layer callback). See [`crate::signature`].
    pub fn connect_checked(
        &self,
        f: impl Fn(Args) + Send + Sync + 'static,
        arity: SlotArity,
    ) -> Result<Connection, SignalError>
    where
        Args: DeclaredSignature,
    {
        check_compatibility(Args::arity(), &Args::declared_types(), &arity)?;
        Ok(self.connect(f))
    }

    /// Connects `f` against a type-erased receiver handle supplied by the
    /// caller, for collaborators that can't hand over a statically-typed
    /// `Arc<T>` (an FFI/plugin boundary, a dynamically-typed registry entry).
    /// `on_ref_error` governs what happens if `handle` turns out to be
    /// `DynWeakHandle::Unweakable`.
    pub fn connect_dyn(
        &self,
        handle: DynWeakHandle,
        on_ref_error: OnRefError,
        f: impl Fn(&(dyn Any + Send + Sync), Args) + Send + Sync + 'static,
    ) -> Result<Connection, SignalError> {
        match handle {
            DynWeakHandle::Weak(receiver) => Ok(self.connect_tagged(
                Arc::new(DynWeakReceiver::new(receiver, f)),
                SlotKindTag::Dynamic,
            )),
            DynWeakHandle::Unweakable(receiver) => match on_ref_error {
                OnRefError::Raise => Err(SignalError::NoWeakCapability),
                OnRefError::Warn => {
                    tracing::warn!(
                        "connect_dyn: receiver has no weak-reference capability, retaining strongly"
                    );
                    Ok(self.connect_tagged(
                        Arc::new(DynStrongReceiver::new(receiver, f)),
                        SlotKindTag::Dynamic,
                    ))
                }
                OnRefError::Ignore => Ok(self.connect_tagged(
                    Arc::new(DynStrongReceiver::new(receiver, f)),
                    SlotKindTag::Dynamic,
                )),
            },
        }
    }

    /// Disconnects every slot. Returns the number of slots that were
    /// connected.
    pub fn disconnect_all(&self) -> usize {
        let mut lock = self.core.write();
        for entry in &lock.slots {
            entry.connected.store(false, Ordering::Release);
        }
        let n = lock.slots.len();
        *lock = Arc::new(lock.cleared());
        n
    }

    /// Alias for [`disconnect_all`](Self::disconnect_all) that discards the
    /// count.
    pub fn clear(&self) {
        self.disconnect_all();
    }

    /// Disconnects a specific slot by its `unique_key`, or every slot.
    ///
    /// `Disconnect::Key { missing_ok: false, .. }` is the only way to
    /// observe [`SignalError::NotConnected`]: it is returned when no slot
    /// was ever connected with that key, or it was already disconnected.
    pub fn disconnect(&self, which: Disconnect) -> Result<(), SignalError> {
        match which {
            Disconnect::All => {
                self.disconnect_all();
                Ok(())
            }
            Disconnect::Key { key, missing_ok } => {
                let mut lock = self.core.write();
                let (next, found) = lock.without_unique_key(key);
                *lock = Arc::new(next);
                if found || missing_ok {
                    Ok(())
                } else {
                    Err(SignalError::NotConnected)
                }
            }
        }
    }

    /// Number of currently connected slots.
    pub fn count(&self) -> usize {
        self.core.read().count()
    }

    /// True if a slot was connected with `Unique::Require(key)` and is still
    /// connected. There is no way to query membership of a bare closure that
    /// wasn't given an explicit [`SlotId`] (see [`crate::weak_callback::SlotId`]).
    pub fn contains(&self, key: SlotId) -> bool {
        self.core.read().has_unique_key(key)
    }

    /// True if no slots are connected.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Blocks the whole signal: emissions return immediately without
    /// running any slot, until [`unblock`](Self::unblock) is called.
    pub fn block(&self) {
        self.blocked.store(true, Ordering::Release);
    }

    /// Reverses [`block`](Self::block).
    pub fn unblock(&self) {
        self.blocked.store(false, Ordering::Release);
    }

    /// True if the signal is currently blocked.
    pub fn blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }

    /// Suspends emission: further `emit` calls buffer their arguments
    /// instead of running any slot, until [`resume`](Self::resume) is
    /// called.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// True if the signal is currently paused.
    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Leaves `paused` as-is but discards whatever is currently buffered,
    /// so a subsequent [`resume`](Self::resume) replays nothing.
    pub fn cancel_pause(&self) {
        self.pause_buffer.lock().clear();
    }

    /// Resumes emission, replaying every buffered emission in order.
    pub fn resume(&self) -> Result<(), SignalError> {
        self.resume_with(None::<fn(Args, Args) -> Args>, None)
    }

    /// Resumes emission. If `reducer` is given, every buffered emission is
    /// folded into one via `reducer(accumulated, next)` and emitted once;
    /// otherwise each buffered emission replays individually. `initial`, if
    /// given, seeds the fold ahead of the first buffered tuple instead of
    /// using it as the seed; with an empty buffer and a reducer, `initial`
    /// alone is emitted.
    pub fn resume_with(
        &self,
        reducer: Option<impl Fn(Args, Args) -> Args>,
        initial: Option<Args>,
    ) -> Result<(), SignalError> {
        self.paused.store(false, Ordering::Release);
        let buffered: Vec<Args> = std::mem::take(&mut *self.pause_buffer.lock());

        match reducer {
            None => {
                for args in buffered {
                    self.emit(args)?;
                }
                Ok(())
            }
            Some(reduce) => {
                let mut iter = buffered.into_iter();
                let seed = match initial {
                    Some(seed) => seed,
                    None => match iter.next() {
                        Some(first) => first,
                        None => return Ok(()),
                    },
                };
                let folded = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    iter.fold(seed, |acc, next| reduce(acc, next))
                }));
                match folded {
                    Ok(args) => self.emit(args),
                    Err(payload) => Err(SignalError::Reducer(panic_message(payload))),
                }
            }
        }
    }

    /// Runs every connected slot with `args`, in priority/insertion order.
    ///
    /// Returns immediately without running any slot if the signal is
    /// blocked or paused. If a slot re-emits this same signal from inside
    /// its own invocation, the nested call is handled according to this
    /// signal's [`ReemissionPolicy`].
    pub fn emit(&self, args: Args) -> Result<(), SignalError> {
        if self.blocked.load(Ordering::Acquire) {
            return Ok(());
        }
        if self.paused.load(Ordering::Acquire) {
            self.pause_buffer.lock().push(args);
            return Ok(());
        }

        let depth = reentrant_depth(self.self_addr());
        if depth > 0 {
            match self.reemission {
                ReemissionPolicy::Immediate => {}
                ReemissionPolicy::Queued => {
                    self.requeue_buffer.lock().push_back(args);
                    return Ok(());
                }
                ReemissionPolicy::LatestOnly => {
                    let mut buf = self.requeue_buffer.lock();
                    buf.clear();
                    buf.push_back(args);
                    return Ok(());
                }
            }
        }

        self.emit_now(args, depth)
    }

    fn emit_now(&self, args: Args, depth: usize) -> Result<(), SignalError> {
        let handle = EmitterHandle {
            name: self.name.clone(),
            addr: self.self_addr(),
            owner: self.owner.lock().clone(),
        };
        let _guard = push_emitter(handle);

        let core = self.core.read().clone();
        let outcome = run_emit_loop(
            &core.slots,
            &args,
            &self.name,
            core.error_policy,
            depth,
            &self.dispatcher,
        );

        if !outcome.dead_sequences.is_empty() {
            let mut lock = self.core.write();
            *lock = Arc::new(lock.reap(&outcome.dead_sequences));
        }

        outcome.result?;

        if depth == 0 {
            loop {
                let next = self.requeue_buffer.lock().pop_front();
                match next {
                    Some(queued_args) => self.emit_now(queued_args, 0)?,
                    None => break,
                }
            }
        }

        Ok(())
    }

    /// Runs the emit loop on a dedicated worker thread instead of the
    /// calling thread, returning immediately with an [`EmitHandle`]. No
    /// ordering is guaranteed between an asynchronous emission and any
    /// subsequent synchronous (or asynchronous) emission of the same
    /// signal.
    pub fn emit_async(&self, args: Args) -> EmitHandle {
        let sig = self.clone();
        let done = Arc::new(AtomicBool::new(false));
        let result = Arc::new(Mutex::new(None));
        let done2 = done.clone();
        let result2 = result.clone();
        let handle = std::thread::Builder::new()
            .name(format!("signal-dispatch-emit-{}", self.name))
            .spawn(move || {
                let outcome = sig.emit(args);
                *result2.lock() = Some(outcome);
                done2.store(true, Ordering::Release);
            })
            .expect("failed to spawn emit worker thread");

        EmitHandle {
            done,
            result,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// A weak handle that doesn't keep this signal's slot table alive.
    pub fn weak(&self) -> WeakSignalInstance<Args> {
        WeakSignalInstance {
            core: Arc::downgrade(&self.core),
            name: self.name.clone(),
            owner: self.owner.clone(),
            blocked: self.blocked.clone(),
            paused: self.paused.clone(),
            pause_buffer: self.pause_buffer.clone(),
            requeue_buffer: self.requeue_buffer.clone(),
            reemission: self.reemission,
            sequence_counter: self.sequence_counter.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<Args> SignalInstance<Args>
where
    Args: SignalArgs + Truncate1,
    <Args as Truncate1>::A0: Send + 'static,
{
    /// Connects a slot that only wants the first emitted argument,
    /// discarding the rest — the bounded, compile-time substitute for
    /// runtime argument-count truncation.
    pub fn connect_take1(
        &self,
        f: impl Fn(<Args as Truncate1>::A0) + Send + Sync + 'static,
    ) -> Connection {
        self.connect(move |args: Args| f(args.take1().0))
    }
}

impl<Args> SignalInstance<Args>
where
    Args: SignalArgs + Truncate2,
    <Args as Truncate2>::A0: Send + 'static,
    <Args as Truncate2>::A1: Send + 'static,
{
    /// Connects a slot that only wants the first two emitted arguments.
    pub fn connect_take2(
        &self,
        f: impl Fn(<Args as Truncate2>::A0, <Args as Truncate2>::A1) + Send + Sync + 'static,
    ) -> Connection {
        self.connect(move |args: Args| {
            let (a0, a1) = args.take2();
            f(a0, a1)
        })
    }
}

impl<Args> SignalInstance<Args>
where
    Args: SignalArgs + Truncate3,
    <Args as Truncate3>::A0: Send + 'static,
    <Args as Truncate3>::A1: Send + 'static,
    <Args as Truncate3>::A2: Send + 'static,
{
    /// Connects a slot that only wants the first three emitted arguments.
    pub fn connect_take3(
        &self,
        f: impl Fn(<Args as Truncate3>::A0, <Args as Truncate3>::A1, <Args as Truncate3>::A2)
            + Send
            + Sync
            + 'static,
    ) -> Connection {
        self.connect(move |args: Args| {
            let (a0, a1, a2) = args.take3();
            f(a0, a1, a2)
        })
    }
}

impl<V: Send + 'static> SignalInstance<(V,)> {
    /// Connects a setter invoked with the emitted value, as long as
    /// `receiver` is alive. The receiver must be held behind `Arc<Mutex<T>>`
    /// since the setter needs exclusive access.
    pub fn connect_setattr<T: Send + 'static>(
        &self,
        receiver: &Arc<std::sync::Mutex<T>>,
        setter: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Connection {
        self.connect_tagged(
            Arc::new(WeakSetattr::new(receiver, setter)),
            SlotKindTag::WeakSetattr,
        )
    }

    /// Connects an item assignment (`receiver[key] = value`, in spirit)
    /// invoked with the emitted value, as long as `receiver` is alive.
    pub fn connect_setitem<T, K>(&self, receiver: &Arc<std::sync::Mutex<T>>, key: K) -> Connection
    where
        T: SetItem<K, V> + Send + 'static,
        K: Clone + Send + Sync + 'static,
    {
        self.connect_tagged(
            Arc::new(WeakSetitem::new(receiver, key)),
            SlotKindTag::WeakSetitem,
        )
    }
}

/// A handle to a [`SignalInstance`] that doesn't keep its slot table alive.
pub struct WeakSignalInstance<Args: SignalArgs> {
    core: Weak<RwLock<Arc<SignalCore<Args>>>>,
    name: String,
    owner: Arc<Mutex<Option<Weak<dyn Any + Send + Sync>>>>,
    blocked: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    pause_buffer: Arc<Mutex<Vec<Args>>>,
    requeue_buffer: Arc<Mutex<VecDeque<Args>>>,
    reemission: ReemissionPolicy,
    sequence_counter: Arc<AtomicU64>,
    dispatcher: Dispatcher,
}

impl<Args: SignalArgs> WeakSignalInstance<Args> {
    /// Recovers a strong [`SignalInstance`] handle, if the signal still
    /// exists.
    pub fn upgrade(&self) -> Option<SignalInstance<Args>> {
        self.core.upgrade().map(|core| SignalInstance {
            core,
            name: self.name.clone(),
            owner: self.owner.clone(),
            blocked: self.blocked.clone(),
            paused: self.paused.clone(),
            pause_buffer: self.pause_buffer.clone(),
            requeue_buffer: self.requeue_buffer.clone(),
            reemission: self.reemission,
            sequence_counter: self.sequence_counter.clone(),
            dispatcher: self.dispatcher.clone(),
        })
    }
}

impl<Args: SignalArgs> Clone for WeakSignalInstance<Args> {
    fn clone(&self) -> Self {
        WeakSignalInstance {
            core: self.core.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            blocked: self.blocked.clone(),
            paused: self.paused.clone(),
            pause_buffer: self.pause_buffer.clone(),
            requeue_buffer: self.requeue_buffer.clone(),
            reemission: self.reemission,
            sequence_counter: self.sequence_counter.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}
