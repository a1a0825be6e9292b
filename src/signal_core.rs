// Distributed under the Boost Software License, Version 1.0.
// See http://www.boost.org/LICENSE_1_0.txt

//! The copy-on-write slot table and emit loop shared by every signal.
//!
//! A `SignalCore<Args>` is an immutable snapshot of a signal's connected
//! slots. `SignalInstance` holds one behind `RwLock<Arc<SignalCore<Args>>>`;
//! `connect`/`disconnect` clone the snapshot, mutate the clone, and swap it
//! in under a brief write lock, while `emit` only ever takes a read lock
//! long enough to clone the `Arc` out, dropping the lock before invoking a
//! single slot. A slot that reconnects, disconnects, or re-emits its own
//! signal from inside its own invocation therefore never contends with the
//! lock it would otherwise have to re-enter — reentrancy falls out of the
//! snapshot, with no reentrant lock primitive required.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{
    panic_message, DeadReference, EmitLoopError, ErrorPolicy, PanicError, SignalError,
};
use crate::queue::{Dispatcher, ThreadTarget};
use crate::weak_callback::{Invocable, SlotId, SlotKindTag};

/// Bound satisfied by every valid signal argument tuple.
///
/// `Debug` is required so that a slot's panic can be reported alongside the
/// arguments it was invoked with (see [`EmitLoopError`]); every tuple of
/// `Debug` element types gets it for free, so this is rarely a real
/// constraint in practice.
pub trait SignalArgs: Clone + Send + std::fmt::Debug + 'static {}
impl<T: Clone + Send + std::fmt::Debug + 'static> SignalArgs for T {}

/// One connected slot and everything needed to order, invoke, and
/// eventually disconnect it.
pub(crate) struct SlotEntry<Args> {
    pub(crate) invocable: Arc<dyn Invocable<Args>>,
    pub(crate) tag: SlotKindTag,
    pub(crate) connected: Arc<AtomicBool>,
    pub(crate) blocker_count: Arc<AtomicUsize>,
    pub(crate) priority: i32,
    pub(crate) sequence: u64,
    pub(crate) unique_key: Option<SlotId>,
    pub(crate) thread_target: Option<ThreadTarget>,
    pub(crate) on_finalize: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl<Args> Clone for SlotEntry<Args> {
    fn clone(&self) -> Self {
        SlotEntry {
            invocable: self.invocable.clone(),
            tag: self.tag,
            connected: self.connected.clone(),
            blocker_count: self.blocker_count.clone(),
            priority: self.priority,
            sequence: self.sequence,
            unique_key: self.unique_key,
            thread_target: self.thread_target.clone(),
            on_finalize: self.on_finalize.clone(),
        }
    }
}

/// An immutable snapshot of a signal's connected slots.
pub(crate) struct SignalCore<Args> {
    pub(crate) slots: Vec<SlotEntry<Args>>,
    pub(crate) error_policy: ErrorPolicy,
}

impl<Args> SignalCore<Args> {
    pub(crate) fn new(error_policy: ErrorPolicy) -> Self {
        SignalCore {
            slots: Vec::new(),
            error_policy,
        }
    }

    pub(crate) fn with_slot(&self, entry: SlotEntry<Args>) -> Self {
        let mut slots: Vec<SlotEntry<Args>> = self.slots.iter().map(Clone::clone).collect();
        slots.push(entry);
        SignalCore {
            slots,
            error_policy: self.error_policy,
        }
    }

    pub(crate) fn without_sequence(&self, seq: u64) -> Self {
        SignalCore {
            slots: self
                .slots
                .iter()
                .filter(|e| e.sequence != seq)
                .map(Clone::clone)
                .collect(),
            error_policy: self.error_policy,
        }
    }

    /// Drops every slot connected with `unique_key == Some(key)`, marking
    /// each as disconnected first. Returns the new snapshot and whether any
    /// slot actually matched.
    pub(crate) fn without_unique_key(&self, key: SlotId) -> (Self, bool) {
        let mut found = false;
        let slots = self
            .slots
            .iter()
            .filter(|e| {
                let matches = e.unique_key == Some(key);
                if matches {
                    found = true;
                    e.connected.store(false, Ordering::Release);
                }
                !matches
            })
            .map(Clone::clone)
            .collect();
        (
            SignalCore {
                slots,
                error_policy: self.error_policy,
            },
            found,
        )
    }

    pub(crate) fn reap(&self, dead: &[u64]) -> Self {
        SignalCore {
            slots: self
                .slots
                .iter()
                .filter(|e| !dead.contains(&e.sequence))
                .map(Clone::clone)
                .collect(),
            error_policy: self.error_policy,
        }
    }

    pub(crate) fn cleared(&self) -> Self {
        SignalCore {
            slots: Vec::new(),
            error_policy: self.error_policy,
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.slots
            .iter()
            .filter(|e| e.connected.load(Ordering::Acquire))
            .count()
    }

    pub(crate) fn has_unique_key(&self, key: SlotId) -> bool {
        self.slots
            .iter()
            .any(|e| e.connected.load(Ordering::Acquire) && e.unique_key == Some(key))
    }
}

/// Result of running the emit loop once: which slots were found dead (and
/// should be reaped by the caller under a write lock) and the overall
/// outcome.
pub(crate) struct EmitOutcome {
    pub(crate) dead_sequences: Vec<u64>,
    pub(crate) result: Result<(), SignalError>,
}

/// Invokes every connected, unblocked slot in priority/insertion order.
///
/// Slots pinned to a non-calling thread are handed to `dispatcher` instead
/// of being invoked inline. A slot whose weakly-held dependency has died is
/// recorded in `dead_sequences` rather than treated as a failure; a slot
/// that panics is wrapped into an [`EmitLoopError`] and, under
/// [`ErrorPolicy::Immediate`], stops the loop immediately.
pub(crate) fn run_emit_loop<Args: SignalArgs>(
    slots: &[SlotEntry<Args>],
    args: &Args,
    signal_name: &str,
    error_policy: ErrorPolicy,
    depth: usize,
    dispatcher: &Dispatcher,
) -> EmitOutcome {
    let span = tracing::trace_span!("emit", signal = signal_name, depth, slots = slots.len());
    let _enter = span.enter();

    let mut ordered: Vec<&SlotEntry<Args>> = slots
        .iter()
        .filter(|e| e.connected.load(Ordering::Acquire))
        .collect();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.sequence.cmp(&b.sequence)));

    let mut dead = Vec::new();
    let mut errors = Vec::new();

    for entry in ordered {
        if entry.blocker_count.load(Ordering::Acquire) > 0 {
            continue;
        }

        if let Some(target) = &entry.thread_target {
            dispatcher.enqueue(
                target.clone(),
                entry.invocable.clone(),
                args.clone(),
                signal_name.to_string(),
                entry.unique_key,
                depth,
            );
            continue;
        }

        let invocable = &entry.invocable;
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            invocable.invoke(args.clone())
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(DeadReference)) => {
                tracing::debug!(signal = signal_name, sequence = entry.sequence, "reaping dead slot");
                if let Some(finalize) = &entry.on_finalize {
                    finalize();
                }
                dead.push(entry.sequence);
            }
            Err(panic_payload) => {
                let err = EmitLoopError {
                    slot_id: entry.unique_key,
                    signal_name: signal_name.to_string(),
                    args_debug: format!("{args:?}"),
                    depth,
                    cause: Arc::new(PanicError(panic_message(panic_payload))),
                };
                tracing::warn!(signal = signal_name, depth, "slot panicked during emission");
                match error_policy {
                    ErrorPolicy::Immediate => {
                        return EmitOutcome {
                            dead_sequences: dead,
                            result: Err(SignalError::EmitLoop(err)),
                        };
                    }
                    ErrorPolicy::Collect => errors.push(err),
                }
            }
        }
    }

    let result = if errors.is_empty() {
        Ok(())
    } else if errors.len() == 1 {
        Err(SignalError::EmitLoop(errors.into_iter().next().unwrap()))
    } else {
        Err(SignalError::EmitLoopMany(errors))
    };

    EmitOutcome {
        dead_sequences: dead,
        result,
    }
}
