// Distributed under the Boost Software License, Version 1.0.
// See http://www.boost.org/LICENSE_1_0.txt

//! Error types surfaced by the dispatch core.
//!
//! Connection-time mistakes (a non-callable slot, an incompatible arity, a
//! duplicate unique connection) are returned as [`SignalError`] directly to
//! the caller. Errors raised *inside* a slot during emission are wrapped in
//! [`EmitLoopError`], which preserves the slot's identity, the signal's name,
//! and the emission depth at which the failure occurred.

use std::fmt;
use std::sync::Arc;

use crate::weak_callback::SlotId;

/// Umbrella error type for everything the dispatch core can report to a
/// caller.
#[derive(thiserror::Error, Debug)]
pub enum SignalError {
    /// A non-callable object was passed where a slot was expected.
    ///
    /// The typed `connect` entry points make this unreachable at compile
    /// time; it can only occur via the dynamic/FFI-style connect path.
    #[error("cannot connect to a non-callable slot")]
    NotCallable,

    /// The slot failed the arity or type compatibility rule checked at
    /// connect time (see [`crate::signature`]).
    #[error(
        "cannot connect slot: {rule}\naccepted signature: {expected}\noffending slot: {found}"
    )]
    IncompatibleSlot {
        /// Human-readable description of the signal's accepted signature.
        expected: String,
        /// Human-readable description of the slot's signature.
        found: String,
        /// Which specific rule was violated.
        rule: String,
    },

    /// `connect(..., unique = Unique::Raise(key))` and `key` was already
    /// connected.
    #[error("slot is already connected")]
    AlreadyConnected,

    /// `disconnect(slot, missing_ok = false)` and `slot` was not connected.
    #[error("slot is not connected")]
    NotConnected,

    /// `emit`'s positional-argument preflight failed.
    #[error("cannot emit: expected {expected} positional arguments, got {got}")]
    ArgCountMismatch {
        /// Description of the accepted arity range.
        expected: String,
        /// The number of arguments actually supplied.
        got: usize,
    },

    /// `emit`'s type preflight failed.
    #[error("cannot emit: argument type mismatch at position {position}")]
    ArgTypeMismatch {
        /// Index of the first mismatched argument.
        position: usize,
    },

    /// A callback raised while the emit loop was running.
    #[error(transparent)]
    EmitLoop(#[from] EmitLoopError),

    /// Several callbacks raised during the same emission, under
    /// `ErrorPolicy::Collect`.
    #[error("{} callbacks raised during emission", .0.len())]
    EmitLoopMany(Vec<EmitLoopError>),

    /// The reducer passed to `resume` panicked.
    #[error("resume() reducer panicked: {0}")]
    Reducer(String),

    /// `connect_setattr`/`connect_setitem` couldn't acquire a weak handle to
    /// the receiver (it was not held behind an `Arc`).
    #[error("receiver does not support weak referencing")]
    NoWeakCapability,

    /// A [`SignalGroup`](crate::group::SignalGroup) was declared `strict`
    /// but its member signatures are not all identical.
    #[error("strict signal group requires all members to share a signature")]
    NonUniformGroup,
}

/// Raised (internally) when a weakly-held receiver or function has been
/// dropped. Never escapes the dispatch loop: it is always converted into a
/// lazy slot reap, per the invariant that dead entries never reach a caller
/// as an emission failure.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeadReference;

/// Wraps any error or panic raised by a slot during emission.
///
/// Carries the offending slot's identity, the signal's name, a debug
/// rendering of the emitted arguments, and the reentrant emission depth at
/// which the failure was observed (depth 0 is the outermost emission).
#[derive(Debug, Clone)]
pub struct EmitLoopError {
    /// Identity of the slot whose invocation failed.
    pub slot_id: Option<SlotId>,
    /// Name of the signal that was emitting (empty if unnamed).
    pub signal_name: String,
    /// `{:?}`-rendering of the arguments passed to the failing slot.
    pub args_debug: String,
    /// Reentrant emission depth (0 = outermost).
    pub depth: usize,
    /// The original failure, preserved as the error's `source()`.
    pub cause: Arc<dyn std::error::Error + Send + Sync>,
}

impl fmt::Display for EmitLoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "while emitting signal {:?}, slot {:?} raised (depth {}) with args {}: {}",
            self.signal_name, self.slot_id, self.depth, self.args_debug, self.cause
        )
    }
}

impl std::error::Error for EmitLoopError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.cause)
    }
}

/// Adapts a caught `panic!` payload (which is not `std::error::Error`) into
/// one, so it can be carried as [`EmitLoopError::cause`].
#[derive(Debug)]
pub(crate) struct PanicError(pub(crate) String);

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot panicked: {}", self.0)
    }
}

impl std::error::Error for PanicError {}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Policy governing how emission reacts to a failing slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop at the first failing slot and raise immediately. This is the
    /// default.
    #[default]
    Immediate,
    /// Run every slot regardless of failures, then raise an aggregate
    /// [`SignalError::EmitLoopMany`] if any failed.
    Collect,
}

/// Policy governing what happens when a slot, while being invoked, causes
/// its own signal to be emitted again (reentrant emission).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReemissionPolicy {
    /// The nested `emit` runs inline, immediately. This is the default.
    #[default]
    Immediate,
    /// The nested `emit`'s arguments are appended to a per-signal queue,
    /// drained after the current (outermost) emission completes.
    Queued,
    /// Like `Queued`, but a new nested emission replaces any
    /// already-queued, not-yet-drained emission for this signal.
    LatestOnly,
}
