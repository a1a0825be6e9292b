// Distributed under the Boost Software License, Version 1.0.
// See http://www.boost.org/LICENSE_1_0.txt

//! # signal-dispatch
//!
//! A thread-safe signal/slot dispatch primitive: declare a [`Signal`] field
//! on a struct, [`connect`](SignalInstance::connect) one or more slots to
//! it, and [`emit`](SignalInstance::emit) it to invoke every connected slot
//! with a clone of the emitted arguments.
//!
//! Beyond the basic connect/emit cycle, a [`SignalInstance`] also supports:
//! weakly-held receivers that self-disconnect once dropped
//! ([`connect_weak`](SignalInstance::connect_weak)), temporarily silencing
//! a signal ([`block`](SignalInstance::block)/[`unblock`](SignalInstance::unblock)),
//! buffering emissions for later, possibly reduced, replay
//! ([`pause`](SignalInstance::pause)/[`resume_with`](SignalInstance::resume_with)),
//! pinning a slot to run only when its owning thread drains a
//! [`queue::Dispatcher`], and aggregating many signals into one
//! [`SignalGroup`] relay.
//!
//! `signal-dispatch` contains no unsafe code.
//!
//! ### Links
//! * [Github](https://github.com/christiandaley/signal-dispatch/)
//!
//! # Examples
//!
//! A signal declared as a struct field, connected to, and emitted:
//!
//! ```
//! use signal_dispatch::Signal;
//!
//! struct Button {
//!     clicked: Signal<(u32,)>,
//! }
//!
//! let button = Button { clicked: Signal::new("clicked") };
//! button.clicked.connect(|(count,)| println!("clicked {count} times"));
//! button.clicked.emit((1,)).unwrap();
//! ```
//!
//! Blocking, pausing with a reducer, and priority ordering:
//!
//! ```
//! use signal_dispatch::SignalInstance;
//! use std::sync::atomic::{AtomicI32, Ordering};
//! use std::sync::Arc;
//!
//! let sig: SignalInstance<(i32,)> = SignalInstance::new("sum");
//! let total = Arc::new(AtomicI32::new(0));
//! let total2 = total.clone();
//! sig.connect(move |(n,)| { total2.fetch_add(n, Ordering::SeqCst); });
//!
//! sig.pause();
//! sig.emit((1,)).unwrap();
//! sig.emit((2,)).unwrap();
//! sig.emit((3,)).unwrap();
//! sig.resume_with(Some(|(a,): (i32,), (b,): (i32,)| (a + b,)), None).unwrap();
//!
//! assert_eq!(total.load(Ordering::SeqCst), 6);
//! ```

#![warn(missing_docs)]

mod arity;
mod signal_core;

/// Connect-time signature compatibility checking for the dynamic connect
/// path.
pub mod signature;
#[doc(inline)]
pub use signature::{DeclaredSignature, SlotArity};

/// Connection handles ([`Connection`], [`ScopedConnection`]) and
/// [`SharedConnectionBlock`], returned by every `connect*` call.
pub mod connect;
#[doc(inline)]
pub use connect::{Connection, ScopedConnection, SharedConnectionBlock};

/// Error types surfaced by the dispatch core.
pub mod error;
#[doc(inline)]
pub use error::{EmitLoopError, ErrorPolicy, ReemissionPolicy, SignalError};

/// The uniform callable wrapper over every supported slot kind.
pub mod weak_callback;
#[doc(inline)]
pub use weak_callback::{partial, SetItem, SlotId, SlotKindTag};

/// Cross-thread queued delivery: [`queue::Dispatcher`],
/// [`queue::ThreadTarget`], [`queue::PumpHandle`].
pub mod queue;
#[doc(inline)]
pub use queue::{Dispatcher, DrainOutcome, PumpHandle, ThreadTarget};

/// Timer-backed rate-limiting wrappers around a callback.
pub mod throttle;
#[doc(inline)]
pub use throttle::{Debouncer, Throttler};

/// The public signal types: [`Signal`], [`SignalInstance`],
/// [`WeakSignalInstance`], and the thread-local emission context
/// ([`current_emitter`], [`sender`]).
pub mod signal;
#[doc(inline)]
pub use signal::{
    current_emitter, sender, ConnectOptions, Disconnect, DynWeakHandle, EmitHandle,
    EmitterHandle, OnRefError, Signal, SignalInstance, Unique, WeakSignalInstance,
};

/// Aggregating many signals into one relay.
pub mod group;
#[doc(inline)]
pub use group::{ErasedArgs, SignalGroup};

#[doc(inline)]
pub use signal_core::SignalArgs;
