// Distributed under the Boost Software License, Version 1.0.
// See http://www.boost.org/LICENSE_1_0.txt

//! Connection handles returned by every `connect*` call.
//!
//! A [`Connection`] carries no type information about the signal it came
//! from. It is built, at connect time, from three pieces shared with the
//! slot's entry in the signal's core: an `Arc<AtomicBool>` recording
//! liveness, an `Arc<AtomicUsize>` recording the active blocker count, and a
//! type-erased closure that knows how to remove that one slot from its
//! owning signal. None of those three captures the signal's argument tuple,
//! so `Connection` itself doesn't need to either.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// The implementation shared by [`Connection`] and [`ScopedConnection`].
/// The const bool parameter controls whether dropping it disconnects the
/// slot.
#[derive(Clone)]
pub struct ConnectionImpl<const SCOPED: bool> {
    pub(crate) connected: Arc<AtomicBool>,
    pub(crate) blocker_count: Arc<AtomicUsize>,
    pub(crate) disconnect: Arc<dyn Fn() + Send + Sync>,
}

impl<const SCOPED: bool> ConnectionImpl<SCOPED> {
    pub(crate) fn new(
        connected: Arc<AtomicBool>,
        blocker_count: Arc<AtomicUsize>,
        disconnect: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            connected,
            blocker_count,
            disconnect,
        }
    }

    /// Returns true if the underlying slot is still connected.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Disconnects the underlying slot. Idempotent: repeated calls do
    /// nothing after the first. Once disconnected, a slot can never be
    /// reconnected.
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            (self.disconnect)();
        }
    }

    /// Returns true if the underlying slot is currently blocked by at least
    /// one [`SharedConnectionBlock`], or if it has been disconnected.
    pub fn blocked(&self) -> bool {
        !self.connected() || self.blocker_count.load(Ordering::Acquire) != 0
    }

    /// Number of [`SharedConnectionBlock`]s currently blocking this slot.
    pub fn blocker_count(&self) -> usize {
        self.blocker_count.load(Ordering::Acquire)
    }

    #[must_use = "shared connection blocks are automatically unblocked when dropped"]
    /// Gets a [`SharedConnectionBlock`] that can be used to temporarily
    /// block the underlying slot.
    pub fn shared_block(&self, initially_blocking: bool) -> SharedConnectionBlock {
        SharedConnectionBlock::new(self.blocker_count.clone(), initially_blocking)
    }
}

impl<const SCOPED: bool> Drop for ConnectionImpl<SCOPED> {
    fn drop(&mut self) {
        if SCOPED {
            self.disconnect();
        }
    }
}

impl ConnectionImpl<false> {
    /// Consumes the connection and returns a [`ScopedConnection`] that
    /// disconnects automatically when dropped.
    #[must_use = "ScopedConnection automatically disconnects when dropped"]
    pub fn scoped(self) -> ScopedConnection {
        ScopedConnection::new(
            self.connected.clone(),
            self.blocker_count.clone(),
            self.disconnect.clone(),
        )
    }
}

/// A connection manages one slot of one signal, without carrying any type
/// information about that signal.
///
/// Dropping a plain `Connection` leaves the slot connected — see
/// [`ScopedConnection`] for one that disconnects automatically.
///
/// # Examples
/// ```
/// use signal_dispatch::Signal;
///
/// let sig: Signal<(i32,)> = Signal::new("clicked");
/// let conn = sig.connect(|_n| {});
/// assert!(conn.connected());
/// conn.disconnect();
/// assert!(!conn.connected());
/// ```
pub type Connection = ConnectionImpl<false>;

/// Identical to [`Connection`], except that it disconnects its slot
/// automatically when dropped.
///
/// ```
/// use signal_dispatch::Signal;
///
/// let sig: Signal<(i32,)> = Signal::new("clicked");
/// {
///     let _conn = sig.connect(|_n| {}).scoped();
///     assert_eq!(sig.count(), 1);
/// }
/// assert_eq!(sig.count(), 0);
/// ```
pub type ScopedConnection = ConnectionImpl<true>;

/// Temporarily blocks one slot from executing, independent of
/// `Signal::block`/`unblock` (which blocks the whole signal).
///
/// Any number of `SharedConnectionBlock`s may exist for the same slot; the
/// slot stays blocked as long as at least one of them is blocking.
///
/// # Examples
/// ```
/// use signal_dispatch::Signal;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let sig: Signal<()> = Signal::new("changed");
/// let count = Arc::new(AtomicUsize::new(0));
/// let count2 = count.clone();
/// let conn = sig.connect(move |()| { count2.fetch_add(1, Ordering::SeqCst); });
///
/// let blocker = conn.shared_block(true);
/// sig.emit(());
/// assert_eq!(count.load(Ordering::SeqCst), 0);
///
/// blocker.unblock();
/// sig.emit(());
/// assert_eq!(count.load(Ordering::SeqCst), 1);
/// ```
pub struct SharedConnectionBlock {
    blocker_count: Arc<AtomicUsize>,
    blocking: Mutex<bool>,
}

impl SharedConnectionBlock {
    fn new(blocker_count: Arc<AtomicUsize>, initially_blocking: bool) -> Self {
        let shared_block = Self {
            blocker_count,
            blocking: Mutex::new(false),
        };

        if initially_blocking {
            shared_block.block_impl(true);
        }

        shared_block
    }

    /// Starts blocking, if not already.
    pub fn block(&self) {
        if !self.blocking() {
            self.block_impl(true);
        }
    }

    /// Stops blocking, if not already.
    pub fn unblock(&self) {
        if self.blocking() {
            self.block_impl(false);
        }
    }

    /// True if this particular block is currently active. Does not imply
    /// the slot itself is unblocked if this returns false — another shared
    /// block may still be active.
    pub fn blocking(&self) -> bool {
        *self.blocking.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn block_impl(&self, block: bool) {
        if block {
            self.blocker_count.fetch_add(1, Ordering::AcqRel);
        } else {
            self.blocker_count.fetch_sub(1, Ordering::AcqRel);
        }
        *self.blocking.lock().unwrap_or_else(|e| e.into_inner()) = block;
    }
}

impl Clone for SharedConnectionBlock {
    fn clone(&self) -> Self {
        SharedConnectionBlock::new(self.blocker_count.clone(), self.blocking())
    }
}

impl Drop for SharedConnectionBlock {
    fn drop(&mut self) {
        self.unblock();
    }
}
