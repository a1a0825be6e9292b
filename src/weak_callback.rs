// Distributed under the Boost Software License, Version 1.0.
// See http://www.boost.org/LICENSE_1_0.txt

//! Uniform invocation wrapper over the different ways a slot can be held.
//!
//! A slot is always reduced, at connect time, to one `Box<dyn Invocable<Args>>`.
//! The variant used to build it (`Strong`, a weak receiver, a weak
//! setattr/setitem target, ...) only matters for two things afterwards:
//! deciding whether the underlying object is still alive, and labeling the
//! slot for introspection/debugging. Everything else — ordering, dispatch,
//! reaping — operates uniformly on the trait object.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::error::DeadReference;

/// Identifies a connected slot for `unique`-connect deduplication,
/// `disconnect`, and error reporting.
///
/// Rust closures have no notion of identity the way a bound method in a
/// dynamic language does, so there is no way to derive a `SlotId`
/// automatically for an arbitrary closure. Two constructors cover the cases
/// that matter in practice:
/// [`SlotId::from_receiver`] recovers exactly that identity for any slot
/// built from an `Arc`-held receiver (weak methods, setattr, setitem), and
/// [`SlotId::tag`] lets a caller supply their own key for a bare closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

impl SlotId {
    /// Derives a stable identity from the address of an `Arc`-held receiver.
    pub fn from_receiver<T>(receiver: &Arc<T>) -> Self {
        SlotId(Arc::as_ptr(receiver) as usize as u64)
    }

    /// A caller-supplied identity for deduplicating connections of a bare
    /// closure, which otherwise has no identity of its own.
    pub fn tag(key: u64) -> Self {
        SlotId(key)
    }
}

/// Labels which [`weak_callback`](self) constructor produced a slot, kept
/// alongside the type-erased invocable purely for introspection and
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKindTag {
    /// Connected via `connect`; the closure (and anything it captures) is
    /// retained for as long as the connection is alive.
    Strong,
    /// Connected via `connect_weak`; the receiver is held weakly and the
    /// slot self-disconnects once it is dropped.
    Weak,
    /// Connected via `connect_weak_method`: a method bound to a weakly-held
    /// receiver.
    WeakMethod,
    /// Connected via `connect_weak_builtin`. Rust has no notion of a
    /// separate "builtin bound method" object distinct from any other
    /// method, so this behaves identically to `WeakMethod` and exists only
    /// to keep the connect surface's naming symmetric.
    WeakBuiltin,
    /// Connected via `connect_setattr`.
    WeakSetattr,
    /// Connected via `connect_setitem`.
    WeakSetitem,
    /// Connected via `connect_dyn`: a type-erased receiver handle supplied
    /// by the caller, rather than one of the statically-typed constructors
    /// above.
    Dynamic,
}

/// A type-erased, uniformly invocable slot.
///
/// `invoke` consumes one clone of the emitted arguments and returns
/// `Err(DeadReference)` if a weakly-held dependency of the slot has been
/// dropped, which the emit loop treats as "reap this slot after the current
/// pass" rather than as a failure.
pub(crate) trait Invocable<Args>: Send + Sync {
    fn invoke(&self, args: Args) -> Result<(), DeadReference>;
}

impl<Args> fmt::Debug for dyn Invocable<Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<slot>")
    }
}

/// A strongly-retained closure. The default, and the only kind produced by
/// plain `connect`.
pub(crate) struct Strong<Args> {
    f: Arc<dyn Fn(Args) + Send + Sync>,
}

impl<Args> Strong<Args> {
    pub(crate) fn new(f: impl Fn(Args) + Send + Sync + 'static) -> Self {
        Strong { f: Arc::new(f) }
    }
}

impl<Args> Invocable<Args> for Strong<Args> {
    fn invoke(&self, args: Args) -> Result<(), DeadReference> {
        (self.f)(args);
        Ok(())
    }
}

/// A closure that only runs while its captured receiver is alive.
///
/// Used for both `connect_weak` (a plain weak reference plus a closure) and
/// `connect_weak_method`/`connect_weak_builtin` (the closure is typically
/// `|r, args| r.some_method(args)`): in Rust, a method value and its
/// receiver can't be independently weakly referenced the way CPython can
/// weakly reference a bound method's `__self__` and `__func__` separately,
/// so both constructors collapse onto this one invocable.
pub(crate) struct WeakReceiver<T, Args> {
    receiver: Weak<T>,
    f: Arc<dyn Fn(&T, Args) + Send + Sync>,
}

impl<T, Args> WeakReceiver<T, Args> {
    pub(crate) fn new(receiver: &Arc<T>, f: impl Fn(&T, Args) + Send + Sync + 'static) -> Self {
        WeakReceiver {
            receiver: Arc::downgrade(receiver),
            f: Arc::new(f),
        }
    }
}

impl<T: Send + Sync + 'static, Args> Invocable<Args> for WeakReceiver<T, Args> {
    fn invoke(&self, args: Args) -> Result<(), DeadReference> {
        match self.receiver.upgrade() {
            Some(receiver) => {
                (self.f)(&receiver, args);
                Ok(())
            }
            None => Err(DeadReference),
        }
    }
}

/// Sets an attribute on a weakly-held receiver each time a single-value
/// signal emits. The receiver must be held behind `Arc<Mutex<T>>` since the
/// setter needs `&mut T`.
pub(crate) struct WeakSetattr<T, V> {
    receiver: Weak<Mutex<T>>,
    setter: Arc<dyn Fn(&mut T, V) + Send + Sync>,
}

impl<T, V> WeakSetattr<T, V> {
    pub(crate) fn new(
        receiver: &Arc<Mutex<T>>,
        setter: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self {
        WeakSetattr {
            receiver: Arc::downgrade(receiver),
            setter: Arc::new(setter),
        }
    }
}

impl<T: Send + 'static, V> Invocable<(V,)> for WeakSetattr<T, V> {
    fn invoke(&self, args: (V,)) -> Result<(), DeadReference> {
        match self.receiver.upgrade() {
            Some(receiver) => {
                let mut guard = receiver.lock().unwrap_or_else(|e| e.into_inner());
                (self.setter)(&mut guard, args.0);
                Ok(())
            }
            None => Err(DeadReference),
        }
    }
}

/// Capability required of a receiver for `connect_setitem`: anything that
/// can have a key assigned a value. Implemented here for two common
/// container shapes (mappings and index-keyed sequences); anyone can
/// implement it for their own container.
pub trait SetItem<K, V> {
    /// Assigns `value` at `key`, inserting it if absent.
    fn set_item(&mut self, key: K, value: V);
}

impl<K: std::hash::Hash + Eq, V> SetItem<K, V> for std::collections::HashMap<K, V> {
    fn set_item(&mut self, key: K, value: V) {
        self.insert(key, value);
    }
}

impl<V> SetItem<usize, V> for Vec<V> {
    fn set_item(&mut self, key: usize, value: V) {
        self[key] = value;
    }
}

/// Assigns into a weakly-held receiver's container each time a single-value
/// signal emits.
pub(crate) struct WeakSetitem<T, K, V> {
    receiver: Weak<Mutex<T>>,
    key: K,
    _value: std::marker::PhantomData<fn(V)>,
}

impl<T, K, V> WeakSetitem<T, K, V> {
    pub(crate) fn new(receiver: &Arc<Mutex<T>>, key: K) -> Self {
        WeakSetitem {
            receiver: Arc::downgrade(receiver),
            key,
            _value: std::marker::PhantomData,
        }
    }
}

impl<T, K, V> Invocable<(V,)> for WeakSetitem<T, K, V>
where
    T: SetItem<K, V> + Send + 'static,
    K: Clone + Send + Sync + 'static,
    V: Send,
{
    fn invoke(&self, args: (V,)) -> Result<(), DeadReference> {
        match self.receiver.upgrade() {
            Some(receiver) => {
                let mut guard = receiver.lock().unwrap_or_else(|e| e.into_inner());
                guard.set_item(self.key.clone(), args.0);
                Ok(())
            }
            None => Err(DeadReference),
        }
    }
}

/// A type-erased receiver held weakly, invoked through `connect_dyn`.
///
/// Mirrors [`WeakReceiver`] but the receiver's concrete type is only known
/// to the caller's closure, not to this module — used when the receiver
/// arrives as a caller-constructed [`crate::signal::DynWeakHandle`] rather
/// than a statically-typed `Arc<T>`.
pub(crate) struct DynWeakReceiver<Args> {
    receiver: Weak<dyn Any + Send + Sync>,
    f: Arc<dyn Fn(&(dyn Any + Send + Sync), Args) + Send + Sync>,
}

impl<Args> DynWeakReceiver<Args> {
    pub(crate) fn new(
        receiver: Weak<dyn Any + Send + Sync>,
        f: impl Fn(&(dyn Any + Send + Sync), Args) + Send + Sync + 'static,
    ) -> Self {
        DynWeakReceiver {
            receiver,
            f: Arc::new(f),
        }
    }
}

impl<Args> Invocable<Args> for DynWeakReceiver<Args> {
    fn invoke(&self, args: Args) -> Result<(), DeadReference> {
        match self.receiver.upgrade() {
            Some(receiver) => {
                (self.f)(receiver.as_ref(), args);
                Ok(())
            }
            None => Err(DeadReference),
        }
    }
}

/// A type-erased receiver held strongly, invoked through `connect_dyn`.
///
/// Used for the `DynWeakHandle::Unweakable` case: a caller handed over a
/// receiver it can't weakly reference (e.g. one that crossed an FFI/plugin
/// boundary without ever being `Arc`-held on this side), so falling back to
/// strong retention is the only option once the `on_ref_error` policy
/// decides not to raise.
pub(crate) struct DynStrongReceiver<Args> {
    receiver: Arc<dyn Any + Send + Sync>,
    f: Arc<dyn Fn(&(dyn Any + Send + Sync), Args) + Send + Sync>,
}

impl<Args> DynStrongReceiver<Args> {
    pub(crate) fn new(
        receiver: Arc<dyn Any + Send + Sync>,
        f: impl Fn(&(dyn Any + Send + Sync), Args) + Send + Sync + 'static,
    ) -> Self {
        DynStrongReceiver {
            receiver,
            f: Arc::new(f),
        }
    }
}

impl<Args> Invocable<Args> for DynStrongReceiver<Args> {
    fn invoke(&self, args: Args) -> Result<(), DeadReference> {
        (self.f)(self.receiver.as_ref(), args);
        Ok(())
    }
}

/// Binds a fixed prefix of arguments ahead of the emitted ones. Because the
/// result is a fresh closure, it always has its own identity distinct from
/// `f` itself — a partial-bound slot and a direct connection of the same
/// function are never considered the same connection.
pub fn partial<Bound, Args>(
    bound: Bound,
    f: impl Fn(Bound, Args) + Send + Sync + 'static,
) -> impl Fn(Args) + Send + Sync + 'static
where
    Bound: Clone + Send + Sync + 'static,
{
    move |args| f(bound.clone(), args)
}
