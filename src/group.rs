// Distributed under the Boost Software License, Version 1.0.
// See http://www.boost.org/LICENSE_1_0.txt

//! Composing several signals into one relay.
//!
//! A [`SignalGroup`] doesn't replace its members' own `connect`/`emit` —
//! each member keeps working exactly as a standalone `SignalInstance`
//! would. Joining the group additionally wires a forwarding slot onto each
//! member that re-emits `(source, args)` on the group's own relay signal.
//! Because members can have different argument tuples, the relay carries them
//! type-erased via [`ErasedArgs`]; [`SignalGroup::connect_uniform`] is a
//! convenience for the common case where every member shares one
//! signature.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::connect::Connection;
use crate::error::SignalError;
use crate::signal::{current_emitter, EmitterHandle, SignalInstance};
use crate::signal_core::SignalArgs;

/// A type-erased, clonable argument tuple, used by [`SignalGroup`]'s relay
/// to carry whatever arity and types its members happen to emit.
#[derive(Clone)]
pub struct ErasedArgs(Arc<dyn Any + Send + Sync>);

impl ErasedArgs {
    /// Erases `value`'s type.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        ErasedArgs(Arc::new(value))
    }

    /// Recovers a reference to the original value if `T` matches.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for ErasedArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<erased args>")
    }
}

trait GroupMember: Send + Sync {
    fn block(&self);
    fn unblock(&self);
    fn disconnect_relay(&self);
    fn name(&self) -> &str;
}

struct Member<Args: SignalArgs> {
    signal: SignalInstance<Args>,
    relay_conn: Connection,
    was_blocked: AtomicBool,
}

impl<Args: SignalArgs> GroupMember for Member<Args> {
    fn block(&self) {
        self.was_blocked.store(self.signal.blocked(), Ordering::SeqCst);
        self.signal.block();
    }

    fn unblock(&self) {
        if !self.was_blocked.load(Ordering::SeqCst) {
            self.signal.unblock();
        }
    }

    fn disconnect_relay(&self) {
        self.relay_conn.disconnect();
    }

    fn name(&self) -> &str {
        self.signal.name()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Uniformity {
    Empty,
    Uniform(TypeId),
    Mixed,
}

/// A named collection of signals that forwards every member's emissions
/// onto one shared relay signal.
pub struct SignalGroup {
    relay: SignalInstance<(EmitterHandle, ErasedArgs)>,
    members: Mutex<Vec<Box<dyn GroupMember>>>,
    uniformity: Mutex<Uniformity>,
    strict: bool,
    relay_was_blocked: AtomicBool,
}

impl SignalGroup {
    /// Creates an empty group that accepts members of any signature.
    pub fn new(name: impl Into<String>) -> Self {
        SignalGroup {
            relay: SignalInstance::new(name),
            members: Mutex::new(Vec::new()),
            uniformity: Mutex::new(Uniformity::Empty),
            strict: false,
            relay_was_blocked: AtomicBool::new(false),
        }
    }

    /// Creates an empty group that rejects, via `add`, any member whose
    /// argument tuple doesn't match the first one added.
    pub fn strict(name: impl Into<String>) -> Self {
        let mut group = Self::new(name);
        group.strict = true;
        group
    }

    /// Joins `member` to the group: its emissions are additionally
    /// forwarded to the group's relay. Fails only for a `strict` group
    /// whose members don't all share one signature.
    pub fn add<Args: SignalArgs + 'static>(
        &self,
        member: &SignalInstance<Args>,
    ) -> Result<(), SignalError> {
        let type_id = TypeId::of::<Args>();
        {
            let mut state = self.uniformity.lock();
            *state = match *state {
                Uniformity::Empty => Uniformity::Uniform(type_id),
                Uniformity::Uniform(existing) if existing == type_id => Uniformity::Uniform(existing),
                _ => {
                    if self.strict {
                        return Err(SignalError::NonUniformGroup);
                    }
                    Uniformity::Mixed
                }
            };
        }

        let relay = self.relay.clone();
        let member_name = member.name().to_string();
        let relay_conn = member.connect(move |args: Args| {
            let source = current_emitter().unwrap_or_else(|| EmitterHandle::synthetic(&member_name));
            let _ = relay.emit((source, ErasedArgs::new(args)));
        });

        self.members.lock().push(Box::new(Member {
            signal: member.clone(),
            relay_conn,
            was_blocked: AtomicBool::new(false),
        }));

        Ok(())
    }

    /// True if every member added so far shares one argument tuple type
    /// (vacuously true for an empty group).
    pub fn is_uniform(&self) -> bool {
        !matches!(*self.uniformity.lock(), Uniformity::Mixed)
    }

    /// Number of members currently in the group.
    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    /// True if the group has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Connects a slot to the raw, type-erased relay.
    pub fn connect(
        &self,
        f: impl Fn(EmitterHandle, ErasedArgs) + Send + Sync + 'static,
    ) -> Connection {
        self.relay.connect(move |(source, args)| f(source, args))
    }

    /// Connects a slot typed against the group's uniform member signature
    /// `M`. Silently ignores relayed emissions whose erased type doesn't
    /// match `M` (only possible for a non-`strict` group that turned out
    /// not to be uniform).
    pub fn connect_uniform<M: Clone + Send + fmt::Debug + 'static>(
        &self,
        f: impl Fn(EmitterHandle, M) + Send + Sync + 'static,
    ) -> Connection {
        self.relay.connect(move |(source, args): (EmitterHandle, ErasedArgs)| {
            if let Some(value) = args.downcast_ref::<M>() {
                f(source, value.clone());
            }
        })
    }

    /// Blocks every member signal except those named in `exclude`,
    /// remembering which were already blocked so
    /// [`unblock`](Self::unblock) doesn't wrongly unblock them.
    ///
    /// The relay is blocked too unless `"__relay__"` appears in `exclude`
    /// (spec.md Open Question 4: the relay participates in group-wide
    /// block by default).
    pub fn block(&self, exclude: &[&str]) {
        for member in self.members.lock().iter() {
            if !exclude.contains(&member.name()) {
                member.block();
            }
        }
        if !exclude.contains(&"__relay__") {
            self.relay_was_blocked.store(self.relay.blocked(), Ordering::SeqCst);
            self.relay.block();
        }
    }

    /// Reverses the most recent [`block`](Self::block) call, restoring
    /// each member's (and the relay's) prior blocked state.
    pub fn unblock(&self, exclude: &[&str]) {
        for member in self.members.lock().iter() {
            if !exclude.contains(&member.name()) {
                member.unblock();
            }
        }
        if !exclude.contains(&"__relay__") && !self.relay_was_blocked.load(Ordering::SeqCst) {
            self.relay.unblock();
        }
    }

    /// The relay signal itself: fires `(source, args)` whenever any
    /// member emits. Equivalent to `connect`/`connect_uniform`, exposed
    /// directly for callers that want the raw `SignalInstance` (e.g. to
    /// pass to another [`SignalGroup`] or a [`crate::queue::Dispatcher`]
    /// target).
    pub fn all(&self) -> &SignalInstance<(EmitterHandle, ErasedArgs)> {
        &self.relay
    }

    /// Names of every member currently in the group.
    pub fn member_names(&self) -> Vec<String> {
        self.members.lock().iter().map(|m| m.name().to_string()).collect()
    }

    /// Detaches every member's relay forwarder and clears the relay's own
    /// slots. Members themselves remain connected and usable standalone.
    pub fn disconnect(&self) {
        let mut members = self.members.lock();
        for member in members.iter() {
            member.disconnect_relay();
        }
        members.clear();
        self.relay.clear();
    }
}
