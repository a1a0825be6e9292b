// Distributed under the Boost Software License, Version 1.0.
// See http://www.boost.org/LICENSE_1_0.txt

use signal_dispatch::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn init_tracing() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[test]
fn basic_emission_test() {
    init_tracing();
    let sig: SignalInstance<(i32,)> = SignalInstance::new("changed");
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let recorded2 = recorded.clone();
    sig.connect(move |(n,)| recorded2.lock().unwrap().push(n));

    sig.emit((1,)).unwrap();
    sig.emit((2,)).unwrap();

    assert_eq!(*recorded.lock().unwrap(), vec![1, 2]);
}

#[test]
fn argument_truncation_test() {
    let sig: SignalInstance<(i32, i32)> = SignalInstance::new("pair");
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let recorded2 = recorded.clone();
    sig.connect_take1(move |a| recorded2.lock().unwrap().push(a));

    sig.emit((7, 8)).unwrap();

    assert_eq!(*recorded.lock().unwrap(), vec![7]);
}

#[test]
fn arity_mismatch_at_connect_is_rejected() {
    let sig: SignalInstance<(i32,)> = SignalInstance::new("one_arg");
    let err = sig
        .connect_checked(|_args| {}, SlotArity::exactly(2))
        .unwrap_err();
    assert!(matches!(err, SignalError::IncompatibleSlot { .. }));
    assert_eq!(sig.count(), 0);
}

#[test]
fn weak_method_collection_test() {
    struct Receiver {
        calls: AtomicUsize,
    }

    let sig: SignalInstance<(i32,)> = SignalInstance::new("weak");
    let receiver = Arc::new(Receiver { calls: AtomicUsize::new(0) });

    sig.connect_weak(&receiver, |r, (n,)| {
        r.calls.fetch_add(n as usize, Ordering::SeqCst);
    });
    assert_eq!(sig.count(), 1);

    sig.emit((5,)).unwrap();
    assert_eq!(receiver.calls.load(Ordering::SeqCst), 5);

    drop(receiver);

    sig.emit((5,)).unwrap();
    assert_eq!(sig.count(), 0);
}

#[test]
fn pause_with_sum_reducer_test() {
    let sig: SignalInstance<(i32,)> = SignalInstance::new("paused");
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let recorded2 = recorded.clone();
    sig.connect(move |(n,)| recorded2.lock().unwrap().push(n));

    sig.pause();
    sig.emit((1,)).unwrap();
    sig.emit((2,)).unwrap();
    sig.emit((3,)).unwrap();
    assert!(recorded.lock().unwrap().is_empty());

    sig.resume_with(Some(|(a,): (i32,), (b,): (i32,)| (a + b,)), None).unwrap();

    assert_eq!(*recorded.lock().unwrap(), vec![6]);
}

#[test]
fn pause_with_sum_reducer_and_explicit_initial_seeds_the_fold() {
    let sig: SignalInstance<(i32,)> = SignalInstance::new("paused_seeded");
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let recorded2 = recorded.clone();
    sig.connect(move |(n,)| recorded2.lock().unwrap().push(n));

    sig.pause();
    sig.emit((1,)).unwrap();
    sig.emit((2,)).unwrap();
    sig.emit((3,)).unwrap();
    assert!(recorded.lock().unwrap().is_empty());

    sig.resume_with(Some(|(a,): (i32,), (b,): (i32,)| (a + b,)), Some((10,)))
        .unwrap();

    assert_eq!(*recorded.lock().unwrap(), vec![16]);
}

#[test]
fn pause_resume_replays_in_order_with_no_reducer() {
    let sig: SignalInstance<(i32,)> = SignalInstance::new("paused_replay");
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let recorded2 = recorded.clone();
    sig.connect(move |(n,)| recorded2.lock().unwrap().push(n));

    sig.pause();
    sig.emit((1,)).unwrap();
    sig.emit((2,)).unwrap();
    sig.emit((3,)).unwrap();
    sig.resume().unwrap();

    assert_eq!(*recorded.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn group_membership_and_disconnect() {
    let a: SignalInstance<(i32,)> = SignalInstance::new("a");
    let b: SignalInstance<(i32,)> = SignalInstance::new("b");

    let group = SignalGroup::new("counters");
    assert!(group.is_empty());
    group.add(&a).unwrap();
    group.add(&b).unwrap();
    assert_eq!(group.len(), 2);
    assert_eq!(group.member_names(), vec!["a".to_string(), "b".to_string()]);

    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();
    group.connect(move |_source, _args| {
        calls2.fetch_add(1, Ordering::SeqCst);
    });

    group.disconnect();
    a.emit((1,)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(a.count(), 0, "member itself keeps no residual relay slot");
}

#[test]
fn emit_async_join_timeout_reports_incomplete_then_complete() {
    let sig: SignalInstance<()> = SignalInstance::new("async_timeout");
    sig.connect(|()| {
        thread::sleep(Duration::from_millis(80));
    });

    let handle = sig.emit_async(());
    assert!(!handle.join_timeout(Duration::from_millis(5)));
    assert!(handle.join_timeout(Duration::from_millis(500)));
    assert!(handle.is_done());
}

#[test]
fn group_relay_test() {
    let a: SignalInstance<(i32,)> = SignalInstance::new("a");
    let b: SignalInstance<(String,)> = SignalInstance::new("b");

    let group = SignalGroup::new("members");
    group.add(&a).unwrap();
    group.add(&b).unwrap();
    assert!(!group.is_uniform());

    let recorded = Arc::new(Mutex::new(Vec::new()));
    let recorded2 = recorded.clone();
    group.connect(move |source, args| {
        if let Some((n,)) = args.downcast_ref::<(i32,)>() {
            recorded2.lock().unwrap().push((source.name().to_string(), n.to_string()));
        } else if let Some((s,)) = args.downcast_ref::<(String,)>() {
            recorded2.lock().unwrap().push((source.name().to_string(), s.clone()));
        }
    });

    a.emit((9,)).unwrap();
    b.emit(("hi".to_string(),)).unwrap();

    let got = recorded.lock().unwrap();
    assert_eq!(
        *got,
        vec![("a".to_string(), "9".to_string()), ("b".to_string(), "hi".to_string())]
    );
}

#[test]
fn strict_group_rejects_non_uniform_members() {
    let a: SignalInstance<(i32,)> = SignalInstance::new("a");
    let b: SignalInstance<(String,)> = SignalInstance::new("b");

    let group = SignalGroup::strict("members");
    group.add(&a).unwrap();
    let err = group.add(&b).unwrap_err();
    assert!(matches!(err, SignalError::NonUniformGroup));
}

#[test]
fn group_connect_uniform_only_sees_matching_type() {
    let a: SignalInstance<(i32,)> = SignalInstance::new("a");
    let b: SignalInstance<(i32,)> = SignalInstance::new("b");

    let group = SignalGroup::new("counters");
    group.add(&a).unwrap();
    group.add(&b).unwrap();
    assert!(group.is_uniform());

    let total = Arc::new(AtomicUsize::new(0));
    let total2 = total.clone();
    group.connect_uniform(move |_source, (n,): (i32,)| {
        total2.fetch_add(n as usize, Ordering::SeqCst);
    });

    a.emit((3,)).unwrap();
    b.emit((4,)).unwrap();

    assert_eq!(total.load(Ordering::SeqCst), 7);
}

#[test]
fn group_block_includes_relay_by_default() {
    let a: SignalInstance<(i32,)> = SignalInstance::new("a");
    let group = SignalGroup::new("g");
    group.add(&a).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();
    group.connect(move |_source, _args| {
        calls2.fetch_add(1, Ordering::SeqCst);
    });

    group.block(&[]);
    a.emit((1,)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    group.unblock(&[]);
    a.emit((1,)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn throttler_leading_edge_fires_once_per_interval() {
    let interval = Duration::from_millis(60);
    let count = Arc::new(AtomicUsize::new(0));
    let count2 = count.clone();
    let throttler = Throttler::new(interval, move |(n,): (i32,)| {
        count2.fetch_add(n as usize, Ordering::SeqCst);
    });

    for _ in 0..10 {
        throttler.call((1,));
    }
    assert_eq!(count.load(Ordering::SeqCst), 1);

    thread::sleep(interval * 3);
    throttler.call((1,));
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn debouncer_fires_once_after_calls_stop() {
    let interval = Duration::from_millis(60);
    let last = Arc::new(Mutex::new(0));
    let last2 = last.clone();
    let debouncer = Debouncer::new(interval, move |(n,): (i32,)| {
        *last2.lock().unwrap() = n;
    });

    for n in 0..5 {
        debouncer.call((n,));
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(*last.lock().unwrap(), 0);

    thread::sleep(interval * 3);
    assert_eq!(*last.lock().unwrap(), 4);
}

#[test]
fn throttler_flush_runs_pending_immediately() {
    let interval = Duration::from_millis(200);
    let count = Arc::new(AtomicUsize::new(0));
    let count2 = count.clone();
    let throttler = Throttler::with_trailing(interval, move |(_n,): (i32,)| {
        count2.fetch_add(1, Ordering::SeqCst);
    });

    throttler.call((1,));
    assert_eq!(count.load(Ordering::SeqCst), 1);

    throttler.call((2,));
    throttler.flush();
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn throttler_trailing_panic_is_caught_and_reraised_on_next_call() {
    let interval = Duration::from_millis(50);
    let throttler = Throttler::with_trailing(interval, |(n,): (i32,)| {
        if n == 2 {
            panic!("boom");
        }
    });

    throttler.call((1,)); // leading edge, runs fine
    throttler.call((2,)); // scheduled as trailing; panics on the worker thread
    thread::sleep(interval * 3);

    // The panic was caught on the worker thread; it did not kill it. It
    // surfaces here, to the next caller, instead of vanishing silently.
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| throttler.call((3,))));
    assert!(result.is_err());
}

#[test]
fn debouncer_panic_is_deferred_and_reraised_on_next_call() {
    let interval = Duration::from_millis(200);
    let debouncer = Debouncer::new(interval, |(n,): (i32,)| {
        if n == 1 {
            panic!("boom");
        }
    });

    debouncer.call((1,));
    // The panicking invocation itself is caught and absorbed; per spec it
    // surfaces on the *next* call/flush, not this one.
    let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| debouncer.flush()));
    assert!(first.is_ok());

    let second = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| debouncer.call((2,))));
    assert!(second.is_err());

    // The worker thread (and the `Debouncer` itself) survived the panic;
    // a fresh call/flush cycle runs normally.
    debouncer.call((3,));
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| debouncer.flush()));
    assert!(result.is_ok());
}

#[test]
fn disconnect_idempotence_test() {
    let sig: SignalInstance<()> = SignalInstance::new("noop");
    let conn = sig.connect(|()| {});
    assert_eq!(sig.count(), 1);

    conn.disconnect();
    conn.disconnect();
    assert_eq!(sig.count(), 0);
}

#[test]
fn priority_ordering_test() {
    let sig: SignalInstance<()> = SignalInstance::new("ordered");
    let order = Arc::new(Mutex::new(Vec::new()));

    let o1 = order.clone();
    sig.connect_priority(0, move |()| o1.lock().unwrap().push("low"));
    let o2 = order.clone();
    sig.connect_priority(10, move |()| o2.lock().unwrap().push("high"));
    let o3 = order.clone();
    sig.connect_priority(5, move |()| o3.lock().unwrap().push("mid"));

    sig.emit(()).unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["high", "mid", "low"]);
}

#[test]
fn blocked_idempotence_test() {
    let sig: SignalInstance<()> = SignalInstance::new("blockable");
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();
    sig.connect(move |()| {
        calls2.fetch_add(1, Ordering::SeqCst);
    });

    sig.block();
    sig.emit(()).unwrap();
    sig.emit(()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    sig.unblock();
    sig.emit(()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn shared_connection_block_only_blocks_one_slot() {
    let sig: SignalInstance<()> = SignalInstance::new("shared_block");
    let hits = Arc::new(Mutex::new(Vec::new()));

    let h1 = hits.clone();
    let conn1 = sig.connect(move |()| h1.lock().unwrap().push(1));
    let h2 = hits.clone();
    sig.connect(move |()| h2.lock().unwrap().push(2));

    let block = conn1.shared_block(true);
    sig.emit(()).unwrap();
    assert_eq!(*hits.lock().unwrap(), vec![2]);

    block.unblock();
    sig.emit(()).unwrap();
    assert_eq!(*hits.lock().unwrap(), vec![2, 1, 2]);
}

#[test]
fn reentrant_disconnect_completes_current_invocation() {
    let sig: SignalInstance<()> = SignalInstance::new("reentrant");
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();

    let sig_clone = sig.clone();
    let conn_cell: Arc<Mutex<Option<Connection>>> = Arc::new(Mutex::new(None));
    let conn_cell2 = conn_cell.clone();
    let conn = sig_clone.connect(move |()| {
        calls2.fetch_add(1, Ordering::SeqCst);
        if let Some(conn) = conn_cell2.lock().unwrap().take() {
            conn.disconnect();
        }
    });
    *conn_cell.lock().unwrap() = Some(conn);

    sig.emit(()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(sig.count(), 1);

    sig.emit(()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(sig.count(), 0);
}

#[test]
fn unique_connect_rejects_duplicate_key() {
    let sig: SignalInstance<()> = SignalInstance::new("unique");
    let receiver = Arc::new(42);
    let key = SlotId::from_receiver(&receiver);

    let opts = ConnectOptions { priority: 0, unique: Unique::Require(key) };
    sig.connect_with(|()| {}, opts).unwrap();
    let err = sig.connect_with(|()| {}, opts).unwrap_err();

    assert!(matches!(err, SignalError::AlreadyConnected));
    assert_eq!(sig.count(), 1);
}

#[test]
fn disconnect_by_key_removes_the_matching_slot() {
    let sig: SignalInstance<()> = SignalInstance::new("disconnect-by-key");
    let receiver = Arc::new(42);
    let key = SlotId::from_receiver(&receiver);
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();

    let opts = ConnectOptions { priority: 0, unique: Unique::Require(key) };
    sig.connect_with(move |()| { calls2.fetch_add(1, Ordering::SeqCst); }, opts)
        .unwrap();

    sig.disconnect(Disconnect::Key { key, missing_ok: false }).unwrap();
    assert_eq!(sig.count(), 0);
    sig.emit(()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn disconnect_unknown_key_reports_not_connected() {
    let sig: SignalInstance<()> = SignalInstance::new("disconnect-missing");
    let receiver = Arc::new(1);
    let key = SlotId::from_receiver(&receiver);

    let err = sig
        .disconnect(Disconnect::Key { key, missing_ok: false })
        .unwrap_err();
    assert!(matches!(err, SignalError::NotConnected));

    sig.disconnect(Disconnect::Key { key, missing_ok: true })
        .expect("missing_ok tolerates an absent key");
}

#[test]
fn disconnect_all_removes_every_slot() {
    let sig: SignalInstance<()> = SignalInstance::new("disconnect-all");
    sig.connect(|()| {});
    sig.connect(|()| {});
    assert_eq!(sig.count(), 2);

    sig.disconnect(Disconnect::All).unwrap();
    assert_eq!(sig.count(), 0);
}

#[test]
fn concurrent_unique_connects_only_ever_admit_one_slot() {
    let sig: Arc<SignalInstance<()>> = Arc::new(SignalInstance::new("race"));
    let receiver = Arc::new(7);
    let key = SlotId::from_receiver(&receiver);
    let opts = ConnectOptions { priority: 0, unique: Unique::Require(key) };

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let sig = sig.clone();
            thread::spawn(move || sig.connect_with(|()| {}, opts).is_ok())
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(successes, 1);
    assert_eq!(sig.count(), 1);
}

#[test]
fn connect_dyn_weak_self_disconnects_when_receiver_drops() {
    let receiver: Arc<dyn std::any::Any + Send + Sync> = Arc::new(AtomicUsize::new(0));
    let weak = Arc::downgrade(&receiver);
    let sig: SignalInstance<()> = SignalInstance::new("dyn-weak");
    sig.connect_dyn(DynWeakHandle::Weak(weak), OnRefError::Raise, |r, ()| {
        r.downcast_ref::<AtomicUsize>().unwrap().fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    sig.emit(()).unwrap();
    assert_eq!(
        receiver.downcast_ref::<AtomicUsize>().unwrap().load(Ordering::SeqCst),
        1
    );
    assert_eq!(sig.count(), 1);

    drop(receiver);
    sig.emit(()).unwrap();
    assert_eq!(sig.count(), 0);
}

#[test]
fn connect_dyn_unweakable_raises_no_weak_capability_by_default() {
    let receiver: Arc<dyn std::any::Any + Send + Sync> = Arc::new(AtomicUsize::new(0));
    let sig: SignalInstance<()> = SignalInstance::new("dyn-unweakable");

    let err = sig
        .connect_dyn(DynWeakHandle::Unweakable(receiver), OnRefError::Raise, |_, ()| {})
        .unwrap_err();

    assert!(matches!(err, SignalError::NoWeakCapability));
    assert_eq!(sig.count(), 0);
}

#[test]
fn connect_dyn_unweakable_falls_back_to_strong_when_ignored() {
    let observed = Arc::new(AtomicUsize::new(0));
    let observed2 = observed.clone();
    let receiver: Arc<dyn std::any::Any + Send + Sync> = Arc::new(AtomicUsize::new(0));
    let sig: SignalInstance<()> = SignalInstance::new("dyn-unweakable-ignore");

    sig.connect_dyn(DynWeakHandle::Unweakable(receiver), OnRefError::Ignore, move |r, ()| {
        let n = r.downcast_ref::<AtomicUsize>().unwrap().fetch_add(1, Ordering::SeqCst);
        observed2.store(n + 1, Ordering::SeqCst);
    })
    .unwrap();

    // The only `Arc` reference left is the one the slot retained strongly;
    // the connect call above moved the caller's own handle in.
    sig.emit(()).unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[test]
fn panicking_slot_is_wrapped_and_stops_emission_by_default() {
    let sig: SignalInstance<()> = SignalInstance::new("panicky");
    let calls = Arc::new(AtomicUsize::new(0));

    sig.connect(|()| panic!("boom"));
    let calls2 = calls.clone();
    sig.connect(move |()| {
        calls2.fetch_add(1, Ordering::SeqCst);
    });

    let err = sig.emit(()).unwrap_err();

    assert!(matches!(err, SignalError::EmitLoop(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn collect_error_policy_runs_every_slot_and_aggregates() {
    let sig: SignalInstance<()> = SignalInstance::with_error_policy("panicky", ErrorPolicy::Collect);
    let calls = Arc::new(AtomicUsize::new(0));

    sig.connect(|()| panic!("first"));
    let calls2 = calls.clone();
    sig.connect(move |()| {
        calls2.fetch_add(1, Ordering::SeqCst);
    });
    sig.connect(|()| panic!("second"));

    let err = sig.emit(()).unwrap_err();

    assert!(matches!(err, SignalError::EmitLoopMany(ref errs) if errs.len() == 2));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn reemission_queued_defers_nested_emit_to_end_of_outer_emission() {
    let sig: SignalInstance<(i32,)> =
        SignalInstance::with_error_policy("reentrant_emit", ErrorPolicy::default())
            .with_reemission(ReemissionPolicy::Queued);

    let order = Arc::new(Mutex::new(Vec::new()));
    let order2 = order.clone();
    let sig_clone = sig.clone();
    sig.connect(move |(n,)| {
        order2.lock().unwrap().push(n);
        if n == 1 {
            sig_clone.emit((2,)).unwrap();
            order2.lock().unwrap().push(-1);
        }
    });

    sig.emit((1,)).unwrap();

    assert_eq!(*order.lock().unwrap(), vec![1, -1, 2]);
}

#[test]
fn current_emitter_and_sender_are_visible_inside_a_slot() {
    struct Owner;

    let sig: SignalInstance<()> = SignalInstance::new("with_owner");
    let owner = Arc::new(Owner);
    sig.bind_owner(&owner);

    let seen_name = Arc::new(Mutex::new(String::new()));
    let seen_name2 = seen_name.clone();
    let saw_owner = Arc::new(Mutex::new(false));
    let saw_owner2 = saw_owner.clone();
    sig.connect(move |()| {
        if let Some(handle) = current_emitter() {
            *seen_name2.lock().unwrap() = handle.name().to_string();
        }
        *saw_owner2.lock().unwrap() = sender::<Owner>().is_some();
    });

    sig.emit(()).unwrap();

    assert_eq!(*seen_name.lock().unwrap(), "with_owner");
    assert!(*saw_owner.lock().unwrap());
    assert!(current_emitter().is_none());
}

#[test]
fn connect_setattr_and_setitem_update_receiver_on_emit() {
    let sig: SignalInstance<(i32,)> = SignalInstance::new("setattr");
    let target = Arc::new(Mutex::new(0));
    sig.connect_setattr(&target, |slot, value| *slot = value);
    sig.emit((9,)).unwrap();
    assert_eq!(*target.lock().unwrap(), 9);

    let map_sig: SignalInstance<(i32,)> = SignalInstance::new("setitem");
    let map_target: Arc<Mutex<HashMap<&'static str, i32>>> = Arc::new(Mutex::new(HashMap::new()));
    map_sig.connect_setitem(&map_target, "count");
    map_sig.emit((5,)).unwrap();
    assert_eq!(map_target.lock().unwrap().get("count"), Some(&5));
}

#[test]
fn queued_delivery_runs_on_drain_not_inline() {
    let sig: SignalInstance<(i32,)> = SignalInstance::new("queued");
    let target = ThreadTarget::new();
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let recorded2 = recorded.clone();
    sig.connect_on_thread(target, move |(n,)| recorded2.lock().unwrap().push(n));

    sig.emit((1,)).unwrap();
    sig.emit((2,)).unwrap();
    assert!(recorded.lock().unwrap().is_empty());

    let drained = Dispatcher::global().drain(target);
    assert_eq!(drained.ran, 2);
    assert!(drained.errors.is_empty());
    assert_eq!(*recorded.lock().unwrap(), vec![1, 2]);
}

#[test]
fn queued_delivery_reports_panic_without_crashing_the_drainer() {
    let sig: SignalInstance<(i32,)> = SignalInstance::new("queued-panicky");
    let target = ThreadTarget::new();
    sig.connect_on_thread(target, |(n,)| {
        if n == 2 {
            panic!("boom");
        }
    });

    sig.emit((1,)).unwrap();
    sig.emit((2,)).unwrap();
    sig.emit((3,)).unwrap();

    let drained = Dispatcher::global().drain(target);
    assert_eq!(drained.ran, 3);
    assert_eq!(drained.errors.len(), 1);
    assert_eq!(drained.errors[0].signal_name, "queued-panicky");
}

#[test]
fn emit_async_runs_on_a_worker_thread() {
    let sig: SignalInstance<(i32,)> = SignalInstance::new("async");
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let recorded2 = recorded.clone();
    sig.connect(move |(n,)| {
        thread::sleep(Duration::from_millis(30));
        recorded2.lock().unwrap().push(n);
    });

    let handle = sig.emit_async((1,));
    assert!(!handle.is_done() || !recorded.lock().unwrap().is_empty());
    let result = handle.result();
    assert!(matches!(result, Some(Ok(()))));
    assert_eq!(*recorded.lock().unwrap(), vec![1]);
}

#[test]
fn contains_reports_unique_keyed_connections() {
    let sig: SignalInstance<()> = SignalInstance::new("contains");
    let receiver = Arc::new(7);
    let key = SlotId::from_receiver(&receiver);
    assert!(!sig.contains(key));

    let opts = ConnectOptions { priority: 0, unique: Unique::Require(key) };
    let conn = sig.connect_with(|()| {}, opts).unwrap();
    assert!(sig.contains(key));

    conn.disconnect();
    assert!(!sig.contains(key));
}

#[test]
fn cancel_pause_discards_buffer_without_resuming() {
    let sig: SignalInstance<(i32,)> = SignalInstance::new("cancel_pause");
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let recorded2 = recorded.clone();
    sig.connect(move |(n,)| recorded2.lock().unwrap().push(n));

    sig.pause();
    sig.emit((1,)).unwrap();
    sig.emit((2,)).unwrap();
    sig.cancel_pause();
    sig.resume().unwrap();

    assert!(recorded.lock().unwrap().is_empty());
    assert!(!sig.paused());
}

#[test]
fn weak_signal_instance_upgrades_while_alive() {
    let sig: SignalInstance<()> = SignalInstance::new("weak_sig");
    let weak = sig.weak();
    assert!(weak.upgrade().is_some());

    drop(sig);
    assert!(weak.upgrade().is_none());
}

#[test]
fn partial_helper_binds_a_leading_argument_before_connecting() {
    let sig: SignalInstance<(i32,)> = SignalInstance::new("partial");
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let recorded2 = recorded.clone();

    sig.connect(partial("tag".to_string(), move |bound: String, (n,): (i32,)| {
        recorded2.lock().unwrap().push(format!("{bound}:{n}"));
    }));

    sig.emit((3,)).unwrap();
    assert_eq!(*recorded.lock().unwrap(), vec!["tag:3".to_string()]);
}

#[test]
fn scoped_connection_disconnects_on_drop() {
    let sig: SignalInstance<()> = SignalInstance::new("scoped");
    {
        let _conn = sig.connect(|()| {}).scoped();
        assert_eq!(sig.count(), 1);
    }
    assert_eq!(sig.count(), 0);
}

#[test]
fn signal_field_memoizes_the_same_instance_per_owner() {
    struct Widget {
        changed: Signal<(i32,)>,
    }

    let widget = Widget { changed: Signal::new("changed") };
    let count = Arc::new(AtomicUsize::new(0));
    let count2 = count.clone();
    widget.changed.connect(move |(n,)| {
        count2.fetch_add(n as usize, Ordering::SeqCst);
    });

    assert_eq!(widget.changed.count(), 1);
    widget.changed.emit((4,)).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 4);
}
