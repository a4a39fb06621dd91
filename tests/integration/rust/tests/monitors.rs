//! Monitor integration: contention, wait/notify, and timed waits driven
//! through whole scheduler runs.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use bytecode_system::{Method, Opcode};
use core_types::{HeapObject, ObjectId, Value};
use integration_tests::run_to_completion;
use threading::{monitor, JvmThread, NativeOutcome, NativeReturn, Runtime};

type EventLog = Rc<RefCell<Vec<&'static str>>>;

fn record_native(rt: &Runtime, name: &'static str, log: &EventLog, event: &'static str) -> usize {
    let idx = rt.register_method(Method::native("demo/Log", name, 0));
    let log = log.clone();
    rt.env().register_native(
        "demo/Log",
        name,
        Rc::new(move |_, _, _| {
            log.borrow_mut().push(event);
            NativeOutcome::Return(NativeReturn::Void)
        }),
    );
    idx
}

fn alloc_object(rt: &Runtime) -> ObjectId {
    rt.env().heap.borrow_mut().alloc(HeapObject::new("demo/Shared"))
}

#[test]
fn test_blocked_thread_resumes_after_release() {
    let rt = Runtime::new(0);
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    let obj = alloc_object(&rt);

    // Holder: grabs the monitor, then releases it from a timer while the
    // other thread is blocked on entry.
    let hold_idx = rt.register_method(Method::native("demo/Lock", "holdThenRelease", 0));
    {
        let log = log.clone();
        rt.env().register_native(
            "demo/Lock",
            "holdThenRelease",
            Rc::new(move |env, handle, _| {
                let mon = env.monitor_for(obj);
                assert!(monitor::enter(&mon, handle, Box::new(|| {})));
                log.borrow_mut().push("held");
                let env2 = env.clone();
                let h = handle.clone();
                let id = h.borrow().id();
                let log = log.clone();
                env.set_timeout(
                    Duration::from_millis(2),
                    Box::new(move || {
                        log.borrow_mut().push("released");
                        let mon = env2.monitor_for(obj);
                        monitor::exit_by_id(&mon, id).unwrap();
                        JvmThread::async_return(&env2, &h, None, None);
                    }),
                );
                NativeOutcome::Pending
            }),
        );
    }
    let holder_entry = rt.register_method(Method::new(
        "demo/Lock",
        "holder",
        vec![Opcode::Invoke(hold_idx), Opcode::Return],
    ));
    let entered_idx = record_native(&rt, "entered", &log, "contender-in");
    let contender_entry = rt.register_method({
        let mut m = Method::new(
            "demo/Lock",
            "contender",
            vec![
                Opcode::Aload(0),
                Opcode::MonitorEnter,
                Opcode::Invoke(entered_idx),
                Opcode::Aload(0),
                Opcode::MonitorExit,
                Opcode::Return,
            ],
        );
        m.max_locals = 1;
        m.arg_slots = 1;
        m
    });

    rt.spawn(holder_entry, vec![]).unwrap();
    rt.spawn(contender_entry, vec![Value::Ref(obj)]).unwrap();
    rt.run();

    assert_eq!(*log.borrow(), vec!["held", "released", "contender-in"]);
    let mon = rt.env().monitor_for(obj);
    assert_eq!(mon.borrow().owner(), None);
    assert_eq!(mon.borrow().blocked_count(), 0);
}

#[test]
fn test_wait_notify_handoff() {
    let rt = Runtime::new(0);
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    let obj = alloc_object(&rt);

    // Waiter: enter, wait, and resume once notified and re-acquired.
    let await_idx = rt.register_method(Method::native("demo/Lock", "awaitSignal", 0));
    {
        let log = log.clone();
        rt.env().register_native(
            "demo/Lock",
            "awaitSignal",
            Rc::new(move |env, handle, _| {
                let mon = env.monitor_for(obj);
                assert!(monitor::enter(&mon, handle, Box::new(|| {})));
                log.borrow_mut().push("waiting");
                let env2 = env.clone();
                let h = handle.clone();
                let log = log.clone();
                monitor::wait(
                    env,
                    &mon,
                    handle,
                    None,
                    Box::new(move || {
                        log.borrow_mut().push("resumed");
                        let mon = env2.monitor_for(obj);
                        let id = h.borrow().id();
                        monitor::exit_by_id(&mon, id).unwrap();
                        JvmThread::async_return(&env2, &h, None, None);
                    }),
                )
                .unwrap();
                NativeOutcome::Pending
            }),
        );
    }
    let waiter_entry = rt.register_method(Method::new(
        "demo/Lock",
        "waiter",
        vec![Opcode::Invoke(await_idx), Opcode::Return],
    ));

    // Notifier: enter the (free) monitor, notify, and release.
    let poke_idx = rt.register_method(Method::native("demo/Lock", "poke", 0));
    {
        let log = log.clone();
        rt.env().register_native(
            "demo/Lock",
            "poke",
            Rc::new(move |env, handle, _| {
                let mon = env.monitor_for(obj);
                assert!(monitor::enter(&mon, handle, Box::new(|| {})));
                log.borrow_mut().push("notify");
                monitor::notify(env, &mon, handle).unwrap();
                monitor::exit(&mon, handle).unwrap();
                NativeOutcome::Return(NativeReturn::Void)
            }),
        );
    }
    let notifier_entry = rt.register_method(Method::new(
        "demo/Lock",
        "notifier",
        vec![Opcode::Invoke(poke_idx), Opcode::Return],
    ));

    rt.spawn(waiter_entry, vec![]).unwrap();
    rt.spawn(notifier_entry, vec![]).unwrap();
    rt.run();

    assert_eq!(*log.borrow(), vec!["waiting", "notify", "resumed"]);
    let mon = rt.env().monitor_for(obj);
    assert_eq!(mon.borrow().owner(), None);
    assert_eq!(mon.borrow().waiting_count(), 0);
    assert!(rt.pool().borrow().threads().is_empty());
}

#[test]
fn test_timed_wait_times_out() {
    let rt = Runtime::new(0);
    let obj = alloc_object(&rt);

    let await_idx = rt.register_method(Method::native("demo/Lock", "awaitTimed", 0));
    rt.env().register_native(
        "demo/Lock",
        "awaitTimed",
        Rc::new(move |env, handle, _| {
            let mon = env.monitor_for(obj);
            assert!(monitor::enter(&mon, handle, Box::new(|| {})));
            let env2 = env.clone();
            let h = handle.clone();
            monitor::wait(
                env,
                &mon,
                handle,
                Some(Duration::from_millis(1)),
                Box::new(move || {
                    let mon = env2.monitor_for(obj);
                    let id = h.borrow().id();
                    monitor::exit_by_id(&mon, id).unwrap();
                    JvmThread::async_return(&env2, &h, Some(Value::Int(1)), None);
                }),
            )
            .unwrap();
            NativeOutcome::Pending
        }),
    );
    let entry = rt.register_method(Method::new(
        "demo/Lock",
        "entry",
        vec![Opcode::Invoke(await_idx), Opcode::Ireturn],
    ));

    // Nobody notifies; the timeout re-acquires and resumes the waiter.
    let res = run_to_completion(&rt, entry, vec![]).unwrap();
    assert_eq!(res.0, Some(Value::Int(1)));
    let mon = rt.env().monitor_for(obj);
    assert_eq!(mon.borrow().owner(), None);
    assert_eq!(mon.borrow().waiting_count(), 0);
}

#[test]
fn test_monitor_exit_without_ownership_is_guest_error() {
    let rt = Runtime::new(0);
    let obj = alloc_object(&rt);
    let entry = rt.register_method({
        let mut m = Method::new(
            "demo/Lock",
            "badExit",
            vec![Opcode::Aload(0), Opcode::MonitorExit, Opcode::Return],
        );
        m.max_locals = 1;
        m.arg_slots = 1;
        m
    });
    let exc = run_to_completion(&rt, entry, vec![Value::Ref(obj)]).unwrap_err();
    assert_eq!(exc.class_name, "java/lang/IllegalMonitorStateException");
}

#[test]
fn test_synchronized_method_locks_class_mirror() {
    let rt = Runtime::new(0);
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    let inside_idx = record_native(&rt, "inside", &log, "inside");
    let entry = rt.register_method({
        let mut m = Method::new(
            "demo/Lock",
            "syncStatic",
            vec![Opcode::Invoke(inside_idx), Opcode::Return],
        );
        m.is_synchronized = true;
        m
    });
    assert!(run_to_completion(&rt, entry, vec![]).is_ok());
    assert_eq!(*log.borrow(), vec!["inside"]);

    // The mirror's monitor was acquired on entry and released on return.
    let mirror = rt.env().class_mirror("demo/Lock");
    let mon = rt.env().monitor_for(mirror);
    assert_eq!(mon.borrow().owner(), None);
    assert_eq!(mon.borrow().entry_count(), 0);
}
