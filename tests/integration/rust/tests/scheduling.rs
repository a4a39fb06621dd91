//! Scheduler integration: many guest threads, timers, and parking.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use bytecode_system::{Method, Opcode};
use core_types::{ThreadStatus, Value};
use threading::{parker, JvmThread, NativeOutcome, Runtime};

#[test]
fn test_many_threads_run_to_completion() {
    let rt = Runtime::new(0);
    let idx = rt.register_method({
        let mut m = Method::new(
            "demo/Worker",
            "double",
            vec![Opcode::Iload(0), Opcode::Iconst(2), Opcode::Imul, Opcode::Ireturn],
        );
        m.max_locals = 1;
        m.arg_slots = 1;
        m
    });

    let results: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
    for n in 0..5 {
        let results = results.clone();
        rt.spawn_call(
            idx,
            vec![Value::Int(n)],
            Box::new(move |res| {
                results.borrow_mut().push(res.unwrap().0.unwrap());
            }),
        )
        .unwrap();
    }
    rt.run();

    let mut got = results.borrow().clone();
    got.sort_by_key(|v| v.as_int().unwrap());
    assert_eq!(
        got,
        vec![
            Value::Int(0),
            Value::Int(2),
            Value::Int(4),
            Value::Int(6),
            Value::Int(8)
        ]
    );
    assert!(rt.pool().borrow().threads().is_empty());
}

#[test]
fn test_sleep_native_resumes_from_timer() {
    let rt = Runtime::new(0);
    let sleep_idx = rt.register_method(Method::native("demo/Sys", "sleepBriefly", 0));
    rt.env().register_native(
        "demo/Sys",
        "sleepBriefly",
        Rc::new(|env, handle, _args| {
            let env2 = env.clone();
            let h = handle.clone();
            env.set_timeout(
                Duration::from_millis(2),
                Box::new(move || JvmThread::async_return(&env2, &h, None, None)),
            );
            NativeOutcome::Pending
        }),
    );
    let entry = rt.register_method(Method::new(
        "demo/Sys",
        "entry",
        vec![Opcode::Invoke(sleep_idx), Opcode::Iconst(9), Opcode::Ireturn],
    ));

    let result = Rc::new(Cell::new(None));
    {
        let result = result.clone();
        rt.spawn_call(entry, vec![], Box::new(move |res| result.set(Some(res))))
            .unwrap();
    }
    let start = Instant::now();
    rt.run();
    assert!(start.elapsed() >= Duration::from_millis(2));
    assert_eq!(result.take(), Some(Ok((Some(Value::Int(9)), None))));
}

#[test]
fn test_parked_daemon_does_not_block_shutdown() {
    let rt = Runtime::new(0);
    let park_idx = rt.register_method(Method::native("demo/Sys", "parkForever", 0));
    rt.env().register_native(
        "demo/Sys",
        "parkForever",
        Rc::new(|env, handle, _args| {
            parker::park(env, handle, Box::new(|| {}));
            NativeOutcome::Pending
        }),
    );
    let daemon_entry = rt.register_method(Method::new(
        "demo/Sys",
        "daemonMain",
        vec![Opcode::Invoke(park_idx), Opcode::Return],
    ));
    let main_entry = rt.register_method(Method::new(
        "demo/Sys",
        "main",
        vec![Opcode::Iconst(1), Opcode::Ireturn],
    ));

    let daemon = rt.spawn(daemon_entry, vec![]).unwrap();
    daemon.borrow_mut().set_daemon(true);
    let done = Rc::new(Cell::new(false));
    {
        let done = done.clone();
        rt.spawn_call(
            main_entry,
            vec![],
            Box::new(move |res| {
                assert_eq!(res.unwrap().0, Some(Value::Int(1)));
                done.set(true);
            }),
        )
        .unwrap();
    }
    rt.run();

    assert!(done.get());
    // The parked daemon is still alive but unscheduled, so the scheduler
    // drained without it.
    assert_eq!(rt.pool().borrow().threads().len(), 1);
    assert_eq!(daemon.borrow().status(), ThreadStatus::Parked);
}

#[test]
fn test_unpark_credit_lets_park_pass_through() {
    let rt = Runtime::new(0);
    let park_idx = rt.register_method(Method::native("demo/Sys", "parkOnce", 0));
    rt.env().register_native(
        "demo/Sys",
        "parkOnce",
        Rc::new(|env, handle, _args| {
            let env2 = env.clone();
            let h = handle.clone();
            parker::park(
                env,
                handle,
                Box::new(move || JvmThread::async_return(&env2, &h, None, None)),
            );
            NativeOutcome::Pending
        }),
    );
    let entry = rt.register_method(Method::new(
        "demo/Sys",
        "entry",
        vec![Opcode::Invoke(park_idx), Opcode::Iconst(3), Opcode::Ireturn],
    ));

    let result = Rc::new(Cell::new(None));
    let handle = {
        let result = result.clone();
        rt.spawn_call(entry, vec![], Box::new(move |res| result.set(Some(res))))
            .unwrap()
    };
    // Unpark before the thread ever parks: the credit makes the park a
    // no-op and the thread never suspends.
    parker::unpark(rt.env(), &handle);
    rt.run();
    assert_eq!(result.take(), Some(Ok((Some(Value::Int(3)), None))));
}
