//! The guest thread: status machine, frame stack, and command loop.
//!
//! A thread never executes guest actions while any cell is borrowed. Each
//! step borrows the thread once to let the top frame produce a command
//! (an [`OpOutcome`], a native invocation, an internal completion), then
//! releases the borrow and applies the command. Monitor handoffs, native
//! functions, resolver callbacks, and completions therefore always see a
//! quiescent thread they may freely re-enter.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Instant;

use bytecode_system::Method;
use core_types::{HeapObject, ObjectId, ThreadStatus, Throwable, Value};
use log::trace;
use scheduler::{notify_status_change, PoolThread, ThreadPool};

use crate::collab::NativeOutcome;
use crate::env::{EnvRef, RuntimeEnv};
use crate::frame::{
    BytecodeFrame, CompletionResult, Frame, NativeFrame, OpOutcome,
};
use crate::interp;
use crate::monitor;
use crate::parker;

/// Shared handle to a thread.
pub type ThreadHandle = Rc<RefCell<JvmThread>>;

/// Default scheduling priority.
const DEFAULT_PRIORITY: u8 = 5;

fn interrupted_exception() -> Throwable {
    Throwable::new("java/lang/InterruptedException", "interrupted")
}

/// A guest thread.
pub struct JvmThread {
    id: u32,
    status: ThreadStatus,
    pub(crate) frames: Vec<Frame>,
    interrupted: bool,
    daemon: bool,
    priority: u8,
    blocked_on: Option<ObjectId>,
    env: Weak<RuntimeEnv>,
    pool: Weak<RefCell<ThreadPool<JvmThread>>>,
}

/// What the top frame asked the thread to do, computed under a borrow and
/// applied after releasing it.
enum StepCmd {
    Op(OpOutcome),
    SyncEntry,
    RunNative,
    CompleteInternal(Option<CompletionResult>),
}

/// Where exception search left off for the current top frame.
enum Disposition {
    /// A handler matched in the top bytecode frame.
    Install { handler_pc: usize },
    /// Unresolved catch types cover the pc; suspend and resolve them once.
    Defer { names: Vec<String> },
    /// No handler: pop the bytecode frame, releasing this entry monitor.
    PopSync(Option<ObjectId>),
    PopNative,
    PopInternal,
    Uncaught,
}

impl JvmThread {
    /// Create a thread in the `New` state and register it with the pool.
    pub fn new(env: &EnvRef) -> ThreadHandle {
        let pool = env.pool();
        let handle = Rc::new(RefCell::new(JvmThread {
            id: env.next_thread_id(),
            status: ThreadStatus::New,
            frames: Vec::new(),
            interrupted: false,
            daemon: false,
            priority: DEFAULT_PRIORITY,
            blocked_on: None,
            env: Rc::downgrade(env),
            pool: pool.as_ref().map(Rc::downgrade).unwrap_or_default(),
        }));
        if let Some(pool) = pool {
            pool.borrow_mut().register(handle.clone());
        }
        handle
    }

    /// The thread id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    /// The interrupt flag. Set by `interrupt` on a thread that cannot take
    /// delivery; cleared when the interrupt exception is delivered.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Clear the interrupt flag, returning its prior value.
    pub fn clear_interrupted(&mut self) -> bool {
        std::mem::replace(&mut self.interrupted, false)
    }

    /// True for daemon threads.
    pub fn is_daemon(&self) -> bool {
        self.daemon
    }

    /// Mark the thread as a daemon. Only meaningful before it terminates.
    pub fn set_daemon(&mut self, daemon: bool) {
        self.daemon = daemon;
    }

    /// Scheduling priority.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// The object whose monitor this thread is blocked or waiting on.
    pub fn blocked_on(&self) -> Option<ObjectId> {
        self.blocked_on
    }

    pub(crate) fn set_blocked_on(&mut self, object: ObjectId) {
        self.blocked_on = Some(object);
    }

    pub(crate) fn clear_blocked_on(&mut self) {
        self.blocked_on = None;
    }

    /// The frame stack, top last.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Push an entry frame. Used when seeding a new thread.
    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Transition the status, validating against the whitelist and
    /// notifying the pool. A no-op when the status is unchanged.
    pub fn set_status(handle: &ThreadHandle, new: ThreadStatus) {
        let (id, old, pool) = {
            let mut t = handle.borrow_mut();
            let old = t.status;
            if old == new {
                return;
            }
            debug_assert!(
                old.can_transition_to(new),
                "illegal thread state transition: {old:?} -> {new:?}"
            );
            t.status = new;
            (t.id, old, t.pool.clone())
        };
        trace!("thread {id} {old:?} -> {new:?}");
        if let Some(pool) = pool.upgrade() {
            notify_status_change(&pool, handle, old, new);
        }
    }

    /// Change priority and re-weight the scheduler rotation.
    pub fn set_priority(handle: &ThreadHandle, priority: u8) {
        let p = priority.clamp(1, 10);
        let pool = {
            let mut t = handle.borrow_mut();
            t.priority = p;
            t.pool.clone()
        };
        if let Some(pool) = pool.upgrade() {
            pool.borrow_mut().priority_change(handle);
        }
    }

    /// Execute one command of the top frame.
    pub(crate) fn step_once(env: &EnvRef, handle: &ThreadHandle) {
        let cmd = {
            let mut t = handle.borrow_mut();
            match t.frames.last_mut() {
                None => return,
                Some(Frame::Bytecode(bf)) => {
                    if bf.method.is_synchronized && !bf.lock_acquired {
                        StepCmd::SyncEntry
                    } else {
                        let mut heap = env.heap.borrow_mut();
                        StepCmd::Op(interp::step(bf, &mut heap))
                    }
                }
                Some(Frame::Native(_)) => StepCmd::RunNative,
                Some(Frame::Internal(inf)) => StepCmd::CompleteInternal(inf.pending.take()),
            }
        };
        match cmd {
            StepCmd::Op(OpOutcome::Continue) => {}
            StepCmd::Op(OpOutcome::Invoke(idx)) => Self::do_invoke(env, handle, idx),
            StepCmd::Op(OpOutcome::ReturnVoid) => Self::do_return(env, handle, None, None),
            StepCmd::Op(OpOutcome::Return1(v)) => Self::do_return(env, handle, Some(v), None),
            StepCmd::Op(OpOutcome::Return2(a, b)) => {
                Self::do_return(env, handle, Some(a), Some(b))
            }
            StepCmd::Op(OpOutcome::Throw(t)) => Self::throw_on(env, handle, t),
            StepCmd::Op(OpOutcome::MonitorEnter(obj)) => {
                let mon = env.monitor_for(obj);
                monitor::enter(&mon, handle, Box::new(|| {}));
            }
            StepCmd::Op(OpOutcome::MonitorExit(obj)) => {
                let mon = env.monitor_for(obj);
                match monitor::exit(&mon, handle) {
                    Ok(()) => {
                        if let Some(Frame::Bytecode(bf)) =
                            handle.borrow_mut().frames.last_mut()
                        {
                            bf.pc += 1;
                        }
                    }
                    Err(t) => Self::throw_on(env, handle, t),
                }
            }
            StepCmd::SyncEntry => Self::acquire_entry_monitor(env, handle),
            StepCmd::RunNative => Self::run_native(env, handle),
            StepCmd::CompleteInternal(pending) => Self::complete_internal(handle, pending),
        }
    }

    fn do_invoke(env: &EnvRef, handle: &ThreadHandle, idx: usize) {
        let callee = env.methods.borrow().get(idx);
        let Some(callee) = callee else {
            debug_assert!(false, "invoke of unregistered method index {idx}");
            Self::throw_on(
                env,
                handle,
                Throwable::new("java/lang/NoSuchMethodError", format!("method index {idx}")),
            );
            return;
        };
        let args = {
            let mut t = handle.borrow_mut();
            let Some(Frame::Bytecode(bf)) = t.frames.last_mut() else {
                debug_assert!(false, "invoke from a non-bytecode frame");
                return;
            };
            debug_assert!(
                bf.stack.len() >= callee.arg_slots,
                "operand stack underflow at invoke of {}",
                callee.full_signature()
            );
            let n = callee.arg_slots.min(bf.stack.len());
            bf.stack.split_off(bf.stack.len() - n)
        };
        if callee.is_native {
            match env.native(&callee.class_name, &callee.name) {
                Some(func) => handle.borrow_mut().frames.push(Frame::Native(NativeFrame {
                    method: callee,
                    func,
                    args,
                    executed: false,
                })),
                None => Self::throw_on(
                    env,
                    handle,
                    Throwable::new("java/lang/UnsatisfiedLinkError", callee.full_signature()),
                ),
            }
        } else {
            handle
                .borrow_mut()
                .frames
                .push(Frame::Bytecode(BytecodeFrame::new(callee, args)));
        }
    }

    /// Pop the top frame and deliver the return slots to the frame below.
    /// Releases the entry monitor of a synchronized bytecode frame first.
    fn do_return(env: &EnvRef, handle: &ThreadHandle, rv1: Option<Value>, rv2: Option<Value>) {
        let sync_obj = {
            let t = handle.borrow();
            match t.frames.last() {
                Some(Frame::Bytecode(bf)) if bf.method.is_synchronized && bf.lock_acquired => {
                    Some(Self::sync_target(env, bf))
                }
                _ => None,
            }
        };
        let thread_id = handle.borrow().id;
        let popped = handle.borrow_mut().frames.pop();
        debug_assert!(popped.is_some(), "return with no frame");
        if let Some(obj) = sync_obj {
            let mon = env.monitor_for(obj);
            let released = monitor::exit_by_id(&mon, thread_id);
            debug_assert!(released.is_ok(), "synchronized frame did not own its monitor");
        }
        if let Some(top) = handle.borrow_mut().frames.last_mut() {
            top.schedule_resume(rv1, rv2);
        }
    }

    /// The object a synchronized method locks: the class mirror for static
    /// methods, the receiver otherwise.
    fn sync_target(env: &EnvRef, bf: &BytecodeFrame) -> ObjectId {
        if bf.method.is_static {
            env.class_mirror(&bf.method.class_name)
        } else {
            match bf.locals.first() {
                Some(Value::Ref(id)) => *id,
                _ => {
                    debug_assert!(false, "synchronized instance method without receiver");
                    env.class_mirror(&bf.method.class_name)
                }
            }
        }
    }

    fn acquire_entry_monitor(env: &EnvRef, handle: &ThreadHandle) {
        let target = {
            let t = handle.borrow();
            let Some(Frame::Bytecode(bf)) = t.frames.last() else {
                return;
            };
            if bf.method.is_static {
                Ok(env.class_mirror(&bf.method.class_name))
            } else {
                match bf.locals.first() {
                    Some(Value::Ref(id)) => Ok(*id),
                    _ => Err(Throwable::new(
                        "java/lang/NullPointerException",
                        "null receiver for synchronized method",
                    )),
                }
            }
        };
        match target {
            Err(t) => Self::throw_on(env, handle, t),
            Ok(obj) => {
                let mon = env.monitor_for(obj);
                let h = handle.clone();
                let acquired = monitor::enter(
                    &mon,
                    handle,
                    Box::new(move || {
                        if let Some(Frame::Bytecode(bf)) = h.borrow_mut().frames.last_mut() {
                            bf.lock_acquired = true;
                        }
                    }),
                );
                if acquired {
                    if let Some(Frame::Bytecode(bf)) = handle.borrow_mut().frames.last_mut() {
                        bf.lock_acquired = true;
                    }
                }
            }
        }
    }

    fn run_native(env: &EnvRef, handle: &ThreadHandle) {
        let (func, args) = {
            let mut t = handle.borrow_mut();
            let Some(Frame::Native(nf)) = t.frames.last_mut() else {
                return;
            };
            debug_assert!(!nf.executed, "native frame stepped twice");
            nf.executed = true;
            (nf.func.clone(), nf.args.clone())
        };
        match func(env, handle, &args) {
            NativeOutcome::Return(nr) => {
                let (a, b) = nr.into_slots();
                Self::do_return(env, handle, a, b);
            }
            NativeOutcome::Throw(t) => Self::throw_on(env, handle, t),
            NativeOutcome::Pending => {
                // The native may already have completed re-entrantly (a
                // callback fired before it returned); only suspend if its
                // frame is still on top.
                let still_top = matches!(
                    handle.borrow().frames.last(),
                    Some(Frame::Native(nf)) if nf.executed
                );
                if still_top && handle.borrow().status == ThreadStatus::Runnable {
                    Self::set_status(handle, ThreadStatus::AsyncWaiting);
                }
            }
        }
    }

    fn complete_internal(handle: &ThreadHandle, pending: Option<CompletionResult>) {
        debug_assert!(
            pending.is_some(),
            "internal frame stepped with no scheduled result"
        );
        let result = pending.unwrap_or(Ok((None, None)));
        let completion = {
            let mut t = handle.borrow_mut();
            match t.frames.pop() {
                Some(Frame::Internal(inf)) => inf.completion,
                _ => {
                    debug_assert!(false, "internal completion on a non-internal frame");
                    None
                }
            }
        };
        if let Some(c) = completion {
            c(result);
        }
    }

    /// Host-side completion of a suspended operation: pop the current
    /// frame and resume the caller with the given slots. Legal only while
    /// `Runnable` or `AsyncWaiting`.
    pub fn async_return(
        env: &EnvRef,
        handle: &ThreadHandle,
        rv1: Option<Value>,
        rv2: Option<Value>,
    ) {
        let status = handle.borrow().status;
        debug_assert!(
            matches!(status, ThreadStatus::Runnable | ThreadStatus::AsyncWaiting),
            "async_return while {status:?}"
        );
        Self::do_return(env, handle, rv1, rv2);
        if handle.borrow().status == ThreadStatus::AsyncWaiting {
            Self::set_status(handle, ThreadStatus::Runnable);
        }
    }

    /// Raise a guest exception on this thread: search the frame stack top
    /// down for a handler, unwinding frames (and their entry monitors) as
    /// the search passes them.
    pub fn throw_on(env: &EnvRef, handle: &ThreadHandle, exc: Throwable) {
        let mut exc = exc;
        loop {
            let disp = {
                let t = handle.borrow();
                match t.frames.last() {
                    None => Disposition::Uncaught,
                    Some(Frame::Native(_)) => Disposition::PopNative,
                    Some(Frame::Internal(_)) => Disposition::PopInternal,
                    Some(Frame::Bytecode(bf)) => Self::bytecode_disposition(env, bf, &exc),
                }
            };
            match disp {
                Disposition::Install { handler_pc } => {
                    let obj = match exc.object {
                        Some(id) => id,
                        None => env
                            .heap
                            .borrow_mut()
                            .alloc(HeapObject::new(exc.class_name.clone())),
                    };
                    exc.object = Some(obj);
                    let mut t = handle.borrow_mut();
                    if let Some(Frame::Bytecode(bf)) = t.frames.last_mut() {
                        bf.stack.clear();
                        bf.stack.push(Value::Ref(obj));
                        bf.pc = handler_pc;
                    }
                    return;
                }
                Disposition::Defer { names } => {
                    let Some(resolver) = env.resolver() else {
                        debug_assert!(false, "deferral without a resolver");
                        return;
                    };
                    Self::set_status(handle, ThreadStatus::AsyncWaiting);
                    let env2 = env.clone();
                    let h = handle.clone();
                    let exc2 = exc.clone();
                    resolver.resolve(
                        &names,
                        Box::new(move |_| {
                            JvmThread::set_status(&h, ThreadStatus::Runnable);
                            JvmThread::throw_on(&env2, &h, exc2);
                        }),
                    );
                    return;
                }
                Disposition::PopSync(sync_obj) => {
                    let thread_id = handle.borrow().id;
                    handle.borrow_mut().frames.pop();
                    if let Some(obj) = sync_obj {
                        let mon = env.monitor_for(obj);
                        let released = monitor::exit_by_id(&mon, thread_id);
                        debug_assert!(
                            released.is_ok(),
                            "synchronized frame did not own its monitor"
                        );
                    }
                }
                Disposition::PopNative => {
                    handle.borrow_mut().frames.pop();
                }
                Disposition::PopInternal => {
                    let completion = match handle.borrow_mut().frames.pop() {
                        Some(Frame::Internal(inf)) => inf.completion,
                        _ => None,
                    };
                    // The completion consumes the exception; it is the
                    // continuation for failure as well as success.
                    if let Some(c) = completion {
                        c(Err(exc));
                        return;
                    }
                }
                Disposition::Uncaught => {
                    let id = handle.borrow().id;
                    Self::set_status(handle, ThreadStatus::Terminated);
                    env.report_uncaught(id, &exc);
                    return;
                }
            }
        }
    }

    /// Decide how exception search treats the top bytecode frame.
    ///
    /// Entries are scanned strictly in table order. An unresolved catch
    /// type ahead of the first definite match gets one resolution attempt
    /// (all such names resolve together, then the throw retries); entries
    /// at or past a definite match are never consulted, so a later
    /// unresolved entry cannot force a suspension. After its single
    /// attempt a still-unresolved entry is treated as non-matching.
    fn bytecode_disposition(env: &EnvRef, bf: &BytecodeFrame, exc: &Throwable) -> Disposition {
        let resolver = env.resolver();
        // Unresolved catch types seen before a definite match.
        let mut names = Vec::new();
        for entry in &bf.method.exception_table {
            if !entry.covers(bf.pc) {
                continue;
            }
            let matched = match &entry.catch_type {
                None => true,
                Some(name) => match &resolver {
                    Some(res) => {
                        if res.lookup(name).is_none() {
                            if !entry.resolution_attempted.get() {
                                entry.resolution_attempted.set(true);
                                names.push(name.clone());
                            }
                            continue;
                        }
                        res.is_castable(&exc.class_name, name)
                    }
                    None => exc.class_name == *name,
                },
            };
            if matched {
                if names.is_empty() {
                    return Disposition::Install {
                        handler_pc: entry.handler_pc,
                    };
                }
                // An earlier unresolved entry could still take precedence.
                break;
            }
        }
        if !names.is_empty() {
            return Disposition::Defer { names };
        }
        Disposition::PopSync(if bf.method.is_synchronized && bf.lock_acquired {
            Some(Self::sync_target(env, bf))
        } else {
            None
        })
    }

    /// Interrupt the thread with per-state semantics. Delivery of the
    /// interrupt exception clears the flag; a thread that cannot take
    /// delivery just records it.
    pub fn interrupt(env: &EnvRef, handle: &ThreadHandle) {
        let (status, blocked_on) = {
            let t = handle.borrow();
            (t.status, t.blocked_on)
        };
        match status {
            ThreadStatus::Blocked => {
                if let Some(obj) = blocked_on {
                    let mon = env.monitor_for(obj);
                    monitor::unblock(&mon, handle);
                }
                handle.borrow_mut().interrupted = false;
                Self::throw_on(env, handle, interrupted_exception());
            }
            ThreadStatus::Waiting | ThreadStatus::TimedWaiting => {
                if let Some(obj) = blocked_on {
                    let mon = env.monitor_for(obj);
                    let env2 = env.clone();
                    let h = handle.clone();
                    monitor::unwait(
                        env,
                        &mon,
                        handle,
                        false,
                        Some(Box::new(move || {
                            h.borrow_mut().interrupted = false;
                            JvmThread::throw_on(&env2, &h, interrupted_exception());
                        })),
                    );
                }
            }
            ThreadStatus::Parked => {
                parker::completely_unpark(env, handle);
                if handle.borrow().status == ThreadStatus::AsyncWaiting {
                    Self::set_status(handle, ThreadStatus::Runnable);
                }
                handle.borrow_mut().interrupted = false;
                Self::throw_on(env, handle, interrupted_exception());
            }
            ThreadStatus::Terminated => {}
            _ => {
                handle.borrow_mut().interrupted = true;
            }
        }
    }

    /// Forced shutdown: abandon all frames, release held monitors, and
    /// terminate. The only path by which a `New` thread terminates.
    pub fn terminate(env: &EnvRef, handle: &ThreadHandle) {
        let (id, blocked_on) = {
            let t = handle.borrow();
            (t.id, t.blocked_on)
        };
        if let Some(obj) = blocked_on {
            let mon = env.monitor_for(obj);
            monitor::discard(env, &mon, id);
        }
        let held: Vec<ObjectId> = {
            let t = handle.borrow();
            t.frames
                .iter()
                .filter_map(|f| match f {
                    Frame::Bytecode(bf) if bf.method.is_synchronized && bf.lock_acquired => {
                        Some(Self::sync_target(env, bf))
                    }
                    _ => None,
                })
                .collect()
        };
        handle.borrow_mut().frames.clear();
        handle.borrow_mut().blocked_on = None;
        for obj in held {
            let mon = env.monitor_for(obj);
            // Best effort: the hold may already have been discarded above.
            let _ = monitor::exit_by_id(&mon, id);
        }
        Self::set_status(handle, ThreadStatus::Terminated);
    }
}

impl PoolThread for JvmThread {
    fn thread_id(&self) -> u32 {
        self.id
    }

    fn status(&self) -> ThreadStatus {
        self.status
    }

    fn is_daemon(&self) -> bool {
        self.daemon
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn run_quantum(handle: &Rc<RefCell<Self>>) {
        let Some(env) = handle.borrow().env.upgrade() else {
            return;
        };
        let Some(pool) = handle.borrow().pool.upgrade() else {
            return;
        };
        let budget = pool.borrow().suggested_quantum();
        let start = Instant::now();
        let mut steps = 0u32;
        while steps < budget && handle.borrow().status == ThreadStatus::Runnable {
            if handle.borrow().frames.is_empty() {
                JvmThread::set_status(handle, ThreadStatus::Terminated);
                break;
            }
            steps += 1;
            JvmThread::step_once(&env, handle);
        }
        pool.borrow_mut().record_quantum(steps.max(1), start.elapsed());
    }
}

/// Seed a new thread with an entry invocation of `method` and make it
/// runnable.
pub fn start_thread(env: &EnvRef, method: Rc<Method>, args: Vec<Value>) -> ThreadHandle {
    let handle = JvmThread::new(env);
    handle
        .borrow_mut()
        .push_frame(Frame::Bytecode(BytecodeFrame::new(method, args)));
    JvmThread::set_status(&handle, ThreadStatus::Runnable);
    handle
}
