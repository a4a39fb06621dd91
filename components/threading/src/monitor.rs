//! Reentrant object monitors.
//!
//! One monitor exists per contended object, created lazily by the runtime
//! environment. Handoff on release picks uniformly at random from the
//! blocked set; this is intentional and documented, not FIFO fairness.
//! Each monitor owns its own seeded RNG so contention outcomes are
//! reproducible under a fixed environment seed.
//!
//! Monitor operations are free functions over a shared [`MonitorRef`]
//! because they change thread status and invoke wake callbacks: every
//! callback runs with the monitor (and the affected thread) unborrowed,
//! so a woken thread's continuation may immediately re-enter monitor
//! code.
//!
//! `owner == None ⇔ count == 0` is an internal invariant. Guest misuse
//! (exiting or waiting on an unowned monitor) surfaces as a
//! `java/lang/IllegalMonitorStateException` throwable, never a panic.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use core_types::{ObjectId, ThreadStatus, Throwable};
use log::trace;
use rand::rngs::SmallRng;
use rand::Rng;
use scheduler::TimerId;

use crate::env::EnvRef;
use crate::thread::{JvmThread, ThreadHandle};

/// Shared handle to a monitor.
pub type MonitorRef = Rc<RefCell<Monitor>>;

/// Callback invoked once a contending or waiting thread re-acquires the
/// monitor. Runs with no cell borrowed.
pub type WakeCallback = Box<dyn FnOnce()>;

struct BlockedEntry {
    handle: ThreadHandle,
    /// Reentrancy count to restore on acquisition: 1 for a fresh enter,
    /// the saved count for a post-wait re-contention.
    count: usize,
    cb: WakeCallback,
}

struct WaitingEntry {
    handle: ThreadHandle,
    count: usize,
    cb: WakeCallback,
    timer: Option<TimerId>,
}

/// The monitor of one guest object.
pub struct Monitor {
    object: ObjectId,
    owner: Option<u32>,
    count: usize,
    blocked: HashMap<u32, BlockedEntry>,
    waiting: HashMap<u32, WaitingEntry>,
    rng: SmallRng,
}

impl Monitor {
    /// Create the monitor for `object`.
    pub fn new(object: ObjectId, rng: SmallRng) -> Self {
        Self {
            object,
            owner: None,
            count: 0,
            blocked: HashMap::new(),
            waiting: HashMap::new(),
            rng,
        }
    }

    /// The object this monitor guards.
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// The owning thread id, if held.
    pub fn owner(&self) -> Option<u32> {
        self.owner
    }

    /// The owner's reentrancy count.
    pub fn entry_count(&self) -> usize {
        self.count
    }

    /// Number of threads blocked on entry.
    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }

    /// Number of threads in the wait set.
    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }
}

fn illegal_state(message: &str) -> Throwable {
    Throwable::new("java/lang/IllegalMonitorStateException", message)
}

/// Acquire the monitor, or block the thread until handed off. Returns
/// true when the caller holds the monitor on return; otherwise the thread
/// is `Blocked` and `cb` fires after a future handoff.
pub fn enter(monitor: &MonitorRef, handle: &ThreadHandle, cb: WakeCallback) -> bool {
    let thread_id = handle.borrow().id();
    {
        let mut m = monitor.borrow_mut();
        if m.owner == Some(thread_id) {
            m.count += 1;
            return true;
        }
    }
    contend(monitor, handle, 1, ThreadStatus::Blocked, cb).is_some()
}

/// Claim an ownerless monitor with the given count, or join the blocked
/// set. Returns the callback when acquired immediately so the caller can
/// run it (or drop it) itself.
fn contend(
    monitor: &MonitorRef,
    handle: &ThreadHandle,
    count: usize,
    block_status: ThreadStatus,
    cb: WakeCallback,
) -> Option<WakeCallback> {
    let thread_id = handle.borrow().id();
    let object = monitor.borrow().object;
    {
        let mut m = monitor.borrow_mut();
        if m.owner.is_none() {
            debug_assert_eq!(m.count, 0, "ownerless monitor with nonzero count");
            m.owner = Some(thread_id);
            m.count = count;
            drop(m);
            handle.borrow_mut().clear_blocked_on();
            return Some(cb);
        }
        m.blocked.insert(
            thread_id,
            BlockedEntry {
                handle: handle.clone(),
                count,
                cb,
            },
        );
    }
    handle.borrow_mut().set_blocked_on(object);
    JvmThread::set_status(handle, block_status);
    None
}

/// Release one level of the calling thread's hold.
pub fn exit(monitor: &MonitorRef, handle: &ThreadHandle) -> Result<(), Throwable> {
    exit_by_id(monitor, handle.borrow().id())
}

/// Release one level of ownership for `thread_id`. Used directly during
/// exception propagation, when the owning thread's frame stack is being
/// unwound by engine code.
pub fn exit_by_id(monitor: &MonitorRef, thread_id: u32) -> Result<(), Throwable> {
    let released = {
        let mut m = monitor.borrow_mut();
        if m.owner != Some(thread_id) {
            return Err(illegal_state("thread does not own the monitor"));
        }
        m.count -= 1;
        if m.count == 0 {
            m.owner = None;
            true
        } else {
            false
        }
    };
    if released {
        appoint_new_owner(monitor);
    }
    Ok(())
}

/// Hand an ownerless monitor to a uniformly random blocked thread, waking
/// it. No-op when nothing is blocked.
fn appoint_new_owner(monitor: &MonitorRef) {
    let entry = {
        let mut m = monitor.borrow_mut();
        debug_assert!(m.owner.is_none(), "handoff on an owned monitor");
        if m.blocked.is_empty() {
            None
        } else {
            let keys: Vec<u32> = m.blocked.keys().copied().collect();
            let pick = keys[m.rng.gen_range(0..keys.len())];
            let entry = m.blocked.remove(&pick);
            if let Some(e) = &entry {
                m.owner = Some(pick);
                m.count = e.count;
                trace!("monitor {:?} handed to thread {}", m.object, pick);
            }
            entry
        }
    };
    if let Some(e) = entry {
        e.handle.borrow_mut().clear_blocked_on();
        JvmThread::set_status(&e.handle, ThreadStatus::Runnable);
        (e.cb)();
    }
}

/// Release the monitor completely and join the wait set, remembering the
/// reentrancy count. `cb` fires after a notify (or timeout) once the
/// monitor has been re-acquired with the saved count.
pub fn wait(
    env: &EnvRef,
    monitor: &MonitorRef,
    handle: &ThreadHandle,
    timeout: Option<Duration>,
    cb: WakeCallback,
) -> Result<(), Throwable> {
    let thread_id = handle.borrow().id();
    if monitor.borrow().owner != Some(thread_id) {
        return Err(illegal_state(
            "cannot wait on a monitor the thread does not own",
        ));
    }
    let timer = timeout.and_then(|delay| {
        let env2 = env.clone();
        let mon = monitor.clone();
        let h = handle.clone();
        env.set_timeout(
            delay,
            Box::new(move || unwait(&env2, &mon, &h, true, None)),
        )
    });
    let object = {
        let mut m = monitor.borrow_mut();
        let count = m.count;
        m.owner = None;
        m.count = 0;
        m.waiting.insert(
            thread_id,
            WaitingEntry {
                handle: handle.clone(),
                count,
                cb,
                timer,
            },
        );
        m.object
    };
    handle.borrow_mut().set_blocked_on(object);
    JvmThread::set_status(
        handle,
        if timeout.is_some() {
            ThreadStatus::TimedWaiting
        } else {
            ThreadStatus::Waiting
        },
    );
    appoint_new_owner(monitor);
    Ok(())
}

/// Remove a thread from the wait set and re-contend for the monitor with
/// its saved count, uninterruptibly. `override_cb` replaces the stored
/// wait callback (the interrupt path substitutes one that throws).
pub fn unwait(
    env: &EnvRef,
    monitor: &MonitorRef,
    handle: &ThreadHandle,
    from_timer: bool,
    override_cb: Option<WakeCallback>,
) {
    let thread_id = handle.borrow().id();
    let entry = monitor.borrow_mut().waiting.remove(&thread_id);
    let Some(entry) = entry else {
        // A stale timer can fire after a notify already woke the thread.
        trace!("unwait for thread {} with no wait entry", thread_id);
        return;
    };
    if !from_timer {
        if let Some(t) = entry.timer {
            env.cancel_timer(t);
        }
    }
    let cb = override_cb.unwrap_or(entry.cb);
    if let Some(cb) = contend(
        monitor,
        handle,
        entry.count,
        ThreadStatus::UninterruptiblyBlocked,
        cb,
    ) {
        JvmThread::set_status(handle, ThreadStatus::Runnable);
        cb();
    }
}

/// Wake one random waiter. Owner-checked.
pub fn notify(env: &EnvRef, monitor: &MonitorRef, handle: &ThreadHandle) -> Result<(), Throwable> {
    let thread_id = handle.borrow().id();
    let target = {
        let mut m = monitor.borrow_mut();
        if m.owner != Some(thread_id) {
            return Err(illegal_state(
                "cannot notify on a monitor the thread does not own",
            ));
        }
        if m.waiting.is_empty() {
            None
        } else {
            let keys: Vec<u32> = m.waiting.keys().copied().collect();
            let pick = keys[m.rng.gen_range(0..keys.len())];
            m.waiting.get(&pick).map(|e| e.handle.clone())
        }
    };
    if let Some(h) = target {
        unwait(env, monitor, &h, false, None);
    }
    Ok(())
}

/// Wake every waiter. Owner-checked.
pub fn notify_all(
    env: &EnvRef,
    monitor: &MonitorRef,
    handle: &ThreadHandle,
) -> Result<(), Throwable> {
    let thread_id = handle.borrow().id();
    let targets: Vec<ThreadHandle> = {
        let m = monitor.borrow();
        if m.owner != Some(thread_id) {
            return Err(illegal_state(
                "cannot notify on a monitor the thread does not own",
            ));
        }
        m.waiting.values().map(|e| e.handle.clone()).collect()
    };
    for h in targets {
        unwait(env, monitor, &h, false, None);
    }
    Ok(())
}

/// Remove a blocked thread from the entry set without handing it the
/// monitor. Interrupt path: the stored wake callback is discarded and the
/// caller delivers the interrupt exception instead.
pub fn unblock(monitor: &MonitorRef, handle: &ThreadHandle) {
    let thread_id = handle.borrow().id();
    let removed = monitor.borrow_mut().blocked.remove(&thread_id);
    if removed.is_some() {
        handle.borrow_mut().clear_blocked_on();
        JvmThread::set_status(handle, ThreadStatus::Runnable);
    }
}

/// Forcibly erase a thread's presence on this monitor (forced shutdown).
/// Releases ownership outright and hands the monitor off if held.
pub fn discard(env: &EnvRef, monitor: &MonitorRef, thread_id: u32) {
    let (was_owner, timer) = {
        let mut m = monitor.borrow_mut();
        m.blocked.remove(&thread_id);
        let timer = m.waiting.remove(&thread_id).and_then(|e| e.timer);
        let was_owner = m.owner == Some(thread_id);
        if was_owner {
            m.owner = None;
            m.count = 0;
        }
        (was_owner, timer)
    };
    if let Some(t) = timer {
        env.cancel_timer(t);
    }
    if was_owner {
        appoint_new_owner(monitor);
    }
}
