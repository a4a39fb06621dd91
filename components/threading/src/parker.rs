//! The park/unpark protocol.
//!
//! Park and unpark requests are counted per thread and may arrive in
//! either order: an unpark before any park leaves a credit that makes the
//! next park a no-op. A thread whose balance goes positive parks; when an
//! unpark brings the balance back down the thread wakes through
//! `AsyncWaiting` and its stored callback runs (typically an
//! `async_return` into the parked native frame).

use std::collections::HashMap;

use core_types::ThreadStatus;

use crate::env::RuntimeEnv;
use crate::thread::{JvmThread, ThreadHandle};

/// Wake callback type shared with the monitor module.
pub type ParkCallback = Box<dyn FnOnce()>;

/// Per-thread park balances and wake callbacks. Pure bookkeeping; status
/// changes happen in the free functions below with the parker unborrowed.
#[derive(Default)]
pub struct Parker {
    counts: HashMap<u32, i32>,
    callbacks: HashMap<u32, ParkCallback>,
}

impl Parker {
    /// Create an empty parker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a park request; true if the thread should now park.
    fn note_park(&mut self, id: u32) -> bool {
        let c = self.counts.entry(id).or_insert(0);
        *c += 1;
        *c > 0
    }

    /// Account for an unpark; true if the balance is now non-positive.
    fn note_unpark(&mut self, id: u32) -> bool {
        let c = self.counts.entry(id).or_insert(0);
        *c -= 1;
        *c <= 0
    }

    /// The park balance for a thread (0 if never seen).
    pub fn balance(&self, id: u32) -> i32 {
        self.counts.get(&id).copied().unwrap_or(0)
    }
}

/// Park the thread, or consume an unpark credit and run `cb` immediately.
pub fn park(env: &RuntimeEnv, handle: &ThreadHandle, cb: ParkCallback) {
    let id = handle.borrow().id();
    let should_park = env.parker.borrow_mut().note_park(id);
    if should_park {
        env.parker.borrow_mut().callbacks.insert(id, cb);
        JvmThread::set_status(handle, ThreadStatus::Parked);
    } else {
        cb();
    }
}

/// Deliver one unpark, waking the thread if its balance is satisfied.
pub fn unpark(env: &RuntimeEnv, handle: &ThreadHandle) {
    let id = handle.borrow().id();
    let satisfied = env.parker.borrow_mut().note_unpark(id);
    if satisfied {
        wake(env, handle, id);
    }
}

/// Zero the thread's balance and wake it regardless of pending parks.
pub fn completely_unpark(env: &RuntimeEnv, handle: &ThreadHandle) {
    let id = handle.borrow().id();
    env.parker.borrow_mut().counts.insert(id, 0);
    wake(env, handle, id);
}

fn wake(env: &RuntimeEnv, handle: &ThreadHandle, id: u32) {
    if handle.borrow().status() != ThreadStatus::Parked {
        return;
    }
    let cb = env.parker.borrow_mut().callbacks.remove(&id);
    JvmThread::set_status(handle, ThreadStatus::AsyncWaiting);
    if let Some(cb) = cb {
        cb();
    }
}
