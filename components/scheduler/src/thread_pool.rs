//! The weighted round-robin thread pool.
//!
//! One thread runs at a time. The head of the runnable queue keeps the
//! processor for consecutive quanta until it has consumed as many quanta
//! as its priority, then rotates to the back. Threads are scheduled and
//! unscheduled purely by status-change notifications, so the pool never
//! decides when a thread blocks; it only reacts.
//!
//! Pool methods may borrow member threads (for priority and daemon
//! checks), so callers must not hold a thread borrow across a call into
//! the pool. [`notify_status_change`] exists for the same reason on the
//! pool side: it releases the pool borrow before invoking the
//! empty-pool callback.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use core_types::ThreadStatus;
use log::trace;

use crate::quantum::QuantumEstimator;
use crate::timer::TimerQueue;

/// Shared handle to a pool.
pub type PoolRef<T> = Rc<RefCell<ThreadPool<T>>>;

/// What the pool needs from a hosted thread.
pub trait PoolThread {
    /// Stable identifier, used only for logging.
    fn thread_id(&self) -> u32;
    /// Current lifecycle status.
    fn status(&self) -> ThreadStatus;
    /// Daemon threads do not keep the pool alive.
    fn is_daemon(&self) -> bool;
    /// Scheduling priority, 1 to 10. Doubles as the consecutive-quanta
    /// weight in the round-robin rotation.
    fn priority(&self) -> u8;
    /// Execute one quantum. The implementation must not leave the thread
    /// borrowed when it notifies the pool of status changes.
    fn run_quantum(handle: &Rc<RefCell<Self>>)
    where
        Self: Sized;
}

/// Hosts every live thread and schedules the runnable ones.
pub struct ThreadPool<T: PoolThread> {
    threads: Vec<Rc<RefCell<T>>>,
    runnable: VecDeque<Rc<RefCell<T>>>,
    /// Consecutive quanta the current head has run.
    quanta_run: u32,
    empty_callback: Option<Box<dyn FnMut()>>,
    estimator: QuantumEstimator,
    timers: TimerQueue,
}

impl<T: PoolThread> ThreadPool<T> {
    /// Create an empty pool with default quantum sizing.
    pub fn new() -> Self {
        Self::with_estimator(QuantumEstimator::default())
    }

    /// Create an empty pool whose quanta target the given responsiveness
    /// window in milliseconds.
    pub fn with_responsiveness(responsiveness_ms: u32) -> Self {
        Self::with_estimator(QuantumEstimator::new(responsiveness_ms))
    }

    /// Create an empty pool around an explicit estimator.
    pub fn with_estimator(estimator: QuantumEstimator) -> Self {
        Self {
            threads: Vec::new(),
            runnable: VecDeque::new(),
            quanta_run: 0,
            empty_callback: None,
            estimator,
            timers: TimerQueue::new(),
        }
    }

    /// Install the callback fired when the last non-daemon thread
    /// terminates. Fired through [`notify_status_change`], never while the
    /// pool is borrowed.
    pub fn set_empty_callback(&mut self, cb: Box<dyn FnMut()>) {
        self.empty_callback = Some(cb);
    }

    /// Add a thread to the pool. New threads are not scheduled until a
    /// status change to `Runnable` arrives.
    pub fn register(&mut self, handle: Rc<RefCell<T>>) {
        debug_assert!(
            !self.threads.iter().any(|t| Rc::ptr_eq(t, &handle)),
            "thread registered twice"
        );
        self.threads.push(handle);
    }

    /// React to a thread's status transition.
    pub fn status_change(&mut self, handle: &Rc<RefCell<T>>, old: ThreadStatus, new: ThreadStatus) {
        if new == ThreadStatus::Terminated {
            if old == ThreadStatus::Runnable {
                self.unschedule(handle);
            }
            self.threads.retain(|t| !Rc::ptr_eq(t, handle));
            return;
        }
        match (old == ThreadStatus::Runnable, new == ThreadStatus::Runnable) {
            (false, true) => self.schedule(handle),
            (true, false) => self.unschedule(handle),
            _ => {}
        }
    }

    /// React to a priority change: the head's earned quanta reset so the
    /// new weight applies from now.
    pub fn priority_change(&mut self, handle: &Rc<RefCell<T>>) {
        if let Some(head) = self.runnable.front() {
            if Rc::ptr_eq(head, handle) {
                self.quanta_run = 0;
            }
        }
    }

    fn schedule(&mut self, handle: &Rc<RefCell<T>>) {
        debug_assert!(
            !self.runnable.iter().any(|t| Rc::ptr_eq(t, handle)),
            "thread scheduled twice"
        );
        trace!("schedule thread {}", handle.borrow().thread_id());
        self.runnable.push_back(handle.clone());
    }

    fn unschedule(&mut self, handle: &Rc<RefCell<T>>) {
        if let Some(idx) = self.runnable.iter().position(|t| Rc::ptr_eq(t, handle)) {
            trace!("unschedule thread {}", handle.borrow().thread_id());
            if idx == 0 {
                self.quanta_run = 0;
            }
            self.runnable.remove(idx);
        }
    }

    /// The thread that should run the next quantum.
    pub fn next_thread(&self) -> Option<Rc<RefCell<T>>> {
        self.runnable.front().cloned()
    }

    /// Account for a finished quantum: the head earns one quantum and
    /// rotates to the back once it has earned its priority's worth. A
    /// no-op if the thread was unscheduled during its quantum.
    pub fn quantum_over(&mut self, handle: &Rc<RefCell<T>>) {
        let rotate = match self.runnable.front() {
            Some(head) if Rc::ptr_eq(head, handle) => {
                self.quanta_run += 1;
                self.quanta_run >= u32::from(head.borrow().priority().max(1))
            }
            _ => false,
        };
        if rotate {
            self.quanta_run = 0;
            if let Some(h) = self.runnable.pop_front() {
                self.runnable.push_back(h);
            }
        }
    }

    /// True if a live non-daemon thread remains.
    pub fn any_non_daemon(&self) -> bool {
        self.threads.iter().any(|t| !t.borrow().is_daemon())
    }

    /// All live threads, for diagnostics such as thread dumps.
    pub fn threads(&self) -> &[Rc<RefCell<T>>] {
        &self.threads
    }

    /// True if no thread is runnable.
    pub fn is_idle(&self) -> bool {
        self.runnable.is_empty()
    }

    /// Steps to grant the next quantum.
    pub fn suggested_quantum(&self) -> u32 {
        self.estimator.suggested_steps()
    }

    /// Feed a completed quantum's throughput back into quantum sizing.
    pub fn record_quantum(&mut self, steps: u32, elapsed: Duration) {
        self.estimator.record(steps, elapsed);
    }

    /// The pool's timer queue (timed waits, sleeps, host timeouts).
    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    /// Mutable access to the timer queue.
    pub fn timers_mut(&mut self) -> &mut TimerQueue {
        &mut self.timers
    }
}

impl<T: PoolThread> Default for ThreadPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Route a status change through the pool and fire the empty-pool
/// callback if this transition terminated the last non-daemon thread.
/// The callback runs with the pool unborrowed.
pub fn notify_status_change<T: PoolThread>(
    pool: &PoolRef<T>,
    handle: &Rc<RefCell<T>>,
    old: ThreadStatus,
    new: ThreadStatus,
) {
    let callback = {
        let mut p = pool.borrow_mut();
        p.status_change(handle, old, new);
        if new == ThreadStatus::Terminated && !p.any_non_daemon() {
            p.empty_callback.take()
        } else {
            None
        }
    };
    if let Some(mut cb) = callback {
        cb();
        let mut p = pool.borrow_mut();
        if p.empty_callback.is_none() {
            p.empty_callback = Some(cb);
        }
    }
}

/// Run one quantum of the head thread. Returns false when nothing is
/// runnable.
pub fn pump<T: PoolThread>(pool: &PoolRef<T>) -> bool {
    let handle = match pool.borrow().next_thread() {
        Some(h) => h,
        None => return false,
    };
    T::run_quantum(&handle);
    pool.borrow_mut().quantum_over(&handle);
    true
}

/// Drive the pool until no thread is runnable and no timer is pending.
/// Due timer callbacks fire before each quantum, with the pool unborrowed;
/// when every thread is parked on a timer, the loop sleeps until the next
/// deadline.
pub fn run<T: PoolThread>(pool: &PoolRef<T>) {
    loop {
        let due = pool.borrow_mut().timers_mut().take_due(Instant::now());
        for cb in due {
            cb();
        }
        if pump(pool) {
            continue;
        }
        let next = pool.borrow().timers().next_deadline();
        match next {
            Some(deadline) => {
                let now = Instant::now();
                if deadline > now {
                    std::thread::sleep(deadline - now);
                }
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Weak;

    struct TestThread {
        id: u32,
        status: ThreadStatus,
        daemon: bool,
        priority: u8,
        remaining: u32,
        pool: Weak<RefCell<ThreadPool<TestThread>>>,
        log: Rc<RefCell<Vec<u32>>>,
    }

    impl PoolThread for TestThread {
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
            let (id, done, pool, log) = {
                let mut t = handle.borrow_mut();
                t.remaining -= 1;
                (t.id, t.remaining == 0, t.pool.clone(), t.log.clone())
            };
            log.borrow_mut().push(id);
            if done {
                handle.borrow_mut().status = ThreadStatus::Terminated;
                if let Some(pool) = pool.upgrade() {
                    notify_status_change(
                        &pool,
                        handle,
                        ThreadStatus::Runnable,
                        ThreadStatus::Terminated,
                    );
                }
            }
        }
    }

    fn spawn(
        pool: &PoolRef<TestThread>,
        id: u32,
        priority: u8,
        quanta: u32,
        log: &Rc<RefCell<Vec<u32>>>,
    ) -> Rc<RefCell<TestThread>> {
        let t = Rc::new(RefCell::new(TestThread {
            id,
            status: ThreadStatus::Runnable,
            daemon: false,
            priority,
            remaining: quanta,
            pool: Rc::downgrade(pool),
            log: log.clone(),
        }));
        pool.borrow_mut().register(t.clone());
        notify_status_change(pool, &t, ThreadStatus::New, ThreadStatus::Runnable);
        t
    }

    #[test]
    fn test_responsiveness_sizes_quanta() {
        let fast: ThreadPool<TestThread> = ThreadPool::with_responsiveness(1);
        let slow: ThreadPool<TestThread> = ThreadPool::new();
        assert!(fast.suggested_quantum() < slow.suggested_quantum());
        assert_eq!(
            slow.suggested_quantum(),
            QuantumEstimator::default().suggested_steps()
        );
    }

    #[test]
    fn test_weighted_rotation() {
        let pool: PoolRef<TestThread> = Rc::new(RefCell::new(ThreadPool::new()));
        let log = Rc::new(RefCell::new(Vec::new()));
        spawn(&pool, 1, 1, 2, &log);
        spawn(&pool, 2, 2, 2, &log);
        spawn(&pool, 3, 1, 2, &log);

        run(&pool);

        // Thread 2's weight of two earns it back-to-back quanta; weight-one
        // threads rotate after each quantum.
        assert_eq!(*log.borrow(), vec![1, 2, 2, 3, 1, 3]);
        assert!(pool.borrow().is_idle());
        assert!(!pool.borrow().any_non_daemon());
    }

    #[test]
    fn test_unschedule_resets_head_count() {
        let pool: PoolRef<TestThread> = Rc::new(RefCell::new(ThreadPool::new()));
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = spawn(&pool, 1, 10, 5, &log);
        let _b = spawn(&pool, 2, 10, 1, &log);

        // Block the head mid-rotation; thread 2 must take over.
        pump(&pool);
        a.borrow_mut().status = ThreadStatus::Blocked;
        notify_status_change(&pool, &a, ThreadStatus::Runnable, ThreadStatus::Blocked);
        pump(&pool);
        assert_eq!(*log.borrow(), vec![1, 2]);

        // Unblocking requeues at the back (trivially the head here).
        a.borrow_mut().status = ThreadStatus::Runnable;
        notify_status_change(&pool, &a, ThreadStatus::Blocked, ThreadStatus::Runnable);
        assert!(pool.borrow().next_thread().is_some());
    }

    #[test]
    fn test_empty_callback_fires_after_last_non_daemon() {
        let pool: PoolRef<TestThread> = Rc::new(RefCell::new(ThreadPool::new()));
        let log = Rc::new(RefCell::new(Vec::new()));
        let fired = Rc::new(Cell::new(0));
        {
            let fired = fired.clone();
            pool.borrow_mut()
                .set_empty_callback(Box::new(move || fired.set(fired.get() + 1)));
        }

        spawn(&pool, 1, 5, 1, &log);
        let d = spawn(&pool, 2, 5, 99, &log);
        d.borrow_mut().daemon = true;

        pump(&pool); // thread 1 terminates; only the daemon remains
        assert_eq!(fired.get(), 1);
        // The daemon is still runnable; the pool does not drain.
        assert!(!pool.borrow().is_idle());
        assert!(!pool.borrow().any_non_daemon());
    }

    #[test]
    fn test_new_threads_wait_for_runnable() {
        let pool: PoolRef<TestThread> = Rc::new(RefCell::new(ThreadPool::new()));
        let log = Rc::new(RefCell::new(Vec::new()));
        let t = Rc::new(RefCell::new(TestThread {
            id: 9,
            status: ThreadStatus::New,
            daemon: false,
            priority: 5,
            remaining: 1,
            pool: Rc::downgrade(&pool),
            log: log.clone(),
        }));
        pool.borrow_mut().register(t.clone());
        assert!(!pump(&pool));
        t.borrow_mut().status = ThreadStatus::Runnable;
        notify_status_change(&pool, &t, ThreadStatus::New, ThreadStatus::Runnable);
        assert!(pump(&pool));
    }
}
