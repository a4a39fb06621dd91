//! The shared runtime environment.
//!
//! One `RuntimeEnv` is shared (via `Rc`) by every thread of a runtime. It
//! owns the heap, the method table, the monitor and class-mirror tables,
//! the parker, and the embedder collaborators. All interior mutability is
//! per-field `RefCell`s; callers must not hold a borrow of one field
//! across a call that may need the same field.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use core_types::{Heap, HeapObject, ObjectId, Throwable};
use bytecode_system::MethodTable;
use log::error;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use scheduler::{PoolRef, TimerId};

use crate::collab::{ClassResolver, NativeFn, NativeRegistry, UncaughtHook};
use crate::monitor::{Monitor, MonitorRef};
use crate::parker::Parker;
use crate::thread::JvmThread;

/// Shared handle to the runtime environment.
pub type EnvRef = Rc<RuntimeEnv>;

/// Class name used for lazily allocated class mirror objects.
const CLASS_MIRROR_CLASS: &str = "java/lang/Class";

/// Everything a thread needs that is not thread-local.
pub struct RuntimeEnv {
    /// The guest heap.
    pub heap: RefCell<Heap>,
    /// The embedder-registered method table.
    pub methods: RefCell<MethodTable>,
    monitors: RefCell<HashMap<ObjectId, MonitorRef>>,
    mirrors: RefCell<HashMap<String, ObjectId>>,
    resolver: RefCell<Option<Rc<dyn ClassResolver>>>,
    natives: RefCell<NativeRegistry>,
    uncaught: RefCell<Option<UncaughtHook>>,
    pub(crate) parker: RefCell<Parker>,
    pool: RefCell<Weak<RefCell<scheduler::ThreadPool<JvmThread>>>>,
    seed: Cell<u64>,
    next_thread_id: Cell<u32>,
}

impl RuntimeEnv {
    /// Create an environment. `seed` feeds every monitor's handoff RNG, so
    /// a fixed seed makes contention outcomes reproducible.
    pub fn new(seed: u64) -> EnvRef {
        Rc::new(Self {
            heap: RefCell::new(Heap::new()),
            methods: RefCell::new(MethodTable::new()),
            monitors: RefCell::new(HashMap::new()),
            mirrors: RefCell::new(HashMap::new()),
            resolver: RefCell::new(None),
            natives: RefCell::new(NativeRegistry::new()),
            uncaught: RefCell::new(None),
            parker: RefCell::new(Parker::new()),
            pool: RefCell::new(Weak::new()),
            seed: Cell::new(seed),
            next_thread_id: Cell::new(1),
        })
    }

    /// Wire the environment to its pool. Called once by the runtime facade.
    pub fn attach_pool(&self, pool: &PoolRef<JvmThread>) {
        *self.pool.borrow_mut() = Rc::downgrade(pool);
    }

    /// The pool, if still alive.
    pub fn pool(&self) -> Option<PoolRef<JvmThread>> {
        self.pool.borrow().upgrade()
    }

    /// The monitor for an object, created on first use with its own
    /// deterministically derived RNG.
    pub fn monitor_for(&self, object: ObjectId) -> MonitorRef {
        let mut monitors = self.monitors.borrow_mut();
        monitors
            .entry(object)
            .or_insert_with(|| {
                let rng = SmallRng::seed_from_u64(self.next_seed());
                Rc::new(RefCell::new(Monitor::new(object, rng)))
            })
            .clone()
    }

    /// The class mirror object for a class, allocated lazily. Static
    /// synchronized methods lock this object.
    pub fn class_mirror(&self, class_name: &str) -> ObjectId {
        if let Some(id) = self.mirrors.borrow().get(class_name) {
            return *id;
        }
        let id = self
            .heap
            .borrow_mut()
            .alloc(HeapObject::new(CLASS_MIRROR_CLASS));
        self.mirrors
            .borrow_mut()
            .insert(class_name.to_string(), id);
        id
    }

    /// Install the class resolver.
    pub fn set_resolver(&self, resolver: Rc<dyn ClassResolver>) {
        *self.resolver.borrow_mut() = Some(resolver);
    }

    /// The class resolver, if installed.
    pub fn resolver(&self) -> Option<Rc<dyn ClassResolver>> {
        self.resolver.borrow().clone()
    }

    /// Register a native method implementation.
    pub fn register_native(
        &self,
        class_name: impl Into<String>,
        name: impl Into<String>,
        f: NativeFn,
    ) {
        self.natives.borrow_mut().register(class_name, name, f);
    }

    /// Look up a native method implementation.
    pub fn native(&self, class_name: &str, name: &str) -> Option<NativeFn> {
        self.natives.borrow().lookup(class_name, name)
    }

    /// Install the uncaught-exception hook.
    pub fn set_uncaught_hook(&self, hook: UncaughtHook) {
        *self.uncaught.borrow_mut() = Some(hook);
    }

    /// Report an exception that unwound past a thread's last frame.
    pub fn report_uncaught(&self, thread_id: u32, exc: &Throwable) {
        match &*self.uncaught.borrow() {
            Some(hook) => hook(thread_id, exc),
            None => error!(
                "uncaught exception in thread {}: {} ({})",
                thread_id, exc.class_name, exc.message
            ),
        }
    }

    /// Register a timer with the pool's queue.
    pub fn set_timeout(&self, delay: Duration, cb: Box<dyn FnOnce()>) -> Option<TimerId> {
        let pool = self.pool()?;
        let id = pool.borrow_mut().timers_mut().set_timeout(delay, cb);
        Some(id)
    }

    /// Cancel a pending timer.
    pub fn cancel_timer(&self, id: TimerId) {
        if let Some(pool) = self.pool() {
            pool.borrow_mut().timers_mut().cancel(id);
        }
    }

    /// Allocate a thread id.
    pub fn next_thread_id(&self) -> u32 {
        let id = self.next_thread_id.get();
        self.next_thread_id.set(id + 1);
        id
    }

    /// Derive the next RNG seed (splitmix-style step of the base seed).
    fn next_seed(&self) -> u64 {
        let s = self
            .seed
            .get()
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.seed.set(s);
        s
    }
}
