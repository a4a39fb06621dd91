//! Method metadata as consumed by the execution engine.
//!
//! The classloading subsystem owns methods; the engine reads them and
//! writes only into the compiled-trace cache, the compile-failure set, and
//! the countdown budget.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::opcode::Opcode;
use crate::trace::TraceClosure;

/// Default number of frame-execution steps between JIT compile attempts.
pub const DEFAULT_COMPILE_BUDGET: u32 = 200;

/// One exception-table row.
///
/// Rows are searched in table order; the first row whose `[start_pc,
/// end_pc)` range contains the faulting pc and whose catch type matches
/// wins. Ties resolve by table order, never by specificity.
#[derive(Debug)]
pub struct ExceptionEntry {
    /// First covered pc (inclusive).
    pub start_pc: usize,
    /// One past the last covered pc (exclusive).
    pub end_pc: usize,
    /// Target pc for the handler.
    pub handler_pc: usize,
    /// Internal class name of the catch type; `None` is the wildcard.
    pub catch_type: Option<String>,
    /// Set once asynchronous resolution of `catch_type` has been attempted.
    /// A second deferral is never taken; the entry is then treated as
    /// non-matching, which bounds the resolve/rethrow cycle.
    pub resolution_attempted: Cell<bool>,
}

impl ExceptionEntry {
    /// Create an entry with the given range, handler, and catch type.
    pub fn new(
        start_pc: usize,
        end_pc: usize,
        handler_pc: usize,
        catch_type: Option<String>,
    ) -> Self {
        Self {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
            resolution_attempted: Cell::new(false),
        }
    }

    /// True if this entry covers the given pc.
    pub fn covers(&self, pc: usize) -> bool {
        self.start_pc <= pc && pc < self.end_pc
    }
}

/// A method: bytecode, exception table, and JIT state.
pub struct Method {
    /// Internal name of the declaring class.
    pub class_name: String,
    /// Method name.
    pub name: String,
    /// True for static methods (synchronized entry locks the class mirror).
    pub is_static: bool,
    /// True if entry must acquire a monitor before any opcode executes.
    pub is_synchronized: bool,
    /// True for native methods; `code` is empty and invocation pushes a
    /// native frame instead of a bytecode frame.
    pub is_native: bool,
    /// Decoded instructions; a pc indexes this vector.
    pub code: Vec<Opcode>,
    /// Exception-handler rows, searched in order.
    pub exception_table: Vec<ExceptionEntry>,
    /// Local-variable slot count (includes argument slots).
    pub max_locals: usize,
    /// Argument slot count (includes the receiver for instance methods;
    /// wide arguments take two slots).
    pub arg_slots: usize,
    compiled: RefCell<HashMap<usize, TraceClosure>>,
    failed: RefCell<HashSet<usize>>,
    budget: Cell<u32>,
}

impl Method {
    /// Create a bytecode method with default flags and no exception table.
    pub fn new(
        class_name: impl Into<String>,
        name: impl Into<String>,
        code: Vec<Opcode>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            name: name.into(),
            is_static: true,
            is_synchronized: false,
            is_native: false,
            code,
            exception_table: Vec::new(),
            max_locals: 0,
            arg_slots: 0,
            compiled: RefCell::new(HashMap::new()),
            failed: RefCell::new(HashSet::new()),
            budget: Cell::new(DEFAULT_COMPILE_BUDGET),
        }
    }

    /// Create a native method stub.
    pub fn native(class_name: impl Into<String>, name: impl Into<String>, arg_slots: usize) -> Self {
        let mut m = Method::new(class_name, name, Vec::new());
        m.is_native = true;
        m.arg_slots = arg_slots;
        m
    }

    /// Qualified `Class.name` form used in diagnostics.
    pub fn full_signature(&self) -> String {
        format!("{}.{}", self.class_name, self.name)
    }

    /// The cached compiled trace entered at `pc`, if any.
    pub fn compiled_at(&self, pc: usize) -> Option<TraceClosure> {
        self.compiled.borrow().get(&pc).cloned()
    }

    /// Cache a compiled trace for entry pc `pc`.
    pub fn cache_trace(&self, pc: usize, closure: TraceClosure) {
        self.compiled.borrow_mut().insert(pc, closure);
    }

    /// True if compilation at `pc` already failed; such a pc is never
    /// retried.
    pub fn failed_at(&self, pc: usize) -> bool {
        self.failed.borrow().contains(&pc)
    }

    /// Permanently mark `pc` as not compilable.
    pub fn mark_failed(&self, pc: usize) {
        self.failed.borrow_mut().insert(pc);
    }

    /// Burn one unit of the compile budget. Returns true exactly when the
    /// countdown reaches zero, at which point the budget re-arms.
    pub fn tick_compile_budget(&self) -> bool {
        let b = self.budget.get();
        if b <= 1 {
            self.budget.set(DEFAULT_COMPILE_BUDGET);
            true
        } else {
            self.budget.set(b - 1);
            false
        }
    }

    /// Override the countdown (test hooks and embedder tuning).
    pub fn set_compile_budget(&self, budget: u32) {
        self.budget.set(budget.max(1));
    }
}

// Trace closures are opaque; report which pcs have one instead.
impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut compiled_pcs: Vec<usize> = self.compiled.borrow().keys().copied().collect();
        compiled_pcs.sort_unstable();
        f.debug_struct("Method")
            .field("class_name", &self.class_name)
            .field("name", &self.name)
            .field("is_static", &self.is_static)
            .field("is_synchronized", &self.is_synchronized)
            .field("is_native", &self.is_native)
            .field("code", &self.code)
            .field("exception_table", &self.exception_table)
            .field("max_locals", &self.max_locals)
            .field("arg_slots", &self.arg_slots)
            .field("compiled_pcs", &compiled_pcs)
            .field("failed_pcs", &self.failed.borrow())
            .field("budget", &self.budget.get())
            .finish()
    }
}

/// The embedder-registered method table; `Invoke(index)` opcodes refer
/// into it.
#[derive(Debug, Default)]
pub struct MethodTable {
    methods: Vec<Rc<Method>>,
}

impl MethodTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            methods: Vec::new(),
        }
    }

    /// Register a method and return its index.
    pub fn register(&mut self, method: Method) -> usize {
        let idx = self.methods.len();
        self.methods.push(Rc::new(method));
        idx
    }

    /// Look up a method by index.
    pub fn get(&self, idx: usize) -> Option<Rc<Method>> {
        self.methods.get(idx).cloned()
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// True if no methods are registered.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
