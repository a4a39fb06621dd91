//! Runtime contract between compiled traces and the bytecode frame.
//!
//! A compiled trace is one closure covering a straight-line run of
//! opcodes. It mutates the frame's program counter, locals, and operand
//! stack through [`TraceContext`] and reports how control left the trace
//! through [`TraceExit`]. The compiler that produces these closures lives
//! in the `jit_compiler` component; the cache lives on [`crate::Method`].

use std::rc::Rc;

use core_types::{Heap, Throwable, Value};

/// Mutable view of the executing frame handed to a compiled trace.
pub struct TraceContext<'a> {
    /// The frame's program counter. Updated by the trace as it retires
    /// opcodes so that a fault or exit leaves it pointing at the correct
    /// instruction.
    pub pc: &'a mut usize,
    /// The frame's local variable slots.
    pub locals: &'a mut [Value],
    /// The frame's real operand stack.
    pub stack: &'a mut Vec<Value>,
    /// The host heap, for array and field accesses inside the trace.
    pub heap: &'a mut Heap,
}

/// How control left a compiled trace.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceExit {
    /// The trace ran to its end (or took a branch); `pc` is already set and
    /// the frame should continue executing at it.
    Continue,
    /// A `return` retired inside the trace.
    ReturnVoid,
    /// A single-slot return retired inside the trace.
    Return1(Value),
    /// A two-slot (wide) return retired inside the trace.
    Return2(Value, Value),
    /// A guest exception was raised. The real operand stack has already
    /// been materialized to interpreter-equivalent state.
    Throw(Throwable),
    /// A `MonitorExit` retired as the trace's final opcode. The popped
    /// object reference is carried here; the frame performs the actual
    /// release (and pc advance) since monitors are thread-level state.
    MonitorExit(Value),
}

/// A compiled straight-line trace, cached per (method, entry pc).
pub type TraceClosure = Rc<dyn Fn(&mut TraceContext<'_>) -> TraceExit>;
