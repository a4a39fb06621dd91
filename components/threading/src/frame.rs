//! Stack frames.
//!
//! Three frame kinds live on a thread's stack. Bytecode frames interpret
//! (or run compiled traces of) a method's code. Native frames wrap a host
//! function and run exactly once. Internal frames carry an engine
//! continuation: they never execute guest code and are popped by handing
//! their completion the child's result or the in-flight exception.

use std::rc::Rc;

use bytecode_system::Method;
use core_types::{ObjectId, Throwable, Value};

use crate::collab::NativeFn;

/// Result delivered to an internal frame's completion: the returned slots
/// on success, the propagating throwable on failure.
pub type CompletionResult = Result<(Option<Value>, Option<Value>), Throwable>;

/// Continuation invoked when an internal frame is popped. Runs with no
/// thread or environment cell borrowed.
pub type Completion = Box<dyn FnOnce(CompletionResult)>;

/// What one executed opcode asks the thread to do.
#[derive(Debug, Clone, PartialEq)]
pub enum OpOutcome {
    /// Keep stepping.
    Continue,
    /// Invoke the method at this method-table index; the pc has already
    /// been advanced past the invoke.
    Invoke(usize),
    /// A `return` retired.
    ReturnVoid,
    /// A single-slot return retired.
    Return1(Value),
    /// A two-slot return retired.
    Return2(Value, Value),
    /// A guest exception was raised at the current pc.
    Throw(Throwable),
    /// Acquire this object's monitor; the pc has already been advanced.
    MonitorEnter(ObjectId),
    /// Release this object's monitor; the pc is still at the opcode and
    /// advances only after a successful release.
    MonitorExit(ObjectId),
}

/// An executing bytecode method.
pub struct BytecodeFrame {
    /// The method being executed.
    pub method: Rc<Method>,
    /// Index of the next instruction.
    pub pc: usize,
    /// Local variable slots; arguments occupy the leading slots.
    pub locals: Vec<Value>,
    /// The operand stack.
    pub stack: Vec<Value>,
    /// True once a synchronized method's entry monitor is held. The
    /// monitor is released when the frame is popped, by return or by
    /// exception propagation.
    pub lock_acquired: bool,
}

impl BytecodeFrame {
    /// Build the frame for invoking `method` with already-popped argument
    /// slots. Locals beyond the arguments start as `Null`.
    pub fn new(method: Rc<Method>, args: Vec<Value>) -> Self {
        let mut locals = args;
        let want = method.max_locals.max(locals.len());
        locals.resize(want, Value::Null);
        Self {
            method,
            pc: 0,
            locals,
            stack: Vec::new(),
            lock_acquired: false,
        }
    }
}

/// A native method invocation; runs exactly once.
pub struct NativeFrame {
    /// The native method's metadata.
    pub method: Rc<Method>,
    /// The host implementation.
    pub func: NativeFn,
    /// Argument slots popped from the caller.
    pub args: Vec<Value>,
    /// Set when the function has been invoked.
    pub executed: bool,
}

/// An engine continuation frame.
pub struct InternalFrame {
    /// Shown in thread dumps.
    pub label: String,
    /// Fired with the child's result when this frame is popped.
    pub completion: Option<Completion>,
    /// Result scheduled by a child return, consumed on the next step.
    pub pending: Option<CompletionResult>,
}

impl InternalFrame {
    /// Create an internal frame with the given dump label and completion.
    pub fn new(label: impl Into<String>, completion: Completion) -> Self {
        Self {
            label: label.into(),
            completion: Some(completion),
            pending: None,
        }
    }
}

/// One frame of a thread's stack.
pub enum Frame {
    /// An executing bytecode method.
    Bytecode(BytecodeFrame),
    /// A native method invocation.
    Native(NativeFrame),
    /// An engine continuation.
    Internal(InternalFrame),
}

impl Frame {
    /// Deliver a child's return value to this frame: bytecode frames push
    /// the slots, internal frames remember them for their completion.
    pub fn schedule_resume(&mut self, rv1: Option<Value>, rv2: Option<Value>) {
        match self {
            Frame::Bytecode(bf) => {
                if let Some(v) = rv1 {
                    bf.stack.push(v);
                }
                if let Some(v) = rv2 {
                    bf.stack.push(v);
                }
            }
            Frame::Internal(inf) => {
                inf.pending = Some(Ok((rv1, rv2)));
            }
            Frame::Native(_) => {
                // Natives cannot invoke guest methods synchronously, so
                // nothing ever resumes into a native frame.
                debug_assert!(false, "resume scheduled on a native frame");
            }
        }
    }

    /// One diagnostic line for thread dumps.
    pub fn trace_info(&self) -> String {
        match self {
            Frame::Bytecode(bf) => {
                format!("at {} (pc={})", bf.method.full_signature(), bf.pc)
            }
            Frame::Native(nf) => format!("at {} (native)", nf.method.full_signature()),
            Frame::Internal(inf) => format!("at <internal: {}>", inf.label),
        }
    }
}
