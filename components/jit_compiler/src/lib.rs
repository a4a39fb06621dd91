//! Trace compiler
//!
//! Compiles a straight-line run of bytecode starting at a program counter
//! into one cached closure, amortizing interpretation cost. The compiler:
//!
//! - walks opcodes linearly from the entry pc, consulting the per-opcode
//!   descriptor table ([`trace_op_info`]) for stack effects
//! - schedules values through a symbolic operand stack of temporaries so
//!   redundant pop/push pairs inside the trace never touch the real stack
//! - ends the trace at the first branching opcode (inclusive) or the first
//!   unrecognized opcode (exclusive)
//! - rejects traces of length <= 1 permanently (no retry at that pc)
//! - emits opcodes in reverse order, each one's on-success continuation
//!   being the already-emitted code for the opcodes after it
//! - on fault edges, rematerializes pending symbolic values onto the real
//!   operand stack so exception search sees interpreter-equivalent state
//!
//! Emission produces composed boxed closures behind the per-(method, pc)
//! cache on `Method`; no machine code or source text is generated.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compile;
pub mod op_info;

pub use compile::{compile_trace, maybe_compile};
pub use op_info::{trace_op_info, TraceOpInfo};
