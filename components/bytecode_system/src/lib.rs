//! Bytecode definitions and method metadata for the virtual machine.
//!
//! This crate provides:
//! - [`Opcode`] - the decoded instruction set (pc = instruction index)
//! - [`Method`] / [`MethodTable`] - method metadata as consumed by the
//!   execution engine, including the per-pc compiled-trace cache, the
//!   per-pc permanent compile-failure set, and the countdown budget that
//!   gates JIT attempts
//! - [`ExceptionEntry`] - exception-table rows searched in table order
//! - [`TraceContext`] / [`TraceExit`] / [`TraceClosure`] - the runtime
//!   contract between a compiled trace and the bytecode frame invoking it

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod method;
pub mod opcode;
pub mod trace;

pub use method::{ExceptionEntry, Method, MethodTable};
pub use opcode::Opcode;
pub use trace::{TraceClosure, TraceContext, TraceExit};
