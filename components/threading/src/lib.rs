//! Threads, frames, and monitors
//!
//! The execution engine proper: guest threads with a whitelist-validated
//! status machine, a frame stack of bytecode, native, and internal frames,
//! reentrant object monitors with pseudo-random handoff, the park/unpark
//! protocol, exception search, and a small [`Runtime`] facade tying the
//! engine to the scheduler.
//!
//! Everything is strictly cooperative and single-threaded on the host.
//! Components communicate through a command discipline: a frame reports
//! what it needs (an invoke, a return, a monitor operation, a throw) and
//! the thread applies it after releasing all cell borrows, so monitor
//! handoff callbacks and resolver completions never observe a borrowed
//! thread.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collab;
pub mod dump;
pub mod env;
pub mod frame;
mod interp;
pub mod monitor;
pub mod parker;
pub mod runtime;
pub mod thread;

pub use collab::{ClassRef, ClassResolver, NativeFn, NativeOutcome, NativeRegistry, NativeReturn};
pub use env::{EnvRef, RuntimeEnv};
pub use frame::{BytecodeFrame, Completion, CompletionResult, Frame, InternalFrame, NativeFrame};
pub use monitor::{Monitor, MonitorRef};
pub use runtime::Runtime;
pub use thread::{start_thread, JvmThread, ThreadHandle};
