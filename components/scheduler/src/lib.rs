//! Cooperative scheduling
//!
//! Hosts threads behind a weighted round-robin queue: the thread at the
//! head of the queue runs consecutive quanta until it has consumed as many
//! as its priority, then rotates to the back. Threads enter and leave the
//! queue through status-change notifications; the pool itself never
//! inspects or mutates thread state beyond the [`PoolThread`] accessors.
//!
//! The pool is pumped explicitly ([`pump`]/[`run`]): one pump executes one
//! quantum of the head thread. The pool owns a [`TimerQueue`]; [`run`]
//! drains due timers between quanta so timed waits and sleeps fire, and
//! sleeps until the next deadline when every thread is waiting on one.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod quantum;
pub mod thread_pool;
pub mod timer;

pub use quantum::QuantumEstimator;
pub use thread_pool::{notify_status_change, pump, run, PoolRef, PoolThread, ThreadPool};
pub use timer::{TimerId, TimerQueue};
