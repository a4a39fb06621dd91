//! Core runtime value types, thread states, and error handling.
//!
//! This crate provides the foundational types for the virtual machine,
//! shared by every other component:
//!
//! - [`Value`] - Tagged representation of guest values (two slots for wides)
//! - [`Heap`] / [`ObjectId`] - Handle-based host heap for guest objects
//! - [`ThreadStatus`] - Thread state machine states and the legal-transition
//!   whitelist
//! - [`Throwable`] - A guest-level exception that propagates through the
//!   exception-search machinery
//! - [`VmError`] - Internal (non-guest) engine errors
//!
//! # Examples
//!
//! ```
//! use core_types::{Value, ThreadStatus};
//!
//! let v = Value::Int(42);
//! assert!(!v.is_wide());
//! assert!(ThreadStatus::Runnable.can_transition_to(ThreadStatus::Blocked));
//! assert!(!ThreadStatus::Blocked.can_transition_to(ThreadStatus::Waiting));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod heap;
mod status;
mod value;

pub use error::{Throwable, VmError};
pub use heap::{Heap, HeapObject, ObjectId};
pub use status::ThreadStatus;
pub use value::Value;
