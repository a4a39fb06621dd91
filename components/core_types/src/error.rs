//! Internal engine errors and guest-level exceptions.
//!
//! The engine distinguishes three error classes. Internal invariant
//! violations are [`VmError`] values surfaced via `debug_assert!` at the
//! point of detection. Guest-level exceptions are [`Throwable`] values that
//! propagate up the call stack through the exception-search machinery.
//! Host failures are converted into [`Throwable`]s by the calling frame.

use thiserror::Error;

use crate::heap::ObjectId;
use crate::status::ThreadStatus;

/// An internal (non-guest) engine error. These indicate VM bugs or host
/// failures, never ordinary guest control flow.
#[derive(Debug, Error)]
pub enum VmError {
    /// A thread status transition that is not on the whitelist.
    #[error("illegal thread state transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// The state the thread was in.
        from: ThreadStatus,
        /// The state that was requested.
        to: ThreadStatus,
    },
    /// Monitor ownership or count accounting does not add up.
    #[error("monitor accounting violation: {0}")]
    MonitorAccounting(String),
    /// A general internal invariant was violated.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
    /// An asynchronous host operation failed.
    #[error("host operation failed: {0}")]
    Host(String),
}

/// A guest-level exception.
///
/// Carries the internal class name of the throwable, a message, and
/// optionally the already-materialized guest object. When no object exists
/// yet, the frame that finally installs the handler (or reports the
/// exception) materializes one.
#[derive(Debug, Clone, PartialEq)]
pub struct Throwable {
    /// Internal class name, e.g. `java/lang/NullPointerException`.
    pub class_name: String,
    /// Human-readable detail message.
    pub message: String,
    /// The guest object backing this exception, if materialized.
    pub object: Option<ObjectId>,
}

impl Throwable {
    /// Create a throwable of the given class with a message.
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
            object: None,
        }
    }

    /// Create a throwable backed by an existing guest object.
    pub fn with_object(
        class_name: impl Into<String>,
        message: impl Into<String>,
        object: ObjectId,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
            object: Some(object),
        }
    }
}
