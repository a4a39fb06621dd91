//! External collaborator interfaces.
//!
//! The engine never loads classes or implements native methods itself.
//! The embedder supplies a [`ClassResolver`] for class lookup and subtype
//! tests, and a [`NativeRegistry`] mapping `(class, name)` pairs to host
//! functions. Both are consulted through the runtime environment.

use std::collections::HashMap;
use std::rc::Rc;

use core_types::{ObjectId, Throwable, Value};

use crate::env::EnvRef;
use crate::thread::ThreadHandle;

/// A resolved class handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRef {
    /// Internal class name, e.g. `java/lang/Object`.
    pub name: String,
}

/// Completion callback for asynchronous class resolution.
pub type ResolveCallback = Box<dyn FnOnce(Result<Vec<ClassRef>, Throwable>)>;

/// Classloading as seen by the engine.
pub trait ClassResolver {
    /// Synchronous lookup of an already-resolved class.
    fn lookup(&self, name: &str) -> Option<ClassRef>;
    /// Subtype test between two resolved classes.
    fn is_castable(&self, from: &str, to: &str) -> bool;
    /// Resolve the named classes, then invoke the callback. The callback
    /// may fire re-entrantly (classes already on hand) or on a later turn;
    /// the requesting thread suspends `AsyncWaiting` either way.
    fn resolve(&self, names: &[String], cb: ResolveCallback);
}

/// What a native method hands back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeReturn {
    /// No value.
    Void,
    /// Coerced to `Int(0)` or `Int(1)` on the caller's stack.
    Bool(bool),
    /// A 32-bit integer.
    Int(i32),
    /// A 64-bit integer; occupies two caller slots.
    Long(i64),
    /// A 32-bit float.
    Float(f32),
    /// A 64-bit float; occupies two caller slots.
    Double(f64),
    /// An object reference.
    Ref(ObjectId),
    /// The null reference.
    Null,
}

impl NativeReturn {
    /// Map to caller stack slots: `(first, second)`. Wide primitives carry
    /// `HighPadding` in the second slot.
    pub fn into_slots(self) -> (Option<Value>, Option<Value>) {
        match self {
            NativeReturn::Void => (None, None),
            NativeReturn::Bool(b) => (Some(Value::Int(i32::from(b))), None),
            NativeReturn::Int(i) => (Some(Value::Int(i)), None),
            NativeReturn::Long(l) => (Some(Value::Long(l)), Some(Value::HighPadding)),
            NativeReturn::Float(f) => (Some(Value::Float(f)), None),
            NativeReturn::Double(d) => (Some(Value::Double(d)), Some(Value::HighPadding)),
            NativeReturn::Ref(id) => (Some(Value::Ref(id)), None),
            NativeReturn::Null => (Some(Value::Null), None),
        }
    }
}

/// How a native invocation completed.
pub enum NativeOutcome {
    /// Completed synchronously with a value.
    Return(NativeReturn),
    /// Raised a guest exception.
    Throw(Throwable),
    /// Suspended; the thread parks `AsyncWaiting` until the host calls
    /// `async_return` on it.
    Pending,
}

/// A host-implemented native method. Runs with no thread or environment
/// cell borrowed, so it may call back into the engine.
pub type NativeFn = Rc<dyn Fn(&EnvRef, &ThreadHandle, &[Value]) -> NativeOutcome>;

/// `(class, name)`-keyed table of native methods.
#[derive(Default)]
pub struct NativeRegistry {
    entries: HashMap<(String, String), NativeFn>,
}

impl NativeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a native implementation.
    pub fn register(
        &mut self,
        class_name: impl Into<String>,
        name: impl Into<String>,
        f: NativeFn,
    ) {
        self.entries.insert((class_name.into(), name.into()), f);
    }

    /// Look up a native implementation.
    pub fn lookup(&self, class_name: &str, name: &str) -> Option<NativeFn> {
        self.entries
            .get(&(class_name.to_string(), name.to_string()))
            .cloned()
    }
}

/// Invoked when an exception unwinds past the last frame of a thread.
pub type UncaughtHook = Box<dyn Fn(u32, &Throwable)>;
