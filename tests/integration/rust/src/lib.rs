//! Integration test suite for the Ferrite VM
//!
//! Drives whole guest programs through the runtime facade to verify that
//! components work together correctly across component boundaries.

use std::cell::Cell;
use std::rc::Rc;

use core_types::Value;
use threading::{CompletionResult, Runtime};

/// Re-export components for test convenience
pub mod components {
    pub use bytecode_system;
    pub use core_types;
    pub use jit_compiler;
    pub use scheduler;
    pub use threading;
}

/// Spawn the method at `idx`, run the scheduler to quiescence, and return
/// the entry method's completion result.
pub fn run_to_completion(rt: &Runtime, idx: usize, args: Vec<Value>) -> CompletionResult {
    let result: Rc<Cell<Option<CompletionResult>>> = Rc::new(Cell::new(None));
    {
        let result = result.clone();
        rt.spawn_call(idx, args, Box::new(move |res| result.set(Some(res))))
            .expect("method index not registered");
    }
    rt.run();
    result.take().expect("program did not complete")
}

/// Like [`run_to_completion`] but unwraps a single-slot return value.
pub fn run_to_value(rt: &Runtime, idx: usize, args: Vec<Value>) -> Value {
    match run_to_completion(rt, idx, args) {
        Ok((Some(v), _)) => v,
        Ok((None, _)) => panic!("program returned void"),
        Err(exc) => panic!("uncaught {}: {}", exc.class_name, exc.message),
    }
}
