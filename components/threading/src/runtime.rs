//! The runtime facade: one environment plus one scheduler pool.

use std::cell::RefCell;
use std::rc::Rc;

use bytecode_system::Method;
use core_types::{ThreadStatus, Value};
use scheduler::{PoolRef, ThreadPool};

use crate::dump;
use crate::env::{EnvRef, RuntimeEnv};
use crate::frame::{BytecodeFrame, Completion, Frame, InternalFrame};
use crate::thread::{JvmThread, ThreadHandle};

/// A complete engine instance: heap, method table, monitors, and the
/// cooperative scheduler, wired together.
pub struct Runtime {
    env: EnvRef,
    pool: PoolRef<JvmThread>,
}

impl Runtime {
    /// Create a runtime. `seed` makes monitor-handoff randomness
    /// reproducible.
    pub fn new(seed: u64) -> Self {
        Self::build(seed, ThreadPool::new())
    }

    /// Create a runtime whose quanta target the given responsiveness
    /// window in milliseconds.
    pub fn with_responsiveness(seed: u64, responsiveness_ms: u32) -> Self {
        Self::build(seed, ThreadPool::with_responsiveness(responsiveness_ms))
    }

    fn build(seed: u64, pool: ThreadPool<JvmThread>) -> Self {
        let env = RuntimeEnv::new(seed);
        let pool: PoolRef<JvmThread> = Rc::new(RefCell::new(pool));
        env.attach_pool(&pool);
        Self { env, pool }
    }

    /// The shared environment.
    pub fn env(&self) -> &EnvRef {
        &self.env
    }

    /// The scheduler pool.
    pub fn pool(&self) -> &PoolRef<JvmThread> {
        &self.pool
    }

    /// Register a method, returning the index `Invoke` opcodes use.
    pub fn register_method(&self, method: Method) -> usize {
        self.env.methods.borrow_mut().register(method)
    }

    /// Spawn a thread whose entry frame invokes the method at
    /// `method_idx`. Returns `None` for an unregistered index.
    pub fn spawn(&self, method_idx: usize, args: Vec<Value>) -> Option<ThreadHandle> {
        let method = self.env.methods.borrow().get(method_idx)?;
        Some(crate::thread::start_thread(&self.env, method, args))
    }

    /// Spawn a thread like [`spawn`](Self::spawn), with a completion that
    /// receives the entry method's return slots or its uncaught throwable.
    pub fn spawn_call(
        &self,
        method_idx: usize,
        args: Vec<Value>,
        completion: Completion,
    ) -> Option<ThreadHandle> {
        let method = self.env.methods.borrow().get(method_idx)?;
        let handle = JvmThread::new(&self.env);
        {
            let mut t = handle.borrow_mut();
            t.push_frame(Frame::Internal(InternalFrame::new(
                method.full_signature(),
                completion,
            )));
            t.push_frame(Frame::Bytecode(BytecodeFrame::new(method, args)));
        }
        JvmThread::set_status(&handle, ThreadStatus::Runnable);
        Some(handle)
    }

    /// Drive the scheduler until no thread is runnable and no timer is
    /// pending.
    pub fn run(&self) {
        scheduler::run(&self.pool);
    }

    /// Render a diagnostic dump of every live thread.
    pub fn thread_dump(&self) -> String {
        dump::thread_dump(&self.pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::NativeOutcome;
    use bytecode_system::Opcode;
    use std::cell::Cell;
    use std::time::Duration;

    #[test]
    fn test_spawn_call_delivers_return_value() {
        let rt = Runtime::new(0);
        let idx = rt.register_method(Method::new(
            "App",
            "three",
            vec![
                Opcode::Iconst(1),
                Opcode::Iconst(2),
                Opcode::Iadd,
                Opcode::Ireturn,
            ],
        ));
        let result = Rc::new(Cell::new(None));
        {
            let result = result.clone();
            rt.spawn_call(
                idx,
                vec![],
                Box::new(move |res| result.set(Some(res))),
            )
            .unwrap();
        }
        rt.run();
        assert_eq!(result.take(), Some(Ok((Some(Value::Int(3)), None))));
    }

    #[test]
    fn test_pending_native_resumes_from_timer() {
        let rt = Runtime::new(0);
        let mut sleeper = Method::native("App", "sleepThenSeven", 0);
        sleeper.is_static = true;
        let native_idx = rt.register_method(sleeper);
        rt.env().register_native(
            "App",
            "sleepThenSeven",
            Rc::new(|env, handle, _args| {
                let env2 = env.clone();
                let h = handle.clone();
                env.set_timeout(
                    Duration::from_millis(1),
                    Box::new(move || {
                        JvmThread::async_return(&env2, &h, Some(Value::Int(7)), None)
                    }),
                );
                NativeOutcome::Pending
            }),
        );
        let idx = rt.register_method(Method::new(
            "App",
            "entry",
            vec![Opcode::Invoke(native_idx), Opcode::Ireturn],
        ));
        let result = Rc::new(Cell::new(None));
        {
            let result = result.clone();
            rt.spawn_call(
                idx,
                vec![],
                Box::new(move |res| result.set(Some(res))),
            )
            .unwrap();
        }
        rt.run();
        assert_eq!(result.take(), Some(Ok((Some(Value::Int(7)), None))));
    }

    #[test]
    fn test_uncaught_throwable_reaches_completion() {
        let rt = Runtime::new(0);
        let idx = rt.register_method(Method::new(
            "App",
            "boom",
            vec![
                Opcode::Iconst(1),
                Opcode::Iconst(0),
                Opcode::Idiv,
                Opcode::Ireturn,
            ],
        ));
        let result = Rc::new(Cell::new(None));
        {
            let result = result.clone();
            rt.spawn_call(
                idx,
                vec![],
                Box::new(move |res| result.set(Some(res))),
            )
            .unwrap();
        }
        rt.run();
        let res = result.take().unwrap();
        let exc = res.unwrap_err();
        assert_eq!(exc.class_name, "java/lang/ArithmeticException");
        assert_eq!(exc.message, "/ by zero");
        assert!(rt.pool().borrow().threads().is_empty());
    }

    #[test]
    fn test_responsiveness_reaches_the_pool() {
        let fast = Runtime::with_responsiveness(0, 1);
        let default = Runtime::new(0);
        assert!(
            fast.pool().borrow().suggested_quantum()
                < default.pool().borrow().suggested_quantum()
        );

        // The tighter quantum changes nothing about program results.
        let idx = fast.register_method(Method::new(
            "App",
            "five",
            vec![Opcode::Iconst(5), Opcode::Ireturn],
        ));
        let result = Rc::new(Cell::new(None));
        {
            let result = result.clone();
            fast.spawn_call(idx, vec![], Box::new(move |res| result.set(Some(res))))
                .unwrap();
        }
        fast.run();
        assert_eq!(result.take(), Some(Ok((Some(Value::Int(5)), None))));
    }

    #[test]
    fn test_spawn_rejects_unknown_method() {
        let rt = Runtime::new(0);
        assert!(rt.spawn(0, vec![]).is_none());
        assert_eq!(rt.thread_dump(), "");
    }
}
