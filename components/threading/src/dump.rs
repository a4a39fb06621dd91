//! Thread dumps for diagnostics.

use std::fmt::Write;

use scheduler::PoolRef;

use crate::thread::JvmThread;

/// Render every pool thread as a header line plus its frame stack, top
/// frame first.
pub fn thread_dump(pool: &PoolRef<JvmThread>) -> String {
    let mut out = String::new();
    let pool = pool.borrow();
    for handle in pool.threads() {
        let t = handle.borrow();
        let _ = writeln!(out, "\"Thread-{}\" {:?}", t.id(), t.status());
        for frame in t.frames().iter().rev() {
            let _ = writeln!(out, "    {}", frame.trace_info());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::RuntimeEnv;
    use crate::frame::{BytecodeFrame, Frame};
    use bytecode_system::{Method, Opcode};
    use core_types::ThreadStatus;
    use scheduler::ThreadPool;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_dump_lists_threads_and_frames() {
        let env = RuntimeEnv::new(0);
        let pool: PoolRef<JvmThread> = Rc::new(RefCell::new(ThreadPool::new()));
        env.attach_pool(&pool);

        let t = JvmThread::new(&env);
        JvmThread::set_status(&t, ThreadStatus::Runnable);
        let outer = Rc::new(Method::new("App", "main", vec![Opcode::Return]));
        let inner = Rc::new(Method::new("App", "work", vec![Opcode::Return]));
        t.borrow_mut()
            .push_frame(Frame::Bytecode(BytecodeFrame::new(outer, vec![])));
        t.borrow_mut()
            .push_frame(Frame::Bytecode(BytecodeFrame::new(inner, vec![])));

        let dump = thread_dump(&pool);
        assert!(dump.contains("\"Thread-1\" Runnable"));
        // Top frame first.
        let work = dump.find("App.work").unwrap();
        let main = dump.find("App.main").unwrap();
        assert!(work < main);
    }
}
