//! Per-opcode trace descriptors.
//!
//! Each recognized opcode declares how many operand-stack slots it consumes
//! and produces, and whether it is flagged as branching (which ends a
//! trace inclusively). Opcodes without a descriptor end a trace
//! exclusively; interpretation resumes at them.

use bytecode_system::Opcode;

/// Stack effect and control-flow flag for one opcode inside a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceOpInfo {
    /// Slots consumed from the operand stack (top first).
    pub pops: usize,
    /// Slots produced onto the operand stack.
    pub pushes: usize,
    /// True for control transfer, method return, monitor exit, and throw.
    pub has_branch: bool,
}

const fn info(pops: usize, pushes: usize) -> TraceOpInfo {
    TraceOpInfo {
        pops,
        pushes,
        has_branch: false,
    }
}

const fn branch(pops: usize, pushes: usize) -> TraceOpInfo {
    TraceOpInfo {
        pops,
        pushes,
        has_branch: true,
    }
}

/// The descriptor for `op`, or `None` if the opcode is not recognized by
/// the trace compiler.
pub fn trace_op_info(op: &Opcode) -> Option<TraceOpInfo> {
    use Opcode::*;
    Some(match op {
        Nop | Iinc(_, _) => info(0, 0),

        AconstNull | Iconst(_) | Fconst(_) => info(0, 1),
        Lconst(_) | Dconst(_) => info(0, 2),

        Iload(_) | Fload(_) | Aload(_) => info(0, 1),
        Lload(_) | Dload(_) => info(0, 2),
        Istore(_) | Fstore(_) | Astore(_) => info(1, 0),
        Lstore(_) | Dstore(_) => info(2, 0),

        Iadd | Isub | Imul | Idiv | Irem => info(2, 1),
        Ineg => info(1, 1),
        Ladd | Lsub => info(4, 2),
        Lcmp => info(4, 1),

        Pop => info(1, 0),
        Pop2 => info(2, 0),
        Dup => info(1, 2),
        Swap => info(2, 2),

        ArrayLength => info(1, 1),
        Iaload | Aaload => info(2, 1),
        Iastore | Aastore => info(3, 0),

        Goto(_) => branch(0, 0),
        Ifeq(_) | Ifne(_) | Iflt(_) | Ifge(_) | Ifgt(_) | Ifle(_) => branch(1, 0),
        IfIcmpeq(_) | IfIcmpne(_) | IfIcmplt(_) | IfIcmpge(_) | IfIcmpgt(_) | IfIcmple(_) => {
            branch(2, 0)
        }
        IfNull(_) | IfNonnull(_) => branch(1, 0),

        Ireturn | Freturn | Areturn => branch(1, 0),
        Lreturn | Dreturn => branch(2, 0),
        Return => branch(0, 0),
        Athrow => branch(1, 0),
        MonitorExit => branch(1, 0),

        // Invocation, allocation, field access, and monitor entry stay in
        // the interpreter: they need thread- or resolver-level state.
        Invoke(_) | New(_) | NewArray | GetField(_) | PutField(_) | MonitorEnter => return None,
    })
}
