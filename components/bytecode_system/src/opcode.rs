//! The decoded instruction set.
//!
//! Instructions are stored pre-decoded; a program counter is an index into
//! a method's instruction vector, and branch targets are instruction
//! indices. 64-bit loads, stores, constants, and returns follow the
//! two-slot convention from `core_types`.

/// A decoded bytecode instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    /// Do nothing.
    Nop,

    // Constants
    /// Push the null reference.
    AconstNull,
    /// Push a 32-bit integer constant.
    Iconst(i32),
    /// Push a 64-bit integer constant (two slots).
    Lconst(i64),
    /// Push a 32-bit float constant.
    Fconst(f32),
    /// Push a 64-bit float constant (two slots).
    Dconst(f64),

    // Local variables
    /// Load a 32-bit integer from a local slot.
    Iload(u16),
    /// Load a 64-bit integer from a local slot (pushes two slots).
    Lload(u16),
    /// Load a 32-bit float from a local slot.
    Fload(u16),
    /// Load a 64-bit float from a local slot (pushes two slots).
    Dload(u16),
    /// Load a reference from a local slot.
    Aload(u16),
    /// Store a 32-bit integer into a local slot.
    Istore(u16),
    /// Store a 64-bit integer into a local slot (pops two slots).
    Lstore(u16),
    /// Store a 32-bit float into a local slot.
    Fstore(u16),
    /// Store a 64-bit float into a local slot (pops two slots).
    Dstore(u16),
    /// Store a reference into a local slot.
    Astore(u16),
    /// Add a signed constant to an integer local in place.
    Iinc(u16, i32),

    // Arithmetic
    /// Integer add.
    Iadd,
    /// Integer subtract.
    Isub,
    /// Integer multiply (wrapping).
    Imul,
    /// Integer divide. Faults with ArithmeticException on zero divisor.
    Idiv,
    /// Integer remainder. Faults with ArithmeticException on zero divisor.
    Irem,
    /// Integer negate.
    Ineg,
    /// Long add.
    Ladd,
    /// Long subtract.
    Lsub,
    /// Compare two longs, pushing -1, 0, or 1.
    Lcmp,

    // Operand stack
    /// Discard the top slot.
    Pop,
    /// Discard the top two slots.
    Pop2,
    /// Duplicate the top slot.
    Dup,
    /// Swap the top two slots.
    Swap,

    // Control transfer
    /// Unconditional branch.
    Goto(usize),
    /// Branch if the popped integer is zero.
    Ifeq(usize),
    /// Branch if the popped integer is non-zero.
    Ifne(usize),
    /// Branch if the popped integer is negative.
    Iflt(usize),
    /// Branch if the popped integer is non-negative.
    Ifge(usize),
    /// Branch if the popped integer is positive.
    Ifgt(usize),
    /// Branch if the popped integer is non-positive.
    Ifle(usize),
    /// Branch if the two popped integers are equal.
    IfIcmpeq(usize),
    /// Branch if the two popped integers are not equal.
    IfIcmpne(usize),
    /// Branch if value2 < value1 for the two popped integers.
    IfIcmplt(usize),
    /// Branch if value2 >= value1 for the two popped integers.
    IfIcmpge(usize),
    /// Branch if value2 > value1 for the two popped integers.
    IfIcmpgt(usize),
    /// Branch if value2 <= value1 for the two popped integers.
    IfIcmple(usize),
    /// Branch if the popped reference is null.
    IfNull(usize),
    /// Branch if the popped reference is non-null.
    IfNonnull(usize),

    // Returns
    /// Return a 32-bit integer.
    Ireturn,
    /// Return a 64-bit integer (two slots).
    Lreturn,
    /// Return a 32-bit float.
    Freturn,
    /// Return a 64-bit float (two slots).
    Dreturn,
    /// Return a reference.
    Areturn,
    /// Return void.
    Return,

    // Objects and arrays
    /// Allocate a plain object of the named class and push its reference.
    New(String),
    /// Pop a length and allocate an integer array of that length.
    NewArray,
    /// Pop a reference and push the named field. Faults on null.
    GetField(String),
    /// Pop a value and a reference and store the named field. Faults on null.
    PutField(String),
    /// Pop an array reference and push its length. Faults on null.
    ArrayLength,
    /// Pop index and array reference, push the element. Faults on null/bounds.
    Iaload,
    /// Pop value, index, and array reference, store the element.
    Iastore,
    /// Reference-array load. Same fault edges as `Iaload`.
    Aaload,
    /// Reference-array store. Same fault edges as `Iastore`.
    Aastore,

    // Invocation and synchronization
    /// Invoke the method at the given method-table index. Argument slots
    /// are popped per the callee's metadata; native targets push a native
    /// frame.
    Invoke(usize),
    /// Pop a reference and acquire its monitor.
    MonitorEnter,
    /// Pop a reference and release its monitor.
    MonitorExit,
    /// Pop a reference and throw it.
    Athrow,
}
