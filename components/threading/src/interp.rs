//! Bytecode interpretation for a single frame step.
//!
//! `step` is the only entry point: it prefers a cached compiled trace at
//! the current pc, burns the method's compile budget (attempting
//! compilation when the countdown fires), and falls back to interpreting
//! one opcode. Either path reports an [`OpOutcome`] command; the thread
//! applies it with no cell borrowed.

use core_types::{Heap, HeapObject, ObjectId, Throwable, Value};
use bytecode_system::{Opcode, TraceClosure, TraceContext, TraceExit};
use jit_compiler::maybe_compile;

use crate::frame::{BytecodeFrame, OpOutcome};

fn npe() -> Throwable {
    Throwable::new("java/lang/NullPointerException", "null reference")
}

fn bounds(idx: i32, len: usize) -> Throwable {
    Throwable::new(
        "java/lang/ArrayIndexOutOfBoundsException",
        format!("{idx} not in length {len} array"),
    )
}

fn throwable_for_ref(heap: &Heap, id: ObjectId) -> Throwable {
    let class = heap
        .get(id)
        .map(|o| o.class_name.clone())
        .unwrap_or_else(|| "java/lang/Throwable".to_string());
    Throwable::with_object(class, "", id)
}

fn pop(frame: &mut BytecodeFrame) -> Value {
    debug_assert!(!frame.stack.is_empty(), "pop on empty operand stack");
    frame.stack.pop().unwrap_or(Value::Null)
}

fn pop_int(frame: &mut BytecodeFrame) -> i32 {
    let v = pop(frame);
    debug_assert!(matches!(v, Value::Int(_)), "expected int slot, got {v:?}");
    v.as_int().unwrap_or(0)
}

/// Pop a wide integer: padding slot first, then the value.
fn pop_long(frame: &mut BytecodeFrame) -> i64 {
    let pad = pop(frame);
    debug_assert_eq!(pad, Value::HighPadding, "wide value missing padding slot");
    let v = pop(frame);
    debug_assert!(matches!(v, Value::Long(_)), "expected long slot, got {v:?}");
    v.as_long().unwrap_or(0)
}

fn push_wide(frame: &mut BytecodeFrame, v: Value) {
    frame.stack.push(v);
    frame.stack.push(Value::HighPadding);
}

/// Execute one step of the frame: a whole cached trace, or one opcode.
pub(crate) fn step(frame: &mut BytecodeFrame, heap: &mut Heap) -> OpOutcome {
    if let Some(trace) = frame.method.compiled_at(frame.pc) {
        return run_trace(frame, heap, &trace);
    }
    if frame.method.tick_compile_budget() {
        let method = frame.method.clone();
        if let Some(trace) = maybe_compile(&method, frame.pc) {
            return run_trace(frame, heap, &trace);
        }
    }
    interpret_one(frame, heap)
}

fn run_trace(frame: &mut BytecodeFrame, heap: &mut Heap, trace: &TraceClosure) -> OpOutcome {
    let exit = trace(&mut TraceContext {
        pc: &mut frame.pc,
        locals: &mut frame.locals,
        stack: &mut frame.stack,
        heap,
    });
    match exit {
        TraceExit::Continue => OpOutcome::Continue,
        TraceExit::ReturnVoid => OpOutcome::ReturnVoid,
        TraceExit::Return1(v) => OpOutcome::Return1(v),
        TraceExit::Return2(a, b) => OpOutcome::Return2(a, b),
        TraceExit::Throw(t) => OpOutcome::Throw(t),
        TraceExit::MonitorExit(v) => match v {
            Value::Ref(id) => OpOutcome::MonitorExit(id),
            _ => OpOutcome::Throw(npe()),
        },
    }
}

#[allow(clippy::too_many_lines)]
fn interpret_one(frame: &mut BytecodeFrame, heap: &mut Heap) -> OpOutcome {
    use Opcode::*;

    let method = frame.method.clone();
    if frame.pc >= method.code.len() {
        debug_assert!(false, "pc {} out of range in {}", frame.pc, method.full_signature());
        return OpOutcome::Throw(Throwable::new(
            "java/lang/InternalError",
            "pc out of range",
        ));
    }

    match &method.code[frame.pc] {
        Nop => {}

        AconstNull => frame.stack.push(Value::Null),
        Iconst(c) => frame.stack.push(Value::Int(*c)),
        Fconst(c) => frame.stack.push(Value::Float(*c)),
        Lconst(c) => push_wide(frame, Value::Long(*c)),
        Dconst(c) => push_wide(frame, Value::Double(*c)),

        Iload(n) | Fload(n) | Aload(n) => frame.stack.push(frame.locals[*n as usize]),
        Lload(n) | Dload(n) => {
            let v = frame.locals[*n as usize];
            push_wide(frame, v);
        }
        Istore(n) | Fstore(n) | Astore(n) => {
            let v = pop(frame);
            frame.locals[*n as usize] = v;
        }
        Lstore(n) | Dstore(n) => {
            let _pad = pop(frame);
            let v = pop(frame);
            frame.locals[*n as usize] = v;
            frame.locals[*n as usize + 1] = Value::HighPadding;
        }
        Iinc(n, delta) => {
            let v = frame.locals[*n as usize].as_int().unwrap_or(0);
            frame.locals[*n as usize] = Value::Int(v.wrapping_add(*delta));
        }

        Iadd => {
            let rhs = pop_int(frame);
            let lhs = pop_int(frame);
            frame.stack.push(Value::Int(lhs.wrapping_add(rhs)));
        }
        Isub => {
            let rhs = pop_int(frame);
            let lhs = pop_int(frame);
            frame.stack.push(Value::Int(lhs.wrapping_sub(rhs)));
        }
        Imul => {
            let rhs = pop_int(frame);
            let lhs = pop_int(frame);
            frame.stack.push(Value::Int(lhs.wrapping_mul(rhs)));
        }
        Idiv => {
            let rhs = pop_int(frame);
            let lhs = pop_int(frame);
            if rhs == 0 {
                return OpOutcome::Throw(Throwable::new(
                    "java/lang/ArithmeticException",
                    "/ by zero",
                ));
            }
            frame.stack.push(Value::Int(lhs.wrapping_div(rhs)));
        }
        Irem => {
            let rhs = pop_int(frame);
            let lhs = pop_int(frame);
            if rhs == 0 {
                return OpOutcome::Throw(Throwable::new(
                    "java/lang/ArithmeticException",
                    "/ by zero",
                ));
            }
            frame.stack.push(Value::Int(lhs.wrapping_rem(rhs)));
        }
        Ineg => {
            let v = pop_int(frame);
            frame.stack.push(Value::Int(v.wrapping_neg()));
        }
        Ladd => {
            let rhs = pop_long(frame);
            let lhs = pop_long(frame);
            push_wide(frame, Value::Long(lhs.wrapping_add(rhs)));
        }
        Lsub => {
            let rhs = pop_long(frame);
            let lhs = pop_long(frame);
            push_wide(frame, Value::Long(lhs.wrapping_sub(rhs)));
        }
        Lcmp => {
            let rhs = pop_long(frame);
            let lhs = pop_long(frame);
            let r = match lhs.cmp(&rhs) {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            };
            frame.stack.push(Value::Int(r));
        }

        Pop => {
            let _ = pop(frame);
        }
        Pop2 => {
            let _ = pop(frame);
            let _ = pop(frame);
        }
        Dup => {
            let v = pop(frame);
            frame.stack.push(v);
            frame.stack.push(v);
        }
        Swap => {
            let top = pop(frame);
            let second = pop(frame);
            frame.stack.push(top);
            frame.stack.push(second);
        }

        Goto(t) => {
            frame.pc = *t;
            return OpOutcome::Continue;
        }
        Ifeq(t) | Ifne(t) | Iflt(t) | Ifge(t) | Ifgt(t) | Ifle(t) => {
            let v = pop_int(frame);
            let taken = match &method.code[frame.pc] {
                Ifeq(_) => v == 0,
                Ifne(_) => v != 0,
                Iflt(_) => v < 0,
                Ifge(_) => v >= 0,
                Ifgt(_) => v > 0,
                _ => v <= 0,
            };
            frame.pc = if taken { *t } else { frame.pc + 1 };
            return OpOutcome::Continue;
        }
        IfIcmpeq(t) | IfIcmpne(t) | IfIcmplt(t) | IfIcmpge(t) | IfIcmpgt(t) | IfIcmple(t) => {
            let rhs = pop_int(frame);
            let lhs = pop_int(frame);
            let taken = match &method.code[frame.pc] {
                IfIcmpeq(_) => lhs == rhs,
                IfIcmpne(_) => lhs != rhs,
                IfIcmplt(_) => lhs < rhs,
                IfIcmpge(_) => lhs >= rhs,
                IfIcmpgt(_) => lhs > rhs,
                _ => lhs <= rhs,
            };
            frame.pc = if taken { *t } else { frame.pc + 1 };
            return OpOutcome::Continue;
        }
        IfNull(t) | IfNonnull(t) => {
            let v = pop(frame);
            let taken = match &method.code[frame.pc] {
                IfNull(_) => v.is_null(),
                _ => !v.is_null(),
            };
            frame.pc = if taken { *t } else { frame.pc + 1 };
            return OpOutcome::Continue;
        }

        Ireturn | Freturn | Areturn => {
            let v = pop(frame);
            return OpOutcome::Return1(v);
        }
        Lreturn | Dreturn => {
            let _pad = pop(frame);
            let v = pop(frame);
            return OpOutcome::Return2(v, Value::HighPadding);
        }
        Return => return OpOutcome::ReturnVoid,

        New(class_name) => {
            let id = heap.alloc(HeapObject::new(class_name.clone()));
            frame.stack.push(Value::Ref(id));
        }
        NewArray => {
            let len = pop_int(frame);
            if len < 0 {
                return OpOutcome::Throw(Throwable::new(
                    "java/lang/NegativeArraySizeException",
                    len.to_string(),
                ));
            }
            let id = heap.alloc(HeapObject::new_array("[I", len as usize));
            frame.stack.push(Value::Ref(id));
        }
        GetField(name) => {
            let obj = match pop(frame) {
                Value::Ref(id) => id,
                _ => return OpOutcome::Throw(npe()),
            };
            let v = heap
                .get(obj)
                .and_then(|o| o.fields.get(name).copied())
                .unwrap_or(Value::Null);
            frame.stack.push(v);
        }
        PutField(name) => {
            let v = pop(frame);
            let obj = match pop(frame) {
                Value::Ref(id) => id,
                _ => return OpOutcome::Throw(npe()),
            };
            if let Some(o) = heap.get_mut(obj) {
                o.fields.insert(name.clone(), v);
            } else {
                debug_assert!(false, "dangling object handle");
            }
        }
        ArrayLength => {
            let obj = match pop(frame) {
                Value::Ref(id) => id,
                _ => return OpOutcome::Throw(npe()),
            };
            let len = heap.get(obj).and_then(|o| o.array.as_ref()).map(Vec::len);
            debug_assert!(len.is_some(), "ArrayLength on non-array object");
            frame.stack.push(Value::Int(len.unwrap_or(0) as i32));
        }
        Iaload | Aaload => {
            let idx = pop_int(frame);
            let obj = match pop(frame) {
                Value::Ref(id) => id,
                _ => return OpOutcome::Throw(npe()),
            };
            let arr = heap.get(obj).and_then(|o| o.array.as_ref());
            let Some(arr) = arr else {
                return OpOutcome::Throw(npe());
            };
            if idx < 0 || idx as usize >= arr.len() {
                return OpOutcome::Throw(bounds(idx, arr.len()));
            }
            frame.stack.push(arr[idx as usize]);
        }
        Iastore | Aastore => {
            let v = pop(frame);
            let idx = pop_int(frame);
            let obj = match pop(frame) {
                Value::Ref(id) => id,
                _ => return OpOutcome::Throw(npe()),
            };
            let arr = heap.get_mut(obj).and_then(|o| o.array.as_mut());
            let Some(arr) = arr else {
                return OpOutcome::Throw(npe());
            };
            if idx < 0 || idx as usize >= arr.len() {
                return OpOutcome::Throw(bounds(idx, arr.len()));
            }
            arr[idx as usize] = v;
        }

        Invoke(idx) => {
            let idx = *idx;
            frame.pc += 1;
            return OpOutcome::Invoke(idx);
        }
        MonitorEnter => {
            let obj = match pop(frame) {
                Value::Ref(id) => id,
                _ => return OpOutcome::Throw(npe()),
            };
            frame.pc += 1;
            return OpOutcome::MonitorEnter(obj);
        }
        MonitorExit => {
            let obj = match pop(frame) {
                Value::Ref(id) => id,
                _ => return OpOutcome::Throw(npe()),
            };
            // The pc stays here; the thread advances it only once the
            // release succeeds, so an IllegalMonitorStateException is
            // searched from this opcode.
            return OpOutcome::MonitorExit(obj);
        }
        Athrow => {
            let obj = match pop(frame) {
                Value::Ref(id) => id,
                _ => return OpOutcome::Throw(npe()),
            };
            return OpOutcome::Throw(throwable_for_ref(heap, obj));
        }
    }

    frame.pc += 1;
    OpOutcome::Continue
}
