//! Trace construction and closure emission.
//!
//! Compilation walks opcodes linearly from the entry pc, assigning every
//! produced value a temporary slot. A consumed value is satisfied from the
//! symbolic stack of pending temporaries when one is available; otherwise a
//! real pop against the frame's operand stack is emitted. Pending
//! temporaries are materialized back onto the real stack only at trace
//! boundaries and on fault edges.
//!
//! Emission walks the recorded steps in reverse: each opcode's closure
//! captures the already-emitted continuation for the opcodes after it, so
//! a successful run is one composed call chain with no dispatch loop.

use std::rc::Rc;

use bytecode_system::{Method, Opcode, TraceClosure, TraceContext, TraceExit};
use core_types::{ObjectId, Throwable, Value};
use log::debug;
use smallvec::SmallVec;

/// Where a consumed slot comes from at runtime.
#[derive(Debug, Clone, Copy)]
enum Source {
    /// A temporary produced earlier in the trace.
    Temp(usize),
    /// A real pop from the frame's operand stack.
    PopReal,
}

type Sources = SmallVec<[Source; 4]>;
type Dests = SmallVec<[usize; 2]>;
type PendingList = SmallVec<[usize; 4]>;
type Cont = Rc<dyn Fn(&mut TraceContext<'_>, &mut [Value]) -> TraceExit>;

fn take(ctx: &mut TraceContext<'_>, temps: &[Value], src: Source) -> Value {
    match src {
        Source::Temp(i) => temps[i],
        Source::PopReal => {
            debug_assert!(!ctx.stack.is_empty(), "trace pop on empty operand stack");
            ctx.stack.pop().unwrap_or(Value::Null)
        }
    }
}

/// Push pending temporaries back onto the real stack, bottom first.
fn rematerialize(ctx: &mut TraceContext<'_>, temps: &[Value], pending: &[usize]) {
    for &id in pending {
        ctx.stack.push(temps[id]);
    }
}

fn int_of(v: Value) -> i32 {
    debug_assert!(matches!(v, Value::Int(_)), "expected int slot, got {v:?}");
    v.as_int().unwrap_or(0)
}

fn long_of(v: Value) -> i64 {
    debug_assert!(matches!(v, Value::Long(_)), "expected long slot, got {v:?}");
    v.as_long().unwrap_or(0)
}

fn npe() -> Throwable {
    Throwable::new("java/lang/NullPointerException", "null reference")
}

fn array_bounds(idx: i32, len: usize) -> Throwable {
    Throwable::new(
        "java/lang/ArrayIndexOutOfBoundsException",
        format!("{idx} not in length {len} array"),
    )
}

/// Reads the element at `idx`, or produces the fault for the edge.
fn array_load(
    ctx: &mut TraceContext<'_>,
    arr: Value,
    idx: i32,
) -> Result<Value, Throwable> {
    let id = match arr {
        Value::Ref(id) => id,
        _ => return Err(npe()),
    };
    let obj = ctx.heap.get(id);
    debug_assert!(obj.is_some(), "dangling object handle in trace");
    let arr = obj.and_then(|o| o.array.as_ref());
    debug_assert!(arr.is_some(), "array opcode on non-array object");
    let arr = match arr {
        Some(a) => a,
        None => return Err(npe()),
    };
    if idx < 0 || idx as usize >= arr.len() {
        return Err(array_bounds(idx, arr.len()));
    }
    Ok(arr[idx as usize])
}

fn array_store(
    ctx: &mut TraceContext<'_>,
    arr: Value,
    idx: i32,
    val: Value,
) -> Result<(), Throwable> {
    let id = match arr {
        Value::Ref(id) => id,
        _ => return Err(npe()),
    };
    let slot = ctx
        .heap
        .get_mut(id)
        .and_then(|o| o.array.as_mut());
    debug_assert!(slot.is_some(), "array opcode on non-array object");
    let arr = match slot {
        Some(a) => a,
        None => return Err(npe()),
    };
    if idx < 0 || idx as usize >= arr.len() {
        return Err(array_bounds(idx, arr.len()));
    }
    arr[idx as usize] = val;
    Ok(())
}

fn throwable_for_ref(ctx: &TraceContext<'_>, id: ObjectId) -> Throwable {
    let class = ctx
        .heap
        .get(id)
        .map(|o| o.class_name.clone())
        .unwrap_or_else(|| "java/lang/Throwable".to_string());
    Throwable::with_object(class, "", id)
}

/// One recorded opcode of the trace under construction.
struct Step {
    op: Opcode,
    pc: usize,
    srcs: Sources,
    dsts: Dests,
    /// Temporaries still pending on the symbolic stack after this opcode's
    /// consumption, bottom first. Flushed on fault edges and at branches.
    pending: PendingList,
}

/// Compile a straight-line trace starting at `start_pc`.
///
/// Returns `None` when the trace would contain one opcode or fewer; the
/// caller marks that pc as permanently failed.
pub fn compile_trace(method: &Method, start_pc: usize) -> Option<TraceClosure> {
    let mut steps: Vec<Step> = Vec::new();
    let mut symbolic: Vec<usize> = Vec::new();
    let mut temp_count = 0usize;
    let mut pc = start_pc;
    let mut ended_inclusive = false;

    while pc < method.code.len() {
        let op = &method.code[pc];
        let info = match crate::op_info::trace_op_info(op) {
            Some(info) => info,
            None => break,
        };

        let mut srcs = Sources::new();
        for _ in 0..info.pops {
            match symbolic.pop() {
                Some(t) => srcs.push(Source::Temp(t)),
                None => srcs.push(Source::PopReal),
            }
        }
        let pending: PendingList = symbolic.iter().copied().collect();
        let mut dsts = Dests::new();
        for _ in 0..info.pushes {
            dsts.push(temp_count);
            symbolic.push(temp_count);
            temp_count += 1;
        }

        steps.push(Step {
            op: op.clone(),
            pc,
            srcs,
            dsts,
            pending,
        });

        if info.has_branch {
            ended_inclusive = true;
            break;
        }
        pc += 1;
    }

    if steps.len() <= 1 {
        return None;
    }

    // Terminal continuation: for an exclusive end, flush what is still
    // symbolic and leave pc at the unrecognized opcode.
    let end_pc = pc;
    let leftover: PendingList = symbolic.iter().copied().collect();
    let mut cont: Cont = if ended_inclusive {
        Rc::new(|_, _| TraceExit::Continue)
    } else {
        Rc::new(move |ctx, temps| {
            rematerialize(ctx, temps, &leftover);
            *ctx.pc = end_pc;
            TraceExit::Continue
        })
    };

    for step in steps.into_iter().rev() {
        cont = emit_step(step, cont);
    }

    Some(Rc::new(move |ctx: &mut TraceContext<'_>| {
        let mut temps = vec![Value::Null; temp_count];
        cont(ctx, &mut temps)
    }))
}

/// Compile-or-fail entry point used by the bytecode frame once the
/// method's countdown budget fires: caches on success, marks the pc as
/// permanently failed otherwise.
pub fn maybe_compile(method: &Method, pc: usize) -> Option<TraceClosure> {
    if let Some(existing) = method.compiled_at(pc) {
        return Some(existing);
    }
    if method.failed_at(pc) {
        return None;
    }
    match compile_trace(method, pc) {
        Some(closure) => {
            debug!("compiled trace {}@{}", method.full_signature(), pc);
            method.cache_trace(pc, closure.clone());
            Some(closure)
        }
        None => {
            debug!("rejected trace {}@{}", method.full_signature(), pc);
            method.mark_failed(pc);
            None
        }
    }
}

fn store(temps: &mut [Value], dst: usize, v: Value) {
    temps[dst] = v;
}

/// Emit the closure for one opcode, chaining to `next` on success.
#[allow(clippy::too_many_lines)]
fn emit_step(step: Step, next: Cont) -> Cont {
    use Opcode::*;
    let Step {
        op,
        pc,
        srcs,
        dsts,
        pending,
    } = step;

    match op {
        Nop => Rc::new(move |ctx, temps| next(ctx, temps)),

        Iinc(slot, delta) => Rc::new(move |ctx, temps| {
            let v = int_of(ctx.locals[slot as usize]);
            ctx.locals[slot as usize] = Value::Int(v.wrapping_add(delta));
            next(ctx, temps)
        }),

        AconstNull => Rc::new(move |ctx, temps| {
            store(temps, dsts[0], Value::Null);
            next(ctx, temps)
        }),
        Iconst(c) => Rc::new(move |ctx, temps| {
            store(temps, dsts[0], Value::Int(c));
            next(ctx, temps)
        }),
        Fconst(c) => Rc::new(move |ctx, temps| {
            store(temps, dsts[0], Value::Float(c));
            next(ctx, temps)
        }),
        Lconst(c) => Rc::new(move |ctx, temps| {
            store(temps, dsts[0], Value::Long(c));
            store(temps, dsts[1], Value::HighPadding);
            next(ctx, temps)
        }),
        Dconst(c) => Rc::new(move |ctx, temps| {
            store(temps, dsts[0], Value::Double(c));
            store(temps, dsts[1], Value::HighPadding);
            next(ctx, temps)
        }),

        Iload(n) | Fload(n) | Aload(n) => Rc::new(move |ctx, temps| {
            store(temps, dsts[0], ctx.locals[n as usize]);
            next(ctx, temps)
        }),
        Lload(n) | Dload(n) => Rc::new(move |ctx, temps| {
            store(temps, dsts[0], ctx.locals[n as usize]);
            store(temps, dsts[1], Value::HighPadding);
            next(ctx, temps)
        }),
        Istore(n) | Fstore(n) | Astore(n) => Rc::new(move |ctx, temps| {
            let v = take(ctx, temps, srcs[0]);
            ctx.locals[n as usize] = v;
            next(ctx, temps)
        }),
        Lstore(n) | Dstore(n) => Rc::new(move |ctx, temps| {
            let _pad = take(ctx, temps, srcs[0]);
            let v = take(ctx, temps, srcs[1]);
            ctx.locals[n as usize] = v;
            ctx.locals[n as usize + 1] = Value::HighPadding;
            next(ctx, temps)
        }),

        Iadd | Isub | Imul => Rc::new(move |ctx, temps| {
            let rhs = int_of(take(ctx, temps, srcs[0]));
            let lhs = int_of(take(ctx, temps, srcs[1]));
            let r = match op {
                Iadd => lhs.wrapping_add(rhs),
                Isub => lhs.wrapping_sub(rhs),
                _ => lhs.wrapping_mul(rhs),
            };
            store(temps, dsts[0], Value::Int(r));
            next(ctx, temps)
        }),
        Idiv | Irem => Rc::new(move |ctx, temps| {
            let rhs = int_of(take(ctx, temps, srcs[0]));
            let lhs = int_of(take(ctx, temps, srcs[1]));
            if rhs == 0 {
                rematerialize(ctx, temps, &pending);
                *ctx.pc = pc;
                return TraceExit::Throw(Throwable::new(
                    "java/lang/ArithmeticException",
                    "/ by zero",
                ));
            }
            let r = match op {
                Idiv => lhs.wrapping_div(rhs),
                _ => lhs.wrapping_rem(rhs),
            };
            store(temps, dsts[0], Value::Int(r));
            next(ctx, temps)
        }),
        Ineg => Rc::new(move |ctx, temps| {
            let v = int_of(take(ctx, temps, srcs[0]));
            store(temps, dsts[0], Value::Int(v.wrapping_neg()));
            next(ctx, temps)
        }),

        Ladd | Lsub => Rc::new(move |ctx, temps| {
            let _pad = take(ctx, temps, srcs[0]);
            let rhs = long_of(take(ctx, temps, srcs[1]));
            let _pad = take(ctx, temps, srcs[2]);
            let lhs = long_of(take(ctx, temps, srcs[3]));
            let r = match op {
                Ladd => lhs.wrapping_add(rhs),
                _ => lhs.wrapping_sub(rhs),
            };
            store(temps, dsts[0], Value::Long(r));
            store(temps, dsts[1], Value::HighPadding);
            next(ctx, temps)
        }),
        Lcmp => Rc::new(move |ctx, temps| {
            let _pad = take(ctx, temps, srcs[0]);
            let rhs = long_of(take(ctx, temps, srcs[1]));
            let _pad = take(ctx, temps, srcs[2]);
            let lhs = long_of(take(ctx, temps, srcs[3]));
            let r = match lhs.cmp(&rhs) {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            };
            store(temps, dsts[0], Value::Int(r));
            next(ctx, temps)
        }),

        Pop => Rc::new(move |ctx, temps| {
            let _ = take(ctx, temps, srcs[0]);
            next(ctx, temps)
        }),
        Pop2 => Rc::new(move |ctx, temps| {
            let _ = take(ctx, temps, srcs[0]);
            let _ = take(ctx, temps, srcs[1]);
            next(ctx, temps)
        }),
        Dup => Rc::new(move |ctx, temps| {
            let v = take(ctx, temps, srcs[0]);
            store(temps, dsts[0], v);
            store(temps, dsts[1], v);
            next(ctx, temps)
        }),
        Swap => Rc::new(move |ctx, temps| {
            let top = take(ctx, temps, srcs[0]);
            let second = take(ctx, temps, srcs[1]);
            store(temps, dsts[0], top);
            store(temps, dsts[1], second);
            next(ctx, temps)
        }),

        ArrayLength => Rc::new(move |ctx, temps| {
            let arr = take(ctx, temps, srcs[0]);
            let id = match arr {
                Value::Ref(id) => id,
                _ => {
                    rematerialize(ctx, temps, &pending);
                    *ctx.pc = pc;
                    return TraceExit::Throw(npe());
                }
            };
            let len = ctx
                .heap
                .get(id)
                .and_then(|o| o.array.as_ref())
                .map(|a| a.len());
            debug_assert!(len.is_some(), "ArrayLength on non-array object");
            store(temps, dsts[0], Value::Int(len.unwrap_or(0) as i32));
            next(ctx, temps)
        }),
        Iaload | Aaload => Rc::new(move |ctx, temps| {
            let idx = int_of(take(ctx, temps, srcs[0]));
            let arr = take(ctx, temps, srcs[1]);
            match array_load(ctx, arr, idx) {
                Ok(v) => {
                    store(temps, dsts[0], v);
                    next(ctx, temps)
                }
                Err(t) => {
                    rematerialize(ctx, temps, &pending);
                    *ctx.pc = pc;
                    TraceExit::Throw(t)
                }
            }
        }),
        Iastore | Aastore => Rc::new(move |ctx, temps| {
            let val = take(ctx, temps, srcs[0]);
            let idx = int_of(take(ctx, temps, srcs[1]));
            let arr = take(ctx, temps, srcs[2]);
            match array_store(ctx, arr, idx, val) {
                Ok(()) => next(ctx, temps),
                Err(t) => {
                    rematerialize(ctx, temps, &pending);
                    *ctx.pc = pc;
                    TraceExit::Throw(t)
                }
            }
        }),

        Goto(target) => Rc::new(move |ctx, temps| {
            rematerialize(ctx, temps, &pending);
            *ctx.pc = target;
            TraceExit::Continue
        }),
        Ifeq(t) | Ifne(t) | Iflt(t) | Ifge(t) | Ifgt(t) | Ifle(t) => Rc::new(move |ctx, temps| {
            rematerialize(ctx, temps, &pending);
            let v = int_of(take(ctx, temps, srcs[0]));
            let taken = match op {
                Ifeq(_) => v == 0,
                Ifne(_) => v != 0,
                Iflt(_) => v < 0,
                Ifge(_) => v >= 0,
                Ifgt(_) => v > 0,
                _ => v <= 0,
            };
            *ctx.pc = if taken { t } else { pc + 1 };
            TraceExit::Continue
        }),
        IfIcmpeq(t) | IfIcmpne(t) | IfIcmplt(t) | IfIcmpge(t) | IfIcmpgt(t) | IfIcmple(t) => {
            Rc::new(move |ctx, temps| {
                rematerialize(ctx, temps, &pending);
                let rhs = int_of(take(ctx, temps, srcs[0]));
                let lhs = int_of(take(ctx, temps, srcs[1]));
                let taken = match op {
                    IfIcmpeq(_) => lhs == rhs,
                    IfIcmpne(_) => lhs != rhs,
                    IfIcmplt(_) => lhs < rhs,
                    IfIcmpge(_) => lhs >= rhs,
                    IfIcmpgt(_) => lhs > rhs,
                    _ => lhs <= rhs,
                };
                *ctx.pc = if taken { t } else { pc + 1 };
                TraceExit::Continue
            })
        }
        IfNull(t) | IfNonnull(t) => Rc::new(move |ctx, temps| {
            rematerialize(ctx, temps, &pending);
            let v = take(ctx, temps, srcs[0]);
            let taken = match op {
                IfNull(_) => v.is_null(),
                _ => !v.is_null(),
            };
            *ctx.pc = if taken { t } else { pc + 1 };
            TraceExit::Continue
        }),

        Ireturn | Freturn | Areturn => Rc::new(move |ctx, temps| {
            let v = take(ctx, temps, srcs[0]);
            TraceExit::Return1(v)
        }),
        Lreturn | Dreturn => Rc::new(move |ctx, temps| {
            let _pad = take(ctx, temps, srcs[0]);
            let v = take(ctx, temps, srcs[1]);
            TraceExit::Return2(v, Value::HighPadding)
        }),
        Return => Rc::new(move |_ctx, _temps| TraceExit::ReturnVoid),

        Athrow => Rc::new(move |ctx, temps| {
            let v = take(ctx, temps, srcs[0]);
            rematerialize(ctx, temps, &pending);
            *ctx.pc = pc;
            match v {
                Value::Ref(id) => TraceExit::Throw(throwable_for_ref(ctx, id)),
                _ => TraceExit::Throw(npe()),
            }
        }),
        MonitorExit => Rc::new(move |ctx, temps| {
            rematerialize(ctx, temps, &pending);
            let v = take(ctx, temps, srcs[0]);
            *ctx.pc = pc;
            TraceExit::MonitorExit(v)
        }),

        Invoke(_) | New(_) | NewArray | GetField(_) | PutField(_) | MonitorEnter => {
            debug_assert!(false, "unrecognized opcode reached trace emission");
            Rc::new(|_, _| TraceExit::Continue)
        }
    }
}
