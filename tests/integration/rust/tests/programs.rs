//! Whole-program tests: bytecode through the runtime facade, on both the
//! interpreter and the trace compiler.

use bytecode_system::{ExceptionEntry, Method, Opcode};
use core_types::Value;
use integration_tests::{run_to_completion, run_to_value};
use threading::Runtime;

/// sum(n): loop from 1 to n accumulating into a local.
fn sum_method() -> Method {
    let mut m = Method::new(
        "demo/Math",
        "sum",
        vec![
            Opcode::Iconst(0),     // 0: sum = 0
            Opcode::Istore(1),     // 1
            Opcode::Iconst(1),     // 2: i = 1
            Opcode::Istore(2),     // 3
            Opcode::Iload(2),      // 4: while (i <= n)
            Opcode::Iload(0),      // 5
            Opcode::IfIcmpgt(13),  // 6
            Opcode::Iload(1),      // 7: sum += i
            Opcode::Iload(2),      // 8
            Opcode::Iadd,          // 9
            Opcode::Istore(1),     // 10
            Opcode::Iinc(2, 1),    // 11: i += 1
            Opcode::Goto(4),       // 12
            Opcode::Iload(1),      // 13: return sum
            Opcode::Ireturn,       // 14
        ],
    );
    m.max_locals = 3;
    m.arg_slots = 1;
    m
}

#[test]
fn test_sum_loop_interpreted() {
    let rt = Runtime::new(0);
    let idx = rt.register_method(sum_method());
    assert_eq!(
        run_to_value(&rt, idx, vec![Value::Int(10)]),
        Value::Int(55)
    );
}

#[test]
fn test_sum_loop_compiled_matches_interpreter() {
    let rt = Runtime::new(0);
    let m = sum_method();
    // Fire the compile countdown on the very first step so the loop body
    // runs as compiled traces.
    m.set_compile_budget(1);
    let idx = rt.register_method(m);
    assert_eq!(
        run_to_value(&rt, idx, vec![Value::Int(10)]),
        Value::Int(55)
    );
    let method = rt.env().methods.borrow().get(idx).unwrap();
    assert!(method.compiled_at(0).is_some());
}

#[test]
fn test_caught_division_by_zero() {
    let rt = Runtime::new(0);
    let mut m = Method::new(
        "demo/Math",
        "safeDiv",
        vec![
            Opcode::Iload(0),   // 0
            Opcode::Iconst(0),  // 1
            Opcode::Idiv,       // 2: faults
            Opcode::Ireturn,    // 3
            Opcode::Pop,        // 4: handler: discard the exception ref
            Opcode::Iconst(-1), // 5
            Opcode::Ireturn,    // 6
        ],
    );
    m.max_locals = 1;
    m.arg_slots = 1;
    m.exception_table.push(ExceptionEntry::new(
        0,
        4,
        4,
        Some("java/lang/ArithmeticException".to_string()),
    ));
    let idx = rt.register_method(m);
    assert_eq!(
        run_to_value(&rt, idx, vec![Value::Int(9)]),
        Value::Int(-1)
    );
}

#[test]
fn test_uncaught_division_by_zero() {
    let rt = Runtime::new(0);
    let idx = rt.register_method(Method::new(
        "demo/Math",
        "div",
        vec![
            Opcode::Iconst(1),
            Opcode::Iconst(0),
            Opcode::Idiv,
            Opcode::Ireturn,
        ],
    ));
    let exc = run_to_completion(&rt, idx, vec![]).unwrap_err();
    assert_eq!(exc.class_name, "java/lang/ArithmeticException");
    assert_eq!(exc.message, "/ by zero");
}

#[test]
fn test_nested_invoke() {
    let rt = Runtime::new(0);
    let mut helper = Method::new(
        "demo/Math",
        "mul",
        vec![Opcode::Iload(0), Opcode::Iload(1), Opcode::Imul, Opcode::Ireturn],
    );
    helper.max_locals = 2;
    helper.arg_slots = 2;
    let helper_idx = rt.register_method(helper);

    let entry = rt.register_method(Method::new(
        "demo/Math",
        "entry",
        vec![
            Opcode::Iconst(6),
            Opcode::Iconst(7),
            Opcode::Invoke(helper_idx),
            Opcode::Ireturn,
        ],
    ));
    assert_eq!(run_to_value(&rt, entry, vec![]), Value::Int(42));
}

#[test]
fn test_object_fields() {
    let rt = Runtime::new(0);
    let idx = rt.register_method(Method::new(
        "demo/Objects",
        "roundtrip",
        vec![
            Opcode::New("demo/Point".to_string()),
            Opcode::Dup,
            Opcode::Iconst(5),
            Opcode::PutField("x".to_string()),
            Opcode::GetField("x".to_string()),
            Opcode::Ireturn,
        ],
    ));
    assert_eq!(run_to_value(&rt, idx, vec![]), Value::Int(5));
    assert_eq!(rt.env().heap.borrow().len(), 1);
}

#[test]
fn test_array_store_and_load() {
    let rt = Runtime::new(0);
    let mut m = Method::new(
        "demo/Arrays",
        "storeLoad",
        vec![
            Opcode::Iconst(3),
            Opcode::NewArray,
            Opcode::Astore(0),
            Opcode::Aload(0),
            Opcode::Iconst(1),
            Opcode::Iconst(7),
            Opcode::Iastore,
            Opcode::Aload(0),
            Opcode::Iconst(1),
            Opcode::Iaload,
            Opcode::Ireturn,
        ],
    );
    m.max_locals = 1;
    let idx = rt.register_method(m);
    assert_eq!(run_to_value(&rt, idx, vec![]), Value::Int(7));
}

#[test]
fn test_array_bounds_fault_propagates() {
    let rt = Runtime::new(0);
    let idx = rt.register_method(Method::new(
        "demo/Arrays",
        "outOfBounds",
        vec![
            Opcode::Iconst(2),
            Opcode::NewArray,
            Opcode::Iconst(5),
            Opcode::Iaload,
            Opcode::Ireturn,
        ],
    ));
    let exc = run_to_completion(&rt, idx, vec![]).unwrap_err();
    assert_eq!(exc.class_name, "java/lang/ArrayIndexOutOfBoundsException");
    assert_eq!(exc.message, "5 not in length 2 array");
}

#[test]
fn test_long_arithmetic_two_slot_return() {
    let rt = Runtime::new(0);
    let idx = rt.register_method(Method::new(
        "demo/Math",
        "longAdd",
        vec![
            Opcode::Lconst(1_000_000_000_000),
            Opcode::Lconst(234),
            Opcode::Ladd,
            Opcode::Lreturn,
        ],
    ));
    let res = run_to_completion(&rt, idx, vec![]).unwrap();
    assert_eq!(
        res,
        (Some(Value::Long(1_000_000_000_234)), Some(Value::HighPadding))
    );
}
