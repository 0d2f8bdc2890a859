//! End-to-end execution tests: whole programs run through the call gateway.

mod common;

use common::*;
use opal_core::hostfn::{HostCall, HostCtx, HostFn};
use opal_core::{Object, Value};
use opal_vm::{HostImports, VirtualMachine};

#[test]
fn test_return_constant() {
    let main = const_function(int(777));
    let mut vm = VirtualMachine::new();
    let ret = vm.call_fun(main, &[]).unwrap();
    assert_eq!(ret, int(777));
    assert_eq!(vm.stack_size(), 0);
}

#[test]
fn test_float_arithmetic() {
    let entry = block_shell();
    emit(entry, "push", &[("val", float(5.25))]);
    emit(entry, "push", &[("val", float(5.25))]);
    emit(entry, "add_f32", &[]);
    emit(entry, "ret", &[]);
    let main = function(entry, 0, 0);

    let mut vm = VirtualMachine::new();
    let ret = vm.call_fun(main, &[]).unwrap();
    assert_eq!(ret.as_float32(), Some(10.5));
    assert_eq!(ret.to_string(), "10.500000");
}

/// Initializes a local to 10 and decrements it to zero in a loop.
#[test]
fn test_counted_loop() {
    let entry = block_shell();
    let head = block_shell();
    let body = block_shell();
    let exit = block_shell();

    emit(entry, "push", &[("val", int(10))]);
    emit(entry, "set_local", &[("idx", int(0))]);
    emit(entry, "jump", &[("to", Value::from(head))]);

    emit(head, "get_local", &[("idx", int(0))]);
    emit(head, "push", &[("val", int(0))]);
    emit(head, "gt_i32", &[]);
    emit(
        head,
        "if_true",
        &[("then", Value::from(body)), ("else", Value::from(exit))],
    );

    emit(body, "get_local", &[("idx", int(0))]);
    emit(body, "push", &[("val", int(1))]);
    emit(body, "sub_i32", &[]);
    emit(body, "set_local", &[("idx", int(0))]);
    emit(body, "jump", &[("to", Value::from(head))]);

    emit(exit, "get_local", &[("idx", int(0))]);
    emit(exit, "ret", &[]);

    let main = function(entry, 0, 1);
    let mut vm = VirtualMachine::new();
    assert_eq!(vm.call_fun(main, &[]).unwrap(), int(0));
}

/// Builds the recursive factorial function.
fn fact_function() -> Object {
    let entry = block_shell();
    let base = block_shell();
    let rec = block_shell();
    let cont = block_shell();
    let fact = function(entry, 1, 1);

    emit(entry, "get_local", &[("idx", int(0))]);
    emit(entry, "push", &[("val", int(1))]);
    emit(entry, "le_i32", &[]);
    emit(
        entry,
        "if_true",
        &[("then", Value::from(base)), ("else", Value::from(rec))],
    );

    emit(base, "push", &[("val", int(1))]);
    emit(base, "ret", &[]);

    // n * fact(n - 1): n stays on the stack across the recursive call.
    emit(rec, "get_local", &[("idx", int(0))]);
    emit(rec, "get_local", &[("idx", int(0))]);
    emit(rec, "push", &[("val", int(1))]);
    emit(rec, "sub_i32", &[]);
    emit(rec, "push", &[("val", Value::from(fact))]);
    emit(
        rec,
        "call",
        &[("num_args", int(1)), ("ret_to", Value::from(cont))],
    );

    emit(cont, "mul_i32", &[]);
    emit(cont, "ret", &[]);

    fact
}

#[test]
fn test_recursive_factorial() {
    let fact = fact_function();
    let mut vm = VirtualMachine::new();
    assert_eq!(vm.call_fun(fact, &[int(7)]).unwrap(), int(5040));
    assert_eq!(vm.stack_size(), 0);
}

/// Iterative Fibonacci. Local 0 is the loop counter (the parameter);
/// locals 1 and 2 are the accumulator pair.
fn fib_function() -> Object {
    let entry = block_shell();
    let head = block_shell();
    let body = block_shell();
    let exit = block_shell();

    emit(entry, "push", &[("val", int(0))]);
    emit(entry, "set_local", &[("idx", int(1))]);
    emit(entry, "push", &[("val", int(1))]);
    emit(entry, "set_local", &[("idx", int(2))]);
    emit(entry, "jump", &[("to", Value::from(head))]);

    emit(head, "get_local", &[("idx", int(0))]);
    emit(head, "push", &[("val", int(0))]);
    emit(head, "gt_i32", &[]);
    emit(
        head,
        "if_true",
        &[("then", Value::from(body)), ("else", Value::from(exit))],
    );

    // (a, b) <- (b, a + b); counter <- counter - 1
    emit(body, "get_local", &[("idx", int(2))]);
    emit(body, "get_local", &[("idx", int(1))]);
    emit(body, "get_local", &[("idx", int(2))]);
    emit(body, "add_i32", &[]);
    emit(body, "set_local", &[("idx", int(2))]);
    emit(body, "set_local", &[("idx", int(1))]);
    emit(body, "get_local", &[("idx", int(0))]);
    emit(body, "push", &[("val", int(1))]);
    emit(body, "sub_i32", &[]);
    emit(body, "set_local", &[("idx", int(0))]);
    emit(body, "jump", &[("to", Value::from(head))]);

    emit(exit, "get_local", &[("idx", int(1))]);
    emit(exit, "ret", &[]);

    function(entry, 1, 3)
}

#[test]
fn test_iterative_fibonacci() {
    let fib = fib_function();
    let mut vm = VirtualMachine::new();
    assert_eq!(vm.call_fun(fib, &[int(14)]).unwrap(), int(377));
    // The fourteenth and a few neighbors, against the closed sequence.
    assert_eq!(vm.call_fun(fib, &[int(0)]).unwrap(), int(0));
    assert_eq!(vm.call_fun(fib, &[int(1)]).unwrap(), int(1));
    assert_eq!(vm.call_fun(fib, &[int(10)]).unwrap(), int(55));
}

#[test]
fn test_object_construction() {
    // main constructs {x: 7, y: 3} and returns x + y.
    let entry = block_shell();
    emit(entry, "push", &[("val", int(2))]);
    emit(entry, "new_object", &[]);
    emit(entry, "set_local", &[("idx", int(0))]);

    emit(entry, "get_local", &[("idx", int(0))]);
    emit(entry, "push", &[("val", string("x"))]);
    emit(entry, "push", &[("val", int(7))]);
    emit(entry, "set_field", &[]);

    emit(entry, "get_local", &[("idx", int(0))]);
    emit(entry, "push", &[("val", string("y"))]);
    emit(entry, "push", &[("val", int(3))]);
    emit(entry, "set_field", &[]);

    emit(entry, "get_local", &[("idx", int(0))]);
    emit(entry, "push", &[("val", string("x"))]);
    emit(entry, "get_field", &[]);
    emit(entry, "get_local", &[("idx", int(0))]);
    emit(entry, "push", &[("val", string("y"))]);
    emit(entry, "get_field", &[]);
    emit(entry, "add_i32", &[]);
    emit(entry, "ret", &[]);

    let main = function(entry, 0, 1);
    let mut vm = VirtualMachine::new();
    assert_eq!(vm.call_fun(main, &[]).unwrap(), int(10));
}

#[test]
fn test_array_operations() {
    // Build [5, 6], overwrite the first element, return arr[0] + arr[1].
    let entry = block_shell();
    emit(entry, "push", &[("val", int(2))]);
    emit(entry, "new_array", &[]);
    emit(entry, "set_local", &[("idx", int(0))]);

    for v in [5, 6] {
        emit(entry, "get_local", &[("idx", int(0))]);
        emit(entry, "push", &[("val", int(v))]);
        emit(entry, "array_push", &[]);
    }

    emit(entry, "get_local", &[("idx", int(0))]);
    emit(entry, "push", &[("val", int(0))]);
    emit(entry, "push", &[("val", int(30))]);
    emit(entry, "set_elem", &[]);

    emit(entry, "get_local", &[("idx", int(0))]);
    emit(entry, "push", &[("val", int(0))]);
    emit(entry, "get_elem", &[]);
    emit(entry, "get_local", &[("idx", int(0))]);
    emit(entry, "push", &[("val", int(1))]);
    emit(entry, "get_elem", &[]);
    emit(entry, "add_i32", &[]);
    emit(entry, "ret", &[]);

    let main = function(entry, 0, 1);
    let mut vm = VirtualMachine::new();
    assert_eq!(vm.call_fun(main, &[]).unwrap(), int(36));
}

#[test]
fn test_string_operations() {
    // str_cat("foo", "bar"), then length and a character code.
    let entry = block_shell();
    emit(entry, "push", &[("val", string("foo"))]);
    emit(entry, "push", &[("val", string("bar"))]);
    emit(entry, "str_cat", &[]);
    emit(entry, "set_local", &[("idx", int(0))]);

    emit(entry, "get_local", &[("idx", int(0))]);
    emit(entry, "str_len", &[]);
    emit(entry, "get_local", &[("idx", int(0))]);
    emit(entry, "push", &[("val", int(3))]);
    emit(entry, "get_char_code", &[]);
    emit(entry, "add_i32", &[]);
    emit(entry, "ret", &[]);

    let main = function(entry, 0, 1);
    let mut vm = VirtualMachine::new();
    // 6 + 'b' (98)
    assert_eq!(vm.call_fun(main, &[]).unwrap(), int(104));
}

#[test]
fn test_has_tag_and_eq_bool() {
    let entry = block_shell();
    emit(entry, "push", &[("val", int(1))]);
    emit(entry, "has_tag", &[("tag", string("int32"))]);
    emit(entry, "push", &[("val", Value::TRUE)]);
    emit(entry, "eq_bool", &[]);
    emit(entry, "ret", &[]);
    let main = function(entry, 0, 0);
    let mut vm = VirtualMachine::new();
    assert_eq!(vm.call_fun(main, &[]).unwrap(), Value::TRUE);
}

#[test]
fn test_conversion_roundtrip_small_ints() {
    // i32 -> f32 -> i32 is the identity on small integers.
    let entry = block_shell();
    emit(entry, "get_local", &[("idx", int(0))]);
    emit(entry, "i32_to_f32", &[]);
    emit(entry, "f32_to_i32", &[]);
    emit(entry, "ret", &[]);
    let roundtrip = function(entry, 1, 1);

    let mut vm = VirtualMachine::new();
    for v in [-1000, -1, 0, 1, 7, 255, 4096, 1 << 20] {
        assert_eq!(vm.call_fun(roundtrip, &[int(v)]).unwrap(), int(v));
    }
}

#[test]
fn test_float_string_conversions() {
    let entry = block_shell();
    emit(entry, "get_local", &[("idx", int(0))]);
    emit(entry, "f32_to_str", &[]);
    emit(entry, "str_to_f32", &[]);
    emit(entry, "ret", &[]);
    let roundtrip = function(entry, 1, 1);

    let mut vm = VirtualMachine::new();
    // Values exactly representable at six decimals survive the round trip.
    for v in [0.0f32, 1.5, -2.25, 10.5] {
        assert_eq!(
            vm.call_fun(roundtrip, &[float(v)]).unwrap(),
            float(v),
            "round trip through decimal rendering for {}",
            v
        );
    }
}

#[test]
fn test_get_char_interning() {
    // get_char yields reference-identical values for equal bytes.
    let entry = block_shell();
    emit(entry, "push", &[("val", string("hello"))]);
    emit(entry, "get_local", &[("idx", int(0))]);
    emit(entry, "get_char", &[]);
    emit(entry, "ret", &[]);
    let char_at = function(entry, 1, 1);

    let mut vm = VirtualMachine::new();
    let a = vm.call_fun(char_at, &[int(2)]).unwrap();
    let b = vm.call_fun(char_at, &[int(3)]).unwrap();
    assert_eq!(a.to_string(), "l");
    assert_eq!(b.to_string(), "l");
    // Same byte => the identical interned handle, not merely equal bytes.
    assert_eq!(a.word(), b.word());

    // get_char agrees with get_char_code.
    let entry2 = block_shell();
    emit(entry2, "push", &[("val", string("hello"))]);
    emit(entry2, "get_local", &[("idx", int(0))]);
    emit(entry2, "get_char_code", &[]);
    emit(entry2, "ret", &[]);
    let code_at = function(entry2, 1, 1);
    let code = vm.call_fun(code_at, &[int(2)]).unwrap();
    assert_eq!(code, int('l' as i32));
}

#[test]
fn test_dup_swap_pop() {
    // dup copies sp[idx]; swap exchanges the two topmost operands.
    let entry = block_shell();
    emit(entry, "push", &[("val", int(1))]);
    emit(entry, "push", &[("val", int(2))]);
    emit(entry, "dup", &[("idx", int(1))]); // stack: 1 2 1
    emit(entry, "swap", &[]); // stack: 1 1 2
    emit(entry, "sub_i32", &[]); // stack: 1 -1
    emit(entry, "swap", &[]); // stack: -1 1
    emit(entry, "pop", &[]); // stack: -1
    emit(entry, "ret", &[]);
    let main = function(entry, 0, 0);
    let mut vm = VirtualMachine::new();
    assert_eq!(vm.call_fun(main, &[]).unwrap(), int(-1));
}

#[test]
fn test_import_core_package() {
    let entry = block_shell();
    emit(entry, "push", &[("val", string("core"))]);
    emit(entry, "import", &[]);
    emit(entry, "ret", &[]);
    let main = function(entry, 0, 0);

    let mut vm = VirtualMachine::new();
    let pkg = vm.call_fun(main, &[]).unwrap();
    let pkg = pkg.as_object().expect("import pushes a package object");
    assert!(pkg.get_field("print").unwrap().is_hostfn());
}

#[test]
fn test_import_registered_package() {
    let entry = block_shell();
    emit(entry, "push", &[("val", string("math_consts"))]);
    emit(entry, "import", &[]);
    emit(entry, "push", &[("val", string("zero"))]);
    emit(entry, "get_field", &[]);
    emit(entry, "ret", &[]);
    let main = function(entry, 0, 0);

    let pkg = Object::with_capacity(1);
    pkg.set_field("zero", int(0));
    let mut imports = HostImports::new();
    imports.register("math_consts", pkg);

    let mut vm = VirtualMachine::new();
    vm.set_importer(Box::new(imports));
    assert_eq!(vm.call_fun(main, &[]).unwrap(), int(0));
}

#[test]
fn test_host_function_call() {
    fn double(_ctx: &mut dyn HostCtx, v: Value) -> Value {
        Value::int32(v.as_int32().unwrap() * 2)
    }
    let host = HostFn::leak("double", HostCall::Arity1(double));

    let entry = block_shell();
    let cont = block_shell();
    emit(entry, "push", &[("val", int(21))]);
    emit(entry, "push", &[("val", Value::from(host))]);
    emit(
        entry,
        "call",
        &[("num_args", int(1)), ("ret_to", Value::from(cont))],
    );
    emit(cont, "ret", &[]);
    let main = function(entry, 0, 0);

    let mut vm = VirtualMachine::new();
    assert_eq!(vm.call_fun(main, &[]).unwrap(), int(42));
}

#[test]
fn test_host_reentrancy() {
    // A host function that re-enters the VM to run the function object it
    // was handed: the nested session shares the stack and code heap.
    fn apply(ctx: &mut dyn HostCtx, f: Value) -> Value {
        let fun = f.as_object().expect("function object argument");
        ctx.call_fun(fun, &[]).expect("nested call succeeds")
    }
    let host = HostFn::leak("apply", HostCall::Arity1(apply));

    let inner = const_function(int(99));
    let entry = block_shell();
    let cont = block_shell();
    emit(entry, "push", &[("val", Value::from(inner))]);
    emit(entry, "push", &[("val", Value::from(host))]);
    emit(
        entry,
        "call",
        &[("num_args", int(1)), ("ret_to", Value::from(cont))],
    );
    emit(cont, "push", &[("val", int(1))]);
    emit(cont, "add_i32", &[]);
    emit(cont, "ret", &[]);
    let main = function(entry, 0, 0);

    let mut vm = VirtualMachine::new();
    assert_eq!(vm.call_fun(main, &[]).unwrap(), int(100));
    assert_eq!(vm.stack_size(), 0);
}

#[test]
fn test_call_export_fn() {
    let pkg = Object::with_capacity(1);
    pkg.set_field("main", Value::from(const_function(int(7))));
    let mut vm = VirtualMachine::new();
    assert_eq!(vm.call_export_fn(pkg, "main", &[]).unwrap(), int(7));
}

#[test]
fn test_eq_obj_identity() {
    // The same object twice compares equal; a fresh object does not.
    let entry = block_shell();
    emit(entry, "push", &[("val", int(0))]);
    emit(entry, "new_object", &[]);
    emit(entry, "set_local", &[("idx", int(0))]);
    emit(entry, "get_local", &[("idx", int(0))]);
    emit(entry, "get_local", &[("idx", int(0))]);
    emit(entry, "eq_obj", &[]);
    emit(entry, "ret", &[]);
    let main = function(entry, 0, 1);
    let mut vm = VirtualMachine::new();
    assert_eq!(vm.call_fun(main, &[]).unwrap(), Value::TRUE);
}
