//! Exception throwing and frame unwinding.
//!
//! A `throw` unwinds frames until it finds a call site compiled with a
//! `throw_to` edge, restores that caller's context, and continues in the
//! catch block with the exception value pushed. Without a handler it
//! surfaces as an `UncaughtException` error.

mod common;

use common::*;
use opal_core::{ErrorKind, Object, Value};
use opal_vm::VirtualMachine;

/// A function whose body throws the given value immediately.
fn throwing_function(exc: Value) -> Object {
    let entry = block_shell();
    emit(entry, "push", &[("val", exc)]);
    emit(entry, "throw", &[]);
    function(entry, 0, 0)
}

#[test]
fn test_throw_to_catch_block() {
    let thrower = throwing_function(int(42));

    let entry = block_shell();
    let cont = block_shell();
    let catch = block_shell();
    emit(entry, "push", &[("val", Value::from(thrower))]);
    emit(
        entry,
        "call",
        &[
            ("num_args", int(0)),
            ("ret_to", Value::from(cont)),
            ("throw_to", Value::from(catch)),
        ],
    );
    // Normal continuation: distinguishable from the catch path.
    emit(cont, "pop", &[]);
    emit(cont, "push", &[("val", int(-1))]);
    emit(cont, "ret", &[]);
    // Catch block: the exception value is on top of the stack.
    emit(catch, "ret", &[]);
    let main = function(entry, 0, 0);

    let mut vm = VirtualMachine::new();
    assert_eq!(vm.call_fun(main, &[]).unwrap(), int(42));
    assert_eq!(vm.stack_size(), 0);
}

#[test]
fn test_throw_unwinds_through_intermediate_frame() {
    let thrower = throwing_function(string("boom"));

    // middle() calls the thrower with no handler of its own.
    let mid_entry = block_shell();
    let mid_cont = block_shell();
    emit(mid_entry, "push", &[("val", Value::from(thrower))]);
    emit(
        mid_entry,
        "call",
        &[("num_args", int(0)), ("ret_to", Value::from(mid_cont))],
    );
    emit(mid_cont, "ret", &[]);
    let middle = function(mid_entry, 0, 0);

    // main() calls middle() under a handler two frames above the throw.
    let entry = block_shell();
    let cont = block_shell();
    let catch = block_shell();
    emit(entry, "push", &[("val", Value::from(middle))]);
    emit(
        entry,
        "call",
        &[
            ("num_args", int(0)),
            ("ret_to", Value::from(cont)),
            ("throw_to", Value::from(catch)),
        ],
    );
    emit(cont, "ret", &[]);
    emit(catch, "ret", &[]);
    let main = function(entry, 0, 0);

    let mut vm = VirtualMachine::new();
    let ret = vm.call_fun(main, &[]).unwrap();
    assert_eq!(ret, string("boom"));
    assert_eq!(vm.stack_size(), 0);
}

#[test]
fn test_uncaught_throw() {
    let thrower = throwing_function(int(13));
    let mut vm = VirtualMachine::new();
    let err = vm.call_fun(thrower, &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UncaughtException);
    assert!(err.message().contains("13"));
}

#[test]
fn test_catch_frame_has_locals() {
    // The handler frame's locals survive the unwind: main stores a marker
    // in a local before calling, and the catch block combines it with the
    // exception value.
    let thrower = throwing_function(int(40));

    let entry = block_shell();
    let cont = block_shell();
    let catch = block_shell();
    emit(entry, "push", &[("val", int(2))]);
    emit(entry, "set_local", &[("idx", int(0))]);
    emit(entry, "push", &[("val", Value::from(thrower))]);
    emit(
        entry,
        "call",
        &[
            ("num_args", int(0)),
            ("ret_to", Value::from(cont)),
            ("throw_to", Value::from(catch)),
        ],
    );
    emit(cont, "ret", &[]);
    emit(catch, "get_local", &[("idx", int(0))]);
    emit(catch, "add_i32", &[]);
    emit(catch, "ret", &[]);
    let main = function(entry, 0, 1);

    let mut vm = VirtualMachine::new();
    assert_eq!(vm.call_fun(main, &[]).unwrap(), int(42));
}

#[test]
fn test_throw_with_src_pos() {
    let entry = block_shell();
    emit(entry, "push", &[("val", int(0))]);
    let instrs = entry
        .get_field("instrs")
        .and_then(|v| v.as_array())
        .unwrap();
    // Attach a position to the throw instruction itself.
    let throw_instr = Object::with_capacity(2);
    throw_instr.set_field("op", string("throw"));
    throw_instr.set_field("src_pos", src_pos("prog.opi", 7, 1));
    instrs.push(Value::from(throw_instr));
    let main = function(entry, 0, 0);

    let mut vm = VirtualMachine::new();
    let err = vm.call_fun(main, &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UncaughtException);
    assert_eq!(err.src_pos(), Some("prog.opi@7:1"));
}
