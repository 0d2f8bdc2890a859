//! Shared helpers for building program graphs in tests.
//!
//! Programs are graphs of plain objects: functions (`entry`, `num_params`,
//! `num_locals`), blocks (`instrs`), and instructions (`op` + operands).
//! Blocks are created as empty shells first so cyclic control flow (loops,
//! mutually referencing branches) can be wired up before filling them.

#![allow(dead_code)]

use opal_core::{Array, Object, Str, Value};

/// A string value.
pub fn string(s: &str) -> Value {
    Value::from(Str::new(s))
}

/// An int32 value.
pub fn int(v: i32) -> Value {
    Value::int32(v)
}

/// A float32 value.
pub fn float(v: f32) -> Value {
    Value::float32(v)
}

/// Create an empty basic-block object.
pub fn block_shell() -> Object {
    let blk = Object::with_capacity(1);
    blk.set_field("instrs", Value::from(Array::with_capacity(8)));
    blk
}

/// Append an instruction object to a block.
pub fn emit(blk: Object, op: &str, fields: &[(&str, Value)]) {
    let instrs = blk
        .get_field("instrs")
        .and_then(|v| v.as_array())
        .expect("block shell has instrs");
    let instr = Object::with_capacity(fields.len() + 1);
    instr.set_field("op", string(op));
    for (name, val) in fields {
        instr.set_field(name, *val);
    }
    instrs.push(Value::from(instr));
}

/// Create a function object.
pub fn function(entry: Object, num_params: i32, num_locals: i32) -> Object {
    let fun = Object::with_capacity(3);
    fun.set_field("entry", Value::from(entry));
    fun.set_field("num_params", int(num_params));
    fun.set_field("num_locals", int(num_locals));
    fun
}

/// A function whose single block just returns its compiled constant.
pub fn const_function(val: Value) -> Object {
    let entry = block_shell();
    emit(entry, "push", &[("val", val)]);
    emit(entry, "ret", &[]);
    function(entry, 0, 0)
}

/// A `src_pos` annotation object.
pub fn src_pos(name: &str, line: i32, col: i32) -> Value {
    let pos = Object::with_capacity(3);
    pos.set_field("line_no", int(line));
    pos.set_field("col_no", int(col));
    pos.set_field("src_name", string(name));
    Value::from(pos)
}
