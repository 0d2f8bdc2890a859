//! Object and array opcode handlers.

use opal_core::{is_valid_ident, Array, ErrorKind, Object, RunError, RunResult, Value};

use crate::vm::VirtualMachine;

// =============================================================================
// Object operations
// =============================================================================

#[inline(always)]
pub(crate) fn new_object(vm: &mut VirtualMachine) -> RunResult<()> {
    let capacity = vm.pop_i32()?;
    let obj = Object::with_capacity(capacity.max(0) as usize);
    vm.push_val(Value::from(obj))
}

#[inline(always)]
pub(crate) fn has_field(vm: &mut VirtualMachine) -> RunResult<()> {
    let name = vm.pop_str()?;
    let obj = vm.pop_obj()?;
    vm.push_bool(obj.has_field(&name.to_utf8_lossy()))
}

#[inline(always)]
pub(crate) fn set_field(vm: &mut VirtualMachine) -> RunResult<()> {
    let val = vm.pop_val();
    let name = vm.pop_str()?;
    let obj = vm.pop_obj()?;
    if !is_valid_ident(name.as_bytes()) {
        return Err(RunError::new(
            ErrorKind::InvalidFieldName,
            format!("invalid identifier in set_field \"{}\"", name.to_utf8_lossy()),
        ));
    }
    obj.set_field(&name.to_utf8_lossy(), val);
    Ok(())
}

/// Reads a field that the program has already tested for; a missing field
/// here is the program's error.
#[inline(always)]
pub(crate) fn get_field(vm: &mut VirtualMachine) -> RunResult<()> {
    let name = vm.pop_str()?;
    let obj = vm.pop_obj()?;
    match obj.get_field(&name.to_utf8_lossy()) {
        Some(val) => vm.push_val(val),
        None => Err(RunError::new(
            ErrorKind::MissingField,
            format!("get_field failed, missing field \"{}\"", name.to_utf8_lossy()),
        )),
    }
}

#[inline(always)]
pub(crate) fn eq_obj(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_val();
    let arg0 = vm.pop_val();
    vm.push_bool(arg0 == arg1)
}

// =============================================================================
// Array operations
// =============================================================================

#[inline(always)]
pub(crate) fn new_array(vm: &mut VirtualMachine) -> RunResult<()> {
    let len = vm.pop_i32()?;
    let arr = Array::with_capacity(len.max(0) as usize);
    vm.push_val(Value::from(arr))
}

#[inline(always)]
pub(crate) fn array_len(vm: &mut VirtualMachine) -> RunResult<()> {
    let arr = vm.pop_arr()?;
    vm.push_val(Value::int32(arr.len() as i32))
}

#[inline(always)]
pub(crate) fn array_push(vm: &mut VirtualMachine) -> RunResult<()> {
    let val = vm.pop_val();
    let arr = vm.pop_arr()?;
    arr.push(val);
    Ok(())
}

#[inline(always)]
pub(crate) fn set_elem(vm: &mut VirtualMachine) -> RunResult<()> {
    let val = vm.pop_val();
    let idx = vm.pop_i32()? as usize;
    let arr = vm.pop_arr()?;
    if !arr.set(idx, val) {
        return Err(RunError::new(
            ErrorKind::IndexOutOfBounds,
            "set_elem, index out of bounds",
        ));
    }
    Ok(())
}

#[inline(always)]
pub(crate) fn get_elem(vm: &mut VirtualMachine) -> RunResult<()> {
    let idx = vm.pop_i32()? as usize;
    let arr = vm.pop_arr()?;
    match arr.get(idx) {
        Some(val) => vm.push_val(val),
        None => Err(RunError::new(
            ErrorKind::IndexOutOfBounds,
            "get_elem, index out of bounds",
        )),
    }
}
