//! String opcode handlers.

use opal_core::{ErrorKind, RunError, RunResult, Str, Value};

use crate::vm::VirtualMachine;

#[inline(always)]
pub(crate) fn str_len(vm: &mut VirtualMachine) -> RunResult<()> {
    let s = vm.pop_str()?;
    vm.push_val(Value::int32(s.len() as i32))
}

/// Pops an index and a string, pushes the one-byte string at that index.
///
/// Repeated reads of equal bytes yield the identical interned value, via
/// the VM's 256-entry character cache.
#[inline(always)]
pub(crate) fn get_char(vm: &mut VirtualMachine) -> RunResult<()> {
    let idx = vm.pop_i32()? as usize;
    let s = vm.pop_str()?;
    if idx >= s.len() {
        return Err(RunError::new(
            ErrorKind::IndexOutOfBounds,
            "get_char, index out of bounds",
        ));
    }
    let ch = vm.char_string(s.byte_at(idx));
    vm.push_val(ch)
}

#[inline(always)]
pub(crate) fn get_char_code(vm: &mut VirtualMachine) -> RunResult<()> {
    let idx = vm.pop_i32()? as usize;
    let s = vm.pop_str()?;
    if idx >= s.len() {
        return Err(RunError::new(
            ErrorKind::IndexOutOfBounds,
            "get_char_code, index out of bounds",
        ));
    }
    vm.push_val(Value::int32(s.byte_at(idx) as i32))
}

#[inline(always)]
pub(crate) fn str_cat(vm: &mut VirtualMachine) -> RunResult<()> {
    let tail = vm.pop_str()?;
    let head = vm.pop_str()?;
    vm.push_val(Value::from(Str::concat(head, tail)))
}

#[inline(always)]
pub(crate) fn eq_str(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_str()?;
    let arg0 = vm.pop_str()?;
    vm.push_bool(arg0 == arg1)
}
