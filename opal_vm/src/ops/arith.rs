//! Integer, floating-point, conversion, and boolean opcode handlers.
//!
//! Binary handlers pop the right operand first (it is on top), then the
//! left. Integer arithmetic wraps on overflow.

use opal_core::{ErrorKind, RunError, RunResult, Str, Value};

use crate::vm::VirtualMachine;

// =============================================================================
// 32-bit integer operations
// =============================================================================

#[inline(always)]
pub(crate) fn add_i32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_i32()?;
    let arg0 = vm.pop_i32()?;
    vm.push_val(Value::int32(arg0.wrapping_add(arg1)))
}

#[inline(always)]
pub(crate) fn sub_i32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_i32()?;
    let arg0 = vm.pop_i32()?;
    vm.push_val(Value::int32(arg0.wrapping_sub(arg1)))
}

#[inline(always)]
pub(crate) fn mul_i32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_i32()?;
    let arg0 = vm.pop_i32()?;
    vm.push_val(Value::int32(arg0.wrapping_mul(arg1)))
}

#[inline(always)]
pub(crate) fn lt_i32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_i32()?;
    let arg0 = vm.pop_i32()?;
    vm.push_bool(arg0 < arg1)
}

#[inline(always)]
pub(crate) fn le_i32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_i32()?;
    let arg0 = vm.pop_i32()?;
    vm.push_bool(arg0 <= arg1)
}

#[inline(always)]
pub(crate) fn gt_i32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_i32()?;
    let arg0 = vm.pop_i32()?;
    vm.push_bool(arg0 > arg1)
}

#[inline(always)]
pub(crate) fn ge_i32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_i32()?;
    let arg0 = vm.pop_i32()?;
    vm.push_bool(arg0 >= arg1)
}

#[inline(always)]
pub(crate) fn eq_i32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_i32()?;
    let arg0 = vm.pop_i32()?;
    vm.push_bool(arg0 == arg1)
}

// =============================================================================
// Floating-point operations
// =============================================================================

#[inline(always)]
pub(crate) fn add_f32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_f32()?;
    let arg0 = vm.pop_f32()?;
    vm.push_val(Value::float32(arg0 + arg1))
}

#[inline(always)]
pub(crate) fn sub_f32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_f32()?;
    let arg0 = vm.pop_f32()?;
    vm.push_val(Value::float32(arg0 - arg1))
}

#[inline(always)]
pub(crate) fn mul_f32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_f32()?;
    let arg0 = vm.pop_f32()?;
    vm.push_val(Value::float32(arg0 * arg1))
}

#[inline(always)]
pub(crate) fn div_f32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_f32()?;
    let arg0 = vm.pop_f32()?;
    vm.push_val(Value::float32(arg0 / arg1))
}

#[inline(always)]
pub(crate) fn lt_f32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_f32()?;
    let arg0 = vm.pop_f32()?;
    vm.push_bool(arg0 < arg1)
}

#[inline(always)]
pub(crate) fn le_f32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_f32()?;
    let arg0 = vm.pop_f32()?;
    vm.push_bool(arg0 <= arg1)
}

#[inline(always)]
pub(crate) fn gt_f32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_f32()?;
    let arg0 = vm.pop_f32()?;
    vm.push_bool(arg0 > arg1)
}

#[inline(always)]
pub(crate) fn ge_f32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_f32()?;
    let arg0 = vm.pop_f32()?;
    vm.push_bool(arg0 >= arg1)
}

#[inline(always)]
pub(crate) fn eq_f32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_f32()?;
    let arg0 = vm.pop_f32()?;
    vm.push_bool(arg0 == arg1)
}

#[inline(always)]
pub(crate) fn sin_f32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg = vm.pop_f32()?;
    vm.push_val(Value::float32(arg.sin()))
}

#[inline(always)]
pub(crate) fn cos_f32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg = vm.pop_f32()?;
    vm.push_val(Value::float32(arg.cos()))
}

#[inline(always)]
pub(crate) fn sqrt_f32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg = vm.pop_f32()?;
    vm.push_val(Value::float32(arg.sqrt()))
}

// =============================================================================
// Conversion operations
// =============================================================================

#[inline(always)]
pub(crate) fn i32_to_f32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg = vm.pop_i32()?;
    vm.push_val(Value::float32(arg as f32))
}

#[inline(always)]
pub(crate) fn f32_to_i32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg = vm.pop_f32()?;
    vm.push_val(Value::int32(arg as i32))
}

/// Fixed six-decimal rendering, the same shape `Display` uses for float32
/// values.
#[inline(always)]
pub(crate) fn f32_to_str(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg = vm.pop_f32()?;
    vm.push_val(Value::from(Str::new(&format!("{:.6}", arg))))
}

#[inline(always)]
pub(crate) fn str_to_f32(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg = vm.pop_str()?;
    let text = arg.to_utf8_lossy();
    let parsed = text.trim().parse::<f32>().map_err(|_| {
        RunError::new(
            ErrorKind::TypeMismatch,
            format!("str_to_f32 cannot parse \"{}\"", text),
        )
    })?;
    vm.push_val(Value::float32(parsed))
}

// =============================================================================
// Boolean operations
// =============================================================================

#[inline(always)]
pub(crate) fn eq_bool(vm: &mut VirtualMachine) -> RunResult<()> {
    let arg1 = vm.pop_bool()?;
    let arg0 = vm.pop_bool()?;
    vm.push_bool(arg0 == arg1)
}
