//! Host function callables.
//!
//! A [`HostFn`] is an opaque callable the host exposes to programs through
//! import packages. Arities 0 through 3 are supported; the interpreter
//! dispatches on the call site's argument count.
//!
//! Every callable receives a [`HostCtx`] first: the executing VM behind a
//! trait object. Host functions may synchronously re-enter the VM through
//! it, which nests a frame on the same value stack and runs a nested
//! execution to completion before returning.

use std::fmt;

use crate::error::RunResult;
use crate::object::Object;
use crate::value::Value;

/// The executing VM, as seen by host functions.
pub trait HostCtx {
    /// Call a program function to completion on the current VM.
    fn call_fun(&mut self, fun: Object, args: &[Value]) -> RunResult<Value>;
}

/// The callable itself, one variant per supported arity.
#[derive(Clone, Copy)]
pub enum HostCall {
    Arity0(fn(&mut dyn HostCtx) -> Value),
    Arity1(fn(&mut dyn HostCtx, Value) -> Value),
    Arity2(fn(&mut dyn HostCtx, Value, Value) -> Value),
    Arity3(fn(&mut dyn HostCtx, Value, Value, Value) -> Value),
}

/// A named host callable.
pub struct HostFn {
    name: &'static str,
    call: HostCall,
}

impl HostFn {
    /// Allocate a host function with process lifetime.
    pub fn leak(name: &'static str, call: HostCall) -> &'static HostFn {
        Box::leak(Box::new(HostFn { name, call }))
    }

    /// Host-side name, for diagnostics.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of arguments this callable expects.
    #[inline]
    pub fn arity(&self) -> usize {
        match self.call {
            HostCall::Arity0(_) => 0,
            HostCall::Arity1(_) => 1,
            HostCall::Arity2(_) => 2,
            HostCall::Arity3(_) => 3,
        }
    }

    /// Invoke with exactly `arity()` arguments in source order.
    ///
    /// # Panics
    /// Panics if `args.len()` does not match the arity; the interpreter
    /// checks counts before dispatching.
    pub fn invoke(&self, ctx: &mut dyn HostCtx, args: &[Value]) -> Value {
        match (self.call, args) {
            (HostCall::Arity0(f), []) => f(ctx),
            (HostCall::Arity1(f), [a]) => f(ctx, *a),
            (HostCall::Arity2(f), [a, b]) => f(ctx, *a, *b),
            (HostCall::Arity3(f), [a, b, c]) => f(ctx, *a, *b, *c),
            _ => panic!(
                "host function {} called with {} args, arity {}",
                self.name,
                args.len(),
                self.arity()
            ),
        }
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFn({}/{})", self.name, self.arity())
    }
}
