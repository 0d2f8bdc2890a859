//! Value representation and object model for the opal virtual machine.
//!
//! This crate provides the uniform tagged [`Value`] cell the interpreter
//! operates on, together with the heap records it references:
//!
//! - **[`Object`]**: named-field records with slot-index hints for inline
//!   caching
//! - **[`Array`]**: growable indexed sequences of values
//! - **[`Str`]**: immutable byte strings
//! - **[`HostFn`]**: host callables of arity 0 through 3
//!
//! # Lifetime model
//!
//! The execution core requires references that stay valid for the whole
//! program run (garbage collection is out of scope). Heap records are
//! therefore allocated once and never reclaimed: handles are `Copy` raw
//! pointers that remain durable for the process lifetime, which also lets a
//! `Value` be embedded directly in a compiled code stream.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod array;
pub mod error;
pub mod hostfn;
pub mod intern;
pub mod object;
pub mod pos;
pub mod string;
pub mod value;

pub use array::Array;
pub use error::{ErrorKind, RunError, RunResult};
pub use hostfn::{HostCtx, HostFn};
pub use intern::{intern, InternedStr};
pub use object::{is_valid_ident, Object};
pub use pos::pos_to_string;
pub use string::Str;
pub use value::{Tag, Value};
