//! Inline caches for named-field access.
//!
//! Most field reads during block compilation hit the same field on many
//! different instruction objects with identical layouts. A [`FieldCache`]
//! remembers, per access site, the slot index the field was last found at on
//! *some* object, probes that slot first, and falls back to a name-keyed
//! scan on miss, updating the remembered slot. Correctness never depends on
//! the hint being right.
//!
//! Each compile-time named-field access is a distinct site: the compiler
//! owns one cache per lexical lookup, not one per field name globally.

use opal_core::{intern, Array, ErrorKind, InternedStr, Object, RunError, RunResult, Str, Value};

/// A one-slot field-lookup cache for a single access site.
#[derive(Debug)]
pub struct FieldCache {
    /// Field name, interned once at site construction.
    name: InternedStr,
    /// Most recent slot index the field was found at.
    slot: usize,
}

impl FieldCache {
    /// Create a cache site for `name`.
    pub fn new(name: &str) -> FieldCache {
        FieldCache {
            name: intern(name),
            slot: 0,
        }
    }

    /// Look up the field on `obj`.
    #[inline]
    pub fn get(&mut self, obj: Object) -> RunResult<Value> {
        match obj.get_field_hinted(self.name, self.slot) {
            Some((val, slot)) => {
                self.slot = slot;
                Ok(val)
            }
            None => Err(RunError::new(
                ErrorKind::MissingField,
                format!("missing field \"{}\"", self.name),
            )),
        }
    }

    /// Look up an int32 field.
    #[inline]
    pub fn get_i32(&mut self, obj: Object) -> RunResult<i32> {
        let val = self.get(obj)?;
        val.as_int32()
            .ok_or_else(|| type_mismatch(self.name, "int32", val))
    }

    /// Look up a string field.
    #[inline]
    pub fn get_str(&mut self, obj: Object) -> RunResult<Str> {
        let val = self.get(obj)?;
        val.as_str()
            .ok_or_else(|| type_mismatch(self.name, "string", val))
    }

    /// Look up an object field.
    #[inline]
    pub fn get_obj(&mut self, obj: Object) -> RunResult<Object> {
        let val = self.get(obj)?;
        val.as_object()
            .ok_or_else(|| type_mismatch(self.name, "object", val))
    }

    /// Look up an array field.
    #[inline]
    pub fn get_arr(&mut self, obj: Object) -> RunResult<Array> {
        let val = self.get(obj)?;
        val.as_array()
            .ok_or_else(|| type_mismatch(self.name, "array", val))
    }
}

fn type_mismatch(name: InternedStr, expected: &str, got: Value) -> RunError {
    RunError::new(
        ErrorKind::TypeMismatch,
        format!(
            "field \"{}\" holds {}, expected {}",
            name,
            got.tag().name(),
            expected
        ),
    )
}
