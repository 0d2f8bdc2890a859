//! Objects: named-field records with slot-index hints.
//!
//! An [`Object`] maps short identifier field names to values. Fields live in
//! an ordered slot vector; lookups can be primed with a remembered slot
//! index, which is the mechanism the compiler's inline caches build on.
//! Field names are interned, so the hint probe is a pointer comparison.

use std::fmt;
use std::ptr::NonNull;

use crate::intern::{intern, InternedStr};
use crate::value::Value;

/// Check field-name validity: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_ident(name: &[u8]) -> bool {
    let Some(&first) = name.first() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return false;
    }
    name[1..].iter().all(|&b| b.is_ascii_alphanumeric() || b == b'_')
}

struct Slot {
    name: InternedStr,
    val: Value,
}

struct ObjData {
    slots: Vec<Slot>,
}

/// A durable, copyable object handle.
///
/// Identity (pointer) equality is the program-visible `eq_obj` relation.
#[derive(Clone, Copy)]
pub struct Object {
    data: NonNull<ObjData>,
}

impl Object {
    /// Allocate an object with room for `capacity` fields.
    pub fn with_capacity(capacity: usize) -> Object {
        let data = Box::leak(Box::new(ObjData {
            slots: Vec::with_capacity(capacity),
        }));
        Object {
            data: NonNull::from(data),
        }
    }

    /// Number of fields currently present.
    #[inline]
    pub fn field_count(self) -> usize {
        self.slots().len()
    }

    /// Test whether a field exists.
    pub fn has_field(self, name: &str) -> bool {
        self.slots().iter().any(|s| s.name.as_str() == name)
    }

    /// Read a field by name.
    pub fn get_field(self, name: &str) -> Option<Value> {
        self.slots()
            .iter()
            .find(|s| s.name.as_str() == name)
            .map(|s| s.val)
    }

    /// Read a field by interned name with a slot-index hint.
    ///
    /// The hint slot is probed first with a pointer comparison; on mismatch
    /// the slots are scanned by name. Returns the value together with the
    /// slot index it was found at, so the caller can remember it.
    #[inline]
    pub fn get_field_hinted(self, name: InternedStr, hint: usize) -> Option<(Value, usize)> {
        let slots = self.slots();
        if let Some(slot) = slots.get(hint) {
            if slot.name == name {
                return Some((slot.val, hint));
            }
        }
        slots
            .iter()
            .position(|s| s.name == name)
            .map(|idx| (slots[idx].val, idx))
    }

    /// Write a field, creating it if absent.
    ///
    /// Name validity is the caller's concern (`set_field` instructions check
    /// [`is_valid_ident`] before reaching here).
    pub fn set_field(self, name: &str, val: Value) {
        let interned = intern(name);
        let slots = self.slots_mut();
        match slots.iter_mut().find(|s| s.name == interned) {
            Some(slot) => slot.val = val,
            None => slots.push(Slot {
                name: interned,
                val,
            }),
        }
    }

    /// Iterate `(name, value)` pairs in slot order.
    pub fn fields(self) -> impl Iterator<Item = (InternedStr, Value)> {
        self.slots().iter().map(|s| (s.name, s.val))
    }

    /// Reference identity.
    #[inline(always)]
    pub fn ptr_eq(a: Object, b: Object) -> bool {
        a.data == b.data
    }

    /// Reconstruct a handle from a value payload word.
    ///
    /// # Safety
    /// `word` must have been produced by [`Object::to_word`] on a live
    /// handle.
    #[inline(always)]
    pub unsafe fn from_word(word: u64) -> Object {
        Object {
            // SAFETY: caller guarantees the word is a valid ObjData pointer.
            data: unsafe { NonNull::new_unchecked(word as usize as *mut ObjData) },
        }
    }

    /// The handle as a value payload word.
    #[inline(always)]
    pub fn to_word(self) -> u64 {
        self.data.as_ptr() as usize as u64
    }

    #[inline(always)]
    fn slots(self) -> &'static [Slot] {
        // SAFETY: ObjData is leaked and never freed; the VM is
        // single-threaded, and no reference outlives the method call that
        // hands it out.
        &unsafe { &*self.data.as_ptr() }.slots
    }

    #[allow(clippy::mut_from_ref)]
    #[inline(always)]
    fn slots_mut(self) -> &'static mut Vec<Slot> {
        // SAFETY: as in `slots`; mutation is confined to the current method
        // and never overlaps another live reference.
        &mut unsafe { &mut *self.data.as_ptr() }.slots
    }
}

impl PartialEq for Object {
    #[inline]
    fn eq(&self, other: &Object) -> bool {
        Object::ptr_eq(*self, *other)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, val) in self.fields() {
            map.entry(&name.as_str(), &val);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get() {
        let obj = Object::with_capacity(2);
        assert!(!obj.has_field("x"));
        obj.set_field("x", Value::int32(7));
        obj.set_field("y", Value::int32(3));
        assert_eq!(obj.get_field("x"), Some(Value::int32(7)));
        assert_eq!(obj.get_field("y"), Some(Value::int32(3)));
        assert_eq!(obj.get_field("z"), None);
        assert_eq!(obj.field_count(), 2);
    }

    #[test]
    fn test_overwrite_keeps_slot() {
        let obj = Object::with_capacity(1);
        obj.set_field("x", Value::int32(1));
        obj.set_field("x", Value::int32(2));
        assert_eq!(obj.field_count(), 1);
        assert_eq!(obj.get_field("x"), Some(Value::int32(2)));
    }

    #[test]
    fn test_hinted_lookup() {
        let obj = Object::with_capacity(3);
        obj.set_field("a", Value::int32(0));
        obj.set_field("b", Value::int32(1));
        obj.set_field("c", Value::int32(2));

        let name = intern("c");
        // Wrong hint falls back to a scan and reports the true slot.
        let (val, slot) = obj.get_field_hinted(name, 0).unwrap();
        assert_eq!(val, Value::int32(2));
        assert_eq!(slot, 2);
        // Right hint hits directly.
        let (val, slot) = obj.get_field_hinted(name, 2).unwrap();
        assert_eq!(val, Value::int32(2));
        assert_eq!(slot, 2);
        // Out-of-range hint is tolerated.
        let (val, _) = obj.get_field_hinted(name, 99).unwrap();
        assert_eq!(val, Value::int32(2));
    }

    #[test]
    fn test_hinted_lookup_missing() {
        let obj = Object::with_capacity(0);
        assert!(obj.get_field_hinted(intern("nope"), 0).is_none());
    }

    #[test]
    fn test_valid_ident() {
        assert!(is_valid_ident(b"x"));
        assert!(is_valid_ident(b"_foo9"));
        assert!(is_valid_ident(b"numLocals"));
        assert!(!is_valid_ident(b""));
        assert!(!is_valid_ident(b"9x"));
        assert!(!is_valid_ident(b"a-b"));
        assert!(!is_valid_ident(b"a b"));
    }
}
