//! Growable indexed value sequences.

use std::fmt;
use std::ptr::NonNull;

use crate::value::Value;

/// A durable, copyable array handle with O(1) length, push, and indexed
/// access. Identity (pointer) equality is the program-visible relation.
#[derive(Clone, Copy)]
pub struct Array {
    data: NonNull<ArrData>,
}

struct ArrData {
    elems: Vec<Value>,
}

impl Array {
    /// Allocate an array with room for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Array {
        let data = Box::leak(Box::new(ArrData {
            elems: Vec::with_capacity(capacity),
        }));
        Array {
            data: NonNull::from(data),
        }
    }

    /// Number of elements.
    #[inline(always)]
    pub fn len(self) -> usize {
        self.elems().len()
    }

    #[inline(always)]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// Append an element.
    #[inline]
    pub fn push(self, val: Value) {
        self.elems_mut().push(val);
    }

    /// Read an element; `None` when out of bounds.
    #[inline]
    pub fn get(self, idx: usize) -> Option<Value> {
        self.elems().get(idx).copied()
    }

    /// Write an element; `false` when out of bounds.
    #[inline]
    pub fn set(self, idx: usize, val: Value) -> bool {
        match self.elems_mut().get_mut(idx) {
            Some(slot) => {
                *slot = val;
                true
            }
            None => false,
        }
    }

    /// Reconstruct a handle from a value payload word.
    ///
    /// # Safety
    /// `word` must have been produced by [`Array::to_word`] on a live
    /// handle.
    #[inline(always)]
    pub unsafe fn from_word(word: u64) -> Array {
        Array {
            // SAFETY: caller guarantees the word is a valid ArrData pointer.
            data: unsafe { NonNull::new_unchecked(word as usize as *mut ArrData) },
        }
    }

    /// The handle as a value payload word.
    #[inline(always)]
    pub fn to_word(self) -> u64 {
        self.data.as_ptr() as usize as u64
    }

    #[inline(always)]
    fn elems(self) -> &'static [Value] {
        // SAFETY: ArrData is leaked and never freed; the VM is
        // single-threaded, and no reference outlives the method call.
        &unsafe { &*self.data.as_ptr() }.elems
    }

    #[allow(clippy::mut_from_ref)]
    #[inline(always)]
    fn elems_mut(self) -> &'static mut Vec<Value> {
        // SAFETY: as in `elems`; mutation is confined to the current method.
        &mut unsafe { &mut *self.data.as_ptr() }.elems
    }
}

impl PartialEq for Array {
    #[inline]
    fn eq(&self, other: &Array) -> bool {
        self.data == other.data
    }
}

impl Eq for Array {}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.elems()).finish()
    }
}
