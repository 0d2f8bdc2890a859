//! Immutable byte strings.

use std::fmt;
use std::ptr::NonNull;

/// An immutable byte sequence with a durable, copyable handle.
///
/// Strings are allocated once and never freed (see the crate-level lifetime
/// model). Contents are usually UTF-8, but single-byte strings produced by
/// `get_char` may carry arbitrary bytes; rendering is lossy.
#[derive(Clone, Copy)]
pub struct Str {
    data: NonNull<StrData>,
}

struct StrData {
    bytes: Box<[u8]>,
}

impl Str {
    /// Allocate a string from UTF-8 text.
    pub fn new(s: &str) -> Str {
        Str::from_bytes(s.as_bytes())
    }

    /// Allocate a string from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Str {
        let data = Box::leak(Box::new(StrData {
            bytes: bytes.to_vec().into_boxed_slice(),
        }));
        Str {
            data: NonNull::from(data),
        }
    }

    /// Concatenate two strings into a new allocation.
    pub fn concat(a: Str, b: Str) -> Str {
        let mut bytes = Vec::with_capacity(a.len() + b.len());
        bytes.extend_from_slice(a.as_bytes());
        bytes.extend_from_slice(b.as_bytes());
        let data = Box::leak(Box::new(StrData {
            bytes: bytes.into_boxed_slice(),
        }));
        Str {
            data: NonNull::from(data),
        }
    }

    /// Length in bytes.
    #[inline(always)]
    pub fn len(self) -> usize {
        // SAFETY: the handle always points at a live, never-freed StrData.
        unsafe { self.data.as_ref() }.bytes.len()
    }

    #[inline(always)]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// Read one byte. Callers bounds-check first.
    #[inline(always)]
    pub fn byte_at(self, idx: usize) -> u8 {
        // SAFETY: as in `len`.
        unsafe { self.data.as_ref() }.bytes[idx]
    }

    /// The full byte contents.
    #[inline(always)]
    pub fn as_bytes(self) -> &'static [u8] {
        // SAFETY: StrData is leaked, so the slice really is 'static.
        &unsafe { &*self.data.as_ptr() }.bytes
    }

    /// Lossy UTF-8 view for diagnostics.
    pub fn to_utf8_lossy(self) -> std::borrow::Cow<'static, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Reconstruct a handle from a value payload word.
    ///
    /// # Safety
    /// `word` must have been produced by [`Str::to_word`] on a live handle.
    #[inline(always)]
    pub unsafe fn from_word(word: u64) -> Str {
        Str {
            // SAFETY: caller guarantees the word is a valid StrData pointer.
            data: unsafe { NonNull::new_unchecked(word as usize as *mut StrData) },
        }
    }

    /// The handle as a value payload word.
    #[inline(always)]
    pub fn to_word(self) -> u64 {
        self.data.as_ptr() as usize as u64
    }
}

impl PartialEq for Str {
    #[inline]
    fn eq(&self, other: &Str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Str {}

impl fmt::Debug for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Str({:?})", self.to_utf8_lossy())
    }
}
