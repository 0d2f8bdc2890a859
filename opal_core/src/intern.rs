//! Process-lifetime string interning for field names.
//!
//! Object field names are short identifiers that repeat across thousands of
//! instruction objects (`"op"`, `"val"`, `"instrs"`, ...). Interning them
//! once makes field-name equality a pointer comparison, which is what the
//! compiler's inline caches rely on for their fast path.

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::LazyLock;

static POOL: LazyLock<Mutex<FxHashSet<&'static str>>> =
    LazyLock::new(|| Mutex::new(FxHashSet::default()));

/// An interned identifier string.
///
/// Two `InternedStr`s produced by [`intern`] from equal input compare equal
/// by pointer identity.
#[derive(Clone, Copy)]
pub struct InternedStr(&'static str);

impl InternedStr {
    /// The interned string slice.
    #[inline(always)]
    pub fn as_str(self) -> &'static str {
        self.0
    }

    /// Byte view of the identifier.
    #[inline(always)]
    pub fn as_bytes(self) -> &'static [u8] {
        self.0.as_bytes()
    }
}

impl PartialEq for InternedStr {
    #[inline(always)]
    fn eq(&self, other: &InternedStr) -> bool {
        // Pointer identity is sufficient: the pool holds one allocation per
        // distinct string.
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for InternedStr {}

impl std::hash::Hash for InternedStr {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (self.0.as_ptr() as usize).hash(state);
    }
}

impl fmt::Debug for InternedStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InternedStr({:?})", self.0)
    }
}

impl fmt::Display for InternedStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Intern a string, returning its canonical handle.
pub fn intern(s: &str) -> InternedStr {
    let mut pool = POOL.lock();
    if let Some(&existing) = pool.get(s) {
        return InternedStr(existing);
    }
    let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
    pool.insert(leaked);
    InternedStr(leaked)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_identity() {
        let a = intern("op");
        let b = intern("op");
        let c = intern("val");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(std::ptr::eq(a.as_str(), b.as_str()));
    }

    #[test]
    fn test_intern_contents() {
        let s = intern("num_locals");
        assert_eq!(s.as_str(), "num_locals");
        assert_eq!(s.as_bytes(), b"num_locals");
    }
}
