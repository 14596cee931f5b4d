//! String interning.
//!
//! Every name that flows through the lowering pipeline (identifiers,
//! fully-qualified names, import paths, string option values) is interned
//! into a dense 32-bit ID. All equality comparisons on names are ID
//! comparisons, and symbol tables sort and binary-search by ID.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// An interned string.
///
/// IDs are dense and are only meaningful with respect to the [`Interner`]
/// that produced them. The empty string always interns to [`Istr::EMPTY`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Istr(pub(crate) u32);

impl Istr {
    /// The interned empty string.
    ///
    /// Zero-valued IR fields ("no package", "no JSON name yet") use this
    /// sentinel, so it is pre-interned at slot zero by `Interner::new`.
    pub const EMPTY: Istr = Istr(0);

    /// Returns `true` if this is the interned empty string.
    pub fn is_empty(self) -> bool {
        self == Istr::EMPTY
    }

    /// The raw dense index.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Istr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Istr({})", self.0)
    }
}

#[derive(Default)]
struct Inner {
    lookup: HashMap<Arc<str>, u32>,
    strings: Vec<Arc<str>>,
}

/// A bijection between strings and dense 32-bit IDs.
///
/// `intern` is a lookup-then-insert under a write lock; `resolve` takes the
/// read lock and clones the `Arc<str>` payload, so readers never contend
/// with each other and never block on rehashing.
pub struct Interner {
    inner: RwLock<Inner>,
}

impl Interner {
    pub fn new() -> Interner {
        let interner = Interner {
            inner: RwLock::new(Inner::default()),
        };
        // Slot zero is reserved for the empty string.
        interner.intern("");
        interner
    }

    /// Interns `s`, returning its ID. Idempotent.
    pub fn intern(&self, s: &str) -> Istr {
        {
            let inner = self.inner.read().unwrap();
            if let Some(&id) = inner.lookup.get(s) {
                return Istr(id);
            }
        }
        let mut inner = self.inner.write().unwrap();
        // Another thread may have inserted between the read and write locks.
        if let Some(&id) = inner.lookup.get(s) {
            return Istr(id);
        }
        let id = u32::try_from(inner.strings.len()).unwrap_or_else(|_| {
            panic!("interner overflow: more than u32::MAX distinct strings")
        });
        let arc: Arc<str> = Arc::from(s);
        inner.strings.push(arc.clone());
        inner.lookup.insert(arc, id);
        Istr(id)
    }

    /// Returns the string for `id`.
    ///
    /// The returned `Arc` shares storage with the interner; cloning it is
    /// two atomic ops.
    pub fn resolve(&self, id: Istr) -> Arc<str> {
        let inner = self.inner.read().unwrap();
        inner.strings[id.0 as usize].clone()
    }

    /// Number of distinct strings interned so far.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Interner {
    fn default() -> Interner {
        Interner::new()
    }
}

impl fmt::Debug for Interner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interner")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_is_slot_zero() {
        let interner = Interner::new();
        assert_eq!(interner.intern(""), Istr::EMPTY);
        assert!(Istr::EMPTY.is_empty());
    }

    #[test]
    fn intern_is_idempotent() {
        let interner = Interner::new();
        let a = interner.intern("foo.bar.Baz");
        let b = interner.intern("foo.bar.Baz");
        assert_eq!(a, b);
        assert_eq!(&*interner.resolve(a), "foo.bar.Baz");
    }

    #[test]
    fn distinct_strings_get_distinct_ids() {
        let interner = Interner::new();
        let a = interner.intern("foo");
        let b = interner.intern("bar");
        assert_ne!(a, b);
    }

    #[test]
    fn concurrent_interning_agrees() {
        let interner = std::sync::Arc::new(Interner::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let interner = interner.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|i| interner.intern(&format!("name{}", i)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for ids in &results[1..] {
            assert_eq!(&results[0], ids);
        }
    }

    proptest! {
        #[test]
        fn roundtrip(s in "\\PC*") {
            let interner = Interner::new();
            let id = interner.intern(&s);
            prop_assert_eq!(&*interner.resolve(id), s.as_str());
        }

        #[test]
        fn bijection(a in "\\PC*", b in "\\PC*") {
            let interner = Interner::new();
            let ia = interner.intern(&a);
            let ib = interner.intern(&b);
            prop_assert_eq!(ia == ib, a == b);
        }
    }
}
