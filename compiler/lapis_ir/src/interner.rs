//! Sharded string interner for identifier storage.
//!
//! Provides O(1) interning and lookup with thread-safe concurrent access
//! via per-shard locking. Lapis identifiers compare case-insensitively, so
//! the interner also offers `intern_ci`, which lower-cases before interning.
//! Every registry in the evaluator keys its tables by `intern_ci` names,
//! computed once at registration time and once per call-site lookup.

use super::Name;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-shard storage for interned strings.
struct InternShard {
    /// Map from string content to local index.
    map: FxHashMap<&'static str, u32>,
    /// Storage for string contents.
    strings: Vec<&'static str>,
}

impl InternShard {
    fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(128),
        }
    }

    fn with_empty() -> Self {
        let mut shard = Self::new();
        // Pre-intern empty string at index 0 so Name::EMPTY is valid
        let empty: &'static str = "";
        shard.map.insert(empty, 0);
        shard.strings.push(empty);
        shard
    }
}

/// Sharded string interner.
///
/// Provides O(1) lookup and equality comparison for interned strings.
/// Interned strings are leaked; the interner lives for the whole run.
///
/// # Thread Safety
/// Uses `RwLock` per shard. Wrap in `SharedInterner` to share across
/// phases; the evaluator itself borrows it.
pub struct StringInterner {
    shards: [RwLock<InternShard>; Name::NUM_SHARDS],
    /// Total count of interned strings across all shards (O(1) `len()`).
    total_count: AtomicUsize,
}

impl StringInterner {
    /// Create a new interner with pre-interned keywords.
    pub fn new() -> Self {
        let shards = std::array::from_fn(|i| {
            if i == 0 {
                RwLock::new(InternShard::with_empty())
            } else {
                RwLock::new(InternShard::new())
            }
        });

        // Start with 1 for the empty string pre-interned in shard 0
        let interner = Self {
            shards,
            total_count: AtomicUsize::new(1),
        };
        interner.pre_intern_keywords();
        interner
    }

    /// Compute shard for a string based on its hash.
    #[inline]
    fn shard_for(s: &str) -> usize {
        let mut hash = 0u32;
        for byte in s.bytes().take(8) {
            hash = hash.wrapping_mul(31).wrapping_add(u32::from(byte));
        }
        (hash as usize) % Name::NUM_SHARDS
    }

    /// Intern a string, returning its Name.
    ///
    /// # Panics
    /// Panics if a shard exceeds capacity (over 256 million strings).
    #[inline]
    pub fn intern(&self, s: &str) -> Name {
        let shard_idx = Self::shard_for(s);
        // shard_idx < NUM_SHARDS (16) due to modulo, always fits in u32
        #[allow(clippy::cast_possible_truncation)]
        let shard_idx_u32 = shard_idx as u32;
        let shard = &self.shards[shard_idx];

        // Fast path: already interned
        {
            let guard = shard.read();
            if let Some(&local) = guard.map.get(s) {
                return Name::new(shard_idx_u32, local);
            }
        }

        // Slow path: insert under the write lock
        let mut guard = shard.write();

        // Double-check after acquiring write lock
        if let Some(&local) = guard.map.get(s) {
            return Name::new(shard_idx_u32, local);
        }

        // Leak the string to get 'static lifetime
        let owned: String = s.to_owned();
        let leaked: &'static str = Box::leak(owned.into_boxed_str());

        let local = u32::try_from(guard.strings.len())
            .unwrap_or_else(|_| panic!("interner shard {shard_idx} exceeded capacity"));
        assert!(local <= Name::MAX_LOCAL, "interner shard overflow");
        guard.strings.push(leaked);
        guard.map.insert(leaked, local);

        self.total_count.fetch_add(1, Ordering::Relaxed);

        Name::new(shard_idx_u32, local)
    }

    /// Intern the case-insensitive key for an identifier.
    ///
    /// Lower-cases (ASCII) before interning, so `Foo`, `foo` and `FOO` all
    /// produce the same `Name`. This is the lookup key used by every table
    /// in the evaluator. Avoids allocation when the input is already
    /// lower-case.
    #[inline]
    pub fn intern_ci(&self, s: &str) -> Name {
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            self.intern(&s.to_ascii_lowercase())
        } else {
            self.intern(s)
        }
    }

    /// Look up the case-insensitive key for an already-interned name.
    pub fn key_of(&self, name: Name) -> Name {
        let text = self.lookup(name);
        if text.bytes().any(|b| b.is_ascii_uppercase()) {
            self.intern(&text.to_ascii_lowercase())
        } else {
            name
        }
    }

    /// Look up the string for a Name.
    pub fn lookup(&self, name: Name) -> &str {
        let shard = &self.shards[name.shard()];
        let guard = shard.read();
        guard.strings[name.local()]
    }

    /// Pre-intern Lapis keywords and well-known member names.
    fn pre_intern_keywords(&self) {
        const KEYWORDS: &[&str] = &[
            // Reserved words (already lower-case: keys equal themselves)
            "and", "array", "begin", "case", "class", "const", "constructor", "destructor",
            "do", "downto", "else", "end", "except", "finally", "for", "function", "if",
            "implementation", "inherited", "interface", "is", "nil", "not", "object", "of",
            "on", "operator", "or", "overload", "override", "procedure", "program", "property",
            "raise", "record", "repeat", "then", "to", "try", "type", "unit", "until", "uses",
            "var", "virtual", "while", "xor",
            // Well-known members
            "self", "result", "create", "destroy", "free", "classname", "classtype",
            // Primitive type names
            "integer", "float", "string", "boolean", "variant",
        ];

        for kw in KEYWORDS {
            self.intern(kw);
        }
    }

    /// Get the number of interned strings (O(1)).
    pub fn len(&self) -> usize {
        self.total_count.load(Ordering::Relaxed)
    }

    /// Check if the interner is empty (only has the empty string).
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for looking up interned string names.
///
/// Exists to avoid tight coupling: consumers can accept any `StringLookup`
/// implementor without depending directly on `StringInterner`.
pub trait StringLookup {
    /// Look up the string for an interned name.
    fn lookup(&self, name: Name) -> &str;
}

impl StringLookup for StringInterner {
    fn lookup(&self, name: Name) -> &str {
        StringInterner::lookup(self, name)
    }
}

/// Shared interner handle for use across interpreter phases.
#[derive(Clone)]
pub struct SharedInterner(Arc<StringInterner>);

impl SharedInterner {
    /// Create a new shared interner.
    pub fn new() -> Self {
        SharedInterner(Arc::new(StringInterner::new()))
    }
}

impl Default for SharedInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for SharedInterner {
    type Target = StringInterner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_and_lookup() {
        let interner = StringInterner::new();

        let hello = interner.intern("hello");
        let world = interner.intern("world");
        let hello2 = interner.intern("hello");

        assert_eq!(hello, hello2);
        assert_ne!(hello, world);

        assert_eq!(interner.lookup(hello), "hello");
        assert_eq!(interner.lookup(world), "world");
    }

    #[test]
    fn intern_ci_folds_case() {
        let interner = StringInterner::new();

        let a = interner.intern_ci("TAnimal");
        let b = interner.intern_ci("tanimal");
        let c = interner.intern_ci("TANIMAL");

        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(interner.lookup(a), "tanimal");

        // intern() keeps case distinct
        let preserved = interner.intern("TAnimal");
        assert_ne!(preserved, a);
        assert_eq!(interner.lookup(preserved), "TAnimal");
    }

    #[test]
    fn key_of_preserved_name() {
        let interner = StringInterner::new();
        let preserved = interner.intern("MakeArray");
        let key = interner.key_of(preserved);
        assert_eq!(interner.lookup(key), "makearray");
        assert_eq!(key, interner.intern_ci("MAKEARRAY"));
    }

    #[test]
    fn empty_string() {
        let interner = StringInterner::new();
        let empty = interner.intern("");
        assert_eq!(empty, Name::EMPTY);
        assert_eq!(interner.lookup(Name::EMPTY), "");
    }

    #[test]
    fn keywords_pre_interned() {
        let interner = StringInterner::new();
        assert_eq!(interner.lookup(interner.intern("begin")), "begin");
        assert_eq!(interner.lookup(interner.intern("inherited")), "inherited");
    }
}
