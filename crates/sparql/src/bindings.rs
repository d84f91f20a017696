//! Variable binding table
//!
//! One columnar table of `(variable-name-hash, value-span)` pairs threaded
//! by reference through every operator. Values live in a single
//! append-only string arena; truncating the table rolls the arena back to
//! the high-water mark of the first dropped binding, which is the
//! backtracking primitive every scan builds on. Operators never `clear`
//! between iterations: clearing would invalidate arena offsets held by
//! parent scan frames.

use crate::EngineError;
use smallvec::SmallVec;

/// FNV-1a initial basis.
pub const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
/// FNV-1a prime.
pub const FNV_PRIME: u32 = 16_777_619;

/// FNV-1a 32-bit hash over the UTF-16 code units of a variable name.
pub fn hash_name(name: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for unit in name.encode_utf16() {
        hash ^= u32::from(unit);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Fast-path typed value carried alongside a binding's string form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypedValue {
    /// 64-bit integer
    Integer(i64),
    /// Double-precision float
    Double(f64),
    /// Boolean
    Boolean(bool),
}

/// One variable binding: a name hash plus name and value spans into the
/// table's arena.
///
/// Hash collisions are tolerated: lookup compares the stored name span
/// whenever one is present.
#[derive(Debug, Clone, Copy)]
pub struct Binding {
    /// FNV-1a hash of the variable name.
    pub name_hash: u32,
    name_start: u32,
    name_len: u32,
    value_start: u32,
    value_len: u32,
    /// Decoded numeric/boolean value, when the binder knew it.
    pub typed: Option<TypedValue>,
}

const INLINE_BINDINGS: usize = 16;

/// Default binding capacity.
pub const DEFAULT_BINDING_CAPACITY: usize = 64;
/// Default arena capacity in bytes.
pub const DEFAULT_ARENA_CAPACITY: usize = 16 * 1024;

/// The binding table.
#[derive(Debug)]
pub struct BindingTable {
    bindings: SmallVec<[Binding; INLINE_BINDINGS]>,
    arena: String,
    max_bindings: usize,
    max_arena: usize,
}

impl Default for BindingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingTable {
    /// Create a table with default capacities.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BINDING_CAPACITY, DEFAULT_ARENA_CAPACITY)
    }

    /// Create a table with explicit binding and arena capacities.
    ///
    /// Exceeding either capacity is a [`EngineError::BufferExhausted`]
    /// fault: callers size the table for the query, overflow is a
    /// precondition violation rather than a resize.
    pub fn with_capacity(max_bindings: usize, max_arena: usize) -> Self {
        Self {
            bindings: SmallVec::new(),
            arena: String::new(),
            max_bindings,
            max_arena,
        }
    }

    /// Number of live bindings.
    pub fn count(&self) -> usize {
        self.bindings.len()
    }

    /// Current arena high-water mark.
    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }

    fn push_entry(
        &mut self,
        hash: u32,
        name: &str,
        value: &str,
        typed: Option<TypedValue>,
    ) -> Result<(), EngineError> {
        if self.bindings.len() >= self.max_bindings {
            return Err(EngineError::BufferExhausted(self.max_bindings));
        }
        if self.arena.len() + name.len() + value.len() > self.max_arena {
            return Err(EngineError::BufferExhausted(self.max_arena));
        }
        let name_start = self.arena.len() as u32;
        self.arena.push_str(name);
        let value_start = self.arena.len() as u32;
        self.arena.push_str(value);
        self.bindings.push(Binding {
            name_hash: hash,
            name_start,
            name_len: name.len() as u32,
            value_start,
            value_len: value.len() as u32,
            typed,
        });
        Ok(())
    }

    /// Bind a variable to a string value.
    pub fn bind(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        self.push_entry(hash_name(name), name, value, None)
    }

    /// Bind a variable to a string value with a known typed decoding.
    pub fn bind_decoded(
        &mut self,
        name: &str,
        value: &str,
        typed: Option<TypedValue>,
    ) -> Result<(), EngineError> {
        self.push_entry(hash_name(name), name, value, typed)
    }

    /// Re-bind a restored value by precomputed hash.
    ///
    /// Restored bindings carry no name span; lookups match them on hash
    /// alone.
    pub fn bind_with_hash(&mut self, hash: u32, value: &str) -> Result<(), EngineError> {
        self.push_entry(hash, "", value, None)
    }

    /// Index of the binding for `name`, or `None`.
    ///
    /// A candidate matches when its hash matches and its stored name span
    /// equals `name`; bindings restored by hash (empty name span) match on
    /// hash alone.
    pub fn find(&self, name: &str) -> Option<usize> {
        let hash = hash_name(name);
        self.bindings.iter().position(|b| {
            b.name_hash == hash && (b.name_len == 0 || self.span(b.name_start, b.name_len) == name)
        })
    }

    /// Index of the binding with the given hash, or `None`.
    pub fn find_by_hash(&self, hash: u32) -> Option<usize> {
        self.bindings.iter().position(|b| b.name_hash == hash)
    }

    fn span(&self, start: u32, len: u32) -> &str {
        &self.arena[start as usize..(start + len) as usize]
    }

    /// Value string of binding `index`.
    pub fn get(&self, index: usize) -> &str {
        let b = &self.bindings[index];
        self.span(b.value_start, b.value_len)
    }

    /// Variable name of binding `index` (empty for restored bindings).
    pub fn name(&self, index: usize) -> &str {
        let b = &self.bindings[index];
        self.span(b.name_start, b.name_len)
    }

    /// Name hash of binding `index`.
    pub fn hash_at(&self, index: usize) -> u32 {
        self.bindings[index].name_hash
    }

    /// Typed decoding of binding `index`, when known.
    pub fn typed(&self, index: usize) -> Option<TypedValue> {
        self.bindings[index].typed
    }

    /// Value string bound to `name`, or `None`.
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.find(name).map(|i| self.get(i))
    }

    /// Drop every binding at index `>= n` and roll the arena back to the
    /// high-water mark binding `n` started at.
    pub fn truncate_to(&mut self, n: usize) {
        if n >= self.bindings.len() {
            return;
        }
        let mark = if n == 0 {
            0
        } else {
            self.bindings[n].name_start as usize
        };
        self.arena.truncate(mark);
        self.bindings.truncate(n);
    }

    /// Reset to empty.
    pub fn clear(&mut self) {
        self.bindings.clear();
        self.arena.clear();
    }

    /// Iterate `(name, value)` pairs in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .iter()
            .map(move |b| (self.span(b.name_start, b.name_len), self.span(b.value_start, b.value_len)))
    }

    /// Composite FNV-1a hash over the given value strings, mixing a `|`
    /// separator between consecutive values.
    pub fn composite_hash<'v>(values: impl Iterator<Item = &'v str>) -> u32 {
        let mut hash = FNV_OFFSET_BASIS;
        let mut first = true;
        for value in values {
            if !first {
                hash ^= u32::from(b'|');
                hash = hash.wrapping_mul(FNV_PRIME);
            }
            first = false;
            for unit in value.encode_utf16() {
                hash ^= u32::from(unit);
                hash = hash.wrapping_mul(FNV_PRIME);
            }
        }
        hash
    }

    /// Composite hash of every bound value in table order.
    pub fn row_hash(&self) -> u32 {
        Self::composite_hash(self.bindings.iter().map(|b| self.span(b.value_start, b.value_len)))
    }
}

/// Heap-owned snapshot of a binding table row.
///
/// Materialization deliberately escapes the scan lifetime by copying
/// binding values into owned strings; it is the only place the engine
/// pays a per-row allocation (ORDER BY, GROUP BY, subquery joins,
/// SERVICE results, EXISTS in materialized contexts).
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedRow {
    /// Name hashes, parallel to `values`.
    pub hashes: Vec<u32>,
    /// Canonical value strings.
    pub values: Vec<String>,
}

impl MaterializedRow {
    /// Snapshot every live binding.
    pub fn capture(bindings: &BindingTable) -> Self {
        let mut hashes = Vec::with_capacity(bindings.count());
        let mut values = Vec::with_capacity(bindings.count());
        for i in 0..bindings.count() {
            hashes.push(bindings.hash_at(i));
            values.push(bindings.get(i).to_owned());
        }
        Self { hashes, values }
    }

    /// Load this row into a table, replacing its contents.
    pub fn restore(&self, bindings: &mut BindingTable) -> Result<(), EngineError> {
        bindings.clear();
        for (hash, value) in self.hashes.iter().zip(&self.values) {
            bindings.bind_with_hash(*hash, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hash_is_fnv1a_over_utf16() {
        // FNV-1a of "a" (single UTF-16 unit 0x61)
        let expected = (FNV_OFFSET_BASIS ^ 0x61).wrapping_mul(FNV_PRIME);
        assert_eq!(hash_name("a"), expected);
        // Astral characters hash as surrogate pairs, two units.
        assert_ne!(hash_name("\u{1F642}"), hash_name("\u{FFFD}"));
    }

    #[test]
    fn test_bind_and_find() {
        let mut table = BindingTable::new();
        table.bind("s", "<urn:a>").unwrap();
        table.bind("o", "42").unwrap();

        assert_eq!(table.count(), 2);
        assert_eq!(table.value_of("s"), Some("<urn:a>"));
        assert_eq!(table.value_of("o"), Some("42"));
        assert_eq!(table.value_of("missing"), None);
        assert_eq!(table.name(1), "o");
    }

    #[test]
    fn test_find_by_hash_and_restored_bindings() {
        let mut table = BindingTable::new();
        let hash = hash_name("x");
        table.bind_with_hash(hash, "value").unwrap();

        assert_eq!(table.find_by_hash(hash), Some(0));
        // Restored bindings have no stored name and match on hash alone.
        assert_eq!(table.value_of("x"), Some("value"));
    }

    #[test]
    fn test_truncate_rolls_back_arena() {
        let mut table = BindingTable::new();
        table.bind("a", "one").unwrap();
        let count = table.count();
        let mark = table.arena_len();

        table.bind("b", "two").unwrap();
        table.bind("c", "three").unwrap();
        table.truncate_to(count);

        assert_eq!(table.count(), 1);
        assert_eq!(table.arena_len(), mark);
        assert_eq!(table.value_of("a"), Some("one"));
        assert_eq!(table.value_of("b"), None);
    }

    #[test]
    fn test_truncate_to_zero_and_past_end() {
        let mut table = BindingTable::new();
        table.bind("a", "one").unwrap();
        table.truncate_to(5);
        assert_eq!(table.count(), 1);
        table.truncate_to(0);
        assert_eq!(table.count(), 0);
        assert_eq!(table.arena_len(), 0);
    }

    #[test]
    fn test_capacity_overflow_is_fatal() {
        let mut table = BindingTable::with_capacity(1, 1024);
        table.bind("a", "x").unwrap();
        assert!(matches!(
            table.bind("b", "y"),
            Err(EngineError::BufferExhausted(_))
        ));

        let mut small = BindingTable::with_capacity(16, 4);
        assert!(small.bind("a", "long value").is_err());
    }

    #[test]
    fn test_row_hash_separator_matters() {
        let h1 = BindingTable::composite_hash(["ab", "c"].into_iter());
        let h2 = BindingTable::composite_hash(["a", "bc"].into_iter());
        assert_ne!(h1, h2);
    }

    proptest! {
        // Truncation is a left inverse of any sequence of binds.
        #[test]
        fn prop_truncate_restores_state(values in prop::collection::vec("[a-z]{0,8}", 1..8)) {
            let mut table = BindingTable::new();
            table.bind("base", "anchor").unwrap();
            let count = table.count();
            let mark = table.arena_len();

            for (i, v) in values.iter().enumerate() {
                table.bind(&format!("v{}", i), v).unwrap();
            }
            table.truncate_to(count);

            prop_assert_eq!(table.count(), count);
            prop_assert_eq!(table.arena_len(), mark);
            prop_assert_eq!(table.value_of("base"), Some("anchor"));
        }
    }
}
