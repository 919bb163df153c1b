//! The typed value algebra of the Datalog dialect.
//!
//! Values carry interned string indexes rather than strings; the
//! interning table lives in [`crate::datalog::symbol`]. The total order
//! defined here is used for canonical serialization (set and map entries
//! are written sorted) and must stay stable: changing it would change
//! signed bytes.

use std::collections::{BTreeMap, BTreeSet};

/// Index of an interned string in a symbol table.
pub type SymbolIndex = u64;

/// A concrete Datalog value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// 64-bit signed integer.
    Integer(i64),
    /// Interned UTF-8 string.
    Str(SymbolIndex),
    /// Seconds since the Unix epoch.
    Date(u64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Boolean.
    Bool(bool),
    /// Absent value.
    Null,
    /// Unordered collection; never contains sets.
    Set(BTreeSet<Value>),
    /// Ordered collection.
    Array(Vec<Value>),
    /// Keyed collection; keys are integers or strings.
    Map(BTreeMap<MapKey, Value>),
}

/// A map key: integers and strings only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    /// Integer key.
    Integer(i64),
    /// Interned string key.
    Str(SymbolIndex),
}

impl Value {
    /// Rank of the value's tag in the canonical order.
    ///
    /// Rank 0 is reserved for variables, which order before every value.
    const fn tag_rank(&self) -> u8 {
        match self {
            Value::Integer(_) => 1,
            Value::Str(_) => 2,
            Value::Date(_) => 3,
            Value::Bytes(_) => 4,
            Value::Bool(_) => 5,
            Value::Set(_) => 6,
            Value::Null => 7,
            Value::Array(_) => 8,
            Value::Map(_) => 9,
        }
    }

    /// The name returned by the `type()` operator.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Str(_) => "string",
            Value::Date(_) => "date",
            Value::Bytes(_) => "bytes",
            Value::Bool(_) => "bool",
            Value::Set(_) => "set",
            Value::Null => "null",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        use core::cmp::Ordering;
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            // Shorter byte strings order first, then lexicographic.
            (Value::Bytes(a), Value::Bytes(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Set(a), Value::Set(b)) => a.iter().cmp(b.iter()),
            (Value::Array(a), Value::Array(b)) => a.iter().cmp(b.iter()),
            (Value::Map(a), Value::Map(b)) => a.iter().cmp(b.iter()),
            (a, b) => a.tag_rank().cmp(&b.tag_rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MapKey {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        match (self, other) {
            (MapKey::Integer(a), MapKey::Integer(b)) => a.cmp(b),
            (MapKey::Str(a), MapKey::Str(b)) => a.cmp(b),
            (MapKey::Integer(_), MapKey::Str(_)) => core::cmp::Ordering::Less,
            (MapKey::Str(_), MapKey::Integer(_)) => core::cmp::Ordering::Greater,
        }
    }
}

impl PartialOrd for MapKey {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl From<MapKey> for Value {
    fn from(key: MapKey) -> Self {
        match key {
            MapKey::Integer(i) => Value::Integer(i),
            MapKey::Str(s) => Value::Str(s),
        }
    }
}
