//! Value and property model mediated by the membrane.
//!
//! The membrane owns the object model it virtualizes: values are either
//! primitives (which cross graph boundaries unchanged) or handles into the
//! object heap. Identity is handle equality, which is what makes the
//! identity-preservation guarantees of the membrane checkable.
//!
//! # Citations
//! - Van Cutsem & Miller, "Trustworthy Proxies: Virtualizing Objects with
//!   Invariants" (ECOOP 2013) – the fixed set of fundamental object operations
//! - Miller, "Robust Composition" (2006), Chapter 9 – membranes

use crate::error::MembraneError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique handle for an object in the membrane's heap.
///
/// Uses a transparent `u32` wrapper for efficient comparison and hashing.
/// The uniqueness invariant is maintained by the heap's arena.
///
/// # Invariant
/// - `ObjId`s are unique within a given `Membrane` instance.
/// - Equality and hash are based solely on the inner `u32`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjId(u32);

impl ObjId {
    /// Creates a new `ObjId` from a raw `u32`.
    ///
    /// Prefer the heap's allocation methods; a handle fabricated out of thin
    /// air may dangle.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw `u32` index.
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjId({})", self.0)
    }
}

/// Opaque identifier naming one object graph.
///
/// Supplied by the embedder, never generated internally. No two live graphs
/// may share a key simultaneously; the registry enforces this by construction.
/// Ordering is total so tables keyed by graphs iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphKey {
    /// Named graph ("wet", "dry", "sandbox", ...).
    Name(String),
    /// Anonymous graph identified by an embedder-chosen number.
    Id(u64),
}

impl GraphKey {
    /// Convenience constructor for named graphs.
    #[inline]
    pub fn name(s: impl Into<String>) -> Self {
        GraphKey::Name(s.into())
    }
}

impl fmt::Display for GraphKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphKey::Name(s) => write!(f, "{s}"),
            GraphKey::Id(n) => write!(f, "#{n}"),
        }
    }
}

impl From<&str> for GraphKey {
    fn from(s: &str) -> Self {
        GraphKey::Name(s.to_string())
    }
}

/// A property key: a name or a collection index.
///
/// Totally ordered so own-key enumeration is deterministic (indices first,
/// then names lexicographically, per the derived ordering).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropKey {
    /// Element index of an indexed collection.
    Index(u32),
    /// Named property.
    Name(String),
}

impl PropKey {
    /// Convenience constructor for named keys.
    #[inline]
    pub fn name(s: impl Into<String>) -> Self {
        PropKey::Name(s.into())
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Name(s) => write!(f, "{s}"),
            PropKey::Index(i) => write!(f, "[{i}]"),
        }
    }
}

impl From<&str> for PropKey {
    fn from(s: &str) -> Self {
        PropKey::Name(s.to_string())
    }
}

impl From<u32> for PropKey {
    fn from(i: u32) -> Self {
        PropKey::Index(i)
    }
}

/// Externally observable category of an object.
///
/// A surrogate is tagged with the same category as the real value it stands
/// in for, so that callers can distinguish callables and indexed collections
/// without reaching through the membrane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Ordinary keyed object.
    Plain,
    /// Indexed collection (array-like).
    Indexed,
    /// Invocable value (function-like); also usable as a constructor.
    Callable,
}

/// A value flowing through the membrane.
///
/// Non-`Obj` variants are primitives: they are their own representation in
/// every graph and pass through conversion unchanged. `Null` doubles as the
/// "absent" result of a failed property read.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Obj(ObjId),
}

impl Value {
    /// Convenience constructor for string values.
    #[inline]
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// Returns the object handle if this value is an object.
    #[inline]
    pub fn as_obj(&self) -> Option<ObjId> {
        match self {
            Value::Obj(id) => Some(*id),
            _ => None,
        }
    }

    /// `true` for `Obj`, `false` for every primitive (including `Null`).
    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Obj(_))
    }
}

impl From<ObjId> for Value {
    fn from(id: ObjId) -> Self {
        Value::Obj(id)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// A data property descriptor.
///
/// Accessor slots are intentionally absent: the membrane preserves externally
/// observable behavior, not engine-internal slot semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub value: Value,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyDescriptor {
    /// Fully permissive data descriptor around `value`.
    #[inline]
    pub fn data(value: Value) -> Self {
        Self {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Frozen data descriptor: not writable, not configurable.
    #[inline]
    pub fn frozen(value: Value) -> Self {
        Self {
            value,
            writable: false,
            enumerable: true,
            configurable: false,
        }
    }
}

/// Native implementation of an invocable value.
///
/// Receives the membrane so the body may perform further (possibly
/// intercepted) operations; reentrancy is ordinary call-stack recursion.
pub type NativeFn =
    fn(&mut crate::registry::Membrane, Value, &[Value]) -> Result<Value, MembraneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prop_key_ordering_is_deterministic() {
        let mut keys = vec![
            PropKey::name("b"),
            PropKey::Index(3),
            PropKey::name("a"),
            PropKey::Index(0),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                PropKey::Index(0),
                PropKey::Index(3),
                PropKey::name("a"),
                PropKey::name("b"),
            ]
        );
    }

    #[test]
    fn primitives_are_not_objects() {
        assert!(!Value::Null.is_object());
        assert!(!Value::Int(4).is_object());
        assert!(Value::Obj(ObjId::new(7)).is_object());
        assert_eq!(Value::Obj(ObjId::new(7)).as_obj(), Some(ObjId::new(7)));
    }

    #[test]
    fn graph_key_untagged_serde() {
        let named: GraphKey = serde_json::from_str("\"wet\"").unwrap();
        assert_eq!(named, GraphKey::name("wet"));
        let numbered: GraphKey = serde_json::from_str("12").unwrap();
        assert_eq!(numbered, GraphKey::Id(12));
    }

    #[test]
    fn prop_key_untagged_serde() {
        let name: PropKey = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(name, PropKey::name("x"));
        let idx: PropKey = serde_json::from_str("3").unwrap();
        assert_eq!(idx, PropKey::Index(3));
    }
}
