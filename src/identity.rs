//! Cross-graph identity associations.
//!
//! An association is the set of `(graph key, value)` pairs considered the
//! same logical entity across graphs: a real value in its native graph plus
//! every surrogate minted for it elsewhere. The map is bidirectional by
//! construction — each member indexes back to its association — and every
//! operation is atomic: it either fully succeeds or leaves all prior state
//! unchanged. Validation happens on borrowed state before any mutation, the
//! same validate-then-commit shape the rest of the crate uses.
//!
//! # Invariants
//! - A value belongs to at most one association.
//! - No graph key appears twice within an association.
//! - An association always has at least 2 members; dropping below that
//!   tears the remainder down (a one-member association is meaningless).

use crate::error::MembraneError;
use crate::value::{GraphKey, ObjId};
use std::collections::{BTreeMap, HashMap};

/// Handle for one association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct AssocId(u64);

/// One identity association: graph key → member value.
///
/// `BTreeMap` keeps member iteration deterministic by graph key.
#[derive(Debug, Clone, Default)]
struct Association {
    members: BTreeMap<GraphKey, ObjId>,
}

/// The one-to-one association table shared by all graphs of a membrane.
#[derive(Debug, Default)]
pub struct IdentityMap {
    assocs: HashMap<u64, Association>,
    /// Member value → owning association.
    index: HashMap<ObjId, AssocId>,
    next_id: u64,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&mut self) -> AssocId {
        let id = AssocId(self.next_id);
        self.next_id += 1;
        id
    }

    fn assoc(&self, id: AssocId) -> &Association {
        // The index never points at a dropped association.
        &self.assocs[&id.0]
    }

    /// Establishes or merges the association containing `a` and `b`.
    ///
    /// - Neither value known: a fresh two-member association is created.
    /// - Exactly one known: the other value and its key join that
    ///   association.
    /// - Both known, different associations: the associations merge; their
    ///   key-sets must be disjoint, else `IdentityConflict`.
    /// - A key already bound to a *different* value in the (possibly merged)
    ///   association fails with `IdentityMismatch`.
    ///
    /// On any error nothing is mutated.
    pub fn bind(
        &mut self,
        key_a: &GraphKey,
        a: ObjId,
        key_b: &GraphKey,
        b: ObjId,
    ) -> Result<(), MembraneError> {
        if key_a == key_b {
            // One graph cannot hold two members of the same association.
            return Err(MembraneError::IdentityConflict { key: key_a.clone() });
        }
        let ia = self.index.get(&a).copied();
        let ib = self.index.get(&b).copied();
        match (ia, ib) {
            (None, None) => {
                let id = self.fresh_id();
                let mut members = BTreeMap::new();
                members.insert(key_a.clone(), a);
                members.insert(key_b.clone(), b);
                self.assocs.insert(id.0, Association { members });
                self.index.insert(a, id);
                self.index.insert(b, id);
                Ok(())
            }
            (Some(ia), None) => self.join(ia, key_a, a, key_b, b),
            (None, Some(ib)) => self.join(ib, key_b, b, key_a, a),
            (Some(ia), Some(ib)) if ia == ib => {
                let members = &self.assoc(ia).members;
                for (k, v) in [(key_a, a), (key_b, b)] {
                    if let Some(&existing) = members.get(k) {
                        if existing != v {
                            return Err(MembraneError::IdentityMismatch { key: k.clone() });
                        }
                    }
                }
                let Some(assoc) = self.assocs.get_mut(&ia.0) else {
                    return Err(MembraneError::IdentityMismatch { key: key_a.clone() });
                };
                assoc.members.insert(key_a.clone(), a);
                assoc.members.insert(key_b.clone(), b);
                self.index.insert(a, ia);
                self.index.insert(b, ia);
                Ok(())
            }
            (Some(ia), Some(ib)) => self.merge(ia, key_a, a, ib, key_b, b),
        }
    }

    /// `known` is indexed at `into` under some key; `other` joins.
    fn join(
        &mut self,
        into: AssocId,
        known_key: &GraphKey,
        known: ObjId,
        other_key: &GraphKey,
        other: ObjId,
    ) -> Result<(), MembraneError> {
        {
            let members = &self.assoc(into).members;
            if let Some(&existing) = members.get(known_key) {
                if existing != known {
                    return Err(MembraneError::IdentityMismatch {
                        key: known_key.clone(),
                    });
                }
            }
            if members.get(other_key).is_some() {
                // `other` has no association, so whatever sits under its key
                // is necessarily a different value.
                return Err(MembraneError::IdentityMismatch {
                    key: other_key.clone(),
                });
            }
        }
        let Some(assoc) = self.assocs.get_mut(&into.0) else {
            return Err(MembraneError::IdentityMismatch {
                key: known_key.clone(),
            });
        };
        assoc.members.insert(known_key.clone(), known);
        assoc.members.insert(other_key.clone(), other);
        self.index.insert(known, into);
        self.index.insert(other, into);
        Ok(())
    }

    /// Merges two distinct associations.
    fn merge(
        &mut self,
        ia: AssocId,
        key_a: &GraphKey,
        a: ObjId,
        ib: AssocId,
        key_b: &GraphKey,
        b: ObjId,
    ) -> Result<(), MembraneError> {
        {
            let left = &self.assoc(ia).members;
            let right = &self.assoc(ib).members;
            for k in right.keys() {
                if left.contains_key(k) {
                    return Err(MembraneError::IdentityConflict { key: k.clone() });
                }
            }
            for (members, k, v) in [(left, key_a, a), (right, key_b, b)] {
                if let Some(&existing) = members.get(k) {
                    if existing != v {
                        return Err(MembraneError::IdentityMismatch { key: k.clone() });
                    }
                }
            }
            // The named keys may also sit in the opposite association after
            // the union; a different value there is a mismatch too.
            for (members, k, v) in [(right, key_a, a), (left, key_b, b)] {
                if let Some(&existing) = members.get(k) {
                    if existing != v {
                        return Err(MembraneError::IdentityMismatch { key: k.clone() });
                    }
                }
            }
        }
        let absorbed = match self.assocs.remove(&ib.0) {
            Some(assoc) => assoc,
            None => return Err(MembraneError::IdentityConflict { key: key_b.clone() }),
        };
        for member in absorbed.members.values() {
            self.index.insert(*member, ia);
        }
        let Some(assoc) = self.assocs.get_mut(&ia.0) else {
            return Err(MembraneError::IdentityMismatch { key: key_a.clone() });
        };
        assoc.members.extend(absorbed.members);
        assoc.members.insert(key_a.clone(), a);
        assoc.members.insert(key_b.clone(), b);
        Ok(())
    }

    /// Returns the member stored under `key` in `value`'s association.
    pub fn get(&self, value: ObjId, key: &GraphKey) -> Option<ObjId> {
        let id = self.index.get(&value)?;
        self.assoc(*id).members.get(key).copied()
    }

    /// `true` if `value`'s association has a member under `key`.
    pub fn has(&self, value: ObjId, key: &GraphKey) -> bool {
        self.get(value, key).is_some()
    }

    /// `true` if `value` is exactly the member stored under `key` in its
    /// association. A value with no association at all reports
    /// `allow_absent`.
    pub fn has_identity(&self, value: ObjId, key: &GraphKey, allow_absent: bool) -> bool {
        match self.index.get(&value) {
            None => allow_absent,
            Some(id) => self.assoc(*id).members.get(key) == Some(&value),
        }
    }

    /// Removes the single `(key → value)` binding.
    ///
    /// Returns `false` if no such binding exists. If the owning association
    /// is left with fewer than 2 members, the remainder is torn down too.
    pub fn delete(&mut self, value: ObjId, key: &GraphKey) -> bool {
        let id = match self.index.get(&value) {
            Some(id) => *id,
            None => return false,
        };
        {
            let members = &self.assoc(id).members;
            if members.get(key) != Some(&value) {
                return false;
            }
        }
        let assoc = match self.assocs.get_mut(&id.0) {
            Some(assoc) => assoc,
            None => return false,
        };
        assoc.members.remove(key);
        self.index.remove(&value);
        if assoc.members.len() < 2 {
            let leftovers: Vec<ObjId> = assoc.members.values().copied().collect();
            for member in leftovers {
                self.index.remove(&member);
            }
            self.assocs.remove(&id.0);
        }
        true
    }

    /// Drops all associations.
    pub fn clear(&mut self) {
        self.assocs.clear();
        self.index.clear();
    }

    /// Number of live associations.
    pub fn len(&self) -> usize {
        self.assocs.len()
    }

    /// `true` when no associations exist.
    pub fn is_empty(&self) -> bool {
        self.assocs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(s: &str) -> GraphKey {
        GraphKey::name(s)
    }

    fn o(n: u32) -> ObjId {
        ObjId::new(n)
    }

    #[test]
    fn bind_and_get() {
        let mut map = IdentityMap::new();
        map.bind(&k("a"), o(1), &k("b"), o(2)).unwrap();
        assert_eq!(map.get(o(1), &k("b")), Some(o(2)));
        assert_eq!(map.get(o(2), &k("a")), Some(o(1)));
        assert_eq!(map.get(o(1), &k("c")), None);
        assert!(map.has(o(2), &k("a")));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn join_extends_existing_association() {
        let mut map = IdentityMap::new();
        map.bind(&k("a"), o(1), &k("b"), o(2)).unwrap();
        // vC in graph c joins via the known member vA.
        map.bind(&k("c"), o(3), &k("a"), o(1)).unwrap();
        // Transitive association via the join.
        assert_eq!(map.get(o(2), &k("c")), Some(o(3)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn merge_is_transitive() {
        let mut map = IdentityMap::new();
        map.bind(&k("a"), o(1), &k("b"), o(2)).unwrap();
        map.bind(&k("c"), o(3), &k("d"), o(4)).unwrap();
        assert_eq!(map.len(), 2);
        map.bind(&k("a"), o(1), &k("c"), o(3)).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(o(2), &k("d")), Some(o(4)));
        assert_eq!(map.get(o(4), &k("a")), Some(o(1)));
    }

    #[test]
    fn merge_with_key_collision_leaves_both_unchanged() {
        let mut map = IdentityMap::new();
        map.bind(&k("a"), o(1), &k("b"), o(2)).unwrap();
        map.bind(&k("b"), o(5), &k("c"), o(6)).unwrap();
        // Both associations contain key "b": the union would duplicate it.
        let err = map.bind(&k("a"), o(1), &k("c"), o(6)).unwrap_err();
        assert_eq!(err, MembraneError::IdentityConflict { key: k("b") });
        // Nothing mutated.
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(o(1), &k("b")), Some(o(2)));
        assert_eq!(map.get(o(6), &k("b")), Some(o(5)));
        assert_eq!(map.get(o(1), &k("c")), None);
    }

    #[test]
    fn rebinding_key_to_different_value_is_a_mismatch() {
        let mut map = IdentityMap::new();
        map.bind(&k("k1"), o(1), &k("k2"), o(2)).unwrap();
        // vOther != vA under k1.
        let err = map.bind(&k("k2"), o(2), &k("k1"), o(9)).unwrap_err();
        assert_eq!(err, MembraneError::IdentityMismatch { key: k("k1") });
        assert_eq!(map.get(o(2), &k("k1")), Some(o(1)));
    }

    #[test]
    fn same_key_on_both_sides_is_a_conflict() {
        let mut map = IdentityMap::new();
        let err = map.bind(&k("a"), o(1), &k("a"), o(2)).unwrap_err();
        assert_eq!(err, MembraneError::IdentityConflict { key: k("a") });
        assert!(map.is_empty());
    }

    #[test]
    fn rebinding_same_pair_is_idempotent() {
        let mut map = IdentityMap::new();
        map.bind(&k("a"), o(1), &k("b"), o(2)).unwrap();
        map.bind(&k("a"), o(1), &k("b"), o(2)).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn delete_below_two_members_tears_down() {
        let mut map = IdentityMap::new();
        map.bind(&k("a"), o(1), &k("b"), o(2)).unwrap();
        map.bind(&k("c"), o(3), &k("a"), o(1)).unwrap();

        assert!(map.delete(o(3), &k("c")));
        // Two members remain; the association survives.
        assert_eq!(map.get(o(1), &k("b")), Some(o(2)));

        assert!(map.delete(o(2), &k("b")));
        // One member left: the remainder is torn down too.
        assert!(map.is_empty());
        assert_eq!(map.get(o(1), &k("a")), None);
    }

    #[test]
    fn delete_wrong_binding_is_a_no_op() {
        let mut map = IdentityMap::new();
        map.bind(&k("a"), o(1), &k("b"), o(2)).unwrap();
        // o(1) is not the member under "b".
        assert!(!map.delete(o(1), &k("b")));
        assert!(!map.delete(o(9), &k("a")));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn has_identity_respects_allow_absent() {
        let mut map = IdentityMap::new();
        assert!(map.has_identity(o(1), &k("a"), true));
        assert!(!map.has_identity(o(1), &k("a"), false));

        map.bind(&k("a"), o(1), &k("b"), o(2)).unwrap();
        assert!(map.has_identity(o(1), &k("a"), false));
        assert!(!map.has_identity(o(1), &k("b"), true));
    }

    #[test]
    fn clear_drops_everything() {
        let mut map = IdentityMap::new();
        map.bind(&k("a"), o(1), &k("b"), o(2)).unwrap();
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.get(o(1), &k("b")), None);
    }
}
