//! Per-graph coordinator state.
//!
//! A `GraphHead` owns everything scoped to one object graph: the
//! surrogate→real table, the registered revocation records, the graph's base
//! interception chain plus per-surrogate overrides, its distortion policy,
//! and the local-storage tables distortion configs write into. The shared
//! collaborators — object heap, identity map, origin map — live on
//! `Membrane`, which drives all cross-graph traffic; the head only answers
//! O(1) lookups about its own graph.

use crate::chain::InterceptionChain;
use crate::distortion::DistortionPolicy;
use crate::value::{GraphKey, ObjId, PropKey, PropertyDescriptor};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// What a surrogate stands in for.
#[derive(Debug, Clone)]
pub struct SurrogateTarget {
    /// The paired real value.
    pub real: ObjId,
    /// The graph the real value belongs to.
    pub origin: GraphKey,
}

/// Coordinator for one object graph.
#[derive(Debug)]
pub struct GraphHead {
    key: GraphKey,
    revoked: bool,
    /// Surrogate → (real value, origin graph).
    targets: HashMap<ObjId, SurrogateTarget>,
    /// Every surrogate this graph has minted, for graph-wide teardown.
    revocations: Vec<ObjId>,
    /// Base interception chain, shared by all surrogates of this graph.
    chain: InterceptionChain,
    /// Per-surrogate chain overrides installed by `replace_surrogate`.
    overrides: HashMap<ObjId, InterceptionChain>,
    /// Distortion rules scoped to this graph.
    policy: DistortionPolicy,
    /// Surrogate-local property storage (distortion `local_writes`).
    local_props: HashMap<ObjId, BTreeMap<PropKey, PropertyDescriptor>>,
    /// Keys hidden locally (distortion `local_deletes`).
    local_deleted: HashMap<ObjId, BTreeSet<PropKey>>,
}

impl GraphHead {
    pub(crate) fn new(key: GraphKey, chain: InterceptionChain) -> Self {
        Self {
            key,
            revoked: false,
            targets: HashMap::new(),
            revocations: Vec::new(),
            chain,
            overrides: HashMap::new(),
            policy: DistortionPolicy::new(),
            local_props: HashMap::new(),
            local_deleted: HashMap::new(),
        }
    }

    /// The graph key this head coordinates.
    #[inline]
    pub fn key(&self) -> &GraphKey {
        &self.key
    }

    /// `true` once `revoke_all` has run.
    #[inline]
    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    /// The real value and origin behind one of this graph's surrogates.
    #[inline]
    pub fn target(&self, surrogate: ObjId) -> Option<&SurrogateTarget> {
        self.targets.get(&surrogate)
    }

    /// The real value behind a surrogate.
    #[inline]
    pub fn real_for_surrogate(&self, surrogate: ObjId) -> Option<ObjId> {
        self.targets.get(&surrogate).map(|t| t.real)
    }

    /// The origin graph of the real value behind a surrogate.
    #[inline]
    pub fn origin_for_surrogate(&self, surrogate: ObjId) -> Option<&GraphKey> {
        self.targets.get(&surrogate).map(|t| &t.origin)
    }

    /// Number of live surrogates this graph currently tracks.
    pub fn surrogate_count(&self) -> usize {
        self.targets.len()
    }

    /// The graph's base interception chain.
    pub fn chain(&self) -> &InterceptionChain {
        &self.chain
    }

    /// Mutable access for chain splicing.
    pub fn chain_mut(&mut self) -> &mut InterceptionChain {
        &mut self.chain
    }

    /// The chain governing one surrogate: its override if installed, the
    /// graph base chain otherwise.
    pub(crate) fn chain_for(&self, surrogate: ObjId) -> &InterceptionChain {
        self.overrides.get(&surrogate).unwrap_or(&self.chain)
    }

    pub(crate) fn set_override(&mut self, surrogate: ObjId, chain: InterceptionChain) {
        self.overrides.insert(surrogate, chain);
    }

    /// This graph's distortion policy.
    pub fn policy(&self) -> &DistortionPolicy {
        &self.policy
    }

    /// Mutable access for rule registration.
    pub fn policy_mut(&mut self) -> &mut DistortionPolicy {
        &mut self.policy
    }

    pub(crate) fn register_surrogate(&mut self, surrogate: ObjId, real: ObjId, origin: GraphKey) {
        self.targets.insert(surrogate, SurrogateTarget { real, origin });
        self.revocations.push(surrogate);
    }

    /// Drops one surrogate's bookkeeping (per-surrogate revocation).
    pub(crate) fn unregister_surrogate(&mut self, surrogate: ObjId) {
        self.targets.remove(&surrogate);
        self.overrides.remove(&surrogate);
        self.local_props.remove(&surrogate);
        self.local_deleted.remove(&surrogate);
        self.revocations.retain(|s| *s != surrogate);
    }

    /// Marks the graph revoked and resets every table, returning the
    /// registered revocation records for the registry to disable.
    pub(crate) fn mark_revoked(&mut self) -> Vec<ObjId> {
        self.revoked = true;
        self.targets.clear();
        self.overrides.clear();
        self.local_props.clear();
        self.local_deleted.clear();
        std::mem::take(&mut self.revocations)
    }

    // ------------------------------------------------------------------
    // Surrogate-local distortion storage
    // ------------------------------------------------------------------

    pub(crate) fn local_prop(
        &self,
        surrogate: ObjId,
        key: &PropKey,
    ) -> Option<&PropertyDescriptor> {
        self.local_props.get(&surrogate).and_then(|m| m.get(key))
    }

    pub(crate) fn set_local_prop(
        &mut self,
        surrogate: ObjId,
        key: PropKey,
        desc: PropertyDescriptor,
    ) {
        self.local_deleted
            .entry(surrogate)
            .or_default()
            .remove(&key);
        self.local_props
            .entry(surrogate)
            .or_default()
            .insert(key, desc);
    }

    /// Local-only keys of a surrogate, in deterministic order.
    pub(crate) fn local_keys(&self, surrogate: ObjId) -> Vec<PropKey> {
        self.local_props
            .get(&surrogate)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn is_locally_deleted(&self, surrogate: ObjId, key: &PropKey) -> bool {
        self.local_deleted
            .get(&surrogate)
            .is_some_and(|s| s.contains(key))
    }

    pub(crate) fn mark_locally_deleted(&mut self, surrogate: ObjId, key: PropKey) {
        if let Some(props) = self.local_props.get_mut(&surrogate) {
            props.remove(&key);
        }
        self.local_deleted
            .entry(surrogate)
            .or_default()
            .insert(key);
    }
}
