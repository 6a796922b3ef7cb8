//! The membrane: process-wide registry of graph heads and the engine that
//! drives all cross-graph traffic.
//!
//! `Membrane` is the sole creation/lookup entry point for graphs and the
//! owner of everything shared between them: the object heap, the identity
//! map, and the origin table recording which graph each real value is native
//! to. Conversion (`value_in_graph`), surrogate minting, revocation, and
//! chain rebinding all live here; per-graph tables live on [`GraphHead`].
//!
//! Execution is single-threaded and fully synchronous. Every primitive
//! operation returns before the intercepting call returns, and reentrancy —
//! an interception handler triggering further interceptions — is ordinary
//! call-stack recursion.
//!
//! # Citations
//! - Miller, "Robust Composition" (2006), Chapter 9 – membranes
//! - Van Cutsem & Miller, "Trustworthy Proxies" (ECOOP 2013) – revocable
//!   identity-preserving wrappers

use crate::chain::{InterceptionChain, Interceptor, OpContext};
use crate::distortion::{OpKind, OperationMeta};
use crate::error::MembraneError;
use crate::graph::GraphHead;
use crate::heap::ObjectHeap;
use crate::identity::IdentityMap;
use crate::value::{GraphKey, NativeFn, ObjId, Value};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Callback notified after a graph-wide revocation has been recorded.
///
/// Fan-out is best-effort: an observer error is logged and discarded so one
/// failing observer cannot mask the authoritative outcome.
pub type RevocationObserver = Box<dyn Fn(&GraphKey) -> Result<(), Box<dyn std::error::Error>>>;

/// The membrane: graph registry, identity map owner, and dispatch engine.
pub struct Membrane {
    pub(crate) heap: ObjectHeap,
    pub(crate) identity: IdentityMap,
    /// Real value → the graph it is native to. Recorded on first crossing.
    origins: HashMap<ObjId, GraphKey>,
    /// Graph heads, ordered for deterministic iteration.
    graphs: BTreeMap<GraphKey, GraphHead>,
    /// The canonical default forwarding chain every graph chain derives from.
    default_chain: InterceptionChain,
    observers: Vec<RevocationObserver>,
}

impl Membrane {
    pub fn new() -> Self {
        Self {
            heap: ObjectHeap::new(),
            identity: IdentityMap::new(),
            origins: HashMap::new(),
            graphs: BTreeMap::new(),
            default_chain: InterceptionChain::new_default(),
            observers: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Object construction surface
    // ------------------------------------------------------------------

    /// Allocates an ordinary keyed object.
    pub fn new_object(&mut self) -> ObjId {
        self.heap.alloc_plain()
    }

    /// Allocates an indexed collection.
    pub fn new_indexed(&mut self) -> ObjId {
        self.heap.alloc_indexed()
    }

    /// Allocates a callable with the given native body.
    pub fn new_callable(&mut self, body: NativeFn) -> ObjId {
        self.heap.alloc_callable(body)
    }

    /// Read-only view of the heap.
    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    /// Shared identity map.
    pub fn identity(&self) -> &IdentityMap {
        &self.identity
    }

    /// Mutable identity map access, for embedders binding identities
    /// established outside the minting path.
    pub fn identity_mut(&mut self) -> &mut IdentityMap {
        &mut self.identity
    }

    // ------------------------------------------------------------------
    // Graph registry
    // ------------------------------------------------------------------

    /// Looks up a graph head, creating it when `create_if_missing`.
    ///
    /// Creation derives the graph's base chain from the membrane's default
    /// forwarding chain. A revoked head stays registered (its key is burnt);
    /// looking it up again returns the revoked head, whose operations fail.
    pub fn get_handler(
        &mut self,
        key: &GraphKey,
        create_if_missing: bool,
    ) -> Result<&mut GraphHead, MembraneError> {
        if !self.graphs.contains_key(key) {
            if !create_if_missing {
                return Err(MembraneError::UnknownGraph(key.clone()));
            }
            let chain = self.default_chain.derive();
            tracing::debug!(graph = %key, "graph head created");
            self.graphs
                .insert(key.clone(), GraphHead::new(key.clone(), chain));
        }
        self.graphs
            .get_mut(key)
            .ok_or_else(|| MembraneError::UnknownGraph(key.clone()))
    }

    /// Read-only head lookup.
    pub fn graph(&self, key: &GraphKey) -> Option<&GraphHead> {
        self.graphs.get(key)
    }

    /// `true` if a head exists under `key` (revoked or not).
    pub fn has_graph(&self, key: &GraphKey) -> bool {
        self.graphs.contains_key(key)
    }

    pub(crate) fn head_ref(&self, key: &GraphKey) -> Result<&GraphHead, MembraneError> {
        self.graphs
            .get(key)
            .ok_or_else(|| MembraneError::UnknownGraph(key.clone()))
    }

    pub(crate) fn head_mut_ref(&mut self, key: &GraphKey) -> Result<&mut GraphHead, MembraneError> {
        self.graphs
            .get_mut(key)
            .ok_or_else(|| MembraneError::UnknownGraph(key.clone()))
    }

    /// Registered graph keys in deterministic order.
    pub fn graph_keys(&self) -> Vec<&GraphKey> {
        self.graphs.keys().collect()
    }

    /// Derives a fresh chain from the membrane's default forwarding chain.
    pub fn derive_default_chain(&self) -> InterceptionChain {
        self.default_chain.derive()
    }

    /// Derives a fresh chain from a graph's own base chain.
    pub fn derive_chain(&self, key: &GraphKey) -> Result<InterceptionChain, MembraneError> {
        let head = self
            .graphs
            .get(key)
            .ok_or_else(|| MembraneError::UnknownGraph(key.clone()))?;
        Ok(head.chain().derive())
    }

    // ------------------------------------------------------------------
    // Conversion and minting
    // ------------------------------------------------------------------

    /// Converts `value` from `source` graph terms into `dest` graph terms.
    ///
    /// Same-graph values and primitives pass through unchanged. An existing
    /// association member under `dest` is returned as-is — this is what
    /// makes conversion idempotent and round trips identity-preserving.
    /// Otherwise a surrogate is minted.
    pub fn value_in_graph(
        &mut self,
        dest: &GraphKey,
        value: Value,
        source: &GraphKey,
    ) -> Result<Value, MembraneError> {
        {
            let head = self
                .graphs
                .get(dest)
                .ok_or_else(|| MembraneError::UnknownGraph(dest.clone()))?;
            if head.is_revoked() {
                return Err(MembraneError::Revoked);
            }
        }
        if !self.graphs.contains_key(source) {
            return Err(MembraneError::UnknownGraph(source.clone()));
        }
        if dest == source {
            return Ok(value);
        }
        let obj = match value.as_obj() {
            Some(id) => id,
            None => return Ok(value),
        };
        if let Some(existing) = self.identity.get(obj, dest) {
            return Ok(Value::Obj(existing));
        }
        let (real, origin) = self.underlying(obj, source)?;
        if origin == *dest {
            // Round trip: the value is native here; hand back the original.
            return Ok(Value::Obj(real));
        }
        let surrogate = self.mint_surrogate(dest, real, &origin)?;
        Ok(Value::Obj(surrogate))
    }

    /// Resolves an object to its real value and origin graph.
    ///
    /// For a surrogate that is its paired real value; for a plain object it
    /// is the object itself, with its origin recorded on first sight.
    fn underlying(
        &mut self,
        obj: ObjId,
        source: &GraphKey,
    ) -> Result<(ObjId, GraphKey), MembraneError> {
        let data = self.heap.object(obj)?;
        if let Some(ps) = &data.proxy {
            if ps.revoked {
                return Err(MembraneError::Revoked);
            }
            let head = self
                .graphs
                .get(&ps.graph)
                .ok_or_else(|| MembraneError::UnknownGraph(ps.graph.clone()))?;
            let target = head
                .target(obj)
                .ok_or(MembraneError::UnknownSurrogate(obj))?;
            Ok((target.real, target.origin.clone()))
        } else if let Some(origin) = self.origins.get(&obj) {
            Ok((obj, origin.clone()))
        } else {
            self.origins.insert(obj, source.clone());
            Ok((obj, source.clone()))
        }
    }

    /// Mints a surrogate for `real` (native to `origin`) inside `dest`.
    ///
    /// Builds the category-tagged shadow, binds the identity association,
    /// registers the surrogate and its revocation record with the head. A
    /// failed bind rolls the shadow allocation back; nothing is left
    /// half-minted.
    pub(crate) fn mint_surrogate(
        &mut self,
        dest: &GraphKey,
        real: ObjId,
        origin: &GraphKey,
    ) -> Result<ObjId, MembraneError> {
        let head = self
            .graphs
            .get(dest)
            .ok_or_else(|| MembraneError::UnknownGraph(dest.clone()))?;
        if head.is_revoked() {
            return Err(MembraneError::Revoked);
        }
        let kind = self.heap.object(real)?.kind;
        let surrogate = self.heap.alloc_shadow(kind, dest.clone());
        if let Err(err) = self.identity.bind(dest, surrogate, origin, real) {
            self.heap.free(surrogate);
            return Err(err);
        }
        self.origins.entry(real).or_insert_with(|| origin.clone());
        if let Some(head) = self.graphs.get_mut(dest) {
            head.register_surrogate(surrogate, real, origin.clone());
        }
        tracing::debug!(
            surrogate = %surrogate,
            real = %real,
            dest = %dest,
            origin = %origin,
            "surrogate minted"
        );
        Ok(surrogate)
    }

    /// The real value behind a surrogate. O(1).
    pub fn real_for_surrogate(&self, surrogate: ObjId) -> Result<ObjId, MembraneError> {
        let data = self.heap.object(surrogate)?;
        let ps = data
            .proxy
            .as_ref()
            .ok_or(MembraneError::UnknownSurrogate(surrogate))?;
        self.graphs
            .get(&ps.graph)
            .and_then(|head| head.real_for_surrogate(surrogate))
            .ok_or(MembraneError::UnknownSurrogate(surrogate))
    }

    /// The graph a real value is native to, if it has ever crossed. O(1).
    pub fn origin_of(&self, real: ObjId) -> Option<&GraphKey> {
        self.origins.get(&real)
    }

    /// `true` if `obj` is a surrogate (revoked or not).
    pub fn is_surrogate(&self, obj: ObjId) -> bool {
        self.heap
            .object(obj)
            .map(|d| d.proxy.is_some())
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Revocation
    // ------------------------------------------------------------------

    /// Revokes an entire graph: one logical step, irreversible.
    ///
    /// Every surrogate the graph has minted is permanently disabled, its
    /// identity bindings under this graph's key are dropped, and all of the
    /// head's tables reset. A second call fails with `AlreadyRevoked`.
    pub fn revoke_all(&mut self, key: &GraphKey) -> Result<(), MembraneError> {
        let head = self
            .graphs
            .get_mut(key)
            .ok_or_else(|| MembraneError::UnknownGraph(key.clone()))?;
        if head.is_revoked() {
            return Err(MembraneError::AlreadyRevoked);
        }
        let surrogates = head.mark_revoked();
        for s in &surrogates {
            if let Ok(data) = self.heap.object_mut(*s) {
                if let Some(ps) = &mut data.proxy {
                    ps.revoked = true;
                }
            }
            self.identity.delete(*s, key);
        }
        tracing::debug!(graph = %key, surrogates = surrogates.len(), "graph revoked");
        let observers = std::mem::take(&mut self.observers);
        for observer in &observers {
            if let Err(err) = observer(key) {
                tracing::debug!(graph = %key, error = %err, "revocation observer failed; discarded");
            }
        }
        self.observers = observers;
        Ok(())
    }

    /// Revokes a single surrogate independently of its graph.
    ///
    /// The surrogate is permanently disabled and its identity binding
    /// dropped; other surrogates of the same graph are untouched. Revoking
    /// the same surrogate twice fails with `AlreadyRevoked`.
    pub fn revoke_surrogate(&mut self, surrogate: ObjId) -> Result<(), MembraneError> {
        let data = self.heap.object_mut(surrogate)?;
        let Some(ps) = data.proxy.as_mut() else {
            return Err(MembraneError::UnknownSurrogate(surrogate));
        };
        if ps.revoked {
            return Err(MembraneError::AlreadyRevoked);
        }
        ps.revoked = true;
        let graph = ps.graph.clone();
        self.identity.delete(surrogate, &graph);
        if let Some(head) = self.graphs.get_mut(&graph) {
            head.unregister_surrogate(surrogate);
        }
        tracing::debug!(surrogate = %surrogate, graph = %graph, "surrogate revoked");
        Ok(())
    }

    /// Registers a revocation observer.
    pub fn on_revocation(&mut self, observer: RevocationObserver) {
        self.observers.push(observer);
    }

    // ------------------------------------------------------------------
    // Chain rebinding
    // ------------------------------------------------------------------

    /// Rebinds a still-valid surrogate to a different interception chain.
    ///
    /// The replacement must derive from the graph's own base chain or from
    /// the membrane's default forwarding chain, else `ChainNotDerived`.
    pub fn replace_surrogate(
        &mut self,
        surrogate: ObjId,
        chain: InterceptionChain,
    ) -> Result<(), MembraneError> {
        let data = self.heap.object(surrogate)?;
        let ps = data
            .proxy
            .as_ref()
            .ok_or(MembraneError::UnknownSurrogate(surrogate))?;
        if ps.revoked {
            return Err(MembraneError::Revoked);
        }
        let graph = ps.graph.clone();
        let head = self
            .graphs
            .get_mut(&graph)
            .ok_or_else(|| MembraneError::UnknownGraph(graph.clone()))?;
        if head.is_revoked() {
            return Err(MembraneError::Revoked);
        }
        if head.target(surrogate).is_none() {
            return Err(MembraneError::UnknownSurrogate(surrogate));
        }
        if !(chain.is_derived_from(head.chain()) || chain.is_derived_from(&self.default_chain)) {
            return Err(MembraneError::ChainNotDerived);
        }
        head.set_override(surrogate, chain);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Intercepted dispatch preamble
    // ------------------------------------------------------------------

    /// Shared front half of every intercepted operation: revocation checks,
    /// real-value resolution, policy match, operation gating, and the list
    /// of applicable chain nodes.
    pub(crate) fn begin(
        &mut self,
        surrogate: ObjId,
        op: OpKind,
    ) -> Result<(OpContext, Vec<Rc<dyn Interceptor>>), MembraneError> {
        let ps = self
            .heap
            .object(surrogate)?
            .proxy
            .clone()
            .ok_or(MembraneError::UnknownSurrogate(surrogate))?;
        if ps.revoked {
            return Err(MembraneError::Revoked);
        }
        let head = self
            .graphs
            .get(&ps.graph)
            .ok_or_else(|| MembraneError::UnknownGraph(ps.graph.clone()))?;
        if head.is_revoked() {
            return Err(MembraneError::Revoked);
        }
        let target = head
            .target(surrogate)
            .cloned()
            .ok_or(MembraneError::UnknownSurrogate(surrogate))?;
        let category = self.heap.object(target.real)?.kind;
        let head = self
            .graphs
            .get(&ps.graph)
            .ok_or_else(|| MembraneError::UnknownGraph(ps.graph.clone()))?;
        let meta = OperationMeta {
            op,
            target: target.real,
            category,
            graph: ps.graph.clone(),
        };
        let config = head.policy().resolve(&meta).cloned();
        if let Some(cfg) = &config {
            if !cfg.allows(op) {
                return Err(MembraneError::OperationDenied { op });
            }
        }
        let nodes = head.chain_for(surrogate).applicable(surrogate);
        Ok((
            OpContext {
                surrogate,
                real: target.real,
                dest: ps.graph,
                origin: target.origin,
                config,
            },
            nodes,
        ))
    }
}

impl Default for Membrane {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PropKey;
    use std::cell::Cell;

    fn wet() -> GraphKey {
        GraphKey::name("wet")
    }

    fn dry() -> GraphKey {
        GraphKey::name("dry")
    }

    /// Membrane with "wet" and "dry" graphs registered.
    fn two_graphs() -> Membrane {
        let mut m = Membrane::new();
        m.get_handler(&wet(), true).unwrap();
        m.get_handler(&dry(), true).unwrap();
        m
    }

    #[test]
    fn get_handler_creates_once() {
        let mut m = Membrane::new();
        assert!(!m.has_graph(&wet()));
        assert!(matches!(
            m.get_handler(&wet(), false),
            Err(MembraneError::UnknownGraph(_))
        ));
        m.get_handler(&wet(), true).unwrap();
        assert!(m.has_graph(&wet()));
        // Second lookup returns the same head rather than replacing it.
        m.get_handler(&wet(), true).unwrap();
        assert_eq!(m.graph_keys().len(), 1);
    }

    #[test]
    fn surrogate_idempotence() {
        let mut m = two_graphs();
        let o = m.new_object();

        let p1 = m.value_in_graph(&dry(), Value::Obj(o), &wet()).unwrap();
        let p2 = m.value_in_graph(&dry(), Value::Obj(o), &wet()).unwrap();
        assert_eq!(p1, p2);
        assert_ne!(p1, Value::Obj(o));
        assert!(m.is_surrogate(p1.as_obj().unwrap()));
    }

    #[test]
    fn same_graph_passthrough() {
        let mut m = two_graphs();
        let o = m.new_object();
        let back = m.value_in_graph(&wet(), Value::Obj(o), &wet()).unwrap();
        assert_eq!(back, Value::Obj(o));
    }

    #[test]
    fn primitives_pass_through() {
        let mut m = two_graphs();
        assert_eq!(
            m.value_in_graph(&dry(), Value::Int(4), &wet()).unwrap(),
            Value::Int(4)
        );
        assert_eq!(
            m.value_in_graph(&dry(), Value::Null, &wet()).unwrap(),
            Value::Null
        );
        assert_eq!(
            m.value_in_graph(&dry(), Value::str("s"), &wet()).unwrap(),
            Value::str("s")
        );
    }

    #[test]
    fn round_trip_returns_original() {
        let mut m = two_graphs();
        let o = m.new_object();
        let p = m.value_in_graph(&dry(), Value::Obj(o), &wet()).unwrap();
        let back = m.value_in_graph(&wet(), p.clone(), &dry()).unwrap();
        assert_eq!(back, Value::Obj(o)); // never a doubly-wrapped surrogate
    }

    #[test]
    fn three_graph_conversion_shares_one_association() {
        let mut m = two_graphs();
        let damp = GraphKey::name("damp");
        m.get_handler(&damp, true).unwrap();

        let o = m.new_object();
        let p_dry = m.value_in_graph(&dry(), Value::Obj(o), &wet()).unwrap();
        // Converting the dry surrogate onward reaches through to the real
        // value rather than wrapping the wrapper.
        let p_damp = m.value_in_graph(&damp, p_dry.clone(), &dry()).unwrap();
        assert_ne!(p_damp, p_dry);
        assert_eq!(m.identity().len(), 1);
        // And back to wet lands on the original.
        let back = m.value_in_graph(&wet(), p_damp, &damp).unwrap();
        assert_eq!(back, Value::Obj(o));
    }

    #[test]
    fn surrogate_keeps_category_tag() {
        fn id_fn(
            _m: &mut Membrane,
            _this: Value,
            args: &[Value],
        ) -> Result<Value, MembraneError> {
            Ok(args.first().cloned().unwrap_or(Value::Null))
        }
        let mut m = two_graphs();
        let f = m.new_callable(id_fn);
        let list = m.new_indexed();

        let pf = m
            .value_in_graph(&dry(), Value::Obj(f), &wet())
            .unwrap()
            .as_obj()
            .unwrap();
        let pl = m
            .value_in_graph(&dry(), Value::Obj(list), &wet())
            .unwrap()
            .as_obj()
            .unwrap();
        assert_eq!(
            m.heap().object(pf).unwrap().kind,
            crate::value::ObjectKind::Callable
        );
        assert_eq!(
            m.heap().object(pl).unwrap().kind,
            crate::value::ObjectKind::Indexed
        );
    }

    #[test]
    fn unknown_graph_is_rejected() {
        let mut m = Membrane::new();
        m.get_handler(&wet(), true).unwrap();
        let o = m.new_object();
        assert!(matches!(
            m.value_in_graph(&dry(), Value::Obj(o), &wet()),
            Err(MembraneError::UnknownGraph(_))
        ));
        assert!(matches!(
            m.value_in_graph(&wet(), Value::Obj(o), &dry()),
            Err(MembraneError::UnknownGraph(_))
        ));
    }

    #[test]
    fn revoke_all_disables_minting_and_conversion() {
        let mut m = two_graphs();
        let o = m.new_object();
        let p = m.value_in_graph(&dry(), Value::Obj(o), &wet()).unwrap();

        m.revoke_all(&dry()).unwrap();
        assert_eq!(
            m.value_in_graph(&dry(), Value::Obj(o), &wet()),
            Err(MembraneError::Revoked)
        );
        // The old surrogate's identity binding is gone.
        assert!(m.identity().is_empty());
        // Converting the dead surrogate anywhere fails.
        let damp = GraphKey::name("damp");
        m.get_handler(&damp, true).unwrap();
        assert_eq!(
            m.value_in_graph(&damp, p, &dry()),
            Err(MembraneError::Revoked)
        );
    }

    #[test]
    fn revoke_all_twice_fails() {
        let mut m = two_graphs();
        m.revoke_all(&dry()).unwrap();
        assert_eq!(m.revoke_all(&dry()), Err(MembraneError::AlreadyRevoked));
    }

    #[test]
    fn revoke_surrogate_is_independent_of_its_graph() {
        let mut m = two_graphs();
        let a = m.new_object();
        let b = m.new_object();
        let pa = m
            .value_in_graph(&dry(), Value::Obj(a), &wet())
            .unwrap()
            .as_obj()
            .unwrap();
        let pb = m
            .value_in_graph(&dry(), Value::Obj(b), &wet())
            .unwrap()
            .as_obj()
            .unwrap();

        m.revoke_surrogate(pa).unwrap();
        assert_eq!(m.revoke_surrogate(pa), Err(MembraneError::AlreadyRevoked));
        assert_eq!(m.get(pa, &PropKey::name("x")), Err(MembraneError::Revoked));

        // The sibling surrogate and the graph itself still work.
        m.define_data(b, PropKey::name("x"), Value::Int(1)).unwrap();
        assert_eq!(m.get(pb, &PropKey::name("x")).unwrap(), Value::Int(1));
        // A fresh surrogate can be minted for the revoked pairing.
        let pa2 = m.value_in_graph(&dry(), Value::Obj(a), &wet()).unwrap();
        assert_ne!(pa2, Value::Obj(pa));
    }

    #[test]
    fn revocation_observers_run_best_effort() {
        thread_local! {
            static CALLS: Cell<u32> = const { Cell::new(0) };
        }
        let mut m = two_graphs();
        m.on_revocation(Box::new(|_key| {
            CALLS.with(|c| c.set(c.get() + 1));
            Err("observer exploded".into())
        }));
        m.on_revocation(Box::new(|_key| {
            CALLS.with(|c| c.set(c.get() + 1));
            Ok(())
        }));
        // The first observer's failure is discarded; revocation still
        // succeeds and the second observer still runs.
        m.revoke_all(&dry()).unwrap();
        assert_eq!(CALLS.with(|c| c.get()), 2);
    }

    #[test]
    fn replace_surrogate_requires_derived_chain() {
        let mut m = two_graphs();
        let o = m.new_object();
        let p = m
            .value_in_graph(&dry(), Value::Obj(o), &wet())
            .unwrap()
            .as_obj()
            .unwrap();

        // A chain fabricated from scratch shares no lineage.
        let foreign = InterceptionChain::new_default();
        assert_eq!(
            m.replace_surrogate(p, foreign),
            Err(MembraneError::ChainNotDerived)
        );

        // Chains derived from the graph's own chain or the default are fine.
        let owned = m.derive_chain(&dry()).unwrap();
        m.replace_surrogate(p, owned).unwrap();
        let default_derived = m.derive_default_chain();
        m.replace_surrogate(p, default_derived).unwrap();

        // Plain objects are not surrogates.
        let chain = m.derive_default_chain();
        assert_eq!(
            m.replace_surrogate(o, chain),
            Err(MembraneError::UnknownSurrogate(o))
        );
    }

    #[test]
    fn real_for_surrogate_resolves() {
        let mut m = two_graphs();
        let o = m.new_object();
        let p = m
            .value_in_graph(&dry(), Value::Obj(o), &wet())
            .unwrap()
            .as_obj()
            .unwrap();
        assert_eq!(m.real_for_surrogate(p).unwrap(), o);
        assert_eq!(m.origin_of(o), Some(&wet()));
        assert!(m.real_for_surrogate(o).is_err());
    }
}
