//! Interception chains: ordered, named sequences of operation handlers.
//!
//! The host language has no engine-level interception facility, so the
//! chain is an explicit interface: one method per primitive operation,
//! implemented by strategy objects composed statically at construction time
//! (never by runtime class decoration). A node may answer an operation
//! itself (`Flow::Done`, short-circuiting the chain) or decline
//! (`Flow::Continue`), passing the call to the next node. Every chain ends
//! with a protected tail that forwards into the next graph with
//! bidirectional value conversion.
//!
//! Dispatch is fully synchronous. A node that triggers further intercepted
//! operations reenters the membrane on the same call stack; that is ordinary
//! recursion, not concurrency.
//!
//! # Citations
//! - Van Cutsem & Miller, "Trustworthy Proxies" (ECOOP 2013) – handler
//!   interface per fundamental operation
//! - Gamma et al., "Design Patterns" (1994) – Chain of Responsibility

use crate::distortion::DistortionConfig;
use crate::error::MembraneError;
use crate::registry::Membrane;
use crate::value::{GraphKey, ObjId, PropKey, PropertyDescriptor, Value};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Reserved name of the leading no-op node.
pub const HEAD_NODE: &str = "head";
/// Reserved name of the trailing default-forwarding node.
pub const TAIL_NODE: &str = "tail";

/// Outcome of one node's look at an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow<T> {
    /// Not handled here; ask the next node.
    Continue,
    /// Answered; the chain walk stops.
    Done(T),
}

/// Per-operation context handed to every node.
///
/// Arguments arrive in destination-graph terms; `Membrane::value_in_graph`
/// converts in either direction when a node forwards or fabricates values.
#[derive(Debug, Clone)]
pub struct OpContext {
    /// The surrogate the operation was performed on.
    pub surrogate: ObjId,
    /// The paired real value.
    pub real: ObjId,
    /// Graph the surrogate (and the caller) belongs to.
    pub dest: GraphKey,
    /// Graph the real value belongs to.
    pub origin: GraphKey,
    /// Distortion configuration matched for this operation, if any.
    pub config: Option<DistortionConfig>,
}

/// One method per primitive operation; all default to `Continue`.
///
/// Implementations are immutable strategy objects shared via `Rc`; any state
/// they need lives in the membrane (e.g. surrogate-local storage) or in the
/// node itself at construction time.
#[allow(unused_variables)]
pub trait Interceptor {
    fn read(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        key: &PropKey,
        receiver: &Value,
    ) -> Result<Flow<Value>, MembraneError> {
        Ok(Flow::Continue)
    }

    fn write(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        key: &PropKey,
        value: &Value,
        receiver: &Value,
    ) -> Result<Flow<bool>, MembraneError> {
        Ok(Flow::Continue)
    }

    fn delete(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        key: &PropKey,
    ) -> Result<Flow<bool>, MembraneError> {
        Ok(Flow::Continue)
    }

    fn enumerate(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
    ) -> Result<Flow<Vec<PropKey>>, MembraneError> {
        Ok(Flow::Continue)
    }

    fn descriptor(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        key: &PropKey,
    ) -> Result<Flow<Option<PropertyDescriptor>>, MembraneError> {
        Ok(Flow::Continue)
    }

    fn define(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        key: &PropKey,
        desc: &PropertyDescriptor,
    ) -> Result<Flow<bool>, MembraneError> {
        Ok(Flow::Continue)
    }

    fn prototype(&self, m: &mut Membrane, cx: &OpContext) -> Result<Flow<Value>, MembraneError> {
        Ok(Flow::Continue)
    }

    fn set_prototype(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        proto: &Value,
    ) -> Result<Flow<bool>, MembraneError> {
        Ok(Flow::Continue)
    }

    fn is_extensible(&self, m: &mut Membrane, cx: &OpContext) -> Result<Flow<bool>, MembraneError> {
        Ok(Flow::Continue)
    }

    fn prevent_extensions(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
    ) -> Result<Flow<bool>, MembraneError> {
        Ok(Flow::Continue)
    }

    fn invoke(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        this: &Value,
        args: &[Value],
    ) -> Result<Flow<Value>, MembraneError> {
        Ok(Flow::Continue)
    }

    fn construct(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        args: &[Value],
    ) -> Result<Flow<Value>, MembraneError> {
        Ok(Flow::Continue)
    }

    fn has(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        key: &PropKey,
    ) -> Result<Flow<bool>, MembraneError> {
        Ok(Flow::Continue)
    }
}

/// The leading no-op node: declines every operation.
#[derive(Debug, Default)]
pub struct Passthrough;

impl Interceptor for Passthrough {}

/// The trailing node: answers every operation by default forwarding into the
/// origin graph (with bidirectional conversion), applying the matched
/// distortion configuration along the way.
#[derive(Debug, Default)]
pub struct ForwardingTail;

impl Interceptor for ForwardingTail {
    fn read(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        key: &PropKey,
        receiver: &Value,
    ) -> Result<Flow<Value>, MembraneError> {
        Ok(Flow::Done(m.forward_read(cx, key, receiver)?))
    }

    fn write(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        key: &PropKey,
        value: &Value,
        receiver: &Value,
    ) -> Result<Flow<bool>, MembraneError> {
        Ok(Flow::Done(m.forward_write(cx, key, value, receiver)?))
    }

    fn delete(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        key: &PropKey,
    ) -> Result<Flow<bool>, MembraneError> {
        Ok(Flow::Done(m.forward_delete(cx, key)?))
    }

    fn enumerate(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
    ) -> Result<Flow<Vec<PropKey>>, MembraneError> {
        Ok(Flow::Done(m.forward_enumerate(cx)?))
    }

    fn descriptor(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        key: &PropKey,
    ) -> Result<Flow<Option<PropertyDescriptor>>, MembraneError> {
        Ok(Flow::Done(m.forward_descriptor(cx, key)?))
    }

    fn define(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        key: &PropKey,
        desc: &PropertyDescriptor,
    ) -> Result<Flow<bool>, MembraneError> {
        Ok(Flow::Done(m.forward_define(cx, key, desc)?))
    }

    fn prototype(&self, m: &mut Membrane, cx: &OpContext) -> Result<Flow<Value>, MembraneError> {
        Ok(Flow::Done(m.forward_prototype(cx)?))
    }

    fn set_prototype(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        proto: &Value,
    ) -> Result<Flow<bool>, MembraneError> {
        Ok(Flow::Done(m.forward_set_prototype(cx, proto)?))
    }

    fn is_extensible(&self, m: &mut Membrane, cx: &OpContext) -> Result<Flow<bool>, MembraneError> {
        Ok(Flow::Done(m.forward_is_extensible(cx)?))
    }

    fn prevent_extensions(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
    ) -> Result<Flow<bool>, MembraneError> {
        Ok(Flow::Done(m.forward_prevent_extensions(cx)?))
    }

    fn invoke(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        this: &Value,
        args: &[Value],
    ) -> Result<Flow<Value>, MembraneError> {
        Ok(Flow::Done(m.forward_invoke(cx, this, args)?))
    }

    fn construct(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        args: &[Value],
    ) -> Result<Flow<Value>, MembraneError> {
        Ok(Flow::Done(m.forward_construct(cx, args)?))
    }

    fn has(
        &self,
        m: &mut Membrane,
        cx: &OpContext,
        key: &PropKey,
    ) -> Result<Flow<bool>, MembraneError> {
        Ok(Flow::Done(m.forward_has(cx, key)?))
    }
}

/// One named position in a chain.
#[derive(Clone)]
pub struct ChainEntry {
    name: String,
    node: Rc<dyn Interceptor>,
    /// `None` applies graph-wide; `Some` scopes the node to one surrogate.
    filter: Option<ObjId>,
    /// Protected entries cannot be removed or redefined once linked.
    protected: bool,
}

impl ChainEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }
}

static NEXT_CHAIN_ID: AtomicU64 = AtomicU64::new(0);

fn fresh_chain_id() -> u64 {
    NEXT_CHAIN_ID.fetch_add(1, Ordering::Relaxed)
}

/// An ordered, named interception chain with lineage tracking.
///
/// Lineage records every ancestor chain id; `Membrane::replace_surrogate`
/// uses it to require that a replacement chain derives from the default
/// forwarding chain or a chain the graph already owns.
#[derive(Clone)]
pub struct InterceptionChain {
    id: u64,
    lineage: Vec<u64>,
    entries: Vec<ChainEntry>,
}

impl InterceptionChain {
    /// A fresh default chain: protected head (no-op) and tail (forwarding).
    pub fn new_default() -> Self {
        let id = fresh_chain_id();
        Self {
            id,
            lineage: vec![id],
            entries: vec![
                ChainEntry {
                    name: HEAD_NODE.to_string(),
                    node: Rc::new(Passthrough),
                    filter: None,
                    protected: true,
                },
                ChainEntry {
                    name: TAIL_NODE.to_string(),
                    node: Rc::new(ForwardingTail),
                    filter: None,
                    protected: true,
                },
            ],
        }
    }

    /// Derives a child chain: same entries, new identity, extended lineage.
    pub fn derive(&self) -> Self {
        let id = fresh_chain_id();
        let mut lineage = self.lineage.clone();
        lineage.push(id);
        Self {
            id,
            lineage,
            entries: self.entries.clone(),
        }
    }

    /// `true` if `ancestor` appears in this chain's lineage (including
    /// itself).
    pub fn is_derived_from(&self, ancestor: &InterceptionChain) -> bool {
        self.lineage.contains(&ancestor.id)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Splices a node into the chain directly after `after`.
    ///
    /// `filter` scopes the node to a single surrogate; `None` applies it to
    /// every surrogate of the graph. Splicing after the tail is rejected —
    /// nothing past default forwarding is ever reached.
    pub fn insert_node(
        &mut self,
        after: &str,
        name: impl Into<String>,
        node: Rc<dyn Interceptor>,
        filter: Option<ObjId>,
    ) -> Result<(), MembraneError> {
        let name = name.into();
        if self.position(&name).is_some() {
            return Err(MembraneError::DuplicateNode(name));
        }
        let at = self
            .position(after)
            .ok_or_else(|| MembraneError::UnknownNode(after.to_string()))?;
        if after == TAIL_NODE {
            return Err(MembraneError::ProtectedNode(TAIL_NODE.to_string()));
        }
        self.entries.insert(
            at + 1,
            ChainEntry {
                name,
                node,
                filter,
                protected: false,
            },
        );
        Ok(())
    }

    /// Removes a non-protected node by name.
    pub fn remove_node(&mut self, name: &str) -> Result<(), MembraneError> {
        let at = self
            .position(name)
            .ok_or_else(|| MembraneError::UnknownNode(name.to_string()))?;
        if self.entries[at].protected {
            return Err(MembraneError::ProtectedNode(name.to_string()));
        }
        self.entries.remove(at);
        Ok(())
    }

    /// Replaces a non-protected node's implementation in place.
    pub fn replace_node(
        &mut self,
        name: &str,
        node: Rc<dyn Interceptor>,
    ) -> Result<(), MembraneError> {
        let at = self
            .position(name)
            .ok_or_else(|| MembraneError::UnknownNode(name.to_string()))?;
        if self.entries[at].protected {
            return Err(MembraneError::ProtectedNode(name.to_string()));
        }
        self.entries[at].node = node;
        Ok(())
    }

    /// Node names in chain order.
    pub fn node_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Nodes applicable to `surrogate`, in chain order.
    pub(crate) fn applicable(&self, surrogate: ObjId) -> Vec<Rc<dyn Interceptor>> {
        self.entries
            .iter()
            .filter(|e| e.filter.is_none() || e.filter == Some(surrogate))
            .map(|e| Rc::clone(&e.node))
            .collect()
    }
}

impl Default for InterceptionChain {
    fn default() -> Self {
        Self::new_default()
    }
}

impl std::fmt::Debug for InterceptionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptionChain")
            .field("id", &self.id)
            .field("nodes", &self.node_names())
            .finish()
    }
}
