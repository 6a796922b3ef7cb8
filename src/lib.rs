//! Osmose: an identity-preserving membrane between isolated object graphs.
//!
//! This crate implements a virtualization membrane: values native to one
//! object graph are only ever seen by another graph through surrogates the
//! membrane mints, and every primitive operation on a surrogate is routed
//! through an explicit interception chain before it may reach the real
//! value. The membrane provides:
//! - A central registry of graph heads with surrogate minting and a shared
//!   identity map guaranteeing at most one surrogate per (value, graph) pair.
//! - Thirteen intercepted primitive operations with default forwarding and
//!   bidirectional value conversion.
//! - Irreversible revocation, graph-wide or per surrogate.
//! - A declarative distortion policy altering visibility, locality, and
//!   operation availability per matched target.
//!
//! # Name Origin: "Osmose"
//!
//! Osmosis moves material through a selectively permeable boundary: some
//! things cross freely, some cross transformed, some never cross at all.
//! The membrane here behaves the same way toward object references, hence
//! the name.
//!
//! # References
//!
//! - Miller, M. "Robust Composition" (2006), Chapter 9 – membranes and
//!   attenuated authority
//! - Van Cutsem, T., Miller, M. "Trustworthy Proxies: Virtualizing Objects
//!   with Invariants" (ECOOP 2013) – the fixed set of fundamental operations
//! - Gamma et al. "Design Patterns" (1994) – Chain of Responsibility
//!
//! # Example
//!
//! ```
//! use osmose::prelude::*;
//!
//! let mut m = Membrane::new();
//! let wet = GraphKey::name("wet");
//! let dry = GraphKey::name("dry");
//! m.get_handler(&wet, true).unwrap();
//! m.get_handler(&dry, true).unwrap();
//!
//! let o = m.new_object();
//! m.define_data(o, PropKey::name("x"), Value::Int(1)).unwrap();
//!
//! let p = m.value_in_graph(&dry, Value::Obj(o), &wet).unwrap();
//! let p = p.as_obj().unwrap();
//! assert_eq!(m.get(p, &PropKey::name("x")).unwrap(), Value::Int(1));
//! ```

pub mod arena;
pub mod chain;
pub mod distortion;
pub mod error;
pub mod graph;
pub mod heap;
pub mod identity;
pub mod operations;
pub mod registry;
pub mod value;

pub use chain::{Flow, InterceptionChain, Interceptor, OpContext, HEAD_NODE, TAIL_NODE};
pub use distortion::{
    ArgTruncation, DistortionConfig, DistortionPolicy, OpKind, OperationMeta, PolicyWarning,
    RuleAction, RuleMatcher, ALL_OPS,
};
pub use error::MembraneError;
pub use graph::GraphHead;
pub use identity::IdentityMap;
pub use registry::{Membrane, RevocationObserver};
pub use value::{GraphKey, NativeFn, ObjId, ObjectKind, PropKey, PropertyDescriptor, Value};

/// Prelude for convenient usage.
pub mod prelude {
    pub use crate::chain::{Flow, InterceptionChain, Interceptor, OpContext, HEAD_NODE, TAIL_NODE};
    pub use crate::distortion::{
        ArgTruncation, DistortionConfig, DistortionPolicy, OpKind, RuleAction, RuleMatcher,
    };
    pub use crate::error::MembraneError;
    pub use crate::graph::GraphHead;
    pub use crate::registry::Membrane;
    pub use crate::value::{GraphKey, ObjId, ObjectKind, PropKey, PropertyDescriptor, Value};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    /// End to end: a wet-side document exposed to a dry sandbox with a
    /// distortion hiding one key and denying writes, then torn down.
    #[test]
    fn sandboxed_document() {
        let mut m = Membrane::new();
        let wet = GraphKey::name("wet");
        let dry = GraphKey::name("dry");
        m.get_handler(&wet, true).unwrap();
        m.get_handler(&dry, true).unwrap();

        let doc = m.new_object();
        m.define_data(doc, PropKey::name("title"), Value::str("notes"))
            .unwrap();
        m.define_data(doc, PropKey::name("token"), Value::str("s3cret"))
            .unwrap();

        let cfg = DistortionConfig {
            active_ops: vec![OpKind::Read, OpKind::Has, OpKind::Enumerate],
            key_filter: Some(vec![PropKey::name("title")]),
            ..DistortionConfig::default()
        };
        m.get_handler(&dry, true)
            .unwrap()
            .policy_mut()
            .add_rule(RuleMatcher::ByValue(doc), RuleAction::Apply(cfg));

        let p = m
            .value_in_graph(&dry, Value::Obj(doc), &wet)
            .unwrap()
            .as_obj()
            .unwrap();
        assert_eq!(
            m.get(p, &PropKey::name("title")).unwrap(),
            Value::str("notes")
        );
        assert_eq!(m.own_keys(p).unwrap(), vec![PropKey::name("title")]);
        assert!(!m.has(p, &PropKey::name("token")).unwrap());
        assert_eq!(
            m.set(p, &PropKey::name("title"), Value::str("defaced")),
            Err(MembraneError::OperationDenied { op: OpKind::Write })
        );

        m.revoke_all(&dry).unwrap();
        assert_eq!(
            m.get(p, &PropKey::name("title")),
            Err(MembraneError::Revoked)
        );
        // The wet side keeps working untouched.
        assert_eq!(
            m.get(doc, &PropKey::name("token")).unwrap(),
            Value::str("s3cret")
        );
    }

    /// Identity survives arbitrary crossings among three graphs.
    #[test]
    fn identity_across_three_graphs() {
        let mut m = Membrane::new();
        let keys: Vec<GraphKey> = ["a", "b", "c"].iter().map(|k| GraphKey::name(*k)).collect();
        for k in &keys {
            m.get_handler(k, true).unwrap();
        }

        let o = m.new_object();
        let in_b = m.value_in_graph(&keys[1], Value::Obj(o), &keys[0]).unwrap();
        let in_c = m.value_in_graph(&keys[2], in_b.clone(), &keys[1]).unwrap();
        let home = m.value_in_graph(&keys[0], in_c.clone(), &keys[2]).unwrap();

        assert_eq!(home, Value::Obj(o));
        assert_eq!(
            m.value_in_graph(&keys[1], in_c, &keys[2]).unwrap(),
            in_b
        );
    }
}
