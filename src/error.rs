//! Error taxonomy for membrane operations.
//!
//! Every error is a synchronous, unrecovered return: an operation either
//! fully succeeds or fails leaving all prior state unchanged. Nothing here
//! is retried or swallowed internally; the one exception is observer fan-out
//! after a revocation, where observer failures are logged and discarded so a
//! failing observer cannot mask the authoritative outcome.

use crate::distortion::OpKind;
use crate::value::{GraphKey, ObjId};
use thiserror::Error;

/// Errors surfaced by membrane operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MembraneError {
    /// Merging two identity associations would duplicate a graph key.
    #[error("identity conflict: graph key {key} appears in both associations")]
    IdentityConflict { key: GraphKey },

    /// A graph key already maps to a different value inside an association.
    #[error("identity mismatch: graph key {key} is already bound to a different value")]
    IdentityMismatch { key: GraphKey },

    /// The graph or surrogate has been torn down.
    #[error("operation on a revoked graph or surrogate")]
    Revoked,

    /// Revocation was requested a second time.
    #[error("already revoked")]
    AlreadyRevoked,

    /// The registry does not own a graph under this key.
    #[error("unknown graph: {0}")]
    UnknownGraph(GraphKey),

    /// The value is not a surrogate the registry owns.
    #[error("unknown surrogate: {0}")]
    UnknownSurrogate(ObjId),

    /// The handle does not refer to a live object.
    #[error("not a live object: {0}")]
    NotAnObject(ObjId),

    /// Invocation of a value that is not callable.
    #[error("value {0} is not callable")]
    NotCallable(ObjId),

    /// Chain splice referenced a node name that does not exist.
    #[error("unknown interception node: {0:?}")]
    UnknownNode(String),

    /// Attempt to delete, redefine, or splice past a protected chain node.
    #[error("interception node {0:?} is protected")]
    ProtectedNode(String),

    /// Chain splice would duplicate a node name.
    #[error("interception node {0:?} already exists in this chain")]
    DuplicateNode(String),

    /// A replacement chain does not derive from the graph's own chain or the
    /// default forwarding chain.
    #[error("replacement chain is not derived from an owned or default chain")]
    ChainNotDerived,

    /// The matched distortion config does not list this operation as active.
    #[error("operation {op:?} denied by distortion policy")]
    OperationDenied { op: OpKind },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = MembraneError::UnknownGraph(GraphKey::name("dry"));
        assert_eq!(err.to_string(), "unknown graph: dry");

        let err = MembraneError::IdentityConflict {
            key: GraphKey::name("wet"),
        };
        assert!(err.to_string().contains("wet"));
    }
}
