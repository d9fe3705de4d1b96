//! Stable ID newtypes for registry and graph entities.
//!
//! All IDs are distinct newtype wrappers over integers, providing type safety
//! so that a `MemberId` cannot be accidentally used where a `NodeId` is expected.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Identifier of a converted graph node. Assigned by the converter in
/// creation order and used by introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Member descriptor identity within one [`TypeRegistry`](crate::TypeRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(pub u32);

/// Process-unique identity of a type registry.
///
/// Member ids are only unique inside a registry, so anything keyed by a
/// member descriptor across registries (the invocation cache, operator slots)
/// pairs the member id with its registry id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryId(pub u64);

impl RegistryId {
    /// Allocates the next process-unique registry id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        RegistryId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Workflow variable identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableId(pub u32);

/// Activity argument identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArgumentId(pub u32);

/// Delegate argument identity (parameters of an activity delegate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelegateArgumentId(pub u32);

/// A reference to one named storage slot owned by the surrounding runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolRef {
    Variable(VariableId),
    Argument(ArgumentId),
    DelegateArgument(DelegateArgumentId),
}

impl SymbolRef {
    /// Human-readable kind of the referenced slot.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SymbolRef::Variable(_) => "variable",
            SymbolRef::Argument(_) => "argument",
            SymbolRef::DelegateArgument(_) => "delegate argument",
        }
    }
}

// Display implementations -- just print the inner value.

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolRef::Variable(id) => write!(f, "variable {}", id.0),
            SymbolRef::Argument(id) => write!(f, "argument {}", id.0),
            SymbolRef::DelegateArgument(id) => write!(f, "delegate argument {}", id.0),
        }
    }
}

// Bridge between NodeId and petgraph's NodeIndex<u32>.

impl From<NodeIndex<u32>> for NodeId {
    fn from(idx: NodeIndex<u32>) -> Self {
        NodeId(idx.index() as u32)
    }
}

impl From<NodeId> for NodeIndex<u32> {
    fn from(id: NodeId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_to_node_index_roundtrip() {
        let idx = NodeIndex::<u32>::new(42);
        let node_id = NodeId::from(idx);
        assert_eq!(node_id.0, 42);

        let back: NodeIndex<u32> = node_id.into();
        assert_eq!(back.index(), 42);
    }

    #[test]
    fn registry_ids_are_unique() {
        let a = RegistryId::next();
        let b = RegistryId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn symbol_display_names_the_kind() {
        assert_eq!(
            format!("{}", SymbolRef::Variable(VariableId(3))),
            "variable 3"
        );
        assert_eq!(
            format!("{}", SymbolRef::DelegateArgument(DelegateArgumentId(0))),
            "delegate argument 0"
        );
    }

    #[test]
    fn symbol_serde_roundtrip() {
        let sym = SymbolRef::Argument(ArgumentId(7));
        let json = serde_json::to_string(&sym).unwrap();
        let back: SymbolRef = serde_json::from_str(&json).unwrap();
        assert_eq!(sym, back);
    }
}
