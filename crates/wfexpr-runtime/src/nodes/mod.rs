//! Executable graph nodes.
//!
//! The converter produces two kinds of node:
//! - [`ValueNode`]s compute a value
//! - [`LocationNode`]s resolve an assignable [`Location`](crate::location::Location)
//!
//! Nodes are immutable after conversion and may be evaluated concurrently
//! from any number of threads. Every node carries a [`NodeInfo`] and lists
//! its children so graphs can be inspected (see [`crate::inspect`]).

pub mod args;
pub mod array;
pub mod call;
pub mod literal;
pub mod member;
pub mod operator;
pub mod symbol;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use wfexpr_core::error::RuntimeError;
use wfexpr_core::id::NodeId;
use wfexpr_core::type_id::TypeId;
use wfexpr_core::value::Value;

use crate::context::ExecutionContext;
use crate::location::{BoxedLocation, Owner};

pub use args::{Argument, ArgumentList, Binding, PreparedArguments};
pub use array::{ArrayItemReference, ArrayItemValue};
pub use call::{InvokeCallable, InvokeMethod, New, NewArray, NewArrayInit};
pub use literal::Literal;
pub use member::{FieldReference, FieldValue, PropertyReference, PropertyValue};
pub use operator::{BinaryOperator, ShortCircuit, UnaryOperator};
pub use symbol::{SymbolReference, SymbolValue};

/// Descriptive metadata of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    /// Node kind, e.g. `"BinaryOperator"`.
    pub kind: String,
    pub result_type: TypeId,
    /// Kind-specific detail: operator, member name, literal text.
    pub detail: Option<String>,
}

impl NodeInfo {
    pub fn new(id: NodeId, kind: impl Into<String>, result_type: TypeId) -> Self {
        NodeInfo {
            id,
            kind: kind.into(),
            result_type,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

pub trait ValueNode: Send + Sync {
    fn info(&self) -> &NodeInfo;

    fn children(&self) -> Vec<Child> {
        Vec::new()
    }

    fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError>;

    fn result_type(&self) -> TypeId {
        self.info().result_type
    }
}

pub trait LocationNode: Send + Sync {
    fn info(&self) -> &NodeInfo;

    fn children(&self) -> Vec<Child> {
        Vec::new()
    }

    /// Resolves the cell. Owners and index values are evaluated here, once.
    fn resolve(&self, ctx: &dyn ExecutionContext) -> Result<BoxedLocation, RuntimeError>;

    fn result_type(&self) -> TypeId {
        self.info().result_type
    }
}

pub type ValueRef = Arc<dyn ValueNode>;
pub type LocationRef = Arc<dyn LocationNode>;

/// Either kind of node, as seen by introspection.
#[derive(Clone)]
pub enum NodeRef {
    Value(ValueRef),
    Location(LocationRef),
}

impl NodeRef {
    pub fn info(&self) -> &NodeInfo {
        match self {
            NodeRef::Value(n) => n.info(),
            NodeRef::Location(n) => n.info(),
        }
    }

    pub fn children(&self) -> Vec<Child> {
        match self {
            NodeRef::Value(n) => n.children(),
            NodeRef::Location(n) => n.children(),
        }
    }
}

impl std::fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = self.info();
        write!(f, "{}#{}", info.kind, info.id)
    }
}

/// A labelled child edge.
#[derive(Debug, Clone)]
pub struct Child {
    pub role: String,
    pub node: NodeRef,
}

impl Child {
    pub fn value(role: impl Into<String>, node: &ValueRef) -> Self {
        Child {
            role: role.into(),
            node: NodeRef::Value(Arc::clone(node)),
        }
    }

    pub fn location(role: impl Into<String>, node: &LocationRef) -> Self {
        Child {
            role: role.into(),
            node: NodeRef::Location(Arc::clone(node)),
        }
    }
}

/// How a member node obtains its owner.
#[derive(Clone)]
pub enum OwnerNode {
    /// Static member.
    Static,
    /// Reference-type owner, or a value-type owner that is only read.
    Value(ValueRef),
    /// Value-type owner that must receive copy-back.
    Location(LocationRef),
}

impl OwnerNode {
    /// Owner for a location: value-type owners stay locations.
    pub fn resolve(&self, ctx: &dyn ExecutionContext) -> Result<Owner, RuntimeError> {
        match self {
            OwnerNode::Static => Ok(Owner::Static),
            OwnerNode::Value(node) => Ok(Owner::Shared(node.evaluate(ctx)?)),
            OwnerNode::Location(node) => Ok(Owner::ValueType(node.resolve(ctx)?)),
        }
    }

    /// Current owner value; `None` for static members.
    pub fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<Option<Value>, RuntimeError> {
        match self {
            OwnerNode::Static => Ok(None),
            OwnerNode::Value(node) => node.evaluate(ctx).map(Some),
            OwnerNode::Location(node) => node.resolve(ctx)?.get(ctx).map(Some),
        }
    }

    pub fn child(&self) -> Option<Child> {
        match self {
            OwnerNode::Static => None,
            OwnerNode::Value(node) => Some(Child::value("owner", node)),
            OwnerNode::Location(node) => Some(Child::location("owner", node)),
        }
    }
}

/// Reads an integer index operand.
pub(crate) fn index_value(value: &Value) -> Result<i64, RuntimeError> {
    value.as_i64().ok_or_else(|| RuntimeError::TypeMismatch {
        expected: "integer index".into(),
        got: value.type_name().to_string(),
    })
}
