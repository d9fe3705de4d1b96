//! Field, property and custom indexer nodes.
//!
//! A property node with index operands is a custom indexer: the getter gets
//! the index values, the setter the index values followed by the new value.

use std::sync::Arc;

use smallvec::SmallVec;

use wfexpr_core::error::RuntimeError;
use wfexpr_core::member::FieldStorage;
use wfexpr_core::value::Value;

use super::{ArgumentList, Child, LocationNode, NodeInfo, OwnerNode, ValueNode};
use crate::context::ExecutionContext;
use crate::invoke::MethodHandle;
use crate::location::{read_field, BoxedLocation, FieldLocation, PropertyLocation};

pub struct FieldValue {
    info: NodeInfo,
    name: String,
    storage: FieldStorage,
    owner: OwnerNode,
}

impl FieldValue {
    pub fn new(info: NodeInfo, name: impl Into<String>, storage: FieldStorage, owner: OwnerNode) -> Self {
        FieldValue {
            info,
            name: name.into(),
            storage,
            owner,
        }
    }
}

impl ValueNode for FieldValue {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn children(&self) -> Vec<Child> {
        self.owner.child().into_iter().collect()
    }

    fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        match &self.storage {
            FieldStorage::Static(cell) => Ok(cell.read().clone()),
            FieldStorage::Instance { slot } => match self.owner.evaluate(ctx)? {
                Some(owner) => read_field(&owner, *slot, &self.name),
                None => Err(RuntimeError::NullOwner {
                    member: self.name.clone(),
                }),
            },
        }
    }
}

pub struct FieldReference {
    info: NodeInfo,
    name: String,
    storage: FieldStorage,
    owner: OwnerNode,
}

impl FieldReference {
    pub fn new(info: NodeInfo, name: impl Into<String>, storage: FieldStorage, owner: OwnerNode) -> Self {
        FieldReference {
            info,
            name: name.into(),
            storage,
            owner,
        }
    }
}

impl LocationNode for FieldReference {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn children(&self) -> Vec<Child> {
        self.owner.child().into_iter().collect()
    }

    fn resolve(&self, ctx: &dyn ExecutionContext) -> Result<BoxedLocation, RuntimeError> {
        let owner = self.owner.resolve(ctx)?;
        Ok(Box::new(FieldLocation::new(
            self.name.clone(),
            self.info.result_type,
            self.storage.clone(),
            owner,
        )))
    }
}

/// Property or custom indexer read.
pub struct PropertyValue {
    info: NodeInfo,
    getter: Arc<MethodHandle>,
    owner: OwnerNode,
    indices: ArgumentList,
}

impl PropertyValue {
    pub fn new(info: NodeInfo, getter: Arc<MethodHandle>, owner: OwnerNode, indices: ArgumentList) -> Self {
        PropertyValue {
            info,
            getter,
            owner,
            indices,
        }
    }
}

impl ValueNode for PropertyValue {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn children(&self) -> Vec<Child> {
        let mut children: Vec<Child> = self.owner.child().into_iter().collect();
        children.extend(self.indices.children("index"));
        children
    }

    fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        let owner = self.owner.evaluate(ctx)?;
        let mut prepared = self.indices.prepare(ctx)?;
        match owner {
            Some(mut owner) => self.getter.call(Some(&mut owner), &mut prepared.values),
            None => self.getter.call(None, &mut prepared.values),
        }
    }
}

/// Assignable property or custom indexer.
pub struct PropertyReference {
    info: NodeInfo,
    name: String,
    getter: Option<Arc<MethodHandle>>,
    setter: Option<Arc<MethodHandle>>,
    owner: OwnerNode,
    indices: ArgumentList,
}

impl PropertyReference {
    pub fn new(
        info: NodeInfo,
        name: impl Into<String>,
        getter: Option<Arc<MethodHandle>>,
        setter: Option<Arc<MethodHandle>>,
        owner: OwnerNode,
        indices: ArgumentList,
    ) -> Self {
        PropertyReference {
            info,
            name: name.into(),
            getter,
            setter,
            owner,
            indices,
        }
    }
}

impl LocationNode for PropertyReference {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn children(&self) -> Vec<Child> {
        let mut children: Vec<Child> = self.owner.child().into_iter().collect();
        children.extend(self.indices.children("index"));
        children
    }

    fn resolve(&self, ctx: &dyn ExecutionContext) -> Result<BoxedLocation, RuntimeError> {
        let owner = self.owner.resolve(ctx)?;
        let prepared = self.indices.prepare(ctx)?;
        let index_args: SmallVec<[Value; 2]> = prepared.values.into_iter().collect();
        Ok(Box::new(PropertyLocation::new(
            self.name.clone(),
            self.info.result_type,
            self.getter.clone(),
            self.setter.clone(),
            owner,
            index_args,
        )))
    }
}
