//! Method invocation, construction and callable invocation nodes.

use std::sync::Arc;

use smallvec::SmallVec;

use wfexpr_core::error::RuntimeError;
use wfexpr_core::type_id::TypeId;
use wfexpr_core::value::{ArrayRef, InstanceTemplate, Value};

use super::{index_value, ArgumentList, Child, NodeInfo, OwnerNode, ValueNode, ValueRef};
use crate::context::ExecutionContext;
use crate::invoke::MethodHandle;

/// Calls a static or instance method.
///
/// The target is evaluated before the arguments. A value-type target held
/// as a location receives the mutated receiver back after the call; by-ref
/// arguments are written back last.
pub struct InvokeMethod {
    info: NodeInfo,
    method: Arc<MethodHandle>,
    target: OwnerNode,
    args: ArgumentList,
}

impl InvokeMethod {
    pub fn new(info: NodeInfo, method: Arc<MethodHandle>, target: OwnerNode, args: ArgumentList) -> Self {
        InvokeMethod {
            info,
            method,
            target,
            args,
        }
    }
}

impl ValueNode for InvokeMethod {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn children(&self) -> Vec<Child> {
        let mut children: Vec<Child> = self.target.child().into_iter().collect();
        children.extend(self.args.children("arg"));
        children
    }

    fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        let result = match &self.target {
            OwnerNode::Static => {
                let mut prepared = self.args.prepare(ctx)?;
                let result = self.method.call(None, &mut prepared.values)?;
                prepared.write_back(ctx)?;
                result
            }
            OwnerNode::Value(node) => {
                let mut receiver = node.evaluate(ctx)?;
                let mut prepared = self.args.prepare(ctx)?;
                let result = self.method.call(Some(&mut receiver), &mut prepared.values)?;
                prepared.write_back(ctx)?;
                result
            }
            OwnerNode::Location(node) => {
                let location = node.resolve(ctx)?;
                let mut receiver = location.get(ctx)?;
                let mut prepared = self.args.prepare(ctx)?;
                let result = self.method.call(Some(&mut receiver), &mut prepared.values)?;
                location.set(ctx, receiver)?;
                prepared.write_back(ctx)?;
                result
            }
        };
        Ok(result)
    }
}

/// Object construction. Without a constructor the instance is
/// default-initialised from the template.
pub struct New {
    info: NodeInfo,
    constructor: Option<Arc<MethodHandle>>,
    template: InstanceTemplate,
    args: ArgumentList,
}

impl New {
    pub fn new(
        info: NodeInfo,
        constructor: Option<Arc<MethodHandle>>,
        template: InstanceTemplate,
        args: ArgumentList,
    ) -> Self {
        New {
            info,
            constructor,
            template,
            args,
        }
    }
}

impl ValueNode for New {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn children(&self) -> Vec<Child> {
        self.args.children("arg")
    }

    fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        match &self.constructor {
            Some(ctor) => {
                let mut prepared = self.args.prepare(ctx)?;
                let instance = ctor.call(None, &mut prepared.values)?;
                prepared.write_back(ctx)?;
                Ok(instance)
            }
            None => Ok(self.template.instantiate()),
        }
    }
}

/// Array creation from per-dimension lengths; elements start at the
/// element type's default.
pub struct NewArray {
    info: NodeInfo,
    element_type: TypeId,
    fill: Value,
    bounds: ArgumentList,
}

impl NewArray {
    pub fn new(info: NodeInfo, element_type: TypeId, fill: Value, bounds: ArgumentList) -> Self {
        NewArray {
            info,
            element_type,
            fill,
            bounds,
        }
    }
}

impl ValueNode for NewArray {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn children(&self) -> Vec<Child> {
        self.bounds.children("bound")
    }

    fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        let prepared = self.bounds.prepare(ctx)?;
        let lengths = prepared
            .values
            .iter()
            .map(|v| {
                let length = index_value(v)?;
                usize::try_from(length).map_err(|_| RuntimeError::NegativeLength { length })
            })
            .collect::<Result<SmallVec<[usize; 2]>, _>>()?;
        element_count(&lengths).ok_or_else(|| RuntimeError::IntegerOverflow {
            operation: "array size".into(),
        })?;
        Ok(Value::Array(ArrayRef::new(
            self.info.result_type,
            self.element_type,
            &lengths,
            self.fill.clone(),
        )))
    }
}

/// Total element count of an array with `lengths`, if its storage is
/// addressable.
fn element_count(lengths: &[usize]) -> Option<usize> {
    let total = lengths.iter().try_fold(1usize, |acc, &len| acc.checked_mul(len))?;
    let bytes = total.checked_mul(std::mem::size_of::<Value>())?;
    (bytes <= isize::MAX as usize).then_some(total)
}

/// One-dimensional array creation from element expressions.
pub struct NewArrayInit {
    info: NodeInfo,
    element_type: TypeId,
    items: ArgumentList,
}

impl NewArrayInit {
    pub fn new(info: NodeInfo, element_type: TypeId, items: ArgumentList) -> Self {
        NewArrayInit {
            info,
            element_type,
            items,
        }
    }
}

impl ValueNode for NewArrayInit {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn children(&self) -> Vec<Child> {
        self.items.children("item")
    }

    fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        let prepared = self.items.prepare(ctx)?;
        Ok(Value::Array(ArrayRef::from_values(
            self.info.result_type,
            self.element_type,
            prepared.values.into_vec(),
        )))
    }
}

/// Invokes a callable value. The callable is evaluated first.
pub struct InvokeCallable {
    info: NodeInfo,
    callable: ValueRef,
    args: ArgumentList,
}

impl InvokeCallable {
    pub fn new(info: NodeInfo, callable: ValueRef, args: ArgumentList) -> Self {
        InvokeCallable { info, callable, args }
    }
}

impl ValueNode for InvokeCallable {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn children(&self) -> Vec<Child> {
        let mut children = vec![Child::value("callable", &self.callable)];
        children.extend(self.args.children("arg"));
        children
    }

    fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        match self.callable.evaluate(ctx)? {
            Value::Callable(callable) => {
                let mut prepared = self.args.prepare(ctx)?;
                callable.call(&mut prepared.values)
            }
            Value::Null => Err(RuntimeError::NullReference {
                context: "invocation of a null callable".into(),
            }),
            other => Err(RuntimeError::TypeMismatch {
                expected: "callable".into(),
                got: other.type_name().to_string(),
            }),
        }
    }
}
