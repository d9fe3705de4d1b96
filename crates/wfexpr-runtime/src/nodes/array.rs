//! Array element nodes.
//!
//! Operand 0 is the array, the rest are indices, all scheduled by their
//! evaluation order. One index reads a one-dimensional array; several index
//! a multi-dimensional array in row-major order.

use smallvec::SmallVec;

use wfexpr_core::error::RuntimeError;
use wfexpr_core::value::Value;

use super::{index_value, ArgumentList, Child, LocationNode, NodeInfo, ValueNode};
use crate::context::ExecutionContext;
use crate::location::{array_element, ArrayElementLocation, BoxedLocation};

fn split(values: SmallVec<[Value; 4]>) -> Result<(Value, SmallVec<[i64; 2]>), RuntimeError> {
    let mut values = values.into_iter();
    let array = values.next().ok_or_else(|| RuntimeError::Internal {
        message: "array access without an array operand".into(),
    })?;
    let indices = values.map(|v| index_value(&v)).collect::<Result<_, _>>()?;
    Ok((array, indices))
}

pub struct ArrayItemValue {
    info: NodeInfo,
    operands: ArgumentList,
}

impl ArrayItemValue {
    pub fn new(info: NodeInfo, operands: ArgumentList) -> Self {
        debug_assert!(operands.len() >= 2);
        ArrayItemValue { info, operands }
    }
}

impl ValueNode for ArrayItemValue {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn children(&self) -> Vec<Child> {
        self.operands.children("operand")
    }

    fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        let (array, indices) = split(self.operands.prepare(ctx)?.values)?;
        array_element(&array, &indices)
    }
}

pub struct ArrayItemReference {
    info: NodeInfo,
    operands: ArgumentList,
}

impl ArrayItemReference {
    pub fn new(info: NodeInfo, operands: ArgumentList) -> Self {
        debug_assert!(operands.len() >= 2);
        ArrayItemReference { info, operands }
    }
}

impl LocationNode for ArrayItemReference {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn children(&self) -> Vec<Child> {
        self.operands.children("operand")
    }

    fn resolve(&self, ctx: &dyn ExecutionContext) -> Result<BoxedLocation, RuntimeError> {
        let (array, indices) = split(self.operands.prepare(ctx)?.values)?;
        Ok(Box::new(ArrayElementLocation::new(
            array,
            indices,
            self.info.result_type,
        )))
    }
}
