//! Operator nodes.

use wfexpr_core::error::RuntimeError;
use wfexpr_core::expr::BinaryOp;
use wfexpr_core::value::Value;

use super::{ArgumentList, Child, NodeInfo, ValueNode, ValueRef};
use crate::context::ExecutionContext;
use crate::operators::OperatorFn;

pub struct UnaryOperator {
    info: NodeInfo,
    operand: ValueRef,
    func: OperatorFn,
}

impl UnaryOperator {
    pub fn new(info: NodeInfo, operand: ValueRef, func: OperatorFn) -> Self {
        UnaryOperator { info, operand, func }
    }
}

impl ValueNode for UnaryOperator {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn children(&self) -> Vec<Child> {
        vec![Child::value("operand", &self.operand)]
    }

    fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        let mut operands = [self.operand.evaluate(ctx)?];
        (self.func)(ctx, &mut operands[..])
    }
}

/// Binary operator over an ordered operand pair.
pub struct BinaryOperator {
    info: NodeInfo,
    operands: ArgumentList,
    func: OperatorFn,
}

impl BinaryOperator {
    pub fn new(info: NodeInfo, operands: ArgumentList, func: OperatorFn) -> Self {
        debug_assert_eq!(operands.len(), 2);
        BinaryOperator { info, operands, func }
    }
}

impl ValueNode for BinaryOperator {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn children(&self) -> Vec<Child> {
        self.operands.children("operand")
    }

    fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        let mut prepared = self.operands.prepare(ctx)?;
        (self.func)(ctx, prepared.values.as_mut_slice())
    }
}

/// `AndAlso` / `OrElse`: the right operand only runs when the left one does
/// not decide the result.
pub struct ShortCircuit {
    info: NodeInfo,
    op: BinaryOp,
    left: ValueRef,
    right: ValueRef,
}

impl ShortCircuit {
    pub fn new(info: NodeInfo, op: BinaryOp, left: ValueRef, right: ValueRef) -> Self {
        debug_assert!(op.is_short_circuit());
        ShortCircuit { info, op, left, right }
    }
}

fn truth(value: Value) -> Result<bool, RuntimeError> {
    value.as_bool().ok_or_else(|| RuntimeError::TypeMismatch {
        expected: "Bool".into(),
        got: value.type_name().to_string(),
    })
}

impl ValueNode for ShortCircuit {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn children(&self) -> Vec<Child> {
        vec![Child::value("left", &self.left), Child::value("right", &self.right)]
    }

    fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        let left = truth(self.left.evaluate(ctx)?)?;
        let decided = match self.op {
            BinaryOp::AndAlso => !left,
            _ => left,
        };
        if decided {
            return Ok(Value::Bool(left));
        }
        Ok(Value::Bool(truth(self.right.evaluate(ctx)?)?))
    }
}
