use wfexpr_core::error::RuntimeError;
use wfexpr_core::value::Value;

use super::{NodeInfo, ValueNode};
use crate::context::ExecutionContext;

/// A constant. Evaluation clones the stored value; value-type constants are
/// deep copies, so callers never share them.
pub struct Literal {
    info: NodeInfo,
    value: Value,
}

impl Literal {
    pub fn new(info: NodeInfo, value: Value) -> Self {
        Literal { info, value }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl ValueNode for Literal {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn evaluate(&self, _ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        Ok(self.value.clone())
    }
}
