use wfexpr_core::error::RuntimeError;
use wfexpr_core::id::SymbolRef;
use wfexpr_core::value::Value;

use super::{LocationNode, NodeInfo, ValueNode};
use crate::context::ExecutionContext;
use crate::location::{BoxedLocation, SymbolLocation};

/// Reads a variable, argument or delegate argument.
pub struct SymbolValue {
    info: NodeInfo,
    symbol: SymbolRef,
}

impl SymbolValue {
    pub fn new(info: NodeInfo, symbol: SymbolRef) -> Self {
        SymbolValue { info, symbol }
    }

    pub fn symbol(&self) -> SymbolRef {
        self.symbol
    }
}

impl ValueNode for SymbolValue {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        ctx.read_symbol(self.symbol)
    }
}

/// Assignable variable, argument or delegate argument.
pub struct SymbolReference {
    info: NodeInfo,
    symbol: SymbolRef,
}

impl SymbolReference {
    pub fn new(info: NodeInfo, symbol: SymbolRef) -> Self {
        SymbolReference { info, symbol }
    }
}

impl LocationNode for SymbolReference {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn resolve(&self, _ctx: &dyn ExecutionContext) -> Result<BoxedLocation, RuntimeError> {
        Ok(Box::new(SymbolLocation {
            symbol: self.symbol,
            ty: self.info.result_type,
        }))
    }
}
