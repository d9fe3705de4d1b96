//! Execution context and access gate.
//!
//! The surrounding runtime owns the storage of variables and arguments and
//! supplies it to graph evaluation through [`ExecutionContext`]. Permission
//! checks for non-public operator methods go through [`AccessGate`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use wfexpr_core::error::RuntimeError;
use wfexpr_core::id::SymbolRef;
use wfexpr_core::value::Value;

/// Opaque permission gate. `demand` fails when the caller may not invoke
/// the named non-public member.
pub trait AccessGate: Send + Sync {
    fn demand(&self, member: &str) -> Result<(), RuntimeError>;
}

/// Grants every demand.
#[derive(Debug, Default, Clone, Copy)]
pub struct FullTrust;

impl AccessGate for FullTrust {
    fn demand(&self, _member: &str) -> Result<(), RuntimeError> {
        Ok(())
    }
}

/// Denies every demand.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl AccessGate for DenyAll {
    fn demand(&self, member: &str) -> Result<(), RuntimeError> {
        Err(RuntimeError::AccessDenied {
            member: member.to_string(),
        })
    }
}

/// Capability object passed to every evaluation.
pub trait ExecutionContext {
    fn read_symbol(&self, symbol: SymbolRef) -> Result<Value, RuntimeError>;

    fn write_symbol(&self, symbol: SymbolRef, value: Value) -> Result<(), RuntimeError>;

    fn access_gate(&self) -> &dyn AccessGate;
}

/// In-memory context backed by a symbol map.
///
/// Writes only succeed for symbols that were bound first, mirroring a
/// runtime where every variable has storage before the expression runs.
pub struct MapContext {
    symbols: RwLock<HashMap<SymbolRef, Value>>,
    gate: Arc<dyn AccessGate>,
}

impl MapContext {
    pub fn new() -> Self {
        Self::with_gate(Arc::new(FullTrust))
    }

    pub fn with_gate(gate: Arc<dyn AccessGate>) -> Self {
        MapContext {
            symbols: RwLock::new(HashMap::new()),
            gate,
        }
    }

    /// Binds (or rebinds) a symbol.
    pub fn bind(&self, symbol: SymbolRef, value: Value) {
        self.symbols.write().insert(symbol, value);
    }

    pub fn get(&self, symbol: SymbolRef) -> Option<Value> {
        self.symbols.read().get(&symbol).cloned()
    }
}

impl Default for MapContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext for MapContext {
    fn read_symbol(&self, symbol: SymbolRef) -> Result<Value, RuntimeError> {
        self.get(symbol)
            .ok_or(RuntimeError::UnboundSymbol { symbol })
    }

    fn write_symbol(&self, symbol: SymbolRef, value: Value) -> Result<(), RuntimeError> {
        match self.symbols.write().get_mut(&symbol) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RuntimeError::UnboundSymbol { symbol }),
        }
    }

    fn access_gate(&self) -> &dyn AccessGate {
        self.gate.as_ref()
    }
}

/// Context used to evaluate static sub-expressions at conversion time.
/// No symbol is bound.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticContext;

impl ExecutionContext for StaticContext {
    fn read_symbol(&self, symbol: SymbolRef) -> Result<Value, RuntimeError> {
        Err(RuntimeError::UnboundSymbol { symbol })
    }

    fn write_symbol(&self, symbol: SymbolRef, _value: Value) -> Result<(), RuntimeError> {
        Err(RuntimeError::UnboundSymbol { symbol })
    }

    fn access_gate(&self) -> &dyn AccessGate {
        &FullTrust
    }
}
