//! Name resolution for symbol accessors.
//!
//! `context.GetValue(name)` looks `name` up through a [`NameResolver`]; the
//! other accessors only ask whether their symbol is visible. [`Scope`] is a
//! chain of scopes searched innermost first, so inner declarations shadow
//! outer ones.

use std::sync::Arc;

use indexmap::IndexMap;

use wfexpr_core::id::SymbolRef;
use wfexpr_core::type_id::TypeId;

pub trait NameResolver: Send + Sync {
    /// Symbol bound to `name` and its declared type.
    fn resolve(&self, name: &str) -> Option<(SymbolRef, TypeId)>;

    /// Whether `symbol` is declared in this scope or an enclosing one.
    fn contains(&self, symbol: SymbolRef) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    names: IndexMap<String, (SymbolRef, TypeId)>,
    parent: Option<Arc<Scope>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty scope nested in `parent`.
    pub fn child(parent: Arc<Scope>) -> Self {
        Scope {
            names: IndexMap::new(),
            parent: Some(parent),
        }
    }

    /// Declares `name` here, returning the binding it replaces in this scope.
    pub fn declare(&mut self, name: impl Into<String>, symbol: SymbolRef, ty: TypeId) -> Option<(SymbolRef, TypeId)> {
        self.names.insert(name.into(), (symbol, ty))
    }

    pub fn with(mut self, name: impl Into<String>, symbol: SymbolRef, ty: TypeId) -> Self {
        self.declare(name, symbol, ty);
        self
    }

    pub fn parent(&self) -> Option<&Arc<Scope>> {
        self.parent.as_ref()
    }

    /// Names declared directly in this scope, in declaration order.
    pub fn local_names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    fn chain(&self) -> impl Iterator<Item = &Scope> {
        std::iter::successors(Some(self), |scope| scope.parent.as_deref())
    }
}

impl NameResolver for Scope {
    fn resolve(&self, name: &str) -> Option<(SymbolRef, TypeId)> {
        self.chain().find_map(|scope| scope.names.get(name).copied())
    }

    fn contains(&self, symbol: SymbolRef) -> bool {
        self.chain()
            .any(|scope| scope.names.values().any(|(declared, _)| *declared == symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfexpr_core::id::{ArgumentId, VariableId};

    #[test]
    fn inner_declarations_shadow_outer_ones() {
        let outer = Arc::new(
            Scope::new()
                .with("total", SymbolRef::Variable(VariableId(0)), TypeId::I32)
                .with("name", SymbolRef::Argument(ArgumentId(0)), TypeId::STRING),
        );
        let inner = Scope::child(Arc::clone(&outer)).with("total", SymbolRef::Variable(VariableId(1)), TypeId::I64);

        assert_eq!(
            inner.resolve("total"),
            Some((SymbolRef::Variable(VariableId(1)), TypeId::I64))
        );
        assert_eq!(
            inner.resolve("name"),
            Some((SymbolRef::Argument(ArgumentId(0)), TypeId::STRING))
        );
        assert_eq!(inner.resolve("missing"), None);
        assert_eq!(outer.resolve("total").map(|(s, _)| s), Some(SymbolRef::Variable(VariableId(0))));
    }

    #[test]
    fn contains_walks_parents() {
        let outer = Arc::new(Scope::new().with("a", SymbolRef::Variable(VariableId(4)), TypeId::BOOL));
        let inner = Scope::child(outer);
        assert!(inner.contains(SymbolRef::Variable(VariableId(4))));
        assert!(!inner.contains(SymbolRef::Variable(VariableId(5))));
        assert_eq!(inner.local_names().count(), 0);
        assert!(inner.parent().is_some());
    }

    #[test]
    fn redeclaring_returns_previous_binding() {
        let mut scope = Scope::new();
        assert!(scope.declare("x", SymbolRef::Variable(VariableId(0)), TypeId::I32).is_none());
        let previous = scope.declare("x", SymbolRef::Variable(VariableId(1)), TypeId::I32);
        assert_eq!(previous, Some((SymbolRef::Variable(VariableId(0)), TypeId::I32)));
    }
}
