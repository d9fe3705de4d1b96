//! The typed boundary of a converted graph.
//!
//! Inside a graph every value is a dynamic [`Value`]. A [`ValueGraph<T>`] or
//! [`LocationGraph<T>`] fixes the host type at the edge: the converter checks
//! the expression's static type against [`HostValue::accepts`] once, and
//! evaluation converts the produced value into `T`.

use std::fmt;
use std::marker::PhantomData;

use wfexpr_core::error::RuntimeError;
use wfexpr_core::type_id::{TypeId, TypeRegistry};
use wfexpr_core::types::{HostType, TypeSemantics};
use wfexpr_core::value::{ArrayRef, CallableRef, ObjectRef, StructValue, Value};

use crate::context::ExecutionContext;
use crate::inspect::NodeGraph;
use crate::location::BoxedLocation;
use crate::nodes::{LocationRef, NodeRef, ValueRef};

/// A Rust type that a graph result can be converted into.
pub trait HostValue: Sized + Send + Sync + 'static {
    /// Whether expressions of static type `ty` produce this type.
    fn accepts(registry: &TypeRegistry, ty: TypeId) -> bool;

    fn from_value(value: Value) -> Result<Self, RuntimeError>;

    fn into_value(self) -> Value;
}

fn unexpected(expected: &str, value: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected: expected.to_string(),
        got: value.type_name().to_string(),
    }
}

macro_rules! scalar_host_value {
    ($($ty:ty => $variant:ident, $id:ident;)+) => {
        $(
            impl HostValue for $ty {
                fn accepts(_registry: &TypeRegistry, ty: TypeId) -> bool {
                    ty == TypeId::$id
                }

                fn from_value(value: Value) -> Result<Self, RuntimeError> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(unexpected(stringify!($variant), &other)),
                    }
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }
            }
        )+
    };
}

scalar_host_value! {
    bool => Bool, BOOL;
    i8 => I8, I8;
    i16 => I16, I16;
    i32 => I32, I32;
    i64 => I64, I64;
    f32 => F32, F32;
    f64 => F64, F64;
}

impl HostValue for String {
    fn accepts(_registry: &TypeRegistry, ty: TypeId) -> bool {
        ty == TypeId::STRING
    }

    fn from_value(value: Value) -> Result<Self, RuntimeError> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            Value::Null => Err(RuntimeError::NullReference {
                context: "conversion of null to String".into(),
            }),
            other => Err(unexpected("String", &other)),
        }
    }

    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl HostValue for () {
    fn accepts(_registry: &TypeRegistry, ty: TypeId) -> bool {
        ty == TypeId::UNIT
    }

    fn from_value(value: Value) -> Result<Self, RuntimeError> {
        match value {
            Value::Unit => Ok(()),
            other => Err(unexpected("Unit", &other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Unit
    }
}

/// Accepts every static type.
impl HostValue for Value {
    fn accepts(_registry: &TypeRegistry, _ty: TypeId) -> bool {
        true
    }

    fn from_value(value: Value) -> Result<Self, RuntimeError> {
        Ok(value)
    }

    fn into_value(self) -> Value {
        self
    }
}

impl HostValue for ObjectRef {
    fn accepts(registry: &TypeRegistry, ty: TypeId) -> bool {
        registry
            .composite(ty)
            .is_some_and(|def| def.semantics == TypeSemantics::Reference)
    }

    fn from_value(value: Value) -> Result<Self, RuntimeError> {
        match value {
            Value::Object(obj) => Ok(obj),
            other => Err(unexpected("object", &other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Object(self)
    }
}

impl HostValue for StructValue {
    fn accepts(registry: &TypeRegistry, ty: TypeId) -> bool {
        registry
            .composite(ty)
            .is_some_and(|def| def.semantics == TypeSemantics::Value)
    }

    fn from_value(value: Value) -> Result<Self, RuntimeError> {
        match value {
            Value::Struct(s) => Ok(s),
            other => Err(unexpected("struct", &other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Struct(self)
    }
}

impl HostValue for ArrayRef {
    fn accepts(registry: &TypeRegistry, ty: TypeId) -> bool {
        registry.array_info(ty).is_some()
    }

    fn from_value(value: Value) -> Result<Self, RuntimeError> {
        match value {
            Value::Array(a) => Ok(a),
            other => Err(unexpected("array", &other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Array(self)
    }
}

impl HostValue for CallableRef {
    fn accepts(registry: &TypeRegistry, ty: TypeId) -> bool {
        matches!(registry.get(ty), Some(HostType::Callable { .. }))
    }

    fn from_value(value: Value) -> Result<Self, RuntimeError> {
        match value {
            Value::Callable(c) => Ok(c),
            other => Err(unexpected("callable", &other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Callable(self)
    }
}

/// A converted expression producing `T`.
pub struct ValueGraph<T> {
    root: ValueRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T: HostValue> ValueGraph<T> {
    /// Wraps a root node whose static type was checked against `T`.
    pub fn new(root: ValueRef) -> Self {
        ValueGraph {
            root,
            _marker: PhantomData,
        }
    }

    pub fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<T, RuntimeError> {
        T::from_value(self.root.evaluate(ctx)?)
    }

    pub fn root(&self) -> &ValueRef {
        &self.root
    }

    pub fn result_type(&self) -> TypeId {
        self.root.result_type()
    }

    pub fn inspect(&self) -> NodeGraph {
        NodeGraph::build(&NodeRef::Value(self.root.clone()))
    }
}

impl<T> Clone for ValueGraph<T> {
    fn clone(&self) -> Self {
        ValueGraph {
            root: self.root.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ValueGraph<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.root.info();
        write!(f, "ValueGraph({}#{})", info.kind, info.id)
    }
}

/// A converted assignment target holding a `T`.
pub struct LocationGraph<T> {
    root: LocationRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T: HostValue> LocationGraph<T> {
    pub fn new(root: LocationRef) -> Self {
        LocationGraph {
            root,
            _marker: PhantomData,
        }
    }

    /// Resolves the target cell; owners and indices are evaluated now.
    pub fn resolve_location(&self, ctx: &dyn ExecutionContext) -> Result<TypedLocation<T>, RuntimeError> {
        Ok(TypedLocation::new(self.root.resolve(ctx)?))
    }

    /// Resolves the cell and reads it.
    pub fn evaluate(&self, ctx: &dyn ExecutionContext) -> Result<T, RuntimeError> {
        self.resolve_location(ctx)?.get(ctx)
    }

    pub fn root(&self) -> &LocationRef {
        &self.root
    }

    pub fn result_type(&self) -> TypeId {
        self.root.result_type()
    }

    pub fn inspect(&self) -> NodeGraph {
        NodeGraph::build(&NodeRef::Location(self.root.clone()))
    }
}

impl<T> Clone for LocationGraph<T> {
    fn clone(&self) -> Self {
        LocationGraph {
            root: self.root.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for LocationGraph<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.root.info();
        write!(f, "LocationGraph({}#{})", info.kind, info.id)
    }
}

/// A resolved cell holding a `T`.
pub struct TypedLocation<T> {
    inner: BoxedLocation,
    _marker: PhantomData<fn() -> T>,
}

impl<T: HostValue> TypedLocation<T> {
    pub fn new(inner: BoxedLocation) -> Self {
        TypedLocation {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn get(&self, ctx: &dyn ExecutionContext) -> Result<T, RuntimeError> {
        T::from_value(self.inner.get(ctx)?)
    }

    pub fn set(&self, ctx: &dyn ExecutionContext, value: T) -> Result<(), RuntimeError> {
        self.inner.set(ctx, value.into_value())
    }

    pub fn location_type(&self) -> TypeId {
        self.inner.location_type()
    }

    pub fn into_inner(self) -> BoxedLocation {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use wfexpr_core::id::{NodeId, SymbolRef, VariableId};

    use crate::context::MapContext;
    use crate::nodes::{Literal, NodeInfo, SymbolReference};

    #[test]
    fn value_graph_converts_result() {
        let root: ValueRef = Arc::new(Literal::new(
            NodeInfo::new(NodeId(0), "Literal", TypeId::I32),
            Value::I32(4),
        ));
        let graph: ValueGraph<i32> = ValueGraph::new(root.clone());
        assert_eq!(graph.evaluate(&MapContext::new()).unwrap(), 4);
        let wrong: ValueGraph<String> = ValueGraph::new(root);
        assert!(matches!(
            wrong.evaluate(&MapContext::new()),
            Err(RuntimeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn location_graph_reads_and_writes() {
        let x = SymbolRef::Variable(VariableId(3));
        let ctx = MapContext::new();
        ctx.bind(x, Value::string("a"));
        let graph: LocationGraph<String> = LocationGraph::new(Arc::new(SymbolReference::new(
            NodeInfo::new(NodeId(0), "SymbolReference", TypeId::STRING),
            x,
        )));
        let location = graph.resolve_location(&ctx).unwrap();
        location.set(&ctx, "b".to_string()).unwrap();
        assert_eq!(graph.evaluate(&ctx).unwrap(), "b");
        assert_eq!(location.location_type(), TypeId::STRING);
    }

    #[test]
    fn accepts_by_static_type() {
        let registry = TypeRegistry::new();
        assert!(i32::accepts(&registry, TypeId::I32));
        assert!(!i32::accepts(&registry, TypeId::I64));
        assert!(Value::accepts(&registry, TypeId::OBJECT));
        assert!(<()>::accepts(&registry, TypeId::UNIT));
    }
}
