//! The expression walker.
//!
//! Conversion is a single recursive pass over the tree. A [`Converter`]
//! holds the long-lived pieces (registry, metadata cache, name resolver,
//! options); each call starts a fresh `Lowering` that numbers nodes from
//! zero and dispatches every [`Expr`] variant to a method in one of the
//! submodules. The first error aborts the pass.

mod accessors;
mod calls;
mod indexing;
mod members;
mod operators;

use std::fmt;
use std::sync::Arc;

use wfexpr_core::expr::{BinaryOp, Expr, MethodRef};
use wfexpr_core::id::{MemberId, NodeId};
use wfexpr_core::member::MemberDef;
use wfexpr_core::type_id::{TypeId, TypeRegistry};
use wfexpr_core::types::ConstValue;
use wfexpr_core::value::Value;
use wfexpr_runtime::nodes::{Argument, Literal, NodeInfo};
use wfexpr_runtime::{
    HostValue, LocationGraph, LocationRef, MetadataCache, MethodHandle, RuntimeConfig, ValueGraph, ValueRef,
};

use crate::diagnostics::{ConversionError, ErrorMode, ValidationSink};
use crate::scope::NameResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConverterOptions {
    /// Mode used by [`Converter::convert_with_mode`].
    pub error_mode: ErrorMode,
    /// Overflow checking for arithmetic the tree does not mark as checked.
    pub checked_arithmetic: bool,
}

impl ConverterOptions {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        ConverterOptions {
            error_mode: ErrorMode::Raise,
            checked_arithmetic: config.checked_arithmetic_default,
        }
    }
}

/// Converts expression trees into node graphs.
///
/// A converter is cheap to share: it is immutable, and graphs converted by
/// converters holding the same [`MetadataCache`] share thunks and operator
/// delegates.
pub struct Converter {
    registry: Arc<TypeRegistry>,
    cache: Arc<MetadataCache>,
    resolver: Option<Arc<dyn NameResolver>>,
    options: ConverterOptions,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("registry", &self.registry.id())
            .field("cache", &self.cache)
            .field("resolver", &self.resolver.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl Converter {
    /// A converter over the process-wide [`MetadataCache::shared`].
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_cache(registry, MetadataCache::shared())
    }

    pub fn with_cache(registry: Arc<TypeRegistry>, cache: Arc<MetadataCache>) -> Self {
        let options = ConverterOptions::from_config(cache.config());
        Converter {
            registry,
            cache,
            resolver: None,
            options,
        }
    }

    /// Enables `context.GetValue(name)` and symbol visibility checks.
    pub fn with_resolver(mut self, resolver: Arc<dyn NameResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_options(mut self, options: ConverterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    pub fn options(&self) -> &ConverterOptions {
        &self.options
    }

    /// Converts `expr` into a graph producing `T`.
    pub fn convert<T: HostValue>(&self, expr: &Expr) -> Result<ValueGraph<T>, ConversionError> {
        let root = self.convert_value(expr)?;
        self.check_result::<T>(root.result_type())?;
        Ok(ValueGraph::new(root))
    }

    /// Converts `expr` into an assignable graph holding a `T`.
    pub fn convert_reference<T: HostValue>(&self, expr: &Expr) -> Result<LocationGraph<T>, ConversionError> {
        let root = self.convert_location(expr)?;
        self.check_result::<T>(root.result_type())?;
        Ok(LocationGraph::new(root))
    }

    /// Report-mode [`convert`](Self::convert).
    pub fn try_convert<T: HostValue>(&self, expr: &Expr, sink: &mut dyn ValidationSink) -> Option<ValueGraph<T>> {
        report(self.convert(expr), sink)
    }

    pub fn try_convert_reference<T: HostValue>(
        &self,
        expr: &Expr,
        sink: &mut dyn ValidationSink,
    ) -> Option<LocationGraph<T>> {
        report(self.convert_reference(expr), sink)
    }

    /// Converts in the configured [`ErrorMode`]. In report mode a failure
    /// yields `Ok(None)` after the message reached `sink`.
    pub fn convert_with_mode<T: HostValue>(
        &self,
        expr: &Expr,
        sink: &mut dyn ValidationSink,
    ) -> Result<Option<ValueGraph<T>>, ConversionError> {
        match self.options.error_mode {
            ErrorMode::Raise => self.convert(expr).map(Some),
            ErrorMode::Report => Ok(self.try_convert(expr, sink)),
        }
    }

    pub fn convert_reference_with_mode<T: HostValue>(
        &self,
        expr: &Expr,
        sink: &mut dyn ValidationSink,
    ) -> Result<Option<LocationGraph<T>>, ConversionError> {
        match self.options.error_mode {
            ErrorMode::Raise => self.convert_reference(expr).map(Some),
            ErrorMode::Report => Ok(self.try_convert_reference(expr, sink)),
        }
    }

    /// Converts `expr` into an untyped value node.
    pub fn convert_value(&self, expr: &Expr) -> Result<ValueRef, ConversionError> {
        tracing::debug!("converting {} expression", expr.kind_name());
        let mut lowering = self.lowering();
        let root = lowering.value(expr)?;
        tracing::debug!("converted {} expression into {} nodes", expr.kind_name(), lowering.next_id);
        Ok(root)
    }

    /// Converts `expr` into an untyped location node.
    pub fn convert_location(&self, expr: &Expr) -> Result<LocationRef, ConversionError> {
        tracing::debug!("converting {} expression as a location", expr.kind_name());
        let mut lowering = self.lowering();
        let root = lowering.location(expr)?;
        tracing::debug!("converted {} location into {} nodes", expr.kind_name(), lowering.next_id);
        Ok(root)
    }

    fn lowering(&self) -> Lowering<'_> {
        Lowering {
            registry: &self.registry,
            cache: &self.cache,
            resolver: self.resolver.as_deref(),
            checked_arithmetic: self.options.checked_arithmetic,
            next_id: 0,
        }
    }

    fn check_result<T: HostValue>(&self, ty: TypeId) -> Result<(), ConversionError> {
        if T::accepts(&self.registry, ty) {
            Ok(())
        } else {
            Err(ConversionError::type_mismatch(
                "expression result",
                std::any::type_name::<T>(),
                self.registry.type_name(ty),
            ))
        }
    }
}

fn report<G>(result: Result<G, ConversionError>, sink: &mut dyn ValidationSink) -> Option<G> {
    match result {
        Ok(graph) => Some(graph),
        Err(e) => {
            tracing::warn!("conversion failed: {}", e);
            sink.report(e.to_string());
            None
        }
    }
}

/// State of one conversion pass.
pub(crate) struct Lowering<'c> {
    registry: &'c Arc<TypeRegistry>,
    cache: &'c MetadataCache,
    resolver: Option<&'c dyn NameResolver>,
    checked_arithmetic: bool,
    next_id: u32,
}

impl<'c> Lowering<'c> {
    pub(crate) fn value(&mut self, expr: &Expr) -> Result<ValueRef, ConversionError> {
        match expr {
            Expr::Constant { value, ty } => self.literal(value, *ty),
            Expr::Unary {
                op,
                operand,
                ty,
                method,
            } => self.unary(*op, operand, *ty, *method),
            Expr::Binary {
                op,
                left,
                right,
                checked,
                method,
            } => self.binary(*op, left, right, *checked, *method),
            Expr::Member { target, member } => self.member_value(target.as_deref(), *member),
            Expr::Index { target, indices } => self.index_value(target, indices),
            Expr::Call {
                target,
                method: MethodRef::Intrinsic { accessor, ty },
                args,
            } => self.accessor_value(target.as_deref(), *accessor, *ty, args),
            Expr::Call {
                target,
                method: MethodRef::Member(method),
                args,
            } => self.call(target.as_deref(), *method, args),
            Expr::New {
                ty,
                constructor,
                args,
            } => self.new_object(*ty, *constructor, args),
            Expr::NewArrayBounds { element, bounds } => self.new_array(*element, bounds),
            Expr::NewArrayInit { element, items } => self.array_init(*element, items),
            Expr::Invoke { callable, args } => self.invoke(callable, args),
            Expr::Ordered { expr, .. } => self.value(expr),
            Expr::Context => Err(ConversionError::unsupported(
                "Context",
                "outside the argument of a symbol accessor",
            )),
            Expr::Lambda { .. } | Expr::Conditional { .. } => {
                Err(ConversionError::unsupported(expr.kind_name(), "in an expression graph"))
            }
        }
    }

    pub(crate) fn location(&mut self, expr: &Expr) -> Result<LocationRef, ConversionError> {
        match expr {
            Expr::Call {
                target,
                method: MethodRef::Intrinsic { accessor, ty },
                args,
            } => self.accessor_location(target.as_deref(), *accessor, *ty, args),
            Expr::Member { target, member } => self.member_location(target.as_deref(), *member),
            Expr::Binary {
                op: BinaryOp::ArrayIndex,
                left,
                right,
                ..
            } => self.array_index_location(left, right),
            Expr::Index { target, indices } => self.index_location(target, indices),
            Expr::Ordered { expr, .. } => self.location(expr),
            other => Err(ConversionError::unsupported(other.kind_name(), "as an assignment target")),
        }
    }

    fn literal(&mut self, value: &ConstValue, ty: TypeId) -> Result<ValueRef, ConversionError> {
        let value = Value::from_const(value);
        if !self.types().value_conforms(&value, ty) {
            return Err(ConversionError::type_mismatch(
                "constant",
                self.type_name(ty),
                value.type_name(),
            ));
        }
        let info = self.info("Literal", ty).with_detail(format!("{:?}", value));
        Ok(Arc::new(Literal::new(info, value)))
    }

    /// Converts a direct operand or argument. Its evaluation order is the
    /// explicit one when wrapped in [`Expr::Ordered`], else `position`.
    fn operand(&mut self, position: usize, expr: &Expr) -> Result<(Argument, TypeId), ConversionError> {
        let (order, inner) = expr.unwrap_order();
        let node = self.value(inner)?;
        let ty = node.result_type();
        Ok((Argument::value(order.unwrap_or(position as u32), node), ty))
    }

    fn info(&mut self, kind: impl Into<String>, ty: TypeId) -> NodeInfo {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        let info = NodeInfo::new(id, kind, ty);
        tracing::trace!("node {} {}: {}", id, info.kind, self.registry.type_name(ty));
        info
    }

    fn types(&self) -> &'c TypeRegistry {
        self.registry
    }

    fn type_name(&self, ty: TypeId) -> String {
        self.registry.type_name(ty)
    }

    fn member_def(&self, id: MemberId) -> Result<&'c Arc<MemberDef>, ConversionError> {
        self.types()
            .member(id)
            .ok_or_else(|| ConversionError::MemberNotFound {
                member: format!("MemberId({})", id),
                detail: "not registered".into(),
            })
    }

    fn handle(&self, member: MemberId) -> Result<Arc<MethodHandle>, ConversionError> {
        MethodHandle::new(Arc::clone(self.registry), member, self.cache.invocations().cloned())
            .map(Arc::new)
            .map_err(|e| ConversionError::MemberNotFound {
                member: self.registry.describe_member(member),
                detail: e.to_string(),
            })
    }

    fn expect_assignable(&self, context: impl Into<String>, actual: TypeId, expected: TypeId) -> Result<(), ConversionError> {
        if self.types().is_assignable(actual, expected) {
            Ok(())
        } else {
            Err(ConversionError::type_mismatch(
                context,
                self.type_name(expected),
                self.type_name(actual),
            ))
        }
    }

    fn is_integer(&self, ty: TypeId) -> bool {
        self.types().scalar(ty).is_some_and(|s| s.is_integer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfexpr_core::expr::UnaryOp;
    use wfexpr_core::RuntimeError;
    use wfexpr_runtime::nodes::NodeRef;
    use wfexpr_runtime::{MapContext, NodeGraph};

    fn converter() -> Converter {
        Converter::with_cache(
            Arc::new(TypeRegistry::new()),
            Arc::new(MetadataCache::new(RuntimeConfig::default())),
        )
    }

    #[test]
    fn literal_rejects_mismatched_declared_type() {
        let err = converter()
            .convert_value(&Expr::constant(ConstValue::I32(1), TypeId::STRING))
            .err().unwrap();
        assert!(matches!(err, ConversionError::TypeMismatch { .. }));

        let null = converter().convert::<String>(&Expr::null(TypeId::STRING)).unwrap();
        assert!(null.evaluate(&MapContext::new()).is_err());
    }

    #[test]
    fn node_ids_restart_for_every_conversion() {
        let c = converter();
        let expr = Expr::binary(BinaryOp::Add, Expr::i32(1), Expr::i32(2));
        let first = c.convert_value(&expr).unwrap();
        let second = c.convert_value(&expr).unwrap();
        assert_eq!(first.info().id, second.info().id);
        let graph = NodeGraph::build(&NodeRef::Value(first));
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn result_type_is_checked_against_host_type() {
        let err = converter().convert::<String>(&Expr::i32(3)).unwrap_err();
        assert!(matches!(err, ConversionError::TypeMismatch { ref context, .. } if context == "expression result"));
        assert_eq!(converter().convert::<Value>(&Expr::i32(3)).unwrap().result_type(), TypeId::I32);
    }

    #[test]
    fn default_checked_arithmetic_comes_from_config() {
        let cache = Arc::new(MetadataCache::new(RuntimeConfig {
            checked_arithmetic_default: true,
            ..RuntimeConfig::default()
        }));
        let c = Converter::with_cache(Arc::new(TypeRegistry::new()), cache);
        assert!(c.options().checked_arithmetic);
        let graph = c
            .convert::<i32>(&Expr::binary(BinaryOp::Add, Expr::i32(i32::MAX), Expr::i32(1)))
            .unwrap();
        assert!(graph.evaluate(&MapContext::new()).is_err());

        let negate_min = Expr::unary(UnaryOp::Negate, Expr::i32(i32::MIN));
        assert!(matches!(
            c.convert::<i32>(&negate_min).unwrap().evaluate(&MapContext::new()),
            Err(RuntimeError::IntegerOverflow { .. })
        ));
        assert_eq!(
            converter().convert::<i32>(&negate_min).unwrap().evaluate(&MapContext::new()).unwrap(),
            i32::MIN
        );

        let negate = converter()
            .convert::<i32>(&Expr::unary(UnaryOp::Negate, Expr::i32(5)))
            .unwrap();
        assert_eq!(negate.evaluate(&MapContext::new()).unwrap(), -5);
    }

    #[test]
    fn report_mode_hands_errors_to_the_sink() {
        let c = converter().with_options(ConverterOptions {
            error_mode: ErrorMode::Report,
            checked_arithmetic: false,
        });
        let mut sink: Vec<String> = Vec::new();
        let lambda = Expr::Lambda {
            params: vec![],
            body: Box::new(Expr::i32(1)),
        };
        let out = c.convert_with_mode::<i32>(&lambda, &mut sink).unwrap();
        assert!(out.is_none());
        assert_eq!(sink.len(), 1);
        assert!(sink[0].contains("Lambda"));

        let raise = converter();
        assert!(matches!(
            raise.convert_with_mode::<i32>(&lambda, &mut sink),
            Err(ConversionError::UnsupportedNodeKind { .. })
        ));
        assert_eq!(sink.len(), 1);
    }
}
