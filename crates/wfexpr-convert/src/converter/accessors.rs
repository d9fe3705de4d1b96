//! Symbol accessor patterns.
//!
//! `variable.Get(context)` and friends name their symbol with an ordinary
//! sub-expression. That sub-expression is converted and evaluated once,
//! here, without an execution context; the graph then refers to the
//! resulting symbol directly.

use std::sync::Arc;

use wfexpr_core::expr::{Expr, Intrinsic};
use wfexpr_core::id::SymbolRef;
use wfexpr_core::type_id::TypeId;
use wfexpr_core::value::Value;
use wfexpr_runtime::nodes::{SymbolReference, SymbolValue};
use wfexpr_runtime::{LocationRef, StaticContext, ValueRef};

use super::Lowering;
use crate::diagnostics::ConversionError;

impl Lowering<'_> {
    pub(super) fn accessor_value(
        &mut self,
        target: Option<&Expr>,
        accessor: Intrinsic,
        ty: TypeId,
        args: &[Expr],
    ) -> Result<ValueRef, ConversionError> {
        let symbol = self.accessor_symbol(target, accessor, ty, args, false)?;
        let info = self
            .info(format!("{}Value", symbol_kind(symbol)), ty)
            .with_detail(symbol.to_string());
        Ok(Arc::new(SymbolValue::new(info, symbol)))
    }

    pub(super) fn accessor_location(
        &mut self,
        target: Option<&Expr>,
        accessor: Intrinsic,
        ty: TypeId,
        args: &[Expr],
    ) -> Result<LocationRef, ConversionError> {
        let symbol = self.accessor_symbol(target, accessor, ty, args, true)?;
        let info = self
            .info(format!("{}Reference", symbol_kind(symbol)), ty)
            .with_detail(symbol.to_string());
        Ok(Arc::new(SymbolReference::new(info, symbol)))
    }

    /// Symbol named by an accessor call. A location needs the declared type
    /// of a name-resolved symbol to match exactly.
    fn accessor_symbol(
        &mut self,
        target: Option<&Expr>,
        accessor: Intrinsic,
        ty: TypeId,
        args: &[Expr],
        exact: bool,
    ) -> Result<SymbolRef, ConversionError> {
        let accessor_name = format!("{:?}", accessor);
        let target = target.ok_or_else(|| ConversionError::TargetRequired {
            member: accessor_name.clone(),
        })?;

        if accessor == Intrinsic::ContextGetValue {
            if !matches!(target.unwrap_order().1, Expr::Context) {
                return Err(ConversionError::unsupported(
                    accessor_name,
                    "on anything but the context parameter",
                ));
            }
            let [arg] = args else {
                return Err(ConversionError::ArityMismatch {
                    member: accessor_name,
                    reason: format!("expects 1 argument, got {}", args.len()),
                });
            };
            return match self.evaluate_static(arg)? {
                Value::Symbol(symbol) => {
                    self.check_visible(symbol)?;
                    Ok(symbol)
                }
                Value::Str(name) => self.resolve_name(&name, ty, exact),
                other => Err(ConversionError::type_mismatch(
                    format!("argument of {}", accessor_name),
                    "a symbol or a name",
                    other.type_name(),
                )),
            };
        }

        match args {
            [arg] if matches!(arg.unwrap_order().1, Expr::Context) => {}
            _ => {
                return Err(ConversionError::ArityMismatch {
                    member: accessor_name,
                    reason: "expects the context parameter as its only argument".into(),
                })
            }
        }
        let symbol = match self.evaluate_static(target)? {
            Value::Symbol(symbol) => symbol,
            other => {
                return Err(ConversionError::type_mismatch(
                    format!("target of {}", accessor_name),
                    "a symbol",
                    other.type_name(),
                ))
            }
        };
        let kind_matches = matches!(
            (accessor, symbol),
            (Intrinsic::VariableGet, SymbolRef::Variable(_))
                | (Intrinsic::ArgumentGet, SymbolRef::Argument(_))
                | (Intrinsic::DelegateArgumentGet, SymbolRef::DelegateArgument(_))
        );
        if !kind_matches {
            return Err(ConversionError::type_mismatch(
                format!("target of {}", accessor_name),
                expected_kind(accessor),
                symbol.kind_name(),
            ));
        }
        self.check_visible(symbol)?;
        Ok(symbol)
    }

    fn resolve_name(&self, name: &str, ty: TypeId, exact: bool) -> Result<SymbolRef, ConversionError> {
        let unknown = || ConversionError::UnknownSymbol {
            symbol: format!("'{}'", name),
        };
        let resolver = self.resolver.ok_or_else(unknown)?;
        let (symbol, declared) = resolver.resolve(name).ok_or_else(unknown)?;
        let compatible = if exact {
            declared == ty
        } else {
            self.types().is_assignable(declared, ty)
        };
        if !compatible {
            return Err(ConversionError::type_mismatch(
                format!("'{}'", name),
                self.type_name(ty),
                self.type_name(declared),
            ));
        }
        Ok(symbol)
    }

    fn check_visible(&self, symbol: SymbolRef) -> Result<(), ConversionError> {
        match self.resolver {
            Some(resolver) if !resolver.contains(symbol) => Err(ConversionError::UnknownSymbol {
                symbol: symbol.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Converts `expr` and evaluates it once without an execution context.
    fn evaluate_static(&mut self, expr: &Expr) -> Result<Value, ConversionError> {
        let node = self.value(expr)?;
        node.evaluate(&StaticContext)
            .map_err(|e| ConversionError::StaticEvaluation { message: e.to_string() })
    }
}

fn symbol_kind(symbol: SymbolRef) -> &'static str {
    match symbol {
        SymbolRef::Variable(_) => "Variable",
        SymbolRef::Argument(_) => "Argument",
        SymbolRef::DelegateArgument(_) => "DelegateArgument",
    }
}

fn expected_kind(accessor: Intrinsic) -> &'static str {
    match accessor {
        Intrinsic::VariableGet => "variable",
        Intrinsic::ArgumentGet => "argument",
        Intrinsic::DelegateArgumentGet => "delegate argument",
        Intrinsic::ContextGetValue => "symbol",
    }
}
