use std::sync::Arc;

use wfexpr_core::expr::{BinaryOp, Expr, UnaryOp};
use wfexpr_core::id::MemberId;
use wfexpr_core::type_id::TypeId;
use wfexpr_runtime::nodes::{ArgumentList, BinaryOperator, ShortCircuit, UnaryOperator};
use wfexpr_runtime::ValueRef;

use super::Lowering;
use crate::diagnostics::ConversionError;

impl Lowering<'_> {
    pub(super) fn unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        target: Option<TypeId>,
        method: Option<MemberId>,
    ) -> Result<ValueRef, ConversionError> {
        let is_cast = matches!(op, UnaryOp::Cast | UnaryOp::CheckedCast | UnaryOp::TypeAs);
        if is_cast && target.is_none() && method.is_none() {
            return Err(ConversionError::type_mismatch(
                format!("{:?}", op),
                "a target type",
                "none",
            ));
        }
        let operand = self.value(operand)?;
        let resolved = self.cache.operators().unary(
            self.registry,
            self.cache.invocations(),
            op,
            operand.result_type(),
            target,
            self.checked_arithmetic,
            method,
        )?;
        let detail = resolved.method.clone().unwrap_or_else(|| format!("{:?}", op));
        let info = self.info("UnaryOperator", resolved.result_type).with_detail(detail);
        Ok(Arc::new(UnaryOperator::new(info, operand, resolved.func)))
    }

    pub(super) fn binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        checked: bool,
        method: Option<MemberId>,
    ) -> Result<ValueRef, ConversionError> {
        if op == BinaryOp::ArrayIndex {
            return self.array_index_value(left, right);
        }
        if op.is_short_circuit() {
            if method.is_some() {
                return Err(ConversionError::unsupported(
                    format!("{:?}", op),
                    "bound to an operator method",
                ));
            }
            return self.short_circuit(op, left, right);
        }

        let (lhs, left_ty) = self.operand(0, left)?;
        let (rhs, right_ty) = self.operand(1, right)?;
        let resolved = self.cache.operators().binary(
            self.registry,
            self.cache.invocations(),
            op,
            left_ty,
            right_ty,
            checked || self.checked_arithmetic,
            method,
        )?;
        let detail = resolved.method.clone().unwrap_or_else(|| format!("{:?}", op));
        let info = self.info("BinaryOperator", resolved.result_type).with_detail(detail);
        Ok(Arc::new(BinaryOperator::new(
            info,
            ArgumentList::new(vec![lhs, rhs]),
            resolved.func,
        )))
    }

    // The right operand only runs when the left one does not decide the
    // result, so explicit evaluation orders do not apply here.
    fn short_circuit(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<ValueRef, ConversionError> {
        let left = self.value(left.unwrap_order().1)?;
        let right = self.value(right.unwrap_order().1)?;
        for operand in [&left, &right] {
            if operand.result_type() != TypeId::BOOL {
                return Err(ConversionError::type_mismatch(
                    format!("operator {:?}", op),
                    "Bool",
                    self.type_name(operand.result_type()),
                ));
            }
        }
        let info = self.info("ShortCircuit", TypeId::BOOL).with_detail(format!("{:?}", op));
        Ok(Arc::new(ShortCircuit::new(info, op, left, right)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wfexpr_core::expr::{BinaryOp, Expr, UnaryOp};
    use wfexpr_core::id::{SymbolRef, VariableId};
    use wfexpr_core::member::NativeFn;
    use wfexpr_core::type_id::{TypeId, TypeRegistry};
    use wfexpr_core::types::{ParamDef, TypeSemantics, Visibility};
    use wfexpr_core::value::Value;
    use wfexpr_core::{MemberId, RuntimeError};
    use wfexpr_runtime::{DenyAll, MapContext, MetadataCache, RuntimeConfig};

    use crate::{ConversionError, Converter};

    fn converter(registry: TypeRegistry) -> Converter {
        Converter::with_cache(
            Arc::new(registry),
            Arc::new(MetadataCache::new(RuntimeConfig::default())),
        )
    }

    /// `Money` with a static `op_Add`, an instance `Scale` and a private
    /// static `op_Subtract`.
    fn money() -> (TypeRegistry, TypeId, [MemberId; 3]) {
        let mut reg = TypeRegistry::new();
        let mut b = reg.register_composite("Money", TypeSemantics::Value).unwrap();
        let ty = b.type_id();
        b.field("Cents", TypeId::I64).unwrap();
        let add = b
            .static_method(
                "op_Add",
                vec![ParamDef::new("a", ty), ParamDef::new("b", ty)],
                ty,
                NativeFn::new(|_, args| {
                    let cents = |v: &Value| match v {
                        Value::Struct(s) => s.fields[0].as_i64().unwrap_or(0),
                        _ => 0,
                    };
                    let mut out = match &args[0] {
                        Value::Struct(s) => s.clone(),
                        _ => return Err(RuntimeError::Internal { message: "not money".into() }),
                    };
                    out.fields[0] = Value::I64(cents(&args[0]) + cents(&args[1]));
                    Ok(Value::Struct(out))
                }),
            )
            .unwrap();
        let scale = b
            .method(
                "op_Multiply",
                vec![ParamDef::new("a", ty), ParamDef::new("b", ty)],
                ty,
                NativeFn::new(|_, args| Ok(args[0].clone())),
            )
            .unwrap();
        let sub = b
            .add_method(
                "op_Subtract",
                Visibility::Private,
                true,
                vec![ParamDef::new("a", ty), ParamDef::new("b", ty)],
                ty,
                NativeFn::new(|_, args| Ok(args[0].clone())),
            )
            .unwrap();
        b.finish();
        (reg, ty, [add, scale, sub])
    }

    fn var(n: u32, ty: TypeId) -> (SymbolRef, Expr) {
        (SymbolRef::Variable(VariableId(n)), Expr::variable(VariableId(n), ty))
    }

    #[test]
    fn integer_arithmetic_checked_and_wrapping() {
        let c = converter(TypeRegistry::new());
        let ctx = MapContext::new();
        let wrapping = c
            .convert::<i32>(&Expr::binary(BinaryOp::Add, Expr::i32(i32::MAX), Expr::i32(1)))
            .unwrap();
        assert_eq!(wrapping.evaluate(&ctx).unwrap(), i32::MIN);

        let checked = c
            .convert::<i32>(&Expr::checked(BinaryOp::Add, Expr::i32(i32::MAX), Expr::i32(1)))
            .unwrap();
        assert!(matches!(
            checked.evaluate(&ctx),
            Err(RuntimeError::IntegerOverflow { .. })
        ));

        let modulo = c
            .convert::<i64>(&Expr::binary(BinaryOp::Modulo, Expr::i64(17), Expr::i64(5)))
            .unwrap();
        assert_eq!(modulo.evaluate(&ctx).unwrap(), 2);
    }

    #[test]
    fn mixed_operand_types_do_not_promote() {
        let c = converter(TypeRegistry::new());
        let err = c
            .convert_value(&Expr::binary(BinaryOp::Add, Expr::i32(1), Expr::i64(2)))
            .err().unwrap();
        assert!(matches!(err, ConversionError::TypeMismatch { .. }));
    }

    #[test]
    fn string_concatenation_and_comparison() {
        let c = converter(TypeRegistry::new());
        let ctx = MapContext::new();
        let (name, get_name) = var(0, TypeId::STRING);
        ctx.bind(name, Value::string("world"));
        let greeting = c
            .convert::<String>(&Expr::binary(BinaryOp::Add, Expr::string("hello "), get_name.clone()))
            .unwrap();
        assert_eq!(greeting.evaluate(&ctx).unwrap(), "hello world");

        let same = c
            .convert::<bool>(&Expr::binary(BinaryOp::Equal, get_name, Expr::string("world")))
            .unwrap();
        assert!(same.evaluate(&ctx).unwrap());
    }

    #[test]
    fn short_circuit_skips_the_right_operand() {
        let c = converter(TypeRegistry::new());
        let ctx = MapContext::new();
        let (flag, get_flag) = var(1, TypeId::BOOL);
        // Unbound: reading it would fail.
        let (_, unbound) = var(2, TypeId::BOOL);
        ctx.bind(flag, Value::Bool(false));

        let and_also = c
            .convert::<bool>(&Expr::binary(BinaryOp::AndAlso, get_flag.clone(), unbound.clone()))
            .unwrap();
        assert!(!and_also.evaluate(&ctx).unwrap());

        let and = c
            .convert::<bool>(&Expr::binary(BinaryOp::And, get_flag, unbound))
            .unwrap();
        assert!(and.evaluate(&ctx).is_err());
    }

    #[test]
    fn casts_need_a_target_type() {
        let c = converter(TypeRegistry::new());
        let err = c
            .convert_value(&Expr::unary(UnaryOp::Cast, Expr::i32(1)))
            .err().unwrap();
        assert!(matches!(err, ConversionError::TypeMismatch { .. }));

        let narrowed = c
            .convert::<i8>(&Expr::cast(UnaryOp::CheckedCast, Expr::i32(300), TypeId::I8))
            .unwrap();
        assert!(narrowed.evaluate(&MapContext::new()).is_err());
        let wrapped = c
            .convert::<i8>(&Expr::cast(UnaryOp::Cast, Expr::i32(300), TypeId::I8))
            .unwrap();
        assert_eq!(wrapped.evaluate(&MapContext::new()).unwrap(), 44);
    }

    #[test]
    fn operator_methods_must_be_static() {
        let (reg, ty, [add, scale, _]) = money();
        let c = converter(reg);
        let ctx = MapContext::new();
        let (a, get_a) = var(0, ty);
        let cents = |n: i64| {
            let mut v = c.registry().default_value(ty);
            if let Value::Struct(s) = &mut v {
                s.fields[0] = Value::I64(n);
            }
            v
        };
        ctx.bind(a, cents(250));

        let sum = c
            .convert::<Value>(&Expr::binary_with(BinaryOp::Add, get_a.clone(), get_a.clone(), add))
            .unwrap();
        assert_eq!(sum.evaluate(&ctx).unwrap(), cents(500));
        assert_eq!(sum.root().info().detail.as_deref(), Some("Money.op_Add"));

        let err = c
            .convert_value(&Expr::binary_with(BinaryOp::Multiply, get_a.clone(), get_a, scale))
            .err().unwrap();
        assert!(matches!(err, ConversionError::AmbiguousStaticBinding { .. }));
    }

    #[test]
    fn private_operator_methods_demand_access() {
        let (reg, ty, [_, _, sub]) = money();
        let c = converter(reg);
        let (a, get_a) = var(0, ty);
        let graph = c
            .convert::<Value>(&Expr::binary_with(BinaryOp::Subtract, get_a.clone(), get_a, sub))
            .unwrap();

        let trusted = MapContext::new();
        trusted.bind(a, c.registry().default_value(ty));
        assert!(graph.evaluate(&trusted).is_ok());

        let denied = MapContext::with_gate(Arc::new(DenyAll));
        denied.bind(a, c.registry().default_value(ty));
        assert!(matches!(
            graph.evaluate(&denied),
            Err(RuntimeError::AccessDenied { .. })
        ));
    }
}
