//! Array element and custom indexer access.

use std::sync::Arc;

use smallvec::SmallVec;

use wfexpr_core::expr::Expr;
use wfexpr_core::member::{MemberDef, MemberKind};
use wfexpr_core::type_id::TypeId;
use wfexpr_runtime::nodes::{
    Argument, ArgumentList, ArrayItemReference, ArrayItemValue, OwnerNode, PropertyReference, PropertyValue,
};
use wfexpr_runtime::{LocationRef, ValueRef};

use super::Lowering;
use crate::diagnostics::ConversionError;

impl<'c> Lowering<'c> {
    /// `array[index]` on a one-dimensional array.
    pub(super) fn array_index_value(&mut self, array: &Expr, index: &Expr) -> Result<ValueRef, ConversionError> {
        let (array, array_type) = self.operand(0, array)?;
        let (operands, element) = self.array_operands(array, array_type, std::slice::from_ref(index))?;
        let info = self.info("ArrayItemValue", element);
        Ok(Arc::new(ArrayItemValue::new(info, operands)))
    }

    pub(super) fn array_index_location(&mut self, array: &Expr, index: &Expr) -> Result<LocationRef, ConversionError> {
        let (array, array_type) = self.operand(0, array)?;
        let (operands, element) = self.array_operands(array, array_type, std::slice::from_ref(index))?;
        let info = self.info("ArrayItemReference", element);
        Ok(Arc::new(ArrayItemReference::new(info, operands)))
    }

    pub(super) fn index_value(&mut self, target: &Expr, indices: &[Expr]) -> Result<ValueRef, ConversionError> {
        let (order, inner) = target.unwrap_order();
        let owner = self.value(inner)?;
        let owner_type = owner.result_type();

        if self.types().array_info(owner_type).is_some() {
            let array = Argument::value(order.unwrap_or(0), owner);
            let (operands, element) = self.array_operands(array, owner_type, indices)?;
            let info = self.info(array_kind(indices, "Value"), element);
            return Ok(Arc::new(ArrayItemValue::new(info, operands)));
        }

        let (def, args) = self.indexer(owner_type, indices)?;
        let name = self.types().describe_member(def.id);
        let MemberKind::Property {
            property_type, getter, ..
        } = &def.kind
        else {
            return Err(not_an_indexer(def, name));
        };
        let getter = getter.ok_or_else(|| ConversionError::MemberWriteOnly { member: name.clone() })?;
        let getter = self.handle(getter)?;
        let info = self.info("IndexerValue", *property_type).with_detail(name);
        Ok(Arc::new(PropertyValue::new(info, getter, OwnerNode::Value(owner), args)))
    }

    pub(super) fn index_location(&mut self, target: &Expr, indices: &[Expr]) -> Result<LocationRef, ConversionError> {
        let order = target.unwrap_order().0;
        let (owner, owner_type) = self.location_owner(target)?;

        if self.types().array_info(owner_type).is_some() {
            // Arrays are reference types, so the owner is always a value here.
            let OwnerNode::Value(node) = owner else {
                return Err(ConversionError::NotAssignable {
                    expr: self.type_name(owner_type),
                    reason: "array owner resolved as a location".into(),
                });
            };
            let array = Argument::value(order.unwrap_or(0), node);
            let (operands, element) = self.array_operands(array, owner_type, indices)?;
            let info = self.info(array_kind(indices, "Reference"), element);
            return Ok(Arc::new(ArrayItemReference::new(info, operands)));
        }

        let (def, args) = self.indexer(owner_type, indices)?;
        let name = self.types().describe_member(def.id);
        let MemberKind::Property {
            property_type,
            getter,
            setter,
            ..
        } = &def.kind
        else {
            return Err(not_an_indexer(def, name));
        };
        let Some(setter) = setter else {
            return Err(ConversionError::MemberReadOnly { member: name });
        };
        let setter = self.handle(*setter)?;
        let getter = getter.map(|id| self.handle(id)).transpose()?;
        let info = self.info("IndexerReference", *property_type).with_detail(name.clone());
        Ok(Arc::new(PropertyReference::new(
            info,
            name,
            getter,
            Some(setter),
            owner,
            args,
        )))
    }

    /// Array operand followed by integer indices, one per dimension.
    fn array_operands(
        &mut self,
        array: Argument,
        array_type: TypeId,
        indices: &[Expr],
    ) -> Result<(ArgumentList, TypeId), ConversionError> {
        let (element, rank) = self.types().array_info(array_type).ok_or_else(|| {
            ConversionError::type_mismatch("array access", "an array", self.type_name(array_type))
        })?;
        if rank as usize != indices.len() {
            return Err(ConversionError::ArityMismatch {
                member: self.type_name(array_type),
                reason: format!("expects {} indices, got {}", rank, indices.len()),
            });
        }

        let mut operands = Vec::with_capacity(indices.len() + 1);
        operands.push(array);
        for (position, index) in indices.iter().enumerate() {
            let (index, ty) = self.operand(position + 1, index)?;
            if !self.is_integer(ty) {
                return Err(ConversionError::type_mismatch(
                    "array index",
                    "an integer type",
                    self.type_name(ty),
                ));
            }
            operands.push(index);
        }
        Ok((ArgumentList::new(operands), element))
    }

    /// Public indexer of `owner` best matching the index argument types.
    fn indexer(&mut self, owner: TypeId, indices: &[Expr]) -> Result<(&'c Arc<MemberDef>, ArgumentList), ConversionError> {
        let mut args = Vec::with_capacity(indices.len());
        let mut types: SmallVec<[TypeId; 2]> = SmallVec::new();
        for (position, index) in indices.iter().enumerate() {
            let (arg, ty) = self.operand(position, index)?;
            args.push(arg);
            types.push(ty);
        }

        let registry = self.types();
        match registry.find_indexer(owner, &types) {
            Some(def) if def.is_public() => Ok((def, ArgumentList::new(args))),
            _ => {
                let names: Vec<String> = types.iter().map(|t| self.type_name(*t)).collect();
                Err(ConversionError::MemberNotFound {
                    member: format!("{}[{}]", self.type_name(owner), names.join(", ")),
                    detail: "no public indexer accepts these arguments".into(),
                })
            }
        }
    }
}

fn array_kind(indices: &[Expr], suffix: &str) -> String {
    if indices.len() > 1 {
        format!("MultidimensionalArrayItem{}", suffix)
    } else {
        format!("ArrayItem{}", suffix)
    }
}

fn not_an_indexer(def: &MemberDef, name: String) -> ConversionError {
    ConversionError::MemberNotFound {
        member: name,
        detail: format!("a {} is not an indexer", def.kind_name()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wfexpr_core::expr::{BinaryOp, Expr};
    use wfexpr_core::id::{SymbolRef, VariableId};
    use wfexpr_core::member::NativeFn;
    use wfexpr_core::type_id::{TypeId, TypeRegistry};
    use wfexpr_core::types::TypeSemantics;
    use wfexpr_core::value::{ArrayRef, Value};
    use wfexpr_core::RuntimeError;
    use wfexpr_runtime::{MapContext, MetadataCache, RuntimeConfig};

    use crate::{ConversionError, Converter};

    fn converter(registry: TypeRegistry) -> Converter {
        Converter::with_cache(
            Arc::new(registry),
            Arc::new(MetadataCache::new(RuntimeConfig::default())),
        )
    }

    #[test]
    fn one_dimensional_array_read_and_write() {
        let mut reg = TypeRegistry::new();
        let ints = reg.array_of(TypeId::I32, 1);
        let c = converter(reg);
        let ctx = MapContext::new();
        let xs = SymbolRef::Variable(VariableId(0));
        ctx.bind(
            xs,
            Value::Array(ArrayRef::from_values(ints, TypeId::I32, vec![Value::I32(1), Value::I32(2)])),
        );
        let item = Expr::array_index(Expr::variable(VariableId(0), ints), Expr::i32(1));

        let read = c.convert::<i32>(&item).unwrap();
        assert_eq!(read.evaluate(&ctx).unwrap(), 2);

        let write = c.convert_reference::<i32>(&item).unwrap();
        write.resolve_location(&ctx).unwrap().set(&ctx, 20).unwrap();
        assert_eq!(read.evaluate(&ctx).unwrap(), 20);

        let out_of_range = c
            .convert::<i32>(&Expr::array_index(Expr::variable(VariableId(0), ints), Expr::i32(5)))
            .unwrap();
        assert!(matches!(
            out_of_range.evaluate(&ctx),
            Err(RuntimeError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn multidimensional_array_needs_one_index_per_rank() {
        let mut reg = TypeRegistry::new();
        let grid = reg.array_of(TypeId::I64, 2);
        let c = converter(reg);
        let ctx = MapContext::new();
        ctx.bind(
            SymbolRef::Variable(VariableId(0)),
            Value::Array(ArrayRef::new(grid, TypeId::I64, &[2, 3], Value::I64(0))),
        );
        let cell = Expr::index(Expr::variable(VariableId(0), grid), vec![Expr::i32(1), Expr::i32(2)]);
        let location = c.convert_reference::<i64>(&cell).unwrap();
        assert_eq!(location.inspect().root().kind, "MultidimensionalArrayItemReference");
        location.resolve_location(&ctx).unwrap().set(&ctx, 9).unwrap();
        assert_eq!(c.convert::<i64>(&cell).unwrap().evaluate(&ctx).unwrap(), 9);

        let err = c
            .convert_value(&Expr::index(Expr::variable(VariableId(0), grid), vec![Expr::i32(1)]))
            .err().unwrap();
        assert!(matches!(err, ConversionError::ArityMismatch { .. }));

        let err = c
            .convert_value(&Expr::index(
                Expr::variable(VariableId(0), grid),
                vec![Expr::i32(0), Expr::string("x")],
            ))
            .err().unwrap();
        assert!(matches!(err, ConversionError::TypeMismatch { .. }));
    }

    #[test]
    fn array_index_operator_rejects_non_arrays() {
        let c = converter(TypeRegistry::new());
        let err = c
            .convert_value(&Expr::binary(BinaryOp::ArrayIndex, Expr::string("abc"), Expr::i32(0)))
            .err().unwrap();
        assert!(matches!(err, ConversionError::TypeMismatch { .. }));
    }

    #[test]
    fn custom_indexer_read_and_missing_setter() {
        let mut reg = TypeRegistry::new();
        let mut b = reg.register_composite("Lookup", TypeSemantics::Reference).unwrap();
        let lookup = b.type_id();
        b.indexer(
            TypeId::STRING,
            vec![TypeId::STRING],
            Some(NativeFn::new(|_, args| {
                let key = args[0].as_str().unwrap_or_default().to_uppercase();
                Ok(Value::string(&key))
            })),
            None,
        )
        .unwrap();
        b.finish();
        let instance = reg.instance_template(lookup).unwrap().instantiate();
        let c = converter(reg);
        let ctx = MapContext::new();
        ctx.bind(SymbolRef::Variable(VariableId(0)), instance);

        let entry = Expr::index(Expr::variable(VariableId(0), lookup), vec![Expr::string("key")]);
        let read = c.convert::<String>(&entry).unwrap();
        assert_eq!(read.evaluate(&ctx).unwrap(), "KEY");
        assert_eq!(read.inspect().root().kind, "IndexerValue");

        let err = c.convert_reference::<String>(&entry).unwrap_err();
        assert!(matches!(err, ConversionError::MemberReadOnly { .. }));

        let err = c
            .convert_value(&Expr::index(Expr::variable(VariableId(0), lookup), vec![Expr::i32(3)]))
            .err().unwrap();
        assert!(matches!(err, ConversionError::MemberNotFound { .. }));
    }
}
