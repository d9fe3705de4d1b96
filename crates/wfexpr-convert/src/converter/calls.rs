//! Method calls, construction, array creation and callable invocation.

use std::sync::Arc;

use wfexpr_core::expr::Expr;
use wfexpr_core::id::MemberId;
use wfexpr_core::member::{MemberDef, MemberKind};
use wfexpr_core::type_id::TypeId;
use wfexpr_core::types::ParamDef;
use wfexpr_runtime::nodes::{
    Argument, ArgumentList, InvokeCallable, InvokeMethod, New, NewArray, NewArrayInit, OwnerNode,
};
use wfexpr_runtime::ValueRef;

use super::Lowering;
use crate::diagnostics::ConversionError;

impl<'c> Lowering<'c> {
    pub(super) fn call(&mut self, target: Option<&Expr>, method: MemberId, args: &[Expr]) -> Result<ValueRef, ConversionError> {
        let def = self.member_def(method)?;
        let name = self.types().describe_member(method);
        let MemberKind::Method {
            params,
            return_type,
            ..
        } = &def.kind
        else {
            return Err(ConversionError::MemberNotFound {
                member: name,
                detail: format!("a {} is not a method", def.kind_name()),
            });
        };

        let owner = match (def.is_static, target) {
            (true, None) => OwnerNode::Static,
            (true, Some(_)) => return Err(ConversionError::TargetNotAllowed { member: name }),
            (false, None) => return Err(ConversionError::TargetRequired { member: name }),
            (false, Some(target)) => {
                let (owner, ty) = self.call_target(target)?;
                if ty != def.declaring_type {
                    return Err(ConversionError::type_mismatch(
                        format!("target of {}", name),
                        self.type_name(def.declaring_type),
                        self.type_name(ty),
                    ));
                }
                owner
            }
        };

        let args = self.arguments(&name, params, args, Vec::new())?;
        let handle = self.handle(method)?;
        let info = self.info("InvokeMethod", *return_type).with_detail(name);
        Ok(Arc::new(InvokeMethod::new(info, handle, owner, args)))
    }

    pub(super) fn new_object(
        &mut self,
        ty: TypeId,
        constructor: Option<MemberId>,
        args: &[Expr],
    ) -> Result<ValueRef, ConversionError> {
        let type_name = self.type_name(ty);
        let template = self.types().instance_template(ty).ok_or_else(|| {
            ConversionError::type_mismatch("object construction", "a composite type", type_name.clone())
        })?;

        let (constructor, converted) = match constructor {
            Some(id) => {
                let def = self.member_def(id)?;
                if !matches!(def.kind, MemberKind::Constructor { .. }) || def.declaring_type != ty {
                    return Err(ConversionError::MemberNotFound {
                        member: self.types().describe_member(id),
                        detail: format!("not a constructor of {}", type_name),
                    });
                }
                (Some(def), Vec::new())
            }
            None => {
                let converted = args
                    .iter()
                    .map(|arg| self.value(arg.unwrap_order().1).map(Some))
                    .collect::<Result<Vec<_>, _>>()?;
                let types: Vec<TypeId> = converted.iter().flatten().map(|node| node.result_type()).collect();
                match self.types().find_constructor(ty, &types) {
                    Some(def) => (Some(def), converted),
                    None if args.is_empty() && self.default_constructible(ty) => (None, converted),
                    None => {
                        let names: Vec<String> = types.iter().map(|t| self.type_name(*t)).collect();
                        return Err(ConversionError::ArityMismatch {
                            member: format!("{}..ctor", type_name),
                            reason: format!("no constructor accepts ({})", names.join(", ")),
                        });
                    }
                }
            }
        };

        let (handle, args) = match constructor {
            Some(def) => {
                let name = self.types().describe_member(def.id);
                let args = self.arguments(&name, def.params(), args, converted)?;
                (Some(self.handle(def.id)?), args)
            }
            None => (None, ArgumentList::default()),
        };
        let detail = handle.as_ref().map_or_else(|| format!("{} (default)", type_name), |h| h.name());
        let info = self.info("New", ty).with_detail(detail);
        Ok(Arc::new(New::new(info, handle, template, args)))
    }

    pub(super) fn new_array(&mut self, element: TypeId, bounds: &[Expr]) -> Result<ValueRef, ConversionError> {
        if bounds.is_empty() {
            return Err(ConversionError::ArityMismatch {
                member: format!("{}[]", self.type_name(element)),
                reason: "array creation needs at least one bound".into(),
            });
        }
        let array_type = self.array_type(element, bounds.len())?;
        let mut lengths = Vec::with_capacity(bounds.len());
        for (position, bound) in bounds.iter().enumerate() {
            let (arg, ty) = self.operand(position, bound)?;
            if !self.is_integer(ty) {
                return Err(ConversionError::type_mismatch(
                    "array bound",
                    "an integer type",
                    self.type_name(ty),
                ));
            }
            lengths.push(arg);
        }
        let fill = self.types().default_value(element);
        let info = self.info("NewArray", array_type);
        Ok(Arc::new(NewArray::new(info, element, fill, ArgumentList::new(lengths))))
    }

    pub(super) fn array_init(&mut self, element: TypeId, items: &[Expr]) -> Result<ValueRef, ConversionError> {
        let array_type = self.array_type(element, 1)?;
        let mut values = Vec::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            let (arg, ty) = self.operand(position, item)?;
            self.expect_assignable(format!("array item {}", position), ty, element)?;
            values.push(arg);
        }
        let info = self.info("NewArrayInit", array_type);
        Ok(Arc::new(NewArrayInit::new(info, element, ArgumentList::new(values))))
    }

    pub(super) fn invoke(&mut self, callable: &Expr, args: &[Expr]) -> Result<ValueRef, ConversionError> {
        let callable = self.value(callable.unwrap_order().1)?;
        let ty = callable.result_type();
        let types = self.types();
        let Some((params, return_type)) = types.callable_signature(ty) else {
            return Err(ConversionError::type_mismatch(
                "invocation",
                "a callable",
                self.type_name(ty),
            ));
        };
        if params.len() != args.len() {
            return Err(ConversionError::ArityMismatch {
                member: self.type_name(ty),
                reason: format!("expects {} arguments, got {}", params.len(), args.len()),
            });
        }

        let mut list = Vec::with_capacity(args.len());
        for (position, (param, arg)) in params.iter().zip(args).enumerate() {
            let (arg, arg_type) = self.operand(position, arg)?;
            self.expect_assignable(format!("argument {} of {}", position, self.type_name(ty)), arg_type, *param)?;
            list.push(arg);
        }
        let info = self.info("InvokeCallable", return_type);
        Ok(Arc::new(InvokeCallable::new(info, callable, ArgumentList::new(list))))
    }

    /// Binds `args` to `params`. By-ref parameters take locations whose
    /// type matches exactly. `converted` holds value nodes already built
    /// for some arguments (indexed by position) so they are not converted
    /// twice.
    fn arguments(
        &mut self,
        member: &str,
        params: &[ParamDef],
        args: &[Expr],
        mut converted: Vec<Option<ValueRef>>,
    ) -> Result<ArgumentList, ConversionError> {
        if params.len() != args.len() {
            return Err(ConversionError::ArityMismatch {
                member: member.to_string(),
                reason: format!("expects {} arguments, got {}", params.len(), args.len()),
            });
        }
        converted.resize(args.len(), None);

        let mut bound = Vec::with_capacity(args.len());
        for (position, ((param, arg), done)) in params.iter().zip(args).zip(converted).enumerate() {
            let (order, inner) = arg.unwrap_order();
            let order = order.unwrap_or(position as u32);
            if param.direction.is_by_ref() {
                let node = self.location(inner)?;
                if node.result_type() != param.ty {
                    return Err(ConversionError::type_mismatch(
                        format!("by-ref argument '{}' of {}", param.name, member),
                        self.type_name(param.ty),
                        self.type_name(node.result_type()),
                    ));
                }
                bound.push(Argument::by_ref(param.direction, order, node));
            } else {
                let node = match done {
                    Some(node) => node,
                    None => self.value(inner)?,
                };
                self.expect_assignable(
                    format!("argument '{}' of {}", param.name, member),
                    node.result_type(),
                    param.ty,
                )?;
                bound.push(Argument::value(order, node));
            }
        }
        Ok(ArgumentList::new(bound))
    }

    /// Whether `ty` may be created without running a constructor: value
    /// types always, reference types only when they declare none.
    fn default_constructible(&self, ty: TypeId) -> bool {
        let types = self.types();
        types.is_value_type(ty)
            || types.composite(ty).is_some_and(|def| {
                def.members
                    .iter()
                    .filter_map(|id| types.member(*id))
                    .all(|m| !is_constructor(m))
            })
    }

    fn array_type(&self, element: TypeId, rank: usize) -> Result<TypeId, ConversionError> {
        self.types().find_array(element, rank as u32).ok_or_else(|| {
            ConversionError::type_mismatch(
                "array creation",
                format!("a registered rank-{} array of {}", rank, self.type_name(element)),
                "no such array type",
            )
        })
    }
}

fn is_constructor(member: &MemberDef) -> bool {
    matches!(member.kind, MemberKind::Constructor { .. })
}
