//! Field and property access, and owners of assignable members.
//!
//! Reading a member needs only the owner's value. Writing one through a
//! value-type owner has to reach the storage the owner came from, so the
//! owner is itself converted as a location and the runtime copies the
//! modified owner back after the write.

use std::sync::Arc;

use wfexpr_core::expr::{BinaryOp, Expr, MethodRef, UnaryOp};
use wfexpr_core::id::MemberId;
use wfexpr_core::member::{MemberDef, MemberKind};
use wfexpr_core::type_id::TypeId;
use wfexpr_runtime::nodes::{ArgumentList, FieldReference, FieldValue, OwnerNode, PropertyReference, PropertyValue};
use wfexpr_runtime::{LocationRef, ValueRef};

use super::Lowering;
use crate::diagnostics::ConversionError;

impl Lowering<'_> {
    pub(super) fn member_value(&mut self, target: Option<&Expr>, member: MemberId) -> Result<ValueRef, ConversionError> {
        let def = self.member_def(member)?;
        let name = self.types().describe_member(member);
        self.check_target(def, &name, target)?;
        let owner = match target {
            None => OwnerNode::Static,
            Some(target) => {
                let node = self.value(target)?;
                self.check_owner_type(def, &name, node.result_type())?;
                OwnerNode::Value(node)
            }
        };

        match &def.kind {
            MemberKind::Field { field_type, storage } => {
                let info = self.info("FieldValue", *field_type).with_detail(name.clone());
                Ok(Arc::new(FieldValue::new(info, name, storage.clone(), owner)))
            }
            MemberKind::Property {
                property_type,
                index_params,
                getter,
                ..
            } => {
                if !index_params.is_empty() {
                    return Err(indexer_without_indices(name, index_params.len()));
                }
                let getter = getter.ok_or_else(|| ConversionError::MemberWriteOnly { member: name.clone() })?;
                let getter = self.handle(getter)?;
                let info = self.info("PropertyValue", *property_type).with_detail(name);
                Ok(Arc::new(PropertyValue::new(info, getter, owner, ArgumentList::default())))
            }
            _ => Err(not_a_field_or_property(def, name)),
        }
    }

    pub(super) fn member_location(
        &mut self,
        target: Option<&Expr>,
        member: MemberId,
    ) -> Result<LocationRef, ConversionError> {
        let def = self.member_def(member)?;
        let name = self.types().describe_member(member);
        self.check_target(def, &name, target)?;
        match &def.kind {
            MemberKind::Field { .. } => {}
            MemberKind::Property {
                index_params, setter, ..
            } => {
                if !index_params.is_empty() {
                    return Err(indexer_without_indices(name, index_params.len()));
                }
                if setter.is_none() {
                    return Err(ConversionError::MemberReadOnly { member: name });
                }
            }
            _ => return Err(not_a_field_or_property(def, name)),
        }

        let owner = match target {
            None => OwnerNode::Static,
            Some(target) => {
                let (owner, owner_type) = self.location_owner(target)?;
                self.check_owner_type(def, &name, owner_type)?;
                owner
            }
        };

        match &def.kind {
            MemberKind::Field { field_type, storage } => {
                let info = self.info("FieldReference", *field_type).with_detail(name.clone());
                Ok(Arc::new(FieldReference::new(info, name, storage.clone(), owner)))
            }
            MemberKind::Property {
                property_type,
                getter,
                setter,
                ..
            } => {
                let getter = getter.map(|id| self.handle(id)).transpose()?;
                let setter = setter.map(|id| self.handle(id)).transpose()?;
                let info = self.info("PropertyReference", *property_type).with_detail(name.clone());
                Ok(Arc::new(PropertyReference::new(
                    info,
                    name,
                    getter,
                    setter,
                    owner,
                    ArgumentList::default(),
                )))
            }
            _ => Err(not_a_field_or_property(def, name)),
        }
    }

    /// Owner of a member or indexer that is written through, with its
    /// static type. Value-type owners become locations.
    pub(super) fn location_owner(&mut self, target: &Expr) -> Result<(OwnerNode, TypeId), ConversionError> {
        let by_location = self
            .peek_type(target)
            .is_some_and(|ty| self.types().is_value_type(ty));
        if by_location {
            if !is_location_shape(target) {
                return Err(ConversionError::NotAssignable {
                    expr: target.unwrap_order().1.kind_name().to_string(),
                    reason: "a value-type owner must itself be assignable".into(),
                });
            }
            let node = self.location(target)?;
            let ty = node.result_type();
            return Ok((OwnerNode::Location(node), ty));
        }

        let node = self.value(target)?;
        let ty = node.result_type();
        if self.types().is_value_type(ty) {
            return Err(ConversionError::NotAssignable {
                expr: target.unwrap_order().1.kind_name().to_string(),
                reason: format!("{} is a temporary copy", self.type_name(ty)),
            });
        }
        Ok((OwnerNode::Value(node), ty))
    }

    /// Receiver of a method call. A value-type receiver that can be
    /// assigned gets its mutations copied back; any other receiver is
    /// passed by value.
    pub(super) fn call_target(&mut self, target: &Expr) -> Result<(OwnerNode, TypeId), ConversionError> {
        let value_type = self
            .peek_type(target)
            .is_some_and(|ty| self.types().is_value_type(ty));
        if value_type && is_location_shape(target) {
            match self.location(target) {
                Ok(node) => {
                    let ty = node.result_type();
                    return Ok((OwnerNode::Location(node), ty));
                }
                Err(ConversionError::MemberReadOnly { member }) => {
                    tracing::trace!("calling on a copy of read-only {}", member);
                }
                Err(ConversionError::NotAssignable { expr, .. }) => {
                    tracing::trace!("calling on a copy of {}", expr);
                }
                Err(e) => return Err(e),
            }
        }
        let node = self.value(target)?;
        let ty = node.result_type();
        Ok((OwnerNode::Value(node), ty))
    }

    /// Static type of `expr` where it follows from the tree alone, without
    /// converting anything.
    pub(super) fn peek_type(&self, expr: &Expr) -> Option<TypeId> {
        let types = self.types();
        match expr.unwrap_order().1 {
            Expr::Constant { ty, .. } => Some(*ty),
            Expr::Member { member, .. } => types.member(*member).map(|m| m.value_type()),
            Expr::Call {
                method: MethodRef::Intrinsic { ty, .. },
                ..
            } => Some(*ty),
            Expr::Call {
                method: MethodRef::Member(id),
                ..
            } => types.member(*id).map(|m| m.value_type()),
            Expr::New { ty, .. } => Some(*ty),
            Expr::Unary {
                op: UnaryOp::Cast | UnaryOp::CheckedCast | UnaryOp::TypeAs,
                ty: Some(ty),
                method: None,
                ..
            } => Some(*ty),
            Expr::Binary {
                op: BinaryOp::ArrayIndex,
                left,
                ..
            } => self
                .peek_type(left)
                .and_then(|ty| types.array_info(ty))
                .map(|(element, _)| element),
            Expr::Index { target, .. } => {
                let owner = self.peek_type(target)?;
                if let Some((element, _)) = types.array_info(owner) {
                    return Some(element);
                }
                let indexers = types.indexers_of(owner);
                let first = indexers.first()?.value_type();
                indexers
                    .iter()
                    .all(|m| m.value_type() == first)
                    .then_some(first)
            }
            _ => None,
        }
    }

    fn check_target(&self, def: &MemberDef, name: &str, target: Option<&Expr>) -> Result<(), ConversionError> {
        match (def.is_static, target) {
            (true, Some(_)) => Err(ConversionError::TargetNotAllowed {
                member: name.to_string(),
            }),
            (false, None) => Err(ConversionError::TargetRequired {
                member: name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn check_owner_type(&self, def: &MemberDef, name: &str, owner: TypeId) -> Result<(), ConversionError> {
        if owner == def.declaring_type {
            Ok(())
        } else {
            Err(ConversionError::type_mismatch(
                format!("owner of {}", name),
                self.type_name(def.declaring_type),
                self.type_name(owner),
            ))
        }
    }
}

/// Expressions that can be converted as locations.
fn is_location_shape(expr: &Expr) -> bool {
    matches!(
        expr.unwrap_order().1,
        Expr::Member { .. }
            | Expr::Index { .. }
            | Expr::Binary {
                op: BinaryOp::ArrayIndex,
                ..
            }
            | Expr::Call {
                method: MethodRef::Intrinsic { .. },
                ..
            }
    )
}

fn indexer_without_indices(name: String, expected: usize) -> ConversionError {
    ConversionError::ArityMismatch {
        member: name,
        reason: format!("indexer expects {} index arguments, got 0", expected),
    }
}

fn not_a_field_or_property(def: &MemberDef, name: String) -> ConversionError {
    ConversionError::MemberNotFound {
        member: name,
        detail: format!("a {} is not a field or property", def.kind_name()),
    }
}
