//! Slow reflective invocation.
//!
//! Every call re-resolves the member in the registry and validates the
//! receiver and each argument against the declared signature before running
//! the body. Used when the invocation cache is disabled.

use wfexpr_core::error::RuntimeError;
use wfexpr_core::id::MemberId;
use wfexpr_core::member::{MemberDef, MemberKind};
use wfexpr_core::type_id::TypeRegistry;
use wfexpr_core::types::{ArgumentDirection, ParamDef};
use wfexpr_core::value::Value;

/// Invokes a method or constructor member by id.
pub fn invoke(
    registry: &TypeRegistry,
    member: MemberId,
    receiver: Option<&mut Value>,
    args: &mut [Value],
) -> Result<Value, RuntimeError> {
    let def = registry.member(member).ok_or_else(|| RuntimeError::Internal {
        message: format!("member {} is not registered", member),
    })?;
    let name = registry.describe_member(member);

    match &def.kind {
        MemberKind::Method { params, body, .. } => {
            check_args(registry, &name, params, args)?;
            if def.is_static {
                return body.call(None, args);
            }
            let receiver = check_receiver(registry, def, &name, receiver)?;
            body.call(Some(receiver), args)
        }
        MemberKind::Constructor { params, body } => {
            check_args(registry, &name, params, args)?;
            let template = registry
                .instance_template(def.declaring_type)
                .ok_or_else(|| RuntimeError::Internal {
                    message: format!("{} does not declare a composite", name),
                })?;
            let mut instance = template.instantiate();
            if let Some(body) = body {
                body.call(Some(&mut instance), args)?;
            }
            Ok(instance)
        }
        MemberKind::Field { .. } | MemberKind::Property { .. } => {
            Err(RuntimeError::NotInvocable { member: name })
        }
    }
}

fn check_args(
    registry: &TypeRegistry,
    name: &str,
    params: &[ParamDef],
    args: &[Value],
) -> Result<(), RuntimeError> {
    if params.len() != args.len() {
        return Err(RuntimeError::ArityMismatch {
            member: name.to_string(),
            expected: params.len(),
            actual: args.len(),
        });
    }
    for (param, arg) in params.iter().zip(args) {
        // Out parameters arrive unassigned.
        if param.direction == ArgumentDirection::Out {
            continue;
        }
        if !registry.value_conforms(arg, param.ty) {
            return Err(RuntimeError::TypeMismatch {
                expected: registry.type_name(param.ty),
                got: arg.type_name().to_string(),
            });
        }
    }
    Ok(())
}

fn check_receiver<'v>(
    registry: &TypeRegistry,
    def: &MemberDef,
    name: &str,
    receiver: Option<&'v mut Value>,
) -> Result<&'v mut Value, RuntimeError> {
    let receiver = match receiver {
        Some(v) if !v.is_null() => v,
        _ => {
            return Err(RuntimeError::NullOwner {
                member: name.to_string(),
            })
        }
    };
    if !registry.value_conforms(receiver, def.declaring_type) {
        return Err(RuntimeError::TypeMismatch {
            expected: registry.type_name(def.declaring_type),
            got: receiver.type_name().to_string(),
        });
    }
    Ok(receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfexpr_core::member::NativeFn;
    use wfexpr_core::type_id::TypeId;
    use wfexpr_core::types::TypeSemantics;

    fn counter() -> (TypeRegistry, TypeId, MemberId, MemberId, MemberId) {
        let mut reg = TypeRegistry::new();
        let mut b = reg.register_composite("Counter", TypeSemantics::Reference).unwrap();
        b.field("Count", TypeId::I32).unwrap();
        let add = b
            .method(
                "Add",
                vec![ParamDef::new("n", TypeId::I32)],
                TypeId::I32,
                NativeFn::new(|recv, args| match (recv, &args[0]) {
                    (Some(Value::Object(obj)), Value::I32(n)) => {
                        let current = obj.field(0).and_then(|v| v.as_i64()).unwrap_or(0) as i32;
                        obj.set_field(0, Value::I32(current + n));
                        Ok(Value::I32(current + n))
                    }
                    _ => Err(RuntimeError::host("bad call")),
                }),
            )
            .unwrap();
        let ctor = b.constructor(vec![], None).unwrap();
        let twice = b
            .static_method(
                "Twice",
                vec![ParamDef::new("n", TypeId::I32)],
                TypeId::I32,
                NativeFn::new(|_, args| Ok(Value::I32(args[0].as_i64().unwrap_or(0) as i32 * 2))),
            )
            .unwrap();
        let ty = b.finish();
        (reg, ty, add, ctor, twice)
    }

    #[test]
    fn invokes_instance_and_static_methods() {
        let (reg, _, add, ctor, twice) = counter();
        let mut obj = invoke(&reg, ctor, None, &mut []).unwrap();
        assert_eq!(
            invoke(&reg, add, Some(&mut obj), &mut [Value::I32(5)]).unwrap(),
            Value::I32(5)
        );
        assert_eq!(
            invoke(&reg, twice, None, &mut [Value::I32(4)]).unwrap(),
            Value::I32(8)
        );
    }

    #[test]
    fn validates_arguments_and_receiver() {
        let (reg, _, add, ctor, _) = counter();
        let mut obj = invoke(&reg, ctor, None, &mut []).unwrap();
        assert!(matches!(
            invoke(&reg, add, Some(&mut obj), &mut []),
            Err(RuntimeError::ArityMismatch { expected: 1, actual: 0, .. })
        ));
        assert!(matches!(
            invoke(&reg, add, Some(&mut obj), &mut [Value::string("x")]),
            Err(RuntimeError::TypeMismatch { .. })
        ));
        assert!(matches!(
            invoke(&reg, add, Some(&mut Value::Null), &mut [Value::I32(1)]),
            Err(RuntimeError::NullOwner { .. })
        ));
        assert!(matches!(
            invoke(&reg, add, Some(&mut Value::I32(3)), &mut [Value::I32(1)]),
            Err(RuntimeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn fields_are_not_invocable() {
        let (reg, ty, ..) = counter();
        let field = reg.find_field(ty, "Count").unwrap().id;
        assert!(matches!(
            invoke(&reg, field, None, &mut []),
            Err(RuntimeError::NotInvocable { .. })
        ));
    }
}
