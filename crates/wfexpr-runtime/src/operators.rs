//! Operator delegate synthesis.
//!
//! Every unary and binary operator node evaluates through an [`OperatorFn`]
//! obtained from an [`OperatorTable`]. Delegates are keyed by the closed type
//! instantiation (registry, operator, operand types, result type, checked
//! flag, overload method) and built at most once per key: the slot is a
//! set-once [`OnceLock`], so a thread that loses the publication race drops
//! its own copy and uses the published one. Publication through `OnceLock`
//! gives every reader release/acquire visibility of the delegate.
//!
//! Built-in semantics:
//! - integer arithmetic wraps when unchecked and fails with
//!   [`RuntimeError::IntegerOverflow`] when checked
//! - integer division or remainder by zero fails in both modes; floats follow IEEE 754
//! - `Add` on two strings concatenates, `null` acting as the empty string
//! - equality is structural for scalars, strings and value types and by
//!   identity for reference types
//! - explicit operator methods must be static; a non-public method demands
//!   access from the context's gate on every invocation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use smallvec::{smallvec, SmallVec};
use thiserror::Error;

use wfexpr_core::error::RuntimeError;
use wfexpr_core::expr::{BinaryOp, UnaryOp};
use wfexpr_core::id::{MemberId, RegistryId};
use wfexpr_core::member::MemberKind;
use wfexpr_core::type_id::{TypeId, TypeRegistry};
use wfexpr_core::types::{HostType, ScalarType};
use wfexpr_core::value::Value;

use crate::context::ExecutionContext;
use crate::invoke::{InvocationCache, MethodHandle};

/// A synthesized operator delegate. Receives the operand values in operand
/// order.
pub type OperatorFn =
    Arc<dyn Fn(&dyn ExecutionContext, &mut [Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// Conversion-time operator failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperatorError {
    #[error("operator {operator} is not defined for {operands}")]
    Undefined { operator: String, operands: String },

    #[error("operator method '{method}' must be static")]
    NotStatic { method: String },

    #[error("operator method {method} is not registered")]
    UnknownMethod { method: MemberId },

    #[error("'{method}' is not a method")]
    NotAMethod { method: String },

    #[error("operator method '{method}' expects {expected} operands, got {actual}")]
    Arity {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("operand {index} of operator method '{method}' expects {expected}, got {actual}")]
    OperandType {
        method: String,
        index: usize,
        expected: String,
        actual: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Unary(UnaryOp),
    Binary(BinaryOp),
}

/// Closed type instantiation of an operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperatorKey {
    pub registry: RegistryId,
    pub op: OperatorKind,
    pub operands: SmallVec<[TypeId; 2]>,
    pub result: TypeId,
    pub checked: bool,
    pub method: Option<MemberId>,
}

/// Result of operator resolution: the static result type and the shared
/// delegate.
#[derive(Clone)]
pub struct ResolvedOperator {
    pub result_type: TypeId,
    pub func: OperatorFn,
    /// `Declaring.Method` of an explicit operator method.
    pub method: Option<String>,
}

impl std::fmt::Debug for ResolvedOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedOperator")
            .field("result_type", &self.result_type)
            .field("method", &self.method)
            .finish()
    }
}

/// Shared set-once slots for operator delegates.
#[derive(Default)]
pub struct OperatorTable {
    slots: DashMap<OperatorKey, Arc<OnceLock<OperatorFn>>>,
    published: AtomicU64,
    discarded: AtomicU64,
}

impl std::fmt::Debug for OperatorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorTable")
            .field("slots", &self.slots.len())
            .field("published", &self.published())
            .field("discarded", &self.discarded())
            .finish()
    }
}

impl OperatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a slot.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Delegates stored into a slot.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Delegates built by a thread that lost the publication race.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Resolves a unary operator. `target` is the target type of casts;
    /// `checked` selects overflow checking for `Negate`.
    #[allow(clippy::too_many_arguments)]
    pub fn unary(
        &self,
        registry: &Arc<TypeRegistry>,
        invocations: Option<&Arc<InvocationCache>>,
        op: UnaryOp,
        operand: TypeId,
        target: Option<TypeId>,
        checked: bool,
        method: Option<MemberId>,
    ) -> Result<ResolvedOperator, OperatorError> {
        if let Some(method) = method {
            return self.overload(registry, invocations, OperatorKind::Unary(op), &[operand], method);
        }

        let undefined = || OperatorError::Undefined {
            operator: format!("{:?}", op),
            operands: match target {
                Some(t) => format!("{} to {}", registry.type_name(operand), registry.type_name(t)),
                None => registry.type_name(operand),
            },
        };
        let result = unary_result_type(registry, op, operand, target).ok_or_else(undefined)?;
        let key = OperatorKey {
            registry: registry.id(),
            op: OperatorKind::Unary(op),
            operands: smallvec![operand],
            result,
            checked: match op {
                UnaryOp::CheckedCast => true,
                UnaryOp::Negate => checked,
                _ => false,
            },
            method: None,
        };
        let checked = key.checked;
        let func = self.install(key, || build_unary(registry, op, checked, operand, result));
        Ok(ResolvedOperator {
            result_type: result,
            func,
            method: None,
        })
    }

    /// Resolves a binary operator. `ArrayIndex` and the short-circuit
    /// operators are evaluated by dedicated nodes and have no delegate.
    #[allow(clippy::too_many_arguments)]
    pub fn binary(
        &self,
        registry: &Arc<TypeRegistry>,
        invocations: Option<&Arc<InvocationCache>>,
        op: BinaryOp,
        left: TypeId,
        right: TypeId,
        checked: bool,
        method: Option<MemberId>,
    ) -> Result<ResolvedOperator, OperatorError> {
        if let Some(method) = method {
            return self.overload(
                registry,
                invocations,
                OperatorKind::Binary(op),
                &[left, right],
                method,
            );
        }

        let result = binary_result_type(registry, op, left, right)
            .filter(|_| op != BinaryOp::ArrayIndex)
            .ok_or_else(|| OperatorError::Undefined {
                operator: format!("{:?}", op),
                operands: format!("{} and {}", registry.type_name(left), registry.type_name(right)),
            })?;
        let checked = checked && op.is_arithmetic();
        let key = OperatorKey {
            registry: registry.id(),
            op: OperatorKind::Binary(op),
            operands: smallvec![left, right],
            result,
            checked,
            method: None,
        };
        let func = self.install(key, || build_binary(op, checked, result));
        Ok(ResolvedOperator {
            result_type: result,
            func,
            method: None,
        })
    }

    fn overload(
        &self,
        registry: &Arc<TypeRegistry>,
        invocations: Option<&Arc<InvocationCache>>,
        op: OperatorKind,
        operands: &[TypeId],
        method: MemberId,
    ) -> Result<ResolvedOperator, OperatorError> {
        let def = registry
            .member(method)
            .ok_or(OperatorError::UnknownMethod { method })?;
        let name = registry.describe_member(method);
        let MemberKind::Method {
            params,
            return_type,
            ..
        } = &def.kind
        else {
            return Err(OperatorError::NotAMethod { method: name });
        };
        if !def.is_static {
            return Err(OperatorError::NotStatic { method: name });
        }
        if params.len() != operands.len() {
            return Err(OperatorError::Arity {
                method: name,
                expected: params.len(),
                actual: operands.len(),
            });
        }
        for (index, (param, operand)) in params.iter().zip(operands).enumerate() {
            if !registry.is_assignable(*operand, param.ty) {
                return Err(OperatorError::OperandType {
                    method: name,
                    index,
                    expected: registry.type_name(param.ty),
                    actual: registry.type_name(*operand),
                });
            }
        }

        let key = OperatorKey {
            registry: registry.id(),
            op,
            operands: SmallVec::from_slice(operands),
            result: *return_type,
            checked: false,
            method: Some(method),
        };
        let handle = MethodHandle::new(Arc::clone(registry), method, invocations.cloned())
            .map_err(|_| OperatorError::UnknownMethod { method })?;
        let public = def.is_public();
        let func = self.install(key, move || {
            let handle = Arc::new(handle);
            let gate_name = handle.name();
            Arc::new(move |ctx: &dyn ExecutionContext, args: &mut [Value]| {
                if !public {
                    ctx.access_gate().demand(&gate_name)?;
                }
                handle.call(None, args)
            })
        });
        Ok(ResolvedOperator {
            result_type: *return_type,
            func,
            method: Some(name),
        })
    }

    /// Returns the delegate published for `key`, building and publishing one
    /// if the slot is empty.
    fn install(&self, key: OperatorKey, build: impl FnOnce() -> OperatorFn) -> OperatorFn {
        let op = key.op;
        let slot = Arc::clone(
            self.slots
                .entry(key)
                .or_insert_with(|| Arc::new(OnceLock::new()))
                .value(),
        );
        if let Some(func) = slot.get() {
            return Arc::clone(func);
        }

        let fresh = build();
        match slot.set(Arc::clone(&fresh)) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("published operator delegate for {:?}", op);
                fresh
            }
            Err(_) => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                slot.get().cloned().unwrap_or(fresh)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Type rules
// ---------------------------------------------------------------------------

/// Static result type of a built-in binary operator, `None` when undefined.
///
/// Operands must have the same type; there are no implicit numeric
/// promotions.
pub fn binary_result_type(registry: &TypeRegistry, op: BinaryOp, left: TypeId, right: TypeId) -> Option<TypeId> {
    let same_scalar = match (registry.scalar(left), registry.scalar(right)) {
        (Some(a), Some(b)) if a == b => Some(a),
        _ => None,
    };
    match op {
        BinaryOp::Add if left == TypeId::STRING && right == TypeId::STRING => Some(TypeId::STRING),
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
            same_scalar.filter(|s| s.is_numeric()).map(|_| left)
        }
        BinaryOp::And | BinaryOp::Or => same_scalar
            .filter(|s| *s == ScalarType::Bool || s.is_integer())
            .map(|_| left),
        BinaryOp::AndAlso | BinaryOp::OrElse => {
            (left == TypeId::BOOL && right == TypeId::BOOL).then_some(TypeId::BOOL)
        }
        BinaryOp::Equal | BinaryOp::NotEqual => (left == right
            || registry.is_assignable(left, right)
            || registry.is_assignable(right, left))
        .then_some(TypeId::BOOL),
        BinaryOp::LessThan
        | BinaryOp::LessThanOrEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqual => {
            let ordered = same_scalar.is_some_and(|s| s.is_numeric())
                || (left == TypeId::STRING && right == TypeId::STRING)
                || (left == right && matches!(registry.get(left), Some(HostType::Enum(_))));
            ordered.then_some(TypeId::BOOL)
        }
        BinaryOp::ArrayIndex => {
            let (element, rank) = registry.array_info(left)?;
            (rank == 1 && registry.scalar(right).is_some_and(|s| s.is_integer())).then_some(element)
        }
    }
}

/// Static result type of a built-in unary operator, `None` when undefined.
pub fn unary_result_type(
    registry: &TypeRegistry,
    op: UnaryOp,
    operand: TypeId,
    target: Option<TypeId>,
) -> Option<TypeId> {
    match op {
        UnaryOp::Not => match registry.scalar(operand)? {
            ScalarType::Bool => Some(TypeId::BOOL),
            s if s.is_integer() => Some(operand),
            _ => None,
        },
        UnaryOp::Negate => registry
            .scalar(operand)
            .filter(|s| s.is_numeric())
            .map(|_| operand),
        UnaryOp::Cast | UnaryOp::CheckedCast => {
            let target = target?;
            cast_kind(registry, operand, target).map(|_| target)
        }
        UnaryOp::TypeAs => {
            let target = target?;
            (target != TypeId::NULL && registry.is_reference_type(target)).then_some(target)
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CastKind {
    Identity,
    Numeric(ScalarType),
    EnumToInt(ScalarType),
    IntToEnum(TypeId),
    /// Downcast from `Object`, checked against the runtime type.
    Checked(TypeId),
}

fn cast_kind(registry: &TypeRegistry, from: TypeId, to: TypeId) -> Option<CastKind> {
    if from == to {
        return Some(CastKind::Identity);
    }
    let is_enum = |ty: TypeId| matches!(registry.get(ty), Some(HostType::Enum(_)));
    match (registry.scalar(from), registry.scalar(to)) {
        (Some(f), Some(t)) if f.is_numeric() && t.is_numeric() => return Some(CastKind::Numeric(t)),
        (None, Some(t)) if t.is_integer() && is_enum(from) => return Some(CastKind::EnumToInt(t)),
        (Some(f), None) if f.is_integer() && is_enum(to) => return Some(CastKind::IntToEnum(to)),
        _ => {}
    }
    if registry.is_assignable(from, to) {
        return Some(CastKind::Identity);
    }
    if from == TypeId::OBJECT && to != TypeId::UNIT {
        return Some(CastKind::Checked(to));
    }
    None
}

// ---------------------------------------------------------------------------
// Built-in delegates
// ---------------------------------------------------------------------------

fn operand_count(expected: usize, actual: usize) -> RuntimeError {
    RuntimeError::Internal {
        message: format!("operator delegate expects {} operands, got {}", expected, actual),
    }
}

fn build_unary(registry: &Arc<TypeRegistry>, op: UnaryOp, checked: bool, operand: TypeId, result: TypeId) -> OperatorFn {
    match op {
        UnaryOp::Not | UnaryOp::Negate => Arc::new(move |_ctx: &dyn ExecutionContext, args: &mut [Value]| {
            match args {
                [value] => eval_unary(op, checked, value),
                _ => Err(operand_count(1, args.len())),
            }
        }),
        UnaryOp::Cast | UnaryOp::CheckedCast => {
            let kind = cast_kind(registry, operand, result).unwrap_or(CastKind::Checked(result));
            let registry = Arc::clone(registry);
            Arc::new(move |_ctx: &dyn ExecutionContext, args: &mut [Value]| match args {
                [value] => eval_cast(&registry, kind, checked, value),
                _ => Err(operand_count(1, args.len())),
            })
        }
        UnaryOp::TypeAs => {
            let registry = Arc::clone(registry);
            Arc::new(move |_ctx: &dyn ExecutionContext, args: &mut [Value]| match args {
                [value] if registry.value_conforms(value, result) => Ok(value.clone()),
                [_] => Ok(Value::Null),
                _ => Err(operand_count(1, args.len())),
            })
        }
    }
}

fn build_binary(op: BinaryOp, checked: bool, result: TypeId) -> OperatorFn {
    if op == BinaryOp::Add && result == TypeId::STRING {
        return Arc::new(|_ctx: &dyn ExecutionContext, args: &mut [Value]| match args {
            [l, r] => concat(l, r),
            _ => Err(operand_count(2, args.len())),
        });
    }
    Arc::new(move |_ctx: &dyn ExecutionContext, args: &mut [Value]| match args {
        [l, r] => eval_binary(op, checked, l, r),
        _ => Err(operand_count(2, args.len())),
    })
}

fn mismatch(expected: &str, lhs: &Value, rhs: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected: expected.to_string(),
        got: format!("{} and {}", lhs.type_name(), rhs.type_name()),
    }
}

fn overflow(operation: &str) -> RuntimeError {
    RuntimeError::IntegerOverflow {
        operation: operation.to_string(),
    }
}

fn concat(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    let text = |v: &Value| -> Result<String, RuntimeError> {
        match v {
            Value::Null => Ok(String::new()),
            Value::Str(s) => Ok(s.to_string()),
            _ => Err(mismatch("String operands", lhs, rhs)),
        }
    };
    Ok(Value::from(text(lhs)? + &text(rhs)?))
}

macro_rules! checked_int_arith {
    ($op:expr, $checked:expr, $lhs:expr, $rhs:expr, $( $variant:ident ),+ ) => {
        match ($lhs, $rhs) {
            $(
                (Value::$variant(a), Value::$variant(b)) => {
                    int_arith(*a, *b, $op, $checked).map(Value::$variant)
                }
            )+
            (Value::F32(a), Value::F32(b)) => {
                Ok(Value::F32(float_arith(*a as f64, *b as f64, $op) as f32))
            }
            (Value::F64(a), Value::F64(b)) => Ok(Value::F64(float_arith(*a, *b, $op))),
            _ => Err(mismatch("matching numeric operands", $lhs, $rhs)),
        }
    }
}

/// Evaluates a built-in binary operator on two operand values.
pub fn eval_binary(op: BinaryOp, checked: bool, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
            checked_int_arith!(op, checked, lhs, rhs, I8, I16, I32, I64)
        }
        BinaryOp::And | BinaryOp::AndAlso => eval_logic(true, lhs, rhs),
        BinaryOp::Or | BinaryOp::OrElse => eval_logic(false, lhs, rhs),
        BinaryOp::Equal => Ok(Value::Bool(lhs == rhs)),
        BinaryOp::NotEqual => Ok(Value::Bool(lhs != rhs)),
        BinaryOp::LessThan
        | BinaryOp::LessThanOrEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqual => eval_compare(op, lhs, rhs),
        BinaryOp::ArrayIndex => Err(RuntimeError::Internal {
            message: "array indexing has no operator delegate".into(),
        }),
    }
}

/// Integer operations used by the arithmetic delegates.
trait IntArith: Copy + PartialEq + Default {
    fn checked_add(self, rhs: Self) -> Option<Self>;
    fn checked_sub(self, rhs: Self) -> Option<Self>;
    fn checked_mul(self, rhs: Self) -> Option<Self>;
    fn checked_div(self, rhs: Self) -> Option<Self>;
    fn checked_rem(self, rhs: Self) -> Option<Self>;
    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn wrapping_mul(self, rhs: Self) -> Self;
    fn wrapping_div(self, rhs: Self) -> Self;
    fn wrapping_rem(self, rhs: Self) -> Self;
}

macro_rules! impl_int_arith {
    ($($ty:ty),+) => {
        $(
            impl IntArith for $ty {
                fn checked_add(self, rhs: Self) -> Option<Self> { <$ty>::checked_add(self, rhs) }
                fn checked_sub(self, rhs: Self) -> Option<Self> { <$ty>::checked_sub(self, rhs) }
                fn checked_mul(self, rhs: Self) -> Option<Self> { <$ty>::checked_mul(self, rhs) }
                fn checked_div(self, rhs: Self) -> Option<Self> { <$ty>::checked_div(self, rhs) }
                fn checked_rem(self, rhs: Self) -> Option<Self> { <$ty>::checked_rem(self, rhs) }
                fn wrapping_add(self, rhs: Self) -> Self { <$ty>::wrapping_add(self, rhs) }
                fn wrapping_sub(self, rhs: Self) -> Self { <$ty>::wrapping_sub(self, rhs) }
                fn wrapping_mul(self, rhs: Self) -> Self { <$ty>::wrapping_mul(self, rhs) }
                fn wrapping_div(self, rhs: Self) -> Self { <$ty>::wrapping_div(self, rhs) }
                fn wrapping_rem(self, rhs: Self) -> Self { <$ty>::wrapping_rem(self, rhs) }
            }
        )+
    }
}

impl_int_arith!(i8, i16, i32, i64);

fn int_arith<T: IntArith>(a: T, b: T, op: BinaryOp, checked: bool) -> Result<T, RuntimeError> {
    if matches!(op, BinaryOp::Divide | BinaryOp::Modulo) && b == T::default() {
        return Err(RuntimeError::DivideByZero);
    }
    let name = || format!("{:?}", op);
    if checked {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Subtract => a.checked_sub(b),
            BinaryOp::Multiply => a.checked_mul(b),
            BinaryOp::Divide => a.checked_div(b),
            BinaryOp::Modulo => a.checked_rem(b),
            _ => return Err(mismatch_op(&name())),
        };
        result.ok_or_else(|| overflow(&name()))
    } else {
        match op {
            BinaryOp::Add => Ok(a.wrapping_add(b)),
            BinaryOp::Subtract => Ok(a.wrapping_sub(b)),
            BinaryOp::Multiply => Ok(a.wrapping_mul(b)),
            BinaryOp::Divide => Ok(a.wrapping_div(b)),
            BinaryOp::Modulo => Ok(a.wrapping_rem(b)),
            _ => Err(mismatch_op(&name())),
        }
    }
}

fn mismatch_op(name: &str) -> RuntimeError {
    RuntimeError::Internal {
        message: format!("{} is not an arithmetic operator", name),
    }
}

fn float_arith(a: f64, b: f64, op: BinaryOp) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => a / b,
        BinaryOp::Modulo => a % b,
        _ => f64::NAN,
    }
}

fn eval_logic(and: bool, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    macro_rules! bitwise {
        ($( $variant:ident ),+) => {
            match (lhs, rhs) {
                (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if and { *a && *b } else { *a || *b })),
                $(
                    (Value::$variant(a), Value::$variant(b)) => {
                        Ok(Value::$variant(if and { a & b } else { a | b }))
                    }
                )+
                _ => Err(mismatch("matching Bool or integer operands", lhs, rhs)),
            }
        };
    }
    bitwise!(I8, I16, I32, I64)
}

fn eval_compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    use std::cmp::Ordering as Cmp;

    let ordering = match (lhs, rhs) {
        (Value::I8(a), Value::I8(b)) => a.partial_cmp(b),
        (Value::I16(a), Value::I16(b)) => a.partial_cmp(b),
        (Value::I32(a), Value::I32(b)) => a.partial_cmp(b),
        (Value::I64(a), Value::I64(b)) => a.partial_cmp(b),
        (Value::F32(a), Value::F32(b)) => a.partial_cmp(b),
        (Value::F64(a), Value::F64(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
        (
            Value::Enum {
                discriminant: a, ..
            },
            Value::Enum {
                discriminant: b, ..
            },
        ) => a.partial_cmp(b),
        _ => return Err(mismatch("matching comparable operands", lhs, rhs)),
    };

    // NaN compares false under every ordering operator.
    let result = match ordering {
        None => false,
        Some(o) => match op {
            BinaryOp::LessThan => o == Cmp::Less,
            BinaryOp::LessThanOrEqual => o != Cmp::Greater,
            BinaryOp::GreaterThan => o == Cmp::Greater,
            BinaryOp::GreaterThanOrEqual => o != Cmp::Less,
            _ => false,
        },
    };
    Ok(Value::Bool(result))
}

fn eval_unary(op: UnaryOp, checked: bool, value: &Value) -> Result<Value, RuntimeError> {
    let undefined = || RuntimeError::TypeMismatch {
        expected: format!("operand of {:?}", op),
        got: value.type_name().to_string(),
    };
    match (op, value) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Not, Value::I8(n)) => Ok(Value::I8(!n)),
        (UnaryOp::Not, Value::I16(n)) => Ok(Value::I16(!n)),
        (UnaryOp::Not, Value::I32(n)) => Ok(Value::I32(!n)),
        (UnaryOp::Not, Value::I64(n)) => Ok(Value::I64(!n)),
        (UnaryOp::Negate, Value::I8(n)) => negate(*n, checked, i8::checked_neg, i8::wrapping_neg).map(Value::I8),
        (UnaryOp::Negate, Value::I16(n)) => negate(*n, checked, i16::checked_neg, i16::wrapping_neg).map(Value::I16),
        (UnaryOp::Negate, Value::I32(n)) => negate(*n, checked, i32::checked_neg, i32::wrapping_neg).map(Value::I32),
        (UnaryOp::Negate, Value::I64(n)) => negate(*n, checked, i64::checked_neg, i64::wrapping_neg).map(Value::I64),
        (UnaryOp::Negate, Value::F32(x)) => Ok(Value::F32(-x)),
        (UnaryOp::Negate, Value::F64(x)) => Ok(Value::F64(-x)),
        _ => Err(undefined()),
    }
}

fn negate<T>(
    n: T,
    checked: bool,
    checked_neg: fn(T) -> Option<T>,
    wrapping_neg: fn(T) -> T,
) -> Result<T, RuntimeError> {
    if checked {
        checked_neg(n).ok_or_else(|| overflow("negate"))
    } else {
        Ok(wrapping_neg(n))
    }
}

fn eval_cast(registry: &TypeRegistry, kind: CastKind, checked: bool, value: &Value) -> Result<Value, RuntimeError> {
    match kind {
        CastKind::Identity => Ok(value.clone()),
        CastKind::Numeric(to) => cast_numeric(value, to, checked),
        CastKind::EnumToInt(to) => match value {
            Value::Enum { discriminant, .. } => int_to(*discriminant, to, checked),
            other => Err(RuntimeError::InvalidCast {
                from: other.type_name().to_string(),
                to: format!("{:?}", to),
            }),
        },
        CastKind::IntToEnum(to) => match value.as_i64() {
            Some(discriminant) => Ok(Value::Enum {
                type_id: to,
                discriminant,
            }),
            None => Err(RuntimeError::InvalidCast {
                from: value.type_name().to_string(),
                to: registry.type_name(to),
            }),
        },
        CastKind::Checked(to) => {
            if value.is_null() {
                return if registry.is_reference_type(to) {
                    Ok(Value::Null)
                } else {
                    Err(RuntimeError::NullReference {
                        context: format!("cast of null to {}", registry.type_name(to)),
                    })
                };
            }
            if registry.value_conforms(value, to) {
                Ok(value.clone())
            } else {
                Err(RuntimeError::InvalidCast {
                    from: value
                        .runtime_type()
                        .map(|t| registry.type_name(t))
                        .unwrap_or_else(|| value.type_name().to_string()),
                    to: registry.type_name(to),
                })
            }
        }
    }
}

/// Numeric conversion. Unchecked narrowing wraps (integers) or saturates
/// (float to integer); checked narrowing fails with `IntegerOverflow`.
pub fn cast_numeric(value: &Value, to: ScalarType, checked: bool) -> Result<Value, RuntimeError> {
    if let Some(n) = value.as_i64() {
        return int_to(n, to, checked);
    }
    if let Some(x) = value.as_f64() {
        return float_to(x, to, checked);
    }
    Err(RuntimeError::InvalidCast {
        from: value.type_name().to_string(),
        to: format!("{:?}", to),
    })
}

fn int_to(n: i64, to: ScalarType, checked: bool) -> Result<Value, RuntimeError> {
    macro_rules! narrow {
        ($variant:ident, $ty:ty) => {
            if checked {
                <$ty>::try_from(n)
                    .map(Value::$variant)
                    .map_err(|_| overflow("checked cast"))
            } else {
                Ok(Value::$variant(n as $ty))
            }
        };
    }
    match to {
        ScalarType::I8 => narrow!(I8, i8),
        ScalarType::I16 => narrow!(I16, i16),
        ScalarType::I32 => narrow!(I32, i32),
        ScalarType::I64 => Ok(Value::I64(n)),
        ScalarType::F32 => Ok(Value::F32(n as f32)),
        ScalarType::F64 => Ok(Value::F64(n as f64)),
        ScalarType::Bool => Err(RuntimeError::InvalidCast {
            from: "I64".into(),
            to: "Bool".into(),
        }),
    }
}

fn float_to(x: f64, to: ScalarType, checked: bool) -> Result<Value, RuntimeError> {
    macro_rules! truncate {
        ($variant:ident, $ty:ty) => {{
            let t = x.trunc();
            if checked && (x.is_nan() || t < <$ty>::MIN as f64 || t >= -(<$ty>::MIN as f64)) {
                Err(overflow("checked cast"))
            } else {
                Ok(Value::$variant(x as $ty))
            }
        }};
    }
    match to {
        ScalarType::I8 => truncate!(I8, i8),
        ScalarType::I16 => truncate!(I16, i16),
        ScalarType::I32 => truncate!(I32, i32),
        ScalarType::I64 => truncate!(I64, i64),
        ScalarType::F32 => Ok(Value::F32(x as f32)),
        ScalarType::F64 => Ok(Value::F64(x)),
        ScalarType::Bool => Err(RuntimeError::InvalidCast {
            from: "F64".into(),
            to: "Bool".into(),
        }),
    }
}
