//! Runtime value representation.
//!
//! [`Value`] is the dynamic counterpart of the host type system. Value-type
//! composites ([`StructValue`]) are deep-copied on clone; reference types
//! ([`ObjectRef`], [`ArrayRef`], [`CallableRef`]) are shared handles whose
//! clones alias the same storage, so a mutation through one handle is visible
//! through every other.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::error::RuntimeError;
use crate::id::SymbolRef;
use crate::member::NativeFn;
use crate::type_id::TypeId;
use crate::types::{ConstValue, TypeSemantics};

/// A runtime value produced or consumed by graph evaluation.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Unit,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(Arc<str>),
    Enum { type_id: TypeId, discriminant: i64 },
    Struct(StructValue),
    Object(ObjectRef),
    Array(ArrayRef),
    Callable(CallableRef),
    /// Identity of a variable or argument. Only produced by the static
    /// sub-expressions of accessor patterns.
    Symbol(SymbolRef),
}

impl Value {
    /// Converts a [`ConstValue`] literal to a runtime value.
    pub fn from_const(cv: &ConstValue) -> Value {
        match cv {
            ConstValue::Null => Value::Null,
            ConstValue::Bool(b) => Value::Bool(*b),
            ConstValue::I8(v) => Value::I8(*v),
            ConstValue::I16(v) => Value::I16(*v),
            ConstValue::I32(v) => Value::I32(*v),
            ConstValue::I64(v) => Value::I64(*v),
            ConstValue::F32(bits) => Value::F32(*bits as f32),
            ConstValue::F64(v) => Value::F64(*v),
            ConstValue::Str(s) => Value::Str(Arc::from(s.as_str())),
            ConstValue::Enum {
                type_id,
                discriminant,
            } => Value::Enum {
                type_id: *type_id,
                discriminant: *discriminant,
            },
            ConstValue::Symbol(sym) => Value::Symbol(*sym),
            ConstValue::Unit => Value::Unit,
        }
    }

    pub fn string(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }

    /// Returns a human-readable description of the value's kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Unit => "Unit",
            Value::Bool(_) => "Bool",
            Value::I8(_) => "I8",
            Value::I16(_) => "I16",
            Value::I32(_) => "I32",
            Value::I64(_) => "I64",
            Value::F32(_) => "F32",
            Value::F64(_) => "F64",
            Value::Str(_) => "String",
            Value::Enum { .. } => "Enum",
            Value::Struct(_) => "Struct",
            Value::Object(_) => "Object",
            Value::Array(_) => "Array",
            Value::Callable(_) => "Callable",
            Value::Symbol(_) => "Symbol",
        }
    }

    /// The exact runtime type, when the value carries one.
    ///
    /// `Null` has no runtime type; symbols are not host values.
    pub fn runtime_type(&self) -> Option<TypeId> {
        match self {
            Value::Null | Value::Symbol(_) => None,
            Value::Unit => Some(TypeId::UNIT),
            Value::Bool(_) => Some(TypeId::BOOL),
            Value::I8(_) => Some(TypeId::I8),
            Value::I16(_) => Some(TypeId::I16),
            Value::I32(_) => Some(TypeId::I32),
            Value::I64(_) => Some(TypeId::I64),
            Value::F32(_) => Some(TypeId::F32),
            Value::F64(_) => Some(TypeId::F64),
            Value::Str(_) => Some(TypeId::STRING),
            Value::Enum { type_id, .. } => Some(*type_id),
            Value::Struct(s) => Some(s.type_id),
            Value::Object(o) => Some(o.type_id()),
            Value::Array(a) => Some(a.array_type()),
            Value::Callable(c) => Some(c.signature()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Widens any integer value to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I8(n) => Some(*n as i64),
            Value::I16(n) => Some(*n as i64),
            Value::I32(n) => Some(*n as i64),
            Value::I64(n) => Some(*n),
            _ => None,
        }
    }

    /// Widens any numeric value to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(n) => Some(*n as f64),
            Value::F64(n) => Some(*n),
            other => other.as_i64().map(|n| n as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    /// Structural equality for scalars, strings and value types; identity for
    /// reference types.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (
                Value::Enum {
                    type_id: t1,
                    discriminant: d1,
                },
                Value::Enum {
                    type_id: t2,
                    discriminant: d2,
                },
            ) => t1 == t2 && d1 == d2,
            (Value::Struct(a), Value::Struct(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Callable(a), Value::Callable(b)) => a.ptr_eq(b),
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::string(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Arc::from(v))
    }
}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// An instance of a value-type composite. Fields are in slot order.
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    pub type_id: TypeId,
    pub fields: Vec<Value>,
}

impl StructValue {
    pub fn field(&self, slot: u32) -> Option<&Value> {
        self.fields.get(slot as usize)
    }

    pub fn field_mut(&mut self, slot: u32) -> Option<&mut Value> {
        self.fields.get_mut(slot as usize)
    }
}

// ---------------------------------------------------------------------------
// Reference types
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ObjectData {
    type_id: TypeId,
    fields: RwLock<Vec<Value>>,
}

/// Shared handle to an instance of a reference-type composite.
#[derive(Clone)]
pub struct ObjectRef(Arc<ObjectData>);

impl ObjectRef {
    pub fn new(type_id: TypeId, fields: Vec<Value>) -> Self {
        ObjectRef(Arc::new(ObjectData {
            type_id,
            fields: RwLock::new(fields),
        }))
    }

    pub fn type_id(&self) -> TypeId {
        self.0.type_id
    }

    pub fn field(&self, slot: u32) -> Option<Value> {
        self.0.fields.read().get(slot as usize).cloned()
    }

    /// Replaces the value in `slot`; returns `false` if the slot does not exist.
    pub fn set_field(&self, slot: u32, value: Value) -> bool {
        match self.0.fields.write().get_mut(slot as usize) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("type_id", &self.0.type_id)
            .field("fields", &*self.0.fields.read())
            .finish()
    }
}

#[derive(Debug)]
struct ArrayData {
    array_type: TypeId,
    element_type: TypeId,
    lengths: SmallVec<[usize; 2]>,
    /// Row-major element storage.
    items: RwLock<Vec<Value>>,
}

/// Shared handle to an array of any rank.
#[derive(Clone)]
pub struct ArrayRef(Arc<ArrayData>);

impl ArrayRef {
    /// Creates an array with the given dimension lengths, every element set
    /// to `fill`.
    pub fn new(array_type: TypeId, element_type: TypeId, lengths: &[usize], fill: Value) -> Self {
        let total = lengths.iter().product();
        ArrayRef(Arc::new(ArrayData {
            array_type,
            element_type,
            lengths: SmallVec::from_slice(lengths),
            items: RwLock::new(vec![fill; total]),
        }))
    }

    /// Creates a one-dimensional array holding `items`.
    pub fn from_values(array_type: TypeId, element_type: TypeId, items: Vec<Value>) -> Self {
        let len = items.len();
        ArrayRef(Arc::new(ArrayData {
            array_type,
            element_type,
            lengths: SmallVec::from_slice(&[len]),
            items: RwLock::new(items),
        }))
    }

    pub fn array_type(&self) -> TypeId {
        self.0.array_type
    }

    pub fn element_type(&self) -> TypeId {
        self.0.element_type
    }

    pub fn rank(&self) -> usize {
        self.0.lengths.len()
    }

    pub fn lengths(&self) -> &[usize] {
        &self.0.lengths
    }

    /// Total number of elements across all dimensions.
    pub fn len(&self) -> usize {
        self.0.lengths.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major offset of `indices`, bounds-checked per dimension.
    pub fn offset(&self, indices: &[i64]) -> Result<usize, RuntimeError> {
        if indices.len() != self.rank() {
            return Err(RuntimeError::RankMismatch {
                expected: self.rank(),
                actual: indices.len(),
            });
        }
        let mut offset = 0usize;
        for (&index, &length) in indices.iter().zip(self.0.lengths.iter()) {
            if index < 0 || index as usize >= length {
                return Err(RuntimeError::IndexOutOfRange { index, length });
            }
            offset = offset * length + index as usize;
        }
        Ok(offset)
    }

    pub fn get(&self, indices: &[i64]) -> Result<Value, RuntimeError> {
        let offset = self.offset(indices)?;
        Ok(self.0.items.read()[offset].clone())
    }

    pub fn set(&self, indices: &[i64], value: Value) -> Result<(), RuntimeError> {
        let offset = self.offset(indices)?;
        self.0.items.write()[offset] = value;
        Ok(())
    }

    /// Snapshot of the elements in row-major order.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.read().clone()
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayRef")
            .field("element_type", &self.0.element_type)
            .field("lengths", &self.0.lengths)
            .finish()
    }
}

/// Shared callable value (delegate).
#[derive(Clone)]
pub struct CallableRef {
    signature: TypeId,
    func: NativeFn,
    identity: Arc<()>,
}

impl CallableRef {
    /// `signature` must be a callable type registered with
    /// [`TypeRegistry::callable_of`](crate::TypeRegistry::callable_of).
    pub fn new(signature: TypeId, func: NativeFn) -> Self {
        CallableRef {
            signature,
            func,
            identity: Arc::new(()),
        }
    }

    pub fn signature(&self) -> TypeId {
        self.signature
    }

    pub fn call(&self, args: &mut [Value]) -> Result<Value, RuntimeError> {
        self.func.call(None, args)
    }

    pub fn ptr_eq(&self, other: &CallableRef) -> bool {
        Arc::ptr_eq(&self.identity, &other.identity)
    }
}

impl fmt::Debug for CallableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableRef")
            .field("signature", &self.signature)
            .finish()
    }
}

/// Default-initialised field values of a composite, used to create new
/// instances.
#[derive(Debug, Clone)]
pub struct InstanceTemplate {
    pub type_id: TypeId,
    pub semantics: TypeSemantics,
    pub fields: Vec<Value>,
}

impl InstanceTemplate {
    /// A fresh instance: a copy for value types, a new shared object for
    /// reference types.
    pub fn instantiate(&self) -> Value {
        match self.semantics {
            TypeSemantics::Value => Value::Struct(StructValue {
                type_id: self.type_id,
                fields: self.fields.clone(),
            }),
            TypeSemantics::Reference => {
                Value::Object(ObjectRef::new(self.type_id, self.fields.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_clone_is_a_copy() {
        let original = Value::Struct(StructValue {
            type_id: TypeId(20),
            fields: vec![Value::I32(1), Value::I32(2)],
        });
        let mut copy = original.clone();
        if let Value::Struct(s) = &mut copy {
            *s.field_mut(0).unwrap() = Value::I32(99);
        }
        assert_ne!(original, copy);
        match original {
            Value::Struct(s) => assert_eq!(s.fields[0], Value::I32(1)),
            other => panic!("expected struct, got {:?}", other),
        }
    }

    #[test]
    fn object_clone_aliases_storage() {
        let obj = ObjectRef::new(TypeId(21), vec![Value::I32(0)]);
        let alias = obj.clone();
        assert!(alias.set_field(0, Value::I32(5)));
        assert_eq!(obj.field(0), Some(Value::I32(5)));
        assert_eq!(Value::Object(obj), Value::Object(alias));
    }

    #[test]
    fn object_equality_is_identity() {
        let a = ObjectRef::new(TypeId(21), vec![Value::I32(0)]);
        let b = ObjectRef::new(TypeId(21), vec![Value::I32(0)]);
        assert_ne!(Value::Object(a), Value::Object(b));
    }

    #[test]
    fn set_field_out_of_range_reports_false() {
        let obj = ObjectRef::new(TypeId(21), vec![]);
        assert!(!obj.set_field(3, Value::Null));
    }

    #[test]
    fn multi_dimensional_offsets_are_row_major() {
        let arr = ArrayRef::new(TypeId(30), TypeId::I32, &[2, 3], Value::I32(0));
        assert_eq!(arr.rank(), 2);
        assert_eq!(arr.len(), 6);
        assert_eq!(arr.offset(&[1, 2]).unwrap(), 5);
        arr.set(&[1, 0], Value::I32(7)).unwrap();
        assert_eq!(arr.to_vec()[3], Value::I32(7));
    }

    #[test]
    fn array_bounds_are_checked_per_dimension() {
        let arr = ArrayRef::new(TypeId(30), TypeId::I32, &[2, 3], Value::I32(0));
        assert_eq!(
            arr.get(&[0, 3]),
            Err(RuntimeError::IndexOutOfRange { index: 3, length: 3 })
        );
        assert_eq!(
            arr.get(&[-1, 0]),
            Err(RuntimeError::IndexOutOfRange {
                index: -1,
                length: 2
            })
        );
        assert_eq!(
            arr.get(&[0]),
            Err(RuntimeError::RankMismatch {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn from_const_narrows_f32() {
        assert_eq!(Value::from_const(&ConstValue::F32(1.5)), Value::F32(1.5));
        assert_eq!(
            Value::from_const(&ConstValue::Str("x".into())),
            Value::string("x")
        );
    }

    #[test]
    fn runtime_types() {
        assert_eq!(Value::I16(1).runtime_type(), Some(TypeId::I16));
        assert_eq!(Value::string("a").runtime_type(), Some(TypeId::STRING));
        assert_eq!(Value::Null.runtime_type(), None);
    }

    #[test]
    fn template_instantiation_respects_semantics() {
        let value_template = InstanceTemplate {
            type_id: TypeId(20),
            semantics: TypeSemantics::Value,
            fields: vec![Value::I32(0)],
        };
        assert!(matches!(value_template.instantiate(), Value::Struct(_)));

        let reference_template = InstanceTemplate {
            type_id: TypeId(21),
            semantics: TypeSemantics::Reference,
            fields: vec![Value::I32(0)],
        };
        let a = reference_template.instantiate();
        let b = reference_template.instantiate();
        assert_ne!(a, b);
    }
}
