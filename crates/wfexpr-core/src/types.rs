//! The host type system.
//!
//! Stands in for runtime reflection metadata: scalars, strings, the root
//! `Object` type, composites (value or reference semantics) with fields and
//! members, enums, arrays of any rank, and callable signatures.
//!
//! All types use nominal identity via [`TypeId`]. Composite fields and enum
//! variants use [`IndexMap`] so declaration order is preserved, which is also
//! the storage slot order of instance fields.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::id::{MemberId, SymbolRef};
use crate::type_id::TypeId;

/// The host type system. Each variant represents a distinct kind of type.
#[derive(Debug, Clone)]
pub enum HostType {
    Scalar(ScalarType),
    /// Immutable string, reference semantics.
    String,
    /// Root reference type; every value is assignable to it.
    Object,
    /// Result type of void methods.
    Unit,
    /// Type of the `null` literal.
    Null,
    Composite(CompositeDef),
    Enum(EnumDef),
    /// Array of `element` with `rank` dimensions. Always a reference type.
    Array { element: TypeId, rank: u32 },
    /// Signature of a callable value.
    Callable {
        params: Vec<TypeId>,
        return_type: TypeId,
    },
}

/// Scalar (primitive) value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl ScalarType {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ScalarType::I8 | ScalarType::I16 | ScalarType::I32 | ScalarType::I64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::F32 | ScalarType::F64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }
}

/// Copy semantics of a composite type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeSemantics {
    /// Copied on every read; mutation requires copy-back into the owner.
    Value,
    /// Shared handle; mutation is visible to every holder.
    Reference,
}

/// Named composite definition.
#[derive(Debug, Clone)]
pub struct CompositeDef {
    pub name: String,
    pub type_id: TypeId,
    pub semantics: TypeSemantics,
    /// Field members by name, in declaration order.
    pub fields: IndexMap<String, MemberId>,
    /// Every member declared on the type (fields included).
    pub members: Vec<MemberId>,
    /// Number of instance field slots.
    pub slot_count: u32,
}

/// Named enum definition with insertion-ordered variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub type_id: TypeId,
    /// Variant name to discriminant.
    pub variants: IndexMap<String, i64>,
}

/// Visibility of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

/// Direction of a parameter or argument binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArgumentDirection {
    #[default]
    In,
    Out,
    InOut,
}

impl ArgumentDirection {
    /// `true` for parameters that are bound to a location rather than a value.
    pub fn is_by_ref(self) -> bool {
        !matches!(self, ArgumentDirection::In)
    }
}

/// A method or constructor parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub ty: TypeId,
    pub direction: ArgumentDirection,
}

impl ParamDef {
    /// An `In` parameter.
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        ParamDef {
            name: name.into(),
            ty,
            direction: ArgumentDirection::In,
        }
    }

    /// A by-ref parameter with the given direction.
    pub fn by_ref(name: impl Into<String>, ty: TypeId, direction: ArgumentDirection) -> Self {
        ParamDef {
            name: name.into(),
            ty,
            direction,
        }
    }
}

/// Constant literal values carried by `Expr::Constant`.
///
/// `F32` is stored as `f64` to keep the enum simple to compare; narrowing
/// happens in [`Value::from_const`](crate::Value::from_const).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f64),
    F64(f64),
    Str(String),
    Enum { type_id: TypeId, discriminant: i64 },
    /// Identity of a variable or argument, used by accessor patterns.
    Symbol(SymbolRef),
    Unit,
}
