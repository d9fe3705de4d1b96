//! Member descriptors: fields, properties, methods and constructors.
//!
//! A [`MemberDef`] is the Rust counterpart of a reflective member descriptor.
//! Its identity is `(RegistryId, MemberId)`; the invocation cache keys
//! compiled thunks by that pair.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::RuntimeError;
use crate::id::MemberId;
use crate::type_id::TypeId;
use crate::types::{ParamDef, Visibility};
use crate::value::Value;

/// Signature shared by native method bodies and compiled thunks.
///
/// The receiver is `None` for static members. It is mutable so that methods
/// and property setters of value types can mutate the copy they are handed;
/// the caller decides whether that copy is written back to its owner.
pub type NativeSig =
    dyn Fn(Option<&mut Value>, &mut [Value]) -> Result<Value, RuntimeError> + Send + Sync;

/// A host-provided function body.
#[derive(Clone)]
pub struct NativeFn(Arc<NativeSig>);

impl NativeFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<&mut Value>, &mut [Value]) -> Result<Value, RuntimeError>
            + Send
            + Sync
            + 'static,
    {
        NativeFn(Arc::new(f))
    }

    pub fn call(&self, receiver: Option<&mut Value>, args: &mut [Value]) -> Result<Value, RuntimeError> {
        (self.0)(receiver, args)
    }

    /// The shared function object, for callers that store it directly.
    pub fn shared(&self) -> Arc<NativeSig> {
        Arc::clone(&self.0)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NativeFn(..)")
    }
}

/// Process-wide storage of a static field.
pub type StaticCell = Arc<RwLock<Value>>;

/// Where a field's value lives.
#[derive(Debug, Clone)]
pub enum FieldStorage {
    /// Slot index into the owner's field vector.
    Instance { slot: u32 },
    Static(StaticCell),
}

/// Kind-specific data of a member.
#[derive(Debug, Clone)]
pub enum MemberKind {
    Field {
        field_type: TypeId,
        storage: FieldStorage,
    },
    /// A property; custom indexers are properties with `index_params`.
    Property {
        property_type: TypeId,
        index_params: Vec<TypeId>,
        getter: Option<MemberId>,
        setter: Option<MemberId>,
    },
    Method {
        params: Vec<ParamDef>,
        return_type: TypeId,
        body: NativeFn,
    },
    /// Runs `body` against a freshly default-initialised instance.
    Constructor {
        params: Vec<ParamDef>,
        body: Option<NativeFn>,
    },
}

/// A member descriptor.
#[derive(Debug, Clone)]
pub struct MemberDef {
    pub id: MemberId,
    pub name: String,
    pub declaring_type: TypeId,
    pub visibility: Visibility,
    pub is_static: bool,
    pub kind: MemberKind,
}

impl MemberDef {
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// Parameters of a method or constructor; empty for other members.
    pub fn params(&self) -> &[ParamDef] {
        match &self.kind {
            MemberKind::Method { params, .. } | MemberKind::Constructor { params, .. } => params,
            _ => &[],
        }
    }

    /// Declared type of a field or property, return type of a method,
    /// declaring type of a constructor.
    pub fn value_type(&self) -> TypeId {
        match &self.kind {
            MemberKind::Field { field_type, .. } => *field_type,
            MemberKind::Property { property_type, .. } => *property_type,
            MemberKind::Method { return_type, .. } => *return_type,
            MemberKind::Constructor { .. } => self.declaring_type,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            MemberKind::Field { .. } => "field",
            MemberKind::Property { index_params, .. } if !index_params.is_empty() => "indexer",
            MemberKind::Property { .. } => "property",
            MemberKind::Method { .. } => "method",
            MemberKind::Constructor { .. } => "constructor",
        }
    }

    pub fn is_indexer(&self) -> bool {
        matches!(&self.kind, MemberKind::Property { index_params, .. } if !index_params.is_empty())
    }
}
