//! Assignable storage cells.
//!
//! A [`Location`] is resolved from a location node at evaluation time. Its
//! owner is captured once, as is every index value, so `get` and `set`
//! address the same cell.
//!
//! Value-type owners are held as an owner *location*: `set` reads the owner,
//! mutates the copy and writes it back through the owner location. Nesting
//! composes, so `outer.inner.field = v` writes `inner` back into `outer` and
//! `outer` back into its variable.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use wfexpr_core::error::RuntimeError;
use wfexpr_core::id::SymbolRef;
use wfexpr_core::member::FieldStorage;
use wfexpr_core::type_id::TypeId;
use wfexpr_core::value::Value;

use crate::context::ExecutionContext;
use crate::invoke::MethodHandle;

pub trait Location: Send + Sync {
    /// Declared type of the cell.
    fn location_type(&self) -> TypeId;

    fn get(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError>;

    fn set(&self, ctx: &dyn ExecutionContext, value: Value) -> Result<(), RuntimeError>;
}

pub type BoxedLocation = Box<dyn Location>;

/// The instance a member location operates on.
pub enum Owner {
    /// Static member; no instance.
    Static,
    /// An evaluated owner value. Reference-type owners are shared handles, so
    /// writes reach the original. A value-type owner held here is a detached
    /// copy and only supports reads.
    Shared(Value),
    /// Value-type owner reached through its own location.
    ValueType(BoxedLocation),
}

impl Owner {
    /// Current owner value; `None` for static members.
    fn read(&self, ctx: &dyn ExecutionContext) -> Result<Option<Value>, RuntimeError> {
        match self {
            Owner::Static => Ok(None),
            Owner::Shared(value) => Ok(Some(value.clone())),
            Owner::ValueType(location) => location.get(ctx).map(Some),
        }
    }

    /// Runs `mutate` on the owner and writes a value-type owner back.
    fn update<R>(
        &self,
        ctx: &dyn ExecutionContext,
        member: &str,
        mutate: impl FnOnce(Option<&mut Value>) -> Result<R, RuntimeError>,
    ) -> Result<R, RuntimeError> {
        match self {
            Owner::Static => mutate(None),
            Owner::Shared(Value::Struct(_)) => {
                debug_assert!(false, "value-type owner of {} has no location", member);
                Err(RuntimeError::Internal {
                    message: format!("value-type owner of {} has no location to write back to", member),
                })
            }
            Owner::Shared(value) => {
                let mut handle = value.clone();
                mutate(Some(&mut handle))
            }
            Owner::ValueType(location) => {
                let mut copy = location.get(ctx)?;
                let result = mutate(Some(&mut copy))?;
                location.set(ctx, copy)?;
                Ok(result)
            }
        }
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Static => f.write_str("Static"),
            Owner::Shared(v) => f.debug_tuple("Shared").field(v).finish(),
            Owner::ValueType(l) => write!(f, "ValueType(<{}>)", l.location_type()),
        }
    }
}

// ---------------------------------------------------------------------------
// Symbols
// ---------------------------------------------------------------------------

/// A variable, argument or delegate argument in the execution context.
#[derive(Debug, Clone, Copy)]
pub struct SymbolLocation {
    pub symbol: SymbolRef,
    pub ty: TypeId,
}

impl Location for SymbolLocation {
    fn location_type(&self) -> TypeId {
        self.ty
    }

    fn get(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        ctx.read_symbol(self.symbol)
    }

    fn set(&self, ctx: &dyn ExecutionContext, value: Value) -> Result<(), RuntimeError> {
        ctx.write_symbol(self.symbol, value)
    }
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// Instance or static field.
#[derive(Debug)]
pub struct FieldLocation {
    name: String,
    field_type: TypeId,
    storage: FieldStorage,
    owner: Owner,
}

impl FieldLocation {
    pub fn new(name: impl Into<String>, field_type: TypeId, storage: FieldStorage, owner: Owner) -> Self {
        FieldLocation {
            name: name.into(),
            field_type,
            storage,
            owner,
        }
    }
}

/// Reads slot `slot` of an owner value.
pub fn read_field(owner: &Value, slot: u32, member: &str) -> Result<Value, RuntimeError> {
    let missing = || RuntimeError::Internal {
        message: format!("{} has no slot {}", member, slot),
    };
    match owner {
        Value::Null => Err(RuntimeError::NullOwner {
            member: member.to_string(),
        }),
        Value::Object(obj) => obj.field(slot).ok_or_else(missing),
        Value::Struct(s) => s.field(slot).cloned().ok_or_else(missing),
        other => Err(RuntimeError::TypeMismatch {
            expected: format!("owner of {}", member),
            got: other.type_name().to_string(),
        }),
    }
}

fn write_field(owner: &mut Value, slot: u32, member: &str, value: Value) -> Result<(), RuntimeError> {
    let missing = || RuntimeError::Internal {
        message: format!("{} has no slot {}", member, slot),
    };
    match owner {
        Value::Null => Err(RuntimeError::NullOwner {
            member: member.to_string(),
        }),
        Value::Object(obj) => obj.set_field(slot, value).then_some(()).ok_or_else(missing),
        Value::Struct(s) => {
            *s.field_mut(slot).ok_or_else(missing)? = value;
            Ok(())
        }
        other => Err(RuntimeError::TypeMismatch {
            expected: format!("owner of {}", member),
            got: other.type_name().to_string(),
        }),
    }
}

impl Location for FieldLocation {
    fn location_type(&self) -> TypeId {
        self.field_type
    }

    fn get(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        match &self.storage {
            FieldStorage::Static(cell) => Ok(cell.read().clone()),
            FieldStorage::Instance { slot } => match self.owner.read(ctx)? {
                Some(owner) => read_field(&owner, *slot, &self.name),
                None => Err(RuntimeError::NullOwner {
                    member: self.name.clone(),
                }),
            },
        }
    }

    fn set(&self, ctx: &dyn ExecutionContext, value: Value) -> Result<(), RuntimeError> {
        match &self.storage {
            FieldStorage::Static(cell) => {
                *cell.write() = value;
                Ok(())
            }
            FieldStorage::Instance { slot } => self.owner.update(ctx, &self.name, |owner| match owner {
                Some(owner) => write_field(owner, *slot, &self.name, value),
                None => Err(RuntimeError::NullOwner {
                    member: self.name.clone(),
                }),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Properties and custom indexers
// ---------------------------------------------------------------------------

/// A property, or a custom indexer when `index_args` is non-empty.
///
/// Accessors run through method handles, which use cached thunks or the
/// reflective slow path depending on configuration.
pub struct PropertyLocation {
    name: String,
    property_type: TypeId,
    getter: Option<Arc<MethodHandle>>,
    setter: Option<Arc<MethodHandle>>,
    owner: Owner,
    index_args: SmallVec<[Value; 2]>,
}

impl PropertyLocation {
    pub fn new(
        name: impl Into<String>,
        property_type: TypeId,
        getter: Option<Arc<MethodHandle>>,
        setter: Option<Arc<MethodHandle>>,
        owner: Owner,
        index_args: SmallVec<[Value; 2]>,
    ) -> Self {
        PropertyLocation {
            name: name.into(),
            property_type,
            getter,
            setter,
            owner,
            index_args,
        }
    }
}

impl fmt::Debug for PropertyLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyLocation")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("index_args", &self.index_args)
            .finish()
    }
}

impl Location for PropertyLocation {
    fn location_type(&self) -> TypeId {
        self.property_type
    }

    fn get(&self, ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        let getter = self.getter.as_ref().ok_or_else(|| RuntimeError::NotInvocable {
            member: format!("getter of {}", self.name),
        })?;
        let mut args: SmallVec<[Value; 2]> = self.index_args.clone();
        match self.owner.read(ctx)? {
            Some(mut owner) => getter.call(Some(&mut owner), &mut args),
            None => getter.call(None, &mut args),
        }
    }

    fn set(&self, ctx: &dyn ExecutionContext, value: Value) -> Result<(), RuntimeError> {
        let setter = self.setter.as_ref().ok_or_else(|| RuntimeError::NotInvocable {
            member: format!("setter of {}", self.name),
        })?;
        let mut args: SmallVec<[Value; 3]> = self.index_args.iter().cloned().collect();
        args.push(value);
        self.owner
            .update(ctx, &self.name, |owner| setter.call(owner, &mut args))
            .map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Arrays
// ---------------------------------------------------------------------------

/// Element of a one- or multi-dimensional array. Arrays are reference types,
/// so writes go straight to the shared storage.
#[derive(Debug)]
pub struct ArrayElementLocation {
    array: Value,
    indices: SmallVec<[i64; 2]>,
    element_type: TypeId,
}

impl ArrayElementLocation {
    pub fn new(array: Value, indices: SmallVec<[i64; 2]>, element_type: TypeId) -> Self {
        ArrayElementLocation {
            array,
            indices,
            element_type,
        }
    }
}

/// Reads one element, failing on a null or non-array operand.
pub fn array_element(array: &Value, indices: &[i64]) -> Result<Value, RuntimeError> {
    match array {
        Value::Array(a) => a.get(indices),
        Value::Null => Err(RuntimeError::NullReference {
            context: "array element access".into(),
        }),
        other => Err(RuntimeError::TypeMismatch {
            expected: "array".into(),
            got: other.type_name().to_string(),
        }),
    }
}

impl Location for ArrayElementLocation {
    fn location_type(&self) -> TypeId {
        self.element_type
    }

    fn get(&self, _ctx: &dyn ExecutionContext) -> Result<Value, RuntimeError> {
        array_element(&self.array, &self.indices)
    }

    fn set(&self, _ctx: &dyn ExecutionContext, value: Value) -> Result<(), RuntimeError> {
        match &self.array {
            Value::Array(a) => a.set(&self.indices, value),
            other => array_element(other, &self.indices).map(|_| ()),
        }
    }
}
