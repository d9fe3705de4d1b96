//! TypeId and TypeRegistry for nominal typing.
//!
//! Every host type has a unique [`TypeId`] providing O(1) identity
//! comparison. The [`TypeRegistry`] owns type definitions and member
//! descriptors, pre-registering the scalar types plus String, Object, Unit
//! and Null on construction. Composites are declared through a
//! [`CompositeBuilder`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::{MemberId, RegistryId};
use crate::member::{FieldStorage, MemberDef, MemberKind, NativeFn};
use crate::types::{CompositeDef, EnumDef, HostType, ParamDef, ScalarType, TypeSemantics, Visibility};
use crate::value::{InstanceTemplate, StructValue, Value};

/// Unique identifier for a type in the type registry.
///
/// The inner value is an index into the [`TypeRegistry`]'s type vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Pre-registered TypeId constants for built-in types.
impl TypeId {
    pub const BOOL: TypeId = TypeId(0);
    pub const I8: TypeId = TypeId(1);
    pub const I16: TypeId = TypeId(2);
    pub const I32: TypeId = TypeId(3);
    pub const I64: TypeId = TypeId(4);
    pub const F32: TypeId = TypeId(5);
    pub const F64: TypeId = TypeId(6);
    pub const STRING: TypeId = TypeId(7);
    pub const OBJECT: TypeId = TypeId(8);
    pub const UNIT: TypeId = TypeId(9);
    pub const NULL: TypeId = TypeId(10);
}

/// Registry of all host types and their members.
///
/// On construction, the registry pre-registers the 11 built-in types:
/// - `TypeId(0)`..`TypeId(6)` = Bool, I8, I16, I32, I64, F32, F64
/// - `TypeId(7)` = String
/// - `TypeId(8)` = Object
/// - `TypeId(9)` = Unit
/// - `TypeId(10)` = Null
///
/// A registry is not `Clone`: its [`RegistryId`] is part of every cache key
/// derived from its members, and two diverging copies must never share one.
#[derive(Debug)]
pub struct TypeRegistry {
    id: RegistryId,
    /// Types indexed by TypeId.0
    types: Vec<HostType>,
    /// Named type lookup (composites and enums)
    names: HashMap<String, TypeId>,
    /// Members indexed by MemberId.0
    members: Vec<Arc<MemberDef>>,
    arrays: HashMap<(TypeId, u32), TypeId>,
    callables: HashMap<(Vec<TypeId>, TypeId), TypeId>,
}

impl TypeRegistry {
    /// Number of built-in types pre-registered on construction.
    const BUILTIN_COUNT: u32 = 11;

    pub fn new() -> Self {
        let types = vec![
            HostType::Scalar(ScalarType::Bool),
            HostType::Scalar(ScalarType::I8),
            HostType::Scalar(ScalarType::I16),
            HostType::Scalar(ScalarType::I32),
            HostType::Scalar(ScalarType::I64),
            HostType::Scalar(ScalarType::F32),
            HostType::Scalar(ScalarType::F64),
            HostType::String,
            HostType::Object,
            HostType::Unit,
            HostType::Null,
        ];
        debug_assert_eq!(types.len() as u32, Self::BUILTIN_COUNT);

        TypeRegistry {
            id: RegistryId::next(),
            types,
            names: HashMap::new(),
            members: Vec::new(),
            arrays: HashMap::new(),
            callables: HashMap::new(),
        }
    }

    pub fn id(&self) -> RegistryId {
        self.id
    }

    fn push_type(&mut self, ty: HostType) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    fn claim_name(&self, name: &str) -> Result<(), CoreError> {
        if self.names.contains_key(name) {
            return Err(CoreError::DuplicateTypeName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Starts declaring a composite type.
    ///
    /// The [`TypeId`] is reserved immediately so members may refer to the type
    /// being declared (reference types may hold themselves).
    pub fn register_composite(
        &mut self,
        name: &str,
        semantics: TypeSemantics,
    ) -> Result<CompositeBuilder<'_>, CoreError> {
        self.claim_name(name)?;
        let type_id = TypeId(self.types.len() as u32);
        self.push_type(HostType::Composite(CompositeDef {
            name: name.to_string(),
            type_id,
            semantics,
            fields: IndexMap::new(),
            members: Vec::new(),
            slot_count: 0,
        }));
        self.names.insert(name.to_string(), type_id);
        Ok(CompositeBuilder {
            registry: self,
            type_id,
        })
    }

    /// Registers an enum with the given variants in declaration order.
    pub fn register_enum(&mut self, name: &str, variants: &[(&str, i64)]) -> Result<TypeId, CoreError> {
        self.claim_name(name)?;
        let type_id = TypeId(self.types.len() as u32);
        self.push_type(HostType::Enum(EnumDef {
            name: name.to_string(),
            type_id,
            variants: variants
                .iter()
                .map(|(variant, discriminant)| (variant.to_string(), *discriminant))
                .collect(),
        }));
        self.names.insert(name.to_string(), type_id);
        Ok(type_id)
    }

    /// Interned array type of `element` with `rank` dimensions.
    pub fn array_of(&mut self, element: TypeId, rank: u32) -> TypeId {
        if let Some(&id) = self.arrays.get(&(element, rank)) {
            return id;
        }
        let id = self.push_type(HostType::Array { element, rank });
        self.arrays.insert((element, rank), id);
        id
    }

    /// Array type of `element` and `rank`, if one was interned.
    pub fn find_array(&self, element: TypeId, rank: u32) -> Option<TypeId> {
        self.arrays.get(&(element, rank)).copied()
    }

    /// Interned callable type with the given signature.
    pub fn callable_of(&mut self, params: &[TypeId], return_type: TypeId) -> TypeId {
        let key = (params.to_vec(), return_type);
        if let Some(&id) = self.callables.get(&key) {
            return id;
        }
        let id = self.push_type(HostType::Callable {
            params: params.to_vec(),
            return_type,
        });
        self.callables.insert(key, id);
        id
    }

    /// Looks up a type by its [`TypeId`].
    pub fn get(&self, id: TypeId) -> Option<&HostType> {
        self.types.get(id.0 as usize)
    }

    /// Looks up a named type's [`TypeId`] by name.
    pub fn get_by_name(&self, name: &str) -> Option<TypeId> {
        self.names.get(name).copied()
    }

    pub fn composite(&self, id: TypeId) -> Option<&CompositeDef> {
        match self.get(id)? {
            HostType::Composite(def) => Some(def),
            _ => None,
        }
    }

    /// Element type and rank of an array type.
    pub fn array_info(&self, id: TypeId) -> Option<(TypeId, u32)> {
        match self.get(id)? {
            HostType::Array { element, rank } => Some((*element, *rank)),
            _ => None,
        }
    }

    /// Parameter types and return type of a callable type.
    pub fn callable_signature(&self, id: TypeId) -> Option<(&[TypeId], TypeId)> {
        match self.get(id)? {
            HostType::Callable {
                params,
                return_type,
            } => Some((params.as_slice(), *return_type)),
            _ => None,
        }
    }

    pub fn scalar(&self, id: TypeId) -> Option<ScalarType> {
        match self.get(id)? {
            HostType::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    /// Looks up a member descriptor by id.
    pub fn member(&self, id: MemberId) -> Option<&Arc<MemberDef>> {
        self.members.get(id.0 as usize)
    }

    /// Like [`member`](Self::member), failing with [`CoreError::MemberNotFound`].
    pub fn try_member(&self, id: MemberId) -> Result<&Arc<MemberDef>, CoreError> {
        self.member(id).ok_or(CoreError::MemberNotFound { id })
    }

    fn members_of(&self, ty: TypeId) -> impl Iterator<Item = &Arc<MemberDef>> + '_ {
        self.composite(ty)
            .into_iter()
            .flat_map(|def| def.members.iter())
            .filter_map(|id| self.member(*id))
    }

    pub fn find_field(&self, ty: TypeId, name: &str) -> Option<&Arc<MemberDef>> {
        let id = self.composite(ty)?.fields.get(name)?;
        self.member(*id)
    }

    /// Finds a non-indexed property by name.
    pub fn find_property(&self, ty: TypeId, name: &str) -> Option<&Arc<MemberDef>> {
        self.members_of(ty).find(|m| {
            m.name == name
                && matches!(&m.kind, MemberKind::Property { index_params, .. } if index_params.is_empty())
        })
    }

    /// Finds the best method overload for the given argument types.
    pub fn find_method(&self, ty: TypeId, name: &str, args: &[TypeId]) -> Option<&Arc<MemberDef>> {
        self.best_match(
            self.members_of(ty)
                .filter(|m| m.name == name && matches!(m.kind, MemberKind::Method { .. })),
            |m| m.params().iter().map(|p| p.ty).collect(),
            args,
        )
    }

    /// Finds the best constructor for the given argument types: an exact
    /// parameter match is preferred over an assignable one.
    pub fn find_constructor(&self, ty: TypeId, args: &[TypeId]) -> Option<&Arc<MemberDef>> {
        self.best_match(
            self.members_of(ty)
                .filter(|m| matches!(m.kind, MemberKind::Constructor { .. })),
            |m| m.params().iter().map(|p| p.ty).collect(),
            args,
        )
    }

    /// All custom indexers declared on `ty`.
    pub fn indexers_of(&self, ty: TypeId) -> Vec<&Arc<MemberDef>> {
        self.members_of(ty).filter(|m| m.is_indexer()).collect()
    }

    /// Finds the best custom indexer for the given index argument types.
    pub fn find_indexer(&self, ty: TypeId, args: &[TypeId]) -> Option<&Arc<MemberDef>> {
        self.best_match(
            self.indexers_of(ty).into_iter(),
            |m| match &m.kind {
                MemberKind::Property { index_params, .. } => index_params.clone(),
                _ => Vec::new(),
            },
            args,
        )
    }

    fn best_match<'a>(
        &self,
        candidates: impl Iterator<Item = &'a Arc<MemberDef>>,
        params_of: impl Fn(&MemberDef) -> Vec<TypeId>,
        args: &[TypeId],
    ) -> Option<&'a Arc<MemberDef>> {
        let mut assignable = None;
        for candidate in candidates {
            let params = params_of(candidate);
            if params.len() != args.len() {
                continue;
            }
            if params.iter().zip(args).all(|(p, a)| p == a) {
                return Some(candidate);
            }
            if assignable.is_none() && params.iter().zip(args).all(|(p, a)| self.is_assignable(*a, *p)) {
                assignable = Some(candidate);
            }
        }
        assignable
    }

    /// `true` for scalars, enums, Unit and value-type composites.
    pub fn is_value_type(&self, ty: TypeId) -> bool {
        match self.get(ty) {
            Some(HostType::Scalar(_)) | Some(HostType::Enum(_)) | Some(HostType::Unit) => true,
            Some(HostType::Composite(def)) => def.semantics == TypeSemantics::Value,
            _ => false,
        }
    }

    /// `true` for types whose values may be `null`.
    pub fn is_reference_type(&self, ty: TypeId) -> bool {
        match self.get(ty) {
            Some(HostType::String)
            | Some(HostType::Object)
            | Some(HostType::Null)
            | Some(HostType::Array { .. })
            | Some(HostType::Callable { .. }) => true,
            Some(HostType::Composite(def)) => def.semantics == TypeSemantics::Reference,
            _ => false,
        }
    }

    /// Assignability without implicit conversions: identity, anything to
    /// `Object`, and `null` to reference types.
    pub fn is_assignable(&self, from: TypeId, to: TypeId) -> bool {
        from == to
            || (to == TypeId::OBJECT && from != TypeId::UNIT)
            || (from == TypeId::NULL && self.is_reference_type(to))
    }

    /// Whether a runtime value may be stored in a slot of type `ty`.
    pub fn value_conforms(&self, value: &Value, ty: TypeId) -> bool {
        match value {
            Value::Null => self.is_reference_type(ty),
            Value::Symbol(_) => ty == TypeId::OBJECT,
            other => other
                .runtime_type()
                .is_some_and(|actual| self.is_assignable(actual, ty)),
        }
    }

    /// Display name of a type, e.g. `I32`, `Point`, `String[,]`.
    pub fn type_name(&self, ty: TypeId) -> String {
        match self.get(ty) {
            None => ty.to_string(),
            Some(HostType::Scalar(s)) => format!("{:?}", s),
            Some(HostType::String) => "String".into(),
            Some(HostType::Object) => "Object".into(),
            Some(HostType::Unit) => "Unit".into(),
            Some(HostType::Null) => "Null".into(),
            Some(HostType::Composite(def)) => def.name.clone(),
            Some(HostType::Enum(def)) => def.name.clone(),
            Some(HostType::Array { element, rank }) => {
                let commas = ",".repeat(rank.saturating_sub(1) as usize);
                format!("{}[{}]", self.type_name(*element), commas)
            }
            Some(HostType::Callable {
                params,
                return_type,
            }) => {
                let params: Vec<String> = params.iter().map(|p| self.type_name(*p)).collect();
                format!("fn({}) -> {}", params.join(", "), self.type_name(*return_type))
            }
        }
    }

    /// `Declaring.Member`, used in diagnostics.
    pub fn describe_member(&self, id: MemberId) -> String {
        match self.member(id) {
            Some(def) => format!("{}.{}", self.type_name(def.declaring_type), def.name),
            None => format!("MemberId({})", id.0),
        }
    }

    /// Default value of a slot of type `ty`: zero for scalars, the first
    /// variant for enums, a default-initialised instance for value-type
    /// composites, `null` for reference types.
    pub fn default_value(&self, ty: TypeId) -> Value {
        match self.get(ty) {
            Some(HostType::Scalar(s)) => match s {
                ScalarType::Bool => Value::Bool(false),
                ScalarType::I8 => Value::I8(0),
                ScalarType::I16 => Value::I16(0),
                ScalarType::I32 => Value::I32(0),
                ScalarType::I64 => Value::I64(0),
                ScalarType::F32 => Value::F32(0.0),
                ScalarType::F64 => Value::F64(0.0),
            },
            Some(HostType::Unit) => Value::Unit,
            Some(HostType::Enum(def)) => Value::Enum {
                type_id: ty,
                discriminant: def.variants.values().next().copied().unwrap_or(0),
            },
            Some(HostType::Composite(def)) if def.semantics == TypeSemantics::Value => {
                Value::Struct(StructValue {
                    type_id: ty,
                    fields: self.slot_defaults(def),
                })
            }
            _ => Value::Null,
        }
    }

    fn slot_defaults(&self, def: &CompositeDef) -> Vec<Value> {
        let mut fields = vec![Value::Null; def.slot_count as usize];
        for id in def.fields.values() {
            if let Some(member) = self.member(*id) {
                if let MemberKind::Field {
                    field_type,
                    storage: FieldStorage::Instance { slot },
                } = &member.kind
                {
                    fields[*slot as usize] = self.default_value(*field_type);
                }
            }
        }
        fields
    }

    /// Template for creating fresh instances of a composite.
    pub fn instance_template(&self, ty: TypeId) -> Option<InstanceTemplate> {
        let def = self.composite(ty)?;
        Some(InstanceTemplate {
            type_id: ty,
            semantics: def.semantics,
            fields: self.slot_defaults(def),
        })
    }

    fn add_member(&mut self, ty: TypeId, member: MemberDef) -> MemberId {
        let id = MemberId(self.members.len() as u32);
        let member = MemberDef { id, ..member };
        let is_instance_field = matches!(
            member.kind,
            MemberKind::Field {
                storage: FieldStorage::Instance { .. },
                ..
            }
        );
        let is_field = matches!(member.kind, MemberKind::Field { .. });
        if let Some(HostType::Composite(def)) = self.types.get_mut(ty.0 as usize) {
            if is_field {
                def.fields.insert(member.name.clone(), id);
            }
            if is_instance_field {
                def.slot_count += 1;
            }
            def.members.push(id);
        }
        self.members.push(Arc::new(member));
        id
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Declares the members of a composite reserved by
/// [`TypeRegistry::register_composite`].
///
/// Fields and properties must have unique names; methods may be overloaded
/// by parameter types.
pub struct CompositeBuilder<'r> {
    registry: &'r mut TypeRegistry,
    type_id: TypeId,
}

impl<'r> CompositeBuilder<'r> {
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The registry being extended, e.g. to intern array types for members.
    pub fn registry(&mut self) -> &mut TypeRegistry {
        &mut *self.registry
    }

    fn def(&self) -> Option<&CompositeDef> {
        self.registry.composite(self.type_id)
    }

    fn type_name(&self) -> String {
        self.def().map(|d| d.name.clone()).unwrap_or_default()
    }

    fn duplicate(&self, member: &str) -> CoreError {
        CoreError::DuplicateMember {
            type_name: self.type_name(),
            member: member.to_string(),
        }
    }

    fn name_taken(&self, name: &str) -> bool {
        self.registry.members_of(self.type_id).any(|m| {
            m.name == name
                && matches!(m.kind, MemberKind::Field { .. } | MemberKind::Property { .. })
        })
    }

    fn signature_taken(&self, name: &str, params: &[ParamDef], ctor: bool) -> bool {
        self.registry.members_of(self.type_id).any(|m| {
            let same_kind = if ctor {
                matches!(m.kind, MemberKind::Constructor { .. })
            } else {
                m.name == name && matches!(m.kind, MemberKind::Method { .. })
            };
            same_kind
                && m.params().len() == params.len()
                && m.params().iter().zip(params).all(|(a, b)| a.ty == b.ty)
        })
    }

    fn push(&mut self, name: &str, visibility: Visibility, is_static: bool, kind: MemberKind) -> MemberId {
        self.registry.add_member(
            self.type_id,
            MemberDef {
                id: MemberId(0),
                name: name.to_string(),
                declaring_type: self.type_id,
                visibility,
                is_static,
                kind,
            },
        )
    }

    /// Adds a public instance field.
    pub fn field(&mut self, name: &str, ty: TypeId) -> Result<MemberId, CoreError> {
        self.add_field(name, ty, Visibility::Public)
    }

    pub fn add_field(&mut self, name: &str, ty: TypeId, visibility: Visibility) -> Result<MemberId, CoreError> {
        if self.name_taken(name) {
            return Err(self.duplicate(name));
        }
        let def = self
            .def()
            .ok_or(CoreError::TypeNotFound { id: self.type_id })?;
        if ty == self.type_id && def.semantics == TypeSemantics::Value {
            return Err(CoreError::RecursiveValueType {
                type_name: def.name.clone(),
                field: name.to_string(),
            });
        }
        let slot = def.slot_count;
        Ok(self.push(
            name,
            visibility,
            false,
            MemberKind::Field {
                field_type: ty,
                storage: FieldStorage::Instance { slot },
            },
        ))
    }

    /// Adds a public static field holding `initial`.
    pub fn static_field(&mut self, name: &str, ty: TypeId, initial: Value) -> Result<MemberId, CoreError> {
        if self.name_taken(name) {
            return Err(self.duplicate(name));
        }
        Ok(self.push(
            name,
            Visibility::Public,
            true,
            MemberKind::Field {
                field_type: ty,
                storage: FieldStorage::Static(Arc::new(RwLock::new(initial))),
            },
        ))
    }

    /// Adds a public instance method.
    pub fn method(
        &mut self,
        name: &str,
        params: Vec<ParamDef>,
        return_type: TypeId,
        body: NativeFn,
    ) -> Result<MemberId, CoreError> {
        self.add_method(name, Visibility::Public, false, params, return_type, body)
    }

    /// Adds a public static method.
    pub fn static_method(
        &mut self,
        name: &str,
        params: Vec<ParamDef>,
        return_type: TypeId,
        body: NativeFn,
    ) -> Result<MemberId, CoreError> {
        self.add_method(name, Visibility::Public, true, params, return_type, body)
    }

    pub fn add_method(
        &mut self,
        name: &str,
        visibility: Visibility,
        is_static: bool,
        params: Vec<ParamDef>,
        return_type: TypeId,
        body: NativeFn,
    ) -> Result<MemberId, CoreError> {
        if self.signature_taken(name, &params, false) {
            return Err(self.duplicate(name));
        }
        Ok(self.push(
            name,
            visibility,
            is_static,
            MemberKind::Method {
                params,
                return_type,
                body,
            },
        ))
    }

    /// Adds a public constructor. Without a `body` the constructor only
    /// default-initialises the instance.
    pub fn constructor(&mut self, params: Vec<ParamDef>, body: Option<NativeFn>) -> Result<MemberId, CoreError> {
        if self.signature_taken(".ctor", &params, true) {
            return Err(self.duplicate(".ctor"));
        }
        Ok(self.push(
            ".ctor",
            Visibility::Public,
            false,
            MemberKind::Constructor { params, body },
        ))
    }

    /// Adds a public instance property backed by accessor methods named
    /// `get_<name>` and `set_<name>`.
    pub fn property(
        &mut self,
        name: &str,
        ty: TypeId,
        getter: Option<NativeFn>,
        setter: Option<NativeFn>,
    ) -> Result<MemberId, CoreError> {
        self.add_property(name, ty, Vec::new(), false, getter, setter)
    }

    pub fn static_property(
        &mut self,
        name: &str,
        ty: TypeId,
        getter: Option<NativeFn>,
        setter: Option<NativeFn>,
    ) -> Result<MemberId, CoreError> {
        self.add_property(name, ty, Vec::new(), true, getter, setter)
    }

    /// Adds a custom indexer. The getter receives the index arguments; the
    /// setter receives the index arguments followed by the new value.
    pub fn indexer(
        &mut self,
        ty: TypeId,
        index_params: Vec<TypeId>,
        getter: Option<NativeFn>,
        setter: Option<NativeFn>,
    ) -> Result<MemberId, CoreError> {
        if index_params.is_empty() {
            return Err(CoreError::InvalidAccessor {
                property: "Item".into(),
                reason: "an indexer needs at least one index parameter".into(),
            });
        }
        self.add_property("Item", ty, index_params, false, getter, setter)
    }

    fn add_property(
        &mut self,
        name: &str,
        ty: TypeId,
        index_params: Vec<TypeId>,
        is_static: bool,
        getter: Option<NativeFn>,
        setter: Option<NativeFn>,
    ) -> Result<MemberId, CoreError> {
        if getter.is_none() && setter.is_none() {
            return Err(CoreError::InvalidAccessor {
                property: name.to_string(),
                reason: "a property needs a getter or a setter".into(),
            });
        }
        let indexed = !index_params.is_empty();
        if !indexed && self.name_taken(name) {
            return Err(self.duplicate(name));
        }
        let index_defs: Vec<ParamDef> = index_params
            .iter()
            .enumerate()
            .map(|(i, ty)| ParamDef::new(format!("index{}", i), *ty))
            .collect();

        let getter = match getter {
            Some(body) => Some(self.add_method(
                &format!("get_{}", name),
                Visibility::Public,
                is_static,
                index_defs.clone(),
                ty,
                body,
            )?),
            None => None,
        };
        let setter = match setter {
            Some(body) => {
                let mut params = index_defs;
                params.push(ParamDef::new("value", ty));
                Some(self.add_method(
                    &format!("set_{}", name),
                    Visibility::Public,
                    is_static,
                    params,
                    TypeId::UNIT,
                    body,
                )?)
            }
            None => None,
        };

        Ok(self.push(
            name,
            Visibility::Public,
            is_static,
            MemberKind::Property {
                property_type: ty,
                index_params,
                getter,
                setter,
            },
        ))
    }

    /// Completes the declaration.
    pub fn finish(self) -> TypeId {
        self.type_id
    }
}
