pub mod error;
pub mod expr;
pub mod id;
pub mod member;
pub mod type_id;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use error::{CoreError, RuntimeError};
pub use expr::{BinaryOp, Expr, Intrinsic, MethodRef, UnaryOp};
pub use id::{ArgumentId, DelegateArgumentId, MemberId, NodeId, RegistryId, SymbolRef, VariableId};
pub use member::{FieldStorage, MemberDef, MemberKind, NativeFn, NativeSig, StaticCell};
pub use type_id::{CompositeBuilder, TypeId, TypeRegistry};
pub use types::{
    ArgumentDirection, CompositeDef, ConstValue, EnumDef, HostType, ParamDef, ScalarType, TypeSemantics,
    Visibility,
};
pub use value::{ArrayRef, CallableRef, InstanceTemplate, ObjectRef, StructValue, Value};
