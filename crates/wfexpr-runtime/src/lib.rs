pub mod cache;
pub mod config;
pub mod context;
pub mod inspect;
pub mod invoke;
pub mod location;
pub mod nodes;
pub mod operators;
pub mod reflect;
pub mod typed;

// Re-export commonly used types
pub use cache::MetadataCache;
pub use config::{ConfigError, RuntimeConfig};
pub use context::{AccessGate, DenyAll, ExecutionContext, FullTrust, MapContext, StaticContext};
pub use inspect::{ChildEdge, NodeGraph};
pub use invoke::{CacheStats, InvocationCache, MethodHandle, Thunk};
pub use location::{Location, Owner};
pub use nodes::{LocationNode, LocationRef, NodeInfo, ValueNode, ValueRef};
pub use operators::{OperatorError, OperatorFn, OperatorTable, ResolvedOperator};
pub use typed::{HostValue, LocationGraph, TypedLocation, ValueGraph};
