//! Core error types for wfexpr-core.
//!
//! Uses `thiserror` for structured, matchable error variants. [`CoreError`]
//! covers registry construction; [`RuntimeError`] covers everything that can
//! fail while a converted graph is evaluated, including failures raised by
//! host-provided native functions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{MemberId, SymbolRef};
use crate::type_id::TypeId;

/// Errors produced while building a [`TypeRegistry`](crate::TypeRegistry).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Attempting to register a type name that already exists in the registry.
    #[error("duplicate type name: '{name}'")]
    DuplicateTypeName { name: String },

    /// A member name is declared twice on the same type.
    #[error("duplicate member '{member}' on type '{type_name}'")]
    DuplicateMember { type_name: String, member: String },

    /// A TypeId was not found in the type registry.
    #[error("type not found: {id}")]
    TypeNotFound { id: TypeId },

    /// A MemberId was not found in the type registry.
    #[error("member not found: MemberId({id})", id = id.0)]
    MemberNotFound { id: MemberId },

    /// A value type contains itself by value.
    #[error("value type '{type_name}' cannot contain itself by value (field '{field}')")]
    RecursiveValueType { type_name: String, field: String },

    /// A property accessor refers to a member that is not a method of the
    /// declaring type.
    #[error("invalid accessor for property '{property}': {reason}")]
    InvalidAccessor { property: String, reason: String },
}

/// Evaluation-time failures.
///
/// These are always raised to the caller immediately; the surrounding runtime
/// treats them as workflow execution faults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum RuntimeError {
    #[error("cannot access instance member '{member}' on a null owner")]
    NullOwner { member: String },

    #[error("null reference: {context}")]
    NullReference { context: String },

    #[error("index {index} is out of range for length {length}")]
    IndexOutOfRange { index: i64, length: usize },

    #[error("array of rank {expected} indexed with {actual} indices")]
    RankMismatch { expected: usize, actual: usize },

    #[error("array dimension length {length} is negative")]
    NegativeLength { length: i64 },

    #[error("integer overflow in {operation}")]
    IntegerOverflow { operation: String },

    #[error("divide by zero")]
    DivideByZero,

    #[error("invalid cast from {from} to {to}")]
    InvalidCast { from: String, to: String },

    #[error("type mismatch at runtime: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("access to non-public member '{member}' was denied")]
    AccessDenied { member: String },

    #[error("{symbol} is not bound in the execution context")]
    UnboundSymbol { symbol: SymbolRef },

    #[error("'{member}' expects {expected} arguments, got {actual}")]
    ArityMismatch {
        member: String,
        expected: usize,
        actual: usize,
    },

    #[error("member '{member}' cannot be invoked")]
    NotInvocable { member: String },

    #[error("host function failed: {message}")]
    Host { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl RuntimeError {
    /// Convenience constructor for failures reported by native functions.
    pub fn host(message: impl Into<String>) -> Self {
        RuntimeError::Host {
            message: message.into(),
        }
    }
}
