//! Conversion of expression trees into executable node graphs.
//!
//! [`Converter`] walks an [`Expr`](wfexpr_core::Expr) once, checks it
//! against the [`TypeRegistry`](wfexpr_core::TypeRegistry) and builds the
//! `wfexpr-runtime` nodes that evaluate it. A failure is either returned as
//! a [`ConversionError`] or handed to a [`ValidationSink`].

pub mod converter;
pub mod diagnostics;
pub mod scope;

pub use converter::{Converter, ConverterOptions};
pub use diagnostics::{ConversionError, ErrorMode, ValidationSink};
pub use scope::{NameResolver, Scope};
