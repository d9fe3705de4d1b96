//! Conversion errors and the report-mode sink.

use thiserror::Error;

use wfexpr_runtime::OperatorError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("unsupported {kind} expression {context}")]
    UnsupportedNodeKind { kind: String, context: String },

    #[error("type mismatch in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("member not found: {member} ({detail})")]
    MemberNotFound { member: String, detail: String },

    #[error("{member} has no setter")]
    MemberReadOnly { member: String },

    #[error("{member} has no getter")]
    MemberWriteOnly { member: String },

    #[error("instance member {member} requires a target")]
    TargetRequired { member: String },

    #[error("static member {member} does not take a target")]
    TargetNotAllowed { member: String },

    #[error("{member}: {reason}")]
    ArityMismatch { member: String, reason: String },

    #[error("operator method {method} cannot be bound: {reason}")]
    AmbiguousStaticBinding { method: String, reason: String },

    #[error("cannot assign through {expr}: {reason}")]
    NotAssignable { expr: String, reason: String },

    #[error("{symbol} is not visible in the enclosing scope")]
    UnknownSymbol { symbol: String },

    #[error("symbol accessor could not be evaluated: {message}")]
    StaticEvaluation { message: String },
}

impl ConversionError {
    pub(crate) fn unsupported(kind: impl Into<String>, context: impl Into<String>) -> Self {
        ConversionError::UnsupportedNodeKind {
            kind: kind.into(),
            context: context.into(),
        }
    }

    pub(crate) fn type_mismatch(
        context: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        ConversionError::TypeMismatch {
            context: context.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl From<OperatorError> for ConversionError {
    fn from(e: OperatorError) -> Self {
        match e {
            OperatorError::Undefined { operator, operands } => ConversionError::TypeMismatch {
                context: format!("operator {}", operator),
                expected: "operand types the operator is defined for".into(),
                actual: operands,
            },
            OperatorError::NotStatic { method } => ConversionError::AmbiguousStaticBinding {
                method,
                reason: "operator methods must be static".into(),
            },
            OperatorError::UnknownMethod { method } => ConversionError::MemberNotFound {
                member: format!("MemberId({})", method),
                detail: "not registered".into(),
            },
            OperatorError::NotAMethod { method } => ConversionError::MemberNotFound {
                member: method,
                detail: "not a method".into(),
            },
            OperatorError::Arity {
                method,
                expected,
                actual,
            } => ConversionError::ArityMismatch {
                member: method,
                reason: format!("expects {} operands, got {}", expected, actual),
            },
            OperatorError::OperandType {
                method,
                index,
                expected,
                actual,
            } => ConversionError::TypeMismatch {
                context: format!("operand {} of {}", index, method),
                expected,
                actual,
            },
        }
    }
}

/// Receives conversion failures in [`ErrorMode::Report`].
pub trait ValidationSink {
    fn report(&mut self, message: String);
}

impl ValidationSink for Vec<String> {
    fn report(&mut self, message: String) {
        self.push(message);
    }
}

/// Whether a failed conversion is returned as an error or reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    #[default]
    Raise,
    Report,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_errors_map_to_conversion_errors() {
        let e: ConversionError = OperatorError::NotStatic {
            method: "Money.op_Add".into(),
        }
        .into();
        assert!(matches!(e, ConversionError::AmbiguousStaticBinding { ref method, .. } if method == "Money.op_Add"));

        let e: ConversionError = OperatorError::Undefined {
            operator: "Add".into(),
            operands: "Bool and I32".into(),
        }
        .into();
        assert_eq!(
            e.to_string(),
            "type mismatch in operator Add: expected operand types the operator is defined for, got Bool and I32"
        );
    }

    #[test]
    fn vec_sink_collects_messages() {
        let mut sink: Vec<String> = Vec::new();
        sink.report(ConversionError::unsupported("Lambda", "in a value position").to_string());
        assert_eq!(sink, vec!["unsupported Lambda expression in a value position".to_string()]);
    }
}
