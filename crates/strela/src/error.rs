//! Compile-time errors reported by the lowering.
//!
//! Only structural problems fail a compilation: an address-of over a
//! non-addressable operand, an assignment to something that is not an
//! l-expression, operator text missing from the operator map, control
//! transfer outside a loop. Failed constant folds are not errors at all -
//! they leave the tree unchanged - and semantic errors (bad casts, range
//! violations, closed channels) belong to the VM.

use std::fmt;

use strum::{Display, IntoStaticStr};

use crate::span::Span;

/// Result alias for lowering operations.
pub type CompileResult<T> = Result<T, CompileError>;

/// Classification of a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, serde::Serialize, serde::Deserialize)]
pub enum CompileErrorKind {
    /// A node was used in a position its shape does not allow.
    InvalidOperation,
    /// Operator text with no entry in the operator map.
    UnknownOperator,
}

/// A fatal error for the current compilation, attached to the span of the
/// offending node.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
    pub span: Span,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }

    /// Shorthand for the common [`CompileErrorKind::InvalidOperation`] case.
    pub fn invalid(span: Span, message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::InvalidOperation, span, message)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} at {}", self.kind, self.message, self.span)
    }
}

impl std::error::Error for CompileError {}
