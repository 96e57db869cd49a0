//! Source positions attached to AST nodes and emitted instructions.

use std::fmt;

use crate::intern::NameId;

/// An immutable source position: file, byte offset, line, and column.
///
/// Filenames are interned through the same [`Names`](crate::intern::Names)
/// table as identifiers, so a span is four small integers and is copied
/// freely. Spans propagate from literal and identifier tokens into every
/// enclosing node; each emitted instruction cites the span of the node it
/// was lowered from.
#[derive(Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Span {
    /// Interned filename ID - look up in `Names` to get the actual path.
    pub filename: NameId,
    /// Byte offset from the start of the file.
    pub offset: u32,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl Span {
    /// Creates a span from an interned filename and a location triple.
    #[must_use]
    pub const fn new(filename: NameId, offset: u32, line: u32, column: u32) -> Self {
        Self {
            filename,
            offset,
            line,
            column,
        }
    }

    /// A placeholder span for synthetic nodes (tests, builders).
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            filename: NameId::ANONYMOUS,
            offset: 0,
            line: 0,
            column: 0,
        }
    }
}

/// Compact Debug form: spans appear inside nearly every node dump.
impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({}:{}:{})", self.filename.index(), self.line, self.column)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
