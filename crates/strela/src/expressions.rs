//! The AST: expression and statement taxonomies.
//!
//! Nodes are built by the parser with spans and interned ids already in
//! place, mutated only by the simplification pass (subtree substitution is
//! the sole structural change), and read-only during lowering. After
//! lowering the tree can be dropped; the emitted instructions reference
//! only interned ids and immediate values.

use smallvec::SmallVec;

use crate::{intern::NameId, span::Span, value::Value};

/// An expression with its source span.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExprLoc {
    pub position: Span,
    pub expr: Expr,
}

impl ExprLoc {
    pub fn new(position: Span, expr: Expr) -> Self {
        Self { position, expr }
    }
}

/// The comma-list sides of a binary node.
///
/// Both sides are 1-wide everywhere except the statement-context `==`
/// rewrite, where the node is reinterpreted as a multi-target assignment.
pub type OperandList = SmallVec<[ExprLoc; 1]>;

/// A value-producing expression.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    /// A gap in a range literal, e.g. the missing bound in `arr[:n]`.
    /// Lowers to a `nil` load; never folds.
    None,
    /// Integer or decimal literal, kept as source text. Whether it parses
    /// as integer or decimal is decided by the presence of `.`, `e`, `E` -
    /// both at fold time and at runtime (`CASTNUM` re-parses the same
    /// text), so the two paths cannot disagree.
    Number { lit: Box<str> },
    /// String literal.
    Str { lit: Box<str> },
    /// Keyword constant: `истина`/`true`, `ложь`/`false`, `null`.
    /// Unrecognized spellings lower to `nil`.
    Const { lit: Box<str> },
    /// Variable reference by interned id.
    Ident { id: NameId },
    /// Unary operation: `-`, `!`, or `^` (bitwise not).
    Unary { op: char, expr: Box<ExprLoc> },
    /// Address-of. The operand must be an `Ident` or a `Member`.
    Addr { expr: Box<ExprLoc> },
    /// Dereference. The operand must be an `Ident` or a `Member`.
    Deref { expr: Box<ExprLoc> },
    /// Parenthesized grouping; semantically a no-op.
    Paren { expr: Box<ExprLoc> },
    /// Binary operation over comma lists.
    ///
    /// The operator is kept as source text and mapped to an opcode during
    /// folding and lowering. In statement context `==` is reinterpreted as
    /// assignment between the two lists.
    BinOp {
        lhss: Box<OperandList>,
        op: Box<str>,
        rhss: Box<OperandList>,
    },
    /// Conditional expression: exactly one branch is evaluated.
    Ternary {
        cond: Box<ExprLoc>,
        then: Box<ExprLoc>,
        els: Box<ExprLoc>,
    },
    /// Call of a named function. `spawn` runs the call as an independent
    /// task that returns nothing to the caller.
    ///
    /// `name` id `0` is the anonymous-callee marker: the function value is
    /// already in the destination register (see `AnonCall`).
    Call {
        name: NameId,
        args: Vec<ExprLoc>,
        var_arg: bool,
        spawn: bool,
    },
    /// Call of a first-class function value, e.g. `f()()`.
    AnonCall {
        func: Box<ExprLoc>,
        args: Vec<ExprLoc>,
        var_arg: bool,
        spawn: bool,
    },
    /// Member access: `object.name`.
    Member { expr: Box<ExprLoc>, name: NameId },
    /// Indexed access: `value[index]`. Assignable.
    Item { value: Box<ExprLoc>, index: Box<ExprLoc> },
    /// Subrange access: `value[begin:end]`. Assignable.
    Slice {
        value: Box<ExprLoc>,
        begin: Box<ExprLoc>,
        end: Box<ExprLoc>,
    },
    /// Function literal. Anonymous literals carry the interned spelling
    /// `<анонимная функция>`, never the reserved id `0`.
    Func {
        name: NameId,
        args: Vec<NameId>,
        var_arg: bool,
        body: Vec<StmtLoc>,
    },
    /// Single assignment in expression position.
    Let { lhs: Box<ExprLoc>, rhs: Box<ExprLoc> },
    /// Compound assignment: `+= -= *= /= &= |=` and the `++`/`--` forms,
    /// which carry no right-hand side.
    Assoc {
        lhs: Box<ExprLoc>,
        op: Box<str>,
        rhs: Option<Box<ExprLoc>>,
    },
    /// Channel operation. With no left-hand side this is a receive whose
    /// value is kept only in the result register. With both sides the
    /// direction is decided at runtime: send if the left side is a
    /// channel, otherwise receive from the right into the left.
    Chan {
        lhs: Option<Box<ExprLoc>>,
        rhs: Box<ExprLoc>,
    },
    /// Cast to a named type. The type is either a statically interned name
    /// or an expression producing the name at runtime.
    TypeCast {
        type_id: NameId,
        type_expr: Option<Box<ExprLoc>>,
        expr: Box<ExprLoc>,
    },
    /// Allocate an instance of a named type.
    Make {
        type_id: NameId,
        type_expr: Option<Box<ExprLoc>>,
    },
    /// Allocate a channel; buffered when a size is given.
    MakeChan { size: Option<Box<ExprLoc>> },
    /// Allocate a slice with a length and an optional capacity
    /// (defaulting to the length).
    MakeArray {
        len: Box<ExprLoc>,
        cap: Option<Box<ExprLoc>>,
    },
    /// A fully evaluated value produced by simplification; lowers to a
    /// single load.
    Native { value: Value },
    /// One `key: value` entry of a map literal. Only valid inside `Map`.
    Pair { key: Box<str>, value: Box<ExprLoc> },
    /// List literal.
    Array(Vec<ExprLoc>),
    /// Map literal: a list of `Pair` entries in source order.
    Map(Vec<ExprLoc>),
}

impl Expr {
    /// True for the variants that may appear on the left-hand side of an
    /// assignment: `Ident`, `Member`, `Item`, `Slice`.
    #[must_use]
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self,
            Self::Ident { .. } | Self::Member { .. } | Self::Item { .. } | Self::Slice { .. }
        )
    }
}

/// A statement with its source span.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StmtLoc {
    pub position: Span,
    pub stmt: Stmt,
}

impl StmtLoc {
    pub fn new(position: Span, stmt: Stmt) -> Self {
        Self { position, stmt }
    }
}

/// One `иначеесли`/`elseif` arm of an `If` statement.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ElseIf {
    pub cond: ExprLoc,
    pub body: Vec<StmtLoc>,
}

/// One arm of a `Switch` statement; `cond` is `None` for the default arm.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SwitchCase {
    pub cond: Option<ExprLoc>,
    pub body: Vec<StmtLoc>,
    pub position: Span,
}

/// One arm of a `Select` statement.
///
/// `op` must be a `Chan` expression; `None` marks the default arm that
/// runs when no channel is ready.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SelectCase {
    pub op: Option<ExprLoc>,
    pub body: Vec<StmtLoc>,
    pub position: Span,
}

/// A statement.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Stmt {
    /// Variable declaration, with optional initializers. Without
    /// initializers every name is set to `nil`.
    Var { names: Vec<NameId>, exprs: Vec<ExprLoc> },
    /// Multi-target assignment. Every right-hand side is evaluated into a
    /// fresh temporary before any target is assigned.
    Lets { lhss: Vec<ExprLoc>, rhss: Vec<ExprLoc> },
    /// Expression evaluated for effect. A top-level `==` here is
    /// reinterpreted as assignment.
    Expr(ExprLoc),
    /// Return from the enclosing function; several values are returned as
    /// one slice.
    Return { exprs: Vec<ExprLoc> },
    Throw { expr: ExprLoc },
    Break,
    Continue,
    If {
        cond: ExprLoc,
        then: Vec<StmtLoc>,
        elifs: Vec<ElseIf>,
        els: Vec<StmtLoc>,
    },
    /// Iteration over the values of a collection or channel.
    ForIn {
        var: NameId,
        iterable: ExprLoc,
        body: Vec<StmtLoc>,
    },
    /// Counted loop: `var` runs from `from` to `to` inclusive.
    NumFor {
        var: NameId,
        from: ExprLoc,
        to: ExprLoc,
        body: Vec<StmtLoc>,
    },
    /// Pre-tested loop (`пока`/`while`).
    Loop { cond: ExprLoc, body: Vec<StmtLoc> },
    Try { body: Vec<StmtLoc>, catch: Vec<StmtLoc> },
    /// First matching case wins; no fallthrough.
    Switch {
        subject: ExprLoc,
        cases: Vec<SwitchCase>,
    },
    Select { cases: Vec<SelectCase> },
    Module { name: NameId, body: Vec<StmtLoc> },
}
