//! The front half of the strela script interpreter.
//!
//! Strela is a small dynamically typed imperative scripting language with
//! Russian and English keyword aliases. This crate covers the pipeline
//! between the parser and the virtual machine:
//!
//! 1. the AST data model the parser constructs ([`Expr`]/[`Stmt`]), with
//!    interned names ([`Names`]) and source spans ([`Span`]);
//! 2. the simplification pass: bottom-up constant folding that rewrites
//!    fully evaluated subtrees to `Native` nodes holding runtime values
//!    ([`Value`]);
//! 3. the lowering ([`Lowerer`]): a register-oriented translation of the
//!    tree into a linear instruction stream ([`Program`]), with label
//!    management for control flow, short-circuit evaluation, and the
//!    l-expression assignment protocol.
//!
//! The lexer/parser and the consuming VM live elsewhere; this crate is a
//! deterministic, non-suspending library with no I/O.

mod bytecode;
mod decimal;
mod error;
mod expressions;
mod intern;
mod ops;
mod simplify;
mod span;
mod value;

pub use crate::{
    bytecode::{lower_expr, lower_program, Instr, Label, Lowerer, Op, Program, Reg},
    decimal::{Decimal, DecimalError},
    error::{CompileError, CompileErrorKind, CompileResult},
    expressions::{ElseIf, Expr, ExprLoc, OperandList, SelectCase, Stmt, StmtLoc, SwitchCase},
    intern::{NameId, Names},
    ops::{Oper, ValueKind},
    simplify::simplify_block,
    span::Span,
    value::{OpError, Value},
};
