//! Register-oriented lowering of the AST to the instruction stream.
//!
//! A node lowers by emitting instructions that leave its value in the
//! destination register `reg`; temporaries occupy `reg + 1`, `reg + 2`, ...
//! and expire at the node boundary. Forward jumps allocate fresh label ids
//! from a monotonic counter, and the matching `LABEL` is emitted at the
//! target. Evaluation order is left to right everywhere, `&&`/`||` are
//! short-circuit, and ternaries evaluate exactly one branch.
//!
//! Lowering is deterministic and non-suspending: a pure function of the
//! tree, the starting register, and the label counter. Structural problems
//! (non-addressable operands, assignment to a non-l-expression, control
//! transfer outside a loop) fail the compilation with a spanned error.

use crate::{
    error::{CompileError, CompileErrorKind, CompileResult},
    expressions::{Expr, ExprLoc, SelectCase, Stmt, StmtLoc, SwitchCase},
    intern::NameId,
    ops::{Oper, ValueKind},
    span::Span,
    value::Value,
};

use super::{Instr, Label, Op, Program, Reg};

/// Jump targets of the innermost enclosing loop.
struct LoopLabels {
    continue_to: Label,
    break_to: Label,
}

/// The lowering context: instruction buffer, label counter, and the stack
/// of enclosing loops for `break`/`continue` resolution.
pub struct Lowerer {
    instrs: Vec<Instr>,
    next_label: u32,
    loops: Vec<LoopLabels>,
}

impl Default for Lowerer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowers a statement list into a complete program, starting at register 0.
pub fn lower_program(stmts: &[StmtLoc]) -> CompileResult<Program> {
    let mut lowerer = Lowerer::new();
    lowerer.block(stmts, 0)?;
    Ok(lowerer.finish())
}

/// Lowers a single expression into register 0; mostly useful for tests and
/// REPL-style embedders.
pub fn lower_expr(expr: &ExprLoc) -> CompileResult<Program> {
    let mut lowerer = Lowerer::new();
    lowerer.expr(expr, 0, false)?;
    Ok(lowerer.finish())
}

impl Lowerer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            instrs: Vec::new(),
            next_label: 0,
            loops: Vec::new(),
        }
    }

    /// Consumes the lowerer, returning the emitted program.
    #[must_use]
    pub fn finish(self) -> Program {
        Program {
            instrs: self.instrs,
            labels_used: self.next_label,
        }
    }

    fn emit(&mut self, span: Span, op: Op) {
        self.instrs.push(Instr::new(span, op));
    }

    /// Pre-increments the shared counter; label ids start at 1.
    fn alloc_label(&mut self) -> Label {
        self.next_label += 1;
        Label::from_raw(self.next_label)
    }

    /// Lowers `e` so its value ends up in `reg`.
    ///
    /// `in_stmt` marks statement context, where a top-level `==` is
    /// reinterpreted as assignment.
    pub fn expr(&mut self, e: &ExprLoc, reg: Reg, in_stmt: bool) -> CompileResult<()> {
        let span = e.position;
        match &e.expr {
            Expr::None => self.emit(
                span,
                Op::Load {
                    dst: reg,
                    val: Value::Nil,
                    immediate: false,
                },
            ),
            // The literal text is loaded as a string and re-parsed by the
            // runtime, so folded and unfolded paths agree on int vs decimal.
            Expr::Number { lit } => {
                self.emit(
                    span,
                    Op::Load {
                        dst: reg,
                        val: Value::Str(lit.clone()),
                        immediate: false,
                    },
                );
                self.emit(span, Op::CastNum { dst: reg });
            }
            Expr::Str { lit } => self.emit(
                span,
                Op::Load {
                    dst: reg,
                    val: Value::Str(lit.clone()),
                    immediate: false,
                },
            ),
            Expr::Native { value } => self.emit(
                span,
                Op::Load {
                    dst: reg,
                    val: value.clone(),
                    immediate: false,
                },
            ),
            Expr::Const { lit } => {
                let val = const_value(lit);
                self.emit(
                    span,
                    Op::Load {
                        dst: reg,
                        val,
                        immediate: false,
                    },
                );
            }
            Expr::Ident { id } => self.emit(span, Op::Get { dst: reg, id: *id }),
            Expr::Unary { op, expr } => {
                self.expr(expr, reg, false)?;
                self.emit(span, Op::Unary { dst: reg, op: *op });
            }
            Expr::Addr { expr } => match &expr.expr {
                Expr::Ident { id } => self.emit(span, Op::AddrId { dst: reg, id: *id }),
                Expr::Member { expr: obj, name } => {
                    self.expr(obj, reg, false)?;
                    self.emit(span, Op::AddrMember { dst: reg, name: *name });
                }
                _ => return Err(CompileError::invalid(span, "cannot take the address of this expression")),
            },
            Expr::Deref { expr } => match &expr.expr {
                Expr::Ident { id } => self.emit(span, Op::UnrefId { dst: reg, id: *id }),
                Expr::Member { expr: obj, name } => {
                    self.expr(obj, reg, false)?;
                    self.emit(span, Op::UnrefMember { dst: reg, name: *name });
                }
                _ => return Err(CompileError::invalid(span, "cannot dereference this expression")),
            },
            Expr::Paren { expr } => self.expr(expr, reg, false)?,
            Expr::BinOp { lhss, op, rhss } => self.binop(span, lhss, op, rhss, reg, in_stmt)?,
            Expr::Ternary { cond, then, els } => {
                self.expr(cond, reg, false)?;
                let els_label = self.alloc_label();
                self.emit(
                    span,
                    Op::JumpFalse {
                        cond: reg,
                        label: els_label,
                    },
                );
                self.expr(then, reg, false)?;
                let done = self.alloc_label();
                self.emit(span, Op::Jmp { label: done });
                self.emit(span, Op::Label { label: els_label });
                self.expr(els, reg, false)?;
                self.emit(span, Op::Label { label: done });
            }
            Expr::Call {
                name,
                args,
                var_arg,
                spawn,
            } => self.call_with(span, *name, args, *var_arg, *spawn, reg)?,
            Expr::AnonCall {
                func,
                args,
                var_arg,
                spawn,
            } => {
                // The callee value lands in `reg`; name id 0 tells the
                // call to start its arguments one register later.
                self.expr(func, reg, false)?;
                self.call_with(span, NameId::ANONYMOUS, args, *var_arg, *spawn, reg)?;
            }
            Expr::Member { expr, name } => {
                self.expr(expr, reg, false)?;
                self.emit(span, Op::GetMember { dst: reg, name: *name });
            }
            Expr::Item { value, index } => {
                self.expr(value, reg, false)?;
                self.expr(index, reg + 1, false)?;
                self.emit(
                    span,
                    Op::GetIdx {
                        arr: reg,
                        index: reg + 1,
                    },
                );
            }
            Expr::Slice { value, begin, end } => {
                self.expr(value, reg, false)?;
                self.expr(begin, reg + 1, false)?;
                self.expr(end, reg + 2, false)?;
                self.emit(
                    span,
                    Op::GetSubslice {
                        arr: reg,
                        begin: reg + 1,
                        end: reg + 2,
                    },
                );
            }
            Expr::Func {
                name,
                args,
                var_arg,
                body,
            } => {
                let start = self.alloc_label();
                let end = self.alloc_label();
                self.emit(
                    span,
                    Op::Func {
                        dst: reg,
                        name: *name,
                        args: args.clone(),
                        var_arg: *var_arg,
                        start,
                        end,
                    },
                );
                self.emit(span, Op::Label { label: start });
                self.block(body, reg)?;
                self.emit(span, Op::Label { label: end });
            }
            Expr::Let { lhs, rhs } => {
                self.expr(rhs, reg, false)?;
                self.let_to(lhs, reg)?;
            }
            Expr::Assoc { lhs, op, rhs } => self.assoc(span, lhs, op, rhs.as_deref(), reg)?,
            Expr::Chan { lhs, rhs } => self.chan(span, lhs.as_deref(), rhs, reg)?,
            Expr::TypeCast {
                type_id,
                type_expr,
                expr,
            } => {
                self.expr(expr, reg, false)?;
                match type_expr {
                    None => self.emit(
                        span,
                        Op::Load {
                            dst: reg + 1,
                            val: Value::Int(type_id.index() as i64),
                            immediate: true,
                        },
                    ),
                    Some(type_expr) => {
                        self.expr(type_expr, reg + 1, false)?;
                        self.emit(span, Op::SetName { reg: reg + 1 });
                    }
                }
                self.emit(
                    span,
                    Op::CastType {
                        dst: reg,
                        type_reg: reg + 1,
                    },
                );
            }
            Expr::Make { type_id, type_expr } => {
                match type_expr {
                    None => self.emit(
                        span,
                        Op::Load {
                            dst: reg,
                            val: Value::Int(type_id.index() as i64),
                            immediate: true,
                        },
                    ),
                    Some(type_expr) => {
                        self.expr(type_expr, reg, false)?;
                        self.emit(span, Op::SetName { reg });
                    }
                }
                self.emit(span, Op::Make { dst: reg });
            }
            Expr::MakeChan { size } => {
                match size {
                    None => self.emit(
                        span,
                        Op::Load {
                            dst: reg,
                            val: Value::Int(0),
                            immediate: false,
                        },
                    ),
                    Some(size) => self.expr(size, reg, false)?,
                }
                self.emit(span, Op::MakeChan { dst: reg });
            }
            Expr::MakeArray { len, cap } => {
                self.expr(len, reg, false)?;
                match cap {
                    None => self.emit(
                        span,
                        Op::Mv {
                            src: reg,
                            dst: reg + 1,
                        },
                    ),
                    Some(cap) => self.expr(cap, reg + 1, false)?,
                }
                self.emit(span, Op::MakeArr { dst: reg, cap: reg + 1 });
            }
            Expr::Array(exprs) => {
                self.emit(
                    span,
                    Op::MakeSlice {
                        dst: reg,
                        len: exprs.len(),
                        cap: exprs.len(),
                    },
                );
                for (i, element) in exprs.iter().enumerate() {
                    self.expr(element, reg + 1, false)?;
                    self.emit(
                        element.position,
                        Op::SetIdx {
                            arr: reg,
                            index: i,
                            src: reg + 1,
                        },
                    );
                }
            }
            Expr::Map(entries) => {
                self.emit(
                    span,
                    Op::MakeMap {
                        dst: reg,
                        len: entries.len(),
                    },
                );
                for entry in entries {
                    let Expr::Pair { key, value } = &entry.expr else {
                        return Err(CompileError::invalid(entry.position, "map literal entry must be a key-value pair"));
                    };
                    self.expr(value, reg + 1, false)?;
                    self.emit(
                        entry.position,
                        Op::SetKey {
                            map: reg,
                            src: reg + 1,
                            key: key.clone(),
                        },
                    );
                }
            }
            Expr::Pair { .. } => {
                return Err(CompileError::invalid(span, "key-value pair outside a map literal"));
            }
        }
        Ok(())
    }

    /// Assigns the value in `reg` into `target` (the l-expression
    /// protocol). Rejects targets that are not assignable.
    pub fn let_to(&mut self, target: &ExprLoc, reg: Reg) -> CompileResult<()> {
        let span = target.position;
        match &target.expr {
            Expr::Ident { id } => self.emit(span, Op::Set { src: reg, id: *id }),
            Expr::Member { expr, name } => {
                self.expr(expr, reg + 1, false)?;
                self.emit(
                    span,
                    Op::SetMember {
                        obj: reg + 1,
                        name: *name,
                        src: reg,
                    },
                );
            }
            Expr::Item { value, index } => {
                // The end label is allocated before the operands lower, so
                // label ids are not sequential with emission order here.
                let done = self.alloc_label();
                self.expr(value, reg + 1, false)?;
                self.expr(index, reg + 2, false)?;
                self.emit(
                    span,
                    Op::SetItem {
                        arr: reg + 1,
                        index: reg + 2,
                        src: reg,
                        flag: reg + 3,
                    },
                );
                self.emit(
                    span,
                    Op::JumpFalse {
                        cond: reg + 3,
                        label: done,
                    },
                );
                // The container was rebuilt rather than mutated in place:
                // bind it back into the original target.
                self.let_to(value, reg + 1)?;
                self.emit(span, Op::Label { label: done });
            }
            Expr::Slice { value, begin, end } => {
                let done = self.alloc_label();
                self.expr(value, reg + 1, false)?;
                self.expr(begin, reg + 2, false)?;
                self.expr(end, reg + 3, false)?;
                self.emit(
                    span,
                    Op::SetSlice {
                        arr: reg + 1,
                        begin: reg + 2,
                        end: reg + 3,
                        src: reg,
                        flag: reg + 4,
                    },
                );
                self.emit(
                    span,
                    Op::JumpFalse {
                        cond: reg + 4,
                        label: done,
                    },
                );
                self.let_to(value, reg + 1)?;
                self.emit(span, Op::Label { label: done });
            }
            _ => return Err(CompileError::invalid(span, "expression is not assignable")),
        }
        Ok(())
    }

    /// Lowers one statement. Statements produce no value; `reg` is the
    /// base of their scratch registers.
    pub fn stmt(&mut self, s: &StmtLoc, reg: Reg) -> CompileResult<()> {
        let span = s.position;
        match &s.stmt {
            Stmt::Var { names, exprs } => {
                if exprs.is_empty() {
                    for id in names {
                        self.emit(
                            span,
                            Op::Load {
                                dst: reg + 1,
                                val: Value::Nil,
                                immediate: false,
                            },
                        );
                        self.emit(span, Op::Set { src: reg + 1, id: *id });
                    }
                } else {
                    if names.len() != exprs.len() {
                        return Err(CompileError::invalid(
                            span,
                            "variable declaration has a different number of names and values",
                        ));
                    }
                    for (i, expr) in exprs.iter().enumerate() {
                        self.expr(expr, reg + 1 + i as Reg, false)?;
                    }
                    for (i, id) in names.iter().enumerate() {
                        self.emit(
                            span,
                            Op::Set {
                                src: reg + 1 + i as Reg,
                                id: *id,
                            },
                        );
                    }
                }
            }
            Stmt::Lets { lhss, rhss } => self.lets(span, lhss, rhss, reg)?,
            Stmt::Expr(expr) => self.expr(expr, reg, true)?,
            Stmt::Return { exprs } => {
                match &exprs[..] {
                    [] => self.emit(
                        span,
                        Op::Load {
                            dst: reg,
                            val: Value::Nil,
                            immediate: false,
                        },
                    ),
                    [single] => self.expr(single, reg, false)?,
                    many => {
                        self.emit(
                            span,
                            Op::MakeSlice {
                                dst: reg,
                                len: many.len(),
                                cap: many.len(),
                            },
                        );
                        for (i, expr) in many.iter().enumerate() {
                            self.expr(expr, reg + 1, false)?;
                            self.emit(
                                expr.position,
                                Op::SetIdx {
                                    arr: reg,
                                    index: i,
                                    src: reg + 1,
                                },
                            );
                        }
                    }
                }
                self.emit(span, Op::Ret { src: reg });
            }
            Stmt::Throw { expr } => {
                self.expr(expr, reg, false)?;
                self.emit(span, Op::Throw { src: reg });
            }
            Stmt::Break => match self.loops.last() {
                Some(labels) => {
                    let label = labels.break_to;
                    self.emit(span, Op::Jmp { label });
                }
                None => return Err(CompileError::invalid(span, "break outside of a loop")),
            },
            Stmt::Continue => match self.loops.last() {
                Some(labels) => {
                    let label = labels.continue_to;
                    self.emit(span, Op::Jmp { label });
                }
                None => return Err(CompileError::invalid(span, "continue outside of a loop")),
            },
            Stmt::If { cond, then, elifs, els } => {
                let done = self.alloc_label();
                let arms = std::iter::once((cond, then)).chain(elifs.iter().map(|arm| (&arm.cond, &arm.body)));
                for (cond, body) in arms {
                    let next = self.alloc_label();
                    self.expr(cond, reg, false)?;
                    self.emit(span, Op::JumpFalse { cond: reg, label: next });
                    self.block(body, reg)?;
                    self.emit(span, Op::Jmp { label: done });
                    self.emit(span, Op::Label { label: next });
                }
                self.block(els, reg)?;
                self.emit(span, Op::Label { label: done });
            }
            Stmt::ForIn { var, iterable, body } => {
                self.expr(iterable, reg, false)?;
                self.emit(span, Op::Foreach { reg });
                let next = self.alloc_label();
                let done = self.alloc_label();
                self.emit(span, Op::Label { label: next });
                self.emit(
                    span,
                    Op::IterNext {
                        iter: reg,
                        dst: reg + 1,
                        done,
                    },
                );
                self.emit(span, Op::Set { src: reg + 1, id: *var });
                // The iterator and its current value stay live across the
                // body, so body scratch starts above them.
                self.in_loop(next, done, |lowerer| lowerer.block(body, reg + 2))?;
                self.emit(span, Op::Jmp { label: next });
                self.emit(span, Op::Label { label: done });
            }
            Stmt::NumFor { var, from, to, body } => {
                self.expr(from, reg, false)?;
                self.expr(to, reg + 1, false)?;
                let cond = self.alloc_label();
                let step = self.alloc_label();
                let done = self.alloc_label();
                self.emit(span, Op::Label { label: cond });
                self.emit(
                    span,
                    Op::Mv {
                        src: reg,
                        dst: reg + 2,
                    },
                );
                self.emit(
                    span,
                    Op::Oper {
                        dst: reg + 2,
                        src: reg + 1,
                        op: Oper::Leq,
                    },
                );
                self.emit(
                    span,
                    Op::JumpFalse {
                        cond: reg + 2,
                        label: done,
                    },
                );
                self.emit(span, Op::Set { src: reg, id: *var });
                // The counter in `reg` is authoritative; assigning the
                // loop variable inside the body does not steer iteration.
                self.in_loop(step, done, |lowerer| lowerer.block(body, reg + 4))?;
                self.emit(span, Op::Label { label: step });
                self.emit(
                    span,
                    Op::Load {
                        dst: reg + 3,
                        val: Value::Int(1),
                        immediate: false,
                    },
                );
                self.emit(
                    span,
                    Op::Oper {
                        dst: reg,
                        src: reg + 3,
                        op: Oper::Add,
                    },
                );
                self.emit(span, Op::Jmp { label: cond });
                self.emit(span, Op::Label { label: done });
            }
            Stmt::Loop { cond, body } => {
                let check = self.alloc_label();
                let done = self.alloc_label();
                self.emit(span, Op::Label { label: check });
                self.expr(cond, reg, false)?;
                self.emit(span, Op::JumpFalse { cond: reg, label: done });
                self.in_loop(check, done, |lowerer| lowerer.block(body, reg))?;
                self.emit(span, Op::Jmp { label: check });
                self.emit(span, Op::Label { label: done });
            }
            Stmt::Try { body, catch } => {
                let handler = self.alloc_label();
                let done = self.alloc_label();
                self.emit(span, Op::Try { catch: handler });
                self.block(body, reg)?;
                self.emit(span, Op::PopTry);
                self.emit(span, Op::Jmp { label: done });
                self.emit(span, Op::Label { label: handler });
                self.block(catch, reg)?;
                self.emit(span, Op::Label { label: done });
            }
            Stmt::Switch { subject, cases } => self.switch(span, subject, cases, reg)?,
            Stmt::Select { cases } => self.select(span, cases, reg)?,
            Stmt::Module { name, body } => {
                self.emit(span, Op::Module { name: *name });
                self.block(body, reg)?;
                self.emit(span, Op::EndModule);
            }
        }
        Ok(())
    }

    /// Lowers a statement list against one scratch base register.
    pub fn block(&mut self, stmts: &[StmtLoc], reg: Reg) -> CompileResult<()> {
        for stmt in stmts {
            self.stmt(stmt, reg)?;
        }
        Ok(())
    }

    /// Runs `body` with a loop-label frame pushed, popping it on every
    /// path out.
    fn in_loop(
        &mut self,
        continue_to: Label,
        break_to: Label,
        body: impl FnOnce(&mut Self) -> CompileResult<()>,
    ) -> CompileResult<()> {
        self.loops.push(LoopLabels { continue_to, break_to });
        let result = body(self);
        self.loops.pop();
        result
    }

    fn binop(
        &mut self,
        span: Span,
        lhss: &[ExprLoc],
        op_text: &str,
        rhss: &[ExprLoc],
        reg: Reg,
        in_stmt: bool,
    ) -> CompileResult<()> {
        let Some(oper) = Oper::from_text(op_text) else {
            return Err(CompileError::new(
                CompileErrorKind::UnknownOperator,
                span,
                format!("unknown operator '{op_text}'"),
            ));
        };
        // `a == b` in statement position is an assignment, not a
        // comparison; this is also the only place the comma lists may be
        // wider than one expression.
        if in_stmt && oper == Oper::Eql {
            return self.lets(span, lhss, rhss, reg);
        }
        let ([lhs], [rhs]) = (lhss, rhss) else {
            return Err(CompileError::invalid(
                span,
                "each side of the operation must be a single expression",
            ));
        };
        self.expr(lhs, reg, false)?;
        match oper {
            Oper::Or => {
                let short = self.alloc_label();
                self.emit(
                    span,
                    Op::JumpTrue {
                        cond: reg,
                        label: short,
                    },
                );
                self.expr(rhs, reg, false)?;
                self.emit(span, Op::Label { label: short });
            }
            Oper::And => {
                let short = self.alloc_label();
                self.emit(
                    span,
                    Op::JumpFalse {
                        cond: reg,
                        label: short,
                    },
                );
                self.expr(rhs, reg, false)?;
                self.emit(span, Op::Label { label: short });
            }
            _ => {
                self.expr(rhs, reg + 1, false)?;
                self.emit(
                    span,
                    Op::Oper {
                        dst: reg,
                        src: reg + 1,
                        op: oper,
                    },
                );
            }
        }
        Ok(())
    }

    /// The multi-target assignment protocol: every right-hand side is
    /// evaluated into a fresh temporary before any target is assigned.
    fn lets(&mut self, span: Span, lhss: &[ExprLoc], rhss: &[ExprLoc], reg: Reg) -> CompileResult<()> {
        if lhss.len() != rhss.len() {
            return Err(CompileError::invalid(
                span,
                "assignment sides have a different number of expressions",
            ));
        }
        for (i, rhs) in rhss.iter().enumerate() {
            self.expr(rhs, reg + 1 + i as Reg, false)?;
        }
        for (i, lhs) in lhss.iter().enumerate() {
            self.let_to(lhs, reg + 1 + i as Reg)?;
        }
        Ok(())
    }

    fn call_with(
        &mut self,
        span: Span,
        name: NameId,
        args: &[ExprLoc],
        var_arg: bool,
        spawn: bool,
        reg: Reg,
    ) -> CompileResult<()> {
        // For an anonymous call the function value occupies `reg`, so the
        // arguments shift up one register.
        let regoff: Reg = if name.is_anonymous() { 1 } else { 0 };
        // With more than one argument they are gathered into a slice at
        // the argument base; a single argument is passed directly.
        let sliceoff: Reg = if args.len() > 1 {
            self.emit(
                span,
                Op::MakeSlice {
                    dst: reg + regoff,
                    len: args.len(),
                    cap: args.len(),
                },
            );
            1
        } else {
            0
        };
        for (i, arg) in args.iter().enumerate() {
            self.expr(arg, reg + sliceoff + regoff, false)?;
            if sliceoff == 1 {
                self.emit(
                    arg.position,
                    Op::SetIdx {
                        arr: reg + regoff,
                        index: i,
                        src: reg + sliceoff + regoff,
                    },
                );
            }
        }
        self.emit(
            span,
            Op::Call {
                name,
                nargs: args.len(),
                args: reg,
                dst: reg,
                var_arg,
                spawn,
            },
        );
        Ok(())
    }

    /// Compound assignment: read the target, apply the operator, write the
    /// result back through the l-expression protocol.
    fn assoc(&mut self, span: Span, lhs: &ExprLoc, op_text: &str, rhs: Option<&ExprLoc>, reg: Reg) -> CompileResult<()> {
        let oper = match op_text {
            "+=" | "++" => Oper::Add,
            "-=" | "--" => Oper::Sub,
            "*=" => Oper::Mul,
            "/=" => Oper::Div,
            "&=" => Oper::BitAnd,
            "|=" => Oper::BitOr,
            _ => {
                return Err(CompileError::new(
                    CompileErrorKind::UnknownOperator,
                    span,
                    format!("unknown compound assignment '{op_text}'"),
                ))
            }
        };
        self.expr(lhs, reg, false)?;
        match rhs {
            Some(rhs) => self.expr(rhs, reg + 1, false)?,
            // The `++`/`--` forms carry no right-hand side; the step is 1.
            None => self.emit(
                span,
                Op::Load {
                    dst: reg + 1,
                    val: Value::Int(1),
                    immediate: false,
                },
            ),
        }
        self.emit(
            span,
            Op::Oper {
                dst: reg,
                src: reg + 1,
                op: oper,
            },
        );
        self.let_to(lhs, reg)
    }

    /// The channel operation: "send if the left side is a channel, else
    /// read the right side into the left". Direction is a runtime check.
    fn chan(&mut self, span: Span, lhs: Option<&ExprLoc>, rhs: &ExprLoc, reg: Reg) -> CompileResult<()> {
        self.expr(rhs, reg + 1, false)?;
        let Some(lhs) = lhs else {
            // Receive with the value kept only in the result register.
            self.emit(
                span,
                Op::ChanRecv {
                    chan: reg + 1,
                    dst: reg,
                },
            );
            return Ok(());
        };
        self.expr(lhs, reg + 2, false)?;
        self.emit(
            span,
            Op::Mv {
                src: reg + 2,
                dst: reg + 3,
            },
        );
        self.emit(
            span,
            Op::IsKind {
                reg: reg + 3,
                kind: ValueKind::Chan,
            },
        );
        let read = self.alloc_label();
        self.emit(
            span,
            Op::JumpFalse {
                cond: reg + 3,
                label: read,
            },
        );
        self.emit(
            span,
            Op::ChanSend {
                chan: reg + 2,
                val: reg + 1,
            },
        );
        self.emit(
            span,
            Op::Load {
                dst: reg,
                val: Value::Bool(true),
                immediate: false,
            },
        );
        let done = self.alloc_label();
        self.emit(span, Op::Jmp { label: done });
        self.emit(span, Op::Label { label: read });
        self.emit(
            span,
            Op::ChanRecv {
                chan: reg + 1,
                dst: reg,
            },
        );
        self.let_to(lhs, reg)?;
        self.emit(span, Op::Label { label: done });
        Ok(())
    }

    /// Equality dispatch over the cases, first match wins, no fallthrough.
    fn switch(&mut self, span: Span, subject: &ExprLoc, cases: &[SwitchCase], reg: Reg) -> CompileResult<()> {
        if cases.iter().filter(|case| case.cond.is_none()).count() > 1 {
            return Err(CompileError::invalid(span, "switch has more than one default case"));
        }
        self.expr(subject, reg, false)?;
        let done = self.alloc_label();
        let mut case_labels = Vec::new();
        for case in cases {
            if case.cond.is_some() {
                case_labels.push(self.alloc_label());
            }
        }
        let default_label = cases.iter().any(|case| case.cond.is_none()).then(|| self.alloc_label());

        let mut next_case = 0;
        for case in cases {
            if let Some(cond) = &case.cond {
                self.expr(cond, reg + 1, false)?;
                self.emit(
                    case.position,
                    Op::Mv {
                        src: reg,
                        dst: reg + 2,
                    },
                );
                self.emit(
                    case.position,
                    Op::Oper {
                        dst: reg + 2,
                        src: reg + 1,
                        op: Oper::Eql,
                    },
                );
                self.emit(
                    case.position,
                    Op::JumpTrue {
                        cond: reg + 2,
                        label: case_labels[next_case],
                    },
                );
                next_case += 1;
            }
        }
        self.emit(
            span,
            Op::Jmp {
                label: default_label.unwrap_or(done),
            },
        );

        let mut next_case = 0;
        for case in cases {
            let label = match &case.cond {
                Some(_) => {
                    let label = case_labels[next_case];
                    next_case += 1;
                    label
                }
                None => default_label.expect("checked above"),
            };
            self.emit(case.position, Op::Label { label });
            self.block(&case.body, reg)?;
            self.emit(case.position, Op::Jmp { label: done });
        }
        self.emit(span, Op::Label { label: done });
        Ok(())
    }

    /// Polls every channel case in source order; with no default the whole
    /// dispatch re-polls until one is ready. Blocking fairness is the
    /// VM's concern.
    fn select(&mut self, span: Span, cases: &[SelectCase], reg: Reg) -> CompileResult<()> {
        if cases.iter().filter(|case| case.op.is_none()).count() > 1 {
            return Err(CompileError::invalid(span, "select has more than one default case"));
        }
        let done = self.alloc_label();
        let poll = self.alloc_label();
        self.emit(span, Op::Label { label: poll });
        for case in cases {
            let Some(op) = &case.op else { continue };
            let Expr::Chan { lhs, rhs } = &op.expr else {
                return Err(CompileError::invalid(op.position, "select case must be a channel operation"));
            };
            let next = self.alloc_label();
            match lhs {
                None => {
                    self.expr(rhs, reg + 1, false)?;
                    self.emit(
                        op.position,
                        Op::TryRecv {
                            chan: reg + 1,
                            dst: reg,
                            ok: reg + 2,
                        },
                    );
                    self.emit(
                        op.position,
                        Op::JumpFalse {
                            cond: reg + 2,
                            label: next,
                        },
                    );
                    self.block(&case.body, reg)?;
                    self.emit(case.position, Op::Jmp { label: done });
                }
                Some(lhs) => {
                    // Same direction dance as the blocking channel
                    // operation, with the non-blocking primitives.
                    self.expr(rhs, reg + 1, false)?;
                    self.expr(lhs, reg + 2, false)?;
                    self.emit(
                        op.position,
                        Op::Mv {
                            src: reg + 2,
                            dst: reg + 3,
                        },
                    );
                    self.emit(
                        op.position,
                        Op::IsKind {
                            reg: reg + 3,
                            kind: ValueKind::Chan,
                        },
                    );
                    let read = self.alloc_label();
                    self.emit(
                        op.position,
                        Op::JumpFalse {
                            cond: reg + 3,
                            label: read,
                        },
                    );
                    self.emit(
                        op.position,
                        Op::TrySend {
                            chan: reg + 2,
                            val: reg + 1,
                            ok: reg + 4,
                        },
                    );
                    self.emit(
                        op.position,
                        Op::JumpFalse {
                            cond: reg + 4,
                            label: next,
                        },
                    );
                    self.emit(
                        op.position,
                        Op::Load {
                            dst: reg,
                            val: Value::Bool(true),
                            immediate: false,
                        },
                    );
                    let run_body = self.alloc_label();
                    self.emit(op.position, Op::Jmp { label: run_body });
                    self.emit(op.position, Op::Label { label: read });
                    self.emit(
                        op.position,
                        Op::TryRecv {
                            chan: reg + 1,
                            dst: reg,
                            ok: reg + 4,
                        },
                    );
                    self.emit(
                        op.position,
                        Op::JumpFalse {
                            cond: reg + 4,
                            label: next,
                        },
                    );
                    self.let_to(lhs, reg)?;
                    self.emit(op.position, Op::Label { label: run_body });
                    self.block(&case.body, reg)?;
                    self.emit(case.position, Op::Jmp { label: done });
                }
            }
            self.emit(op.position, Op::Label { label: next });
        }
        match cases.iter().find(|case| case.op.is_none()) {
            Some(default_case) => {
                self.block(&default_case.body, reg)?;
                self.emit(span, Op::Jmp { label: done });
            }
            None => self.emit(span, Op::Jmp { label: poll }),
        }
        self.emit(span, Op::Label { label: done });
        Ok(())
    }
}

/// The lowering-time constant table: recognized keywords load their value,
/// anything else loads `nil`.
fn const_value(lit: &str) -> Value {
    match lit.to_lowercase().as_str() {
        "истина" | "true" => Value::Bool(true),
        "ложь" | "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => Value::Nil,
    }
}
