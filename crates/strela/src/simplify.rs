//! Bottom-up constant folding.
//!
//! Every node simplifies its children first, then may rewrite itself to a
//! `Native` node when all the operands it needs are already fully
//! evaluated. Folding never fails loudly: when a literal does not parse,
//! an operator is unsupported for its operand pair, or an index is out of
//! range, the subtree is simply left as-is so the VM raises the precise
//! runtime error at the original span. Synthetic `Native` nodes take the
//! span of the node they replace.

use indexmap::IndexMap;

use crate::{
    decimal::Decimal,
    expressions::{ElseIf, Expr, ExprLoc, OperandList, SelectCase, Stmt, StmtLoc, SwitchCase},
    ops::Oper,
    value::Value,
};

impl ExprLoc {
    /// Simplifies this expression tree, returning its folded equivalent.
    ///
    /// The result is semantically equal to the input under pure
    /// evaluation, and simplification is idempotent: simplifying an
    /// already simplified tree changes nothing.
    #[must_use]
    pub fn simplify(self) -> ExprLoc {
        let ExprLoc { position, expr } = self;
        let expr = match expr {
            Expr::Number { lit } => fold_number(lit),
            Expr::Str { lit } => Expr::Native { value: Value::Str(lit) },
            Expr::Const { lit } => match keyword_const(&lit) {
                Some(value) => Expr::Native { value },
                None => Expr::Const { lit },
            },
            Expr::Array(exprs) => {
                let exprs: Vec<ExprLoc> = exprs.into_iter().map(ExprLoc::simplify).collect();
                if exprs.iter().all(|e| matches!(e.expr, Expr::Native { .. })) {
                    let items = exprs
                        .into_iter()
                        .map(|e| match e.expr {
                            Expr::Native { value } => value,
                            _ => unreachable!("checked above"),
                        })
                        .collect();
                    Expr::Native {
                        value: Value::Slice(items),
                    }
                } else {
                    Expr::Array(exprs)
                }
            }
            Expr::Map(entries) => fold_map(entries),
            Expr::Pair { key, value } => Expr::Pair {
                key,
                value: Box::new(value.simplify()),
            },
            Expr::Paren { expr } => {
                let inner = expr.simplify();
                if matches!(inner.expr, Expr::Native { .. }) {
                    // The grouping is gone; the folded value keeps the
                    // inner node's span.
                    return inner;
                }
                Expr::Paren { expr: Box::new(inner) }
            }
            Expr::Unary { op, expr } => {
                let operand = expr.simplify();
                match &operand.expr {
                    Expr::Native { value } => match value.eval_unop(op) {
                        Ok(folded) => Expr::Native { value: folded },
                        Err(_) => Expr::Unary {
                            op,
                            expr: Box::new(operand),
                        },
                    },
                    _ => Expr::Unary {
                        op,
                        expr: Box::new(operand),
                    },
                }
            }
            Expr::BinOp { lhss, op, rhss } => fold_binop(*lhss, op, *rhss),
            Expr::Ternary { cond, then, els } => {
                // All three children simplify independently; only a
                // condition already folded to a bool selects a branch.
                let cond = cond.simplify();
                let then = then.simplify();
                let els = els.simplify();
                if let Expr::Native { value } = &cond.expr {
                    if let Some(truth) = value.truthy() {
                        return if truth { then } else { els };
                    }
                }
                Expr::Ternary {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    els: Box::new(els),
                }
            }
            Expr::Item { value, index } => fold_item(*value, *index),
            Expr::Slice { value, begin, end } => fold_slice(*value, *begin, *end),
            Expr::Addr { expr } => Expr::Addr {
                expr: Box::new(expr.simplify()),
            },
            Expr::Deref { expr } => Expr::Deref {
                expr: Box::new(expr.simplify()),
            },
            Expr::Call {
                name,
                args,
                var_arg,
                spawn,
            } => Expr::Call {
                name,
                args: simplify_all(args),
                var_arg,
                spawn,
            },
            Expr::AnonCall {
                func,
                args,
                var_arg,
                spawn,
            } => Expr::AnonCall {
                func: Box::new(func.simplify()),
                args: simplify_all(args),
                var_arg,
                spawn,
            },
            Expr::Member { expr, name } => Expr::Member {
                expr: Box::new(expr.simplify()),
                name,
            },
            Expr::Func {
                name,
                args,
                var_arg,
                body,
            } => Expr::Func {
                name,
                args,
                var_arg,
                body: simplify_block(body),
            },
            Expr::Let { lhs, rhs } => Expr::Let {
                lhs: Box::new(lhs.simplify()),
                rhs: Box::new(rhs.simplify()),
            },
            Expr::Assoc { lhs, op, rhs } => Expr::Assoc {
                lhs: Box::new(lhs.simplify()),
                op,
                rhs: rhs.map(|r| Box::new(r.simplify())),
            },
            Expr::Chan { lhs, rhs } => Expr::Chan {
                lhs: lhs.map(|l| Box::new(l.simplify())),
                rhs: Box::new(rhs.simplify()),
            },
            Expr::TypeCast {
                type_id,
                type_expr,
                expr,
            } => Expr::TypeCast {
                type_id,
                type_expr: type_expr.map(|t| Box::new(t.simplify())),
                expr: Box::new(expr.simplify()),
            },
            Expr::Make { type_id, type_expr } => Expr::Make {
                type_id,
                type_expr: type_expr.map(|t| Box::new(t.simplify())),
            },
            Expr::MakeChan { size } => Expr::MakeChan {
                size: size.map(|s| Box::new(s.simplify())),
            },
            Expr::MakeArray { len, cap } => Expr::MakeArray {
                len: Box::new(len.simplify()),
                cap: cap.map(|c| Box::new(c.simplify())),
            },
            keep @ (Expr::None | Expr::Ident { .. } | Expr::Native { .. }) => keep,
        };
        ExprLoc { position, expr }
    }
}

/// Parses a numeric literal: decimal when the text contains `.`, `e` or
/// `E`, integer otherwise. Parse failures keep the literal for the VM.
fn fold_number(lit: Box<str>) -> Expr {
    if lit.contains(['.', 'e', 'E']) {
        match Decimal::parse(&lit) {
            Ok(value) => Expr::Native {
                value: Value::Decimal(value),
            },
            Err(_) => Expr::Number { lit },
        }
    } else {
        match lit.parse::<i64>() {
            Ok(value) => Expr::Native { value: Value::Int(value) },
            Err(_) => Expr::Number { lit },
        }
    }
}

/// Canonicalizes a keyword constant, case-insensitively in both locales.
fn keyword_const(lit: &str) -> Option<Value> {
    match lit.to_lowercase().as_str() {
        "истина" | "true" => Some(Value::Bool(true)),
        "ложь" | "false" => Some(Value::Bool(false)),
        "null" => Some(Value::Null),
        _ => None,
    }
}

fn fold_map(entries: Vec<ExprLoc>) -> Expr {
    let entries: Vec<ExprLoc> = entries.into_iter().map(ExprLoc::simplify).collect();
    let foldable = entries.iter().all(|entry| {
        matches!(
            &entry.expr,
            Expr::Pair { value, .. } if matches!(value.expr, Expr::Native { .. })
        )
    });
    if !foldable {
        return Expr::Map(entries);
    }
    let mut map = IndexMap::with_capacity(entries.len());
    for entry in entries {
        match entry.expr {
            Expr::Pair { key, value } => match value.expr {
                Expr::Native { value } => {
                    map.insert(key, value);
                }
                _ => unreachable!("checked above"),
            },
            _ => unreachable!("checked above"),
        }
    }
    Expr::Native { value: Value::Map(map) }
}

fn fold_binop(lhss: OperandList, op: Box<str>, rhss: OperandList) -> Expr {
    let lhss: OperandList = lhss.into_iter().map(ExprLoc::simplify).collect();
    let rhss: OperandList = rhss.into_iter().map(ExprLoc::simplify).collect();
    if let ([left], [right]) = (&lhss[..], &rhss[..]) {
        if let (Expr::Native { value: a }, Expr::Native { value: b }) = (&left.expr, &right.expr) {
            if let Some(oper) = Oper::from_text(&op) {
                if let Ok(folded) = a.eval_binop(oper, b) {
                    return Expr::Native { value: folded };
                }
            }
        }
    }
    Expr::BinOp { lhss: Box::new(lhss), op, rhss: Box::new(rhss) }
}

fn fold_item(value: ExprLoc, index: ExprLoc) -> Expr {
    let value = value.simplify();
    let index = index.simplify();
    if let (Expr::Native { value: container }, Expr::Native { value: key }) = (&value.expr, &index.expr) {
        if let (Some(items), Value::Int(i)) = (container.as_slice(), key) {
            if let Ok(i) = usize::try_from(*i) {
                if let Some(item) = items.get(i) {
                    return Expr::Native { value: item.clone() };
                }
            }
        }
        if let (Some(entries), Value::Str(k)) = (container.as_string_map(), key) {
            if let Some(item) = entries.get(k) {
                return Expr::Native { value: item.clone() };
            }
        }
    }
    Expr::Item {
        value: Box::new(value),
        index: Box::new(index),
    }
}

fn fold_slice(value: ExprLoc, begin: ExprLoc, end: ExprLoc) -> Expr {
    let value = value.simplify();
    let begin = begin.simplify();
    let end = end.simplify();
    if let (Expr::Native { value: container }, Expr::Native { value: b }, Expr::Native { value: e }) =
        (&value.expr, &begin.expr, &end.expr)
    {
        if let (Some(items), Value::Int(b), Value::Int(e)) = (container.as_slice(), b, e) {
            if let (Ok(b), Ok(e)) = (usize::try_from(*b), usize::try_from(*e)) {
                if b <= e && e <= items.len() {
                    return Expr::Native {
                        value: Value::Slice(items[b..e].to_vec()),
                    };
                }
            }
        }
    }
    Expr::Slice {
        value: Box::new(value),
        begin: Box::new(begin),
        end: Box::new(end),
    }
}

fn simplify_all(exprs: Vec<ExprLoc>) -> Vec<ExprLoc> {
    exprs.into_iter().map(ExprLoc::simplify).collect()
}

/// Simplifies a statement list in place of its expressions and bodies.
#[must_use]
pub fn simplify_block(stmts: Vec<StmtLoc>) -> Vec<StmtLoc> {
    stmts.into_iter().map(StmtLoc::simplify).collect()
}

impl StmtLoc {
    /// Simplifies every expression reachable from this statement,
    /// including bodies of nested function literals.
    #[must_use]
    pub fn simplify(self) -> StmtLoc {
        let StmtLoc { position, stmt } = self;
        let stmt = match stmt {
            Stmt::Var { names, exprs } => Stmt::Var {
                names,
                exprs: simplify_all(exprs),
            },
            Stmt::Lets { lhss, rhss } => Stmt::Lets {
                lhss: simplify_all(lhss),
                rhss: simplify_all(rhss),
            },
            Stmt::Expr(expr) => Stmt::Expr(expr.simplify()),
            Stmt::Return { exprs } => Stmt::Return {
                exprs: simplify_all(exprs),
            },
            Stmt::Throw { expr } => Stmt::Throw { expr: expr.simplify() },
            Stmt::If { cond, then, elifs, els } => Stmt::If {
                cond: cond.simplify(),
                then: simplify_block(then),
                elifs: elifs
                    .into_iter()
                    .map(|arm| ElseIf {
                        cond: arm.cond.simplify(),
                        body: simplify_block(arm.body),
                    })
                    .collect(),
                els: simplify_block(els),
            },
            Stmt::ForIn { var, iterable, body } => Stmt::ForIn {
                var,
                iterable: iterable.simplify(),
                body: simplify_block(body),
            },
            Stmt::NumFor { var, from, to, body } => Stmt::NumFor {
                var,
                from: from.simplify(),
                to: to.simplify(),
                body: simplify_block(body),
            },
            Stmt::Loop { cond, body } => Stmt::Loop {
                cond: cond.simplify(),
                body: simplify_block(body),
            },
            Stmt::Try { body, catch } => Stmt::Try {
                body: simplify_block(body),
                catch: simplify_block(catch),
            },
            Stmt::Switch { subject, cases } => Stmt::Switch {
                subject: subject.simplify(),
                cases: cases
                    .into_iter()
                    .map(|case| SwitchCase {
                        cond: case.cond.map(ExprLoc::simplify),
                        body: simplify_block(case.body),
                        position: case.position,
                    })
                    .collect(),
            },
            Stmt::Select { cases } => Stmt::Select {
                cases: cases
                    .into_iter()
                    .map(|case| SelectCase {
                        op: case.op.map(ExprLoc::simplify),
                        body: simplify_block(case.body),
                        position: case.position,
                    })
                    .collect(),
            },
            Stmt::Module { name, body } => Stmt::Module {
                name,
                body: simplify_block(body),
            },
            keep @ (Stmt::Break | Stmt::Continue) => keep,
        };
        StmtLoc { position, stmt }
    }
}
