//! Executes emitted programs on a stub VM that records register writes.
//!
//! The stub interprets just enough of the instruction set to check the
//! ordering guarantees: the destination register ends up holding the
//! node's value, short-circuited operands are never evaluated, exactly
//! one ternary branch runs, and the statement protocols (multi-target
//! assignment, loops, dispatch) hold up end to end. Reading an undefined
//! variable is the stub's observable side effect: anything lowered but
//! skipped at runtime stays unobserved.

use std::collections::HashMap;

use strela::{Decimal, Expr, ExprLoc, NameId, Op, Program, Reg, Span, Stmt, StmtLoc, Value, lower_expr, lower_program};

#[derive(Default)]
struct StubVm {
    regs: HashMap<Reg, Value>,
    vars: HashMap<NameId, Value>,
    iters: HashMap<Reg, (Vec<Value>, usize)>,
    writes: Vec<(Reg, Value)>,
    result: Option<Value>,
}

impl StubVm {
    fn with_vars(vars: &[(NameId, Value)]) -> Self {
        Self {
            vars: vars.iter().cloned().collect(),
            ..Self::default()
        }
    }

    fn run(&mut self, program: &Program) -> Result<(), String> {
        let mut labels = HashMap::new();
        for (pos, instr) in program.instrs.iter().enumerate() {
            if let Op::Label { label } = &instr.op {
                labels.insert(label.id(), pos);
            }
        }
        let jump = |label: &strela::Label| -> Result<usize, String> {
            labels.get(&label.id()).copied().ok_or(format!("undefined label {label}"))
        };

        let mut pc = 0usize;
        let mut steps = 0u32;
        while pc < program.instrs.len() {
            steps += 1;
            if steps > 100_000 {
                return Err("step limit exceeded".into());
            }
            match &program.instrs[pc].op {
                Op::Load { dst, val, .. } => self.write(*dst, val.clone()),
                Op::CastNum { dst } => {
                    let Value::Str(text) = self.read(*dst)? else {
                        return Err("CASTNUM over a non-string".into());
                    };
                    self.write(*dst, parse_number(&text)?);
                }
                Op::Unary { dst, op } => {
                    let value = self.read(*dst)?;
                    self.write(*dst, value.eval_unop(*op).map_err(|e| e.to_string())?);
                }
                Op::Oper { dst, src, op } => {
                    let left = self.read(*dst)?;
                    let right = self.read(*src)?;
                    self.write(*dst, left.eval_binop(*op, &right).map_err(|e| e.to_string())?);
                }
                Op::Mv { src, dst } => {
                    let value = self.read(*src)?;
                    self.write(*dst, value);
                }
                Op::Get { dst, id } => {
                    let value = self
                        .vars
                        .get(id)
                        .cloned()
                        .ok_or(format!("undefined variable n{}", id.index()))?;
                    self.write(*dst, value);
                }
                Op::Set { src, id } => {
                    let value = self.read(*src)?;
                    self.vars.insert(*id, value);
                }
                Op::MakeSlice { dst, len, .. } => self.write(*dst, Value::Slice(vec![Value::Nil; *len])),
                Op::SetIdx { arr, index, src } => {
                    let value = self.read(*src)?;
                    match self.regs.get_mut(arr) {
                        Some(Value::Slice(items)) if *index < items.len() => items[*index] = value,
                        _ => return Err("SETIDX over a non-slice".into()),
                    }
                }
                Op::MakeMap { dst, .. } => self.write(*dst, Value::Map(Default::default())),
                Op::SetKey { map, src, key } => {
                    let value = self.read(*src)?;
                    match self.regs.get_mut(map) {
                        Some(Value::Map(entries)) => {
                            entries.insert(key.clone(), value);
                        }
                        _ => return Err("SETKEY over a non-map".into()),
                    }
                }
                Op::GetIdx { arr, index } => {
                    let container = self.read(*arr)?;
                    let key = self.read(*index)?;
                    let item = match (&container, &key) {
                        (Value::Slice(items), Value::Int(i)) => usize::try_from(*i)
                            .ok()
                            .and_then(|i| items.get(i))
                            .cloned()
                            .ok_or("index out of range")?,
                        (Value::Map(entries), Value::Str(k)) => {
                            entries.get(k).cloned().ok_or("missing map key")?
                        }
                        _ => return Err("GETIDX over unsupported operands".into()),
                    };
                    self.write(*arr, item);
                }
                Op::GetSubslice { arr, begin, end } => {
                    let Value::Slice(items) = self.read(*arr)? else {
                        return Err("GETSUBSLICE over a non-slice".into());
                    };
                    let begin = match self.read(*begin)? {
                        Value::Int(i) => usize::try_from(i).map_err(|_| "negative slice bound")?,
                        Value::Nil => 0,
                        _ => return Err("bad slice bound".into()),
                    };
                    let end = match self.read(*end)? {
                        Value::Int(i) => usize::try_from(i).map_err(|_| "negative slice bound")?,
                        Value::Nil => items.len(),
                        _ => return Err("bad slice bound".into()),
                    };
                    if begin > end || end > items.len() {
                        return Err("slice bounds out of range".into());
                    }
                    self.write(*arr, Value::Slice(items[begin..end].to_vec()));
                }
                Op::SetItem { arr, index, src, flag } => {
                    let value = self.read(*src)?;
                    let key = self.read(*index)?;
                    match (self.regs.get_mut(arr), &key) {
                        (Some(Value::Slice(items)), Value::Int(i)) => {
                            let i = usize::try_from(*i).map_err(|_| "negative index")?;
                            if i >= items.len() {
                                return Err("index out of range".into());
                            }
                            items[i] = value;
                        }
                        (Some(Value::Map(entries)), Value::Str(k)) => {
                            entries.insert(k.clone(), value);
                        }
                        _ => return Err("SETITEM over unsupported operands".into()),
                    }
                    // Containers are plain values in the stub, so the
                    // mutation never lands in place: ask for the rebind.
                    self.write(*flag, Value::Bool(false));
                }
                Op::Foreach { reg } => {
                    let Value::Slice(items) = self.read(*reg)? else {
                        return Err("FOREACH over a non-slice".into());
                    };
                    self.iters.insert(*reg, (items, 0));
                }
                Op::IterNext { iter, dst, done } => {
                    let (items, pos) = self.iters.get_mut(iter).ok_or("ITNEXT without FOREACH")?;
                    if *pos < items.len() {
                        let value = items[*pos].clone();
                        *pos += 1;
                        self.write(*dst, value);
                    } else {
                        pc = jump(done)?;
                        continue;
                    }
                }
                Op::Label { .. } | Op::Try { .. } | Op::PopTry => {}
                Op::Jmp { label } => {
                    pc = jump(label)?;
                    continue;
                }
                Op::JumpTrue { cond, label } => {
                    if truth(&self.read(*cond)?)? {
                        pc = jump(label)?;
                        continue;
                    }
                }
                Op::JumpFalse { cond, label } => {
                    if !truth(&self.read(*cond)?)? {
                        pc = jump(label)?;
                        continue;
                    }
                }
                Op::Throw { src } => {
                    let value = self.read(*src)?;
                    return Err(format!("throw: {value}"));
                }
                Op::Ret { src } => {
                    self.result = Some(self.read(*src)?);
                    return Ok(());
                }
                other => return Err(format!("unsupported in the stub VM: {other}")),
            }
            pc += 1;
        }
        Ok(())
    }

    fn write(&mut self, reg: Reg, value: Value) {
        self.writes.push((reg, value.clone()));
        self.regs.insert(reg, value);
    }

    fn read(&self, reg: Reg) -> Result<Value, String> {
        self.regs.get(&reg).cloned().ok_or(format!("read of unwritten r{reg}"))
    }
}

fn truth(value: &Value) -> Result<bool, String> {
    value.truthy().ok_or("jump condition is not a bool".into())
}

fn parse_number(text: &str) -> Result<Value, String> {
    if text.contains(['.', 'e', 'E']) {
        Decimal::parse(text).map(Value::Decimal).map_err(|e| e.to_string())
    } else {
        text.parse::<i64>().map(Value::Int).map_err(|e| e.to_string())
    }
}

fn loc(expr: Expr) -> ExprLoc {
    ExprLoc::new(Span::unknown(), expr)
}

fn stmt(stmt: Stmt) -> StmtLoc {
    StmtLoc::new(Span::unknown(), stmt)
}

fn num(lit: &str) -> ExprLoc {
    loc(Expr::Number { lit: lit.into() })
}

fn konst(lit: &str) -> ExprLoc {
    loc(Expr::Const { lit: lit.into() })
}

fn ident(id: u32) -> ExprLoc {
    loc(Expr::Ident {
        id: NameId::from_raw(id),
    })
}

fn binop(lhs: ExprLoc, op: &str, rhs: ExprLoc) -> ExprLoc {
    loc(Expr::BinOp {
        lhss: Box::new([lhs].into_iter().collect()),
        op: op.into(),
        rhss: Box::new([rhs].into_iter().collect()),
    })
}

fn assign(target: u32, value: ExprLoc) -> StmtLoc {
    stmt(Stmt::Lets {
        lhss: vec![ident(target)],
        rhss: vec![value],
    })
}

fn eval(expr: &ExprLoc) -> Result<Value, String> {
    let program = lower_expr(expr).map_err(|e| e.to_string())?;
    let mut vm = StubVm::default();
    vm.run(&program)?;
    vm.read(0)
}

/// The quantified invariant: after running a lowered expression, register
/// 0 holds the node's value.
#[test]
fn destination_register_holds_the_value() {
    let cases: Vec<(ExprLoc, Value)> = vec![
        (num("42"), Value::Int(42)),
        (num("2.5"), Value::Decimal(Decimal::parse("2.5").unwrap())),
        (binop(num("2"), "+", num("3")), Value::Int(5)),
        (binop(num("1"), "<", num("2")), Value::Bool(true)),
        (konst("ложь"), Value::Bool(false)),
        (
            loc(Expr::Unary {
                op: '-',
                expr: Box::new(num("7")),
            }),
            Value::Int(-7),
        ),
        (
            loc(Expr::Item {
                value: Box::new(loc(Expr::Array(vec![num("10"), num("20")]))),
                index: Box::new(num("1")),
            }),
            Value::Int(20),
        ),
        (
            loc(Expr::Ternary {
                cond: Box::new(konst("истина")),
                then: Box::new(num("1")),
                els: Box::new(num("2")),
            }),
            Value::Int(1),
        ),
    ];
    for (expr, expected) in cases {
        let got = eval(&expr).expect("program should run");
        assert_eq!(got, expected);
    }
}

/// Simplified and unsimplified trees must agree when executed.
#[test]
fn folding_does_not_change_results() {
    let exprs = vec![
        binop(num("2"), "+", binop(num("3"), "*", num("4"))),
        binop(num("10"), "/", num("4")),
        binop(konst("истина"), "||", konst("ложь")),
        loc(Expr::Slice {
            value: Box::new(loc(Expr::Array(vec![num("1"), num("2"), num("3")]))),
            begin: Box::new(num("0")),
            end: Box::new(num("2")),
        }),
    ];
    for expr in exprs {
        let plain = eval(&expr).expect("unsimplified program should run");
        let folded = eval(&expr.clone().simplify()).expect("simplified program should run");
        assert_eq!(plain, folded, "folding changed the result of {expr:?}");
    }
}

/// `ложь && b`: evaluating `b` would read an undefined variable, which the
/// stub reports as an error - so a passing run proves `b` never ran.
#[test]
fn and_short_circuits_the_poisoned_right_operand() {
    let short = binop(konst("ложь"), "&&", ident(99));
    assert_eq!(eval(&short), Ok(Value::Bool(false)));

    let taken = binop(konst("истина"), "&&", ident(99));
    let err = eval(&taken).expect_err("the right operand must run when the left is true");
    assert!(err.contains("undefined variable"), "got: {err}");
}

#[test]
fn or_short_circuits_the_poisoned_right_operand() {
    let short = binop(konst("истина"), "||", ident(99));
    assert_eq!(eval(&short), Ok(Value::Bool(true)));

    let taken = binop(konst("ложь"), "||", ident(99));
    assert!(eval(&taken).is_err());
}

#[test]
fn ternary_runs_exactly_one_branch() {
    let expr = loc(Expr::Ternary {
        cond: Box::new(konst("истина")),
        then: Box::new(num("5")),
        els: Box::new(ident(99)),
    });
    assert_eq!(eval(&expr), Ok(Value::Int(5)), "the untaken branch must stay unevaluated");
}

/// Right-hand sides all evaluate into temporaries before any target is
/// assigned, so `а, б = б, а` swaps.
#[test]
fn multi_assignment_reads_before_it_writes() {
    let a = NameId::from_raw(1);
    let b = NameId::from_raw(2);
    let program = lower_program(&[stmt(Stmt::Lets {
        lhss: vec![ident(1), ident(2)],
        rhss: vec![ident(2), ident(1)],
    })])
    .unwrap();
    let mut vm = StubVm::with_vars(&[(a, Value::Int(1)), (b, Value::Int(2))]);
    vm.run(&program).expect("swap should run");
    assert_eq!(vm.vars[&a], Value::Int(2));
    assert_eq!(vm.vars[&b], Value::Int(1));
}

#[test]
fn counted_loop_accumulates() {
    let sum = NameId::from_raw(1);
    let i = NameId::from_raw(2);
    let program = lower_program(&[
        assign(1, num("0")),
        stmt(Stmt::NumFor {
            var: i,
            from: num("1"),
            to: num("5"),
            body: vec![stmt(Stmt::Expr(loc(Expr::Assoc {
                lhs: Box::new(ident(1)),
                op: "+=".into(),
                rhs: Some(Box::new(ident(2))),
            })))],
        }),
    ])
    .unwrap();
    let mut vm = StubVm::default();
    vm.run(&program).expect("loop should run");
    assert_eq!(vm.vars[&sum], Value::Int(15));
    assert_eq!(vm.vars[&i], Value::Int(5), "the loop variable keeps its last value");
}

#[test]
fn break_leaves_the_loop_early() {
    let sum = NameId::from_raw(1);
    let program = lower_program(&[
        assign(1, num("0")),
        stmt(Stmt::NumFor {
            var: NameId::from_raw(2),
            from: num("1"),
            to: num("10"),
            body: vec![
                stmt(Stmt::Expr(loc(Expr::Assoc {
                    lhs: Box::new(ident(1)),
                    op: "+=".into(),
                    rhs: Some(Box::new(ident(2))),
                }))),
                stmt(Stmt::If {
                    cond: binop(ident(1), ">=", num("3")),
                    then: vec![stmt(Stmt::Break)],
                    elifs: vec![],
                    els: vec![],
                }),
            ],
        }),
    ])
    .unwrap();
    let mut vm = StubVm::default();
    vm.run(&program).expect("loop should run");
    assert_eq!(vm.vars[&sum], Value::Int(3), "1 + 2 reaches the bound, then break fires");
}

#[test]
fn while_loop_runs_until_false() {
    let x = NameId::from_raw(1);
    let program = lower_program(&[
        assign(1, num("0")),
        stmt(Stmt::Loop {
            cond: binop(ident(1), "<", num("3")),
            body: vec![stmt(Stmt::Expr(loc(Expr::Assoc {
                lhs: Box::new(ident(1)),
                op: "++".into(),
                rhs: None,
            })))],
        }),
    ])
    .unwrap();
    let mut vm = StubVm::default();
    vm.run(&program).expect("loop should run");
    assert_eq!(vm.vars[&x], Value::Int(3));
}

#[test]
fn for_in_visits_every_element() {
    let sum = NameId::from_raw(1);
    let item = NameId::from_raw(2);
    let program = lower_program(&[
        assign(1, num("0")),
        stmt(Stmt::ForIn {
            var: item,
            iterable: loc(Expr::Array(vec![num("1"), num("2"), num("3")])),
            body: vec![stmt(Stmt::Expr(loc(Expr::Assoc {
                lhs: Box::new(ident(1)),
                op: "+=".into(),
                rhs: Some(Box::new(ident(2))),
            })))],
        }),
    ])
    .unwrap();
    let mut vm = StubVm::default();
    vm.run(&program).expect("iteration should run");
    assert_eq!(vm.vars[&sum], Value::Int(6));
}

#[test]
fn switch_runs_the_first_matching_case_only() {
    let x = NameId::from_raw(1);
    let build = |subject: &str| {
        lower_program(&[stmt(Stmt::Switch {
            subject: num(subject),
            cases: vec![
                strela::SwitchCase {
                    cond: Some(num("1")),
                    body: vec![assign(1, num("10"))],
                    position: Span::unknown(),
                },
                strela::SwitchCase {
                    cond: Some(num("2")),
                    body: vec![assign(1, num("20"))],
                    position: Span::unknown(),
                },
                strela::SwitchCase {
                    cond: None,
                    body: vec![assign(1, num("30"))],
                    position: Span::unknown(),
                },
            ],
        })])
        .unwrap()
    };

    let mut vm = StubVm::default();
    vm.run(&build("2")).expect("switch should run");
    assert_eq!(vm.vars[&x], Value::Int(20));

    let mut vm = StubVm::default();
    vm.run(&build("99")).expect("switch should run");
    assert_eq!(vm.vars[&x], Value::Int(30), "no match runs the default case");
}

/// The rebind half of the indexed-assignment protocol: the stub reports
/// every mutation as not-in-place, so the updated container must be
/// written back into the variable.
#[test]
fn indexed_assignment_rebinds_the_container() {
    let arr = NameId::from_raw(1);
    let program = lower_program(&[stmt(Stmt::Lets {
        lhss: vec![loc(Expr::Item {
            value: Box::new(ident(1)),
            index: Box::new(num("1")),
        })],
        rhss: vec![num("9")],
    })])
    .unwrap();
    let mut vm = StubVm::with_vars(&[(
        arr,
        Value::Slice(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
    )]);
    vm.run(&program).expect("assignment should run");
    assert_eq!(
        vm.vars[&arr],
        Value::Slice(vec![Value::Int(1), Value::Int(9), Value::Int(3)])
    );
}

#[test]
fn try_without_a_throw_skips_the_catch_block() {
    let x = NameId::from_raw(1);
    let program = lower_program(&[stmt(Stmt::Try {
        body: vec![assign(1, num("1"))],
        catch: vec![assign(1, num("2"))],
    })])
    .unwrap();
    let mut vm = StubVm::default();
    vm.run(&program).expect("try should run");
    assert_eq!(vm.vars[&x], Value::Int(1), "the catch body must be jumped over");
}

#[test]
fn return_yields_the_value() {
    let program = lower_program(&[stmt(Stmt::Return {
        exprs: vec![binop(num("20"), "+", num("22"))],
    })])
    .unwrap();
    let mut vm = StubVm::default();
    vm.run(&program).expect("return should run");
    assert_eq!(vm.result, Some(Value::Int(42)));
}

/// Register writes are recorded; a single folded load touches only the
/// destination register.
#[test]
fn folded_load_touches_only_the_destination() {
    let folded = binop(num("2"), "+", num("3")).simplify();
    let program = lower_expr(&folded).unwrap();
    let mut vm = StubVm::default();
    vm.run(&program).expect("load should run");
    assert_eq!(vm.writes, vec![(0, Value::Int(5))]);
}
