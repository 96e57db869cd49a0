//! Runtime values as the front end sees them.
//!
//! Constant folding evaluates literal subtrees ahead of time, so the front
//! end carries a compact tagged union of the runtime value family. The
//! capabilities folding relies on are inherent methods here: truthiness,
//! unary and binary operator evaluation, and the slice/string-map
//! projections for indexed folds. Everything the value family cannot do
//! exactly is an [`OpError`], and the fold that asked leaves its subtree
//! unchanged - runtime errors stay where the VM can report them with the
//! right span.

use std::{cmp::Ordering, fmt};

use indexmap::IndexMap;

use crate::{
    decimal::Decimal,
    ops::{Oper, ValueKind},
};

/// Error from an operator evaluation the value family does not support.
///
/// Never escapes the crate's folding paths; the VM has its own richer
/// dispatch and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpError {
    message: &'static str,
}

impl OpError {
    const fn new(message: &'static str) -> Self {
        Self { message }
    }
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

impl std::error::Error for OpError {}

const UNSUPPORTED: OpError = OpError::new("operation not supported for these operands");

/// A runtime value.
///
/// `Null` is the language's explicit null constant; `Nil` is the absent
/// value (gaps in ranges, missing results). They are distinct variants and
/// compare equal only to themselves.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Int(i64),
    Decimal(Decimal),
    Bool(bool),
    Str(Box<str>),
    Slice(Vec<Value>),
    /// String-keyed mapping; preserves insertion order.
    Map(IndexMap<Box<str>, Value>),
    Null,
    Nil,
}

impl Value {
    /// The runtime kind, as used by `ISKIND` checks and diagnostics.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Decimal(_) => ValueKind::Decimal,
            Self::Bool(_) => ValueKind::Bool,
            Self::Str(_) => ValueKind::Str,
            Self::Slice(_) => ValueKind::Slice,
            Self::Map(_) => ValueKind::Map,
            Self::Null => ValueKind::Null,
            Self::Nil => ValueKind::Nil,
        }
    }

    /// The truth value folding may rely on.
    ///
    /// Only `Bool` answers: the VM applies wider truthiness at runtime, and
    /// folding a branch on anything weaker would change which errors
    /// surface.
    #[must_use]
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Evaluates a unary operator: `-` on numbers, `!` on bools, `^`
    /// (bitwise not) on integers.
    pub fn eval_unop(&self, op: char) -> Result<Value, OpError> {
        match (op, self) {
            ('-', Self::Int(v)) => v.checked_neg().map(Value::Int).ok_or(UNSUPPORTED),
            ('-', Self::Decimal(d)) => Ok(Value::Decimal(-d.clone())),
            ('!', Self::Bool(b)) => Ok(Value::Bool(!b)),
            ('^', Self::Int(v)) => Ok(Value::Int(!v)),
            _ => Err(UNSUPPORTED),
        }
    }

    /// Evaluates a binary operator against `other`.
    ///
    /// Integers promote to decimal when mixed with one, when integer
    /// arithmetic overflows, and when division is inexact. Results the
    /// value family cannot produce exactly are errors so the fold backs
    /// off instead of changing runtime behavior.
    pub fn eval_binop(&self, op: Oper, other: &Value) -> Result<Value, OpError> {
        match op {
            Oper::Eql => Ok(Value::Bool(values_equal(self, other))),
            Oper::Neq => Ok(Value::Bool(!values_equal(self, other))),
            Oper::Lss => Ok(Value::Bool(compare(self, other)? == Ordering::Less)),
            Oper::Leq => Ok(Value::Bool(compare(self, other)? != Ordering::Greater)),
            Oper::Gtr => Ok(Value::Bool(compare(self, other)? == Ordering::Greater)),
            Oper::Geq => Ok(Value::Bool(compare(self, other)? != Ordering::Less)),
            Oper::Add => self.add(other),
            Oper::Sub => self.numeric(other, i64::checked_sub, Decimal::sub),
            Oper::Mul => self.numeric(other, i64::checked_mul, Decimal::mul),
            Oper::Div => self.div(other),
            Oper::Rem => match (self, other) {
                (Self::Int(_), Self::Int(0)) => Err(UNSUPPORTED),
                (Self::Int(a), Self::Int(b)) => Ok(Value::Int(a % b)),
                _ => Err(UNSUPPORTED),
            },
            Oper::Pow => self.pow(other),
            Oper::Shl => match (self, other) {
                (Self::Int(a), Self::Int(b)) if (0..64).contains(b) => Ok(Value::Int(a << b)),
                _ => Err(UNSUPPORTED),
            },
            Oper::Shr => match (self, other) {
                (Self::Int(a), Self::Int(b)) if (0..64).contains(b) => Ok(Value::Int(a >> b)),
                _ => Err(UNSUPPORTED),
            },
            Oper::BitAnd => match (self, other) {
                (Self::Int(a), Self::Int(b)) => Ok(Value::Int(a & b)),
                (Self::Bool(a), Self::Bool(b)) => Ok(Value::Bool(*a && *b)),
                _ => Err(UNSUPPORTED),
            },
            Oper::BitOr => match (self, other) {
                (Self::Int(a), Self::Int(b)) => Ok(Value::Int(a | b)),
                (Self::Bool(a), Self::Bool(b)) => Ok(Value::Bool(*a || *b)),
                _ => Err(UNSUPPORTED),
            },
            Oper::And => match (self, other) {
                (Self::Bool(a), Self::Bool(b)) => Ok(Value::Bool(*a && *b)),
                _ => Err(UNSUPPORTED),
            },
            Oper::Or => match (self, other) {
                (Self::Bool(a), Self::Bool(b)) => Ok(Value::Bool(*a || *b)),
                _ => Err(UNSUPPORTED),
            },
        }
    }

    /// The slice projection used by constant index folds.
    #[must_use]
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Self::Slice(items) => Some(items),
            _ => None,
        }
    }

    /// The string-map projection used by constant key folds.
    #[must_use]
    pub fn as_string_map(&self) -> Option<&IndexMap<Box<str>, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    fn add(&self, other: &Value) -> Result<Value, OpError> {
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => {
                let mut joined = String::with_capacity(a.len() + b.len());
                joined.push_str(a);
                joined.push_str(b);
                Ok(Value::Str(joined.into()))
            }
            (Self::Slice(a), Self::Slice(b)) => {
                let mut joined = a.clone();
                joined.extend(b.iter().cloned());
                Ok(Value::Slice(joined))
            }
            _ => self.numeric(other, i64::checked_add, Decimal::add),
        }
    }

    fn div(&self, other: &Value) -> Result<Value, OpError> {
        match (self, other) {
            (Self::Int(_), Self::Int(0)) => Err(UNSUPPORTED),
            (Self::Int(a), Self::Int(b)) if a % b == 0 => Ok(Value::Int(a / b)),
            _ => self.numeric(other, |_, _| None, Decimal::div),
        }
    }

    fn pow(&self, other: &Value) -> Result<Value, OpError> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) if (0..=u32::MAX as i64).contains(b) => a
                .checked_pow(*b as u32)
                .map(Value::Int)
                .ok_or(UNSUPPORTED),
            (Self::Decimal(a), Self::Int(b)) => a.pow(*b).map(Value::Decimal).map_err(|_| UNSUPPORTED),
            _ => Err(UNSUPPORTED),
        }
    }

    /// Shared numeric dispatch: `Int op Int` through the checked integer
    /// function, anything mixing in a decimal through the decimal function.
    fn numeric(
        &self,
        other: &Value,
        int_op: impl Fn(i64, i64) -> Option<i64>,
        dec_op: impl Fn(&Decimal, &Decimal) -> Result<Decimal, crate::decimal::DecimalError>,
    ) -> Result<Value, OpError> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => int_op(*a, *b)
                .map(Value::Int)
                .or_else(|| dec_op(&Decimal::from(*a), &Decimal::from(*b)).ok().map(Value::Decimal))
                .ok_or(UNSUPPORTED),
            (Self::Decimal(a), Self::Decimal(b)) => dec_op(a, b).map(Value::Decimal).map_err(|_| UNSUPPORTED),
            (Self::Int(a), Self::Decimal(b)) => dec_op(&Decimal::from(*a), b).map(Value::Decimal).map_err(|_| UNSUPPORTED),
            (Self::Decimal(a), Self::Int(b)) => dec_op(a, &Decimal::from(*b)).map(Value::Decimal).map_err(|_| UNSUPPORTED),
            _ => Err(UNSUPPORTED),
        }
    }
}

/// Equality with numeric promotion; distinct non-numeric kinds are unequal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(a), Value::Decimal(b)) => Decimal::from(*a) == *b,
        (Value::Decimal(a), Value::Int(b)) => *a == Decimal::from(*b),
        _ => a == b,
    }
}

/// Ordering for numbers and strings; everything else refuses.
fn compare(a: &Value, b: &Value) -> Result<Ordering, OpError> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Decimal(a), Value::Decimal(b)) => Ok(a.compare(b)),
        (Value::Int(a), Value::Decimal(b)) => Ok(Decimal::from(*a).compare(b)),
        (Value::Decimal(a), Value::Int(b)) => Ok(a.compare(&Decimal::from(*b))),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => Err(UNSUPPORTED),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Bool(b) => f.write_str(if *b { "true" } else { "false" }),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Slice(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key:?}: {value}")?;
                }
                f.write_str("}")
            }
            Self::Null => f.write_str("null"),
            Self::Nil => f.write_str("nil"),
        }
    }
}
