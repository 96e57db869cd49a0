//! Operator and value-kind vocabularies shared with the virtual machine.
//!
//! The lowering never emits operator text: every textual operator from the
//! source is mapped to a numeric opcode ([`Oper`]) carried inside `OPER`
//! instructions, and runtime kind checks (`ISKIND`) carry a [`ValueKind`].
//! Both enums round-trip between their source spelling and their numeric
//! value via strum derives.

use std::str::FromStr;

use strum::{Display, EnumString, FromRepr, IntoStaticStr};

/// Binary operator opcodes.
///
/// The `EnumString` spellings are the exact source-text operators, so
/// `Oper::from_text` is the textual-operator map; `FromRepr` lets the VM
/// decode the `u8` stored in an instruction stream.
#[repr(u8)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    FromRepr,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum Oper {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Rem,
    #[strum(serialize = "**")]
    Pow,
    #[strum(serialize = "<<")]
    Shl,
    #[strum(serialize = ">>")]
    Shr,
    #[strum(serialize = "==")]
    Eql,
    #[strum(serialize = "!=")]
    Neq,
    #[strum(serialize = "<")]
    Lss,
    #[strum(serialize = "<=")]
    Leq,
    #[strum(serialize = ">")]
    Gtr,
    #[strum(serialize = ">=")]
    Geq,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
}

impl Oper {
    /// Maps source text to its opcode; `None` for text that is not an
    /// operator of the language.
    #[must_use]
    pub fn from_text(text: &str) -> Option<Self> {
        Self::from_str(text).ok()
    }

    /// The numeric value shared with the VM.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Runtime kind vocabulary for `ISKIND` checks and diagnostics.
#[repr(u8)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    FromRepr,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum ValueKind {
    Int,
    Decimal,
    Bool,
    Str,
    Slice,
    Map,
    Chan,
    Func,
    Null,
    Nil,
}
