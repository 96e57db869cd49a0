//! Bytecode: the emitted instruction set and the register-oriented
//! lowering that produces it.

mod instr;
mod lower;

use std::fmt;

pub use instr::{Instr, Label, Op, Reg};
pub use lower::{lower_expr, lower_program, Lowerer};

/// A lowered instruction stream.
///
/// `labels_used` is the final value of the label counter: every label id
/// in `instrs` lies in `1..=labels_used` and is unique to one `LABEL`
/// instruction.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Program {
    pub instrs: Vec<Instr>,
    pub labels_used: u32,
}

/// Disassembly listing: one instruction per line with its source position.
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instr) in self.instrs.iter().enumerate() {
            writeln!(f, "{i:4}  {}  ; {}", instr.op, instr.span)?;
        }
        Ok(())
    }
}
