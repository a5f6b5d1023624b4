//! The `(opname, *operands)` tuple shape of an SBC program (§3).
use std::fmt;

use ordered_float::OrderedFloat;

use crate::opcode::Opcode;

/// A single SBC operand. Numeric literals keep their own variant rather
/// than being folded into `Name` so the printer/parser round-trip is
/// exact (`42` prints back as `42`, not as a bareword that would need
/// quoting to disambiguate from an identifier).
#[derive(PartialEq, Clone, Debug)]
pub enum Operand {
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
    /// A name reference: a local, a parameter, a label, a type, or a
    /// `stdlib.xxx` intrinsic path.
    Name(String),
}
impl Operand {
    pub fn int(x: i64) -> Self {
        Operand::Int(x)
    }
    pub fn float(x: f64) -> Self {
        Operand::Float(OrderedFloat(x))
    }
    pub fn str(x: impl Into<String>) -> Self {
        Operand::Str(x.into())
    }
    pub fn name(x: impl Into<String>) -> Self {
        Operand::Name(x.into())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Operand::Int(x) => Some(*x),
            _ => None,
        }
    }
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Operand::Float(x) => Some(x.0),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Operand::Str(x) => Some(x),
            _ => None,
        }
    }
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Operand::Name(x) => Some(x),
            _ => None,
        }
    }
}
impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Int(x) => write!(f, "{}", x),
            Operand::Float(x) => {
                // Always carry a decimal point so the parser can tell
                // `1.0` (Float) apart from `1` (Int) on re-read.
                if x.0.fract() == 0.0 && x.0.is_finite() {
                    write!(f, "{:.1}", x.0)
                } else {
                    write!(f, "{}", x.0)
                }
            }
            Operand::Str(x) => write!(f, "{:?}", x),
            Operand::Name(x) => f.write_str(x),
        }
    }
}

/// One SBC instruction: an opcode plus its ordered operand list.
#[derive(PartialEq, Clone, Debug)]
pub struct SbcOp {
    pub op: Opcode,
    pub operands: Vec<Operand>,
}
impl SbcOp {
    pub fn new(op: Opcode, operands: Vec<Operand>) -> Self {
        SbcOp { op, operands }
    }
}
impl fmt::Display for SbcOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.op.mnemonic())?;
        for operand in &self.operands {
            write!(f, " {}", operand)?;
        }
        Ok(())
    }
}
