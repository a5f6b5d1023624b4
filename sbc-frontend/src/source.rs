//! A vendor-neutral view of the source bytecode trace the front-end
//! lowers from: a flat stack-VM instruction stream with a line number
//! per instruction and a wide-operand folding pre-pass (§4.3).
use std::fmt;

use sbc_sbc::Operand;

/// The subset of stack-VM opcodes the dialect restricts itself to.
/// Anything the host bytecode emits outside this set is rejected at
/// lowering time with `CompileErrorKind::UnsupportedFeature`.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum SourceOp {
    LoadFast,
    StoreFast,
    LoadConst,
    LoadGlobal,
    LoadAttr,
    StoreAttr,
    LoadSubscr,
    StoreSubscr,
    BuildTuple,
    UnpackSequence,
    RotTwo,
    RotThree,
    RotFour,
    DupTop,
    PopTop,
    CallFunction,
    BinaryOp,
    CompareOp,
    UnaryOp,
    PopJumpIfFalse,
    PopJumpIfTrue,
    /// `and`'s short-circuit jump: if the top-of-stack is falsy, jump
    /// leaving it on the stack (the `and`'s result); otherwise pop it
    /// and fall through to evaluate the right-hand operand.
    JumpIfFalseOrPop,
    /// `or`'s short-circuit jump: the `JumpIfFalseOrPop` mirror image.
    JumpIfTrueOrPop,
    JumpAbsolute,
    JumpForward,
    SetupLoop,
    ForIter,
    GetIter,
    Break,
    Continue,
    ReturnValue,
    /// Widens the following instruction's `arg` by shifting it into the
    /// high bits; folded away by [`SourceTrace::fold_extended_args`]
    /// before the front-end ever sees it.
    ExtendedArg,
}
impl fmt::Display for SourceOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One instruction in the source trace: an opcode, its (already-folded)
/// argument, and the source line it was compiled from.
#[derive(Clone, Debug)]
pub struct SourceInstr {
    pub op: SourceOp,
    pub arg: i64,
    /// Resolved name for opcodes that index a name/attr side table
    /// (`LoadFast`, `StoreFast`, `LoadGlobal`, `LoadAttr`, `StoreAttr`)
    /// rather than carrying a literal.
    pub arg_name: Option<String>,
    /// The literal value for a `LoadConst` instruction.
    pub literal: Option<Operand>,
    pub lineno: u32,
}
impl SourceInstr {
    pub fn new(op: SourceOp, arg: i64, lineno: u32) -> Self {
        SourceInstr {
            op,
            arg,
            arg_name: None,
            literal: None,
            lineno,
        }
    }
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.arg_name = Some(name.into());
        self
    }
    pub fn with_literal(mut self, literal: Operand) -> Self {
        self.literal = Some(literal);
        self
    }
}

/// The full bytecode trace for one shader entry-point function.
#[derive(Clone, Debug, Default)]
pub struct SourceTrace {
    pub filename: String,
    pub instrs: Vec<SourceInstr>,
    /// The function's original source text, one entry per line, so a
    /// `CompileError` can quote the literal offending line (§4.6/§8)
    /// rather than a synthetic placeholder. Empty when the caller has
    /// no source text to hand in (e.g. a trace built by hand in a
    /// test); `Lowerer::current_source_line` falls back to `<line N>`
    /// in that case.
    pub source_lines: Vec<String>,
}
impl SourceTrace {
    pub fn new(filename: impl Into<String>, instrs: Vec<SourceInstr>) -> Self {
        let mut trace = SourceTrace {
            filename: filename.into(),
            instrs,
            source_lines: Vec::new(),
        };
        trace.fold_extended_args();
        trace
    }

    /// As [`SourceTrace::new`], but additionally carrying the function's
    /// source text (the way `inspect.getsource` would hand it to the
    /// original decorator) so diagnostics can quote it verbatim.
    pub fn with_source(filename: impl Into<String>, instrs: Vec<SourceInstr>, source: impl AsRef<str>) -> Self {
        let mut trace = Self::new(filename, instrs);
        trace.source_lines = source.as_ref().lines().map(ToOwned::to_owned).collect();
        trace
    }

    /// The literal text of 1-indexed source line `lineno`, or `None` if
    /// no source text was provided or `lineno` is out of range.
    pub fn source_line(&self, lineno: u32) -> Option<&str> {
        lineno
            .checked_sub(1)
            .and_then(|idx| self.source_lines.get(idx as usize))
            .map(String::as_str)
    }

    /// Folds any `ExtendedArg` instruction into the `arg` of the
    /// instruction immediately following it, shifting by 8 bits per
    /// `ExtendedArg` seen (host bytecode's documented wide-operand
    /// encoding, §4.3). Chains of more than one `ExtendedArg` in a row
    /// widen further, each shifting the accumulator left before OR-ing
    /// in the next prefix.
    fn fold_extended_args(&mut self) {
        let mut folded = Vec::with_capacity(self.instrs.len());
        let mut pending: i64 = 0;
        let mut have_pending = false;
        for instr in self.instrs.drain(..) {
            if matches!(instr.op, SourceOp::ExtendedArg) {
                pending = (pending << 8) | (instr.arg & 0xff);
                have_pending = true;
                continue;
            }
            let mut instr = instr;
            if have_pending {
                instr.arg = (pending << 8) | (instr.arg & 0xff);
                pending = 0;
                have_pending = false;
            }
            folded.push(instr);
        }
        self.instrs = folded;
    }
}
