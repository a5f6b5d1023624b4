//! The closed SBC opcode enumeration (§6) and its per-opcode
//! descriptor (arity/operand-kind shape, whether it produces a stack
//! value). Mirrors how the teacher derives an enum<->u32 mapping for
//! `spirv::Op` with `num_derive`, but the mnemonic table here is
//! hand-written rather than generated since the opcode set is small
//! and closed (29 variants, never extended at runtime).
use num_derive::{FromPrimitive, ToPrimitive};

/// One kind of SBC opcode. Order is stable and load-bearing: it is the
/// `u32` encoding used wherever an opcode needs to be stored compactly.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, FromPrimitive, ToPrimitive)]
#[non_exhaustive]
pub enum Opcode {
    SrcFilename,
    SrcLinenr,
    Entrypoint,
    FuncEnd,
    Resource,
    LoadConstant,
    LoadName,
    StoreName,
    LoadIndex,
    StoreIndex,
    LoadAttr,
    StoreAttr,
    LoadGlobal,
    Call,
    CallBuiltin,
    Binop,
    Unop,
    Compare,
    PopTop,
    Rotate,
    DupTop,
    Label,
    Branch,
    BranchConditional,
    SelectMerge,
    LoopMerge,
    Continue,
    Break,
    Return,
}
impl Opcode {
    /// Stable textual mnemonic, always `co_`-prefixed per §6.
    pub fn mnemonic(&self) -> &'static str {
        use Opcode::*;
        match self {
            SrcFilename => "co_src_filename",
            SrcLinenr => "co_src_linenr",
            Entrypoint => "co_entrypoint",
            FuncEnd => "co_func_end",
            Resource => "co_resource",
            LoadConstant => "co_load_constant",
            LoadName => "co_load_name",
            StoreName => "co_store_name",
            LoadIndex => "co_load_index",
            StoreIndex => "co_store_index",
            LoadAttr => "co_load_attr",
            StoreAttr => "co_store_attr",
            LoadGlobal => "co_load_global",
            Call => "co_call",
            CallBuiltin => "co_call_builtin",
            Binop => "co_binop",
            Unop => "co_unop",
            Compare => "co_compare",
            PopTop => "co_pop_top",
            Rotate => "co_rotate",
            DupTop => "co_dup_top",
            Label => "co_label",
            Branch => "co_branch",
            BranchConditional => "co_branch_conditional",
            SelectMerge => "co_select_merge",
            LoopMerge => "co_loop_merge",
            Continue => "co_continue",
            Break => "co_break",
            Return => "co_return",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Opcode> {
        use Opcode::*;
        Some(match s {
            "co_src_filename" => SrcFilename,
            "co_src_linenr" => SrcLinenr,
            "co_entrypoint" => Entrypoint,
            "co_func_end" => FuncEnd,
            "co_resource" => Resource,
            "co_load_constant" => LoadConstant,
            "co_load_name" => LoadName,
            "co_store_name" => StoreName,
            "co_load_index" => LoadIndex,
            "co_store_index" => StoreIndex,
            "co_load_attr" => LoadAttr,
            "co_store_attr" => StoreAttr,
            "co_load_global" => LoadGlobal,
            "co_call" => Call,
            "co_call_builtin" => CallBuiltin,
            "co_binop" => Binop,
            "co_unop" => Unop,
            "co_compare" => Compare,
            "co_pop_top" => PopTop,
            "co_rotate" => Rotate,
            "co_dup_top" => DupTop,
            "co_label" => Label,
            "co_branch" => Branch,
            "co_branch_conditional" => BranchConditional,
            "co_select_merge" => SelectMerge,
            "co_loop_merge" => LoopMerge,
            "co_continue" => Continue,
            "co_break" => Break,
            "co_return" => Return,
            _ => return None,
        })
    }

    /// Whether this opcode pushes a value onto the symbolic stack the
    /// back-end maintains while walking SBC (§3, "stack/value" group).
    pub fn produces_value(&self) -> bool {
        use Opcode::*;
        matches!(
            self,
            LoadConstant
                | LoadName
                | LoadIndex
                | LoadAttr
                | LoadGlobal
                | Call
                | CallBuiltin
                | Binop
                | Unop
                | Compare
                | DupTop
        )
    }

    /// Whether the opcode is meta/diagnostic rather than executable
    /// (§3's "meta" group).
    pub fn is_meta(&self) -> bool {
        matches!(self, Opcode::SrcFilename | Opcode::SrcLinenr)
    }
}
