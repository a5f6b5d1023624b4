//! Opcode Registry (OR): the closed SBC opcode set, its operand tuple
//! shape, and the textual assembler/disassembler pair that gives SBC
//! an exact print/parse round trip (§3, §4.2, §6, §8).
pub mod op;
pub mod opcode;
pub mod parser;
pub mod tokenizer;

pub use op::{Operand, SbcOp};
pub use opcode::Opcode;
pub use parser::{parse, print};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_mnemonics_resolve_back_to_their_opcode() {
        let opcodes = [
            Opcode::SrcFilename,
            Opcode::SrcLinenr,
            Opcode::Entrypoint,
            Opcode::FuncEnd,
            Opcode::Resource,
            Opcode::LoadConstant,
            Opcode::LoadName,
            Opcode::StoreName,
            Opcode::LoadIndex,
            Opcode::StoreIndex,
            Opcode::LoadAttr,
            Opcode::StoreAttr,
            Opcode::LoadGlobal,
            Opcode::Call,
            Opcode::CallBuiltin,
            Opcode::Binop,
            Opcode::Unop,
            Opcode::Compare,
            Opcode::PopTop,
            Opcode::Rotate,
            Opcode::DupTop,
            Opcode::Label,
            Opcode::Branch,
            Opcode::BranchConditional,
            Opcode::SelectMerge,
            Opcode::LoopMerge,
            Opcode::Continue,
            Opcode::Break,
            Opcode::Return,
        ];
        for op in opcodes {
            let mnemonic = op.mnemonic();
            assert_eq!(Opcode::from_mnemonic(mnemonic), Some(op));
        }
    }

    #[test]
    fn program_with_comments_and_blank_lines_parses() {
        let src = "\
# a shader program
co_src_filename \"shader.py\"

co_entrypoint          # marks the function entry
co_load_constant 1.0
co_return
";
        let ops = parse(src).unwrap();
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0].op, Opcode::SrcFilename);
        assert_eq!(ops[3].op, Opcode::Return);
    }

    #[test]
    fn print_then_parse_is_identity_for_whole_program() {
        let ops = vec![
            SbcOp::new(Opcode::SrcFilename, vec![Operand::str("a.py")]),
            SbcOp::new(Opcode::SrcLinenr, vec![Operand::int(3)]),
            SbcOp::new(Opcode::LoadName, vec![Operand::name("x")]),
            SbcOp::new(Opcode::LoadConstant, vec![Operand::int(2)]),
            SbcOp::new(Opcode::Binop, vec![Operand::name("multiply")]),
            SbcOp::new(Opcode::StoreName, vec![Operand::name("y")]),
            SbcOp::new(Opcode::Return, vec![]),
        ];
        assert_eq!(parse(&print(&ops)).unwrap(), ops);
    }
}
