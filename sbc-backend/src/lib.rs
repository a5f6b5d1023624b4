//! Back-end Generator (BE): symbolic ID-stack execution of SBC that
//! drives [`sbc_builder::Builder`] to a complete SPIR-V module (§4.5).
//!
//! [`generate`] is the only entry point this crate exposes; everything
//! else here is an implementation detail of the two-pass walk
//! (`typeinfer` learns every local's type ahead of time, `generate`
//! then replays the same opcodes to actually emit instructions).
pub mod builtins;
pub mod generate;
pub mod ops;
pub mod resources;
pub mod typeinfer;
pub mod value;

pub use generate::{generate, generate_with_options, GenerateOptions};

#[cfg(test)]
mod tests {
    use sbc_core::error::CompileErrorKind;
    use sbc_core::locator::{InterfaceLocation, IoKind, Param, ShaderStage, Slot};
    use sbc_core::ty::Type;
    use sbc_sbc::{Opcode, Operand, SbcOp};

    use super::generate;

    fn resource(name: &str, iokind: IoKind, slot: Slot, ty: Type) -> SbcOp {
        SbcOp::new(
            Opcode::Resource,
            vec![
                Operand::name(name),
                Operand::name(iokind.to_string()),
                Operand::str(slot.to_string()),
                Operand::str(ty.to_string()),
            ],
        )
    }

    fn prologue(file: &str, params: &[SbcOp]) -> Vec<SbcOp> {
        let mut ops = vec![
            SbcOp::new(Opcode::SrcFilename, vec![Operand::str(file)]),
            SbcOp::new(Opcode::Entrypoint, vec![]),
        ];
        ops.extend(params.iter().cloned());
        ops
    }

    /// §8 S1: cast an `i32` input index straight through to an `f32`
    /// output, one value per invocation. No control flow: just a load,
    /// a cast, a store.
    #[test]
    fn s1_cast_i32_to_f32() {
        let index = resource(
            "index",
            IoKind::Input,
            Slot::Location(InterfaceLocation::new(0)),
            Type::i32(),
        );
        let out = resource(
            "out_value",
            IoKind::Output,
            Slot::Location(InterfaceLocation::new(0)),
            Type::f32(),
        );
        let mut ops = prologue("s1.py", &[index, out]);
        ops.push(SbcOp::new(Opcode::SrcLinenr, vec![Operand::int(1)]));
        ops.push(SbcOp::new(Opcode::LoadName, vec![Operand::name("index")]));
        ops.push(SbcOp::new(Opcode::StoreName, vec![Operand::name("out_value")]));
        ops.push(SbcOp::new(Opcode::Return, vec![Operand::name("void")]));
        ops.push(SbcOp::new(Opcode::FuncEnd, vec![]));

        let words = generate(&ops, ShaderStage::Compute).unwrap();
        assert_eq!(words[0], 0x0723_0203);
        // An implicit int->float conversion must show up as a real
        // SPIR-V convert op, never a silent bit-reinterpretation.
        assert!(words.len() > 5);
    }

    /// A `bool` compared against an `f32` must never silently coerce;
    /// mixing int and float families without an explicit cast is a
    /// `TypeMismatch`, not a promotion.
    /// §8's concrete example: `bar = foo + index.x` where `foo` is
    /// `f32` and `index.x` is `i32` must name both operands by their
    /// full source expression, `index.x` included, not just "a local
    /// went wrong".
    #[test]
    fn rejects_implicit_int_float_binop() {
        let foo = resource(
            "foo",
            IoKind::Input,
            Slot::Location(InterfaceLocation::new(0)),
            Type::f32(),
        );
        let index = resource(
            "index",
            IoKind::Input,
            Slot::Location(InterfaceLocation::new(1)),
            Type::vec(sbc_core::ty::ScalarType::int(32), 3),
        );
        let out = resource(
            "out_value",
            IoKind::Output,
            Slot::Location(InterfaceLocation::new(0)),
            Type::f32(),
        );
        let mut ops = prologue("mismatch.py", &[foo, index, out]);
        ops.push(SbcOp::new(Opcode::SrcLinenr, vec![Operand::int(1)]));
        ops.push(SbcOp::new(Opcode::LoadName, vec![Operand::name("foo")]));
        ops.push(SbcOp::new(Opcode::LoadName, vec![Operand::name("index")]));
        ops.push(SbcOp::new(Opcode::LoadAttr, vec![Operand::name("x")]));
        ops.push(SbcOp::new(Opcode::Binop, vec![Operand::name("add")]));
        ops.push(SbcOp::new(Opcode::StoreName, vec![Operand::name("out_value")]));
        ops.push(SbcOp::new(Opcode::Return, vec![Operand::name("void")]));
        ops.push(SbcOp::new(Opcode::FuncEnd, vec![]));

        let err = generate(&ops, ShaderStage::Compute).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::TypeMismatch);
        assert_eq!(err.vars, vec!["foo".to_owned(), "index.x".to_owned()]);
    }

    /// `result = a and b`'s selection window must reach the back-end as
    /// an `OpPhi` merging the short-circuit arm (the left operand,
    /// reloaded unconsumed) with the evaluated-right-operand arm, never
    /// as a bitwise-and binop.
    #[test]
    fn short_circuit_and_emits_a_phi_not_a_bitwise_op() {
        let a = resource("a", IoKind::Input, Slot::Location(InterfaceLocation::new(0)), Type::bool());
        let b = resource("b", IoKind::Input, Slot::Location(InterfaceLocation::new(1)), Type::bool());
        let out = resource(
            "result",
            IoKind::Output,
            Slot::Location(InterfaceLocation::new(0)),
            Type::bool(),
        );
        let mut ops = prologue("andor.py", &[a, b, out]);
        ops.push(SbcOp::new(Opcode::SrcLinenr, vec![Operand::int(1)]));
        ops.push(SbcOp::new(Opcode::LoadName, vec![Operand::name("a")]));
        ops.push(SbcOp::new(Opcode::StoreName, vec![Operand::name("__tmp")]));
        ops.push(SbcOp::new(Opcode::LoadName, vec![Operand::name("__tmp")]));
        ops.push(SbcOp::new(Opcode::SelectMerge, vec![Operand::name("merge0")]));
        ops.push(SbcOp::new(
            Opcode::BranchConditional,
            vec![Operand::name("eval0"), Operand::name("short0")],
        ));
        ops.push(SbcOp::new(Opcode::Label, vec![Operand::name("short0")]));
        ops.push(SbcOp::new(Opcode::LoadName, vec![Operand::name("__tmp")]));
        ops.push(SbcOp::new(Opcode::Branch, vec![Operand::name("merge0")]));
        ops.push(SbcOp::new(Opcode::Label, vec![Operand::name("eval0")]));
        ops.push(SbcOp::new(Opcode::LoadName, vec![Operand::name("b")]));
        ops.push(SbcOp::new(Opcode::Branch, vec![Operand::name("merge0")]));
        ops.push(SbcOp::new(Opcode::Label, vec![Operand::name("merge0")]));
        ops.push(SbcOp::new(Opcode::StoreName, vec![Operand::name("result")]));
        ops.push(SbcOp::new(Opcode::Return, vec![Operand::name("void")]));
        ops.push(SbcOp::new(Opcode::FuncEnd, vec![]));

        let words = generate(&ops, ShaderStage::Compute).unwrap();
        // OpPhi is opcode 245.
        assert!(words.iter().any(|w| (*w & 0xFFFF) == 245));
    }

    /// Two resources at the same binding is a hard compile error, even
    /// when their types and I/O kinds otherwise agree (§3's resource
    /// uniqueness invariant).
    #[test]
    fn duplicate_bindings_fail_before_any_codegen() {
        let a = resource("a", IoKind::Buffer, Slot::Binding(0), Type::f32());
        let b = resource("b", IoKind::Buffer, Slot::Binding(0), Type::f32());
        let ops = prologue("dup.py", &[a, b]);
        let err = generate(&ops, ShaderStage::Compute).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::BindingConflict);
    }

    /// §8 S6: a bodiless `return` inside a fragment shader lowers to
    /// `OpKill`, not `OpReturn` — the disassembly contract BE promises
    /// the validator bridge.
    #[test]
    fn bare_return_in_fragment_stage_emits_kill_not_return() {
        let out = resource(
            "out_color",
            IoKind::Output,
            Slot::Location(InterfaceLocation::new(0)),
            Type::f32(),
        );
        let mut ops = prologue("discard.py", &[out]);
        ops.push(SbcOp::new(Opcode::SrcLinenr, vec![Operand::int(1)]));
        ops.push(SbcOp::new(Opcode::Return, vec![Operand::name("void")]));
        ops.push(SbcOp::new(Opcode::FuncEnd, vec![]));

        let words = generate(&ops, ShaderStage::Fragment).unwrap();
        // OpKill is opcode 252 (word_count=1 -> header word 0x0001_00FC).
        assert!(words.iter().any(|w| (*w & 0xFFFF) == 252));
    }
}
