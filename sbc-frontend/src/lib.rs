//! Front-end Lowerer (FE): turns a source-language stack-VM bytecode
//! trace into SBC (§4.3).
pub mod lower;
pub mod source;

pub use lower::lower;
pub use source::{SourceInstr, SourceOp, SourceTrace};

#[cfg(test)]
mod tests {
    use super::*;
    use sbc_core::error::CompileErrorKind;
    use sbc_core::locator::{IoKind, Param, Slot};
    use sbc_core::ty::Type;
    use sbc_sbc::{print, Opcode};

    fn param(name: &str, iokind: IoKind, ty: Type) -> Param {
        Param {
            name: name.to_owned(),
            iokind,
            slot: Slot::Location(sbc_core::locator::InterfaceLocation::new(0)),
            ty,
        }
    }

    #[test]
    fn simple_assignment_lowers_and_resolves_names() {
        let sig = vec![
            param("a", IoKind::Input, Type::f32()),
            param("out_color", IoKind::Output, Type::f32()),
        ];
        let trace = SourceTrace::new(
            "shader.py",
            vec![
                SourceInstr::new(SourceOp::LoadFast, 0, 1).with_name("a"),
                SourceInstr::new(SourceOp::LoadConst, 0, 1)
                    .with_literal(sbc_sbc::Operand::float(2.0)),
                SourceInstr::new(SourceOp::BinaryOp, 0, 1).with_name("multiply"),
                SourceInstr::new(SourceOp::StoreFast, 0, 1).with_name("out_color"),
                SourceInstr::new(SourceOp::ReturnValue, 0, 2),
            ],
        );
        let ops = lower(&sig, &trace).unwrap();
        assert!(ops.iter().any(|op| op.op == Opcode::Binop));
        assert!(ops.iter().any(|op| op.op == Opcode::StoreName));
        let _ = print(&ops);
    }

    #[test]
    fn unresolved_name_reports_full_context() {
        let sig = vec![param("a", IoKind::Input, Type::f32())];
        let trace = SourceTrace::new(
            "shader.py",
            vec![SourceInstr::new(SourceOp::LoadFast, 0, 4).with_name("not_a_param")],
        );
        let err = lower(&sig, &trace).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnresolvedName);
        assert_eq!(err.line, 4);
        assert_eq!(err.vars, vec!["not_a_param".to_owned()]);
    }

    #[test]
    fn stdlib_call_lowers_to_call_builtin() {
        let sig = vec![param("x", IoKind::Input, Type::f32())];
        let trace = SourceTrace::new(
            "shader.py",
            vec![
                SourceInstr::new(SourceOp::LoadGlobal, 0, 1).with_name("stdlib"),
                SourceInstr::new(SourceOp::LoadAttr, 0, 1).with_name("sin"),
                SourceInstr::new(SourceOp::LoadFast, 0, 1).with_name("x"),
                SourceInstr::new(SourceOp::CallFunction, 1, 1),
                SourceInstr::new(SourceOp::ReturnValue, 0, 1),
            ],
        );
        let ops = lower(&sig, &trace).unwrap();
        let call = ops.iter().find(|op| op.op == Opcode::CallBuiltin).unwrap();
        assert_eq!(call.operands[0].as_name(), Some("sin"));
    }

    #[test]
    fn tuple_built_then_consumed_whole_is_rejected() {
        let sig = vec![param("a", IoKind::Input, Type::f32())];
        let trace = SourceTrace::new(
            "shader.py",
            vec![
                SourceInstr::new(SourceOp::LoadFast, 0, 1).with_name("a"),
                SourceInstr::new(SourceOp::LoadFast, 0, 1).with_name("a"),
                SourceInstr::new(SourceOp::BuildTuple, 2, 1),
                SourceInstr::new(SourceOp::StoreFast, 0, 1).with_name("whole"),
            ],
        );
        let err = lower(&sig, &trace).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnsupportedTupleUse);
    }

    #[test]
    fn tuple_unpack_window_emits_ordered_stores() {
        let sig = vec![param("a", IoKind::Input, Type::f32())];
        let trace = SourceTrace::new(
            "shader.py",
            vec![
                SourceInstr::new(SourceOp::LoadFast, 0, 1).with_name("a"),
                SourceInstr::new(SourceOp::LoadFast, 0, 1).with_name("a"),
                SourceInstr::new(SourceOp::BuildTuple, 2, 1),
                SourceInstr::new(SourceOp::UnpackSequence, 2, 1),
                SourceInstr::new(SourceOp::StoreFast, 0, 1).with_name("x"),
                SourceInstr::new(SourceOp::StoreFast, 0, 1).with_name("y"),
            ],
        );
        let ops = lower(&sig, &trace).unwrap();
        let stores: Vec<_> = ops
            .iter()
            .filter(|op| op.op == Opcode::StoreName)
            .map(|op| op.operands[0].as_name().unwrap().to_owned())
            .collect();
        assert_eq!(stores, vec!["x".to_owned(), "y".to_owned()]);
    }

    /// `result = a and b`: short-circuits on `a`'s own value when falsy,
    /// otherwise evaluates and keeps `b` — the same `co_select_merge`
    /// shape as a ternary, with the left operand (stashed in a hidden
    /// local) standing in for one arm.
    #[test]
    fn and_expression_emits_select_merge_around_the_short_circuit() {
        let sig = vec![
            param("a", IoKind::Input, Type::bool()),
            param("b", IoKind::Input, Type::bool()),
        ];
        let trace = SourceTrace::new(
            "shader.py",
            vec![
                SourceInstr::new(SourceOp::LoadFast, 0, 1).with_name("a"),
                SourceInstr::new(SourceOp::JumpIfFalseOrPop, 3, 1),
                SourceInstr::new(SourceOp::LoadFast, 0, 1).with_name("b"),
                SourceInstr::new(SourceOp::StoreFast, 0, 1).with_name("result"),
                SourceInstr::new(SourceOp::ReturnValue, 0, 2),
            ],
        );
        let ops = lower(&sig, &trace).unwrap();
        assert!(ops.iter().any(|op| op.op == Opcode::SelectMerge));
        assert!(ops.iter().any(|op| op.op == Opcode::BranchConditional));
        // one store for the hidden left-operand local, one for `result`.
        assert_eq!(ops.iter().filter(|op| op.op == Opcode::StoreName).count(), 2);
    }

    /// `result = a or b`'s short-circuit direction is the mirror image
    /// of `and`'s: truthy keeps the left operand instead of falsy.
    #[test]
    fn or_expression_emits_select_merge_around_the_short_circuit() {
        let sig = vec![
            param("a", IoKind::Input, Type::bool()),
            param("b", IoKind::Input, Type::bool()),
        ];
        let trace = SourceTrace::new(
            "shader.py",
            vec![
                SourceInstr::new(SourceOp::LoadFast, 0, 1).with_name("a"),
                SourceInstr::new(SourceOp::JumpIfTrueOrPop, 3, 1),
                SourceInstr::new(SourceOp::LoadFast, 0, 1).with_name("b"),
                SourceInstr::new(SourceOp::StoreFast, 0, 1).with_name("result"),
                SourceInstr::new(SourceOp::ReturnValue, 0, 2),
            ],
        );
        let ops = lower(&sig, &trace).unwrap();
        assert!(ops.iter().any(|op| op.op == Opcode::SelectMerge));
        assert_eq!(ops.iter().filter(|op| op.op == Opcode::StoreName).count(), 2);
    }

    #[test]
    fn if_else_emits_select_merge_with_both_arms() {
        let sig = vec![param("a", IoKind::Input, Type::f32())];
        // if a: out = 1.0
        // else: out = 2.0
        let trace = SourceTrace::new(
            "shader.py",
            vec![
                SourceInstr::new(SourceOp::LoadFast, 0, 1).with_name("a"),
                SourceInstr::new(SourceOp::PopJumpIfFalse, 5, 1),
                SourceInstr::new(SourceOp::LoadConst, 0, 2)
                    .with_literal(sbc_sbc::Operand::float(1.0)),
                SourceInstr::new(SourceOp::StoreFast, 0, 2).with_name("out"),
                SourceInstr::new(SourceOp::JumpForward, 7, 2),
                SourceInstr::new(SourceOp::LoadConst, 0, 4)
                    .with_literal(sbc_sbc::Operand::float(2.0)),
                SourceInstr::new(SourceOp::StoreFast, 0, 4).with_name("out"),
                SourceInstr::new(SourceOp::ReturnValue, 0, 5),
            ],
        );
        let ops = lower(&sig, &trace).unwrap();
        assert!(ops.iter().any(|op| op.op == Opcode::SelectMerge));
        assert_eq!(
            ops.iter().filter(|op| op.op == Opcode::StoreName).count(),
            2
        );
    }
}
