//! The compiler's public face (§6): lowers a decorated shader
//! signature plus a source-runtime bytecode trace to SBC, then drives
//! the back-end straight through to a SPIR-V module, exposing both
//! stages' output on one [`ShaderModule`].
//!
//! Grounded in `spirq`'s relationship to `spirq-core`: a thin top-level
//! crate that re-exports the pieces a caller actually needs and owns
//! only the facade (`ReflectConfig`/`reflect()` there, `CompileOptions`/
//! `compile()` here) gluing the lower crates into one call.
pub mod compile;

pub use compile::{compile, compile_and_validate, CompileOptions, ShaderModule};

pub use sbc_core::error::{CompileError, CompileErrorKind, Result};
pub use sbc_core::locator::{
    DescriptorBinding, InterfaceLocation, IoKind, Param, ShaderStage, Signature, Slot,
};
pub use sbc_core::ty::Type;
pub use sbc_frontend::{SourceInstr, SourceOp, SourceTrace};
pub use sbc_sbc::{print as print_bytecode, Opcode, Operand, SbcOp};

#[cfg(test)]
mod tests {
    use super::*;

    fn signature() -> Signature {
        vec![
            Param {
                name: "index".to_owned(),
                iokind: IoKind::Input,
                slot: Slot::Location(InterfaceLocation::new(0)),
                ty: Type::i32(),
            },
            Param {
                name: "out_value".to_owned(),
                iokind: IoKind::Output,
                slot: Slot::Location(InterfaceLocation::new(0)),
                ty: Type::f32(),
            },
        ]
    }

    /// §8 S1, driven through the whole public facade: `index` (i32) is
    /// loaded and stored straight into `out_value` (f32); the back-end
    /// must have inserted the implicit-looking-but-explicit cast.
    #[test]
    fn compiles_a_cast_only_compute_shader_end_to_end() {
        let sig = signature();
        let trace = SourceTrace::new(
            "s1.py",
            vec![
                SourceInstr::new(sbc_frontend::SourceOp::LoadFast, 0, 1).with_name("index"),
                SourceInstr::new(sbc_frontend::SourceOp::StoreFast, 0, 1).with_name("out_value"),
                SourceInstr::new(sbc_frontend::SourceOp::ReturnValue, 0, 2),
            ],
        );
        let options = CompileOptions::new().with_stage(ShaderStage::Compute);
        let module = compile(&sig, &trace, &options).unwrap();

        assert!(module.to_bytecode().iter().any(|op| op.op == Opcode::StoreName));
        let text = module.to_bytecode_text();
        assert!(text.contains("co_entrypoint"));

        let words = module.to_spirv();
        assert_eq!(words[0], 0x0723_0203);
        let bytes = module.to_spirv_bytes();
        assert_eq!(bytes.len(), words.len() * 4);
    }

    #[test]
    fn compile_error_propagates_source_attribution() {
        let sig = vec![Param {
            name: "a".to_owned(),
            iokind: IoKind::Input,
            slot: Slot::Location(InterfaceLocation::new(0)),
            ty: Type::f32(),
        }];
        let trace = SourceTrace::new(
            "bad.py",
            vec![SourceInstr::new(sbc_frontend::SourceOp::LoadFast, 0, 7).with_name("nope")],
        );
        let options = CompileOptions::new();
        let err = compile(&sig, &trace, &options).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnresolvedName);
        assert_eq!(err.line, 7);
        let rendered = err.to_string();
        assert!(rendered.contains("bad.py:7"));
        assert!(rendered.contains("nope"));
    }

    /// §8's exact diagnostic scenario, driven through the public
    /// facade with real source text attached: a back-end `TypeMismatch`
    /// (which only ever sees `co_src_filename`/`co_src_linenr`, never
    /// the text those refer to) must still come back quoting the
    /// literal source line once the caller hands `compile` the text a
    /// decorator would have read the function from.
    #[test]
    fn type_mismatch_error_quotes_the_literal_source_line() {
        let sig = vec![
            Param {
                name: "foo".to_owned(),
                iokind: IoKind::Input,
                slot: Slot::Location(InterfaceLocation::new(0)),
                ty: Type::f32(),
            },
            Param {
                name: "index".to_owned(),
                iokind: IoKind::Input,
                slot: Slot::Location(InterfaceLocation::new(1)),
                ty: Type::i32(),
            },
            Param {
                name: "bar".to_owned(),
                iokind: IoKind::Output,
                slot: Slot::Location(InterfaceLocation::new(0)),
                ty: Type::f32(),
            },
        ];
        let source = "def shader(foo, index, bar):\n    bar = foo + index\n    return\n";
        let trace = SourceTrace::with_source(
            "mismatch.py",
            vec![
                SourceInstr::new(sbc_frontend::SourceOp::LoadFast, 0, 2).with_name("foo"),
                SourceInstr::new(sbc_frontend::SourceOp::LoadFast, 0, 2).with_name("index"),
                SourceInstr::new(sbc_frontend::SourceOp::BinaryOp, 0, 2).with_name("add"),
                SourceInstr::new(sbc_frontend::SourceOp::StoreFast, 0, 2).with_name("bar"),
                SourceInstr::new(sbc_frontend::SourceOp::ReturnValue, 0, 3),
            ],
            source,
        );
        let options = CompileOptions::new();
        let err = compile(&sig, &trace, &options).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::TypeMismatch);
        assert_eq!(err.line, 2);
        assert_eq!(err.source_line, "    bar = foo + index");
        assert_eq!(err.vars, vec!["foo".to_owned(), "index".to_owned()]);
        let rendered = err.to_string();
        assert!(rendered.contains("mismatch.py:2"));
        assert!(rendered.contains("bar = foo + index"));
        assert!(rendered.contains("foo"));
        assert!(rendered.contains("index"));
    }
}
