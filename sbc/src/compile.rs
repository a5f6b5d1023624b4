//! `compile()` and [`ShaderModule`] (§6): the two-stage pipeline —
//! [`sbc_frontend::lower`] then [`sbc_backend::generate_with_options`]
//! — wired together behind one call, plus the builder-style
//! [`CompileOptions`] a caller tunes it with.
//!
//! Grounded in `spirq::reflect::ReflectConfig`: a small `&mut self ->
//! &mut Self` builder consumed by one terminal method, here `compile`
//! instead of `reflect`.
use sbc_backend::GenerateOptions;
use sbc_core::error::{CompileError, Result};
use sbc_core::locator::{ShaderStage, Signature};
use sbc_frontend::SourceTrace;
use sbc_sbc::SbcOp;

/// The back-end only ever sees `co_src_filename`/`co_src_linenr`, never
/// the literal text those refer to (§3's SBC data model carries no
/// source-text operand), so a [`CompileError`] it raises always has an
/// empty `source_line`. The caller's [`SourceTrace`] is the only place
/// that text still lives; this backfills it from there, the same way a
/// Python traceback resolves a line number against `linecache` lazily
/// rather than baking the line into the exception at raise time.
fn enrich_with_source(mut err: CompileError, trace: &SourceTrace) -> CompileError {
    if err.source_line.is_empty() && err.file == trace.filename {
        if let Some(line) = trace.source_line(err.line) {
            err.source_line = line.trim_end().to_owned();
        }
    }
    err
}

/// Compilation knobs a caller can set before invoking [`compile`].
/// Every field has a spec-compliant default, so `CompileOptions::new()`
/// alone is enough for the common case.
#[derive(Clone, Copy, Debug)]
pub struct CompileOptions {
    stage: ShaderStage,
    spirv_version: u32,
}
impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            stage: ShaderStage::Compute,
            spirv_version: 0x0001_0400, // SPIR-V 1.4
        }
    }
}
impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Which pipeline stage the entry point targets; determines
    /// whether a bodiless `return` lowers to `OpKill` (fragment) or
    /// `OpReturn` (§4.5).
    pub fn with_stage(mut self, stage: ShaderStage) -> Self {
        self.stage = stage;
        self
    }

    /// Overrides the emitted module's SPIR-V version word.
    pub fn with_spirv_version(mut self, version: u32) -> Self {
        self.spirv_version = version;
        self
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

/// The result of compiling one shader function (§6): both the SBC the
/// front-end produced and the SPIR-V the back-end produced from it,
/// identified by the signature that was compiled (the Rust port's
/// stand-in for the Python decorator's preserved function identity,
/// since there is no runtime function object to carry through — see
/// `DESIGN.md`).
#[derive(Clone, Debug)]
pub struct ShaderModule {
    signature: Signature,
    sbc: Vec<SbcOp>,
    spirv: Vec<u32>,
    stage: ShaderStage,
}
impl ShaderModule {
    /// The parameter signature the module was compiled from.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The pipeline stage the module targets.
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// SBC as a sequence of `(opname, *operands)` records.
    pub fn to_bytecode(&self) -> &[SbcOp] {
        &self.sbc
    }

    /// SBC rendered as `co_<name> arg1 arg2` text, one opcode per line
    /// (§4.2's textual form).
    pub fn to_bytecode_text(&self) -> String {
        sbc_sbc::print(&self.sbc)
    }

    /// The compiled module as SPIR-V words.
    pub fn to_spirv(&self) -> &[u32] {
        &self.spirv
    }

    /// The compiled module as a little-endian byte stream, the form
    /// `spirv-val`/a driver's `vkCreateShaderModule` expects.
    pub fn to_spirv_bytes(&self) -> Vec<u8> {
        self.spirv.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}

/// [`compile`], additionally running the compiled module through
/// `spirv-val` if it's on `PATH` — the same "validate for good measure
/// when the SDK happens to be installed" policy the original test
/// harness used (`testutils.py::can_use_vulkan_sdk`). A missing SDK is
/// not an error: the compiled module is returned either way, since a
/// validator-bridge failure must never taint already-produced bytes
/// (§7).
pub fn compile_and_validate(
    signature: &Signature,
    trace: &SourceTrace,
    options: &CompileOptions,
) -> Result<(ShaderModule, Option<sbc_validate::Result<()>>)> {
    let module = compile(signature, trace, options)?;
    let validation = if sbc_validate::is_available() {
        Some(sbc_validate::validate(&module.to_spirv_bytes()))
    } else {
        None
    };
    Ok((module, validation))
}

/// Compiles one shader function end to end (§6): lowers `trace` against
/// `signature` to SBC, then generates a complete SPIR-V module from it.
pub fn compile(signature: &Signature, trace: &SourceTrace, options: &CompileOptions) -> Result<ShaderModule> {
    let sbc = sbc_frontend::lower(signature, trace)?;
    log::debug!("lowered {} source instructions to {} SBC ops", trace.instrs.len(), sbc.len());

    let generate_options = GenerateOptions {
        spirv_version: options.spirv_version,
    };
    let spirv = sbc_backend::generate_with_options(&sbc, options.stage, &generate_options)
        .map_err(|e| enrich_with_source(e, trace))?;
    log::debug!("generated a {}-word SPIR-V module", spirv.len());

    Ok(ShaderModule {
        signature: signature.clone(),
        sbc,
        spirv,
        stage: options.stage,
    })
}
