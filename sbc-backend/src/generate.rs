//! The real code-generation walk (§4.5): sequentially replays SBC a
//! second time, now driving [`sbc_builder::Builder`] to emit actual
//! SPIR-V instructions instead of `typeinfer`'s type-only simulation.
//!
//! The two passes share a stack discipline (`typeinfer` walks the same
//! opcodes with `Type`s only; this walk carries real `ValueId`s and
//! block ids) but this one additionally has to reconstruct SPIR-V's
//! structured control flow: `OpSelectionMerge`/`OpLoopMerge` markers,
//! forward branch targets resolved ahead of time, and `OpPhi` at the
//! point a ternary's two arms rejoin.
use fnv::FnvHashMap;
use spirv::{AddressingModel, Capability, ExecutionModel, MemoryModel, StorageClass};

use sbc_core::constant::{Constant, ConstantValue};
use sbc_core::error::{CompileError, CompileErrorKind, Result};
use sbc_core::locator::{IoKind, Param, Signature, Slot, ShaderStage};
use sbc_core::ty::Type;
use sbc_sbc::{Opcode, Operand, SbcOp};

use sbc_builder::Builder;

use crate::builtins::{self, Builtin, TexMethod};
use crate::ops::{
    binop_result_type, binop_spirv_op, compare_result_type, compare_spirv_op, emit_cast,
    unop_result_type, unop_spirv_op,
};
use crate::resources;
use crate::typeinfer;
use crate::value::{AccessArena, ValueId, ValueKind, Variable};

/// No SPIR-V tooling identity has been registered for this dialect, so
/// the module header's generator magic number is left at 0 ("no tool
/// id"), the same convention `sbc-builder`'s own tests use.
const GENERATOR_MAGIC: u32 = 0;

/// Knobs a caller (`sbc::CompileOptions`) can set on an otherwise fixed
/// code-generation run: the target SPIR-V version word. Kept as its
/// own struct, mirroring `spirq`'s `ReflectConfig`, rather than growing
/// `generate`'s parameter list.
#[derive(Clone, Copy, Debug)]
pub struct GenerateOptions {
    pub spirv_version: u32,
}
impl Default for GenerateOptions {
    fn default() -> Self {
        GenerateOptions {
            spirv_version: 0x0001_0400, // SPIR-V 1.4
        }
    }
}

/// Generates a complete SPIR-V module from a lowered SBC program, using
/// the default [`GenerateOptions`].
///
/// `ops` is expected to begin with `co_src_filename`/`co_entrypoint`
/// followed by one `co_resource` per signature parameter, exactly as
/// `sbc_frontend::lower::lower` emits it; the resource list is parsed
/// back out of the stream itself rather than threaded through
/// separately, so this is the only input this function needs.
pub fn generate(ops: &[SbcOp], stage: ShaderStage) -> Result<Vec<u32>> {
    generate_with_options(ops, stage, &GenerateOptions::default())
}

/// [`generate`], with the target SPIR-V version overridden.
pub fn generate_with_options(ops: &[SbcOp], stage: ShaderStage, options: &GenerateOptions) -> Result<Vec<u32>> {
    let file = filename_of(ops)?;
    let params = parse_resources(ops, &file)?;
    resources::check_binding_uniqueness(&params, &file)?;

    let mut resource_tys: FnvHashMap<String, Type> = FnvHashMap::default();
    for param in &params {
        resource_tys.insert(param.name.clone(), param.ty.clone());
    }
    let locals = typeinfer::infer(ops, &resource_tys, &file)?;

    let mut builder = Builder::new(GENERATOR_MAGIC);
    builder.set_version(options.spirv_version);
    builder.capability(Capability::Shader);
    for param in &params {
        if let Type::Texture(t) = &param.ty {
            if t.dim == sbc_core::ty::TextureDim::D1 {
                builder.capability(Capability::Sampled1D);
            }
        }
    }
    builder.memory_model(AddressingModel::Logical, MemoryModel::GLSL450);
    let ext_id = builder.ext_inst_import(builtins::GLSL_STD_450);

    let mut vars: FnvHashMap<String, Variable> = FnvHashMap::default();
    let mut interface_ids = Vec::new();
    for param in &params {
        let (variable, ptr_id) = resources::declare_resource(&mut builder, param, &file)?;
        if matches!(param.iokind, IoKind::Input | IoKind::Output) {
            interface_ids.push(ptr_id);
        }
        vars.insert(param.name.clone(), variable);
    }

    let label_ids = prealloc_labels(ops, &mut builder);

    let void_fn_ty = builder.void_function_type();
    let entry_id = builder
        .begin_function_void(void_fn_ty, 0)
        .map_err(CompileError::internal)?;
    let entry_block = builder.op_label().map_err(CompileError::internal)?;

    let mut locals_sorted: Vec<(&String, &Type)> = locals.iter().collect();
    locals_sorted.sort_by(|a, b| a.0.cmp(b.0));
    for (name, ty) in locals_sorted {
        let ptr = builder
            .op_variable_local(StorageClass::Function, ty)
            .map_err(CompileError::internal)?;
        builder.name(ptr, name);
        vars.insert(
            name.clone(),
            Variable {
                ptr_id: ptr,
                ty: ty.clone(),
                storage_class: StorageClass::Function,
                wrapped_in_block: false,
            },
        );
    }

    let mut walker = Walker {
        builder: &mut builder,
        vars,
        label_ids,
        file: file.clone(),
        line: 0,
        ext_id,
        stage,
        stack: Vec::new(),
        current_block: entry_block,
        pending_merge: None,
        select_frames: Vec::new(),
        ptr_storage: FnvHashMap::default(),
        arena: AccessArena::new(),
    };
    walker.walk(ops)?;

    builder.end_function().map_err(CompileError::internal)?;
    builder.entry_point(execution_model_of(stage), entry_id, "main", &interface_ids);
    match stage {
        ShaderStage::Fragment => {
            builder.execution_mode(entry_id, spirv::ExecutionMode::OriginUpperLeft, &[]);
        }
        ShaderStage::Compute => {
            builder.execution_mode(entry_id, spirv::ExecutionMode::LocalSize, &[1, 1, 1]);
        }
        ShaderStage::Vertex => {}
    }

    Ok(builder.build())
}

fn execution_model_of(stage: ShaderStage) -> ExecutionModel {
    match stage {
        ShaderStage::Vertex => ExecutionModel::Vertex,
        ShaderStage::Fragment => ExecutionModel::Fragment,
        ShaderStage::Compute => ExecutionModel::GLCompute,
    }
}

fn filename_of(ops: &[SbcOp]) -> Result<String> {
    ops.first()
        .filter(|op| op.op == Opcode::SrcFilename)
        .and_then(|op| op.operands.first())
        .and_then(Operand::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| CompileError::internal("program does not begin with co_src_filename"))
}

/// Re-derives the entry point's parameter signature from the
/// `co_resource` instructions `sbc_frontend::lower::lower` emitted.
fn parse_resources(ops: &[SbcOp], file: &str) -> Result<Signature> {
    let mut params = Vec::new();
    for op in ops {
        if op.op != Opcode::Resource {
            continue;
        }
        let name = op.operands[0].as_name().unwrap_or_default().to_owned();
        let iokind_str = op.operands[1].as_name().unwrap_or_default();
        let slot_str = op.operands[2].as_str().unwrap_or_default();
        let ty_str = op.operands[3].as_str().unwrap_or_default();
        let iokind = IoKind::parse(iokind_str).map_err(CompileError::internal)?;
        let slot = Slot::parse(slot_str).map_err(CompileError::internal)?;
        let ty = Type::parse(ty_str).map_err(|mut e| {
            e.file = file.to_owned();
            e
        })?;
        params.push(Param {
            name,
            iokind,
            slot,
            ty,
        });
    }
    Ok(params)
}

/// Pre-allocates a SPIR-V id for every `co_label` name in the program,
/// so a forward branch can reference a block before it is reached.
fn prealloc_labels(ops: &[SbcOp], builder: &mut Builder) -> FnvHashMap<String, u32> {
    let mut label_ids = FnvHashMap::default();
    for op in ops {
        if op.op == Opcode::Label {
            if let Some(name) = op.operands[0].as_name() {
                label_ids.entry(name.to_owned()).or_insert_with(|| builder.alloc_id());
            }
        }
    }
    label_ids
}

enum PendingMerge {
    Selection(String),
    Loop(String, String),
}

/// One open `if`/ternary whose merge label hasn't been reached yet:
/// tracks how many real values have reached it so far (0, 1 or 2) and
/// the block each one came from, so an `OpPhi` can be built once both
/// predecessors have been walked.
struct SelectFrame {
    merge_label: String,
    entry_depth: usize,
    incoming: Vec<(u32, Type, u32)>,
}

struct Walker<'a> {
    builder: &'a mut Builder,
    vars: FnvHashMap<String, Variable>,
    label_ids: FnvHashMap<String, u32>,
    file: String,
    line: u32,
    ext_id: u32,
    stage: ShaderStage,
    stack: Vec<ValueId>,
    current_block: u32,
    pending_merge: Option<PendingMerge>,
    select_frames: Vec<SelectFrame>,
    /// Storage class behind every pointer id this walk has produced,
    /// since `ValueId` itself only carries a `Type`: `OpAccessChain`
    /// needs its base's storage class to intern the right pointer type,
    /// and that class is otherwise only known at the point the pointer
    /// was first created (a resource/local variable or an access chain
    /// into one).
    ptr_storage: FnvHashMap<u32, StorageClass>,
    /// Expression-reconstruction arena (§3, §9): every `co_load_name`
    /// roots a node here, `co_load_index`/`co_load_attr` extend it, so a
    /// `TypeMismatch` raised by an operator can quote the operands that
    /// produced it (`foo`, `index.x`, ...) instead of just their types.
    arena: AccessArena,
}

impl<'a> Walker<'a> {
    fn err(&self, kind: CompileErrorKind, vars: Vec<String>) -> CompileError {
        CompileError::new(kind, self.file.clone(), self.line, String::new(), vars)
    }

    fn internal(&self, msg: impl Into<String>) -> CompileError {
        CompileError::new(CompileErrorKind::Internal, self.file.clone(), self.line, msg, vec![])
    }

    fn variable(&self, name: &str) -> Result<Variable> {
        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| self.err(CompileErrorKind::UnresolvedName, vec![name.to_owned()]))
    }

    fn label_id(&self, name: &str) -> Result<u32> {
        self.label_ids
            .get(name)
            .copied()
            .ok_or_else(|| self.internal(format!("unknown label: {}", name)))
    }

    /// Loads through an `LValue`'s pointer, or passes an `RValue`
    /// through unchanged.
    fn rvalue(&mut self, slot: ValueId) -> Result<(u32, Type)> {
        match slot.kind {
            ValueKind::RValue => Ok((slot.result_id, slot.ty)),
            ValueKind::LValue => {
                let id = self
                    .builder
                    .op_load(&slot.ty, slot.result_id)
                    .map_err(CompileError::internal)?;
                Ok((id, slot.ty))
            }
        }
    }

    fn pop(&mut self) -> Result<ValueId> {
        self.stack.pop().ok_or_else(|| self.internal("value stack underflow"))
    }

    fn pop_rvalue(&mut self) -> Result<(u32, Type)> {
        let slot = self.pop()?;
        self.rvalue(slot)
    }

    /// Opens a pointer to `name`'s logical (unwrapped) value: for a
    /// `buffer`/`uniform` resource this is an access chain through the
    /// synthetic block's sole member; for everything else it is the
    /// variable's own pointer.
    fn name_pointer(&mut self, name: &str) -> Result<(u32, Type, StorageClass)> {
        let var = self.variable(name)?;
        self.ptr_storage.insert(var.ptr_id, var.storage_class);
        if var.wrapped_in_block {
            let zero = self.const_u32(0)?;
            let ptr = self
                .builder
                .op_access_chain(var.storage_class, &var.ty, var.ptr_id, &[zero])
                .map_err(CompileError::internal)?;
            self.ptr_storage.insert(ptr, var.storage_class);
            Ok((ptr, var.ty, var.storage_class))
        } else {
            Ok((var.ptr_id, var.ty, var.storage_class))
        }
    }

    fn storage_class_of_ptr(&self, ptr_id: u32) -> StorageClass {
        self.ptr_storage.get(&ptr_id).copied().unwrap_or(StorageClass::Function)
    }

    fn const_u32(&mut self, n: u32) -> Result<u32> {
        self.builder
            .const_id(&Constant::scalar(ConstantValue::U32(n)))
            .map_err(CompileError::internal)
    }

    fn walk(&mut self, ops: &[SbcOp]) -> Result<()> {
        for op in ops {
            self.step(op)?;
        }
        Ok(())
    }

    fn step(&mut self, op: &SbcOp) -> Result<()> {
        match op.op {
            Opcode::SrcFilename | Opcode::Entrypoint | Opcode::Resource | Opcode::FuncEnd => Ok(()),
            Opcode::SrcLinenr => {
                self.line = op.operands[0].as_int().unwrap_or(0) as u32;
                Ok(())
            }
            Opcode::LoadConstant => self.load_constant(op),
            Opcode::LoadName => self.load_name(op),
            Opcode::StoreName => self.store_name(op),
            Opcode::LoadIndex => self.load_index(),
            Opcode::StoreIndex => self.store_index(),
            Opcode::LoadAttr => self.load_attr(op),
            Opcode::StoreAttr => self.store_attr(op),
            Opcode::LoadGlobal => Err(self.internal("co_load_global has no storage location")),
            Opcode::Call => Err(self.err(CompileErrorKind::BadCall, vec![])),
            Opcode::CallBuiltin => self.call_builtin(op),
            Opcode::Binop => self.binop(op),
            Opcode::Compare => self.compare(op),
            Opcode::Unop => self.unop(op),
            Opcode::PopTop => {
                self.pop()?;
                Ok(())
            }
            Opcode::DupTop => {
                let top = self.stack.last().cloned().ok_or_else(|| self.internal("dup on empty stack"))?;
                self.stack.push(top);
                Ok(())
            }
            Opcode::Rotate => self.rotate(op),
            Opcode::Label => self.label(op),
            Opcode::Branch => self.branch(op),
            Opcode::BranchConditional => self.branch_conditional(op),
            Opcode::SelectMerge => {
                self.pending_merge = op.operands[0].as_name().map(|s| PendingMerge::Selection(s.to_owned()));
                Ok(())
            }
            Opcode::LoopMerge => {
                let merge = op.operands[0].as_name().unwrap_or_default().to_owned();
                let cont = op.operands[1].as_name().unwrap_or_default().to_owned();
                self.pending_merge = Some(PendingMerge::Loop(merge, cont));
                Ok(())
            }
            Opcode::Continue | Opcode::Break => self.branch_to_named(op),
            Opcode::Return => self.ret(op),
        }
    }

    fn load_constant(&mut self, op: &SbcOp) -> Result<()> {
        let (value, ty) = match op.operands.first() {
            Some(Operand::Float(f)) => {
                let ty = Type::f32();
                let id = self
                    .builder
                    .const_id(&Constant::scalar(f.0 as f32))
                    .map_err(CompileError::internal)?;
                (id, ty)
            }
            Some(Operand::Int(i)) => {
                let ty = Type::i32();
                let id = self
                    .builder
                    .const_id(&Constant::scalar(*i as i32))
                    .map_err(CompileError::internal)?;
                (id, ty)
            }
            _ => return Err(self.internal("co_load_constant with an unsupported operand")),
        };
        let node = self.arena.root(op.operands[0].to_string());
        self.stack.push(ValueId::rvalue(value, ty).with_provenance(Some(node)));
        Ok(())
    }

    fn load_name(&mut self, op: &SbcOp) -> Result<()> {
        let name = op.operands[0].as_name().unwrap_or_default();
        let (ptr, ty, _) = self.name_pointer(name)?;
        let node = self.arena.root(name.to_owned());
        self.stack.push(ValueId::lvalue(ptr, ty).with_provenance(Some(node)));
        Ok(())
    }

    /// Renders a value's provenance (`foo`, `index.x`, ...) for a
    /// diagnostic, or a generic placeholder when the value has none
    /// (an intermediate computation, not a direct name/index/attr load).
    fn describe(&self, provenance: Option<u32>) -> String {
        provenance
            .map(|id| self.arena.render(id))
            .unwrap_or_else(|| "<expr>".to_owned())
    }

    /// If `err` carries no variable names yet, fills them in from the
    /// operands' provenance. Operator dispatch in `ops.rs` has no
    /// access to the value graph, so `TypeMismatch`/`BadCall` raised
    /// there always start out with empty `vars`; this is the one place
    /// that can still attach them before the error reaches the caller.
    fn with_operand_vars(&self, mut err: CompileError, operands: &[Option<u32>]) -> CompileError {
        if err.vars.is_empty() {
            let vars: Vec<String> = operands.iter().map(|p| self.describe(*p)).collect();
            if !vars.is_empty() {
                err.vars = vars;
            }
        }
        err
    }

    fn store_name(&mut self, op: &SbcOp) -> Result<()> {
        let name = op.operands[0].as_name().unwrap_or_default();
        let (value, value_ty) = self.pop_rvalue()?;
        let (ptr, var_ty, _) = self.name_pointer(name)?;
        let value = if value_ty == var_ty {
            value
        } else {
            emit_cast(self.builder, &self.file, self.line, &value_ty, &var_ty, value)?
        };
        self.builder.op_store(ptr, value).map_err(CompileError::internal)
    }

    fn load_index(&mut self) -> Result<()> {
        let index_slot = self.pop()?;
        let index_desc = self.describe(index_slot.provenance);
        let (index, _) = self.rvalue(index_slot)?;
        let base = self.pop()?;
        if base.kind != ValueKind::LValue {
            return Err(self.err(CompileErrorKind::UnsupportedFeature, vec![]));
        }
        let elem_ty = typeinfer::index_elem_type(&self.file, self.line, &base.ty)?;
        let storage_class = self.storage_class_of_ptr(base.result_id);
        let ptr = self
            .builder
            .op_access_chain(storage_class, &elem_ty, base.result_id, &[index])
            .map_err(CompileError::internal)?;
        self.ptr_storage.insert(ptr, storage_class);
        let node = base.provenance.map(|p| self.arena.index(p, index_desc));
        self.stack.push(ValueId::lvalue(ptr, elem_ty).with_provenance(node));
        Ok(())
    }

    fn store_index(&mut self) -> Result<()> {
        let (value, value_ty) = self.pop_rvalue()?;
        let (index, _) = self.pop_rvalue()?;
        let base = self.pop()?;
        if base.kind != ValueKind::LValue {
            return Err(self.err(CompileErrorKind::UnsupportedFeature, vec![]));
        }
        let elem_ty = typeinfer::index_elem_type(&self.file, self.line, &base.ty)?;
        let storage_class = self.storage_class_of_ptr(base.result_id);
        let ptr = self
            .builder
            .op_access_chain(storage_class, &elem_ty, base.result_id, &[index])
            .map_err(CompileError::internal)?;
        let value = if value_ty == elem_ty {
            value
        } else {
            emit_cast(self.builder, &self.file, self.line, &value_ty, &elem_ty, value)?
        };
        self.builder.op_store(ptr, value).map_err(CompileError::internal)
    }

    fn load_attr(&mut self, op: &SbcOp) -> Result<()> {
        let attr = op.operands[0].as_name().unwrap_or_default();
        let base = self.pop()?;
        if base.kind != ValueKind::LValue {
            return Err(self.err(CompileErrorKind::UnsupportedFeature, vec![]));
        }
        let elem_ty = typeinfer::attr_type(&self.file, self.line, &base.ty, attr)?;
        let index = self.const_u32(member_index(&base.ty, attr)?)?;
        let storage_class = self.storage_class_of_ptr(base.result_id);
        let ptr = self
            .builder
            .op_access_chain(storage_class, &elem_ty, base.result_id, &[index])
            .map_err(CompileError::internal)?;
        self.ptr_storage.insert(ptr, storage_class);
        let node = base.provenance.map(|p| self.arena.attr(p, attr.to_owned()));
        self.stack.push(ValueId::lvalue(ptr, elem_ty).with_provenance(node));
        Ok(())
    }

    fn store_attr(&mut self, op: &SbcOp) -> Result<()> {
        let attr = op.operands[0].as_name().unwrap_or_default();
        let base = self.pop()?;
        let (value, value_ty) = self.pop_rvalue()?;
        if base.kind != ValueKind::LValue {
            return Err(self.err(CompileErrorKind::UnsupportedFeature, vec![]));
        }
        let elem_ty = typeinfer::attr_type(&self.file, self.line, &base.ty, attr)?;
        let index = self.const_u32(member_index(&base.ty, attr)?)?;
        let storage_class = self.storage_class_of_ptr(base.result_id);
        let ptr = self
            .builder
            .op_access_chain(storage_class, &elem_ty, base.result_id, &[index])
            .map_err(CompileError::internal)?;
        let value = if value_ty == elem_ty {
            value
        } else {
            emit_cast(self.builder, &self.file, self.line, &value_ty, &elem_ty, value)?
        };
        self.builder.op_store(ptr, value).map_err(CompileError::internal)
    }

    fn call_builtin(&mut self, op: &SbcOp) -> Result<()> {
        let name = op.operands[0].as_name().unwrap_or_default().to_owned();
        let argc = op.operands.get(1).and_then(Operand::as_int).unwrap_or(0) as usize;
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.pop()?);
        }
        args.reverse();

        match builtins::classify(&name) {
            Some(Builtin::Math(opcode)) => {
                let mut arg_ids = Vec::with_capacity(args.len());
                let mut arg_tys = Vec::with_capacity(args.len());
                for slot in args {
                    let (id, ty) = self.rvalue(slot)?;
                    arg_ids.push(id);
                    arg_tys.push(ty);
                }
                let result_ty = builtins::math_result_type(&self.file, self.line, &name, &arg_tys)?;
                let id = builtins::emit_math(self.builder, self.ext_id, opcode, &result_ty, &arg_ids)?;
                self.stack.push(ValueId::rvalue(id, result_ty));
            }
            Some(Builtin::Construct) => {
                let mut arg_ids = Vec::with_capacity(args.len());
                let mut arg_tys = Vec::with_capacity(args.len());
                for slot in args {
                    let (id, ty) = self.rvalue(slot)?;
                    arg_ids.push(id);
                    arg_tys.push(ty);
                }
                let result_ty = builtins::construct_result_type(&self.file, self.line, &name)?;
                let id = builtins::emit_construct(
                    self.builder,
                    &self.file,
                    self.line,
                    &name,
                    &arg_ids,
                    &arg_tys,
                    &result_ty,
                )?;
                self.stack.push(ValueId::rvalue(id, result_ty));
            }
            Some(Builtin::Tex(resource, method)) => self.call_tex(&resource, method, args)?,
            None => return Err(self.err(CompileErrorKind::BadCall, vec![name])),
        }
        Ok(())
    }

    fn call_tex(&mut self, resource: &str, method: TexMethod, mut args: Vec<ValueId>) -> Result<()> {
        let tex_var = self.variable(resource)?;
        let tex_ty = match &tex_var.ty {
            Type::Texture(t) => t.clone(),
            _ => return Err(self.internal("tex. call on a non-texture resource")),
        };
        let image_ty = Type::Texture(tex_ty.clone());
        let image_ty_id = self.builder.type_id(&image_ty).map_err(CompileError::internal)?;
        let image_val = self
            .builder
            .op_load(&image_ty, tex_var.ptr_id)
            .map_err(CompileError::internal)?;

        match method {
            TexMethod::Sample => {
                if args.len() != 2 {
                    return Err(self.err(CompileErrorKind::BadCall, vec![resource.to_owned()]));
                }
                let coord = args.pop().unwrap();
                let sampler = args.pop().unwrap();
                let (coord_id, _) = self.rvalue(coord)?;
                let (sampler_id, _) = self.rvalue(sampler)?;
                let sampled_image = self
                    .builder
                    .op_sampled_image(image_ty_id, image_val, sampler_id)
                    .map_err(CompileError::internal)?;
                let result_ty = Type::vec(tex_ty.sampled_ty, 4);
                let id = self
                    .builder
                    .op_image_sample(&result_ty, sampled_image, coord_id)
                    .map_err(CompileError::internal)?;
                self.stack.push(ValueId::rvalue(id, result_ty));
            }
            TexMethod::Read => {
                if args.len() != 1 {
                    return Err(self.err(CompileErrorKind::BadCall, vec![resource.to_owned()]));
                }
                let (coord_id, _) = self.rvalue(args.pop().unwrap())?;
                let result_ty = Type::vec(tex_ty.sampled_ty, 4);
                let id = self
                    .builder
                    .op_image_read(&result_ty, image_val, coord_id)
                    .map_err(CompileError::internal)?;
                self.stack.push(ValueId::rvalue(id, result_ty));
            }
            TexMethod::Write => {
                if args.len() != 2 {
                    return Err(self.err(CompileErrorKind::BadCall, vec![resource.to_owned()]));
                }
                let texel = args.pop().unwrap();
                let coord = args.pop().unwrap();
                let (coord_id, _) = self.rvalue(coord)?;
                let (texel_id, _) = self.rvalue(texel)?;
                self.builder
                    .op_image_write(image_val, coord_id, texel_id)
                    .map_err(CompileError::internal)?;
            }
        }
        Ok(())
    }

    fn binop(&mut self, op: &SbcOp) -> Result<()> {
        let name = op.operands[0].as_name().unwrap_or_default();
        let rhs_slot = self.pop()?;
        let lhs_slot = self.pop()?;
        let (lhs_prov, rhs_prov) = (lhs_slot.provenance, rhs_slot.provenance);
        let (rhs, rhs_ty) = self.rvalue(rhs_slot)?;
        let (lhs, lhs_ty) = self.rvalue(lhs_slot)?;
        let result_ty = binop_result_type(&self.file, self.line, &lhs_ty, &rhs_ty)
            .map_err(|e| self.with_operand_vars(e, &[lhs_prov, rhs_prov]))?;
        let lhs = emit_cast(self.builder, &self.file, self.line, &lhs_ty, &result_ty, lhs)?;
        let rhs = emit_cast(self.builder, &self.file, self.line, &rhs_ty, &result_ty, rhs)?;
        let spirv_op = binop_spirv_op(&self.file, self.line, name, &result_ty)?;
        let id = self
            .builder
            .op_binary(spirv_op, &result_ty, lhs, rhs)
            .map_err(CompileError::internal)?;
        self.stack.push(ValueId::rvalue(id, result_ty));
        Ok(())
    }

    fn compare(&mut self, op: &SbcOp) -> Result<()> {
        let name = op.operands[0].as_name().unwrap_or_default();
        let rhs_slot = self.pop()?;
        let lhs_slot = self.pop()?;
        let (lhs_prov, rhs_prov) = (lhs_slot.provenance, rhs_slot.provenance);
        let (rhs, rhs_ty) = self.rvalue(rhs_slot)?;
        let (lhs, lhs_ty) = self.rvalue(lhs_slot)?;
        let promoted = binop_result_type(&self.file, self.line, &lhs_ty, &rhs_ty)
            .map_err(|e| self.with_operand_vars(e, &[lhs_prov, rhs_prov]))?;
        let result_ty = compare_result_type(&self.file, self.line, &lhs_ty, &rhs_ty)
            .map_err(|e| self.with_operand_vars(e, &[lhs_prov, rhs_prov]))?;
        let lhs = emit_cast(self.builder, &self.file, self.line, &lhs_ty, &promoted, lhs)?;
        let rhs = emit_cast(self.builder, &self.file, self.line, &rhs_ty, &promoted, rhs)?;
        let spirv_op = compare_spirv_op(&self.file, self.line, name, &promoted)?;
        let id = self
            .builder
            .op_binary(spirv_op, &result_ty, lhs, rhs)
            .map_err(CompileError::internal)?;
        self.stack.push(ValueId::rvalue(id, result_ty));
        Ok(())
    }

    fn unop(&mut self, op: &SbcOp) -> Result<()> {
        let name = op.operands[0].as_name().unwrap_or_default();
        let operand_slot = self.pop()?;
        let operand_prov = operand_slot.provenance;
        let (operand, operand_ty) = self.rvalue(operand_slot)?;
        let result_ty = unop_result_type(&self.file, self.line, name, &operand_ty)
            .map_err(|e| self.with_operand_vars(e, &[operand_prov]))?;
        let spirv_op = unop_spirv_op(name, &operand_ty);
        let id = self
            .builder
            .op_unary(spirv_op, &result_ty, operand)
            .map_err(CompileError::internal)?;
        self.stack.push(ValueId::rvalue(id, result_ty));
        Ok(())
    }

    fn rotate(&mut self, op: &SbcOp) -> Result<()> {
        let n = op.operands[0].as_int().unwrap_or(2) as usize;
        let len = self.stack.len();
        if n >= 2 && n <= len {
            self.stack[len - n..].rotate_right(1);
        }
        Ok(())
    }

    /// Starts a new block for `co_label`, resolving any selection frame
    /// whose merge this label closes into a real `OpPhi` (or a plain
    /// forwarded value, for the asymmetric one-predecessor case).
    fn label(&mut self, op: &SbcOp) -> Result<()> {
        let name = op.operands[0].as_name().unwrap_or_default();
        let id = self.label_id(name)?;
        self.builder.op_label_id(id).map_err(CompileError::internal)?;
        self.current_block = id;

        if let Some(pos) = self.select_frames.iter().rposition(|f| f.merge_label == name) {
            let frame = self.select_frames.remove(pos);
            match frame.incoming.len() {
                0 => {}
                1 => {
                    let (value, ty, _) = frame.incoming.into_iter().next().unwrap();
                    self.stack.push(ValueId::rvalue(value, ty));
                }
                2 => {
                    let mut incoming = frame.incoming;
                    let (v1, ty1, b1) = incoming.pop().unwrap();
                    let (v0, ty0, b0) = incoming.pop().unwrap();
                    if ty0 != ty1 {
                        return Err(self.err(CompileErrorKind::TypeMismatch, vec![]));
                    }
                    let phi = self
                        .builder
                        .op_phi(&ty0, &[(v0, b0), (v1, b1)])
                        .map_err(CompileError::internal)?;
                    self.stack.push(ValueId::rvalue(phi, ty0));
                }
                _ => return Err(self.internal("selection merge with more than two predecessors")),
            }
        }
        Ok(())
    }

    /// `co_branch`: the general unconditional-branch case. If the
    /// target is an open selection frame's merge label and a value sits
    /// above that frame's recorded entry depth, that value is this
    /// arm's contribution to the eventual phi and is popped off the
    /// real stack here (the merge label, once reached, pushes the
    /// combined result back).
    fn branch(&mut self, op: &SbcOp) -> Result<()> {
        let target = op.operands[0].as_name().unwrap_or_default().to_owned();
        let contributes = self
            .select_frames
            .iter()
            .rposition(|f| f.merge_label == target)
            .filter(|&i| self.stack.len() > self.select_frames[i].entry_depth);
        if let Some(idx) = contributes {
            let value = self.pop()?;
            let (id, ty) = self.rvalue(value)?;
            let block = self.current_block;
            self.select_frames[idx].incoming.push((id, ty, block));
        }
        self.branch_to_named(op)
    }

    fn branch_to_named(&mut self, op: &SbcOp) -> Result<()> {
        let target = op.operands[0].as_name().unwrap_or_default();
        let id = self.label_id(target)?;
        self.builder.op_branch(id).map_err(CompileError::internal)
    }

    fn branch_conditional(&mut self, op: &SbcOp) -> Result<()> {
        let (cond, cond_ty) = self.pop_rvalue()?;
        if !cond_ty.is_bool() {
            return Err(self.err(CompileErrorKind::TypeMismatch, vec![]));
        }
        match self.pending_merge.take() {
            Some(PendingMerge::Selection(merge)) => {
                let merge_id = self.label_id(&merge)?;
                self.builder
                    .op_selection_merge(merge_id)
                    .map_err(CompileError::internal)?;
                self.select_frames.push(SelectFrame {
                    merge_label: merge,
                    entry_depth: self.stack.len(),
                    incoming: Vec::new(),
                });
            }
            Some(PendingMerge::Loop(merge, cont)) => {
                let merge_id = self.label_id(&merge)?;
                let cont_id = self.label_id(&cont)?;
                self.builder
                    .op_loop_merge(merge_id, cont_id)
                    .map_err(CompileError::internal)?;
            }
            None => return Err(self.internal("co_branch_conditional without a preceding merge marker")),
        }
        let true_label = self.label_id(op.operands[0].as_name().unwrap_or_default())?;
        let false_label = self.label_id(op.operands[1].as_name().unwrap_or_default())?;
        self.builder
            .op_branch_conditional(cond, true_label, false_label)
            .map_err(CompileError::internal)
    }

    fn ret(&mut self, op: &SbcOp) -> Result<()> {
        let is_void = op.operands.iter().any(|o| o.as_name() == Some("void"));
        if !is_void {
            self.pop()?;
        }
        match (self.stage, is_void) {
            (ShaderStage::Fragment, true) => self.builder.op_kill().map_err(CompileError::internal),
            _ => self.builder.op_return().map_err(CompileError::internal),
        }
    }
}

fn member_index(base_ty: &Type, attr: &str) -> Result<u32> {
    match base_ty {
        Type::Vector(_) => swizzle_index(attr),
        Type::Struct(s) => s
            .members
            .iter()
            .position(|m| m.name == attr)
            .map(|i| i as u32)
            .ok_or_else(|| CompileError::internal(format!("no such member: {}", attr))),
        _ => Err(CompileError::internal("attribute access on a non-struct, non-vector type")),
    }
}

fn swizzle_index(attr: &str) -> Result<u32> {
    Ok(match attr {
        "x" | "r" => 0,
        "y" | "g" => 1,
        "z" | "b" => 2,
        "w" | "a" => 3,
        _ => return Err(CompileError::internal(format!("not a swizzle component: {}", attr))),
    })
}
