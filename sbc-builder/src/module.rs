//! The SPIR-V module under construction: id allocation, type/constant
//! interning, and the section buckets SPIR-V's binary format requires
//! to appear in a fixed order (capabilities, extensions, ext-inst
//! imports, memory model, entry points, execution modes, debug names,
//! decorations, types/constants/globals, function bodies). Grounded in
//! `spirq-core::parse::bin::{SpirvHeader, SpirvBinary}` and
//! `spirq-core::parse::instr::InstructionBuilder`, used here to write a
//! module instead of read one back.
use fnv::FnvHashMap;
use spirv::{Decoration, Dim, ExecutionMode, ExecutionModel, Op, StorageClass};

use sbc_core::constant::{Constant, ConstantValue};
use sbc_core::error::internal::{anyhow, Result};
use sbc_core::instr::{InstructionBuilder, SpirvHeader};
use sbc_core::ty::{ScalarType, Type};

use crate::alloc::IdAllocator;
use crate::pool::TypeConstPool;

pub struct Builder {
    ids: IdAllocator,
    pool: TypeConstPool,
    generator: u32,
    version: u32,

    capabilities: Vec<Vec<u32>>,
    extensions: Vec<Vec<u32>>,
    ext_inst_imports: FnvHashMap<String, u32>,
    ext_inst_import_instrs: Vec<Vec<u32>>,
    memory_model: Option<Vec<u32>>,
    entry_points: Vec<Vec<u32>>,
    execution_modes: Vec<Vec<u32>>,
    debug_names: Vec<Vec<u32>>,
    decorations: Vec<Vec<u32>>,
    types_constants_globals: Vec<Vec<u32>>,
    functions: Vec<Vec<u32>>,

    current_function: Option<Vec<u32>>,

    void_type_id: Option<u32>,
    void_fn_type_id: Option<u32>,
    sampled_image_types: FnvHashMap<u32, u32>,
}

impl Builder {
    pub fn new(generator: u32) -> Self {
        Builder {
            ids: IdAllocator::new(),
            pool: TypeConstPool::new(),
            generator,
            version: 0x0001_0400, // SPIR-V 1.4
            capabilities: Vec::new(),
            extensions: Vec::new(),
            ext_inst_imports: FnvHashMap::default(),
            ext_inst_import_instrs: Vec::new(),
            memory_model: None,
            entry_points: Vec::new(),
            execution_modes: Vec::new(),
            debug_names: Vec::new(),
            decorations: Vec::new(),
            types_constants_globals: Vec::new(),
            functions: Vec::new(),
            current_function: None,
            void_type_id: None,
            void_fn_type_id: None,
            sampled_image_types: FnvHashMap::default(),
        }
    }

    /// Overrides the module's SPIR-V version word (1.4 by default).
    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    pub fn alloc_id(&mut self) -> u32 {
        self.ids.alloc()
    }

    /// Number of instructions emitted into the types/constants/globals
    /// section so far. Exposed for tests asserting on constant dedup.
    pub fn globals_instr_count(&self) -> usize {
        self.types_constants_globals.len()
    }

    pub fn capability(&mut self, cap: spirv::Capability) {
        self.capabilities
            .push(InstructionBuilder::new(Op::Capability).push(cap as u32).build());
    }

    pub fn memory_model(&mut self, addressing: spirv::AddressingModel, memory: spirv::MemoryModel) {
        self.memory_model = Some(
            InstructionBuilder::new(Op::MemoryModel)
                .push(addressing as u32)
                .push(memory as u32)
                .build(),
        );
    }

    pub fn ext_inst_import(&mut self, name: &str) -> u32 {
        if let Some(id) = self.ext_inst_imports.get(name) {
            return *id;
        }
        let id = self.ids.alloc();
        self.ext_inst_import_instrs.push(
            InstructionBuilder::new(Op::ExtInstImport)
                .push(id)
                .push_str(name)
                .build(),
        );
        self.ext_inst_imports.insert(name.to_owned(), id);
        id
    }

    pub fn entry_point(
        &mut self,
        model: ExecutionModel,
        func_id: u32,
        name: &str,
        interface: &[u32],
    ) {
        let instr = InstructionBuilder::new(Op::EntryPoint)
            .push(model as u32)
            .push(func_id)
            .push_str(name)
            .push_list(interface)
            .build();
        self.entry_points.push(instr);
    }

    pub fn execution_mode(&mut self, func_id: u32, mode: ExecutionMode, literals: &[u32]) {
        let instr = InstructionBuilder::new(Op::ExecutionMode)
            .push(func_id)
            .push(mode as u32)
            .push_list(literals)
            .build();
        self.execution_modes.push(instr);
    }

    pub fn name(&mut self, id: u32, name: &str) {
        self.debug_names
            .push(InstructionBuilder::new(Op::Name).push(id).push_str(name).build());
    }

    pub fn decorate(&mut self, id: u32, decoration: Decoration, literals: &[u32]) {
        let instr = InstructionBuilder::new(Op::Decorate)
            .push(id)
            .push(decoration as u32)
            .push_list(literals)
            .build();
        self.decorations.push(instr);
    }

    pub fn member_decorate(
        &mut self,
        struct_id: u32,
        member: u32,
        decoration: Decoration,
        literals: &[u32],
    ) {
        let instr = InstructionBuilder::new(Op::MemberDecorate)
            .push(struct_id)
            .push(member)
            .push(decoration as u32)
            .push_list(literals)
            .build();
        self.decorations.push(instr);
    }

    /// Interns a [`Type`], recursively interning its component types
    /// first, and returns its (possibly freshly allocated) result id.
    pub fn type_id(&mut self, ty: &Type) -> Result<u32> {
        if let Some(id) = self.pool.get_type(ty) {
            return Ok(id);
        }
        let id = match ty {
            Type::Scalar(ScalarType::Bool) => {
                let id = self.ids.alloc();
                self.push_global(InstructionBuilder::new(Op::TypeBool).push(id).build());
                id
            }
            Type::Scalar(ScalarType::Integer { bits, is_signed }) => {
                let id = self.ids.alloc();
                self.push_global(
                    InstructionBuilder::new(Op::TypeInt)
                        .push(id)
                        .push(*bits)
                        .push(*is_signed as u32)
                        .build(),
                );
                id
            }
            Type::Scalar(ScalarType::Float { bits }) => {
                let id = self.ids.alloc();
                self.push_global(
                    InstructionBuilder::new(Op::TypeFloat).push(id).push(*bits).build(),
                );
                id
            }
            Type::Vector(v) => {
                let component = self.type_id(&Type::Scalar(v.scalar_ty))?;
                let id = self.ids.alloc();
                self.push_global(
                    InstructionBuilder::new(Op::TypeVector)
                        .push(id)
                        .push(component)
                        .push(v.scalar_count)
                        .build(),
                );
                id
            }
            Type::Matrix(m) => {
                let column = self.type_id(&Type::Vector(m.column_ty))?;
                let id = self.ids.alloc();
                self.push_global(
                    InstructionBuilder::new(Op::TypeMatrix)
                        .push(id)
                        .push(column)
                        .push(m.column_count)
                        .build(),
                );
                id
            }
            Type::Array(a) => {
                let elem = self.type_id(&a.element_ty)?;
                let id = self.ids.alloc();
                match a.element_count {
                    Some(n) => {
                        let len_const = self.const_id(&Constant::scalar(ConstantValue::U32(n)))?;
                        self.push_global(
                            InstructionBuilder::new(Op::TypeArray)
                                .push(id)
                                .push(elem)
                                .push(len_const)
                                .build(),
                        );
                    }
                    None => {
                        self.push_global(
                            InstructionBuilder::new(Op::TypeRuntimeArray)
                                .push(id)
                                .push(elem)
                                .build(),
                        );
                    }
                }
                id
            }
            Type::Struct(s) => {
                let member_ids = s
                    .members
                    .iter()
                    .map(|m| self.type_id(&m.ty))
                    .collect::<Result<Vec<_>>>()?;
                let id = self.ids.alloc();
                self.push_global(
                    InstructionBuilder::new(Op::TypeStruct)
                        .push(id)
                        .push_list(&member_ids)
                        .build(),
                );
                for (i, member) in s.members.iter().enumerate() {
                    self.name_member(id, i as u32, &member.name);
                }
                id
            }
            Type::Texture(t) => {
                let sampled = self.type_id(&Type::Scalar(t.sampled_ty))?;
                let id = self.ids.alloc();
                self.push_global(
                    InstructionBuilder::new(Op::TypeImage)
                        .push(id)
                        .push(sampled)
                        .push(t.dim.to_spirv() as u32)
                        .push(0) // depth: unknown
                        .push(0) // arrayed
                        .push(0) // multisampled
                        .push(1) // sampled: compatible with sampling ops
                        .push(spirv::ImageFormat::Unknown as u32)
                        .build(),
                );
                id
            }
            Type::Sampler(_) => {
                let id = self.ids.alloc();
                self.push_global(InstructionBuilder::new(Op::TypeSampler).push(id).build());
                id
            }
            _ => return Err(anyhow!("unsupported type in module builder: {:?}", ty)),
        };
        self.pool.insert_type(ty.clone(), id);
        Ok(id)
    }

    pub fn pointer_type(&mut self, storage_class: StorageClass, pointee: &Type) -> Result<u32> {
        if let Some(id) = self.pool.get_pointer_type(storage_class, pointee) {
            return Ok(id);
        }
        let pointee_id = self.type_id(pointee)?;
        let id = self.ids.alloc();
        self.push_global(
            InstructionBuilder::new(Op::TypePointer)
                .push(id)
                .push(storage_class as u32)
                .push(pointee_id)
                .build(),
        );
        self.pool.insert_pointer_type(storage_class, pointee.clone(), id);
        Ok(id)
    }

    pub fn function_type(&mut self, return_ty: &Type, param_tys: &[Type]) -> Result<u32> {
        let return_id = self.type_id(return_ty)?;
        let param_ids = param_tys
            .iter()
            .map(|t| self.type_id(t))
            .collect::<Result<Vec<_>>>()?;
        let id = self.ids.alloc();
        self.push_global(
            InstructionBuilder::new(Op::TypeFunction)
                .push(id)
                .push(return_id)
                .push_list(&param_ids)
                .build(),
        );
        Ok(id)
    }

    /// The entry point's function type is always `void()`, which has no
    /// counterpart in `Type`'s closed algebraic set, so it bypasses
    /// `type_id`/`function_type` and is interned here directly.
    pub fn void_type(&mut self) -> u32 {
        if let Some(id) = self.void_type_id {
            return id;
        }
        let id = self.ids.alloc();
        self.push_global(InstructionBuilder::new(Op::TypeVoid).push(id).build());
        self.void_type_id = Some(id);
        id
    }

    pub fn void_function_type(&mut self) -> u32 {
        if let Some(id) = self.void_fn_type_id {
            return id;
        }
        let void = self.void_type();
        let id = self.ids.alloc();
        self.push_global(
            InstructionBuilder::new(Op::TypeFunction)
                .push(id)
                .push(void)
                .build(),
        );
        self.void_fn_type_id = Some(id);
        id
    }

    /// `OpTypeSampledImage`, keyed by the underlying image type id since
    /// `Type` itself has no "sampled image" variant: the dialect keeps
    /// texture and sampler resources as separate parameters and only
    /// combines them at the point a `tex.sample` call is lowered.
    pub fn sampled_image_type(&mut self, image_ty_id: u32) -> u32 {
        if let Some(id) = self.sampled_image_types.get(&image_ty_id) {
            return *id;
        }
        let id = self.ids.alloc();
        self.push_global(
            InstructionBuilder::new(Op::TypeSampledImage)
                .push(id)
                .push(image_ty_id)
                .build(),
        );
        self.sampled_image_types.insert(image_ty_id, id);
        id
    }

    /// Interns a [`Constant`], recursively interning composite children
    /// first so identical children share one `OpConstant`.
    pub fn const_id(&mut self, c: &Constant) -> Result<u32> {
        if let Some(id) = self.pool.get_const(c) {
            return Ok(id);
        }
        let ty_id = self.type_id(&c.ty())?;
        let id = self.ids.alloc();
        match c {
            Constant::Scalar(ConstantValue::Bool(true)) => {
                self.push_global(InstructionBuilder::new(Op::ConstantTrue).push(ty_id).push(id).build());
            }
            Constant::Scalar(ConstantValue::Bool(false)) => {
                self.push_global(InstructionBuilder::new(Op::ConstantFalse).push(ty_id).push(id).build());
            }
            Constant::Scalar(v) => {
                self.push_global(
                    InstructionBuilder::new(Op::Constant)
                        .push(ty_id)
                        .push(id)
                        .push_list(&v.to_words())
                        .build(),
                );
            }
            Constant::Composite { children, .. } => {
                let child_ids = children
                    .iter()
                    .map(|c| self.const_id(c))
                    .collect::<Result<Vec<_>>>()?;
                self.push_global(
                    InstructionBuilder::new(Op::ConstantComposite)
                        .push(ty_id)
                        .push(id)
                        .push_list(&child_ids)
                        .build(),
                );
            }
        }
        self.pool.insert_const(c.clone(), id);
        Ok(id)
    }

    pub fn global_variable(&mut self, storage_class: StorageClass, pointee: &Type) -> Result<u32> {
        let ptr_ty = self.pointer_type(storage_class, pointee)?;
        let id = self.ids.alloc();
        self.push_global(
            InstructionBuilder::new(Op::Variable)
                .push(ptr_ty)
                .push(id)
                .push(storage_class as u32)
                .build(),
        );
        Ok(id)
    }

    fn name_member(&mut self, struct_id: u32, index: u32, name: &str) {
        self.debug_names.push(
            InstructionBuilder::new(Op::MemberName)
                .push(struct_id)
                .push(index)
                .push_str(name)
                .build(),
        );
    }

    fn push_global(&mut self, instr: Vec<u32>) {
        self.types_constants_globals.push(instr);
    }

    /// Opens a function body; instructions emitted through the `op_*`
    /// function-body helpers append to this buffer until
    /// [`Builder::end_function`].
    pub fn begin_function(&mut self, return_ty: &Type, func_ty_id: u32, control: u32) -> Result<u32> {
        let return_id = self.type_id(return_ty)?;
        let id = self.ids.alloc();
        let mut body = Vec::new();
        body.extend(
            InstructionBuilder::new(Op::Function)
                .push(return_id)
                .push(id)
                .push(control)
                .push(func_ty_id)
                .build(),
        );
        self.current_function = Some(body);
        Ok(id)
    }

    /// Opens the entry point's function body. Its return type is always
    /// `void`, so unlike [`Builder::begin_function`] this never needs to
    /// intern a `Type`.
    pub fn begin_function_void(&mut self, func_ty_id: u32, control: u32) -> Result<u32> {
        let return_id = self.void_type();
        let id = self.ids.alloc();
        let mut body = Vec::new();
        body.extend(
            InstructionBuilder::new(Op::Function)
                .push(return_id)
                .push(id)
                .push(control)
                .push(func_ty_id)
                .build(),
        );
        self.current_function = Some(body);
        Ok(id)
    }

    pub fn end_function(&mut self) -> Result<()> {
        let mut body = self
            .current_function
            .take()
            .ok_or_else(|| anyhow!("end_function called with no open function"))?;
        body.extend(InstructionBuilder::new(Op::FunctionEnd).build());
        self.functions.push(body);
        Ok(())
    }

    fn emit(&mut self, instr: Vec<u32>) -> Result<()> {
        self.current_function
            .as_mut()
            .ok_or_else(|| anyhow!("function-body instruction emitted outside a function"))?
            .extend(instr);
        Ok(())
    }

    pub fn op_label(&mut self) -> Result<u32> {
        let id = self.ids.alloc();
        self.emit(InstructionBuilder::new(Op::Label).push(id).build())?;
        Ok(id)
    }

    /// Emits `OpLabel` for an id allocated ahead of time by the caller.
    /// Needed when a block's id must be known before it is reached, e.g.
    /// a forward branch target resolved in a pre-pass over `co_label`s.
    pub fn op_label_id(&mut self, id: u32) -> Result<()> {
        self.emit(InstructionBuilder::new(Op::Label).push(id).build())
    }

    pub fn op_variable_local(&mut self, storage_class: StorageClass, pointee: &Type) -> Result<u32> {
        let ptr_ty = self.pointer_type(storage_class, pointee)?;
        let id = self.ids.alloc();
        self.emit(
            InstructionBuilder::new(Op::Variable)
                .push(ptr_ty)
                .push(id)
                .push(storage_class as u32)
                .build(),
        )?;
        Ok(id)
    }

    pub fn op_load(&mut self, ty: &Type, pointer: u32) -> Result<u32> {
        let ty_id = self.type_id(ty)?;
        let id = self.ids.alloc();
        self.emit(
            InstructionBuilder::new(Op::Load)
                .push(ty_id)
                .push(id)
                .push(pointer)
                .build(),
        )?;
        Ok(id)
    }

    pub fn op_store(&mut self, pointer: u32, value: u32) -> Result<()> {
        self.emit(InstructionBuilder::new(Op::Store).push(pointer).push(value).build())
    }

    pub fn op_access_chain(
        &mut self,
        storage_class: StorageClass,
        result_ty: &Type,
        base: u32,
        indices: &[u32],
    ) -> Result<u32> {
        let ptr_ty = self.pointer_type(storage_class, result_ty)?;
        let id = self.ids.alloc();
        self.emit(
            InstructionBuilder::new(Op::AccessChain)
                .push(ptr_ty)
                .push(id)
                .push(base)
                .push_list(indices)
                .build(),
        )?;
        Ok(id)
    }

    pub fn op_binary(&mut self, op: Op, ty: &Type, lhs: u32, rhs: u32) -> Result<u32> {
        let ty_id = self.type_id(ty)?;
        let id = self.ids.alloc();
        self.emit(
            InstructionBuilder::new(op)
                .push(ty_id)
                .push(id)
                .push(lhs)
                .push(rhs)
                .build(),
        )?;
        Ok(id)
    }

    pub fn op_unary(&mut self, op: Op, ty: &Type, operand: u32) -> Result<u32> {
        let ty_id = self.type_id(ty)?;
        let id = self.ids.alloc();
        self.emit(InstructionBuilder::new(op).push(ty_id).push(id).push(operand).build())?;
        Ok(id)
    }

    pub fn op_composite_construct(&mut self, ty: &Type, components: &[u32]) -> Result<u32> {
        let ty_id = self.type_id(ty)?;
        let id = self.ids.alloc();
        self.emit(
            InstructionBuilder::new(Op::CompositeConstruct)
                .push(ty_id)
                .push(id)
                .push_list(components)
                .build(),
        )?;
        Ok(id)
    }

    pub fn op_composite_extract(&mut self, ty: &Type, composite: u32, indices: &[u32]) -> Result<u32> {
        let ty_id = self.type_id(ty)?;
        let id = self.ids.alloc();
        self.emit(
            InstructionBuilder::new(Op::CompositeExtract)
                .push(ty_id)
                .push(id)
                .push(composite)
                .push_list(indices)
                .build(),
        )?;
        Ok(id)
    }

    pub fn op_select(&mut self, ty: &Type, cond: u32, true_val: u32, false_val: u32) -> Result<u32> {
        let ty_id = self.type_id(ty)?;
        let id = self.ids.alloc();
        self.emit(
            InstructionBuilder::new(Op::Select)
                .push(ty_id)
                .push(id)
                .push(cond)
                .push(true_val)
                .push(false_val)
                .build(),
        )?;
        Ok(id)
    }

    pub fn op_phi(&mut self, ty: &Type, incoming: &[(u32, u32)]) -> Result<u32> {
        let ty_id = self.type_id(ty)?;
        let id = self.ids.alloc();
        let mut builder = InstructionBuilder::new(Op::Phi).push(ty_id).push(id);
        for (value, block) in incoming {
            builder = builder.push(*value).push(*block);
        }
        self.emit(builder.build())?;
        Ok(id)
    }

    pub fn op_selection_merge(&mut self, merge_label: u32) -> Result<()> {
        self.emit(
            InstructionBuilder::new(Op::SelectionMerge)
                .push(merge_label)
                .push(0)
                .build(),
        )
    }

    pub fn op_loop_merge(&mut self, merge_label: u32, continue_label: u32) -> Result<()> {
        self.emit(
            InstructionBuilder::new(Op::LoopMerge)
                .push(merge_label)
                .push(continue_label)
                .push(0)
                .build(),
        )
    }

    pub fn op_branch(&mut self, target: u32) -> Result<()> {
        self.emit(InstructionBuilder::new(Op::Branch).push(target).build())
    }

    pub fn op_branch_conditional(&mut self, cond: u32, true_label: u32, false_label: u32) -> Result<()> {
        self.emit(
            InstructionBuilder::new(Op::BranchConditional)
                .push(cond)
                .push(true_label)
                .push(false_label)
                .build(),
        )
    }

    pub fn op_kill(&mut self) -> Result<()> {
        self.emit(InstructionBuilder::new(Op::Kill).build())
    }

    pub fn op_return(&mut self) -> Result<()> {
        self.emit(InstructionBuilder::new(Op::Return).build())
    }

    pub fn op_return_value(&mut self, value: u32) -> Result<()> {
        self.emit(InstructionBuilder::new(Op::ReturnValue).push(value).build())
    }

    pub fn op_ext_inst(
        &mut self,
        ty: &Type,
        set: u32,
        instruction: u32,
        operands: &[u32],
    ) -> Result<u32> {
        let ty_id = self.type_id(ty)?;
        let id = self.ids.alloc();
        self.emit(
            InstructionBuilder::new(Op::ExtInst)
                .push(ty_id)
                .push(id)
                .push(set)
                .push(instruction)
                .push_list(operands)
                .build(),
        )?;
        Ok(id)
    }

    /// `OpSampledImage`, combining a loaded image value with a loaded
    /// sampler value ahead of an `ImageSampleImplicitLod`. `ty` is the
    /// `OpTypeSampledImage` built over `image`'s own type.
    pub fn op_sampled_image(&mut self, image_ty_id: u32, image: u32, sampler: u32) -> Result<u32> {
        let ty_id = self.sampled_image_type(image_ty_id);
        let id = self.ids.alloc();
        self.emit(
            InstructionBuilder::new(Op::SampledImage)
                .push(ty_id)
                .push(id)
                .push(image)
                .push(sampler)
                .build(),
        )?;
        Ok(id)
    }

    pub fn op_image_sample(&mut self, ty: &Type, image: u32, coordinate: u32) -> Result<u32> {
        let ty_id = self.type_id(ty)?;
        let id = self.ids.alloc();
        self.emit(
            InstructionBuilder::new(Op::ImageSampleImplicitLod)
                .push(ty_id)
                .push(id)
                .push(image)
                .push(coordinate)
                .build(),
        )?;
        Ok(id)
    }

    pub fn op_image_read(&mut self, ty: &Type, image: u32, coordinate: u32) -> Result<u32> {
        let ty_id = self.type_id(ty)?;
        let id = self.ids.alloc();
        self.emit(
            InstructionBuilder::new(Op::ImageRead)
                .push(ty_id)
                .push(id)
                .push(image)
                .push(coordinate)
                .build(),
        )?;
        Ok(id)
    }

    pub fn op_image_write(&mut self, image: u32, coordinate: u32, texel: u32) -> Result<()> {
        self.emit(
            InstructionBuilder::new(Op::ImageWrite)
                .push(image)
                .push(coordinate)
                .push(texel)
                .build(),
        )
    }

    /// Concatenates every section in SPIR-V's mandated order and
    /// prepends the 5-word header, producing the final module word
    /// stream.
    pub fn build(self) -> Vec<u32> {
        let header = SpirvHeader::new(self.version, self.generator);
        let bound = self.ids.bound();
        let mut words: Vec<u32> = header.words(bound).to_vec();
        for section in [
            &self.capabilities,
            &self.extensions,
            &self.ext_inst_import_instrs,
            &self
                .memory_model
                .as_ref()
                .map(|m| vec![m.clone()])
                .unwrap_or_default(),
            &self.entry_points,
            &self.execution_modes,
            &self.debug_names,
            &self.decorations,
            &self.types_constants_globals,
            &self.functions,
        ] {
            for instr in section {
                words.extend_from_slice(instr);
            }
        }
        words
    }
}
