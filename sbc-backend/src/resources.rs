//! Resource wiring (§4.5 step 1): maps each declared parameter's
//! `IoKind` to a SPIR-V storage class, decorates it, and — for
//! `buffer`/`uniform` resources — wraps its payload type in the
//! one-member `Block`-decorated struct SPIR-V requires for SSBOs/UBOs.
use fnv::FnvHashSet;
use spirv::{Decoration, StorageClass};

use sbc_core::error::{CompileError, CompileErrorKind, Result};
use sbc_core::locator::{IoKind, Param, Slot};
use sbc_core::ty::{StructMember, StructType, Type};

use sbc_builder::Builder;

use crate::value::Variable;

pub fn storage_class_of(iokind: IoKind) -> StorageClass {
    match iokind {
        IoKind::Input => StorageClass::Input,
        IoKind::Output => StorageClass::Output,
        IoKind::Buffer => StorageClass::StorageBuffer,
        IoKind::Uniform => StorageClass::Uniform,
        IoKind::Texture | IoKind::Sampler => StorageClass::UniformConstant,
    }
}

/// A SPIR-V builtin name (`"Position"`, `"GlobalInvocationId"`, ...)
/// parsed out of a `Slot::Builtin`, resolved against the handful the
/// dialect's signature grammar actually names (§6).
fn builtin_enum(name: &str) -> Option<spirv::BuiltIn> {
    use spirv::BuiltIn::*;
    Some(match name {
        "Position" => Position,
        "PointSize" => PointSize,
        "VertexIndex" => VertexIndex,
        "InstanceIndex" => InstanceIndex,
        "FragCoord" => FragCoord,
        "PointCoord" => PointCoord,
        "FrontFacing" => FrontFacing,
        "FragDepth" => FragDepth,
        "NumWorkgroups" => NumWorkgroups,
        "WorkgroupId" => WorkgroupId,
        "LocalInvocationId" => LocalInvocationId,
        "GlobalInvocationId" => GlobalInvocationId,
        "LocalInvocationIndex" => LocalInvocationIndex,
        _ => return None,
    })
}

/// Declares one resource parameter in the module, returning the
/// variable handle the back-end's symbolic walk will look the
/// parameter name up by.
pub fn declare_resource(
    builder: &mut Builder,
    param: &Param,
    file: &str,
) -> Result<(Variable, u32)> {
    let storage_class = storage_class_of(param.iokind);
    let wrapped_in_block = matches!(param.iokind, IoKind::Buffer | IoKind::Uniform);

    let physical_ty = if wrapped_in_block {
        wrap_in_block(&param.ty)
    } else {
        param.ty.clone()
    };

    let ptr_id = builder
        .global_variable(storage_class, &physical_ty)
        .map_err(|e| CompileError::internal(e))?;
    builder.name(ptr_id, &param.name);

    if wrapped_in_block {
        let struct_ty_id = builder.type_id(&physical_ty).map_err(CompileError::internal)?;
        builder.decorate(struct_ty_id, Decoration::Block, &[]);
        decorate_member_stride(builder, struct_ty_id, &param.ty)?;
    }

    match (&param.iokind, &param.slot) {
        (IoKind::Input | IoKind::Output, Slot::Location(loc)) => {
            builder.decorate(ptr_id, Decoration::Location, &[loc.loc()]);
        }
        (IoKind::Input | IoKind::Output, Slot::Builtin(name)) => {
            let builtin = builtin_enum(name).ok_or_else(|| {
                CompileError::new(
                    CompileErrorKind::UnsupportedFeature,
                    file,
                    0,
                    format!("unknown builtin slot: {}", name),
                    vec![param.name.clone()],
                )
            })?;
            builder.decorate(ptr_id, Decoration::BuiltIn, &[builtin as u32]);
        }
        (IoKind::Buffer | IoKind::Uniform, Slot::Binding(b)) => {
            builder.decorate(ptr_id, Decoration::DescriptorSet, &[0]);
            builder.decorate(ptr_id, Decoration::Binding, &[*b]);
        }
        (IoKind::Buffer | IoKind::Uniform | IoKind::Texture | IoKind::Sampler, Slot::Descriptor(d)) => {
            builder.decorate(ptr_id, Decoration::DescriptorSet, &[d.set()]);
            builder.decorate(ptr_id, Decoration::Binding, &[d.bind()]);
        }
        _ => {
            return Err(CompileError::new(
                CompileErrorKind::UnsupportedFeature,
                file,
                0,
                format!("{} resource cannot use slot {}", param.iokind, param.slot),
                vec![param.name.clone()],
            ))
        }
    }

    let variable = Variable {
        ptr_id,
        ty: param.ty.clone(),
        storage_class,
        wrapped_in_block,
    };
    Ok((variable, ptr_id))
}

/// Wraps `payload` in a single-member anonymous struct, the SPIR-V
/// idiom for an SSBO/UBO's outer interface block.
fn wrap_in_block(payload: &Type) -> Type {
    Type::Struct(StructType {
        name: "_Block".to_owned(),
        members: vec![StructMember {
            name: "_data".to_owned(),
            ty: payload.clone(),
        }],
    })
}

/// Decorates the block struct's sole member with its byte offset (0)
/// and, if it is an array, the per-element stride required by
/// `std430`.
fn decorate_member_stride(builder: &mut Builder, struct_id: u32, payload: &Type) -> Result<()> {
    builder.member_decorate(struct_id, 0, Decoration::Offset, &[0]);
    if let Type::Array(a) = payload {
        builder.member_decorate(struct_id, 0, Decoration::ArrayStride, &[a.stride() as u32]);
    }
    Ok(())
}

/// Checks every resource's `(set, binding)` pair is unique, per §3's
/// invariant. Location/builtin-slotted input/output parameters are not
/// subject to this check (they share no descriptor namespace).
pub fn check_binding_uniqueness(params: &[Param], file: &str) -> Result<()> {
    let mut seen = FnvHashSet::default();
    for param in params {
        let key = match (&param.iokind, &param.slot) {
            (IoKind::Buffer | IoKind::Uniform, Slot::Binding(b)) => Some((0u32, *b)),
            (IoKind::Buffer | IoKind::Uniform | IoKind::Texture | IoKind::Sampler, Slot::Descriptor(d)) => {
                Some((d.set(), d.bind()))
            }
            _ => None,
        };
        if let Some(key) = key {
            if !seen.insert(key) {
                return Err(CompileError::new(
                    CompileErrorKind::BindingConflict,
                    file,
                    0,
                    format!("duplicate binding (set={}, bind={})", key.0, key.1),
                    vec![param.name.clone()],
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_bindings() {
        let params = vec![
            Param {
                name: "a".into(),
                iokind: IoKind::Buffer,
                slot: Slot::Binding(0),
                ty: Type::f32(),
            },
            Param {
                name: "b".into(),
                iokind: IoKind::Buffer,
                slot: Slot::Binding(0),
                ty: Type::f32(),
            },
        ];
        let err = check_binding_uniqueness(&params, "shader.py").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::BindingConflict);
    }

    #[test]
    fn storage_classes_match_iokind() {
        assert_eq!(storage_class_of(IoKind::Input), StorageClass::Input);
        assert_eq!(storage_class_of(IoKind::Buffer), StorageClass::StorageBuffer);
        assert_eq!(storage_class_of(IoKind::Texture), StorageClass::UniformConstant);
    }
}
