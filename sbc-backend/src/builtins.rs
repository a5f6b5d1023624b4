//! `co_call_builtin` dispatch (§4.5 step 6): GLSL.std.450 math
//! intrinsics, `tex.sample`/`tex.read`/`tex.write`, and the closed set
//! of type-constructor calls (`vec3(...)`, `f32(x)`, ...) the
//! front-end's `TYPE_NAMES` already routes here.
//!
//! The `spirv` crate only models the core instruction set; GLSL.std.450
//! is a separate extended-instruction-set spec with its own opcode
//! numbering, so its handful of opcodes this dialect needs are kept as
//! plain constants here rather than invented as a fake dependency.
use sbc_core::error::{CompileError, CompileErrorKind, Result};
use sbc_core::ty::{ScalarType, Type};

use sbc_builder::Builder;

use crate::ops::emit_cast;

pub const GLSL_STD_450: &str = "GLSL.std.450";

#[allow(dead_code)]
mod glsl_opcode {
    pub const ROUND: u32 = 1;
    pub const FABS: u32 = 4;
    pub const FLOOR: u32 = 8;
    pub const FRACT: u32 = 10;
    pub const SIN: u32 = 13;
    pub const COS: u32 = 14;
    pub const TAN: u32 = 15;
    pub const ASIN: u32 = 16;
    pub const ACOS: u32 = 17;
    pub const ATAN: u32 = 18;
    pub const ATAN2: u32 = 25;
    pub const POW: u32 = 26;
    pub const EXP: u32 = 27;
    pub const LOG: u32 = 28;
    pub const EXP2: u32 = 29;
    pub const LOG2: u32 = 30;
    pub const SQRT: u32 = 31;
    pub const INVERSE_SQRT: u32 = 32;
    pub const FMIN: u32 = 37;
    pub const FMAX: u32 = 40;
    pub const FCLAMP: u32 = 43;
    pub const FMIX: u32 = 46;
    pub const CROSS: u32 = 68;
    pub const NORMALIZE: u32 = 69;
    pub const LENGTH: u32 = 66;
    pub const DISTANCE: u32 = 67;
}

/// One of the three resource-method intrinsics; the resource's own
/// name is whatever precedes the dot in the `co_call_builtin` operand.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum TexMethod {
    Sample,
    Read,
    Write,
}

/// What a `co_call_builtin` name resolves to.
pub enum Builtin {
    /// A GLSL.std.450 extended instruction, keyed by its opcode number.
    Math(u32),
    /// A texture/sampler method, keyed by the resource parameter name.
    Tex(String, TexMethod),
    /// A type constructor (`vec3`, `f32`, `mat4`, ...).
    Construct,
}

/// Classifies a `co_call_builtin` name (already stripped of its
/// `stdlib.` prefix where applicable, per the front-end's own
/// convention of leaving resource method calls as `name.method`).
pub fn classify(name: &str) -> Option<Builtin> {
    if let Some(math) = math_opcode(name) {
        return Some(Builtin::Math(math));
    }
    if is_type_name(name) {
        return Some(Builtin::Construct);
    }
    if let Some((resource, method)) = name.split_once('.') {
        let method = match method {
            "sample" => TexMethod::Sample,
            "read" => TexMethod::Read,
            "write" => TexMethod::Write,
            _ => return None,
        };
        return Some(Builtin::Tex(resource.to_owned(), method));
    }
    None
}

fn math_opcode(name: &str) -> Option<u32> {
    use glsl_opcode::*;
    Some(match name {
        "abs" => FABS,
        "floor" => FLOOR,
        "fract" => FRACT,
        "sin" => SIN,
        "cos" => COS,
        "tan" => TAN,
        "asin" => ASIN,
        "acos" => ACOS,
        "atan" => ATAN,
        "atan2" => ATAN2,
        "pow" => POW,
        "exp" => EXP,
        "log" => LOG,
        "exp2" => EXP2,
        "log2" => LOG2,
        "sqrt" => SQRT,
        "inverse_sqrt" | "rsqrt" => INVERSE_SQRT,
        "min" => FMIN,
        "max" => FMAX,
        "clamp" => FCLAMP,
        "mix" | "lerp" => FMIX,
        "cross" => CROSS,
        "normalize" => NORMALIZE,
        "length" => LENGTH,
        "distance" => DISTANCE,
        _ => return None,
    })
}

fn is_type_name(name: &str) -> bool {
    matches!(
        name,
        "bool"
            | "i32"
            | "u32"
            | "f32"
            | "vec2"
            | "vec3"
            | "vec4"
            | "ivec2"
            | "ivec3"
            | "ivec4"
            | "uvec2"
            | "uvec3"
            | "uvec4"
            | "mat2"
            | "mat3"
            | "mat4"
    )
}

/// Result type of a math intrinsic: elementwise over the first
/// argument's type (every intrinsic in this set is shape-preserving).
pub fn math_result_type(file: &str, line: u32, name: &str, arg_tys: &[Type]) -> Result<Type> {
    arg_tys.first().cloned().ok_or_else(|| {
        CompileError::new(
            CompileErrorKind::BadCall,
            file,
            line,
            String::new(),
            vec![name.to_owned()],
        )
    })
}

/// Result type of a type-constructor call.
pub fn construct_result_type(file: &str, line: u32, name: &str) -> Result<Type> {
    let ty = match name {
        "bool" => Type::bool(),
        "i32" => Type::i32(),
        "u32" => Type::u32(),
        "f32" => Type::f32(),
        "vec2" => Type::vec(ScalarType::f32(), 2),
        "vec3" => Type::vec(ScalarType::f32(), 3),
        "vec4" => Type::vec(ScalarType::f32(), 4),
        "ivec2" => Type::vec(ScalarType::i32(), 2),
        "ivec3" => Type::vec(ScalarType::i32(), 3),
        "ivec4" => Type::vec(ScalarType::i32(), 4),
        "uvec2" => Type::vec(ScalarType::u32(), 2),
        "uvec3" => Type::vec(ScalarType::u32(), 3),
        "uvec4" => Type::vec(ScalarType::u32(), 4),
        "mat2" => matrix_ty(2),
        "mat3" => matrix_ty(3),
        "mat4" => matrix_ty(4),
        _ => {
            return Err(CompileError::new(
                CompileErrorKind::BadCall,
                file,
                line,
                String::new(),
                vec![name.to_owned()],
            ))
        }
    };
    Ok(ty)
}

fn matrix_ty(n: u32) -> Type {
    Type::Matrix(sbc_core::ty::MatrixType {
        column_ty: sbc_core::ty::VectorType {
            scalar_ty: ScalarType::f32(),
            scalar_count: n,
        },
        column_count: n,
    })
}

/// Emits a GLSL.std.450 extended instruction.
pub fn emit_math(builder: &mut Builder, ext_set: u32, opcode: u32, result_ty: &Type, arg_ids: &[u32]) -> Result<u32> {
    builder
        .op_ext_inst(result_ty, ext_set, opcode, arg_ids)
        .map_err(CompileError::internal)
}

/// Emits a type-constructor call: a cast for a same-arity scalar/vector
/// target, or an `OpCompositeConstruct`-shaped build via repeated casts
/// plus a single-component splat when only one argument is given.
pub fn emit_construct(
    builder: &mut Builder,
    file: &str,
    line: u32,
    name: &str,
    arg_ids: &[u32],
    arg_tys: &[Type],
    result_ty: &Type,
) -> Result<u32> {
    match result_ty {
        Type::Scalar(_) => {
            if arg_ids.len() != 1 {
                return Err(CompileError::new(
                    CompileErrorKind::BadCall,
                    file,
                    line,
                    String::new(),
                    vec![name.to_owned()],
                ));
            }
            emit_cast(builder, file, line, &arg_tys[0], result_ty, arg_ids[0])
        }
        Type::Vector(v) => {
            let elem_ty = Type::Scalar(v.scalar_ty);
            let component_ids: Vec<u32> = if arg_ids.len() == 1 {
                let cast = emit_cast(builder, file, line, &arg_tys[0], &elem_ty, arg_ids[0])?;
                vec![cast; v.scalar_count as usize]
            } else if arg_ids.len() == v.scalar_count as usize {
                arg_ids
                    .iter()
                    .zip(arg_tys.iter())
                    .map(|(id, ty)| emit_cast(builder, file, line, ty, &elem_ty, *id))
                    .collect::<Result<Vec<_>>>()?
            } else {
                return Err(CompileError::new(
                    CompileErrorKind::BadCall,
                    file,
                    line,
                    String::new(),
                    vec![name.to_owned()],
                ));
            };
            composite_construct(builder, result_ty, &component_ids)
        }
        Type::Matrix(m) => {
            if arg_ids.len() != m.column_count as usize {
                return Err(CompileError::new(
                    CompileErrorKind::BadCall,
                    file,
                    line,
                    String::new(),
                    vec![name.to_owned()],
                ));
            }
            composite_construct(builder, result_ty, arg_ids)
        }
        _ => Err(CompileError::new(
            CompileErrorKind::BadCall,
            file,
            line,
            String::new(),
            vec![name.to_owned()],
        )),
    }
}

fn composite_construct(builder: &mut Builder, result_ty: &Type, component_ids: &[u32]) -> Result<u32> {
    builder
        .op_composite_construct(result_ty, component_ids)
        .map_err(CompileError::internal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_math_tex_and_constructor_names() {
        assert!(matches!(classify("sin"), Some(Builtin::Math(_))));
        assert!(matches!(classify("vec3"), Some(Builtin::Construct)));
        assert!(matches!(
            classify("tex.sample"),
            Some(Builtin::Tex(ref r, TexMethod::Sample)) if r == "tex"
        ));
        assert!(classify("not_a_builtin").is_none());
    }

    #[test]
    fn construct_result_type_maps_vec3_to_f32_vector() {
        let ty = construct_result_type("f", 0, "vec3").unwrap();
        assert_eq!(ty, Type::vec(ScalarType::f32(), 3));
    }
}
