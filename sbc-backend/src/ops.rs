//! Binary/compare/unary operator dispatch (§4.5 step 3), shared
//! between the type-inference pre-pass (`typeinfer.rs`, which only
//! needs the result type) and real codegen (`generate.rs`, which also
//! needs the SPIR-V opcode to emit).
use spirv::Op;

use sbc_core::error::{CompileError, CompileErrorKind, Result};
use sbc_core::ty::{cast_rule, CastRule, ScalarType, Type};

use sbc_builder::Builder;

/// Emits whatever SPIR-V conversion `cast_rule` says `from -> to`
/// needs, returning `value` unchanged for an identity cast.
pub fn emit_cast(builder: &mut Builder, file: &str, line: u32, from: &Type, to: &Type, value: u32) -> Result<u32> {
    let rule = cast_rule(from, to).map_err(|mut e| {
        e.file = file.to_owned();
        e.line = line;
        e
    })?;
    match rule {
        CastRule::Identity => Ok(value),
        CastRule::Bitcast => builder.op_unary(Op::Bitcast, to, value).map_err(CompileError::internal),
        CastRule::Convert => {
            let op = convert_op(from, to)?;
            builder.op_unary(op, to, value).map_err(CompileError::internal)
        }
    }
}

fn scalar_of(ty: &Type) -> Option<ScalarType> {
    ty.as_scalar().or_else(|| ty.as_vector().map(|v| v.scalar_ty))
}

fn convert_op(from: &Type, to: &Type) -> Result<Op> {
    let (from_s, to_s) = (scalar_of(from), scalar_of(to));
    let (from_s, to_s) = match (from_s, to_s) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(CompileError::internal(format!(
                "cannot convert between non-numeric types {} -> {}",
                from, to
            )))
        }
    };
    let from_float = Type::Scalar(from_s).is_float();
    let to_float = Type::Scalar(to_s).is_float();
    Ok(match (from_float, to_float) {
        (true, true) => Op::FConvert,
        (false, true) => {
            if is_signed(from_s) {
                Op::ConvertSToF
            } else {
                Op::ConvertUToF
            }
        }
        (true, false) => {
            if is_signed(to_s) {
                Op::ConvertFToS
            } else {
                Op::ConvertFToU
            }
        }
        (false, false) => {
            if is_signed(from_s) {
                Op::SConvert
            } else {
                Op::UConvert
            }
        }
    })
}

fn is_signed(s: ScalarType) -> bool {
    matches!(s, ScalarType::Integer { is_signed: true, .. })
}

/// Result type of a binary arithmetic operator, via numeric promotion.
pub fn binop_result_type(file: &str, line: u32, lhs: &Type, rhs: &Type) -> Result<Type> {
    lhs.promote(rhs)
        .map_err(|kind| CompileError::new(kind, file, line, String::new(), vec![]))
}

/// Result type of a comparison: always `bool`, scalar or component-wise
/// vector of `bool` matching the operand arity, but operands must still
/// promote against each other first.
pub fn compare_result_type(file: &str, line: u32, lhs: &Type, rhs: &Type) -> Result<Type> {
    let promoted = binop_result_type(file, line, lhs, rhs)?;
    Ok(match promoted {
        Type::Vector(v) => Type::vec(sbc_core::ty::ScalarType::Bool, v.scalar_count),
        _ => Type::bool(),
    })
}

/// Result type of a unary operator: `not` always yields `bool`; `neg`
/// preserves the operand's type.
pub fn unop_result_type(file: &str, line: u32, name: &str, operand: &Type) -> Result<Type> {
    match name {
        "not" => Ok(Type::bool()),
        "neg" => Ok(operand.clone()),
        _ => Err(CompileError::new(
            CompileErrorKind::BadCall,
            file,
            line,
            String::new(),
            vec![name.to_owned()],
        )),
    }
}

/// The SPIR-V instruction for a binary arithmetic operator at a given
/// promoted result type.
pub fn binop_spirv_op(file: &str, line: u32, name: &str, result_ty: &Type) -> Result<Op> {
    let is_float = result_ty.is_float();
    let is_signed = matches!(
        result_ty.as_scalar(),
        Some(sbc_core::ty::ScalarType::Integer { is_signed: true, .. })
    ) || matches!(
        result_ty.as_vector().map(|v| v.scalar_ty),
        Some(sbc_core::ty::ScalarType::Integer { is_signed: true, .. })
    );
    Ok(match name {
        "add" => {
            if is_float {
                Op::FAdd
            } else {
                Op::IAdd
            }
        }
        "subtract" | "sub" => {
            if is_float {
                Op::FSub
            } else {
                Op::ISub
            }
        }
        "multiply" | "mul" => {
            if is_float {
                Op::FMul
            } else {
                Op::IMul
            }
        }
        "divide" | "div" | "true_divide" => {
            if is_float {
                Op::FDiv
            } else if is_signed {
                Op::SDiv
            } else {
                Op::UDiv
            }
        }
        "mod" | "modulo" | "remainder" => {
            if is_float {
                Op::FMod
            } else if is_signed {
                Op::SMod
            } else {
                Op::UMod
            }
        }
        // Boolean `and`/`or` never reach here: the front-end lowers
        // their short-circuit form to a selection + `OpPhi` instead of
        // a `co_binop` (see `sbc_frontend::lower`). Only the explicit
        // bitwise names name a binop.
        "bitwise_and" => Op::BitwiseAnd,
        "bitwise_or" => Op::BitwiseOr,
        "bitwise_xor" | "xor" => Op::BitwiseXor,
        "lshift" | "shl" => Op::ShiftLeftLogical,
        "rshift" | "shr" => {
            if is_signed {
                Op::ShiftRightArithmetic
            } else {
                Op::ShiftRightLogical
            }
        }
        _ => {
            return Err(CompileError::new(
                CompileErrorKind::BadCall,
                file,
                line,
                String::new(),
                vec![name.to_owned()],
            ))
        }
    })
}

/// The SPIR-V comparison instruction for `name`, selected by the
/// *operand* type (promotion has already happened by the time this is
/// called; `operand_ty` is the promoted operand type, not the `bool`
/// result type).
pub fn compare_spirv_op(file: &str, line: u32, name: &str, operand_ty: &Type) -> Result<Op> {
    let is_float = operand_ty.is_float();
    let is_signed = matches!(
        operand_ty.as_scalar(),
        Some(sbc_core::ty::ScalarType::Integer { is_signed: true, .. })
    ) || matches!(
        operand_ty.as_vector().map(|v| v.scalar_ty),
        Some(sbc_core::ty::ScalarType::Integer { is_signed: true, .. })
    );
    Ok(match name {
        "eq" | "equal" => {
            if is_float {
                Op::FOrdEqual
            } else {
                Op::IEqual
            }
        }
        "ne" | "not_equal" => {
            if is_float {
                Op::FOrdNotEqual
            } else {
                Op::INotEqual
            }
        }
        "lt" | "less" => {
            if is_float {
                Op::FOrdLessThan
            } else if is_signed {
                Op::SLessThan
            } else {
                Op::ULessThan
            }
        }
        "le" | "less_equal" => {
            if is_float {
                Op::FOrdLessThanEqual
            } else if is_signed {
                Op::SLessThanEqual
            } else {
                Op::ULessThanEqual
            }
        }
        "gt" | "greater" => {
            if is_float {
                Op::FOrdGreaterThan
            } else if is_signed {
                Op::SGreaterThan
            } else {
                Op::UGreaterThan
            }
        }
        "ge" | "greater_equal" => {
            if is_float {
                Op::FOrdGreaterThanEqual
            } else if is_signed {
                Op::SGreaterThanEqual
            } else {
                Op::UGreaterThanEqual
            }
        }
        _ => {
            return Err(CompileError::new(
                CompileErrorKind::BadCall,
                file,
                line,
                String::new(),
                vec![name.to_owned()],
            ))
        }
    })
}

/// The SPIR-V instruction for a unary operator.
pub fn unop_spirv_op(name: &str, operand_ty: &Type) -> Op {
    match name {
        "not" => Op::LogicalNot,
        _ if operand_ty.is_float() => Op::FNegate,
        _ => Op::SNegate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_picks_float_or_int_opcode() {
        assert_eq!(
            binop_spirv_op("f", 0, "add", &Type::f32()).unwrap(),
            Op::FAdd
        );
        assert_eq!(binop_spirv_op("f", 0, "add", &Type::i32()).unwrap(), Op::IAdd);
    }

    #[test]
    fn lt_picks_signed_unsigned_or_float_variant() {
        assert_eq!(
            compare_spirv_op("f", 0, "lt", &Type::i32()).unwrap(),
            Op::SLessThan
        );
        assert_eq!(
            compare_spirv_op("f", 0, "lt", &Type::u32()).unwrap(),
            Op::ULessThan
        );
        assert_eq!(
            compare_spirv_op("f", 0, "lt", &Type::f32()).unwrap(),
            Op::FOrdLessThan
        );
    }

    #[test]
    fn unknown_binop_name_is_bad_call() {
        let err = binop_spirv_op("f", 0, "frobnicate", &Type::f32()).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::BadCall);
    }
}
