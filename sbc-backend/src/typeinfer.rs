//! Type-only pre-pass (§4.5's implementation note in §9: "symbolic type
//! inference driven by operand types on the ID-stack"). SPIR-V requires
//! every `Function`-storage `OpVariable` to be the first instructions
//! of a function's entry block, before the real walk that assigns
//! storage and emits loads/stores ever reaches the statement that first
//! writes a local. This pass walks the flat SBC list once with a
//! type-only stack (no result ids, no emission) to learn each local
//! name's type ahead of time.
//!
//! Every SBC value has a statically known type by construction (§3's
//! invariant), so a single linear pass mirroring the real stack
//! discipline is sufficient; branches are not taken, both arms of a
//! selection are simply walked back to back, which is sound because
//! each arm is independently stack-balanced except for the one
//! anonymous ternary/short-circuit merge value, handled below by
//! matching `co_select_merge`'s label against the `co_label` that
//! follows both arms.
use fnv::FnvHashMap;

use sbc_core::error::{CompileError, CompileErrorKind, Result};
use sbc_core::locator::Signature;
use sbc_core::ty::{ScalarType, Type};
use sbc_sbc::{Opcode, SbcOp};

use crate::builtins::{self, Builtin};
use crate::ops::{binop_result_type, compare_result_type, unop_result_type};

/// Resolves a field/swizzle access's result type.
pub fn attr_type(file: &str, line: u32, base: &Type, attr: &str) -> Result<Type> {
    match base {
        Type::Vector(v) => swizzle_index(attr)
            .filter(|i| *i < v.scalar_count)
            .map(|_| Type::Scalar(v.scalar_ty))
            .ok_or_else(|| bad_attr(file, line, attr)),
        Type::Struct(s) => s
            .members
            .iter()
            .find(|m| m.name == attr)
            .map(|m| m.ty.clone())
            .ok_or_else(|| bad_attr(file, line, attr)),
        _ => Err(bad_attr(file, line, attr)),
    }
}

fn swizzle_index(attr: &str) -> Option<u32> {
    Some(match attr {
        "x" | "r" => 0,
        "y" | "g" => 1,
        "z" | "b" => 2,
        "w" | "a" => 3,
        _ => return None,
    })
}

fn bad_attr(file: &str, line: u32, attr: &str) -> CompileError {
    CompileError::new(
        CompileErrorKind::UnresolvedName,
        file,
        line,
        String::new(),
        vec![attr.to_owned()],
    )
}

/// Resolves a subscript access's element type.
pub fn index_elem_type(file: &str, line: u32, base: &Type) -> Result<Type> {
    match base {
        Type::Array(a) => Ok((*a.element_ty).clone()),
        Type::Vector(v) => Ok(Type::Scalar(v.scalar_ty)),
        _ => Err(CompileError::new(
            CompileErrorKind::TypeMismatch,
            file,
            line,
            String::new(),
            vec![],
        )),
    }
}

/// Literal-operand type for `co_load_constant`: an integer literal is
/// `i32`, a float literal is `f32` (the front-end never emits a typed
/// literal suffix; matching the promotion rules, a bare `bool` mixes
/// freely with either).
fn constant_type(op: &SbcOp) -> Type {
    use sbc_sbc::Operand;
    match op.operands.first() {
        Some(Operand::Float(_)) => Type::f32(),
        _ => Type::i32(),
    }
}

/// One type-only stack slot: the value's type plus, where known, the
/// source-level expression that produced it (`foo`, `index.x`, a
/// literal's own text), so a `TypeMismatch` raised here can still name
/// its operands (§4.6/§8) even though this pass never touches result
/// ids or the back-end's access-chain arena.
type Slot = (Type, Option<String>);

fn describe(slot: &Option<String>) -> String {
    slot.clone().unwrap_or_else(|| "<expr>".to_owned())
}

fn with_vars(mut err: CompileError, operands: &[&Option<String>]) -> CompileError {
    if err.vars.is_empty() {
        let vars: Vec<String> = operands.iter().map(|d| describe(d)).collect();
        if !vars.is_empty() {
            err.vars = vars;
        }
    }
    err
}

/// Runs the type-only pre-pass, returning every assigned local's type.
/// `resources` maps resource-parameter names to their declared type, so
/// that reassigning a whole resource (`out_color = ...`) does not get
/// mistaken for a new `Function`-storage local.
pub fn infer(ops: &[SbcOp], resources: &FnvHashMap<String, Type>, file: &str) -> Result<FnvHashMap<String, Type>> {
    let mut stack: Vec<Slot> = Vec::new();
    let mut known: FnvHashMap<String, Type> = resources.clone();
    let mut locals: FnvHashMap<String, Type> = FnvHashMap::default();
    let mut select_anchors: FnvHashMap<String, usize> = FnvHashMap::default();
    let mut pending_select_merge: Option<String> = None;
    let mut line = 0u32;

    for op in ops {
        match op.op {
            Opcode::SrcLinenr => {
                line = op.operands[0].as_int().unwrap_or(0) as u32;
            }
            Opcode::SrcFilename | Opcode::Entrypoint | Opcode::FuncEnd | Opcode::Resource => {}

            Opcode::LoadConstant => stack.push((constant_type(op), Some(op.operands[0].to_string()))),
            Opcode::LoadName => {
                let name = op.operands[0].as_name().unwrap_or_default();
                let ty = known.get(name).cloned().ok_or_else(|| {
                    CompileError::unresolved_name(file, line, String::new(), name)
                })?;
                stack.push((ty, Some(name.to_owned())));
            }
            Opcode::StoreName => {
                let name = op.operands[0].as_name().unwrap_or_default().to_owned();
                let (ty, _) = stack.pop().ok_or_else(|| internal(file, line, "empty stack on store"))?;
                if !resources.contains_key(&name) {
                    locals.insert(name.clone(), ty.clone());
                }
                known.insert(name, ty);
            }
            Opcode::LoadIndex => {
                let (_, index_desc) = stack.pop().ok_or_else(|| internal(file, line, "empty stack on index load"))?;
                let (base, base_desc) = stack.pop().ok_or_else(|| internal(file, line, "empty stack on index load"))?;
                let elem_ty = index_elem_type(file, line, &base)?;
                let desc = base_desc.map(|b| format!("{}[{}]", b, describe(&index_desc)));
                stack.push((elem_ty, desc));
            }
            Opcode::StoreIndex => {
                stack.pop(); // value
                stack.pop(); // index
                stack.pop(); // base
            }
            Opcode::LoadAttr => {
                let attr = op.operands[0].as_name().unwrap_or_default();
                let (base, base_desc) = stack.pop().ok_or_else(|| internal(file, line, "empty stack on attr load"))?;
                let elem_ty = attr_type(file, line, &base, attr)?;
                let desc = base_desc.map(|b| format!("{}.{}", b, attr));
                stack.push((elem_ty, desc));
            }
            Opcode::StoreAttr => {
                stack.pop(); // base
                stack.pop(); // value
            }
            Opcode::LoadGlobal => {
                return Err(CompileError::new(
                    CompileErrorKind::Internal,
                    file,
                    line,
                    "co_load_global has no resolvable type",
                    vec![],
                ));
            }
            Opcode::Call => {
                return Err(CompileError::new(CompileErrorKind::BadCall, file, line, String::new(), vec![]));
            }
            Opcode::CallBuiltin => {
                let name = op.operands[0].as_name().unwrap_or_default();
                let argc = op.operands.get(1).and_then(|o| o.as_int()).unwrap_or(0) as usize;
                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    let (ty, _) = stack.pop().ok_or_else(|| internal(file, line, "builtin call arg underflow"))?;
                    args.push(ty);
                }
                args.reverse();
                let result = match builtins::classify(name) {
                    Some(Builtin::Math(_)) => builtins::math_result_type(file, line, name, &args)?,
                    Some(Builtin::Construct) => builtins::construct_result_type(file, line, name)?,
                    Some(Builtin::Tex(resource, _)) => {
                        let tex_ty = known.get(&resource).cloned().ok_or_else(|| {
                            CompileError::unresolved_name(file, line, String::new(), resource.clone())
                        })?;
                        match tex_ty {
                            Type::Texture(t) => Type::vec(t.sampled_ty, 4),
                            _ => return Err(internal(file, line, "tex. call on a non-texture resource")),
                        }
                    }
                    None => return Err(CompileError::new(CompileErrorKind::BadCall, file, line, String::new(), vec![name.to_owned()])),
                };
                stack.push((result, None));
            }
            Opcode::Binop => {
                let (rhs, rhs_desc) = stack.pop().ok_or_else(|| internal(file, line, "binop rhs underflow"))?;
                let (lhs, lhs_desc) = stack.pop().ok_or_else(|| internal(file, line, "binop lhs underflow"))?;
                let result = binop_result_type(file, line, &lhs, &rhs)
                    .map_err(|e| with_vars(e, &[&lhs_desc, &rhs_desc]))?;
                stack.push((result, None));
            }
            Opcode::Compare => {
                let (rhs, rhs_desc) = stack.pop().ok_or_else(|| internal(file, line, "compare rhs underflow"))?;
                let (lhs, lhs_desc) = stack.pop().ok_or_else(|| internal(file, line, "compare lhs underflow"))?;
                let result = compare_result_type(file, line, &lhs, &rhs)
                    .map_err(|e| with_vars(e, &[&lhs_desc, &rhs_desc]))?;
                stack.push((result, None));
            }
            Opcode::Unop => {
                let name = op.operands[0].as_name().unwrap_or_default();
                let (operand, operand_desc) = stack.pop().ok_or_else(|| internal(file, line, "unop operand underflow"))?;
                let result = unop_result_type(file, line, name, &operand)
                    .map_err(|e| with_vars(e, &[&operand_desc]))?;
                stack.push((result, None));
            }
            Opcode::PopTop => {
                stack.pop();
            }
            Opcode::DupTop => {
                let top = stack.last().cloned().ok_or_else(|| internal(file, line, "dup on empty stack"))?;
                stack.push(top);
            }
            Opcode::Rotate => {
                let n = op.operands[0].as_int().unwrap_or(2) as usize;
                let len = stack.len();
                if n >= 2 && n <= len {
                    let slice = &mut stack[len - n..];
                    slice.rotate_right(1);
                }
            }

            Opcode::Label => {
                let name = op.operands[0].as_name().unwrap_or_default();
                if let Some(anchor) = select_anchors.remove(name) {
                    let extra = stack.len().saturating_sub(anchor);
                    if extra == 2 {
                        let merged = stack.pop().unwrap();
                        stack.pop();
                        stack.push(merged);
                    }
                }
            }
            Opcode::SelectMerge => {
                pending_select_merge = op.operands[0].as_name().map(|s| s.to_owned());
            }
            Opcode::BranchConditional => {
                stack.pop(); // condition
                if let Some(label) = pending_select_merge.take() {
                    select_anchors.insert(label, stack.len());
                }
            }
            Opcode::LoopMerge | Opcode::Branch | Opcode::Continue | Opcode::Break | Opcode::Return => {}
        }
    }

    Ok(locals)
}

fn internal(file: &str, line: u32, msg: &str) -> CompileError {
    CompileError::new(CompileErrorKind::Internal, file, line, msg, vec![])
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbc_core::locator::{IoKind, Param, Slot};
    use sbc_sbc::Operand;

    fn resources() -> FnvHashMap<String, Type> {
        let mut m = FnvHashMap::default();
        m.insert("a".to_owned(), Type::f32());
        m
    }

    #[test]
    fn infers_local_type_from_a_stored_constant() {
        let ops = vec![
            SbcOp::new(Opcode::LoadConstant, vec![Operand::float(2.0)]),
            SbcOp::new(Opcode::StoreName, vec![Operand::name("x")]),
        ];
        let locals = infer(&ops, &resources(), "shader.py").unwrap();
        assert_eq!(locals.get("x"), Some(&Type::f32()));
    }

    #[test]
    fn binop_result_type_follows_promotion() {
        let ops = vec![
            SbcOp::new(Opcode::LoadName, vec![Operand::name("a")]),
            SbcOp::new(Opcode::LoadConstant, vec![Operand::float(2.0)]),
            SbcOp::new(Opcode::Binop, vec![Operand::name("multiply")]),
            SbcOp::new(Opcode::StoreName, vec![Operand::name("y")]),
        ];
        let locals = infer(&ops, &resources(), "shader.py").unwrap();
        assert_eq!(locals.get("y"), Some(&Type::f32()));
    }

    #[test]
    fn resource_reassignment_is_not_treated_as_a_local() {
        let ops = vec![
            SbcOp::new(Opcode::LoadConstant, vec![Operand::float(1.0)]),
            SbcOp::new(Opcode::StoreName, vec![Operand::name("a")]),
        ];
        let locals = infer(&ops, &resources(), "shader.py").unwrap();
        assert!(!locals.contains_key("a"));
    }

    #[test]
    fn ternary_merge_collapses_both_arms_to_one_value() {
        let ops = vec![
            SbcOp::new(Opcode::LoadName, vec![Operand::name("a")]),
            SbcOp::new(Opcode::SelectMerge, vec![Operand::name("merge0")]),
            SbcOp::new(Opcode::BranchConditional, vec![Operand::name("t"), Operand::name("f")]),
            SbcOp::new(Opcode::Label, vec![Operand::name("t")]),
            SbcOp::new(Opcode::LoadConstant, vec![Operand::float(1.0)]),
            SbcOp::new(Opcode::Branch, vec![Operand::name("merge0")]),
            SbcOp::new(Opcode::Label, vec![Operand::name("f")]),
            SbcOp::new(Opcode::LoadConstant, vec![Operand::float(2.0)]),
            SbcOp::new(Opcode::Branch, vec![Operand::name("merge0")]),
            SbcOp::new(Opcode::Label, vec![Operand::name("merge0")]),
            SbcOp::new(Opcode::StoreName, vec![Operand::name("z")]),
        ];
        let locals = infer(&ops, &resources(), "shader.py").unwrap();
        assert_eq!(locals.get("z"), Some(&Type::f32()));
    }
}
