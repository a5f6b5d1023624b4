//! The front-end lowerer: walks a [`SourceTrace`] against a declared
//! [`Signature`] and emits SBC (§4.3). SBC is itself a stack machine,
//! so almost every source stack opcode has a direct SBC counterpart;
//! the real work is (a) resolving names against the signature/locals/
//! stdlib/type-name universe, (b) recognizing the handful of
//! structured control-flow shapes the restricted dialect allows and
//! emitting their `co_select_merge`/`co_loop_merge` forms instead of
//! raw jumps, and (c) recognizing the tuple pack/unpack window.
//!
//! Every local the source program assigns (not just resources) is
//! given a SPIR-V `Function`-storage variable by the back-end, loaded
//! and stored through rather than tracked as an SSA value; this is
//! what lets an `if`/`else` or a loop body reassign a name without the
//! front-end needing to reconcile divergent bindings with its own
//! `OpPhi` construction (which would amount to doing the back-end's
//! job twice). The one place this crate still needs a merge value is
//! an anonymous ternary/short-circuit result, which the back-end
//! detects from stack-depth growth across both arms rather than from
//! anything the front-end has to flag.
use fnv::{FnvHashSet, FnvHashMap};

use sbc_core::error::{CompileError, CompileErrorKind, Result};
use sbc_core::locator::{IoKind, Signature};
use sbc_sbc::{Opcode, Operand, SbcOp};

use crate::source::{SourceInstr, SourceOp, SourceTrace};

/// Closed set of type names the name resolver accepts bare (so
/// `vec3(...)`, `f32(x)` etc. resolve as constructor calls rather than
/// `UnresolvedName`).
const TYPE_NAMES: &[&str] = &[
    "bool", "i32", "u32", "f32", "vec2", "vec3", "vec4", "ivec2", "ivec3", "ivec4", "uvec2",
    "uvec3", "uvec4", "mat2", "mat3", "mat4",
];

/// Terminator opcodes: an SBC basic block may end in at most one of
/// these, and nothing may follow it before the next `co_label`.
fn is_terminator(op: &SbcOp) -> bool {
    matches!(
        op.op,
        Opcode::Return | Opcode::Break | Opcode::Continue | Opcode::Branch | Opcode::BranchConditional
    )
}

#[derive(Clone, Debug)]
enum StackSlot {
    /// A value known to have come from a resolved name (so further
    /// attribute/subscript chains off it can be tracked for
    /// diagnostics and stdlib-call recognition).
    Name(String),
    /// A tuple of `n` values just constructed by `BuildTuple`, still
    /// awaiting destructuring.
    Tuple(usize),
    /// Any other, unnamed intermediate.
    Tmp,
}

struct LoopScope {
    continue_label: String,
    merge_label: String,
}

pub struct Lowerer<'a> {
    signature: &'a Signature,
    trace: &'a SourceTrace,
    /// Parameters whose attribute accesses are method calls rather than
    /// field loads (`texture`/`sampler` resources: `tex.sample(...)`,
    /// `tex.read(...)`, `tex.write(...)`), keyed by parameter name.
    resource_kinds: FnvHashMap<String, IoKind>,
    locals: FnvHashSet<String>,
    stack: Vec<StackSlot>,
    loops: Vec<LoopScope>,
    out: Vec<SbcOp>,
    last_lineno: Option<u32>,
    label_counter: u32,
    /// Set by a `range(...)` call immediately consumed by the
    /// following `GetIter`; names the three hidden locals holding
    /// (counter, stop, step).
    pending_range_vars: Option<(String, String, String)>,
}

/// Lower a source bytecode trace into an SBC program for the given
/// signature (§4.3).
pub fn lower(signature: &Signature, trace: &SourceTrace) -> Result<Vec<SbcOp>> {
    let mut locals = FnvHashSet::default();
    let mut resource_kinds = FnvHashMap::default();
    for param in signature {
        locals.insert(param.name.clone());
        if matches!(param.iokind, IoKind::Texture | IoKind::Sampler) {
            resource_kinds.insert(param.name.clone(), param.iokind);
        }
    }
    let mut lowerer = Lowerer {
        signature,
        trace,
        resource_kinds,
        locals,
        stack: Vec::new(),
        loops: Vec::new(),
        out: Vec::new(),
        last_lineno: None,
        label_counter: 0,
        pending_range_vars: None,
    };
    lowerer.emit_prologue();
    lowerer.lower_range(0, trace.instrs.len())?;
    lowerer.out.push(SbcOp::new(Opcode::FuncEnd, vec![]));
    Ok(lowerer.out)
}

impl<'a> Lowerer<'a> {
    fn emit_prologue(&mut self) {
        self.out.push(SbcOp::new(
            Opcode::SrcFilename,
            vec![Operand::str(self.trace.filename.clone())],
        ));
        self.out.push(SbcOp::new(Opcode::Entrypoint, vec![]));
        for param in self.signature {
            self.out.push(SbcOp::new(
                Opcode::Resource,
                vec![
                    Operand::name(param.name.clone()),
                    Operand::name(param.iokind.to_string()),
                    Operand::str(param.slot.to_string()),
                    Operand::str(param.ty.to_string()),
                ],
            ));
        }
    }

    fn fresh_label(&mut self, prefix: &str) -> String {
        let label = format!("{}{}", prefix, self.label_counter);
        self.label_counter += 1;
        label
    }

    fn mark_line(&mut self, lineno: u32) {
        if self.last_lineno != Some(lineno) {
            self.out
                .push(SbcOp::new(Opcode::SrcLinenr, vec![Operand::int(lineno as i64)]));
            self.last_lineno = Some(lineno);
        }
    }

    fn current_source_line(&self, lineno: u32) -> String {
        self.trace
            .source_line(lineno)
            .map(str::trim_end)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| format!("<line {}>", lineno))
    }

    fn err(&self, kind: CompileErrorKind, instr: &SourceInstr, vars: Vec<String>) -> CompileError {
        CompileError::new(
            kind,
            self.trace.filename.clone(),
            instr.lineno,
            self.current_source_line(instr.lineno),
            vars,
        )
    }

    fn err_at(&self, idx: usize, kind: CompileErrorKind) -> CompileError {
        let idx = idx.min(self.trace.instrs.len().saturating_sub(1));
        let instr = &self.trace.instrs[idx];
        CompileError::new(
            kind,
            self.trace.filename.clone(),
            instr.lineno,
            self.current_source_line(instr.lineno),
            vec![],
        )
    }

    fn resolve_name(&self, instr: &SourceInstr, name: &str) -> Result<()> {
        if self.locals.contains(name)
            || name == "stdlib"
            || name == "range"
            || TYPE_NAMES.contains(&name)
        {
            return Ok(());
        }
        Err(self.err(
            CompileErrorKind::UnresolvedName,
            instr,
            vec![name.to_owned()],
        ))
    }

    /// Emits an unconditional branch to `label` unless the block
    /// already ends in a terminator (so two adjacent structured
    /// constructs don't produce an instruction after a terminator).
    fn terminate_block_with_branch(&mut self, label: &str) {
        let already_terminated = self.out.last().map(is_terminator).unwrap_or(false);
        if !already_terminated {
            self.out
                .push(SbcOp::new(Opcode::Branch, vec![Operand::name(label.to_owned())]));
        }
    }

    /// Walk a contiguous instruction range, recognizing structured
    /// control-flow shapes as they're encountered. `end` is exclusive.
    fn lower_range(&mut self, start: usize, end: usize) -> Result<()> {
        let mut i = start;
        while i < end {
            let instr = self.trace.instrs[i].clone();
            self.mark_line(instr.lineno);
            match instr.op {
                SourceOp::PopJumpIfFalse => {
                    i = self.lower_if(i, end)?;
                }
                SourceOp::SetupLoop => {
                    i = self.lower_while(i, end)?;
                }
                SourceOp::GetIter => {
                    i = self.lower_for(i, end)?;
                }
                SourceOp::JumpAbsolute => {
                    // The only use of a backward jump in this dialect is
                    // a loop's own back-edge, which the loop scaffolds
                    // above already emit explicitly.
                    i += 1;
                }
                SourceOp::JumpIfFalseOrPop => {
                    i = self.lower_short_circuit(i, end, false)?;
                }
                SourceOp::JumpIfTrueOrPop => {
                    i = self.lower_short_circuit(i, end, true)?;
                }
                SourceOp::PopJumpIfTrue | SourceOp::JumpForward | SourceOp::ForIter | SourceOp::ExtendedArg => {
                    return Err(self.err(CompileErrorKind::UnsupportedFeature, &instr, vec![]));
                }
                _ => {
                    self.lower_simple(&instr)?;
                    i += 1;
                }
            }
        }
        Ok(())
    }

    /// Lowers every non-control-flow opcode: loads, stores, arithmetic,
    /// calls, tuple packing.
    fn lower_simple(&mut self, instr: &SourceInstr) -> Result<()> {
        match instr.op {
            SourceOp::LoadFast => {
                let name = instr.arg_name.clone().unwrap_or_default();
                self.resolve_name(instr, &name)?;
                self.out
                    .push(SbcOp::new(Opcode::LoadName, vec![Operand::name(name.clone())]));
                self.stack.push(StackSlot::Name(name));
            }
            SourceOp::LoadConst => {
                let lit = instr
                    .literal
                    .clone()
                    .ok_or_else(|| self.err(CompileErrorKind::Internal, instr, vec![]))?;
                self.out.push(SbcOp::new(Opcode::LoadConstant, vec![lit]));
                self.stack.push(StackSlot::Tmp);
            }
            SourceOp::LoadGlobal => {
                let name = instr.arg_name.clone().unwrap_or_default();
                self.resolve_name(instr, &name)?;
                // `stdlib`, `range` and bare type names are pure path
                // prefixes; no SBC is emitted until they're called or
                // used to construct a value.
                self.stack.push(StackSlot::Name(name));
            }
            SourceOp::LoadAttr => {
                let attr = instr.arg_name.clone().unwrap_or_default();
                let base = self.stack.pop();
                match base {
                    Some(StackSlot::Name(ref base_name))
                        if base_name == "stdlib"
                            || TYPE_NAMES.contains(&base_name.as_str())
                            || self.resource_kinds.contains_key(base_name) =>
                    {
                        self.stack
                            .push(StackSlot::Name(format!("{}.{}", base_name, attr)));
                    }
                    _ => {
                        self.out
                            .push(SbcOp::new(Opcode::LoadAttr, vec![Operand::name(attr)]));
                        self.stack.push(StackSlot::Tmp);
                    }
                }
            }
            SourceOp::StoreAttr => {
                let attr = instr.arg_name.clone().unwrap_or_default();
                self.stack.pop(); // base
                self.stack.pop(); // value
                self.out
                    .push(SbcOp::new(Opcode::StoreAttr, vec![Operand::name(attr)]));
            }
            SourceOp::LoadSubscr => {
                self.stack.pop(); // index
                self.stack.pop(); // base
                self.out.push(SbcOp::new(Opcode::LoadIndex, vec![]));
                self.stack.push(StackSlot::Tmp);
            }
            SourceOp::StoreSubscr => {
                self.stack.pop(); // index
                self.stack.pop(); // base
                self.stack.pop(); // value
                self.out.push(SbcOp::new(Opcode::StoreIndex, vec![]));
            }
            SourceOp::StoreFast => {
                let name = instr.arg_name.clone().unwrap_or_default();
                if let Some(StackSlot::Tuple(n)) = self.stack.pop() {
                    return Err(self.err(
                        CompileErrorKind::UnsupportedTupleUse,
                        instr,
                        vec![name, format!("tuple of {}", n)],
                    ));
                }
                self.locals.insert(name.clone());
                self.out
                    .push(SbcOp::new(Opcode::StoreName, vec![Operand::name(name)]));
            }
            SourceOp::BuildTuple => {
                let n = instr.arg as usize;
                for _ in 0..n {
                    self.stack.pop();
                }
                self.stack.push(StackSlot::Tuple(n));
            }
            SourceOp::UnpackSequence => {
                let n = instr.arg as usize;
                match self.stack.pop() {
                    Some(StackSlot::Tuple(m)) if m == n => {}
                    _ => return Err(self.err(CompileErrorKind::UnsupportedTupleUse, instr, vec![])),
                }
                // The match_tuple_window caller advances `i` itself;
                // lower_simple is only reached from lower_range's
                // default arm for opcodes that consume exactly one
                // index, so tuple-window scanning happens in
                // lower_range directly. See lower_range's dispatch.
                unreachable!("UnpackSequence is handled in lower_range, not lower_simple")
            }
            SourceOp::DupTop => {
                self.out.push(SbcOp::new(Opcode::DupTop, vec![]));
                self.stack.push(StackSlot::Tmp);
            }
            SourceOp::PopTop => {
                self.stack.pop();
                self.out.push(SbcOp::new(Opcode::PopTop, vec![]));
            }
            SourceOp::RotTwo | SourceOp::RotThree | SourceOp::RotFour => {
                let n = match instr.op {
                    SourceOp::RotTwo => 2,
                    SourceOp::RotThree => 3,
                    _ => 4,
                };
                self.out
                    .push(SbcOp::new(Opcode::Rotate, vec![Operand::int(n)]));
            }
            SourceOp::BinaryOp => {
                self.stack.pop();
                self.stack.pop();
                let name = instr.arg_name.clone().unwrap_or_default();
                self.out
                    .push(SbcOp::new(Opcode::Binop, vec![Operand::name(name)]));
                self.stack.push(StackSlot::Tmp);
            }
            SourceOp::CompareOp => {
                self.stack.pop();
                self.stack.pop();
                let name = instr.arg_name.clone().unwrap_or_default();
                self.out
                    .push(SbcOp::new(Opcode::Compare, vec![Operand::name(name)]));
                self.stack.push(StackSlot::Tmp);
            }
            SourceOp::UnaryOp => {
                self.stack.pop();
                let name = instr.arg_name.clone().unwrap_or_default();
                self.out
                    .push(SbcOp::new(Opcode::Unop, vec![Operand::name(name)]));
                self.stack.push(StackSlot::Tmp);
            }
            SourceOp::CallFunction => self.lower_call(instr)?,
            SourceOp::ReturnValue => {
                let has_value = self.stack.pop().is_some();
                self.out.push(SbcOp::new(
                    Opcode::Return,
                    if has_value {
                        vec![]
                    } else {
                        vec![Operand::name("void")]
                    },
                ));
            }
            SourceOp::Break => {
                let scope = self
                    .loops
                    .last()
                    .ok_or_else(|| self.err(CompileErrorKind::UnsupportedFeature, instr, vec![]))?;
                self.out.push(SbcOp::new(
                    Opcode::Break,
                    vec![Operand::name(scope.merge_label.clone())],
                ));
            }
            SourceOp::Continue => {
                let scope = self
                    .loops
                    .last()
                    .ok_or_else(|| self.err(CompileErrorKind::UnsupportedFeature, instr, vec![]))?;
                self.out.push(SbcOp::new(
                    Opcode::Continue,
                    vec![Operand::name(scope.continue_label.clone())],
                ));
            }
            _ => {
                return Err(self.err(CompileErrorKind::UnsupportedFeature, instr, vec![]));
            }
        }
        Ok(())
    }

    fn lower_call(&mut self, instr: &SourceInstr) -> Result<()> {
        let argc = instr.arg as usize;
        for _ in 0..argc {
            self.stack.pop();
        }
        let callee_name = match self.stack.pop() {
            Some(StackSlot::Name(name)) => name,
            _ => return Err(self.err(CompileErrorKind::BadCall, instr, vec![])),
        };
        if callee_name == "range" {
            self.synth_range_args(argc);
            return Ok(());
        }
        if let Some(builtin) = callee_name.strip_prefix("stdlib.") {
            self.out.push(SbcOp::new(
                Opcode::CallBuiltin,
                vec![Operand::name(builtin.to_owned()), Operand::int(argc as i64)],
            ));
        } else if callee_name
            .split_once('.')
            .is_some_and(|(base, _)| self.resource_kinds.contains_key(base))
        {
            // Texture/sampler method call (`tex.sample(...)`, keeps the
            // resource name so the back-end knows which variable to
            // operate on; `tex` is also passed as the call's implicit
            // first operand via the dotted name itself).
            self.out.push(SbcOp::new(
                Opcode::CallBuiltin,
                vec![Operand::name(callee_name), Operand::int(argc as i64)],
            ));
        } else if TYPE_NAMES.contains(&callee_name.as_str()) {
            self.out.push(SbcOp::new(
                Opcode::CallBuiltin,
                vec![Operand::name(callee_name), Operand::int(argc as i64)],
            ));
        } else {
            self.out.push(SbcOp::new(
                Opcode::Call,
                vec![Operand::name(callee_name), Operand::int(argc as i64)],
            ));
        }
        self.stack.push(StackSlot::Tmp);
        Ok(())
    }

    /// Drains `range(...)`'s 1-3 already-evaluated arguments (sitting on
    /// top of the runtime stack in `(start[, stop[, step]])` order, the
    /// last one pushed on top) into three hidden locals, synthesizing
    /// whichever of `start`/`step` Python's call form left implicit.
    /// Recorded in [`Lowerer::pending_range_vars`] for the `GetIter`
    /// that must immediately follow.
    fn synth_range_args(&mut self, argc: usize) {
        let id = self.label_counter;
        self.label_counter += 1;
        let counter = format!("__for_counter_{}", id);
        let stop = format!("__for_stop_{}", id);
        let step = format!("__for_step_{}", id);

        if argc == 3 {
            self.store_local(&step);
            self.store_local(&stop);
            self.store_local(&counter);
        } else if argc == 2 {
            self.out
                .push(SbcOp::new(Opcode::LoadConstant, vec![Operand::int(1)]));
            self.store_local(&step);
            self.store_local(&stop);
            self.store_local(&counter);
        } else {
            self.out
                .push(SbcOp::new(Opcode::LoadConstant, vec![Operand::int(1)]));
            self.store_local(&step);
            self.store_local(&stop);
            self.out
                .push(SbcOp::new(Opcode::LoadConstant, vec![Operand::int(0)]));
            self.store_local(&counter);
        }
        self.pending_range_vars = Some((counter, stop, step));
    }

    fn store_local(&mut self, name: &str) {
        self.locals.insert(name.to_owned());
        self.out
            .push(SbcOp::new(Opcode::StoreName, vec![Operand::name(name.to_owned())]));
    }
    fn load_local(&mut self, name: &str) {
        self.out
            .push(SbcOp::new(Opcode::LoadName, vec![Operand::name(name.to_owned())]));
    }

    /// Matches the tuple unpack window starting right after
    /// `UnpackSequence(n)`: either `n` consecutive `StoreFast`s (the
    /// direct encoding), or a `RotTwo`/`RotThree`/`RotFour` prefix
    /// reordering the top of stack before the stores (the rotate-four
    /// encoding), or a run that elides an unused element behind a bare
    /// `PopTop` (the dead-store-elision encoding). Returns the store
    /// targets in left-to-right tuple order and the index just past the
    /// window.
    fn match_tuple_window(&self, n: usize, start: usize) -> Result<(Vec<Option<String>>, usize)> {
        let mut targets: Vec<Option<String>> = Vec::with_capacity(n);
        let mut i = start;
        while targets.len() < n {
            let instr = self
                .trace
                .instrs
                .get(i)
                .ok_or_else(|| self.err_at(i.saturating_sub(1), CompileErrorKind::UnsupportedTupleUse))?;
            match instr.op {
                SourceOp::RotTwo | SourceOp::RotThree | SourceOp::RotFour => {
                    i += 1;
                }
                SourceOp::StoreFast => {
                    targets.push(instr.arg_name.clone());
                    i += 1;
                }
                SourceOp::PopTop => {
                    targets.push(None);
                    i += 1;
                }
                _ => return Err(self.err_at(i, CompileErrorKind::UnsupportedTupleUse)),
            }
        }
        Ok((targets, i))
    }

    /// Lowers `if`/`elif .../else` (§4.5 scenario S2) and the ternary
    /// form (both branches leave a value on the stack). `i` points at
    /// the `PopJumpIfFalse`; returns the index just past the whole
    /// chain, including any `else`/`elif` arms.
    fn lower_if(&mut self, i: usize, end: usize) -> Result<usize> {
        // `UnpackSequence` is dispatched here too since it needs to
        // consume a variable-length window of following instructions,
        // which `lower_simple`'s per-instruction shape can't express.
        if matches!(self.trace.instrs[i].op, SourceOp::UnpackSequence) {
            return self.lower_unpack(i);
        }

        let instr = self.trace.instrs[i].clone();
        self.stack.pop(); // the condition
        let false_target = instr.arg as usize;

        let else_present = false_target > 0
            && matches!(
                self.trace.instrs.get(false_target - 1).map(|i| i.op),
                Some(SourceOp::JumpForward)
            );
        let merge_target = if else_present {
            self.trace.instrs[false_target - 1].arg as usize
        } else {
            false_target
        };

        let true_label = self.fresh_label("if_true");
        let else_label = self.fresh_label("if_else");
        let merge_label = self.fresh_label("if_merge");

        self.out.push(SbcOp::new(
            Opcode::SelectMerge,
            vec![Operand::name(merge_label.clone())],
        ));
        self.out.push(SbcOp::new(
            Opcode::BranchConditional,
            vec![Operand::name(true_label.clone()), Operand::name(else_label.clone())],
        ));

        self.out
            .push(SbcOp::new(Opcode::Label, vec![Operand::name(true_label)]));
        let depth_before = self.stack.len();
        self.lower_range(i + 1, if else_present { false_target - 1 } else { false_target })?;
        let true_depth_after = self.stack.len();
        self.terminate_block_with_branch(&merge_label);

        self.out
            .push(SbcOp::new(Opcode::Label, vec![Operand::name(else_label)]));
        if else_present {
            self.lower_range(false_target, merge_target)?;
        }
        let false_depth_after = self.stack.len();
        self.terminate_block_with_branch(&merge_label);

        self.out
            .push(SbcOp::new(Opcode::Label, vec![Operand::name(merge_label)]));

        // Ternary: both arms grew the stack by exactly one value; keep
        // the merged value as a single Tmp for the enclosing context.
        if true_depth_after == depth_before + 1 && false_depth_after == depth_before + 1 {
            self.stack.truncate(depth_before);
            self.stack.push(StackSlot::Tmp);
        } else {
            self.stack.truncate(depth_before);
        }

        Ok(merge_target.max(i + 1).min(end))
    }

    /// Lowers `and`/`or`'s short-circuit form (`JUMP_IF_FALSE_OR_POP`/
    /// `JUMP_IF_TRUE_OR_POP`): the left operand is already on the stack
    /// at `i`; stash it behind a hidden local so it can be reloaded both
    /// as the branch condition and, unconsumed, as the short-circuit
    /// arm's contribution to the merge `OpPhi` — the same selection
    /// shape `lower_if`'s ternary case produces, just with the "then"
    /// arm being "keep the left operand" instead of a nested expression.
    /// `is_or` is `true` for `JUMP_IF_TRUE_OR_POP` (`or`, short-circuits
    /// on truthy), `false` for `JUMP_IF_FALSE_OR_POP` (`and`,
    /// short-circuits on falsy).
    fn lower_short_circuit(&mut self, i: usize, end: usize, is_or: bool) -> Result<usize> {
        let instr = self.trace.instrs[i].clone();
        let merge_target = instr.arg as usize;

        self.stack.pop();
        let id = self.label_counter;
        self.label_counter += 1;
        let tmp = format!("__logic_tmp_{}", id);
        self.store_local(&tmp);
        self.load_local(&tmp);

        let short_label = self.fresh_label("logic_short");
        let eval_label = self.fresh_label("logic_eval");
        let merge_label = self.fresh_label("logic_merge");

        self.out.push(SbcOp::new(
            Opcode::SelectMerge,
            vec![Operand::name(merge_label.clone())],
        ));
        let (true_label, false_label) = if is_or {
            (short_label.clone(), eval_label.clone())
        } else {
            (eval_label.clone(), short_label.clone())
        };
        self.out.push(SbcOp::new(
            Opcode::BranchConditional,
            vec![Operand::name(true_label), Operand::name(false_label)],
        ));

        let depth_before = self.stack.len();

        self.out
            .push(SbcOp::new(Opcode::Label, vec![Operand::name(short_label)]));
        self.load_local(&tmp);
        self.stack.push(StackSlot::Tmp);
        self.terminate_block_with_branch(&merge_label);

        self.out
            .push(SbcOp::new(Opcode::Label, vec![Operand::name(eval_label)]));
        self.stack.truncate(depth_before);
        self.lower_range(i + 1, merge_target)?;
        self.terminate_block_with_branch(&merge_label);

        self.out
            .push(SbcOp::new(Opcode::Label, vec![Operand::name(merge_label)]));
        self.stack.truncate(depth_before);
        self.stack.push(StackSlot::Tmp);

        Ok(merge_target.max(i + 1).min(end))
    }

    fn lower_unpack(&mut self, i: usize) -> Result<usize> {
        let instr = &self.trace.instrs[i];
        let n = instr.arg as usize;
        match self.stack.pop() {
            Some(StackSlot::Tuple(m)) if m == n => {}
            _ => return Err(self.err(CompileErrorKind::UnsupportedTupleUse, instr, vec![])),
        }
        let (targets, next_i) = self.match_tuple_window(n, i + 1)?;
        for target in targets {
            if let Some(name) = target {
                self.locals.insert(name.clone());
                self.out
                    .push(SbcOp::new(Opcode::StoreName, vec![Operand::name(name)]));
            } else {
                self.out.push(SbcOp::new(Opcode::PopTop, vec![]));
            }
        }
        Ok(next_i)
    }

    /// Lowers `while cond`/`while True` (§4.5 scenarios S4-S5): a
    /// header block evaluating the condition, a conditional branch to
    /// the body or the merge, a body, and a back-edge to the header
    /// (which doubles as `continue`'s target).
    fn lower_while(&mut self, i: usize, end: usize) -> Result<usize> {
        let merge_target = self.trace.instrs[i].arg as usize;

        // Find the condition-exit test: the PopJumpIfFalse whose
        // target is this loop's merge point. Everything between the
        // header and it is the (straight-line) condition expression.
        let mut cond_end = i + 1;
        while !(matches!(self.trace.instrs[cond_end].op, SourceOp::PopJumpIfFalse)
            && self.trace.instrs[cond_end].arg as usize == merge_target)
        {
            cond_end += 1;
            if cond_end >= end {
                return Err(self.err_at(i, CompileErrorKind::UnsupportedFeature));
            }
        }

        let header_label = self.fresh_label("while_header");
        let body_label = self.fresh_label("while_body");
        let merge_label = self.fresh_label("while_merge");

        self.terminate_block_with_branch(&header_label);
        self.out
            .push(SbcOp::new(Opcode::Label, vec![Operand::name(header_label.clone())]));

        for idx in (i + 1)..cond_end {
            let instr = self.trace.instrs[idx].clone();
            self.mark_line(instr.lineno);
            self.lower_simple(&instr)?;
        }
        self.stack.pop(); // the condition value

        self.out.push(SbcOp::new(
            Opcode::LoopMerge,
            vec![
                Operand::name(merge_label.clone()),
                Operand::name(header_label.clone()),
            ],
        ));
        self.out.push(SbcOp::new(
            Opcode::BranchConditional,
            vec![Operand::name(body_label.clone()), Operand::name(merge_label.clone())],
        ));
        self.out
            .push(SbcOp::new(Opcode::Label, vec![Operand::name(body_label)]));

        self.loops.push(LoopScope {
            continue_label: header_label.clone(),
            merge_label: merge_label.clone(),
        });
        self.lower_range(cond_end + 1, merge_target)?;
        self.loops.pop();

        self.terminate_block_with_branch(&header_label);
        self.out
            .push(SbcOp::new(Opcode::Label, vec![Operand::name(merge_label)]));
        Ok(merge_target)
    }

    /// Lowers `for i in range(a[, b[, c]])` (§4.5 scenarios S3-S5) as a
    /// counter variable with a header block testing `counter < stop`,
    /// a body, and a continue block incrementing the counter by `step`.
    fn lower_for(&mut self, i: usize, end: usize) -> Result<usize> {
        let (counter, stop, step) = self
            .pending_range_vars
            .take()
            .ok_or_else(|| self.err_at(i, CompileErrorKind::UnsupportedFeature))?;

        let for_iter_idx = i + 1;
        let for_iter = self
            .trace
            .instrs
            .get(for_iter_idx)
            .filter(|instr| matches!(instr.op, SourceOp::ForIter))
            .ok_or_else(|| self.err_at(i, CompileErrorKind::UnsupportedFeature))?;
        let merge_target = for_iter.arg as usize;

        let store_idx = for_iter_idx + 1;
        let loop_var = self
            .trace
            .instrs
            .get(store_idx)
            .filter(|instr| matches!(instr.op, SourceOp::StoreFast))
            .and_then(|instr| instr.arg_name.clone())
            .ok_or_else(|| self.err_at(for_iter_idx, CompileErrorKind::UnsupportedFeature))?;

        let header_label = self.fresh_label("for_header");
        let body_label = self.fresh_label("for_body");
        let continue_label = self.fresh_label("for_continue");
        let merge_label = self.fresh_label("for_merge");

        self.terminate_block_with_branch(&header_label);
        self.out
            .push(SbcOp::new(Opcode::Label, vec![Operand::name(header_label.clone())]));
        self.load_local(&counter);
        self.load_local(&stop);
        self.out
            .push(SbcOp::new(Opcode::Compare, vec![Operand::name("lt")]));
        self.out.push(SbcOp::new(
            Opcode::LoopMerge,
            vec![
                Operand::name(merge_label.clone()),
                Operand::name(continue_label.clone()),
            ],
        ));
        self.out.push(SbcOp::new(
            Opcode::BranchConditional,
            vec![Operand::name(body_label.clone()), Operand::name(merge_label.clone())],
        ));
        self.out
            .push(SbcOp::new(Opcode::Label, vec![Operand::name(body_label)]));
        self.load_local(&counter);
        self.locals.insert(loop_var.clone());
        self.out
            .push(SbcOp::new(Opcode::StoreName, vec![Operand::name(loop_var)]));

        self.loops.push(LoopScope {
            continue_label: continue_label.clone(),
            merge_label: merge_label.clone(),
        });
        self.lower_range(store_idx + 1, merge_target.min(end))?;
        self.loops.pop();

        self.terminate_block_with_branch(&continue_label);
        self.out
            .push(SbcOp::new(Opcode::Label, vec![Operand::name(continue_label)]));
        self.load_local(&counter);
        self.load_local(&step);
        self.out
            .push(SbcOp::new(Opcode::Binop, vec![Operand::name("add")]));
        self.store_local(&counter);
        self.terminate_block_with_branch(&header_label);
        self.out
            .push(SbcOp::new(Opcode::Label, vec![Operand::name(merge_label)]));
        Ok(merge_target)
    }
}
