//! Interprocedural passes
//!
//! FunctionAnalysis finds the closures whose every use is a direct call,
//! resolves those calls to their `FunctionId` and marks the functions that
//! never escape. Inlining and FuncSigOpts build on those results.

use super::OptPass;
use crate::compiler::ir::{
    FunctionId, IrConstant, IrFunction, IrInstr, IrModule, IrType, Register, RegisterId, Terminator,
};
use rustc_hash::{FxHashMap, FxHashSet};

/// Largest callee body, in instructions, that gets inlined
const INLINE_LIMIT: usize = 24;

// ============================================================================
// FunctionAnalysis
// ============================================================================

pub struct FunctionAnalysis;

impl OptPass for FunctionAnalysis {
    fn name(&self) -> &str {
        "FunctionAnalysis"
    }

    fn run(&self, module: &mut IrModule) -> bool {
        let count = module.functions.len();
        let mut created = vec![false; count];
        let mut escapes = vec![false; count];
        let mut changed = false;

        for func in &mut module.functions {
            let closures = closure_registers(func);
            for f in closures.values() {
                created[f.0 as usize] = true;
            }
            for f in escaping_closures(func, &closures) {
                escapes[f.0 as usize] = true;
            }
            for block in func.blocks_mut() {
                for instr in &mut block.instructions {
                    if let IrInstr::Call { callee, target, .. } = instr {
                        let known = closures.get(&callee.id).copied();
                        if known.is_some() && *target != known {
                            *target = known;
                            changed = true;
                        }
                    }
                }
            }
        }

        for (idx, func) in module.functions.iter_mut().enumerate() {
            // The top-level function is called by the host
            let escapes = idx == 0 || !created[idx] || escapes[idx];
            if func.escapes != escapes {
                func.escapes = escapes;
                changed = true;
            }
        }
        changed
    }
}

/// Registers holding a closure created in this function, through copies
fn closure_registers(func: &IrFunction) -> FxHashMap<RegisterId, FunctionId> {
    let mut closures: FxHashMap<RegisterId, FunctionId> = FxHashMap::default();
    for instr in func.instructions() {
        if let IrInstr::CreateFunction { dest, function } = instr {
            closures.insert(dest.id, *function);
        }
    }
    loop {
        let mut grew = false;
        for instr in func.instructions() {
            if let IrInstr::Move { dest, src } = instr {
                if let Some(f) = closures.get(&src.id).copied() {
                    if closures.insert(dest.id, f).is_none() {
                        grew = true;
                    }
                }
            }
        }
        if !grew {
            break;
        }
    }
    closures
}

/// Closures used as anything other than the callee of a call
fn escaping_closures(func: &IrFunction, closures: &FxHashMap<RegisterId, FunctionId>) -> FxHashSet<FunctionId> {
    let mut escaping = FxHashSet::default();
    let mut mark = |reg: &Register| {
        if let Some(f) = closures.get(&reg.id) {
            escaping.insert(*f);
        }
    };
    for block in func.blocks() {
        for instr in &block.instructions {
            match instr {
                IrInstr::Call { this, args, .. } => {
                    mark(this);
                    args.iter().for_each(&mut mark);
                }
                IrInstr::Move { .. } => {}
                other => other.visit_operands(&mut mark),
            }
        }
        match &block.terminator {
            Terminator::Branch { .. } | Terminator::BranchIfNull { .. } => {}
            term => {
                if let Some(reg) = term.operand() {
                    mark(&reg);
                }
            }
        }
    }
    escaping
}

// ============================================================================
// Inlining
// ============================================================================

/// Inlines small straight-line callees at call sites resolved by
/// FunctionAnalysis
pub struct Inlining;

impl OptPass for Inlining {
    fn name(&self) -> &str {
        "Inlining"
    }

    fn run(&self, module: &mut IrModule) -> bool {
        let candidates: FxHashMap<FunctionId, IrFunction> = module
            .functions
            .iter()
            .enumerate()
            .filter(|(_, f)| is_inlinable(f))
            .map(|(idx, f)| (FunctionId(idx as u32), f.clone()))
            .collect();
        if candidates.is_empty() {
            return false;
        }

        let mut changed = false;
        for (idx, func) in module.functions.iter_mut().enumerate() {
            let caller = FunctionId(idx as u32);
            changed |= inline_calls(func, caller, &candidates);
        }
        changed
    }
}

fn is_inlinable(func: &IrFunction) -> bool {
    if func.is_generator || func.block_count() != 1 {
        return false;
    }
    let Some(entry) = func.entry() else {
        return false;
    };
    if !matches!(entry.terminator, Terminator::Return(_)) || entry.len() > INLINE_LIMIT {
        return false;
    }
    let mut defined: FxHashSet<RegisterId> = FxHashSet::default();
    for instr in &entry.instructions {
        let allowed = match instr {
            IrInstr::LoadParam { index: 0, .. } => func.strict,
            IrInstr::Const { .. }
            | IrInstr::Move { .. }
            | IrInstr::LoadParam { .. }
            | IrInstr::BinaryOp { .. }
            | IrInstr::UnaryOp { .. }
            | IrInstr::AsNumeric { .. }
            | IrInstr::LoadGlobal { .. }
            | IrInstr::StoreGlobal { .. }
            | IrInstr::AllocObject { .. }
            | IrInstr::AllocObjectLiteral { .. }
            | IrInstr::AllocArray { .. }
            | IrInstr::StoreOwnProperty { .. }
            | IrInstr::StoreNewOwnProperty { .. }
            | IrInstr::LoadProperty { .. }
            | IrInstr::StoreProperty { .. }
            | IrInstr::DeleteProperty { .. }
            | IrInstr::Call { .. }
            | IrInstr::CallBuiltin { .. }
            | IrInstr::GetBuiltinClosure { .. }
            | IrInstr::FastArrayLoad { .. }
            | IrInstr::FastArrayStore { .. }
            | IrInstr::FastArrayLength { .. } => true,
            _ => false,
        };
        if !allowed {
            return false;
        }
        let mut self_contained = true;
        instr.visit_operands(|r| self_contained &= defined.contains(&r.id));
        if !self_contained {
            return false;
        }
        if let Some(dest) = instr.dest() {
            defined.insert(dest.id);
        }
    }
    entry
        .terminator
        .operand()
        .map_or(false, |r| defined.contains(&r.id))
}

fn inline_calls(func: &mut IrFunction, caller: FunctionId, candidates: &FxHashMap<FunctionId, IrFunction>) -> bool {
    let mut changed = false;
    let block_ids: Vec<_> = func.block_ids().collect();
    for block_id in block_ids {
        let Some(block) = func.get_block(block_id) else {
            continue;
        };
        let original = block.instructions.clone();
        let mut rewritten = Vec::with_capacity(original.len());
        let mut inlined_here = false;
        for instr in original {
            let IrInstr::Call {
                dest,
                this,
                ref args,
                target: Some(target),
                ..
            } = instr
            else {
                rewritten.push(instr);
                continue;
            };
            let Some(callee) = candidates.get(&target).filter(|_| target != caller) else {
                rewritten.push(instr);
                continue;
            };
            log::trace!("inlining {} into {}", callee.name, func.name);
            rewritten.extend(expand_call(func, callee, dest, this, args));
            inlined_here = true;
        }
        if inlined_here {
            if let Some(block) = func.get_block_mut(block_id) {
                block.instructions = rewritten;
            }
            changed = true;
        }
    }
    changed
}

/// The callee body with fresh registers, parameters bound to the call's
/// operands, ending in a copy of the returned value into `dest`
fn expand_call(func: &mut IrFunction, callee: &IrFunction, dest: Register, this: Register, args: &[Register]) -> Vec<IrInstr> {
    let mut out = Vec::new();
    let mut map: FxHashMap<RegisterId, Register> = FxHashMap::default();
    let mut undefined: Option<Register> = None;
    let Some(entry) = callee.entry() else {
        return out;
    };

    for instr in &entry.instructions {
        let mut copy = instr.clone();
        copy.visit_operands_mut(|r| {
            if let Some(mapped) = map.get(&r.id) {
                *r = *mapped;
            }
        });
        if let Some(old) = copy.dest() {
            let fresh = func.alloc_register(old.ty);
            map.insert(old.id, fresh);
            if let Some(d) = copy.dest_mut() {
                *d = fresh;
            }
        }
        if let IrInstr::LoadParam { dest: param_dest, index } = copy {
            let src = match index {
                0 => this,
                i => match args.get(i as usize - 1) {
                    Some(arg) => *arg,
                    None => *undefined.get_or_insert_with(|| {
                        let reg = func.alloc_register(IrType::UNDEFINED);
                        out.push(IrInstr::Const {
                            dest: reg,
                            value: IrConstant::Undefined,
                        });
                        reg
                    }),
                },
            };
            out.push(IrInstr::Move { dest: param_dest, src });
            continue;
        }
        out.push(copy);
    }
    if let Some(ret) = entry.terminator.operand() {
        let src = map.get(&ret.id).copied().unwrap_or(ret);
        out.push(IrInstr::Move { dest, src });
    }
    out
}

// ============================================================================
// FuncSigOpts
// ============================================================================

/// For functions whose call sites are all known: parameters that receive
/// the same constant everywhere become that constant inside the callee,
/// and trailing arguments the callee never reads are dropped from the calls
pub struct FuncSigOpts;

impl OptPass for FuncSigOpts {
    fn name(&self) -> &str {
        "FuncSigOpts"
    }

    fn run(&self, module: &mut IrModule) -> bool {
        // Constant argument per (callee, param index); None once two sites disagree
        let mut constant_args: FxHashMap<FunctionId, Vec<Option<IrConstant>>> = FxHashMap::default();
        for func in module.functions() {
            let constants: FxHashMap<RegisterId, &IrConstant> = func
                .instructions()
                .filter_map(|i| match i {
                    IrInstr::Const { dest, value } => Some((dest.id, value)),
                    _ => None,
                })
                .collect();
            for instr in func.instructions() {
                let IrInstr::Call {
                    args,
                    target: Some(target),
                    ..
                } = instr
                else {
                    continue;
                };
                let Some(callee) = module.get_function(*target) else {
                    continue;
                };
                if callee.escapes || callee.is_generator {
                    continue;
                }
                let site: Vec<Option<IrConstant>> = (0..callee.param_count as usize)
                    .map(|i| match args.get(i) {
                        Some(arg) => constants.get(&arg.id).map(|c| (*c).clone()),
                        None => Some(IrConstant::Undefined),
                    })
                    .collect();
                match constant_args.get_mut(target) {
                    None => {
                        constant_args.insert(*target, site);
                    }
                    Some(seen) => {
                        for (prev, now) in seen.iter_mut().zip(site) {
                            if !same_constant(prev.as_ref(), now.as_ref()) {
                                *prev = None;
                            }
                        }
                    }
                }
            }
        }

        let mut changed = false;
        let mut keep_args: FxHashMap<FunctionId, usize> = FxHashMap::default();
        for (target, consts) in &constant_args {
            let Some(callee) = module.get_function_mut(*target) else {
                continue;
            };
            for block in callee.blocks_mut() {
                for instr in &mut block.instructions {
                    if let IrInstr::LoadParam { dest, index } = instr {
                        let param = *index as usize;
                        if param == 0 {
                            continue;
                        }
                        if let Some(Some(value)) = consts.get(param - 1) {
                            let mut dest = *dest;
                            dest.ty = value.ty();
                            *instr = IrInstr::Const {
                                dest,
                                value: value.clone(),
                            };
                            changed = true;
                        }
                    }
                }
            }
            if let Some(needed) = arguments_needed(callee) {
                keep_args.insert(*target, needed);
            }
        }

        for func in &mut module.functions {
            for block in func.blocks_mut() {
                for instr in &mut block.instructions {
                    if let IrInstr::Call {
                        args,
                        target: Some(target),
                        ..
                    } = instr
                    {
                        if let Some(&needed) = keep_args.get(target) {
                            if args.len() > needed {
                                args.truncate(needed);
                                changed = true;
                            }
                        }
                    }
                }
            }
        }
        changed
    }
}

/// SameValue on constants: `-0` and `+0` differ, NaN matches itself
fn same_constant(a: Option<&IrConstant>, b: Option<&IrConstant>) -> bool {
    match (a, b) {
        (Some(IrConstant::Number(x)), Some(IrConstant::Number(y))) => x.to_bits() == y.to_bits() || (x.is_nan() && y.is_nan()),
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// How many leading arguments the function can observe; `None` when it
/// can see all of them (`arguments`, direct eval)
fn arguments_needed(func: &IrFunction) -> Option<usize> {
    let mut needed = 0;
    for instr in func.instructions() {
        match instr {
            IrInstr::CreateArguments { .. } | IrInstr::DirectEval { .. } => return None,
            IrInstr::LoadParam { index, .. } if *index > 0 => needed = needed.max(*index as usize),
            _ => {}
        }
    }
    Some(needed)
}
