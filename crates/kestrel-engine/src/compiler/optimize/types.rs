//! Type inference
//!
//! Forward dataflow over register types. Every result type is recomputed
//! from operand types; instructions the pass knows nothing about keep the
//! type lowering gave them. Parameters of functions whose call sites are
//! all known take the union of the argument types, and calls with a known
//! target take the callee's return type.

use super::OptPass;
use crate::compiler::ir::{FunctionId, IrFunction, IrInstr, IrModule, IrType, Register, RegisterId, Terminator};
use rustc_hash::FxHashMap;

/// Iteration cap; the CFG has no back edges so one or two rounds settle it
const MAX_ROUNDS: usize = 16;

pub struct TypeInference;

impl OptPass for TypeInference {
    fn name(&self) -> &str {
        "TypeInference"
    }

    fn run(&self, module: &mut IrModule) -> bool {
        let params = known_param_types(module);
        let returns: Vec<IrType> = module.functions.iter().map(|f| f.return_type).collect();
        let mut changed = false;
        for (idx, func) in module.functions.iter_mut().enumerate() {
            let id = FunctionId(idx as u32);
            changed |= infer_function(func, params.get(&id).map(Vec::as_slice), &returns);
        }
        changed
    }
}

/// Parameter types (index 0 is `this`) of non-escaping functions, from
/// every call site naming them
fn known_param_types(module: &IrModule) -> FxHashMap<FunctionId, Vec<IrType>> {
    let mut params: FxHashMap<FunctionId, Vec<IrType>> = FxHashMap::default();
    for func in module.functions() {
        for instr in func.instructions() {
            let IrInstr::Call {
                this,
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
            if callee.escapes {
                continue;
            }
            let count = callee.param_count as usize + 1;
            let entry = params.entry(*target).or_insert_with(|| vec![IrType::NONE; count]);
            entry[0] |= this.ty;
            for (i, slot) in entry.iter_mut().enumerate().skip(1) {
                *slot |= args.get(i - 1).map_or(IrType::UNDEFINED, |a| a.ty);
            }
        }
    }
    params
}

fn infer_function(func: &mut IrFunction, params: Option<&[IrType]>, returns: &[IrType]) -> bool {
    let order = func.reverse_postorder();
    let mut types: FxHashMap<RegisterId, IrType> = FxHashMap::default();

    for _ in 0..MAX_ROUNDS {
        let mut changed = false;
        for id in &order {
            let Some(block) = func.get_block(*id) else {
                continue;
            };
            for instr in &block.instructions {
                let Some(dest) = instr.dest() else {
                    continue;
                };
                let ty = result_type(instr, &types, params, returns).unwrap_or(dest.ty);
                if types.get(&dest.id) != Some(&ty) {
                    types.insert(dest.id, ty);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    let mut changed = retype_registers(func, &types);

    let return_type = if func.is_generator {
        IrType::OBJECT
    } else {
        func.blocks().fold(IrType::NONE, |acc, b| match &b.terminator {
            Terminator::Return(value) => acc | value.ty,
            _ => acc,
        })
    };
    if func.return_type != return_type {
        func.return_type = return_type;
        changed = true;
    }
    changed
}

fn result_type(
    instr: &IrInstr,
    types: &FxHashMap<RegisterId, IrType>,
    params: Option<&[IrType]>,
    returns: &[IrType],
) -> Option<IrType> {
    let ty = |r: &Register| types.get(&r.id).copied().unwrap_or(r.ty);
    let ty = match instr {
        IrInstr::Const { value, .. } => value.ty(),
        IrInstr::Move { src, .. } => ty(src),
        IrInstr::LoadParam { index, .. } => params?.get(*index as usize).copied()?,
        IrInstr::BinaryOp { op, left, right, .. } => op.result_type(ty(left), ty(right)),
        IrInstr::UnaryOp { op, .. } => op.result_type(),
        IrInstr::AsNumeric { .. } | IrInstr::FastArrayLength { .. } => IrType::NUMBER,
        IrInstr::Phi { sources, .. } => sources.iter().fold(IrType::NONE, |acc, (_, r)| acc | ty(r)),
        IrInstr::ThrowIfEmpty { value, .. } => ty(value).without_empty(),
        IrInstr::CreateFunction { .. }
        | IrInstr::CreateArguments { .. }
        | IrInstr::AllocObject { .. }
        | IrInstr::AllocObjectLiteral { .. }
        | IrInstr::AllocArray { .. }
        | IrInstr::AllocFastArray { .. }
        | IrInstr::CreateThis { .. }
        | IrInstr::GetConstructedObject { .. }
        | IrInstr::GetBuiltinClosure { .. } => IrType::OBJECT,
        IrInstr::DeleteProperty { .. } => IrType::BOOLEAN,
        IrInstr::Call {
            target: Some(target), ..
        } => returns.get(target.0 as usize).copied()?,
        _ => return None,
    };
    Some(ty)
}

/// Write inferred types onto every occurrence of the registers (definitions,
/// operands, terminators); returns whether any type changed
pub(crate) fn retype_registers(func: &mut IrFunction, types: &FxHashMap<RegisterId, IrType>) -> bool {
    if types.is_empty() {
        return false;
    }
    let mut changed = false;
    let mut apply = |reg: &mut Register| {
        if let Some(ty) = types.get(&reg.id) {
            if reg.ty != *ty {
                reg.ty = *ty;
                changed = true;
            }
        }
    };
    for block in func.blocks_mut() {
        for instr in &mut block.instructions {
            if let Some(dest) = instr.dest_mut() {
                apply(dest);
            }
            instr.visit_operands_mut(&mut apply);
        }
        if let Some(reg) = block.terminator.operand_mut() {
            apply(reg);
        }
    }
    changed
}
