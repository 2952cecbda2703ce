//! Control-flow graph simplification
//!
//! - Branches on a known condition become jumps
//! - Blocks unreachable from the entry are deleted
//! - Jumps through empty blocks are threaded to their destination
//! - A block that is the only predecessor of its jump target absorbs it
//!
//! Phi operands are pruned whenever an edge disappears so that every phi
//! keeps exactly one entry per predecessor.

use super::{for_each_function, OptPass};
use crate::compiler::ir::{
    BasicBlockId, IrConstant, IrFunction, IrInstr, IrModule, IrType, Register, RegisterId, Terminator,
};
use rustc_hash::{FxHashMap, FxHashSet};

pub struct SimplifyCfg;

impl OptPass for SimplifyCfg {
    fn name(&self) -> &str {
        "SimplifyCFG"
    }

    fn run(&self, module: &mut IrModule) -> bool {
        for_each_function(module, simplify_cfg)
    }
}

fn simplify_cfg(func: &mut IrFunction) -> bool {
    if func.is_empty() {
        return false;
    }
    let mut changed = fold_branches(func);
    loop {
        let mut round = remove_unreachable(func);
        round |= thread_empty_blocks(func);
        round |= merge_blocks(func);
        if !round {
            break;
        }
        changed = true;
    }
    changed
}

// ============================================================================
// Branch folding
// ============================================================================

fn truthiness(reg: &Register, constants: &FxHashMap<RegisterId, IrConstant>) -> Option<bool> {
    if let Some(c) = constants.get(&reg.id) {
        return Some(c.is_truthy());
    }
    if reg.ty.is_none() {
        None
    } else if reg.ty.is_subset_of(IrType::NULLISH) {
        Some(false)
    } else if reg.ty.is_object() {
        Some(true)
    } else {
        None
    }
}

fn nullness(reg: &Register, constants: &FxHashMap<RegisterId, IrConstant>) -> Option<bool> {
    if let Some(c) = constants.get(&reg.id) {
        return Some(c.is_nullish());
    }
    if reg.ty.is_none() {
        None
    } else if reg.ty.is_subset_of(IrType::NULLISH) {
        Some(true)
    } else if !reg.ty.can_be(IrType::NULLISH) {
        Some(false)
    } else {
        None
    }
}

fn fold_branches(func: &mut IrFunction) -> bool {
    let constants: FxHashMap<RegisterId, IrConstant> = func
        .instructions()
        .filter_map(|i| match i {
            IrInstr::Const { dest, value } => Some((dest.id, value.clone())),
            _ => None,
        })
        .collect();

    let mut changed = false;
    for block in func.blocks_mut() {
        let target = match &block.terminator {
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => {
                if then_block == else_block {
                    Some(*then_block)
                } else {
                    truthiness(cond, &constants).map(|t| if t { *then_block } else { *else_block })
                }
            }
            Terminator::BranchIfNull {
                value,
                null_block,
                not_null_block,
            } => nullness(value, &constants).map(|n| if n { *null_block } else { *not_null_block }),
            _ => None,
        };
        if let Some(target) = target {
            block.terminator = Terminator::Jump(target);
            changed = true;
        }
    }
    if changed {
        prune_phis(func);
    }
    changed
}

// ============================================================================
// Reachability
// ============================================================================

/// Drop phi entries for blocks that are no longer predecessors
fn prune_phis(func: &mut IrFunction) {
    let preds = func.predecessors();
    for block in func.blocks_mut() {
        let Some(block_preds) = preds.get(&block.id) else {
            continue;
        };
        for instr in &mut block.instructions {
            if let IrInstr::Phi { sources, .. } = instr {
                sources.retain(|(pred, _)| block_preds.contains(pred));
            }
        }
    }
}

fn remove_unreachable(func: &mut IrFunction) -> bool {
    let reachable: FxHashSet<BasicBlockId> = func.reverse_postorder().into_iter().collect();
    if reachable.len() == func.block_count() {
        return false;
    }
    func.retain_blocks(|b| reachable.contains(&b.id));
    prune_phis(func);
    true
}

// ============================================================================
// Threading and merging
// ============================================================================

fn thread_empty_blocks(func: &mut IrFunction) -> bool {
    let entry = func.entry_block;
    let candidates: Vec<(BasicBlockId, BasicBlockId)> = func
        .blocks()
        .filter(|b| b.id != entry && b.instructions.is_empty())
        .filter_map(|b| match b.terminator {
            Terminator::Jump(target) if target != b.id => Some((b.id, target)),
            _ => None,
        })
        .collect();

    let mut changed = false;
    for (empty, target) in candidates {
        let preds = func.predecessors();
        let empty_preds = preds.get(&empty).cloned().unwrap_or_default();
        if empty_preds.is_empty() || empty_preds.contains(&target) {
            continue;
        }
        let target_preds = preds.get(&target).cloned().unwrap_or_default();
        let target_has_phis = func
            .get_block(target)
            .map_or(false, |b| b.phis().next().is_some());
        // A predecessor already feeding the target would need two phi values
        if target_has_phis && empty_preds.iter().any(|p| target_preds.contains(p)) {
            continue;
        }

        for pred in &empty_preds {
            if let Some(block) = func.get_block_mut(*pred) {
                block.terminator.replace_successor(empty, target);
            }
        }
        if let Some(block) = func.get_block_mut(target) {
            for instr in &mut block.instructions {
                if let IrInstr::Phi { sources, .. } = instr {
                    let Some(pos) = sources.iter().position(|(p, _)| *p == empty) else {
                        continue;
                    };
                    let (_, value) = sources.remove(pos);
                    sources.extend(empty_preds.iter().map(|p| (*p, value)));
                }
            }
        }
        changed = true;
    }
    changed
}

fn merge_blocks(func: &mut IrFunction) -> bool {
    let mut changed = false;
    while let Some((pred, succ)) = find_mergeable(func) {
        let Some(absorbed) = func.get_block(succ).cloned() else {
            break;
        };
        func.retain_blocks(|b| b.id != succ);

        let mut moved = Vec::with_capacity(absorbed.instructions.len());
        for instr in absorbed.instructions {
            match instr {
                // Single predecessor: the phi is a copy
                IrInstr::Phi { dest, sources } => {
                    if let Some((_, src)) = sources.first() {
                        moved.push(IrInstr::Move { dest, src: *src });
                    }
                }
                other => moved.push(other),
            }
        }
        let successors = absorbed.terminator.successors();
        if let Some(block) = func.get_block_mut(pred) {
            block.instructions.extend(moved);
            block.terminator = absorbed.terminator;
        }
        for next in successors {
            if let Some(block) = func.get_block_mut(next) {
                for instr in &mut block.instructions {
                    if let IrInstr::Phi { sources, .. } = instr {
                        for (p, _) in sources.iter_mut() {
                            if *p == succ {
                                *p = pred;
                            }
                        }
                    }
                }
            }
        }
        changed = true;
    }
    changed
}

fn find_mergeable(func: &IrFunction) -> Option<(BasicBlockId, BasicBlockId)> {
    let preds = func.predecessors();
    func.blocks().find_map(|block| {
        let Terminator::Jump(succ) = block.terminator else {
            return None;
        };
        let single_pred = preds.get(&succ).map_or(false, |p| p.as_slice() == [block.id]);
        (succ != block.id && succ != func.entry_block && single_pred).then_some((block.id, succ))
    })
}
