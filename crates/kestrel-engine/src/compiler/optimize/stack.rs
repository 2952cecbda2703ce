//! Promotion of stack slots to SSA registers

use super::dominance::DominatorTree;
use super::types::retype_registers;
use super::{for_each_function, replace_uses, OptPass};
use crate::compiler::ir::{
    BasicBlockId, IrConstant, IrFunction, IrInstr, IrModule, IrType, Register, RegisterId, StackSlotId,
    Terminator,
};
use rustc_hash::{FxHashMap, FxHashSet};

/// Where each slot is touched
#[derive(Default)]
struct SlotUses {
    stores: Vec<BasicBlockId>,
    loads: Vec<BasicBlockId>,
    /// Used by `ResumeGenerator`; never promoted
    pinned: bool,
}

fn collect_slot_uses(func: &IrFunction) -> FxHashMap<StackSlotId, SlotUses> {
    let mut uses: FxHashMap<StackSlotId, SlotUses> = FxHashMap::default();
    for block in func.blocks() {
        for instr in &block.instructions {
            match instr {
                IrInstr::AllocStack { slot } => {
                    uses.entry(*slot).or_default();
                }
                IrInstr::StoreStack { slot, .. } => uses.entry(*slot).or_default().stores.push(block.id),
                IrInstr::LoadStack { slot, .. } => uses.entry(*slot).or_default().loads.push(block.id),
                IrInstr::ResumeGenerator { is_return, .. } => uses.entry(*is_return).or_default().pinned = true,
                _ => {}
            }
        }
    }
    uses
}

/// Remove every load, store and declaration of the given slots
fn strip_slots(func: &mut IrFunction, slots: &FxHashSet<StackSlotId>) {
    for block in func.blocks_mut() {
        block.instructions.retain(|instr| match instr {
            IrInstr::AllocStack { slot } | IrInstr::StoreStack { slot, .. } | IrInstr::LoadStack { slot, .. } => {
                !slots.contains(slot)
            }
            _ => true,
        });
    }
}

// ============================================================================
// SimpleStackPromotion
// ============================================================================

/// Cheap promotion that needs no phis:
///
/// - a slot whose loads and stores all sit in one block is forwarded store
///   to load inside that block
/// - a slot stored exactly once has every dominated load replaced by the
///   stored value
pub struct SimpleStackPromotion;

impl OptPass for SimpleStackPromotion {
    fn name(&self) -> &str {
        "SimpleStackPromotion"
    }

    fn run(&self, module: &mut IrModule) -> bool {
        for_each_function(module, promote_simple)
    }
}

fn promote_simple(func: &mut IrFunction) -> bool {
    let uses = collect_slot_uses(func);
    if uses.is_empty() {
        return false;
    }
    let tree = DominatorTree::compute(func);
    let mut subs: FxHashMap<RegisterId, Register> = FxHashMap::default();
    let mut promoted: FxHashSet<StackSlotId> = FxHashSet::default();

    for (slot, slot_uses) in &uses {
        if slot_uses.pinned {
            continue;
        }
        let mut blocks: FxHashSet<BasicBlockId> = slot_uses.stores.iter().copied().collect();
        blocks.extend(slot_uses.loads.iter().copied());

        let forwarded = if blocks.len() == 1 {
            blocks.iter().next().and_then(|b| forward_in_block(func, *b, *slot))
        } else if slot_uses.stores.len() == 1 {
            forward_single_store(func, &tree, slot_uses.stores[0], *slot)
        } else {
            None
        };
        if let Some(replacements) = forwarded {
            subs.extend(replacements);
            promoted.insert(*slot);
        }
    }

    if promoted.is_empty() {
        return false;
    }
    strip_slots(func, &promoted);
    replace_uses(func, &subs);
    true
}

/// Forward stores to loads within `block`; `None` if a load comes first
fn forward_in_block(func: &IrFunction, block: BasicBlockId, slot: StackSlotId) -> Option<Vec<(RegisterId, Register)>> {
    let mut current: Option<Register> = None;
    let mut replacements = Vec::new();
    for instr in &func.get_block(block)?.instructions {
        match instr {
            IrInstr::StoreStack { slot: s, value } if *s == slot => current = Some(*value),
            IrInstr::LoadStack { dest, slot: s } if *s == slot => replacements.push((dest.id, current?)),
            _ => {}
        }
    }
    Some(replacements)
}

/// Replace the loads of a slot stored once, provided the store dominates them all
fn forward_single_store(
    func: &IrFunction,
    tree: &DominatorTree,
    store_block: BasicBlockId,
    slot: StackSlotId,
) -> Option<Vec<(RegisterId, Register)>> {
    let mut value: Option<Register> = None;
    let mut loads = Vec::new();
    for block in func.blocks() {
        let same_block = block.id == store_block;
        if !same_block && !block.instructions.iter().any(|i| matches!(i, IrInstr::LoadStack { slot: s, .. } if *s == slot)) {
            continue;
        }
        if !same_block && !(tree.is_reachable(block.id) && tree.dominates(store_block, block.id)) {
            return None;
        }
        let mut stored_here = !same_block;
        for instr in &block.instructions {
            match instr {
                IrInstr::StoreStack { slot: s, value: v } if *s == slot => {
                    value = Some(*v);
                    stored_here = true;
                }
                IrInstr::LoadStack { dest, slot: s } if *s == slot => {
                    if !stored_here {
                        return None;
                    }
                    loads.push(dest.id);
                }
                _ => {}
            }
        }
    }
    let value = value?;
    Some(loads.into_iter().map(|id| (id, value)).collect())
}

// ============================================================================
// Mem2Reg
// ============================================================================

/// Full SSA construction for stack slots: phis at the iterated dominance
/// frontier of the stores, then renaming along the dominator tree.
///
/// Generators keep their slots (their frames are saved and restored around
/// every yield), and so do functions with try regions, whose exception edges
/// are not part of the CFG.
pub struct Mem2Reg;

impl OptPass for Mem2Reg {
    fn name(&self) -> &str {
        "Mem2Reg"
    }

    fn run(&self, module: &mut IrModule) -> bool {
        for_each_function(module, mem2reg)
    }
}

struct Renamer {
    /// Phi placed for (block, slot), by dest register
    phis: FxHashMap<(BasicBlockId, StackSlotId), Register>,
    phi_sources: FxHashMap<RegisterId, Vec<(BasicBlockId, Register)>>,
    stacks: FxHashMap<StackSlotId, Vec<Register>>,
    subs: FxHashMap<RegisterId, Register>,
    undefined: Register,
    undefined_used: bool,
}

impl Renamer {
    fn current(&mut self, slot: StackSlotId) -> Register {
        match self.stacks.get(&slot).and_then(|s| s.last()) {
            Some(reg) => *reg,
            None => {
                self.undefined_used = true;
                self.undefined
            }
        }
    }

    fn rename(&mut self, func: &IrFunction, tree: &DominatorTree, block_id: BasicBlockId, slots: &FxHashSet<StackSlotId>) {
        let Some(block) = func.get_block(block_id) else {
            return;
        };
        let mut pushed: Vec<StackSlotId> = Vec::new();

        for slot in slots {
            if let Some(phi) = self.phis.get(&(block_id, *slot)).copied() {
                self.stacks.entry(*slot).or_default().push(phi);
                pushed.push(*slot);
            }
        }
        for instr in &block.instructions {
            match instr {
                IrInstr::StoreStack { slot, value } if slots.contains(slot) => {
                    self.stacks.entry(*slot).or_default().push(*value);
                    pushed.push(*slot);
                }
                IrInstr::LoadStack { dest, slot } if slots.contains(slot) => {
                    let value = self.current(*slot);
                    self.subs.insert(dest.id, value);
                }
                _ => {}
            }
        }
        for succ in block.successors() {
            for slot in slots {
                if let Some(phi) = self.phis.get(&(succ, *slot)).copied() {
                    let value = self.current(*slot);
                    let sources = self.phi_sources.entry(phi.id).or_default();
                    if !sources.iter().any(|(p, _)| *p == block_id) {
                        sources.push((block_id, value));
                    }
                }
            }
        }
        for &child in tree.children(block_id) {
            self.rename(func, tree, child, slots);
        }
        for slot in pushed {
            if let Some(stack) = self.stacks.get_mut(&slot) {
                stack.pop();
            }
        }
    }
}

fn mem2reg(func: &mut IrFunction) -> bool {
    if func.is_generator
        || func
            .blocks()
            .any(|b| matches!(b.terminator, Terminator::TryStart { .. }))
    {
        return false;
    }
    let slots: FxHashSet<StackSlotId> = collect_slot_uses(func)
        .into_iter()
        .filter(|(_, uses)| !uses.pinned)
        .map(|(slot, _)| slot)
        .collect();
    if slots.is_empty() {
        return false;
    }

    let tree = DominatorTree::compute(func);
    let frontiers = tree.frontiers(func);
    let uses = collect_slot_uses(func);

    // Phi placement
    let mut phis: FxHashMap<(BasicBlockId, StackSlotId), Register> = FxHashMap::default();
    for slot in &slots {
        let mut work: Vec<BasicBlockId> = uses[slot]
            .stores
            .iter()
            .copied()
            .filter(|b| tree.is_reachable(*b))
            .collect();
        let mut placed: FxHashSet<BasicBlockId> = FxHashSet::default();
        while let Some(block) = work.pop() {
            for frontier in frontiers.get(&block).into_iter().flatten() {
                if placed.insert(*frontier) {
                    let dest = func.alloc_register(IrType::NONE);
                    phis.insert((*frontier, *slot), dest);
                    work.push(*frontier);
                }
            }
        }
    }

    let undefined = func.alloc_register(IrType::UNDEFINED);
    let mut renamer = Renamer {
        phis,
        phi_sources: FxHashMap::default(),
        stacks: FxHashMap::default(),
        subs: FxHashMap::default(),
        undefined,
        undefined_used: false,
    };
    renamer.rename(func, &tree, tree.entry(), &slots);

    // Loads in unreachable blocks never run
    for block in func.blocks() {
        if tree.is_reachable(block.id) {
            continue;
        }
        for instr in &block.instructions {
            if let IrInstr::LoadStack { dest, slot } = instr {
                if slots.contains(slot) {
                    renamer.subs.insert(dest.id, undefined);
                    renamer.undefined_used = true;
                }
            }
        }
    }

    // Insert the phis, giving unreachable predecessors `undefined`
    let preds = func.predecessors();
    let mut new_phis: Vec<RegisterId> = Vec::new();
    let mut placements: Vec<((BasicBlockId, StackSlotId), Register)> = renamer.phis.iter().map(|(k, v)| (*k, *v)).collect();
    placements.sort_by_key(|((block, slot), _)| (*block, *slot));
    for ((block_id, _), dest) in placements {
        let mut sources = renamer.phi_sources.remove(&dest.id).unwrap_or_default();
        for pred in preds.get(&block_id).into_iter().flatten() {
            if !sources.iter().any(|(p, _)| p == pred) {
                sources.push((*pred, undefined));
                renamer.undefined_used = true;
            }
        }
        if let Some(block) = func.get_block_mut(block_id) {
            block.instructions.insert(0, IrInstr::Phi { dest, sources });
            new_phis.push(dest.id);
        }
    }

    if renamer.undefined_used {
        if let Some(entry) = func.entry_mut() {
            entry.instructions.insert(
                0,
                IrInstr::Const {
                    dest: undefined,
                    value: IrConstant::Undefined,
                },
            );
        }
    }

    strip_slots(func, &slots);
    replace_uses(func, &renamer.subs);
    settle_phi_types(func, &new_phis);
    true
}

/// Give the new phis the union of their incoming types
fn settle_phi_types(func: &mut IrFunction, phis: &[RegisterId]) {
    let phi_set: FxHashSet<RegisterId> = phis.iter().copied().collect();
    let mut types: FxHashMap<RegisterId, IrType> = phis.iter().map(|id| (*id, IrType::NONE)).collect();
    let mut changed = true;
    while changed {
        changed = false;
        for instr in func.instructions() {
            let IrInstr::Phi { dest, sources } = instr else {
                continue;
            };
            if !phi_set.contains(&dest.id) {
                continue;
            }
            let ty = sources.iter().fold(IrType::NONE, |acc, (_, r)| {
                acc.union(types.get(&r.id).copied().unwrap_or(r.ty))
            });
            if types.get(&dest.id) != Some(&ty) {
                types.insert(dest.id, ty);
                changed = true;
            }
        }
    }
    retype_registers(func, &types);
}

#[cfg(test)]
mod tests {
    use super::super::testing::{count, lower, run};
    use super::*;
    use crate::ast::AstBuilder;

    fn stack_ops(func: &IrFunction) -> usize {
        count(func, |i| {
            matches!(
                i,
                IrInstr::LoadStack { .. } | IrInstr::StoreStack { .. } | IrInstr::AllocStack { .. }
            )
        })
    }

    #[test]
    fn test_simple_promotion_in_one_block() {
        let b = AstBuilder::new();
        let f = b.function(
            Some("f"),
            &[],
            vec![b.var_decl("x", Some(b.num(1.0))), b.ret(Some(b.ident("x")))],
        );
        let mut module = lower(&b.program(vec![b.expr_stmt(b.function_expr(f))]));
        run(&mut module, &["SimpleStackPromotion"]);
        let func = module.get_function_by_name("f").unwrap();
        assert_eq!(stack_ops(func), 0);
    }

    #[test]
    fn test_mem2reg_places_phi_at_join() {
        let b = AstBuilder::new();
        let f = b.function(
            Some("f"),
            &["c"],
            vec![
                b.var_decl("x", Some(b.num(1.0))),
                b.if_(b.ident("c"), b.expr_stmt(b.assign(b.ident("x"), b.num(2.0))), None),
                b.ret(Some(b.ident("x"))),
            ],
        );
        let mut module = lower(&b.program(vec![b.expr_stmt(b.function_expr(f))]));
        run(&mut module, &["Mem2Reg"]);
        let func = module.get_function_by_name("f").unwrap();
        assert_eq!(stack_ops(func), 0);
        let phi_ty = func
            .instructions()
            .find_map(|i| match i {
                IrInstr::Phi { dest, sources } if sources.len() == 2 => Some(dest.ty),
                _ => None,
            })
            .expect("phi at the join");
        assert_eq!(phi_ty, IrType::NUMBER);
    }

    #[test]
    fn test_mem2reg_skips_try_regions() {
        let b = AstBuilder::new();
        let f = b.function(
            Some("f"),
            &[],
            vec![
                b.var_decl("x", Some(b.num(1.0))),
                b.try_(
                    vec![b.expr_stmt(b.assign(b.ident("x"), b.call(b.ident("g"), vec![])))],
                    Some((None, vec![b.ret(Some(b.ident("x")))])),
                    None,
                ),
                b.ret(Some(b.ident("x"))),
            ],
        );
        let mut module = lower(&b.program(vec![b.expr_stmt(b.function_expr(f))]));
        run(&mut module, &["Mem2Reg"]);
        let func = module.get_function_by_name("f").unwrap();
        assert!(stack_ops(func) > 0);
    }

    #[test]
    fn test_single_store_dominating_loads() {
        let b = AstBuilder::new();
        let f = b.function(
            Some("f"),
            &["c"],
            vec![
                b.const_decl("k", b.num(7.0)),
                b.if_(b.ident("c"), b.ret(Some(b.ident("k"))), None),
                b.ret(Some(b.ident("k"))),
            ],
        );
        let mut module = lower(&b.program(vec![b.expr_stmt(b.function_expr(f))]));
        run(&mut module, &["SimpleStackPromotion"]);
        let func = module.get_function_by_name("f").unwrap();
        // `k` is stored twice (TDZ marker, then 7) so only the parameter slot goes
        assert!(count(func, |i| matches!(i, IrInstr::LoadStack { .. })) >= 2);
        run(&mut module, &["Mem2Reg", "InstSimplify", "DCE"]);
        let func = module.get_function_by_name("f").unwrap();
        assert_eq!(stack_ops(func), 0);
        assert_eq!(count(func, |i| matches!(i, IrInstr::ThrowIfEmpty { .. })), 0);
    }

    #[test]
    fn test_generator_slots_stay() {
        let b = AstBuilder::new();
        let g = b.generator(
            Some("g"),
            &[],
            vec![
                b.var_decl("x", Some(b.num(1.0))),
                b.if_(b.ident("c"), b.expr_stmt(b.assign(b.ident("x"), b.num(2.0))), None),
                b.expr_stmt(b.yield_(Some(b.ident("x")))),
            ],
        );
        let mut module = lower(&b.program(vec![b.expr_stmt(b.function_expr(g))]));
        run(&mut module, &["Mem2Reg"]);
        let func = module.get_function_by_name("g").unwrap();
        assert!(count(func, |i| matches!(i, IrInstr::ResumeGenerator { .. })) > 0);
        assert!(stack_ops(func) > 0);
    }
}
