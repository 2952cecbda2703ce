//! Common subexpression elimination over the dominator tree
//!
//! Both passes walk the dominator tree with a scoped table: a value
//! recorded in a block is visible in every block it dominates and is
//! forgotten when the walk leaves the subtree.

use super::dominance::DominatorTree;
use super::{for_each_function, replace_uses, OptPass};
use crate::compiler::ir::{
    BasicBlockId, BinaryOp, FrameVarId, IrConstant, IrFunction, IrInstr, IrModule, IrType, Register,
    RegisterId, StackSlotId, UnaryOp,
};
use crate::compiler::scope::ScopedHashTable;
use rustc_hash::{FxHashMap, FxHashSet};

// ============================================================================
// CSE
// ============================================================================

/// Removes pure instructions recomputing a value already available in a
/// dominating block
pub struct Cse;

impl OptPass for Cse {
    fn name(&self) -> &str {
        "CSE"
    }

    fn run(&self, module: &mut IrModule) -> bool {
        for_each_function(module, eliminate_common_subexpressions)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Undefined,
    Null,
    Empty,
    Bool(bool),
    /// Bit pattern, so `-0` and `+0` stay apart
    Number(u64),
    String(String),
}

impl From<&IrConstant> for ConstKey {
    fn from(value: &IrConstant) -> Self {
        match value {
            IrConstant::Undefined => ConstKey::Undefined,
            IrConstant::Null => ConstKey::Null,
            IrConstant::Empty => ConstKey::Empty,
            IrConstant::Bool(b) => ConstKey::Bool(*b),
            IrConstant::Number(n) if n.is_nan() => ConstKey::Number(f64::NAN.to_bits()),
            IrConstant::Number(n) => ConstKey::Number(n.to_bits()),
            IrConstant::String(s) => ConstKey::String(s.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    Const(ConstKey),
    Param(u32),
    Binary(BinaryOp, RegisterId, RegisterId),
    Unary(UnaryOp, RegisterId),
    Numeric(RegisterId),
}

fn is_commutative(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::StrictEq | BinaryOp::StrictNotEq
    )
}

/// Key of a pure instruction, with operands already resolved
fn value_key(instr: &IrInstr, resolve: impl Fn(RegisterId) -> RegisterId) -> Option<ValueKey> {
    if !instr.is_pure() {
        return None;
    }
    let key = match instr {
        IrInstr::Const { value, .. } => ValueKey::Const(value.into()),
        IrInstr::LoadParam { index, .. } => ValueKey::Param(*index),
        IrInstr::BinaryOp { op, left, right, .. } => {
            let (mut l, mut r) = (resolve(left.id), resolve(right.id));
            if is_commutative(*op) && r < l {
                std::mem::swap(&mut l, &mut r);
            }
            ValueKey::Binary(*op, l, r)
        }
        IrInstr::UnaryOp { op, operand, .. } => ValueKey::Unary(*op, resolve(operand.id)),
        IrInstr::AsNumeric { value, .. } => ValueKey::Numeric(resolve(value.id)),
        _ => return None,
    };
    Some(key)
}

fn eliminate_common_subexpressions(func: &mut IrFunction) -> bool {
    if func.is_empty() {
        return false;
    }
    let tree = DominatorTree::compute(func);
    let mut table: ScopedHashTable<ValueKey, Register> = ScopedHashTable::new();
    let mut subs: FxHashMap<RegisterId, Register> = FxHashMap::default();
    number_values(func, &tree, tree.entry(), &mut table, &mut subs);
    if subs.is_empty() {
        return false;
    }

    log::trace!("{}: {} redundant values", func.name, subs.len());
    replace_uses(func, &subs);
    for block in func.blocks_mut() {
        block
            .instructions
            .retain(|i| i.dest().map_or(true, |d| !subs.contains_key(&d.id)));
    }
    true
}

fn number_values(
    func: &IrFunction,
    tree: &DominatorTree,
    block_id: BasicBlockId,
    table: &mut ScopedHashTable<ValueKey, Register>,
    subs: &mut FxHashMap<RegisterId, Register>,
) {
    let scope = table.open_scope();
    if let Some(block) = func.get_block(block_id) {
        for instr in &block.instructions {
            let resolve = |id: RegisterId| subs.get(&id).map_or(id, |r| r.id);
            let (Some(key), Some(dest)) = (value_key(instr, resolve), instr.dest()) else {
                continue;
            };
            match table.lookup(&key) {
                Some(existing) => {
                    subs.insert(dest.id, *existing);
                }
                None => table.insert(key, dest),
            }
        }
    }
    for &child in tree.children(block_id) {
        number_values(func, tree, child, table, subs);
    }
    table.close_scope(scope);
}

// ============================================================================
// TDZDedup
// ============================================================================

/// Drops TDZ checks of a binding already checked in a dominating position
///
/// Once a let/const binding has been seen initialized it cannot go back to
/// the uninitialized state, except by re-running its hoisting store, which
/// resets what is known about it.
pub struct TdzDedup;

impl OptPass for TdzDedup {
    fn name(&self) -> &str {
        "TDZDedup"
    }

    fn run(&self, module: &mut IrModule) -> bool {
        for_each_function(module, dedup_tdz_checks)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CheckedBinding {
    Slot(StackSlotId),
    Frame(FrameVarId),
    Value(RegisterId),
}

fn dedup_tdz_checks(func: &mut IrFunction) -> bool {
    if func.is_empty() {
        return false;
    }
    let mut sources: FxHashMap<RegisterId, CheckedBinding> = FxHashMap::default();
    for instr in func.instructions() {
        match instr {
            IrInstr::LoadStack { dest, slot } => {
                sources.insert(dest.id, CheckedBinding::Slot(*slot));
            }
            IrInstr::LoadFrame { dest, var } => {
                sources.insert(dest.id, CheckedBinding::Frame(*var));
            }
            _ => {}
        }
    }

    let tree = DominatorTree::compute(func);
    let mut table: ScopedHashTable<CheckedBinding, bool> = ScopedHashTable::new();
    let mut redundant: FxHashSet<RegisterId> = FxHashSet::default();
    find_redundant_checks(func, &tree, tree.entry(), &sources, &mut table, &mut redundant);
    if redundant.is_empty() {
        return false;
    }

    for block in func.blocks_mut() {
        for instr in &mut block.instructions {
            if let IrInstr::ThrowIfEmpty { dest, value } = instr {
                if redundant.contains(&dest.id) {
                    *instr = IrInstr::Move {
                        dest: *dest,
                        src: *value,
                    };
                }
            }
        }
    }
    true
}

fn find_redundant_checks(
    func: &IrFunction,
    tree: &DominatorTree,
    block_id: BasicBlockId,
    sources: &FxHashMap<RegisterId, CheckedBinding>,
    table: &mut ScopedHashTable<CheckedBinding, bool>,
    redundant: &mut FxHashSet<RegisterId>,
) {
    let scope = table.open_scope();
    if let Some(block) = func.get_block(block_id) {
        for instr in &block.instructions {
            match instr {
                IrInstr::ThrowIfEmpty { dest, value } => {
                    let key = sources
                        .get(&value.id)
                        .copied()
                        .unwrap_or(CheckedBinding::Value(value.id));
                    if table.lookup(&key) == Some(&true) {
                        redundant.insert(dest.id);
                    } else {
                        table.set_in_current_scope(key, true);
                    }
                }
                // A store that may write the empty marker starts the TDZ over
                IrInstr::StoreStack { slot, value } if value.ty.can_be(IrType::EMPTY) => {
                    table.set_in_current_scope(CheckedBinding::Slot(*slot), false);
                }
                IrInstr::StoreFrame { var, value } if value.ty.can_be(IrType::EMPTY) => {
                    table.set_in_current_scope(CheckedBinding::Frame(*var), false);
                }
                _ => {}
            }
        }
    }
    for &child in tree.children(block_id) {
        find_redundant_checks(func, tree, child, sources, table, redundant);
    }
    table.close_scope(scope);
}
