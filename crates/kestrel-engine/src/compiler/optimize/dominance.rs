//! Dominator tree and dominance frontiers
//!
//! Iterative algorithm of Cooper, Harvey and Kennedy over the reverse
//! postorder. Only blocks reachable from the entry take part.

use crate::compiler::ir::{BasicBlockId, IrFunction};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: BasicBlockId,
    /// Immediate dominator of every reachable block except the entry
    idom: FxHashMap<BasicBlockId, BasicBlockId>,
    children: FxHashMap<BasicBlockId, Vec<BasicBlockId>>,
    rpo: Vec<BasicBlockId>,
}

impl DominatorTree {
    pub fn compute(func: &IrFunction) -> Self {
        let rpo = func.reverse_postorder();
        let index: FxHashMap<BasicBlockId, usize> =
            rpo.iter().enumerate().map(|(i, b)| (*b, i)).collect();
        let preds = func.predecessors();
        let entry = func.entry_block;

        let mut idom: FxHashMap<BasicBlockId, BasicBlockId> = FxHashMap::default();
        idom.insert(entry, entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<BasicBlockId> = None;
                for pred in preds.get(&block).into_iter().flatten() {
                    if !idom.contains_key(pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => *pred,
                        Some(current) => intersect(&idom, &index, *pred, current),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom.get(&block) != Some(&new_idom) {
                        idom.insert(block, new_idom);
                        changed = true;
                    }
                }
            }
        }
        idom.remove(&entry);

        let mut children: FxHashMap<BasicBlockId, Vec<BasicBlockId>> = FxHashMap::default();
        for &block in &rpo {
            if let Some(parent) = idom.get(&block) {
                children.entry(*parent).or_default().push(block);
            }
        }

        Self {
            entry,
            idom,
            children,
            rpo,
        }
    }

    pub fn entry(&self) -> BasicBlockId {
        self.entry
    }

    pub fn idom(&self, block: BasicBlockId) -> Option<BasicBlockId> {
        self.idom.get(&block).copied()
    }

    pub fn children(&self, block: BasicBlockId) -> &[BasicBlockId] {
        self.children.get(&block).map_or(&[], |c| c.as_slice())
    }

    pub fn is_reachable(&self, block: BasicBlockId) -> bool {
        block == self.entry || self.idom.contains_key(&block)
    }

    /// Reachable blocks in reverse postorder
    pub fn reverse_postorder(&self) -> &[BasicBlockId] {
        &self.rpo
    }

    /// Whether `a` dominates `b` (every block dominates itself)
    pub fn dominates(&self, a: BasicBlockId, b: BasicBlockId) -> bool {
        let mut cursor = Some(b);
        while let Some(block) = cursor {
            if block == a {
                return true;
            }
            cursor = self.idom(block);
        }
        false
    }

    /// Blocks in dominator-tree preorder
    pub fn preorder(&self) -> Vec<BasicBlockId> {
        let mut order = Vec::with_capacity(self.rpo.len());
        let mut stack = vec![self.entry];
        while let Some(block) = stack.pop() {
            order.push(block);
            stack.extend(self.children(block).iter().rev());
        }
        order
    }

    /// Dominance frontier of every reachable block
    pub fn frontiers(&self, func: &IrFunction) -> FxHashMap<BasicBlockId, FxHashSet<BasicBlockId>> {
        let preds = func.predecessors();
        let mut frontiers: FxHashMap<BasicBlockId, FxHashSet<BasicBlockId>> = FxHashMap::default();
        for &block in &self.rpo {
            let block_preds: Vec<BasicBlockId> = preds
                .get(&block)
                .into_iter()
                .flatten()
                .copied()
                .filter(|p| self.is_reachable(*p))
                .collect();
            if block_preds.len() < 2 {
                continue;
            }
            let stop = self.idom(block);
            for pred in block_preds {
                let mut runner = Some(pred);
                while let Some(r) = runner {
                    if Some(r) == stop {
                        break;
                    }
                    frontiers.entry(r).or_default().insert(block);
                    runner = self.idom(r);
                }
            }
        }
        frontiers
    }
}

fn intersect(
    idom: &FxHashMap<BasicBlockId, BasicBlockId>,
    index: &FxHashMap<BasicBlockId, usize>,
    mut a: BasicBlockId,
    mut b: BasicBlockId,
) -> BasicBlockId {
    while a != b {
        while index[&a] > index[&b] {
            a = idom[&a];
        }
        while index[&b] > index[&a] {
            b = idom[&b];
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{BasicBlock, IrConstant, IrInstr, IrType, Terminator};

    /// entry -> (left | right) -> join
    fn diamond() -> IrFunction {
        let mut func = IrFunction::new("diamond", 0);
        let cond = func.alloc_register(IrType::BOOLEAN);
        let ids: Vec<BasicBlockId> = (0..4).map(|_| func.alloc_block_id()).collect();
        let mut entry = BasicBlock::new(ids[0]);
        entry.add_instr(IrInstr::Const {
            dest: cond,
            value: IrConstant::Bool(true),
        });
        entry.set_terminator(Terminator::Branch {
            cond,
            then_block: ids[1],
            else_block: ids[2],
        });
        let mut left = BasicBlock::new(ids[1]);
        left.set_terminator(Terminator::Jump(ids[3]));
        let mut right = BasicBlock::new(ids[2]);
        right.set_terminator(Terminator::Jump(ids[3]));
        let mut join = BasicBlock::new(ids[3]);
        join.set_terminator(Terminator::Return(cond));
        for block in [entry, left, right, join] {
            func.add_block(block);
        }
        func
    }

    #[test]
    fn test_diamond_idoms() {
        let func = diamond();
        let tree = DominatorTree::compute(&func);
        assert_eq!(tree.idom(BasicBlockId(1)), Some(BasicBlockId(0)));
        assert_eq!(tree.idom(BasicBlockId(2)), Some(BasicBlockId(0)));
        assert_eq!(tree.idom(BasicBlockId(3)), Some(BasicBlockId(0)));
        assert!(tree.dominates(BasicBlockId(0), BasicBlockId(3)));
        assert!(!tree.dominates(BasicBlockId(1), BasicBlockId(3)));
        assert_eq!(tree.preorder()[0], BasicBlockId(0));
    }

    #[test]
    fn test_diamond_frontiers() {
        let func = diamond();
        let tree = DominatorTree::compute(&func);
        let df = tree.frontiers(&func);
        assert!(df[&BasicBlockId(1)].contains(&BasicBlockId(3)));
        assert!(df[&BasicBlockId(2)].contains(&BasicBlockId(3)));
        assert!(!df.contains_key(&BasicBlockId(0)));
    }

    #[test]
    fn test_unreachable_block_is_ignored() {
        let mut func = diamond();
        let mut dead = BasicBlock::new(BasicBlockId(9));
        dead.set_terminator(Terminator::Jump(BasicBlockId(3)));
        func.add_block(dead);
        let tree = DominatorTree::compute(&func);
        assert!(!tree.is_reachable(BasicBlockId(9)));
        assert_eq!(tree.idom(BasicBlockId(3)), Some(BasicBlockId(0)));
    }
}
