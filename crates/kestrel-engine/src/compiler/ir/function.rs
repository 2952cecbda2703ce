//! IR Functions
//!
//! Functions in the IR own their basic blocks together with the counters for
//! registers, stack slots, and frame variables allocated while lowering.

use super::block::{BasicBlock, BasicBlockId};
use super::instr::IrInstr;
use super::types::IrType;
use super::value::{FrameVarId, Register, RegisterId, StackSlotId};
use crate::ast::Span;
use rustc_hash::{FxHashMap, FxHashSet};

/// An IR function
#[derive(Debug, Clone)]
pub struct IrFunction {
    /// Function name (may be synthesized for anonymous functions)
    pub name: String,
    /// Number of declared parameters, not counting `this`
    pub param_count: u32,
    pub is_generator: bool,
    pub strict: bool,
    /// Whether the closure may be called from code the compiler cannot see.
    /// Starts out true; FunctionAnalysis clears it when every call site is known.
    pub escapes: bool,
    /// Union of the returned types, refined by TypeInference
    pub return_type: IrType,
    /// Basic blocks (in order)
    pub blocks: Vec<BasicBlock>,
    /// Entry block ID
    pub entry_block: BasicBlockId,
    /// Block lookup map for fast access
    block_map: FxHashMap<BasicBlockId, usize>,
    next_register: u32,
    next_block: u32,
    stack_slots: u32,
    /// Frame variables owned by this function (ids are module-wide)
    frame_vars: Vec<FrameVarId>,
    /// Source span covering the function definition
    pub source_span: Span,
}

impl IrFunction {
    /// Create a new function
    pub fn new(name: impl Into<String>, param_count: u32) -> Self {
        Self {
            name: name.into(),
            param_count,
            is_generator: false,
            strict: false,
            escapes: true,
            return_type: IrType::ANY,
            blocks: Vec::new(),
            entry_block: BasicBlockId(0),
            block_map: FxHashMap::default(),
            next_register: 0,
            next_block: 0,
            stack_slots: 0,
            frame_vars: Vec::new(),
            source_span: Span::default(),
        }
    }

    /// Allocate a fresh virtual register
    pub fn alloc_register(&mut self, ty: IrType) -> Register {
        let id = RegisterId::new(self.next_register);
        self.next_register += 1;
        Register::new(id, ty)
    }

    /// Allocate a block id; the block itself is added with `add_block`
    pub fn alloc_block_id(&mut self) -> BasicBlockId {
        let id = BasicBlockId(self.next_block);
        self.next_block += 1;
        id
    }

    pub fn alloc_stack_slot(&mut self) -> StackSlotId {
        let slot = StackSlotId(self.stack_slots);
        self.stack_slots += 1;
        slot
    }

    /// Record a frame variable allocated by `IrModule::alloc_frame_var`
    pub fn declare_frame_var(&mut self, var: FrameVarId) {
        self.frame_vars.push(var);
    }

    pub fn frame_vars(&self) -> &[FrameVarId] {
        &self.frame_vars
    }

    pub fn register_count(&self) -> u32 {
        self.next_register
    }

    pub fn stack_slot_count(&self) -> u32 {
        self.stack_slots
    }

    pub fn frame_var_count(&self) -> u32 {
        self.frame_vars.len() as u32
    }

    /// Add a basic block and return its ID
    pub fn add_block(&mut self, block: BasicBlock) -> BasicBlockId {
        let id = block.id;
        let index = self.blocks.len();
        self.block_map.insert(id, index);
        self.next_block = self.next_block.max(id.0 + 1);
        self.blocks.push(block);
        id
    }

    /// Get a block by ID
    pub fn get_block(&self, id: BasicBlockId) -> Option<&BasicBlock> {
        self.block_map.get(&id).map(|&idx| &self.blocks[idx])
    }

    /// Get a mutable block by ID
    pub fn get_block_mut(&mut self, id: BasicBlockId) -> Option<&mut BasicBlock> {
        self.block_map
            .get(&id)
            .copied()
            .map(|idx| &mut self.blocks[idx])
    }

    pub fn entry(&self) -> Option<&BasicBlock> {
        self.get_block(self.entry_block)
    }

    pub fn entry_mut(&mut self) -> Option<&mut BasicBlock> {
        self.get_block_mut(self.entry_block)
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BasicBlockId> + '_ {
        self.blocks.iter().map(|b| b.id)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut BasicBlock> {
        self.blocks.iter_mut()
    }

    /// Compute the total number of instructions across all blocks
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }

    /// Iterate over every instruction in block order
    pub fn instructions(&self) -> impl Iterator<Item = &IrInstr> {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }

    /// Distinct predecessors of each block, in block order
    pub fn predecessors(&self) -> FxHashMap<BasicBlockId, Vec<BasicBlockId>> {
        let mut preds: FxHashMap<BasicBlockId, Vec<BasicBlockId>> = FxHashMap::default();
        for block in &self.blocks {
            preds.entry(block.id).or_default();
        }
        for block in &self.blocks {
            for succ in block.successors() {
                let list = preds.entry(succ).or_default();
                if !list.contains(&block.id) {
                    list.push(block.id);
                }
            }
        }
        preds
    }

    /// Blocks reachable from the entry, in reverse postorder
    pub fn reverse_postorder(&self) -> Vec<BasicBlockId> {
        let mut visited = FxHashSet::default();
        let mut postorder = Vec::new();
        let mut stack = vec![(self.entry_block, false)];
        while let Some((id, done)) = stack.pop() {
            if done {
                postorder.push(id);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            if let Some(block) = self.get_block(id) {
                for succ in block.successors().into_iter().rev() {
                    if !visited.contains(&succ) {
                        stack.push((succ, false));
                    }
                }
            }
        }
        postorder.reverse();
        postorder
    }

    /// Keep only the blocks for which `keep` returns true
    pub fn retain_blocks(&mut self, mut keep: impl FnMut(&BasicBlock) -> bool) {
        self.blocks.retain(|b| keep(b));
        self.rebuild_block_map();
    }

    fn rebuild_block_map(&mut self) {
        self.block_map = self
            .blocks
            .iter()
            .enumerate()
            .map(|(idx, b)| (b.id, idx))
            .collect();
    }

    /// Validate the function structure
    pub fn validate(&self) -> Result<(), String> {
        if self.blocks.is_empty() {
            return Err("Function has no blocks".to_string());
        }

        if self.get_block(self.entry_block).is_none() {
            return Err(format!("Entry block {} does not exist", self.entry_block));
        }

        for block in &self.blocks {
            if !block.is_terminated() {
                return Err(format!("Block {} is not terminated", block.id));
            }

            for succ in block.successors() {
                if self.get_block(succ).is_none() {
                    return Err(format!(
                        "Block {} references non-existent successor {}",
                        block.id, succ
                    ));
                }
            }
        }

        self.validate_phis()?;
        self.validate_stack_slots()
    }

    fn validate_phis(&self) -> Result<(), String> {
        let preds = self.predecessors();
        for block in &self.blocks {
            let block_preds = &preds[&block.id];
            for (idx, instr) in block.instructions.iter().enumerate() {
                let IrInstr::Phi { dest, sources } = instr else {
                    continue;
                };
                if block.instructions[..idx].iter().any(|i| !i.is_phi()) {
                    return Err(format!("Phi {} in {} follows a non-phi instruction", dest, block.id));
                }
                if sources.len() != block_preds.len() {
                    return Err(format!(
                        "Phi {} in {} has {} entries but the block has {} predecessors",
                        dest,
                        block.id,
                        sources.len(),
                        block_preds.len()
                    ));
                }
                let mut seen = FxHashSet::default();
                for (pred, _) in sources {
                    if !block_preds.contains(pred) {
                        return Err(format!(
                            "Phi {} in {} names {} which is not a predecessor",
                            dest, block.id, pred
                        ));
                    }
                    if !seen.insert(*pred) {
                        return Err(format!(
                            "Phi {} in {} lists predecessor {} twice",
                            dest, block.id, pred
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_stack_slots(&self) -> Result<(), String> {
        let declared: FxHashSet<StackSlotId> = self
            .instructions()
            .filter_map(|i| match i {
                IrInstr::AllocStack { slot } => Some(*slot),
                _ => None,
            })
            .collect();
        for instr in self.instructions() {
            let used = match instr {
                IrInstr::LoadStack { slot, .. }
                | IrInstr::StoreStack { slot, .. }
                | IrInstr::ResumeGenerator {
                    is_return: slot, ..
                } => *slot,
                _ => continue,
            };
            if !declared.contains(&used) {
                return Err(format!("Stack slot {} is used but never declared", used));
            }
        }
        Ok(())
    }
}
