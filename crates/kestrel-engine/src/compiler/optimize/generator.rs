//! Generator prologue placement

use super::{for_each_function, OptPass};
use crate::compiler::ir::{IrFunction, IrInstr, IrModule};

/// Moves `StartGenerator` to the first position of the entry block, ahead
/// of any parameter setup that lowering emitted before it
pub struct HoistStartGenerator;

impl OptPass for HoistStartGenerator {
    fn name(&self) -> &str {
        "HoistStartGenerator"
    }

    fn run(&self, module: &mut IrModule) -> bool {
        for_each_function(module, hoist_start_generator)
    }
}

fn hoist_start_generator(func: &mut IrFunction) -> bool {
    if !func.is_generator {
        return false;
    }
    let entry = func.entry_block;
    if let Some(first) = func.entry().and_then(|b| b.instructions.first()) {
        if matches!(first, IrInstr::StartGenerator) {
            return false;
        }
    }

    let mut found = false;
    for block in func.blocks_mut() {
        let before = block.instructions.len();
        block.instructions.retain(|i| !matches!(i, IrInstr::StartGenerator));
        found |= block.instructions.len() != before;
    }
    if !found {
        log::warn!("generator {} has no StartGenerator", func.name);
        return false;
    }
    if let Some(block) = func.get_block_mut(entry) {
        block.instructions.insert(0, IrInstr::StartGenerator);
    }
    true
}
