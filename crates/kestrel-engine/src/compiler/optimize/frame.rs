//! Heap-frame load/store optimization
//!
//! Frame variables are shared with closures, so their values can only be
//! tracked across instructions that cannot run user code.

use super::{replace_uses, OptPass};
use crate::compiler::ir::{FrameVarId, IrFunction, IrInstr, IrModule, Register, RegisterId};
use rustc_hash::{FxHashMap, FxHashSet};

pub struct FrameLoadStoreOpts;

impl OptPass for FrameLoadStoreOpts {
    fn name(&self) -> &str {
        "FrameLoadStoreOpts"
    }

    fn run(&self, module: &mut IrModule) -> bool {
        let mut changed = false;
        for func in &mut module.functions {
            changed |= forward_frame_loads(func);
        }
        changed | remove_dead_frame_stores(module)
    }
}

/// Within a block, replace a load of a frame variable whose value is
/// already in a register
fn forward_frame_loads(func: &mut IrFunction) -> bool {
    let mut subs: FxHashMap<RegisterId, Register> = FxHashMap::default();
    let mut forwarded: FxHashSet<RegisterId> = FxHashSet::default();

    for block in func.blocks() {
        let mut known: FxHashMap<FrameVarId, Register> = FxHashMap::default();
        for instr in &block.instructions {
            match instr {
                IrInstr::StoreFrame { var, value } => {
                    known.insert(*var, *value);
                }
                IrInstr::LoadFrame { dest, var } => match known.get(var) {
                    Some(value) => {
                        subs.insert(dest.id, *value);
                        forwarded.insert(dest.id);
                    }
                    None => {
                        known.insert(*var, *dest);
                    }
                },
                // Could call a closure that writes the frame
                other if other.has_side_effects() => known.clear(),
                _ => {}
            }
        }
    }
    if subs.is_empty() {
        return false;
    }

    replace_uses(func, &subs);
    for block in func.blocks_mut() {
        block.instructions.retain(|instr| match instr {
            IrInstr::LoadFrame { dest, .. } => !forwarded.contains(&dest.id),
            _ => true,
        });
    }
    true
}

/// Drop stores to frame variables no function ever loads
///
/// Direct eval can read any variable by name, so nothing is removed when
/// the module contains one.
fn remove_dead_frame_stores(module: &mut IrModule) -> bool {
    let mut loaded: FxHashSet<FrameVarId> = FxHashSet::default();
    for func in module.functions() {
        for instr in func.instructions() {
            match instr {
                IrInstr::LoadFrame { var, .. } => {
                    loaded.insert(*var);
                }
                IrInstr::DirectEval { .. } => return false,
                _ => {}
            }
        }
    }

    let mut changed = false;
    for func in &mut module.functions {
        for block in func.blocks_mut() {
            let before = block.instructions.len();
            block.instructions.retain(|instr| match instr {
                IrInstr::StoreFrame { var, .. } => loaded.contains(var),
                _ => true,
            });
            changed |= block.instructions.len() != before;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{BasicBlock, IrConstant, IrType, PropKey, Terminator};

    fn frame_function(module: &mut IrModule, build: impl FnOnce(&mut IrFunction, FrameVarId, &mut BasicBlock)) {
        let id = module.reserve_function("f", 0);
        let var = module.alloc_frame_var(id);
        let mut func = IrFunction::new("f", 0);
        func.declare_frame_var(var);
        let mut block = BasicBlock::new(func.alloc_block_id());
        build(&mut func, var, &mut block);
        func.add_block(block);
        module.set_function(id, func);
    }

    #[test]
    fn test_load_after_store_is_forwarded() {
        let mut module = IrModule::new("m");
        frame_function(&mut module, |func, var, block| {
            let value = func.alloc_register(IrType::NUMBER);
            let loaded = func.alloc_register(IrType::ANY);
            block.add_instr(IrInstr::Const {
                dest: value,
                value: IrConstant::Number(7.0),
            });
            block.add_instr(IrInstr::StoreFrame { var, value });
            block.add_instr(IrInstr::LoadFrame { dest: loaded, var });
            block.set_terminator(Terminator::Return(loaded));
        });

        assert!(FrameLoadStoreOpts.run(&mut module));
        let func = &module.functions[0];
        assert!(!func.instructions().any(|i| matches!(i, IrInstr::LoadFrame { .. })));
        // The store itself is dead once nothing loads the variable
        assert!(!func.instructions().any(|i| matches!(i, IrInstr::StoreFrame { .. })));
        assert!(matches!(func.entry().unwrap().terminator, Terminator::Return(r) if r.ty == IrType::NUMBER));
    }

    #[test]
    fn test_call_invalidates_known_value() {
        let mut module = IrModule::new("m");
        frame_function(&mut module, |func, var, block| {
            let first = func.alloc_register(IrType::ANY);
            let object = func.alloc_register(IrType::ANY);
            let prop = func.alloc_register(IrType::ANY);
            let second = func.alloc_register(IrType::ANY);
            block.add_instr(IrInstr::LoadFrame { dest: first, var });
            block.add_instr(IrInstr::LoadParam { dest: object, index: 0 });
            block.add_instr(IrInstr::LoadProperty {
                dest: prop,
                object,
                key: PropKey::Named("getter".to_string()),
            });
            block.add_instr(IrInstr::LoadFrame { dest: second, var });
            block.set_terminator(Terminator::Return(second));
        });

        assert!(!FrameLoadStoreOpts.run(&mut module));
        assert_eq!(
            module.functions[0]
                .instructions()
                .filter(|i| matches!(i, IrInstr::LoadFrame { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_direct_eval_keeps_stores() {
        let mut module = IrModule::new("m");
        frame_function(&mut module, |func, var, block| {
            let value = func.alloc_register(IrType::NUMBER);
            let source = func.alloc_register(IrType::STRING);
            let result = func.alloc_register(IrType::ANY);
            block.add_instr(IrInstr::Const {
                dest: value,
                value: IrConstant::Number(1.0),
            });
            block.add_instr(IrInstr::StoreFrame { var, value });
            block.add_instr(IrInstr::Const {
                dest: source,
                value: IrConstant::String("x".to_string()),
            });
            block.add_instr(IrInstr::DirectEval {
                dest: result,
                source,
                strict: false,
            });
            block.set_terminator(Terminator::Return(result));
        });

        assert!(!FrameLoadStoreOpts.run(&mut module));
        assert!(module.functions[0]
            .instructions()
            .any(|i| matches!(i, IrInstr::StoreFrame { .. })));
    }
}
