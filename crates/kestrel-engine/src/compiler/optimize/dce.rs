//! Dead code elimination

use super::{for_each_function, OptPass};
use crate::compiler::ir::{IrFunction, IrInstr, IrModule, RegisterId, StackSlotId};
use rustc_hash::FxHashSet;

/// Removes instructions whose result is never read and which have no side
/// effects, stores to stack slots that are never loaded, and declarations
/// of slots nothing touches any more.
pub struct Dce;

impl OptPass for Dce {
    fn name(&self) -> &str {
        "DCE"
    }

    fn run(&self, module: &mut IrModule) -> bool {
        for_each_function(module, eliminate_dead_code)
    }
}

fn eliminate_dead_code(func: &mut IrFunction) -> bool {
    let mut changed = false;
    // Removing one instruction can orphan its operands
    loop {
        let removed = remove_unused_values(func) + remove_dead_stack_stores(func);
        if removed == 0 {
            break;
        }
        changed = true;
    }
    changed
}

fn remove_unused_values(func: &mut IrFunction) -> usize {
    let mut used: FxHashSet<RegisterId> = FxHashSet::default();
    for block in func.blocks() {
        for instr in &block.instructions {
            instr.visit_operands(|r| {
                used.insert(r.id);
            });
        }
        if let Some(reg) = block.terminator.operand() {
            used.insert(reg.id);
        }
    }

    let mut removed = 0;
    for block in func.blocks_mut() {
        let before = block.instructions.len();
        block.instructions.retain(|instr| {
            if instr.has_side_effects() {
                return true;
            }
            match instr.dest() {
                Some(dest) => used.contains(&dest.id),
                None => true,
            }
        });
        removed += before - block.instructions.len();
    }
    removed
}

fn remove_dead_stack_stores(func: &mut IrFunction) -> usize {
    let mut loaded: FxHashSet<StackSlotId> = FxHashSet::default();
    let mut touched: FxHashSet<StackSlotId> = FxHashSet::default();
    for instr in func.instructions() {
        match instr {
            IrInstr::LoadStack { slot, .. } => {
                loaded.insert(*slot);
                touched.insert(*slot);
            }
            IrInstr::ResumeGenerator { is_return, .. } => {
                loaded.insert(*is_return);
                touched.insert(*is_return);
            }
            IrInstr::StoreStack { slot, .. } => {
                touched.insert(*slot);
            }
            _ => {}
        }
    }

    let mut removed = 0;
    for block in func.blocks_mut() {
        let before = block.instructions.len();
        block.instructions.retain(|instr| match instr {
            IrInstr::StoreStack { slot, .. } => loaded.contains(slot),
            IrInstr::AllocStack { slot } => touched.contains(slot),
            _ => true,
        });
        removed += before - block.instructions.len();
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::super::testing::{count, lower, run};
    use super::*;
    use crate::ast::{AstBuilder, BinaryOperator};
    use crate::compiler::ir::{BasicBlock, BasicBlockId, IrConstant, IrType, PropKey, Terminator};

    #[test]
    fn test_removes_unused_pure_chain() {
        let mut func = IrFunction::new("f", 0);
        let a = func.alloc_register(IrType::NUMBER);
        let b = func.alloc_register(IrType::NUMBER);
        let sum = func.alloc_register(IrType::NUMBER);
        let result = func.alloc_register(IrType::UNDEFINED);
        let mut block = BasicBlock::new(BasicBlockId(0));
        block.add_instr(IrInstr::Const {
            dest: a,
            value: IrConstant::Number(1.0),
        });
        block.add_instr(IrInstr::Const {
            dest: b,
            value: IrConstant::Number(2.0),
        });
        block.add_instr(IrInstr::BinaryOp {
            dest: sum,
            op: crate::compiler::ir::BinaryOp::Add,
            left: a,
            right: b,
        });
        block.add_instr(IrInstr::Const {
            dest: result,
            value: IrConstant::Undefined,
        });
        block.set_terminator(Terminator::Return(result));
        func.add_block(block);

        assert!(eliminate_dead_code(&mut func));
        assert_eq!(func.instruction_count(), 1);
    }

    #[test]
    fn test_keeps_side_effects() {
        let b = AstBuilder::new();
        let program = b.program(vec![
            b.expr_stmt(b.member(b.ident("o"), "x")),
            b.expr_stmt(b.binary(BinaryOperator::Add, b.ident("p"), b.num(1.0))),
        ]);
        let mut module = lower(&program);
        run(&mut module, &["DCE"]);
        let func = &module.functions[0];
        // Property reads may run getters; `+` on an unknown value may call valueOf
        assert_eq!(
            count(func, |i| matches!(i, IrInstr::LoadProperty { key: PropKey::Named(n), .. } if n == "x")),
            1
        );
        assert_eq!(count(func, |i| matches!(i, IrInstr::BinaryOp { .. })), 1);
    }

    #[test]
    fn test_removes_never_loaded_slot() {
        let b = AstBuilder::new();
        let program = b.program(vec![b.let_decl("unused", Some(b.num(3.0)))]);
        let mut module = lower(&program);
        let func = &module.functions[0];
        assert!(count(func, |i| matches!(i, IrInstr::StoreStack { .. })) > 0);
        run(&mut module, &["DCE"]);
        let func = &module.functions[0];
        assert_eq!(count(func, |i| matches!(i, IrInstr::StoreStack { .. })), 0);
        assert_eq!(count(func, |i| matches!(i, IrInstr::AllocStack { .. })), 0);
        assert_eq!(count(func, |i| matches!(i, IrInstr::Const { .. })), 1);
    }

    #[test]
    fn test_keeps_possible_tdz_error() {
        let b = AstBuilder::new();
        // The read happens before the initializer runs
        let program = b.program(vec![
            b.expr_stmt(b.ident("later")),
            b.let_decl("later", Some(b.num(1.0))),
        ]);
        let mut module = lower(&program);
        run(&mut module, &["DCE"]);
        assert_eq!(
            count(&module.functions[0], |i| matches!(i, IrInstr::ThrowIfEmpty { .. })),
            1
        );
    }
}
