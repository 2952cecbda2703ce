//! IR auditor
//!
//! Checks structural invariants after optimization and reports what it
//! finds through the log. Never modifies the module.

use super::dominance::DominatorTree;
use super::OptPass;
use crate::compiler::ir::{BasicBlockId, IrFunction, IrInstr, IrModule, RegisterId};
use rustc_hash::FxHashMap;

pub struct Auditor;

impl OptPass for Auditor {
    fn name(&self) -> &str {
        "Auditor"
    }

    fn run(&self, module: &mut IrModule) -> bool {
        let problems = audit_module(module);
        for problem in &problems {
            log::warn!("audit: {}", problem);
        }
        false
    }
}

/// Every invariant violation in the module, one message each
pub fn audit_module(module: &IrModule) -> Vec<String> {
    let mut problems = Vec::new();
    if let Err(errors) = module.validate() {
        problems.extend(errors);
    }
    for func in module.functions() {
        if func.is_empty() {
            continue;
        }
        audit_function(func, &mut problems);
        for instr in func.instructions() {
            if let IrInstr::Call {
                target: Some(target), ..
            } = instr
            {
                if module.get_function(*target).is_none() {
                    problems.push(format!("{}: call names unknown function {}", func.name, target));
                }
            }
        }
    }
    problems
}

fn audit_function(func: &IrFunction, problems: &mut Vec<String>) {
    // Definition site of each register: block and position
    let mut defs: FxHashMap<RegisterId, (BasicBlockId, usize)> = FxHashMap::default();
    for block in func.blocks() {
        for (idx, instr) in block.instructions.iter().enumerate() {
            let Some(dest) = instr.dest() else {
                continue;
            };
            if defs.insert(dest.id, (block.id, idx)).is_some() {
                problems.push(format!("{}: register {} is defined more than once", func.name, dest));
            }
        }
    }

    let tree = DominatorTree::compute(func);
    let available = |reg: RegisterId, block: BasicBlockId, idx: usize| match defs.get(&reg) {
        None => false,
        Some(&(def_block, def_idx)) if def_block == block => def_idx < idx,
        Some(&(def_block, _)) => tree.dominates(def_block, block),
    };

    for block in func.blocks() {
        if !tree.is_reachable(block.id) {
            continue;
        }
        let first_real = block.instructions.iter().position(|i| !i.is_phi());
        for (idx, instr) in block.instructions.iter().enumerate() {
            match instr {
                IrInstr::Phi { dest, sources } => {
                    for (pred, value) in sources {
                        if tree.is_reachable(*pred) && !available(value.id, *pred, usize::MAX) {
                            problems.push(format!(
                                "{}: phi {} reads {} which is not available from {}",
                                func.name, dest, value, pred
                            ));
                        }
                    }
                }
                IrInstr::Catch { .. } if Some(idx) != first_real => {
                    problems.push(format!("{}: Catch is not first in {}", func.name, block.id));
                }
                other => other.visit_operands(|r| {
                    if !available(r.id, block.id, idx) {
                        problems.push(format!("{}: {} is used in {} before it is defined", func.name, r, block.id));
                    }
                }),
            }
        }
        if let Some(reg) = block.terminator.operand() {
            if !available(reg.id, block.id, usize::MAX) {
                problems.push(format!(
                    "{}: terminator of {} reads undefined {}",
                    func.name, block.id, reg
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{lower, run};
    use super::*;
    use crate::ast::{AstBuilder, BinaryOperator};
    use crate::compiler::ir::{BasicBlock, IrType, Terminator};

    #[test]
    fn test_lowered_program_is_clean() {
        let b = AstBuilder::new();
        let f = b.function(
            Some("f"),
            &["a"],
            vec![
                b.let_decl("x", Some(b.binary(BinaryOperator::Add, b.ident("a"), b.num(1.0)))),
                b.if_(b.ident("a"), b.ret(Some(b.ident("x"))), None),
                b.ret(Some(b.num(0.0))),
            ],
        );
        let mut module = lower(&b.program(vec![b.expr_stmt(b.function_expr(f))]));
        assert!(audit_module(&module).is_empty());
        run(&mut module, &["Mem2Reg", "InstSimplify", "SimplifyCFG", "DCE"]);
        assert!(audit_module(&module).is_empty(), "{:?}", audit_module(&module));
    }

    #[test]
    fn test_reports_use_before_definition() {
        let mut module = IrModule::new("m");
        let mut func = IrFunction::new("broken", 0);
        let ghost = func.alloc_register(IrType::ANY);
        let mut block = BasicBlock::new(func.alloc_block_id());
        block.set_terminator(Terminator::Return(ghost));
        func.add_block(block);
        module.add_function(func);

        let problems = audit_module(&module);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("broken"));
        // The pass only reports
        assert!(!Auditor.run(&mut module));
    }

    #[test]
    fn test_reports_double_definition() {
        let mut module = IrModule::new("m");
        let mut func = IrFunction::new("twice", 1);
        let reg = func.alloc_register(IrType::ANY);
        let mut block = BasicBlock::new(func.alloc_block_id());
        block.add_instr(IrInstr::LoadParam { dest: reg, index: 1 });
        block.add_instr(IrInstr::LoadParam { dest: reg, index: 0 });
        block.set_terminator(Terminator::Return(reg));
        func.add_block(block);
        module.add_function(func);

        assert!(audit_module(&module)
            .iter()
            .any(|p| p.contains("defined more than once")));
    }
}
