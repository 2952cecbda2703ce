//! IR optimization pipeline
//!
//! Each pass implements `OptPass` and rewrites an `IrModule` in place. The
//! `Optimizer` runs an ordered list of passes once each; passes that open
//! up work for earlier ones appear again later in the list instead of the
//! pipeline iterating to a fixpoint.

mod auditor;
mod cfg;
mod cse;
mod dce;
mod dominance;
mod frame;
mod generator;
mod interproc;
mod simplify;
mod stack;
mod types;

pub use auditor::{audit_module, Auditor};
pub use cfg::SimplifyCfg;
pub use cse::{Cse, TdzDedup};
pub use dce::Dce;
pub use dominance::DominatorTree;
pub use frame::FrameLoadStoreOpts;
pub use generator::HoistStartGenerator;
pub use interproc::{FuncSigOpts, FunctionAnalysis, Inlining};
pub use simplify::InstSimplify;
pub use stack::{Mem2Reg, SimpleStackPromotion};
pub use types::TypeInference;

use super::error::PipelineError;
use super::ir::{IrFunction, IrModule, Register, RegisterId};
use super::options::{CompileOptions, OptLevel};
use rustc_hash::FxHashMap;

/// An optimization pass over a module
pub trait OptPass: Send + Sync {
    /// Name of this pass, as accepted by custom pipelines
    fn name(&self) -> &str;
    /// Run the pass; returns whether anything changed
    fn run(&self, module: &mut IrModule) -> bool;
}

/// `-Og`
const DEBUG_PIPELINE: &[&str] = &["InstSimplify", "HoistStartGenerator"];

/// `-O3`
const FULL_PIPELINE: &[&str] = &[
    "InstSimplify",
    "DCE",
    "SimplifyCFG",
    "SimpleStackPromotion",
    "FrameLoadStoreOpts",
    "Mem2Reg",
    "SimpleStackPromotion",
    "FunctionAnalysis",
    "Inlining",
    "FunctionAnalysis",
    "Inlining",
    "TypeInference",
    "SimpleStackPromotion",
    "InstSimplify",
    "DCE",
    "SimpleStackPromotion",
    "FrameLoadStoreOpts",
    "FunctionAnalysis",
    "Mem2Reg",
    "TypeInference",
    "CSE",
    "TDZDedup",
    "SimplifyCFG",
    "InstSimplify",
    "FuncSigOpts",
    "DCE",
    "SimplifyCFG",
    "FrameLoadStoreOpts",
    "Mem2Reg",
    "Auditor",
    "TypeInference",
    "HoistStartGenerator",
];

/// Instantiate a pass by name
pub fn create_pass(name: &str) -> Option<Box<dyn OptPass>> {
    let pass: Box<dyn OptPass> = match name {
        "InstSimplify" => Box::new(InstSimplify),
        "DCE" => Box::new(Dce),
        "SimplifyCFG" => Box::new(SimplifyCfg),
        "SimpleStackPromotion" => Box::new(SimpleStackPromotion),
        "FrameLoadStoreOpts" => Box::new(FrameLoadStoreOpts),
        "Mem2Reg" => Box::new(Mem2Reg),
        "FunctionAnalysis" => Box::new(FunctionAnalysis),
        "Inlining" => Box::new(Inlining),
        "TypeInference" => Box::new(TypeInference),
        "CSE" => Box::new(Cse),
        "TDZDedup" => Box::new(TdzDedup),
        "FuncSigOpts" => Box::new(FuncSigOpts),
        "HoistStartGenerator" => Box::new(HoistStartGenerator),
        "Auditor" => Box::new(Auditor),
        _ => return None,
    };
    Some(pass)
}

/// Optimizer that runs a sequence of passes
pub struct Optimizer {
    passes: Vec<Box<dyn OptPass>>,
}

impl Optimizer {
    /// Create an optimizer with the full `-O3` pipeline
    pub fn new() -> Self {
        Self::for_level(OptLevel::Full)
    }

    /// Create an empty optimizer (no passes)
    pub fn empty() -> Self {
        Optimizer { passes: vec![] }
    }

    /// The preset pipeline for an optimization level
    pub fn for_level(level: OptLevel) -> Self {
        let names = match level {
            OptLevel::None => return Self::empty(),
            OptLevel::Debug => DEBUG_PIPELINE,
            OptLevel::Full => FULL_PIPELINE,
        };
        Self::from_names(names).expect("preset pipelines only name known passes")
    }

    /// Build a custom pipeline; fails on the first unknown pass name
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, PipelineError> {
        let mut optimizer = Self::empty();
        for name in names {
            let name = name.as_ref();
            let pass = create_pass(name).ok_or_else(|| PipelineError::UnknownPass(name.to_string()))?;
            optimizer.add_pass(pass);
        }
        Ok(optimizer)
    }

    /// The pipeline selected by compile options; a custom list wins over the level
    pub fn from_options(options: &CompileOptions) -> Result<Self, PipelineError> {
        match &options.custom_passes {
            Some(names) => Self::from_names(names),
            None => Ok(Self::for_level(options.opt_level)),
        }
    }

    /// Add a pass to the pipeline
    pub fn add_pass(&mut self, pass: Box<dyn OptPass>) {
        self.passes.push(pass);
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run all passes in order; returns whether any pass changed the module
    pub fn optimize(&self, module: &mut IrModule) -> bool {
        let mut changed = false;
        for pass in &self.passes {
            let before = module.total_instruction_count();
            let pass_changed = pass.run(module);
            let after = module.total_instruction_count();
            log::debug!(
                "{}: {} -> {} instructions{}",
                pass.name(),
                before,
                after,
                if pass_changed { "" } else { " (no change)" }
            );
            changed |= pass_changed;
        }
        changed
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Run `f` over every function, reporting whether any call changed something
pub(crate) fn for_each_function(module: &mut IrModule, mut f: impl FnMut(&mut IrFunction) -> bool) -> bool {
    let mut changed = false;
    for func in &mut module.functions {
        changed |= f(func);
    }
    changed
}

/// Replace register uses according to a substitution map, following chains
/// (`r3 -> r2 -> r1` rewrites uses of r3 to r1)
pub(crate) fn replace_uses(func: &mut IrFunction, subs: &FxHashMap<RegisterId, Register>) {
    if subs.is_empty() {
        return;
    }
    let resolve = |reg: &mut Register| {
        let mut current = *reg;
        let mut depth = 0;
        while let Some(&next) = subs.get(&current.id) {
            current = next;
            depth += 1;
            if depth > subs.len() {
                break;
            }
        }
        *reg = current;
    };
    for block in func.blocks_mut() {
        for instr in &mut block.instructions {
            instr.visit_operands_mut(resolve);
        }
        if let Some(reg) = block.terminator.operand_mut() {
            resolve(reg);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::ast::{FlowContext, Program, SemanticContext};
    use crate::compiler::diagnostics::ErrorManager;
    use crate::compiler::ir::{IrFunction, IrInstr, IrModule};
    use crate::compiler::lower::lower_program;

    pub fn lower(program: &Program) -> IrModule {
        lower_with(program, &SemanticContext::new())
    }

    pub fn lower_with(program: &Program, semantic: &SemanticContext) -> IrModule {
        let mut errors = ErrorManager::new();
        let module = lower_program("test", program, semantic, &FlowContext::new(), &mut errors);
        assert!(!errors.has_errors(), "unexpected lowering errors");
        module
    }

    pub fn run(module: &mut IrModule, names: &[&str]) {
        super::Optimizer::from_names(names).unwrap().optimize(module);
        if let Err(errors) = module.validate() {
            panic!("invalid IR after {:?}: {:?}", names, errors);
        }
    }

    pub fn count(func: &IrFunction, pred: impl Fn(&IrInstr) -> bool) -> usize {
        func.instructions().filter(|i| pred(i)).count()
    }
}
