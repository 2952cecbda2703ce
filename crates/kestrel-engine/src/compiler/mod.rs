//! Compiler: AST lowering, IR and optimization
//!
//! The pipeline:
//! 1. `lower` turns a resolved syntax tree into an `IrModule`
//! 2. The IR validator checks the lowered module (optional)
//! 3. `optimize` runs the configured pass list
//! 4. The validator runs again on the result (optional)

pub mod diagnostics;
pub mod error;
pub mod ir;
pub mod lower;
pub mod optimize;
pub mod options;
pub mod scope;

pub use codespan_reporting::diagnostic::Severity;
pub use diagnostics::{codes, Diagnostic, ErrorCode, ErrorManager};
pub use error::{CompileError, CompileResult, PipelineError};
pub use ir::{IrFunction, IrModule, PrettyPrint};
pub use lower::{lower_program, Lowerer};
pub use optimize::{OptPass, Optimizer};
pub use options::{CompileOptions, OptLevel};
pub use scope::ScopedHashTable;

use crate::ast::{FlowContext, Program, SemanticContext};

/// Compiles programs into optimized IR modules
///
/// Diagnostics from every compilation accumulate in the compiler's
/// `ErrorManager` until taken.
pub struct Compiler {
    options: CompileOptions,
    optimizer: Optimizer,
    errors: ErrorManager,
}

impl Compiler {
    /// Create a compiler; fails when a custom pass list names an unknown pass
    pub fn new(options: CompileOptions) -> CompileResult<Self> {
        let optimizer = Optimizer::from_options(&options)?;
        let mut errors = ErrorManager::new();
        errors.set_warnings_as_errors(options.warnings_as_errors);
        errors.set_suppress_warnings(options.suppress_warnings);
        Ok(Self {
            options,
            optimizer,
            errors,
        })
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    /// Lower, verify and optimize one program
    pub fn compile(
        &mut self,
        name: &str,
        program: &Program,
        semantic: &SemanticContext,
        flow: &FlowContext,
    ) -> CompileResult<IrModule> {
        let errors_before = self.errors.error_count();
        let mut module = Lowerer::new(semantic, flow, &mut self.errors)
            .with_strict(self.options.strict)
            .lower_program(name, program);

        let count = self.errors.error_count() - errors_before;
        if count > 0 {
            return Err(CompileError::Diagnostics { count });
        }

        self.verify(&module)?;
        self.optimizer.optimize(&mut module);
        self.verify(&module)?;
        Ok(module)
    }

    fn verify(&self, module: &IrModule) -> CompileResult<()> {
        if !self.options.verify_ir {
            return Ok(());
        }
        module.validate().map_err(CompileError::Verification)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.errors.diagnostics()
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.errors.take_diagnostics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstBuilder, BinaryOperator};
    use crate::compiler::ir::{IrConstant, IrInstr, Terminator};

    #[test]
    fn test_compile_folds_constants() {
        let b = AstBuilder::new();
        let program = b.program(vec![b.ret(Some(b.binary(BinaryOperator::Mul, b.num(6.0), b.num(7.0))))]);
        let mut compiler = Compiler::new(CompileOptions::default()).unwrap();
        let module = compiler
            .compile("m", &program, &SemanticContext::new(), &FlowContext::new())
            .unwrap();
        let global = &module.functions[0];
        assert!(global
            .instructions()
            .any(|i| matches!(i, IrInstr::Const { value: IrConstant::Number(n), .. } if *n == 42.0)));
        assert!(!global.instructions().any(|i| matches!(i, IrInstr::BinaryOp { .. })));
        assert!(matches!(global.entry().unwrap().terminator, Terminator::Return(_)));
    }

    #[test]
    fn test_lowering_errors_fail_compilation() {
        let b = AstBuilder::new();
        let program = b.program(vec![b.expr_stmt(b.invalid("Bogus"))]);
        let mut compiler = Compiler::new(CompileOptions::default()).unwrap();
        let err = compiler
            .compile("m", &program, &SemanticContext::new(), &FlowContext::new())
            .unwrap_err();
        assert!(matches!(err, CompileError::Diagnostics { count: 1 }));
        assert_eq!(compiler.diagnostics()[0].message(), "Invalid expression encountered");
    }

    #[test]
    fn test_unknown_custom_pass() {
        let options = CompileOptions {
            custom_passes: Some(vec!["DCE".into(), "LICM".into()]),
            ..CompileOptions::default()
        };
        assert!(matches!(
            Compiler::new(options),
            Err(CompileError::Pipeline(PipelineError::UnknownPass(name))) if name == "LICM"
        ));
    }

    #[test]
    fn test_no_optimization_keeps_lowered_ir() {
        let b = AstBuilder::new();
        let program = b.program(vec![b.ret(Some(b.binary(BinaryOperator::Mul, b.num(6.0), b.num(7.0))))]);
        let options = CompileOptions {
            opt_level: OptLevel::None,
            ..CompileOptions::default()
        };
        let mut compiler = Compiler::new(options).unwrap();
        assert!(compiler.optimizer().is_empty());
        let module = compiler
            .compile("m", &program, &SemanticContext::new(), &FlowContext::new())
            .unwrap();
        assert!(module.functions[0]
            .instructions()
            .any(|i| matches!(i, IrInstr::BinaryOp { .. })));
    }
}
