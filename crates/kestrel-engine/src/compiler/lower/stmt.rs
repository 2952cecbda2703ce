//! Statement Lowering
//!
//! Converts the statements that host expressions (declarations, blocks,
//! `if`, `return`, `throw`, `try`) to IR.

use super::{Lowerer, TryContext};
use crate::ast::{
    CatchClause, IfStatement, Statement, TryStatement, VariableDeclaration, VariableKind,
};
use crate::compiler::ir::{IrInstr, IrType, Register, Terminator};

impl<'a> Lowerer<'a> {
    /// Lower a statement list in the current scope, hoisting its let/const
    /// declarations first
    pub(super) fn lower_block_body(&mut self, body: &[Statement]) {
        self.hoist_lexical_declarations(body);
        self.lower_statements(body);
    }

    /// Lower a statement list in a fresh lexical scope
    pub(super) fn lower_scoped_block(&mut self, body: &[Statement]) {
        let scope = self.scopes.open_scope();
        self.lower_block_body(body);
        self.scopes.close_scope(scope);
    }

    pub(super) fn lower_statements(&mut self, body: &[Statement]) {
        for stmt in body {
            self.lower_stmt(stmt);
        }
    }

    /// Lower a statement
    pub(super) fn lower_stmt(&mut self, stmt: &Statement) {
        // Code after a terminator still gets lowered (it may declare
        // functions); it lands in an unreachable block that DCE removes
        if self.current_block_is_terminated() {
            let dead = self.alloc_block();
            self.start_block(dead, "dead");
        }

        match stmt {
            Statement::Expression(expr_stmt) => {
                self.lower_expr(&expr_stmt.expression);
            }
            Statement::VariableDeclaration(decl) => self.lower_var_decl(decl),
            Statement::Return(ret) => {
                let value = match &ret.argument {
                    Some(argument) => self.lower_expr(argument),
                    None => self.undefined(),
                };
                self.emit_return(value);
            }
            Statement::Block(block) => self.lower_scoped_block(&block.body),
            Statement::If(if_stmt) => self.lower_if(if_stmt),
            Statement::Throw(throw) => {
                let value = self.lower_expr(&throw.argument);
                self.set_terminator(Terminator::Throw(value));
            }
            Statement::Try(try_stmt) => self.lower_try(try_stmt),
        }
    }

    fn lower_var_decl(&mut self, decl: &VariableDeclaration) {
        for declarator in &decl.declarations {
            let name = &declarator.name.name;
            match decl.kind {
                // Hoisted to the function; only the initializer runs here
                VariableKind::Var => {
                    if let Some(init) = &declarator.init {
                        let value = self.lower_named_value(init, Some(name.as_str()));
                        self.assign_variable(name, value);
                    }
                }
                VariableKind::Let | VariableKind::Const => {
                    let value = match &declarator.init {
                        Some(init) => self.lower_named_value(init, Some(name.as_str())),
                        None => self.undefined(),
                    };
                    // Initialization ends the TDZ, so no check here
                    let binding = match self.scopes.find_in_current_scope(name).copied() {
                        Some(binding) => binding,
                        None => self.declare_binding(&declarator.name, false),
                    };
                    self.store_binding(binding, value);
                }
            }
        }
    }

    fn lower_if(&mut self, if_stmt: &IfStatement) {
        let then_block = self.alloc_block();
        let else_block = if_stmt.alternate.as_ref().map(|_| self.alloc_block());
        let merge_block = self.alloc_block();

        self.lower_condition(&if_stmt.test, then_block, else_block.unwrap_or(merge_block));

        self.start_block(then_block, "if.then");
        self.lower_nested_stmt(&if_stmt.consequent);
        self.jump_to(merge_block);

        if let (Some(else_id), Some(alternate)) = (else_block, &if_stmt.alternate) {
            self.start_block(else_id, "if.else");
            self.lower_nested_stmt(alternate);
            self.jump_to(merge_block);
        }

        self.start_block(merge_block, "if.merge");
    }

    /// A statement in a branch position gets its own scope
    fn lower_nested_stmt(&mut self, stmt: &Statement) {
        let scope = self.scopes.open_scope();
        self.hoist_lexical_declarations(std::slice::from_ref(stmt));
        self.lower_stmt(stmt);
        self.scopes.close_scope(scope);
    }

    // ========================================================================
    // try / catch / finally
    // ========================================================================

    fn lower_try(&mut self, try_stmt: &TryStatement) {
        match (&try_stmt.handler, &try_stmt.finalizer) {
            (None, None) => self.lower_scoped_block(&try_stmt.block),
            (Some(handler), None) => self.emit_try_region(
                None,
                |l| l.lower_scoped_block(&try_stmt.block),
                |l, exception| l.lower_catch(handler, exception),
            ),
            (handler, Some(finalizer)) => {
                // try/catch/finally is an inner try/catch wrapped in a
                // try/finally whose handler runs the finalizer and rethrows
                self.emit_try_region(
                    Some(finalizer.clone()),
                    |l| match handler {
                        Some(handler) => l.emit_try_region(
                            None,
                            |l| l.lower_scoped_block(&try_stmt.block),
                            |l, exception| l.lower_catch(handler, exception),
                        ),
                        None => l.lower_scoped_block(&try_stmt.block),
                    },
                    |l, exception| {
                        l.lower_scoped_block(finalizer);
                        if !l.current_block_is_terminated() {
                            l.set_terminator(Terminator::Throw(exception));
                        }
                    },
                );
                // Normal completion
                if !self.current_block_is_terminated() {
                    self.lower_scoped_block(finalizer);
                }
            }
        }
    }

    /// Emit a protected region. `body` runs with the region on the try
    /// stack (so early exits leave it and replay `finalizer`); `handler`
    /// runs outside it with the caught exception. Both fall through to a
    /// common continuation block.
    fn emit_try_region(
        &mut self,
        finalizer: Option<Vec<Statement>>,
        body: impl FnOnce(&mut Self),
        handler: impl FnOnce(&mut Self, Register),
    ) {
        let body_block = self.alloc_block();
        let handler_block = self.alloc_block();
        let cont = self.alloc_block();

        self.set_terminator(Terminator::TryStart {
            body: body_block,
            handler: handler_block,
        });

        self.start_block(body_block, "try.body");
        self.state_mut().try_stack.push(TryContext { finalizer });
        body(self);
        self.state_mut().try_stack.pop();
        if !self.current_block_is_terminated() {
            self.emit(IrInstr::TryEnd);
            self.set_terminator(Terminator::Jump(cont));
        }

        self.start_block(handler_block, "try.handler");
        let exception = self.alloc_register(IrType::ANY.without_empty());
        self.emit(IrInstr::Catch { dest: exception });
        handler(self, exception);
        self.jump_to(cont);

        self.start_block(cont, "try.cont");
    }

    fn lower_catch(&mut self, clause: &CatchClause, exception: Register) {
        let scope = self.scopes.open_scope();
        if let Some(param) = &clause.param {
            let binding = self.declare_binding(param, false);
            self.store_binding(binding, exception);
        }
        self.lower_block_body(&clause.body);
        self.scopes.close_scope(scope);
    }
}
