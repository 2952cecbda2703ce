//! AST to IR Lowering
//!
//! Converts the resolved syntax tree into the IR representation. Every
//! function literal becomes its own `IrFunction`; the program body becomes
//! the top-level function, which is always function 0 of the module.
//!
//! Lowering never fails. User errors are reported to the `ErrorManager` and
//! the offending expression lowers to `undefined`.

mod assign;
mod call;
mod expr;
mod generator;
mod literal;
mod stmt;

use crate::ast::{
    FlowContext, FunctionBody, FunctionKind, FunctionNode, Identifier, Program, SemanticContext,
    Span, Statement, StaticType, VariableKind,
};
use crate::compiler::diagnostics::{Diagnostic, ErrorCode, ErrorManager};
use crate::compiler::ir::{
    BasicBlock, BasicBlockId, FrameVarId, FunctionId, IrConstant, IrFunction, IrInstr, IrModule,
    IrType, Register, StackSlotId, Terminator,
};
use crate::compiler::scope::ScopedHashTable;

/// Where a named binding lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    /// Function-local stack slot
    Stack {
        slot: StackSlotId,
        owner: FunctionId,
        tdz: bool,
    },
    /// Frame variable, visible to nested functions
    Frame { var: FrameVarId, tdz: bool },
    /// Top-level `var`: a property of the global object
    Global,
}

impl Binding {
    fn has_tdz(&self) -> bool {
        match self {
            Binding::Stack { tdz, .. } | Binding::Frame { tdz, .. } => *tdz,
            Binding::Global => false,
        }
    }
}

/// One enclosing `try` region of the function being lowered
#[derive(Debug, Clone)]
struct TryContext {
    /// `finally` body to replay when control leaves the region early
    finalizer: Option<Vec<Statement>>,
}

/// Per-function lowering state
struct FunctionState {
    id: FunctionId,
    func: IrFunction,
    current_block: BasicBlockId,
    is_arrow: bool,
    is_global: bool,
    /// Superclass expression of a derived constructor
    super_class: Option<Box<crate::ast::Expression>>,
    super_called: bool,
    /// `this` as received in parameter 0 (never set for arrows)
    this_reg: Option<Register>,
    arguments_reg: Option<Register>,
    captured_this: Option<FrameVarId>,
    captured_arguments: Option<FrameVarId>,
    try_stack: Vec<TryContext>,
}

impl FunctionState {
    fn new(id: FunctionId, func: IrFunction) -> Self {
        Self {
            id,
            func,
            current_block: BasicBlockId(0),
            is_arrow: false,
            is_global: false,
            super_class: None,
            super_called: false,
            this_reg: None,
            arguments_reg: None,
            captured_this: None,
            captured_arguments: None,
            try_stack: Vec::new(),
        }
    }

    /// Insert into the entry block right after the definition of `after`
    /// (or at the top when `after` is not defined there)
    fn insert_in_entry(&mut self, instr: IrInstr, after: Option<Register>) {
        let entry = self.func.entry_block;
        let block = self
            .func
            .get_block_mut(entry)
            .expect("Entry block not found");
        let pos = after
            .and_then(|reg| {
                block
                    .instructions
                    .iter()
                    .position(|i| i.dest() == Some(reg))
            })
            .map_or(0, |idx| idx + 1);
        block.instructions.insert(pos, instr);
    }

    /// The reified `arguments` object, created in the entry block on first use
    fn ensure_arguments(&mut self) -> Register {
        if let Some(reg) = self.arguments_reg {
            return reg;
        }
        let dest = self.func.alloc_register(IrType::OBJECT);
        self.insert_in_entry(IrInstr::CreateArguments { dest }, self.this_reg);
        self.arguments_reg = Some(dest);
        dest
    }
}

/// What an arrow function borrows from its enclosing non-arrow function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Captured {
    This,
    Arguments,
}

/// AST to IR lowerer
pub struct Lowerer<'a> {
    semantic: &'a SemanticContext,
    flow: &'a FlowContext,
    errors: &'a mut ErrorManager,
    /// File id used for diagnostic labels
    file_id: usize,
    /// Treat the top-level program as strict code
    strict: bool,
    module: IrModule,
    /// Function currently being lowered
    state: Option<FunctionState>,
    /// Enclosing functions, innermost last
    outer: Vec<FunctionState>,
    scopes: ScopedHashTable<String, Binding>,
    anonymous_counter: u32,
}

impl<'a> Lowerer<'a> {
    /// Create a new lowerer over the resolver and flow-typing tables
    pub fn new(semantic: &'a SemanticContext, flow: &'a FlowContext, errors: &'a mut ErrorManager) -> Self {
        Self {
            semantic,
            flow,
            errors,
            file_id: 0,
            strict: false,
            module: IrModule::new(""),
            state: None,
            outer: Vec::new(),
            scopes: ScopedHashTable::new(),
            anonymous_counter: 0,
        }
    }

    pub fn with_file_id(mut self, file_id: usize) -> Self {
        self.file_id = file_id;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Lower a whole program into a module
    pub fn lower_program(&mut self, name: &str, program: &Program) -> IrModule {
        self.module = IrModule::new(name);
        self.anonymous_counter = 0;

        let id = self.module.reserve_function("global", 0);
        let mut func = IrFunction::new("global", 0);
        func.strict = program.strict || self.strict;
        func.source_span = program.span;
        let mut state = FunctionState::new(id, func);
        state.is_global = true;
        self.state = Some(state);
        log::trace!("lowering top-level function of module '{}'", name);

        let scope = self.scopes.open_scope();
        self.start_entry_block();

        let mut vars = Vec::new();
        collect_var_declarations(&program.body, &mut vars);
        for ident in vars {
            self.scopes.insert(ident.name.clone(), Binding::Global);
        }

        self.lower_block_body(&program.body);
        self.finish_function_body();
        self.scopes.close_scope(scope);

        let state = self.state.take().expect("No current function");
        self.module.set_function(id, state.func);
        std::mem::replace(&mut self.module, IrModule::new(""))
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// Lower a nested function literal and return the closure register
    ///
    /// Anonymous functions take `name_hint` (the variable or property they
    /// are assigned to) when there is one.
    fn lower_function_node(&mut self, node: &FunctionNode, name_hint: Option<&str>) -> Register {
        let name = match (&node.name, name_hint) {
            (Some(name), _) => name.clone(),
            (None, Some(hint)) => hint.to_string(),
            (None, None) => {
                self.anonymous_counter += 1;
                format!("anonymous{}", self.anonymous_counter)
            }
        };
        let param_count = node.params.len() as u32;
        let id = self.module.reserve_function(name.clone(), param_count);
        log::trace!("lowering function '{}' as {}", name, id);

        let mut func = IrFunction::new(name, param_count);
        func.is_generator = node.is_generator || node.is_async;
        func.strict = node.strict || self.current_function().strict;
        func.source_span = node.span;

        let mut state = FunctionState::new(id, func);
        state.is_arrow = node.is_arrow;
        if let FunctionKind::Constructor { super_class } = &node.kind {
            state.super_class = super_class.clone();
        }

        let enclosing = self.state.replace(state).expect("No current function");
        self.outer.push(enclosing);

        let scope = self.scopes.open_scope();
        self.start_entry_block();
        self.lower_parameters(&node.params);
        if self.current_function().is_generator {
            self.emit_generator_prologue();
        }

        match &node.body {
            FunctionBody::Block(body) => {
                let mut vars = Vec::new();
                collect_var_declarations(body, &mut vars);
                for ident in vars {
                    if self.scopes.find_in_current_scope(&ident.name).is_none() {
                        let binding = self.declare_binding(&ident, false);
                        let undef = self.undefined();
                        self.store_binding(binding, undef);
                    }
                }
                self.lower_block_body(body);
                self.finish_function_body();
            }
            FunctionBody::Expression(body) => {
                let value = self.lower_expr(body);
                self.emit_return(value);
            }
        }
        self.scopes.close_scope(scope);

        let enclosing = self.outer.pop().expect("function stack underflow");
        let state = self.state.replace(enclosing).expect("No current function");
        self.module.set_function(id, state.func);

        let dest = self.alloc_register(IrType::OBJECT);
        self.emit(IrInstr::CreateFunction { dest, function: id });
        dest
    }

    /// Create the entry block and load `this` for non-arrow functions
    fn start_entry_block(&mut self) {
        let entry = self.alloc_block();
        self.current_function_mut().entry_block = entry;
        self.start_block(entry, "entry");
        if !self.state().is_arrow {
            let this = self.alloc_register(IrType::ANY);
            self.emit(IrInstr::LoadParam { dest: this, index: 0 });
            self.state_mut().this_reg = Some(this);
        }
    }

    fn lower_parameters(&mut self, params: &[Identifier]) {
        for (i, param) in params.iter().enumerate() {
            let value = self.alloc_register(IrType::ANY.without_empty());
            self.emit(IrInstr::LoadParam {
                dest: value,
                index: i as u32 + 1,
            });
            let binding = self.declare_binding(param, false);
            self.store_binding(binding, value);
        }
    }

    /// Fall off the end of a body: `return undefined`
    fn finish_function_body(&mut self) {
        if !self.current_block_is_terminated() {
            let undef = self.undefined();
            self.set_terminator(Terminator::Return(undef));
        }
    }

    /// Return from the current function, running pending finalizers first
    fn emit_return(&mut self, value: Register) {
        self.emit_finalizers_before_exit();
        if !self.current_block_is_terminated() {
            self.set_terminator(Terminator::Return(value));
        }
    }

    /// Replay the `finally` bodies of every enclosing try region, innermost
    /// first, leaving each region before running its finalizer
    fn emit_finalizers_before_exit(&mut self) {
        let saved = self.state().try_stack.clone();
        while let Some(ctx) = self.state_mut().try_stack.pop() {
            self.emit(IrInstr::TryEnd);
            if let Some(finalizer) = &ctx.finalizer {
                self.lower_scoped_block(finalizer);
            }
            if self.current_block_is_terminated() {
                break;
            }
        }
        self.state_mut().try_stack = saved;
    }

    // ========================================================================
    // Bindings
    // ========================================================================

    /// Allocate storage for a declaration in the current scope
    fn declare_binding(&mut self, ident: &Identifier, tdz: bool) -> Binding {
        let binding = if self.semantic.decl(ident.id).captured {
            let owner = self.state().id;
            let var = self.module.alloc_frame_var(owner);
            self.current_function_mut().declare_frame_var(var);
            Binding::Frame { var, tdz }
        } else {
            let slot = self.current_function_mut().alloc_stack_slot();
            self.emit(IrInstr::AllocStack { slot });
            Binding::Stack {
                slot,
                owner: self.state().id,
                tdz,
            }
        };
        self.scopes.insert(ident.name.clone(), binding);
        binding
    }

    /// Declare the let/const bindings of one block and mark them uninitialized
    fn hoist_lexical_declarations(&mut self, body: &[Statement]) {
        for stmt in body {
            let Statement::VariableDeclaration(decl) = stmt else {
                continue;
            };
            if decl.kind == VariableKind::Var {
                continue;
            }
            for declarator in &decl.declarations {
                let binding = self.declare_binding(&declarator.name, true);
                let empty = self.emit_const(IrConstant::Empty);
                self.store_binding(binding, empty);
            }
        }
    }

    fn load_binding(&mut self, name: &str, binding: Binding) -> Register {
        let raw_ty = if binding.has_tdz() {
            IrType::ANY
        } else {
            IrType::ANY.without_empty()
        };
        let raw = match binding {
            Binding::Stack { slot, owner, .. } => {
                if owner != self.state().id {
                    log::warn!("'{}' lives on another function's stack; reading undefined", name);
                    return self.undefined();
                }
                let dest = self.alloc_register(raw_ty);
                self.emit(IrInstr::LoadStack { dest, slot });
                dest
            }
            Binding::Frame { var, .. } => {
                let dest = self.alloc_register(raw_ty);
                self.emit(IrInstr::LoadFrame { dest, var });
                dest
            }
            Binding::Global => {
                let dest = self.alloc_register(IrType::ANY.without_empty());
                self.emit(IrInstr::LoadGlobal {
                    dest,
                    name: name.to_string(),
                });
                return dest;
            }
        };
        if binding.has_tdz() {
            let dest = self.alloc_register(IrType::ANY.without_empty());
            self.emit(IrInstr::ThrowIfEmpty { dest, value: raw });
            dest
        } else {
            raw
        }
    }

    fn store_binding(&mut self, binding: Binding, value: Register) {
        match binding {
            Binding::Stack { slot, owner, .. } => {
                if owner == self.state().id {
                    self.emit(IrInstr::StoreStack { slot, value });
                } else {
                    log::warn!("dropping store to another function's stack slot {}", slot);
                }
            }
            Binding::Frame { var, .. } => self.emit(IrInstr::StoreFrame { var, value }),
            Binding::Global => {}
        }
    }

    /// Store to a named variable, checking the TDZ of let/const bindings first
    fn assign_variable(&mut self, name: &str, value: Register) {
        match self.scopes.lookup(&name.to_string()).copied() {
            Some(Binding::Global) | None => self.emit(IrInstr::StoreGlobal {
                name: name.to_string(),
                value,
            }),
            Some(binding) => {
                if binding.has_tdz() {
                    self.load_binding(name, binding);
                }
                self.store_binding(binding, value);
            }
        }
    }

    /// Load a named variable; unresolved names are global loads
    fn load_variable(&mut self, name: &str) -> Register {
        match self.scopes.lookup(&name.to_string()).copied() {
            Some(binding) => self.load_binding(name, binding),
            None => {
                if name == "arguments" && !self.nearest_non_arrow_is_global() {
                    return self.lower_arguments();
                }
                if name == "undefined" {
                    return self.undefined();
                }
                let dest = self.alloc_register(IrType::ANY.without_empty());
                self.emit(IrInstr::LoadGlobal {
                    dest,
                    name: name.to_string(),
                });
                dest
            }
        }
    }

    /// Whether `name` resolves to a local binding
    fn is_local(&self, name: &str) -> bool {
        matches!(
            self.scopes.lookup(&name.to_string()),
            Some(Binding::Stack { .. }) | Some(Binding::Frame { .. })
        )
    }

    // ========================================================================
    // `this` and `arguments`
    // ========================================================================

    fn lower_this(&mut self) -> Register {
        if !self.state().is_arrow {
            return self.state().this_reg.expect("non-arrow function without this");
        }
        self.load_captured(Captured::This)
    }

    fn lower_arguments(&mut self) -> Register {
        if !self.state().is_arrow {
            return self.state_mut().ensure_arguments();
        }
        self.load_captured(Captured::Arguments)
    }

    fn nearest_non_arrow_is_global(&self) -> bool {
        let state = self.state();
        if !state.is_arrow {
            return state.is_global;
        }
        self.outer
            .iter()
            .rev()
            .find(|s| !s.is_arrow)
            .map_or(true, |s| s.is_global)
    }

    /// Read `this` or `arguments` of the nearest enclosing non-arrow function
    /// through a frame variable that function stores on entry
    fn load_captured(&mut self, what: Captured) -> Register {
        let idx = self
            .outer
            .iter()
            .rposition(|s| !s.is_arrow)
            .expect("arrow function outside any function");
        let existing = match what {
            Captured::This => self.outer[idx].captured_this,
            Captured::Arguments => self.outer[idx].captured_arguments,
        };
        let var = match existing {
            Some(var) => var,
            None => {
                let owner = self.outer[idx].id;
                let var = self.module.alloc_frame_var(owner);
                let enclosing = &mut self.outer[idx];
                enclosing.func.declare_frame_var(var);
                let value = match what {
                    Captured::This => enclosing.this_reg.expect("non-arrow function without this"),
                    Captured::Arguments => enclosing.ensure_arguments(),
                };
                enclosing.insert_in_entry(IrInstr::StoreFrame { var, value }, Some(value));
                match what {
                    Captured::This => enclosing.captured_this = Some(var),
                    Captured::Arguments => enclosing.captured_arguments = Some(var),
                }
                var
            }
        };
        let ty = match what {
            Captured::This => IrType::ANY.without_empty(),
            Captured::Arguments => IrType::OBJECT,
        };
        let dest = self.alloc_register(ty);
        self.emit(IrInstr::LoadFrame { dest, var });
        dest
    }

    /// The nearest function that is not an arrow (the one owning `this`)
    fn non_arrow_state_mut(&mut self) -> &mut FunctionState {
        if self.state().is_arrow {
            self.outer
                .iter_mut()
                .rev()
                .find(|s| !s.is_arrow)
                .expect("arrow function outside any function")
        } else {
            self.state_mut()
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn state(&self) -> &FunctionState {
        self.state.as_ref().expect("No current function")
    }

    fn state_mut(&mut self) -> &mut FunctionState {
        self.state.as_mut().expect("No current function")
    }

    fn current_function(&self) -> &IrFunction {
        &self.state().func
    }

    /// Get the current function mutably
    fn current_function_mut(&mut self) -> &mut IrFunction {
        &mut self.state_mut().func
    }

    fn current_block(&self) -> BasicBlockId {
        self.state().current_block
    }

    /// Get the current block mutably
    fn current_block_mut(&mut self) -> &mut BasicBlock {
        let block_id = self.current_block();
        self.current_function_mut()
            .get_block_mut(block_id)
            .expect("Current block not found")
    }

    /// Allocate a new register
    fn alloc_register(&mut self, ty: IrType) -> Register {
        self.current_function_mut().alloc_register(ty)
    }

    /// Allocate a new basic block ID
    fn alloc_block(&mut self) -> BasicBlockId {
        self.current_function_mut().alloc_block_id()
    }

    /// Add a block and make it current
    fn start_block(&mut self, id: BasicBlockId, label: &str) {
        self.current_function_mut()
            .add_block(BasicBlock::with_label(id, label));
        self.state_mut().current_block = id;
    }

    /// Add an instruction to the current block
    fn emit(&mut self, instr: IrInstr) {
        self.current_block_mut().add_instr(instr);
    }

    /// Set the terminator for the current block
    fn set_terminator(&mut self, term: Terminator) {
        self.current_block_mut().set_terminator(term);
    }

    /// Check if the current block is terminated
    fn current_block_is_terminated(&self) -> bool {
        self.current_function()
            .get_block(self.current_block())
            .map(|b| b.is_terminated())
            .unwrap_or(false)
    }

    /// Jump to `target` unless the current block already ended
    fn jump_to(&mut self, target: BasicBlockId) {
        if !self.current_block_is_terminated() {
            self.set_terminator(Terminator::Jump(target));
        }
    }

    fn emit_const(&mut self, value: IrConstant) -> Register {
        let dest = self.alloc_register(value.ty());
        self.emit(IrInstr::Const { dest, value });
        dest
    }

    fn undefined(&mut self) -> Register {
        self.emit_const(IrConstant::Undefined)
    }

    fn string_const(&mut self, s: &str) -> Register {
        self.emit_const(IrConstant::String(s.to_string()))
    }

    fn number_const(&mut self, n: f64) -> Register {
        self.emit_const(IrConstant::Number(n))
    }

    fn static_type(&self, expr: &crate::ast::Expression) -> StaticType {
        self.flow.node_type(expr.node_id())
    }

    fn report_error(&mut self, span: Span, code: ErrorCode, message: impl Into<String>) {
        self.errors.error(self.file_id, span, code, message);
    }

    fn report(&mut self, diag: Diagnostic) {
        self.errors.report(diag);
    }
}

/// Collect the `var` declarations of a body, not descending into functions
fn collect_var_declarations(body: &[Statement], out: &mut Vec<Identifier>) {
    for stmt in body {
        match stmt {
            Statement::VariableDeclaration(decl) if decl.kind == VariableKind::Var => {
                for declarator in &decl.declarations {
                    if !out.iter().any(|i| i.name == declarator.name.name) {
                        out.push(declarator.name.clone());
                    }
                }
            }
            Statement::Block(block) => collect_var_declarations(&block.body, out),
            Statement::If(if_stmt) => {
                collect_var_declarations(std::slice::from_ref(&*if_stmt.consequent), out);
                if let Some(alt) = &if_stmt.alternate {
                    collect_var_declarations(std::slice::from_ref(&**alt), out);
                }
            }
            Statement::Try(try_stmt) => {
                collect_var_declarations(&try_stmt.block, out);
                if let Some(handler) = &try_stmt.handler {
                    collect_var_declarations(&handler.body, out);
                }
                if let Some(finalizer) = &try_stmt.finalizer {
                    collect_var_declarations(finalizer, out);
                }
            }
            _ => {}
        }
    }
}

/// Lower a program with default settings; diagnostics go to `errors`
pub fn lower_program(
    name: &str,
    program: &Program,
    semantic: &SemanticContext,
    flow: &FlowContext,
    errors: &mut ErrorManager,
) -> IrModule {
    Lowerer::new(semantic, flow, errors).lower_program(name, program)
}
