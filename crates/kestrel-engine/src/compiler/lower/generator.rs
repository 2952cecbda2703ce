//! Generator and async lowering
//!
//! Async functions are lowered as generators: `await` suspends exactly like
//! `yield` and the runtime's async driver resumes with the settled value.
//!
//! Every suspension point has the same shape: `SaveAndYield` ends the block,
//! the next block starts with `ResumeGenerator`, and a branch on the
//! `is_return` flag either returns (running pending finalizers) or falls
//! into the continuation.

use super::{Lowerer, TryContext};
use crate::ast::{AwaitExpression, Expression, YieldExpression};
use crate::compiler::diagnostics::codes;
use crate::compiler::ir::{
    BasicBlockId, BinaryOp, BuiltinMethod, IrConstant, IrInstr, IrType, PropKey, Register, StackSlotId,
    Terminator,
};

impl<'a> Lowerer<'a> {
    /// Start a generator body: the first resume happens before any user code
    pub(super) fn emit_generator_prologue(&mut self) {
        self.emit(IrInstr::StartGenerator);
        let is_return = self.alloc_slot();
        self.emit_resume(is_return);
    }

    pub(super) fn lower_yield(&mut self, y: &YieldExpression) -> Register {
        if !self.current_function().is_generator {
            self.report_error(y.span, codes::INVALID_EXPRESSION, "yield outside of a generator function");
            return self.undefined();
        }
        if y.delegate {
            let Some(argument) = &y.argument else {
                self.report_error(y.span, codes::INVALID_EXPRESSION, "yield* requires an operand");
                return self.undefined();
            };
            return self.lower_yield_star(argument);
        }
        let value = match &y.argument {
            Some(argument) => self.lower_expr(argument),
            None => self.undefined(),
        };
        self.emit_yield(value)
    }

    pub(super) fn lower_await(&mut self, a: &AwaitExpression) -> Register {
        if !self.current_function().is_generator {
            self.report_error(a.span, codes::INVALID_EXPRESSION, "await outside of an async function");
            return self.undefined();
        }
        let value = self.lower_expr(&a.argument);
        self.emit_yield(value)
    }

    /// Suspend with `value` and return the value sent on resume
    fn emit_yield(&mut self, value: Register) -> Register {
        let is_return = self.alloc_slot();
        let next = self.alloc_block();
        self.set_terminator(Terminator::SaveAndYield { value, next });
        self.start_block(next, "yield.next");
        self.emit_resume(is_return)
    }

    /// Resume point: forced returns leave the function, anything else
    /// continues in a fresh block
    fn emit_resume(&mut self, is_return: StackSlotId) -> Register {
        let resumed = self.alloc_register(IrType::ANY.without_empty());
        self.emit(IrInstr::ResumeGenerator {
            dest: resumed,
            is_return,
        });
        let flag = self.load_slot(is_return, IrType::BOOLEAN);

        let ret = self.alloc_block();
        let cont = self.alloc_block();
        self.set_terminator(Terminator::Branch {
            cond: flag,
            then_block: ret,
            else_block: cont,
        });

        self.start_block(ret, "resume.return");
        self.emit_return(resumed);

        self.start_block(cont, "resume.next");
        resumed
    }

    // ========================================================================
    // yield*
    // ========================================================================

    /// Delegate to an inner iterator. Results of `next` are passed through
    /// unwrapped (`generatorSetDelegated`); `return` and `throw` sent to this
    /// generator are forwarded to the inner iterator.
    fn lower_yield_star(&mut self, argument: &Expression) -> Register {
        let iterable = self.lower_expr(argument);
        let iterator = self.alloc_register(IrType::OBJECT);
        self.emit(IrInstr::CallBuiltin {
            dest: iterator,
            builtin: BuiltinMethod::GetIterator,
            args: vec![iterable],
        });
        let next_method = self.load_named(iterator, "next");

        let received = self.alloc_slot();
        let undef = self.undefined();
        self.emit(IrInstr::StoreStack {
            slot: received,
            value: undef,
        });
        let is_return = self.alloc_slot();
        let result = self.alloc_slot();

        let get_next = self.alloc_block();
        let body = self.alloc_block();
        let try_body = self.alloc_block();
        let resume = self.alloc_block();
        let cont = self.alloc_block();
        let ret = self.alloc_block();
        let handler = self.alloc_block();
        let exit = self.alloc_block();
        self.set_terminator(Terminator::Jump(get_next));

        // Ask the inner iterator for its next result
        self.start_block(get_next, "yield*.next");
        let sent = self.load_slot(received, IrType::ANY.without_empty());
        let step = self.call_with(next_method, iterator, vec![sent]);
        self.emit(IrInstr::StoreStack {
            slot: result,
            value: step,
        });
        let done = self.load_named(step, "done");
        self.set_terminator(Terminator::Branch {
            cond: done,
            then_block: exit,
            else_block: body,
        });

        self.start_block(body, "yield*.body");
        self.set_terminator(Terminator::TryStart {
            body: try_body,
            handler,
        });

        self.start_block(try_body, "yield*.try");
        let unused = self.alloc_register(IrType::UNDEFINED);
        self.emit(IrInstr::CallBuiltin {
            dest: unused,
            builtin: BuiltinMethod::GeneratorSetDelegated,
            args: vec![],
        });
        let current = self.load_slot(result, IrType::OBJECT);
        self.set_terminator(Terminator::SaveAndYield {
            value: current,
            next: resume,
        });

        self.start_block(resume, "yield*.resume");
        let resumed = self.alloc_register(IrType::ANY.without_empty());
        self.emit(IrInstr::ResumeGenerator {
            dest: resumed,
            is_return,
        });
        self.emit(IrInstr::StoreStack {
            slot: received,
            value: resumed,
        });
        let flag = self.load_slot(is_return, IrType::BOOLEAN);
        self.set_terminator(Terminator::Branch {
            cond: flag,
            then_block: ret,
            else_block: cont,
        });

        self.start_block(cont, "yield*.cont");
        self.emit(IrInstr::TryEnd);
        self.set_terminator(Terminator::Jump(get_next));

        // Forced return: still inside the try region
        self.state_mut().try_stack.push(TryContext { finalizer: None });
        self.start_block(ret, "yield*.return");
        let return_method = self.get_method(iterator, "return");
        let none = self.alloc_block();
        let have = self.alloc_block();
        self.branch_if_undefined(return_method, none, have);

        self.start_block(have, "yield*.return.call");
        let inner = self.call_with(return_method, iterator, vec![resumed]);
        let inner_done = self.load_named(inner, "done");
        let is_done = self.alloc_block();
        let not_done = self.alloc_block();
        self.set_terminator(Terminator::Branch {
            cond: inner_done,
            then_block: is_done,
            else_block: not_done,
        });

        self.start_block(is_done, "yield*.return.done");
        let value = self.load_named(inner, "value");
        self.emit_return(value);

        self.start_block(not_done, "yield*.return.more");
        self.emit(IrInstr::StoreStack {
            slot: result,
            value: inner,
        });
        self.emit(IrInstr::TryEnd);
        self.set_terminator(Terminator::Jump(body));

        self.start_block(none, "yield*.return.none");
        self.emit_return(resumed);
        self.state_mut().try_stack.pop();

        // Exception thrown into this generator
        self.start_block(handler, "yield*.catch");
        let exception = self.alloc_register(IrType::ANY.without_empty());
        self.emit(IrInstr::Catch { dest: exception });
        let throw_method = self.get_method(iterator, "throw");
        let no_throw = self.alloc_block();
        let has_throw = self.alloc_block();
        self.branch_if_undefined(throw_method, no_throw, has_throw);

        self.start_block(has_throw, "yield*.throw");
        let inner = self.call_with(throw_method, iterator, vec![exception]);
        self.emit(IrInstr::StoreStack {
            slot: result,
            value: inner,
        });
        let inner_done = self.load_named(inner, "done");
        self.set_terminator(Terminator::Branch {
            cond: inner_done,
            then_block: exit,
            else_block: body,
        });

        // No `throw` method: close the iterator, then report the protocol error
        self.start_block(no_throw, "yield*.throw.missing");
        let close_method = self.get_method(iterator, "return");
        let throw_error = self.alloc_block();
        let close = self.alloc_block();
        self.branch_if_undefined(close_method, throw_error, close);

        self.start_block(close, "yield*.throw.close");
        self.call_with(close_method, iterator, vec![]);
        self.set_terminator(Terminator::Jump(throw_error));

        self.start_block(throw_error, "yield*.throw.error");
        self.set_terminator(Terminator::ThrowTypeError(
            "yield* delegate must have a .throw() method".to_string(),
        ));

        self.start_block(exit, "yield*.exit");
        let last = self.load_slot(result, IrType::OBJECT);
        self.load_named(last, "value")
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn alloc_slot(&mut self) -> StackSlotId {
        let slot = self.current_function_mut().alloc_stack_slot();
        self.emit(IrInstr::AllocStack { slot });
        slot
    }

    fn load_slot(&mut self, slot: StackSlotId, ty: IrType) -> Register {
        let dest = self.alloc_register(ty);
        self.emit(IrInstr::LoadStack { dest, slot });
        dest
    }

    fn load_named(&mut self, object: Register, name: &str) -> Register {
        let dest = self.alloc_register(IrType::ANY.without_empty());
        self.emit(IrInstr::LoadProperty {
            dest,
            object,
            key: PropKey::Named(name.to_string()),
        });
        dest
    }

    fn call_with(&mut self, callee: Register, this: Register, args: Vec<Register>) -> Register {
        let dest = self.alloc_register(IrType::ANY.without_empty());
        self.emit(IrInstr::Call {
            dest,
            callee,
            this,
            args,
            target: None,
        });
        dest
    }

    fn get_method(&mut self, object: Register, name: &str) -> Register {
        let key = self.string_const(name);
        let dest = self.alloc_register(IrType::ANY.without_empty());
        self.emit(IrInstr::CallBuiltin {
            dest,
            builtin: BuiltinMethod::GetMethod,
            args: vec![object, key],
        });
        dest
    }

    fn branch_if_undefined(
        &mut self,
        value: Register,
        on_undefined: BasicBlockId,
        otherwise: BasicBlockId,
    ) {
        let undef = self.emit_const(IrConstant::Undefined);
        let is_undefined = self.emit_binary(BinaryOp::StrictEq, value, undef);
        self.set_terminator(Terminator::Branch {
            cond: is_undefined,
            then_block: on_undefined,
            else_block: otherwise,
        });
    }
}
