//! Call lowering: plain and method calls, `super(...)`, direct `eval`,
//! native calls, and `new`

use super::Lowerer;
use crate::ast::{CallExpression, Expression, MemberProperty, NewExpression, StaticType};
use crate::compiler::diagnostics::codes;
use crate::compiler::ir::{
    BasicBlockId, BinaryOp, BuiltinMethod, IrInstr, IrType, PropKey, Register, Terminator,
};

impl<'a> Lowerer<'a> {
    /// Lower a call, possibly as one link of an optional chain
    pub(super) fn lower_call_link(&mut self, call: &CallExpression, chain: Option<BasicBlockId>) -> Register {
        if let Expression::Super(_) = &*call.callee {
            return self.lower_super_call(call);
        }
        if let Expression::Member(member) = &*call.callee {
            let is_push = matches!(&member.property, MemberProperty::Named(name) if name == "push");
            if is_push && !member.optional && self.static_type(&member.object) == StaticType::FastArray {
                return self.lower_fast_array_push(&member.object, &call.arguments);
            }
        }
        if let Expression::Identifier(ident) = &*call.callee {
            if ident.name == "eval" && !self.is_local("eval") && !call.optional && !call.has_spread() {
                return self.lower_eval_call(call);
            }
        }

        let (callee, this) = match &*call.callee {
            Expression::Member(member) => {
                let (object, value) = self.lower_member_link(member, chain);
                (value, object)
            }
            other => {
                let callee = self.lower_chain_operand(other, chain);
                (callee, self.undefined())
            }
        };
        if call.optional {
            self.branch_if_short_circuit(callee, chain);
        }

        if self.static_type(&call.callee) == StaticType::NativeFunction {
            return self.lower_native_call(call, callee);
        }
        self.emit_call(callee, this, &call.arguments)
    }

    /// Call `callee` with `this`; spread arguments go through `apply`
    pub(super) fn emit_call(&mut self, callee: Register, this: Register, arguments: &[Expression]) -> Register {
        if arguments.iter().any(Expression::is_spread) {
            let elements: Vec<Option<&Expression>> = arguments.iter().map(Some).collect();
            let args = self.lower_array_from_elements(&elements);
            let dest = self.alloc_register(IrType::ANY.without_empty());
            self.emit(IrInstr::CallBuiltin {
                dest,
                builtin: BuiltinMethod::Apply,
                args: vec![callee, args, this],
            });
            return dest;
        }

        let args = arguments.iter().map(|a| self.lower_expr(a)).collect();
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

    fn lower_native_call(&mut self, call: &CallExpression, callee: Register) -> Register {
        if call.has_spread() {
            self.report_error(
                call.span,
                codes::NATIVE_SPREAD,
                "spread arguments are not supported for native functions",
            );
            return self.undefined();
        }
        let args = call.arguments.iter().map(|a| self.lower_expr(a)).collect();
        let dest = self.alloc_register(self.flow_ir_type(call.id));
        self.emit(IrInstr::CallNative { dest, callee, args });
        dest
    }

    /// `eval(...)` may be a direct eval; decide at runtime by comparing the
    /// callee against the builtin `eval`
    fn lower_eval_call(&mut self, call: &CallExpression) -> Register {
        let callee = self.lower_expr(&call.callee);
        let args: Vec<Register> = call.arguments.iter().map(|a| self.lower_expr(a)).collect();

        let eval = self.alloc_register(IrType::OBJECT);
        self.emit(IrInstr::GetBuiltinClosure {
            dest: eval,
            builtin: BuiltinMethod::Eval,
        });
        let is_eval = self.emit_binary(BinaryOp::StrictEq, callee, eval);

        let eval_block = self.alloc_block();
        let call_block = self.alloc_block();
        let merge_block = self.alloc_block();
        self.set_terminator(Terminator::Branch {
            cond: is_eval,
            then_block: eval_block,
            else_block: call_block,
        });

        self.start_block(eval_block, "eval.direct");
        let source = match args.first() {
            Some(&source) => source,
            None => self.undefined(),
        };
        let strict = self.current_function().strict;
        let eval_result = self.alloc_register(IrType::ANY.without_empty());
        self.emit(IrInstr::DirectEval {
            dest: eval_result,
            source,
            strict,
        });
        let eval_end = self.current_block();
        self.set_terminator(Terminator::Jump(merge_block));

        self.start_block(call_block, "eval.call");
        let this = self.undefined();
        let call_result = self.alloc_register(IrType::ANY.without_empty());
        self.emit(IrInstr::Call {
            dest: call_result,
            callee,
            this,
            args,
            target: None,
        });
        let call_end = self.current_block();
        self.set_terminator(Terminator::Jump(merge_block));

        self.start_block(merge_block, "eval.merge");
        self.emit_phi(vec![(eval_end, eval_result), (call_end, call_result)])
    }

    fn lower_super_call(&mut self, call: &CallExpression) -> Register {
        let state = self.non_arrow_state_mut();
        let Some(super_class) = state.super_class.clone() else {
            self.report_error(
                call.span,
                codes::SUPER_OUTSIDE_DERIVED,
                "super() call is only allowed in a derived constructor",
            );
            return self.undefined();
        };
        let called_before = std::mem::replace(&mut state.super_called, true);
        if called_before {
            self.report_error(
                call.span,
                codes::MULTIPLE_SUPER,
                "multiple super() calls in constructor",
            );
        }

        let callee = self.lower_expr(&super_class);
        let this = self.lower_this();
        self.emit_call(callee, this, &call.arguments)
    }

    /// `arr.push(...)` on a fast array: append in place, result is undefined
    fn lower_fast_array_push(&mut self, array: &Expression, arguments: &[Expression]) -> Register {
        let array = self.lower_expr(array);
        for arg in arguments {
            match arg {
                Expression::Spread(spread) => {
                    if self.static_type(&spread.argument) == StaticType::FastArray {
                        let other = self.lower_expr(&spread.argument);
                        self.emit(IrInstr::FastArrayAppend { array, other });
                    } else {
                        self.report_error(
                            spread.span,
                            codes::TYPED_ARRAY_SPREAD,
                            "spread of non-array is not supported in typed arrays",
                        );
                    }
                }
                value => {
                    let value = self.lower_expr(value);
                    self.emit(IrInstr::FastArrayPush { array, value });
                }
            }
        }
        self.undefined()
    }

    pub(super) fn lower_new(&mut self, new: &NewExpression) -> Register {
        let callee = self.lower_expr(&new.callee);

        if new.arguments.iter().any(Expression::is_spread) {
            let elements: Vec<Option<&Expression>> = new.arguments.iter().map(Some).collect();
            let args = self.lower_array_from_elements(&elements);
            // Two-argument apply constructs the callee
            let dest = self.alloc_register(IrType::OBJECT);
            self.emit(IrInstr::CallBuiltin {
                dest,
                builtin: BuiltinMethod::Apply,
                args: vec![callee, args],
            });
            return dest;
        }

        let args = new.arguments.iter().map(|a| self.lower_expr(a)).collect();
        let prototype = self.alloc_register(IrType::ANY.without_empty());
        self.emit(IrInstr::LoadProperty {
            dest: prototype,
            object: callee,
            key: PropKey::Named("prototype".to_string()),
        });
        let this = self.alloc_register(IrType::OBJECT);
        self.emit(IrInstr::CreateThis {
            dest: this,
            prototype,
            closure: callee,
        });
        let result = self.alloc_register(IrType::ANY.without_empty());
        self.emit(IrInstr::Call {
            dest: result,
            callee,
            this,
            args,
            target: None,
        });
        let dest = self.alloc_register(IrType::OBJECT);
        self.emit(IrInstr::GetConstructedObject { dest, this, result });
        dest
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{instrs, lower, lower_with};
    use crate::ast::{AstBuilder, FlowContext, SemanticContext, StaticType};
    use crate::compiler::diagnostics::codes;
    use crate::compiler::ir::{BuiltinMethod, IrInstr, PrettyPrint, Terminator};

    #[test]
    fn test_method_call_passes_object_as_this() {
        let b = AstBuilder::new();
        let call = b.call(b.member(b.ident("o"), "m"), vec![b.num(1.0)]);
        let (module, _) = lower(&b.program(vec![b.expr_stmt(call)]));
        let all = instrs(&module.functions[0]);
        let object = all
            .iter()
            .find_map(|i| match i {
                IrInstr::LoadGlobal { dest, name } if name == "o" => Some(*dest),
                _ => None,
            })
            .unwrap();
        let this = all
            .iter()
            .find_map(|i| match i {
                IrInstr::Call { this, args, .. } => {
                    assert_eq!(args.len(), 1);
                    Some(*this)
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(this, object);
    }

    #[test]
    fn test_spread_call_uses_apply() {
        let b = AstBuilder::new();
        let call = b.call(b.ident("f"), vec![b.num(1.0), b.spread(b.ident("xs"))]);
        let (module, _) = lower(&b.program(vec![b.expr_stmt(call)]));
        let all = instrs(&module.functions[0]);
        assert!(!all.iter().any(|i| matches!(i, IrInstr::Call { .. })));
        assert!(all.iter().any(|i| matches!(
            i,
            IrInstr::CallBuiltin { builtin: BuiltinMethod::Apply, args, .. } if args.len() == 3
        )));
        assert!(all.iter().any(|i| matches!(
            i,
            IrInstr::CallBuiltin {
                builtin: BuiltinMethod::ArraySpread,
                ..
            }
        )));
    }

    #[test]
    fn test_eval_call_checks_builtin() {
        let b = AstBuilder::new();
        let call = b.call(b.ident("eval"), vec![b.str("1 + 1")]);
        let (module, _) = lower(&b.program(vec![b.expr_stmt(call)]));
        let global = &module.functions[0];
        let all = instrs(global);
        assert!(all.iter().any(|i| matches!(
            i,
            IrInstr::GetBuiltinClosure {
                builtin: BuiltinMethod::Eval,
                ..
            }
        )));
        assert!(all.iter().any(|i| matches!(i, IrInstr::DirectEval { strict: false, .. })));
        assert!(all.iter().any(|i| matches!(i, IrInstr::Call { .. })));
        assert!(matches!(global.entry().unwrap().terminator, Terminator::Branch { .. }));
        assert!(module.validate().is_ok(), "{}", module.pretty_print());
    }

    #[test]
    fn test_super_call_rules() {
        let b = AstBuilder::new();
        let ctor = b.constructor(
            b.ident("Base"),
            &[],
            vec![
                b.expr_stmt(b.call(b.super_(), vec![])),
                b.expr_stmt(b.call(b.super_(), vec![])),
            ],
        );
        let plain = b.function(Some("f"), &[], vec![b.expr_stmt(b.call(b.super_(), vec![]))]);
        let program = b.program(vec![
            b.expr_stmt(b.function_expr(ctor)),
            b.expr_stmt(b.function_expr(plain)),
        ]);
        let (_, errors) = lower(&program);
        let messages: Vec<_> = errors.diagnostics().iter().map(|d| d.message().to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "multiple super() calls in constructor".to_string(),
                "super() call is only allowed in a derived constructor".to_string(),
            ]
        );
        assert_eq!(errors.diagnostics()[0].code(), Some(codes::MULTIPLE_SUPER));
    }

    #[test]
    fn test_super_call_passes_this() {
        let b = AstBuilder::new();
        let ctor = b.constructor(b.ident("Base"), &[], vec![b.expr_stmt(b.call(b.super_(), vec![]))]);
        let (module, errors) = lower(&b.program(vec![b.expr_stmt(b.function_expr(ctor))]));
        assert!(!errors.has_errors());
        let ctor = module.get_function_by_name("constructor").unwrap();
        let all = instrs(ctor);
        let IrInstr::LoadParam { dest: this, index: 0 } = all[0] else {
            panic!("expected this load first");
        };
        assert!(all.iter().any(|i| matches!(i, IrInstr::Call { this: t, .. } if *t == this)));
        assert!(all
            .iter()
            .any(|i| matches!(i, IrInstr::LoadGlobal { name, .. } if name == "Base")));
    }

    #[test]
    fn test_native_call() {
        let b = AstBuilder::new();
        let callee = b.ident("sqrt");
        let spread_callee = b.ident("sqrt");
        let mut flow = FlowContext::new();
        flow.set_type(callee.node_id(), StaticType::NativeFunction);
        flow.set_type(spread_callee.node_id(), StaticType::NativeFunction);
        let program = b.program(vec![
            b.expr_stmt(b.call(callee, vec![b.num(4.0)])),
            b.expr_stmt(b.call(spread_callee, vec![b.spread(b.ident("xs"))])),
        ]);
        let (module, errors) = lower_with(&program, &SemanticContext::new(), &flow);
        let all = instrs(&module.functions[0]);
        assert_eq!(
            all.iter().filter(|i| matches!(i, IrInstr::CallNative { .. })).count(),
            1
        );
        assert_eq!(errors.error_count(), 1);
        assert_eq!(errors.diagnostics()[0].code(), Some(codes::NATIVE_SPREAD));
    }

    #[test]
    fn test_fast_array_push() {
        let b = AstBuilder::new();
        let arr = b.ident("arr");
        let other = b.ident("other");
        let untyped = b.ident("plain");
        let mut flow = FlowContext::new();
        flow.set_type(arr.node_id(), StaticType::FastArray);
        flow.set_type(other.node_id(), StaticType::FastArray);
        let call = b.call(
            b.member(arr, "push"),
            vec![b.num(1.0), b.spread(other), b.spread(untyped)],
        );
        let (module, errors) = lower_with(&b.program(vec![b.expr_stmt(call)]), &SemanticContext::new(), &flow);
        let all = instrs(&module.functions[0]);
        assert!(all.iter().any(|i| matches!(i, IrInstr::FastArrayPush { .. })));
        assert!(all.iter().any(|i| matches!(i, IrInstr::FastArrayAppend { .. })));
        assert!(!all.iter().any(|i| matches!(i, IrInstr::Call { .. })));
        assert_eq!(errors.diagnostics()[0].code(), Some(codes::TYPED_ARRAY_SPREAD));
    }

    #[test]
    fn test_new_expression() {
        let b = AstBuilder::new();
        let e = b.new_expr(b.ident("C"), vec![b.num(1.0)]);
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        let all = instrs(&module.functions[0]);
        let kinds: Vec<&str> = all
            .iter()
            .filter_map(|i| match i {
                IrInstr::LoadProperty { .. } => Some("load"),
                IrInstr::CreateThis { .. } => Some("create_this"),
                IrInstr::Call { .. } => Some("call"),
                IrInstr::GetConstructedObject { .. } => Some("constructed"),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec!["load", "create_this", "call", "constructed"]);
    }

    #[test]
    fn test_optional_call_in_chain() {
        let b = AstBuilder::new();
        let e = b.chain(b.opt_call(b.member(b.ident("o"), "m"), vec![]));
        let (module, errors) = lower(&b.program(vec![b.expr_stmt(e)]));
        assert!(!errors.has_errors());
        assert!(module.functions[0]
            .blocks()
            .any(|bb| matches!(bb.terminator, Terminator::BranchIfNull { .. })));
        assert!(module.validate().is_ok(), "{}", module.pretty_print());
    }
}
