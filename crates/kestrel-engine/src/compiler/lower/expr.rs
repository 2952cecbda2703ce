//! Expression lowering
//!
//! One exhaustive dispatch over `Expression`. Kinds with their own module
//! (literals, calls, assignments, generators) are forwarded there.

use super::Lowerer;
use crate::ast::{
    self, BinaryOperator, ChainExpression, ConditionalExpression, Expression, LiteralValue,
    LogicalExpression, LogicalOperator, MemberExpression, MemberProperty, StaticType,
    UnaryExpression, UnaryOperator,
};
use crate::compiler::diagnostics::codes;
use crate::compiler::ir::{
    BasicBlockId, BinaryOp, IrConstant, IrInstr, IrType, PropKey, Register, Terminator, UnaryOp,
};

impl<'a> Lowerer<'a> {
    /// Lower an expression and return the register holding its value
    pub(super) fn lower_expr(&mut self, expr: &Expression) -> Register {
        match expr {
            Expression::Literal(lit) => self.emit_const(literal_constant(&lit.value)),
            Expression::Identifier(ident) => self.load_variable(&ident.name),
            Expression::This(_) => self.lower_this(),
            Expression::Array(array) => self.lower_array(array),
            Expression::Object(object) => self.lower_object(object),
            Expression::Function(func) | Expression::Arrow(func) => {
                self.lower_function_node(func, None)
            }
            Expression::Unary(unary) => self.lower_unary(unary),
            Expression::Update(update) => self.lower_update(update),
            Expression::Binary(binary) => self.lower_binary(binary),
            Expression::Logical(logical) => self.lower_logical(logical),
            Expression::Assignment(assign) => self.lower_assignment(assign),
            Expression::Conditional(cond) => self.lower_conditional(cond),
            Expression::Sequence(seq) => {
                let mut last = None;
                for e in &seq.expressions {
                    last = Some(self.lower_expr(e));
                }
                match last {
                    Some(reg) => reg,
                    None => self.undefined(),
                }
            }
            Expression::Member(member) => self.lower_member_link(member, None).1,
            Expression::Call(call) => self.lower_call_link(call, None),
            Expression::Chain(chain) => self.lower_chain(chain),
            Expression::New(new) => self.lower_new(new),
            Expression::Template(template) => self.lower_template(template),
            Expression::TaggedTemplate(tagged) => self.lower_tagged_template(tagged),
            Expression::Yield(y) => self.lower_yield(y),
            Expression::Await(a) => self.lower_await(a),
            Expression::Super(_) | Expression::Spread(_) | Expression::Invalid(_) => {
                self.report_error(
                    expr.span(),
                    codes::INVALID_EXPRESSION,
                    "Invalid expression encountered",
                );
                self.undefined()
            }
        }
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn lower_unary(&mut self, unary: &UnaryExpression) -> Register {
        let op = match unary.operator {
            UnaryOperator::Delete => return self.lower_delete(&unary.argument),
            UnaryOperator::Typeof => {
                let operand = match &*unary.argument {
                    Expression::Identifier(ident) => self.load_variable_for_typeof(&ident.name),
                    other => self.lower_expr(other),
                };
                return self.emit_unary(UnaryOp::Typeof, operand);
            }
            UnaryOperator::Minus => UnaryOp::Neg,
            UnaryOperator::Plus => UnaryOp::Plus,
            UnaryOperator::Not => UnaryOp::Not,
            UnaryOperator::BitNot => UnaryOp::BitNot,
            UnaryOperator::Void => UnaryOp::Void,
        };
        let operand = self.lower_expr(&unary.argument);
        self.emit_unary(op, operand)
    }

    pub(super) fn emit_unary(&mut self, op: UnaryOp, operand: Register) -> Register {
        let dest = self.alloc_register(op.result_type());
        self.emit(IrInstr::UnaryOp { dest, op, operand });
        dest
    }

    fn lower_delete(&mut self, argument: &Expression) -> Register {
        match argument {
            Expression::Member(member) => {
                let object = self.lower_expr(&member.object);
                let key = self.lower_member_key(&member.property);
                let dest = self.alloc_register(IrType::BOOLEAN);
                self.emit(IrInstr::DeleteProperty { dest, object, key });
                dest
            }
            Expression::Identifier(ident) => {
                if self.is_local(&ident.name) {
                    return self.emit_const(IrConstant::Bool(false));
                }
                let global = self.global_object();
                let dest = self.alloc_register(IrType::BOOLEAN);
                self.emit(IrInstr::DeleteProperty {
                    dest,
                    object: global,
                    key: PropKey::Named(ident.name.clone()),
                });
                dest
            }
            other => {
                self.lower_expr(other);
                self.emit_const(IrConstant::Bool(true))
            }
        }
    }

    /// `typeof x` must not throw for undeclared globals
    fn load_variable_for_typeof(&mut self, name: &str) -> Register {
        if self.scopes.lookup(&name.to_string()).is_some() || name == "arguments" || name == "undefined" {
            return self.load_variable(name);
        }
        let global = self.global_object();
        let dest = self.alloc_register(IrType::ANY.without_empty());
        self.emit(IrInstr::LoadProperty {
            dest,
            object: global,
            key: PropKey::Named(name.to_string()),
        });
        dest
    }

    fn global_object(&mut self) -> Register {
        let dest = self.alloc_register(IrType::OBJECT);
        self.emit(IrInstr::LoadGlobal {
            dest,
            name: "globalThis".to_string(),
        });
        dest
    }

    fn lower_binary(&mut self, binary: &ast::BinaryExpression) -> Register {
        // Long `a + b - c + ...` chains nest on the left; walk the spine
        // iteratively instead of recursing once per operand.
        let is_additive = |op: BinaryOperator| matches!(op, BinaryOperator::Add | BinaryOperator::Sub);
        let mut spine = vec![binary];
        let mut leftmost = &*binary.left;
        if is_additive(binary.operator) {
            while let Expression::Binary(inner) = leftmost {
                if !is_additive(inner.operator) {
                    break;
                }
                spine.push(inner);
                leftmost = &inner.left;
            }
        }

        let mut acc = self.lower_expr(leftmost);
        for node in spine.iter().rev() {
            let right = self.lower_expr(&node.right);
            acc = self.emit_binary(binary_op(node.operator), acc, right);
        }
        acc
    }

    pub(super) fn emit_binary(&mut self, op: BinaryOp, left: Register, right: Register) -> Register {
        let dest = self.alloc_register(op.result_type(left.ty, right.ty));
        self.emit(IrInstr::BinaryOp {
            dest,
            op,
            left,
            right,
        });
        dest
    }

    fn lower_logical(&mut self, logical: &LogicalExpression) -> Register {
        let left = self.lower_expr(&logical.left);
        let left_block = self.current_block();

        let eval_right = self.alloc_block();
        let merge_block = self.alloc_block();

        match logical.operator {
            // &&: falsy left is the result
            LogicalOperator::And => self.set_terminator(Terminator::Branch {
                cond: left,
                then_block: eval_right,
                else_block: merge_block,
            }),
            // ||: truthy left is the result
            LogicalOperator::Or => self.set_terminator(Terminator::Branch {
                cond: left,
                then_block: merge_block,
                else_block: eval_right,
            }),
            LogicalOperator::NullishCoalescing => self.set_terminator(Terminator::BranchIfNull {
                value: left,
                null_block: eval_right,
                not_null_block: merge_block,
            }),
        }

        self.start_block(eval_right, "logical.rhs");
        let right = self.lower_expr(&logical.right);
        let right_block = self.current_block();
        self.jump_to(merge_block);

        self.start_block(merge_block, "logical.merge");
        self.emit_phi(vec![(left_block, left), (right_block, right)])
    }

    fn lower_conditional(&mut self, cond: &ConditionalExpression) -> Register {
        let then_block = self.alloc_block();
        let else_block = self.alloc_block();
        let merge_block = self.alloc_block();

        self.lower_condition(&cond.test, then_block, else_block);

        self.start_block(then_block, "cond.then");
        let then_value = self.lower_expr(&cond.consequent);
        let then_end = self.current_block();
        self.jump_to(merge_block);

        self.start_block(else_block, "cond.else");
        let else_value = self.lower_expr(&cond.alternate);
        let else_end = self.current_block();
        self.jump_to(merge_block);

        self.start_block(merge_block, "cond.merge");
        self.emit_phi(vec![(then_end, then_value), (else_end, else_value)])
    }

    /// Lower `expr` for its truth value only, branching to `on_true` or
    /// `on_false`. Short-circuit operators become control flow directly.
    pub(super) fn lower_condition(&mut self, expr: &Expression, on_true: BasicBlockId, on_false: BasicBlockId) {
        match expr {
            Expression::Unary(unary) if unary.operator == UnaryOperator::Not => {
                self.lower_condition(&unary.argument, on_false, on_true);
            }
            Expression::Logical(logical) => match logical.operator {
                LogicalOperator::And => {
                    let rhs = self.alloc_block();
                    self.lower_condition(&logical.left, rhs, on_false);
                    self.start_block(rhs, "and.rhs");
                    self.lower_condition(&logical.right, on_true, on_false);
                }
                LogicalOperator::Or => {
                    let rhs = self.alloc_block();
                    self.lower_condition(&logical.left, on_true, rhs);
                    self.start_block(rhs, "or.rhs");
                    self.lower_condition(&logical.right, on_true, on_false);
                }
                LogicalOperator::NullishCoalescing => {
                    let left = self.lower_expr(&logical.left);
                    let rhs = self.alloc_block();
                    let test_left = self.alloc_block();
                    self.set_terminator(Terminator::BranchIfNull {
                        value: left,
                        null_block: rhs,
                        not_null_block: test_left,
                    });
                    self.start_block(test_left, "coalesce.lhs");
                    self.set_terminator(Terminator::Branch {
                        cond: left,
                        then_block: on_true,
                        else_block: on_false,
                    });
                    self.start_block(rhs, "coalesce.rhs");
                    self.lower_condition(&logical.right, on_true, on_false);
                }
            },
            Expression::Sequence(seq) if !seq.expressions.is_empty() => {
                let (last, rest) = seq.expressions.split_last().expect("non-empty sequence");
                for e in rest {
                    self.lower_expr(e);
                }
                self.lower_condition(last, on_true, on_false);
            }
            _ => {
                let cond = self.lower_expr(expr);
                self.set_terminator(Terminator::Branch {
                    cond,
                    then_block: on_true,
                    else_block: on_false,
                });
            }
        }
    }

    /// Merge values flowing in from the listed predecessors
    pub(super) fn emit_phi(&mut self, sources: Vec<(BasicBlockId, Register)>) -> Register {
        let ty = sources
            .iter()
            .fold(IrType::NONE, |acc, (_, reg)| acc.union(reg.ty));
        let dest = self.alloc_register(ty);
        self.emit(IrInstr::Phi { dest, sources });
        dest
    }

    // ========================================================================
    // Member access and optional chains
    // ========================================================================

    /// Key operand for a member property; string literals become named keys
    pub(super) fn lower_member_key(&mut self, property: &MemberProperty) -> PropKey {
        match property {
            MemberProperty::Named(name) => PropKey::Named(name.clone()),
            MemberProperty::Computed(key) => match &**key {
                Expression::Literal(ast::Literal {
                    value: LiteralValue::String(s),
                    ..
                }) => PropKey::Named(s.clone()),
                other => PropKey::Value(self.lower_expr(other)),
            },
        }
    }

    /// Lower one member link; returns `(object, value)` so calls can use
    /// the object as `this`
    pub(super) fn lower_member_link(
        &mut self,
        member: &MemberExpression,
        chain: Option<BasicBlockId>,
    ) -> (Register, Register) {
        let object = self.lower_chain_operand(&member.object, chain);
        if member.optional {
            self.branch_if_short_circuit(object, chain);
        }

        let is_fast_array = self.static_type(&member.object) == StaticType::FastArray;
        let result_ty = self.flow_ir_type(member.id);
        let value = match &member.property {
            MemberProperty::Named(name) if is_fast_array && name == "length" => {
                let dest = self.alloc_register(IrType::NUMBER);
                self.emit(IrInstr::FastArrayLength { dest, array: object });
                dest
            }
            MemberProperty::Computed(key) if is_fast_array && self.static_type(key) == StaticType::Number => {
                let index = self.lower_expr(key);
                let dest = self.alloc_register(result_ty);
                self.emit(IrInstr::FastArrayLoad {
                    dest,
                    array: object,
                    index,
                });
                dest
            }
            property => {
                let key = self.lower_member_key(property);
                let dest = self.alloc_register(result_ty);
                self.emit(IrInstr::LoadProperty { dest, object, key });
                dest
            }
        };
        (object, value)
    }

    /// Lower the object position of a chain link, staying inside the chain
    pub(super) fn lower_chain_operand(&mut self, expr: &Expression, chain: Option<BasicBlockId>) -> Register {
        match (expr, chain) {
            (Expression::Member(member), Some(_)) => self.lower_member_link(member, chain).1,
            (Expression::Call(call), Some(_)) => self.lower_call_link(call, chain),
            _ => self.lower_expr(expr),
        }
    }

    /// At a `?.` link: leave the chain when `value` is null or undefined
    pub(super) fn branch_if_short_circuit(&mut self, value: Register, chain: Option<BasicBlockId>) {
        let Some(short_circuit) = chain else {
            return;
        };
        let next = self.alloc_block();
        self.set_terminator(Terminator::BranchIfNull {
            value,
            null_block: short_circuit,
            not_null_block: next,
        });
        self.start_block(next, "chain.link");
    }

    fn lower_chain(&mut self, chain: &ChainExpression) -> Register {
        let short_circuit = self.alloc_block();
        let cont = self.alloc_block();

        let value = self.lower_chain_operand(&chain.expression, Some(short_circuit));
        let last = self.current_block();
        self.jump_to(cont);

        self.start_block(short_circuit, "chain.short");
        let undef = self.undefined();
        self.set_terminator(Terminator::Jump(cont));

        self.start_block(cont, "chain.cont");
        self.emit_phi(vec![(short_circuit, undef), (last, value)])
    }

    /// Register type for a node's flow type
    pub(super) fn flow_ir_type(&self, id: ast::NodeId) -> IrType {
        match self.flow.node_type(id) {
            StaticType::Number => IrType::NUMBER,
            StaticType::String => IrType::STRING,
            StaticType::Boolean => IrType::BOOLEAN,
            StaticType::FastArray | StaticType::NativeFunction => IrType::OBJECT,
            StaticType::Any => IrType::ANY.without_empty(),
        }
    }
}

/// Constant for a literal node
pub(super) fn literal_constant(value: &LiteralValue) -> IrConstant {
    match value {
        LiteralValue::Null => IrConstant::Null,
        LiteralValue::Boolean(b) => IrConstant::Bool(*b),
        LiteralValue::Number(n) => IrConstant::Number(*n),
        LiteralValue::String(s) => IrConstant::String(s.clone()),
    }
}

pub(super) fn binary_op(op: BinaryOperator) -> BinaryOp {
    match op {
        BinaryOperator::Add => BinaryOp::Add,
        BinaryOperator::Sub => BinaryOp::Sub,
        BinaryOperator::Mul => BinaryOp::Mul,
        BinaryOperator::Div => BinaryOp::Div,
        BinaryOperator::Mod => BinaryOp::Mod,
        BinaryOperator::Exp => BinaryOp::Exp,
        BinaryOperator::Eq => BinaryOp::Eq,
        BinaryOperator::NotEq => BinaryOp::NotEq,
        BinaryOperator::StrictEq => BinaryOp::StrictEq,
        BinaryOperator::StrictNotEq => BinaryOp::StrictNotEq,
        BinaryOperator::Lt => BinaryOp::Lt,
        BinaryOperator::LtEq => BinaryOp::LtEq,
        BinaryOperator::Gt => BinaryOp::Gt,
        BinaryOperator::GtEq => BinaryOp::GtEq,
        BinaryOperator::BitAnd => BinaryOp::BitAnd,
        BinaryOperator::BitOr => BinaryOp::BitOr,
        BinaryOperator::BitXor => BinaryOp::BitXor,
        BinaryOperator::Shl => BinaryOp::Shl,
        BinaryOperator::Shr => BinaryOp::Shr,
        BinaryOperator::UShr => BinaryOp::UShr,
        BinaryOperator::In => BinaryOp::In,
        BinaryOperator::InstanceOf => BinaryOp::InstanceOf,
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{instrs, lower, lower_with};
    use crate::ast::{
        AstBuilder, BinaryOperator, FlowContext, LogicalOperator, SemanticContext, StaticType,
        UnaryOperator,
    };
    use crate::compiler::diagnostics::codes;
    use crate::compiler::ir::{BinaryOp, IrInstr, PrettyPrint, PropKey, Terminator, UnaryOp};

    #[test]
    fn test_additive_chain_is_left_linear() {
        let b = AstBuilder::new();
        let mut e = b.ident("a0");
        for i in 1..200 {
            let op = if i % 2 == 0 { BinaryOperator::Add } else { BinaryOperator::Sub };
            e = b.binary(op, e, b.ident(&format!("a{}", i)));
        }
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        let binops: Vec<_> = instrs(&module.functions[0])
            .into_iter()
            .filter_map(|i| match i {
                IrInstr::BinaryOp { op, .. } => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(binops.len(), 199);
        assert_eq!(binops[0], BinaryOp::Sub);
        assert_eq!(binops[1], BinaryOp::Add);
    }

    #[test]
    fn test_logical_and_merges_with_phi() {
        let b = AstBuilder::new();
        let e = b.logical(LogicalOperator::And, b.ident("a"), b.ident("b"));
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        let global = &module.functions[0];
        assert!(matches!(global.entry().unwrap().terminator, Terminator::Branch { .. }));
        assert!(instrs(global).iter().any(|i| i.is_phi()));
        assert!(module.validate().is_ok(), "{}", module.pretty_print());
    }

    #[test]
    fn test_nullish_uses_branch_if_null() {
        let b = AstBuilder::new();
        let e = b.logical(LogicalOperator::NullishCoalescing, b.ident("a"), b.num(1.0));
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        assert!(matches!(
            module.functions[0].entry().unwrap().terminator,
            Terminator::BranchIfNull { .. }
        ));
    }

    #[test]
    fn test_conditional_with_not_swaps_targets() {
        let b = AstBuilder::new();
        let e = b.conditional(
            b.unary(UnaryOperator::Not, b.ident("c")),
            b.num(1.0),
            b.num(2.0),
        );
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        let global = &module.functions[0];
        // No `!` is materialized; the branch targets are swapped instead
        assert!(!instrs(global)
            .iter()
            .any(|i| matches!(i, IrInstr::UnaryOp { op: UnaryOp::Not, .. })));
        let Terminator::Branch { then_block, .. } = global.entry().unwrap().terminator else {
            panic!("expected branch");
        };
        assert_eq!(global.get_block(then_block).unwrap().label.as_deref(), Some("cond.else"));
        assert!(module.validate().is_ok());
    }

    #[test]
    fn test_delete_forms() {
        let b = AstBuilder::new();
        let program = b.program(vec![
            b.expr_stmt(b.unary(UnaryOperator::Delete, b.member(b.ident("o"), "p"))),
            b.expr_stmt(b.unary(UnaryOperator::Delete, b.ident("g"))),
            b.expr_stmt(b.unary(UnaryOperator::Delete, b.num(1.0))),
        ]);
        let (module, _) = lower(&program);
        let deletes: Vec<_> = instrs(&module.functions[0])
            .into_iter()
            .filter_map(|i| match i {
                IrInstr::DeleteProperty { key, .. } => Some(key),
                _ => None,
            })
            .collect();
        assert_eq!(deletes, vec![PropKey::Named("p".into()), PropKey::Named("g".into())]);
    }

    #[test]
    fn test_typeof_undeclared_does_not_load_global() {
        let b = AstBuilder::new();
        let e = b.unary(UnaryOperator::Typeof, b.ident("maybe"));
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        let all = instrs(&module.functions[0]);
        assert!(!all
            .iter()
            .any(|i| matches!(i, IrInstr::LoadGlobal { name, .. } if name == "maybe")));
        assert!(all.iter().any(|i| matches!(
            i,
            IrInstr::LoadProperty { key: PropKey::Named(n), .. } if n == "maybe"
        )));
    }

    #[test]
    fn test_optional_chain_short_circuits() {
        let b = AstBuilder::new();
        let e = b.chain(b.member(b.opt_member(b.ident("a"), "b"), "c"));
        let (module, errors) = lower(&b.program(vec![b.expr_stmt(e)]));
        assert!(!errors.has_errors());
        let global = &module.functions[0];
        let short = global
            .blocks()
            .find(|bb| bb.label.as_deref() == Some("chain.short"))
            .unwrap();
        assert!(matches!(short.terminator, Terminator::Jump(_)));
        assert!(global
            .blocks()
            .any(|bb| matches!(bb.terminator, Terminator::BranchIfNull { null_block, .. } if null_block == short.id)));
        let cont = global
            .blocks()
            .find(|bb| bb.label.as_deref() == Some("chain.cont"))
            .unwrap();
        assert!(cont.instructions[0].is_phi());
        assert!(module.validate().is_ok(), "{}", module.pretty_print());
    }

    #[test]
    fn test_fast_array_access() {
        let b = AstBuilder::new();
        let arr = b.ident("arr");
        let idx = b.num(0.0);
        let mut flow = FlowContext::new();
        flow.set_type(arr.node_id(), StaticType::FastArray);
        flow.set_type(idx.node_id(), StaticType::Number);
        let arr2 = b.ident("arr");
        flow.set_type(arr2.node_id(), StaticType::FastArray);
        let program = b.program(vec![
            b.expr_stmt(b.index(arr, idx)),
            b.expr_stmt(b.member(arr2, "length")),
        ]);
        let (module, _) = lower_with(&program, &SemanticContext::new(), &flow);
        let all = instrs(&module.functions[0]);
        assert!(all.iter().any(|i| matches!(i, IrInstr::FastArrayLoad { .. })));
        assert!(all.iter().any(|i| matches!(i, IrInstr::FastArrayLength { .. })));
    }

    #[test]
    fn test_invalid_expression_reports_and_continues() {
        let b = AstBuilder::new();
        let program = b.program(vec![
            b.expr_stmt(b.invalid("JSXElement")),
            b.expr_stmt(b.num(1.0)),
        ]);
        let (module, errors) = lower(&program);
        assert_eq!(errors.error_count(), 1);
        let diag = &errors.diagnostics()[0];
        assert_eq!(diag.message(), "Invalid expression encountered");
        assert_eq!(diag.code(), Some(codes::INVALID_EXPRESSION));
        assert!(module.validate().is_ok());
    }
}
