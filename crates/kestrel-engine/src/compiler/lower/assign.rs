//! Assignment and update lowering

use super::expr::binary_op;
use super::Lowerer;
use crate::ast::{
    AssignmentExpression, AssignmentOperator, Expression, LogicalOperator, MemberProperty,
    StaticType, UpdateExpression, UpdateOperator,
};
use crate::compiler::diagnostics::codes;
use crate::compiler::ir::{IrInstr, IrType, PropKey, Register, Terminator, UnaryOp};

/// A resolved assignment target. The object and key operands are evaluated
/// when the reference is built, before the right-hand side.
#[derive(Debug, Clone)]
enum LRef {
    Variable(String),
    Member { object: Register, key: PropKey },
    FastArray { array: Register, index: Register },
    /// Not assignable; already reported
    Invalid,
}

impl<'a> Lowerer<'a> {
    pub(super) fn lower_assignment(&mut self, assign: &AssignmentExpression) -> Register {
        match assign.operator {
            AssignmentOperator::Assign => self.lower_assignment_chain(assign),
            AssignmentOperator::Binary(op) => {
                let target = self.build_lref(&assign.target);
                let old = self.load_lref(&target);
                let rhs = self.lower_expr(&assign.value);
                let result = self.emit_binary(binary_op(op), old, rhs);
                self.store_lref(&target, result);
                result
            }
            AssignmentOperator::Logical(op) => self.lower_logical_assignment(assign, op),
        }
    }

    /// `a = b = c`: targets left to right, then the value once, then the
    /// stores right to left
    fn lower_assignment_chain(&mut self, assign: &AssignmentExpression) -> Register {
        let mut targets = vec![&*assign.target];
        let mut value = &*assign.value;
        while let Expression::Assignment(inner) = value {
            if inner.operator != AssignmentOperator::Assign {
                break;
            }
            targets.push(&*inner.target);
            value = &*inner.value;
        }

        let lrefs: Vec<LRef> = targets.iter().map(|t| self.build_lref(t)).collect();
        let hint = match lrefs.last() {
            Some(LRef::Variable(name)) => Some(name.clone()),
            _ => None,
        };
        let result = self.lower_named_value(value, hint.as_deref());
        for lref in lrefs.iter().rev() {
            self.store_lref(lref, result);
        }
        result
    }

    /// `a ||= b`, `a &&= b`, `a ??= b`: the store only happens on the
    /// branch that evaluates the right-hand side
    fn lower_logical_assignment(&mut self, assign: &AssignmentExpression, op: LogicalOperator) -> Register {
        let target = self.build_lref(&assign.target);
        let left = self.load_lref(&target);
        let left_block = self.current_block();

        let assign_block = self.alloc_block();
        let cont = self.alloc_block();
        let term = match op {
            LogicalOperator::Or => Terminator::Branch {
                cond: left,
                then_block: cont,
                else_block: assign_block,
            },
            LogicalOperator::And => Terminator::Branch {
                cond: left,
                then_block: assign_block,
                else_block: cont,
            },
            LogicalOperator::NullishCoalescing => Terminator::BranchIfNull {
                value: left,
                null_block: assign_block,
                not_null_block: cont,
            },
        };
        self.set_terminator(term);

        self.start_block(assign_block, "assign.rhs");
        let hint = match &target {
            LRef::Variable(name) => Some(name.clone()),
            _ => None,
        };
        let rhs = self.lower_named_value(&assign.value, hint.as_deref());
        self.store_lref(&target, rhs);
        let assign_end = self.current_block();
        self.jump_to(cont);

        self.start_block(cont, "assign.merge");
        self.emit_phi(vec![(left_block, left), (assign_end, rhs)])
    }

    pub(super) fn lower_update(&mut self, update: &UpdateExpression) -> Register {
        let target = self.build_lref(&update.argument);
        let old = self.load_lref(&target);
        let op = match update.operator {
            UpdateOperator::Increment => UnaryOp::Inc,
            UpdateOperator::Decrement => UnaryOp::Dec,
        };
        if update.prefix {
            let result = self.emit_unary(op, old);
            self.store_lref(&target, result);
            return result;
        }
        // Postfix yields the old value after ToNumeric
        let numeric = self.alloc_register(IrType::NUMBER);
        self.emit(IrInstr::AsNumeric {
            dest: numeric,
            value: old,
        });
        let result = self.emit_unary(op, numeric);
        self.store_lref(&target, result);
        numeric
    }

    /// Lower a value that is being bound to `name`; anonymous functions
    /// take the name
    pub(super) fn lower_named_value(&mut self, value: &Expression, name: Option<&str>) -> Register {
        match value {
            Expression::Function(func) | Expression::Arrow(func) => self.lower_function_node(func, name),
            other => self.lower_expr(other),
        }
    }

    // ========================================================================
    // References
    // ========================================================================

    fn build_lref(&mut self, target: &Expression) -> LRef {
        match target {
            Expression::Identifier(ident) => LRef::Variable(ident.name.clone()),
            Expression::Member(member) if !member.optional => {
                let object = self.lower_expr(&member.object);
                if let MemberProperty::Computed(key) = &member.property {
                    if self.static_type(&member.object) == StaticType::FastArray
                        && self.static_type(key) == StaticType::Number
                    {
                        let index = self.lower_expr(key);
                        return LRef::FastArray { array: object, index };
                    }
                }
                let key = self.lower_member_key(&member.property);
                LRef::Member { object, key }
            }
            other => {
                self.report_error(
                    other.span(),
                    codes::INVALID_EXPRESSION,
                    "invalid assignment left-hand side",
                );
                LRef::Invalid
            }
        }
    }

    fn load_lref(&mut self, lref: &LRef) -> Register {
        match lref {
            LRef::Variable(name) => self.load_variable(name),
            LRef::Member { object, key } => {
                let dest = self.alloc_register(IrType::ANY.without_empty());
                self.emit(IrInstr::LoadProperty {
                    dest,
                    object: *object,
                    key: key.clone(),
                });
                dest
            }
            LRef::FastArray { array, index } => {
                let dest = self.alloc_register(IrType::ANY.without_empty());
                self.emit(IrInstr::FastArrayLoad {
                    dest,
                    array: *array,
                    index: *index,
                });
                dest
            }
            LRef::Invalid => self.undefined(),
        }
    }

    fn store_lref(&mut self, lref: &LRef, value: Register) {
        match lref {
            LRef::Variable(name) => self.assign_variable(name, value),
            LRef::Member { object, key } => self.emit(IrInstr::StoreProperty {
                object: *object,
                key: key.clone(),
                value,
            }),
            LRef::FastArray { array, index } => self.emit(IrInstr::FastArrayStore {
                array: *array,
                index: *index,
                value,
            }),
            LRef::Invalid => {}
        }
    }
}
