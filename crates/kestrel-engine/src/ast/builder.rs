//! Syntax tree factory
//!
//! Hands out fresh `NodeId`s and synthetic spans so hosts (and tests) can
//! build trees without a parser. Methods take `&self` so nested calls compose.

use super::*;
use std::cell::Cell;

/// Node factory with a private id counter
#[derive(Debug, Default)]
pub struct AstBuilder {
    next_id: Cell<u32>,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh node id
    pub fn fresh_id(&self) -> NodeId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NodeId(id)
    }

    fn span_for(&self, id: NodeId) -> Span {
        let pos = id.0 as usize;
        Span::new(pos, pos + 1, 1, id.0 + 1)
    }

    fn next(&self) -> (NodeId, Span) {
        let id = self.fresh_id();
        (id, self.span_for(id))
    }

    // ------------------------------------------------------------------------
    // Leaves
    // ------------------------------------------------------------------------

    fn literal(&self, value: LiteralValue) -> Expression {
        let (id, span) = self.next();
        Expression::Literal(Literal { id, value, span })
    }

    pub fn num(&self, n: f64) -> Expression {
        self.literal(LiteralValue::Number(n))
    }

    pub fn str(&self, s: &str) -> Expression {
        self.literal(LiteralValue::String(s.to_string()))
    }

    pub fn bool(&self, b: bool) -> Expression {
        self.literal(LiteralValue::Boolean(b))
    }

    pub fn null(&self) -> Expression {
        self.literal(LiteralValue::Null)
    }

    pub fn identifier(&self, name: &str) -> Identifier {
        let (id, span) = self.next();
        Identifier {
            id,
            name: name.to_string(),
            span,
        }
    }

    pub fn ident(&self, name: &str) -> Expression {
        Expression::Identifier(self.identifier(name))
    }

    pub fn this(&self) -> Expression {
        let (id, span) = self.next();
        Expression::This(ThisExpression { id, span })
    }

    pub fn super_(&self) -> Expression {
        let (id, span) = self.next();
        Expression::Super(SuperExpression { id, span })
    }

    pub fn invalid(&self, kind: &str) -> Expression {
        let (id, span) = self.next();
        Expression::Invalid(InvalidExpression {
            id,
            kind: kind.to_string(),
            span,
        })
    }

    // ------------------------------------------------------------------------
    // Literals with structure
    // ------------------------------------------------------------------------

    pub fn array(&self, elements: Vec<Option<Expression>>) -> Expression {
        let (id, span) = self.next();
        Expression::Array(ArrayExpression { id, elements, span })
    }

    pub fn spread(&self, argument: Expression) -> Expression {
        let (id, span) = self.next();
        Expression::Spread(SpreadElement {
            id,
            argument: Box::new(argument),
            span,
        })
    }

    pub fn object(&self, properties: Vec<ObjectMember>) -> Expression {
        let (id, span) = self.next();
        Expression::Object(ObjectExpression {
            id,
            properties,
            span,
        })
    }

    fn property(&self, key: PropertyKey, value: Expression, kind: PropertyKind) -> ObjectMember {
        let (_, span) = self.next();
        ObjectMember::Property(Property {
            key,
            value,
            kind,
            method: false,
            shorthand: false,
            span,
        })
    }

    /// `name: value`
    pub fn prop(&self, name: &str, value: Expression) -> ObjectMember {
        self.property(PropertyKey::Identifier(name.to_string()), value, PropertyKind::Init)
    }

    /// `[key]: value`
    pub fn computed_prop(&self, key: Expression, value: Expression) -> ObjectMember {
        self.property(PropertyKey::Computed(Box::new(key)), value, PropertyKind::Init)
    }

    /// `get name() {...}`
    pub fn getter(&self, name: &str, func: FunctionNode) -> ObjectMember {
        self.property(
            PropertyKey::Identifier(name.to_string()),
            Expression::Function(Box::new(func)),
            PropertyKind::Get,
        )
    }

    /// `set name(v) {...}`
    pub fn setter(&self, name: &str, func: FunctionNode) -> ObjectMember {
        self.property(
            PropertyKey::Identifier(name.to_string()),
            Expression::Function(Box::new(func)),
            PropertyKind::Set,
        )
    }

    /// `...value` inside an object literal
    pub fn object_spread(&self, argument: Expression) -> ObjectMember {
        let (id, span) = self.next();
        ObjectMember::Spread(SpreadElement {
            id,
            argument: Box::new(argument),
            span,
        })
    }

    pub fn template(&self, quasis: &[&str], expressions: Vec<Expression>) -> TemplateLiteral {
        let (id, span) = self.next();
        TemplateLiteral {
            id,
            quasis: quasis
                .iter()
                .map(|q| TemplateElement {
                    cooked: Some(q.to_string()),
                    raw: q.to_string(),
                })
                .collect(),
            expressions,
            span,
        }
    }

    pub fn template_expr(&self, quasis: &[&str], expressions: Vec<Expression>) -> Expression {
        Expression::Template(self.template(quasis, expressions))
    }

    pub fn tagged(&self, tag: Expression, quasis: &[&str], expressions: Vec<Expression>) -> Expression {
        let quasi = self.template(quasis, expressions);
        let (id, span) = self.next();
        Expression::TaggedTemplate(TaggedTemplateExpression {
            id,
            tag: Box::new(tag),
            quasi,
            span,
        })
    }

    // ------------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------------

    pub fn unary(&self, operator: UnaryOperator, argument: Expression) -> Expression {
        let (id, span) = self.next();
        Expression::Unary(UnaryExpression {
            id,
            operator,
            argument: Box::new(argument),
            span,
        })
    }

    pub fn update(&self, operator: UpdateOperator, prefix: bool, argument: Expression) -> Expression {
        let (id, span) = self.next();
        Expression::Update(UpdateExpression {
            id,
            operator,
            prefix,
            argument: Box::new(argument),
            span,
        })
    }

    pub fn binary(&self, operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
        let (id, span) = self.next();
        Expression::Binary(BinaryExpression {
            id,
            operator,
            left: Box::new(left),
            right: Box::new(right),
            span,
        })
    }

    pub fn logical(&self, operator: LogicalOperator, left: Expression, right: Expression) -> Expression {
        let (id, span) = self.next();
        Expression::Logical(LogicalExpression {
            id,
            operator,
            left: Box::new(left),
            right: Box::new(right),
            span,
        })
    }

    pub fn assign(&self, target: Expression, value: Expression) -> Expression {
        self.assign_op(AssignmentOperator::Assign, target, value)
    }

    pub fn assign_op(&self, operator: AssignmentOperator, target: Expression, value: Expression) -> Expression {
        let (id, span) = self.next();
        Expression::Assignment(AssignmentExpression {
            id,
            operator,
            target: Box::new(target),
            value: Box::new(value),
            span,
        })
    }

    pub fn conditional(&self, test: Expression, consequent: Expression, alternate: Expression) -> Expression {
        let (id, span) = self.next();
        Expression::Conditional(ConditionalExpression {
            id,
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
            span,
        })
    }

    pub fn sequence(&self, expressions: Vec<Expression>) -> Expression {
        let (id, span) = self.next();
        Expression::Sequence(SequenceExpression {
            id,
            expressions,
            span,
        })
    }

    // ------------------------------------------------------------------------
    // Member access and calls
    // ------------------------------------------------------------------------

    fn member_node(&self, object: Expression, property: MemberProperty, optional: bool) -> Expression {
        let (id, span) = self.next();
        Expression::Member(MemberExpression {
            id,
            object: Box::new(object),
            property,
            optional,
            span,
        })
    }

    /// `object.name`
    pub fn member(&self, object: Expression, name: &str) -> Expression {
        self.member_node(object, MemberProperty::Named(name.to_string()), false)
    }

    /// `object?.name` (must sit inside a `chain`)
    pub fn opt_member(&self, object: Expression, name: &str) -> Expression {
        self.member_node(object, MemberProperty::Named(name.to_string()), true)
    }

    /// `object[key]`
    pub fn index(&self, object: Expression, key: Expression) -> Expression {
        self.member_node(object, MemberProperty::Computed(Box::new(key)), false)
    }

    fn call_node(&self, callee: Expression, arguments: Vec<Expression>, optional: bool) -> Expression {
        let (id, span) = self.next();
        Expression::Call(CallExpression {
            id,
            callee: Box::new(callee),
            arguments,
            optional,
            span,
        })
    }

    pub fn call(&self, callee: Expression, arguments: Vec<Expression>) -> Expression {
        self.call_node(callee, arguments, false)
    }

    /// `callee?.(args)` (must sit inside a `chain`)
    pub fn opt_call(&self, callee: Expression, arguments: Vec<Expression>) -> Expression {
        self.call_node(callee, arguments, true)
    }

    /// Wrap the outermost link of an optional chain
    pub fn chain(&self, expression: Expression) -> Expression {
        let (id, span) = self.next();
        Expression::Chain(ChainExpression {
            id,
            expression: Box::new(expression),
            span,
        })
    }

    pub fn new_expr(&self, callee: Expression, arguments: Vec<Expression>) -> Expression {
        let (id, span) = self.next();
        Expression::New(NewExpression {
            id,
            callee: Box::new(callee),
            arguments,
            span,
        })
    }

    // ------------------------------------------------------------------------
    // Generators and async
    // ------------------------------------------------------------------------

    pub fn yield_(&self, argument: Option<Expression>) -> Expression {
        let (id, span) = self.next();
        Expression::Yield(YieldExpression {
            id,
            argument: argument.map(Box::new),
            delegate: false,
            span,
        })
    }

    pub fn yield_star(&self, argument: Expression) -> Expression {
        let (id, span) = self.next();
        Expression::Yield(YieldExpression {
            id,
            argument: Some(Box::new(argument)),
            delegate: true,
            span,
        })
    }

    pub fn await_(&self, argument: Expression) -> Expression {
        let (id, span) = self.next();
        Expression::Await(AwaitExpression {
            id,
            argument: Box::new(argument),
            span,
        })
    }

    // ------------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------------

    /// A plain function with a statement body
    pub fn function(&self, name: Option<&str>, params: &[&str], body: Vec<Statement>) -> FunctionNode {
        let params = params.iter().map(|p| self.identifier(p)).collect();
        let (id, span) = self.next();
        FunctionNode {
            id,
            name: name.map(str::to_string),
            params,
            body: FunctionBody::Block(body),
            is_generator: false,
            is_async: false,
            is_arrow: false,
            kind: FunctionKind::Normal,
            strict: false,
            span,
        }
    }

    pub fn generator(&self, name: Option<&str>, params: &[&str], body: Vec<Statement>) -> FunctionNode {
        FunctionNode {
            is_generator: true,
            ..self.function(name, params, body)
        }
    }

    pub fn async_function(&self, name: Option<&str>, params: &[&str], body: Vec<Statement>) -> FunctionNode {
        FunctionNode {
            is_async: true,
            ..self.function(name, params, body)
        }
    }

    /// An arrow with a concise expression body
    pub fn arrow(&self, params: &[&str], body: Expression) -> FunctionNode {
        FunctionNode {
            body: FunctionBody::Expression(Box::new(body)),
            is_arrow: true,
            ..self.function(None, params, Vec::new())
        }
    }

    /// A derived class constructor
    pub fn constructor(&self, super_class: Expression, params: &[&str], body: Vec<Statement>) -> FunctionNode {
        FunctionNode {
            kind: FunctionKind::Constructor {
                super_class: Some(Box::new(super_class)),
            },
            strict: true,
            ..self.function(Some("constructor"), params, body)
        }
    }

    pub fn function_expr(&self, func: FunctionNode) -> Expression {
        if func.is_arrow {
            Expression::Arrow(Box::new(func))
        } else {
            Expression::Function(Box::new(func))
        }
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    pub fn expr_stmt(&self, expression: Expression) -> Statement {
        let span = expression.span();
        Statement::Expression(ExpressionStatement { expression, span })
    }

    fn declaration(&self, kind: VariableKind, name: &str, init: Option<Expression>) -> Statement {
        let name = self.identifier(name);
        let (id, span) = self.next();
        Statement::VariableDeclaration(VariableDeclaration {
            id,
            kind,
            declarations: vec![VariableDeclarator { name, init }],
            span,
        })
    }

    pub fn var_decl(&self, name: &str, init: Option<Expression>) -> Statement {
        self.declaration(VariableKind::Var, name, init)
    }

    pub fn let_decl(&self, name: &str, init: Option<Expression>) -> Statement {
        self.declaration(VariableKind::Let, name, init)
    }

    pub fn const_decl(&self, name: &str, init: Expression) -> Statement {
        self.declaration(VariableKind::Const, name, Some(init))
    }

    pub fn ret(&self, argument: Option<Expression>) -> Statement {
        let (_, span) = self.next();
        Statement::Return(ReturnStatement { argument, span })
    }

    pub fn block(&self, body: Vec<Statement>) -> Statement {
        let (_, span) = self.next();
        Statement::Block(BlockStatement { body, span })
    }

    pub fn if_(&self, test: Expression, consequent: Statement, alternate: Option<Statement>) -> Statement {
        let (_, span) = self.next();
        Statement::If(IfStatement {
            test,
            consequent: Box::new(consequent),
            alternate: alternate.map(Box::new),
            span,
        })
    }

    pub fn throw(&self, argument: Expression) -> Statement {
        let (_, span) = self.next();
        Statement::Throw(ThrowStatement { argument, span })
    }

    pub fn try_(
        &self,
        block: Vec<Statement>,
        handler: Option<(Option<&str>, Vec<Statement>)>,
        finalizer: Option<Vec<Statement>>,
    ) -> Statement {
        let handler = handler.map(|(param, body)| {
            let param = param.map(|p| self.identifier(p));
            let (_, span) = self.next();
            CatchClause { param, body, span }
        });
        let (_, span) = self.next();
        Statement::Try(TryStatement {
            block,
            handler,
            finalizer,
            span,
        })
    }

    pub fn program(&self, body: Vec<Statement>) -> Program {
        let (_, span) = self.next();
        Program {
            body,
            strict: false,
            span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids_are_unique() {
        let b = AstBuilder::new();
        let e = b.binary(BinaryOperator::Add, b.num(1.0), b.num(2.0));
        if let Expression::Binary(bin) = &e {
            assert_ne!(bin.left.node_id(), bin.right.node_id());
            assert_ne!(bin.id, bin.left.node_id());
        } else {
            panic!("expected binary");
        }
    }

    #[test]
    fn test_arrow_body() {
        let b = AstBuilder::new();
        let f = b.arrow(&["x"], b.ident("x"));
        assert!(f.is_arrow);
        assert!(matches!(f.body, FunctionBody::Expression(_)));
        assert_eq!(f.params.len(), 1);
    }

    #[test]
    fn test_constructor_is_derived() {
        let b = AstBuilder::new();
        let ctor = b.constructor(b.ident("Base"), &[], vec![]);
        assert!(ctor.is_derived_constructor());
        assert!(!b.function(None, &[], vec![]).is_derived_constructor());
    }
}
