//! Expression AST nodes
//!
//! Every expression kind is a variant of the closed `Expression` enum so the
//! lowering engine can dispatch over it with one exhaustive `match`.

use super::{FunctionNode, NodeId, Span};

/// Expression (produces a value)
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Literal: 42, "s", true, null
    Literal(Literal),

    /// Identifier reference
    Identifier(Identifier),

    /// `this`
    This(ThisExpression),

    /// `super` (only meaningful as the callee of `super(...)`)
    Super(SuperExpression),

    /// Array literal: [1, , ...xs]
    Array(ArrayExpression),

    /// Object literal: { a: 1, get b() {}, ...rest }
    Object(ObjectExpression),

    /// Function expression
    Function(Box<FunctionNode>),

    /// Arrow function
    Arrow(Box<FunctionNode>),

    /// Unary: -x, !x, typeof x, delete o.p
    Unary(UnaryExpression),

    /// Update: ++x, x--
    Update(UpdateExpression),

    /// Binary: x + y, a in b
    Binary(BinaryExpression),

    /// Short-circuit: a && b, a || b, a ?? b
    Logical(LogicalExpression),

    /// Assignment: x = 1, x += 1, x ??= y
    Assignment(AssignmentExpression),

    /// Ternary: a ? b : c
    Conditional(ConditionalExpression),

    /// Comma sequence: (a, b, c)
    Sequence(SequenceExpression),

    /// Member access: o.p, o[k], o?.p
    Member(MemberExpression),

    /// Call: f(x), o.m(x), f?.(x)
    Call(CallExpression),

    /// Optional chain boundary: wraps a chain of `?.` links
    Chain(ChainExpression),

    /// Constructor call: new C(x)
    New(NewExpression),

    /// Template literal: `a${b}c`
    Template(TemplateLiteral),

    /// Tagged template: tag`a${b}c`
    TaggedTemplate(TaggedTemplateExpression),

    /// yield / yield*
    Yield(YieldExpression),

    /// await
    Await(AwaitExpression),

    /// Spread element: ...x (only inside arrays, calls, and `new`)
    Spread(SpreadElement),

    /// A node the parser produced but the lowering engine does not know
    Invalid(InvalidExpression),
}

impl Expression {
    /// Get the span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expression::Literal(e) => e.span,
            Expression::Identifier(e) => e.span,
            Expression::This(e) => e.span,
            Expression::Super(e) => e.span,
            Expression::Array(e) => e.span,
            Expression::Object(e) => e.span,
            Expression::Function(e) => e.span,
            Expression::Arrow(e) => e.span,
            Expression::Unary(e) => e.span,
            Expression::Update(e) => e.span,
            Expression::Binary(e) => e.span,
            Expression::Logical(e) => e.span,
            Expression::Assignment(e) => e.span,
            Expression::Conditional(e) => e.span,
            Expression::Sequence(e) => e.span,
            Expression::Member(e) => e.span,
            Expression::Call(e) => e.span,
            Expression::Chain(e) => e.span,
            Expression::New(e) => e.span,
            Expression::Template(e) => e.span,
            Expression::TaggedTemplate(e) => e.span,
            Expression::Yield(e) => e.span,
            Expression::Await(e) => e.span,
            Expression::Spread(e) => e.span,
            Expression::Invalid(e) => e.span,
        }
    }

    /// Get the node id of this expression
    pub fn node_id(&self) -> NodeId {
        match self {
            Expression::Literal(e) => e.id,
            Expression::Identifier(e) => e.id,
            Expression::This(e) => e.id,
            Expression::Super(e) => e.id,
            Expression::Array(e) => e.id,
            Expression::Object(e) => e.id,
            Expression::Function(e) => e.id,
            Expression::Arrow(e) => e.id,
            Expression::Unary(e) => e.id,
            Expression::Update(e) => e.id,
            Expression::Binary(e) => e.id,
            Expression::Logical(e) => e.id,
            Expression::Assignment(e) => e.id,
            Expression::Conditional(e) => e.id,
            Expression::Sequence(e) => e.id,
            Expression::Member(e) => e.id,
            Expression::Call(e) => e.id,
            Expression::Chain(e) => e.id,
            Expression::New(e) => e.id,
            Expression::Template(e) => e.id,
            Expression::TaggedTemplate(e) => e.id,
            Expression::Yield(e) => e.id,
            Expression::Await(e) => e.id,
            Expression::Spread(e) => e.id,
            Expression::Invalid(e) => e.id,
        }
    }

    /// Check if this expression is a literal
    pub fn is_literal(&self) -> bool {
        matches!(self, Expression::Literal(_))
    }

    /// Check if this expression is a spread element
    pub fn is_spread(&self) -> bool {
        matches!(self, Expression::Spread(_))
    }

    /// Whether evaluating this expression can have no observable effect and
    /// always yields the same value
    pub fn is_constant(&self) -> bool {
        match self {
            Expression::Literal(_) => true,
            Expression::Function(_) | Expression::Arrow(_) => true,
            Expression::Unary(u) => {
                matches!(u.operator, UnaryOperator::Minus | UnaryOperator::Void)
                    && u.argument.is_constant()
            }
            _ => false,
        }
    }
}

/// Literal value
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub id: NodeId,
    pub value: LiteralValue,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub id: NodeId,
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThisExpression {
    pub id: NodeId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuperExpression {
    pub id: NodeId,
    pub span: Span,
}

/// Array literal; `None` elements are elisions (holes)
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayExpression {
    pub id: NodeId,
    pub elements: Vec<Option<Expression>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectExpression {
    pub id: NodeId,
    pub properties: Vec<ObjectMember>,
    pub span: Span,
}

/// One entry of an object literal
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectMember {
    Property(Property),
    Spread(SpreadElement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Init,
    Get,
    Set,
}

/// Key of an object-literal property
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    Identifier(String),
    String(String),
    Number(f64),
    Computed(Box<Expression>),
}

impl PropertyKey {
    /// The property name when known at compile time
    pub fn static_name(&self) -> Option<String> {
        match self {
            PropertyKey::Identifier(name) | PropertyKey::String(name) => Some(name.clone()),
            PropertyKey::Number(n) => Some(number_to_key(*n)),
            PropertyKey::Computed(_) => None,
        }
    }
}

/// Render a number the way it appears as a property name
pub fn number_to_key(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: PropertyKey,
    pub value: Expression,
    pub kind: PropertyKind,
    pub method: bool,
    pub shorthand: bool,
    pub span: Span,
}

impl Property {
    /// Whether the key is computed (`[expr]: value`)
    pub fn computed(&self) -> bool {
        matches!(self.key, PropertyKey::Computed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpression {
    pub id: NodeId,
    pub operator: UnaryOperator,
    pub argument: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression {
    pub id: NodeId,
    pub operator: UpdateOperator,
    pub prefix: bool,
    pub argument: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpression {
    pub id: NodeId,
    pub operator: BinaryOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
    NullishCoalescing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalExpression {
    pub id: NodeId,
    pub operator: LogicalOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub span: Span,
}

/// Assignment operators, including the short-circuit forms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperator {
    Assign,
    Binary(BinaryOperator),
    Logical(LogicalOperator),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentExpression {
    pub id: NodeId,
    pub operator: AssignmentOperator,
    pub target: Box<Expression>,
    pub value: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalExpression {
    pub id: NodeId,
    pub test: Box<Expression>,
    pub consequent: Box<Expression>,
    pub alternate: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceExpression {
    pub id: NodeId,
    pub expressions: Vec<Expression>,
    pub span: Span,
}

/// Property part of a member access
#[derive(Debug, Clone, PartialEq)]
pub enum MemberProperty {
    Named(String),
    Computed(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberExpression {
    pub id: NodeId,
    pub object: Box<Expression>,
    pub property: MemberProperty,
    /// This link was written `?.`
    pub optional: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpression {
    pub id: NodeId,
    pub callee: Box<Expression>,
    pub arguments: Vec<Expression>,
    /// This link was written `?.()`
    pub optional: bool,
    pub span: Span,
}

impl CallExpression {
    pub fn has_spread(&self) -> bool {
        self.arguments.iter().any(Expression::is_spread)
    }
}

/// The outermost node of an optional chain such as `a?.b.c()`
#[derive(Debug, Clone, PartialEq)]
pub struct ChainExpression {
    pub id: NodeId,
    pub expression: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExpression {
    pub id: NodeId,
    pub callee: Box<Expression>,
    pub arguments: Vec<Expression>,
    pub span: Span,
}

/// One quasi of a template literal
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateElement {
    /// `None` when the raw text holds an invalid escape (tagged templates only)
    pub cooked: Option<String>,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateLiteral {
    pub id: NodeId,
    pub quasis: Vec<TemplateElement>,
    pub expressions: Vec<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedTemplateExpression {
    pub id: NodeId,
    pub tag: Box<Expression>,
    pub quasi: TemplateLiteral,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YieldExpression {
    pub id: NodeId,
    pub argument: Option<Box<Expression>>,
    pub delegate: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AwaitExpression {
    pub id: NodeId,
    pub argument: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpreadElement {
    pub id: NodeId,
    pub argument: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidExpression {
    pub id: NodeId,
    /// Parser-side name of the node kind, kept for diagnostics
    pub kind: String,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(n: f64) -> Expression {
        Expression::Literal(Literal {
            id: NodeId(0),
            value: LiteralValue::Number(n),
            span: Span::default(),
        })
    }

    #[test]
    fn test_number_to_key() {
        assert_eq!(number_to_key(1.0), "1");
        assert_eq!(number_to_key(1.5), "1.5");
        assert_eq!(number_to_key(-3.0), "-3");
    }

    #[test]
    fn test_static_name() {
        assert_eq!(PropertyKey::Identifier("x".into()).static_name(), Some("x".into()));
        assert_eq!(PropertyKey::Number(2.0).static_name(), Some("2".into()));
        assert_eq!(PropertyKey::Computed(Box::new(lit(1.0))).static_name(), None);
    }

    #[test]
    fn test_is_constant() {
        assert!(lit(1.0).is_constant());
        let neg = Expression::Unary(UnaryExpression {
            id: NodeId(1),
            operator: UnaryOperator::Minus,
            argument: Box::new(lit(1.0)),
            span: Span::default(),
        });
        assert!(neg.is_constant());
        let ident = Expression::Identifier(Identifier {
            id: NodeId(2),
            name: "x".into(),
            span: Span::default(),
        });
        assert!(!ident.is_constant());
    }
}
