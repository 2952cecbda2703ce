//! Statement AST nodes
//!
//! Only the statements needed to host expressions inside function bodies.

use super::{Expression, Identifier, NodeId, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expression(ExpressionStatement),
    VariableDeclaration(VariableDeclaration),
    Return(ReturnStatement),
    Block(BlockStatement),
    If(IfStatement),
    Throw(ThrowStatement),
    Try(TryStatement),
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Expression(s) => s.span,
            Statement::VariableDeclaration(s) => s.span,
            Statement::Return(s) => s.span,
            Statement::Block(s) => s.span,
            Statement::If(s) => s.span,
            Statement::Throw(s) => s.span,
            Statement::Try(s) => s.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionStatement {
    pub expression: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclarator {
    /// Declared name; its `id` keys the resolver's declaration table
    pub name: Identifier,
    pub init: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub id: NodeId,
    pub kind: VariableKind,
    pub declarations: Vec<VariableDeclarator>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatement {
    pub argument: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockStatement {
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub test: Expression,
    pub consequent: Box<Statement>,
    pub alternate: Option<Box<Statement>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThrowStatement {
    pub argument: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Option<Identifier>,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryStatement {
    pub block: Vec<Statement>,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<Vec<Statement>>,
    pub span: Span,
}
