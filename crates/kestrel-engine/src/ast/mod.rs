//! Input syntax tree
//!
//! The lowering engine consumes a tree produced by an external parser and
//! resolver. Only the node kinds the lowering engine understands are modeled:
//! - `expression` - the closed set of expression kinds
//! - `statement` - the statement subset needed to host expressions in functions
//! - `context` - resolver and flow-typing side tables keyed by `NodeId`
//! - `builder` - a node factory that hands out fresh ids

pub mod builder;
pub mod context;
pub mod expression;
pub mod statement;

pub use builder::AstBuilder;
pub use context::{DeclInfo, FlowContext, SemanticContext, StaticType};
pub use expression::*;
pub use statement::*;

use std::fmt;

/// Source location of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
            column: self.column.min(other.column),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Identity of a syntax node, assigned by the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A function literal, declaration, arrow, or method
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionNode {
    pub id: NodeId,
    pub name: Option<String>,
    pub params: Vec<Identifier>,
    pub body: FunctionBody,
    pub is_generator: bool,
    pub is_async: bool,
    pub is_arrow: bool,
    pub kind: FunctionKind,
    pub strict: bool,
    pub span: Span,
}

/// Body of a function: a statement list or a concise arrow expression
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Vec<Statement>),
    Expression(Box<Expression>),
}

/// What role a function plays
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionKind {
    /// Plain function, arrow, or method
    Normal,
    /// Class constructor; `super_class` is set for derived classes
    Constructor { super_class: Option<Box<Expression>> },
}

impl FunctionNode {
    /// Whether `super()` is legal inside this function
    pub fn is_derived_constructor(&self) -> bool {
        matches!(
            &self.kind,
            FunctionKind::Constructor {
                super_class: Some(_)
            }
        )
    }
}

/// A whole compilation unit: the top-level program body
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Statement>,
    pub strict: bool,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        let a = Span::new(0, 5, 1, 1);
        let b = Span::new(3, 10, 1, 4);
        let merged = a.merge(&b);
        assert_eq!(merged.start, 0);
        assert_eq!(merged.end, 10);
        assert_eq!(merged.len(), 10);
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(format!("{}", NodeId(7)), "#7");
    }
}
