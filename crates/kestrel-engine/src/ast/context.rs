//! Resolver and flow-typing side tables
//!
//! Both tables are produced outside this crate and keyed by `NodeId`. A
//! missing entry always means the conservative default.

use super::NodeId;
use rustc_hash::FxHashMap;

/// What the resolver knows about one declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeclInfo {
    /// Referenced from a nested function, so it must live in the frame
    pub captured: bool,
}

/// Declarations resolved by the semantic pass
#[derive(Debug, Clone, Default)]
pub struct SemanticContext {
    decls: FxHashMap<NodeId, DeclInfo>,
}

impl SemanticContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a declaration
    pub fn declare(&mut self, id: NodeId, info: DeclInfo) {
        self.decls.insert(id, info);
    }

    /// Mark a declaration as captured by a closure
    pub fn mark_captured(&mut self, id: NodeId) {
        self.decls.entry(id).or_default().captured = true;
    }

    pub fn decl(&self, id: NodeId) -> DeclInfo {
        self.decls.get(&id).copied().unwrap_or_default()
    }
}

/// Static type attached to an expression by the flow checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaticType {
    #[default]
    Any,
    Number,
    String,
    Boolean,
    /// A typed, dense array
    FastArray,
    /// A function implemented natively (no JS frame)
    NativeFunction,
}

/// Expression types from the flow checker
#[derive(Debug, Clone, Default)]
pub struct FlowContext {
    types: FxHashMap<NodeId, StaticType>,
}

impl FlowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_type(&mut self, id: NodeId, ty: StaticType) {
        self.types.insert(id, ty);
    }

    /// Type of a node, `Any` when untyped
    pub fn node_type(&self, id: NodeId) -> StaticType {
        self.types.get(&id).copied().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
