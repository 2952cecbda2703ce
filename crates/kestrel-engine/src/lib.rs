//! Kestrel JavaScript Engine Core
//!
//! This crate provides the middle of a JavaScript engine:
//! - **AST**: The resolved syntax tree the compiler consumes (`ast` module)
//! - **Compiler**: Scoped symbol table, IR, expression lowering and the
//!   optimization pipeline (`compiler` module)
//! - **VM**: Hidden classes, inline-cached property access, literal buffers,
//!   fast arrays and builtin hooks (`vm` module)
//!
//! Parsing, name resolution and code generation live outside this crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use kestrel_engine::{AstBuilder, CompileOptions, Compiler, FlowContext, SemanticContext};
//!
//! let b = AstBuilder::new();
//! let program = b.program(vec![b.ret(Some(b.num(42.0)))]);
//!
//! let mut compiler = Compiler::new(CompileOptions::default())?;
//! let module = compiler.compile("main", &program, &SemanticContext::new(), &FlowContext::new())?;
//! println!("{}", module.pretty_print());
//! ```

#![warn(rust_2018_idioms)]
#![cfg_attr(test, allow(clippy::approx_constant))]
#![allow(clippy::new_without_default)]
#![allow(clippy::len_without_is_empty)]

// ============================================================================
// Core Modules
// ============================================================================

/// Input syntax tree and resolver side tables
pub mod ast;

/// Compiler module: scope table, IR, lowering, and optimizations
pub mod compiler;

/// VM module: object model and property-access runtime
pub mod vm;

// ============================================================================
// Re-exports from AST
// ============================================================================

pub use ast::{AstBuilder, FlowContext, Program, SemanticContext, Span, StaticType};

// ============================================================================
// Re-exports from Compiler
// ============================================================================

pub use compiler::{
    // IR
    ir,
    // Diagnostics
    Diagnostic, ErrorManager, Severity,
    // Pipeline
    Compiler, CompileError, CompileOptions, CompileResult, OptLevel, OptPass, Optimizer, PipelineError,
    // Lowering
    Lowerer,
    // Symbol table
    ScopedHashTable,
};

// ============================================================================
// Re-exports from VM
// ============================================================================

pub use vm::{
    // Values and objects
    ObjectId, Value,
    // Runtime
    PropertyCacheEntry, Runtime, RuntimeOptions, VmError, VmResult,
    // Literals
    Literal, LiteralBuffer,
};
