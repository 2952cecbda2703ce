//! Compiler error types

use thiserror::Error;

/// Errors from building an optimization pipeline
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// A custom pipeline named a pass that does not exist
    #[error("Unknown optimization pass: {0}")]
    UnknownPass(String),
}

/// Errors that end a compilation
#[derive(Debug, Error)]
pub enum CompileError {
    /// Lowering reported errors; the diagnostics carry the details
    #[error("Compilation failed with {count} error(s)")]
    Diagnostics { count: usize },

    /// The IR verifier rejected the module
    #[error("IR verification failed: {}", .0.join("; "))]
    Verification(Vec<String>),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Options could not be read
    #[error("Invalid compile options: {0}")]
    Options(#[from] serde_json::Error),
}

/// Compilation result
pub type CompileResult<T> = Result<T, CompileError>;
