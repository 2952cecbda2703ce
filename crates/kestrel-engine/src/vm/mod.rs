//! Kestrel runtime core
//!
//! The object model the compiled IR runs against:
//! - Values and interned property names
//! - Hidden classes with cached transitions and dictionary mode
//! - The object heap with its allocation and write-barrier interface
//! - Property access with single-entry inline caches
//! - Literal buffers, fast arrays, `arguments` objects and builtin hooks

pub mod arguments;
pub mod array;
pub mod builtins;
pub mod class;
pub mod heap;
pub mod identifier;
pub mod literal;
pub mod options;
pub mod property;
pub mod runtime;
pub mod value;

pub use class::{ClassId, ClassTable, PropertyDescriptor, PropertyFlags};
pub use heap::{ArgumentVector, GcScope, Heap, JsObject, NativeFn, ObjectId, ObjectKind};
pub use identifier::{IdentifierTable, SymbolId};
pub use literal::{Literal, LiteralBuffer};
pub use options::RuntimeOptions;
pub use property::{PropertyCacheEntry, PropertyKey};
pub use runtime::{CacheStats, Runtime};
pub use value::Value;

/// Runtime errors
///
/// The first three are JS exceptions raised by the runtime itself; they
/// become error objects when a handler catches them.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// TypeError raised by the runtime
    #[error("TypeError: {0}")]
    TypeError(String),

    /// RangeError raised by the runtime
    #[error("RangeError: {0}")]
    RangeError(String),

    /// ReferenceError raised by the runtime
    #[error("ReferenceError: {0}")]
    ReferenceError(String),

    /// A value thrown by user code
    #[error("Thrown value: {0:?}")]
    Thrown(Value),

    /// An exception reached the top level without a handler
    #[error("Uncaught {0}")]
    Uncaught(String),
}

impl VmError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        VmError::TypeError(msg.into())
    }

    pub fn range_error(msg: impl Into<String>) -> Self {
        VmError::RangeError(msg.into())
    }

    pub fn reference_error(msg: impl Into<String>) -> Self {
        VmError::ReferenceError(msg.into())
    }

    /// Whether a `catch` handler may observe this error
    pub fn is_catchable(&self) -> bool {
        !matches!(self, VmError::Uncaught(_))
    }
}

/// Runtime result type
pub type VmResult<T> = Result<T, VmError>;
