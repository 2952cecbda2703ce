//! Intermediate Representation (IR) for Kestrel
//!
//! The IR sits between the syntax tree and the external backend. It uses
//! three-address code over virtual registers, grouped into basic blocks.
//!
//! # Structure
//!
//! - `IrModule` - Top-level container: the top-level function plus nested functions
//! - `IrFunction` - Blocks plus register, stack slot, and frame variable counters
//! - `BasicBlock` - A sequence of instructions with a single entry and exit
//! - `IrInstr` - Three-address code instructions
//! - `Register` - Virtual registers carrying an `IrType`

pub mod block;
pub mod builtin;
pub mod function;
pub mod instr;
pub mod module;
pub mod pretty;
pub mod types;
pub mod value;

pub use block::{BasicBlock, BasicBlockId, Terminator};
pub use builtin::{BuiltinMethod, BUILTIN_TABLE_VERSION};
pub use function::IrFunction;
pub use instr::{BinaryOp, FunctionId, IrInstr, PropKey, UnaryOp};
pub use module::IrModule;
pub use pretty::{format_instr, PrettyPrint};
pub use types::IrType;
pub use value::{FrameVarId, IrConstant, Register, RegisterId, StackSlotId};
