//! Basic Blocks and Control Flow
//!
//! Basic blocks are sequences of instructions with a single entry point
//! and a single exit point (the terminator).

use super::instr::IrInstr;
use super::value::Register;

/// Basic block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BasicBlockId(pub u32);

impl BasicBlockId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for BasicBlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A basic block: sequence of instructions with single entry and exit
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Unique identifier for this block
    pub id: BasicBlockId,
    /// Optional label for debugging
    pub label: Option<String>,
    /// Instructions in this block (excluding terminator)
    pub instructions: Vec<IrInstr>,
    /// How this block exits
    pub terminator: Terminator,
}

impl BasicBlock {
    /// Create a new empty basic block
    pub fn new(id: BasicBlockId) -> Self {
        Self {
            id,
            label: None,
            instructions: Vec::new(),
            terminator: Terminator::Unreachable,
        }
    }

    /// Create a new basic block with a label
    pub fn with_label(id: BasicBlockId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: Some(label.into()),
            instructions: Vec::new(),
            terminator: Terminator::Unreachable,
        }
    }

    pub fn add_instr(&mut self, instr: IrInstr) {
        self.instructions.push(instr);
    }

    pub fn set_terminator(&mut self, term: Terminator) {
        self.terminator = term;
    }

    pub fn successors(&self) -> Vec<BasicBlockId> {
        self.terminator.successors()
    }

    /// Check if this block is terminated (not unreachable)
    pub fn is_terminated(&self) -> bool {
        !matches!(self.terminator, Terminator::Unreachable)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Phi instructions at the head of the block
    pub fn phis(&self) -> impl Iterator<Item = &IrInstr> {
        self.instructions.iter().take_while(|i| i.is_phi())
    }
}

/// Control flow terminator (ends a basic block)
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// Unconditional jump to target block
    Jump(BasicBlockId),

    /// Conditional branch based on condition register (truthy/falsy)
    Branch {
        cond: Register,
        then_block: BasicBlockId,
        else_block: BasicBlockId,
    },

    /// Branch on `value == null` (undefined or null)
    BranchIfNull {
        value: Register,
        null_block: BasicBlockId,
        not_null_block: BasicBlockId,
    },

    Return(Register),

    Throw(Register),

    /// Throw a TypeError with a fixed message
    ThrowTypeError(String),

    /// Suspend the generator yielding `value`; resume at `next`
    SaveAndYield { value: Register, next: BasicBlockId },

    /// Enter a try region: execution continues in `body`, exceptions land in `handler`
    TryStart {
        body: BasicBlockId,
        handler: BasicBlockId,
    },

    /// Placeholder before the terminator is set
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BasicBlockId> {
        match self {
            Terminator::Jump(target) => vec![*target],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::BranchIfNull {
                null_block,
                not_null_block,
                ..
            } => vec![*null_block, *not_null_block],
            Terminator::SaveAndYield { next, .. } => vec![*next],
            Terminator::TryStart { body, handler } => vec![*body, *handler],
            Terminator::Return(_)
            | Terminator::Throw(_)
            | Terminator::ThrowTypeError(_)
            | Terminator::Unreachable => vec![],
        }
    }

    /// Redirect every edge to `from` so it points at `to`
    pub fn replace_successor(&mut self, from: BasicBlockId, to: BasicBlockId) {
        let swap = |b: &mut BasicBlockId| {
            if *b == from {
                *b = to;
            }
        };
        match self {
            Terminator::Jump(target) => swap(target),
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => {
                swap(then_block);
                swap(else_block);
            }
            Terminator::BranchIfNull {
                null_block,
                not_null_block,
                ..
            } => {
                swap(null_block);
                swap(not_null_block);
            }
            Terminator::SaveAndYield { next, .. } => swap(next),
            Terminator::TryStart { body, handler } => {
                swap(body);
                swap(handler);
            }
            Terminator::Return(_)
            | Terminator::Throw(_)
            | Terminator::ThrowTypeError(_)
            | Terminator::Unreachable => {}
        }
    }

    /// Register read by the terminator, if any
    pub fn operand(&self) -> Option<Register> {
        match self {
            Terminator::Branch { cond, .. } => Some(*cond),
            Terminator::BranchIfNull { value, .. }
            | Terminator::SaveAndYield { value, .. }
            | Terminator::Return(value)
            | Terminator::Throw(value) => Some(*value),
            _ => None,
        }
    }

    pub fn operand_mut(&mut self) -> Option<&mut Register> {
        match self {
            Terminator::Branch { cond, .. } => Some(cond),
            Terminator::BranchIfNull { value, .. }
            | Terminator::SaveAndYield { value, .. }
            | Terminator::Return(value)
            | Terminator::Throw(value) => Some(value),
            _ => None,
        }
    }
}

impl std::fmt::Display for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Terminator::Jump(target) => write!(f, "jump {}", target),
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => write!(f, "branch {} ? {} : {}", cond, then_block, else_block),
            Terminator::BranchIfNull {
                value,
                null_block,
                not_null_block,
            } => write!(
                f,
                "branch_if_null {} ? {} : {}",
                value, null_block, not_null_block
            ),
            Terminator::Return(reg) => write!(f, "return {}", reg),
            Terminator::Throw(reg) => write!(f, "throw {}", reg),
            Terminator::ThrowTypeError(msg) => write!(f, "throw_type_error {:?}", msg),
            Terminator::SaveAndYield { value, next } => {
                write!(f, "save_and_yield {} -> {}", value, next)
            }
            Terminator::TryStart { body, handler } => {
                write!(f, "try_start {} catch {}", body, handler)
            }
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::types::IrType;
    use crate::compiler::ir::value::RegisterId;

    fn make_reg(id: u32) -> Register {
        Register::new(RegisterId::new(id), IrType::ANY)
    }

    #[test]
    fn test_basic_block_new() {
        let block = BasicBlock::new(BasicBlockId(0));
        assert_eq!(block.id, BasicBlockId(0));
        assert!(block.instructions.is_empty());
        assert!(!block.is_terminated());
    }

    #[test]
    fn test_basic_block_with_label() {
        let block = BasicBlock::with_label(BasicBlockId(1), "entry");
        assert_eq!(block.label, Some("entry".to_string()));
    }

    #[test]
    fn test_terminator_successors() {
        let jump = Terminator::Jump(BasicBlockId(1));
        assert_eq!(jump.successors(), vec![BasicBlockId(1)]);

        let branch = Terminator::Branch {
            cond: make_reg(0),
            then_block: BasicBlockId(1),
            else_block: BasicBlockId(2),
        };
        assert_eq!(branch.successors(), vec![BasicBlockId(1), BasicBlockId(2)]);

        let yield_term = Terminator::SaveAndYield {
            value: make_reg(0),
            next: BasicBlockId(4),
        };
        assert_eq!(yield_term.successors(), vec![BasicBlockId(4)]);

        assert!(Terminator::ThrowTypeError("x".into()).successors().is_empty());
    }

    #[test]
    fn test_replace_successor() {
        let mut branch = Terminator::BranchIfNull {
            value: make_reg(0),
            null_block: BasicBlockId(1),
            not_null_block: BasicBlockId(2),
        };
        branch.replace_successor(BasicBlockId(2), BasicBlockId(7));
        assert_eq!(branch.successors(), vec![BasicBlockId(1), BasicBlockId(7)]);
    }

    #[test]
    fn test_terminator_display() {
        assert_eq!(format!("{}", Terminator::Jump(BasicBlockId(1))), "jump bb1");
        assert_eq!(format!("{}", Terminator::Return(make_reg(0))), "return r0");
        assert_eq!(
            format!(
                "{}",
                Terminator::TryStart {
                    body: BasicBlockId(1),
                    handler: BasicBlockId(2)
                }
            ),
            "try_start bb1 catch bb2"
        );
    }
}
