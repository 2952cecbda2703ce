//! IR Instructions
//!
//! Three-address instructions over typed virtual registers. Control flow
//! lives in `Terminator`; everything here falls through.

use super::block::BasicBlockId;
use super::builtin::BuiltinMethod;
use super::types::IrType;
use super::value::{FrameVarId, IrConstant, Register, StackSlotId};
use std::fmt;

/// Function identifier (index into the module's function list)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

impl FunctionId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
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

impl BinaryOp {
    /// Operators whose result is always a boolean
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::StrictEq
                | BinaryOp::StrictNotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
                | BinaryOp::In
                | BinaryOp::InstanceOf
        )
    }

    /// Result type given the operand types
    pub fn result_type(self, left: IrType, right: IrType) -> IrType {
        if self.is_comparison() {
            return IrType::BOOLEAN;
        }
        match self {
            BinaryOp::Add => {
                if left.is_number() && right.is_number() {
                    IrType::NUMBER
                } else if left == IrType::STRING || right == IrType::STRING {
                    IrType::STRING
                } else {
                    IrType::NUMBER | IrType::STRING
                }
            }
            _ => IrType::NUMBER,
        }
    }

    /// Operators that never invoke user code (no ToPrimitive, no traps)
    pub fn is_side_effect_free(self, left: IrType, right: IrType) -> bool {
        match self {
            BinaryOp::StrictEq | BinaryOp::StrictNotEq => true,
            BinaryOp::In | BinaryOp::InstanceOf => false,
            _ => {
                let plain = IrType::PRIMITIVE;
                left.is_subset_of(plain) && right.is_subset_of(plain)
            }
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Exp => "**",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::In => "in",
            BinaryOp::InstanceOf => "instanceof",
        };
        write!(f, "{}", s)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    /// ToNumber
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
    Inc,
    Dec,
}

impl UnaryOp {
    pub fn result_type(self) -> IrType {
        match self {
            UnaryOp::Not => IrType::BOOLEAN,
            UnaryOp::Typeof => IrType::STRING,
            UnaryOp::Void => IrType::UNDEFINED,
            _ => IrType::NUMBER,
        }
    }

    pub fn is_side_effect_free(self, operand: IrType) -> bool {
        match self {
            UnaryOp::Not | UnaryOp::Typeof | UnaryOp::Void => true,
            _ => operand.is_subset_of(IrType::PRIMITIVE),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Typeof => "typeof ",
            UnaryOp::Void => "void ",
            UnaryOp::Inc => "inc ",
            UnaryOp::Dec => "dec ",
        };
        write!(f, "{}", s)
    }
}

/// Key operand of a property access
#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    /// Known name: goes through the by-id inline cache
    Named(String),
    /// Computed key: by-val access
    Value(Register),
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Named(name) => write!(f, ".{}", name),
            PropKey::Value(reg) => write!(f, "[{}]", reg),
        }
    }
}

/// IR instruction
#[derive(Debug, Clone, PartialEq)]
pub enum IrInstr {
    /// dest = constant
    Const { dest: Register, value: IrConstant },

    /// dest = src
    Move { dest: Register, src: Register },

    /// dest = parameter `index` (0 is `this`)
    LoadParam { dest: Register, index: u32 },

    /// dest = left op right
    BinaryOp {
        dest: Register,
        op: BinaryOp,
        left: Register,
        right: Register,
    },

    /// dest = op operand
    UnaryOp {
        dest: Register,
        op: UnaryOp,
        operand: Register,
    },

    /// dest = ToNumeric(value)
    AsNumeric { dest: Register, value: Register },

    /// SSA merge; one source per predecessor
    Phi {
        dest: Register,
        sources: Vec<(BasicBlockId, Register)>,
    },

    /// Declare a stack slot
    AllocStack { slot: StackSlotId },

    LoadStack { dest: Register, slot: StackSlotId },

    StoreStack { slot: StackSlotId, value: Register },

    LoadFrame { dest: Register, var: FrameVarId },

    StoreFrame { var: FrameVarId, value: Register },

    LoadGlobal { dest: Register, name: String },

    StoreGlobal { name: String, value: Register },

    /// dest = value, throwing ReferenceError if value is the TDZ marker
    ThrowIfEmpty { dest: Register, value: Register },

    /// Create a closure over the current frame
    CreateFunction { dest: Register, function: FunctionId },

    /// Reify `arguments`
    CreateArguments { dest: Register },

    /// Allocate an empty object with room for `size` properties
    AllocObject {
        dest: Register,
        size: u32,
        parent: Option<Register>,
    },

    /// Allocate an object from a literal buffer; the shape is cached per site
    AllocObjectLiteral {
        dest: Register,
        site: u32,
        properties: Vec<(String, IrConstant)>,
    },

    /// Allocate an array from a literal buffer
    AllocArray {
        dest: Register,
        elements: Vec<IrConstant>,
        min_size: u32,
    },

    /// Define an own property that may already exist
    StoreOwnProperty {
        object: Register,
        key: Register,
        value: Register,
        enumerable: bool,
    },

    /// Define an own property known not to exist yet
    StoreNewOwnProperty {
        object: Register,
        name: String,
        value: Register,
        enumerable: bool,
    },

    StoreGetterSetter {
        object: Register,
        key: Register,
        getter: Option<Register>,
        setter: Option<Register>,
        enumerable: bool,
    },

    LoadProperty {
        dest: Register,
        object: Register,
        key: PropKey,
    },

    StoreProperty {
        object: Register,
        key: PropKey,
        value: Register,
    },

    DeleteProperty {
        dest: Register,
        object: Register,
        key: PropKey,
    },

    /// dest = callee.call(this, ...args); `target` is set once the callee is known
    Call {
        dest: Register,
        callee: Register,
        this: Register,
        args: Vec<Register>,
        target: Option<FunctionId>,
    },

    /// Call a natively implemented function with typed arguments
    CallNative {
        dest: Register,
        callee: Register,
        args: Vec<Register>,
    },

    CallBuiltin {
        dest: Register,
        builtin: BuiltinMethod,
        args: Vec<Register>,
    },

    GetBuiltinClosure {
        dest: Register,
        builtin: BuiltinMethod,
    },

    /// Evaluate `source` in the caller's scope
    DirectEval {
        dest: Register,
        source: Register,
        strict: bool,
    },

    /// Allocate the receiver of a `new` call
    CreateThis {
        dest: Register,
        prototype: Register,
        closure: Register,
    },

    /// Pick the result of a constructor call: `result` if it is an object, else `this`
    GetConstructedObject {
        dest: Register,
        this: Register,
        result: Register,
    },

    /// First instruction executed by a generator body
    StartGenerator,

    /// dest = value sent on resume; `is_return` receives the forced-return flag
    ResumeGenerator { dest: Register, is_return: StackSlotId },

    AllocFastArray { dest: Register, capacity: u32 },

    FastArrayLoad {
        dest: Register,
        array: Register,
        index: Register,
    },

    FastArrayStore {
        array: Register,
        index: Register,
        value: Register,
    },

    FastArrayPush { array: Register, value: Register },

    FastArrayAppend { array: Register, other: Register },

    FastArrayLength { dest: Register, array: Register },

    /// Leave the innermost try region
    TryEnd,

    /// dest = the exception being handled (first instruction of a handler)
    Catch { dest: Register },
}

impl IrInstr {
    /// Register defined by this instruction
    pub fn dest(&self) -> Option<Register> {
        self.dest_ref().copied()
    }

    fn dest_ref(&self) -> Option<&Register> {
        match self {
            IrInstr::Const { dest, .. }
            | IrInstr::Move { dest, .. }
            | IrInstr::LoadParam { dest, .. }
            | IrInstr::BinaryOp { dest, .. }
            | IrInstr::UnaryOp { dest, .. }
            | IrInstr::AsNumeric { dest, .. }
            | IrInstr::Phi { dest, .. }
            | IrInstr::LoadStack { dest, .. }
            | IrInstr::LoadFrame { dest, .. }
            | IrInstr::LoadGlobal { dest, .. }
            | IrInstr::ThrowIfEmpty { dest, .. }
            | IrInstr::CreateFunction { dest, .. }
            | IrInstr::CreateArguments { dest }
            | IrInstr::AllocObject { dest, .. }
            | IrInstr::AllocObjectLiteral { dest, .. }
            | IrInstr::AllocArray { dest, .. }
            | IrInstr::LoadProperty { dest, .. }
            | IrInstr::DeleteProperty { dest, .. }
            | IrInstr::Call { dest, .. }
            | IrInstr::CallNative { dest, .. }
            | IrInstr::CallBuiltin { dest, .. }
            | IrInstr::GetBuiltinClosure { dest, .. }
            | IrInstr::DirectEval { dest, .. }
            | IrInstr::CreateThis { dest, .. }
            | IrInstr::GetConstructedObject { dest, .. }
            | IrInstr::ResumeGenerator { dest, .. }
            | IrInstr::AllocFastArray { dest, .. }
            | IrInstr::FastArrayLoad { dest, .. }
            | IrInstr::FastArrayLength { dest, .. }
            | IrInstr::Catch { dest } => Some(dest),
            IrInstr::AllocStack { .. }
            | IrInstr::StoreStack { .. }
            | IrInstr::StoreFrame { .. }
            | IrInstr::StoreGlobal { .. }
            | IrInstr::StoreOwnProperty { .. }
            | IrInstr::StoreNewOwnProperty { .. }
            | IrInstr::StoreGetterSetter { .. }
            | IrInstr::StoreProperty { .. }
            | IrInstr::StartGenerator
            | IrInstr::FastArrayStore { .. }
            | IrInstr::FastArrayPush { .. }
            | IrInstr::FastArrayAppend { .. }
            | IrInstr::TryEnd => None,
        }
    }

    /// Mutable access to the defined register
    pub fn dest_mut(&mut self) -> Option<&mut Register> {
        match self {
            IrInstr::Const { dest, .. }
            | IrInstr::Move { dest, .. }
            | IrInstr::LoadParam { dest, .. }
            | IrInstr::BinaryOp { dest, .. }
            | IrInstr::UnaryOp { dest, .. }
            | IrInstr::AsNumeric { dest, .. }
            | IrInstr::Phi { dest, .. }
            | IrInstr::LoadStack { dest, .. }
            | IrInstr::LoadFrame { dest, .. }
            | IrInstr::LoadGlobal { dest, .. }
            | IrInstr::ThrowIfEmpty { dest, .. }
            | IrInstr::CreateFunction { dest, .. }
            | IrInstr::CreateArguments { dest }
            | IrInstr::AllocObject { dest, .. }
            | IrInstr::AllocObjectLiteral { dest, .. }
            | IrInstr::AllocArray { dest, .. }
            | IrInstr::LoadProperty { dest, .. }
            | IrInstr::DeleteProperty { dest, .. }
            | IrInstr::Call { dest, .. }
            | IrInstr::CallNative { dest, .. }
            | IrInstr::CallBuiltin { dest, .. }
            | IrInstr::GetBuiltinClosure { dest, .. }
            | IrInstr::DirectEval { dest, .. }
            | IrInstr::CreateThis { dest, .. }
            | IrInstr::GetConstructedObject { dest, .. }
            | IrInstr::ResumeGenerator { dest, .. }
            | IrInstr::AllocFastArray { dest, .. }
            | IrInstr::FastArrayLoad { dest, .. }
            | IrInstr::FastArrayLength { dest, .. }
            | IrInstr::Catch { dest } => Some(dest),
            _ => None,
        }
    }

    /// Registers read by this instruction, in operand order
    pub fn operands(&self) -> Vec<Register> {
        let mut regs = Vec::new();
        self.visit_operands(|r| regs.push(*r));
        regs
    }

    /// Visit every register read by this instruction
    pub fn visit_operands(&self, mut f: impl FnMut(&Register)) {
        match self {
            IrInstr::Const { .. }
            | IrInstr::LoadParam { .. }
            | IrInstr::AllocStack { .. }
            | IrInstr::LoadStack { .. }
            | IrInstr::LoadFrame { .. }
            | IrInstr::LoadGlobal { .. }
            | IrInstr::CreateFunction { .. }
            | IrInstr::CreateArguments { .. }
            | IrInstr::AllocObjectLiteral { .. }
            | IrInstr::AllocArray { .. }
            | IrInstr::GetBuiltinClosure { .. }
            | IrInstr::StartGenerator
            | IrInstr::ResumeGenerator { .. }
            | IrInstr::AllocFastArray { .. }
            | IrInstr::TryEnd
            | IrInstr::Catch { .. } => {}
            IrInstr::Move { src, .. } => f(src),
            IrInstr::BinaryOp { left, right, .. } => {
                f(left);
                f(right);
            }
            IrInstr::UnaryOp { operand, .. } => f(operand),
            IrInstr::AsNumeric { value, .. } => f(value),
            IrInstr::Phi { sources, .. } => sources.iter().for_each(|(_, r)| f(r)),
            IrInstr::StoreStack { value, .. }
            | IrInstr::StoreFrame { value, .. }
            | IrInstr::StoreGlobal { value, .. }
            | IrInstr::ThrowIfEmpty { value, .. } => f(value),
            IrInstr::AllocObject { parent, .. } => {
                if let Some(p) = parent {
                    f(p);
                }
            }
            IrInstr::StoreOwnProperty {
                object, key, value, ..
            } => {
                f(object);
                f(key);
                f(value);
            }
            IrInstr::StoreNewOwnProperty { object, value, .. } => {
                f(object);
                f(value);
            }
            IrInstr::StoreGetterSetter {
                object,
                key,
                getter,
                setter,
                ..
            } => {
                f(object);
                f(key);
                if let Some(g) = getter {
                    f(g);
                }
                if let Some(s) = setter {
                    f(s);
                }
            }
            IrInstr::LoadProperty { object, key, .. } | IrInstr::DeleteProperty { object, key, .. } => {
                f(object);
                if let PropKey::Value(k) = key {
                    f(k);
                }
            }
            IrInstr::StoreProperty { object, key, value } => {
                f(object);
                if let PropKey::Value(k) = key {
                    f(k);
                }
                f(value);
            }
            IrInstr::Call {
                callee, this, args, ..
            } => {
                f(callee);
                f(this);
                args.iter().for_each(f);
            }
            IrInstr::CallNative { callee, args, .. } => {
                f(callee);
                args.iter().for_each(f);
            }
            IrInstr::CallBuiltin { args, .. } => args.iter().for_each(f),
            IrInstr::DirectEval { source, .. } => f(source),
            IrInstr::CreateThis {
                prototype, closure, ..
            } => {
                f(prototype);
                f(closure);
            }
            IrInstr::GetConstructedObject { this, result, .. } => {
                f(this);
                f(result);
            }
            IrInstr::FastArrayLoad { array, index, .. } => {
                f(array);
                f(index);
            }
            IrInstr::FastArrayStore {
                array,
                index,
                value,
            } => {
                f(array);
                f(index);
                f(value);
            }
            IrInstr::FastArrayPush { array, value } => {
                f(array);
                f(value);
            }
            IrInstr::FastArrayAppend { array, other } => {
                f(array);
                f(other);
            }
            IrInstr::FastArrayLength { array, .. } => f(array),
        }
    }

    /// Rewrite every register read by this instruction
    pub fn visit_operands_mut(&mut self, mut f: impl FnMut(&mut Register)) {
        match self {
            IrInstr::Const { .. }
            | IrInstr::LoadParam { .. }
            | IrInstr::AllocStack { .. }
            | IrInstr::LoadStack { .. }
            | IrInstr::LoadFrame { .. }
            | IrInstr::LoadGlobal { .. }
            | IrInstr::CreateFunction { .. }
            | IrInstr::CreateArguments { .. }
            | IrInstr::AllocObjectLiteral { .. }
            | IrInstr::AllocArray { .. }
            | IrInstr::GetBuiltinClosure { .. }
            | IrInstr::StartGenerator
            | IrInstr::ResumeGenerator { .. }
            | IrInstr::AllocFastArray { .. }
            | IrInstr::TryEnd
            | IrInstr::Catch { .. } => {}
            IrInstr::Move { src, .. } => f(src),
            IrInstr::BinaryOp { left, right, .. } => {
                f(left);
                f(right);
            }
            IrInstr::UnaryOp { operand, .. } => f(operand),
            IrInstr::AsNumeric { value, .. } => f(value),
            IrInstr::Phi { sources, .. } => sources.iter_mut().for_each(|(_, r)| f(r)),
            IrInstr::StoreStack { value, .. }
            | IrInstr::StoreFrame { value, .. }
            | IrInstr::StoreGlobal { value, .. }
            | IrInstr::ThrowIfEmpty { value, .. } => f(value),
            IrInstr::AllocObject { parent, .. } => {
                if let Some(p) = parent {
                    f(p);
                }
            }
            IrInstr::StoreOwnProperty {
                object, key, value, ..
            } => {
                f(object);
                f(key);
                f(value);
            }
            IrInstr::StoreNewOwnProperty { object, value, .. } => {
                f(object);
                f(value);
            }
            IrInstr::StoreGetterSetter {
                object,
                key,
                getter,
                setter,
                ..
            } => {
                f(object);
                f(key);
                if let Some(g) = getter {
                    f(g);
                }
                if let Some(s) = setter {
                    f(s);
                }
            }
            IrInstr::LoadProperty { object, key, .. } | IrInstr::DeleteProperty { object, key, .. } => {
                f(object);
                if let PropKey::Value(k) = key {
                    f(k);
                }
            }
            IrInstr::StoreProperty { object, key, value } => {
                f(object);
                if let PropKey::Value(k) = key {
                    f(k);
                }
                f(value);
            }
            IrInstr::Call {
                callee, this, args, ..
            } => {
                f(callee);
                f(this);
                args.iter_mut().for_each(f);
            }
            IrInstr::CallNative { callee, args, .. } => {
                f(callee);
                args.iter_mut().for_each(f);
            }
            IrInstr::CallBuiltin { args, .. } => args.iter_mut().for_each(f),
            IrInstr::DirectEval { source, .. } => f(source),
            IrInstr::CreateThis {
                prototype, closure, ..
            } => {
                f(prototype);
                f(closure);
            }
            IrInstr::GetConstructedObject { this, result, .. } => {
                f(this);
                f(result);
            }
            IrInstr::FastArrayLoad { array, index, .. } => {
                f(array);
                f(index);
            }
            IrInstr::FastArrayStore {
                array,
                index,
                value,
            } => {
                f(array);
                f(index);
                f(value);
            }
            IrInstr::FastArrayPush { array, value } => {
                f(array);
                f(value);
            }
            IrInstr::FastArrayAppend { array, other } => {
                f(array);
                f(other);
            }
            IrInstr::FastArrayLength { array, .. } => f(array),
        }
    }

    /// Whether removing this instruction (when its result is unused) could
    /// change observable behavior
    pub fn has_side_effects(&self) -> bool {
        match self {
            IrInstr::Const { .. }
            | IrInstr::Move { .. }
            | IrInstr::LoadParam { .. }
            | IrInstr::Phi { .. }
            | IrInstr::LoadStack { .. }
            | IrInstr::LoadFrame { .. }
            | IrInstr::LoadGlobal { .. }
            | IrInstr::CreateFunction { .. }
            | IrInstr::CreateArguments { .. }
            | IrInstr::AllocObject { .. }
            | IrInstr::AllocObjectLiteral { .. }
            | IrInstr::AllocArray { .. }
            | IrInstr::GetBuiltinClosure { .. }
            | IrInstr::AllocFastArray { .. }
            | IrInstr::FastArrayLength { .. } => false,
            IrInstr::BinaryOp {
                op, left, right, ..
            } => !op.is_side_effect_free(left.ty, right.ty),
            IrInstr::UnaryOp { op, operand, .. } => !op.is_side_effect_free(operand.ty),
            IrInstr::AsNumeric { value, .. } => !value.ty.is_subset_of(IrType::PRIMITIVE),
            IrInstr::ThrowIfEmpty { value, .. } => value.ty.can_be(IrType::EMPTY),
            _ => true,
        }
    }

    /// Same operands always produce the same result and nothing else happens
    pub fn is_pure(&self) -> bool {
        match self {
            IrInstr::Const { .. } | IrInstr::LoadParam { .. } => true,
            IrInstr::BinaryOp { .. } | IrInstr::UnaryOp { .. } | IrInstr::AsNumeric { .. } => {
                !self.has_side_effects()
            }
            _ => false,
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, IrInstr::Phi { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::value::RegisterId;

    fn reg(id: u32, ty: IrType) -> Register {
        Register::new(RegisterId(id), ty)
    }

    #[test]
    fn test_dest_and_operands() {
        let instr = IrInstr::BinaryOp {
            dest: reg(2, IrType::NUMBER),
            op: BinaryOp::Add,
            left: reg(0, IrType::NUMBER),
            right: reg(1, IrType::NUMBER),
        };
        assert_eq!(instr.dest(), Some(reg(2, IrType::ANY)));
        assert_eq!(instr.operands(), vec![reg(0, IrType::ANY), reg(1, IrType::ANY)]);
    }

    #[test]
    fn test_store_property_operands() {
        let instr = IrInstr::StoreProperty {
            object: reg(0, IrType::OBJECT),
            key: PropKey::Value(reg(1, IrType::STRING)),
            value: reg(2, IrType::ANY),
        };
        assert!(instr.dest().is_none());
        assert_eq!(instr.operands().len(), 3);
    }

    #[test]
    fn test_visit_operands_mut_rewrites() {
        let mut instr = IrInstr::Call {
            dest: reg(5, IrType::ANY),
            callee: reg(0, IrType::OBJECT),
            this: reg(1, IrType::UNDEFINED),
            args: vec![reg(2, IrType::ANY), reg(3, IrType::ANY)],
            target: None,
        };
        instr.visit_operands_mut(|r| r.id = RegisterId(r.id.0 + 10));
        assert_eq!(
            instr.operands().iter().map(|r| r.id.0).collect::<Vec<_>>(),
            vec![10, 11, 12, 13]
        );
        assert_eq!(instr.dest().map(|d| d.id.0), Some(5));
    }

    #[test]
    fn test_side_effects_depend_on_types() {
        let numeric = IrInstr::BinaryOp {
            dest: reg(2, IrType::NUMBER),
            op: BinaryOp::Mul,
            left: reg(0, IrType::NUMBER),
            right: reg(1, IrType::NUMBER),
        };
        assert!(!numeric.has_side_effects());
        assert!(numeric.is_pure());

        let unknown = IrInstr::BinaryOp {
            dest: reg(2, IrType::ANY),
            op: BinaryOp::Mul,
            left: reg(0, IrType::ANY),
            right: reg(1, IrType::NUMBER),
        };
        assert!(unknown.has_side_effects());

        let load = IrInstr::LoadProperty {
            dest: reg(3, IrType::ANY),
            object: reg(0, IrType::OBJECT),
            key: PropKey::Named("x".into()),
        };
        assert!(load.has_side_effects());
    }

    #[test]
    fn test_add_result_type() {
        assert_eq!(BinaryOp::Add.result_type(IrType::NUMBER, IrType::NUMBER), IrType::NUMBER);
        assert_eq!(BinaryOp::Add.result_type(IrType::STRING, IrType::NUMBER), IrType::STRING);
        assert_eq!(BinaryOp::Lt.result_type(IrType::ANY, IrType::ANY), IrType::BOOLEAN);
    }
}
