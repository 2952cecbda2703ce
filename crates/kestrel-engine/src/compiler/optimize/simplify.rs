//! Instruction simplification
//!
//! Folds operators over constant operands and rewrites instructions whose
//! result is already known from operand types (`ThrowIfEmpty` of a value
//! that cannot be empty, `AsNumeric` of a number, single-source phis).

use super::{for_each_function, OptPass};
use crate::compiler::ir::{
    BinaryOp, IrConstant, IrFunction, IrInstr, IrModule, IrType, Register, RegisterId, UnaryOp,
};
use rustc_hash::FxHashMap;

pub struct InstSimplify;

impl OptPass for InstSimplify {
    fn name(&self) -> &str {
        "InstSimplify"
    }

    fn run(&self, module: &mut IrModule) -> bool {
        for_each_function(module, simplify_function)
    }
}

/// Registers are assigned once, so a constant seen in a dominating position
/// holds for every later use. Walking in reverse postorder visits
/// definitions before uses outside of phis.
fn simplify_function(func: &mut IrFunction) -> bool {
    let mut constants: FxHashMap<RegisterId, IrConstant> = FxHashMap::default();
    let mut changed = false;
    for id in func.reverse_postorder() {
        let Some(block) = func.get_block_mut(id) else {
            continue;
        };
        for instr in &mut block.instructions {
            if let Some(replacement) = simplify_instr(instr, &constants) {
                *instr = replacement;
                changed = true;
            }
            match instr {
                IrInstr::Const { dest, value } => {
                    constants.insert(dest.id, value.clone());
                }
                IrInstr::Move { dest, src } => {
                    if let Some(c) = constants.get(&src.id).cloned() {
                        constants.insert(dest.id, c);
                    }
                }
                _ => {}
            }
        }
        // A folded phi may now sit in front of another phi
        if block.instructions.iter().skip_while(|i| i.is_phi()).any(|i| i.is_phi()) {
            let (phis, rest): (Vec<IrInstr>, Vec<IrInstr>) =
                std::mem::take(&mut block.instructions).into_iter().partition(|i| i.is_phi());
            block.instructions = phis;
            block.instructions.extend(rest);
        }
    }
    changed
}

fn simplify_instr(instr: &IrInstr, constants: &FxHashMap<RegisterId, IrConstant>) -> Option<IrInstr> {
    let constant = |reg: &Register| constants.get(&reg.id);
    let fold = |mut dest: Register, value: IrConstant| {
        dest.ty = value.ty();
        IrInstr::Const { dest, value }
    };

    match instr {
        IrInstr::BinaryOp {
            dest,
            op,
            left,
            right,
        } => {
            if let (Some(l), Some(r)) = (constant(left), constant(right)) {
                return eval_binary(*op, l, r).map(|value| fold(*dest, value));
            }
            // Identities that hold for every number, including -0 and NaN
            let is_num = |c: Option<&IrConstant>, n: f64| matches!(c, Some(IrConstant::Number(v)) if *v == n);
            match op {
                BinaryOp::Mul if left.ty.is_number() && is_num(constant(right), 1.0) => {
                    Some(IrInstr::Move { dest: *dest, src: *left })
                }
                BinaryOp::Mul if right.ty.is_number() && is_num(constant(left), 1.0) => {
                    Some(IrInstr::Move { dest: *dest, src: *right })
                }
                BinaryOp::Sub if left.ty.is_number() && is_num(constant(right), 0.0) => {
                    let zero_is_positive =
                        matches!(constant(right), Some(IrConstant::Number(v)) if v.is_sign_positive());
                    zero_is_positive.then(|| IrInstr::Move { dest: *dest, src: *left })
                }
                BinaryOp::StrictEq | BinaryOp::StrictNotEq
                    if left == right && !left.ty.can_be(IrType::NUMBER) =>
                {
                    Some(fold(*dest, IrConstant::Bool(*op == BinaryOp::StrictEq)))
                }
                _ => None,
            }
        }
        IrInstr::UnaryOp { dest, op, operand } => {
            if let Some(c) = constant(operand) {
                return eval_unary(*op, c).map(|value| fold(*dest, value));
            }
            match op {
                UnaryOp::Void => Some(fold(*dest, IrConstant::Undefined)),
                UnaryOp::Plus if operand.ty.is_number() => Some(IrInstr::Move {
                    dest: *dest,
                    src: *operand,
                }),
                UnaryOp::Typeof => type_of_type(operand.ty).map(|s| fold(*dest, IrConstant::String(s.to_string()))),
                _ => None,
            }
        }
        IrInstr::AsNumeric { dest, value } => {
            if let Some(n) = constant(value).and_then(IrConstant::to_number) {
                return Some(fold(*dest, IrConstant::Number(n)));
            }
            value.ty.is_number().then(|| IrInstr::Move {
                dest: *dest,
                src: *value,
            })
        }
        IrInstr::ThrowIfEmpty { dest, value } => {
            let known_full = match constant(value) {
                Some(c) => *c != IrConstant::Empty,
                None => !value.ty.can_be(IrType::EMPTY),
            };
            known_full.then(|| IrInstr::Move {
                dest: *dest,
                src: *value,
            })
        }
        IrInstr::Move { dest, src } => constant(src).map(|c| fold(*dest, c.clone())),
        IrInstr::Phi { dest, sources } => {
            let (_, first) = sources.first()?;
            if sources.iter().all(|(_, r)| r == first) && first != dest {
                return Some(IrInstr::Move {
                    dest: *dest,
                    src: *first,
                });
            }
            let value = constant(first)?;
            sources
                .iter()
                .all(|(_, r)| constant(r) == Some(value))
                .then(|| fold(*dest, value.clone()))
        }
        _ => None,
    }
}

/// `typeof` result when the operand type pins it down
fn type_of_type(ty: IrType) -> Option<&'static str> {
    if !ty.is_single() {
        return None;
    }
    match ty {
        IrType::UNDEFINED => Some("undefined"),
        IrType::NULL => Some("object"),
        IrType::BOOLEAN => Some("boolean"),
        IrType::NUMBER => Some("number"),
        IrType::STRING => Some("string"),
        // Objects may be functions
        _ => None,
    }
}

// ============================================================================
// Evaluation
// ============================================================================

pub(crate) fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let m = n.trunc().rem_euclid(4294967296.0);
    if m >= 2147483648.0 {
        (m - 4294967296.0) as i32
    } else {
        m as i32
    }
}

pub(crate) fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}

fn strict_equals(l: &IrConstant, r: &IrConstant) -> bool {
    match (l, r) {
        (IrConstant::Number(a), IrConstant::Number(b)) => a == b,
        (IrConstant::String(a), IrConstant::String(b)) => a == b,
        (IrConstant::Bool(a), IrConstant::Bool(b)) => a == b,
        (IrConstant::Undefined, IrConstant::Undefined) | (IrConstant::Null, IrConstant::Null) => true,
        _ => false,
    }
}

fn loose_equals(l: &IrConstant, r: &IrConstant) -> Option<bool> {
    use IrConstant::*;
    Some(match (l, r) {
        (Empty, _) | (_, Empty) => return None,
        (Undefined | Null, Undefined | Null) => true,
        (Undefined | Null, _) | (_, Undefined | Null) => false,
        (Number(_), String(_)) | (String(_), Number(_)) | (Bool(_), _) | (_, Bool(_)) => {
            l.to_number()? == r.to_number()?
        }
        _ => strict_equals(l, r),
    })
}

/// Abstract relational comparison; `None` when either side is NaN
fn compare(l: &IrConstant, r: &IrConstant) -> Option<Option<std::cmp::Ordering>> {
    if let (IrConstant::String(a), IrConstant::String(b)) = (l, r) {
        return Some(Some(a.encode_utf16().cmp(b.encode_utf16())));
    }
    let a = l.to_number()?;
    let b = r.to_number()?;
    Some(a.partial_cmp(&b))
}

fn number_pow(base: f64, exp: f64) -> f64 {
    if exp.is_nan() || (base.abs() == 1.0 && exp.is_infinite()) {
        f64::NAN
    } else {
        base.powf(exp)
    }
}

pub(crate) fn eval_binary(op: BinaryOp, l: &IrConstant, r: &IrConstant) -> Option<IrConstant> {
    use std::cmp::Ordering;
    if *l == IrConstant::Empty || *r == IrConstant::Empty {
        return None;
    }
    let nums = || Some((l.to_number()?, r.to_number()?));
    let value = match op {
        BinaryOp::Add => {
            if matches!(l, IrConstant::String(_)) || matches!(r, IrConstant::String(_)) {
                IrConstant::String(format!("{}{}", l.to_js_string()?, r.to_js_string()?))
            } else {
                let (a, b) = nums()?;
                IrConstant::Number(a + b)
            }
        }
        BinaryOp::Sub => nums().map(|(a, b)| IrConstant::Number(a - b))?,
        BinaryOp::Mul => nums().map(|(a, b)| IrConstant::Number(a * b))?,
        BinaryOp::Div => nums().map(|(a, b)| IrConstant::Number(a / b))?,
        BinaryOp::Mod => nums().map(|(a, b)| IrConstant::Number(a % b))?,
        BinaryOp::Exp => nums().map(|(a, b)| IrConstant::Number(number_pow(a, b)))?,
        BinaryOp::StrictEq => IrConstant::Bool(strict_equals(l, r)),
        BinaryOp::StrictNotEq => IrConstant::Bool(!strict_equals(l, r)),
        BinaryOp::Eq => IrConstant::Bool(loose_equals(l, r)?),
        BinaryOp::NotEq => IrConstant::Bool(!loose_equals(l, r)?),
        BinaryOp::Lt => IrConstant::Bool(compare(l, r)? == Some(Ordering::Less)),
        BinaryOp::Gt => IrConstant::Bool(compare(l, r)? == Some(Ordering::Greater)),
        BinaryOp::LtEq => IrConstant::Bool(matches!(compare(l, r)?, Some(Ordering::Less | Ordering::Equal))),
        BinaryOp::GtEq => {
            IrConstant::Bool(matches!(compare(l, r)?, Some(Ordering::Greater | Ordering::Equal)))
        }
        BinaryOp::BitAnd => nums().map(|(a, b)| IrConstant::Number((to_int32(a) & to_int32(b)) as f64))?,
        BinaryOp::BitOr => nums().map(|(a, b)| IrConstant::Number((to_int32(a) | to_int32(b)) as f64))?,
        BinaryOp::BitXor => nums().map(|(a, b)| IrConstant::Number((to_int32(a) ^ to_int32(b)) as f64))?,
        BinaryOp::Shl => {
            nums().map(|(a, b)| IrConstant::Number(to_int32(a).wrapping_shl(to_uint32(b) & 31) as f64))?
        }
        BinaryOp::Shr => {
            nums().map(|(a, b)| IrConstant::Number(to_int32(a).wrapping_shr(to_uint32(b) & 31) as f64))?
        }
        BinaryOp::UShr => {
            nums().map(|(a, b)| IrConstant::Number(to_uint32(a).wrapping_shr(to_uint32(b) & 31) as f64))?
        }
        BinaryOp::In | BinaryOp::InstanceOf => return None,
    };
    Some(value)
}

pub(crate) fn eval_unary(op: UnaryOp, c: &IrConstant) -> Option<IrConstant> {
    if *c == IrConstant::Empty {
        return None;
    }
    let value = match op {
        UnaryOp::Neg => IrConstant::Number(-c.to_number()?),
        UnaryOp::Plus => IrConstant::Number(c.to_number()?),
        UnaryOp::Not => IrConstant::Bool(!c.is_truthy()),
        UnaryOp::BitNot => IrConstant::Number(!to_int32(c.to_number()?) as f64),
        UnaryOp::Typeof => IrConstant::String(c.type_of()?.to_string()),
        UnaryOp::Void => IrConstant::Undefined,
        UnaryOp::Inc => IrConstant::Number(c.to_number()? + 1.0),
        UnaryOp::Dec => IrConstant::Number(c.to_number()? - 1.0),
    };
    Some(value)
}
