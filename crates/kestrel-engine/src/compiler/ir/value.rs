//! IR values: virtual registers, constants, and storage handles

use super::types::IrType;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Virtual register identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterId(pub u32);

impl RegisterId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A typed virtual register
///
/// Identity is the id alone; the type is metadata that passes may refine.
#[derive(Debug, Clone, Copy)]
pub struct Register {
    pub id: RegisterId,
    pub ty: IrType,
}

impl Register {
    pub fn new(id: RegisterId, ty: IrType) -> Self {
        Self { id, ty }
    }
}

impl PartialEq for Register {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Register {}

impl Hash for Register {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Compile-time constant
#[derive(Debug, Clone, PartialEq)]
pub enum IrConstant {
    Undefined,
    Null,
    /// TDZ marker stored into let/const bindings before initialization
    Empty,
    Bool(bool),
    Number(f64),
    String(String),
}

impl IrConstant {
    pub fn ty(&self) -> IrType {
        match self {
            IrConstant::Undefined => IrType::UNDEFINED,
            IrConstant::Null => IrType::NULL,
            IrConstant::Empty => IrType::EMPTY,
            IrConstant::Bool(_) => IrType::BOOLEAN,
            IrConstant::Number(_) => IrType::NUMBER,
            IrConstant::String(_) => IrType::STRING,
        }
    }

    /// ToBoolean
    pub fn is_truthy(&self) -> bool {
        match self {
            IrConstant::Undefined | IrConstant::Null | IrConstant::Empty => false,
            IrConstant::Bool(b) => *b,
            IrConstant::Number(n) => *n != 0.0 && !n.is_nan(),
            IrConstant::String(s) => !s.is_empty(),
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, IrConstant::Undefined | IrConstant::Null)
    }

    /// ToNumber, when it cannot throw
    pub fn to_number(&self) -> Option<f64> {
        match self {
            IrConstant::Undefined => Some(f64::NAN),
            IrConstant::Null => Some(0.0),
            IrConstant::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            IrConstant::Number(n) => Some(*n),
            IrConstant::String(s) => Some(string_to_number(s)),
            IrConstant::Empty => None,
        }
    }

    /// ToString, when it cannot throw
    pub fn to_js_string(&self) -> Option<String> {
        match self {
            IrConstant::Undefined => Some("undefined".to_string()),
            IrConstant::Null => Some("null".to_string()),
            IrConstant::Bool(b) => Some(b.to_string()),
            IrConstant::Number(n) => Some(number_to_string(*n)),
            IrConstant::String(s) => Some(s.clone()),
            IrConstant::Empty => None,
        }
    }

    /// Result of `typeof`
    pub fn type_of(&self) -> Option<&'static str> {
        match self {
            IrConstant::Undefined => Some("undefined"),
            IrConstant::Null => Some("object"),
            IrConstant::Bool(_) => Some("boolean"),
            IrConstant::Number(_) => Some("number"),
            IrConstant::String(_) => Some("string"),
            IrConstant::Empty => None,
        }
    }
}

impl fmt::Display for IrConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrConstant::Undefined => write!(f, "undefined"),
            IrConstant::Null => write!(f, "null"),
            IrConstant::Empty => write!(f, "empty"),
            IrConstant::Bool(b) => write!(f, "{}", b),
            IrConstant::Number(n) => write!(f, "{}", number_to_string(*n)),
            IrConstant::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// Number to string, the way JS prints integral and special values
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// String to number for the literal forms the engine folds
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map(|v| v as f64).unwrap_or(f64::NAN);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// Stack slot of the current function (a non-captured local)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackSlotId(pub u32);

impl fmt::Display for StackSlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$s{}", self.0)
    }
}

/// Variable stored in the function's frame (captured by closures)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameVarId(pub u32);

impl fmt::Display for FrameVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$f{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_identity_ignores_type() {
        let a = Register::new(RegisterId(1), IrType::ANY);
        let b = Register::new(RegisterId(1), IrType::NUMBER);
        assert_eq!(a, b);
        assert_eq!(format!("{}", a), "r1");
    }

    #[test]
    fn test_constant_truthiness() {
        assert!(!IrConstant::Number(0.0).is_truthy());
        assert!(!IrConstant::Number(f64::NAN).is_truthy());
        assert!(IrConstant::String("a".into()).is_truthy());
        assert!(!IrConstant::String(String::new()).is_truthy());
        assert!(!IrConstant::Null.is_truthy());
    }

    #[test]
    fn test_constant_conversions() {
        assert_eq!(IrConstant::Bool(true).to_number(), Some(1.0));
        assert_eq!(IrConstant::String(" 12 ".into()).to_number(), Some(12.0));
        assert!(IrConstant::String("abc".into()).to_number().unwrap().is_nan());
        assert_eq!(IrConstant::Number(3.0).to_js_string(), Some("3".into()));
        assert_eq!(IrConstant::Null.type_of(), Some("object"));
        assert_eq!(IrConstant::Empty.to_number(), None);
    }

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
    }
}
