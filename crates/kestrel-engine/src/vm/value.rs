//! Runtime values

use super::heap::ObjectId;
use crate::compiler::ir::value::{number_to_string, string_to_number};
use std::fmt;
use std::rc::Rc;

/// A JS value
///
/// `Empty` never escapes to user code; it marks TDZ bindings and array
/// holes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Empty,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectId),
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// ToBoolean
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null | Value::Empty => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// ToNumber for primitives; objects convert to NaN
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined | Value::Empty | Value::Object(_) => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
        }
    }

    /// ToString for primitives; objects print as `[object Object]`
    pub fn to_js_string(&self) -> Rc<str> {
        match self {
            Value::String(s) => Rc::clone(s),
            other => Rc::from(other.to_string()),
        }
    }

    /// SameValueZero, used by array and key comparisons
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (a, b) => a == b,
        }
    }

    /// `typeof` for values that are not callable objects
    pub fn primitive_type_name(&self) -> &'static str {
        match self {
            Value::Undefined | Value::Empty => "undefined",
            Value::Null | Value::Object(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined | Value::Empty => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Object(_) => write!(f, "[object Object]"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Object(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_boolean() {
        assert!(!Value::Number(f64::NAN).to_boolean());
        assert!(!Value::Number(-0.0).to_boolean());
        assert!(!Value::string("").to_boolean());
        assert!(Value::string("0").to_boolean());
        assert!(Value::Object(ObjectId(0)).to_boolean());
    }

    #[test]
    fn test_to_number_and_string() {
        assert_eq!(Value::string(" 12 ").to_number(), 12.0);
        assert!(Value::Undefined.to_number().is_nan());
        assert_eq!(Value::Null.to_number(), 0.0);
        assert_eq!(&*Value::Number(3.0).to_js_string(), "3");
        assert_eq!(&*Value::Number(0.5).to_js_string(), "0.5");
        assert_eq!(&*Value::Bool(true).to_js_string(), "true");
    }

    #[test]
    fn test_same_value_zero() {
        assert!(Value::Number(f64::NAN).same_value_zero(&Value::Number(f64::NAN)));
        assert!(Value::Number(0.0).same_value_zero(&Value::Number(-0.0)));
        assert!(!Value::Number(1.0).same_value_zero(&Value::string("1")));
    }
}
