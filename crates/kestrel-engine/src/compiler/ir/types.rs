//! IR value types
//!
//! A type is a set of primitive kinds a value may have at runtime. Lowering
//! attaches declared or obvious types; the type inference pass narrows the
//! rest.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IrType(u16);

impl IrType {
    pub const NONE: IrType = IrType(0);
    pub const UNDEFINED: IrType = IrType(1 << 0);
    pub const NULL: IrType = IrType(1 << 1);
    pub const BOOLEAN: IrType = IrType(1 << 2);
    pub const NUMBER: IrType = IrType(1 << 3);
    pub const STRING: IrType = IrType(1 << 4);
    pub const OBJECT: IrType = IrType(1 << 5);
    /// The TDZ marker of an uninitialized binding
    pub const EMPTY: IrType = IrType(1 << 6);
    pub const ANY: IrType = IrType(0x7f);

    pub const NULLISH: IrType = IrType(Self::UNDEFINED.0 | Self::NULL.0);
    pub const PRIMITIVE: IrType = IrType(
        Self::UNDEFINED.0 | Self::NULL.0 | Self::BOOLEAN.0 | Self::NUMBER.0 | Self::STRING.0,
    );

    pub fn union(self, other: IrType) -> IrType {
        IrType(self.0 | other.0)
    }

    pub fn intersect(self, other: IrType) -> IrType {
        IrType(self.0 & other.0)
    }

    pub fn is_subset_of(self, other: IrType) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn is_any(self) -> bool {
        self == Self::ANY
    }

    /// Exactly one kind
    pub fn is_single(self) -> bool {
        self.0 != 0 && self.0 & (self.0 - 1) == 0
    }

    pub fn can_be(self, kind: IrType) -> bool {
        self.0 & kind.0 != 0
    }

    pub fn is_number(self) -> bool {
        self == Self::NUMBER
    }

    pub fn is_object(self) -> bool {
        self == Self::OBJECT
    }

    /// Drop the TDZ marker from the set
    pub fn without_empty(self) -> IrType {
        IrType(self.0 & !Self::EMPTY.0)
    }
}

impl Default for IrType {
    fn default() -> Self {
        IrType::ANY
    }
}

impl BitOr for IrType {
    type Output = IrType;

    fn bitor(self, rhs: IrType) -> IrType {
        self.union(rhs)
    }
}

impl BitOrAssign for IrType {
    fn bitor_assign(&mut self, rhs: IrType) {
        *self = self.union(rhs);
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return write!(f, "any");
        }
        if self.is_none() {
            return write!(f, "none");
        }
        const NAMES: [(IrType, &str); 7] = [
            (IrType::UNDEFINED, "undefined"),
            (IrType::NULL, "null"),
            (IrType::BOOLEAN, "boolean"),
            (IrType::NUMBER, "number"),
            (IrType::STRING, "string"),
            (IrType::OBJECT, "object"),
            (IrType::EMPTY, "empty"),
        ];
        let mut first = true;
        for (kind, name) in NAMES {
            if self.can_be(kind) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}
