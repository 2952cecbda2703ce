//! Interned property names

use rustc_hash::FxHashMap;
use std::fmt;
use std::rc::Rc;

/// Interned property name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym{}", self.0)
    }
}

/// Names the runtime refers to directly, interned first in this order
const PREDEFINED: [&str; 14] = [
    "length",
    "prototype",
    "__proto__",
    "constructor",
    "next",
    "throw",
    "return",
    "message",
    "name",
    "raw",
    "value",
    "done",
    "%IteratedObject",
    "%NextIndex",
];

pub mod predefined {
    use super::SymbolId;

    pub const LENGTH: SymbolId = SymbolId(0);
    pub const PROTOTYPE: SymbolId = SymbolId(1);
    pub const PROTO: SymbolId = SymbolId(2);
    pub const CONSTRUCTOR: SymbolId = SymbolId(3);
    pub const NEXT: SymbolId = SymbolId(4);
    pub const THROW: SymbolId = SymbolId(5);
    pub const RETURN: SymbolId = SymbolId(6);
    pub const MESSAGE: SymbolId = SymbolId(7);
    pub const NAME: SymbolId = SymbolId(8);
    pub const RAW: SymbolId = SymbolId(9);
    pub const VALUE: SymbolId = SymbolId(10);
    pub const DONE: SymbolId = SymbolId(11);
    /// Internal slots of array iterators
    pub const ITERATED_OBJECT: SymbolId = SymbolId(12);
    pub const NEXT_INDEX: SymbolId = SymbolId(13);
}

/// String interning table for property names
#[derive(Debug)]
pub struct IdentifierTable {
    names: Vec<Rc<str>>,
    ids: FxHashMap<Rc<str>, SymbolId>,
}

impl IdentifierTable {
    pub fn new() -> Self {
        let mut table = Self {
            names: Vec::new(),
            ids: FxHashMap::default(),
        };
        for name in PREDEFINED {
            table.intern(name);
        }
        table
    }

    /// Intern a name, returning the existing id if already present
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = SymbolId(self.names.len() as u32);
        let name: Rc<str> = Rc::from(name);
        self.names.push(Rc::clone(&name));
        self.ids.insert(name, id);
        id
    }

    pub fn get(&self, name: &str) -> Option<SymbolId> {
        self.ids.get(name).copied()
    }

    /// The text of an interned name
    pub fn name(&self, id: SymbolId) -> &Rc<str> {
        &self.names[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for IdentifierTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_ids() {
        let table = IdentifierTable::new();
        assert_eq!(table.get("length"), Some(predefined::LENGTH));
        assert_eq!(table.get("done"), Some(predefined::DONE));
        assert_eq!(&**table.name(predefined::PROTO), "__proto__");
    }

    #[test]
    fn test_intern_is_idempotent() {
        let mut table = IdentifierTable::new();
        let before = table.len();
        let a = table.intern("x");
        let b = table.intern("x");
        assert_eq!(a, b);
        assert_eq!(table.len(), before + 1);
        assert_eq!(&**table.name(a), "x");
    }
}
