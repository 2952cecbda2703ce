//! Hidden classes
//!
//! Objects with the same property names added in the same order share a
//! class. Each class maps names to slot indices; adding a property moves an
//! object to a child class through a transition cached on the parent, so
//! the second object built the same way reuses the same chain.
//!
//! A class that grows past the dictionary threshold, or whose layout is
//! changed by a delete or an attribute change, becomes a dictionary: a
//! class owned by a single object and mutated in place. Dictionary classes
//! never record transitions, and inline caches never remember them since
//! their layout can change without the class id changing.

use super::identifier::SymbolId;
use rustc_hash::FxHashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class{}", self.0)
    }
}

/// Property attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyFlags {
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
    /// The slot holds an accessor pair object
    pub accessor: bool,
    /// Writes go through a runtime setter even though the slot is data
    pub internal_setter: bool,
}

impl PropertyFlags {
    /// Attributes of a property created by assignment
    pub const fn plain() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
            accessor: false,
            internal_setter: false,
        }
    }

    /// Attributes of builtin methods and hidden bookkeeping properties
    pub const fn hidden() -> Self {
        Self {
            writable: true,
            enumerable: false,
            configurable: true,
            accessor: false,
            internal_setter: false,
        }
    }

    pub const fn accessor() -> Self {
        Self {
            writable: false,
            enumerable: true,
            configurable: true,
            accessor: true,
            internal_setter: false,
        }
    }

    pub const fn frozen() -> Self {
        Self {
            writable: false,
            enumerable: true,
            configurable: false,
            accessor: false,
            internal_setter: false,
        }
    }

    /// A data property writes can go to directly
    pub fn is_plain_writable(&self) -> bool {
        !self.accessor && self.writable && !self.internal_setter
    }
}

impl Default for PropertyFlags {
    fn default() -> Self {
        Self::plain()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub slot: u32,
    pub flags: PropertyFlags,
}

#[derive(Debug, Clone)]
struct HiddenClass {
    properties: FxHashMap<SymbolId, PropertyDescriptor>,
    /// Insertion order, for enumeration
    order: Vec<SymbolId>,
    transitions: FxHashMap<(SymbolId, PropertyFlags), ClassId>,
    dictionary: bool,
    slot_count: u32,
}

impl HiddenClass {
    fn empty() -> Self {
        Self {
            properties: FxHashMap::default(),
            order: Vec::new(),
            transitions: FxHashMap::default(),
            dictionary: false,
            slot_count: 0,
        }
    }

    fn child(&self) -> Self {
        Self {
            properties: self.properties.clone(),
            order: self.order.clone(),
            transitions: FxHashMap::default(),
            dictionary: self.dictionary,
            slot_count: self.slot_count,
        }
    }

    fn insert(&mut self, name: SymbolId, flags: PropertyFlags) -> u32 {
        let slot = self.slot_count;
        self.slot_count += 1;
        self.properties.insert(name, PropertyDescriptor { slot, flags });
        self.order.push(name);
        slot
    }
}

/// Arena of hidden classes
#[derive(Debug)]
pub struct ClassTable {
    classes: Vec<HiddenClass>,
    dictionary_threshold: usize,
}

impl ClassTable {
    pub fn new(dictionary_threshold: usize) -> Self {
        Self {
            classes: vec![HiddenClass::empty()],
            dictionary_threshold,
        }
    }

    /// The class of a fresh object with no properties
    pub fn root(&self) -> ClassId {
        ClassId(0)
    }

    fn get(&self, id: ClassId) -> &HiddenClass {
        &self.classes[id.0 as usize]
    }

    fn get_mut(&mut self, id: ClassId) -> &mut HiddenClass {
        &mut self.classes[id.0 as usize]
    }

    fn push(&mut self, class: HiddenClass) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(class);
        id
    }

    pub fn lookup(&self, class: ClassId, name: SymbolId) -> Option<PropertyDescriptor> {
        self.get(class).properties.get(&name).copied()
    }

    pub fn is_dictionary(&self, class: ClassId) -> bool {
        self.get(class).dictionary
    }

    pub fn property_count(&self, class: ClassId) -> usize {
        self.get(class).properties.len()
    }

    /// Slots an object of this class needs
    pub fn slot_count(&self, class: ClassId) -> usize {
        self.get(class).slot_count as usize
    }

    /// Own properties in insertion order
    pub fn properties(&self, class: ClassId) -> Vec<(SymbolId, PropertyDescriptor)> {
        let class = self.get(class);
        class
            .order
            .iter()
            .filter_map(|name| class.properties.get(name).map(|desc| (*name, *desc)))
            .collect()
    }

    /// Add a property not yet present, returning the object's new class and
    /// the slot of the property
    pub fn add_property(&mut self, class: ClassId, name: SymbolId, flags: PropertyFlags) -> (ClassId, u32) {
        debug_assert!(self.lookup(class, name).is_none(), "property already present");

        if self.is_dictionary(class) {
            let slot = self.get_mut(class).insert(name, flags);
            return (class, slot);
        }

        if let Some(&next) = self.get(class).transitions.get(&(name, flags)) {
            let slot = self.get(next).properties[&name].slot;
            return (next, slot);
        }

        let mut child = self.get(class).child();
        let slot = child.insert(name, flags);
        if child.properties.len() > self.dictionary_threshold {
            log::trace!(
                "{} converted to dictionary at {} properties",
                class,
                child.properties.len()
            );
            child.dictionary = true;
            return (self.push(child), slot);
        }

        let next = self.push(child);
        self.get_mut(class).transitions.insert((name, flags), next);
        (next, slot)
    }

    /// A dictionary class with the same layout; dictionaries are returned
    /// unchanged
    pub fn to_dictionary(&mut self, class: ClassId) -> ClassId {
        if self.is_dictionary(class) {
            return class;
        }
        let mut dict = self.get(class).child();
        dict.dictionary = true;
        let id = self.push(dict);
        log::trace!("{} converted to dictionary as {}", class, id);
        id
    }

    /// Remove a property; the object moves to a dictionary class and the
    /// returned slot is left unused
    pub fn delete_property(&mut self, class: ClassId, name: SymbolId) -> (ClassId, Option<u32>) {
        if self.lookup(class, name).is_none() {
            return (class, None);
        }
        let dict = self.to_dictionary(class);
        let entry = self.get_mut(dict);
        let removed = entry.properties.remove(&name).map(|desc| desc.slot);
        entry.order.retain(|n| *n != name);
        (dict, removed)
    }

    /// Change a property's attributes; the object moves to a dictionary class
    pub fn update_flags(&mut self, class: ClassId, name: SymbolId, flags: PropertyFlags) -> ClassId {
        match self.lookup(class, name) {
            Some(desc) if desc.flags == flags => class,
            Some(_) => {
                let dict = self.to_dictionary(class);
                if let Some(desc) = self.get_mut(dict).properties.get_mut(&name) {
                    desc.flags = flags;
                }
                dict
            }
            None => class,
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
