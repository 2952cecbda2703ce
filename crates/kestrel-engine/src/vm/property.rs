//! Property access
//!
//! Every named access site owns a `PropertyCacheEntry`. A read or write
//! first compares the object's hidden class with the cached class and, on a
//! match, goes straight to the cached slot. On a miss the own property is
//! looked up in the class; a plain data property refreshes the entry unless
//! the class is a dictionary. Reads also try the prototype entry: when the
//! property is definitely not own and the parent's class matches the cached
//! class, the parent's slot is read directly. Everything else takes the
//! slow path, which handles accessors, proxies, exotic objects and the
//! prototype walk.
//!
//! Primitive bases never allocate a wrapper: reads consult the builtin
//! prototype for the primitive's type, writes look for a setter there and
//! are otherwise dropped (TypeError in strict code).

use super::class::{ClassId, PropertyDescriptor, PropertyFlags};
use super::heap::{ArgumentsStorage, ObjectId, ObjectKind};
use super::identifier::{predefined, SymbolId};
use super::runtime::Runtime;
use super::value::Value;
use super::{VmError, VmResult};
use crate::compiler::ir::value::number_to_string;
use std::rc::Rc;

/// Single-entry inline cache for one access site.
///
/// An entry belongs to one site and therefore one property name. Only
/// entries filled by a write may serve a cached write: a read can cache a
/// read-only data property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropertyCacheEntry {
    pub class: Option<ClassId>,
    pub slot: u32,
    pub writable: bool,
}

impl PropertyCacheEntry {
    pub fn new() -> Self {
        Self::default()
    }

    fn remember(&mut self, class: ClassId, slot: u32) {
        self.class = Some(class);
        self.slot = slot;
        self.writable = false;
    }

    fn remember_writable(&mut self, class: ClassId, slot: u32) {
        self.remember(class, slot);
        self.writable = true;
    }
}

/// A property key after ToPropertyKey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Index(u32),
    Named(SymbolId),
}

impl From<SymbolId> for PropertyKey {
    fn from(name: SymbolId) -> Self {
        PropertyKey::Named(name)
    }
}

/// Canonical array index: decimal digits without leading zeros, below 2^32 - 1
pub fn array_index(s: &str) -> Option<u32> {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u32>().ok().filter(|i| *i != u32::MAX)
}

/// An own property as seen by the slow path
#[derive(Debug, Clone)]
enum Own {
    Data {
        value: Value,
        writable: bool,
        configurable: bool,
        /// Class slot, when the property lives in one
        slot: Option<u32>,
    },
    Accessor {
        getter: Option<ObjectId>,
        setter: Option<ObjectId>,
        configurable: bool,
    },
}

impl Own {
    fn configurable(&self) -> bool {
        match self {
            Own::Data { configurable, .. } | Own::Accessor { configurable, .. } => *configurable,
        }
    }
}

impl Runtime {
    // ========================================================================
    // Keys
    // ========================================================================

    /// ToPropertyKey
    pub fn to_property_key(&mut self, key: &Value) -> PropertyKey {
        match key {
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n < u32::MAX as f64 => {
                PropertyKey::Index(*n as u32)
            }
            Value::String(s) => match array_index(s) {
                Some(index) => PropertyKey::Index(index),
                None => PropertyKey::Named(self.identifiers.intern(s)),
            },
            other => {
                let text = other.to_js_string();
                PropertyKey::Named(self.identifiers.intern(&text))
            }
        }
    }

    /// A named key spelled like an array index becomes an index key
    fn canonical_key(&self, name: SymbolId) -> PropertyKey {
        match array_index(self.identifiers.name(name)) {
            Some(index) => PropertyKey::Index(index),
            None => PropertyKey::Named(name),
        }
    }

    fn key_text(&self, key: PropertyKey) -> Rc<str> {
        match key {
            PropertyKey::Index(i) => Rc::from(i.to_string()),
            PropertyKey::Named(name) => Rc::clone(self.identifiers.name(name)),
        }
    }

    pub(crate) fn key_value(&self, key: PropertyKey) -> Value {
        match key {
            PropertyKey::Index(i) => Value::Number(i as f64),
            PropertyKey::Named(name) => Value::String(Rc::clone(self.identifiers.name(name))),
        }
    }

    /// The named form of an index key, for objects without element storage
    fn named_form(&self, index: u32) -> Option<SymbolId> {
        self.identifiers.get(&index.to_string())
    }

    // ========================================================================
    // Own property lookup
    // ========================================================================

    /// Own-property lookup through the class alone. `None` means the class
    /// cannot answer (proxies, virtual properties, element storage).
    fn fast_own_lookup(&self, object: ObjectId, name: SymbolId) -> Option<Option<PropertyDescriptor>> {
        let obj = self.heap.get(object);
        let found = self.classes.lookup(obj.class, name);
        match &obj.kind {
            ObjectKind::Proxy { .. } => None,
            ObjectKind::Array(_) | ObjectKind::FastArray(_) if name == predefined::LENGTH => None,
            ObjectKind::Array(_) | ObjectKind::FastArray(_) | ObjectKind::Arguments(_) if found.is_none() => None,
            _ => Some(found),
        }
    }

    fn get_own(&self, object: ObjectId, key: PropertyKey) -> Option<Own> {
        let obj = self.heap.get(object);
        let writable = !obj.frozen_elements;
        let name = match key {
            PropertyKey::Index(i) => {
                let i = i as usize;
                match &obj.kind {
                    ObjectKind::Array(elements) => {
                        return elements.get(i).filter(|v| !v.is_empty()).map(|v| Own::Data {
                            value: v.clone(),
                            writable,
                            configurable: writable,
                            slot: None,
                        });
                    }
                    ObjectKind::FastArray(elements) => {
                        return elements.get(i).map(|v| Own::Data {
                            value: v.clone(),
                            writable: true,
                            configurable: false,
                            slot: None,
                        });
                    }
                    ObjectKind::Arguments(storage) => {
                        let value = match storage {
                            ArgumentsStorage::Unmapped(values) => values.get(i).cloned(),
                            ArgumentsStorage::Mapped(vector) => vector.borrow().get(i).cloned(),
                        };
                        if let Some(value) = value.filter(|v| !v.is_empty()) {
                            return Some(Own::Data {
                                value,
                                writable: true,
                                configurable: true,
                                slot: None,
                            });
                        }
                    }
                    _ => {}
                }
                self.named_form(i as u32)?
            }
            PropertyKey::Named(predefined::LENGTH)
                if matches!(obj.kind, ObjectKind::Array(_) | ObjectKind::FastArray(_)) =>
            {
                let (ObjectKind::Array(elements) | ObjectKind::FastArray(elements)) = &obj.kind else {
                    return None;
                };
                // Fast arrays only change length through push and append
                return Some(Own::Data {
                    value: Value::Number(elements.len() as f64),
                    writable: writable && matches!(obj.kind, ObjectKind::Array(_)),
                    configurable: false,
                    slot: None,
                });
            }
            PropertyKey::Named(name) => name,
        };

        let desc = self.classes.lookup(obj.class, name)?;
        let value = obj.slot(desc.slot);
        if desc.flags.accessor {
            let (getter, setter) = match value.as_object().map(|id| &self.heap.get(id).kind) {
                Some(ObjectKind::Accessor { getter, setter }) => (*getter, *setter),
                _ => (None, None),
            };
            return Some(Own::Accessor {
                getter,
                setter,
                configurable: desc.flags.configurable,
            });
        }
        Some(Own::Data {
            value,
            writable: desc.flags.writable && !desc.flags.internal_setter,
            configurable: desc.flags.configurable,
            slot: Some(desc.slot),
        })
    }

    /// Own enumerable keys in order: indices first, then named properties
    pub fn own_enumerable_keys(&self, object: ObjectId) -> Vec<PropertyKey> {
        let obj = self.heap.get(object);
        let mut keys: Vec<PropertyKey> = match &obj.kind {
            ObjectKind::Array(elements) | ObjectKind::FastArray(elements) => elements
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_empty())
                .map(|(i, _)| PropertyKey::Index(i as u32))
                .collect(),
            ObjectKind::Arguments(ArgumentsStorage::Unmapped(values)) => {
                (0..values.len() as u32).map(PropertyKey::Index).collect()
            }
            ObjectKind::Arguments(ArgumentsStorage::Mapped(vector)) => {
                (0..vector.borrow().len() as u32).map(PropertyKey::Index).collect()
            }
            _ => Vec::new(),
        };
        keys.extend(
            self.classes
                .properties(obj.class)
                .into_iter()
                .filter(|(_, desc)| desc.flags.enumerable)
                .map(|(name, _)| self.canonical_key(name)),
        );
        keys
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Named read through an inline cache
    pub fn get_by_id(&mut self, base: &Value, name: SymbolId, cache: &mut PropertyCacheEntry) -> VmResult<Value> {
        let Value::Object(id) = base else {
            let key = self.canonical_key(name);
            return self.get_transient(base, key);
        };
        let obj = self.heap.get(*id);
        if cache.class == Some(obj.class) {
            self.stats.hits += 1;
            return Ok(obj.slot(cache.slot));
        }

        match self.fast_own_lookup(*id, name) {
            Some(Some(desc)) if !desc.flags.accessor => {
                self.stats.misses += 1;
                let obj = self.heap.get(*id);
                if !self.classes.is_dictionary(obj.class) {
                    cache.remember(obj.class, desc.slot);
                }
                return Ok(obj.slot(desc.slot));
            }
            Some(None) => {
                if let Some(parent) = obj.parent {
                    let parent = self.heap.get(parent);
                    if cache.class == Some(parent.class) {
                        self.stats.hits += 1;
                        return Ok(parent.slot(cache.slot));
                    }
                }
            }
            _ => {}
        }

        self.stats.misses += 1;
        log::trace!("get_by_id miss: {} on {}", self.identifiers.name(name), id);
        let key = self.canonical_key(name);
        self.get_property(*id, key, base, Some(cache))
    }

    /// Computed read. Numeric and index keys on a fast array are bounds
    /// checked like `fast_array_load`.
    pub fn get_by_val(&mut self, base: &Value, key: &Value) -> VmResult<Value> {
        if let (Value::Object(id), Value::Number(n)) = (base, key) {
            match &self.heap.get(*id).kind {
                ObjectKind::FastArray(_) => return self.fast_array_load(base, key),
                ObjectKind::Array(elements) if *n >= 0.0 && n.fract() == 0.0 => {
                    if let Some(value) = elements.get(*n as usize).filter(|v| !v.is_empty()) {
                        return Ok(value.clone());
                    }
                }
                _ => {}
            }
        }
        let key = self.to_property_key(key);
        if let (Value::Object(id), PropertyKey::Index(i)) = (base, key) {
            if matches!(self.heap.get(*id).kind, ObjectKind::FastArray(_)) {
                return self.fast_array_load(base, &Value::Number(i as f64));
            }
        }
        match base {
            Value::Object(id) => self.get_property(*id, key, base, None),
            _ => self.get_transient(base, key),
        }
    }

    /// Full [[Get]]: prototype walk, accessors and proxies
    fn get_property(
        &mut self,
        object: ObjectId,
        key: PropertyKey,
        receiver: &Value,
        cache: Option<&mut PropertyCacheEntry>,
    ) -> VmResult<Value> {
        let mut current = Some(object);
        let mut depth = 0;
        while let Some(id) = current {
            if let ObjectKind::Proxy { target, handler } = self.heap.get(id).kind {
                return self.proxy_get(target, handler, key, receiver);
            }
            match self.get_own(id, key) {
                Some(Own::Data { value, slot, .. }) => {
                    if let (Some(cache), Some(slot), 1, PropertyKey::Named(_)) = (cache, slot, depth, key) {
                        let class = self.heap.get(id).class;
                        if !self.classes.is_dictionary(class) {
                            cache.remember(class, slot);
                        }
                    }
                    return Ok(value);
                }
                Some(Own::Accessor { getter, .. }) => {
                    return match getter {
                        Some(getter) => self.call(&Value::Object(getter), receiver, &[]),
                        None => Ok(Value::Undefined),
                    };
                }
                None => {
                    current = self.heap.get(id).parent;
                    depth += 1;
                }
            }
        }
        Ok(Value::Undefined)
    }

    fn proxy_get(&mut self, target: ObjectId, handler: ObjectId, key: PropertyKey, receiver: &Value) -> VmResult<Value> {
        let trap_name = self.identifiers.intern("get");
        let trap = self.get_property(handler, PropertyKey::Named(trap_name), &Value::Object(handler), None)?;
        if trap.is_nullish() {
            return self.get_property(target, key, receiver, None);
        }
        let key = self.key_value(key);
        self.call(&trap, &Value::Object(handler), &[Value::Object(target), key, receiver.clone()])
    }

    /// Read from a primitive without boxing it
    fn get_transient(&mut self, base: &Value, key: PropertyKey) -> VmResult<Value> {
        let prototype = match base {
            Value::Undefined | Value::Null | Value::Empty => {
                return Err(VmError::type_error(format!(
                    "Cannot read property '{}' of {}",
                    self.key_text(key),
                    base
                )));
            }
            Value::String(s) => {
                match key {
                    PropertyKey::Named(predefined::LENGTH) => {
                        return Ok(Value::Number(s.encode_utf16().count() as f64));
                    }
                    PropertyKey::Index(i) => {
                        if let Some(unit) = s.encode_utf16().nth(i as usize) {
                            return Ok(Value::String(Rc::from(String::from_utf16_lossy(&[unit]))));
                        }
                    }
                    _ => {}
                }
                self.prototypes.string
            }
            Value::Number(_) => self.prototypes.number,
            Value::Bool(_) => self.prototypes.boolean,
            Value::Object(id) => return self.get_property(*id, key, base, None),
        };
        self.get_property(prototype, key, base, None)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Named write through an inline cache
    pub fn put_by_id(
        &mut self,
        base: &Value,
        name: SymbolId,
        value: Value,
        cache: &mut PropertyCacheEntry,
        strict: bool,
    ) -> VmResult<()> {
        let Value::Object(id) = base else {
            let key = self.canonical_key(name);
            return self.put_transient(base, key, value, strict);
        };
        let class = self.heap.get(*id).class;
        if cache.writable && cache.class == Some(class) {
            self.stats.hits += 1;
            self.heap.write_barrier(*id, &value);
            self.heap.get_mut(*id).set_slot(cache.slot, value);
            return Ok(());
        }

        self.stats.misses += 1;
        if let Some(Some(desc)) = self.fast_own_lookup(*id, name) {
            if desc.flags.is_plain_writable() {
                if !self.classes.is_dictionary(class) {
                    cache.remember_writable(class, desc.slot);
                }
                self.heap.write_barrier(*id, &value);
                self.heap.get_mut(*id).set_slot(desc.slot, value);
                return Ok(());
            }
        }

        log::trace!("put_by_id miss: {} on {}", self.identifiers.name(name), id);
        let key = self.canonical_key(name);
        self.put_property(*id, key, value, base, strict)
    }

    /// Computed write
    pub fn put_by_val(&mut self, base: &Value, key: &Value, value: Value, strict: bool) -> VmResult<()> {
        if let (Value::Object(id), Value::Number(_)) = (base, key) {
            if matches!(self.heap.get(*id).kind, ObjectKind::FastArray(_)) {
                return self.fast_array_store(base, key, value);
            }
        }
        let key = self.to_property_key(key);
        match base {
            Value::Object(id) => self.put_property(*id, key, value, base, strict),
            _ => self.put_transient(base, key, value, strict),
        }
    }

    /// Full [[Set]]
    fn put_property(
        &mut self,
        object: ObjectId,
        key: PropertyKey,
        value: Value,
        receiver: &Value,
        strict: bool,
    ) -> VmResult<()> {
        let mut current = Some(object);
        while let Some(id) = current {
            if let ObjectKind::Proxy { target, handler } = self.heap.get(id).kind {
                return self.proxy_set(target, handler, key, value, receiver, strict);
            }
            match self.get_own(id, key) {
                Some(Own::Accessor { setter: Some(setter), .. }) => {
                    self.call(&Value::Object(setter), receiver, &[value])?;
                    return Ok(());
                }
                Some(Own::Accessor { setter: None, .. }) => {
                    let msg = format!("Cannot set property '{}' which has only a getter", self.key_text(key));
                    return self.reject_write(strict, msg);
                }
                Some(Own::Data { writable: false, .. }) => {
                    let msg = format!("Cannot assign to read-only property '{}'", self.key_text(key));
                    return self.reject_write(strict, msg);
                }
                Some(Own::Data { slot, .. }) if id == object => {
                    return self.write_own(object, key, slot, value);
                }
                // Inherited writable data: shadow it on the receiver
                Some(Own::Data { .. }) => break,
                None => current = self.heap.get(id).parent,
            }
        }
        self.add_own(object, key, value, strict)
    }

    fn proxy_set(
        &mut self,
        target: ObjectId,
        handler: ObjectId,
        key: PropertyKey,
        value: Value,
        receiver: &Value,
        strict: bool,
    ) -> VmResult<()> {
        let trap_name = self.identifiers.intern("set");
        let trap = self.get_property(handler, PropertyKey::Named(trap_name), &Value::Object(handler), None)?;
        if trap.is_nullish() {
            return self.put_property(target, key, value, &Value::Object(target), strict);
        }
        let key_value = self.key_value(key);
        let ok = self.call(
            &trap,
            &Value::Object(handler),
            &[Value::Object(target), key_value, value, receiver.clone()],
        )?;
        if !ok.to_boolean() {
            let msg = format!("proxy set handler returned false for property '{}'", self.key_text(key));
            return self.reject_write(strict, msg);
        }
        Ok(())
    }

    fn reject_write(&self, strict: bool, msg: String) -> VmResult<()> {
        if strict {
            Err(VmError::TypeError(msg))
        } else {
            Ok(())
        }
    }

    /// Overwrite an existing writable own property
    fn write_own(&mut self, object: ObjectId, key: PropertyKey, slot: Option<u32>, value: Value) -> VmResult<()> {
        self.heap.write_barrier(object, &value);
        if let Some(slot) = slot {
            self.heap.get_mut(object).set_slot(slot, value);
            return Ok(());
        }
        match key {
            PropertyKey::Named(predefined::LENGTH) => self.set_array_length(object, &value),
            PropertyKey::Index(i) => {
                let i = i as usize;
                match &mut self.heap.get_mut(object).kind {
                    ObjectKind::Array(elements) | ObjectKind::FastArray(elements) => elements[i] = value,
                    ObjectKind::Arguments(ArgumentsStorage::Unmapped(values)) => values[i] = value,
                    ObjectKind::Arguments(ArgumentsStorage::Mapped(vector)) => vector.borrow_mut()[i] = value,
                    _ => {}
                }
                Ok(())
            }
            PropertyKey::Named(_) => Ok(()),
        }
    }

    fn set_array_length(&mut self, object: ObjectId, value: &Value) -> VmResult<()> {
        let n = value.to_number();
        if !(n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64) {
            return Err(VmError::range_error("Invalid array length"));
        }
        if matches!(self.heap.get(object).kind, ObjectKind::Array(_)) {
            let len = self.checked_dense_length(n)?;
            if let ObjectKind::Array(elements) = &mut self.heap.get_mut(object).kind {
                elements.resize(len, Value::Empty);
            }
        }
        Ok(())
    }

    /// Element storage size for an array of length `n`
    fn checked_dense_length(&self, n: f64) -> VmResult<usize> {
        if n > self.options().array_dense_limit as f64 {
            return Err(VmError::range_error("array length exceeds dense storage limit"));
        }
        Ok(n as usize)
    }

    /// Store an element into a regular array, growing it with holes
    fn store_array_element(&mut self, object: ObjectId, index: u32, value: Value) -> VmResult<()> {
        let i = self.checked_dense_length(index as f64 + 1.0)? - 1;
        self.heap.write_barrier(object, &value);
        if let ObjectKind::Array(elements) = &mut self.heap.get_mut(object).kind {
            if i >= elements.len() {
                elements.resize(i + 1, Value::Empty);
            }
            elements[i] = value;
        }
        Ok(())
    }

    /// Create a new own property on `object`
    fn add_own(&mut self, object: ObjectId, key: PropertyKey, value: Value, strict: bool) -> VmResult<()> {
        if !self.heap.get(object).extensible {
            let msg = format!("Cannot add property '{}', object is not extensible", self.key_text(key));
            return self.reject_write(strict, msg);
        }
        let name = match key {
            PropertyKey::Index(i) => match self.heap.get(object).kind {
                ObjectKind::FastArray(_) => {
                    return Err(VmError::range_error("array store index out of range"));
                }
                ObjectKind::Array(_) => return self.store_array_element(object, i, value),
                _ => self.identifiers.intern(&i.to_string()),
            },
            PropertyKey::Named(name) => name,
        };
        self.define_own_property(object, name, value, PropertyFlags::plain());
        Ok(())
    }

    /// Write to a primitive: a setter on the builtin prototype runs with the
    /// primitive as `this`; anything else is dropped
    fn put_transient(&mut self, base: &Value, key: PropertyKey, value: Value, strict: bool) -> VmResult<()> {
        let prototype = match base {
            Value::Undefined | Value::Null | Value::Empty => {
                return Err(VmError::type_error(format!(
                    "Cannot set property '{}' of {}",
                    self.key_text(key),
                    base
                )));
            }
            Value::String(_) => self.prototypes.string,
            Value::Number(_) => self.prototypes.number,
            Value::Bool(_) => self.prototypes.boolean,
            Value::Object(id) => return self.put_property(*id, key, value, base, strict),
        };

        let mut current = Some(prototype);
        while let Some(id) = current {
            match self.get_own(id, key) {
                Some(Own::Accessor { setter: Some(setter), .. }) => {
                    self.call(&Value::Object(setter), base, &[value])?;
                    return Ok(());
                }
                Some(_) => break,
                None => current = self.heap.get(id).parent,
            }
        }
        let msg = format!(
            "Cannot create property '{}' on {} '{}'",
            self.key_text(key),
            base.primitive_type_name(),
            base
        );
        self.reject_write(strict, msg)
    }

    // ========================================================================
    // Delete and `in`
    // ========================================================================

    /// `delete base.name`
    pub fn delete_by_id(&mut self, base: &Value, name: SymbolId, strict: bool) -> VmResult<bool> {
        let key = self.canonical_key(name);
        self.delete_property(base, key, strict)
    }

    /// `delete base[key]`
    pub fn delete_by_val(&mut self, base: &Value, key: &Value, strict: bool) -> VmResult<bool> {
        let key = self.to_property_key(key);
        self.delete_property(base, key, strict)
    }

    fn delete_property(&mut self, base: &Value, key: PropertyKey, strict: bool) -> VmResult<bool> {
        let object = match base {
            Value::Object(id) => *id,
            Value::Undefined | Value::Null | Value::Empty => {
                return Err(VmError::type_error(format!(
                    "Cannot delete property '{}' of {}",
                    self.key_text(key),
                    base
                )));
            }
            Value::String(s) => {
                let own = match key {
                    PropertyKey::Named(predefined::LENGTH) => true,
                    PropertyKey::Index(i) => (i as usize) < s.encode_utf16().count(),
                    PropertyKey::Named(_) => false,
                };
                return self.reject_delete(own, strict, key);
            }
            _ => return Ok(true),
        };

        if let ObjectKind::Proxy { target, handler } = self.heap.get(object).kind {
            let trap_name = self.identifiers.intern("deleteProperty");
            let trap = self.get_property(handler, PropertyKey::Named(trap_name), &Value::Object(handler), None)?;
            if trap.is_nullish() {
                return self.delete_property(&Value::Object(target), key, strict);
            }
            let key_value = self.key_value(key);
            let result = self.call(&trap, &Value::Object(handler), &[Value::Object(target), key_value])?;
            return Ok(result.to_boolean());
        }

        let Some(own) = self.get_own(object, key) else {
            return Ok(true);
        };
        if !own.configurable() {
            return self.reject_delete(true, strict, key);
        }

        let obj = self.heap.get_mut(object);
        match (key, &mut obj.kind) {
            (PropertyKey::Index(i), ObjectKind::Array(elements)) => {
                elements[i as usize] = Value::Empty;
                return Ok(true);
            }
            (PropertyKey::Index(i), ObjectKind::Arguments(storage)) if matches!(own, Own::Data { slot: None, .. }) => {
                // Deleting an element unmaps the object from the frame
                let mut values = match &mut *storage {
                    ArgumentsStorage::Unmapped(values) => std::mem::take(values),
                    ArgumentsStorage::Mapped(vector) => vector.borrow().clone(),
                };
                values[i as usize] = Value::Empty;
                *storage = ArgumentsStorage::Unmapped(values);
                return Ok(true);
            }
            _ => {}
        }

        let name = match key {
            PropertyKey::Named(name) => Some(name),
            PropertyKey::Index(i) => self.named_form(i),
        };
        if let Some(name) = name {
            let class = self.heap.get(object).class;
            let (next, slot) = self.classes.delete_property(class, name);
            let obj = self.heap.get_mut(object);
            obj.class = next;
            if let Some(slot) = slot {
                obj.set_slot(slot, Value::Undefined);
            }
        }
        Ok(true)
    }

    /// A non-configurable own property: strict code throws, sloppy code
    /// gets `false`
    fn reject_delete(&self, own: bool, strict: bool, key: PropertyKey) -> VmResult<bool> {
        if !own {
            return Ok(true);
        }
        if strict {
            return Err(VmError::type_error(format!("Cannot delete property '{}'", self.key_text(key))));
        }
        Ok(false)
    }

    /// `key in object`
    pub fn has_property(&mut self, key: &Value, object: &Value) -> VmResult<bool> {
        let Value::Object(id) = object else {
            return Err(VmError::type_error("right operand of 'in' is not an object"));
        };
        let key = self.to_property_key(key);
        self.has_property_key(*id, key)
    }

    pub(crate) fn has_property_key(&mut self, object: ObjectId, key: PropertyKey) -> VmResult<bool> {
        let mut current = Some(object);
        while let Some(id) = current {
            if let ObjectKind::Proxy { target, handler } = self.heap.get(id).kind {
                let trap_name = self.identifiers.intern("has");
                let trap = self.get_property(handler, PropertyKey::Named(trap_name), &Value::Object(handler), None)?;
                if trap.is_nullish() {
                    return self.has_property_key(target, key);
                }
                let key_value = self.key_value(key);
                let result = self.call(&trap, &Value::Object(handler), &[Value::Object(target), key_value])?;
                return Ok(result.to_boolean());
            }
            if self.get_own(id, key).is_some() {
                return Ok(true);
            }
            current = self.heap.get(id).parent;
        }
        Ok(false)
    }

    /// Own data property value, ignoring accessors and prototypes
    pub fn get_own_value(&self, object: ObjectId, key: PropertyKey) -> Option<Value> {
        match self.get_own(object, key)? {
            Own::Data { value, .. } => Some(value),
            Own::Accessor { .. } => None,
        }
    }

    pub fn has_own_property(&mut self, object: ObjectId, key: &Value) -> bool {
        let key = self.to_property_key(key);
        self.get_own(object, key).is_some()
    }

    /// CreateDataProperty: define an own enumerable data property without
    /// consulting setters or prototypes
    pub(crate) fn create_data_property(&mut self, object: ObjectId, key: PropertyKey, value: Value) -> VmResult<()> {
        let name = match key {
            PropertyKey::Index(i) if matches!(self.heap.get(object).kind, ObjectKind::Array(_)) => {
                return self.store_array_element(object, i, value);
            }
            PropertyKey::Index(i) => self.identifiers.intern(&i.to_string()),
            PropertyKey::Named(name) => name,
        };
        self.define_own_property(object, name, value, PropertyFlags::plain());
        Ok(())
    }

    /// Text form of a number key, interned
    pub fn number_key(&mut self, n: f64) -> SymbolId {
        self.identifiers.intern(&number_to_string(n))
    }
}
