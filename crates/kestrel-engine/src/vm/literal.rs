//! Object and array literal buffers
//!
//! The backend serializes constant literal contents into a compact buffer:
//! typed literals with strings held as indices into a per-unit string
//! table. Object literal sites additionally key a cache of the hidden class
//! their properties produce, so every object built at a site after the
//! first skips the transition chain.

use super::class::PropertyFlags;
use super::heap::{ObjectId, ObjectKind};
use super::runtime::Runtime;
use super::value::Value;
use super::{VmError, VmResult};
use crate::compiler::ir::IrConstant;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// One serialized literal
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    /// Index into the string table
    String(u32),
}

/// Literal buffer plus the string table it refers to
#[derive(Debug, Clone, Default)]
pub struct LiteralBuffer {
    pub strings: Vec<Rc<str>>,
    pub keys: Vec<Literal>,
    pub values: Vec<Literal>,
    string_ids: FxHashMap<Rc<str>, u32>,
}

impl LiteralBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn string(&mut self, s: &str) -> Literal {
        if let Some(id) = self.string_ids.get(s) {
            return Literal::String(*id);
        }
        let id = self.strings.len() as u32;
        let s: Rc<str> = Rc::from(s);
        self.strings.push(Rc::clone(&s));
        self.string_ids.insert(s, id);
        Literal::String(id)
    }

    /// Serialize an IR constant; `undefined` and the empty marker have no
    /// literal form
    pub fn literal(&mut self, value: &IrConstant) -> Option<Literal> {
        match value {
            IrConstant::Null => Some(Literal::Null),
            IrConstant::Bool(b) => Some(Literal::Bool(*b)),
            IrConstant::Number(n) => Some(Literal::Number(*n)),
            IrConstant::String(s) => Some(self.string(s)),
            IrConstant::Undefined | IrConstant::Empty => None,
        }
    }

    /// Buffer for an `AllocObjectLiteral` property list
    pub fn from_object_literal(properties: &[(String, IrConstant)]) -> Option<Self> {
        let mut buffer = Self::new();
        for (name, value) in properties {
            let key = buffer.string(name);
            let value = buffer.literal(value)?;
            buffer.keys.push(key);
            buffer.values.push(value);
        }
        Some(buffer)
    }

    /// Buffer for an `AllocArray` element list
    pub fn from_array_literal(elements: &[IrConstant]) -> Option<Self> {
        let mut buffer = Self::new();
        for element in elements {
            let value = buffer.literal(element)?;
            buffer.values.push(value);
        }
        Some(buffer)
    }
}

impl Runtime {
    fn literal_value(&self, strings: &[Rc<str>], literal: &Literal) -> VmResult<Value> {
        Ok(match literal {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Number(n) => Value::Number(*n),
            Literal::String(id) => {
                let s = strings
                    .get(*id as usize)
                    .ok_or_else(|| VmError::range_error(format!("literal string {} out of range", id)))?;
                Value::String(Rc::clone(s))
            }
        })
    }

    /// Build an object literal from its buffer, reusing the site's cached
    /// hidden class when there is one
    pub fn create_object_from_buffer(&mut self, site: u32, buffer: &LiteralBuffer) -> VmResult<ObjectId> {
        if buffer.keys.len() != buffer.values.len() {
            return Err(VmError::type_error("malformed object literal buffer"));
        }

        let cached = if self.options().literal_shape_cache {
            self.literal_classes.get(&site).copied()
        } else {
            None
        };
        let class = match cached {
            Some(class) => class,
            None => {
                let mut class = self.classes.root();
                for key in &buffer.keys {
                    let name = match key {
                        Literal::String(_) => {
                            let text = self.literal_value(&buffer.strings, key)?.to_js_string();
                            self.identifiers.intern(&text)
                        }
                        Literal::Number(n) => self.number_key(*n),
                        Literal::Null | Literal::Bool(_) => {
                            return Err(VmError::type_error("object literal key must be a string or number"));
                        }
                    };
                    if self.classes.lookup(class, name).is_some() {
                        return Err(VmError::type_error("duplicate key in object literal buffer"));
                    }
                    class = self.classes.add_property(class, name, PropertyFlags::plain()).0;
                }
                if self.options().literal_shape_cache && !self.classes.is_dictionary(class) {
                    self.literal_classes.insert(site, class);
                }
                class
            }
        };

        let mut slots = Vec::with_capacity(buffer.values.len());
        for value in &buffer.values {
            slots.push(self.literal_value(&buffer.strings, value)?);
        }
        let object = self.new_object();
        let obj = self.heap.get_mut(object);
        obj.class = class;
        obj.slots = slots;
        Ok(object)
    }

    /// Build an array literal; `min_size` covers trailing elements stored
    /// individually afterwards, which start out as holes
    pub fn create_array_from_buffer(&mut self, buffer: &LiteralBuffer, min_size: usize) -> VmResult<ObjectId> {
        let mut elements = Vec::with_capacity(buffer.values.len().max(min_size));
        for value in &buffer.values {
            elements.push(self.literal_value(&buffer.strings, value)?);
        }
        if elements.len() < min_size {
            elements.resize(min_size, Value::Empty);
        }
        Ok(self.new_array(elements))
    }

    /// Classes cached per literal site
    pub fn literal_site_count(&self) -> usize {
        self.literal_classes.len()
    }

    pub fn is_array(&self, object: ObjectId) -> bool {
        matches!(self.heap.get(object).kind, ObjectKind::Array(_))
    }
}
