//! Builtin prototypes and runtime hooks
//!
//! Compiled code reaches the hooks by symbolic name (`BuiltinMethod`);
//! `call_builtin` unpacks the argument registers in the order lowering
//! passes them.

use super::class::PropertyFlags;
use super::heap::{ArgumentsStorage, NativeFn, ObjectId, ObjectKind};
use super::identifier::predefined;
use super::property::{PropertyCacheEntry, PropertyKey};
use super::runtime::{Prototypes, Runtime};
use super::value::Value;
use super::{VmError, VmResult};
use crate::compiler::ir::value::number_to_string;
use crate::compiler::ir::BuiltinMethod;
use std::rc::Rc;

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

/// Function object body for a builtin handed out as a value
fn builtin_trampoline<const INDEX: usize>(rt: &mut Runtime, _this: &Value, args: &[Value]) -> VmResult<Value> {
    rt.call_builtin(BuiltinMethod::ALL[INDEX], args)
}

fn native_for(builtin: BuiltinMethod) -> NativeFn {
    match builtin {
        BuiltinMethod::ArraySpread => builtin_trampoline::<0>,
        BuiltinMethod::Apply => builtin_trampoline::<1>,
        BuiltinMethod::CopyDataProperties => builtin_trampoline::<2>,
        BuiltinMethod::SilentSetPrototypeOf => builtin_trampoline::<3>,
        BuiltinMethod::GetMethod => builtin_trampoline::<4>,
        BuiltinMethod::GeneratorSetDelegated => builtin_trampoline::<5>,
        BuiltinMethod::Concat => builtin_trampoline::<6>,
        BuiltinMethod::GetTemplateObject => builtin_trampoline::<7>,
        BuiltinMethod::Eval => builtin_trampoline::<8>,
        BuiltinMethod::GetIterator => builtin_trampoline::<9>,
    }
}

// ============================================================================
// Prototype methods
// ============================================================================

fn this_string(this: &Value) -> VmResult<Rc<str>> {
    match this {
        Value::String(s) => Ok(Rc::clone(s)),
        _ => Err(VmError::type_error("String.prototype method called on a non-string")),
    }
}

fn string_char_at(_rt: &mut Runtime, this: &Value, args: &[Value]) -> VmResult<Value> {
    let s = this_string(this)?;
    let index = arg(args, 0).to_number();
    let index = if index.is_nan() { 0.0 } else { index.trunc() };
    if index < 0.0 {
        return Ok(Value::string(""));
    }
    let unit = s.encode_utf16().nth(index as usize);
    Ok(Value::String(Rc::from(
        unit.map(|u| String::from_utf16_lossy(&[u])).unwrap_or_default(),
    )))
}

fn string_index_of(_rt: &mut Runtime, this: &Value, args: &[Value]) -> VmResult<Value> {
    let s = this_string(this)?;
    let needle = arg(args, 0).to_js_string();
    let index = match s.find(&*needle) {
        Some(byte) => s[..byte].encode_utf16().count() as f64,
        None => -1.0,
    };
    Ok(Value::Number(index))
}

fn string_to_upper_case(_rt: &mut Runtime, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let s = this_string(this)?;
    Ok(Value::String(Rc::from(s.to_uppercase())))
}

fn number_to_string_method(_rt: &mut Runtime, this: &Value, _args: &[Value]) -> VmResult<Value> {
    match this {
        Value::Number(n) => Ok(Value::String(Rc::from(number_to_string(*n)))),
        _ => Err(VmError::type_error("Number.prototype.toString called on a non-number")),
    }
}

fn boolean_to_string(_rt: &mut Runtime, this: &Value, _args: &[Value]) -> VmResult<Value> {
    match this {
        Value::Bool(b) => Ok(Value::string(if *b { "true" } else { "false" })),
        _ => Err(VmError::type_error("Boolean.prototype.toString called on a non-boolean")),
    }
}

fn object_has_own_property(rt: &mut Runtime, this: &Value, args: &[Value]) -> VmResult<Value> {
    match this {
        Value::Object(id) => Ok(Value::Bool(rt.has_own_property(*id, &arg(args, 0)))),
        Value::Undefined | Value::Null => Err(VmError::type_error("Cannot convert undefined or null to object")),
        _ => Ok(Value::Bool(false)),
    }
}

fn object_to_string(rt: &mut Runtime, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let tag = match this {
        Value::Undefined => "Undefined",
        Value::Null => "Null",
        Value::Object(id) => match rt.heap.get(*id).kind {
            ObjectKind::Array(_) | ObjectKind::FastArray(_) => "Array",
            ObjectKind::Function { .. } => "Function",
            ObjectKind::Arguments(_) => "Arguments",
            _ => "Object",
        },
        Value::String(_) => "String",
        Value::Number(_) => "Number",
        Value::Bool(_) => "Boolean",
        Value::Empty => "Undefined",
    };
    Ok(Value::String(Rc::from(format!("[object {}]", tag))))
}

fn array_push(rt: &mut Runtime, this: &Value, args: &[Value]) -> VmResult<Value> {
    let Some(id) = this.as_object() else {
        return Err(VmError::type_error("Array.prototype.push called on a non-object"));
    };
    if matches!(rt.heap.get(id).kind, ObjectKind::FastArray(_)) {
        for value in args {
            rt.fast_array_push(this, value.clone())?;
        }
        return Ok(Value::Number(rt.fast_array_length(this)?));
    }
    let mut length_cache = PropertyCacheEntry::new();
    let mut length = rt.get_by_id(this, predefined::LENGTH, &mut length_cache)?.to_number();
    if length.is_nan() {
        length = 0.0;
    }
    for value in args {
        rt.put_by_val(this, &Value::Number(length), value.clone(), true)?;
        length += 1.0;
    }
    if !rt.is_array(id) {
        let mut store_cache = PropertyCacheEntry::new();
        rt.put_by_id(this, predefined::LENGTH, Value::Number(length), &mut store_cache, true)?;
    }
    Ok(Value::Number(length))
}

/// `next` of the iterators `getIterator` creates over array-likes
fn array_iterator_next(rt: &mut Runtime, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let Some(iterator) = this.as_object() else {
        return Err(VmError::type_error("Array Iterator next called on a non-object"));
    };
    let mut source_cache = PropertyCacheEntry::new();
    let source = rt.get_by_id(this, predefined::ITERATED_OBJECT, &mut source_cache)?;
    let mut value = Value::Undefined;
    let mut done = true;
    if !source.is_undefined() {
        let mut index_cache = PropertyCacheEntry::new();
        let index = rt.get_by_id(this, predefined::NEXT_INDEX, &mut index_cache)?.to_number();
        let mut length_cache = PropertyCacheEntry::new();
        let length = rt.get_by_id(&source, predefined::LENGTH, &mut length_cache)?.to_number();
        if index < length {
            value = rt.get_by_val(&source, &Value::Number(index))?;
            done = false;
            rt.define_own_property(iterator, predefined::NEXT_INDEX, Value::Number(index + 1.0), PropertyFlags::hidden());
        } else {
            // Exhausted iterators stay exhausted even if the source grows
            rt.define_own_property(iterator, predefined::ITERATED_OBJECT, Value::Undefined, PropertyFlags::hidden());
        }
    }
    let result = rt.new_object();
    rt.define_own_property(result, predefined::VALUE, value, PropertyFlags::plain());
    rt.define_own_property(result, predefined::DONE, Value::Bool(done), PropertyFlags::plain());
    Ok(Value::Object(result))
}

impl Runtime {
    fn method(&mut self, target: ObjectId, name: &str, native: NativeFn) {
        let function = self.new_function(native, false);
        let name = self.intern(name);
        self.define_own_property(target, name, Value::Object(function), PropertyFlags::hidden());
    }

    fn error_prototype(&mut self, parent: ObjectId, name: &str) -> ObjectId {
        let prototype = self.alloc_object(Some(parent));
        self.define_own_property(prototype, predefined::NAME, Value::string(name), PropertyFlags::hidden());
        self.define_own_property(prototype, predefined::MESSAGE, Value::string(""), PropertyFlags::hidden());
        prototype
    }

    /// Create the builtin prototypes and global bindings
    pub(crate) fn install_builtins(&mut self) {
        let object = self.prototypes.object;
        let function = self.alloc_object(Some(object));
        // Functions created from here on inherit from Function.prototype
        self.prototypes.function = function;

        let array = self.alloc_object(Some(object));
        let string = self.alloc_object(Some(object));
        let number = self.alloc_object(Some(object));
        let boolean = self.alloc_object(Some(object));
        let generator = self.alloc_object(Some(object));
        let array_iterator = self.alloc_object(Some(object));
        let error = self.error_prototype(object, "Error");
        let type_error = self.error_prototype(error, "TypeError");
        let range_error = self.error_prototype(error, "RangeError");
        let reference_error = self.error_prototype(error, "ReferenceError");
        self.prototypes = Prototypes {
            object,
            function,
            array,
            string,
            number,
            boolean,
            generator,
            array_iterator,
            error,
            type_error,
            range_error,
            reference_error,
        };

        self.method(object, "hasOwnProperty", object_has_own_property);
        self.method(object, "toString", object_to_string);
        self.method(array, "push", array_push);
        self.method(string, "charAt", string_char_at);
        self.method(string, "indexOf", string_index_of);
        self.method(string, "toUpperCase", string_to_upper_case);
        self.method(number, "toString", number_to_string_method);
        self.method(boolean, "toString", boolean_to_string);
        self.method(array_iterator, "next", array_iterator_next);

        let eval = self.get_builtin_closure(BuiltinMethod::Eval);
        let global = self.global();
        let name = self.intern("eval");
        self.define_own_property(global, name, Value::Object(eval), PropertyFlags::hidden());
    }

    /// A function object for `builtin`, created once per runtime
    pub fn get_builtin_closure(&mut self, builtin: BuiltinMethod) -> ObjectId {
        if let Some(id) = self.builtin_closures.get(&builtin) {
            return *id;
        }
        let id = self.new_function(native_for(builtin), false);
        self.builtin_closures.insert(builtin, id);
        id
    }

    /// Invoke a builtin hook with the argument registers lowering emitted
    pub fn call_builtin(&mut self, builtin: BuiltinMethod, args: &[Value]) -> VmResult<Value> {
        match builtin {
            BuiltinMethod::ArraySpread => {
                let target = arg(args, 0)
                    .as_object()
                    .ok_or_else(|| VmError::type_error("arraySpread target is not an object"))?;
                let next = self.array_spread(target, &arg(args, 1), arg(args, 2).to_number())?;
                Ok(Value::Number(next))
            }
            BuiltinMethod::Apply => {
                let this = args.get(2).cloned();
                self.apply(&arg(args, 0), &arg(args, 1), this)
            }
            BuiltinMethod::CopyDataProperties => {
                let target = arg(args, 0);
                let id = target
                    .as_object()
                    .ok_or_else(|| VmError::type_error("copyDataProperties target is not an object"))?;
                self.copy_data_properties(id, &arg(args, 1))?;
                Ok(target)
            }
            BuiltinMethod::SilentSetPrototypeOf => {
                self.silent_set_prototype_of(&arg(args, 0), &arg(args, 1));
                Ok(Value::Undefined)
            }
            BuiltinMethod::GetMethod => self.get_method(&arg(args, 0), &arg(args, 1)),
            BuiltinMethod::GeneratorSetDelegated => {
                self.generator_set_delegated()?;
                Ok(Value::Undefined)
            }
            BuiltinMethod::Concat => Ok(self.concat(args)),
            BuiltinMethod::GetTemplateObject => self.get_template_object(args).map(Value::Object),
            BuiltinMethod::Eval => self.direct_eval(&arg(args, 0)),
            BuiltinMethod::GetIterator => self.get_iterator(&arg(args, 0)),
        }
    }

    /// The values an iterable produces
    fn iterate(&mut self, iterable: &Value) -> VmResult<Vec<Value>> {
        let id = match iterable {
            Value::String(s) => return Ok(s.chars().map(|c| Value::String(Rc::from(c.to_string()))).collect()),
            Value::Object(id) => *id,
            other => return Err(VmError::type_error(format!("{} is not iterable", other))),
        };
        let holes_as_undefined = |values: &[Value]| -> Vec<Value> {
            values
                .iter()
                .map(|v| if v.is_empty() { Value::Undefined } else { v.clone() })
                .collect()
        };
        match &self.heap.get(id).kind {
            ObjectKind::Array(elements) | ObjectKind::FastArray(elements) => return Ok(holes_as_undefined(elements)),
            ObjectKind::Arguments(ArgumentsStorage::Unmapped(values)) => return Ok(holes_as_undefined(values)),
            ObjectKind::Arguments(ArgumentsStorage::Mapped(vector)) => return Ok(holes_as_undefined(&vector.borrow())),
            _ => {}
        }

        // Iterator protocol over an object with a `next` method
        let mut next_cache = PropertyCacheEntry::new();
        let next = self.get_by_id(iterable, predefined::NEXT, &mut next_cache)?;
        if !self.is_callable(&next) {
            return Err(VmError::type_error("object is not iterable"));
        }
        let mut done_cache = PropertyCacheEntry::new();
        let mut value_cache = PropertyCacheEntry::new();
        let mut values = Vec::new();
        loop {
            let result = self.call(&next, iterable, &[])?;
            if !result.is_object() {
                return Err(VmError::type_error("iterator result is not an object"));
            }
            if self.get_by_id(&result, predefined::DONE, &mut done_cache)?.to_boolean() {
                return Ok(values);
            }
            values.push(self.get_by_id(&result, predefined::VALUE, &mut value_cache)?);
        }
    }

    /// An iterator over `iterable` with the same protocol `iterate` uses.
    /// Array-likes get a fresh array iterator; strings iterate by code
    /// point. Generators and objects with a callable `next` are their own
    /// iterators.
    pub fn get_iterator(&mut self, iterable: &Value) -> VmResult<Value> {
        let source = match iterable {
            Value::String(_) => {
                let chars = self.iterate(iterable)?;
                Value::Object(self.new_array(chars))
            }
            Value::Object(id) => {
                let kind = &self.heap.get(*id).kind;
                if matches!(kind, ObjectKind::Generator { .. }) {
                    return Ok(iterable.clone());
                }
                let array_like = matches!(
                    kind,
                    ObjectKind::Array(_) | ObjectKind::FastArray(_) | ObjectKind::Arguments(_)
                );
                if !array_like {
                    let mut cache = PropertyCacheEntry::new();
                    let next = self.get_by_id(iterable, predefined::NEXT, &mut cache)?;
                    if self.is_callable(&next) {
                        return Ok(iterable.clone());
                    }
                    return Err(VmError::type_error("object is not iterable"));
                }
                iterable.clone()
            }
            other => return Err(VmError::type_error(format!("{} is not iterable", other))),
        };
        let parent = self.prototypes.array_iterator;
        let iterator = self.alloc_object(Some(parent));
        self.define_own_property(iterator, predefined::ITERATED_OBJECT, source, PropertyFlags::hidden());
        self.define_own_property(iterator, predefined::NEXT_INDEX, Value::Number(0.0), PropertyFlags::hidden());
        Ok(Value::Object(iterator))
    }

    /// `[...iterable]` into `target` starting at `next_index`; returns the
    /// index after the last element written
    pub fn array_spread(&mut self, target: ObjectId, iterable: &Value, next_index: f64) -> VmResult<f64> {
        let mut index = next_index;
        for value in self.iterate(iterable)? {
            let key = self.to_property_key(&Value::Number(index));
            self.create_data_property(target, key, value)?;
            index += 1.0;
        }
        Ok(index)
    }

    /// `callee(...args)` with an explicit `this`; without one, `new callee(...args)`
    pub fn apply(&mut self, callee: &Value, args: &Value, this: Option<Value>) -> VmResult<Value> {
        let list = match args {
            Value::Undefined | Value::Null => Vec::new(),
            Value::Object(_) => self.iterate(args)?,
            _ => return Err(VmError::type_error("argument list is not an object")),
        };
        match this {
            Some(this) => self.call(callee, &this, &list),
            None => self.construct(callee, &list),
        }
    }

    /// Copy own enumerable properties of `source` onto `target`
    pub fn copy_data_properties(&mut self, target: ObjectId, source: &Value) -> VmResult<()> {
        let keys = match source {
            Value::Object(id) => self.own_enumerable_keys(*id),
            Value::String(s) => (0..s.encode_utf16().count() as u32).map(PropertyKey::Index).collect(),
            _ => return Ok(()),
        };
        for key in keys {
            let key_value = self.key_value(key);
            let value = self.get_by_val(source, &key_value)?;
            self.create_data_property(target, key, value)?;
        }
        Ok(())
    }

    /// `__proto__: value` in a literal: objects and null replace the
    /// prototype, anything else (or a cycle) is ignored
    pub fn silent_set_prototype_of(&mut self, object: &Value, prototype: &Value) {
        let Some(id) = object.as_object() else {
            return;
        };
        let parent = match prototype {
            Value::Null => None,
            Value::Object(proto) => {
                let mut current = Some(*proto);
                while let Some(p) = current {
                    if p == id {
                        return;
                    }
                    current = self.heap.get(p).parent;
                }
                Some(*proto)
            }
            _ => return,
        };
        self.heap.get_mut(id).parent = parent;
    }

    /// GetMethod: undefined for a nullish property, TypeError if not callable
    pub fn get_method(&mut self, object: &Value, key: &Value) -> VmResult<Value> {
        let method = self.get_by_val(object, key)?;
        if method.is_nullish() {
            return Ok(Value::Undefined);
        }
        if !self.is_callable(&method) {
            return Err(VmError::type_error(format!("'{}' is not a function", key)));
        }
        Ok(method)
    }

    /// Mark the running generator as delegating to an inner iterator
    pub fn generator_set_delegated(&mut self) -> VmResult<()> {
        let Some(generator) = self.current_generator else {
            return Err(VmError::type_error("no generator is running"));
        };
        if let ObjectKind::Generator { delegated, .. } = &mut self.heap.get_mut(generator).kind {
            *delegated = true;
        }
        Ok(())
    }

    pub fn concat(&self, parts: &[Value]) -> Value {
        let mut out = String::new();
        for part in parts {
            out.push_str(&part.to_js_string());
        }
        Value::String(Rc::from(out))
    }

    /// The frozen strings array of a tagged template, created once per site
    ///
    /// `args` is `[site, sameCooked, raw..., cooked...]`; the cooked strings
    /// are omitted when they equal the raw ones.
    pub fn get_template_object(&mut self, args: &[Value]) -> VmResult<ObjectId> {
        let site = arg(args, 0).to_number();
        if !(site >= 0.0 && site.fract() == 0.0 && site <= u32::MAX as f64) {
            return Err(VmError::type_error("template site id is not an integer"));
        }
        let site = site as u32;
        if let Some(id) = self.template_objects.get(&site) {
            return Ok(*id);
        }

        let same_cooked = arg(args, 1).to_boolean();
        let strings = args.get(2..).unwrap_or(&[]);
        let (raw, cooked) = if same_cooked {
            (strings, strings)
        } else {
            if strings.len() % 2 != 0 {
                return Err(VmError::type_error("template raw and cooked strings differ in count"));
            }
            strings.split_at(strings.len() / 2)
        };

        let raw_array = self.new_array(raw.to_vec());
        let cooked_array = self.new_array(cooked.to_vec());
        let raw_flags = PropertyFlags {
            enumerable: false,
            ..PropertyFlags::frozen()
        };
        self.define_own_property(cooked_array, predefined::RAW, Value::Object(raw_array), raw_flags);
        for id in [raw_array, cooked_array] {
            let obj = self.heap.get_mut(id);
            obj.frozen_elements = true;
            obj.extensible = false;
        }
        self.template_objects.insert(site, cooked_array);
        Ok(cooked_array)
    }

    /// Direct eval: non-string arguments are returned unchanged. Source
    /// text needs a parser, which this runtime does not carry.
    pub fn direct_eval(&mut self, source: &Value) -> VmResult<Value> {
        match source {
            Value::String(_) => Err(VmError::type_error("eval of source text is not supported")),
            other => Ok(other.clone()),
        }
    }
}
