//! The runtime: heap, hidden classes, globals and the call/throw protocol
//!
//! Property access lives in `property`, literal construction in `literal`,
//! fast arrays in `array`, `arguments` objects in `arguments` and the
//! builtin prototypes and hooks in `builtins`; all of them extend
//! `Runtime`.

use super::class::{ClassId, ClassTable, PropertyFlags};
use super::heap::{GeneratorState, Heap, JsObject, NativeFn, ObjectId, ObjectKind};
use super::identifier::{predefined, IdentifierTable, SymbolId};
use super::options::RuntimeOptions;
use super::property::PropertyCacheEntry;
use super::value::Value;
use super::{VmError, VmResult};
use crate::compiler::ir::BuiltinMethod;
use rustc_hash::FxHashMap;

/// Inline cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Builtin prototype objects
#[derive(Debug, Clone, Copy)]
pub struct Prototypes {
    pub object: ObjectId,
    pub function: ObjectId,
    pub array: ObjectId,
    pub string: ObjectId,
    pub number: ObjectId,
    pub boolean: ObjectId,
    pub generator: ObjectId,
    pub array_iterator: ObjectId,
    pub error: ObjectId,
    pub type_error: ObjectId,
    pub range_error: ObjectId,
    pub reference_error: ObjectId,
}

impl Prototypes {
    fn uniform(id: ObjectId) -> Self {
        Self {
            object: id,
            function: id,
            array: id,
            string: id,
            number: id,
            boolean: id,
            generator: id,
            array_iterator: id,
            error: id,
            type_error: id,
            range_error: id,
            reference_error: id,
        }
    }
}

pub struct Runtime {
    options: RuntimeOptions,
    pub identifiers: IdentifierTable,
    pub classes: ClassTable,
    pub heap: Heap,
    pub(crate) prototypes: Prototypes,
    global: ObjectId,
    /// Hidden class per object literal site
    pub(crate) literal_classes: FxHashMap<u32, ClassId>,
    /// Template objects per tagged template site
    pub(crate) template_objects: FxHashMap<u32, ObjectId>,
    /// Function objects handed out for builtins
    pub(crate) builtin_closures: FxHashMap<BuiltinMethod, ObjectId>,
    pub(crate) current_generator: Option<ObjectId>,
    handler_depth: usize,
    pub(crate) stats: CacheStats,
}

impl Runtime {
    pub fn new(options: RuntimeOptions) -> Self {
        let classes = ClassTable::new(options.dictionary_threshold);
        let mut heap = Heap::new();
        let object_prototype = heap.alloc(JsObject::new(classes.root(), None, ObjectKind::Ordinary));
        let global = heap.alloc(JsObject::new(classes.root(), Some(object_prototype), ObjectKind::Ordinary));

        let mut runtime = Self {
            options,
            identifiers: IdentifierTable::new(),
            classes,
            heap,
            prototypes: Prototypes::uniform(object_prototype),
            global,
            literal_classes: FxHashMap::default(),
            template_objects: FxHashMap::default(),
            builtin_closures: FxHashMap::default(),
            current_generator: None,
            handler_depth: 0,
            stats: CacheStats::default(),
        };
        runtime.install_builtins();
        runtime
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn prototypes(&self) -> &Prototypes {
        &self.prototypes
    }

    pub fn global(&self) -> ObjectId {
        self.global
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    pub fn intern(&mut self, name: &str) -> SymbolId {
        self.identifiers.intern(name)
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    pub fn alloc_object(&mut self, parent: Option<ObjectId>) -> ObjectId {
        self.alloc_with_kind(parent, ObjectKind::Ordinary)
    }

    pub fn alloc_with_kind(&mut self, parent: Option<ObjectId>, kind: ObjectKind) -> ObjectId {
        let root = self.classes.root();
        self.heap.alloc(JsObject::new(root, parent, kind))
    }

    /// A plain object whose prototype is `Object.prototype`
    pub fn new_object(&mut self) -> ObjectId {
        let parent = self.prototypes.object;
        self.alloc_object(Some(parent))
    }

    /// A regular array holding `elements`
    pub fn new_array(&mut self, elements: Vec<Value>) -> ObjectId {
        let parent = self.prototypes.array;
        self.alloc_with_kind(Some(parent), ObjectKind::Array(elements))
    }

    /// A host function; constructors get a fresh `prototype` object
    pub fn new_function(&mut self, native: NativeFn, constructor: bool) -> ObjectId {
        let parent = self.prototypes.function;
        let function = self.alloc_with_kind(Some(parent), ObjectKind::Function { native, constructor });
        if constructor {
            let prototype = self.new_object();
            self.define_own_property(prototype, predefined::CONSTRUCTOR, Value::Object(function), PropertyFlags::hidden());
            self.define_own_property(function, predefined::PROTOTYPE, Value::Object(prototype), PropertyFlags::hidden());
        }
        function
    }

    /// An accessor property: the slot holds the getter/setter pair
    pub fn define_accessor(&mut self, object: ObjectId, name: SymbolId, getter: Option<ObjectId>, setter: Option<ObjectId>) {
        let pair = self.alloc_with_kind(None, ObjectKind::Accessor { getter, setter });
        self.define_own_property(object, name, Value::Object(pair), PropertyFlags::accessor());
    }

    /// Create or overwrite an own named property with the given attributes
    pub fn define_own_property(&mut self, object: ObjectId, name: SymbolId, value: Value, flags: PropertyFlags) {
        let class = self.heap.get(object).class;
        let slot = match self.classes.lookup(class, name) {
            Some(desc) => {
                let next = self.classes.update_flags(class, name, flags);
                self.heap.get_mut(object).class = next;
                desc.slot
            }
            None => {
                let (next, slot) = self.classes.add_property(class, name, flags);
                self.heap.get_mut(object).class = next;
                slot
            }
        };
        self.heap.write_barrier(object, &value);
        self.heap.get_mut(object).set_slot(slot, value);
    }

    /// Convenience for host code: define by name
    pub fn set_named(&mut self, object: ObjectId, name: &str, value: Value) {
        let name = self.intern(name);
        self.define_own_property(object, name, value, PropertyFlags::plain());
    }

    // ========================================================================
    // Calls
    // ========================================================================

    pub fn is_callable(&self, value: &Value) -> bool {
        value.as_object().is_some_and(|id| self.heap.get(id).is_callable())
    }

    fn is_constructor(&self, value: &Value) -> bool {
        value.as_object().is_some_and(|id| {
            matches!(
                self.heap.get(id).kind,
                ObjectKind::Function { constructor: true, .. }
            )
        })
    }

    /// `typeof`
    pub fn type_of(&self, value: &Value) -> &'static str {
        if self.is_callable(value) {
            "function"
        } else {
            value.primitive_type_name()
        }
    }

    pub fn call(&mut self, callee: &Value, this: &Value, args: &[Value]) -> VmResult<Value> {
        let Some(id) = callee.as_object() else {
            return Err(VmError::type_error(format!("{} is not a function", callee)));
        };
        match self.heap.get(id).kind {
            ObjectKind::Function { native, .. } => native(self, this, args),
            _ => Err(VmError::type_error("object is not a function")),
        }
    }

    /// `new callee(...args)`
    pub fn construct(&mut self, callee: &Value, args: &[Value]) -> VmResult<Value> {
        if !self.is_constructor(callee) {
            return Err(VmError::type_error("constructor is not callable"));
        }
        let mut cache = PropertyCacheEntry::default();
        let prototype = self.get_by_id(callee, predefined::PROTOTYPE, &mut cache)?;
        let this = self.create_this(&prototype, callee)?;
        let result = self.call(callee, &Value::Object(this), args)?;
        Ok(self.get_constructed_object(result, this))
    }

    /// The receiver of a construct call; a non-object prototype falls back
    /// to `Object.prototype`
    pub fn create_this(&mut self, prototype: &Value, callee: &Value) -> VmResult<ObjectId> {
        if !self.is_callable(callee) {
            return Err(VmError::type_error("constructor is not callable"));
        }
        let parent = prototype.as_object().unwrap_or(self.prototypes.object);
        Ok(self.alloc_object(Some(parent)))
    }

    /// A constructor's result replaces `this` only when it is an object
    pub fn get_constructed_object(&self, result: Value, this: ObjectId) -> Value {
        if result.is_object() {
            result
        } else {
            Value::Object(this)
        }
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    /// Allocate an error object with the given prototype and message
    pub fn make_error(&mut self, prototype: ObjectId, message: &str) -> ObjectId {
        let error = self.alloc_object(Some(prototype));
        self.define_own_property(error, predefined::MESSAGE, Value::string(message), PropertyFlags::hidden());
        error
    }

    /// The value a handler observes for an error
    pub fn exception_value(&mut self, error: VmError) -> VmResult<Value> {
        let (prototype, message) = match error {
            VmError::Thrown(value) => return Ok(value),
            VmError::Uncaught(_) => return Err(error),
            VmError::TypeError(msg) => (self.prototypes.type_error, msg),
            VmError::RangeError(msg) => (self.prototypes.range_error, msg),
            VmError::ReferenceError(msg) => (self.prototypes.reference_error, msg),
        };
        Ok(Value::Object(self.make_error(prototype, &message)))
    }

    /// Run `body` with a handler installed; an exception it raises is
    /// handed to `handler` as a value
    pub fn catch<B, H>(&mut self, body: B, handler: H) -> VmResult<Value>
    where
        B: FnOnce(&mut Runtime) -> VmResult<Value>,
        H: FnOnce(&mut Runtime, Value) -> VmResult<Value>,
    {
        self.handler_depth += 1;
        let result = body(self);
        self.handler_depth -= 1;
        match result {
            Ok(value) => Ok(value),
            Err(error) => {
                let thrown = self.exception_value(error)?;
                handler(self, thrown)
            }
        }
    }

    /// Run `body` as top-level code; an exception escaping it aborts
    pub fn execute<B>(&mut self, body: B) -> VmResult<Value>
    where
        B: FnOnce(&mut Runtime) -> VmResult<Value>,
    {
        match body(self) {
            Ok(value) => Ok(value),
            Err(VmError::Uncaught(msg)) => Err(VmError::Uncaught(msg)),
            Err(error) => {
                let description = self.describe_error(&error);
                log::error!("uncaught exception: {}", description);
                Err(VmError::Uncaught(description))
            }
        }
    }

    /// Whether a `catch` is active
    pub fn has_handler(&self) -> bool {
        self.handler_depth > 0
    }

    fn describe_error(&mut self, error: &VmError) -> String {
        match error {
            VmError::Thrown(Value::Object(id)) => {
                let mut cache = PropertyCacheEntry::default();
                let message = self
                    .get_by_id(&Value::Object(*id), predefined::MESSAGE, &mut cache)
                    .unwrap_or(Value::Undefined);
                if message.is_undefined() {
                    "[object Object]".to_string()
                } else {
                    message.to_string()
                }
            }
            VmError::Thrown(value) => value.to_string(),
            other => other.to_string(),
        }
    }

    // ========================================================================
    // Globals
    // ========================================================================

    /// Read a global; a missing binding is a ReferenceError
    pub fn get_global(&mut self, name: &str) -> VmResult<Value> {
        let global = Value::Object(self.global);
        let key = self.intern(name);
        if !self.has_property_key(self.global, key.into())? {
            return Err(VmError::reference_error(format!("'{}' is not defined", name)));
        }
        let mut cache = PropertyCacheEntry::default();
        self.get_by_id(&global, key, &mut cache)
    }

    /// Write a global; strict code may not create one implicitly
    pub fn put_global(&mut self, name: &str, value: Value, strict: bool) -> VmResult<()> {
        let global = Value::Object(self.global);
        let key = self.intern(name);
        if strict && !self.has_property_key(self.global, key.into())? {
            return Err(VmError::reference_error(format!("'{}' is not defined", name)));
        }
        let mut cache = PropertyCacheEntry::default();
        self.put_by_id(&global, key, value, &mut cache, strict)
    }

    /// `var name` at the top level: defines the binding as undefined unless
    /// it already exists
    pub fn declare_global(&mut self, name: &str) {
        let key = self.intern(name);
        let class = self.heap.get(self.global).class;
        if self.classes.lookup(class, key).is_none() {
            self.define_own_property(self.global, key, Value::Undefined, PropertyFlags::plain());
        }
    }

    // ========================================================================
    // Generators
    // ========================================================================

    pub fn new_generator(&mut self) -> ObjectId {
        let parent = self.prototypes.generator;
        self.alloc_with_kind(
            Some(parent),
            ObjectKind::Generator {
                state: GeneratorState::SuspendedStart,
                delegated: false,
            },
        )
    }

    /// Mark `generator` as running; hooks that act on the running generator
    /// see it until `leave_generator`
    pub fn enter_generator(&mut self, generator: ObjectId) -> VmResult<Option<ObjectId>> {
        match &mut self.heap.get_mut(generator).kind {
            ObjectKind::Generator { state, .. } => {
                if *state == GeneratorState::Executing {
                    return Err(VmError::type_error("generator is already running"));
                }
                *state = GeneratorState::Executing;
            }
            _ => return Err(VmError::type_error("not a generator")),
        }
        Ok(self.current_generator.replace(generator))
    }

    /// Suspend (or complete) the running generator and restore the previous one
    pub fn leave_generator(&mut self, completed: bool, previous: Option<ObjectId>) {
        if let Some(current) = self.current_generator {
            if let ObjectKind::Generator { state, delegated } = &mut self.heap.get_mut(current).kind {
                *state = if completed {
                    GeneratorState::Completed
                } else {
                    GeneratorState::SuspendedYield
                };
                if completed {
                    *delegated = false;
                }
            }
        }
        self.current_generator = previous;
    }

    pub fn generator_state(&self, generator: ObjectId) -> Option<(GeneratorState, bool)> {
        match self.heap.get(generator).kind {
            ObjectKind::Generator { state, delegated } => Some((state, delegated)),
            _ => None,
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeOptions::default())
    }
}
