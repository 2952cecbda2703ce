//! Object heap
//!
//! Objects live in an arena addressed by `ObjectId`. Collection is not
//! implemented here; the heap exposes the interface a collector hooks into:
//! allocation, the write barrier taken on every pointer store into an
//! object, and scoped marker regions holding temporary handles.

use super::class::ClassId;
use super::runtime::Runtime;
use super::value::Value;
use super::VmResult;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj{}", self.0)
    }
}

/// Host function: (runtime, this, arguments) -> result
pub type NativeFn = fn(&mut Runtime, &Value, &[Value]) -> VmResult<Value>;

/// A frame's argument vector, shared with a sloppy `arguments` object
pub type ArgumentVector = Rc<RefCell<Vec<Value>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    SuspendedStart,
    SuspendedYield,
    Executing,
    Completed,
}

/// Storage behind an `arguments` object
#[derive(Debug, Clone)]
pub enum ArgumentsStorage {
    /// Strict code: a snapshot taken at creation
    Unmapped(Vec<Value>),
    /// Sloppy code: indices alias the frame's argument vector
    Mapped(ArgumentVector),
}

/// What an object is beyond its named properties
#[derive(Clone)]
pub enum ObjectKind {
    Ordinary,
    /// Regular array; holes are `Value::Empty`
    Array(Vec<Value>),
    /// Array whose indexed accesses are bounds checked and never grow it
    /// implicitly
    FastArray(Vec<Value>),
    Function { native: NativeFn, constructor: bool },
    Arguments(ArgumentsStorage),
    Proxy { target: ObjectId, handler: ObjectId },
    /// Getter/setter pair stored in an accessor property's slot
    Accessor { getter: Option<ObjectId>, setter: Option<ObjectId> },
    Generator { state: GeneratorState, delegated: bool },
}

impl fmt::Debug for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Ordinary => write!(f, "Ordinary"),
            ObjectKind::Array(elements) => write!(f, "Array({})", elements.len()),
            ObjectKind::FastArray(elements) => write!(f, "FastArray({})", elements.len()),
            ObjectKind::Function { constructor, .. } => write!(f, "Function {{ constructor: {} }}", constructor),
            ObjectKind::Arguments(storage) => write!(f, "Arguments({:?})", storage),
            ObjectKind::Proxy { target, handler } => write!(f, "Proxy {{ target: {}, handler: {} }}", target, handler),
            ObjectKind::Accessor { getter, setter } => {
                write!(f, "Accessor {{ getter: {:?}, setter: {:?} }}", getter, setter)
            }
            ObjectKind::Generator { state, delegated } => {
                write!(f, "Generator {{ state: {:?}, delegated: {} }}", state, delegated)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsObject {
    pub class: ClassId,
    /// Prototype
    pub parent: Option<ObjectId>,
    /// Named property values, indexed by the class's slot numbers
    pub slots: Vec<Value>,
    pub kind: ObjectKind,
    pub extensible: bool,
    /// Indexed elements reject writes
    pub frozen_elements: bool,
}

impl JsObject {
    pub fn new(class: ClassId, parent: Option<ObjectId>, kind: ObjectKind) -> Self {
        Self {
            class,
            parent,
            slots: Vec::new(),
            kind,
            extensible: true,
            frozen_elements: false,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function { .. })
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self.kind, ObjectKind::Proxy { .. })
    }

    /// Read a slot; slots past the end read as undefined
    pub fn slot(&self, slot: u32) -> Value {
        self.slots.get(slot as usize).cloned().unwrap_or(Value::Undefined)
    }

    pub fn set_slot(&mut self, slot: u32, value: Value) {
        let index = slot as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, Value::Undefined);
        }
        self.slots[index] = value;
    }
}

/// Marker for a region of temporary handles
///
/// Handles pushed after `open_scope` stay rooted until the matching
/// `close_scope`. Scopes must be closed in LIFO order.
#[derive(Debug)]
#[must_use]
pub struct GcScope {
    marker: usize,
}

#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<JsObject>,
    handles: Vec<Value>,
    barrier_count: u64,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, object: JsObject) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(object);
        id
    }

    pub fn get(&self, id: ObjectId) -> &JsObject {
        &self.objects[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ObjectId) -> &mut JsObject {
        &mut self.objects[id.0 as usize]
    }

    /// Record a store of `value` into `owner`
    pub fn write_barrier(&mut self, owner: ObjectId, value: &Value) {
        debug_assert!((owner.0 as usize) < self.objects.len());
        if value.is_object() {
            self.barrier_count += 1;
        }
    }

    /// Number of pointer stores seen by the write barrier
    pub fn barrier_count(&self) -> u64 {
        self.barrier_count
    }

    pub fn open_scope(&self) -> GcScope {
        GcScope {
            marker: self.handles.len(),
        }
    }

    /// Root a value until the innermost open scope closes
    pub fn push_handle(&mut self, value: Value) {
        if value.is_object() {
            self.handles.push(value);
        }
    }

    pub fn close_scope(&mut self, scope: GcScope) {
        debug_assert!(scope.marker <= self.handles.len(), "GC scopes closed out of order");
        self.handles.truncate(scope.marker);
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
