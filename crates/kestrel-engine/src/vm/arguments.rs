//! `arguments` objects
//!
//! Strict functions see a snapshot of the arguments taken when the object
//! is created. Sloppy functions get a mapped object whose indices alias the
//! frame's argument vector, so writes through either side are visible to
//! the other.

use super::class::PropertyFlags;
use super::heap::{ArgumentVector, ArgumentsStorage, ObjectId, ObjectKind};
use super::identifier::predefined;
use super::runtime::Runtime;
use super::value::Value;

impl Runtime {
    pub fn create_arguments(&mut self, args: &ArgumentVector, strict: bool) -> ObjectId {
        let storage = if strict {
            ArgumentsStorage::Unmapped(args.borrow().clone())
        } else {
            ArgumentsStorage::Mapped(ArgumentVector::clone(args))
        };
        let length = args.borrow().len();
        let parent = self.prototypes.object;
        let object = self.alloc_with_kind(Some(parent), ObjectKind::Arguments(storage));
        self.define_own_property(object, predefined::LENGTH, Value::Number(length as f64), PropertyFlags::hidden());
        object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::PropertyCacheEntry;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn frame_args(values: &[f64]) -> ArgumentVector {
        Rc::new(RefCell::new(values.iter().map(|v| Value::Number(*v)).collect()))
    }

    #[test]
    fn test_strict_arguments_are_a_snapshot() {
        let mut rt = Runtime::default();
        let args = frame_args(&[1.0, 2.0]);
        let object = Value::Object(rt.create_arguments(&args, true));
        args.borrow_mut()[0] = Value::Number(10.0);
        assert_eq!(rt.get_by_val(&object, &Value::Number(0.0)).unwrap(), Value::Number(1.0));
        rt.put_by_val(&object, &Value::Number(1.0), Value::Null, true).unwrap();
        assert_eq!(args.borrow()[1], Value::Number(2.0));
    }

    #[test]
    fn test_sloppy_arguments_alias_the_frame() {
        let mut rt = Runtime::default();
        let args = frame_args(&[1.0, 2.0]);
        let object = Value::Object(rt.create_arguments(&args, false));
        args.borrow_mut()[0] = Value::Number(10.0);
        assert_eq!(rt.get_by_val(&object, &Value::Number(0.0)).unwrap(), Value::Number(10.0));
        rt.put_by_val(&object, &Value::Number(1.0), Value::string("b"), false).unwrap();
        assert_eq!(args.borrow()[1], Value::string("b"));
    }

    #[test]
    fn test_length_and_out_of_range_indices() {
        let mut rt = Runtime::default();
        let args = frame_args(&[1.0]);
        let object = Value::Object(rt.create_arguments(&args, false));
        let mut cache = PropertyCacheEntry::new();
        assert_eq!(rt.get_by_id(&object, predefined::LENGTH, &mut cache).unwrap(), Value::Number(1.0));
        assert_eq!(rt.get_by_val(&object, &Value::Number(3.0)).unwrap(), Value::Undefined);
        // Indices past the frame become ordinary properties
        rt.put_by_val(&object, &Value::Number(3.0), Value::Bool(true), false).unwrap();
        assert_eq!(rt.get_by_val(&object, &Value::Number(3.0)).unwrap(), Value::Bool(true));
        assert_eq!(args.borrow().len(), 1);
    }

    #[test]
    fn test_delete_unmaps() {
        let mut rt = Runtime::default();
        let args = frame_args(&[1.0, 2.0]);
        let object = Value::Object(rt.create_arguments(&args, false));
        assert!(rt.delete_by_val(&object, &Value::Number(0.0), false).unwrap());
        assert_eq!(rt.get_by_val(&object, &Value::Number(0.0)).unwrap(), Value::Undefined);
        args.borrow_mut()[1] = Value::Null;
        assert_eq!(rt.get_by_val(&object, &Value::Number(1.0)).unwrap(), Value::Number(2.0));
    }
}
