//! Fast arrays
//!
//! Arrays in typed code. Every indexed load and store is bounds checked;
//! only `push` and `append` grow the storage, and never past
//! `fast_array_max_length`.

use super::heap::{ObjectId, ObjectKind};
use super::runtime::Runtime;
use super::value::Value;
use super::{VmError, VmResult};

/// An integral index below `len`
fn checked_index(index: &Value, len: usize) -> Option<usize> {
    let n = index.as_number()?;
    if n >= 0.0 && n.fract() == 0.0 && n < len as f64 {
        Some(n as usize)
    } else {
        None
    }
}

impl Runtime {
    pub fn create_fast_array(&mut self, capacity: usize) -> VmResult<ObjectId> {
        if capacity > self.options().fast_array_max_length {
            return Err(VmError::range_error("fast array capacity exceeds maximum length"));
        }
        let parent = self.prototypes.array;
        Ok(self.alloc_with_kind(Some(parent), ObjectKind::FastArray(Vec::with_capacity(capacity))))
    }

    fn fast_array_id(&self, array: &Value) -> VmResult<ObjectId> {
        match array.as_object() {
            Some(id) if matches!(self.heap.get(id).kind, ObjectKind::FastArray(_)) => Ok(id),
            _ => Err(VmError::type_error("operand is not a fast array")),
        }
    }

    fn fast_elements(&self, array: &Value) -> VmResult<&Vec<Value>> {
        let id = self.fast_array_id(array)?;
        match &self.heap.get(id).kind {
            ObjectKind::FastArray(elements) => Ok(elements),
            _ => Err(VmError::type_error("operand is not a fast array")),
        }
    }

    fn fast_elements_mut(&mut self, array: &Value) -> VmResult<&mut Vec<Value>> {
        let id = self.fast_array_id(array)?;
        match &mut self.heap.get_mut(id).kind {
            ObjectKind::FastArray(elements) => Ok(elements),
            _ => Err(VmError::type_error("operand is not a fast array")),
        }
    }

    pub fn fast_array_load(&self, array: &Value, index: &Value) -> VmResult<Value> {
        let elements = self.fast_elements(array)?;
        checked_index(index, elements.len())
            .map(|i| elements[i].clone())
            .ok_or_else(|| VmError::range_error("array load index out of range"))
    }

    pub fn fast_array_store(&mut self, array: &Value, index: &Value, value: Value) -> VmResult<()> {
        let id = self.fast_array_id(array)?;
        let i = checked_index(index, self.fast_elements(array)?.len())
            .ok_or_else(|| VmError::range_error("array store index out of range"))?;
        self.heap.write_barrier(id, &value);
        self.fast_elements_mut(array)?[i] = value;
        Ok(())
    }

    pub fn fast_array_push(&mut self, array: &Value, value: Value) -> VmResult<()> {
        let max = self.options().fast_array_max_length;
        let id = self.fast_array_id(array)?;
        if self.fast_elements(array)?.len() >= max {
            return Err(VmError::range_error("fast array length exceeds maximum"));
        }
        self.heap.write_barrier(id, &value);
        self.fast_elements_mut(array)?.push(value);
        Ok(())
    }

    /// Append every element of `other`, which must also be a fast array
    pub fn fast_array_append(&mut self, array: &Value, other: &Value) -> VmResult<()> {
        let max = self.options().fast_array_max_length;
        let id = self.fast_array_id(array)?;
        let tail = self.fast_elements(other)?.clone();
        if self.fast_elements(array)?.len() + tail.len() > max {
            return Err(VmError::range_error("fast array length exceeds maximum"));
        }
        for value in &tail {
            self.heap.write_barrier(id, value);
        }
        self.fast_elements_mut(array)?.extend(tail);
        Ok(())
    }

    pub fn fast_array_length(&self, array: &Value) -> VmResult<f64> {
        Ok(self.fast_elements(array)?.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::RuntimeOptions;

    fn filled(rt: &mut Runtime, values: &[f64]) -> Value {
        let array = Value::Object(rt.create_fast_array(values.len()).unwrap());
        for v in values {
            rt.fast_array_push(&array, Value::Number(*v)).unwrap();
        }
        array
    }

    #[test]
    fn test_load_store_in_bounds() {
        let mut rt = Runtime::default();
        let array = filled(&mut rt, &[1.0, 2.0, 3.0]);
        assert_eq!(rt.fast_array_load(&array, &Value::Number(2.0)).unwrap(), Value::Number(3.0));
        rt.fast_array_store(&array, &Value::Number(0.0), Value::string("a")).unwrap();
        assert_eq!(rt.fast_array_load(&array, &Value::Number(0.0)).unwrap(), Value::string("a"));
        assert_eq!(rt.fast_array_length(&array).unwrap(), 3.0);
    }

    #[test]
    fn test_out_of_range_index() {
        let mut rt = Runtime::default();
        let array = filled(&mut rt, &[1.0, 2.0]);
        for index in [2.0, 0.5, -1.0, f64::NAN] {
            let err = rt.fast_array_load(&array, &Value::Number(index)).unwrap_err();
            assert_eq!(err.to_string(), "RangeError: array load index out of range");
        }
        let err = rt
            .fast_array_store(&array, &Value::Number(2.0), Value::Null)
            .unwrap_err();
        assert!(matches!(err, VmError::RangeError(_)));
        // Stores never grow the array
        assert_eq!(rt.fast_array_length(&array).unwrap(), 2.0);
        assert!(rt.fast_array_load(&array, &Value::string("0")).is_err());
    }

    #[test]
    fn test_growth_is_capped() {
        let mut rt = Runtime::new(RuntimeOptions {
            fast_array_max_length: 2,
            ..RuntimeOptions::default()
        });
        let array = filled(&mut rt, &[1.0, 2.0]);
        assert!(matches!(
            rt.fast_array_push(&array, Value::Null),
            Err(VmError::RangeError(_))
        ));
        assert!(rt.create_fast_array(3).is_err());
        let other = filled(&mut rt, &[3.0]);
        assert!(rt.fast_array_append(&array, &other).is_err());
    }

    #[test]
    fn test_append() {
        let mut rt = Runtime::default();
        let a = filled(&mut rt, &[1.0]);
        let b = filled(&mut rt, &[2.0, 3.0]);
        rt.fast_array_append(&a, &b).unwrap();
        assert_eq!(rt.fast_array_length(&a).unwrap(), 3.0);
        assert_eq!(rt.fast_array_load(&a, &Value::Number(2.0)).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn test_non_fast_array_operand() {
        let mut rt = Runtime::default();
        let regular = Value::Object(rt.new_array(vec![]));
        assert!(matches!(
            rt.fast_array_push(&regular, Value::Null),
            Err(VmError::TypeError(_))
        ));
    }

    #[test]
    fn test_generic_access_to_fast_arrays() {
        let mut rt = Runtime::default();
        let array = filled(&mut rt, &[1.0]);
        assert_eq!(rt.get_by_val(&array, &Value::Number(0.0)).unwrap(), Value::Number(1.0));
        let err = rt
            .put_by_val(&array, &Value::Number(5.0), Value::Null, false)
            .unwrap_err();
        assert!(matches!(err, VmError::RangeError(_)));
        assert!(!rt.delete_by_val(&array, &Value::Number(0.0), false).unwrap());
    }

    #[test]
    fn test_barrier_only_for_accepted_stores() {
        let mut rt = Runtime::default();
        let array = filled(&mut rt, &[1.0]);
        let object = Value::Object(rt.new_object());
        let before = rt.heap.barrier_count();

        assert!(rt.fast_array_store(&array, &Value::Number(3.0), object.clone()).is_err());
        assert_eq!(rt.heap.barrier_count(), before);
        rt.fast_array_store(&array, &Value::Number(0.0), object.clone()).unwrap();
        assert_eq!(rt.heap.barrier_count(), before + 1);

        let other = Value::Object(rt.create_fast_array(2).unwrap());
        rt.fast_array_push(&other, object.clone()).unwrap();
        rt.fast_array_push(&other, Value::Number(2.0)).unwrap();
        assert_eq!(rt.heap.barrier_count(), before + 2);
        // Appended pointers go through the barrier too
        rt.fast_array_append(&array, &other).unwrap();
        assert_eq!(rt.heap.barrier_count(), before + 3);
    }
}
