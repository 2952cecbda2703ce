//! Integration tests for the runtime
//!
//! Objects built from lowered literal instructions, inline-cached property
//! access across shapes, fast arrays, `arguments`, exceptions and the
//! builtin hooks.

use kestrel_engine::compiler::ir::{BuiltinMethod, IrInstr, IrModule};
use kestrel_engine::compiler::lower_program;
use kestrel_engine::vm::identifier::predefined;
use kestrel_engine::vm::{ArgumentVector, ObjectKind, PropertyFlags};
use kestrel_engine::{
    AstBuilder, ErrorManager, FlowContext, LiteralBuffer, ObjectId, Program, PropertyCacheEntry, Runtime,
    RuntimeOptions, SemanticContext, Value, VmError, VmResult,
};
use std::cell::RefCell;
use std::rc::Rc;

fn lower(program: &Program) -> IrModule {
    let mut errors = ErrorManager::new();
    let module = lower_program("test", program, &SemanticContext::new(), &FlowContext::new(), &mut errors);
    assert!(!errors.has_errors(), "unexpected lowering errors");
    module
}

/// Materialize every literal allocation in the module's top-level code
fn materialize_literals(rt: &mut Runtime, module: &IrModule) -> Vec<ObjectId> {
    let mut objects = Vec::new();
    for instr in module.functions[0].instructions() {
        match instr {
            IrInstr::AllocObjectLiteral { site, properties, .. } => {
                let buffer = LiteralBuffer::from_object_literal(properties).unwrap();
                objects.push(rt.create_object_from_buffer(*site, &buffer).unwrap());
            }
            IrInstr::AllocArray { elements, min_size, .. } => {
                let buffer = LiteralBuffer::from_array_literal(elements).unwrap();
                objects.push(rt.create_array_from_buffer(&buffer, *min_size as usize).unwrap());
            }
            _ => {}
        }
    }
    objects
}

fn sum_args(_rt: &mut Runtime, _this: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(Value::Number(args.iter().map(Value::to_number).sum()))
}

fn return_this(_rt: &mut Runtime, this: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(this.clone())
}

fn number_prop(rt: &mut Runtime, object: ObjectId, name: &str, value: f64) {
    rt.set_named(object, name, Value::Number(value));
}

// ============================================================================
// Literal buffers
// ============================================================================

mod literals {
    use super::*;

    #[test]
    fn test_object_literal_from_lowered_ir() {
        let b = AstBuilder::new();
        let e = b.object(vec![b.prop("a", b.num(1.0)), b.prop("b", b.str("x"))]);
        let module = lower(&b.program(vec![b.expr_stmt(e)]));
        let mut rt = Runtime::default();
        let objects = materialize_literals(&mut rt, &module);
        assert_eq!(objects.len(), 1);

        let object = Value::Object(objects[0]);
        let a = rt.intern("a");
        let bname = rt.intern("b");
        let mut cache = PropertyCacheEntry::new();
        assert_eq!(rt.get_by_id(&object, a, &mut cache).unwrap(), Value::Number(1.0));
        let mut cache = PropertyCacheEntry::new();
        assert_eq!(rt.get_by_id(&object, bname, &mut cache).unwrap(), Value::string("x"));
        assert_eq!(rt.literal_site_count(), 1);
    }

    #[test]
    fn test_literal_site_shares_shape() {
        let b = AstBuilder::new();
        let e = b.object(vec![b.prop("x", b.num(1.0)), b.prop("y", b.num(2.0))]);
        let module = lower(&b.program(vec![b.expr_stmt(e)]));
        let mut rt = Runtime::default();
        let first = materialize_literals(&mut rt, &module)[0];
        let second = materialize_literals(&mut rt, &module)[0];
        assert_ne!(first, second);
        assert_eq!(rt.heap.get(first).class, rt.heap.get(second).class);

        // One cache serves both objects
        let y = rt.intern("y");
        let mut cache = PropertyCacheEntry::new();
        rt.reset_stats();
        rt.get_by_id(&Value::Object(first), y, &mut cache).unwrap();
        rt.get_by_id(&Value::Object(second), y, &mut cache).unwrap();
        assert_eq!(rt.stats().misses, 1);
        assert_eq!(rt.stats().hits, 1);
    }

    #[test]
    fn test_literal_objects_are_independent() {
        let b = AstBuilder::new();
        let e = b.object(vec![b.prop("n", b.num(0.0))]);
        let module = lower(&b.program(vec![b.expr_stmt(e)]));
        let mut rt = Runtime::default();
        let first = Value::Object(materialize_literals(&mut rt, &module)[0]);
        let second = Value::Object(materialize_literals(&mut rt, &module)[0]);
        let n = rt.intern("n");
        let mut store_cache = PropertyCacheEntry::new();
        rt.put_by_id(&first, n, Value::Number(7.0), &mut store_cache, true).unwrap();
        let mut load_cache = PropertyCacheEntry::new();
        assert_eq!(rt.get_by_id(&second, n, &mut load_cache).unwrap(), Value::Number(0.0));
    }

    #[test]
    fn test_array_literal_with_trailing_elements() {
        let b = AstBuilder::new();
        let e = b.array(vec![Some(b.num(1.0)), Some(b.ident("x")), Some(b.num(3.0)), None]);
        let module = lower(&b.program(vec![b.expr_stmt(e)]));
        let mut rt = Runtime::default();
        let array = materialize_literals(&mut rt, &module)[0];
        assert!(rt.is_array(array));

        let array = Value::Object(array);
        let mut cache = PropertyCacheEntry::new();
        assert_eq!(rt.get_by_id(&array, predefined::LENGTH, &mut cache).unwrap(), Value::Number(4.0));
        assert_eq!(rt.get_by_val(&array, &Value::Number(0.0)).unwrap(), Value::Number(1.0));
        // Elements after the buffer start as holes
        assert_eq!(rt.get_by_val(&array, &Value::Number(2.0)).unwrap(), Value::Undefined);
        assert!(!rt.has_property(&Value::Number(2.0), &array).unwrap());
    }

    #[test]
    fn test_undefined_has_no_literal_form() {
        let properties = vec![("u".to_string(), kestrel_engine::compiler::ir::IrConstant::Undefined)];
        assert!(LiteralBuffer::from_object_literal(&properties).is_none());
    }

    #[test]
    fn test_shape_cache_can_be_disabled() {
        let options = RuntimeOptions::from_json(r#"{ "literal_shape_cache": false }"#).unwrap();
        let mut rt = Runtime::new(options);
        let buffer = LiteralBuffer::from_object_literal(&[(
            "k".to_string(),
            kestrel_engine::compiler::ir::IrConstant::Bool(true),
        )])
        .unwrap();
        let object = rt.create_object_from_buffer(0, &buffer).unwrap();
        assert_eq!(rt.literal_site_count(), 0);
        let k = rt.intern("k");
        let mut cache = PropertyCacheEntry::new();
        assert_eq!(rt.get_by_id(&Value::Object(object), k, &mut cache).unwrap(), Value::Bool(true));
    }
}

// ============================================================================
// Inline caches
// ============================================================================

mod inline_caches {
    use super::*;

    #[test]
    fn test_monomorphic_site_hits() {
        let mut rt = Runtime::default();
        let x = rt.intern("x");
        let objects: Vec<Value> = (0..10)
            .map(|i| {
                let o = rt.new_object();
                number_prop(&mut rt, o, "x", i as f64);
                Value::Object(o)
            })
            .collect();
        let mut cache = PropertyCacheEntry::new();
        rt.reset_stats();
        let total: f64 = objects
            .iter()
            .map(|o| rt.get_by_id(o, x, &mut cache).unwrap().to_number())
            .sum();
        assert_eq!(total, 45.0);
        assert_eq!(rt.stats().misses, 1);
        assert_eq!(rt.stats().hits, 9);
    }

    #[test]
    fn test_shape_change_repopulates_cache() {
        let mut rt = Runtime::default();
        let x = rt.intern("x");
        let a = rt.new_object();
        number_prop(&mut rt, a, "x", 1.0);
        let b = rt.new_object();
        number_prop(&mut rt, b, "y", 0.0);
        number_prop(&mut rt, b, "x", 2.0);

        let mut cache = PropertyCacheEntry::new();
        rt.reset_stats();
        for _ in 0..2 {
            assert_eq!(rt.get_by_id(&Value::Object(a), x, &mut cache).unwrap(), Value::Number(1.0));
            assert_eq!(rt.get_by_id(&Value::Object(b), x, &mut cache).unwrap(), Value::Number(2.0));
        }
        // The single entry flips between the two shapes
        assert_eq!(rt.stats().hits, 0);
        assert_eq!(rt.stats().misses, 4);
    }

    #[test]
    fn test_dictionary_threshold_from_options_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.json");
        std::fs::write(&path, r#"{ "dictionary_threshold": 2 }"#).unwrap();
        let mut rt = Runtime::new(RuntimeOptions::from_file(&path).unwrap());
        assert_eq!(rt.options().dictionary_threshold, 2);

        let o = rt.new_object();
        for name in ["a", "b", "c"] {
            number_prop(&mut rt, o, name, 1.0);
        }
        assert!(rt.classes.is_dictionary(rt.heap.get(o).class));

        let c = rt.intern("c");
        let mut cache = PropertyCacheEntry::new();
        rt.reset_stats();
        for _ in 0..3 {
            assert_eq!(rt.get_by_id(&Value::Object(o), c, &mut cache).unwrap(), Value::Number(1.0));
        }
        assert_eq!(rt.stats().hits, 0);
        assert_eq!(cache.class, None);
    }

    #[test]
    fn test_missing_options_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RuntimeOptions::from_file(dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_inherited_method_through_prototype() {
        let mut rt = Runtime::default();
        let proto = rt.new_object();
        let method = rt.new_function(return_this, false);
        rt.set_named(proto, "m", Value::Object(method));
        let m = rt.intern("m");

        let mut cache = PropertyCacheEntry::new();
        for _ in 0..3 {
            let child = rt.alloc_object(Some(proto));
            let child = Value::Object(child);
            let callee = rt.get_by_id(&child, m, &mut cache).unwrap();
            assert_eq!(rt.call(&callee, &child, &[]).unwrap(), child);
        }
        assert!(rt.stats().hits >= 2);
    }

    #[test]
    fn test_put_then_get_same_site() {
        let mut rt = Runtime::default();
        let count = rt.intern("count");
        let o = Value::Object(rt.new_object());
        let mut put_cache = PropertyCacheEntry::new();
        let mut get_cache = PropertyCacheEntry::new();
        rt.put_by_id(&o, count, Value::Number(0.0), &mut put_cache, true).unwrap();
        for _ in 0..5 {
            let n = rt.get_by_id(&o, count, &mut get_cache).unwrap().to_number();
            rt.put_by_id(&o, count, Value::Number(n + 1.0), &mut put_cache, true).unwrap();
        }
        assert_eq!(rt.get_by_id(&o, count, &mut get_cache).unwrap(), Value::Number(5.0));
    }

    #[test]
    fn test_frozen_property_rejects_strict_write() {
        let mut rt = Runtime::default();
        let o = rt.new_object();
        let k = rt.intern("k");
        rt.define_own_property(o, k, Value::Number(1.0), PropertyFlags::frozen());
        let mut cache = PropertyCacheEntry::new();
        let err = rt
            .put_by_id(&Value::Object(o), k, Value::Number(2.0), &mut cache, true)
            .unwrap_err();
        assert_eq!(err.to_string(), "TypeError: Cannot assign to read-only property 'k'");
        // Sloppy writes are silently ignored
        rt.put_by_id(&Value::Object(o), k, Value::Number(2.0), &mut cache, false).unwrap();
        assert_eq!(rt.get_by_id(&Value::Object(o), k, &mut cache).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_primitive_bases() {
        let mut rt = Runtime::default();
        let mut cache = PropertyCacheEntry::new();
        let s = Value::string("abc");
        assert_eq!(rt.get_by_id(&s, predefined::LENGTH, &mut cache).unwrap(), Value::Number(3.0));
        let x = rt.intern("x");
        let err = rt.put_by_id(&s, x, Value::Null, &mut cache, true).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: Cannot create property 'x' on string 'abc'");
        let err = rt.put_by_id(&Value::Null, x, Value::Null, &mut cache, false).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: Cannot set property 'x' of null");
    }
}

// ============================================================================
// Property operations
// ============================================================================

mod properties {
    use super::*;

    #[test]
    fn test_delete_then_readd() {
        let mut rt = Runtime::default();
        let o = rt.new_object();
        number_prop(&mut rt, o, "a", 1.0);
        number_prop(&mut rt, o, "b", 2.0);
        let a = rt.intern("a");
        let object = Value::Object(o);
        assert!(rt.delete_by_id(&object, a, true).unwrap());
        assert!(!rt.has_property(&Value::string("a"), &object).unwrap());
        number_prop(&mut rt, o, "a", 3.0);
        let mut cache = PropertyCacheEntry::new();
        assert_eq!(rt.get_by_id(&object, a, &mut cache).unwrap(), Value::Number(3.0));
        assert_eq!(rt.get_by_val(&object, &Value::string("b")).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn test_array_length_is_not_deletable() {
        let mut rt = Runtime::default();
        let array = Value::Object(rt.new_array(vec![Value::Null]));
        let err = rt.delete_by_id(&array, predefined::LENGTH, true).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: Cannot delete property 'length'");
        assert!(!rt.delete_by_id(&array, predefined::LENGTH, false).unwrap());
    }

    #[test]
    fn test_in_requires_object() {
        let mut rt = Runtime::default();
        let err = rt.has_property(&Value::string("a"), &Value::Number(1.0)).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: right operand of 'in' is not an object");
    }

    #[test]
    fn test_numeric_and_string_keys_agree() {
        let mut rt = Runtime::default();
        let o = Value::Object(rt.new_object());
        rt.put_by_val(&o, &Value::Number(1.0), Value::string("one"), true).unwrap();
        assert_eq!(rt.get_by_val(&o, &Value::string("1")).unwrap(), Value::string("one"));
        assert!(rt.has_property(&Value::Number(1.0), &o).unwrap());
    }

    #[test]
    fn test_array_writes_extend_length() {
        let mut rt = Runtime::default();
        let array = Value::Object(rt.new_array(vec![]));
        rt.put_by_val(&array, &Value::Number(3.0), Value::Bool(true), true).unwrap();
        let mut cache = PropertyCacheEntry::new();
        assert_eq!(rt.get_by_id(&array, predefined::LENGTH, &mut cache).unwrap(), Value::Number(4.0));
        let mut store_cache = PropertyCacheEntry::new();
        rt.put_by_id(&array, predefined::LENGTH, Value::Number(1.0), &mut store_cache, true).unwrap();
        assert_eq!(rt.get_by_val(&array, &Value::Number(3.0)).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_huge_length_and_index_raise_range_error() {
        let mut rt = Runtime::default();
        let array = Value::Object(rt.new_array(vec![Value::Null]));
        let mut cache = PropertyCacheEntry::new();
        let err = rt
            .put_by_id(&array, predefined::LENGTH, Value::Number(4294967295.0), &mut cache, true)
            .unwrap_err();
        assert_eq!(err.to_string(), "RangeError: array length exceeds dense storage limit");
        let err = rt.put_by_val(&array, &Value::Number(4e9), Value::Null, true).unwrap_err();
        assert!(matches!(err, VmError::RangeError(_)));
        // The array is left as it was
        assert_eq!(rt.get_by_id(&array, predefined::LENGTH, &mut cache).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_dense_limit_is_configurable() {
        let mut rt = Runtime::new(RuntimeOptions {
            array_dense_limit: 4,
            ..RuntimeOptions::default()
        });
        let array = Value::Object(rt.new_array(vec![]));
        rt.put_by_val(&array, &Value::Number(3.0), Value::Bool(true), true).unwrap();
        assert!(rt.put_by_val(&array, &Value::Number(4.0), Value::Bool(true), true).is_err());
    }
}

// ============================================================================
// Fast arrays
// ============================================================================

mod fast_arrays {
    use super::*;

    #[test]
    fn test_push_load_store_append() {
        let mut rt = Runtime::default();
        let a = Value::Object(rt.create_fast_array(4).unwrap());
        for i in 0..3 {
            rt.fast_array_push(&a, Value::Number(i as f64)).unwrap();
        }
        rt.fast_array_store(&a, &Value::Number(1.0), Value::Number(10.0)).unwrap();
        let b = Value::Object(rt.create_fast_array(0).unwrap());
        rt.fast_array_push(&b, Value::Number(99.0)).unwrap();
        rt.fast_array_append(&a, &b).unwrap();
        assert_eq!(rt.fast_array_length(&a).unwrap(), 4.0);
        assert_eq!(rt.fast_array_load(&a, &Value::Number(1.0)).unwrap(), Value::Number(10.0));
        assert_eq!(rt.fast_array_load(&a, &Value::Number(3.0)).unwrap(), Value::Number(99.0));
    }

    #[test]
    fn test_range_errors() {
        let mut rt = Runtime::default();
        let a = Value::Object(rt.create_fast_array(0).unwrap());
        let err = rt.fast_array_load(&a, &Value::Number(0.0)).unwrap_err();
        assert_eq!(err.to_string(), "RangeError: array load index out of range");
        let err = rt.fast_array_store(&a, &Value::Number(0.0), Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "RangeError: array store index out of range");
    }

    #[test]
    fn test_generic_access_is_bounds_checked() {
        let mut rt = Runtime::default();
        let a = Value::Object(rt.create_fast_array(1).unwrap());
        rt.fast_array_push(&a, Value::Number(7.0)).unwrap();
        assert_eq!(rt.get_by_val(&a, &Value::Number(0.0)).unwrap(), Value::Number(7.0));
        assert_eq!(rt.get_by_val(&a, &Value::string("0")).unwrap(), Value::Number(7.0));
        for key in [Value::Number(5.0), Value::Number(0.5), Value::Number(-1.0), Value::string("3")] {
            let err = rt.get_by_val(&a, &key).unwrap_err();
            assert_eq!(err.to_string(), "RangeError: array load index out of range");
            assert!(err.is_catchable());
        }
        let err = rt.put_by_val(&a, &Value::Number(0.5), Value::Null, false).unwrap_err();
        assert_eq!(err.to_string(), "RangeError: array store index out of range");
        let err = rt.put_by_val(&a, &Value::Number(5.0), Value::Null, false).unwrap_err();
        assert_eq!(err.to_string(), "RangeError: array store index out of range");
        // `length` and prototype methods still go through the named path
        let mut cache = PropertyCacheEntry::new();
        assert_eq!(rt.get_by_id(&a, predefined::LENGTH, &mut cache).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_length_cap() {
        let mut rt = Runtime::new(RuntimeOptions {
            fast_array_max_length: 1,
            ..RuntimeOptions::default()
        });
        let a = Value::Object(rt.create_fast_array(1).unwrap());
        rt.fast_array_push(&a, Value::Null).unwrap();
        let err = rt.fast_array_push(&a, Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "RangeError: fast array length exceeds maximum");
    }

    #[test]
    fn test_spread_into_regular_array() {
        let mut rt = Runtime::default();
        let source = Value::Object(rt.create_fast_array(2).unwrap());
        rt.fast_array_push(&source, Value::Number(1.0)).unwrap();
        rt.fast_array_push(&source, Value::Number(2.0)).unwrap();
        let target = rt.new_array(vec![Value::Number(0.0)]);
        let next = rt
            .call_builtin(
                BuiltinMethod::ArraySpread,
                &[Value::Object(target), source, Value::Number(1.0)],
            )
            .unwrap();
        assert_eq!(next, Value::Number(3.0));
        assert_eq!(
            rt.get_by_val(&Value::Object(target), &Value::Number(2.0)).unwrap(),
            Value::Number(2.0)
        );
    }
}

// ============================================================================
// Arguments
// ============================================================================

mod arguments {
    use super::*;

    fn frame(values: &[Value]) -> ArgumentVector {
        Rc::new(RefCell::new(values.to_vec()))
    }

    #[test]
    fn test_apply_with_arguments_object() {
        let mut rt = Runtime::default();
        let args = frame(&[Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]);
        let arguments = Value::Object(rt.create_arguments(&args, false));
        let sum = Value::Object(rt.new_function(sum_args, false));
        let result = rt
            .call_builtin(BuiltinMethod::Apply, &[sum, arguments, Value::Undefined])
            .unwrap();
        assert_eq!(result, Value::Number(6.0));
    }

    #[test]
    fn test_mapped_writes_reach_frame() {
        let mut rt = Runtime::default();
        let args = frame(&[Value::Number(1.0)]);
        let arguments = Value::Object(rt.create_arguments(&args, false));
        rt.put_by_val(&arguments, &Value::Number(0.0), Value::string("z"), true).unwrap();
        assert_eq!(args.borrow()[0], Value::string("z"));
        assert!(matches!(
            rt.heap.get(arguments.as_object().unwrap()).kind,
            ObjectKind::Arguments(_)
        ));
    }
}

// ============================================================================
// Exceptions
// ============================================================================

mod exceptions {
    use super::*;

    #[test]
    fn test_caught_type_error_becomes_error_object() {
        let mut rt = Runtime::default();
        let x = rt.intern("x");
        let message = rt
            .catch(
                |rt| {
                    let mut cache = PropertyCacheEntry::new();
                    rt.get_by_id(&Value::Undefined, x, &mut cache)
                },
                |rt, error| {
                    let mut cache = PropertyCacheEntry::new();
                    rt.get_by_id(&error, predefined::MESSAGE, &mut cache)
                },
            )
            .unwrap();
        assert_eq!(message, Value::string("Cannot read property 'x' of undefined"));
        assert!(!rt.has_handler());
    }

    #[test]
    fn test_uncaught_error_aborts() {
        let mut rt = Runtime::default();
        let err = rt.execute(|rt| rt.get_global("missing")).unwrap_err();
        assert!(!err.is_catchable());
        assert_eq!(err.to_string(), "Uncaught ReferenceError: 'missing' is not defined");
    }

    #[test]
    fn test_thrown_value_reaches_handler() {
        let mut rt = Runtime::default();
        let result = rt
            .catch(
                |_| Err(VmError::Thrown(Value::Number(42.0))),
                |_, thrown| Ok(thrown),
            )
            .unwrap();
        assert_eq!(result, Value::Number(42.0));
    }

    #[test]
    fn test_calling_non_callable() {
        let mut rt = Runtime::default();
        let err = rt.call(&Value::Number(1.0), &Value::Undefined, &[]).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: 1 is not a function");
        let err = rt.construct(&Value::Null, &[]).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: constructor is not callable");
    }
}

// ============================================================================
// Builtins
// ============================================================================

mod builtins {
    use super::*;

    #[test]
    fn test_template_object_is_cached_and_frozen() {
        let mut rt = Runtime::default();
        let args = [Value::Number(3.0), Value::Bool(true), Value::string("a"), Value::string("b")];
        let first = rt.call_builtin(BuiltinMethod::GetTemplateObject, &args).unwrap();
        let second = rt.call_builtin(BuiltinMethod::GetTemplateObject, &args).unwrap();
        assert_eq!(first, second);

        let mut cache = PropertyCacheEntry::new();
        let raw = rt.get_by_id(&first, predefined::RAW, &mut cache).unwrap();
        assert_eq!(rt.get_by_val(&raw, &Value::Number(1.0)).unwrap(), Value::string("b"));
        let err = rt
            .put_by_val(&first, &Value::Number(0.0), Value::string("z"), true)
            .unwrap_err();
        assert!(matches!(err, VmError::TypeError(_)));
    }

    #[test]
    fn test_copy_data_properties_skips_hidden() {
        let mut rt = Runtime::default();
        let source = rt.new_object();
        number_prop(&mut rt, source, "shown", 1.0);
        let hidden = rt.intern("hidden");
        rt.define_own_property(source, hidden, Value::Number(2.0), PropertyFlags::hidden());
        let target = rt.new_object();
        rt.call_builtin(
            BuiltinMethod::CopyDataProperties,
            &[Value::Object(target), Value::Object(source)],
        )
        .unwrap();
        assert!(rt.has_own_property(target, &Value::string("shown")));
        assert!(!rt.has_own_property(target, &Value::string("hidden")));
    }

    #[test]
    fn test_concat_and_method_lookup() {
        let mut rt = Runtime::default();
        let s = rt
            .call_builtin(
                BuiltinMethod::Concat,
                &[Value::string("n="), Value::Number(2.0), Value::Bool(true)],
            )
            .unwrap();
        assert_eq!(s, Value::string("n=2true"));

        let upper = rt
            .call_builtin(BuiltinMethod::GetMethod, &[Value::string("abc"), Value::string("toUpperCase")])
            .unwrap();
        assert_eq!(rt.call(&upper, &Value::string("abc"), &[]).unwrap(), Value::string("ABC"));

        let err = rt
            .call_builtin(BuiltinMethod::GetMethod, &[Value::string("abc"), Value::string("length")])
            .unwrap_err();
        assert_eq!(err.to_string(), "TypeError: 'length' is not a function");
    }

    /// One `next()` call, reading `value` and `done` at their own sites
    fn next_result(rt: &mut Runtime, iterator: &Value) -> (Value, Value) {
        let mut next_cache = PropertyCacheEntry::new();
        let next = rt.get_by_id(iterator, predefined::NEXT, &mut next_cache).unwrap();
        let result = rt.call(&next, iterator, &[]).unwrap();
        let mut value_cache = PropertyCacheEntry::new();
        let mut done_cache = PropertyCacheEntry::new();
        (
            rt.get_by_id(&result, predefined::VALUE, &mut value_cache).unwrap(),
            rt.get_by_id(&result, predefined::DONE, &mut done_cache).unwrap(),
        )
    }

    #[test]
    fn test_array_iterator_yields_each_element() {
        let mut rt = Runtime::default();
        let array = Value::Object(rt.new_array(vec![Value::Number(1.0), Value::Number(2.0)]));
        let iterator = rt.call_builtin(BuiltinMethod::GetIterator, &[array]).unwrap();
        assert_eq!(next_result(&mut rt, &iterator), (Value::Number(1.0), Value::Bool(false)));
        assert_eq!(next_result(&mut rt, &iterator), (Value::Number(2.0), Value::Bool(false)));
        assert_eq!(next_result(&mut rt, &iterator), (Value::Undefined, Value::Bool(true)));
        assert_eq!(next_result(&mut rt, &iterator), (Value::Undefined, Value::Bool(true)));
    }

    #[test]
    fn test_string_iterator_yields_each_unit() {
        let mut rt = Runtime::default();
        let iterator = rt.call_builtin(BuiltinMethod::GetIterator, &[Value::string("ab")]).unwrap();
        assert_eq!(next_result(&mut rt, &iterator), (Value::string("a"), Value::Bool(false)));
        assert_eq!(next_result(&mut rt, &iterator), (Value::string("b"), Value::Bool(false)));
        assert_eq!(next_result(&mut rt, &iterator).1, Value::Bool(true));
    }

    #[test]
    fn test_builtin_closure_is_shared() {
        let mut rt = Runtime::default();
        let a = rt.get_builtin_closure(BuiltinMethod::Concat);
        let b = rt.get_builtin_closure(BuiltinMethod::Concat);
        assert_eq!(a, b);
        let result = rt
            .call(&Value::Object(a), &Value::Undefined, &[Value::string("x"), Value::string("y")])
            .unwrap();
        assert_eq!(result, Value::string("xy"));
    }

    #[test]
    fn test_eval_passes_non_strings_through() {
        let mut rt = Runtime::default();
        assert_eq!(
            rt.call_builtin(BuiltinMethod::Eval, &[Value::Number(5.0)]).unwrap(),
            Value::Number(5.0)
        );
        assert!(rt.call_builtin(BuiltinMethod::Eval, &[Value::string("1 + 1")]).is_err());
    }
}
