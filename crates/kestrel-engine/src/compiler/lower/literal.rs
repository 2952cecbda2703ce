//! Literal lowering: arrays, objects, and templates

use super::expr::literal_constant;
use super::Lowerer;
use crate::ast::{
    ArrayExpression, Expression, ObjectExpression, ObjectMember, Property, PropertyKey,
    PropertyKind, Span, StaticType, TaggedTemplateExpression, TemplateLiteral,
};
use crate::compiler::diagnostics::{codes, Diagnostic};
use crate::compiler::ir::{
    BinaryOp, BuiltinMethod, IrConstant, IrInstr, IrType, PropKey, Register, StackSlotId,
};
use rustc_hash::FxHashMap;

/// How far code generation for a named object-literal property has come
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropState {
    /// Nothing emitted yet
    None,
    /// A `null` placeholder holds the slot until the final definition
    Placeholder,
    /// The final value (or accessor pair) has been stored
    Generated,
}

/// The definitions of one property name within an object literal
#[derive(Debug, Clone, Copy)]
struct PropInfo {
    is_accessor: bool,
    state: PropState,
    /// Index of the definition that wins
    value_index: usize,
    getter_index: Option<usize>,
    setter_index: Option<usize>,
}

impl PropInfo {
    fn new(index: usize) -> Self {
        Self {
            is_accessor: false,
            state: PropState::None,
            value_index: index,
            getter_index: None,
            setter_index: None,
        }
    }

    fn set_value(&mut self, index: usize) {
        self.is_accessor = false;
        self.value_index = index;
        self.getter_index = None;
        self.setter_index = None;
    }

    fn set_getter(&mut self, index: usize) {
        if !self.is_accessor {
            self.setter_index = None;
            self.is_accessor = true;
        }
        self.getter_index = Some(index);
        self.value_index = index;
    }

    fn set_setter(&mut self, index: usize) {
        if !self.is_accessor {
            self.getter_index = None;
            self.is_accessor = true;
        }
        self.setter_index = Some(index);
        self.value_index = index;
    }
}

/// `__proto__: value` in an object literal sets the prototype
fn is_proto_property(prop: &Property) -> bool {
    prop.kind == PropertyKind::Init
        && !prop.method
        && !prop.shorthand
        && prop.key.static_name().as_deref() == Some("__proto__")
}

impl<'a> Lowerer<'a> {
    // ========================================================================
    // Arrays
    // ========================================================================

    pub(super) fn lower_array(&mut self, array: &ArrayExpression) -> Register {
        let elements: Vec<Option<&Expression>> = array.elements.iter().map(Option::as_ref).collect();
        if self.flow.node_type(array.id) == StaticType::FastArray {
            return self.lower_fast_array(&elements);
        }
        self.lower_array_from_elements(&elements)
    }

    /// Build an array from literal elements (also used for spread argument
    /// lists). The leading run of constants goes into the literal buffer of
    /// `AllocArray`; the rest is stored one element at a time.
    pub(super) fn lower_array_from_elements(&mut self, elements: &[Option<&Expression>]) -> Register {
        let min_size = elements
            .iter()
            .filter(|e| !matches!(e, Some(Expression::Spread(_))))
            .count() as u32;
        let variable_length = elements
            .iter()
            .any(|e| matches!(e, Some(Expression::Spread(_))));

        // With a spread the next index is only known at runtime
        let next_index = if variable_length {
            let slot = self.current_function_mut().alloc_stack_slot();
            self.emit(IrInstr::AllocStack { slot });
            let zero = self.number_const(0.0);
            self.emit(IrInstr::StoreStack { slot, value: zero });
            Some(slot)
        } else {
            None
        };

        let mut constants = Vec::new();
        let mut array: Option<Register> = None;
        let mut count: u32 = 0;

        for element in elements {
            let mut value = None;
            let mut spread = None;
            match element {
                None => {}
                Some(Expression::Spread(s)) => spread = Some(self.lower_expr(&s.argument)),
                Some(Expression::Literal(lit)) if array.is_none() => {
                    constants.push(literal_constant(&lit.value));
                    self.advance_array_index(next_index, &mut count);
                    continue;
                }
                Some(e) => value = Some(self.lower_expr(e)),
            }

            let target = match array {
                Some(target) => target,
                None => {
                    let target = self.emit_alloc_array(std::mem::take(&mut constants), min_size);
                    array = Some(target);
                    target
                }
            };

            if let Some(iterable) = spread {
                let slot = next_index.expect("spread without index slot");
                let index = self.load_stack(slot, IrType::NUMBER);
                let next = self.alloc_register(IrType::NUMBER);
                self.emit(IrInstr::CallBuiltin {
                    dest: next,
                    builtin: BuiltinMethod::ArraySpread,
                    args: vec![target, iterable, index],
                });
                self.emit(IrInstr::StoreStack { slot, value: next });
                continue;
            }

            if let Some(value) = value {
                let key = match next_index {
                    Some(slot) => self.load_stack(slot, IrType::NUMBER),
                    None => self.number_const(count as f64),
                };
                self.emit(IrInstr::StoreOwnProperty {
                    object: target,
                    key,
                    value,
                    enumerable: true,
                });
            }
            self.advance_array_index(next_index, &mut count);
        }

        let target = match array {
            Some(target) => target,
            None => {
                let len = constants.len() as u32;
                self.emit_alloc_array(constants, len)
            }
        };

        // A trailing hole still counts toward the length
        if matches!(elements.last(), Some(None)) {
            let length = match next_index {
                Some(slot) => self.load_stack(slot, IrType::NUMBER),
                None => self.number_const(count as f64),
            };
            self.emit(IrInstr::StoreProperty {
                object: target,
                key: PropKey::Named("length".to_string()),
                value: length,
            });
        }
        target
    }

    fn emit_alloc_array(&mut self, elements: Vec<IrConstant>, min_size: u32) -> Register {
        let dest = self.alloc_register(IrType::OBJECT);
        self.emit(IrInstr::AllocArray {
            dest,
            elements,
            min_size,
        });
        dest
    }

    fn advance_array_index(&mut self, next_index: Option<StackSlotId>, count: &mut u32) {
        match next_index {
            Some(slot) => {
                let index = self.load_stack(slot, IrType::NUMBER);
                let one = self.number_const(1.0);
                let next = self.emit_binary(BinaryOp::Add, index, one);
                self.emit(IrInstr::StoreStack { slot, value: next });
            }
            None => *count += 1,
        }
    }

    fn load_stack(&mut self, slot: StackSlotId, ty: IrType) -> Register {
        let dest = self.alloc_register(ty);
        self.emit(IrInstr::LoadStack { dest, slot });
        dest
    }

    fn lower_fast_array(&mut self, elements: &[Option<&Expression>]) -> Register {
        let array = self.alloc_register(IrType::OBJECT);
        self.emit(IrInstr::AllocFastArray {
            dest: array,
            capacity: elements.len() as u32,
        });
        for element in elements {
            match element {
                Some(Expression::Spread(spread)) => {
                    if self.static_type(&spread.argument) == StaticType::FastArray {
                        let other = self.lower_expr(&spread.argument);
                        self.emit(IrInstr::FastArrayAppend { array, other });
                    } else {
                        self.report_error(
                            spread.span,
                            codes::TYPED_ARRAY_SPREAD,
                            "spread of non-array is not supported in typed arrays",
                        );
                    }
                }
                Some(e) => {
                    let value = self.lower_expr(e);
                    self.emit(IrInstr::FastArrayPush { array, value });
                }
                None => {
                    let value = self.undefined();
                    self.emit(IrInstr::FastArrayPush { array, value });
                }
            }
        }
        array
    }

    // ========================================================================
    // Objects
    // ========================================================================

    pub(super) fn lower_object(&mut self, object: &ObjectExpression) -> Register {
        // Pass 1: find the final definition of every named property, so that
        // only the last write emits a store and the layout is fixed up front.
        let mut props: FxHashMap<String, PropInfo> = FxHashMap::default();
        let mut first_loc: FxHashMap<(PropertyKind, String), Span> = FxHashMap::default();
        let mut num_computed = 0u32;
        let mut proto: Option<(usize, &Property)> = None;

        for (i, member) in object.properties.iter().enumerate() {
            let ObjectMember::Property(prop) = member else {
                continue;
            };
            let Some(name) = prop.key.static_name() else {
                num_computed += 1;
                continue;
            };

            if is_proto_property(prop) {
                match proto {
                    None => proto = Some((i, prop)),
                    Some((_, first)) => self.report(
                        Diagnostic::error("__proto__ was set multiple times in the object definition.")
                            .with_code(codes::DUPLICATE_PROTO)
                            .with_primary_label(self.file_id, prop.span, "")
                            .with_secondary_label(self.file_id, first.span, "The first definition was here."),
                    ),
                }
                continue;
            }

            let info = props.entry(name.clone()).or_insert_with(|| PropInfo::new(i));
            match prop.kind {
                PropertyKind::Get => info.set_getter(i),
                PropertyKind::Set => info.set_setter(i),
                PropertyKind::Init => info.set_value(i),
            }

            let key = (prop.kind, name.clone());
            if let Some(first) = first_loc.get(&key) {
                let first = *first;
                self.report(
                    Diagnostic::warning(format!(
                        "the property \"{}\" was set multiple times in the object definition.",
                        name
                    ))
                    .with_code(codes::DUPLICATE_PROPERTY)
                    .with_primary_label(self.file_id, prop.span, "")
                    .with_secondary_label(self.file_id, first, "The first definition was here."),
                );
            } else {
                first_loc.insert(key, prop.span);
            }
        }

        if let Some(literal) = self.try_object_literal_buffer(object, &props, proto.is_some()) {
            return literal;
        }

        // The parent can be set at allocation only if evaluating it first
        // cannot be observed
        let mut parent = None;
        if let Some((index, prop)) = proto {
            if index == 0 || prop.value.is_constant() {
                parent = Some(self.lower_expr(&prop.value));
            }
        }

        let obj = self.alloc_register(IrType::OBJECT);
        self.emit(IrInstr::AllocObject {
            dest: obj,
            size: props.len() as u32 + num_computed,
            parent,
        });

        // Pass 2: evaluate everything in source order
        let mut seen_computed = false;
        for (i, member) in object.properties.iter().enumerate() {
            let prop = match member {
                ObjectMember::Spread(spread) => {
                    let source = self.lower_expr(&spread.argument);
                    let dest = self.alloc_register(IrType::OBJECT);
                    self.emit(IrInstr::CallBuiltin {
                        dest,
                        builtin: BuiltinMethod::CopyDataProperties,
                        args: vec![obj, source],
                    });
                    seen_computed = true;
                    continue;
                }
                ObjectMember::Property(prop) => prop,
            };

            if let PropertyKey::Computed(key_expr) = &prop.key {
                let key = self.lower_expr(key_expr);
                match prop.kind {
                    PropertyKind::Get | PropertyKind::Set => {
                        let accessor = self.lower_property_value(prop, None);
                        let (getter, setter) = if prop.kind == PropertyKind::Get {
                            (Some(accessor), None)
                        } else {
                            (None, Some(accessor))
                        };
                        self.emit(IrInstr::StoreGetterSetter {
                            object: obj,
                            key,
                            getter,
                            setter,
                            enumerable: true,
                        });
                    }
                    PropertyKind::Init => {
                        let value = self.lower_property_value(prop, None);
                        self.emit(IrInstr::StoreOwnProperty {
                            object: obj,
                            key,
                            value,
                            enumerable: true,
                        });
                    }
                }
                seen_computed = true;
                continue;
            }

            if is_proto_property(prop) {
                if proto.map(|(index, _)| index) == Some(i) && parent.is_none() {
                    let value = self.lower_expr(&prop.value);
                    let dest = self.alloc_register(IrType::UNDEFINED);
                    self.emit(IrInstr::CallBuiltin {
                        dest,
                        builtin: BuiltinMethod::SilentSetPrototypeOf,
                        args: vec![obj, value],
                    });
                }
                continue;
            }

            let name = prop.key.static_name().expect("non-computed key has a name");
            let mut info = props[&name];

            match prop.kind {
                PropertyKind::Get | PropertyKind::Set => {
                    if info.state == PropState::Generated {
                        continue;
                    }
                    if !info.is_accessor {
                        // A later data property wins; hold the slot
                        self.emit_placeholder(obj, &name, &mut info, seen_computed);
                        props.insert(name, info);
                        continue;
                    }
                    let getter = info
                        .getter_index
                        .map(|idx| self.lower_accessor_at(object, idx, &name));
                    let setter = info
                        .setter_index
                        .map(|idx| self.lower_accessor_at(object, idx, &name));
                    let key = self.string_const(&name);
                    self.emit(IrInstr::StoreGetterSetter {
                        object: obj,
                        key,
                        getter,
                        setter,
                        enumerable: true,
                    });
                    info.state = PropState::Generated;
                }
                PropertyKind::Init => {
                    let value = self.lower_property_value(prop, Some(&name));
                    if info.value_index == i {
                        if seen_computed || info.state == PropState::Placeholder {
                            let key = self.string_const(&name);
                            self.emit(IrInstr::StoreOwnProperty {
                                object: obj,
                                key,
                                value,
                                enumerable: true,
                            });
                        } else {
                            self.emit(IrInstr::StoreNewOwnProperty {
                                object: obj,
                                name: name.clone(),
                                value,
                                enumerable: true,
                            });
                        }
                        info.state = PropState::Generated;
                    } else {
                        self.emit_placeholder(obj, &name, &mut info, seen_computed);
                    }
                }
            }
            props.insert(name, info);
        }
        obj
    }

    /// Reserve the slot of a property whose final definition comes later
    fn emit_placeholder(&mut self, obj: Register, name: &str, info: &mut PropInfo, seen_computed: bool) {
        if info.state != PropState::None {
            return;
        }
        let null = self.emit_const(IrConstant::Null);
        if seen_computed {
            let key = self.string_const(name);
            self.emit(IrInstr::StoreOwnProperty {
                object: obj,
                key,
                value: null,
                enumerable: true,
            });
        } else {
            self.emit(IrInstr::StoreNewOwnProperty {
                object: obj,
                name: name.to_string(),
                value: null,
                enumerable: true,
            });
        }
        info.state = PropState::Placeholder;
    }

    fn lower_accessor_at(&mut self, object: &ObjectExpression, index: usize, name: &str) -> Register {
        match &object.properties[index] {
            ObjectMember::Property(prop) => self.lower_property_value(prop, Some(name)),
            ObjectMember::Spread(_) => unreachable!("accessor index points at a spread"),
        }
    }

    fn lower_property_value(&mut self, prop: &Property, name: Option<&str>) -> Register {
        self.lower_named_value(&prop.value, name)
    }

    /// Objects made only of distinct constant data properties come straight
    /// from a literal buffer; the runtime caches their shape per site
    fn try_object_literal_buffer(
        &mut self,
        object: &ObjectExpression,
        props: &FxHashMap<String, PropInfo>,
        has_proto: bool,
    ) -> Option<Register> {
        if has_proto || object.properties.is_empty() || props.len() != object.properties.len() {
            return None;
        }
        let mut properties = Vec::with_capacity(props.len());
        for member in &object.properties {
            let ObjectMember::Property(prop) = member else {
                return None;
            };
            let Expression::Literal(lit) = &prop.value else {
                return None;
            };
            if prop.kind != PropertyKind::Init {
                return None;
            }
            properties.push((prop.key.static_name()?, literal_constant(&lit.value)));
        }
        let site = self.module.alloc_literal_site();
        let dest = self.alloc_register(IrType::OBJECT);
        self.emit(IrInstr::AllocObjectLiteral {
            dest,
            site,
            properties,
        });
        Some(dest)
    }

    // ========================================================================
    // Templates
    // ========================================================================

    pub(super) fn lower_template(&mut self, template: &TemplateLiteral) -> Register {
        let cooked = |i: usize| {
            template.quasis[i]
                .cooked
                .clone()
                .unwrap_or_else(|| template.quasis[i].raw.clone())
        };
        if template.quasis.len() <= 1 {
            let text = if template.quasis.is_empty() { String::new() } else { cooked(0) };
            return self.string_const(&text);
        }

        let mut args = vec![self.string_const(&cooked(0))];
        for (i, expr) in template.expressions.iter().enumerate() {
            args.push(self.lower_expr(expr));
            let text = cooked(i + 1);
            if !text.is_empty() {
                args.push(self.string_const(&text));
            }
        }
        let dest = self.alloc_register(IrType::STRING);
        self.emit(IrInstr::CallBuiltin {
            dest,
            builtin: BuiltinMethod::Concat,
            args,
        });
        dest
    }

    pub(super) fn lower_tagged_template(&mut self, tagged: &TaggedTemplateExpression) -> Register {
        let quasis = &tagged.quasi.quasis;
        let site = self.module.alloc_literal_site();
        // Cooked strings are only passed when some differ from the raw ones
        let same_cooked = quasis.iter().all(|q| q.cooked.as_deref() == Some(q.raw.as_str()));

        let mut args = vec![
            self.number_const(site as f64),
            self.emit_const(IrConstant::Bool(same_cooked)),
        ];
        for q in quasis {
            args.push(self.string_const(&q.raw));
        }
        if !same_cooked {
            for q in quasis {
                let value = match &q.cooked {
                    Some(text) => self.string_const(text),
                    None => self.undefined(),
                };
                args.push(value);
            }
        }
        let template_object = self.alloc_register(IrType::OBJECT);
        self.emit(IrInstr::CallBuiltin {
            dest: template_object,
            builtin: BuiltinMethod::GetTemplateObject,
            args,
        });

        let (callee, this) = match &*tagged.tag {
            Expression::Member(member) => {
                let (object, value) = self.lower_member_link(member, None);
                (value, object)
            }
            tag => {
                let callee = self.lower_expr(tag);
                (callee, self.undefined())
            }
        };

        let mut call_args = vec![template_object];
        for expr in &tagged.quasi.expressions {
            call_args.push(self.lower_expr(expr));
        }
        let dest = self.alloc_register(IrType::ANY.without_empty());
        self.emit(IrInstr::Call {
            dest,
            callee,
            this,
            args: call_args,
            target: None,
        });
        dest
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{instrs, lower, lower_with};
    use crate::ast::{AstBuilder, FlowContext, SemanticContext, StaticType};
    use crate::compiler::diagnostics::codes;
    use crate::compiler::ir::{BuiltinMethod, IrConstant, IrInstr, PrettyPrint, PropKey};

    #[test]
    fn test_constant_array_uses_literal_buffer() {
        let b = AstBuilder::new();
        let e = b.array(vec![Some(b.num(1.0)), Some(b.str("a")), Some(b.bool(true))]);
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        let all = instrs(&module.functions[0]);
        let alloc = all
            .iter()
            .find_map(|i| match i {
                IrInstr::AllocArray { elements, min_size, .. } => Some((elements.clone(), *min_size)),
                _ => None,
            })
            .unwrap();
        assert_eq!(alloc.0.len(), 3);
        assert_eq!(alloc.1, 3);
        assert!(!all.iter().any(|i| matches!(i, IrInstr::StoreOwnProperty { .. })));
    }

    #[test]
    fn test_array_stores_after_first_non_literal() {
        let b = AstBuilder::new();
        let e = b.array(vec![Some(b.num(1.0)), Some(b.ident("x")), Some(b.num(3.0)), None]);
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        let all = instrs(&module.functions[0]);
        let (elements, min_size) = all
            .iter()
            .find_map(|i| match i {
                IrInstr::AllocArray { elements, min_size, .. } => Some((elements.clone(), *min_size)),
                _ => None,
            })
            .unwrap();
        assert_eq!(elements, vec![IrConstant::Number(1.0)]);
        assert_eq!(min_size, 4);
        assert_eq!(
            all.iter().filter(|i| matches!(i, IrInstr::StoreOwnProperty { .. })).count(),
            2
        );
        // Trailing hole sets the length explicitly
        assert!(all.iter().any(|i| matches!(
            i,
            IrInstr::StoreProperty { key: PropKey::Named(n), .. } if n == "length"
        )));
    }

    #[test]
    fn test_array_with_spread_tracks_index_on_stack() {
        let b = AstBuilder::new();
        let e = b.array(vec![Some(b.num(1.0)), Some(b.spread(b.ident("xs"))), Some(b.num(2.0))]);
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        let all = instrs(&module.functions[0]);
        assert!(all.iter().any(|i| matches!(i, IrInstr::AllocStack { .. })));
        let min = all
            .iter()
            .find_map(|i| match i {
                IrInstr::AllocArray { min_size, .. } => Some(*min_size),
                _ => None,
            })
            .unwrap();
        assert_eq!(min, 2);
        assert!(all.iter().any(|i| matches!(
            i,
            IrInstr::CallBuiltin {
                builtin: BuiltinMethod::ArraySpread,
                ..
            }
        )));
        assert!(module.validate().is_ok(), "{}", module.pretty_print());
    }

    #[test]
    fn test_fast_array_literal() {
        let b = AstBuilder::new();
        let e = b.array(vec![Some(b.num(1.0)), Some(b.spread(b.ident("ys")))]);
        let mut flow = FlowContext::new();
        flow.set_type(e.node_id(), StaticType::FastArray);
        let (module, errors) = lower_with(&b.program(vec![b.expr_stmt(e)]), &SemanticContext::new(), &flow);
        let all = instrs(&module.functions[0]);
        assert!(all
            .iter()
            .any(|i| matches!(i, IrInstr::AllocFastArray { capacity: 2, .. })));
        assert_eq!(errors.diagnostics()[0].code(), Some(codes::TYPED_ARRAY_SPREAD));
        assert_eq!(
            errors.diagnostics()[0].message(),
            "spread of non-array is not supported in typed arrays"
        );
    }

    #[test]
    fn test_constant_object_uses_literal_buffer() {
        let b = AstBuilder::new();
        let e = b.object(vec![b.prop("a", b.num(1.0)), b.prop("b", b.str("x"))]);
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        assert!(instrs(&module.functions[0]).iter().any(|i| matches!(
            i,
            IrInstr::AllocObjectLiteral { properties, .. } if properties.len() == 2
        )));
        assert_eq!(module.literal_site_count(), 1);
    }

    #[test]
    fn test_duplicate_property_only_last_is_stored() {
        let b = AstBuilder::new();
        let e = b.object(vec![
            b.prop("a", b.ident("x")),
            b.prop("b", b.ident("y")),
            b.prop("a", b.ident("z")),
        ]);
        let (module, errors) = lower(&b.program(vec![b.expr_stmt(e)]));
        assert_eq!(errors.warning_count(), 1);
        let warning = &errors.diagnostics()[0];
        assert_eq!(
            warning.message(),
            "the property \"a\" was set multiple times in the object definition."
        );
        assert_eq!(warning.secondary_messages(), vec!["The first definition was here."]);

        let all = instrs(&module.functions[0]);
        let alloc_size = all
            .iter()
            .find_map(|i| match i {
                IrInstr::AllocObject { size, .. } => Some(*size),
                _ => None,
            })
            .unwrap();
        assert_eq!(alloc_size, 2);
        // x is still evaluated, and the first `a` only reserves a null slot
        assert!(all
            .iter()
            .any(|i| matches!(i, IrInstr::LoadGlobal { name, .. } if name == "x")));
        let stores: Vec<String> = all
            .iter()
            .filter_map(|i| match i {
                IrInstr::StoreNewOwnProperty { name, .. } => Some(format!("new {}", name)),
                IrInstr::StoreOwnProperty { .. } => Some("own".to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(stores, vec!["new a", "new b", "own"]);
    }

    #[test]
    fn test_duplicate_proto_is_an_error() {
        let b = AstBuilder::new();
        let e = b.object(vec![
            b.prop("__proto__", b.null()),
            b.prop("__proto__", b.null()),
        ]);
        let (_, errors) = lower(&b.program(vec![b.expr_stmt(e)]));
        assert_eq!(errors.error_count(), 1);
        assert_eq!(
            errors.diagnostics()[0].message(),
            "__proto__ was set multiple times in the object definition."
        );
        assert_eq!(errors.diagnostics()[0].code(), Some(codes::DUPLICATE_PROTO));
    }

    #[test]
    fn test_proto_first_becomes_parent() {
        let b = AstBuilder::new();
        let e = b.object(vec![b.prop("__proto__", b.ident("base")), b.prop("x", b.ident("v"))]);
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        let all = instrs(&module.functions[0]);
        assert!(all
            .iter()
            .any(|i| matches!(i, IrInstr::AllocObject { parent: Some(_), size: 1, .. })));
        assert!(!all.iter().any(|i| matches!(
            i,
            IrInstr::CallBuiltin {
                builtin: BuiltinMethod::SilentSetPrototypeOf,
                ..
            }
        )));
    }

    #[test]
    fn test_late_proto_uses_silent_set() {
        let b = AstBuilder::new();
        let e = b.object(vec![b.prop("x", b.ident("v")), b.prop("__proto__", b.ident("base"))]);
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        assert!(instrs(&module.functions[0]).iter().any(|i| matches!(
            i,
            IrInstr::CallBuiltin {
                builtin: BuiltinMethod::SilentSetPrototypeOf,
                ..
            }
        )));
    }

    #[test]
    fn test_accessor_pair_is_stored_once() {
        let b = AstBuilder::new();
        let e = b.object(vec![
            b.getter("v", b.function(None, &[], vec![b.ret(Some(b.num(1.0)))])),
            b.setter("v", b.function(None, &["x"], vec![])),
        ]);
        let (module, errors) = lower(&b.program(vec![b.expr_stmt(e)]));
        assert!(!errors.has_errors());
        let all = instrs(&module.functions[0]);
        let pairs: Vec<_> = all
            .iter()
            .filter_map(|i| match i {
                IrInstr::StoreGetterSetter { getter, setter, .. } => Some((getter.is_some(), setter.is_some())),
                _ => None,
            })
            .collect();
        assert_eq!(pairs, vec![(true, true)]);
        assert_eq!(module.function_count(), 3);
        assert!(module.get_function_by_name("v").is_some());
    }

    #[test]
    fn test_computed_and_spread_switch_to_store_own() {
        let b = AstBuilder::new();
        let e = b.object(vec![
            b.object_spread(b.ident("rest")),
            b.computed_prop(b.ident("k"), b.num(1.0)),
            b.prop("a", b.ident("x")),
        ]);
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        let all = instrs(&module.functions[0]);
        assert!(all.iter().any(|i| matches!(
            i,
            IrInstr::CallBuiltin {
                builtin: BuiltinMethod::CopyDataProperties,
                ..
            }
        )));
        assert!(!all.iter().any(|i| matches!(i, IrInstr::StoreNewOwnProperty { .. })));
        assert_eq!(
            all.iter().filter(|i| matches!(i, IrInstr::StoreOwnProperty { .. })).count(),
            2
        );
    }

    #[test]
    fn test_template_concat_skips_empty_quasis() {
        let b = AstBuilder::new();
        let e = b.template_expr(&["a", ""], vec![b.ident("x")]);
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        let args = instrs(&module.functions[0])
            .into_iter()
            .find_map(|i| match i {
                IrInstr::CallBuiltin {
                    builtin: BuiltinMethod::Concat,
                    args,
                    ..
                } => Some(args),
                _ => None,
            })
            .unwrap();
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_single_quasi_template_is_constant() {
        let b = AstBuilder::new();
        let e = b.template_expr(&["plain"], vec![]);
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        let all = instrs(&module.functions[0]);
        assert!(all.iter().any(|i| matches!(
            i,
            IrInstr::Const { value: IrConstant::String(s), .. } if s == "plain"
        )));
        assert!(!all.iter().any(|i| matches!(i, IrInstr::CallBuiltin { .. })));
    }

    #[test]
    fn test_tagged_template() {
        let b = AstBuilder::new();
        let e = b.tagged(b.member(b.ident("o"), "tag"), &["a", "b"], vec![b.ident("x")]);
        let (module, _) = lower(&b.program(vec![b.expr_stmt(e)]));
        let all = instrs(&module.functions[0]);
        let template_args = all
            .iter()
            .find_map(|i| match i {
                IrInstr::CallBuiltin {
                    builtin: BuiltinMethod::GetTemplateObject,
                    args,
                    ..
                } => Some(args.len()),
                _ => None,
            })
            .unwrap();
        // site, dup flag, two raw strings
        assert_eq!(template_args, 4);
        let call_args = all
            .iter()
            .find_map(|i| match i {
                IrInstr::Call { args, .. } => Some(args.len()),
                _ => None,
            })
            .unwrap();
        assert_eq!(call_args, 2);
    }
}
