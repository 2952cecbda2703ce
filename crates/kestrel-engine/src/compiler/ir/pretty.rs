//! Pretty-printing for IR
//!
//! Provides human-readable output for debugging IR structures.

use super::block::BasicBlock;
use super::function::IrFunction;
use super::instr::IrInstr;
use super::module::IrModule;
use super::value::Register;
use std::fmt::Write;

/// Trait for pretty-printing IR constructs
pub trait PrettyPrint {
    fn pretty_print(&self) -> String;
}

impl PrettyPrint for IrModule {
    fn pretty_print(&self) -> String {
        let mut output = String::new();
        writeln!(output, "; module {}", self.name).unwrap();
        writeln!(output).unwrap();

        for (i, func) in self.functions.iter().enumerate() {
            writeln!(output, "; fn{}", i).unwrap();
            output.push_str(&func.pretty_print());
            writeln!(output).unwrap();
        }

        output
    }
}

impl PrettyPrint for IrFunction {
    fn pretty_print(&self) -> String {
        let mut output = String::new();

        let mut flags = Vec::new();
        if self.is_generator {
            flags.push("generator");
        }
        if self.strict {
            flags.push("strict");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        writeln!(
            output,
            "fn {}(params: {}){} {{",
            self.name, self.param_count, flags
        )
        .unwrap();

        if self.stack_slot_count() > 0 || self.frame_var_count() > 0 {
            writeln!(
                output,
                "  ; stack slots: {}, frame vars: {}",
                self.stack_slot_count(),
                self.frame_var_count()
            )
            .unwrap();
        }

        for block in &self.blocks {
            output.push_str(&block.pretty_print());
        }

        writeln!(output, "}}").unwrap();
        output
    }
}

impl PrettyPrint for BasicBlock {
    fn pretty_print(&self) -> String {
        let mut output = String::new();

        if let Some(label) = &self.label {
            writeln!(output, "  {}: ; {}", self.id, label).unwrap();
        } else {
            writeln!(output, "  {}:", self.id).unwrap();
        }

        for instr in &self.instructions {
            writeln!(output, "    {}", format_instr(instr)).unwrap();
        }

        writeln!(output, "    {}", self.terminator).unwrap();
        output
    }
}

fn join_regs(regs: &[Register]) -> String {
    regs.iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn typed(reg: &Register) -> String {
    format!("{}:{}", reg, reg.ty)
}

/// Render one instruction
pub fn format_instr(instr: &IrInstr) -> String {
    match instr {
        IrInstr::Const { dest, value } => format!("{} = const {}", typed(dest), value),
        IrInstr::Move { dest, src } => format!("{} = {}", typed(dest), src),
        IrInstr::LoadParam { dest, index } => format!("{} = param {}", typed(dest), index),
        IrInstr::BinaryOp {
            dest,
            op,
            left,
            right,
        } => format!("{} = {} {} {}", typed(dest), left, op, right),
        IrInstr::UnaryOp { dest, op, operand } => format!("{} = {}{}", typed(dest), op, operand),
        IrInstr::AsNumeric { dest, value } => format!("{} = as_numeric {}", typed(dest), value),
        IrInstr::Phi { dest, sources } => {
            let parts: Vec<String> = sources
                .iter()
                .map(|(block, reg)| format!("[{}, {}]", block, reg))
                .collect();
            format!("{} = phi {}", typed(dest), parts.join(" "))
        }
        IrInstr::AllocStack { slot } => format!("alloc_stack {}", slot),
        IrInstr::LoadStack { dest, slot } => format!("{} = load_stack {}", typed(dest), slot),
        IrInstr::StoreStack { slot, value } => format!("store_stack {}, {}", slot, value),
        IrInstr::LoadFrame { dest, var } => format!("{} = load_frame {}", typed(dest), var),
        IrInstr::StoreFrame { var, value } => format!("store_frame {}, {}", var, value),
        IrInstr::LoadGlobal { dest, name } => format!("{} = load_global {}", typed(dest), name),
        IrInstr::StoreGlobal { name, value } => format!("store_global {}, {}", name, value),
        IrInstr::ThrowIfEmpty { dest, value } => {
            format!("{} = throw_if_empty {}", typed(dest), value)
        }
        IrInstr::CreateFunction { dest, function } => {
            format!("{} = create_function {}", typed(dest), function)
        }
        IrInstr::CreateArguments { dest } => format!("{} = create_arguments", typed(dest)),
        IrInstr::AllocObject { dest, size, parent } => match parent {
            Some(p) => format!("{} = alloc_object {}, parent {}", typed(dest), size, p),
            None => format!("{} = alloc_object {}", typed(dest), size),
        },
        IrInstr::AllocObjectLiteral {
            dest,
            site,
            properties,
        } => {
            let props: Vec<String> = properties
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect();
            format!(
                "{} = alloc_object_literal #{} {{{}}}",
                typed(dest),
                site,
                props.join(", ")
            )
        }
        IrInstr::AllocArray {
            dest,
            elements,
            min_size,
        } => {
            let elems: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
            format!(
                "{} = alloc_array [{}], min {}",
                typed(dest),
                elems.join(", "),
                min_size
            )
        }
        IrInstr::StoreOwnProperty {
            object,
            key,
            value,
            enumerable,
        } => format!(
            "store_own {}[{}] = {}{}",
            object,
            key,
            value,
            if *enumerable { "" } else { " (hidden)" }
        ),
        IrInstr::StoreNewOwnProperty {
            object,
            name,
            value,
            enumerable,
        } => format!(
            "store_new_own {}.{} = {}{}",
            object,
            name,
            value,
            if *enumerable { "" } else { " (hidden)" }
        ),
        IrInstr::StoreGetterSetter {
            object,
            key,
            getter,
            setter,
            ..
        } => {
            let show = |r: &Option<Register>| r.map_or("none".to_string(), |r| r.to_string());
            format!(
                "store_getter_setter {}[{}] get {} set {}",
                object,
                key,
                show(getter),
                show(setter)
            )
        }
        IrInstr::LoadProperty { dest, object, key } => {
            format!("{} = load_property {}{}", typed(dest), object, key)
        }
        IrInstr::StoreProperty { object, key, value } => {
            format!("store_property {}{} = {}", object, key, value)
        }
        IrInstr::DeleteProperty { dest, object, key } => {
            format!("{} = delete_property {}{}", typed(dest), object, key)
        }
        IrInstr::Call {
            dest,
            callee,
            this,
            args,
            target,
        } => {
            let target = target.map_or(String::new(), |t| format!(" ; target {}", t));
            format!(
                "{} = call {}(this {}; {}){}",
                typed(dest),
                callee,
                this,
                join_regs(args),
                target
            )
        }
        IrInstr::CallNative { dest, callee, args } => {
            format!("{} = call_native {}({})", typed(dest), callee, join_regs(args))
        }
        IrInstr::CallBuiltin {
            dest,
            builtin,
            args,
        } => format!(
            "{} = call_builtin {}({})",
            typed(dest),
            builtin,
            join_regs(args)
        ),
        IrInstr::GetBuiltinClosure { dest, builtin } => {
            format!("{} = get_builtin_closure {}", typed(dest), builtin)
        }
        IrInstr::DirectEval {
            dest,
            source,
            strict,
        } => format!(
            "{} = direct_eval {}{}",
            typed(dest),
            source,
            if *strict { " strict" } else { "" }
        ),
        IrInstr::CreateThis {
            dest,
            prototype,
            closure,
        } => format!("{} = create_this {}, {}", typed(dest), prototype, closure),
        IrInstr::GetConstructedObject { dest, this, result } => {
            format!("{} = get_constructed_object {}, {}", typed(dest), this, result)
        }
        IrInstr::StartGenerator => "start_generator".to_string(),
        IrInstr::ResumeGenerator { dest, is_return } => {
            format!("{} = resume_generator {}", typed(dest), is_return)
        }
        IrInstr::AllocFastArray { dest, capacity } => {
            format!("{} = alloc_fast_array {}", typed(dest), capacity)
        }
        IrInstr::FastArrayLoad { dest, array, index } => {
            format!("{} = fast_array_load {}[{}]", typed(dest), array, index)
        }
        IrInstr::FastArrayStore {
            array,
            index,
            value,
        } => format!("fast_array_store {}[{}] = {}", array, index, value),
        IrInstr::FastArrayPush { array, value } => {
            format!("fast_array_push {}, {}", array, value)
        }
        IrInstr::FastArrayAppend { array, other } => {
            format!("fast_array_append {}, {}", array, other)
        }
        IrInstr::FastArrayLength { dest, array } => {
            format!("{} = fast_array_length {}", typed(dest), array)
        }
        IrInstr::TryEnd => "try_end".to_string(),
        IrInstr::Catch { dest } => format!("{} = catch", typed(dest)),
    }
}
