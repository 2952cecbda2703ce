//! IR Module
//!
//! Top-level container for a compiled program: the top-level function plus
//! every nested function, addressed by `FunctionId`.

use super::function::IrFunction;
use super::instr::FunctionId;
use super::value::FrameVarId;
use rustc_hash::FxHashMap;

/// An IR module (compilation unit)
#[derive(Debug, Clone)]
pub struct IrModule {
    /// Module name
    pub name: String,
    /// Functions in this module; the top-level function comes first
    pub functions: Vec<IrFunction>,
    /// Function lookup by name
    function_map: FxHashMap<String, FunctionId>,
    /// Number of literal allocation sites handed out so far
    literal_sites: u32,
    /// Owning function of each frame variable, indexed by id
    frame_var_owners: Vec<FunctionId>,
}

impl IrModule {
    /// Create a new empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            function_map: FxHashMap::default(),
            literal_sites: 0,
            frame_var_owners: Vec::new(),
        }
    }

    /// Reserve a function id before its body is lowered
    pub fn reserve_function(&mut self, name: impl Into<String>, param_count: u32) -> FunctionId {
        self.add_function(IrFunction::new(name, param_count))
    }

    /// Add a function to the module
    pub fn add_function(&mut self, func: IrFunction) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.function_map.entry(func.name.clone()).or_insert(id);
        self.functions.push(func);
        id
    }

    /// Replace the body of a reserved function
    pub fn set_function(&mut self, id: FunctionId, func: IrFunction) {
        self.functions[id.0 as usize] = func;
    }

    pub fn get_function(&self, id: FunctionId) -> Option<&IrFunction> {
        self.functions.get(id.0 as usize)
    }

    pub fn get_function_mut(&mut self, id: FunctionId) -> Option<&mut IrFunction> {
        self.functions.get_mut(id.0 as usize)
    }

    /// Get a function by name (the first function registered under it)
    pub fn get_function_by_name(&self, name: &str) -> Option<&IrFunction> {
        self.function_map
            .get(name)
            .and_then(|&id| self.get_function(id))
    }

    pub fn get_function_id(&self, name: &str) -> Option<FunctionId> {
        self.function_map.get(name).copied()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn functions(&self) -> impl Iterator<Item = &IrFunction> {
        self.functions.iter()
    }

    /// Allocate a new literal site id (keys the runtime shape cache)
    pub fn alloc_literal_site(&mut self) -> u32 {
        let site = self.literal_sites;
        self.literal_sites += 1;
        site
    }

    pub fn literal_site_count(&self) -> u32 {
        self.literal_sites
    }

    /// Allocate a frame variable living in the frame of `owner`
    ///
    /// Ids are unique across the module so closures can name variables of
    /// their enclosing functions directly.
    pub fn alloc_frame_var(&mut self, owner: FunctionId) -> FrameVarId {
        let var = FrameVarId(self.frame_var_owners.len() as u32);
        self.frame_var_owners.push(owner);
        var
    }

    pub fn frame_var_owner(&self, var: FrameVarId) -> Option<FunctionId> {
        self.frame_var_owners.get(var.0 as usize).copied()
    }

    pub fn frame_var_count(&self) -> u32 {
        self.frame_var_owners.len() as u32
    }

    /// Validate the entire module
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (i, func) in self.functions.iter().enumerate() {
            if let Err(e) = func.validate() {
                errors.push(format!("Function '{}' ({}): {}", func.name, i, e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get total instruction count across all functions
    pub fn total_instruction_count(&self) -> usize {
        self.functions.iter().map(|f| f.instruction_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::block::{BasicBlock, BasicBlockId, Terminator};
    use crate::compiler::ir::instr::IrInstr;
    use crate::compiler::ir::types::IrType;
    use crate::compiler::ir::value::IrConstant;

    fn make_simple_function(name: &str) -> IrFunction {
        let mut func = IrFunction::new(name, 0);
        let reg = func.alloc_register(IrType::UNDEFINED);
        let mut block = BasicBlock::new(BasicBlockId(0));
        block.add_instr(IrInstr::Const {
            dest: reg,
            value: IrConstant::Undefined,
        });
        block.set_terminator(Terminator::Return(reg));
        func.add_block(block);
        func
    }

    #[test]
    fn test_module_add_function() {
        let mut module = IrModule::new("test");
        let id = module.add_function(make_simple_function("foo"));

        assert_eq!(id, FunctionId(0));
        assert_eq!(module.function_count(), 1);
        assert!(module.get_function_by_name("foo").is_some());
    }

    #[test]
    fn test_reserve_then_set() {
        let mut module = IrModule::new("test");
        let id = module.reserve_function("later", 2);
        assert!(module.validate().is_err());
        module.set_function(id, make_simple_function("later"));
        assert!(module.validate().is_ok());
    }

    #[test]
    fn test_frame_vars_are_module_wide() {
        let mut module = IrModule::new("test");
        let outer = module.reserve_function("outer", 0);
        let inner = module.reserve_function("inner", 0);
        let a = module.alloc_frame_var(outer);
        let b = module.alloc_frame_var(inner);
        assert_ne!(a, b);
        assert_eq!(module.frame_var_owner(a), Some(outer));
        assert_eq!(module.frame_var_owner(b), Some(inner));
        assert_eq!(module.frame_var_count(), 2);
    }

    #[test]
    fn test_literal_sites_are_unique() {
        let mut module = IrModule::new("test");
        assert_eq!(module.alloc_literal_site(), 0);
        assert_eq!(module.alloc_literal_site(), 1);
        assert_eq!(module.literal_site_count(), 2);
    }
}
