//! The SIR intermediate representation.
//!
//! A [`Module`] owns arenas for types, constants, values, blocks and
//! functions; everything else refers into them by plain index ids. The
//! module root block holds module-scope variable declarations only.

pub mod block;
pub mod builder;
pub mod constant;
pub mod function;
pub mod instruction;
pub mod types;

use serde::{Deserialize, Serialize};

pub use block::{Block, BlockId};
pub use builder::FunctionBuilder;
pub use constant::{ConstData, ConstId, ConstRegistry, Constant};
pub use function::{FuncId, Function, PipelineStage};
pub use instruction::{
    BindingPoint, BinaryOp, BuiltinFn, Case, CaseSelector, If, Inst, Intrinsic, IoAttributes,
    Loop, Operand, Switch, Terminator, UnaryOp, Var,
};
pub use types::{
    Access, AddressSpace, ArrayCount, BuiltinValue, Interpolation, InterpolationSampling,
    InterpolationType, ScalarKind, StructMember, StructType, TexelFormat, TextureDimension, Type,
    TypeId, TypeRegistry,
};

/// Index of a runtime value in the module value arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Type and optional debug name of a runtime value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueData {
    pub ty: TypeId,
    pub name: Option<String>,
}

/// A SIR module.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub types: TypeRegistry,
    pub constants: ConstRegistry,
    pub values: Vec<ValueData>,
    pub blocks: Vec<Block>,
    pub functions: Vec<Function>,
    /// Holds module-scope `Var` instructions.
    pub root_block: BlockId,
}

impl Module {
    pub fn new() -> Self {
        let mut module = Self::default();
        module.root_block = module.new_block();
        module
    }

    /// Allocate a fresh runtime value of the given type.
    pub fn new_value(&mut self, ty: TypeId) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData { ty, name: None });
        id
    }

    /// Allocate a fresh named runtime value.
    pub fn new_named_value(&mut self, ty: TypeId, name: impl Into<String>) -> ValueId {
        let id = self.new_value(ty);
        self.values[id.index()].name = Some(name.into());
        id
    }

    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.index()]
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new());
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn add_function(&mut self, function: Function) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    /// Type of an operand.
    pub fn operand_type(&self, operand: Operand) -> TypeId {
        match operand {
            Operand::Const(c) => self.constants.get(c).ty,
            Operand::Value(v) => self.value(v).ty,
        }
    }

    pub fn const_bool(&mut self, value: bool) -> Operand {
        Operand::Const(self.constants.bool_(&mut self.types, value))
    }

    pub fn const_i32(&mut self, value: i32) -> Operand {
        Operand::Const(self.constants.i32_(&mut self.types, value))
    }

    pub fn const_u32(&mut self, value: u32) -> Operand {
        Operand::Const(self.constants.u32_(&mut self.types, value))
    }

    pub fn const_f32(&mut self, value: f32) -> Operand {
        Operand::Const(self.constants.f32_(&mut self.types, value))
    }

    /// Declare a module-scope variable in the root block.
    pub fn global_var(
        &mut self,
        name: impl Into<String>,
        space: AddressSpace,
        store: TypeId,
        binding: Option<BindingPoint>,
    ) -> ValueId {
        let ptr = self.types.pointer(space, store);
        let result = self.new_named_value(ptr, name);
        let root = self.root_block;
        self.block_mut(root).insts.push(Inst::Var(Var {
            result,
            initializer: None,
            binding,
            io: None,
        }));
        result
    }

    /// Declare a stage input or output variable in the root block.
    pub fn io_var(
        &mut self,
        name: impl Into<String>,
        space: AddressSpace,
        store: TypeId,
        io: IoAttributes,
    ) -> ValueId {
        let ptr = self.types.pointer(space, store);
        let result = self.new_named_value(ptr, name);
        let root = self.root_block;
        self.block_mut(root).insts.push(Inst::Var(Var {
            result,
            initializer: None,
            binding: None,
            io: Some(io),
        }));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_module_has_root_block() {
        let m = Module::new();
        assert_eq!(m.blocks.len(), 1);
        assert!(m.block(m.root_block).is_empty());
    }

    #[test]
    fn global_var_lands_in_root_block() {
        let mut m = Module::new();
        let f32 = m.types.f32();
        let v = m.global_var("g", AddressSpace::Private, f32, None);
        let root = m.block(m.root_block);
        assert_eq!(root.insts.len(), 1);
        assert!(matches!(&root.insts[0], Inst::Var(var) if var.result == v));
        assert!(m.types.is_pointer(m.value(v).ty));
        assert_eq!(m.value(v).name.as_deref(), Some("g"));
    }

    #[test]
    fn operand_types() {
        let mut m = Module::new();
        let c = m.const_f32(1.0);
        let f32 = m.types.f32();
        assert_eq!(m.operand_type(c), f32);
        let v = m.new_value(f32);
        assert_eq!(m.operand_type(Operand::Value(v)), f32);
    }
}
