//! Convenience builder for constructing function bodies.
//!
//! Wraps a module with a current-block cursor so tests and front ends can
//! build IR without juggling arena indices by hand.

use super::block::BlockId;
use super::function::{FuncId, Function, PipelineStage};
use super::instruction::{
    BinaryOp, BuiltinFn, Case, If, Inst, Intrinsic, Loop, Operand, Switch, Terminator, UnaryOp,
    Var,
};
use super::types::{AddressSpace, TypeId};
use super::{Module, ValueId};

pub struct FunctionBuilder<'a> {
    module: &'a mut Module,
    func: FuncId,
    current: BlockId,
}

impl<'a> FunctionBuilder<'a> {
    /// Start a new function with a fresh entry block.
    pub fn new(
        module: &'a mut Module,
        name: impl Into<String>,
        return_type: TypeId,
        stage: Option<PipelineStage>,
    ) -> Self {
        let block = module.new_block();
        let func = module.add_function(Function {
            name: name.into(),
            params: Vec::new(),
            return_type,
            block,
            stage,
        });
        Self {
            module,
            func,
            current: block,
        }
    }

    pub fn func_id(&self) -> FuncId {
        self.func
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub fn module(&mut self) -> &mut Module {
        self.module
    }

    /// Append a function parameter.
    pub fn param(&mut self, ty: TypeId, name: impl Into<String>) -> Operand {
        let value = self.module.new_named_value(ty, name);
        self.module.functions[self.func.index()].params.push(value);
        Operand::Value(value)
    }

    pub fn create_block(&mut self) -> BlockId {
        self.module.new_block()
    }

    /// Move the cursor to another block.
    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    /// Declare a loop body parameter on a block.
    pub fn block_param(&mut self, block: BlockId, ty: TypeId) -> Operand {
        let value = self.module.new_value(ty);
        self.module.block_mut(block).params.push(value);
        Operand::Value(value)
    }

    pub fn push(&mut self, inst: Inst) {
        let current = self.current;
        self.module.block_mut(current).insts.push(inst);
    }

    fn push_with_result(&mut self, ty: TypeId, make: impl FnOnce(ValueId) -> Inst) -> Operand {
        let result = self.module.new_value(ty);
        let inst = make(result);
        self.push(inst);
        Operand::Value(result)
    }

    pub fn binary(&mut self, op: BinaryOp, ty: TypeId, lhs: Operand, rhs: Operand) -> Operand {
        self.push_with_result(ty, |result| Inst::Binary { op, lhs, rhs, result })
    }

    pub fn unary(&mut self, op: UnaryOp, ty: TypeId, value: Operand) -> Operand {
        self.push_with_result(ty, |result| Inst::Unary { op, value, result })
    }

    pub fn bitcast(&mut self, ty: TypeId, value: Operand) -> Operand {
        self.push_with_result(ty, |result| Inst::Bitcast { value, result })
    }

    pub fn convert(&mut self, ty: TypeId, value: Operand) -> Operand {
        self.push_with_result(ty, |result| Inst::Convert { value, result })
    }

    pub fn construct(&mut self, ty: TypeId, args: Vec<Operand>) -> Operand {
        self.push_with_result(ty, |result| Inst::Construct { args, result })
    }

    pub fn access(&mut self, ty: TypeId, base: Operand, indices: Vec<Operand>) -> Operand {
        self.push_with_result(ty, |result| Inst::Access { base, indices, result })
    }

    pub fn swizzle(&mut self, ty: TypeId, object: Operand, indices: Vec<u32>) -> Operand {
        self.push_with_result(ty, |result| Inst::Swizzle { object, indices, result })
    }

    pub fn load(&mut self, source: Operand) -> Operand {
        let ptr_ty = self.module.operand_type(source);
        let ty = match self.module.types.get(ptr_ty) {
            super::types::Type::Pointer { store, .. } => *store,
            _ => ptr_ty,
        };
        self.push_with_result(ty, |result| Inst::Load { source, result })
    }

    pub fn load_vector_element(&mut self, ty: TypeId, pointer: Operand, index: Operand) -> Operand {
        self.push_with_result(ty, |result| Inst::LoadVectorElement {
            pointer,
            index,
            result,
        })
    }

    pub fn store(&mut self, target: Operand, value: Operand) {
        self.push(Inst::Store { target, value });
    }

    pub fn store_vector_element(&mut self, pointer: Operand, index: Operand, value: Operand) {
        self.push(Inst::StoreVectorElement {
            pointer,
            index,
            value,
        });
    }

    /// Declare a function-scope variable.
    pub fn var(
        &mut self,
        name: impl Into<String>,
        store: TypeId,
        initializer: Option<Operand>,
    ) -> Operand {
        let ptr = self.module.types.pointer(AddressSpace::Function, store);
        let result = self.module.new_named_value(ptr, name);
        self.push(Inst::Var(Var {
            result,
            initializer,
            binding: None,
            io: None,
        }));
        Operand::Value(result)
    }

    pub fn let_(&mut self, name: impl Into<String>, value: Operand) -> Operand {
        let ty = self.module.operand_type(value);
        let result = self.module.new_named_value(ty, name);
        self.push(Inst::Let { value, result });
        Operand::Value(result)
    }

    pub fn call(&mut self, ty: TypeId, callee: FuncId, args: Vec<Operand>) -> Operand {
        self.push_with_result(ty, |result| Inst::Call { callee, args, result })
    }

    pub fn builtin(&mut self, ty: TypeId, func: BuiltinFn, args: Vec<Operand>) -> Operand {
        self.push_with_result(ty, |result| Inst::Builtin { func, args, result })
    }

    pub fn intrinsic(
        &mut self,
        ty: Option<TypeId>,
        op: Intrinsic,
        args: Vec<Operand>,
    ) -> Option<Operand> {
        match ty {
            Some(ty) => Some(self.push_with_result(ty, |result| Inst::Intrinsic {
                op,
                args,
                result: Some(result),
            })),
            None => {
                self.push(Inst::Intrinsic {
                    op,
                    args,
                    result: None,
                });
                None
            }
        }
    }

    /// Push an `If` construct with fresh result values of the given types.
    pub fn if_(
        &mut self,
        condition: Operand,
        true_block: BlockId,
        false_block: BlockId,
        result_types: &[TypeId],
    ) -> Vec<Operand> {
        let results: Vec<ValueId> = result_types
            .iter()
            .map(|&ty| self.module.new_value(ty))
            .collect();
        let out = results.iter().map(|&v| Operand::Value(v)).collect();
        self.push(Inst::If(If {
            condition,
            true_block,
            false_block,
            results,
        }));
        out
    }

    /// Push a `Loop` construct with fresh result values of the given types.
    pub fn loop_(
        &mut self,
        initializer: Option<BlockId>,
        body: BlockId,
        continuing: BlockId,
        result_types: &[TypeId],
    ) -> Vec<Operand> {
        let results: Vec<ValueId> = result_types
            .iter()
            .map(|&ty| self.module.new_value(ty))
            .collect();
        let out = results.iter().map(|&v| Operand::Value(v)).collect();
        self.push(Inst::Loop(Loop {
            initializer,
            body,
            continuing,
            results,
        }));
        out
    }

    /// Push a `Switch` construct with fresh result values of the given types.
    pub fn switch_(
        &mut self,
        condition: Operand,
        cases: Vec<Case>,
        result_types: &[TypeId],
    ) -> Vec<Operand> {
        let results: Vec<ValueId> = result_types
            .iter()
            .map(|&ty| self.module.new_value(ty))
            .collect();
        let out = results.iter().map(|&v| Operand::Value(v)).collect();
        self.push(Inst::Switch(Switch {
            condition,
            cases,
            results,
        }));
        out
    }

    /// Set the current block's terminator.
    pub fn terminate(&mut self, terminator: Terminator) {
        let current = self.current;
        self.module.block_mut(current).terminator = Some(terminator);
    }

    pub fn ret(&mut self) {
        self.terminate(Terminator::Return { value: None });
    }

    pub fn ret_value(&mut self, value: Operand) {
        self.terminate(Terminator::Return { value: Some(value) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_trivial_function() {
        let mut module = Module::new();
        let void = module.types.void();
        let mut b = FunctionBuilder::new(&mut module, "main", void, None);
        b.ret();

        let func = module.function(FuncId(0));
        assert_eq!(func.name, "main");
        let block = module.block(func.block);
        assert!(matches!(
            block.terminator,
            Some(Terminator::Return { value: None })
        ));
    }

    #[test]
    fn if_allocates_results() {
        let mut module = Module::new();
        let void = module.types.void();
        let f32 = module.types.f32();
        let cond = module.const_bool(true);
        let mut b = FunctionBuilder::new(&mut module, "f", void, None);
        let t = b.create_block();
        let f = b.create_block();
        let results = b.if_(cond, t, f, &[f32]);
        assert_eq!(results.len(), 1);
        let Operand::Value(v) = results[0] else {
            panic!("expected a value result");
        };
        assert_eq!(module.value(v).ty, f32);
    }

    #[test]
    fn load_infers_store_type() {
        let mut module = Module::new();
        let void = module.types.void();
        let f32 = module.types.f32();
        let mut b = FunctionBuilder::new(&mut module, "f", void, None);
        let v = b.var("x", f32, None);
        let loaded = b.load(v);
        let Operand::Value(val) = loaded else {
            panic!("expected a value result");
        };
        assert_eq!(module.value(val).ty, f32);
    }
}
