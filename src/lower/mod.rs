//! Lowering from SIR to a flat SPIR-V module.
//!
//! The [`Generator`] walks the input module and appends instructions to the
//! section buffers of a [`spirv::Module`]; `spirv::BinaryWriter` then
//! serializes the result. The input module is never mutated: type and
//! constant canonicalization happens in generator-local scratch registries.
//!
//! Malformed input is rejected up front by [`crate::validate`]; anything that
//! still goes wrong during emission is an internal error and panics through
//! `ice!`.

pub mod control;
pub mod inst;
pub mod intrinsics;
pub mod types;

use anyhow::Result;
use indexmap::{IndexMap, IndexSet};
use log::debug;

use crate::ice;
use crate::ir::{
    self, AddressSpace, BlockId, BuiltinValue, ConstId, FuncId, Inst, IoAttributes,
    PipelineStage, Terminator, Type, TypeId, ValueId,
};
use crate::spirv::opcodes::{ExecutionMode, ExecutionModel, Op};
use crate::spirv::{self, BinaryWriter, Operand as SpvOperand};
use crate::validate;

use control::ControlFrame;

/// Code generation options.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Zero-initialize workgroup memory at declaration.
    pub zero_init_workgroup_memory: bool,
}

/// Lower a SIR module to a SPIR-V word stream.
pub fn generate(ir: &ir::Module, options: &Options) -> Result<Vec<u32>> {
    validate::validate(ir)?;
    let mut generator = Generator::new(ir, options);
    generator.run();
    debug!(
        "lowered {} functions, id bound {}",
        ir.functions.len(),
        generator.module.id_bound()
    );
    Ok(BinaryWriter::new().write(&generator.module))
}

pub(crate) struct Generator<'a> {
    ir: &'a ir::Module,
    options: &'a Options,
    /// Scratch registries for canonicalized types and synthesized constants.
    /// Cloned from the input so existing ids stay valid.
    types: ir::TypeRegistry,
    consts: ir::ConstRegistry,
    module: spirv::Module,

    type_ids: IndexMap<TypeId, u32>,
    const_ids: IndexMap<ConstId, u32>,
    null_ids: IndexMap<TypeId, u32>,
    undef_ids: IndexMap<TypeId, u32>,
    value_ids: IndexMap<ValueId, u32>,
    block_labels: IndexMap<BlockId, u32>,
    /// Merge labels of control constructs, keyed by (block, inst index).
    merge_labels: IndexMap<(BlockId, usize), u32>,
    function_ids: IndexMap<FuncId, u32>,
    function_types: IndexMap<(u32, Vec<u32>), u32>,
    glsl_import: Option<u32>,

    current: spirv::Function,
    frames: Vec<ControlFrame>,
}

impl<'a> Generator<'a> {
    fn new(ir: &'a ir::Module, options: &'a Options) -> Self {
        Self {
            ir,
            options,
            types: ir.types.clone(),
            consts: ir.constants.clone(),
            module: spirv::Module::new(),
            type_ids: IndexMap::new(),
            const_ids: IndexMap::new(),
            null_ids: IndexMap::new(),
            undef_ids: IndexMap::new(),
            value_ids: IndexMap::new(),
            block_labels: IndexMap::new(),
            merge_labels: IndexMap::new(),
            function_ids: IndexMap::new(),
            function_types: IndexMap::new(),
            glsl_import: None,
            current: spirv::Function::default(),
            frames: Vec::new(),
        }
    }

    fn run(&mut self) {
        self.module
            .push_capability(crate::spirv::opcodes::Capability::Shader);
        // Logical addressing, GLSL450 memory model.
        self.module.set_memory_model(0, 1);

        // Functions may call forward, so ids are assigned up front.
        for index in 0..self.ir.functions.len() {
            let id = self.module.next_id();
            self.function_ids.insert(FuncId(index as u32), id);
        }

        self.emit_root_block();
        for index in 0..self.ir.functions.len() {
            self.emit_function(FuncId(index as u32));
        }
    }

    fn emit_root_block(&mut self) {
        let ir = self.ir;
        for inst in &ir.block(ir.root_block).insts {
            match inst {
                Inst::Var(var) => self.emit_var(var),
                _ => ice!("non-var instruction in the module root block"),
            }
        }
    }

    fn emit_function(&mut self, id: FuncId) {
        let ir = self.ir;
        let func = ir.function(id);
        let fid = self.function_ids[&id];
        self.module.push_debug(
            Op::Name,
            vec![SpvOperand::Id(fid), SpvOperand::Str(func.name.clone())],
        );

        let ret_ty = self.type_id(func.return_type);
        let param_tys: Vec<u32> = func
            .params
            .iter()
            .map(|&p| {
                let ty = ir.value(p).ty;
                self.type_id(ty)
            })
            .collect();
        let fn_ty = self.function_type_id(ret_ty, param_tys.clone());

        self.current = spirv::Function {
            declaration: Some(spirv::Instruction::new(
                Op::Function,
                vec![
                    SpvOperand::Id(ret_ty),
                    SpvOperand::Id(fid),
                    SpvOperand::Literal(crate::spirv::opcodes::CONTROL_NONE),
                    SpvOperand::Id(fn_ty),
                ],
            )),
            ..Default::default()
        };

        for (&param, &ty) in func.params.iter().zip(&param_tys) {
            let pid = self.value_id(param);
            self.current.params.push(spirv::Instruction::new(
                Op::FunctionParameter,
                vec![SpvOperand::Id(ty), SpvOperand::Id(pid)],
            ));
        }

        self.current.entry_label = self.label(func.block);
        self.emit_block_contents(func.block);

        if func.stage.is_some() {
            self.emit_entry_point(id, fid);
        }

        let finished = std::mem::take(&mut self.current);
        self.module.push_function(finished);
    }

    /// Declare the entry point and its execution modes, listing every stage
    /// IO variable the function (or anything it calls) touches.
    fn emit_entry_point(&mut self, id: FuncId, fid: u32) {
        let ir = self.ir;
        let func = ir.function(id);
        let Some(stage) = func.stage else {
            ice!("emit_entry_point on an unstaged function");
        };
        let model = match stage {
            PipelineStage::Compute { .. } => ExecutionModel::GlCompute,
            PipelineStage::Vertex => ExecutionModel::Vertex,
            PipelineStage::Fragment => ExecutionModel::Fragment,
        };

        let mut used = IndexSet::new();
        let mut seen = IndexSet::new();
        self.collect_value_uses(id, &mut used, &mut seen);

        let mut operands = vec![
            SpvOperand::Literal(model as u32),
            SpvOperand::Id(fid),
            SpvOperand::Str(func.name.clone()),
        ];
        let mut writes_frag_depth = false;
        for (value, space, io) in self.io_vars() {
            if !used.contains(&value) {
                continue;
            }
            operands.push(SpvOperand::Id(self.value_ids[&value]));
            if space == AddressSpace::Out
                && io.map(|io| io.builtin == Some(BuiltinValue::FragDepth)) == Some(true)
            {
                writes_frag_depth = true;
            }
        }
        self.module.push_entry_point(operands);

        match stage {
            PipelineStage::Compute { workgroup_size } => {
                self.module.push_execution_mode(vec![
                    SpvOperand::Id(fid),
                    SpvOperand::Literal(ExecutionMode::LocalSize as u32),
                    SpvOperand::Literal(workgroup_size[0]),
                    SpvOperand::Literal(workgroup_size[1]),
                    SpvOperand::Literal(workgroup_size[2]),
                ]);
            }
            PipelineStage::Fragment => {
                self.module.push_execution_mode(vec![
                    SpvOperand::Id(fid),
                    SpvOperand::Literal(ExecutionMode::OriginUpperLeft as u32),
                ]);
                if writes_frag_depth {
                    self.module.push_execution_mode(vec![
                        SpvOperand::Id(fid),
                        SpvOperand::Literal(ExecutionMode::DepthReplacing as u32),
                    ]);
                }
            }
            PipelineStage::Vertex => {}
        }
    }

    /// Stage IO variables in root-block declaration order.
    fn io_vars(&self) -> Vec<(ValueId, AddressSpace, Option<IoAttributes>)> {
        let ir = self.ir;
        let mut vars = Vec::new();
        for inst in &ir.block(ir.root_block).insts {
            let Inst::Var(var) = inst else { continue };
            let Type::Pointer { space, .. } = ir.types.get(ir.value(var.result).ty) else {
                continue;
            };
            if matches!(space, AddressSpace::In | AddressSpace::Out) {
                vars.push((var.result, *space, var.io));
            }
        }
        vars
    }

    /// Every value referenced by a function's body, calls included.
    fn collect_value_uses(
        &self,
        id: FuncId,
        used: &mut IndexSet<ValueId>,
        seen: &mut IndexSet<FuncId>,
    ) {
        if !seen.insert(id) {
            return;
        }
        let ir = self.ir;
        let mut stack = vec![ir.function(id).block];
        while let Some(block_id) = stack.pop() {
            let block = ir.block(block_id);
            for inst in &block.insts {
                let mut operands = Vec::new();
                let mut callees = Vec::new();
                inst_operands(inst, &mut operands, &mut callees);
                for operand in operands {
                    if let ir::Operand::Value(v) = operand {
                        used.insert(v);
                    }
                }
                for callee in callees {
                    self.collect_value_uses(callee, used, seen);
                }
                stack.extend(inst.child_blocks());
            }
            if let Some(term) = &block.terminator {
                for operand in terminator_operands(term) {
                    if let ir::Operand::Value(v) = operand {
                        used.insert(v);
                    }
                }
            }
        }
    }

    /// SPIR-V id of a runtime value, allocated on first use. Pushes the debug
    /// name alongside the allocation.
    pub(crate) fn value_id(&mut self, value: ValueId) -> u32 {
        if let Some(&id) = self.value_ids.get(&value) {
            return id;
        }
        let id = self.module.next_id();
        self.value_ids.insert(value, id);
        if let Some(name) = &self.ir.value(value).name {
            self.module.push_debug(
                Op::Name,
                vec![SpvOperand::Id(id), SpvOperand::Str(name.clone())],
            );
        }
        id
    }

    /// SPIR-V id of an operand.
    pub(crate) fn op_id(&mut self, operand: ir::Operand) -> u32 {
        match operand {
            ir::Operand::Const(c) => self.const_id(c),
            ir::Operand::Value(v) => self.value_id(v),
        }
    }

    /// Label id of a block, allocated on first reference.
    pub(crate) fn label(&mut self, block: BlockId) -> u32 {
        if let Some(&id) = self.block_labels.get(&block) {
            return id;
        }
        let id = self.module.next_id();
        self.block_labels.insert(block, id);
        id
    }

    /// Merge label of the control construct at `key`, allocated on first
    /// reference.
    pub(crate) fn merge_label(&mut self, key: (BlockId, usize)) -> u32 {
        if let Some(&id) = self.merge_labels.get(&key) {
            return id;
        }
        let id = self.module.next_id();
        self.merge_labels.insert(key, id);
        id
    }

    fn function_type_id(&mut self, ret: u32, params: Vec<u32>) -> u32 {
        let key = (ret, params);
        if let Some(&id) = self.function_types.get(&key) {
            return id;
        }
        let id = self.module.next_id();
        let mut operands = vec![SpvOperand::Id(id), SpvOperand::Id(key.0)];
        operands.extend(key.1.iter().map(|&p| SpvOperand::Id(p)));
        self.module.push_type(Op::TypeFunction, operands);
        self.function_types.insert(key, id);
        id
    }

    /// Id of the GLSL.std.450 instruction set, imported on first use.
    pub(crate) fn glsl_import_id(&mut self) -> u32 {
        if let Some(id) = self.glsl_import {
            return id;
        }
        let id = self.module.next_id();
        self.module
            .push_ext_import(id, crate::spirv::opcodes::GLSL_STD_450);
        self.glsl_import = Some(id);
        id
    }
}

/// Collect the operands and callees of an instruction.
fn inst_operands(inst: &Inst, operands: &mut Vec<ir::Operand>, callees: &mut Vec<FuncId>) {
    match inst {
        Inst::Binary { lhs, rhs, .. } => operands.extend([*lhs, *rhs]),
        Inst::Unary { value, .. }
        | Inst::Bitcast { value, .. }
        | Inst::Convert { value, .. }
        | Inst::Let { value, .. } => operands.push(*value),
        Inst::Construct { args, .. } => operands.extend(args.iter().copied()),
        Inst::Access { base, indices, .. } => {
            operands.push(*base);
            operands.extend(indices.iter().copied());
        }
        Inst::Swizzle { object, .. } => operands.push(*object),
        Inst::Load { source, .. } => operands.push(*source),
        Inst::LoadVectorElement { pointer, index, .. } => operands.extend([*pointer, *index]),
        Inst::Store { target, value } => operands.extend([*target, *value]),
        Inst::StoreVectorElement {
            pointer,
            index,
            value,
        } => operands.extend([*pointer, *index, *value]),
        Inst::Var(var) => operands.extend(var.initializer),
        Inst::Call { callee, args, .. } => {
            callees.push(*callee);
            operands.extend(args.iter().copied());
        }
        Inst::Builtin { args, .. } | Inst::Intrinsic { args, .. } => {
            operands.extend(args.iter().copied());
        }
        Inst::If(i) => operands.push(i.condition),
        Inst::Switch(s) => operands.push(s.condition),
        Inst::Loop(_) => {}
    }
}

fn terminator_operands(term: &Terminator) -> Vec<ir::Operand> {
    match term {
        Terminator::Return { value } => value.iter().copied().collect(),
        Terminator::ExitIf { args }
        | Terminator::ExitLoop { args }
        | Terminator::ExitSwitch { args }
        | Terminator::Continue { args }
        | Terminator::NextIteration { args } => args.clone(),
        Terminator::BreakIf { condition, args } => {
            let mut out = vec![*condition];
            out.extend(args.iter().copied());
            out
        }
        Terminator::Unreachable | Terminator::TerminateInvocation => Vec::new(),
    }
}
