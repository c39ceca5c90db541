//! Integration tests for the SPIR-V backend.
//!
//! These tests build IR modules through the public builder API, run the full
//! generation pipeline and check the emitted word stream with a small
//! disassembler. Instruction words are `(word count << 16) | opcode`, so the
//! stream can be split without understanding individual operands.

use sir_spirv::ir::{
    AddressSpace, BinaryOp, BuiltinFn, BuiltinValue, Case, CaseSelector, FunctionBuilder,
    IoAttributes, Module, Operand, PipelineStage, Terminator,
};
use sir_spirv::spirv::opcodes::Op;
use sir_spirv::{generate, Options, ValidateError};

const MAGIC: u32 = 0x0723_0203;
const VERSION: u32 = 0x0001_0300;

struct RawInst {
    op: u32,
    operands: Vec<u32>,
}

/// Split a generated word stream back into instructions.
fn disassemble(words: &[u32]) -> Vec<RawInst> {
    assert!(words.len() >= 5, "missing header");
    assert_eq!(words[0], MAGIC);
    assert_eq!(words[1], VERSION);
    assert_eq!(words[4], 0);

    let mut insts = Vec::new();
    let mut i = 5;
    while i < words.len() {
        let count = (words[i] >> 16) as usize;
        assert!(count >= 1, "zero-length instruction at word {i}");
        assert!(i + count <= words.len(), "instruction overruns the stream");
        insts.push(RawInst {
            op: words[i] & 0xffff,
            operands: words[i + 1..i + count].to_vec(),
        });
        i += count;
    }
    insts
}

fn find(insts: &[RawInst], op: Op) -> &RawInst {
    insts
        .iter()
        .find(|i| i.op == op as u32)
        .unwrap_or_else(|| panic!("no {op:?} instruction emitted"))
}

fn find_all<'a>(insts: &'a [RawInst], op: Op) -> Vec<&'a RawInst> {
    insts.iter().filter(|i| i.op == op as u32).collect()
}

fn position(insts: &[RawInst], op: Op) -> usize {
    insts
        .iter()
        .position(|i| i.op == op as u32)
        .unwrap_or_else(|| panic!("no {op:?} instruction emitted"))
}

/// Map constant ids to their literal bits.
fn scalar_constants(insts: &[RawInst]) -> Vec<(u32, u32)> {
    find_all(insts, Op::Constant)
        .iter()
        .map(|c| (c.operands[1], c.operands[2]))
        .collect()
}

fn emit(module: &Module) -> Vec<RawInst> {
    let words = generate(module, &Options::default()).unwrap();
    disassemble(&words)
}

#[test]
fn test_trivial_compute_module() {
    let mut module = Module::new();
    let void = module.types.void();
    let stage = PipelineStage::Compute {
        workgroup_size: [8, 4, 1],
    };
    let mut b = FunctionBuilder::new(&mut module, "main", void, Some(stage));
    b.ret();

    let words = generate(&module, &Options::default()).unwrap();
    assert_eq!(words[0], MAGIC);
    assert_eq!(words[1], VERSION);
    assert!(words[3] > 1, "id bound covers allocated ids");

    let insts = disassemble(&words);
    // Shader capability and the Logical/GLSL450 memory model.
    assert!(insts
        .iter()
        .any(|i| i.op == Op::Capability as u32 && i.operands == [1]));
    assert_eq!(find(&insts, Op::MemoryModel).operands, [0, 1]);

    let ep = find(&insts, Op::EntryPoint);
    assert_eq!(ep.operands[0], 5, "GLCompute execution model");
    assert_eq!(ep.operands[2], u32::from_le_bytes(*b"main"));
    assert_eq!(ep.operands[3], 0, "string terminator word");

    let em = find(&insts, Op::ExecutionMode);
    assert_eq!(em.operands[1..], [17, 8, 4, 1], "LocalSize 8x4x1");

    // OpFunction, OpLabel, OpReturn, OpFunctionEnd in order.
    let f = position(&insts, Op::Function);
    assert_eq!(insts[f + 1].op, Op::Label as u32);
    assert_eq!(insts[f + 2].op, Op::Return as u32);
    assert_eq!(insts[f + 3].op, Op::FunctionEnd as u32);
}

#[test]
fn test_empty_if_branches_collapse_onto_merge() {
    let mut module = Module::new();
    let void = module.types.void();
    let cond = module.const_bool(true);
    let mut b = FunctionBuilder::new(&mut module, "f", void, None);
    let t = b.create_block();
    let f = b.create_block();
    b.if_(cond, t, f, &[]);
    b.ret();

    let insts = emit(&module);
    let merge = find(&insts, Op::SelectionMerge).operands[0];
    let bc = find(&insts, Op::BranchConditional);
    assert_eq!(bc.operands[1], merge, "empty true branch elided");
    assert_eq!(bc.operands[2], merge, "empty false branch elided");
}

#[test]
fn test_if_results_become_phis() {
    let mut module = Module::new();
    let f32 = module.types.f32();
    let cond = module.const_bool(true);
    let one = module.const_f32(1.0);
    let two = module.const_f32(2.0);
    let mut b = FunctionBuilder::new(&mut module, "f", f32, None);
    let t = b.create_block();
    let f = b.create_block();
    b.module().block_mut(t).terminator = Some(Terminator::ExitIf { args: vec![one] });
    b.module().block_mut(f).terminator = Some(Terminator::ExitIf { args: vec![two] });
    let results = b.if_(cond, t, f, &[f32]);
    b.ret_value(results[0]);

    let insts = emit(&module);

    // Carrying a result disables branch elision.
    let bc = find(&insts, Op::BranchConditional);
    assert_ne!(bc.operands[1], bc.operands[2]);

    let phi = find(&insts, Op::Phi);
    assert_eq!(phi.operands.len(), 6, "two (value, label) pairs");
    let labels = [phi.operands[3], phi.operands[5]];
    assert!(labels[0] < labels[1], "incoming edges sorted by label");

    // The true branch gets the lower label, so 1.0 comes first.
    let constants = scalar_constants(&insts);
    let bits = |id: u32| constants.iter().find(|(i, _)| *i == id).map(|(_, b)| *b);
    assert_eq!(bits(phi.operands[2]), Some(1.0f32.to_bits()));
    assert_eq!(bits(phi.operands[4]), Some(2.0f32.to_bits()));

    let ret = find(&insts, Op::ReturnValue);
    assert_eq!(ret.operands[0], phi.operands[1], "function returns the phi");
}

#[test]
fn test_loop_break_if_shape() {
    let mut module = Module::new();
    let void = module.types.void();
    let cond = module.const_bool(false);
    let mut b = FunctionBuilder::new(&mut module, "f", void, None);
    let body = b.create_block();
    let cont = b.create_block();
    b.module().block_mut(body).terminator = Some(Terminator::Continue { args: vec![] });
    b.module().block_mut(cont).terminator = Some(Terminator::BreakIf {
        condition: cond,
        args: vec![],
    });
    b.loop_(None, body, cont, &[]);
    b.ret();

    let insts = emit(&module);
    let lm = find(&insts, Op::LoopMerge);
    let (merge, continuing) = (lm.operands[0], lm.operands[1]);

    // No initializer: the loop opens with a plain branch to the header.
    let header = find(&insts, Op::Branch).operands[0];

    // break-if leaves to the merge and otherwise takes the back-edge.
    let bc = find(&insts, Op::BranchConditional);
    assert_eq!(bc.operands[1], merge);
    assert_eq!(bc.operands[2], header);

    // Labels appear as header .. continuing .. merge.
    let labels: Vec<u32> = find_all(&insts, Op::Label)
        .iter()
        .map(|l| l.operands[0])
        .collect();
    let at = |id: u32| labels.iter().position(|&l| l == id).unwrap();
    assert!(at(header) < at(continuing));
    assert!(at(continuing) < at(merge));
}

#[test]
fn test_loop_body_params_and_break_if_result() {
    // Counting loop: the body parameter threads the counter through the
    // header, the break-if exits once it reaches the limit.
    let mut module = Module::new();
    let u32_ty = module.types.u32();
    let bool_ = module.types.bool();
    let zero = module.const_u32(0);
    let one = module.const_u32(1);
    let limit = module.const_u32(4);
    let mut b = FunctionBuilder::new(&mut module, "f", u32_ty, None);
    let entry = b.current_block();
    let init = b.create_block();
    let body = b.create_block();
    let cont = b.create_block();
    let counter = b.block_param(body, u32_ty);

    b.switch_to(init);
    b.terminate(Terminator::NextIteration { args: vec![zero] });
    b.switch_to(body);
    b.terminate(Terminator::Continue { args: vec![] });
    b.switch_to(cont);
    let next = b.binary(BinaryOp::Add, u32_ty, counter, one);
    let done = b.binary(BinaryOp::GreaterThanEqual, bool_, next, limit);
    b.terminate(Terminator::BreakIf {
        condition: done,
        args: vec![next],
    });
    b.switch_to(entry);
    let results = b.loop_(Some(init), body, cont, &[u32_ty]);
    b.ret_value(results[0]);

    let insts = emit(&module);
    let phis = find_all(&insts, Op::Phi);
    assert_eq!(phis.len(), 2, "one header phi, one merge phi");

    // Header phi: one edge from the initializer, one from the break-if
    // back-edge, feeding the increment.
    let header = phis[0];
    assert_eq!(header.operands.len(), 6);
    let add = find(&insts, Op::IAdd);
    assert_eq!(add.operands[2], header.operands[1]);
    let constants = scalar_constants(&insts);
    let zero_id = constants.iter().find(|(_, bits)| *bits == 0).unwrap().0;
    assert!(header.operands[2] == zero_id || header.operands[4] == zero_id);
    assert!(header.operands[2] == add.operands[1] || header.operands[4] == add.operands[1]);

    // Merge phi: the break-if edge carries no value, so the result reads
    // undef from the continuing block.
    let merge = phis[1];
    assert_eq!(merge.operands.len(), 4, "single incoming edge");
    assert_eq!(merge.operands[2], find(&insts, Op::Undef).operands[1]);
    let lm = find(&insts, Op::LoopMerge);
    assert_eq!(merge.operands[3], lm.operands[1], "edge from continuing");
    assert_eq!(find(&insts, Op::ReturnValue).operands[0], merge.operands[1]);
}

#[test]
fn test_switch_result_phi_sorted_by_label() {
    let mut module = Module::new();
    let u32_ty = module.types.u32();
    let selector = module.const_i32(1);
    let one = module.constants.i32_(&mut module.types, 1);
    let two = module.constants.i32_(&mut module.types, 2);
    let seven = module.const_u32(7);
    let nine = module.const_u32(9);
    let mut b = FunctionBuilder::new(&mut module, "f", u32_ty, None);
    let case = b.create_block();
    let default = b.create_block();
    b.module().block_mut(case).terminator = Some(Terminator::ExitSwitch { args: vec![seven] });
    b.module().block_mut(default).terminator = Some(Terminator::ExitSwitch { args: vec![nine] });
    let results = b.switch_(
        selector,
        vec![
            Case {
                selectors: vec![CaseSelector::Value(one), CaseSelector::Value(two)],
                block: case,
            },
            Case {
                selectors: vec![CaseSelector::Default],
                block: default,
            },
        ],
        &[u32_ty],
    );
    b.ret_value(results[0]);

    let insts = emit(&module);

    // Both selectors share the one case label.
    let sw = find(&insts, Op::Switch);
    assert_eq!(sw.operands.len(), 6, "selector, default, two literal pairs");
    assert_eq!(sw.operands[2], 1);
    assert_eq!(sw.operands[4], 2);
    assert_eq!(sw.operands[3], sw.operands[5]);

    // The merge phi lists its edges in label order. The default label is
    // allocated first, so its value (9) comes before the case's (7).
    let phi = find(&insts, Op::Phi);
    assert_eq!(phi.operands.len(), 6);
    assert!(phi.operands[3] < phi.operands[5], "edges sorted by label");
    assert_eq!(phi.operands[3], sw.operands[1]);
    assert_eq!(phi.operands[5], sw.operands[3]);
    let constants = scalar_constants(&insts);
    let bits = |id: u32| constants.iter().find(|(i, _)| *i == id).map(|(_, b)| *b);
    assert_eq!(bits(phi.operands[2]), Some(9));
    assert_eq!(bits(phi.operands[4]), Some(7));
    assert_eq!(find(&insts, Op::ReturnValue).operands[0], phi.operands[1]);
}

#[test]
fn test_short_circuit_and_shape() {
    // `a && b` lowered as `if a { b } else { false }`.
    let mut module = Module::new();
    let bool_ = module.types.bool();
    let false_ = module.const_bool(false);
    let mut b = FunctionBuilder::new(&mut module, "and", bool_, None);
    let a = b.param(bool_, "a");
    let rhs = b.param(bool_, "b");
    let t = b.create_block();
    let f = b.create_block();
    b.module().block_mut(t).terminator = Some(Terminator::ExitIf { args: vec![rhs] });
    b.module().block_mut(f).terminator = Some(Terminator::ExitIf { args: vec![false_] });
    let results = b.if_(a, t, f, &[bool_]);
    b.ret_value(results[0]);

    let insts = emit(&module);
    let params = find_all(&insts, Op::FunctionParameter);
    assert_eq!(params.len(), 2);

    // The selection tests `a` and both branches survive elision.
    let bc = find(&insts, Op::BranchConditional);
    assert_eq!(bc.operands[0], params[0].operands[1]);
    assert_ne!(bc.operands[1], bc.operands[2]);

    // The true edge carries `b`, the false edge the false constant.
    let phi = find(&insts, Op::Phi);
    assert_eq!(phi.operands[2], params[1].operands[1]);
    assert_eq!(
        phi.operands[4],
        find(&insts, Op::ConstantFalse).operands[1]
    );
    assert_eq!(find(&insts, Op::ReturnValue).operands[0], phi.operands[1]);
}

#[test]
fn test_switch_cases_and_default() {
    let mut module = Module::new();
    let void = module.types.void();
    let selector = module.const_i32(2);
    let one = module.constants.i32_(&mut module.types, 1);
    let mut b = FunctionBuilder::new(&mut module, "f", void, None);
    let case = b.create_block();
    let default = b.create_block();
    b.module().block_mut(case).terminator = Some(Terminator::ExitSwitch { args: vec![] });
    b.module().block_mut(default).terminator = Some(Terminator::ExitSwitch { args: vec![] });
    b.switch_(
        selector,
        vec![
            Case {
                selectors: vec![CaseSelector::Value(one)],
                block: case,
            },
            Case {
                selectors: vec![CaseSelector::Default],
                block: default,
            },
        ],
        &[],
    );
    b.ret();

    let insts = emit(&module);
    let merge = find(&insts, Op::SelectionMerge).operands[0];
    let sw = find(&insts, Op::Switch);
    assert_eq!(sw.operands.len(), 4, "selector, default, one literal pair");
    assert_eq!(sw.operands[2], 1, "case literal");
    assert_ne!(sw.operands[1], merge, "default gets its own label");
    assert_ne!(sw.operands[3], sw.operands[1]);
}

#[test]
fn test_section_ordering() {
    let mut module = Module::new();
    let f32 = module.types.f32();
    let void = module.types.void();
    let uniform = module.global_var(
        "scale",
        AddressSpace::Uniform,
        f32,
        Some(sir_spirv::ir::BindingPoint {
            group: 0,
            binding: 0,
        }),
    );
    let stage = PipelineStage::Compute {
        workgroup_size: [1, 1, 1],
    };
    let mut b = FunctionBuilder::new(&mut module, "main", void, Some(stage));
    let loaded = b.load(Operand::Value(uniform));
    b.builtin(f32, BuiltinFn::Sin, vec![loaded]);
    b.ret();

    let insts = emit(&module);
    let last = |op: Op| {
        insts
            .iter()
            .rposition(|i| i.op == op as u32)
            .unwrap_or_else(|| panic!("no {op:?} instruction emitted"))
    };

    assert!(last(Op::Capability) < position(&insts, Op::ExtInstImport));
    assert!(position(&insts, Op::ExtInstImport) < position(&insts, Op::MemoryModel));
    assert!(position(&insts, Op::MemoryModel) < position(&insts, Op::EntryPoint));
    assert!(position(&insts, Op::EntryPoint) < position(&insts, Op::ExecutionMode));
    assert!(position(&insts, Op::ExecutionMode) < position(&insts, Op::Name));
    assert!(last(Op::Name) < position(&insts, Op::Decorate));
    assert!(last(Op::Decorate) < position(&insts, Op::TypeFloat));
    assert!(position(&insts, Op::TypeFloat) < position(&insts, Op::Variable));
    assert!(last(Op::Variable) < position(&insts, Op::Function));
}

#[test]
fn test_generation_is_deterministic() {
    fn build() -> Module {
        let mut module = Module::new();
        let f32 = module.types.f32();
        let cond = module.const_bool(true);
        let one = module.const_f32(1.0);
        let two = module.const_f32(2.0);
        let mut b = FunctionBuilder::new(&mut module, "f", f32, None);
        let t = b.create_block();
        let f = b.create_block();
        b.module().block_mut(t).terminator = Some(Terminator::ExitIf { args: vec![one] });
        b.module().block_mut(f).terminator = Some(Terminator::ExitIf { args: vec![two] });
        let results = b.if_(cond, t, f, &[f32]);
        b.ret_value(results[0]);
        module
    }

    let opts = Options::default();
    let first = generate(&build(), &opts).unwrap();
    let second = generate(&build(), &opts).unwrap();
    assert_eq!(first, second, "independent builds agree");

    let module = build();
    let a = generate(&module, &opts).unwrap();
    let b = generate(&module, &opts).unwrap();
    assert_eq!(a, b, "repeated generation agrees");
}

#[test]
fn test_types_and_constants_interned_once() {
    let mut module = Module::new();
    let f32 = module.types.f32();
    let void = module.types.void();
    let one = module.const_f32(1.0);
    let mut b = FunctionBuilder::new(&mut module, "f", void, None);
    let x = b.var("x", f32, None);
    let y = b.var("y", f32, None);
    b.store(x, one);
    b.store(y, one);
    b.ret();

    let insts = emit(&module);
    let floats = find_all(&insts, Op::TypeFloat)
        .iter()
        .filter(|t| t.operands[1] == 32)
        .count();
    assert_eq!(floats, 1, "one OpTypeFloat 32");

    let ones = scalar_constants(&insts)
        .iter()
        .filter(|(_, bits)| *bits == 1.0f32.to_bits())
        .count();
    assert_eq!(ones, 1, "one OpConstant 1.0");
}

#[test]
fn test_missing_terminator_is_rejected() {
    let mut module = Module::new();
    let f32 = module.types.f32();
    let void = module.types.void();
    let mut b = FunctionBuilder::new(&mut module, "f", void, None);
    b.var("x", f32, None);
    // No terminator on a non-empty block.

    let err = generate(&module, &Options::default()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ValidateError>(),
        Some(ValidateError::MissingTerminator { .. })
    ));
}

#[test]
fn test_fragment_io_and_depth_replacing() {
    let mut module = Module::new();
    let f32 = module.types.f32();
    let vec4 = module.types.vector(f32, 4);
    let void = module.types.void();
    let color = module.io_var(
        "color",
        AddressSpace::In,
        vec4,
        IoAttributes {
            location: Some(0),
            ..Default::default()
        },
    );
    let depth = module.io_var(
        "depth",
        AddressSpace::Out,
        f32,
        IoAttributes {
            builtin: Some(BuiltinValue::FragDepth),
            ..Default::default()
        },
    );
    let mut b = FunctionBuilder::new(&mut module, "fs", void, Some(PipelineStage::Fragment));
    let c = b.load(Operand::Value(color));
    let len = b.builtin(f32, BuiltinFn::Length, vec![c]);
    b.store(Operand::Value(depth), len);
    b.ret();

    let insts = emit(&module);
    let ep = find(&insts, Op::EntryPoint);
    assert_eq!(ep.operands[0], 4, "Fragment execution model");
    // model, function, one name word, two interface ids.
    assert_eq!(ep.operands.len(), 5);

    let modes: Vec<u32> = find_all(&insts, Op::ExecutionMode)
        .iter()
        .map(|m| m.operands[1])
        .collect();
    assert!(modes.contains(&7), "OriginUpperLeft");
    assert!(modes.contains(&12), "DepthReplacing");

    // The depth output is decorated BuiltIn FragDepth.
    assert!(find_all(&insts, Op::Decorate)
        .iter()
        .any(|d| d.operands[1] == 11 && d.operands[2] == 22));
    // The color input is decorated Location 0.
    assert!(find_all(&insts, Op::Decorate)
        .iter()
        .any(|d| d.operands[1] == 30 && d.operands[2] == 0));
}

#[test]
fn test_glsl_import_emitted_once() {
    let mut module = Module::new();
    let f32 = module.types.f32();
    let void = module.types.void();
    let x = module.const_f32(0.5);
    let mut b = FunctionBuilder::new(&mut module, "f", void, None);
    b.builtin(f32, BuiltinFn::Sin, vec![x]);
    b.builtin(f32, BuiltinFn::Cos, vec![x]);
    b.ret();

    let insts = emit(&module);
    let imports = find_all(&insts, Op::ExtInstImport);
    assert_eq!(imports.len(), 1);
    // "GLSL.std.450" is twelve bytes plus a terminator word.
    assert_eq!(imports[0].operands.len(), 5);
    assert_eq!(imports[0].operands[1], u32::from_le_bytes(*b"GLSL"));

    let exts = find_all(&insts, Op::ExtInst);
    assert_eq!(exts.len(), 2);
    assert_eq!(exts[0].operands[2], imports[0].operands[0]);
    assert_eq!(exts[0].operands[3], 13, "Sin");
    assert_eq!(exts[1].operands[3], 14, "Cos");
}

#[test]
fn test_bool_to_float_uses_select() {
    let mut module = Module::new();
    let f32 = module.types.f32();
    let cond = module.const_bool(true);
    let mut b = FunctionBuilder::new(&mut module, "f", f32, None);
    let converted = b.convert(f32, cond);
    b.ret_value(converted);

    let insts = emit(&module);
    let sel = find(&insts, Op::Select);
    let constants = scalar_constants(&insts);
    let one = constants
        .iter()
        .find(|(_, bits)| *bits == 1.0f32.to_bits())
        .map(|(id, _)| *id);
    assert_eq!(Some(sel.operands[3]), one, "true selects 1.0");
    let null = find(&insts, Op::ConstantNull);
    assert_eq!(sel.operands[4], null.operands[1], "false selects zero");
}
