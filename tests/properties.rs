//! Property-based tests for the generation pipeline.
//!
//! These drive randomly shaped IR through [`generate`] and check structural
//! properties of the word stream rather than exact output.

use std::collections::HashSet;

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use sir_spirv::ir::{BinaryOp, FunctionBuilder, Module, Operand, Terminator};
use sir_spirv::spirv::opcodes::Op;
use sir_spirv::{generate, Options};

/// Walk the stream and return `(opcode, operands)` pairs, checking that the
/// declared word counts tile the stream exactly.
fn split(words: &[u32]) -> Result<Vec<(u32, Vec<u32>)>, TestCaseError> {
    prop_assert!(words.len() >= 5);
    prop_assert_eq!(words[0], 0x0723_0203);
    let mut insts = Vec::new();
    let mut i = 5;
    while i < words.len() {
        let count = (words[i] >> 16) as usize;
        prop_assert!(count >= 1);
        prop_assert!(i + count <= words.len());
        insts.push((words[i] & 0xffff, words[i + 1..i + count].to_vec()));
        i += count;
    }
    prop_assert_eq!(i, words.len());
    Ok(insts)
}

fn arithmetic_chain(values: &[f32], multiply: &[bool]) -> Module {
    let mut module = Module::new();
    let f32 = module.types.f32();
    let mut acc = module.const_f32(values[0]);
    let rest: Vec<Operand> = values[1..].iter().map(|&v| module.const_f32(v)).collect();
    let mut b = FunctionBuilder::new(&mut module, "f", f32, None);
    for (i, value) in rest.into_iter().enumerate() {
        let op = if multiply[i % multiply.len()] {
            BinaryOp::Mul
        } else {
            BinaryOp::Add
        };
        acc = b.binary(op, f32, acc, value);
    }
    b.ret_value(acc);
    module
}

proptest! {
    #[test]
    fn arithmetic_chains_generate_cleanly(
        values in prop::collection::vec(any::<f32>(), 1..32),
        multiply in prop::collection::vec(any::<bool>(), 1..8),
    ) {
        let module = arithmetic_chain(&values, &multiply);
        let words = generate(&module, &Options::default()).unwrap();
        let insts = split(&words)?;

        // One add or multiply per chain link, each with an id under the
        // declared bound.
        let bound = words[3];
        let results: Vec<u32> = insts
            .iter()
            .filter(|(op, _)| *op == Op::FAdd as u32 || *op == Op::FMul as u32)
            .map(|(_, operands)| operands[1])
            .collect();
        prop_assert_eq!(results.len(), values.len() - 1);
        for id in results {
            prop_assert!(id < bound);
        }
    }

    #[test]
    fn generation_is_deterministic(
        values in prop::collection::vec(any::<f32>(), 1..16),
        multiply in prop::collection::vec(any::<bool>(), 1..4),
    ) {
        let first = generate(&arithmetic_chain(&values, &multiply), &Options::default()).unwrap();
        let second = generate(&arithmetic_chain(&values, &multiply), &Options::default()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn sequential_ifs_produce_one_phi_each(depth in 1usize..6) {
        let mut module = Module::new();
        let f32 = module.types.f32();
        let cond = module.const_bool(true);
        let zero = module.const_f32(0.0);
        let one = module.const_f32(1.0);
        let mut b = FunctionBuilder::new(&mut module, "f", f32, None);
        let mut acc = zero;
        for _ in 0..depth {
            let t = b.create_block();
            let f = b.create_block();
            b.module().block_mut(t).terminator = Some(Terminator::ExitIf { args: vec![acc] });
            b.module().block_mut(f).terminator = Some(Terminator::ExitIf { args: vec![one] });
            acc = b.if_(cond, t, f, &[f32])[0];
        }
        b.ret_value(acc);

        let words = generate(&module, &Options::default()).unwrap();
        let insts = split(&words)?;
        let phis = insts.iter().filter(|(op, _)| *op == Op::Phi as u32).count();
        prop_assert_eq!(phis, depth);
        let merges = insts
            .iter()
            .filter(|(op, _)| *op == Op::SelectionMerge as u32)
            .count();
        prop_assert_eq!(merges, depth);
    }

    #[test]
    fn constant_pool_deduplicates(values in prop::collection::vec(any::<u32>(), 1..32)) {
        let mut module = Module::new();
        let u32_ty = module.types.u32();
        let void = module.types.void();
        let consts: Vec<Operand> = values.iter().map(|&v| module.const_u32(v)).collect();
        let mut b = FunctionBuilder::new(&mut module, "f", void, None);
        let var = b.var("x", u32_ty, None);
        for c in consts {
            b.store(var, c);
        }
        b.ret();

        let words = generate(&module, &Options::default()).unwrap();
        let insts = split(&words)?;
        let uint = insts
            .iter()
            .find(|(op, operands)| *op == Op::TypeInt as u32 && operands[1..] == [32, 0])
            .map(|(_, operands)| operands[0])
            .unwrap();
        let emitted = insts
            .iter()
            .filter(|(op, operands)| *op == Op::Constant as u32 && operands[0] == uint)
            .count();
        let unique: HashSet<u32> = values.iter().copied().collect();
        prop_assert_eq!(emitted, unique.len());
    }
}
