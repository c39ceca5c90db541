//! Binary serialization of a SPIR-V module.
//!
//! Produces the 5-word header followed by the logical sections in the order
//! the format mandates. Each instruction's first word packs the word count in
//! the high 16 bits and the opcode in the low 16.

use super::module::{Function, Instruction, Module, Operand};
use super::opcodes::Op;

/// The SPIR-V magic number.
pub const MAGIC: u32 = 0x0723_0203;

/// SPIR-V version 1.3.
pub const VERSION: u32 = 0x0001_0300;

/// Generator magic for this backend (unregistered tool id).
pub const GENERATOR: u32 = 0x0020_0001;

/// Serializes a [`Module`] into a word stream.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    words: Vec<u32>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize the whole module and return the word stream.
    pub fn write(mut self, module: &Module) -> Vec<u32> {
        self.write_header(module.id_bound());
        for &cap in &module.capabilities {
            self.write_inst(&Instruction::new(
                Op::Capability,
                vec![Operand::Literal(cap)],
            ));
        }
        self.write_section(&module.extensions);
        self.write_section(&module.ext_imports);
        if let Some(mm) = &module.memory_model {
            self.write_inst(mm);
        }
        self.write_section(&module.entry_points);
        self.write_section(&module.execution_modes);
        self.write_section(&module.debug);
        self.write_section(&module.annotations);
        self.write_section(&module.types);
        self.write_section(&module.global_vars);
        for function in &module.functions {
            self.write_function(function);
        }
        self.words
    }

    fn write_header(&mut self, bound: u32) {
        self.words.push(MAGIC);
        self.words.push(VERSION);
        self.words.push(GENERATOR);
        self.words.push(bound);
        self.words.push(0);
    }

    fn write_section(&mut self, insts: &[Instruction]) {
        for inst in insts {
            self.write_inst(inst);
        }
    }

    fn write_function(&mut self, function: &Function) {
        if let Some(decl) = &function.declaration {
            self.write_inst(decl);
        }
        self.write_section(&function.params);
        self.write_inst(&Instruction::new(
            Op::Label,
            vec![Operand::Id(function.entry_label)],
        ));
        self.write_section(&function.vars);
        self.write_section(&function.insts);
        self.write_inst(&Instruction::new(Op::FunctionEnd, vec![]));
    }

    fn write_inst(&mut self, inst: &Instruction) {
        let mut count = 1u32;
        for operand in &inst.operands {
            count += operand_words(operand);
        }
        self.words.push((count << 16) | (inst.op as u32));
        for operand in &inst.operands {
            match operand {
                Operand::Id(id) => self.words.push(*id),
                Operand::Literal(word) => self.words.push(*word),
                Operand::Str(s) => self.write_string(s),
            }
        }
    }

    // Strings pack little-endian, null-terminated, padded to a word boundary.
    fn write_string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        let mut word = 0u32;
        let mut shift = 0;
        for &b in bytes {
            word |= u32::from(b) << shift;
            shift += 8;
            if shift == 32 {
                self.words.push(word);
                word = 0;
                shift = 0;
            }
        }
        // The terminating null always fits: either the current word has room,
        // or a fresh zero word carries it.
        self.words.push(word);
    }
}

fn operand_words(operand: &Operand) -> u32 {
    match operand {
        Operand::Id(_) | Operand::Literal(_) => 1,
        Operand::Str(s) => (s.len() as u32 + 1).div_ceil(4),
    }
}
