//! In-progress SPIR-V module: section buffers and id allocation.
//!
//! Instructions are appended to per-section buffers as lowering proceeds;
//! `writer::BinaryWriter` serializes the sections in the order the format
//! mandates. Capabilities are deduplicated on insertion, everything else is
//! kept in emission order.

use indexmap::IndexSet;

use super::opcodes::{Capability, Op};

/// A single instruction operand in unserialized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A result id or forward reference.
    Id(u32),
    /// A literal word (enumerant, immediate, bit pattern).
    Literal(u32),
    /// A literal string, packed into words at write time.
    Str(String),
}

/// An instruction with its operands, before word serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(op: Op, operands: Vec<Operand>) -> Self {
        Self { op, operands }
    }
}

/// A function under construction.
///
/// Function-scope variables are collected separately from body instructions
/// so they can be placed at the top of the entry block, as the format
/// requires.
#[derive(Debug, Default)]
pub struct Function {
    /// The OpFunction declaration.
    pub declaration: Option<Instruction>,
    /// Result id of the entry block label.
    pub entry_label: u32,
    /// OpFunctionParameter instructions.
    pub params: Vec<Instruction>,
    /// Function-scope OpVariable instructions.
    pub vars: Vec<Instruction>,
    /// Body instructions, entry label excluded.
    pub insts: Vec<Instruction>,
}

impl Function {
    pub fn push_inst(&mut self, op: Op, operands: Vec<Operand>) {
        self.insts.push(Instruction::new(op, operands));
    }

    pub fn push_var(&mut self, operands: Vec<Operand>) {
        self.vars.push(Instruction::new(Op::Variable, operands));
    }
}

/// The module being assembled.
#[derive(Debug, Default)]
pub struct Module {
    pub(crate) capabilities: IndexSet<u32>,
    pub(crate) extensions: Vec<Instruction>,
    pub(crate) ext_imports: Vec<Instruction>,
    pub(crate) memory_model: Option<Instruction>,
    pub(crate) entry_points: Vec<Instruction>,
    pub(crate) execution_modes: Vec<Instruction>,
    pub(crate) debug: Vec<Instruction>,
    pub(crate) annotations: Vec<Instruction>,
    pub(crate) types: Vec<Instruction>,
    pub(crate) global_vars: Vec<Instruction>,
    pub(crate) functions: Vec<Function>,
    next_id: u32,
}

impl Module {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    /// Allocate a fresh result id.
    pub fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// One past the highest id allocated so far.
    pub fn id_bound(&self) -> u32 {
        self.next_id
    }

    pub fn push_capability(&mut self, cap: Capability) {
        self.capabilities.insert(cap as u32);
    }

    pub fn push_extension(&mut self, name: &str) {
        let inst = Instruction::new(Op::Extension, vec![Operand::Str(name.to_string())]);
        if !self.extensions.contains(&inst) {
            self.extensions.push(inst);
        }
    }

    pub fn push_ext_import(&mut self, id: u32, name: &str) {
        self.ext_imports.push(Instruction::new(
            Op::ExtInstImport,
            vec![Operand::Id(id), Operand::Str(name.to_string())],
        ));
    }

    pub fn set_memory_model(&mut self, addressing: u32, memory: u32) {
        self.memory_model = Some(Instruction::new(
            Op::MemoryModel,
            vec![Operand::Literal(addressing), Operand::Literal(memory)],
        ));
    }

    pub fn push_entry_point(&mut self, operands: Vec<Operand>) {
        self.entry_points.push(Instruction::new(Op::EntryPoint, operands));
    }

    pub fn push_execution_mode(&mut self, operands: Vec<Operand>) {
        self.execution_modes
            .push(Instruction::new(Op::ExecutionMode, operands));
    }

    pub fn push_debug(&mut self, op: Op, operands: Vec<Operand>) {
        self.debug.push(Instruction::new(op, operands));
    }

    pub fn push_annotation(&mut self, op: Op, operands: Vec<Operand>) {
        self.annotations.push(Instruction::new(op, operands));
    }

    pub fn push_type(&mut self, op: Op, operands: Vec<Operand>) {
        self.types.push(Instruction::new(op, operands));
    }

    pub fn push_global_var(&mut self, operands: Vec<Operand>) {
        self.global_vars
            .push(Instruction::new(Op::Variable, operands));
    }

    pub fn push_function(&mut self, function: Function) {
        self.functions.push(function);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one() {
        let mut m = Module::new();
        assert_eq!(m.next_id(), 1);
        assert_eq!(m.next_id(), 2);
        assert_eq!(m.id_bound(), 3);
    }

    #[test]
    fn capabilities_dedupe() {
        let mut m = Module::new();
        m.push_capability(Capability::Shader);
        m.push_capability(Capability::Float16);
        m.push_capability(Capability::Shader);
        assert_eq!(m.capabilities.len(), 2);
        // Insertion order is preserved.
        let caps: Vec<u32> = m.capabilities.iter().copied().collect();
        assert_eq!(caps, vec![Capability::Shader as u32, Capability::Float16 as u32]);
    }

    #[test]
    fn extensions_dedupe() {
        let mut m = Module::new();
        m.push_extension("SPV_KHR_16bit_storage");
        m.push_extension("SPV_KHR_16bit_storage");
        assert_eq!(m.extensions.len(), 1);
    }
}
