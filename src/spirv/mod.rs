//! The SPIR-V target format.
//!
//! `opcodes` holds the word tables, `module` the in-progress section buffers,
//! and `writer` the final word-stream assembly.

pub mod module;
pub mod opcodes;
pub mod writer;

pub use module::{Function, Instruction, Module, Operand};
pub use writer::BinaryWriter;
