//! Basic blocks.

use serde::{Deserialize, Serialize};

use super::instruction::{Inst, Terminator};
use super::ValueId;

/// Index of a block in the module arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A single-entry block.
///
/// `params` are the block parameter values of a loop body (set on each
/// iteration by the back-edge). A block with no instructions and no
/// terminator is a statically dead end and lowers to an unreachable label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub params: Vec<ValueId>,
    pub insts: Vec<Inst>,
    pub terminator: Option<Terminator>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty() && self.terminator.is_none()
    }
}
