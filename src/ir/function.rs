//! Functions and pipeline stages.

use serde::{Deserialize, Serialize};

use super::block::BlockId;
use super::types::TypeId;
use super::ValueId;

/// Index of a function in the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncId(pub u32);

impl FuncId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Pipeline stage of an entry-point function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Compute { workgroup_size: [u32; 3] },
    Vertex,
    Fragment,
}

/// A SIR function. The body is a single root block; nested control flow
/// hangs off instructions inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<ValueId>,
    pub return_type: TypeId,
    pub block: BlockId,
    pub stage: Option<PipelineStage>,
}
