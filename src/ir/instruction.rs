//! SIR instructions and terminators.
//!
//! Instructions live inside blocks; control-flow constructs (`If`, `Loop`,
//! `Switch`) are themselves instructions that own their child blocks, so a
//! function body is a tree of single-entry regions rather than a flat CFG.
//! Every block ends in exactly one [`Terminator`].

use serde::{Deserialize, Serialize};

use super::block::BlockId;
use super::constant::ConstId;
use super::function::FuncId;
use super::ValueId;

/// An instruction operand: either an interned constant or a runtime value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    Const(ConstId),
    Value(ValueId),
}

/// Resource binding point for module-scope variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingPoint {
    pub group: u32,
    pub binding: u32,
}

/// Binary operators. The lowering step picks the concrete opcode from the
/// operand scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    ShiftLeft,
    ShiftRight,
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Bitwise complement.
    Complement,
    /// Arithmetic or logical negation.
    Negate,
}

/// Portable builtin functions, resolved to GLSL.std.450 instructions or core
/// opcodes during lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinFn {
    Abs,
    Acos,
    Acosh,
    All,
    Any,
    Asin,
    Asinh,
    Atan,
    Atan2,
    Atanh,
    Ceil,
    Clamp,
    Cos,
    Cosh,
    CountOneBits,
    Cross,
    Degrees,
    Determinant,
    Distance,
    Dot,
    Dpdx,
    DpdxCoarse,
    DpdxFine,
    Dpdy,
    DpdyCoarse,
    DpdyFine,
    Exp,
    Exp2,
    ExtractBits,
    FaceForward,
    Floor,
    Fma,
    Fract,
    Frexp,
    Fwidth,
    FwidthCoarse,
    FwidthFine,
    InsertBits,
    InverseSqrt,
    Ldexp,
    Length,
    Log,
    Log2,
    Max,
    Min,
    Mix,
    Modf,
    Normalize,
    Pack2x16Float,
    Pack2x16Snorm,
    Pack2x16Unorm,
    Pack4x8Snorm,
    Pack4x8Unorm,
    Pow,
    QuantizeToF16,
    Radians,
    Reflect,
    Refract,
    ReverseBits,
    Round,
    Sign,
    Sin,
    Sinh,
    SmoothStep,
    Sqrt,
    Step,
    StorageBarrier,
    SubgroupBallot,
    Tan,
    Tanh,
    Transpose,
    Trunc,
    Unpack2x16Float,
    Unpack2x16Snorm,
    Unpack2x16Unorm,
    Unpack4x8Snorm,
    Unpack4x8Unorm,
    WorkgroupBarrier,
}

/// Pre-resolved target operations. Operands map one-to-one onto the emitted
/// instruction's operands, scope and semantics constants included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intrinsic {
    ArrayLength,
    AtomicAnd,
    AtomicCompareExchange,
    AtomicExchange,
    AtomicIAdd,
    AtomicISub,
    AtomicLoad,
    AtomicOr,
    AtomicSMax,
    AtomicSMin,
    AtomicStore,
    AtomicUMax,
    AtomicUMin,
    AtomicXor,
    Dot,
    ImageDrefGather,
    ImageFetch,
    ImageGather,
    ImageQueryLevels,
    ImageQuerySamples,
    ImageQuerySize,
    ImageQuerySizeLod,
    ImageSampleDrefExplicitLod,
    ImageSampleDrefImplicitLod,
    ImageSampleExplicitLod,
    ImageSampleImplicitLod,
    ImageWrite,
    MatrixTimesMatrix,
    MatrixTimesScalar,
    MatrixTimesVector,
    SampledImage,
    Select,
    VectorTimesMatrix,
    VectorTimesScalar,
}

impl Intrinsic {
    /// True if the operation produces no value.
    pub fn is_void(self) -> bool {
        matches!(self, Intrinsic::AtomicStore | Intrinsic::ImageWrite)
    }
}

/// IO attributes of a stage input or output variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoAttributes {
    pub location: Option<u32>,
    pub builtin: Option<super::types::BuiltinValue>,
    pub interpolation: Option<super::types::Interpolation>,
    pub invariant: bool,
}

/// A variable declaration. `result` is pointer-typed; module-scope variables
/// live in the module root block and may carry a binding point or IO
/// attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Var {
    pub result: ValueId,
    pub initializer: Option<Operand>,
    pub binding: Option<BindingPoint>,
    pub io: Option<IoAttributes>,
}

/// A two-way conditional construct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct If {
    pub condition: Operand,
    pub true_block: BlockId,
    pub false_block: BlockId,
    /// Values carried out of the construct by `ExitIf` edges.
    pub results: Vec<ValueId>,
}

/// A loop construct. The initializer runs once; the body loops; the
/// continuing block runs between iterations and owns the back-edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loop {
    pub initializer: Option<BlockId>,
    pub body: BlockId,
    pub continuing: BlockId,
    pub results: Vec<ValueId>,
}

/// A case selector: a constant value or the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseSelector {
    Value(ConstId),
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub selectors: Vec<CaseSelector>,
    pub block: BlockId,
}

/// A multi-way switch construct. Exactly one case must carry the default
/// selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Switch {
    pub condition: Operand,
    pub cases: Vec<Case>,
    pub results: Vec<ValueId>,
}

/// A SIR instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inst {
    Binary {
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
        result: ValueId,
    },
    Unary {
        op: UnaryOp,
        value: Operand,
        result: ValueId,
    },
    Bitcast {
        value: Operand,
        result: ValueId,
    },
    Convert {
        value: Operand,
        result: ValueId,
    },
    Construct {
        args: Vec<Operand>,
        result: ValueId,
    },
    Access {
        base: Operand,
        indices: Vec<Operand>,
        result: ValueId,
    },
    Swizzle {
        object: Operand,
        indices: Vec<u32>,
        result: ValueId,
    },
    Load {
        source: Operand,
        result: ValueId,
    },
    LoadVectorElement {
        pointer: Operand,
        index: Operand,
        result: ValueId,
    },
    Store {
        target: Operand,
        value: Operand,
    },
    StoreVectorElement {
        pointer: Operand,
        index: Operand,
        value: Operand,
    },
    Var(Var),
    /// A named alias; emits no code, only a debug name.
    Let {
        value: Operand,
        result: ValueId,
    },
    Call {
        callee: FuncId,
        args: Vec<Operand>,
        result: ValueId,
    },
    Builtin {
        func: BuiltinFn,
        args: Vec<Operand>,
        result: ValueId,
    },
    Intrinsic {
        op: Intrinsic,
        args: Vec<Operand>,
        result: Option<ValueId>,
    },
    If(If),
    Loop(Loop),
    Switch(Switch),
}

impl Inst {
    /// The single result value, for instructions that have one.
    pub fn result(&self) -> Option<ValueId> {
        match self {
            Inst::Binary { result, .. }
            | Inst::Unary { result, .. }
            | Inst::Bitcast { result, .. }
            | Inst::Convert { result, .. }
            | Inst::Construct { result, .. }
            | Inst::Access { result, .. }
            | Inst::Swizzle { result, .. }
            | Inst::Load { result, .. }
            | Inst::LoadVectorElement { result, .. }
            | Inst::Let { result, .. }
            | Inst::Call { result, .. }
            | Inst::Builtin { result, .. } => Some(*result),
            Inst::Var(var) => Some(var.result),
            Inst::Intrinsic { result, .. } => *result,
            Inst::Store { .. } | Inst::StoreVectorElement { .. } => None,
            Inst::If(_) | Inst::Loop(_) | Inst::Switch(_) => None,
        }
    }

    /// Child blocks of a control-flow construct, in emission order.
    pub fn child_blocks(&self) -> Vec<BlockId> {
        match self {
            Inst::If(i) => vec![i.true_block, i.false_block],
            Inst::Loop(l) => {
                let mut blocks = Vec::new();
                if let Some(init) = l.initializer {
                    blocks.push(init);
                }
                blocks.push(l.body);
                blocks.push(l.continuing);
                blocks
            }
            Inst::Switch(s) => s.cases.iter().map(|c| c.block).collect(),
            _ => Vec::new(),
        }
    }
}

/// Block terminators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminator {
    /// Return from the function.
    Return { value: Option<Operand> },
    /// Leave the innermost enclosing `If`, carrying its result values.
    ExitIf { args: Vec<Operand> },
    /// Leave the innermost enclosing `Loop`, carrying its result values.
    ExitLoop { args: Vec<Operand> },
    /// Leave the innermost enclosing `Switch`, carrying its result values.
    ExitSwitch { args: Vec<Operand> },
    /// Branch from the loop body to the continuing block.
    Continue { args: Vec<Operand> },
    /// Back-edge to the loop header, carrying next-iteration body params.
    NextIteration { args: Vec<Operand> },
    /// Conditional loop exit from the continuing block: leave if the
    /// condition holds, otherwise take the back-edge with `args`.
    BreakIf { condition: Operand, args: Vec<Operand> },
    /// Statically unreachable.
    Unreachable,
    /// Fragment discard.
    TerminateInvocation,
}

impl Terminator {
    /// Arguments carried out of a construct by an exit edge.
    pub fn exit_args(&self) -> Option<&[Operand]> {
        match self {
            Terminator::ExitIf { args }
            | Terminator::ExitLoop { args }
            | Terminator::ExitSwitch { args } => Some(args),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_accessor() {
        let v = ValueId(7);
        let inst = Inst::Load {
            source: Operand::Value(ValueId(1)),
            result: v,
        };
        assert_eq!(inst.result(), Some(v));

        let store = Inst::Store {
            target: Operand::Value(ValueId(1)),
            value: Operand::Value(ValueId(2)),
        };
        assert_eq!(store.result(), None);
    }

    #[test]
    fn loop_child_blocks_in_order() {
        let l = Inst::Loop(Loop {
            initializer: Some(BlockId(1)),
            body: BlockId(2),
            continuing: BlockId(3),
            results: vec![],
        });
        assert_eq!(l.child_blocks(), vec![BlockId(1), BlockId(2), BlockId(3)]);
    }

    #[test]
    fn void_intrinsics() {
        assert!(Intrinsic::AtomicStore.is_void());
        assert!(Intrinsic::ImageWrite.is_void());
        assert!(!Intrinsic::AtomicIAdd.is_void());
    }
}
