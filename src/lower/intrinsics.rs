//! Builtin and intrinsic call lowering.
//!
//! Portable builtins resolve to either a GLSL.std.450 extended instruction
//! (imported once, on first use) or a core opcode; a few degrade to
//! passthroughs (`abs` of an unsigned value, scalar `all`/`any`). Intrinsics
//! are already target-shaped and map one-to-one onto their opcode.

use crate::ice;
use crate::ir::{BuiltinFn, Intrinsic, Operand, ScalarKind, ValueId};
use crate::spirv::opcodes::{semantics, Capability, GlslExt, Op, Scope};
use crate::spirv::Operand as SpvOperand;

use super::Generator;

/// Image operand mask bit for an explicit level of detail.
const IMAGE_OPERAND_LOD: u32 = 0x2;

enum Lowered {
    Core(Op),
    Ext(GlslExt),
}

impl<'a> Generator<'a> {
    pub(crate) fn emit_builtin(&mut self, func: BuiltinFn, args: &[Operand], result: ValueId) {
        use BuiltinFn::*;
        use Lowered::{Core, Ext};
        use ScalarKind::*;

        let res_ty = self.ir.value(result).ty;
        let kind = self.types.scalar_kind(res_ty);

        // Passthroughs emit nothing.
        match func {
            Abs if kind == Some(UnsignedInt) => {
                let id = self.op_id(args[0]);
                self.value_ids.insert(result, id);
                return;
            }
            All | Any if self.types.width(self.ir.operand_type(args[0])) == 1 => {
                let id = self.op_id(args[0]);
                self.value_ids.insert(result, id);
                return;
            }
            StorageBarrier => {
                self.emit_barrier(semantics::ACQUIRE_RELEASE | semantics::UNIFORM_MEMORY);
                return;
            }
            WorkgroupBarrier => {
                self.emit_barrier(semantics::ACQUIRE_RELEASE | semantics::WORKGROUP_MEMORY);
                return;
            }
            SubgroupBallot => {
                self.module.push_capability(Capability::GroupNonUniform);
                self.module.push_capability(Capability::GroupNonUniformBallot);
                let scope = self.u32_const(Scope::Subgroup as u32);
                let pred = {
                    let c = self.consts.bool_(&mut self.types, true);
                    self.const_id(c)
                };
                let ty_id = self.type_id(res_ty);
                let rid = self.value_id(result);
                self.current.push_inst(
                    Op::GroupNonUniformBallot,
                    vec![
                        SpvOperand::Id(ty_id),
                        SpvOperand::Id(rid),
                        SpvOperand::Id(scope),
                        SpvOperand::Id(pred),
                    ],
                );
                return;
            }
            _ => {}
        }

        let lowered = match func {
            Abs => match kind {
                Some(Float) => Ext(GlslExt::FAbs),
                Some(SignedInt) => Ext(GlslExt::SAbs),
                _ => ice!("abs of a non-numeric type"),
            },
            Acos => Ext(GlslExt::Acos),
            Acosh => Ext(GlslExt::Acosh),
            All => Core(Op::All),
            Any => Core(Op::Any),
            Asin => Ext(GlslExt::Asin),
            Asinh => Ext(GlslExt::Asinh),
            Atan => Ext(GlslExt::Atan),
            Atan2 => Ext(GlslExt::Atan2),
            Atanh => Ext(GlslExt::Atanh),
            Ceil => Ext(GlslExt::Ceil),
            Clamp => match kind {
                Some(Float) => Ext(GlslExt::NClamp),
                Some(SignedInt) => Ext(GlslExt::SClamp),
                Some(UnsignedInt) => Ext(GlslExt::UClamp),
                _ => ice!("clamp of a non-numeric type"),
            },
            Cos => Ext(GlslExt::Cos),
            Cosh => Ext(GlslExt::Cosh),
            CountOneBits => Core(Op::BitCount),
            Cross => Ext(GlslExt::Cross),
            Degrees => Ext(GlslExt::Degrees),
            Determinant => Ext(GlslExt::Determinant),
            Distance => Ext(GlslExt::Distance),
            Dot => Core(Op::Dot),
            Dpdx => Core(Op::DPdx),
            DpdxCoarse => self.derivative(Op::DPdxCoarse),
            DpdxFine => self.derivative(Op::DPdxFine),
            Dpdy => Core(Op::DPdy),
            DpdyCoarse => self.derivative(Op::DPdyCoarse),
            DpdyFine => self.derivative(Op::DPdyFine),
            Exp => Ext(GlslExt::Exp),
            Exp2 => Ext(GlslExt::Exp2),
            ExtractBits => match kind {
                Some(SignedInt) => Core(Op::BitFieldSExtract),
                Some(UnsignedInt) => Core(Op::BitFieldUExtract),
                _ => ice!("extractBits of a non-integer type"),
            },
            FaceForward => Ext(GlslExt::FaceForward),
            Floor => Ext(GlslExt::Floor),
            Fma => Ext(GlslExt::Fma),
            Fract => Ext(GlslExt::Fract),
            Frexp => Ext(GlslExt::FrexpStruct),
            Fwidth => Core(Op::Fwidth),
            FwidthCoarse => self.derivative(Op::FwidthCoarse),
            FwidthFine => self.derivative(Op::FwidthFine),
            InsertBits => Core(Op::BitFieldInsert),
            InverseSqrt => Ext(GlslExt::InverseSqrt),
            Ldexp => Ext(GlslExt::Ldexp),
            Length => Ext(GlslExt::Length),
            Log => Ext(GlslExt::Log),
            Log2 => Ext(GlslExt::Log2),
            Max => match kind {
                Some(Float) => Ext(GlslExt::FMax),
                Some(SignedInt) => Ext(GlslExt::SMax),
                Some(UnsignedInt) => Ext(GlslExt::UMax),
                _ => ice!("max of a non-numeric type"),
            },
            Min => match kind {
                Some(Float) => Ext(GlslExt::FMin),
                Some(SignedInt) => Ext(GlslExt::SMin),
                Some(UnsignedInt) => Ext(GlslExt::UMin),
                _ => ice!("min of a non-numeric type"),
            },
            Mix => Ext(GlslExt::FMix),
            Modf => Ext(GlslExt::ModfStruct),
            Normalize => Ext(GlslExt::Normalize),
            Pack2x16Float => Ext(GlslExt::PackHalf2x16),
            Pack2x16Snorm => Ext(GlslExt::PackSnorm2x16),
            Pack2x16Unorm => Ext(GlslExt::PackUnorm2x16),
            Pack4x8Snorm => Ext(GlslExt::PackSnorm4x8),
            Pack4x8Unorm => Ext(GlslExt::PackUnorm4x8),
            Pow => Ext(GlslExt::Pow),
            QuantizeToF16 => Core(Op::QuantizeToF16),
            Radians => Ext(GlslExt::Radians),
            Reflect => Ext(GlslExt::Reflect),
            Refract => Ext(GlslExt::Refract),
            ReverseBits => Core(Op::BitReverse),
            // Round follows round-to-even, matching the hardware default.
            Round => Ext(GlslExt::RoundEven),
            Sign => match kind {
                Some(Float) => Ext(GlslExt::FSign),
                Some(SignedInt) => Ext(GlslExt::SSign),
                _ => ice!("sign of a non-numeric type"),
            },
            Sin => Ext(GlslExt::Sin),
            Sinh => Ext(GlslExt::Sinh),
            SmoothStep => Ext(GlslExt::SmoothStep),
            Sqrt => Ext(GlslExt::Sqrt),
            Step => Ext(GlslExt::Step),
            Tan => Ext(GlslExt::Tan),
            Tanh => Ext(GlslExt::Tanh),
            Transpose => Core(Op::Transpose),
            Trunc => Ext(GlslExt::Trunc),
            Unpack2x16Float => Ext(GlslExt::UnpackHalf2x16),
            Unpack2x16Snorm => Ext(GlslExt::UnpackSnorm2x16),
            Unpack2x16Unorm => Ext(GlslExt::UnpackUnorm2x16),
            Unpack4x8Snorm => Ext(GlslExt::UnpackSnorm4x8),
            Unpack4x8Unorm => Ext(GlslExt::UnpackUnorm4x8),
            StorageBarrier | WorkgroupBarrier | SubgroupBallot => unreachable!(),
        };

        let ty_id = self.type_id(res_ty);
        let rid = self.value_id(result);
        let arg_ids: Vec<u32> = args.iter().map(|&a| self.op_id(a)).collect();
        match lowered {
            Core(op) => {
                let mut operands = vec![SpvOperand::Id(ty_id), SpvOperand::Id(rid)];
                operands.extend(arg_ids.into_iter().map(SpvOperand::Id));
                self.current.push_inst(op, operands);
            }
            Ext(inst) => {
                let import = self.glsl_import_id();
                let mut operands = vec![
                    SpvOperand::Id(ty_id),
                    SpvOperand::Id(rid),
                    SpvOperand::Id(import),
                    SpvOperand::Literal(inst as u32),
                ];
                operands.extend(arg_ids.into_iter().map(SpvOperand::Id));
                self.current.push_inst(Op::ExtInst, operands);
            }
        }
    }

    fn derivative(&mut self, op: Op) -> Lowered {
        self.module.push_capability(Capability::DerivativeControl);
        Lowered::Core(op)
    }

    fn emit_barrier(&mut self, sem: u32) {
        let exec = self.u32_const(Scope::Workgroup as u32);
        let mem = exec;
        let sem = self.u32_const(sem);
        self.current.push_inst(
            Op::ControlBarrier,
            vec![SpvOperand::Id(exec), SpvOperand::Id(mem), SpvOperand::Id(sem)],
        );
    }

    fn u32_const(&mut self, value: u32) -> u32 {
        let c = self.consts.u32_(&mut self.types, value);
        self.const_id(c)
    }

    pub(crate) fn emit_intrinsic(
        &mut self,
        op: Intrinsic,
        args: &[Operand],
        result: Option<ValueId>,
    ) {
        use Intrinsic as I;

        let opcode = match op {
            I::ArrayLength => {
                // Operand 2 is the literal member index of the runtime array.
                let Some(result) = result else {
                    ice!("arrayLength without a result");
                };
                let ty_id = {
                    let ty = self.ir.value(result).ty;
                    self.type_id(ty)
                };
                let rid = self.value_id(result);
                let ptr = self.op_id(args[0]);
                let Some(member) = self.const_literal(args[1]) else {
                    ice!("arrayLength member index is not a constant");
                };
                self.current.push_inst(
                    Op::ArrayLength,
                    vec![
                        SpvOperand::Id(ty_id),
                        SpvOperand::Id(rid),
                        SpvOperand::Id(ptr),
                        SpvOperand::Literal(member),
                    ],
                );
                return;
            }
            I::AtomicAnd => Op::AtomicAnd,
            I::AtomicCompareExchange => Op::AtomicCompareExchange,
            I::AtomicExchange => Op::AtomicExchange,
            I::AtomicIAdd => Op::AtomicIAdd,
            I::AtomicISub => Op::AtomicISub,
            I::AtomicLoad => Op::AtomicLoad,
            I::AtomicOr => Op::AtomicOr,
            I::AtomicSMax => Op::AtomicSMax,
            I::AtomicSMin => Op::AtomicSMin,
            I::AtomicStore => Op::AtomicStore,
            I::AtomicUMax => Op::AtomicUMax,
            I::AtomicUMin => Op::AtomicUMin,
            I::AtomicXor => Op::AtomicXor,
            I::Dot => Op::Dot,
            I::ImageDrefGather => Op::ImageDrefGather,
            I::ImageFetch => Op::ImageFetch,
            I::ImageGather => Op::ImageGather,
            I::ImageQueryLevels => self.image_query(Op::ImageQueryLevels),
            I::ImageQuerySamples => self.image_query(Op::ImageQuerySamples),
            I::ImageQuerySize => self.image_query(Op::ImageQuerySize),
            I::ImageQuerySizeLod => self.image_query(Op::ImageQuerySizeLod),
            I::ImageSampleDrefExplicitLod => Op::ImageSampleDrefExplicitLod,
            I::ImageSampleDrefImplicitLod => Op::ImageSampleDrefImplicitLod,
            I::ImageSampleExplicitLod => Op::ImageSampleExplicitLod,
            I::ImageSampleImplicitLod => Op::ImageSampleImplicitLod,
            I::ImageWrite => Op::ImageWrite,
            I::MatrixTimesMatrix => Op::MatrixTimesMatrix,
            I::MatrixTimesScalar => Op::MatrixTimesScalar,
            I::MatrixTimesVector => Op::MatrixTimesVector,
            I::SampledImage => Op::SampledImage,
            I::Select => Op::Select,
            I::VectorTimesMatrix => Op::VectorTimesMatrix,
            I::VectorTimesScalar => Op::VectorTimesScalar,
        };

        // Explicit-lod forms split a trailing lod argument behind the image
        // operand mask.
        let lod_split = match op {
            I::ImageSampleExplicitLod => Some(2),
            I::ImageSampleDrefExplicitLod => Some(3),
            I::ImageFetch if args.len() == 3 => Some(2),
            _ => None,
        };

        let mut operands = Vec::new();
        if let Some(result) = result {
            let ty = self.ir.value(result).ty;
            let ty_id = self.type_id(ty);
            let rid = self.value_id(result);
            operands.push(SpvOperand::Id(ty_id));
            operands.push(SpvOperand::Id(rid));
        }
        for (index, &arg) in args.iter().enumerate() {
            if lod_split == Some(index) {
                operands.push(SpvOperand::Literal(IMAGE_OPERAND_LOD));
            }
            let id = self.op_id(arg);
            operands.push(SpvOperand::Id(id));
        }
        self.current.push_inst(opcode, operands);
    }

    fn image_query(&mut self, op: Op) -> Op {
        self.module.push_capability(Capability::ImageQuery);
        op
    }
}
