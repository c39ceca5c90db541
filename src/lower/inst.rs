//! Lowering of straight-line instructions.
//!
//! Opcode families are picked from operand scalar kinds: arithmetic follows
//! the result type, comparisons and shifts follow the left operand. Identity
//! conversions (bitcast to the same type, single-operand construct) emit
//! nothing and alias the result to its operand.

use crate::ice;
use crate::ir::{
    AddressSpace, BinaryOp, ConstData, Inst, Operand, ScalarKind, Type, TypeId, UnaryOp, ValueId,
    Var,
};
use crate::spirv::opcodes::{Decoration, Op, StorageClass};
use crate::spirv::Operand as SpvOperand;

use super::types::interpolation_decorations;
use super::Generator;

pub(crate) fn storage_class(space: AddressSpace) -> StorageClass {
    match space {
        AddressSpace::Function => StorageClass::Function,
        AddressSpace::Private => StorageClass::Private,
        AddressSpace::In => StorageClass::Input,
        AddressSpace::Out => StorageClass::Output,
        AddressSpace::Uniform => StorageClass::Uniform,
        AddressSpace::Storage => StorageClass::StorageBuffer,
        AddressSpace::Workgroup => StorageClass::Workgroup,
        AddressSpace::Handle => StorageClass::UniformConstant,
        AddressSpace::PushConstant => StorageClass::PushConstant,
    }
}

impl<'a> Generator<'a> {
    pub(crate) fn emit_inst(&mut self, inst: &'a Inst) {
        match inst {
            Inst::Binary { op, lhs, rhs, result } => self.emit_binary(*op, *lhs, *rhs, *result),
            Inst::Unary { op, value, result } => self.emit_unary(*op, *value, *result),
            Inst::Bitcast { value, result } => self.emit_bitcast(*value, *result),
            Inst::Convert { value, result } => self.emit_convert(*value, *result),
            Inst::Construct { args, result } => self.emit_construct(args, *result),
            Inst::Access { base, indices, result } => self.emit_access(*base, indices, *result),
            Inst::Swizzle { object, indices, result } => {
                self.emit_swizzle(*object, indices, *result)
            }
            Inst::Load { source, result } => self.emit_load(*source, *result),
            Inst::LoadVectorElement { pointer, index, result } => {
                self.emit_load_vector_element(*pointer, *index, *result)
            }
            Inst::Store { target, value } => self.emit_store(*target, *value),
            Inst::StoreVectorElement { pointer, index, value } => {
                self.emit_store_vector_element(*pointer, *index, *value)
            }
            Inst::Var(var) => self.emit_var(var),
            Inst::Let { value, result } => self.emit_let(*value, *result),
            Inst::Call { callee, args, result } => {
                let ty = self.ir.value(*result).ty;
                let ty_id = self.type_id(ty);
                let rid = self.value_id(*result);
                let fid = self.function_ids[callee];
                let mut operands = vec![
                    SpvOperand::Id(ty_id),
                    SpvOperand::Id(rid),
                    SpvOperand::Id(fid),
                ];
                for &arg in args {
                    let id = self.op_id(arg);
                    operands.push(SpvOperand::Id(id));
                }
                self.current.push_inst(Op::FunctionCall, operands);
            }
            Inst::Builtin { func, args, result } => self.emit_builtin(*func, args, *result),
            Inst::Intrinsic { op, args, result } => self.emit_intrinsic(*op, args, *result),
            Inst::If(_) | Inst::Loop(_) | Inst::Switch(_) => {
                ice!("control construct reached plain instruction dispatch")
            }
        }
    }

    fn emit_binary(&mut self, op: BinaryOp, lhs: Operand, rhs: Operand, result: ValueId) {
        use BinaryOp::*;
        let res_ty = self.ir.value(result).ty;
        let res_kind = self.types.scalar_kind(res_ty);
        let lhs_kind = self.types.scalar_kind(self.ir.operand_type(lhs));

        let opcode = match op {
            Add => arith(res_kind, Op::FAdd, Op::IAdd, Op::IAdd, None),
            Sub => arith(res_kind, Op::FSub, Op::ISub, Op::ISub, None),
            Mul => arith(res_kind, Op::FMul, Op::IMul, Op::IMul, None),
            Div => arith(res_kind, Op::FDiv, Op::SDiv, Op::UDiv, None),
            Mod => arith(res_kind, Op::FRem, Op::SRem, Op::UMod, None),
            And => arith(
                res_kind,
                Op::BitwiseAnd,
                Op::BitwiseAnd,
                Op::BitwiseAnd,
                Some(Op::LogicalAnd),
            ),
            Or => arith(
                res_kind,
                Op::BitwiseOr,
                Op::BitwiseOr,
                Op::BitwiseOr,
                Some(Op::LogicalOr),
            ),
            Xor => Op::BitwiseXor,
            ShiftLeft => Op::ShiftLeftLogical,
            ShiftRight => match lhs_kind {
                Some(ScalarKind::SignedInt) => Op::ShiftRightArithmetic,
                _ => Op::ShiftRightLogical,
            },
            Equal => arith(
                lhs_kind,
                Op::FOrdEqual,
                Op::IEqual,
                Op::IEqual,
                Some(Op::LogicalEqual),
            ),
            NotEqual => arith(
                lhs_kind,
                Op::FOrdNotEqual,
                Op::INotEqual,
                Op::INotEqual,
                Some(Op::LogicalNotEqual),
            ),
            LessThan => arith(lhs_kind, Op::FOrdLessThan, Op::SLessThan, Op::ULessThan, None),
            LessThanEqual => arith(
                lhs_kind,
                Op::FOrdLessThanEqual,
                Op::SLessThanEqual,
                Op::ULessThanEqual,
                None,
            ),
            GreaterThan => arith(
                lhs_kind,
                Op::FOrdGreaterThan,
                Op::SGreaterThan,
                Op::UGreaterThan,
                None,
            ),
            GreaterThanEqual => arith(
                lhs_kind,
                Op::FOrdGreaterThanEqual,
                Op::SGreaterThanEqual,
                Op::UGreaterThanEqual,
                None,
            ),
        };

        let ty_id = self.type_id(res_ty);
        let rid = self.value_id(result);
        let lhs_id = self.op_id(lhs);
        let rhs_id = self.op_id(rhs);
        self.current.push_inst(
            opcode,
            vec![
                SpvOperand::Id(ty_id),
                SpvOperand::Id(rid),
                SpvOperand::Id(lhs_id),
                SpvOperand::Id(rhs_id),
            ],
        );
    }

    fn emit_unary(&mut self, op: UnaryOp, value: Operand, result: ValueId) {
        let res_ty = self.ir.value(result).ty;
        let kind = self.types.scalar_kind(res_ty);
        let opcode = match op {
            UnaryOp::Complement => Op::Not,
            UnaryOp::Negate => match kind {
                Some(ScalarKind::Float) => Op::FNegate,
                Some(ScalarKind::SignedInt) => Op::SNegate,
                Some(ScalarKind::Bool) => Op::LogicalNot,
                _ => ice!("negation of an unsigned or non-scalar type"),
            },
        };
        let ty_id = self.type_id(res_ty);
        let rid = self.value_id(result);
        let vid = self.op_id(value);
        self.current.push_inst(
            opcode,
            vec![SpvOperand::Id(ty_id), SpvOperand::Id(rid), SpvOperand::Id(vid)],
        );
    }

    fn emit_bitcast(&mut self, value: Operand, result: ValueId) {
        let res_ty = self.ir.value(result).ty;
        let src_ty = self.ir.operand_type(value);
        if res_ty == src_ty {
            let id = self.op_id(value);
            self.value_ids.insert(result, id);
            return;
        }
        let ty_id = self.type_id(res_ty);
        let rid = self.value_id(result);
        let vid = self.op_id(value);
        self.current.push_inst(
            Op::Bitcast,
            vec![SpvOperand::Id(ty_id), SpvOperand::Id(rid), SpvOperand::Id(vid)],
        );
    }

    fn emit_convert(&mut self, value: Operand, result: ValueId) {
        use ScalarKind::*;
        let res_ty = self.ir.value(result).ty;
        let src_ty = self.ir.operand_type(value);
        let res_kind = self.types.scalar_kind(res_ty);
        let src_kind = self.types.scalar_kind(src_ty);

        let ty_id = self.type_id(res_ty);
        let opcode = match (src_kind, res_kind) {
            (Some(Float), Some(Float)) => Op::FConvert,
            (Some(Float), Some(SignedInt)) => Op::ConvertFToS,
            (Some(Float), Some(UnsignedInt)) => Op::ConvertFToU,
            (Some(SignedInt), Some(Float)) => Op::ConvertSToF,
            (Some(UnsignedInt), Some(Float)) => Op::ConvertUToF,
            (Some(SignedInt), Some(UnsignedInt)) | (Some(UnsignedInt), Some(SignedInt)) => {
                Op::Bitcast
            }
            (Some(Float), Some(Bool)) | (Some(SignedInt), Some(Bool))
            | (Some(UnsignedInt), Some(Bool)) => {
                // Non-zero test against the zero value of the source type.
                let zero = self.const_null(src_ty);
                let cmp = if src_kind == Some(Float) {
                    Op::FUnordNotEqual
                } else {
                    Op::INotEqual
                };
                let rid = self.value_id(result);
                let vid = self.op_id(value);
                self.current.push_inst(
                    cmp,
                    vec![
                        SpvOperand::Id(ty_id),
                        SpvOperand::Id(rid),
                        SpvOperand::Id(vid),
                        SpvOperand::Id(zero),
                    ],
                );
                return;
            }
            (Some(Bool), Some(Float)) | (Some(Bool), Some(SignedInt))
            | (Some(Bool), Some(UnsignedInt)) => {
                // Bool widens by selecting between one and zero.
                let one = self.one_constant(res_ty);
                let zero = self.const_null(res_ty);
                let rid = self.value_id(result);
                let vid = self.op_id(value);
                self.current.push_inst(
                    Op::Select,
                    vec![
                        SpvOperand::Id(ty_id),
                        SpvOperand::Id(rid),
                        SpvOperand::Id(vid),
                        SpvOperand::Id(one),
                        SpvOperand::Id(zero),
                    ],
                );
                return;
            }
            _ => ice!("unsupported conversion pairing"),
        };
        let rid = self.value_id(result);
        let vid = self.op_id(value);
        self.current.push_inst(
            opcode,
            vec![SpvOperand::Id(ty_id), SpvOperand::Id(rid), SpvOperand::Id(vid)],
        );
    }

    /// Constant 1 of a scalar or vector type.
    fn one_constant(&mut self, ty: TypeId) -> u32 {
        let elem = self.types.deepest_element(ty);
        let elem_ty = self.types.get(elem).clone();
        let one = match elem_ty {
            Type::F32 => self.consts.f32_(&mut self.types, 1.0),
            Type::F16 => self.consts.intern(crate::ir::Constant {
                ty: elem,
                data: ConstData::F16(0x3c00),
            }),
            Type::I32 => self.consts.i32_(&mut self.types, 1),
            Type::U32 => self.consts.u32_(&mut self.types, 1),
            _ => ice!("constant one of a non-numeric type"),
        };
        let width = self.types.width(ty);
        let one = if width > 1 {
            self.consts.splat(&mut self.types, one, width)
        } else {
            one
        };
        self.const_id(one)
    }

    fn emit_construct(&mut self, args: &[Operand], result: ValueId) {
        let res_ty = self.ir.value(result).ty;
        if let [single] = args {
            if self.ir.operand_type(*single) == res_ty {
                let id = self.op_id(*single);
                self.value_ids.insert(result, id);
                return;
            }
        }
        let ty_id = self.type_id(res_ty);
        let rid = self.value_id(result);
        let mut operands = vec![SpvOperand::Id(ty_id), SpvOperand::Id(rid)];
        for &arg in args {
            let id = self.op_id(arg);
            operands.push(SpvOperand::Id(id));
        }
        self.current.push_inst(Op::CompositeConstruct, operands);
    }

    fn emit_access(&mut self, base: Operand, indices: &[Operand], result: ValueId) {
        let res_ty = self.ir.value(result).ty;
        let base_ty = self.ir.operand_type(base);
        let base_id = self.op_id(base);

        if self.types.is_pointer(base_ty) {
            let ty_id = self.type_id(res_ty);
            let rid = self.value_id(result);
            let mut operands = vec![
                SpvOperand::Id(ty_id),
                SpvOperand::Id(rid),
                SpvOperand::Id(base_id),
            ];
            for &index in indices {
                let id = self.op_id(index);
                operands.push(SpvOperand::Id(id));
            }
            self.current.push_inst(Op::AccessChain, operands);
            return;
        }

        // Value-space access: constant indices fold into one composite
        // extract; a dynamic index is only valid on a vector and flushes the
        // pending chain first.
        let mut literals: Vec<u32> = Vec::new();
        let mut current_ty = base_ty;
        let mut current_id = base_id;
        for &index in indices {
            match self.const_literal(index) {
                Some(literal) => {
                    current_ty = self.step_type(current_ty, literal);
                    literals.push(literal);
                }
                None => {
                    if !literals.is_empty() {
                        let inter_ty = self.type_id(current_ty);
                        let inter = self.module.next_id();
                        let mut operands = vec![
                            SpvOperand::Id(inter_ty),
                            SpvOperand::Id(inter),
                            SpvOperand::Id(current_id),
                        ];
                        operands.extend(literals.drain(..).map(SpvOperand::Literal));
                        self.current.push_inst(Op::CompositeExtract, operands);
                        current_id = inter;
                    }
                    let ty_id = self.type_id(res_ty);
                    let rid = self.value_id(result);
                    let idx = self.op_id(index);
                    self.current.push_inst(
                        Op::VectorExtractDynamic,
                        vec![
                            SpvOperand::Id(ty_id),
                            SpvOperand::Id(rid),
                            SpvOperand::Id(current_id),
                            SpvOperand::Id(idx),
                        ],
                    );
                    return;
                }
            }
        }
        let ty_id = self.type_id(res_ty);
        let rid = self.value_id(result);
        let mut operands = vec![
            SpvOperand::Id(ty_id),
            SpvOperand::Id(rid),
            SpvOperand::Id(current_id),
        ];
        operands.extend(literals.into_iter().map(SpvOperand::Literal));
        self.current.push_inst(Op::CompositeExtract, operands);
    }

    pub(crate) fn const_literal(&self, operand: Operand) -> Option<u32> {
        let Operand::Const(c) = operand else { return None };
        match self.consts.get(c).data {
            ConstData::I32(v) => Some(v as u32),
            ConstData::U32(v) => Some(v),
            _ => None,
        }
    }

    fn step_type(&self, ty: TypeId, index: u32) -> TypeId {
        match self.types.get(ty) {
            Type::Struct(st) => st.members[index as usize].ty,
            Type::Vector { elem, .. } => *elem,
            Type::Matrix { column, .. } => *column,
            Type::Array { elem, .. } => *elem,
            _ => ice!("access into a non-composite type"),
        }
    }

    fn emit_swizzle(&mut self, object: Operand, indices: &[u32], result: ValueId) {
        let res_ty = self.ir.value(result).ty;
        let ty_id = self.type_id(res_ty);
        let rid = self.value_id(result);
        let oid = self.op_id(object);
        let mut operands = vec![
            SpvOperand::Id(ty_id),
            SpvOperand::Id(rid),
            SpvOperand::Id(oid),
            SpvOperand::Id(oid),
        ];
        operands.extend(indices.iter().map(|&i| SpvOperand::Literal(i)));
        self.current.push_inst(Op::VectorShuffle, operands);
    }

    fn emit_load(&mut self, source: Operand, result: ValueId) {
        let res_ty = self.ir.value(result).ty;
        let ty_id = self.type_id(res_ty);
        let rid = self.value_id(result);
        let sid = self.op_id(source);
        self.current.push_inst(
            Op::Load,
            vec![SpvOperand::Id(ty_id), SpvOperand::Id(rid), SpvOperand::Id(sid)],
        );
    }

    fn emit_store(&mut self, target: Operand, value: Operand) {
        let tid = self.op_id(target);
        let vid = self.op_id(value);
        self.current
            .push_inst(Op::Store, vec![SpvOperand::Id(tid), SpvOperand::Id(vid)]);
    }

    // Vector element accesses synthesize a pointer to the element type in
    // the scratch registry; the input module never sees it.
    fn element_pointer(&mut self, pointer: Operand, elem: TypeId) -> u32 {
        let ptr_ty = self.ir.operand_type(pointer);
        let Type::Pointer { space, .. } = *self.types.get(ptr_ty) else {
            ice!("vector element access through a non-pointer");
        };
        let elem_ptr = self.types.pointer(space, elem);
        self.type_id(elem_ptr)
    }

    fn emit_load_vector_element(&mut self, pointer: Operand, index: Operand, result: ValueId) {
        let res_ty = self.ir.value(result).ty;
        let elem_ptr_ty = self.element_pointer(pointer, res_ty);
        let chain = self.module.next_id();
        let pid = self.op_id(pointer);
        let idx = self.op_id(index);
        self.current.push_inst(
            Op::AccessChain,
            vec![
                SpvOperand::Id(elem_ptr_ty),
                SpvOperand::Id(chain),
                SpvOperand::Id(pid),
                SpvOperand::Id(idx),
            ],
        );
        let ty_id = self.type_id(res_ty);
        let rid = self.value_id(result);
        self.current.push_inst(
            Op::Load,
            vec![SpvOperand::Id(ty_id), SpvOperand::Id(rid), SpvOperand::Id(chain)],
        );
    }

    fn emit_store_vector_element(&mut self, pointer: Operand, index: Operand, value: Operand) {
        let elem_ty = self.ir.operand_type(value);
        let elem_ptr_ty = self.element_pointer(pointer, elem_ty);
        let chain = self.module.next_id();
        let pid = self.op_id(pointer);
        let idx = self.op_id(index);
        self.current.push_inst(
            Op::AccessChain,
            vec![
                SpvOperand::Id(elem_ptr_ty),
                SpvOperand::Id(chain),
                SpvOperand::Id(pid),
                SpvOperand::Id(idx),
            ],
        );
        let vid = self.op_id(value);
        self.current
            .push_inst(Op::Store, vec![SpvOperand::Id(chain), SpvOperand::Id(vid)]);
    }

    fn emit_let(&mut self, value: Operand, result: ValueId) {
        let id = self.op_id(value);
        self.value_ids.insert(result, id);
        if let Some(name) = &self.ir.value(result).name {
            self.module.push_debug(
                Op::Name,
                vec![SpvOperand::Id(id), SpvOperand::Str(name.clone())],
            );
        }
    }

    pub(crate) fn emit_var(&mut self, var: &Var) {
        let ir = self.ir;
        let ptr_ty = ir.value(var.result).ty;
        let Type::Pointer { space, store } = *ir.types.get(ptr_ty) else {
            ice!("var result is not pointer-typed");
        };
        let ty_id = self.type_id(ptr_ty);
        let id = self.value_id(var.result);
        let class = storage_class(space);

        let mut operands = vec![
            SpvOperand::Id(ty_id),
            SpvOperand::Id(id),
            SpvOperand::Literal(class as u32),
        ];

        match space {
            AddressSpace::Function => {
                let mut store_after = None;
                match var.initializer {
                    Some(Operand::Const(c)) => {
                        let init = self.const_id(c);
                        operands.push(SpvOperand::Id(init));
                    }
                    Some(Operand::Value(_)) => store_after = var.initializer,
                    None => {}
                }
                self.current.push_var(operands);
                if let Some(init) = store_after {
                    let vid = self.op_id(init);
                    self.current
                        .push_inst(Op::Store, vec![SpvOperand::Id(id), SpvOperand::Id(vid)]);
                }
            }
            AddressSpace::Private | AddressSpace::PushConstant => {
                match var.initializer {
                    Some(Operand::Const(c)) => {
                        let init = self.const_id(c);
                        operands.push(SpvOperand::Id(init));
                    }
                    Some(Operand::Value(_)) => {
                        ice!("module-scope var with a runtime initializer")
                    }
                    None => {}
                }
                self.module.push_global_var(operands);
            }
            AddressSpace::Workgroup => {
                if self.options.zero_init_workgroup_memory {
                    let null = self.const_null(store);
                    operands.push(SpvOperand::Id(null));
                }
                self.module.push_global_var(operands);
            }
            AddressSpace::In | AddressSpace::Out => {
                if let Some(io) = var.io {
                    if let Some(location) = io.location {
                        self.decorate(id, Decoration::Location, &[location]);
                    }
                    if let Some(builtin) = io.builtin {
                        let word = self.builtin_word(builtin, space == AddressSpace::In);
                        self.decorate(id, Decoration::BuiltIn, &[word]);
                    }
                    if let Some(interpolation) = io.interpolation {
                        for (dec, lits) in interpolation_decorations(interpolation) {
                            if dec == Decoration::Sample {
                                self.module.push_capability(
                                    crate::spirv::opcodes::Capability::SampleRateShading,
                                );
                            }
                            self.decorate(id, dec, &lits);
                        }
                    }
                    if io.invariant {
                        self.decorate(id, Decoration::Invariant, &[]);
                    }
                }
                self.module.push_global_var(operands);
            }
            AddressSpace::Uniform | AddressSpace::Storage | AddressSpace::Handle => {
                let Some(binding) = var.binding else {
                    ice!("resource var without a binding point");
                };
                self.decorate(id, Decoration::DescriptorSet, &[binding.group]);
                self.decorate(id, Decoration::Binding, &[binding.binding]);
                self.module.push_global_var(operands);
            }
        }
    }

    fn decorate(&mut self, id: u32, dec: Decoration, literals: &[u32]) {
        let mut operands = vec![SpvOperand::Id(id), SpvOperand::Literal(dec as u32)];
        operands.extend(literals.iter().map(|&l| SpvOperand::Literal(l)));
        self.module.push_annotation(Op::Decorate, operands);
    }
}

/// Pick an opcode by scalar kind.
fn arith(
    kind: Option<ScalarKind>,
    float: Op,
    signed: Op,
    unsigned: Op,
    boolean: Option<Op>,
) -> Op {
    match kind {
        Some(ScalarKind::Float) => float,
        Some(ScalarKind::SignedInt) => signed,
        Some(ScalarKind::UnsignedInt) => unsigned,
        Some(ScalarKind::Bool) => match boolean {
            Some(op) => op,
            None => ice!("boolean operands for a non-boolean operator"),
        },
        None => ice!("binary operator on a non-scalar type"),
    }
}
