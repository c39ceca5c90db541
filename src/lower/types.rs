//! Type and constant interning.
//!
//! Every lookup canonicalizes first and memoizes second, so equivalent types
//! share one declaration: atomics intern as their inner type, depth textures
//! as the matching sampled texture, comparison samplers as plain samplers.
//! First interning of a type carries its side effects with it (stride and
//! layout decorations, capability requirements, debug names).

use crate::ice;
use crate::ir::{
    ArrayCount, ConstData, ConstId, Interpolation, InterpolationSampling, InterpolationType,
    StructType, TexelFormat, TextureDimension, Type, TypeId,
};
use crate::spirv::opcodes::{BuiltIn, Capability, Decoration, Dim, ImageFormat, Op};
use crate::spirv::Operand as SpvOperand;

use super::Generator;

impl Generator<'_> {
    /// SPIR-V id of a type, interning it on first use.
    pub(crate) fn type_id(&mut self, ty: TypeId) -> u32 {
        let ty = self.dedup_type(ty);
        if let Some(&id) = self.type_ids.get(&ty) {
            return id;
        }
        let id = self.emit_type(ty);
        self.type_ids.insert(ty, id);
        id
    }

    /// Canonical form of a type for emission purposes.
    fn dedup_type(&mut self, ty: TypeId) -> TypeId {
        match self.types.get(ty).clone() {
            Type::Atomic { inner } => self.dedup_type(inner),
            Type::DepthTexture { dim } => {
                let f32 = self.types.f32();
                self.types.register(Type::SampledTexture { dim, sampled: f32 })
            }
            Type::DepthMultisampledTexture { dim } => {
                let f32 = self.types.f32();
                self.types
                    .register(Type::MultisampledTexture { dim, sampled: f32 })
            }
            Type::Sampler { comparison: true } => {
                self.types.register(Type::Sampler { comparison: false })
            }
            Type::SampledImage { image } => {
                let image = self.dedup_type(image);
                self.types.register(Type::SampledImage { image })
            }
            Type::Pointer { space, store } => {
                let store = self.dedup_type(store);
                self.types.register(Type::Pointer { space, store })
            }
            Type::Array { elem, count, stride } => {
                let elem = self.dedup_type(elem);
                self.types.register(Type::Array { elem, count, stride })
            }
            _ => ty,
        }
    }

    // Child types are interned before the id is allocated, so declarations
    // land in dependency order.
    fn emit_type(&mut self, ty: TypeId) -> u32 {
        match self.types.get(ty).clone() {
            Type::Void => self.push_simple_type(Op::TypeVoid, vec![]),
            Type::Bool => self.push_simple_type(Op::TypeBool, vec![]),
            Type::I32 => {
                self.push_simple_type(Op::TypeInt, vec![SpvOperand::Literal(32), SpvOperand::Literal(1)])
            }
            Type::U32 => {
                self.push_simple_type(Op::TypeInt, vec![SpvOperand::Literal(32), SpvOperand::Literal(0)])
            }
            Type::F32 => self.push_simple_type(Op::TypeFloat, vec![SpvOperand::Literal(32)]),
            Type::F16 => {
                self.module.push_capability(Capability::Float16);
                self.module
                    .push_capability(Capability::UniformAndStorageBuffer16BitAccess);
                self.module
                    .push_capability(Capability::StorageBuffer16BitAccess);
                self.module.push_capability(Capability::StorageInputOutput16);
                self.push_simple_type(Op::TypeFloat, vec![SpvOperand::Literal(16)])
            }
            Type::Vector { elem, width } => {
                let elem = self.type_id(elem);
                self.push_simple_type(
                    Op::TypeVector,
                    vec![SpvOperand::Id(elem), SpvOperand::Literal(width)],
                )
            }
            Type::Matrix { column, columns } => {
                let column = self.type_id(column);
                self.push_simple_type(
                    Op::TypeMatrix,
                    vec![SpvOperand::Id(column), SpvOperand::Literal(columns)],
                )
            }
            Type::Array { elem, count, stride } => {
                let elem_id = self.type_id(elem);
                let id = match count {
                    ArrayCount::Fixed(n) => {
                        let len = {
                            let len = self.consts.u32_(&mut self.types, n);
                            self.const_id(len)
                        };
                        self.push_simple_type(
                            Op::TypeArray,
                            vec![SpvOperand::Id(elem_id), SpvOperand::Id(len)],
                        )
                    }
                    ArrayCount::Runtime => self
                        .push_simple_type(Op::TypeRuntimeArray, vec![SpvOperand::Id(elem_id)]),
                };
                self.module.push_annotation(
                    Op::Decorate,
                    vec![
                        SpvOperand::Id(id),
                        SpvOperand::Literal(Decoration::ArrayStride as u32),
                        SpvOperand::Literal(stride),
                    ],
                );
                id
            }
            Type::Pointer { space, store } => {
                let store = self.type_id(store);
                let class = super::inst::storage_class(space);
                self.push_simple_type(
                    Op::TypePointer,
                    vec![SpvOperand::Literal(class as u32), SpvOperand::Id(store)],
                )
            }
            Type::Struct(st) => self.emit_struct(&st),
            Type::Sampler { .. } => self.push_simple_type(Op::TypeSampler, vec![]),
            Type::SampledTexture { dim, sampled } => self.emit_texture(dim, sampled, false, None),
            Type::MultisampledTexture { dim, sampled } => {
                self.emit_texture(dim, sampled, true, None)
            }
            Type::StorageTexture { dim, format, access: _ } => {
                let channel = self.texel_channel_type(format);
                self.emit_texture(dim, channel, false, Some(format))
            }
            Type::SampledImage { image } => {
                let image = self.type_id(image);
                self.push_simple_type(Op::TypeSampledImage, vec![SpvOperand::Id(image)])
            }
            Type::Atomic { .. }
            | Type::DepthTexture { .. }
            | Type::DepthMultisampledTexture { .. } => {
                ice!("type not canonicalized before emission")
            }
        }
    }

    fn push_simple_type(&mut self, op: Op, operands: Vec<SpvOperand>) -> u32 {
        let id = self.module.next_id();
        let mut all = vec![SpvOperand::Id(id)];
        all.extend(operands);
        self.module.push_type(op, all);
        id
    }

    fn emit_struct(&mut self, st: &StructType) -> u32 {
        let member_ids: Vec<u32> = st.members.iter().map(|m| self.type_id(m.ty)).collect();
        let id = self.module.next_id();
        let mut operands = vec![SpvOperand::Id(id)];
        operands.extend(member_ids.iter().map(|&m| SpvOperand::Id(m)));
        self.module.push_type(Op::TypeStruct, operands);

        self.module.push_debug(
            Op::Name,
            vec![SpvOperand::Id(id), SpvOperand::Str(st.name.clone())],
        );
        for (index, member) in st.members.iter().enumerate() {
            let index = index as u32;
            self.module.push_debug(
                Op::MemberName,
                vec![
                    SpvOperand::Id(id),
                    SpvOperand::Literal(index),
                    SpvOperand::Str(member.name.clone()),
                ],
            );
            self.member_decorate(id, index, Decoration::Offset, &[member.offset]);
            if let Type::Matrix { column, columns: _ } = self.types.get(member.ty).clone() {
                // Matrix members carry their majorness and stride. Stride is
                // the aligned column size: two-row columns pack to two
                // scalars, wider ones to four.
                let rows = self.types.width(column);
                let scalar = self.types.deepest_element(member.ty);
                let effective_rows = if rows == 2 { 2 } else { 4 };
                let stride = effective_rows * self.types.scalar_size(scalar);
                self.member_decorate(id, index, Decoration::ColMajor, &[]);
                self.member_decorate(id, index, Decoration::MatrixStride, &[stride]);
            }
            if let Some(location) = member.location {
                self.member_decorate(id, index, Decoration::Location, &[location]);
            }
            if let Some(interpolation) = member.interpolation {
                for (dec, lits) in interpolation_decorations(interpolation) {
                    if dec == Decoration::Sample {
                        self.module.push_capability(Capability::SampleRateShading);
                    }
                    self.member_decorate(id, index, dec, &lits);
                }
            }
            if let Some(builtin) = member.builtin {
                let word = self.builtin_word(builtin, false);
                self.member_decorate(id, index, Decoration::BuiltIn, &[word]);
            }
            if member.invariant {
                self.member_decorate(id, index, Decoration::Invariant, &[]);
            }
        }
        if st.block {
            self.module.push_annotation(
                Op::Decorate,
                vec![
                    SpvOperand::Id(id),
                    SpvOperand::Literal(Decoration::Block as u32),
                ],
            );
        }
        id
    }

    fn member_decorate(&mut self, id: u32, index: u32, dec: Decoration, literals: &[u32]) {
        let mut operands = vec![
            SpvOperand::Id(id),
            SpvOperand::Literal(index),
            SpvOperand::Literal(dec as u32),
        ];
        operands.extend(literals.iter().map(|&l| SpvOperand::Literal(l)));
        self.module.push_annotation(Op::MemberDecorate, operands);
    }

    fn emit_texture(
        &mut self,
        dim: TextureDimension,
        sampled: TypeId,
        multisampled: bool,
        format: Option<TexelFormat>,
    ) -> u32 {
        let sampled_ty = self.type_id(sampled);
        let storage = format.is_some();
        let (dim_word, arrayed) = match dim {
            TextureDimension::D1 => {
                self.module.push_capability(if storage {
                    Capability::Image1D
                } else {
                    Capability::Sampled1D
                });
                (Dim::D1, 0)
            }
            TextureDimension::D2 => (Dim::D2, 0),
            TextureDimension::D2Array => (Dim::D2, 1),
            TextureDimension::D3 => (Dim::D3, 0),
            TextureDimension::Cube => (Dim::Cube, 0),
            TextureDimension::CubeArray => {
                self.module.push_capability(Capability::SampledCubeArray);
                (Dim::Cube, 1)
            }
        };
        let format_word = match format {
            Some(format) => {
                let (word, extended) = image_format(format);
                if extended {
                    self.module
                        .push_capability(Capability::StorageImageExtendedFormats);
                }
                word as u32
            }
            None => ImageFormat::Unknown as u32,
        };
        self.push_simple_type(
            Op::TypeImage,
            vec![
                SpvOperand::Id(sampled_ty),
                SpvOperand::Literal(dim_word as u32),
                // Depth is always 0: drivers are told depth via the sampled
                // type, not this flag.
                SpvOperand::Literal(0),
                SpvOperand::Literal(arrayed),
                SpvOperand::Literal(u32::from(multisampled)),
                SpvOperand::Literal(if storage { 2 } else { 1 }),
                SpvOperand::Literal(format_word),
            ],
        )
    }

    fn texel_channel_type(&mut self, format: TexelFormat) -> TypeId {
        use TexelFormat::*;
        match format {
            R32Sint | Rg32Sint | Rgba8Sint | Rgba16Sint | Rgba32Sint => self.types.i32(),
            R32Uint | Rg32Uint | Rgba8Uint | Rgba16Uint | Rgba32Uint => self.types.u32(),
            _ => self.types.f32(),
        }
    }

    /// SPIR-V id of a constant, interning it on first use.
    pub(crate) fn const_id(&mut self, constant: ConstId) -> u32 {
        if let Some(&id) = self.const_ids.get(&constant) {
            return id;
        }
        let c = self.consts.get(constant).clone();
        let ty = self.type_id(c.ty);
        let id = match c.data {
            ConstData::Bool(true) => {
                self.push_const(Op::ConstantTrue, ty, vec![])
            }
            ConstData::Bool(false) => {
                self.push_const(Op::ConstantFalse, ty, vec![])
            }
            ConstData::I32(v) => {
                self.push_const(Op::Constant, ty, vec![SpvOperand::Literal(v as u32)])
            }
            ConstData::U32(v) => {
                self.push_const(Op::Constant, ty, vec![SpvOperand::Literal(v)])
            }
            ConstData::F32(bits) => {
                self.push_const(Op::Constant, ty, vec![SpvOperand::Literal(bits)])
            }
            ConstData::F16(bits) => self.push_const(
                Op::Constant,
                ty,
                vec![SpvOperand::Literal(u32::from(bits))],
            ),
            ConstData::Composite(elems) => {
                let elem_ids: Vec<u32> = elems.iter().map(|&e| self.const_id(e)).collect();
                self.push_const(
                    Op::ConstantComposite,
                    ty,
                    elem_ids.into_iter().map(SpvOperand::Id).collect(),
                )
            }
        };
        self.const_ids.insert(constant, id);
        id
    }

    fn push_const(&mut self, op: Op, ty: u32, rest: Vec<SpvOperand>) -> u32 {
        let id = self.module.next_id();
        let mut operands = vec![SpvOperand::Id(ty), SpvOperand::Id(id)];
        operands.extend(rest);
        self.module.push_type(op, operands);
        id
    }

    /// Zero value of a type.
    pub(crate) fn const_null(&mut self, ty: TypeId) -> u32 {
        let ty = self.dedup_type(ty);
        if let Some(&id) = self.null_ids.get(&ty) {
            return id;
        }
        let ty_id = self.type_id(ty);
        let id = self.module.next_id();
        self.module.push_type(
            Op::ConstantNull,
            vec![SpvOperand::Id(ty_id), SpvOperand::Id(id)],
        );
        self.null_ids.insert(ty, id);
        id
    }

    /// Undefined value of a type, used to fill absent phi arguments.
    pub(crate) fn undef(&mut self, ty: TypeId) -> u32 {
        let ty = self.dedup_type(ty);
        if let Some(&id) = self.undef_ids.get(&ty) {
            return id;
        }
        let ty_id = self.type_id(ty);
        let id = self.module.next_id();
        self.module.push_type(
            Op::Undef,
            vec![SpvOperand::Id(ty_id), SpvOperand::Id(id)],
        );
        self.undef_ids.insert(ty, id);
        id
    }

    /// BuiltIn decoration word, with capability side effects. `input` selects
    /// the flavour of position for fragment inputs.
    pub(crate) fn builtin_word(&mut self, builtin: crate::ir::BuiltinValue, input: bool) -> u32 {
        use crate::ir::BuiltinValue::*;
        let word = match builtin {
            Position => {
                if input {
                    BuiltIn::FragCoord
                } else {
                    BuiltIn::Position
                }
            }
            PointSize => BuiltIn::PointSize,
            FragDepth => BuiltIn::FragDepth,
            FrontFacing => BuiltIn::FrontFacing,
            GlobalInvocationId => BuiltIn::GlobalInvocationId,
            InstanceIndex => BuiltIn::InstanceIndex,
            LocalInvocationId => BuiltIn::LocalInvocationId,
            LocalInvocationIndex => BuiltIn::LocalInvocationIndex,
            NumWorkgroups => BuiltIn::NumWorkgroups,
            SampleIndex => {
                self.module.push_capability(Capability::SampleRateShading);
                BuiltIn::SampleId
            }
            SampleMask => BuiltIn::SampleMask,
            SubgroupInvocationId => {
                self.module.push_capability(Capability::GroupNonUniform);
                BuiltIn::SubgroupLocalInvocationId
            }
            SubgroupSize => {
                self.module.push_capability(Capability::GroupNonUniform);
                BuiltIn::SubgroupSize
            }
            VertexIndex => BuiltIn::VertexIndex,
            WorkgroupId => BuiltIn::WorkgroupId,
        };
        word as u32
    }
}

pub(crate) fn interpolation_decorations(
    interpolation: Interpolation,
) -> Vec<(Decoration, Vec<u32>)> {
    let mut out = Vec::new();
    match interpolation.ty {
        InterpolationType::Perspective => {}
        InterpolationType::Linear => out.push((Decoration::NoPerspective, vec![])),
        InterpolationType::Flat => out.push((Decoration::Flat, vec![])),
    }
    match interpolation.sampling {
        Some(InterpolationSampling::Centroid) => out.push((Decoration::Centroid, vec![])),
        Some(InterpolationSampling::Sample) => out.push((Decoration::Sample, vec![])),
        Some(InterpolationSampling::Center) | None => {}
    }
    out
}

fn image_format(format: TexelFormat) -> (ImageFormat, bool) {
    use TexelFormat::*;
    match format {
        Bgra8Unorm | Rgba8Unorm => (ImageFormat::Rgba8, false),
        R32Float => (ImageFormat::R32f, false),
        R32Sint => (ImageFormat::R32i, false),
        R32Uint => (ImageFormat::R32ui, false),
        Rg32Float => (ImageFormat::Rg32f, true),
        Rg32Sint => (ImageFormat::Rg32i, true),
        Rg32Uint => (ImageFormat::Rg32ui, true),
        Rgba8Sint => (ImageFormat::Rgba8i, false),
        Rgba8Snorm => (ImageFormat::Rgba8Snorm, false),
        Rgba8Uint => (ImageFormat::Rgba8ui, false),
        Rgba16Float => (ImageFormat::Rgba16f, false),
        Rgba16Sint => (ImageFormat::Rgba16i, false),
        Rgba16Uint => (ImageFormat::Rgba16ui, false),
        Rgba32Float => (ImageFormat::Rgba32f, false),
        Rgba32Sint => (ImageFormat::Rgba32i, false),
        Rgba32Uint => (ImageFormat::Rgba32ui, false),
    }
}
