//! The SIR type system.
//!
//! Types are interned structurally in a [`TypeRegistry`]; a [`TypeId`] is an
//! index into it. Equal types always get equal ids, so id comparison is type
//! equality.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Index of an interned type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Scalar classification used to pick opcode families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    SignedInt,
    UnsignedInt,
    Float,
}

/// Address spaces for pointers and variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressSpace {
    Function,
    Private,
    In,
    Out,
    Uniform,
    Storage,
    Workgroup,
    Handle,
    PushConstant,
}

/// Access qualifier for storage textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

/// Texture dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureDimension {
    D1,
    D2,
    D2Array,
    D3,
    Cube,
    CubeArray,
}

/// Texel formats for storage textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TexelFormat {
    Bgra8Unorm,
    R32Float,
    R32Sint,
    R32Uint,
    Rg32Float,
    Rg32Sint,
    Rg32Uint,
    Rgba8Sint,
    Rgba8Snorm,
    Rgba8Uint,
    Rgba8Unorm,
    Rgba16Float,
    Rgba16Sint,
    Rgba16Uint,
    Rgba32Float,
    Rgba32Sint,
    Rgba32Uint,
}

/// Interpolation type for IO struct members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterpolationType {
    Perspective,
    Linear,
    Flat,
}

/// Interpolation sampling for IO struct members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterpolationSampling {
    Center,
    Centroid,
    Sample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interpolation {
    pub ty: InterpolationType,
    pub sampling: Option<InterpolationSampling>,
}

/// Shader built-in values carried on IO struct members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinValue {
    Position,
    PointSize,
    FragDepth,
    FrontFacing,
    GlobalInvocationId,
    InstanceIndex,
    LocalInvocationId,
    LocalInvocationIndex,
    NumWorkgroups,
    SampleIndex,
    SampleMask,
    SubgroupInvocationId,
    SubgroupSize,
    VertexIndex,
    WorkgroupId,
}

/// A struct member with layout and IO attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructMember {
    pub name: String,
    pub ty: TypeId,
    pub offset: u32,
    pub location: Option<u32>,
    pub interpolation: Option<Interpolation>,
    pub builtin: Option<BuiltinValue>,
    pub invariant: bool,
}

impl StructMember {
    pub fn plain(name: impl Into<String>, ty: TypeId, offset: u32) -> Self {
        Self {
            name: name.into(),
            ty,
            offset,
            location: None,
            interpolation: None,
            builtin: None,
            invariant: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructType {
    pub name: String,
    pub members: Vec<StructMember>,
    /// Decorate with Block (buffer-backed structs).
    pub block: bool,
}

/// Array element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrayCount {
    Fixed(u32),
    Runtime,
}

/// A SIR type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    Bool,
    I32,
    U32,
    F32,
    F16,
    Vector {
        elem: TypeId,
        width: u32,
    },
    Matrix {
        column: TypeId,
        columns: u32,
    },
    Array {
        elem: TypeId,
        count: ArrayCount,
        stride: u32,
    },
    Pointer {
        space: AddressSpace,
        store: TypeId,
    },
    Struct(StructType),
    Atomic {
        inner: TypeId,
    },
    Sampler {
        comparison: bool,
    },
    SampledTexture {
        dim: TextureDimension,
        sampled: TypeId,
    },
    MultisampledTexture {
        dim: TextureDimension,
        sampled: TypeId,
    },
    DepthTexture {
        dim: TextureDimension,
    },
    DepthMultisampledTexture {
        dim: TextureDimension,
    },
    StorageTexture {
        dim: TextureDimension,
        format: TexelFormat,
        access: Access,
    },
    SampledImage {
        image: TypeId,
    },
}

/// Structural type interner.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: IndexSet<Type>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a type, returning its id. Idempotent.
    pub fn register(&mut self, ty: Type) -> TypeId {
        let (index, _) = self.types.insert_full(ty);
        TypeId(index as u32)
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn void(&mut self) -> TypeId {
        self.register(Type::Void)
    }

    pub fn bool(&mut self) -> TypeId {
        self.register(Type::Bool)
    }

    pub fn i32(&mut self) -> TypeId {
        self.register(Type::I32)
    }

    pub fn u32(&mut self) -> TypeId {
        self.register(Type::U32)
    }

    pub fn f32(&mut self) -> TypeId {
        self.register(Type::F32)
    }

    pub fn f16(&mut self) -> TypeId {
        self.register(Type::F16)
    }

    pub fn vector(&mut self, elem: TypeId, width: u32) -> TypeId {
        self.register(Type::Vector { elem, width })
    }

    pub fn pointer(&mut self, space: AddressSpace, store: TypeId) -> TypeId {
        self.register(Type::Pointer { space, store })
    }

    /// Scalar kind of a scalar or vector type, if it has one.
    pub fn scalar_kind(&self, id: TypeId) -> Option<ScalarKind> {
        match self.get(id) {
            Type::Bool => Some(ScalarKind::Bool),
            Type::I32 => Some(ScalarKind::SignedInt),
            Type::U32 => Some(ScalarKind::UnsignedInt),
            Type::F32 | Type::F16 => Some(ScalarKind::Float),
            Type::Vector { elem, .. } => self.scalar_kind(*elem),
            _ => None,
        }
    }

    /// Element type of a vector/matrix/array, or the type itself.
    pub fn element_type(&self, id: TypeId) -> TypeId {
        match self.get(id) {
            Type::Vector { elem, .. } => *elem,
            Type::Matrix { column, .. } => *column,
            Type::Array { elem, .. } => *elem,
            _ => id,
        }
    }

    /// Scalar at the bottom of any vector/matrix nesting.
    pub fn deepest_element(&self, id: TypeId) -> TypeId {
        let elem = self.element_type(id);
        if elem == id {
            id
        } else {
            self.deepest_element(elem)
        }
    }

    /// Vector width, or 1 for scalars.
    pub fn width(&self, id: TypeId) -> u32 {
        match self.get(id) {
            Type::Vector { width, .. } => *width,
            _ => 1,
        }
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Pointer { .. })
    }

    pub fn is_float(&self, id: TypeId) -> bool {
        self.scalar_kind(id) == Some(ScalarKind::Float)
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(
            self.scalar_kind(id),
            Some(ScalarKind::SignedInt | ScalarKind::UnsignedInt)
        )
    }

    /// Byte size of a scalar type.
    pub fn scalar_size(&self, id: TypeId) -> u32 {
        match self.get(id) {
            Type::F16 => 2,
            _ => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut reg = TypeRegistry::new();
        let a = reg.f32();
        let b = reg.f32();
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);

        let v2 = reg.vector(a, 2);
        let v2b = reg.vector(b, 2);
        assert_eq!(v2, v2b);
        let v3 = reg.vector(a, 3);
        assert_ne!(v2, v3);
    }

    #[test]
    fn scalar_kinds() {
        let mut reg = TypeRegistry::new();
        let f = reg.f32();
        let i = reg.i32();
        let u = reg.u32();
        let b = reg.bool();
        let vf = reg.vector(f, 4);
        assert_eq!(reg.scalar_kind(f), Some(ScalarKind::Float));
        assert_eq!(reg.scalar_kind(i), Some(ScalarKind::SignedInt));
        assert_eq!(reg.scalar_kind(u), Some(ScalarKind::UnsignedInt));
        assert_eq!(reg.scalar_kind(b), Some(ScalarKind::Bool));
        assert_eq!(reg.scalar_kind(vf), Some(ScalarKind::Float));
        let p = reg.pointer(AddressSpace::Function, f);
        assert_eq!(reg.scalar_kind(p), None);
    }

    #[test]
    fn deepest_element_unwraps_nesting() {
        let mut reg = TypeRegistry::new();
        let f = reg.f32();
        let col = reg.vector(f, 3);
        let mat = reg.register(Type::Matrix { column: col, columns: 4 });
        assert_eq!(reg.deepest_element(mat), f);
        assert_eq!(reg.element_type(mat), col);
        assert_eq!(reg.width(col), 3);
        assert_eq!(reg.width(f), 1);
    }
}
