//! Constant values, content-addressed.
//!
//! Scalars store bit patterns rather than native floats so constants are
//! `Hash + Eq` and interning is exact. Composites hold the ids of their
//! already-interned elements.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::types::{Type, TypeId, TypeRegistry};

/// Index of an interned constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstId(pub u32);

impl ConstId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The payload of a constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstData {
    Bool(bool),
    I32(i32),
    U32(u32),
    /// f32 bit pattern.
    F32(u32),
    /// f16 bit pattern.
    F16(u16),
    /// Vector, matrix, array or struct elements, in order.
    Composite(Vec<ConstId>),
}

/// A typed constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constant {
    pub ty: TypeId,
    pub data: ConstData,
}

/// Content-addressed constant interner.
#[derive(Debug, Clone, Default)]
pub struct ConstRegistry {
    constants: IndexSet<Constant>,
}

impl ConstRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a constant, returning its id. Idempotent.
    pub fn intern(&mut self, constant: Constant) -> ConstId {
        let (index, _) = self.constants.insert_full(constant);
        ConstId(index as u32)
    }

    pub fn get(&self, id: ConstId) -> &Constant {
        &self.constants[id.index()]
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn bool_(&mut self, types: &mut TypeRegistry, value: bool) -> ConstId {
        let ty = types.bool();
        self.intern(Constant {
            ty,
            data: ConstData::Bool(value),
        })
    }

    pub fn i32_(&mut self, types: &mut TypeRegistry, value: i32) -> ConstId {
        let ty = types.i32();
        self.intern(Constant {
            ty,
            data: ConstData::I32(value),
        })
    }

    pub fn u32_(&mut self, types: &mut TypeRegistry, value: u32) -> ConstId {
        let ty = types.u32();
        self.intern(Constant {
            ty,
            data: ConstData::U32(value),
        })
    }

    pub fn f32_(&mut self, types: &mut TypeRegistry, value: f32) -> ConstId {
        let ty = types.f32();
        self.intern(Constant {
            ty,
            data: ConstData::F32(value.to_bits()),
        })
    }

    /// A vector with every lane set to `elem`.
    pub fn splat(&mut self, types: &mut TypeRegistry, elem: ConstId, width: u32) -> ConstId {
        let elem_ty = self.get(elem).ty;
        let ty = types.register(Type::Vector {
            elem: elem_ty,
            width,
        });
        self.intern(Constant {
            ty,
            data: ConstData::Composite(vec![elem; width as usize]),
        })
    }
}
