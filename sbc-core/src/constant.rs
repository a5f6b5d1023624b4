//! Typed constant values and the canonical form used to de-duplicate
//! them across a module (§3 invariant: "no two distinct result IDs may
//! represent the same constant").
use half::f16;
use ordered_float::OrderedFloat;

use crate::ty::{ScalarType, Type};

/// A scalar constant value, tagged so it hashes and compares exactly —
/// `OrderedFloat` gives floats a total order so they can key a
/// `HashMap` the same way `spirq-core::constant::ConstantValue` does.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum ConstantValue {
    Bool(bool),
    S8(i8),
    S16(i16),
    S32(i32),
    S64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F16(OrderedFloat<f16>),
    F32(OrderedFloat<f32>),
    F64(OrderedFloat<f64>),
}
impl From<bool> for ConstantValue {
    fn from(x: bool) -> Self {
        ConstantValue::Bool(x)
    }
}
impl From<i32> for ConstantValue {
    fn from(x: i32) -> Self {
        ConstantValue::S32(x)
    }
}
impl From<u32> for ConstantValue {
    fn from(x: u32) -> Self {
        ConstantValue::U32(x)
    }
}
impl From<f32> for ConstantValue {
    fn from(x: f32) -> Self {
        ConstantValue::F32(OrderedFloat(x))
    }
}
impl ConstantValue {
    pub fn ty(&self) -> Type {
        use ConstantValue::*;
        Type::Scalar(match self {
            Bool(_) => ScalarType::Bool,
            S8(_) => ScalarType::int(8),
            S16(_) => ScalarType::int(16),
            S32(_) => ScalarType::int(32),
            S64(_) => ScalarType::int(64),
            U8(_) => ScalarType::uint(8),
            U16(_) => ScalarType::uint(16),
            U32(_) => ScalarType::uint(32),
            U64(_) => ScalarType::uint(64),
            F16(_) => ScalarType::float(16),
            F32(_) => ScalarType::float(32),
            F64(_) => ScalarType::float(64),
        })
    }
    pub fn to_f64(&self) -> Option<f64> {
        use ConstantValue::*;
        match self {
            S8(x) => Some(*x as f64),
            S16(x) => Some(*x as f64),
            S32(x) => Some(*x as f64),
            S64(x) => Some(*x as f64),
            U8(x) => Some(*x as f64),
            U16(x) => Some(*x as f64),
            U32(x) => Some(*x as f64),
            U64(x) => Some(*x as f64),
            F16(x) => Some(x.0.to_f32() as f64),
            F32(x) => Some(x.0 as f64),
            F64(x) => Some(x.0),
            Bool(_) => None,
        }
    }
    /// Little-endian words this constant occupies in `OpConstant`.
    pub fn to_words(&self) -> Vec<u32> {
        use ConstantValue::*;
        match self {
            Bool(x) => vec![*x as u32],
            S8(x) => vec![*x as i32 as u32],
            S16(x) => vec![*x as i32 as u32],
            S32(x) => vec![*x as u32],
            U8(x) => vec![*x as u32],
            U16(x) => vec![*x as u32],
            U32(x) => vec![*x],
            F16(x) => vec![x.0.to_bits() as u32],
            F32(x) => vec![x.0.to_bits()],
            S64(x) => {
                let bits = *x as u64;
                vec![bits as u32, (bits >> 32) as u32]
            }
            U64(x) => vec![*x as u32, (*x >> 32) as u32],
            F64(x) => {
                let bits = x.0.to_bits();
                vec![bits as u32, (bits >> 32) as u32]
            }
        }
    }
}

/// A named or intermediate constant, and its composite variants (vector
/// / array-of-vector) built out of de-duplicated scalar children.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum Constant {
    Scalar(ConstantValue),
    /// Composite constant; `children` are themselves already-interned
    /// constants (so a vector of two identical scalars only references
    /// one scalar constant twice, not two distinct values).
    Composite { ty: Type, children: Vec<Constant> },
}
impl Constant {
    pub fn scalar(v: impl Into<ConstantValue>) -> Self {
        Constant::Scalar(v.into())
    }
    pub fn ty(&self) -> Type {
        match self {
            Constant::Scalar(v) => v.ty(),
            Constant::Composite { ty, .. } => ty.clone(),
        }
    }
}
