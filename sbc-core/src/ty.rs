//! Structured representations of the shader type system: the closed
//! algebraic set of scalar, vector, matrix, array, struct, texture and
//! sampler descriptors, plus promotion and cast rules used by the
//! back-end generator.
use std::fmt;

use crate::error::{CompileError, CompileErrorKind, Result};

pub use spirv::{Dim, ImageFormat};

/// A primitive, non-composite value type.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum ScalarType {
    Bool,
    /// Two's complement integer.
    Integer { bits: u32, is_signed: bool },
    /// IEEE 754 floating-point number.
    Float { bits: u32 },
}
impl ScalarType {
    pub fn int(bits: u32) -> Self {
        ScalarType::Integer {
            bits,
            is_signed: true,
        }
    }
    pub fn uint(bits: u32) -> Self {
        ScalarType::Integer {
            bits,
            is_signed: false,
        }
    }
    pub fn float(bits: u32) -> Self {
        ScalarType::Float { bits }
    }
    pub fn i32() -> Self {
        Self::int(32)
    }
    pub fn u32() -> Self {
        Self::uint(32)
    }
    pub fn f32() -> Self {
        Self::float(32)
    }

    pub fn size(&self) -> usize {
        match self {
            ScalarType::Bool => 4,
            ScalarType::Integer { bits, .. } => (*bits / 8) as usize,
            ScalarType::Float { bits } => (*bits / 8) as usize,
        }
    }

    /// Promotion rank used by [`Type::promote`]: booleans rank below all
    /// integers, integers rank by width, and any float outranks any
    /// integer regardless of width.
    fn rank(&self) -> (u32, u32) {
        match self {
            ScalarType::Bool => (0, 0),
            ScalarType::Integer { bits, .. } => (1, *bits),
            ScalarType::Float { bits } => (2, *bits),
        }
    }
    fn is_float(&self) -> bool {
        matches!(self, ScalarType::Float { .. })
    }
    fn is_integral(&self) -> bool {
        matches!(self, ScalarType::Bool | ScalarType::Integer { .. })
    }
}
impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScalarType::Bool => f.write_str("bool"),
            ScalarType::Integer { bits, is_signed } => {
                write!(f, "{}{}", if *is_signed { "i" } else { "u" }, bits)
            }
            ScalarType::Float { bits } => write!(f, "f{}", bits),
        }
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub struct VectorType {
    pub scalar_ty: ScalarType,
    pub scalar_count: u32,
}
impl VectorType {
    pub fn size(&self) -> usize {
        self.scalar_ty.size() * self.scalar_count as usize
    }
}
impl fmt::Display for VectorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "vec{}<{}>", self.scalar_count, self.scalar_ty)
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub struct MatrixType {
    pub column_ty: VectorType,
    pub column_count: u32,
}
impl MatrixType {
    /// `std430`/`std140` column stride: each column is padded up to a
    /// multiple of 16 bytes (the vec4 alignment), matching the layout
    /// rule used for array-of-vec3 below. Left implementation-defined in
    /// spirit (§9 open question) but made concrete here so the builder
    /// has a single, generic stride rule to apply.
    pub fn stride(&self) -> usize {
        align_up(self.column_ty.size(), 16)
    }
    pub fn size(&self) -> usize {
        self.stride() * self.column_count as usize
    }
}
impl fmt::Display for MatrixType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "mat{}x{}<{}>",
            self.column_count, self.column_ty.scalar_count, self.column_ty.scalar_ty
        )
    }
}

fn align_up(x: usize, align: usize) -> usize {
    (x + align - 1) / align * align
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct ArrayType {
    pub element_ty: Box<Type>,
    /// `None` means the array is unsized (only legal as the trailing
    /// member of a storage buffer struct).
    pub element_count: Option<u32>,
}
impl ArrayType {
    pub fn stride(&self) -> usize {
        // std430: arrays of vec3 are padded to vec4 width per element.
        let base = self.element_ty.size().unwrap_or(0);
        if let Type::Vector(VectorType { scalar_count: 3, .. }) = self.element_ty.as_ref() {
            align_up(base, 16)
        } else {
            align_up(base, self.element_ty.align())
        }
    }
}
impl fmt::Display for ArrayType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.element_count {
            Some(n) => write!(f, "[{}; {}]", self.element_ty, n),
            None => write!(f, "[{}]", self.element_ty),
        }
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct StructMember {
    pub name: String,
    pub ty: Type,
}
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct StructType {
    pub name: String,
    pub members: Vec<StructMember>,
}
impl fmt::Display for StructType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {{ ", self.name)?;
        for (i, m) in self.members.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", m.name, m.ty)?;
        }
        f.write_str(" }")
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum TextureDim {
    D1,
    D2,
    D3,
    Cube,
}
impl TextureDim {
    pub fn to_spirv(&self) -> Dim {
        match self {
            TextureDim::D1 => Dim::Dim1D,
            TextureDim::D2 => Dim::Dim2D,
            TextureDim::D3 => Dim::Dim3D,
            TextureDim::Cube => Dim::DimCube,
        }
    }
}
impl fmt::Display for TextureDim {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            TextureDim::D1 => "1d",
            TextureDim::D2 => "2d",
            TextureDim::D3 => "3d",
            TextureDim::Cube => "cube",
        };
        f.write_str(s)
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct TextureType {
    pub dim: TextureDim,
    pub sampled_ty: ScalarType,
    /// Storage format tag, e.g. `r16i`, `rg32i`. Empty for a plain
    /// sampled texture (no explicit storage format).
    pub format: String,
}
impl fmt::Display for TextureType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.format.is_empty() {
            write!(f, "{} {}", self.dim, self.sampled_ty)
        } else {
            write!(f, "{} {}", self.dim, self.format)
        }
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub struct SamplerType;
impl fmt::Display for SamplerType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("sampler")
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
#[non_exhaustive]
pub enum Type {
    Scalar(ScalarType),
    Vector(VectorType),
    Matrix(MatrixType),
    Array(ArrayType),
    Struct(StructType),
    Texture(TextureType),
    Sampler(SamplerType),
}
impl Type {
    pub fn bool() -> Self {
        Type::Scalar(ScalarType::Bool)
    }
    pub fn i32() -> Self {
        Type::Scalar(ScalarType::i32())
    }
    pub fn u32() -> Self {
        Type::Scalar(ScalarType::u32())
    }
    pub fn f32() -> Self {
        Type::Scalar(ScalarType::f32())
    }
    pub fn vec(scalar_ty: ScalarType, n: u32) -> Self {
        Type::Vector(VectorType {
            scalar_ty,
            scalar_count: n,
        })
    }

    pub fn as_scalar(&self) -> Option<ScalarType> {
        match self {
            Type::Scalar(s) => Some(*s),
            _ => None,
        }
    }
    pub fn as_vector(&self) -> Option<&VectorType> {
        match self {
            Type::Vector(v) => Some(v),
            _ => None,
        }
    }
    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Scalar(ScalarType::Bool))
    }
    pub fn is_float(&self) -> bool {
        match self {
            Type::Scalar(s) => s.is_float(),
            Type::Vector(v) => v.scalar_ty.is_float(),
            _ => false,
        }
    }
    pub fn is_integral(&self) -> bool {
        match self {
            Type::Scalar(s) => s.is_integral(),
            Type::Vector(v) => v.scalar_ty.is_integral(),
            _ => false,
        }
    }

    /// Byte size if the type can be represented in memory; `None` for
    /// runtime-sized arrays, textures and samplers.
    pub fn size(&self) -> Option<usize> {
        match self {
            Type::Scalar(s) => Some(s.size()),
            Type::Vector(v) => Some(v.size()),
            Type::Matrix(m) => Some(m.size()),
            Type::Array(a) => Some(a.stride() * a.element_count? as usize),
            Type::Struct(s) => {
                let mut offset = 0usize;
                for m in &s.members {
                    offset = align_up(offset, m.ty.align());
                    offset += m.ty.size()?;
                }
                Some(offset)
            }
            Type::Texture(_) | Type::Sampler(_) => None,
        }
    }
    /// `std430` alignment of the type.
    pub fn align(&self) -> usize {
        match self {
            Type::Scalar(s) => s.size(),
            Type::Vector(v) => match v.scalar_count {
                2 => v.scalar_ty.size() * 2,
                _ => v.scalar_ty.size() * 4, // vec3 aligns as vec4
            },
            Type::Matrix(m) => m.stride(),
            Type::Array(a) => a.element_ty.align().max(16),
            Type::Struct(s) => s
                .members
                .iter()
                .map(|m| m.ty.align())
                .max()
                .unwrap_or(4),
            Type::Texture(_) | Type::Sampler(_) => 0,
        }
    }

    /// Numeric promotion for arithmetic, per §4.1: `bool -> int -> float`
    /// in rank, equal-rank float beats int, and mixing int/float families
    /// is rejected outright (the caller must cast explicitly).
    pub fn promote(&self, other: &Type) -> std::result::Result<Type, CompileErrorKind> {
        match (self, other) {
            (Type::Scalar(a), Type::Scalar(b)) => {
                if a.is_float() != b.is_float() && *a != ScalarType::Bool && *b != ScalarType::Bool
                {
                    return Err(CompileErrorKind::TypeMismatch);
                }
                let winner = if a.rank() >= b.rank() { *a } else { *b };
                Ok(Type::Scalar(winner))
            }
            (Type::Vector(a), Type::Vector(b)) => {
                if a.scalar_count != b.scalar_count {
                    return Err(CompileErrorKind::TypeMismatch);
                }
                let scalar = Type::Scalar(a.scalar_ty).promote(&Type::Scalar(b.scalar_ty))?;
                Ok(Type::Vector(VectorType {
                    scalar_ty: scalar.as_scalar().unwrap(),
                    scalar_count: a.scalar_count,
                }))
            }
            (Type::Vector(a), Type::Scalar(b)) | (Type::Scalar(b), Type::Vector(a)) => {
                let scalar = Type::Scalar(a.scalar_ty).promote(&Type::Scalar(*b))?;
                Ok(Type::Vector(VectorType {
                    scalar_ty: scalar.as_scalar().unwrap(),
                    scalar_count: a.scalar_count,
                }))
            }
            _ => Err(CompileErrorKind::TypeMismatch),
        }
    }
}
impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Scalar(x) => x.fmt(f),
            Type::Vector(x) => x.fmt(f),
            Type::Matrix(x) => x.fmt(f),
            Type::Array(x) => x.fmt(f),
            Type::Struct(x) => x.fmt(f),
            Type::Texture(x) => x.fmt(f),
            Type::Sampler(x) => x.fmt(f),
        }
    }
}

impl ScalarType {
    /// Inverse of [`ScalarType`]'s `Display` impl (`"bool"`, `"i32"`,
    /// `"u16"`, `"f64"`, ...).
    fn parse(s: &str) -> Option<ScalarType> {
        Some(match s {
            "bool" => ScalarType::Bool,
            "i8" => ScalarType::int(8),
            "i16" => ScalarType::int(16),
            "i32" => ScalarType::int(32),
            "i64" => ScalarType::int(64),
            "u8" => ScalarType::uint(8),
            "u16" => ScalarType::uint(16),
            "u32" => ScalarType::uint(32),
            "u64" => ScalarType::uint(64),
            "f16" => ScalarType::float(16),
            "f32" => ScalarType::float(32),
            "f64" => ScalarType::float(64),
            _ => return None,
        })
    }
}

/// Canonical string grammar accepted by [`Type::parse`]: bare scalar
/// mnemonics, `vec{2,3,4}<scalar>`, `mat{C}x{R}<scalar>`, `[elem; n]` /
/// `[elem]`, `sampler`, and `{dim} {scalar-or-format}` for textures.
/// This is the exact inverse of the `Display` impls above, matching the
/// Opcode Registry's own round-trip requirement (§8) at the type-string
/// granularity.
impl Type {
    pub fn parse(s: &str) -> Result<Type> {
        let s = s.trim();
        if let Some(scalar) = ScalarType::parse(s) {
            return Ok(Type::Scalar(scalar));
        }
        if s == "sampler" {
            return Ok(Type::Sampler(SamplerType));
        }
        if let Some(rest) = s.strip_prefix("vec") {
            return Self::parse_vector(rest, s);
        }
        if let Some(rest) = s.strip_prefix("mat") {
            return Self::parse_matrix(rest, s);
        }
        if let Some(inner) = s.strip_prefix('[').and_then(|x| x.strip_suffix(']')) {
            return Self::parse_array(inner, s);
        }
        if let Some((dim, tag)) = s.split_once(' ') {
            if let Some(dim) = TextureDim::parse(dim) {
                let (sampled_ty, format) = match ScalarType::parse(tag) {
                    Some(scalar) => (scalar, String::new()),
                    None => (Self::infer_format_scalar(tag)?, tag.to_owned()),
                };
                return Ok(Type::Texture(TextureType {
                    dim,
                    sampled_ty,
                    format,
                }));
            }
        }
        Err(parse_err(s))
    }

    fn parse_vector(rest: &str, whole: &str) -> Result<Type> {
        let (n, inner) = rest
            .strip_suffix('>')
            .and_then(|x| x.split_once('<'))
            .ok_or_else(|| parse_err(whole))?;
        let scalar_count: u32 = n.parse().map_err(|_| parse_err(whole))?;
        let scalar_ty = ScalarType::parse(inner).ok_or_else(|| parse_err(whole))?;
        Ok(Type::Vector(VectorType {
            scalar_ty,
            scalar_count,
        }))
    }

    fn parse_matrix(rest: &str, whole: &str) -> Result<Type> {
        let (dims, inner) = rest
            .strip_suffix('>')
            .and_then(|x| x.split_once('<'))
            .ok_or_else(|| parse_err(whole))?;
        let (cols, rows) = dims.split_once('x').ok_or_else(|| parse_err(whole))?;
        let column_count: u32 = cols.parse().map_err(|_| parse_err(whole))?;
        let row_count: u32 = rows.parse().map_err(|_| parse_err(whole))?;
        let scalar_ty = ScalarType::parse(inner).ok_or_else(|| parse_err(whole))?;
        Ok(Type::Matrix(MatrixType {
            column_ty: VectorType {
                scalar_ty,
                scalar_count: row_count,
            },
            column_count,
        }))
    }

    fn parse_array(inner: &str, whole: &str) -> Result<Type> {
        let (elem_str, count) = match inner.split_once(';') {
            Some((e, n)) => (
                e,
                Some(n.trim().parse::<u32>().map_err(|_| parse_err(whole))?),
            ),
            None => (inner, None),
        };
        let element_ty = Self::parse(elem_str.trim())?;
        Ok(Type::Array(ArrayType {
            element_ty: Box::new(element_ty),
            element_count: count,
        }))
    }

    /// Best-effort scalar-type inference for an explicit storage-format
    /// tag (`"r16i"`, `"rg32i"`, `"rgba32f"`, ...): the trailing letter
    /// names the component type (`i`/`u`/`f`) and the run of digits
    /// before it names its bit width.
    fn infer_format_scalar(tag: &str) -> Result<ScalarType> {
        let kind = tag.chars().last().ok_or_else(|| parse_err(tag))?;
        let digits: String = tag
            .chars()
            .rev()
            .skip(1)
            .take_while(|c| c.is_ascii_digit())
            .collect();
        let bits: u32 = digits
            .chars()
            .rev()
            .collect::<String>()
            .parse()
            .unwrap_or(32);
        Ok(match kind {
            'i' => ScalarType::int(bits),
            'u' => ScalarType::uint(bits),
            'f' => ScalarType::float(bits),
            _ => return Err(parse_err(tag)),
        })
    }
}
impl TextureDim {
    fn parse(s: &str) -> Option<TextureDim> {
        Some(match s {
            "1d" => TextureDim::D1,
            "2d" => TextureDim::D2,
            "3d" => TextureDim::D3,
            "cube" => TextureDim::Cube,
            _ => return None,
        })
    }
}
fn parse_err(s: &str) -> CompileError {
    CompileError::new(
        CompileErrorKind::TypeMismatch,
        "<type>",
        0,
        format!("cannot parse type: {}", s),
        vec![],
    )
}

/// The SPIR-V conversion family a cast between two types requires.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum CastRule {
    /// No-op: the types already match.
    Identity,
    /// `OpConvertSToF`/`OpConvertFToS`/`OpConvertUToF`/`OpConvertFToU`/
    /// `OpSConvert`/`OpUConvert`/`OpFConvert` depending on signedness.
    Convert,
    /// `OpBitcast`: same width, reinterpreted bit pattern.
    Bitcast,
}

/// Resolve the conversion rule from `from` to `to`. Vector casts are
/// required to be element-wise (equal component count); composing a
/// vector from mixed scalars or smaller vectors is handled by the
/// back-end one component at a time using this same rule per component.
pub fn cast_rule(from: &Type, to: &Type) -> Result<CastRule> {
    if from == to {
        return Ok(CastRule::Identity);
    }
    match (from, to) {
        (Type::Scalar(a), Type::Scalar(b)) => scalar_cast_rule(*a, *b),
        (Type::Vector(a), Type::Vector(b)) if a.scalar_count == b.scalar_count => {
            scalar_cast_rule(a.scalar_ty, b.scalar_ty)
        }
        _ => Err(CompileError::new(
            CompileErrorKind::TypeMismatch,
            "<cast>",
            0,
            format!("cast {} -> {}", from, to),
            vec![],
        )),
    }
}
fn scalar_cast_rule(a: ScalarType, b: ScalarType) -> Result<CastRule> {
    if a == b {
        return Ok(CastRule::Identity);
    }
    match (a.is_float(), b.is_float()) {
        (true, true) => Ok(CastRule::Convert),
        (false, false) => {
            if a.size() == b.size() {
                Ok(CastRule::Bitcast)
            } else {
                Ok(CastRule::Convert)
            }
        }
        _ => Ok(CastRule::Convert),
    }
}
