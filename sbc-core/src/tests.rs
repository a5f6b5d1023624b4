use crate::error::CompileErrorKind;
use crate::ty::{cast_rule, CastRule, ScalarType, Type, VectorType};

#[test]
fn promote_int_and_int_widens() {
    let a = Type::Scalar(ScalarType::int(16));
    let b = Type::Scalar(ScalarType::int(32));
    assert_eq!(a.promote(&b).unwrap(), Type::Scalar(ScalarType::int(32)));
}

#[test]
fn promote_float_beats_int_same_rank() {
    let a = Type::Scalar(ScalarType::int(32));
    let b = Type::Scalar(ScalarType::float(32));
    // int/float mixing is rejected outright; only bool may mix freely.
    assert_eq!(a.promote(&b), Err(CompileErrorKind::TypeMismatch));
}

#[test]
fn promote_bool_with_int_is_allowed() {
    let a = Type::Scalar(ScalarType::Bool);
    let b = Type::Scalar(ScalarType::int(32));
    assert_eq!(a.promote(&b).unwrap(), Type::Scalar(ScalarType::int(32)));
}

#[test]
fn promote_vector_requires_equal_arity() {
    let a = Type::Vector(VectorType {
        scalar_ty: ScalarType::f32(),
        scalar_count: 3,
    });
    let b = Type::Vector(VectorType {
        scalar_ty: ScalarType::f32(),
        scalar_count: 4,
    });
    assert_eq!(a.promote(&b), Err(CompileErrorKind::TypeMismatch));
}

#[test]
fn cast_same_width_int_is_bitcast() {
    let from = Type::Scalar(ScalarType::int(32));
    let to = Type::Scalar(ScalarType::uint(32));
    assert_eq!(cast_rule(&from, &to).unwrap(), CastRule::Bitcast);
}

#[test]
fn cast_int_to_float_is_convert() {
    let from = Type::i32();
    let to = Type::f32();
    assert_eq!(cast_rule(&from, &to).unwrap(), CastRule::Convert);
}

#[test]
fn cast_identity() {
    let t = Type::f32();
    assert_eq!(cast_rule(&t, &t).unwrap(), CastRule::Identity);
}

#[test]
fn struct_size_respects_member_alignment() {
    use crate::ty::{StructMember, StructType};
    let s = Type::Struct(StructType {
        name: "S".into(),
        members: vec![
            StructMember {
                name: "a".into(),
                ty: Type::f32(),
            },
            StructMember {
                name: "b".into(),
                ty: Type::vec(ScalarType::f32(), 3),
            },
        ],
    });
    // vec3 aligns like vec4 (16 bytes), so `b` starts at offset 16, not 4.
    assert_eq!(s.size(), Some(16 + 12));
}

#[test]
fn parse_is_the_inverse_of_display_for_scalars_vectors_matrices_arrays() {
    for s in ["bool", "i32", "u8", "f16", "f32", "f64"] {
        assert_eq!(Type::parse(s).unwrap().to_string(), s);
    }
    assert_eq!(Type::parse("vec3<f32>").unwrap().to_string(), "vec3<f32>");
    assert_eq!(Type::parse("mat4x4<f32>").unwrap().to_string(), "mat4x4<f32>");
    assert_eq!(Type::parse("[f32; 4]").unwrap().to_string(), "[f32; 4]");
    assert_eq!(Type::parse("[i32]").unwrap().to_string(), "[i32]");
    assert_eq!(Type::parse("sampler").unwrap().to_string(), "sampler");
}

#[test]
fn parse_texture_accepts_sampled_type_and_storage_format() {
    let t = Type::parse("2d f32").unwrap();
    assert_eq!(t.to_string(), "2d f32");
    let t = Type::parse("2d r16i").unwrap();
    assert_eq!(t.to_string(), "2d r16i");
}

#[test]
fn parse_rejects_garbage() {
    assert!(Type::parse("not a type").is_err());
}
