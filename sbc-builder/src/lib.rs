//! SPIR-V Module Builder (MB): id allocation, type/constant interning,
//! and section-ordered word serialization (§4.4).
pub mod alloc;
pub mod module;
pub mod pool;

pub use alloc::IdAllocator;
pub use module::Builder;
pub use pool::TypeConstPool;

#[cfg(test)]
mod tests {
    use super::*;
    use sbc_core::constant::{Constant, ConstantValue};
    use sbc_core::ty::Type;

    #[test]
    fn header_and_bound_are_well_formed() {
        let mut b = Builder::new(0);
        let _ = b.type_id(&Type::f32()).unwrap();
        let words = b.build();
        assert_eq!(words[0], 0x0723_0203);
        assert!(words[3] >= 2); // bound: at least the allocated f32 type id + 1
    }

    #[test]
    fn repeated_type_request_reuses_the_same_id() {
        let mut b = Builder::new(0);
        let a = b.type_id(&Type::f32()).unwrap();
        let c = b.type_id(&Type::f32()).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn composite_constant_shares_scalar_children() {
        let mut b = Builder::new(0);
        let scalar = Constant::scalar(ConstantValue::from(0.0f32));
        let vec2 = Constant::Composite {
            ty: Type::vec(sbc_core::ty::ScalarType::f32(), 2),
            children: vec![scalar.clone(), scalar.clone()],
        };
        let before = b.globals_instr_count();
        let _ = b.const_id(&vec2).unwrap();
        let after = b.globals_instr_count();
        // One OpTypeFloat + one OpTypeVector + one OpConstant (shared) +
        // one OpConstantComposite: four new instructions, not five.
        assert_eq!(after - before, 4);
    }
}
