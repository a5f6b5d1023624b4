//! Canonical-form interning tables: `Type`/`Constant` → already-assigned
//! result id. Mirrors the insert-once discipline of
//! `spirq-core::ty::reg::TypeRegistry::set`, but keyed by the value
//! being interned rather than by a pre-assigned id, since the builder
//! is allocating ids for the first time rather than replaying them off
//! a parsed binary.
use fnv::FnvHashMap;
use spirv::StorageClass;

use sbc_core::constant::Constant;
use sbc_core::ty::Type;

#[derive(Default)]
pub struct TypeConstPool {
    types: FnvHashMap<Type, u32>,
    pointer_types: FnvHashMap<(StorageClass, Type), u32>,
    consts: FnvHashMap<Constant, u32>,
}
impl TypeConstPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_type(&self, ty: &Type) -> Option<u32> {
        self.types.get(ty).copied()
    }
    pub fn insert_type(&mut self, ty: Type, id: u32) {
        self.types.insert(ty, id);
    }

    pub fn get_pointer_type(&self, storage_class: StorageClass, pointee: &Type) -> Option<u32> {
        self.pointer_types
            .get(&(storage_class, pointee.clone()))
            .copied()
    }
    pub fn insert_pointer_type(&mut self, storage_class: StorageClass, pointee: Type, id: u32) {
        self.pointer_types.insert((storage_class, pointee), id);
    }

    pub fn get_const(&self, c: &Constant) -> Option<u32> {
        self.consts.get(c).copied()
    }
    pub fn insert_const(&mut self, c: Constant, id: u32) {
        self.consts.insert(c, id);
    }
}
