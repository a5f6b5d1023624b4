//! The symbolic value graph the back-end walks SBC with (§3): a typed
//! `ValueId` per SPIR-V result, plus an arena-indexed access-chain graph
//! that lets a diagnostic reconstruct `foo[0]` / `index.x` style
//! expressions without owning pointers back into the variable table
//! (§9's "arena with integer indices rather than owned pointers").
use spirv::StorageClass;

use sbc_core::ty::Type;

/// Whether a [`ValueId`] names a location that can be stored through
/// (an `OpVariable`/`OpAccessChain` result) or a plain computed value.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ValueKind {
    LValue,
    RValue,
}

/// One symbolic stack slot during back-end evaluation: a SPIR-V result
/// id, its inferred type, whether it is addressable, and (for
/// diagnostics only) where it came from.
#[derive(Clone, Debug)]
pub struct ValueId {
    pub result_id: u32,
    pub ty: Type,
    pub kind: ValueKind,
    pub provenance: Option<u32>,
}
impl ValueId {
    pub fn rvalue(result_id: u32, ty: Type) -> Self {
        ValueId {
            result_id,
            ty,
            kind: ValueKind::RValue,
            provenance: None,
        }
    }
    pub fn lvalue(result_id: u32, ty: Type) -> Self {
        ValueId {
            result_id,
            ty,
            kind: ValueKind::LValue,
            provenance: None,
        }
    }
    pub fn with_provenance(mut self, node: Option<u32>) -> Self {
        self.provenance = node;
        self
    }
}

/// A declared name's storage: every parameter and every local the
/// source program assigns gets exactly one of these. Locals are
/// `Function`-storage; resource parameters take whatever storage class
/// their `IoKind` maps to (see `resources::storage_class_of`).
#[derive(Clone, Debug)]
pub struct Variable {
    pub ptr_id: u32,
    /// The variable's logical (unwrapped) type: for a `buffer`/`uniform`
    /// resource this is the declared payload type, not the synthetic
    /// one-member block struct it is physically wrapped in.
    pub ty: Type,
    pub storage_class: StorageClass,
    /// Set for `buffer`/`uniform` resources, whose physical SPIR-V type
    /// is a one-member `Block`-decorated struct: every access chain
    /// into them must start with a constant-`0` member index before the
    /// caller's own indices.
    pub wrapped_in_block: bool,
}

/// One node in the access-chain arena used purely to render diagnostic
/// expressions (`foo[0]`, `index.x`, `buf[i].xyz`) without the value
/// graph otherwise needing to track provenance at all.
#[derive(Clone, Debug)]
pub enum AccessNode {
    Root(String),
    Index { parent: u32, index_desc: String },
    Attr { parent: u32, name: String },
}

/// Arena of [`AccessNode`]s; `VariableAccessId` in the spec's
/// terminology is just an index into this table.
#[derive(Default)]
pub struct AccessArena {
    nodes: Vec<AccessNode>,
}
impl AccessArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&mut self, name: impl Into<String>) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(AccessNode::Root(name.into()));
        id
    }
    pub fn index(&mut self, parent: u32, index_desc: impl Into<String>) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(AccessNode::Index {
            parent,
            index_desc: index_desc.into(),
        });
        id
    }
    pub fn attr(&mut self, parent: u32, name: impl Into<String>) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(AccessNode::Attr {
            parent,
            name: name.into(),
        });
        id
    }

    /// Renders the full expression leading to `id`, e.g. `foo[0]` or
    /// `index.x`.
    pub fn render(&self, id: u32) -> String {
        match &self.nodes[id as usize] {
            AccessNode::Root(name) => name.clone(),
            AccessNode::Index { parent, index_desc } => {
                format!("{}[{}]", self.render(*parent), index_desc)
            }
            AccessNode::Attr { parent, name } => format!("{}.{}", self.render(*parent), name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_index_and_attr_chains() {
        let mut arena = AccessArena::new();
        let foo = arena.root("foo");
        let foo0 = arena.index(foo, "0");
        assert_eq!(arena.render(foo0), "foo[0]");

        let index = arena.root("index");
        let index_x = arena.attr(index, "x");
        assert_eq!(arena.render(index_x), "index.x");
    }
}
