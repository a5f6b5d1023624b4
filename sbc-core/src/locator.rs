//! Parameter-signature grammar (§6): I/O kind, slot and descriptor
//! binding carriers used by both the front-end (to validate a function
//! signature) and the back-end (to wire up resources).
use std::fmt;

use crate::error::internal::{anyhow, Result};
use crate::ty::Type;

/// `(descriptor set, binding)` pair. Carries both halves so a
/// `BindingConflict` check can compare them as a single hashable key,
/// the same shape `spirq-core::locator::DescriptorBinding` uses.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Default, Clone, Copy, Debug)]
pub struct DescriptorBinding(u32, u32);
impl DescriptorBinding {
    pub fn new(set: u32, bind: u32) -> Self {
        DescriptorBinding(set, bind)
    }
    pub fn set(&self) -> u32 {
        self.0
    }
    pub fn bind(&self) -> u32 {
        self.1
    }
}
impl fmt::Display for DescriptorBinding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(set={}, bind={})", self.0, self.1)
    }
}

/// Input/output interface location.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Default, Clone, Copy, Debug)]
pub struct InterfaceLocation(u32);
impl InterfaceLocation {
    pub fn new(loc: u32) -> Self {
        InterfaceLocation(loc)
    }
    pub fn loc(&self) -> u32 {
        self.0
    }
}
impl fmt::Display for InterfaceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(loc={})", self.0)
    }
}

/// A builtin interface variable slot (`GlobalInvocationId`, `Position`,
/// ...), kept as its SPIR-V-spec-given name rather than re-deriving the
/// `BuiltIn` enum, since the dialect only ever needs to echo the name
/// back into an `OpDecorate ... BuiltIn` instruction.
pub type BuiltinName = String;

/// Where a parameter's value comes from / goes to.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum Slot {
    Location(InterfaceLocation),
    Builtin(BuiltinName),
    Binding(u32),
    Descriptor(DescriptorBinding),
}
impl fmt::Display for Slot {
    /// Canonical textual form, used as an SBC operand (`co_resource`)
    /// and round-tripped by [`Slot::parse`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Slot::Location(l) => write!(f, "loc:{}", l.loc()),
            Slot::Builtin(name) => write!(f, "builtin:{}", name),
            Slot::Binding(b) => write!(f, "bind:{}", b),
            Slot::Descriptor(d) => write!(f, "desc:{}:{}", d.set(), d.bind()),
        }
    }
}
impl Slot {
    pub fn parse(s: &str) -> Result<Slot> {
        let (tag, rest) = s.split_once(':').ok_or_else(|| anyhow!("malformed slot: {}", s))?;
        match tag {
            "loc" => Ok(Slot::Location(InterfaceLocation::new(rest.parse()?))),
            "builtin" => Ok(Slot::Builtin(rest.to_owned())),
            "bind" => Ok(Slot::Binding(rest.parse()?)),
            "desc" => {
                let (set, bind) = rest
                    .split_once(':')
                    .ok_or_else(|| anyhow!("malformed descriptor slot: {}", s))?;
                Ok(Slot::Descriptor(DescriptorBinding::new(
                    set.parse()?,
                    bind.parse()?,
                )))
            }
            _ => Err(anyhow!("unknown slot tag: {}", tag)),
        }
    }
}

/// The I/O kind of a shader parameter, per §6's signature grammar.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum IoKind {
    Input,
    Output,
    Buffer,
    Uniform,
    Texture,
    Sampler,
}
impl fmt::Display for IoKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            IoKind::Input => "input",
            IoKind::Output => "output",
            IoKind::Buffer => "buffer",
            IoKind::Uniform => "uniform",
            IoKind::Texture => "texture",
            IoKind::Sampler => "sampler",
        };
        f.write_str(s)
    }
}
impl IoKind {
    pub fn parse(s: &str) -> Result<IoKind> {
        Ok(match s {
            "input" => IoKind::Input,
            "output" => IoKind::Output,
            "buffer" => IoKind::Buffer,
            "uniform" => IoKind::Uniform,
            "texture" => IoKind::Texture,
            "sampler" => IoKind::Sampler,
            _ => return Err(anyhow!("unknown iokind: {}", s)),
        })
    }
}

/// One decorated shader parameter: `(iokind, slot, type)`.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct Param {
    pub name: String,
    pub iokind: IoKind,
    pub slot: Slot,
    pub ty: Type,
}

/// The ordered parameter list of a shader entry point.
pub type Signature = Vec<Param>;

/// Which pipeline stage a shader targets; determines whether a bare
/// `return` lowers to `OpKill` (fragment) or `OpReturn` (otherwise).
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}
