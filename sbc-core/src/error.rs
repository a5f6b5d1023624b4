//! The compiler's structured error channel.
use std::error;
use std::fmt;

/// Internal, non-user-facing errors (invariant violations, broken
/// expression trees, id pool exhaustion). These are bugs in the
/// compiler, not in the shader being compiled.
pub mod internal {
    pub use anyhow::{anyhow, Error, Result};
}

/// Tag identifying which rule of the language a [`CompileError`] broke.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum CompileErrorKind {
    /// Use of a name that is not a parameter, a prior local, `stdlib`, a
    /// type name, or a literal.
    UnresolvedName,
    /// Call to something that isn't callable, or a `stdlib` entry that
    /// doesn't exist.
    BadCall,
    /// Implicit int<->float mixing, or incompatible operand types for an
    /// operator.
    TypeMismatch,
    /// A tuple/list literal or destructuring outside the one recognized
    /// pack-then-unpack window.
    UnsupportedTupleUse,
    /// Two resources declared the same `(set, binding)`.
    BindingConflict,
    /// A language construct outside the restricted dialect (recursion,
    /// closures, dynamic attribute access, non-constant loop step, ...).
    UnsupportedFeature,
    /// An invariant was violated while generating SPIR-V. This is a
    /// compiler bug, not a user error, but it is still reported through
    /// the same channel so callers don't need two error types.
    Internal,
}
impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use CompileErrorKind::*;
        let s = match self {
            UnresolvedName => "UnresolvedName",
            BadCall => "BadCall",
            TypeMismatch => "TypeMismatch",
            UnsupportedTupleUse => "UnsupportedTupleUse",
            BindingConflict => "BindingConflict",
            UnsupportedFeature => "UnsupportedFeature",
            Internal => "Internal",
        };
        f.write_str(s)
    }
}

/// A structured compiler error, carrying enough context to reproduce the
/// offending source line in a diagnostic message.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub file: String,
    pub line: u32,
    pub source_line: String,
    pub vars: Vec<String>,
}
impl CompileError {
    pub fn new(
        kind: CompileErrorKind,
        file: impl Into<String>,
        line: u32,
        source_line: impl Into<String>,
        vars: Vec<String>,
    ) -> Self {
        CompileError {
            kind,
            file: file.into(),
            line,
            source_line: source_line.into(),
            vars,
        }
    }

    pub fn unresolved_name(
        file: impl Into<String>,
        line: u32,
        source_line: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(
            CompileErrorKind::UnresolvedName,
            file,
            line,
            source_line,
            vec![name.into()],
        )
    }
    pub fn type_mismatch(
        file: impl Into<String>,
        line: u32,
        source_line: impl Into<String>,
        vars: Vec<String>,
    ) -> Self {
        Self::new(CompileErrorKind::TypeMismatch, file, line, source_line, vars)
    }
    pub fn binding_conflict(
        file: impl Into<String>,
        line: u32,
        source_line: impl Into<String>,
        vars: Vec<String>,
    ) -> Self {
        Self::new(
            CompileErrorKind::BindingConflict,
            file,
            line,
            source_line,
            vars,
        )
    }
    pub fn internal(msg: impl fmt::Display) -> Self {
        Self::new(CompileErrorKind::Internal, "<internal>", 0, msg.to_string(), vec![])
    }
}
impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} at {}:{}: {}\nvariables: {}",
            self.kind,
            self.file,
            self.line,
            self.source_line,
            self.vars.join(", ")
        )
    }
}
impl error::Error for CompileError {}
impl From<internal::Error> for CompileError {
    fn from(e: internal::Error) -> Self {
        CompileError::internal(e)
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
