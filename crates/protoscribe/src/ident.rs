//! Cross-module identifiers for generated code.
//!
//! A [`ModulePath`] names the logical output unit (file- or package-like
//! grouping) an identifier lives in; an [`Ident`] pairs a module path with a
//! short name. [`GeneratedFile`](crate::GeneratedFile) compares an ident's
//! module path against its own home path to decide whether the qualified
//! spelling and an import declaration are needed.

use serde::Serialize;
use std::fmt;

/// Logical module an output identifier belongs to.
///
/// Two idents are interchangeable without qualification iff their module
/// paths compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModulePath(String);

impl ModulePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create an [`Ident`] living in this module.
    pub fn ident(&self, name: impl Into<String>) -> Ident {
        Ident {
            module_path: self.clone(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A `(module path, short name)` pair identifying a declaration in
/// generated output.
///
/// Nested declarations carry their dotted local name (`Outer.Inner`) as the
/// short name, so they render correctly both inside and outside their home
/// module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Ident {
    module_path: ModulePath,
    name: String,
}

impl Ident {
    pub fn new(module_path: ModulePath, name: impl Into<String>) -> Self {
        Self {
            module_path,
            name: name.into(),
        }
    }

    pub fn module_path(&self) -> &ModulePath {
        &self.module_path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fully qualified `module.Name` spelling.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.module_path, self.name)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module_path, self.name)
    }
}

/// The default module-path policy: one output module per proto file.
///
/// Strips the `.proto` extension, turns path separators into dots and
/// appends a `_pb` suffix:
///
/// ```
/// use protoscribe::ident::default_module_path;
///
/// let path = default_module_path("google/protobuf/field_mask.proto", "google.protobuf");
/// assert_eq!(path.as_str(), "google.protobuf.field_mask_pb");
/// ```
pub fn default_module_path(filename: &str, _package: &str) -> ModulePath {
    let stem = filename.strip_suffix(".proto").unwrap_or(filename);
    ModulePath::new(format!("{}_pb", stem.replace('/', ".")))
}
