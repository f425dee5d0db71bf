//! Name index: pass one of the linker.
//!
//! Every message, enum, service and extension across the full transitive
//! file set is registered here under its fully-qualified dotted name before
//! any reference is resolved. Declaration order and recursive nesting can
//! never cause failures in this pass; only a name claimed twice can.

use std::collections::HashMap;

use crate::error::Error;
use crate::graph::{EnumId, ExtensionId, MessageId, ServiceId};

/// A declaration registered under a fully-qualified name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decl {
    Message(MessageId),
    Enum(EnumId),
    Service(ServiceId),
    Extension(ExtensionId),
}

/// Fully-qualified name → declaration index over the whole file set.
#[derive(Debug, Default)]
pub struct SymbolTable {
    // Value carries the declaring file for duplicate diagnostics.
    decls: HashMap<String, (Decl, String)>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, name: &str, decl: Decl, file: &str) -> Result<(), Error> {
        if let Some((_, first_file)) = self.decls.get(name) {
            return Err(Error::DuplicateName {
                name: name.to_string(),
                first_file: first_file.clone(),
                second_file: file.to_string(),
            });
        }
        self.decls.insert(name.to_string(), (decl, file.to_string()));
        Ok(())
    }

    /// Look up an exact fully-qualified name (no leading dot).
    pub fn lookup(&self, name: &str) -> Option<Decl> {
        self.decls.get(name).map(|(decl, _)| *decl)
    }

    /// Resolve `name` as seen from the scope `referrer`.
    ///
    /// A leading dot makes the name absolute. Otherwise C++ scoping rules
    /// apply: the innermost enclosing scope is tried first, then each outer
    /// scope in turn, and finally the bare name.
    pub fn resolve(&self, referrer: &str, name: &str) -> Option<Decl> {
        if let Some(absolute) = name.strip_prefix('.') {
            return self.lookup(absolute);
        }
        let mut scope = Some(referrer);
        while let Some(s) = scope {
            let candidate = if s.is_empty() {
                name.to_string()
            } else {
                format!("{s}.{name}")
            };
            if let Some(decl) = self.lookup(&candidate) {
                return Some(decl);
            }
            scope = if s.is_empty() {
                None
            } else {
                Some(s.rfind('.').map_or("", |dot| &s[..dot]))
            };
        }
        None
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(names: &[&str]) -> SymbolTable {
        let mut table = SymbolTable::new();
        for (i, name) in names.iter().enumerate() {
            table
                .register(name, Decl::Message(MessageId(i as u32)), "test.proto")
                .unwrap();
        }
        table
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut table = table(&["acme.Hello"]);
        let err = table
            .register("acme.Hello", Decl::Message(MessageId(9)), "other.proto")
            .unwrap_err();
        match err {
            Error::DuplicateName {
                name,
                first_file,
                second_file,
            } => {
                assert_eq!(name, "acme.Hello");
                assert_eq!(first_file, "test.proto");
                assert_eq!(second_file, "other.proto");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolve_walks_scopes_outward() {
        let table = table(&[
            "acme.Hello",
            "acme.Hello.World",
            "acme.cloud.library.v1.Hello",
            "acme.cloud.library.v1.Hello.World",
            "google.protobuf.Empty",
        ]);

        let cases = [
            ("acme.cloud.library.v1.Hello", "World", 3u32),
            ("acme.Hello", "World", 1),
            ("acme.cloud.library.v1.Hello", "Hello", 2),
            // No `Hello` anywhere under acme.cloud.library: falls out to acme.
            ("acme.cloud.library.Something", "Hello", 0),
            ("acme.cloud.library.v1.Hello", "google.protobuf.Empty", 4),
        ];
        for (referrer, name, expect) in cases {
            match table.resolve(referrer, name) {
                Some(Decl::Message(id)) => assert_eq!(id, MessageId(expect), "{referrer} / {name}"),
                other => panic!("{referrer} / {name}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn leading_dot_is_absolute() {
        let table = table(&["acme.Hello", "Hello"]);
        assert_eq!(
            table.resolve("acme.whatever.Deep", ".Hello"),
            Some(Decl::Message(MessageId(1)))
        );
        assert_eq!(table.resolve("", "acme.Hello"), Some(Decl::Message(MessageId(0))));
        assert_eq!(table.resolve("acme", ".missing.Name"), None);
    }
}
