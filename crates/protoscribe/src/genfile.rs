//! Import-aware output buffers.
//!
//! A [`GeneratedFile`] is an append-only line buffer bound to one output
//! file and one "home" module path. While content is appended it tracks
//! every foreign [`Ident`] it renders; the deduplicated import declarations
//! are inserted lazily when the buffer is rendered into the response, at the
//! position marked with [`GeneratedFile::print_imports`].

use prost_types::compiler::code_generator_response;

use crate::ident::{Ident, ModulePath};

/// One piece of a generated line: plain text or a cross-module identifier.
#[derive(Debug, Clone)]
pub enum Fragment {
    Text(String),
    Ident(Ident),
}

/// Conversion into a line [`Fragment`], implemented for the kinds of values
/// the [`p!`](crate::p) macro accepts. Anything else is a compile error.
pub trait IntoFragment {
    fn into_fragment(self) -> Fragment;
}

impl IntoFragment for Fragment {
    fn into_fragment(self) -> Fragment {
        self
    }
}

impl IntoFragment for Ident {
    fn into_fragment(self) -> Fragment {
        Fragment::Ident(self)
    }
}

impl IntoFragment for &Ident {
    fn into_fragment(self) -> Fragment {
        Fragment::Ident(self.clone())
    }
}

impl IntoFragment for &str {
    fn into_fragment(self) -> Fragment {
        Fragment::Text(self.to_string())
    }
}

impl IntoFragment for String {
    fn into_fragment(self) -> Fragment {
        Fragment::Text(self)
    }
}

impl IntoFragment for &String {
    fn into_fragment(self) -> Fragment {
        Fragment::Text(self.clone())
    }
}

macro_rules! display_fragment {
    ($($ty:ty),+) => {
        $(impl IntoFragment for $ty {
            fn into_fragment(self) -> Fragment {
                Fragment::Text(self.to_string())
            }
        })+
    };
}

display_fragment!(bool, char, i32, i64, u32, u64, usize);

/// Append one line to a [`GeneratedFile`] from mixed text and [`Ident`]
/// fragments:
///
/// ```ignore
/// p!(g, "class ", message.ident, ":");
/// ```
#[macro_export]
macro_rules! p {
    ($g:expr $(,)?) => {
        $g.push_line(::std::iter::empty::<$crate::genfile::Fragment>())
    };
    ($g:expr, $($arg:expr),+ $(,)?) => {
        $g.push_line([$($crate::genfile::IntoFragment::into_fragment($arg)),+])
    };
}

/// A file generated by a plugin.
///
/// Create one through
/// [`Plugin::new_generated_file`](crate::Plugin::new_generated_file) so it
/// is collected into the response.
#[derive(Debug)]
pub struct GeneratedFile {
    name: String,
    module_path: ModulePath,
    buf: Vec<String>,
    indent: usize,
    import_mark: Option<usize>,
    imports: Vec<ModulePath>,
}

impl GeneratedFile {
    pub fn new(name: impl Into<String>, module_path: ModulePath) -> Self {
        Self {
            name: name.into(),
            module_path,
            buf: Vec::new(),
            indent: 0,
            import_mark: None,
            imports: Vec::new(),
        }
    }

    /// Output filename, relative to the generation output directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The buffer's home module path.
    pub fn module_path(&self) -> &ModulePath {
        &self.module_path
    }

    /// Append one line. Prefer the [`p!`](crate::p) macro.
    pub fn push_line<I>(&mut self, fragments: I)
    where
        I: IntoIterator<Item = Fragment>,
    {
        let mut line = String::new();
        for fragment in fragments {
            match fragment {
                Fragment::Text(text) => line.push_str(&text),
                Fragment::Ident(ident) => {
                    let rendered = self.qualified_ident(&ident);
                    line.push_str(&rendered);
                }
            }
        }
        if !line.is_empty() && self.indent > 0 {
            line.insert_str(0, &" ".repeat(self.indent));
        }
        self.buf.push(line);
    }

    /// Render `ident` as seen from this buffer: the short name if it lives
    /// in the buffer's home module, the qualified spelling otherwise. A
    /// foreign module path is recorded for the import block; repeats are
    /// deduplicated and first-reference order is preserved.
    pub fn qualified_ident(&mut self, ident: &Ident) -> String {
        if *ident.module_path() == self.module_path {
            ident.name().to_string()
        } else {
            if !self.imports.contains(ident.module_path()) {
                self.imports.push(ident.module_path().clone());
            }
            ident.qualified()
        }
    }

    /// Mark the current position: the import declarations are inserted here
    /// when the buffer is rendered. Without a mark no import block is
    /// emitted.
    pub fn print_imports(&mut self) {
        self.import_mark = Some(self.buf.len());
    }

    /// Module paths referenced so far, in first-reference order.
    pub fn imports(&self) -> &[ModulePath] {
        &self.imports
    }

    /// Set the absolute indentation (in spaces) applied to subsequent
    /// lines; returns the previous value.
    pub fn set_indent(&mut self, indent: usize) -> usize {
        std::mem::replace(&mut self.indent, indent)
    }

    /// Run `f` with the indentation increased by `delta` spaces.
    pub fn indent<F>(&mut self, delta: usize, f: F)
    where
        F: FnOnce(&mut Self),
    {
        self.indent += delta;
        f(self);
        self.indent -= delta;
    }

    /// The buffer's content with the import block in place.
    pub fn render(&self) -> String {
        match self.import_mark {
            Some(mark) => {
                let mut lines: Vec<&str> = self.buf[..mark].iter().map(String::as_str).collect();
                let imports: Vec<String> = self
                    .imports
                    .iter()
                    .map(|path| format!("import {path}"))
                    .collect();
                lines.extend(imports.iter().map(String::as_str));
                lines.extend(self.buf[mark..].iter().map(String::as_str));
                lines.join("\n")
            }
            None => self.buf.join("\n"),
        }
    }

    pub(crate) fn into_response_file(self) -> code_generator_response::File {
        let content = self.render();
        code_generator_response::File {
            name: Some(self.name),
            content: Some(content),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::ModulePath;
    use crate::p;

    fn buffer() -> GeneratedFile {
        GeneratedFile::new("out.txt", ModulePath::new("home_pb"))
    }

    #[test]
    fn home_idents_render_short_and_add_no_import() {
        let mut g = buffer();
        let book = ModulePath::new("home_pb").ident("Book");
        p!(g, "class ", &book, ":");
        assert_eq!(g.render(), "class Book:");
        assert!(g.imports().is_empty());
    }

    #[test]
    fn foreign_idents_render_qualified_and_import_once() {
        let mut g = buffer();
        let shelf = ModulePath::new("shelf_pb").ident("Shelf");
        g.print_imports();
        p!(g, "a: ", &shelf);
        p!(g, "b: ", &shelf);
        assert_eq!(g.imports().len(), 1);
        assert_eq!(
            g.render(),
            "import shelf_pb\na: shelf_pb.Shelf\nb: shelf_pb.Shelf"
        );
    }

    #[test]
    fn import_order_is_first_reference() {
        let mut g = buffer();
        g.print_imports();
        let b = ModulePath::new("b_pb").ident("B");
        let a = ModulePath::new("a_pb").ident("A");
        p!(g, &b, " ", &a, " ", &b);
        assert_eq!(
            g.imports(),
            &[ModulePath::new("b_pb"), ModulePath::new("a_pb")]
        );
        assert_eq!(g.render(), "import b_pb\nimport a_pb\nb_pb.B a_pb.A b_pb.B");
    }

    #[test]
    fn without_mark_no_import_block_is_emitted() {
        let mut g = buffer();
        let shelf = ModulePath::new("shelf_pb").ident("Shelf");
        p!(g, "a: ", &shelf);
        assert_eq!(g.render(), "a: shelf_pb.Shelf");
    }

    #[test]
    fn indentation_nests_and_restores() {
        let mut g = buffer();
        p!(g, "top-level");
        g.indent(2, |g| {
            p!(g, "indented-by-two");
            g.indent(4, |g| {
                p!(g, "indented-by-six");
            });
            p!(g, "return-by-two");
        });
        p!(g, "return-top-level");
        assert_eq!(
            g.render(),
            "top-level\n  indented-by-two\n      indented-by-six\n  return-by-two\nreturn-top-level"
        );
    }

    #[test]
    fn set_indent_is_absolute() {
        let mut g = buffer();
        let old = g.set_indent(4);
        assert_eq!(old, 0);
        p!(g, "deep");
        g.set_indent(old);
        p!(g);
        p!(g, "flush");
        // Empty lines stay empty, indented or not.
        assert_eq!(g.render(), "    deep\n\nflush");
    }

    #[test]
    fn mixed_fragments_stringify() {
        let mut g = buffer();
        p!(g, "- count: ", 3usize, ", on: ", true);
        assert_eq!(g.render(), "- count: 3, on: true");
    }
}
