//! Protoscribe: a framework for writing `protoc` code generator plugins.
//!
//! protoc hands plugins a flat, string-addressed bundle of file descriptors.
//! Protoscribe links that bundle into a navigable graph — field types,
//! method I/O and extension targets resolved to real references, map entries
//! and proto3 synthetic oneofs folded into the shapes generators actually
//! want — and provides import-aware output buffers for emitting code.
//!
//! A minimal plugin:
//!
//! ```no_run
//! use protoscribe::{p, Options};
//!
//! fn main() -> Result<(), protoscribe::Error> {
//!     Options::new().run(|gen| {
//!         let graph = gen.graph();
//!         for file_id in gen.files_to_generate() {
//!             let file = graph.file(file_id);
//!             let g = gen.new_generated_file(
//!                 format!("{}.out", file.generated_filename_prefix),
//!                 file.module_path.clone(),
//!             );
//!             p!(g, "// Generated from ", &file.name, ". Do not edit.");
//!             g.print_imports();
//!             for &message_id in &file.messages {
//!                 let message = graph.message(message_id);
//!                 p!(g, "record ", &message.ident, ":");
//!                 for field in &message.fields {
//!                     p!(g, "  ", &field.name, ": ", field.kind.as_str());
//!                 }
//!             }
//!         }
//!         Ok(())
//!     })
//! }
//! ```
//!
//! Identifiers from *other* files render fully qualified and their modules
//! are collected into a deduplicated import block — see [`GeneratedFile`].
//! The whole pipeline is synchronous and run-to-completion: one request in,
//! one response out.

pub mod case;
pub mod error;
pub mod ext;
pub mod genfile;
pub mod graph;
pub mod ident;
pub mod link;
pub mod location;
pub mod plugin;
pub mod registry;

pub use error::Error;
pub use ext::{ExtensionRegistry, ExtensionValue};
pub use genfile::GeneratedFile;
pub use graph::{
    Cardinality, Enum, EnumId, EnumValue, Extension, ExtensionId, Field, File, FileId, Graph,
    Kind, Message, MessageId, Method, Oneof, Service, ServiceId,
};
pub use ident::{default_module_path, Ident, ModulePath};
pub use link::{link, LinkConfig};
pub use location::Comments;
pub use plugin::{Options, Plugin};
pub use registry::{Decl, SymbolTable};
