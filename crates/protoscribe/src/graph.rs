//! The resolved descriptor graph.
//!
//! [`Graph`] owns every linked node in id-indexed arenas; cross-references
//! between nodes are copyable ids rather than pointers. Identity of a node
//! *is* its id, which is what lets mutually recursive field types link
//! without unbounded recursion: the linker allocates one slot per declared
//! type up front and fills slots afterwards, so a reference always lands on
//! an already-allocated object.
//!
//! Containment (file → message → nested message) forms a tree; field-type
//! references may form arbitrary cycles across the arenas.

use std::collections::{BTreeMap, HashMap};

use prost_types::{field_descriptor_proto, FieldOptions, FileDescriptorProto, MessageOptions};
use serde::Serialize;

use crate::ident::{Ident, ModulePath};
use crate::location::Comments;
use crate::registry::{Decl, SymbolTable};

// ============================================================================
// Ids
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MessageId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EnumId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ServiceId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExtensionId(pub(crate) u32);

// ============================================================================
// Field kinds
// ============================================================================

/// Proto type of a field, mirroring `FieldDescriptorProto.Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Group,
    Message,
    Bytes,
    Uint32,
    Enum,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
}

impl Kind {
    pub(crate) fn from_proto(kind: field_descriptor_proto::Type) -> Kind {
        use field_descriptor_proto::Type;
        match kind {
            Type::Double => Kind::Double,
            Type::Float => Kind::Float,
            Type::Int64 => Kind::Int64,
            Type::Uint64 => Kind::Uint64,
            Type::Int32 => Kind::Int32,
            Type::Fixed64 => Kind::Fixed64,
            Type::Fixed32 => Kind::Fixed32,
            Type::Bool => Kind::Bool,
            Type::String => Kind::String,
            Type::Group => Kind::Group,
            Type::Message => Kind::Message,
            Type::Bytes => Kind::Bytes,
            Type::Uint32 => Kind::Uint32,
            Type::Enum => Kind::Enum,
            Type::Sfixed32 => Kind::Sfixed32,
            Type::Sfixed64 => Kind::Sfixed64,
            Type::Sint32 => Kind::Sint32,
            Type::Sint64 => Kind::Sint64,
        }
    }

    /// True for every kind that is not a message, group or enum reference.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Kind::Message | Kind::Group | Kind::Enum)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Double => "double",
            Kind::Float => "float",
            Kind::Int64 => "int64",
            Kind::Uint64 => "uint64",
            Kind::Int32 => "int32",
            Kind::Fixed64 => "fixed64",
            Kind::Fixed32 => "fixed32",
            Kind::Bool => "bool",
            Kind::String => "string",
            Kind::Group => "group",
            Kind::Message => "message",
            Kind::Bytes => "bytes",
            Kind::Uint32 => "uint32",
            Kind::Enum => "enum",
            Kind::Sfixed32 => "sfixed32",
            Kind::Sfixed64 => "sfixed64",
            Kind::Sint32 => "sint32",
            Kind::Sint64 => "sint64",
        }
    }
}

/// Label of a field, mirroring `FieldDescriptorProto.Label`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    Optional,
    Required,
    Repeated,
}

impl Cardinality {
    pub(crate) fn from_proto(label: field_descriptor_proto::Label) -> Cardinality {
        use field_descriptor_proto::Label;
        match label {
            Label::Optional => Cardinality::Optional,
            Label::Required => Cardinality::Required,
            Label::Repeated => Cardinality::Repeated,
        }
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// One schema source unit and its top-level declarations.
#[derive(Debug)]
pub struct File {
    /// The raw descriptor, kept for options, syntax and source info.
    pub proto: FileDescriptorProto,
    pub name: String,
    pub package: String,
    /// Filename with the `.proto` extension removed.
    pub generated_filename_prefix: String,
    /// Module path assigned by the session's import-path policy; computed
    /// once per file and cached here.
    pub module_path: ModulePath,
    /// Whether this file was explicitly requested for generation.
    pub generate: bool,
    pub dependencies: Vec<FileId>,
    pub messages: Vec<MessageId>,
    pub enums: Vec<EnumId>,
    pub services: Vec<ServiceId>,
    pub extensions: Vec<ExtensionId>,
}

impl File {
    pub fn syntax(&self) -> &str {
        self.proto.syntax()
    }
}

/// A message declaration.
#[derive(Debug)]
pub struct Message {
    pub name: String,
    pub full_name: String,
    pub file: FileId,
    /// Enclosing message for nested declarations.
    pub parent: Option<MessageId>,
    pub fields: Vec<Field>,
    pub oneofs: Vec<Oneof>,
    /// Nested messages, with synthesized map-entry types hidden unless raw
    /// visibility was requested when linking.
    pub nested_messages: Vec<MessageId>,
    pub nested_enums: Vec<EnumId>,
    pub nested_extensions: Vec<ExtensionId>,
    /// True for the synthesized two-field entry type backing a map field.
    pub map_entry: bool,
    pub ident: Ident,
    pub comments: Comments,
    pub options: Option<MessageOptions>,
    pub(crate) path: Vec<i32>,
}

/// A field declaration, including fields living inside oneofs.
#[derive(Debug)]
pub struct Field {
    pub name: String,
    pub full_name: String,
    /// Field number; unique within the owning message.
    pub number: i32,
    pub kind: Kind,
    pub cardinality: Cardinality,
    /// Index into the owning message's `oneofs`. `None` for plain fields
    /// and for members of collapsed synthetic oneofs.
    pub oneof: Option<usize>,
    /// Resolved target for message- and group-kind fields.
    pub message: Option<MessageId>,
    /// Resolved target for enum-kind fields.
    pub enum_type: Option<EnumId>,
    /// Whether the field's has-a-value state is distinguishable from its
    /// default (proto3 `optional`, or a proto2 optional field).
    pub explicit_presence: bool,
    /// Raw flag: the field was declared with proto3 `optional` and protoc
    /// wrapped it in a synthetic oneof.
    pub proto3_optional: bool,
    pub comments: Comments,
    pub options: Option<FieldOptions>,
}

impl Field {
    /// True for map fields: repeated fields whose type is a synthesized
    /// map-entry message.
    pub fn is_map(&self, graph: &Graph) -> bool {
        self.message
            .map(|id| graph.message(id).map_entry)
            .unwrap_or(false)
    }

    /// True for repeated fields that are not maps.
    pub fn is_list(&self, graph: &Graph) -> bool {
        self.cardinality == Cardinality::Repeated && !self.is_map(graph)
    }

    /// The key field of a map field.
    pub fn map_key<'g>(&self, graph: &'g Graph) -> Option<&'g Field> {
        graph.map_entry_fields(self).map(|(key, _)| key)
    }

    /// The value field of a map field.
    pub fn map_value<'g>(&self, graph: &'g Graph) -> Option<&'g Field> {
        graph.map_entry_fields(self).map(|(_, value)| value)
    }
}

/// A oneof declaration.
#[derive(Debug)]
pub struct Oneof {
    pub name: String,
    pub full_name: String,
    /// Indices into the owning message's `fields`.
    pub fields: Vec<usize>,
    /// True for the one-member oneof protoc synthesizes around a proto3
    /// `optional` field. Only observable with raw visibility; collapsed
    /// oneofs are removed from the message entirely.
    pub synthetic: bool,
    pub comments: Comments,
}

/// An enum declaration.
#[derive(Debug)]
pub struct Enum {
    pub name: String,
    pub full_name: String,
    pub file: FileId,
    pub parent: Option<MessageId>,
    pub values: Vec<EnumValue>,
    pub allow_alias: bool,
    pub ident: Ident,
    pub comments: Comments,
}

/// A value of an enum.
#[derive(Debug)]
pub struct EnumValue {
    pub name: String,
    /// Enum values scope to their enum's *parent* namespace (C++ rules), so
    /// `RED` in `acme.Color` has the full name `acme.RED`.
    pub full_name: String,
    pub number: i32,
    pub comments: Comments,
}

/// A service declaration.
#[derive(Debug)]
pub struct Service {
    pub name: String,
    pub full_name: String,
    pub file: FileId,
    pub methods: Vec<Method>,
    pub ident: Ident,
    pub comments: Comments,
    pub(crate) path: Vec<i32>,
}

/// A method of a service. Input and output are always message references.
#[derive(Debug)]
pub struct Method {
    pub name: String,
    pub full_name: String,
    /// The gRPC route for this method: `/package.Service/Method`.
    pub grpc_path: String,
    pub input: MessageId,
    pub output: MessageId,
    pub client_streaming: bool,
    pub server_streaming: bool,
    pub comments: Comments,
}

/// A field-shaped declaration extending a message it does not belong to,
/// most often one of the descriptor option types.
#[derive(Debug)]
pub struct Extension {
    pub name: String,
    pub full_name: String,
    pub number: i32,
    pub kind: Kind,
    pub cardinality: Cardinality,
    pub file: FileId,
    /// The message the extension is declared *inside*, if nested.
    pub parent: Option<MessageId>,
    /// The message the extension applies to.
    pub extendee: MessageId,
    pub message: Option<MessageId>,
    pub enum_type: Option<EnumId>,
    pub comments: Comments,
    pub options: Option<FieldOptions>,
}

// ============================================================================
// Graph
// ============================================================================

/// The fully linked object graph over one transitive descriptor set.
///
/// Immutable once linking completes; all navigation goes through ids.
#[derive(Debug, Default)]
pub struct Graph {
    pub(crate) files: Vec<File>,
    pub(crate) messages: Vec<Message>,
    pub(crate) enums: Vec<Enum>,
    pub(crate) services: Vec<Service>,
    pub(crate) extensions: Vec<Extension>,
    pub(crate) files_by_name: HashMap<String, FileId>,
    /// Declared extensions keyed by `(extendee, field number)`; numbers are
    /// unique per extendee (enforced while linking).
    pub(crate) extension_index: BTreeMap<(MessageId, i32), ExtensionId>,
    pub(crate) symbols: SymbolTable,
}

impl Graph {
    pub fn file(&self, id: FileId) -> &File {
        &self.files[id.0 as usize]
    }

    pub fn message(&self, id: MessageId) -> &Message {
        &self.messages[id.0 as usize]
    }

    pub fn enum_type(&self, id: EnumId) -> &Enum {
        &self.enums[id.0 as usize]
    }

    pub fn service(&self, id: ServiceId) -> &Service {
        &self.services[id.0 as usize]
    }

    pub fn extension(&self, id: ExtensionId) -> &Extension {
        &self.extensions[id.0 as usize]
    }

    pub fn files(&self) -> impl Iterator<Item = (FileId, &File)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, f)| (FileId(i as u32), f))
    }

    pub fn messages(&self) -> impl Iterator<Item = (MessageId, &Message)> {
        self.messages
            .iter()
            .enumerate()
            .map(|(i, m)| (MessageId(i as u32), m))
    }

    pub fn enums(&self) -> impl Iterator<Item = (EnumId, &Enum)> {
        self.enums
            .iter()
            .enumerate()
            .map(|(i, e)| (EnumId(i as u32), e))
    }

    pub fn services(&self) -> impl Iterator<Item = (ServiceId, &Service)> {
        self.services
            .iter()
            .enumerate()
            .map(|(i, s)| (ServiceId(i as u32), s))
    }

    pub fn extensions(&self) -> impl Iterator<Item = (ExtensionId, &Extension)> {
        self.extensions
            .iter()
            .enumerate()
            .map(|(i, x)| (ExtensionId(i as u32), x))
    }

    /// The underlying name index, for scope-aware lookups.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn file_by_name(&self, name: &str) -> Option<FileId> {
        self.files_by_name.get(name).copied()
    }

    pub fn message_by_name(&self, full_name: &str) -> Option<MessageId> {
        match self.symbols.lookup(full_name) {
            Some(Decl::Message(id)) => Some(id),
            _ => None,
        }
    }

    pub fn enum_by_name(&self, full_name: &str) -> Option<EnumId> {
        match self.symbols.lookup(full_name) {
            Some(Decl::Enum(id)) => Some(id),
            _ => None,
        }
    }

    pub fn service_by_name(&self, full_name: &str) -> Option<ServiceId> {
        match self.symbols.lookup(full_name) {
            Some(Decl::Service(id)) => Some(id),
            _ => None,
        }
    }

    pub fn extension_by_name(&self, full_name: &str) -> Option<ExtensionId> {
        match self.symbols.lookup(full_name) {
            Some(Decl::Extension(id)) => Some(id),
            _ => None,
        }
    }

    pub fn files_by_package(&self, package: &str) -> Vec<FileId> {
        self.files()
            .filter(|(_, f)| f.package == package)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn messages_by_package(&self, package: &str, top_level_only: bool) -> Vec<MessageId> {
        self.messages()
            .filter(|(_, m)| {
                self.file(m.file).package == package && (!top_level_only || m.parent.is_none())
            })
            .map(|(id, _)| id)
            .collect()
    }

    pub fn enums_by_package(&self, package: &str, top_level_only: bool) -> Vec<EnumId> {
        self.enums()
            .filter(|(_, e)| {
                self.file(e.file).package == package && (!top_level_only || e.parent.is_none())
            })
            .map(|(id, _)| id)
            .collect()
    }

    pub fn services_by_package(&self, package: &str) -> Vec<ServiceId> {
        self.services()
            .filter(|(_, s)| self.file(s.file).package == package)
            .map(|(id, _)| id)
            .collect()
    }

    /// All extensions declared against `extendee`, in field-number order.
    pub fn extensions_for(&self, extendee: MessageId) -> impl Iterator<Item = ExtensionId> + '_ {
        self.extension_index
            .range((extendee, i32::MIN)..=(extendee, i32::MAX))
            .map(|(_, &id)| id)
    }

    /// The extension declared against `extendee` under `number`, if any.
    pub fn extension_by_number(&self, extendee: MessageId, number: i32) -> Option<ExtensionId> {
        self.extension_index.get(&(extendee, number)).copied()
    }

    /// Key and value fields of the entry message backing a map field.
    pub fn map_entry_fields<'g>(&'g self, field: &Field) -> Option<(&'g Field, &'g Field)> {
        let entry = self.message(field.message?);
        if !entry.map_entry || entry.fields.len() != 2 {
            return None;
        }
        Some((&entry.fields[0], &entry.fields[1]))
    }
}
