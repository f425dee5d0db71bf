//! The linker: raw descriptor set in, resolved [`Graph`] out.
//!
//! Linking runs in two passes over the transitive file set:
//!
//! 1. **Allocate + index.** One arena slot per declared file, message,
//!    enum, service and extension, nested declarations included. Full names
//!    are computed and registered in the [`SymbolTable`]. Enums are leaves
//!    and are completed here.
//! 2. **Resolve + fill.** Field types, method input/output, extension
//!    extendees and file dependencies are looked up through the symbol
//!    table and attached as ids. References land on slots allocated in
//!    pass 1, so forward references and mutual type recursion never recurse.
//!
//! Afterwards, proto3 synthetic oneofs are collapsed into a per-field
//! presence flag and map-entry messages are hidden from nested-type
//! listings, unless [`LinkConfig`] asks for the raw descriptor view.

use std::collections::HashSet;

use prost_types::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    ServiceDescriptorProto,
};

use crate::error::Error;
use crate::graph::{
    Cardinality, Enum, EnumId, EnumValue, Extension, ExtensionId, Field, File, FileId, Graph,
    Kind, Message, MessageId, Method, Oneof, Service, ServiceId,
};
use crate::ident::{default_module_path, ModulePath};
use crate::location;
use crate::registry::{Decl, SymbolTable};

/// Configuration for one linking run.
pub struct LinkConfig {
    /// Maps `(proto filename, package)` to the module path of the file's
    /// generated output. Must be a pure function; it is called exactly once
    /// per file and the result is cached on the [`File`].
    pub module_path: Box<dyn Fn(&str, &str) -> ModulePath>,
    /// Keep the one-member oneofs protoc synthesizes around proto3
    /// `optional` fields instead of collapsing them into a presence flag.
    pub retain_synthetic_oneofs: bool,
    /// Keep synthesized map-entry messages visible in nested-type listings.
    pub retain_map_entry_messages: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            module_path: Box::new(default_module_path),
            retain_synthetic_oneofs: false,
            retain_map_entry_messages: false,
        }
    }
}

/// Link `files` (the full transitive set, dependencies included) into a
/// [`Graph`], marking the files named in `files_to_generate`.
pub fn link(
    files: Vec<FileDescriptorProto>,
    files_to_generate: &[String],
    config: &LinkConfig,
) -> Result<Graph, Error> {
    tracing::debug!(files = files.len(), "linking descriptor set");
    let mut linker = Linker {
        config,
        graph: Graph::default(),
        symbols: SymbolTable::new(),
    };
    for proto in &files {
        linker.allocate_file(proto)?;
    }
    for (i, proto) in files.iter().enumerate() {
        linker.resolve_file(FileId(i as u32), proto)?;
    }
    if !config.retain_map_entry_messages {
        linker.hide_map_entries();
    }
    let mut graph = linker.graph;
    for (i, proto) in files.into_iter().enumerate() {
        let file = &mut graph.files[i];
        file.generate = files_to_generate.iter().any(|name| *name == file.name);
        file.proto = proto;
    }
    graph.symbols = linker.symbols;
    tracing::debug!(
        messages = graph.messages.len(),
        enums = graph.enums.len(),
        services = graph.services.len(),
        extensions = graph.extensions.len(),
        "descriptor set linked"
    );
    Ok(graph)
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

fn child_path(base: &[i32], field: i32, index: usize) -> Vec<i32> {
    let mut path = Vec::with_capacity(base.len() + 2);
    path.extend_from_slice(base);
    path.push(field);
    path.push(index as i32);
    path
}

struct Linker<'a> {
    config: &'a LinkConfig,
    graph: Graph,
    symbols: SymbolTable,
}

impl Linker<'_> {
    // ------------------------------------------------------------------
    // Pass 1: allocate arena slots and fill the symbol table.
    // ------------------------------------------------------------------

    fn allocate_file(&mut self, proto: &FileDescriptorProto) -> Result<(), Error> {
        let id = FileId(self.graph.files.len() as u32);
        let name = proto.name().to_string();
        let package = proto.package().to_string();
        if let Some(&first) = self.graph.files_by_name.get(&name) {
            return Err(Error::DuplicateName {
                name: name.clone(),
                first_file: self.graph.files[first.0 as usize].name.clone(),
                second_file: name,
            });
        }
        let module_path = (self.config.module_path)(&name, &package);

        let mut messages = Vec::with_capacity(proto.message_type.len());
        for (i, nested) in proto.message_type.iter().enumerate() {
            messages.push(self.allocate_message(
                id,
                proto,
                nested,
                None,
                &package,
                None,
                &module_path,
                vec![4, i as i32],
            )?);
        }
        let mut enums = Vec::with_capacity(proto.enum_type.len());
        for (i, nested) in proto.enum_type.iter().enumerate() {
            enums.push(self.allocate_enum(
                id,
                proto,
                nested,
                None,
                &package,
                None,
                &module_path,
                vec![5, i as i32],
            )?);
        }
        let mut services = Vec::with_capacity(proto.service.len());
        for (i, service) in proto.service.iter().enumerate() {
            services.push(self.allocate_service(
                id,
                proto,
                service,
                &package,
                &module_path,
                vec![6, i as i32],
            )?);
        }
        let mut extensions = Vec::with_capacity(proto.extension.len());
        for (i, extension) in proto.extension.iter().enumerate() {
            extensions.push(self.allocate_extension(
                id,
                proto,
                extension,
                None,
                &package,
                vec![7, i as i32],
            )?);
        }

        self.graph.files_by_name.insert(name.clone(), id);
        self.graph.files.push(File {
            // The raw descriptor is attached after pass 2; see `link`.
            proto: FileDescriptorProto::default(),
            generated_filename_prefix: name.strip_suffix(".proto").unwrap_or(&name).to_string(),
            name,
            package,
            module_path,
            generate: false,
            dependencies: Vec::new(),
            messages,
            enums,
            services,
            extensions,
        });
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn allocate_message(
        &mut self,
        file: FileId,
        file_proto: &FileDescriptorProto,
        proto: &DescriptorProto,
        parent: Option<MessageId>,
        scope: &str,
        parent_local: Option<&str>,
        module_path: &ModulePath,
        path: Vec<i32>,
    ) -> Result<MessageId, Error> {
        let name = proto.name().to_string();
        let full_name = qualify(scope, &name);
        let local_name = match parent_local {
            Some(parent) => format!("{parent}.{name}"),
            None => name.clone(),
        };
        let id = MessageId(self.graph.messages.len() as u32);
        self.graph.messages.push(Message {
            map_entry: proto
                .options
                .as_ref()
                .map(|options| options.map_entry())
                .unwrap_or(false),
            ident: module_path.ident(&local_name),
            comments: location::resolve(file_proto, &path),
            options: proto.options.clone(),
            name,
            full_name: full_name.clone(),
            file,
            parent,
            fields: Vec::new(),
            oneofs: Vec::new(),
            nested_messages: Vec::new(),
            nested_enums: Vec::new(),
            nested_extensions: Vec::new(),
            path: path.clone(),
        });
        self.symbols
            .register(&full_name, Decl::Message(id), file_proto.name())?;

        for (i, nested) in proto.nested_type.iter().enumerate() {
            let child = self.allocate_message(
                file,
                file_proto,
                nested,
                Some(id),
                &full_name,
                Some(&local_name),
                module_path,
                child_path(&path, 3, i),
            )?;
            self.graph.messages[id.0 as usize].nested_messages.push(child);
        }
        for (i, nested) in proto.enum_type.iter().enumerate() {
            let child = self.allocate_enum(
                file,
                file_proto,
                nested,
                Some(id),
                &full_name,
                Some(&local_name),
                module_path,
                child_path(&path, 4, i),
            )?;
            self.graph.messages[id.0 as usize].nested_enums.push(child);
        }
        for (i, nested) in proto.extension.iter().enumerate() {
            let child = self.allocate_extension(
                file,
                file_proto,
                nested,
                Some(id),
                &full_name,
                child_path(&path, 6, i),
            )?;
            self.graph.messages[id.0 as usize]
                .nested_extensions
                .push(child);
        }
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    fn allocate_enum(
        &mut self,
        file: FileId,
        file_proto: &FileDescriptorProto,
        proto: &EnumDescriptorProto,
        parent: Option<MessageId>,
        scope: &str,
        parent_local: Option<&str>,
        module_path: &ModulePath,
        path: Vec<i32>,
    ) -> Result<EnumId, Error> {
        let name = proto.name().to_string();
        let full_name = qualify(scope, &name);
        let local_name = match parent_local {
            Some(parent) => format!("{parent}.{name}"),
            None => name.clone(),
        };
        let allow_alias = proto
            .options
            .as_ref()
            .map(|options| options.allow_alias())
            .unwrap_or(false);

        let mut seen_numbers = HashSet::new();
        let mut values = Vec::with_capacity(proto.value.len());
        for (i, value) in proto.value.iter().enumerate() {
            if !allow_alias && !seen_numbers.insert(value.number()) {
                return Err(Error::InvalidDescriptor {
                    full_name: full_name.clone(),
                    detail: format!(
                        "duplicate enum value number {} without allow_alias",
                        value.number()
                    ),
                });
            }
            values.push(EnumValue {
                name: value.name().to_string(),
                // Enum values scope to the enum's parent namespace.
                full_name: qualify(scope, value.name()),
                number: value.number(),
                comments: location::resolve(file_proto, &child_path(&path, 2, i)),
            });
        }

        let id = EnumId(self.graph.enums.len() as u32);
        self.graph.enums.push(Enum {
            ident: module_path.ident(&local_name),
            comments: location::resolve(file_proto, &path),
            name,
            full_name: full_name.clone(),
            file,
            parent,
            values,
            allow_alias,
        });
        self.symbols
            .register(&full_name, Decl::Enum(id), file_proto.name())?;
        Ok(id)
    }

    fn allocate_service(
        &mut self,
        file: FileId,
        file_proto: &FileDescriptorProto,
        proto: &ServiceDescriptorProto,
        package: &str,
        module_path: &ModulePath,
        path: Vec<i32>,
    ) -> Result<ServiceId, Error> {
        let name = proto.name().to_string();
        let full_name = qualify(package, &name);
        let id = ServiceId(self.graph.services.len() as u32);
        self.graph.services.push(Service {
            ident: module_path.ident(&name),
            comments: location::resolve(file_proto, &path),
            name,
            full_name: full_name.clone(),
            file,
            methods: Vec::new(),
            path,
        });
        self.symbols
            .register(&full_name, Decl::Service(id), file_proto.name())?;
        Ok(id)
    }

    fn allocate_extension(
        &mut self,
        file: FileId,
        file_proto: &FileDescriptorProto,
        proto: &FieldDescriptorProto,
        parent: Option<MessageId>,
        scope: &str,
        path: Vec<i32>,
    ) -> Result<ExtensionId, Error> {
        let name = proto.name().to_string();
        let full_name = qualify(scope, &name);
        let id = ExtensionId(self.graph.extensions.len() as u32);
        self.graph.extensions.push(Extension {
            name,
            full_name: full_name.clone(),
            number: proto.number(),
            kind: Kind::from_proto(proto.r#type()),
            cardinality: Cardinality::from_proto(proto.label()),
            file,
            parent,
            // Resolved in pass 2; every extension is revisited there.
            extendee: MessageId(0),
            message: None,
            enum_type: None,
            comments: location::resolve(file_proto, &path),
            options: proto.options.clone(),
        });
        self.symbols
            .register(&full_name, Decl::Extension(id), file_proto.name())?;
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Pass 2: resolve references and fill the allocated slots.
    // ------------------------------------------------------------------

    fn resolve_file(&mut self, id: FileId, proto: &FileDescriptorProto) -> Result<(), Error> {
        let mut dependencies = Vec::with_capacity(proto.dependency.len());
        for dep in &proto.dependency {
            let dep_id = self.graph.files_by_name.get(dep).copied().ok_or_else(|| {
                Error::Resolution {
                    file: proto.name().to_string(),
                    referrer: proto.name().to_string(),
                    type_name: dep.clone(),
                }
            })?;
            dependencies.push(dep_id);
        }
        self.graph.files[id.0 as usize].dependencies = dependencies;

        let package = proto.package().to_string();
        let message_ids = self.graph.files[id.0 as usize].messages.clone();
        for (nested, nested_id) in proto.message_type.iter().zip(message_ids) {
            self.resolve_message(nested_id, nested, proto)?;
        }
        let service_ids = self.graph.files[id.0 as usize].services.clone();
        for (service, service_id) in proto.service.iter().zip(service_ids) {
            self.resolve_service(service_id, service, proto)?;
        }
        let extension_ids = self.graph.files[id.0 as usize].extensions.clone();
        for (extension, extension_id) in proto.extension.iter().zip(extension_ids) {
            self.resolve_extension(extension_id, extension, &package, proto)?;
        }
        Ok(())
    }

    fn resolve_message(
        &mut self,
        id: MessageId,
        proto: &DescriptorProto,
        file_proto: &FileDescriptorProto,
    ) -> Result<(), Error> {
        let (full_name, message_path) = {
            let message = &self.graph.messages[id.0 as usize];
            (message.full_name.clone(), message.path.clone())
        };

        let mut oneofs: Vec<Oneof> = proto
            .oneof_decl
            .iter()
            .enumerate()
            .map(|(i, oneof)| Oneof {
                name: oneof.name().to_string(),
                full_name: format!("{full_name}.{}", oneof.name()),
                fields: Vec::new(),
                synthetic: false,
                comments: location::resolve(file_proto, &child_path(&message_path, 8, i)),
            })
            .collect();

        let mut fields = Vec::with_capacity(proto.field.len());
        for (i, descriptor) in proto.field.iter().enumerate() {
            let mut field = self.build_field(
                descriptor,
                &full_name,
                file_proto,
                &child_path(&message_path, 2, i),
            )?;
            if let Some(index) = descriptor.oneof_index {
                let index = index as usize;
                if index >= oneofs.len() {
                    return Err(Error::InvalidDescriptor {
                        full_name: field.full_name,
                        detail: format!("oneof index {index} out of range"),
                    });
                }
                oneofs[index].fields.push(i);
                field.oneof = Some(index);
            }
            fields.push(field);
        }

        for oneof in &mut oneofs {
            oneof.synthetic =
                oneof.fields.len() == 1 && proto.field[oneof.fields[0]].proto3_optional();
        }
        if !self.config.retain_synthetic_oneofs {
            let all = std::mem::take(&mut oneofs);
            let mut remap = vec![None; all.len()];
            for (index, oneof) in all.into_iter().enumerate() {
                if oneof.synthetic {
                    continue;
                }
                remap[index] = Some(oneofs.len());
                oneofs.push(oneof);
            }
            for field in &mut fields {
                if let Some(index) = field.oneof {
                    field.oneof = remap[index];
                }
            }
        }

        {
            let message = &mut self.graph.messages[id.0 as usize];
            message.fields = fields;
            message.oneofs = oneofs;
        }

        let nested_ids = self.graph.messages[id.0 as usize].nested_messages.clone();
        for (nested, nested_id) in proto.nested_type.iter().zip(nested_ids) {
            self.resolve_message(nested_id, nested, file_proto)?;
        }
        let extension_ids = self.graph.messages[id.0 as usize].nested_extensions.clone();
        for (extension, extension_id) in proto.extension.iter().zip(extension_ids) {
            self.resolve_extension(extension_id, extension, &full_name, file_proto)?;
        }
        Ok(())
    }

    fn build_field(
        &self,
        proto: &FieldDescriptorProto,
        parent_full_name: &str,
        file_proto: &FileDescriptorProto,
        path: &[i32],
    ) -> Result<Field, Error> {
        let name = proto.name().to_string();
        let full_name = format!("{parent_full_name}.{name}");
        let kind = Kind::from_proto(proto.r#type());
        let cardinality = Cardinality::from_proto(proto.label());
        let (message, enum_type) =
            self.resolve_field_type(kind, proto, &full_name, parent_full_name, file_proto)?;
        let proto2 = file_proto.syntax() != "proto3";
        let explicit_presence = proto.proto3_optional()
            || (proto2 && cardinality == Cardinality::Optional && proto.oneof_index.is_none());
        Ok(Field {
            name,
            full_name,
            number: proto.number(),
            kind,
            cardinality,
            oneof: None,
            message,
            enum_type,
            explicit_presence,
            proto3_optional: proto.proto3_optional(),
            comments: location::resolve(file_proto, path),
            options: proto.options.clone(),
        })
    }

    fn resolve_field_type(
        &self,
        kind: Kind,
        proto: &FieldDescriptorProto,
        full_name: &str,
        referrer_scope: &str,
        file_proto: &FileDescriptorProto,
    ) -> Result<(Option<MessageId>, Option<EnumId>), Error> {
        match kind {
            Kind::Message | Kind::Group => {
                let type_name = self.required_type_name(proto, full_name, "message")?;
                match self.symbols.resolve(referrer_scope, type_name) {
                    Some(Decl::Message(id)) => Ok((Some(id), None)),
                    _ => Err(self.unresolved(file_proto, full_name, type_name)),
                }
            }
            Kind::Enum => {
                let type_name = self.required_type_name(proto, full_name, "enum")?;
                match self.symbols.resolve(referrer_scope, type_name) {
                    Some(Decl::Enum(id)) => Ok((None, Some(id))),
                    _ => Err(self.unresolved(file_proto, full_name, type_name)),
                }
            }
            _ => Ok((None, None)),
        }
    }

    fn required_type_name<'p>(
        &self,
        proto: &'p FieldDescriptorProto,
        full_name: &str,
        what: &str,
    ) -> Result<&'p str, Error> {
        proto
            .type_name
            .as_deref()
            .ok_or_else(|| Error::InvalidDescriptor {
                full_name: full_name.to_string(),
                detail: format!("is of kind {what} but has no type_name set"),
            })
    }

    fn unresolved(
        &self,
        file_proto: &FileDescriptorProto,
        referrer: &str,
        type_name: &str,
    ) -> Error {
        Error::Resolution {
            file: file_proto.name().to_string(),
            referrer: referrer.to_string(),
            type_name: type_name.to_string(),
        }
    }

    fn resolve_service(
        &mut self,
        id: ServiceId,
        proto: &ServiceDescriptorProto,
        file_proto: &FileDescriptorProto,
    ) -> Result<(), Error> {
        let (full_name, service_path) = {
            let service = &self.graph.services[id.0 as usize];
            (service.full_name.clone(), service.path.clone())
        };
        let mut methods = Vec::with_capacity(proto.method.len());
        for (i, method) in proto.method.iter().enumerate() {
            let method_full_name = format!("{full_name}.{}", method.name());
            let input =
                self.resolve_method_type(method.input_type(), &method_full_name, file_proto)?;
            let output =
                self.resolve_method_type(method.output_type(), &method_full_name, file_proto)?;
            methods.push(Method {
                name: method.name().to_string(),
                grpc_path: format!("/{full_name}/{}", method.name()),
                full_name: method_full_name,
                input,
                output,
                client_streaming: method.client_streaming(),
                server_streaming: method.server_streaming(),
                comments: location::resolve(file_proto, &child_path(&service_path, 2, i)),
            });
        }
        self.graph.services[id.0 as usize].methods = methods;
        Ok(())
    }

    fn resolve_method_type(
        &self,
        type_name: &str,
        referrer: &str,
        file_proto: &FileDescriptorProto,
    ) -> Result<MessageId, Error> {
        // Method I/O is always a message reference.
        let scope = referrer.rfind('.').map_or("", |dot| &referrer[..dot]);
        match self.symbols.resolve(scope, type_name) {
            Some(Decl::Message(id)) => Ok(id),
            _ => Err(self.unresolved(file_proto, referrer, type_name)),
        }
    }

    fn resolve_extension(
        &mut self,
        id: ExtensionId,
        proto: &FieldDescriptorProto,
        scope: &str,
        file_proto: &FileDescriptorProto,
    ) -> Result<(), Error> {
        let (full_name, kind, number) = {
            let extension = &self.graph.extensions[id.0 as usize];
            (extension.full_name.clone(), extension.kind, extension.number)
        };
        let extendee_name =
            proto
                .extendee
                .as_deref()
                .ok_or_else(|| Error::InvalidDescriptor {
                    full_name: full_name.clone(),
                    detail: "extension without extendee".to_string(),
                })?;
        let extendee = match self.symbols.resolve(scope, extendee_name) {
            Some(Decl::Message(id)) => id,
            _ => return Err(self.unresolved(file_proto, &full_name, extendee_name)),
        };
        let (message, enum_type) =
            self.resolve_field_type(kind, proto, &full_name, scope, file_proto)?;

        if let Some(&existing) = self.graph.extension_index.get(&(extendee, number)) {
            return Err(Error::DuplicateExtension {
                extendee: self.graph.messages[extendee.0 as usize].full_name.clone(),
                number,
                first: self.graph.extensions[existing.0 as usize].full_name.clone(),
                second: full_name,
            });
        }
        self.graph.extension_index.insert((extendee, number), id);

        let extension = &mut self.graph.extensions[id.0 as usize];
        extension.extendee = extendee;
        extension.message = message;
        extension.enum_type = enum_type;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Post-processing
    // ------------------------------------------------------------------

    fn hide_map_entries(&mut self) {
        let map_entries: HashSet<MessageId> = self
            .graph
            .messages
            .iter()
            .enumerate()
            .filter(|(_, message)| message.map_entry)
            .map(|(i, _)| MessageId(i as u32))
            .collect();
        if map_entries.is_empty() {
            return;
        }
        for message in &mut self.graph.messages {
            message
                .nested_messages
                .retain(|id| !map_entries.contains(id));
        }
    }
}
