//! Integration tests for the complete plugin pipeline
//!
//! These tests drive the framework end-to-end the way protoc does:
//! an encoded `CodeGeneratorRequest` goes in on one channel, an encoded
//! `CodeGeneratorResponse` comes out on the other, with the generation
//! callback running in between.
//!
//! Run with: cargo test --test integration_tests

use std::cell::Cell;

use prost::Message as _;
use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};
use prost_types::{
    field_descriptor_proto, DescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    MessageOptions, MethodDescriptorProto, OneofDescriptorProto, ServiceDescriptorProto,
};
use protoscribe::{p, Error, ModulePath, Options, Plugin};

// ============================================================================
// Request builders
// ============================================================================

fn proto_file(
    name: &str,
    package: &str,
    deps: &[&str],
    messages: Vec<DescriptorProto>,
) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_string()),
        package: Some(package.to_string()),
        dependency: deps.iter().map(|d| d.to_string()).collect(),
        message_type: messages,
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

fn msg(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

fn msg_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(field_descriptor_proto::Label::Optional as i32),
        r#type: Some(field_descriptor_proto::Type::Message as i32),
        type_name: Some(type_name.to_string()),
        ..Default::default()
    }
}

fn scalar_field(name: &str, number: i32, kind: field_descriptor_proto::Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(field_descriptor_proto::Label::Optional as i32),
        r#type: Some(kind as i32),
        ..Default::default()
    }
}

fn request_bytes(
    files: Vec<FileDescriptorProto>,
    to_generate: &[&str],
    parameter: &str,
) -> Vec<u8> {
    CodeGeneratorRequest {
        file_to_generate: to_generate.iter().map(|f| f.to_string()).collect(),
        parameter: Some(parameter.to_string()),
        proto_file: files,
        ..Default::default()
    }
    .encode_to_vec()
}

fn run_plugin<F>(request: &[u8], options: Options, generate: F) -> (CodeGeneratorResponse, Result<(), Error>)
where
    F: FnOnce(&mut Plugin) -> anyhow::Result<()>,
{
    let mut output = Vec::new();
    let result = options.run_with_io(request, &mut output, generate);
    let response = CodeGeneratorResponse::decode(output.as_slice()).expect("decode response");
    (response, result)
}

fn library_files() -> Vec<FileDescriptorProto> {
    let b = proto_file("b.proto", "p", &[], vec![msg("B", vec![])]);
    let a = proto_file(
        "a.proto",
        "p",
        &["b.proto"],
        vec![msg("A", vec![msg_field("b", 1, ".p.B")])],
    );
    vec![b, a]
}

// ============================================================================
// Happy path: request → generated files → response
// ============================================================================

#[test]
fn end_to_end_generates_files_with_cross_file_imports() {
    let request = request_bytes(library_files(), &["a.proto"], "");

    let (response, result) = run_plugin(&request, Options::new(), |gen| {
        let graph = gen.graph();
        for file_id in gen.files_to_generate() {
            let file = graph.file(file_id);
            let g = gen.new_generated_file(
                format!("{}.out", file.generated_filename_prefix),
                file.module_path.clone(),
            );
            p!(g, "// Generated. Do not edit.");
            g.print_imports();
            for &message_id in &file.messages {
                let message = graph.message(message_id);
                p!(g, "record ", &message.ident, ":");
                for field in &message.fields {
                    let target = graph.message(field.message.unwrap());
                    p!(g, "  ", &field.name, ": ", &target.ident);
                }
            }
        }
        Ok(())
    });

    result.unwrap();
    assert_eq!(response.error, None);
    assert_eq!(response.file.len(), 1);
    assert_eq!(response.file[0].name(), "a.out");
    // `A` lives in the buffer's home module, `B` does not: only `B` is
    // qualified, and only b's module is imported.
    let content = response.file[0].content();
    assert_eq!(
        content,
        "// Generated. Do not edit.\nimport b_pb\nrecord A:\n  b: b_pb.B"
    );
    // Explicit-presence support is declared.
    assert_eq!(response.supported_features, Some(1));
}

#[test]
fn shared_module_path_policy_needs_no_imports() {
    let request = request_bytes(library_files(), &["a.proto"], "");
    // One output module per package instead of per file.
    let options = Options::new().module_path(|_, package| ModulePath::new(package));

    let (response, result) = run_plugin(&request, options, |gen| {
        let graph = gen.graph();
        for file_id in gen.files_to_generate() {
            let file = graph.file(file_id);
            let g = gen.new_generated_file("a.out", file.module_path.clone());
            g.print_imports();
            let a = graph.message(file.messages[0]);
            let b = graph.message(a.fields[0].message.unwrap());
            p!(g, &a.ident, " uses ", &b.ident);
        }
        Ok(())
    });

    result.unwrap();
    // Same home module path on both ends: short names, no import block.
    assert_eq!(response.file[0].content(), "A uses B");
}

#[test]
fn files_to_generate_preserves_request_order() {
    let request = request_bytes(library_files(), &["a.proto", "b.proto"], "");
    let (_, result) = run_plugin(&request, Options::new(), |gen| {
        let graph = gen.graph();
        let names: Vec<String> = gen
            .files_to_generate()
            .iter()
            .map(|&id| graph.file(id).name.clone())
            .collect();
        assert_eq!(names, vec!["a.proto", "b.proto"]);
        assert!(graph.file(gen.files_to_generate()[0]).generate);
        Ok(())
    });
    result.unwrap();
}

#[test]
fn parameters_parse_into_a_map() {
    let request = request_bytes(
        library_files(),
        &["a.proto"],
        "k1=v1,k2=v2;k3=v3,k4,,abc=x,5=2",
    );
    let (response, result) = run_plugin(&request, Options::new(), |gen| {
        let parameter = gen.parameter().clone();
        let g = gen.new_generated_file("out.txt", ModulePath::new(""));
        for (key, value) in &parameter {
            p!(g, key, "->", value);
        }
        Ok(())
    });
    result.unwrap();
    // BTreeMap iteration: sorted by key.
    assert_eq!(
        response.file[0].content(),
        "5->2\nabc->x\nk1->v1\nk2->v2;k3=v3\nk4->"
    );
}

// ============================================================================
// Graph shape observed through the session
// ============================================================================

#[test]
fn mutual_recursion_is_fully_linked() {
    let f = proto_file(
        "tree.proto",
        "p",
        &[],
        vec![
            msg("Node", vec![msg_field("parent", 1, ".p.Tree")]),
            msg("Tree", vec![msg_field("root", 1, ".p.Node")]),
        ],
    );
    let request = request_bytes(vec![f], &["tree.proto"], "");
    let (_, result) = run_plugin(&request, Options::new(), |gen| {
        let graph = gen.graph();
        let node = graph.message(graph.message_by_name("p.Node").unwrap());
        let tree = graph.message(graph.message_by_name("p.Tree").unwrap());
        assert_eq!(node.fields[0].message, graph.message_by_name("p.Tree"));
        assert_eq!(tree.fields[0].message, graph.message_by_name("p.Node"));
        // The target is a real, filled object.
        let target = graph.message(node.fields[0].message.unwrap());
        assert_eq!(target.fields[0].name, "root");
        Ok(())
    });
    result.unwrap();
}

#[test]
fn map_fields_and_synthetic_oneofs_are_folded() {
    let entry = DescriptorProto {
        name: Some("TagsEntry".to_string()),
        field: vec![
            scalar_field("key", 1, field_descriptor_proto::Type::String),
            scalar_field("value", 2, field_descriptor_proto::Type::String),
        ],
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };
    let book = DescriptorProto {
        name: Some("Book".to_string()),
        field: vec![
            FieldDescriptorProto {
                label: Some(field_descriptor_proto::Label::Repeated as i32),
                ..msg_field("tags", 1, ".p.Book.TagsEntry")
            },
            FieldDescriptorProto {
                oneof_index: Some(0),
                proto3_optional: Some(true),
                ..scalar_field("subtitle", 2, field_descriptor_proto::Type::String)
            },
        ],
        nested_type: vec![entry],
        oneof_decl: vec![OneofDescriptorProto {
            name: Some("_subtitle".to_string()),
            ..Default::default()
        }],
        ..Default::default()
    };
    let request = request_bytes(
        vec![proto_file("book.proto", "p", &[], vec![book])],
        &["book.proto"],
        "",
    );

    let (_, result) = run_plugin(&request, Options::new(), |gen| {
        let graph = gen.graph();
        let book = graph.message(graph.message_by_name("p.Book").unwrap());

        let tags = &book.fields[0];
        assert!(tags.is_map(&graph));
        assert_eq!(tags.map_key(&graph).unwrap().name, "key");
        assert!(book.nested_messages.is_empty());

        let subtitle = &book.fields[1];
        assert!(subtitle.explicit_presence);
        assert_eq!(subtitle.oneof, None);
        assert!(book.oneofs.is_empty());
        Ok(())
    });
    result.unwrap();
}

#[test]
fn services_link_method_types_and_routes() {
    let service = ServiceDescriptorProto {
        name: Some("Library".to_string()),
        method: vec![MethodDescriptorProto {
            name: Some("GetBook".to_string()),
            input_type: Some(".p.GetBookRequest".to_string()),
            output_type: Some(".p.Book".to_string()),
            server_streaming: Some(true),
            ..Default::default()
        }],
        ..Default::default()
    };
    let f = FileDescriptorProto {
        service: vec![service],
        ..proto_file(
            "library.proto",
            "p",
            &[],
            vec![msg("GetBookRequest", vec![]), msg("Book", vec![])],
        )
    };
    let request = request_bytes(vec![f], &["library.proto"], "");

    let (_, result) = run_plugin(&request, Options::new(), |gen| {
        let graph = gen.graph();
        let library = graph.service(graph.service_by_name("p.Library").unwrap());
        let get_book = &library.methods[0];
        assert_eq!(get_book.grpc_path, "/p.Library/GetBook");
        assert_eq!(get_book.input, graph.message_by_name("p.GetBookRequest").unwrap());
        assert_eq!(get_book.output, graph.message_by_name("p.Book").unwrap());
        assert!(get_book.server_streaming && !get_book.client_streaming);
        Ok(())
    });
    result.unwrap();
}

#[test]
fn registered_extensions_decode_values_from_options_bytes() {
    let host = proto_file("host.proto", "p", &[], vec![msg("MyOptions", vec![])]);
    let ext_file = FileDescriptorProto {
        extension: vec![FieldDescriptorProto {
            extendee: Some(".p.MyOptions".to_string()),
            ..scalar_field("hint", 50001, field_descriptor_proto::Type::String)
        }],
        ..proto_file("ext.proto", "p", &["host.proto"], vec![])
    };
    let request = request_bytes(vec![host, ext_file], &["ext.proto"], "");

    let (_, result) = run_plugin(&request, Options::new(), |gen| {
        let graph = gen.graph();
        let extendee = graph.message_by_name("p.MyOptions").unwrap();
        let ext_id = graph.extension_by_number(extendee, 50001).unwrap();
        gen.extension_registry_mut().register(&graph, ext_id)?;

        // An options instance with field 50001 set to "fast".
        let mut options_bytes = Vec::new();
        prost::encoding::encode_key(
            50001,
            prost::encoding::WireType::LengthDelimited,
            &mut options_bytes,
        );
        prost::encoding::encode_varint(4, &mut options_bytes);
        options_bytes.extend_from_slice(b"fast");

        let value = gen
            .extension_registry()
            .value_from_bytes(&graph, extendee, 50001, &options_bytes)?;
        assert_eq!(value, Some(protoscribe::ExtensionValue::String("fast".to_string())));

        // Not set on this instance: present declaration, absent value.
        let absent = gen
            .extension_registry()
            .value(&graph, extendee, 50001, &MessageOptions::default())?;
        assert_eq!(absent, None);
        Ok(())
    });
    result.unwrap();
}

// ============================================================================
// Failure paths: the envelope is always written
// ============================================================================

#[test]
fn unresolved_type_yields_an_error_envelope_and_no_files() {
    let f = proto_file(
        "bad.proto",
        "p",
        &[],
        vec![msg("A", vec![msg_field("b", 1, ".p.Missing")])],
    );
    let request = request_bytes(vec![f], &["bad.proto"], "");

    let called = Cell::new(false);
    let (response, result) = run_plugin(&request, Options::new(), |_gen| {
        called.set(true);
        Ok(())
    });

    assert!(!called.get(), "generation must not run on a broken graph");
    assert!(matches!(result, Err(Error::Resolution { .. })));
    let error = response.error.unwrap();
    assert!(error.contains(".p.Missing"), "unexpected message: {error}");
    assert!(response.file.is_empty());
}

#[test]
fn callback_errors_land_in_the_envelope_without_partial_output() {
    let request = request_bytes(library_files(), &["a.proto"], "");
    let (response, result) = run_plugin(&request, Options::new(), |gen| {
        // Output produced before the failure must not leak into the response.
        let g = gen.new_generated_file("partial.out", ModulePath::new("a_pb"));
        p!(g, "half-written");
        anyhow::bail!("boom");
    });

    assert!(matches!(result, Err(Error::Generation(_))));
    assert_eq!(response.error.as_deref(), Some("boom"));
    assert!(response.file.is_empty());
}

#[test]
fn plugin_error_call_wins_over_later_messages() {
    let request = request_bytes(library_files(), &["a.proto"], "");
    let (response, _) = run_plugin(&request, Options::new(), |gen| {
        gen.error("first problem");
        gen.error("second problem");
        Ok(())
    });
    assert_eq!(response.error.as_deref(), Some("first problem"));
}

#[test]
fn malformed_request_bytes_still_produce_a_response() {
    let garbage = [0xff, 0xff, 0xff, 0xff];
    let (response, result) = run_plugin(&garbage, Options::new(), |_gen| Ok(()));
    assert!(matches!(result, Err(Error::Decode(_))));
    assert!(response.error.is_some());
    assert!(response.file.is_empty());
}

#[test]
fn unknown_generate_name_is_a_resolution_error() {
    let request = request_bytes(library_files(), &["nope.proto"], "");
    let (response, result) = run_plugin(&request, Options::new(), |_gen| Ok(()));
    assert!(matches!(result, Err(Error::Resolution { .. })));
    assert!(response.error.is_some());
}
