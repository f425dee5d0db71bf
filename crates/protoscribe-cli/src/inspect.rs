//! Terminal and JSON rendering of linked graphs.

use colored::Colorize;
use protoscribe::{Cardinality, EnumId, Field, Graph, Kind, MessageId, ServiceId};
use serde_json::{json, Value};

pub fn print_tree(graph: &Graph) {
    for (_, file) in graph.files() {
        let package = if file.package.is_empty() {
            "(no package)".to_string()
        } else {
            format!("(package {})", file.package)
        };
        println!(
            "{} {} {}",
            file.name.bold(),
            package.dimmed(),
            format!("-> {}", file.module_path).dimmed()
        );
        for &message_id in &file.messages {
            print_message(graph, message_id, 1);
        }
        for &enum_id in &file.enums {
            print_enum(graph, enum_id, 1);
        }
        for &service_id in &file.services {
            print_service(graph, service_id, 1);
        }
        for &extension_id in &file.extensions {
            let extension = graph.extension(extension_id);
            println!(
                "{}{} {} extends {}",
                pad(1),
                "extension".magenta(),
                extension.full_name,
                graph.message(extension.extendee).full_name
            );
        }
    }
}

pub fn print_summary(graph: &Graph) {
    println!(
        "{}: {} files, {} messages, {} enums, {} services, {} extensions",
        "ok".green().bold(),
        graph.files().count(),
        graph.messages().count(),
        graph.enums().count(),
        graph.services().count(),
        graph.extensions().count(),
    );
}

fn pad(depth: usize) -> String {
    "  ".repeat(depth)
}

fn print_message(graph: &Graph, id: MessageId, depth: usize) {
    let message = graph.message(id);
    println!("{}{} {}", pad(depth), "message".cyan(), message.name);
    for field in &message.fields {
        let oneof = field
            .oneof
            .and_then(|i| message.oneofs.get(i))
            .map(|o| format!(" (oneof {})", o.name))
            .unwrap_or_default();
        println!(
            "{}{} = {}: {}{}",
            pad(depth + 1),
            field.name,
            field.number,
            type_label(graph, field).dimmed(),
            oneof.dimmed()
        );
    }
    for &nested in &message.nested_messages {
        print_message(graph, nested, depth + 1);
    }
    for &nested in &message.nested_enums {
        print_enum(graph, nested, depth + 1);
    }
}

fn print_enum(graph: &Graph, id: EnumId, depth: usize) {
    let enum_type = graph.enum_type(id);
    println!("{}{} {}", pad(depth), "enum".yellow(), enum_type.name);
    for value in &enum_type.values {
        println!("{}{} = {}", pad(depth + 1), value.name, value.number);
    }
}

fn print_service(graph: &Graph, id: ServiceId, depth: usize) {
    let service = graph.service(id);
    println!("{}{} {}", pad(depth), "service".green(), service.name);
    for method in &service.methods {
        let streaming = match (method.client_streaming, method.server_streaming) {
            (true, true) => " [bidi streaming]",
            (true, false) => " [client streaming]",
            (false, true) => " [server streaming]",
            (false, false) => "",
        };
        println!(
            "{}{}({}) -> {}{}",
            pad(depth + 1),
            method.name,
            graph.message(method.input).full_name,
            graph.message(method.output).full_name,
            streaming.dimmed()
        );
    }
}

/// `repeated string`, `map<string, int32>`, `acme.Book`, ...
fn type_label(graph: &Graph, field: &Field) -> String {
    if field.is_map(graph) {
        let key = field
            .map_key(graph)
            .map(|k| type_label(graph, k))
            .unwrap_or_else(|| "?".to_string());
        let value = field
            .map_value(graph)
            .map(|v| type_label(graph, v))
            .unwrap_or_else(|| "?".to_string());
        return format!("map<{key}, {value}>");
    }
    let base = match field.kind {
        Kind::Message | Kind::Group => match field.message {
            Some(id) => graph.message(id).full_name.clone(),
            None => field.kind.as_str().to_string(),
        },
        Kind::Enum => match field.enum_type {
            Some(id) => graph.enum_type(id).full_name.clone(),
            None => field.kind.as_str().to_string(),
        },
        kind => kind.as_str().to_string(),
    };
    if field.cardinality == Cardinality::Repeated {
        format!("repeated {base}")
    } else {
        base
    }
}

pub fn to_json(graph: &Graph) -> Value {
    let files: Vec<Value> = graph
        .files()
        .map(|(_, file)| {
            json!({
                "name": file.name,
                "package": file.package,
                "module_path": file.module_path.as_str(),
                "dependencies": file.dependencies.iter()
                    .map(|&dep| graph.file(dep).name.clone())
                    .collect::<Vec<_>>(),
                "messages": file.messages.iter()
                    .map(|&id| message_json(graph, id))
                    .collect::<Vec<_>>(),
                "enums": file.enums.iter()
                    .map(|&id| enum_json(graph, id))
                    .collect::<Vec<_>>(),
                "services": file.services.iter()
                    .map(|&id| service_json(graph, id))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({ "files": files })
}

fn message_json(graph: &Graph, id: MessageId) -> Value {
    let message = graph.message(id);
    json!({
        "name": message.name,
        "full_name": message.full_name,
        "fields": message.fields.iter()
            .map(|field| json!({
                "name": field.name,
                "number": field.number,
                "type": type_label(graph, field),
                "explicit_presence": field.explicit_presence,
            }))
            .collect::<Vec<_>>(),
        "messages": message.nested_messages.iter()
            .map(|&nested| message_json(graph, nested))
            .collect::<Vec<_>>(),
        "enums": message.nested_enums.iter()
            .map(|&nested| enum_json(graph, nested))
            .collect::<Vec<_>>(),
    })
}

fn enum_json(graph: &Graph, id: EnumId) -> Value {
    let enum_type = graph.enum_type(id);
    json!({
        "name": enum_type.name,
        "full_name": enum_type.full_name,
        "values": enum_type.values.iter()
            .map(|value| json!({ "name": value.name, "number": value.number }))
            .collect::<Vec<_>>(),
    })
}

fn service_json(graph: &Graph, id: ServiceId) -> Value {
    let service = graph.service(id);
    json!({
        "name": service.name,
        "full_name": service.full_name,
        "methods": service.methods.iter()
            .map(|method| json!({
                "name": method.name,
                "path": method.grpc_path,
                "input": graph.message(method.input).full_name,
                "output": graph.message(method.output).full_name,
                "client_streaming": method.client_streaming,
                "server_streaming": method.server_streaming,
            }))
            .collect::<Vec<_>>(),
    })
}
