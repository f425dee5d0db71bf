//! The plugin session: one request in, one response out.
//!
//! A protoc plugin is a process that reads a `CodeGeneratorRequest` from
//! stdin and writes a `CodeGeneratorResponse` to stdout. [`Options::run`]
//! owns that whole lifecycle: it buffers the input, decodes the envelope,
//! links the descriptor set, hands a [`Plugin`] to the generation callback
//! exactly once, then renders every registered buffer into the response.
//!
//! Failures are reported *through the envelope*: whatever goes wrong after
//! the input was read, a well-formed response carrying the error text is
//! still written, and the generated-file list stays empty — partial output
//! is never emitted.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;

use prost::Message as _;
use prost_types::compiler::{code_generator_response, CodeGeneratorRequest, CodeGeneratorResponse};

use crate::error::Error;
use crate::ext::ExtensionRegistry;
use crate::genfile::GeneratedFile;
use crate::graph::{FileId, Graph};
use crate::ident::ModulePath;
use crate::link::{link, LinkConfig};

/// Configuration for a plugin run.
pub struct Options {
    config: LinkConfig,
    supported_features: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl Options {
    /// Default options: per-file module paths, synthetic oneofs collapsed,
    /// map entries hidden, proto3 `optional` support declared.
    pub fn new() -> Self {
        Self {
            config: LinkConfig::default(),
            supported_features: code_generator_response::Feature::Proto3Optional as u64,
        }
    }

    /// Replace the module-path policy. The function must be pure: it is
    /// called exactly once per file and its result is cached.
    pub fn module_path<F>(mut self, policy: F) -> Self
    where
        F: Fn(&str, &str) -> ModulePath + 'static,
    {
        self.config.module_path = Box::new(policy);
        self
    }

    /// Keep protoc's synthetic one-member oneofs visible instead of
    /// collapsing them into `Field::explicit_presence`.
    pub fn retain_synthetic_oneofs(mut self, retain: bool) -> Self {
        self.config.retain_synthetic_oneofs = retain;
        self
    }

    /// Keep synthesized map-entry messages in nested-type listings.
    pub fn retain_map_entry_messages(mut self, retain: bool) -> Self {
        self.config.retain_map_entry_messages = retain;
        self
    }

    /// Override the feature bitmask declared in the response.
    pub fn supported_features(mut self, features: u64) -> Self {
        self.supported_features = features;
        self
    }

    /// Run a generation function against stdin/stdout.
    pub fn run<F>(self, generate: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Plugin) -> anyhow::Result<()>,
    {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        self.run_with_io(stdin.lock(), stdout.lock(), generate)
    }

    /// Run a generation function against arbitrary channels.
    ///
    /// A response envelope is written even on failure; the failure is then
    /// also returned so a `main` can exit non-zero.
    pub fn run_with_io<R, W, F>(self, mut input: R, mut output: W, generate: F) -> Result<(), Error>
    where
        R: Read,
        W: Write,
        F: FnOnce(&mut Plugin) -> anyhow::Result<()>,
    {
        let (response, result) = match self.execute(&mut input, generate) {
            Ok(response) => (response, Ok(())),
            Err(error) => {
                tracing::warn!(%error, "plugin run failed");
                let message = match &error {
                    // The callback's own message, without our prefix.
                    Error::Generation(message) => message.clone(),
                    other => other.to_string(),
                };
                let response = CodeGeneratorResponse {
                    error: Some(message),
                    supported_features: Some(self.supported_features),
                    ..Default::default()
                };
                (response, Err(error))
            }
        };
        output.write_all(&response.encode_to_vec())?;
        output.flush()?;
        result
    }

    fn execute<R, F>(&self, input: &mut R, generate: F) -> Result<CodeGeneratorResponse, Error>
    where
        R: Read,
        F: FnOnce(&mut Plugin) -> anyhow::Result<()>,
    {
        // The envelope is length-unframed: everything up to end-of-stream
        // is one message.
        let mut buf = Vec::new();
        input.read_to_end(&mut buf)?;
        let request = CodeGeneratorRequest::decode(buf.as_slice())?;
        tracing::debug!(
            files = request.proto_file.len(),
            to_generate = request.file_to_generate.len(),
            "request read"
        );

        let parameter = parse_parameter(request.parameter());
        let file_to_generate = request.file_to_generate;
        let graph = link(request.proto_file, &file_to_generate, &self.config)?;
        let mut files_to_generate = Vec::with_capacity(file_to_generate.len());
        for name in &file_to_generate {
            let id = graph.file_by_name(name).ok_or_else(|| Error::Resolution {
                file: name.clone(),
                referrer: name.clone(),
                type_name: name.clone(),
            })?;
            files_to_generate.push(id);
        }
        tracing::debug!(to_generate = files_to_generate.len(), "descriptor set resolved");

        let mut plugin = Plugin {
            parameter,
            graph: Arc::new(graph),
            files_to_generate,
            generated: Vec::new(),
            error: None,
            extensions: ExtensionRegistry::new(),
        };
        if let Err(error) = generate(&mut plugin) {
            if plugin.error.is_none() {
                plugin.error = Some(error.to_string());
            }
        }
        if let Some(message) = plugin.error {
            return Err(Error::Generation(message));
        }

        let mut response = CodeGeneratorResponse {
            supported_features: Some(self.supported_features),
            ..Default::default()
        };
        for file in plugin.generated {
            response.file.push(file.into_response_file());
        }
        tracing::debug!(files = response.file.len(), "generation complete");
        Ok(response)
    }
}

/// One protoc plugin invocation, handed to the generation callback.
pub struct Plugin {
    parameter: BTreeMap<String, String>,
    graph: Arc<Graph>,
    files_to_generate: Vec<FileId>,
    generated: Vec<GeneratedFile>,
    error: Option<String>,
    extensions: ExtensionRegistry,
}

impl Plugin {
    /// Generator parameters, parsed from the request's parameter string.
    ///
    /// protoc joins every `--<plugin>_opt=` flag with commas; entries split
    /// on the first `=`, and a bare key maps to an empty value.
    pub fn parameter(&self) -> &BTreeMap<String, String> {
        &self.parameter
    }

    /// The linked graph over the full transitive file set.
    pub fn graph(&self) -> Arc<Graph> {
        Arc::clone(&self.graph)
    }

    /// Files explicitly requested for generation, in request order.
    pub fn files_to_generate(&self) -> Vec<FileId> {
        self.files_to_generate.clone()
    }

    /// Create a generated file bound to `module_path`; it is registered for
    /// collection into the response.
    pub fn new_generated_file(
        &mut self,
        name: impl Into<String>,
        module_path: ModulePath,
    ) -> &mut GeneratedFile {
        self.generated.push(GeneratedFile::new(name, module_path));
        let index = self.generated.len() - 1;
        &mut self.generated[index]
    }

    /// Record a generation error. The plugin reports it back to protoc and
    /// produces no output. Only the first error is kept; later calls are
    /// no-ops.
    pub fn error(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    /// The session's extension registry (see [`ExtensionRegistry`]).
    pub fn extension_registry(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    pub fn extension_registry_mut(&mut self) -> &mut ExtensionRegistry {
        &mut self.extensions
    }
}

fn parse_parameter(parameter: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for entry in parameter.split(',') {
        if entry.is_empty() {
            continue;
        }
        match entry.split_once('=') {
            Some((key, value)) => map.insert(key.to_string(), value.to_string()),
            None => map.insert(entry.to_string(), String::new()),
        };
    }
    map
}
