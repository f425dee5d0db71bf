//! Error types for the plugin pipeline.

use thiserror::Error;

/// Everything that can go wrong between reading the request envelope and
/// writing the response envelope.
///
/// All variants except [`Error::Io`] are still answered with a well-formed
/// `CodeGeneratorResponse` carrying the error text, since protoc expects to
/// be able to parse the plugin's output even on failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error("plugin i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode request envelope: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("{file}: failed to resolve \"{type_name}\" referenced from \"{referrer}\"")]
    Resolution {
        file: String,
        referrer: String,
        type_name: String,
    },

    #[error("duplicate declaration of \"{name}\" (first in {first_file}, again in {second_file})")]
    DuplicateName {
        name: String,
        first_file: String,
        second_file: String,
    },

    #[error("duplicate extension number {number} for \"{extendee}\" (\"{first}\" and \"{second}\")")]
    DuplicateExtension {
        extendee: String,
        number: i32,
        first: String,
        second: String,
    },

    #[error("invalid descriptor ({full_name}): {detail}")]
    InvalidDescriptor { full_name: String, detail: String },

    #[error("code generation failed: {0}")]
    Generation(String),
}
