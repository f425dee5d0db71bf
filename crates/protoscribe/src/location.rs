//! Comments attached to descriptor declarations.
//!
//! protoc records comments in `SourceCodeInfo`, addressed by the numeric
//! field path of the declaration within its file descriptor. The linker
//! resolves them eagerly while building the graph, so generator code never
//! deals with paths.

use prost_types::FileDescriptorProto;

/// Comments recorded for one declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comments {
    /// Detached comment blocks above the declaration, separated from it by
    /// at least one blank line.
    pub leading_detached: Vec<String>,
    /// The comment block directly above the declaration.
    pub leading: String,
    /// The comment on the same line, after the declaration.
    pub trailing: String,
}

impl Comments {
    pub fn is_empty(&self) -> bool {
        self.leading_detached.is_empty() && self.leading.is_empty() && self.trailing.is_empty()
    }
}

/// protoc keeps the space following the `//` marker; strip one per line.
fn clean(comment: &str) -> String {
    comment
        .lines()
        .map(|line| line.strip_prefix(' ').unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Look up the comments for `path` in `file`, or empty comments if the file
/// carries no source info for it.
pub(crate) fn resolve(file: &FileDescriptorProto, path: &[i32]) -> Comments {
    let Some(info) = &file.source_code_info else {
        return Comments::default();
    };
    for location in &info.location {
        if location.path == path {
            return Comments {
                leading_detached: location
                    .leading_detached_comments
                    .iter()
                    .map(|c| clean(c))
                    .collect(),
                leading: clean(location.leading_comments()),
                trailing: clean(location.trailing_comments()),
            };
        }
    }
    Comments::default()
}
