//! Protoscribe CLI
//!
//! Inspect serialized descriptor sets the way a plugin will see them:
//! decode, link, and print the resolved graph.
//!
//! Produce the input with `protoc --descriptor_set_out --include_imports`
//! or `buf build -o <file>.binpb`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prost::Message as _;
use prost_types::FileDescriptorSet;
use protoscribe::{link, Graph, LinkConfig};
use std::fs;
use std::path::{Path, PathBuf};

mod inspect;

#[derive(Parser)]
#[command(name = "protoscribe")]
#[command(author, version, about = "Inspect protobuf descriptor sets as linked graphs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Link a descriptor set and print the resolved graph.
    Inspect {
        /// Serialized `FileDescriptorSet` file.
        input: PathBuf,
        /// Emit JSON instead of a tree.
        #[arg(long)]
        json: bool,
    },
    /// Link a descriptor set and report a summary.
    ///
    /// Exits non-zero if linking fails (unknown type names, duplicate
    /// declarations, malformed descriptors).
    Check {
        /// Serialized `FileDescriptorSet` file.
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Inspect { input, json } => {
            let graph = load(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&inspect::to_json(&graph))?);
            } else {
                inspect::print_tree(&graph);
            }
        }
        Commands::Check { input } => {
            let graph = load(&input)?;
            inspect::print_summary(&graph);
        }
    }
    Ok(())
}

fn load(input: &Path) -> Result<Graph> {
    let bytes = fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let set = FileDescriptorSet::decode(bytes.as_slice())
        .with_context(|| format!("{} is not a serialized FileDescriptorSet", input.display()))?;
    link(set.file, &[], &LinkConfig::default()).context("failed to link descriptor set")
}
