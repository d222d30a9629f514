//! CLI Tooling
//!
//! Command-line interface over a single encrypted document: list, read
//! and edit entries through the projection engine, against the real
//! configured tool.

use crate::config::{ConfigLoader, SopsfsConfig};
use crate::document::{DocumentEngine, EngineOptions};
use crate::error::FsError;
use crate::tool::SopsTool;
use crate::types::{Metadata, NodeKind, RenameOptions, TreeAddress, WriteOptions};
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;

/// sopsfs CLI - browse and edit SOPS-encrypted documents as a file tree
#[derive(Parser)]
#[command(name = "sopsfs")]
#[command(about = "Browse and edit SOPS-encrypted documents as a file tree")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List entries under a path inside the document
    Ls {
        document: PathBuf,
        #[arg(default_value = "")]
        path: String,
        /// Include kind and size columns
        #[arg(long)]
        long: bool,
    },
    /// Print a leaf value (or the raw entry) to stdout
    Cat { document: PathBuf, path: String },
    /// Show metadata for a path
    Stat {
        document: PathBuf,
        #[arg(default_value = "")]
        path: String,
    },
    /// Set a leaf value, creating it if missing
    Write {
        document: PathBuf,
        path: String,
        value: String,
    },
    /// Create an empty object entry
    Mkdir { document: PathBuf, path: String },
    /// Remove an entry
    Rm { document: PathBuf, path: String },
    /// Move an entry within the document
    Mv {
        document: PathBuf,
        from: String,
        to: String,
        /// Replace the target if it exists
        #[arg(long)]
        force: bool,
    },
}

/// Format a section heading with bold/underline.
fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

/// CLI execution context carrying the loaded configuration.
pub struct CliContext {
    config: SopsfsConfig,
}

impl CliContext {
    pub fn new(config_path: Option<PathBuf>, log_level: Option<String>) -> Result<Self, FsError> {
        let mut config = ConfigLoader::load(config_path.as_deref())?;
        if let Some(level) = log_level {
            config.logging.level = level;
        }
        crate::logging::init_logging(&config.logging)?;
        Ok(CliContext { config })
    }

    fn engine(&self, document: &PathBuf) -> Result<DocumentEngine, FsError> {
        let tool =
            SopsTool::new(&self.config.tool.binary).with_env(self.config.tool.env.clone());
        DocumentEngine::new(
            document.clone(),
            Arc::new(tool),
            EngineOptions {
                flush_interval: self.config.events.flush_interval(),
            },
        )
    }

    /// Execute a command and return its printable output.
    pub async fn execute(&self, command: &Commands) -> Result<String, FsError> {
        match command {
            Commands::Ls {
                document,
                path,
                long,
            } => {
                let engine = self.engine(document)?;
                let address = TreeAddress::parse(path);
                let entries = engine.read_directory(&address).await?;
                if !*long {
                    return Ok(entries
                        .iter()
                        .map(|(name, kind)| match kind {
                            NodeKind::Directory => format!("{}/", name),
                            NodeKind::File => name.clone(),
                        })
                        .collect::<Vec<_>>()
                        .join("\n"));
                }
                let mut out = String::new();
                out.push_str(&format!(
                    "{}\n\n",
                    format_section_heading(&format!("{}", document.display()))
                ));
                let mut table = Table::new();
                table.load_preset(UTF8_BORDERS_ONLY);
                table.set_header(vec!["Name", "Kind", "Size"]);
                for (name, kind) in &entries {
                    let child = address.child(name.clone());
                    let metadata = engine.stat(&child).await?;
                    let kind_str = match kind {
                        NodeKind::Directory => "dir",
                        NodeKind::File => "file",
                    };
                    table.add_row(vec![name.clone(), kind_str.to_string(), metadata.size.to_string()]);
                }
                out.push_str(&format!("{}\n", table));
                Ok(out)
            }
            Commands::Cat { document, path } => {
                let engine = self.engine(document)?;
                let bytes = engine.read_file(&TreeAddress::parse(path)).await?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            Commands::Stat { document, path } => {
                let engine = self.engine(document)?;
                let metadata = engine.stat(&TreeAddress::parse(path)).await?;
                Ok(describe_metadata(path, &metadata))
            }
            Commands::Write {
                document,
                path,
                value,
            } => {
                let engine = self.engine(document)?;
                engine
                    .write_file(
                        &TreeAddress::parse(path),
                        value.as_bytes(),
                        WriteOptions {
                            create: true,
                            overwrite: true,
                        },
                    )
                    .await?;
                Ok(format!("wrote {}", path))
            }
            Commands::Mkdir { document, path } => {
                let engine = self.engine(document)?;
                engine.create_directory(&TreeAddress::parse(path)).await?;
                Ok(format!("created {}", path))
            }
            Commands::Rm { document, path } => {
                let engine = self.engine(document)?;
                engine.delete(&TreeAddress::parse(path)).await?;
                Ok(format!("removed {}", path))
            }
            Commands::Mv {
                document,
                from,
                to,
                force,
            } => {
                let engine = self.engine(document)?;
                engine
                    .rename(
                        &TreeAddress::parse(from),
                        &TreeAddress::parse(to),
                        RenameOptions { overwrite: *force },
                    )
                    .await?;
                Ok(format!("moved {} -> {}", from, to))
            }
        }
    }
}

fn describe_metadata(path: &str, metadata: &Metadata) -> String {
    let kind = match metadata.kind {
        NodeKind::Directory => "directory",
        NodeKind::File => "file",
    };
    let shown = if path.is_empty() { "/" } else { path };
    format!(
        "{}\n  kind: {}\n  size: {}\n  mtime: {}\n  ctime: {}",
        shown, kind, metadata.size, metadata.mtime_ms, metadata.ctime_ms
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeKind;

    #[test]
    fn metadata_description_names_the_root() {
        let metadata = Metadata {
            kind: NodeKind::Directory,
            size: 3,
            mtime_ms: 0,
            ctime_ms: 0,
        };
        let text = describe_metadata("", &metadata);
        assert!(text.starts_with("/\n"));
        assert!(text.contains("kind: directory"));
        assert!(text.contains("size: 3"));
    }
}
