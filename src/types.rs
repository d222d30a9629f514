//! Core types for the encrypted-document filesystem projection.

use std::fmt;
use std::path::Path;

/// File name prefix of the synthetic entry exposing the decrypted stream.
pub const RAW_ENTRY_PREFIX: &str = "raw";

/// Sentinel written at an address to tombstone it before textual stripping.
///
/// Must never collide with legitimate document content.
pub const DELETE_MARKER: &str = "sopsfs-tombstone-c41d9f4e8ab24b7f9d3640f3a2a6c0de";

/// Structured format of an encrypted document, inferred from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Ini,
    Dotenv,
    Binary,
}

impl Format {
    /// Detect the format from the document's extension, ignoring any
    /// `sops` extension components (`app.sops.yaml`, `app.yaml.sops` and
    /// `app.yaml` all detect as Yaml).
    pub fn detect(document: &Path) -> Format {
        match non_sops_extension(document).as_deref() {
            Some("json") => Format::Json,
            Some("yaml") | Some("yml") => Format::Yaml,
            Some("ini") => Format::Ini,
            Some("env") => Format::Dotenv,
            _ => Format::Binary,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Ini => "ini",
            Format::Dotenv => "dotenv",
            Format::Binary => "binary",
        };
        write!(f, "{}", name)
    }
}

/// Last extension of the file name with `sops` components removed.
pub fn non_sops_extension(document: &Path) -> Option<String> {
    let name = document.file_name()?.to_string_lossy().into_owned();
    let mut parts = name.split('.');
    parts.next(); // stem
    parts
        .filter(|part| !part.eq_ignore_ascii_case("sops") && !part.is_empty())
        .last()
        .map(|ext| ext.to_ascii_lowercase())
}

/// Name of the synthetic raw-data entry for a document
/// (`raw.yaml` for `app.sops.yaml`, bare `raw` without an extension).
pub fn synthetic_entry_name(document: &Path) -> String {
    match non_sops_extension(document) {
        Some(ext) => format!("{}.{}", RAW_ENTRY_PREFIX, ext),
        None => RAW_ENTRY_PREFIX.to_string(),
    }
}

/// Position of a value inside the decrypted document tree. Root is the
/// empty sequence; every prefix of a valid address resolves to an object
/// or array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TreeAddress(Vec<String>);

impl TreeAddress {
    pub fn root() -> Self {
        TreeAddress(Vec::new())
    }

    /// Parse a `/`-joined sub-path; empty segments are dropped.
    pub fn parse(sub_path: &str) -> Self {
        TreeAddress(
            sub_path
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TreeAddress(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Address of the containing node; `None` at the root.
    pub fn parent(&self) -> Option<TreeAddress> {
        if self.0.is_empty() {
            return None;
        }
        Some(TreeAddress(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Final segment; `None` at the root.
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn child(&self, name: impl Into<String>) -> TreeAddress {
        let mut segments = self.0.clone();
        segments.push(name.into());
        TreeAddress(segments)
    }
}

impl fmt::Display for TreeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Kind of a virtual node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Stat result for a virtual node. Times are inherited from the stable
/// document; directory size is its entry count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub kind: NodeKind,
    pub size: u64,
    pub mtime_ms: i64,
    pub ctime_ms: i64,
}

/// What happened to a virtual node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Changed,
    Deleted,
}

/// A pending change notification, addressed relative to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub address: TreeAddress,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(address: TreeAddress, kind: ChangeKind) -> Self {
        ChangeEvent { address, kind }
    }
}

/// Options for `write_file`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    pub create: bool,
    pub overwrite: bool,
}

/// Options for `rename`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenameOptions {
    pub overwrite: bool,
}
