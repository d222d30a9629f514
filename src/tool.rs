//! External encryption tool invocation surface.
//!
//! The tool is an opaque executable (SOPS or anything speaking the same
//! flags). It can decrypt a document to raw or JSON-structured plaintext,
//! assign one JSON-encoded value at a path, and re-encrypt replacement
//! plaintext in place through its editor mode. There is no delete
//! primitive; deletion is simulated upstream (see `document::marker`).

pub mod sops;

use crate::error::ToolError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

pub use sops::SopsTool;

/// Invocation seam for the external encryption tool.
#[async_trait]
pub trait CryptoTool: Send + Sync {
    /// Decrypt the document to its raw plaintext bytes.
    async fn decrypt_raw(&self, document: &Path) -> Result<Vec<u8>, ToolError>;

    /// Decrypt the document to JSON text (non-binary formats only).
    async fn decrypt_structured(&self, document: &Path) -> Result<Vec<u8>, ToolError>;

    /// Assign a JSON-encoded value at a path expression, in place.
    async fn set_value(
        &self,
        document: &Path,
        expression: &str,
        value: &Value,
    ) -> Result<(), ToolError>;

    /// Re-encrypt the supplied plaintext as the document's new content.
    async fn replace_plaintext(&self, document: &Path, plaintext: &[u8]) -> Result<(), ToolError>;
}
