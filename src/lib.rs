//! sopsfs: Encrypted Documents as a Virtual Filesystem
//!
//! Projects SOPS-encrypted structured documents (JSON, YAML, INI, dotenv,
//! binary) as a navigable file namespace: every leaf value becomes a
//! virtual file, every object or array a virtual directory, and a
//! synthetic entry exposes the raw decrypted stream. Edits are
//! transparently re-encrypted back into the original document, so an
//! ordinary file-oriented editing surface can operate on secrets without
//! plaintext ever reaching stable storage.

pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod logging;
pub mod registry;
pub mod tool;
pub mod types;
