//! Per-document projection engine.
//!
//! Implements the filesystem contract (stat/list/read/create/write/
//! delete/rename) against one encrypted document. Reads resolve against a
//! cached decrypted snapshot; mutations run the external tool against a
//! private temporary copy and overwrite the stable document only once
//! every step has succeeded. Concurrent mutations against the same
//! document are not serialized: overlapping writers race and the last
//! commit wins.

use super::address;
use super::events::{ChangeBatcher, DEFAULT_FLUSH_INTERVAL};
use super::marker;
use super::snapshot::{self, Snapshot, SnapshotCache};
use super::watch;
use crate::error::FsError;
use crate::tool::CryptoTool;
use crate::types::{
    synthetic_entry_name, ChangeEvent, ChangeKind, Format, Metadata, NodeKind, RenameOptions,
    TreeAddress, WriteOptions, DELETE_MARKER,
};
use notify::RecommendedWatcher;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Coalescing window for change-event batches.
    pub flush_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

struct EngineShared {
    cache: SnapshotCache,
    batcher: ChangeBatcher,
}

/// Projects one encrypted document as a virtual file tree.
pub struct DocumentEngine {
    document: PathBuf,
    format: Format,
    synthetic: String,
    tool: Arc<dyn CryptoTool>,
    shared: Arc<EngineShared>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl DocumentEngine {
    /// Create an engine and start watching the stable document. Must be
    /// called from within a tokio runtime.
    pub fn new(
        document: PathBuf,
        tool: Arc<dyn CryptoTool>,
        options: EngineOptions,
    ) -> Result<Self, FsError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| FsError::Config("document engines require a tokio runtime".to_string()))?;
        let format = Format::detect(&document);
        let synthetic = synthetic_entry_name(&document);
        let shared = Arc::new(EngineShared {
            cache: SnapshotCache::new(),
            batcher: ChangeBatcher::new(&synthetic, options.flush_interval, handle),
        });

        let watch_shared = Arc::clone(&shared);
        let watched = document.clone();
        let watcher = watch::watch_document(&document, move || {
            debug!(document = %watched.display(), "external change observed");
            watch_shared.cache.invalidate();
            watch_shared.batcher.enqueue([ChangeEvent::new(
                TreeAddress::root(),
                ChangeKind::Changed,
            )]);
        })?;

        info!(document = %document.display(), format = %format, "document engine created");
        Ok(DocumentEngine {
            document,
            format,
            synthetic,
            tool,
            shared,
            watcher: Mutex::new(Some(watcher)),
        })
    }

    pub fn document(&self) -> &Path {
        &self.document
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Name of the synthetic entry exposing the decrypted stream.
    pub fn synthetic_entry(&self) -> &str {
        &self.synthetic
    }

    /// Subscribe to this engine's change-event batches.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<ChangeEvent>> {
        self.shared.batcher.subscribe()
    }

    /// Release the file watch and cached snapshot. Idempotent; called on
    /// registry eviction rather than left to drop order.
    pub fn dispose(&self) {
        if self.watcher.lock().take().is_some() {
            debug!(document = %self.document.display(), "document engine disposed");
        }
        self.shared.cache.invalidate();
    }

    fn is_synthetic(&self, address: &TreeAddress) -> bool {
        address.len() == 1 && address.segments()[0] == self.synthetic
    }

    async fn snapshot(&self) -> Result<Arc<Snapshot>, FsError> {
        if let Some(snapshot) = self.shared.cache.cached() {
            return Ok(snapshot);
        }
        debug!(document = %self.document.display(), "deriving snapshot");
        let snapshot = Arc::new(
            snapshot::load_snapshot(self.tool.as_ref(), &self.document, self.format).await?,
        );
        self.shared.cache.store(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub async fn stat(&self, address: &TreeAddress) -> Result<Metadata, FsError> {
        let snapshot = self.snapshot().await?;
        let stat = snapshot.stat;
        if address.is_root() {
            let entries = snapshot
                .tree
                .as_ref()
                .and_then(address::entries)
                .map(|entries| entries.len())
                .unwrap_or(0);
            return Ok(Metadata {
                kind: NodeKind::Directory,
                size: entries as u64 + 1, // synthetic entry
                mtime_ms: stat.mtime_ms,
                ctime_ms: stat.ctime_ms,
            });
        }
        if self.is_synthetic(address) {
            return Ok(Metadata {
                kind: NodeKind::File,
                size: snapshot.raw.len() as u64,
                mtime_ms: stat.mtime_ms,
                ctime_ms: stat.ctime_ms,
            });
        }
        let tree = snapshot
            .tree
            .as_ref()
            .ok_or_else(|| FsError::NotFound(address.to_string()))?;
        let value = address::resolve(tree, address)
            .ok_or_else(|| FsError::NotFound(address.to_string()))?;
        let (kind, size) = match address::entries(value) {
            Some(entries) => (NodeKind::Directory, entries.len() as u64),
            None => (NodeKind::File, address::leaf_text(value).len() as u64),
        };
        Ok(Metadata {
            kind,
            size,
            mtime_ms: stat.mtime_ms,
            ctime_ms: stat.ctime_ms,
        })
    }

    /// Ordered listing; the root is prefixed with the synthetic entry.
    pub async fn read_directory(
        &self,
        address: &TreeAddress,
    ) -> Result<Vec<(String, NodeKind)>, FsError> {
        let snapshot = self.snapshot().await?;
        if address.is_root() {
            let mut listing = vec![(self.synthetic.clone(), NodeKind::File)];
            if let Some(tree) = &snapshot.tree {
                listing.extend(address::entries(tree).unwrap_or_default());
            }
            return Ok(listing);
        }
        if self.is_synthetic(address) {
            return Err(FsError::NotADirectory(address.to_string()));
        }
        let tree = snapshot
            .tree
            .as_ref()
            .ok_or_else(|| FsError::NotFound(address.to_string()))?;
        let value = address::resolve(tree, address)
            .ok_or_else(|| FsError::NotFound(address.to_string()))?;
        address::entries(value).ok_or_else(|| FsError::NotADirectory(address.to_string()))
    }

    pub async fn read_file(&self, address: &TreeAddress) -> Result<Vec<u8>, FsError> {
        let snapshot = self.snapshot().await?;
        if address.is_root() {
            return Err(FsError::IsADirectory(address.to_string()));
        }
        if self.is_synthetic(address) {
            return Ok(snapshot.raw.clone());
        }
        let tree = snapshot
            .tree
            .as_ref()
            .ok_or_else(|| FsError::NotFound(address.to_string()))?;
        let value = address::resolve(tree, address)
            .ok_or_else(|| FsError::NotFound(address.to_string()))?;
        if address::node_kind(value) == NodeKind::Directory {
            return Err(FsError::IsADirectory(address.to_string()));
        }
        Ok(address::leaf_text(value).into_bytes())
    }

    pub async fn write_file(
        &self,
        address: &TreeAddress,
        content: &[u8],
        options: WriteOptions,
    ) -> Result<(), FsError> {
        if address.is_root() {
            return Err(FsError::IsADirectory(address.to_string()));
        }
        let snapshot = self.snapshot().await?;

        if self.is_synthetic(address) {
            // the synthetic entry always exists
            if options.create && !options.overwrite {
                return Err(FsError::FileExists(address.to_string()));
            }
            let staged = self.stage().await?;
            self.tool.replace_plaintext(staged.path(), content).await?;
            self.commit(
                staged.path(),
                vec![ChangeEvent::new(address.clone(), ChangeKind::Changed)],
            )
            .await?;
            info!(document = %self.document.display(), "re-encrypted raw stream");
            return Ok(());
        }

        let Some(tree) = snapshot.tree.as_ref() else {
            return Err(FsError::PermissionDenied(
                "binary documents only expose the raw entry".to_string(),
            ));
        };

        let existed = match address::resolve(tree, address) {
            Some(value) if address::node_kind(value) == NodeKind::Directory => {
                return Err(FsError::IsADirectory(address.to_string()));
            }
            Some(_) => {
                if options.create && !options.overwrite {
                    return Err(FsError::FileExists(address.to_string()));
                }
                true
            }
            None => {
                if !options.create {
                    return Err(FsError::NotFound(address.to_string()));
                }
                self.require_parent_directory(tree, address)?;
                false
            }
        };

        let expression = address::tool_expression(tree, address)?;
        let text = String::from_utf8_lossy(content).into_owned();
        let staged = self.stage().await?;
        self.tool
            .set_value(staged.path(), &expression, &Value::String(text))
            .await?;
        let kind = if existed {
            ChangeKind::Changed
        } else {
            ChangeKind::Created
        };
        self.commit(staged.path(), vec![ChangeEvent::new(address.clone(), kind)])
            .await?;
        info!(document = %self.document.display(), address = %address, "wrote value");
        Ok(())
    }

    pub async fn create_directory(&self, address: &TreeAddress) -> Result<(), FsError> {
        if address.is_root() || self.is_synthetic(address) {
            return Err(FsError::FileExists(address.to_string()));
        }
        let snapshot = self.snapshot().await?;
        let Some(tree) = snapshot.tree.as_ref() else {
            return Err(FsError::PermissionDenied(
                "binary documents only expose the raw entry".to_string(),
            ));
        };
        if address::resolve(tree, address).is_some() {
            return Err(FsError::FileExists(address.to_string()));
        }
        self.require_parent_directory(tree, address)?;
        let expression = address::tool_expression(tree, address)?;
        let staged = self.stage().await?;
        self.tool
            .set_value(staged.path(), &expression, &Value::Object(Map::new()))
            .await?;
        self.commit(
            staged.path(),
            vec![ChangeEvent::new(address.clone(), ChangeKind::Created)],
        )
        .await?;
        info!(document = %self.document.display(), address = %address, "created directory");
        Ok(())
    }

    pub async fn delete(&self, address: &TreeAddress) -> Result<(), FsError> {
        if address.is_root() || self.is_synthetic(address) {
            return Err(FsError::PermissionDenied(
                "the raw entry cannot be deleted".to_string(),
            ));
        }
        let snapshot = self.snapshot().await?;
        let Some(tree) = snapshot.tree.as_ref() else {
            return Err(FsError::PermissionDenied(
                "binary documents do not support deletion".to_string(),
            ));
        };
        if address::resolve(tree, address).is_none() {
            return Err(FsError::NotFound(address.to_string()));
        }
        let expression = address::tool_expression(tree, address)?;
        let staged = self.stage().await?;
        self.tombstone(staged.path(), &expression).await?;
        self.commit(
            staged.path(),
            vec![ChangeEvent::new(address.clone(), ChangeKind::Deleted)],
        )
        .await?;
        info!(document = %self.document.display(), address = %address, "deleted entry");
        Ok(())
    }

    /// Move a value. Both the set at the new address and the tombstone of
    /// the old one run against the same staged copy, committed once.
    pub async fn rename(
        &self,
        from: &TreeAddress,
        to: &TreeAddress,
        options: RenameOptions,
    ) -> Result<(), FsError> {
        if from.is_root() || to.is_root() || self.is_synthetic(from) || self.is_synthetic(to) {
            return Err(FsError::PermissionDenied(
                "the raw entry cannot be renamed".to_string(),
            ));
        }
        let snapshot = self.snapshot().await?;
        let Some(tree) = snapshot.tree.as_ref() else {
            return Err(FsError::PermissionDenied(
                "binary documents do not support renaming".to_string(),
            ));
        };
        let value = address::resolve(tree, from)
            .ok_or_else(|| FsError::NotFound(from.to_string()))?
            .clone();
        if address::resolve(tree, to).is_some() && !options.overwrite {
            return Err(FsError::FileExists(to.to_string()));
        }
        self.require_parent_directory(tree, to)?;
        let to_expression = address::tool_expression(tree, to)?;
        let from_expression = address::tool_expression(tree, from)?;

        let staged = self.stage().await?;
        self.tool
            .set_value(staged.path(), &to_expression, &value)
            .await?;
        self.tombstone(staged.path(), &from_expression).await?;
        self.commit(
            staged.path(),
            vec![
                ChangeEvent::new(from.clone(), ChangeKind::Deleted),
                ChangeEvent::new(to.clone(), ChangeKind::Created),
            ],
        )
        .await?;
        info!(
            document = %self.document.display(),
            from = %from,
            to = %to,
            "renamed entry"
        );
        Ok(())
    }

    fn require_parent_directory(&self, tree: &Value, address: &TreeAddress) -> Result<(), FsError> {
        let parent = address.parent().unwrap_or_else(TreeAddress::root);
        let exists = address::resolve(tree, &parent)
            .map(|value| address::node_kind(value) == NodeKind::Directory)
            .unwrap_or(false);
        if exists {
            Ok(())
        } else {
            Err(FsError::NotFound(parent.to_string()))
        }
    }

    /// Delete-marker protocol against a staged copy: set the sentinel,
    /// decrypt, strip it textually, re-encrypt the stripped plaintext.
    async fn tombstone(&self, staged: &Path, expression: &str) -> Result<(), FsError> {
        self.tool
            .set_value(staged, expression, &Value::String(DELETE_MARKER.to_string()))
            .await?;
        let plaintext = self.tool.decrypt_raw(staged).await?;
        let stripped = marker::strip_marker(self.format, &plaintext, DELETE_MARKER);
        self.tool.replace_plaintext(staged, &stripped).await?;
        Ok(())
    }

    /// Stage the stable document into a private temporary copy. The copy
    /// keeps the document's file name as a suffix so the tool still
    /// detects the format; it is removed on drop, on every exit path.
    async fn stage(&self) -> Result<NamedTempFile, FsError> {
        let file_name = self
            .document
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let staged = tempfile::Builder::new()
            .prefix("sopsfs-")
            .suffix(&format!("-{}", file_name))
            .tempfile()?;
        tokio::fs::copy(&self.document, staged.path()).await?;
        Ok(staged)
    }

    /// Overwrite the stable document with the staged result, then drop
    /// the snapshot and queue the change batch.
    async fn commit(&self, staged: &Path, events: Vec<ChangeEvent>) -> Result<(), FsError> {
        tokio::fs::copy(staged, &self.document).await?;
        self.shared.cache.invalidate();
        self.shared.batcher.enqueue(events);
        Ok(())
    }
}
