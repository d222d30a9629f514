//! Namespace multiplexing over many document engines.
//!
//! A namespace path is `/<id>/<sub-path...>` where `<id>` is URL-safe
//! no-pad base64 of the document's identifier string. Engines are created
//! lazily per document and held in a bounded LRU; eviction tears the
//! engine down explicitly (watch subscription and event forwarder) rather
//! than leaving it to drop order.

use crate::document::{DocumentEngine, EngineOptions};
use crate::error::FsError;
use crate::tool::CryptoTool;
use crate::types::{ChangeKind, Metadata, NodeKind, RenameOptions, TreeAddress, WriteOptions};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default number of concurrently open documents.
pub const DEFAULT_CAPACITY: usize = 32;

const CHANNEL_CAPACITY: usize = 64;

/// A change notification re-addressed into the registry namespace.
pub type NamespaceEvent = (String, ChangeKind);

/// Encode a document identifier for use as the first namespace segment.
pub fn encode_document_id(id: &str) -> String {
    URL_SAFE_NO_PAD.encode(id.as_bytes())
}

/// Exact inverse of [`encode_document_id`].
pub fn decode_document_id(encoded: &str) -> Result<String, FsError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| FsError::InvalidPath {
            segment: encoded.to_string(),
            reason: "not a base64url document identifier".to_string(),
        })?;
    String::from_utf8(bytes).map_err(|_| FsError::InvalidPath {
        segment: encoded.to_string(),
        reason: "document identifier is not utf-8".to_string(),
    })
}

/// Split a namespace path into (document identifier, sub-address).
pub fn parse_namespace_path(path: &str) -> Result<(String, TreeAddress), FsError> {
    let trimmed = path.trim_start_matches('/');
    let (head, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    if head.is_empty() {
        return Err(FsError::InvalidPath {
            segment: path.to_string(),
            reason: "missing document identifier".to_string(),
        });
    }
    Ok((decode_document_id(head)?, TreeAddress::parse(rest)))
}

/// Compose a namespace path from a document identifier and an address.
pub fn compose_namespace_path(id: &str, address: &TreeAddress) -> String {
    if address.is_root() {
        format!("/{}", encode_document_id(id))
    } else {
        format!("/{}/{}", encode_document_id(id), address)
    }
}

/// Registry tuning knobs.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub capacity: usize,
    pub flush_interval: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        RegistryOptions {
            capacity: DEFAULT_CAPACITY,
            flush_interval: crate::document::DEFAULT_FLUSH_INTERVAL,
        }
    }
}

struct EngineEntry {
    engine: Arc<DocumentEngine>,
    forwarder: JoinHandle<()>,
}

impl EngineEntry {
    fn teardown(self) {
        self.forwarder.abort();
        self.engine.dispose();
    }
}

/// One coherent namespace over many independently-cached document engines.
pub struct EngineRegistry {
    tool: Arc<dyn CryptoTool>,
    options: RegistryOptions,
    engines: Mutex<LruCache<String, EngineEntry>>,
    tx: broadcast::Sender<Vec<NamespaceEvent>>,
}

impl EngineRegistry {
    pub fn new(tool: Arc<dyn CryptoTool>, options: RegistryOptions) -> Self {
        let capacity =
            NonZeroUsize::new(options.capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        EngineRegistry {
            tool,
            options,
            engines: Mutex::new(LruCache::new(capacity)),
            tx,
        }
    }

    /// Subscribe to namespace-addressed change batches.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<NamespaceEvent>> {
        self.tx.subscribe()
    }

    /// No-op registration: every open document is already fully watched
    /// through its engine's file watch.
    pub fn watch(&self, _path: &str) {}

    /// Number of currently open documents.
    pub fn open_documents(&self) -> usize {
        self.engines.lock().len()
    }

    /// Dispose every engine. Used on shutdown.
    pub fn clear(&self) {
        let mut engines = self.engines.lock();
        while let Some((id, entry)) = engines.pop_lru() {
            debug!(document = %id, "disposing engine");
            entry.teardown();
        }
    }

    async fn engine_for(&self, id: &str) -> Result<Arc<DocumentEngine>, FsError> {
        if let Some(entry) = self.engines.lock().get(id) {
            return Ok(Arc::clone(&entry.engine));
        }

        // Construct outside the lock; the initial stat fails fast on
        // absent or undecryptable documents.
        let engine = Arc::new(DocumentEngine::new(
            PathBuf::from(id),
            Arc::clone(&self.tool),
            EngineOptions {
                flush_interval: self.options.flush_interval,
            },
        )?);
        if let Err(e) = engine.stat(&TreeAddress::root()).await {
            engine.dispose();
            return Err(e);
        }

        let mut rx = engine.subscribe();
        let forwarded_id = id.to_string();
        let tx = self.tx.clone();
        let forwarder = tokio::spawn(async move {
            loop {
                let batch = match rx.recv().await {
                    Ok(batch) => batch,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let mapped: Vec<NamespaceEvent> = batch
                    .iter()
                    .map(|event| {
                        (
                            compose_namespace_path(&forwarded_id, &event.address),
                            event.kind,
                        )
                    })
                    .collect();
                let _ = tx.send(mapped);
            }
        });

        let entry = EngineEntry {
            engine: Arc::clone(&engine),
            forwarder,
        };
        let mut engines = self.engines.lock();
        if let Some((evicted_id, evicted)) = engines.push(id.to_string(), entry) {
            if evicted_id != id {
                info!(document = %evicted_id, "evicting least-recently-used engine");
            }
            evicted.teardown();
        }
        Ok(engine)
    }

    pub async fn stat(&self, path: &str) -> Result<Metadata, FsError> {
        let (id, address) = parse_namespace_path(path)?;
        self.engine_for(&id).await?.stat(&address).await
    }

    pub async fn read_directory(&self, path: &str) -> Result<Vec<(String, NodeKind)>, FsError> {
        let (id, address) = parse_namespace_path(path)?;
        self.engine_for(&id).await?.read_directory(&address).await
    }

    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let (id, address) = parse_namespace_path(path)?;
        self.engine_for(&id).await?.read_file(&address).await
    }

    pub async fn create_directory(&self, path: &str) -> Result<(), FsError> {
        let (id, address) = parse_namespace_path(path)?;
        self.engine_for(&id).await?.create_directory(&address).await
    }

    pub async fn write_file(
        &self,
        path: &str,
        content: &[u8],
        options: WriteOptions,
    ) -> Result<(), FsError> {
        let (id, address) = parse_namespace_path(path)?;
        self.engine_for(&id)
            .await?
            .write_file(&address, content, options)
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<(), FsError> {
        let (id, address) = parse_namespace_path(path)?;
        self.engine_for(&id).await?.delete(&address).await
    }

    /// Rename within one document; moving between documents is rejected.
    pub async fn rename(
        &self,
        from: &str,
        to: &str,
        options: RenameOptions,
    ) -> Result<(), FsError> {
        let (from_id, from_address) = parse_namespace_path(from)?;
        let (to_id, to_address) = parse_namespace_path(to)?;
        if from_id != to_id {
            return Err(FsError::PermissionDenied(
                "rename across documents is not supported".to_string(),
            ));
        }
        self.engine_for(&from_id)
            .await?
            .rename(&from_address, &to_address, options)
            .await
    }
}
