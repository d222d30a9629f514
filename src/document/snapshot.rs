//! Decrypted snapshot of a document and its single-slot cache.

use crate::error::FsError;
use crate::tool::CryptoTool;
use crate::types::Format;
use parking_lot::RwLock;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Stat of the stable encrypted document at snapshot time.
#[derive(Debug, Clone, Copy)]
pub struct DocumentStat {
    pub size: u64,
    pub mtime_ms: i64,
    pub ctime_ms: i64,
}

/// Immutable decrypted view of one document. The parsed tree is present
/// iff the format is structured and the tool's JSON output parsed.
pub struct Snapshot {
    pub stat: DocumentStat,
    pub raw: Vec<u8>,
    pub tree: Option<Value>,
}

/// Holds the last-known snapshot; absence means re-derive before the next
/// access.
pub struct SnapshotCache {
    slot: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        SnapshotCache {
            slot: RwLock::new(None),
        }
    }

    pub fn cached(&self) -> Option<Arc<Snapshot>> {
        self.slot.read().clone()
    }

    pub fn store(&self, snapshot: Arc<Snapshot>) {
        *self.slot.write() = Some(snapshot);
    }

    pub fn invalidate(&self) {
        *self.slot.write() = None;
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        SnapshotCache::new()
    }
}

fn millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        Err(_) => 0,
    }
}

/// Stat the stable document on disk.
pub fn stat_document(document: &Path) -> Result<DocumentStat, FsError> {
    let metadata = std::fs::metadata(document)?;
    let mtime = metadata.modified().map(millis).unwrap_or(0);
    let ctime = metadata.created().map(millis).unwrap_or(mtime);
    Ok(DocumentStat {
        size: metadata.len(),
        mtime_ms: mtime,
        ctime_ms: ctime,
    })
}

/// Derive a fresh snapshot: stat, decrypt to raw, and (for structured
/// formats) decrypt to JSON and parse. A structured parse failure makes
/// the whole access fail rather than silently degrading.
pub async fn load_snapshot(
    tool: &dyn CryptoTool,
    document: &Path,
    format: Format,
) -> Result<Snapshot, FsError> {
    let stat = stat_document(document)?;
    let raw = tool.decrypt_raw(document).await?;
    let tree = if format == Format::Binary {
        None
    } else {
        let json = tool.decrypt_structured(document).await?;
        let value: Value = serde_json::from_slice(&json)
            .map_err(|e| FsError::Parse(format!("{}: {}", document.display(), e)))?;
        Some(value)
    };
    Ok(Snapshot { stat, raw, tree })
}
