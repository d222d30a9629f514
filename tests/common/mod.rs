//! Shared test harness: an in-process stand-in for the encryption tool.
//!
//! Documents are "pretend encrypted": the file on disk holds the
//! plaintext itself. The fake still honors the real invocation surface
//! (structured output is JSON regardless of the document format, set
//! mutations navigate the same bracketed path expressions, and replaced
//! plaintext lands verbatim in the file), so the engine's whole mutation
//! protocol runs unmodified.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use sopsfs::document::{DocumentEngine, EngineOptions};
use sopsfs::error::ToolError;
use sopsfs::tool::CryptoTool;
use sopsfs::types::Format;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Flush interval used by test engines; tests sleep a few multiples of
/// this before asserting on event batches.
pub const TEST_FLUSH: Duration = Duration::from_millis(40);

pub struct FakeTool;

#[derive(Debug, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_expression(expression: &str) -> Result<Vec<Segment>, ToolError> {
    let mut segments = Vec::new();
    let mut rest = expression;
    while !rest.is_empty() {
        let inner = rest
            .strip_prefix('[')
            .ok_or_else(|| ToolError::Output(format!("bad expression: {expression}")))?;
        if inner.starts_with('"') {
            let close = inner
                .find("\"]")
                .ok_or_else(|| ToolError::Output(format!("unterminated key: {expression}")))?;
            let token = &inner[..close + 1];
            let key: String = serde_json::from_str(token)
                .map_err(|e| ToolError::Output(format!("bad key token {token}: {e}")))?;
            segments.push(Segment::Key(key));
            rest = &inner[close + 2..];
        } else {
            let close = inner
                .find(']')
                .ok_or_else(|| ToolError::Output(format!("unterminated index: {expression}")))?;
            let index: usize = inner[..close]
                .parse()
                .map_err(|e| ToolError::Output(format!("bad index: {e}")))?;
            segments.push(Segment::Index(index));
            rest = &inner[close + 1..];
        }
    }
    Ok(segments)
}

fn apply_set(root: &mut Value, segments: &[Segment], new_value: Value) -> Result<(), ToolError> {
    let Some((last, walk)) = segments.split_last() else {
        *root = new_value;
        return Ok(());
    };
    let mut current = root;
    for segment in walk {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map
                .get_mut(key)
                .ok_or_else(|| ToolError::Output(format!("missing key {key}")))?,
            (Segment::Index(index), Value::Array(items)) => items
                .get_mut(*index)
                .ok_or_else(|| ToolError::Output(format!("missing index {index}")))?,
            _ => return Err(ToolError::Output("type mismatch in path".to_string())),
        };
    }
    match (last, current) {
        (Segment::Key(key), Value::Object(map)) => {
            map.insert(key.clone(), new_value);
            Ok(())
        }
        (Segment::Index(index), Value::Array(items)) => {
            if *index < items.len() {
                items[*index] = new_value;
                Ok(())
            } else if *index == items.len() {
                items.push(new_value);
                Ok(())
            } else {
                Err(ToolError::Output(format!("index {index} out of bounds")))
            }
        }
        _ => Err(ToolError::Output("type mismatch at leaf".to_string())),
    }
}

fn read_tree(document: &Path) -> Result<Value, ToolError> {
    let bytes = std::fs::read(document)?;
    match Format::detect(document) {
        Format::Json => serde_json::from_slice(&bytes)
            .map_err(|e| ToolError::Output(format!("invalid json: {e}"))),
        Format::Yaml => {
            let yaml: serde_yaml::Value = serde_yaml::from_slice(&bytes)
                .map_err(|e| ToolError::Output(format!("invalid yaml: {e}")))?;
            serde_json::to_value(yaml).map_err(|e| ToolError::Output(e.to_string()))
        }
        Format::Dotenv => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            let mut map = serde_json::Map::new();
            for line in text.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    map.insert(key.to_string(), Value::String(value.to_string()));
                }
            }
            Ok(Value::Object(map))
        }
        other => Err(ToolError::Output(format!(
            "structured output unsupported for {other} documents"
        ))),
    }
}

fn write_tree(document: &Path, tree: &Value) -> Result<(), ToolError> {
    let rendered = match Format::detect(document) {
        Format::Json => {
            let mut text = serde_json::to_string_pretty(tree)
                .map_err(|e| ToolError::Output(e.to_string()))?;
            text.push('\n');
            text
        }
        Format::Yaml => {
            serde_yaml::to_string(tree).map_err(|e| ToolError::Output(e.to_string()))?
        }
        other => {
            return Err(ToolError::Output(format!(
                "set unsupported for {other} documents"
            )))
        }
    };
    std::fs::write(document, rendered)?;
    Ok(())
}

#[async_trait]
impl CryptoTool for FakeTool {
    async fn decrypt_raw(&self, document: &Path) -> Result<Vec<u8>, ToolError> {
        Ok(std::fs::read(document)?)
    }

    async fn decrypt_structured(&self, document: &Path) -> Result<Vec<u8>, ToolError> {
        let tree = read_tree(document)?;
        serde_json::to_vec(&tree).map_err(|e| ToolError::Output(e.to_string()))
    }

    async fn set_value(
        &self,
        document: &Path,
        expression: &str,
        value: &Value,
    ) -> Result<(), ToolError> {
        let segments = parse_expression(expression)?;
        let mut tree = read_tree(document)?;
        apply_set(&mut tree, &segments, value.clone())?;
        write_tree(document, &tree)
    }

    async fn replace_plaintext(&self, document: &Path, plaintext: &[u8]) -> Result<(), ToolError> {
        std::fs::write(document, plaintext)?;
        Ok(())
    }
}

/// Write a pretty-printed JSON document into `dir`.
pub fn json_doc(dir: &TempDir, name: &str, tree: &Value) -> PathBuf {
    let path = dir.path().join(name);
    let mut text = serde_json::to_string_pretty(tree).expect("serializable tree");
    text.push('\n');
    std::fs::write(&path, text).expect("write document");
    path
}

/// Write a raw document (any format) into `dir`.
pub fn raw_doc(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("write document");
    path
}

/// Engine over the fake tool with a short flush interval.
pub fn fake_engine(document: PathBuf) -> DocumentEngine {
    DocumentEngine::new(
        document,
        Arc::new(FakeTool),
        EngineOptions {
            flush_interval: TEST_FLUSH,
        },
    )
    .expect("engine construction")
}

/// Wait long enough for a flush window to pass.
pub async fn settle() {
    tokio::time::sleep(TEST_FLUSH * 5).await;
}
