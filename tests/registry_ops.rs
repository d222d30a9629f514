//! Integration tests for the namespace registry: routing, fail-fast
//! construction, bounded eviction, and event re-addressing.

mod common;

use common::{json_doc, FakeTool, TEST_FLUSH};
use serde_json::json;
use sopsfs::error::FsError;
use sopsfs::registry::{
    compose_namespace_path, EngineRegistry, RegistryOptions,
};
use sopsfs::types::{ChangeKind, NodeKind, RenameOptions, TreeAddress, WriteOptions};
use std::sync::Arc;

fn registry(capacity: usize) -> EngineRegistry {
    EngineRegistry::new(
        Arc::new(FakeTool),
        RegistryOptions {
            capacity,
            flush_interval: TEST_FLUSH,
        },
    )
}

fn doc_path(path: &std::path::Path, sub: &str) -> String {
    compose_namespace_path(&path.to_string_lossy(), &TreeAddress::parse(sub))
}

#[tokio::test]
async fn namespace_paths_route_to_the_right_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = json_doc(&dir, "first.sops.json", &json!({"from": "first"}));
    let second = json_doc(&dir, "second.sops.json", &json!({"from": "second"}));
    let registry = registry(8);

    let root = registry
        .stat(&doc_path(&first, ""))
        .await
        .expect("root stats");
    assert_eq!(root.kind, NodeKind::Directory);

    assert_eq!(
        registry
            .read_file(&doc_path(&first, "from"))
            .await
            .expect("reads"),
        b"first"
    );
    assert_eq!(
        registry
            .read_file(&doc_path(&second, "from"))
            .await
            .expect("reads"),
        b"second"
    );
    assert_eq!(registry.open_documents(), 2);
    registry.clear();
    assert_eq!(registry.open_documents(), 0);
}

#[tokio::test]
async fn absent_documents_fail_fast() {
    let registry = registry(8);
    let missing = doc_path(std::path::Path::new("/definitely/not/here.sops.json"), "");
    assert!(registry.stat(&missing).await.is_err());
    assert_eq!(registry.open_documents(), 0);
}

#[tokio::test]
async fn mutations_flow_through_the_namespace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc = json_doc(&dir, "app.sops.json", &json!({"a": 1}));
    let registry = registry(8);

    registry
        .write_file(
            &doc_path(&doc, "fresh"),
            b"value",
            WriteOptions {
                create: true,
                overwrite: false,
            },
        )
        .await
        .expect("write succeeds");
    registry
        .create_directory(&doc_path(&doc, "section"))
        .await
        .expect("mkdir succeeds");
    registry
        .rename(
            &doc_path(&doc, "fresh"),
            &doc_path(&doc, "section/moved"),
            RenameOptions::default(),
        )
        .await
        .expect("rename succeeds");
    registry
        .delete(&doc_path(&doc, "a"))
        .await
        .expect("delete succeeds");

    let listing = registry
        .read_directory(&doc_path(&doc, ""))
        .await
        .expect("root lists");
    let names: Vec<&str> = listing.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["raw.json", "section"]);
    assert_eq!(
        registry
            .read_file(&doc_path(&doc, "section/moved"))
            .await
            .expect("reads"),
        b"value"
    );
}

#[tokio::test]
async fn rename_across_documents_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = json_doc(&dir, "first.sops.json", &json!({"a": 1}));
    let second = json_doc(&dir, "second.sops.json", &json!({"b": 2}));
    let registry = registry(8);

    assert!(matches!(
        registry
            .rename(
                &doc_path(&first, "a"),
                &doc_path(&second, "a"),
                RenameOptions::default()
            )
            .await,
        Err(FsError::PermissionDenied(_))
    ));
}

#[tokio::test]
async fn capacity_bounds_open_documents() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = json_doc(&dir, "first.sops.json", &json!({"a": 1}));
    let second = json_doc(&dir, "second.sops.json", &json!({"b": 2}));
    let registry = registry(1);

    registry
        .stat(&doc_path(&first, ""))
        .await
        .expect("first opens");
    assert_eq!(registry.open_documents(), 1);

    registry
        .stat(&doc_path(&second, ""))
        .await
        .expect("second opens, evicting first");
    assert_eq!(registry.open_documents(), 1);

    // the evicted document reopens transparently
    assert_eq!(
        registry
            .read_file(&doc_path(&first, "a"))
            .await
            .expect("reads"),
        b"1"
    );
    assert_eq!(registry.open_documents(), 1);
}

#[tokio::test]
async fn events_are_readdressed_into_the_namespace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc = json_doc(&dir, "app.sops.json", &json!({"a": 1}));
    let registry = registry(8);
    let mut rx = registry.subscribe();

    registry
        .write_file(
            &doc_path(&doc, "a"),
            b"2",
            WriteOptions {
                create: false,
                overwrite: true,
            },
        )
        .await
        .expect("write succeeds");

    tokio::time::sleep(TEST_FLUSH * 5).await;
    let batch = rx.recv().await.expect("one batch");
    let changed = doc_path(&doc, "a");
    assert!(batch
        .iter()
        .any(|(path, kind)| path == &changed && *kind == ChangeKind::Changed));
    // the batch-wide root event arrives namespace-qualified too
    let root = doc_path(&doc, "");
    assert!(batch
        .iter()
        .any(|(path, kind)| path == &root && *kind == ChangeKind::Changed));
}
