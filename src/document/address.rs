//! Tree-address resolution and tool path expressions.

use crate::error::FsError;
use crate::types::{NodeKind, TreeAddress};
use serde_json::Value;

/// Canonical non-negative decimal array index. Rejects anything whose
/// string form differs from its own decimal rendering (`"01"`, `"-1"`,
/// `"1.0"`).
pub fn parse_index(segment: &str) -> Option<usize> {
    let index: usize = segment.parse().ok()?;
    (index.to_string() == segment).then_some(index)
}

/// Resolve an address against a parsed tree.
pub fn resolve<'a>(tree: &'a Value, address: &TreeAddress) -> Option<&'a Value> {
    let mut current = tree;
    for segment in address.segments() {
        current = match current {
            Value::Array(items) => items.get(parse_index(segment)?)?,
            Value::Object(entries) => entries.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render an address as the tool's set-mutation path expression.
///
/// Each segment is typed by the already-resolved parent value: array
/// parents take bracketed numeric indices (canonical form enforced),
/// everything else takes bracketed JSON-quoted string keys.
pub fn tool_expression(tree: &Value, address: &TreeAddress) -> Result<String, FsError> {
    let mut expression = String::new();
    let mut current: Option<&Value> = Some(tree);
    for segment in address.segments() {
        match current {
            Some(Value::Array(items)) => {
                let index = parse_index(segment).ok_or_else(|| FsError::invalid_index(segment))?;
                expression.push('[');
                expression.push_str(&index.to_string());
                expression.push(']');
                current = items.get(index);
            }
            other => {
                expression.push('[');
                expression.push_str(&Value::String(segment.clone()).to_string());
                expression.push(']');
                current = other.and_then(|value| value.get(segment.as_str()));
            }
        }
    }
    Ok(expression)
}

/// Objects and arrays are directories; every leaf is a file.
pub fn node_kind(value: &Value) -> NodeKind {
    match value {
        Value::Object(_) | Value::Array(_) => NodeKind::Directory,
        _ => NodeKind::File,
    }
}

/// Text form of a leaf value: strings verbatim, everything else as its
/// JSON rendering.
pub fn leaf_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Directory listing of a container value, in document order. `None` for
/// leaves.
pub fn entries(value: &Value) -> Option<Vec<(String, NodeKind)>> {
    match value {
        Value::Object(map) => Some(
            map.iter()
                .map(|(name, child)| (name.clone(), node_kind(child)))
                .collect(),
        ),
        Value::Array(items) => Some(
            items
                .iter()
                .enumerate()
                .map(|(index, child)| (index.to_string(), node_kind(child)))
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "database": { "password": "hunter2", "hosts": ["a", "b"] },
            "flag": true
        })
    }

    #[test]
    fn resolve_walks_objects_and_arrays() {
        let tree = sample();
        let address = TreeAddress::parse("database/hosts/1");
        assert_eq!(resolve(&tree, &address), Some(&json!("b")));
        assert_eq!(resolve(&tree, &TreeAddress::root()), Some(&tree));
        assert!(resolve(&tree, &TreeAddress::parse("database/missing")).is_none());
        assert!(resolve(&tree, &TreeAddress::parse("flag/deeper")).is_none());
    }

    #[test]
    fn expression_types_segments_by_parent() {
        let tree = sample();
        let expression = tool_expression(&tree, &TreeAddress::parse("database/hosts/0"))
            .expect("valid address");
        assert_eq!(expression, "[\"database\"][\"hosts\"][0]");
    }

    #[test]
    fn expression_quotes_keys_as_json() {
        let tree = json!({ "we\"ird": 1 });
        let expression =
            tool_expression(&tree, &TreeAddress::parse("we\"ird")).expect("valid address");
        assert_eq!(expression, "[\"we\\\"ird\"]");
    }

    #[test]
    fn expression_rejects_non_canonical_indices() {
        let tree = json!({ "hosts": ["a", "b"] });
        for segment in ["01", "-1", "1.0", "one", ""] {
            let address = TreeAddress::from_segments(["hosts".to_string(), segment.to_string()]);
            assert!(
                matches!(
                    tool_expression(&tree, &address),
                    Err(FsError::InvalidPath { .. })
                ),
                "segment {segment:?} must be rejected"
            );
        }
    }

    #[test]
    fn leaf_text_renders_scalars() {
        assert_eq!(leaf_text(&json!("secret")), "secret");
        assert_eq!(leaf_text(&json!(42)), "42");
        assert_eq!(leaf_text(&json!(true)), "true");
        assert_eq!(leaf_text(&json!(null)), "null");
    }

    #[test]
    fn entries_follow_document_order() {
        let tree = json!({ "zeta": 1, "alpha": { "x": 1 } });
        let listed = entries(&tree).expect("object is a directory");
        assert_eq!(
            listed,
            vec![
                ("zeta".to_string(), NodeKind::File),
                ("alpha".to_string(), NodeKind::Directory)
            ]
        );
        assert!(entries(&json!("leaf")).is_none());
    }

    proptest! {
        #[test]
        fn canonical_indices_round_trip(index in 0usize..10_000) {
            prop_assert_eq!(parse_index(&index.to_string()), Some(index));
        }

        #[test]
        fn padded_indices_are_rejected(index in 0usize..1000) {
            let padded = format!("0{index}");
            prop_assert_eq!(parse_index(&padded), None);
        }
    }
}
