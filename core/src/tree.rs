//! Order-preserving document tree for YAML and JSON manifests.
//!
//! Manifests are edited structurally rather than through typed models so
//! that everything the tool does not know about survives a rewrite. A parsed
//! file is a [`Node::Document`] wrapping a single root; [`navigate`] walks a
//! key path (creating missing intermediate nodes) and [`splice`] appends
//! children to the node it lands on.
//!
//! # Example
//!
//! ```
//! use pkgbuild_core::tree::{self, Node};
//!
//! let mut doc = tree::parse(b"name: nginx\n").unwrap();
//! let templates = tree::navigate(&mut doc, &["mappings", "dynamic_templates"]).unwrap();
//! assert!(matches!(templates, Node::Sequence(_)));
//!
//! tree::splice(templates, Node::Sequence(vec![Node::string("strings_as_keyword")])).unwrap();
//! let out = String::from_utf8(tree::encode(&doc).unwrap()).unwrap();
//! assert!(out.contains("- strings_as_keyword"));
//! ```

use std::fmt;

use serde::Serialize;
use serde_yaml::{Mapping, Number, Value};
use thiserror::Error;

/// Path segment whose missing node is created as a sequence.
pub const DYNAMIC_TEMPLATES_KEY: &str = "dynamic_templates";

/// Errors raised while parsing, encoding or editing a document tree.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The source bytes are not a valid YAML/JSON document.
    #[error("parse error: {0}")]
    Parse(#[source] serde_yaml::Error),

    /// The tree could not be rendered back to YAML.
    #[error("encode error: {0}")]
    Encode(#[source] serde_yaml::Error),

    /// A path segment was applied to a node that cannot be descended into.
    #[error("cannot descend into {found} at '{path}'")]
    TypeMismatch { path: String, found: NodeKind },

    /// A sequence segment is not an index or is out of range.
    #[error("invalid sequence index '{segment}' at '{path}' (length {len})")]
    Index {
        path: String,
        segment: String,
        len: usize,
    },

    /// Spliced values do not match the kind of the target node.
    #[error("cannot splice {values} children into {target}")]
    SpliceMismatch { target: NodeKind, values: NodeKind },
}

/// Convenience alias for results with [`TreeError`].
pub type Result<T> = std::result::Result<T, TreeError>;

/// Discriminant of a [`Node`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Scalar,
    Mapping,
    Sequence,
    Document,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Mapping => write!(f, "mapping"),
            Self::Sequence => write!(f, "sequence"),
            Self::Document => write!(f, "document"),
        }
    }
}

/// Leaf value of a document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

/// A node of a parsed document.
///
/// Mapping keys are unique and kept in source order.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Scalar(Scalar),
    Mapping(Vec<(String, Node)>),
    Sequence(Vec<Node>),
    Document(Box<Node>),
}

impl Node {
    /// Creates an empty mapping node.
    pub fn mapping() -> Self {
        Node::Mapping(Vec::new())
    }

    /// Creates an empty sequence node.
    pub fn sequence() -> Self {
        Node::Sequence(Vec::new())
    }

    /// Creates a string scalar.
    pub fn string(value: impl Into<String>) -> Self {
        Node::Scalar(Scalar::String(value.into()))
    }

    /// Wraps a root node into a document.
    pub fn document(root: Node) -> Self {
        Node::Document(Box::new(root))
    }

    /// Builds a tree from any serializable value.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        serde_yaml::to_value(value)
            .map(Node::from)
            .map_err(TreeError::Encode)
    }

    /// Returns the discriminant of this node.
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Scalar(_) => NodeKind::Scalar,
            Node::Mapping(_) => NodeKind::Mapping,
            Node::Sequence(_) => NodeKind::Sequence,
            Node::Document(_) => NodeKind::Document,
        }
    }

    /// Returns the root of a document, or the node itself.
    pub fn root(&self) -> &Node {
        match self {
            Node::Document(inner) => inner.root(),
            other => other,
        }
    }

    /// Looks up a direct child of a mapping by key.
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self.root() {
            Node::Mapping(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Follows a key path without creating anything.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&Node> {
        let mut current = self.root();
        for segment in path {
            let segment = segment.as_ref();
            current = match current {
                Node::Mapping(_) => current.get(segment)?,
                Node::Sequence(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Returns the string value of a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns the items of a sequence.
    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self.root() {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the keys of a mapping in order.
    pub fn keys(&self) -> Vec<&str> {
        match self.root() {
            Node::Mapping(entries) => entries.iter().map(|(k, _)| k.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Converts the tree back into a YAML value. Documents unwrap to their
    /// root.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Scalar(Scalar::Null) => Value::Null,
            Node::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            Node::Scalar(Scalar::Number(n)) => Value::Number(n.clone()),
            Node::Scalar(Scalar::String(s)) => Value::String(s.clone()),
            Node::Sequence(items) => Value::Sequence(items.iter().map(Node::to_value).collect()),
            Node::Mapping(entries) => {
                let mut map = Mapping::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(Value::String(key.clone()), value.to_value());
                }
                Value::Mapping(map)
            }
            Node::Document(inner) => inner.to_value(),
        }
    }

    /// Empty container created for a missing path segment.
    fn empty_for(segment: &str) -> Self {
        if segment == DYNAMIC_TEMPLATES_KEY {
            Node::sequence()
        } else {
            Node::mapping()
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Scalar(Scalar::Null),
            Value::Bool(b) => Node::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Node::Scalar(Scalar::Number(n)),
            Value::String(s) => Node::Scalar(Scalar::String(s)),
            Value::Sequence(items) => Node::Sequence(items.into_iter().map(Node::from).collect()),
            Value::Mapping(map) => {
                let mut entries: Vec<(String, Node)> = Vec::with_capacity(map.len());
                for (key, value) in map {
                    let key = key_text(&key);
                    if entries.iter().any(|(k, _)| *k == key) {
                        continue;
                    }
                    entries.push((key, Node::from(value)));
                }
                Node::Mapping(entries)
            }
            // Tags are not carried by the tree.
            Value::Tagged(tagged) => Node::from(tagged.value),
        }
    }
}

fn key_text(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Parses YAML (or JSON) bytes into a [`Node::Document`].
pub fn parse(bytes: &[u8]) -> Result<Node> {
    let value: Value = serde_yaml::from_slice(bytes).map_err(TreeError::Parse)?;
    Ok(Node::document(Node::from(value)))
}

/// Renders a tree as YAML.
pub fn encode(node: &Node) -> Result<Vec<u8>> {
    serde_yaml::to_string(&node.to_value())
        .map(String::into_bytes)
        .map_err(TreeError::Encode)
}

/// Walks `path` from `root`, creating missing mapping entries on the way,
/// and returns the node at the end of the path.
///
/// A document is unwrapped to its root first. For each segment a mapping
/// is searched for the exact key; a missing key is appended as an empty
/// sequence when the segment is [`DYNAMIC_TEMPLATES_KEY`] and as an empty
/// mapping otherwise. A sequence takes the segment as a base-10 index.
///
/// # Errors
///
/// [`TreeError::TypeMismatch`] when a segment meets a scalar, and
/// [`TreeError::Index`] when a sequence index is not a number or out of
/// range.
pub fn navigate<'a, S: AsRef<str>>(root: &'a mut Node, path: &[S]) -> Result<&'a mut Node> {
    let mut current = match root {
        Node::Document(inner) => &mut **inner,
        other => other,
    };

    for (depth, segment) in path.iter().enumerate() {
        let segment = segment.as_ref();
        current = match current {
            Node::Mapping(entries) => {
                let index = match entries.iter().position(|(key, _)| key == segment) {
                    Some(index) => index,
                    None => {
                        entries.push((segment.to_string(), Node::empty_for(segment)));
                        entries.len() - 1
                    }
                };
                &mut entries[index].1
            }
            Node::Sequence(items) => {
                let len = items.len();
                match segment.parse::<usize>() {
                    Ok(index) if index < len => &mut items[index],
                    _ => {
                        return Err(TreeError::Index {
                            path: joined(path, depth),
                            segment: segment.to_string(),
                            len,
                        });
                    }
                }
            }
            other => {
                return Err(TreeError::TypeMismatch {
                    path: joined(path, depth),
                    found: other.kind(),
                });
            }
        };
    }

    Ok(current)
}

fn joined<S: AsRef<str>>(path: &[S], depth: usize) -> String {
    path[..depth]
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(".")
}

/// Appends the children of `values` to `target`.
///
/// Mapping entries are appended to a mapping and sequence items to a
/// sequence; a document wrapper around `values` is ignored. Entries already
/// present in `target` are kept, and an incoming mapping entry whose key is
/// already present is dropped. A null target takes the kind of `values`.
pub fn splice(target: &mut Node, values: Node) -> Result<()> {
    let values = match values {
        Node::Document(inner) => *inner,
        other => other,
    };
    let target = match target {
        Node::Document(inner) => &mut **inner,
        other => other,
    };

    if matches!(target, Node::Scalar(Scalar::Null)) {
        *target = match values {
            Node::Sequence(_) => Node::sequence(),
            _ => Node::mapping(),
        };
    }

    match (target, values) {
        (Node::Sequence(items), Node::Sequence(new_items)) => {
            items.extend(new_items);
            Ok(())
        }
        (Node::Mapping(entries), Node::Mapping(new_entries)) => {
            for (key, value) in new_entries {
                if !entries.iter().any(|(k, _)| *k == key) {
                    entries.push((key, value));
                }
            }
            Ok(())
        }
        (target, values) => Err(TreeError::SpliceMismatch {
            target: target.kind(),
            values: values.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"title: Nginx access logs
type: logs
elasticsearch:
  index_template:
    settings:
      index.refresh_interval: 5s
streams:
  - input: logfile
    vars: []
"#;

    #[test]
    fn test_parse_preserves_key_order() {
        let doc = parse(MANIFEST.as_bytes()).unwrap();
        assert_eq!(doc.keys(), vec!["title", "type", "elasticsearch", "streams"]);
    }

    #[test]
    fn test_parse_rejects_malformed_yaml() {
        let err = parse(b"a: [1, 2\nb: c").unwrap_err();
        assert!(matches!(err, TreeError::Parse(_)));
    }

    #[test]
    fn test_navigate_existing_path() {
        let mut doc = parse(MANIFEST.as_bytes()).unwrap();
        let node = navigate(&mut doc, &["elasticsearch", "index_template", "settings"]).unwrap();
        assert_eq!(node.keys(), vec!["index.refresh_interval"]);
    }

    #[test]
    fn test_navigate_creates_only_missing_nodes() {
        let mut doc = parse(MANIFEST.as_bytes()).unwrap();
        navigate(
            &mut doc,
            &["elasticsearch", "index_template", "mappings", "properties"],
        )
        .unwrap();

        let template = doc.lookup(&["elasticsearch", "index_template"]).unwrap();
        assert_eq!(template.keys(), vec!["settings", "mappings"]);
        let mappings = template.get("mappings").unwrap();
        assert_eq!(mappings.keys(), vec!["properties"]);
        assert_eq!(mappings.get("properties"), Some(&Node::mapping()));
        assert_eq!(doc.keys(), vec!["title", "type", "elasticsearch", "streams"]);
    }

    #[test]
    fn test_navigate_creates_sequence_for_dynamic_templates() {
        let mut doc = parse(b"{}").unwrap();
        let node = navigate(&mut doc, &["mappings", DYNAMIC_TEMPLATES_KEY]).unwrap();
        assert_eq!(*node, Node::sequence());
    }

    #[test]
    fn test_navigate_into_sequence_by_index() {
        let mut doc = parse(MANIFEST.as_bytes()).unwrap();
        let node = navigate(&mut doc, &["streams", "0", "input"]).unwrap();
        assert_eq!(node.as_str(), Some("logfile"));
    }

    #[test]
    fn test_navigate_sequence_index_out_of_range() {
        let mut doc = parse(MANIFEST.as_bytes()).unwrap();
        let err = navigate(&mut doc, &["streams", "3"]).unwrap_err();
        match err {
            TreeError::Index { path, segment, len } => {
                assert_eq!(path, "streams");
                assert_eq!(segment, "3");
                assert_eq!(len, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_navigate_sequence_rejects_non_numeric_segment() {
        let mut doc = parse(MANIFEST.as_bytes()).unwrap();
        let err = navigate(&mut doc, &["streams", "first"]).unwrap_err();
        assert!(matches!(err, TreeError::Index { .. }));
    }

    #[test]
    fn test_navigate_through_scalar_is_type_mismatch() {
        let mut doc = parse(MANIFEST.as_bytes()).unwrap();
        let err = navigate(&mut doc, &["title", "text"]).unwrap_err();
        match err {
            TreeError::TypeMismatch { path, found } => {
                assert_eq!(path, "title");
                assert_eq!(found, NodeKind::Scalar);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_splice_appends_sequence_items_in_order() {
        let mut target = Node::Sequence(vec![Node::string("a")]);
        splice(
            &mut target,
            Node::Sequence(vec![Node::string("b"), Node::string("c")]),
        )
        .unwrap();
        assert_eq!(
            target,
            Node::Sequence(vec![Node::string("a"), Node::string("b"), Node::string("c")])
        );
    }

    #[test]
    fn test_splice_mapping_keeps_existing_entries() {
        let mut target = Node::Mapping(vec![("host".into(), Node::string("keep"))]);
        let values = Node::Mapping(vec![
            ("host".into(), Node::string("drop")),
            ("port".into(), Node::string("new")),
        ]);
        splice(&mut target, values).unwrap();
        assert_eq!(target.keys(), vec!["host", "port"]);
        assert_eq!(target.get("host").and_then(Node::as_str), Some("keep"));
    }

    #[test]
    fn test_splice_unwraps_document_values() {
        let mut target = Node::sequence();
        let values = parse(b"- one\n- two\n").unwrap();
        splice(&mut target, values).unwrap();
        assert_eq!(target.as_sequence().map(<[Node]>::len), Some(2));
    }

    #[test]
    fn test_splice_into_null_takes_values_kind() {
        let mut doc = parse(b"mappings:\n  dynamic_templates:\n").unwrap();
        let node = navigate(&mut doc, &["mappings", "dynamic_templates"]).unwrap();
        splice(node, Node::Sequence(vec![Node::string("t")])).unwrap();
        assert_eq!(
            doc.lookup(&["mappings", "dynamic_templates", "0"])
                .and_then(Node::as_str),
            Some("t")
        );
    }

    #[test]
    fn test_splice_kind_mismatch() {
        let mut target = Node::mapping();
        let err = splice(&mut target, Node::Sequence(vec![])).unwrap_err();
        assert!(matches!(
            err,
            TreeError::SpliceMismatch {
                target: NodeKind::Mapping,
                values: NodeKind::Sequence
            }
        ));
    }

    #[test]
    fn test_encode_round_trip_keeps_order() {
        let doc = parse(MANIFEST.as_bytes()).unwrap();
        let out = encode(&doc).unwrap();
        let reparsed = parse(&out).unwrap();
        assert_eq!(doc, reparsed);
        assert_eq!(reparsed.keys(), vec!["title", "type", "elasticsearch", "streams"]);
    }

    #[test]
    fn test_parse_accepts_json() {
        let doc = parse(br#"{"b": 1, "a": [true, null]}"#).unwrap();
        assert_eq!(doc.keys(), vec!["b", "a"]);
        assert_eq!(
            doc.lookup(&["a", "0"]),
            Some(&Node::Scalar(Scalar::Bool(true)))
        );
    }
}
