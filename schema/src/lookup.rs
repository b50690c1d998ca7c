//! Dotted-path lookup over field definition trees.
//!
//! A field's path is the `.`-joined names of its ancestors and itself, so
//! `source.geo.location` is the `location` child of the `geo` group under
//! `source`. Multi-fields are reachable the same way (`message.text`).
//!
//! Two strategies implement [`FieldLookup`] with identical answers:
//! [`WalkLookup`] walks the tree on every query, [`IndexedLookup`] builds a
//! path index once. When several definitions share a path, the first one in
//! depth-first order wins.

use std::collections::HashMap;
use std::fmt;

use pkgbuild_core::FieldDefinition;

/// Finds a field definition by its dotted path.
pub trait FieldLookup: fmt::Debug + Send + Sync {
    fn find(&self, path: &str) -> Option<&FieldDefinition>;
}

/// Lookup strategy used when a schema is registered in a
/// [`SchemaTable`](crate::SchemaTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupStrategy {
    /// Depth-first search on every query.
    Walk,
    /// Precomputed path index.
    #[default]
    Indexed,
}

impl LookupStrategy {
    pub(crate) fn build(self, fields: Vec<FieldDefinition>) -> Box<dyn FieldLookup> {
        match self {
            LookupStrategy::Walk => Box::new(WalkLookup::new(fields)),
            LookupStrategy::Indexed => Box::new(IndexedLookup::new(fields)),
        }
    }
}

fn child_path(root: &str, name: &str) -> String {
    if root.is_empty() {
        name.to_string()
    } else {
        format!("{root}.{name}")
    }
}

/// Depth-first search over the schema tree.
#[derive(Debug, Clone)]
pub struct WalkLookup {
    fields: Vec<FieldDefinition>,
}

impl WalkLookup {
    pub fn new(fields: Vec<FieldDefinition>) -> Self {
        Self { fields }
    }

    fn find_under<'a>(
        root: &str,
        path: &str,
        defs: &'a [FieldDefinition],
    ) -> Option<&'a FieldDefinition> {
        for def in defs {
            let key = child_path(root, &def.name);
            if key == path {
                return Some(def);
            }
            // Only descend where the searched path can still match.
            if !path.starts_with(&key) {
                continue;
            }
            if let Some(found) = Self::find_under(&key, path, &def.fields) {
                return Some(found);
            }
            if let Some(found) = Self::find_under(&key, path, &def.multi_fields) {
                return Some(found);
            }
        }
        None
    }
}

impl FieldLookup for WalkLookup {
    fn find(&self, path: &str) -> Option<&FieldDefinition> {
        Self::find_under("", path, &self.fields)
    }
}

/// Path-indexed lookup, built once per schema.
#[derive(Debug, Clone)]
pub struct IndexedLookup {
    index: HashMap<String, FieldDefinition>,
}

impl IndexedLookup {
    pub fn new(fields: Vec<FieldDefinition>) -> Self {
        let mut index = HashMap::new();
        Self::index_level("", &fields, &mut index);
        Self { index }
    }

    fn index_level(
        root: &str,
        defs: &[FieldDefinition],
        index: &mut HashMap<String, FieldDefinition>,
    ) {
        for def in defs {
            let key = child_path(root, &def.name);
            index.entry(key.clone()).or_insert_with(|| def.clone());
            Self::index_level(&key, &def.fields, index);
            Self::index_level(&key, &def.multi_fields, index);
        }
    }

    /// Number of indexed paths.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl FieldLookup for IndexedLookup {
    fn find(&self, path: &str) -> Option<&FieldDefinition> {
        self.index.get(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ecs_like() -> Vec<FieldDefinition> {
        vec![
            FieldDefinition::group(
                "source",
                vec![
                    FieldDefinition::leaf("ip", "ip").with_description("IP address of the source."),
                    FieldDefinition::group(
                        "geo",
                        vec![FieldDefinition::leaf("location", "geo_point")],
                    ),
                ],
            ),
            FieldDefinition::leaf("message", "match_only_text")
                .with_multi_field(FieldDefinition::leaf("text", "text")),
        ]
    }

    fn both() -> Vec<Box<dyn FieldLookup>> {
        vec![
            Box::new(WalkLookup::new(ecs_like())),
            Box::new(IndexedLookup::new(ecs_like())),
        ]
    }

    #[test]
    fn test_find_nested_path() {
        for lookup in both() {
            let def = lookup.find("source.geo.location").unwrap();
            assert_eq!(def.field_type.as_deref(), Some("geo_point"));
        }
    }

    #[test]
    fn test_find_group_itself() {
        for lookup in both() {
            assert!(lookup.find("source.geo").unwrap().is_group());
        }
    }

    #[test]
    fn test_find_multi_field() {
        for lookup in both() {
            let def = lookup.find("message.text").unwrap();
            assert_eq!(def.field_type.as_deref(), Some("text"));
        }
    }

    #[test]
    fn test_not_found_is_none() {
        for lookup in both() {
            assert!(lookup.find("source.port").is_none());
            assert!(lookup.find("ip").is_none());
            assert!(lookup.find("").is_none());
        }
    }

    #[test]
    fn test_first_definition_wins_on_duplicate_paths() {
        let defs = vec![
            FieldDefinition::group("host", vec![FieldDefinition::leaf("name", "keyword")]),
            FieldDefinition::leaf("host.name", "text"),
        ];
        let walk = WalkLookup::new(defs.clone());
        let indexed = IndexedLookup::new(defs);

        assert_eq!(walk.find("host.name").unwrap().field_type.as_deref(), Some("keyword"));
        assert_eq!(indexed.find("host.name").unwrap().field_type.as_deref(), Some("keyword"));
    }

    #[test]
    fn test_indexed_lookup_counts_paths() {
        let lookup = IndexedLookup::new(ecs_like());
        // source, source.ip, source.geo, source.geo.location, message, message.text
        assert_eq!(lookup.len(), 6);
    }
}
