//! External field injection.
//!
//! A fields file can declare a field by reference instead of spelling it
//! out:
//!
//! ```yaml
//! - name: source
//!   type: group
//!   fields:
//!     - name: ip
//!       external: ecs
//! ```
//!
//! [`inject`] replaces every such reference with the definition found at
//! the same dotted path (`source.ip`) in the named schema, and
//! [`FieldsStage`] applies it to all fields files of a built package.

use std::path::Path;

use pkgbuild_core::{FieldDefinition, validate_fields};
use pkgbuild_schema::SchemaTable;

use crate::error::{BuildError, InjectError, Result, Stage};
use crate::observer::{BuildEvent, BuildObserver};
use crate::workers::{glob_files, map_files};

/// Locations of fields files, relative to the package root.
pub const FIELDS_FILE_PATTERNS: &[&str] = &[
    "fields/*.yml",
    "data_stream/*/fields/*.yml",
    "elasticsearch/transform/*/fields/*.yml",
];

/// Replaces external references in `defs` with their schema definitions.
///
/// Returns the rewritten definitions and whether anything was replaced.
/// Definitions without `external` anywhere in their tree come back
/// unchanged, and injecting an already injected list changes nothing.
///
/// # Errors
///
/// [`InjectError::Validation`] for nameless definitions or references that
/// declare children, [`InjectError::UndefinedSchema`] for a reference to
/// an unknown schema, and [`InjectError::FieldNotFound`] when the schema
/// has no definition at the reference's path.
pub fn inject(
    table: &SchemaTable,
    defs: Vec<FieldDefinition>,
) -> std::result::Result<(Vec<FieldDefinition>, bool), InjectError> {
    if let Some(error) = validate_fields(&defs).into_iter().next() {
        return Err(error.into());
    }
    inject_level(table, defs, "")
}

fn inject_level(
    table: &SchemaTable,
    defs: Vec<FieldDefinition>,
    root: &str,
) -> std::result::Result<(Vec<FieldDefinition>, bool), InjectError> {
    let mut changed = false;
    let mut updated = Vec::with_capacity(defs.len());

    for mut def in defs {
        let path = if root.is_empty() {
            def.name.clone()
        } else {
            format!("{root}.{}", def.name)
        };

        if let Some(schema) = def.external.as_deref() {
            let imported = table
                .lookup(schema, &path)
                .map_err(|_| InjectError::UndefinedSchema(schema.to_string()))?
                .ok_or_else(|| InjectError::FieldNotFound {
                    schema: schema.to_string(),
                    path: path.clone(),
                })?;

            let mut transformed = transform_imported(imported);
            // Keep the local name: it may be a dotted suffix of the schema path.
            transformed.name = def.name;
            updated.push(transformed);
            changed = true;
            continue;
        }

        if !def.fields.is_empty() {
            let (fields, fields_changed) =
                inject_level(table, std::mem::take(&mut def.fields), &path)?;
            def.fields = fields;
            changed |= fields_changed;
        }
        updated.push(def);
    }

    Ok((updated, changed))
}

/// Copy of an imported definition reduced to name, description, type,
/// children and multi-fields.
fn transform_imported(def: &FieldDefinition) -> FieldDefinition {
    FieldDefinition {
        name: def.name.clone(),
        field_type: def.field_type.clone(),
        description: def.description.clone(),
        fields: def.fields.iter().map(transform_imported).collect(),
        multi_fields: def.multi_fields.iter().map(transform_imported).collect(),
        ..Default::default()
    }
}

/// Resolves external fields in every fields file of a built package.
pub struct FieldsStage<'a> {
    table: &'a SchemaTable,
    observer: &'a dyn BuildObserver,
    jobs: usize,
}

impl<'a> FieldsStage<'a> {
    pub fn new(table: &'a SchemaTable, observer: &'a dyn BuildObserver) -> Self {
        Self {
            table,
            observer,
            jobs: 1,
        }
    }

    /// Number of files processed concurrently.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Rewrites the fields files below `build_root` that reference external
    /// fields. Returns the number of files written.
    pub fn run(&self, build_root: &Path) -> Result<usize> {
        self.observer.on_event(&BuildEvent::StageStarted(Stage::Fields));

        let files = glob_files(Stage::Fields, build_root, FIELDS_FILE_PATTERNS)?;
        let written = map_files(&files, self.jobs, |path| self.rewrite(path))?
            .into_iter()
            .filter(|written| *written)
            .count();

        self.observer.on_event(&BuildEvent::StageFinished {
            stage: Stage::Fields,
            written,
        });
        Ok(written)
    }

    fn rewrite(&self, path: &Path) -> Result<bool> {
        let fail = |source: crate::error::StageError| BuildError {
            stage: Stage::Fields,
            path: path.to_path_buf(),
            source,
        };

        let content = std::fs::read(path).map_err(|e| fail(e.into()))?;
        let defs: Vec<FieldDefinition> =
            serde_yaml::from_slice(&content).map_err(|e| fail(e.into()))?;
        let (defs, changed) = inject(self.table, defs).map_err(|e| fail(e.into()))?;

        if !changed {
            self.observer.on_event(&BuildEvent::FileUnchanged {
                stage: Stage::Fields,
                path: path.to_path_buf(),
            });
            return Ok(false);
        }

        let output = serde_yaml::to_string(&defs).map_err(|e| fail(e.into()))?;
        std::fs::write(path, output).map_err(|e| fail(e.into()))?;
        self.observer.on_event(&BuildEvent::FileWritten {
            stage: Stage::Fields,
            path: path.to_path_buf(),
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::RecordingObserver;

    fn ecs_table() -> SchemaTable {
        let mut table = SchemaTable::new();
        table.insert(
            "ecs",
            vec![
                FieldDefinition::group(
                    "source",
                    vec![
                        FieldDefinition::leaf("ip", "ip")
                            .with_description("IP address of the source."),
                        FieldDefinition::group(
                            "geo",
                            vec![FieldDefinition::leaf("location", "geo_point")],
                        ),
                    ],
                ),
                FieldDefinition::leaf("message", "match_only_text")
                    .with_description("Log message.")
                    .with_multi_field(FieldDefinition::leaf("text", "text")),
            ],
        );
        table
    }

    #[test]
    fn test_inject_imports_nested_reference() {
        let defs = vec![FieldDefinition::group(
            "source",
            vec![FieldDefinition::external("ip", "ecs")],
        )];

        let (out, changed) = inject(&ecs_table(), defs).unwrap();
        assert!(changed);
        assert_eq!(
            out,
            vec![FieldDefinition::group(
                "source",
                vec![FieldDefinition::leaf("ip", "ip").with_description("IP address of the source.")],
            )]
        );
    }

    #[test]
    fn test_inject_identity_without_references() {
        let mut custom = FieldDefinition::leaf("nginx.access.time", "date");
        custom
            .extra
            .insert("format".into(), "strict_date_optional_time".into());
        let defs = vec![custom, FieldDefinition::group("source", vec![FieldDefinition::leaf("port", "long")])];

        let (out, changed) = inject(&ecs_table(), defs.clone()).unwrap();
        assert!(!changed);
        assert_eq!(out, defs);
    }

    #[test]
    fn test_inject_is_idempotent() {
        let defs = vec![FieldDefinition::external("message", "ecs")];
        let (once, _) = inject(&ecs_table(), defs).unwrap();
        let (twice, changed) = inject(&ecs_table(), once.clone()).unwrap();
        assert!(!changed);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_inject_drops_extra_attributes_and_keeps_multi_fields() {
        let mut reference = FieldDefinition::external("message", "ecs");
        reference.extra.insert("example".into(), "GET /".into());

        let (out, _) = inject(&ecs_table(), vec![reference]).unwrap();
        let message = &out[0];
        assert!(message.extra.is_empty());
        assert!(message.external.is_none());
        assert_eq!(message.description.as_deref(), Some("Log message."));
        assert_eq!(message.multi_fields, vec![FieldDefinition::leaf("text", "text")]);
    }

    #[test]
    fn test_inject_dotted_local_name() {
        let defs = vec![FieldDefinition::group(
            "source",
            vec![FieldDefinition::external("geo.location", "ecs")],
        )];
        let (out, _) = inject(&ecs_table(), defs).unwrap();
        assert_eq!(out[0].fields[0].name, "geo.location");
        assert_eq!(out[0].fields[0].field_type.as_deref(), Some("geo_point"));
    }

    #[test]
    fn test_inject_preserves_sibling_order() {
        let defs = vec![
            FieldDefinition::leaf("a", "keyword"),
            FieldDefinition::external("message", "ecs"),
            FieldDefinition::leaf("z", "keyword"),
        ];
        let (out, _) = inject(&ecs_table(), defs).unwrap();
        let names: Vec<_> = out.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "message", "z"]);
    }

    #[test]
    fn test_inject_unknown_schema() {
        let defs = vec![FieldDefinition::external("ip", "otel")];
        assert!(matches!(
            inject(&ecs_table(), defs),
            Err(InjectError::UndefinedSchema(s)) if s == "otel"
        ));
    }

    #[test]
    fn test_inject_missing_field_names_path() {
        let defs = vec![FieldDefinition::group(
            "source",
            vec![FieldDefinition::external("port", "ecs")],
        )];
        match inject(&ecs_table(), defs) {
            Err(InjectError::FieldNotFound { path, .. }) => assert_eq!(path, "source.port"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_inject_rejects_invalid_definitions() {
        let mut reference = FieldDefinition::external("source", "ecs");
        reference.fields.push(FieldDefinition::leaf("ip", "ip"));
        assert!(matches!(
            inject(&ecs_table(), vec![reference]),
            Err(InjectError::Validation(_))
        ));
    }

    #[test]
    fn test_stage_rewrites_only_changed_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let ecs = root.join("data_stream/access/fields/ecs.yml");
        let base = root.join("fields/base-fields.yml");
        std::fs::create_dir_all(ecs.parent().unwrap()).unwrap();
        std::fs::create_dir_all(base.parent().unwrap()).unwrap();
        std::fs::write(&ecs, "- name: source.ip\n  external: ecs\n- name: message\n  external: ecs\n").unwrap();
        let base_yaml = "- name: data_stream.type\n  type: constant_keyword\n";
        std::fs::write(&base, base_yaml).unwrap();

        let observer = RecordingObserver::new();
        let table = ecs_table();
        let written = FieldsStage::new(&table, &observer).run(root).unwrap();

        assert_eq!(written, 1);
        assert_eq!(observer.written(Stage::Fields), vec![ecs.clone()]);
        assert_eq!(std::fs::read_to_string(&base).unwrap(), base_yaml);

        let rewritten: Vec<FieldDefinition> =
            serde_yaml::from_str(&std::fs::read_to_string(&ecs).unwrap()).unwrap();
        assert_eq!(rewritten[0].field_type.as_deref(), Some("ip"));
        assert_eq!(rewritten[1].multi_fields.len(), 1);
    }

    #[test]
    fn test_stage_wraps_errors_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fields/ecs.yml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "- name: nope\n  external: ecs\n").unwrap();

        let observer = RecordingObserver::new();
        let table = ecs_table();
        let err = FieldsStage::new(&table, &observer).jobs(4).run(dir.path()).unwrap_err();
        assert_eq!(err.stage, Stage::Fields);
        assert_eq!(err.path, path);
    }
}
