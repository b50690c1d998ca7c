//! Saved-object field encoding.
//!
//! Kibana stores some saved-object attributes as JSON-encoded strings.
//! Packages keep those attributes as plain JSON so they are readable and
//! diffable; the build encodes them back into strings.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{BuildError, EncodeError, Result, Stage, StageError};
use crate::observer::{BuildEvent, BuildObserver};
use crate::workers::{glob_files, map_files};

/// Attribute holding a dashboard's panels.
const PANELS_ATTRIBUTE: &str = "attributes.panelsJSON";

/// Per-panel object that is itself a saved-object-like document.
const EMBEDDABLE_CONFIG_ATTRIBUTE: &str = "embeddableConfig";

/// Dotted paths of attributes that must be JSON-encoded strings.
pub const ENCODED_ATTRIBUTES: &[&str] = &[
    "attributes.controlGroupInput.ignoreParentSettingsJSON",
    "attributes.controlGroupInput.panelsJSON",
    "attributes.kibanaSavedObjectMeta.searchSourceJSON",
    "attributes.layerListJSON",
    "attributes.mapStateJSON",
    "attributes.optionsJSON",
    "attributes.uiStateJSON",
    "attributes.visState",
    PANELS_ATTRIBUTE,
];

/// Saved-object files, relative to the package root.
pub const SAVED_OBJECT_PATTERN: &str = "kibana/*/*";

/// Encodes the object-valued attributes of a saved object.
///
/// Returns the document as 2-space indented JSON with sorted keys, and
/// whether any attribute was encoded. Attributes that are absent or
/// already strings are left alone, so encoding twice changes nothing.
///
/// # Examples
///
/// ```
/// use pkgbuild::encode_saved_object;
///
/// let (out, changed) = encode_saved_object(br#"{"attributes":{"visState":{"type":"pie"}}}"#).unwrap();
/// assert!(changed);
/// let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
/// assert_eq!(doc["attributes"]["visState"], r#"{"type":"pie"}"#);
/// ```
pub fn encode_saved_object(bytes: &[u8]) -> std::result::Result<(Vec<u8>, bool), EncodeError> {
    let mut doc: Value = serde_json::from_slice(bytes)?;
    let object = doc
        .as_object_mut()
        .ok_or_else(|| EncodeError::UnexpectedShape("saved object is not a JSON object".into()))?;

    let changed = encode_object(object)?;
    Ok((serde_json::to_vec_pretty(&doc)?, changed))
}

fn encode_object(object: &mut Map<String, Value>) -> std::result::Result<bool, EncodeError> {
    let mut changed = encode_embedded_panels(object)?;

    for path in ENCODED_ATTRIBUTES {
        let Some(value) = get_path_mut(object, path) else {
            continue;
        };
        if value.is_string() {
            continue;
        }
        *value = Value::String(serde_json::to_string(&*value)?);
        changed = true;
    }
    Ok(changed)
}

/// Encodes the `embeddableConfig` of every panel, which may hold the same
/// attributes as a top-level saved object.
fn encode_embedded_panels(object: &mut Map<String, Value>) -> std::result::Result<bool, EncodeError> {
    let panels = match get_path_mut(object, PANELS_ATTRIBUTE) {
        None => return Ok(false),
        Some(Value::String(_)) => return Ok(false),
        Some(Value::Array(panels)) => panels,
        Some(other) => {
            return Err(EncodeError::UnexpectedShape(format!(
                "expected list of panels, found {}",
                kind(other)
            )));
        }
    };

    let mut changed = false;
    for panel in panels.iter_mut() {
        let panel = panel.as_object_mut().ok_or_else(|| {
            EncodeError::UnexpectedShape("expected panel in object format".into())
        })?;
        let Some(config) = panel.get_mut(EMBEDDABLE_CONFIG_ATTRIBUTE) else {
            continue;
        };
        let config = match config {
            Value::Object(config) => config,
            other => {
                return Err(EncodeError::UnexpectedShape(format!(
                    "embeddable config is not an object, found {}",
                    kind(other)
                )));
            }
        };
        changed |= encode_object(config)?;
    }
    Ok(changed)
}

fn get_path_mut<'a>(object: &'a mut Map<String, Value>, path: &str) -> Option<&'a mut Value> {
    let mut segments = path.split('.');
    let mut current = object.get_mut(segments.next()?)?;
    for segment in segments {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    Some(current)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Encodes the saved objects of a built package.
pub struct SavedObjectsStage<'a> {
    observer: &'a dyn BuildObserver,
    jobs: usize,
}

impl<'a> SavedObjectsStage<'a> {
    pub fn new(observer: &'a dyn BuildObserver) -> Self {
        Self { observer, jobs: 1 }
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Rewrites the saved objects below `build_root` that had object-valued
    /// attributes. Returns the number of files written.
    pub fn run(&self, build_root: &Path) -> Result<usize> {
        self.observer.on_event(&BuildEvent::StageStarted(Stage::SavedObjects));

        let files = glob_files(Stage::SavedObjects, build_root, &[SAVED_OBJECT_PATTERN])?;
        let written = map_files(&files, self.jobs, |path| self.rewrite(path))?
            .into_iter()
            .filter(|written| *written)
            .count();

        self.observer.on_event(&BuildEvent::StageFinished {
            stage: Stage::SavedObjects,
            written,
        });
        Ok(written)
    }

    fn rewrite(&self, path: &Path) -> Result<bool> {
        let fail = |source: StageError| BuildError {
            stage: Stage::SavedObjects,
            path: path.to_path_buf(),
            source,
        };

        let content = std::fs::read(path).map_err(|e| fail(e.into()))?;
        let (output, changed) = encode_saved_object(&content).map_err(|e| fail(e.into()))?;
        if !changed {
            self.observer.on_event(&BuildEvent::FileUnchanged {
                stage: Stage::SavedObjects,
                path: path.to_path_buf(),
            });
            return Ok(false);
        }

        std::fs::write(path, output).map_err(|e| fail(e.into()))?;
        self.observer.on_event(&BuildEvent::FileWritten {
            stage: Stage::SavedObjects,
            path: path.to_path_buf(),
        });
        Ok(true)
    }
}
