//! Field definition model.
//!
//! Field definitions describe the documents an integration package ships:
//! every entry names a field, its mapping type and optional metadata, and
//! groups nest further definitions under `fields`. The same type is used for
//! the package's own `fields/*.yml` files and for external schemas such as
//! ECS, so definitions can be copied from one into the other.

use serde::{Deserialize, Serialize};

/// Type marker for definitions that only hold children.
pub const GROUP_TYPE: &str = "group";

/// A single field definition, possibly holding nested definitions.
///
/// Attributes without a dedicated member are kept in [`extra`](Self::extra)
/// in their original order, so a fields file can be read, rewritten and
/// written back without losing authoring data.
///
/// # Examples
///
/// ```
/// use pkgbuild_core::FieldDefinition;
///
/// let source = FieldDefinition::group(
///     "source",
///     vec![FieldDefinition::external("ip", "ecs")],
/// );
/// assert!(source.is_group());
/// assert!(source.fields[0].is_external());
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name, relative to the parent group.
    #[serde(default)]
    pub name: String,
    /// Mapping type (`keyword`, `ip`, `group`, ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<String>,
    /// Name of the external schema holding the full definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<String>,
    /// Child definitions of a group.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDefinition>,
    /// Alternate mappings of the same value (e.g. a `text` variant of a
    /// `keyword` field).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub multi_fields: Vec<FieldDefinition>,
    /// Any other attribute found in the source document.
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

impl FieldDefinition {
    /// Creates a leaf definition with a mapping type.
    pub fn leaf(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: Some(field_type.to_string()),
            ..Default::default()
        }
    }

    /// Creates a group holding `fields`.
    pub fn group(name: &str, fields: Vec<FieldDefinition>) -> Self {
        Self {
            name: name.to_string(),
            field_type: Some(GROUP_TYPE.to_string()),
            fields,
            ..Default::default()
        }
    }

    /// Creates a reference to a definition living in the `schema` schema.
    pub fn external(name: &str, schema: &str) -> Self {
        Self {
            name: name.to_string(),
            external: Some(schema.to_string()),
            ..Default::default()
        }
    }

    /// Adds a description.
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Adds a multi-field.
    pub fn with_multi_field(mut self, multi_field: FieldDefinition) -> Self {
        self.multi_fields.push(multi_field);
        self
    }

    /// Returns `true` when the definition holds children or is typed as a
    /// group.
    pub fn is_group(&self) -> bool {
        !self.fields.is_empty() || self.field_type.as_deref() == Some(GROUP_TYPE)
    }

    /// Returns `true` when the definition must be resolved from an external
    /// schema.
    pub fn is_external(&self) -> bool {
        self.external.is_some()
    }

    /// Returns `true` if this definition or any descendant still carries an
    /// `external` marker.
    pub fn has_external_references(&self) -> bool {
        self.is_external()
            || self.fields.iter().any(Self::has_external_references)
            || self.multi_fields.iter().any(Self::has_external_references)
    }
}
