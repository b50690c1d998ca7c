//! Field definition validation.
//!
//! Catches structural problems in a package's field definitions before the
//! build rewrites them: definitions without a name, and external references
//! that also declare their own children.
//!
//! # Examples
//!
//! ```
//! use pkgbuild_core::*;
//!
//! let defs = vec![FieldDefinition::group(
//!     "source",
//!     vec![FieldDefinition::external("ip", "ecs")],
//! )];
//! assert!(validate_fields(&defs).is_empty());
//!
//! // Invalid: an external reference declaring children
//! let mut bad = FieldDefinition::external("source", "ecs");
//! bad.fields.push(FieldDefinition::leaf("ip", "ip"));
//! assert!(!validate_fields(&[bad]).is_empty());
//! ```

use thiserror::Error;

use crate::FieldDefinition;

/// Field definition validation errors.
///
/// Each variant carries the dotted path of the offending definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A definition has an empty or whitespace-only name.
    #[error("field definition without a name under '{0}'")]
    EmptyFieldName(String),
    /// A definition with `external` also declares `fields`.
    #[error("external field '{0}' must not declare its own fields")]
    ExternalWithFields(String),
}

/// Validates a list of field definitions, stopping at the first problem.
pub fn validate_fields(defs: &[FieldDefinition]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    validate_level(defs, "", &mut errors);
    errors
}

fn validate_level(defs: &[FieldDefinition], prefix: &str, errors: &mut Vec<ValidationError>) {
    for def in defs {
        let name = def.name.trim();
        if name.is_empty() {
            let parent = if prefix.is_empty() { "<root>" } else { prefix };
            errors.push(ValidationError::EmptyFieldName(parent.to_string()));
            return;
        }

        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };

        if def.is_external() && !def.fields.is_empty() {
            errors.push(ValidationError::ExternalWithFields(path));
            return;
        }

        validate_level(&def.fields, &path, errors);
        if !errors.is_empty() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_nested_groups() {
        let defs = vec![
            FieldDefinition::leaf("message", "text"),
            FieldDefinition::group(
                "nginx",
                vec![FieldDefinition::group(
                    "access",
                    vec![FieldDefinition::leaf("remote_ip_list", "keyword")],
                )],
            ),
        ];
        assert!(validate_fields(&defs).is_empty());
    }

    #[test]
    fn test_validate_rejects_empty_name_with_parent_path() {
        let defs = vec![FieldDefinition::group(
            "nginx",
            vec![FieldDefinition::leaf("  ", "keyword")],
        )];
        assert_eq!(
            validate_fields(&defs),
            vec![ValidationError::EmptyFieldName("nginx".to_string())]
        );
    }

    #[test]
    fn test_validate_rejects_empty_root_name() {
        let defs = vec![FieldDefinition::leaf("", "keyword")];
        assert_eq!(
            validate_fields(&defs),
            vec![ValidationError::EmptyFieldName("<root>".to_string())]
        );
    }

    #[test]
    fn test_validate_rejects_external_with_fields() {
        let mut external = FieldDefinition::external("geo", "ecs");
        external.fields.push(FieldDefinition::leaf("name", "keyword"));
        let defs = vec![FieldDefinition::group("source", vec![external])];

        assert_eq!(
            validate_fields(&defs),
            vec![ValidationError::ExternalWithFields("source.geo".to_string())]
        );
    }
}
