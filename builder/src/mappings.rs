//! ECS dynamic mapping injection.
//!
//! Packages that opt in through `import_mappings` get the bundled ECS
//! dynamic templates appended to the index template of every manifest that
//! declares one. Template names are prefixed with `_embedded_ecs-` so they
//! cannot clash with templates the package defines itself.

use std::path::{Path, PathBuf};

use pkgbuild_core::tree::{self, Node, TreeError};
use pkgbuild_core::{MANIFEST_FILE, PackageType};

use crate::error::{BuildError, Result, Stage, StageError};
use crate::observer::{BuildEvent, BuildObserver};
use crate::workers::{glob_files, map_files};

/// Prefix added to the name of every bundled dynamic template.
pub const TEMPLATE_NAME_PREFIX: &str = "_embedded_ecs";

/// Where dynamic templates live in a manifest.
pub const DYNAMIC_TEMPLATES_PATH: [&str; 4] = [
    "elasticsearch",
    "index_template",
    "mappings",
    "dynamic_templates",
];

/// Where explicit mapping properties live in a manifest.
pub const PROPERTIES_PATH: [&str; 4] = ["elasticsearch", "index_template", "mappings", "properties"];

const BUNDLED_ECS_MAPPINGS: &str = include_str!("../static/ecs_mappings.yml");

const DATA_STREAM_MANIFEST_PATTERN: &str = "data_stream/*/manifest.yml";

/// Dynamic templates and properties to add to index templates.
#[derive(Debug, Clone, PartialEq)]
pub struct EcsMappings {
    /// Sequence of single-key `{name: template}` mappings.
    pub dynamic_templates: Node,
    /// Mapping of field name to mapping definition.
    pub properties: Node,
}

impl EcsMappings {
    /// Mappings shipped with this crate.
    pub fn bundled() -> std::result::Result<Self, TreeError> {
        Self::parse(BUNDLED_ECS_MAPPINGS.as_bytes())
    }

    /// Reads `mappings.dynamic_templates` and `mappings.properties` from a
    /// YAML document, prefixing template names.
    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, TreeError> {
        let doc = tree::parse(bytes)?;
        let templates = doc
            .lookup(&["mappings", "dynamic_templates"])
            .cloned()
            .unwrap_or_else(Node::sequence);
        let properties = doc
            .lookup(&["mappings", "properties"])
            .cloned()
            .unwrap_or_else(Node::mapping);

        Ok(Self {
            dynamic_templates: prefix_template_names(templates),
            properties,
        })
    }

    /// Names of the dynamic templates, in order.
    pub fn template_names(&self) -> Vec<&str> {
        self.dynamic_templates
            .as_sequence()
            .unwrap_or_default()
            .iter()
            .flat_map(Node::keys)
            .collect()
    }
}

fn prefix_template_names(templates: Node) -> Node {
    match templates {
        Node::Sequence(items) => Node::Sequence(items.into_iter().map(prefix_template_names).collect()),
        Node::Mapping(entries) => Node::Mapping(
            entries
                .into_iter()
                .map(|(name, template)| (format!("{TEMPLATE_NAME_PREFIX}-{name}"), template))
                .collect(),
        ),
        other => other,
    }
}

fn is_empty(node: &Node) -> bool {
    match node {
        Node::Sequence(items) => items.is_empty(),
        Node::Mapping(entries) => entries.is_empty(),
        Node::Document(inner) => is_empty(inner),
        Node::Scalar(_) => false,
    }
}

/// Appends `templates` to the manifest's dynamic templates and merges
/// `properties` into its mapping properties.
///
/// Missing intermediate nodes are created; a missing `dynamic_templates`
/// node becomes a sequence. Existing templates and properties are kept, and
/// a property already present is not overwritten. Empty `properties` leave
/// the document's properties untouched.
///
/// # Examples
///
/// ```
/// use pkgbuild::inject_mappings;
/// use pkgbuild_core::tree::{self, Node};
///
/// let mut doc = tree::parse(b"title: access logs\n").unwrap();
/// let templates = tree::parse(b"- strings_as_keyword:\n    match_mapping_type: string\n").unwrap();
/// inject_mappings(&mut doc, templates, Node::mapping()).unwrap();
///
/// let names = doc
///     .lookup(&["elasticsearch", "index_template", "mappings", "dynamic_templates", "0"])
///     .unwrap()
///     .keys();
/// assert_eq!(names, vec!["strings_as_keyword"]);
/// ```
pub fn inject_mappings(
    doc: &mut Node,
    templates: Node,
    properties: Node,
) -> std::result::Result<(), TreeError> {
    let target = tree::navigate(doc, &DYNAMIC_TEMPLATES_PATH)?;
    tree::splice(target, templates)?;

    if !is_empty(&properties) {
        let target = tree::navigate(doc, &PROPERTIES_PATH)?;
        tree::splice(target, properties)?;
    }
    Ok(())
}

/// Adds ECS dynamic mappings to the manifests of a built package.
pub struct MappingsStage<'a> {
    mappings: &'a EcsMappings,
    observer: &'a dyn BuildObserver,
    jobs: usize,
}

impl<'a> MappingsStage<'a> {
    pub fn new(mappings: &'a EcsMappings, observer: &'a dyn BuildObserver) -> Self {
        Self {
            mappings,
            observer,
            jobs: 1,
        }
    }

    /// Number of manifests processed concurrently.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Manifests receiving mappings: every data stream manifest, plus the
    /// package manifest of input packages.
    pub fn targets(&self, build_root: &Path, package_type: PackageType) -> Result<Vec<PathBuf>> {
        let mut targets = glob_files(Stage::Mappings, build_root, &[DATA_STREAM_MANIFEST_PATTERN])?;
        if !package_type.has_entity_manifests() {
            targets.push(build_root.join(MANIFEST_FILE));
        }
        Ok(targets)
    }

    /// Rewrites the target manifests below `build_root`. Returns the number
    /// of manifests written.
    pub fn run(&self, build_root: &Path, package_type: PackageType) -> Result<usize> {
        self.observer.on_event(&BuildEvent::StageStarted(Stage::Mappings));

        let targets = self.targets(build_root, package_type)?;
        let written = map_files(&targets, self.jobs, |path| self.rewrite(path))?.len();

        self.observer.on_event(&BuildEvent::StageFinished {
            stage: Stage::Mappings,
            written,
        });
        Ok(written)
    }

    fn rewrite(&self, path: &Path) -> Result<()> {
        let fail = |source: StageError| BuildError {
            stage: Stage::Mappings,
            path: path.to_path_buf(),
            source,
        };

        let content = std::fs::read(path).map_err(|e| fail(e.into()))?;
        let mut doc = tree::parse(&content).map_err(|e| fail(e.into()))?;
        inject_mappings(
            &mut doc,
            self.mappings.dynamic_templates.clone(),
            self.mappings.properties.clone(),
        )
        .map_err(|e| fail(e.into()))?;
        let output = tree::encode(&doc).map_err(|e| fail(e.into()))?;
        std::fs::write(path, output).map_err(|e| fail(e.into()))?;

        self.observer.on_event(&BuildEvent::FileWritten {
            stage: Stage::Mappings,
            path: path.to_path_buf(),
        });
        Ok(())
    }
}
