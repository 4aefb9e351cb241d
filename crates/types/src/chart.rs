//! Chart tree and dependency declaration types

use std::collections::BTreeMap;
use std::fmt;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::DEPENDS_ON_ANNOTATION;

/// Descriptive metadata of a single installable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    pub name: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    /// Free-form annotations; ordering declarations live under
    /// [`DEPENDS_ON_ANNOTATION`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Structured references to the chart's direct sub-units.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyRef>,
}

impl ChartMetadata {
    /// Create metadata with just a name and version.
    ///
    /// # Panics
    ///
    /// Panics if `version` is not a valid semantic version. Intended for
    /// literal versions; parse user input with `Version::parse` instead.
    #[must_use]
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: Version::parse(version).expect("valid semantic version literal"),
            description: None,
            app_version: None,
            annotations: BTreeMap::new(),
            dependencies: Vec::new(),
        }
    }

    /// Names listed in the depends-on annotation, trimmed, empties dropped.
    #[must_use]
    pub fn depends_on_annotation(&self) -> Vec<String> {
        self.annotations
            .get(DEPENDS_ON_ANNOTATION)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One entry of a chart's `dependencies` list: a named reference to a direct
/// sub-unit plus the sibling names that must be ready before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionReq>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl DependencyRef {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: None,
            depends_on: Vec::new(),
        }
    }

    /// Add a sibling that must be ready before this sub-unit installs.
    #[must_use]
    pub fn depends_on(mut self, name: &str) -> Self {
        self.depends_on.push(name.to_string());
        self
    }
}

/// An installable unit: metadata plus the trees of its direct sub-units.
///
/// Resource templates and values are owned by the rendering layer; the
/// deployment core only needs the tree shape and the ordering declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub metadata: ChartMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_charts: Vec<Chart>,
}

impl Chart {
    #[must_use]
    pub fn new(metadata: ChartMetadata) -> Self {
        Self {
            metadata,
            sub_charts: Vec::new(),
        }
    }

    /// Attach a direct sub-unit.
    #[must_use]
    pub fn with_sub_chart(mut self, chart: Chart) -> Self {
        self.sub_charts.push(chart);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Find a direct sub-unit by name.
    #[must_use]
    pub fn sub_chart(&self, name: &str) -> Option<&Chart> {
        self.sub_charts.iter().find(|c| c.metadata.name == name)
    }

    /// Whether this chart declares an ordering graph over its own sub-units.
    #[must_use]
    pub fn has_dependency_graph(&self) -> bool {
        !self.metadata.dependencies.is_empty()
    }
}

impl fmt::Display for Chart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.metadata.name, self.metadata.version)
    }
}
