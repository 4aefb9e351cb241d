//! Built resource handles

use std::fmt;

/// One resource parsed out of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub name: String,
    pub kind: String,
    pub namespace: Option<String>,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} in {ns}", self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Set of resources produced by one `build` call, applied and awaited as a
/// unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSet {
    resources: Vec<ResourceRef>,
}

impl ResourceSet {
    #[must_use]
    pub fn new(resources: Vec<ResourceRef>) -> Self {
        Self { resources }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResourceRef> {
        self.resources.iter()
    }

    /// Resource names in manifest order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.resources.iter().map(|r| r.name.clone()).collect()
    }

    /// Merge another set into this one, keeping order.
    pub fn extend(&mut self, other: ResourceSet) {
        self.resources.extend(other.resources);
    }
}

impl<'a> IntoIterator for &'a ResourceSet {
    type Item = &'a ResourceRef;
    type IntoIter = std::slice::Iter<'a, ResourceRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
