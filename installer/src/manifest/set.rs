//! Identifier-keyed manifest collections.

use super::error::{ManifestError, Result};
use super::identifier::ManifestId;
use super::model::Manifest;
use std::collections::BTreeMap;

/// A set of manifests in which every identifier is unique.
///
/// Passed by reference wherever manifests are looked up by identifier, so
/// there is no process-wide registry.
#[derive(Debug, Clone, Default)]
pub struct ManifestSet {
    by_id: BTreeMap<ManifestId, Manifest>,
}

impl ManifestSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a manifest, rejecting duplicate identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::DuplicateManifest`] when a manifest with the
    /// same identifier is already present.
    pub fn insert(&mut self, manifest: Manifest) -> Result<()> {
        if self.by_id.contains_key(manifest.id()) {
            return Err(ManifestError::DuplicateManifest {
                id: manifest.id().to_string(),
            });
        }
        self.by_id.insert(manifest.id().clone(), manifest);
        Ok(())
    }

    /// Look up a manifest by identifier.
    #[must_use]
    pub fn get(&self, id: &ManifestId) -> Option<&Manifest> {
        self.by_id.get(id)
    }

    /// Return the number of manifests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Return `true` when the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterate over manifests in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &Manifest> {
        self.by_id.values()
    }
}

impl TryFrom<Vec<Manifest>> for ManifestSet {
    type Error = ManifestError;

    fn try_from(manifests: Vec<Manifest>) -> Result<Self> {
        let mut set = Self::new();
        for manifest in manifests {
            set.insert(manifest)?;
        }
        Ok(set)
    }
}
