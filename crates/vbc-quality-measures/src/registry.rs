//! Append-only registries for code sets and measure definitions
//!
//! Publishing never replaces content: a name/version pair, once published,
//! resolves to the same value forever. Republishing identical content is a
//! no-op; different content under an existing version is rejected. Every
//! successful publication bumps the registry generation, which runs pin to
//! detect concurrent changes.

use crate::code_set::{CodeSet, CodeSetRef};
use crate::definition::MeasureDefinition;
use crate::error::{MeasureError, RegistryResult};
use chrono::NaiveDate;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
struct CodeSetTable {
    /// name -> version -> set, versions in publication order
    sets: IndexMap<String, IndexMap<String, Arc<CodeSet>>>,
    generation: u64,
}

/// Registry of named, versioned code sets
#[derive(Default)]
pub struct CodeSetRegistry {
    inner: RwLock<CodeSetTable>,
}

impl CodeSetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a code set version
    pub fn publish(&self, code_set: CodeSet) -> RegistryResult<Arc<CodeSet>> {
        let problems = code_set.problems();
        if !problems.is_empty() {
            return Err(MeasureError::malformed(
                code_set.reference().to_string(),
                problems.join("; "),
            ));
        }

        let mut table = self.inner.write();
        let versions = table.sets.entry(code_set.name.clone()).or_default();
        if let Some(existing) = versions.get(&code_set.version) {
            if **existing == code_set {
                return Ok(Arc::clone(existing));
            }
            return Err(MeasureError::conflicting(
                "Code set",
                &code_set.name,
                &code_set.version,
            ));
        }

        log::info!(
            "Published code set {} ({} entries)",
            code_set.reference(),
            code_set.len()
        );
        let published = Arc::new(code_set);
        versions.insert(published.version.clone(), Arc::clone(&published));
        table.generation += 1;
        Ok(published)
    }

    /// Resolve a pinned code set version
    pub fn resolve(&self, name: &str, version: &str) -> RegistryResult<Arc<CodeSet>> {
        self.inner
            .read()
            .sets
            .get(name)
            .and_then(|versions| versions.get(version))
            .cloned()
            .ok_or_else(|| MeasureError::unknown_code_set(name, Some(version.to_string())))
    }

    pub fn resolve_ref(&self, reference: &CodeSetRef) -> RegistryResult<Arc<CodeSet>> {
        self.resolve(&reference.name, &reference.version)
    }

    /// Most recently published version of `name`
    pub fn latest(&self, name: &str) -> RegistryResult<Arc<CodeSet>> {
        self.inner
            .read()
            .sets
            .get(name)
            .and_then(|versions| versions.values().next_back())
            .cloned()
            .ok_or_else(|| MeasureError::unknown_code_set(name, None))
    }

    /// Published versions of `name`, oldest first
    pub fn versions(&self, name: &str) -> Vec<String> {
        self.inner
            .read()
            .sets
            .get(name)
            .map(|versions| versions.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.read().sets.keys().cloned().collect()
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }
}

#[derive(Default)]
struct DefinitionTable {
    /// id -> version -> definition
    definitions: IndexMap<String, BTreeMap<u32, Arc<MeasureDefinition>>>,
    generation: u64,
}

/// Registry of versioned measure definitions
#[derive(Default)]
pub struct MeasureRegistry {
    inner: RwLock<DefinitionTable>,
}

impl MeasureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a definition version after validating it
    pub fn publish(&self, definition: MeasureDefinition) -> RegistryResult<Arc<MeasureDefinition>> {
        definition.validate()?;

        let mut table = self.inner.write();
        let versions = table.definitions.entry(definition.id.clone()).or_default();
        if let Some(existing) = versions.get(&definition.version) {
            if **existing == definition {
                return Ok(Arc::clone(existing));
            }
            return Err(MeasureError::conflicting(
                "Measure",
                &definition.id,
                definition.version,
            ));
        }

        log::info!("Published measure definition {}", definition);
        let published = Arc::new(definition);
        versions.insert(published.version, Arc::clone(&published));
        table.generation += 1;
        Ok(published)
    }

    /// A specific version
    pub fn get(&self, id: &str, version: u32) -> RegistryResult<Arc<MeasureDefinition>> {
        self.inner
            .read()
            .definitions
            .get(id)
            .and_then(|versions| versions.get(&version))
            .cloned()
            .ok_or_else(|| MeasureError::unknown_measure(id, Some(version)))
    }

    /// Highest published version
    pub fn latest(&self, id: &str) -> RegistryResult<Arc<MeasureDefinition>> {
        self.inner
            .read()
            .definitions
            .get(id)
            .and_then(|versions| versions.values().next_back())
            .cloned()
            .ok_or_else(|| MeasureError::unknown_measure(id, None))
    }

    /// Highest version of `id` effective on `date`
    pub fn effective(&self, id: &str, date: NaiveDate) -> RegistryResult<Arc<MeasureDefinition>> {
        let table = self.inner.read();
        let versions = table
            .definitions
            .get(id)
            .ok_or_else(|| MeasureError::unknown_measure(id, None))?;
        if let Some(found) = versions.values().rev().find(|d| d.is_effective_on(date)) {
            return Ok(Arc::clone(found));
        }
        match versions.values().next_back() {
            Some(latest) => {
                latest.ensure_effective_on(date)?;
                Ok(Arc::clone(latest))
            }
            None => Err(MeasureError::unknown_measure(id, None)),
        }
    }

    /// For every measure id, the highest version effective on `date`, in
    /// publication order of the ids
    pub fn active(&self, date: NaiveDate) -> Vec<Arc<MeasureDefinition>> {
        self.inner
            .read()
            .definitions
            .values()
            .filter_map(|versions| versions.values().rev().find(|d| d.is_effective_on(date)))
            .cloned()
            .collect()
    }

    /// Published version numbers of `id`, ascending
    pub fn versions(&self, id: &str) -> Vec<u32> {
        self.inner
            .read()
            .definitions
            .get(id)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn ids(&self) -> Vec<String> {
        self.inner.read().definitions.keys().cloned().collect()
    }

    /// The latest version of every measure, in publication order
    pub fn all_latest(&self) -> Vec<Arc<MeasureDefinition>> {
        self.inner
            .read()
            .definitions
            .values()
            .filter_map(|versions| versions.values().next_back())
            .cloned()
            .collect()
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mammography(version: &str) -> CodeSet {
        CodeSet::new("mammography", version).exact("77067").exact("77066")
    }

    #[test]
    fn test_publish_and_resolve() {
        let registry = CodeSetRegistry::new();
        registry.publish(mammography("2024")).unwrap();
        registry.publish(mammography("2025").exact("77065")).unwrap();

        assert_eq!(registry.resolve("mammography", "2024").unwrap().len(), 2);
        assert_eq!(registry.latest("mammography").unwrap().version, "2025");
        assert_eq!(registry.versions("mammography"), vec!["2024", "2025"]);
        assert_eq!(registry.generation(), 2);
    }

    #[test]
    fn test_unknown_code_set() {
        let registry = CodeSetRegistry::new();
        registry.publish(mammography("2024")).unwrap();

        assert!(matches!(
            registry.resolve("mammography", "2023"),
            Err(MeasureError::UnknownCodeSet { .. })
        ));
        assert!(matches!(
            registry.latest("colonoscopy"),
            Err(MeasureError::UnknownCodeSet { version: None, .. })
        ));
    }

    #[test]
    fn test_republication_rules() {
        let registry = CodeSetRegistry::new();
        registry.publish(mammography("2024")).unwrap();

        assert!(registry.publish(mammography("2024")).is_ok());
        assert_eq!(registry.generation(), 1);

        let err = registry
            .publish(mammography("2024").exact("G0202"))
            .unwrap_err();
        assert!(matches!(err, MeasureError::ConflictingPublication { .. }));
        assert_eq!(registry.resolve("mammography", "2024").unwrap().len(), 2);
    }

    #[test]
    fn test_malformed_code_set_rejected() {
        let registry = CodeSetRegistry::new();
        let err = registry.publish(CodeSet::new("empty", "1")).unwrap_err();
        assert!(matches!(err, MeasureError::MalformedDefinition { .. }));
        assert_eq!(registry.generation(), 0);
    }
}
