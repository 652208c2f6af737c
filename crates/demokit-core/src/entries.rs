//! Bundle entry map generation.

use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::config::LibraryEntry;
use crate::error::Error;
use crate::pages::PageRegistry;

/// A named starting point for the bundler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryDescriptor {
    pub bundle_name: String,
    /// Source module, relative to the project root.
    pub source_path: PathBuf,
    /// Page id this entry was derived from; `None` for the library entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}

/// Ordered entries: one per page in registry order, then the library entry.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct EntryMap {
    entries: Vec<EntryDescriptor>,
}

impl EntryMap {
    /// Derive the entry map from the registry and merge in the library entry.
    ///
    /// A bundle name produced twice is a configuration error; nothing is
    /// overwritten.
    pub fn generate(registry: &PageRegistry, library: &LibraryEntry) -> Result<Self, Error> {
        let page_entries = registry.pages().iter().map(|page| EntryDescriptor {
            bundle_name: registry.bundle_name(page),
            source_path: registry.source_path(page),
            page: Some(page.id.clone()),
        });
        let library_entry = EntryDescriptor {
            bundle_name: library.name.clone(),
            source_path: library.entry.clone(),
            page: None,
        };

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(registry.len() + 1);
        for entry in page_entries.chain(std::iter::once(library_entry)) {
            if !seen.insert(entry.bundle_name.clone()) {
                return Err(Error::DuplicateBundleName {
                    name: entry.bundle_name,
                });
            }
            entries.push(entry);
        }

        Ok(Self { entries })
    }

    #[must_use]
    pub fn entries(&self) -> &[EntryDescriptor] {
        &self.entries
    }

    /// Look up an entry by bundle name.
    #[must_use]
    pub fn get(&self, bundle_name: &str) -> Option<&EntryDescriptor> {
        self.entries.iter().find(|e| e.bundle_name == bundle_name)
    }

    /// The entry derived from page `id`.
    #[must_use]
    pub fn for_page(&self, id: &str) -> Option<&EntryDescriptor> {
        self.entries.iter().find(|e| e.page.as_deref() == Some(id))
    }

    /// Bundle names in entry order.
    pub fn bundle_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.bundle_name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> LibraryEntry {
        LibraryEntry {
            name: "Checkout".to_string(),
            entry: PathBuf::from("src/index.ts"),
        }
    }

    #[test]
    fn test_entries_for_two_pages() {
        let reg = PageRegistry::new(["Dropin", "Card"], "X-", "playground").unwrap();
        let map = EntryMap::generate(&reg, &library()).unwrap();

        let names: Vec<&str> = map.bundle_names().collect();
        assert_eq!(names, vec!["X-Dropin", "X-Card", "Checkout"]);
        assert_eq!(
            map.get("X-Card").unwrap().source_path,
            PathBuf::from("playground/Card/Card.js")
        );
        assert_eq!(map.get("Checkout").unwrap().page, None);
    }

    #[test]
    fn test_page_colliding_with_library_is_rejected() {
        let reg = PageRegistry::new(["Dropin", "Checkout"], "", "playground").unwrap();
        let err = EntryMap::generate(&reg, &library()).unwrap_err();
        assert!(matches!(err, Error::DuplicateBundleName { name } if name == "Checkout"));
    }

    #[test]
    fn test_one_entry_per_page_plus_library() {
        let ids = ["A", "B", "C", "D"];
        let reg = PageRegistry::new(ids, "Demo", "pages").unwrap();
        let map = EntryMap::generate(&reg, &library()).unwrap();
        assert_eq!(map.len(), ids.len() + 1);
        for id in ids {
            assert_eq!(map.for_page(id).unwrap().bundle_name, format!("Demo{id}"));
        }
    }
}
