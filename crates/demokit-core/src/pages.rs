//! The ordered page registry.
//!
//! Every name that the entry map and the HTML artifacts derive from a page
//! goes through the functions here, so the two generators cannot drift.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// One named unit of the demo site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Page {
    pub id: String,
}

impl Page {
    /// Lowercased id, used for the namespaced output directory.
    #[must_use]
    pub fn slug(&self) -> String {
        self.id.to_lowercase()
    }
}

/// Bundle name for a page id: the fixed prefix followed by the id.
#[must_use]
pub fn bundle_name(prefix: &str, id: &str) -> String {
    format!("{prefix}{id}")
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Ordered, immutable list of pages. The first page is the index page.
#[derive(Debug, Clone)]
pub struct PageRegistry {
    pages: Vec<Page>,
    bundle_prefix: String,
    pages_dir: PathBuf,
}

impl PageRegistry {
    /// Build a registry from page ids in declaration order.
    ///
    /// Ids may only contain ASCII letters, digits, `_` and `-`, since they
    /// end up in file names, URLs and generated markup unescaped. Rejects an
    /// empty list, malformed ids and repeated ids.
    pub fn new<I, S>(ids: I, bundle_prefix: impl Into<String>, pages_dir: impl Into<PathBuf>) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut pages = Vec::new();

        for id in ids {
            let id: String = id.into();
            if !is_valid_id(&id) {
                return Err(Error::InvalidPageId { id });
            }
            if !seen.insert(id.clone()) {
                return Err(Error::DuplicatePage { id });
            }
            pages.push(Page { id });
        }

        if pages.is_empty() {
            return Err(Error::EmptyRegistry);
        }

        Ok(Self {
            pages,
            bundle_prefix: bundle_prefix.into(),
            pages_dir: pages_dir.into(),
        })
    }

    /// Pages in declaration order.
    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// The index page.
    #[must_use]
    pub fn index_page(&self) -> &Page {
        &self.pages[0]
    }

    /// Whether `page` is the index page.
    #[must_use]
    pub fn is_index(&self, page: &Page) -> bool {
        self.index_page() == page
    }

    /// Page ids in declaration order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.pages.iter().map(|p| p.id.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    #[must_use]
    pub fn bundle_prefix(&self) -> &str {
        &self.bundle_prefix
    }

    /// Bundle name of `page`. Both generators use this.
    #[must_use]
    pub fn bundle_name(&self, page: &Page) -> String {
        bundle_name(&self.bundle_prefix, &page.id)
    }

    /// `<pages_dir>/<Id>/<Id>.js`
    #[must_use]
    pub fn source_path(&self, page: &Page) -> PathBuf {
        self.page_file(page, "js")
    }

    /// `<pages_dir>/<Id>/<Id>.html`
    #[must_use]
    pub fn template_path(&self, page: &Page) -> PathBuf {
        self.page_file(page, "html")
    }

    /// Fail if any declared page lacks its template or source under `root`.
    pub fn check_files(&self, root: &Path) -> Result<(), Error> {
        for page in &self.pages {
            for (kind, rel) in [
                ("template", self.template_path(page)),
                ("source", self.source_path(page)),
            ] {
                let path = root.join(&rel);
                if !path.is_file() {
                    return Err(Error::PageFileMissing {
                        page: page.id.clone(),
                        kind,
                        path,
                    });
                }
            }
        }
        Ok(())
    }

    fn page_file(&self, page: &Page, ext: &str) -> PathBuf {
        self.pages_dir
            .join(&page.id)
            .join(format!("{}.{ext}", page.id))
    }
}
