//! Project configuration loading.
//!
//! Reads `demokit.json` from the project root. Every key is optional; the
//! defaults reproduce the playground layout this tool was written for:
//!
//! ```json
//! {
//!   "pages": ["Dropin", "Card"],
//!   "pagesDir": "playground",
//!   "bundlePrefix": "Demo",
//!   "library": { "name": "Checkout", "entry": "src/index.ts" },
//!   "server": { "host": "0.0.0.0", "port": 3020, "hot": true, "compress": true },
//!   "watch": { "ignored": ["node_modules"], "aggregateTimeoutMs": 200, "pollIntervalMs": 500 },
//!   "mocks": { "/paymentMethods": "mocks/paymentMethods.json" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Config file names in priority order.
const CONFIG_FILES: &[&str] = &["demokit.json", ".demokit.json"];

/// Pages of the stock playground. The first one is served as the site root.
const DEFAULT_PAGES: &[&str] = &[
    "Dropin",
    "Card",
    "Components",
    "SecuredFields",
    "SecuredFieldsPure",
    "IssuerLists",
    "Voucher",
    "QRCode",
    "Giftcards",
    "OpenInvoice",
];

/// Project configuration loaded from `demokit.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    /// Ordered page ids. Index 0 is the index page.
    pub pages: Vec<String>,
    /// Directory holding `<Name>/<Name>.html` and `<Name>/<Name>.js`.
    pub pages_dir: PathBuf,
    /// Library sources.
    pub src_dir: PathBuf,
    /// Demo sources compiled alongside the library.
    pub demo_dir: PathBuf,
    /// Prefix prepended to every page id to form its bundle name.
    pub bundle_prefix: String,
    /// The reserved library entry.
    pub library: LibraryEntry,
    /// Compiler configuration handed to the type-aware compile step.
    pub tsconfig: PathBuf,
    /// Raster images strictly below this many bytes are inlined as data URLs.
    pub inline_limit: u64,
    /// Output name template for copied assets.
    pub asset_name: String,
    /// Dev server settings.
    pub server: ServerSection,
    /// File watching settings.
    pub watch: WatchSection,
    /// Request path → JSON file answered by the built-in mock middleware.
    pub mocks: BTreeMap<String, PathBuf>,
}

/// The library bundle entry, not derived from any page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LibraryEntry {
    /// Bundle name.
    pub name: String,
    /// Source module, relative to the project root.
    pub entry: PathBuf,
}

/// `server` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Live reload (and hot style swap).
    pub hot: bool,
    /// Gzip responses.
    pub compress: bool,
}

/// `watch` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchSection {
    /// Directory names whose trees never trigger a rebuild.
    pub ignored: Vec<String>,
    /// Events are aggregated for this long before a rebuild is signalled.
    pub aggregate_timeout_ms: u64,
    /// Poll interval when the polling watcher is in use.
    pub poll_interval_ms: u64,
    /// Use the polling watcher instead of native events.
    pub poll: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            pages: DEFAULT_PAGES.iter().map(|p| (*p).to_string()).collect(),
            pages_dir: PathBuf::from("playground"),
            src_dir: PathBuf::from("src"),
            demo_dir: PathBuf::from("demo"),
            bundle_prefix: "Demo".to_string(),
            library: LibraryEntry::default(),
            tsconfig: PathBuf::from("tsconfig.json"),
            inline_limit: 10_000,
            asset_name: "static/media/[name].[hash:8].[ext]".to_string(),
            server: ServerSection::default(),
            watch: WatchSection::default(),
            mocks: BTreeMap::new(),
        }
    }
}

impl Default for LibraryEntry {
    fn default() -> Self {
        Self {
            name: "Checkout".to_string(),
            entry: PathBuf::from("src/index.ts"),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            hot: true,
            compress: true,
        }
    }
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            ignored: vec!["node_modules".to_string()],
            aggregate_timeout_ms: 200,
            poll_interval_ms: 500,
            poll: false,
        }
    }
}

/// Find a config file in the given root directory.
#[must_use]
pub fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
}

impl ProjectConfig {
    /// Load the project configuration.
    ///
    /// With `explicit` set, that file must exist. Otherwise the root is
    /// searched and the defaults are used when no file is found. Returns the
    /// path that was read, if any.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<(Option<PathBuf>, Self), Error> {
        let path = match explicit {
            Some(p) if p.is_absolute() => p.to_path_buf(),
            Some(p) => root.join(p),
            None => match find_config_file(root) {
                Some(p) => p,
                None => return Ok((None, Self::default())),
            },
        };

        let source = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&source).map_err(|source| Error::ConfigParse {
            path: path.clone(),
            source,
        })?;

        Ok((Some(path), config))
    }

    /// Parse configuration from JSON text.
    pub fn parse(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_stock_playground() {
        let config = ProjectConfig::default();
        assert_eq!(config.pages.first().map(String::as_str), Some("Dropin"));
        assert_eq!(config.pages.len(), 10);
        assert_eq!(config.inline_limit, 10_000);
        assert_eq!(config.watch.aggregate_timeout_ms, 200);
        assert_eq!(config.watch.poll_interval_ms, 500);
        assert_eq!(config.watch.ignored, vec!["node_modules".to_string()]);
        assert!(config.server.hot);
        assert!(config.server.compress);
    }

    #[test]
    fn test_parse_partial_config_keeps_defaults() {
        let config = ProjectConfig::parse(
            r#"{
                "pages": ["Card", "Voucher"],
                "bundlePrefix": "X-",
                "server": { "port": 4000 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.pages, vec!["Card", "Voucher"]);
        assert_eq!(config.bundle_prefix, "X-");
        assert_eq!(config.server.port, Some(4000));
        assert!(config.server.hot);
        assert_eq!(config.pages_dir, PathBuf::from("playground"));
        assert_eq!(config.library.name, "Checkout");
    }

    #[test]
    fn test_parse_mocks() {
        let config =
            ProjectConfig::parse(r#"{ "mocks": { "/paymentMethods": "mocks/pm.json" } }"#)
                .unwrap();
        assert_eq!(
            config.mocks.get("/paymentMethods"),
            Some(&PathBuf::from("mocks/pm.json"))
        );
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (path, config) = ProjectConfig::load(dir.path(), None).unwrap();
        assert!(path.is_none());
        assert_eq!(config.bundle_prefix, "Demo");
    }

    #[test]
    fn test_load_discovers_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("demokit.json"), r#"{ "pages": ["Only"] }"#).unwrap();

        let (path, config) = ProjectConfig::load(dir.path(), None).unwrap();
        assert_eq!(path, Some(dir.path().join("demokit.json")));
        assert_eq!(config.pages, vec!["Only"]);
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProjectConfig::load(dir.path(), Some(Path::new("custom.json"))).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("demokit.json"), "{ pages: ").unwrap();
        let err = ProjectConfig::load(dir.path(), None).unwrap_err();
        assert_eq!(err.code(), "CONFIG_PARSE");
    }
}
