//! The validated build plan.
//!
//! [`BuildPlan::new`] performs every configuration check up front: the page
//! registry, the entry map, the HTML artifacts, the transform chain and the
//! page files on disk. Nothing is served or written until it succeeds.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use demokit_util::fs::{read_to_string_lossy, write_artifact};

use crate::config::ProjectConfig;
use crate::dev::rewrite_imports;
use crate::entries::{EntryDescriptor, EntryMap};
use crate::env::{EnvTable, ProcessEnv, VersionInfo};
use crate::error::Error;
use crate::html::{self, HtmlDescriptor, RenderOptions};
use crate::lint::EslintLinter;
use crate::pages::PageRegistry;
use crate::pipeline::{DefineCompiler, PipelineRunner};
use crate::rules::TransformChain;

/// Name of the manifest written next to emitted pages.
pub const MANIFEST_FILE: &str = "demokit-manifest.json";

#[derive(Debug, Clone)]
pub struct BuildPlan {
    root: PathBuf,
    config: ProjectConfig,
    registry: PageRegistry,
    entries: EntryMap,
    html: Vec<HtmlDescriptor>,
    chain: Arc<TransformChain>,
    env: Arc<EnvTable>,
}

/// Serializable view of a plan.
#[derive(Debug, Serialize)]
pub struct PlanSummary<'a> {
    pub root: &'a Path,
    pub pages: Vec<String>,
    pub entries: &'a EntryMap,
    pub html: &'a [HtmlDescriptor],
    pub rules: &'a TransformChain,
    pub env: &'a EnvTable,
}

/// Files written by [`BuildPlan::emit`], relative to the output directory.
#[derive(Debug, Default, Serialize)]
pub struct EmitReport {
    pub html: Vec<String>,
    /// One compiled `<bundle>.js` per entry.
    pub bundles: Vec<String>,
    pub manifest: String,
}

impl BuildPlan {
    /// Validate `config` against the project at `root`.
    pub fn new(root: impl Into<PathBuf>, config: ProjectConfig, env: EnvTable) -> Result<Self, Error> {
        let root = root.into();

        let registry = PageRegistry::new(
            config.pages.iter().cloned(),
            config.bundle_prefix.clone(),
            config.pages_dir.clone(),
        )?;
        let entries = EntryMap::generate(&registry, &config.library)?;
        let html = html::generate(&registry)?;
        let chain = TransformChain::standard(root.clone(), &config)?;
        registry.check_files(&root)?;

        tracing::debug!(
            pages = registry.len(),
            entries = entries.len(),
            "build plan validated"
        );

        Ok(Self {
            root,
            config,
            registry,
            entries,
            html,
            chain: Arc::new(chain),
            env: Arc::new(env),
        })
    }

    /// Like [`BuildPlan::new`], reading constants from the process
    /// environment and the project's package and git metadata.
    pub fn from_environment(root: impl Into<PathBuf>, config: ProjectConfig) -> Result<Self, Error> {
        let root = root.into();
        let version = VersionInfo::detect(&root);
        let env = EnvTable::from_env(&ProcessEnv, &version);
        Self::new(root, config, env)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &PageRegistry {
        &self.registry
    }

    #[must_use]
    pub fn entries(&self) -> &EntryMap {
        &self.entries
    }

    #[must_use]
    pub fn html(&self) -> &[HtmlDescriptor] {
        &self.html
    }

    #[must_use]
    pub fn chain(&self) -> Arc<TransformChain> {
        Arc::clone(&self.chain)
    }

    #[must_use]
    pub fn env(&self) -> Arc<EnvTable> {
        Arc::clone(&self.env)
    }

    #[must_use]
    pub fn summary(&self) -> PlanSummary<'_> {
        PlanSummary {
            root: &self.root,
            pages: self.registry.ids(),
            entries: &self.entries,
            html: &self.html,
            rules: &self.chain,
            env: &self.env,
        }
    }

    /// Runner with the built-in compiler and the project's eslint.
    #[must_use]
    pub fn runner(&self) -> PipelineRunner {
        PipelineRunner::new(self.root.clone(), Arc::new(DefineCompiler::new(self.env())))
            .with_linter(Arc::new(EslintLinter::locate(&self.root)))
    }

    /// The page served at `url_path`: `/`, `/card/`, `/card` or
    /// `/card/index.html`.
    #[must_use]
    pub fn page_for_url(&self, url_path: &str) -> Option<&HtmlDescriptor> {
        let trimmed = url_path.trim_start_matches('/');
        let trimmed = trimmed.strip_suffix("index.html").unwrap_or(trimmed);
        let wanted = if trimmed.is_empty() {
            html::ROOT_OUTPUT_PATH.to_string()
        } else {
            format!("{}/index.html", trimmed.trim_end_matches('/'))
        };
        self.html.iter().find(|d| d.output_path == wanted)
    }

    /// The entry served at `/<bundle>.js`.
    #[must_use]
    pub fn entry_for_url(&self, url_path: &str) -> Option<&EntryDescriptor> {
        let name = url_path.strip_prefix('/')?.strip_suffix(".js")?;
        self.entries.get(name)
    }

    /// Read and render a page's template.
    pub fn render_page(&self, page: &HtmlDescriptor, options: &RenderOptions) -> Result<String, Error> {
        let template = read_to_string_lossy(&self.root.join(&page.template_path))?;
        Ok(page.render(&template, options))
    }

    /// Write every rendered page, every compiled entry and a manifest of
    /// entries and pages into `out_dir`.
    ///
    /// Entries are compiled one module at a time, the way the dev server
    /// serves them, so the scripts each page references exist in the output.
    /// Modules an entry imports are not copied; their specifiers point at the
    /// root-absolute URLs the dev server answers.
    pub fn emit(&self, out_dir: &Path) -> Result<EmitReport, Error> {
        let mut report = EmitReport::default();

        let runner = self.runner();
        for entry in self.entries.entries() {
            let code = runner.compile_entry(entry, &self.config.tsconfig)?;
            let code = rewrite_imports(&code, &entry.source_path);
            let file = format!("{}.js", entry.bundle_name);
            write_artifact(&out_dir.join(&file), code.as_bytes())?;
            report.bundles.push(file);
        }

        for page in &self.html {
            let rendered = self.render_page(page, &RenderOptions::default())?;
            write_artifact(&out_dir.join(&page.output_path), rendered.as_bytes())?;
            report.html.push(page.output_path.clone());
        }

        let manifest = serde_json::json!({
            "entries": &self.entries,
            "html": &self.html,
        });
        let manifest = serde_json::to_vec_pretty(&manifest).map_err(std::io::Error::from)?;
        write_artifact(&out_dir.join(MANIFEST_FILE), &manifest)?;
        report.manifest = MANIFEST_FILE.to_string();

        tracing::info!(
            pages = report.html.len(),
            bundles = report.bundles.len(),
            out = %out_dir.display(),
            "emitted pages"
        );
        Ok(report)
    }
}
