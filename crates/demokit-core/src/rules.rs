//! Extension-based transform chain.
//!
//! Every module path is classified in two stages:
//!
//! 1. **Pre-pass** (additive): lint rules flag the module for static
//!    analysis. Any number of them may match.
//! 2. **Primary resolution** (exclusive): the ordered rule list is walked
//!    top to bottom and the first rule whose test and scopes accept the
//!    module decides its pipeline.
//!
//! ```text
//! priority  rule           test                  pipeline
//! 0         inline-image   .bmp .gif .jpg .png   url-inline (limit, hashed copy)
//! 1         script         .js   in src, demo    type-compile
//! 2         typed-script   .ts .tsx in src, pg   type-compile
//! 3         style          .scss !.module.scss   sass → postcss → css → inject
//! 4         style-module   .module.scss          sass → postcss → css(modules) → inject
//! 5         fallback       * !js/ts/html/json    file-copy
//! ```
//!
//! Rule order is the [`RuleKind`] priority and is checked when the chain is
//! built. Resolution is a pure function of the path; a chain can be shared
//! across threads and queried concurrently.

use rayon::prelude::*;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

use crate::config::ProjectConfig;
use crate::error::Error;
use crate::pipeline::{Pipeline, TransformStep};

/// Rule identity and priority. Lower values are tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    InlineImage = 0,
    Script = 1,
    TypedScript = 2,
    Style = 3,
    StyleModule = 4,
    Fallback = 5,
}

impl RuleKind {
    /// All kinds in priority order.
    pub const ALL: [RuleKind; 6] = [
        RuleKind::InlineImage,
        RuleKind::Script,
        RuleKind::TypedScript,
        RuleKind::Style,
        RuleKind::StyleModule,
        RuleKind::Fallback,
    ];

    #[must_use]
    pub fn priority(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InlineImage => "inline-image",
            Self::Script => "script",
            Self::TypedScript => "typed-script",
            Self::Style => "style",
            Self::StyleModule => "style-module",
            Self::Fallback => "fallback",
        }
    }
}

/// Test applied to a module's file name. Comparisons ignore ASCII case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum ModuleTest {
    /// Extension, without the dot, is one of these.
    Extensions(Vec<String>),
    /// File name ends with this suffix, e.g. `.module.scss`.
    Suffix(String),
    /// Matches every module.
    Any,
}

impl ModuleTest {
    /// Convenience constructor for [`ModuleTest::Extensions`].
    #[must_use]
    pub fn extensions(exts: &[&str]) -> Self {
        Self::Extensions(exts.iter().map(|e| e.to_ascii_lowercase()).collect())
    }

    /// Convenience constructor for [`ModuleTest::Suffix`].
    #[must_use]
    pub fn suffix(suffix: &str) -> Self {
        Self::Suffix(suffix.to_ascii_lowercase())
    }

    fn matches(&self, file_name: &str) -> bool {
        match self {
            Self::Extensions(exts) => file_extension(file_name)
                .is_some_and(|ext| exts.iter().any(|e| e.as_str() == ext)),
            Self::Suffix(suffix) => file_name.ends_with(suffix.as_str()),
            Self::Any => true,
        }
    }

    /// Representative file names this test accepts, used for overlap checks.
    fn probes(&self) -> Vec<String> {
        match self {
            Self::Extensions(exts) => exts.iter().map(|e| format!("probe.{e}")).collect(),
            Self::Suffix(suffix) => vec![format!("probe{suffix}")],
            Self::Any => Vec::new(),
        }
    }
}

fn file_extension(file_name: &str) -> Option<&str> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    (!stem.is_empty()).then_some(ext)
}

/// Directory restriction on a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Scope {
    /// Module lives under this root-relative directory.
    Under(PathBuf),
    /// Any directory component of the module path has this name.
    Segment(String),
}

impl Scope {
    fn contains(&self, module: &Path) -> bool {
        match self {
            Self::Under(dir) => module.starts_with(dir),
            Self::Segment(name) => module
                .parent()
                .into_iter()
                .flat_map(Path::components)
                .any(|c| matches!(c, Component::Normal(s) if s.to_str() == Some(name.as_str()))),
        }
    }

    fn probe_dir(&self) -> PathBuf {
        match self {
            Self::Under(dir) => dir.clone(),
            Self::Segment(name) => PathBuf::from(name),
        }
    }
}

/// Test plus include/exclude scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Matcher {
    pub test: ModuleTest,
    /// File-name tests that veto a match.
    pub exclude: Vec<ModuleTest>,
    /// Empty means everywhere.
    pub include_scope: Vec<Scope>,
    pub exclude_scope: Vec<Scope>,
}

impl Matcher {
    #[must_use]
    pub fn new(test: ModuleTest) -> Self {
        Self {
            test,
            exclude: Vec::new(),
            include_scope: Vec::new(),
            exclude_scope: Vec::new(),
        }
    }

    #[must_use]
    pub fn exclude(mut self, test: ModuleTest) -> Self {
        self.exclude.push(test);
        self
    }

    #[must_use]
    pub fn include_scope(mut self, scope: Scope) -> Self {
        self.include_scope.push(scope);
        self
    }

    #[must_use]
    pub fn exclude_scope(mut self, scope: Scope) -> Self {
        self.exclude_scope.push(scope);
        self
    }

    /// Whether this matcher accepts the root-relative `module` path.
    #[must_use]
    pub fn matches(&self, module: &Path) -> bool {
        let Some(file_name) = module.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.matches_name(&file_name.to_ascii_lowercase()) && self.in_scope(module)
    }

    fn matches_name(&self, lower_name: &str) -> bool {
        self.test.matches(lower_name) && !self.exclude.iter().any(|t| t.matches(lower_name))
    }

    fn in_scope(&self, module: &Path) -> bool {
        (self.include_scope.is_empty() || self.include_scope.iter().any(|s| s.contains(module)))
            && !self.exclude_scope.iter().any(|s| s.contains(module))
    }
}

/// One primary rule: which modules it takes and the pipeline it applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformRule {
    pub kind: RuleKind,
    #[serde(flatten)]
    pub matcher: Matcher,
    pub pipeline: Pipeline,
}

impl TransformRule {
    #[must_use]
    pub fn new(kind: RuleKind, matcher: Matcher, pipeline: Pipeline) -> Self {
        Self {
            kind,
            matcher,
            pipeline,
        }
    }
}

/// Outcome of classifying one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Root-relative module path.
    pub module: PathBuf,
    /// Flagged by the lint pre-pass.
    pub lint: bool,
    pub rule: RuleKind,
    pub pipeline: Pipeline,
}

/// Ordered rule list plus lint pre-pass rules.
#[derive(Debug, Clone, Serialize)]
pub struct TransformChain {
    #[serde(skip)]
    root: PathBuf,
    pre_rules: Vec<Matcher>,
    rules: Vec<TransformRule>,
}

impl TransformChain {
    /// Build and validate a chain. See [`TransformChain::validate`].
    pub fn new(
        root: impl Into<PathBuf>,
        pre_rules: Vec<Matcher>,
        rules: Vec<TransformRule>,
    ) -> Result<Self, Error> {
        let chain = Self {
            root: root.into(),
            pre_rules,
            rules,
        };
        chain.validate()?;
        Ok(chain)
    }

    /// The playground's chain, with directories taken from `config`.
    ///
    /// The configured directories are normalized first, so `./src` and `src`
    /// scope the same modules. Directories that are absolute or climb out of
    /// the root are rejected.
    pub fn standard(root: impl Into<PathBuf>, config: &ProjectConfig) -> Result<Self, Error> {
        let src_dir = scope_dir("srcDir", &config.src_dir)?;
        let demo_dir = scope_dir("demoDir", &config.demo_dir)?;
        let pages_dir = scope_dir("pagesDir", &config.pages_dir)?;

        let deps = || Scope::Segment("node_modules".to_string());
        let src = || Scope::Under(src_dir.clone());
        let compile = || {
            Pipeline::new(vec![TransformStep::TypeCompile {
                config_file: config.tsconfig.clone(),
            }])
        };
        let style = |modules: bool| {
            Pipeline::new(vec![
                TransformStep::Sass,
                TransformStep::PostCss,
                TransformStep::CssLoader {
                    modules,
                    source_map: modules,
                },
                TransformStep::StyleInject,
            ])
        };

        let pre_rules = vec![
            Matcher::new(ModuleTest::extensions(&["js", "jsx", "mjs"]))
                .include_scope(src())
                .exclude_scope(deps()),
            Matcher::new(ModuleTest::extensions(&["ts", "tsx"]))
                .include_scope(src())
                .exclude_scope(deps()),
        ];

        let rules = vec![
            TransformRule::new(
                RuleKind::InlineImage,
                Matcher::new(ModuleTest::extensions(&["bmp", "gif", "jpg", "jpeg", "png"])),
                Pipeline::new(vec![TransformStep::UrlInline {
                    limit: config.inline_limit,
                    name: config.asset_name.clone(),
                }]),
            ),
            TransformRule::new(
                RuleKind::Script,
                Matcher::new(ModuleTest::extensions(&["js"]))
                    .include_scope(src())
                    .include_scope(Scope::Under(demo_dir.clone()))
                    .exclude_scope(deps()),
                compile(),
            ),
            TransformRule::new(
                RuleKind::TypedScript,
                Matcher::new(ModuleTest::extensions(&["ts", "tsx"]))
                    .include_scope(src())
                    .include_scope(Scope::Under(pages_dir))
                    .exclude_scope(deps()),
                compile(),
            ),
            TransformRule::new(
                RuleKind::Style,
                Matcher::new(ModuleTest::extensions(&["scss"]))
                    .exclude(ModuleTest::suffix(".module.scss")),
                style(false),
            ),
            TransformRule::new(
                RuleKind::StyleModule,
                Matcher::new(ModuleTest::suffix(".module.scss")),
                style(true),
            ),
            TransformRule::new(
                RuleKind::Fallback,
                Matcher::new(ModuleTest::Any)
                    .exclude(ModuleTest::extensions(&["js", "jsx", "ts", "tsx", "mjs"]))
                    .exclude(ModuleTest::extensions(&["html"]))
                    .exclude(ModuleTest::extensions(&["json"])),
                Pipeline::new(vec![TransformStep::FileCopy {
                    name: config.asset_name.clone(),
                }]),
            ),
        ];

        Self::new(root, pre_rules, rules)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn rules(&self) -> &[TransformRule] {
        &self.rules
    }

    #[must_use]
    pub fn pre_rules(&self) -> &[Matcher] {
        &self.pre_rules
    }

    /// Check the chain's structural invariants:
    ///
    /// - rule kinds appear once each, in ascending priority;
    /// - the last rule is the fallback and matches every name it does not
    ///   explicitly exclude;
    /// - no two non-fallback rules can accept the same module.
    ///
    /// Rules whose scopes overlap but whose file-name tests are disjoint are
    /// fine: the first declared rule wins for any path they could share.
    pub fn validate(&self) -> Result<(), Error> {
        let Some(last) = self.rules.last() else {
            return Err(Error::InvalidChain("chain has no rules".to_string()));
        };
        if last.kind != RuleKind::Fallback || last.matcher.test != ModuleTest::Any {
            return Err(Error::InvalidChain(
                "the last rule must be the catch-all fallback".to_string(),
            ));
        }
        if !last.matcher.include_scope.is_empty() {
            return Err(Error::InvalidChain(
                "the fallback rule cannot be scoped".to_string(),
            ));
        }

        for pair in self.rules.windows(2) {
            if pair[0].kind >= pair[1].kind {
                return Err(Error::InvalidChain(format!(
                    "rule {} is declared before {} but does not have a higher priority",
                    pair[0].kind.as_str(),
                    pair[1].kind.as_str()
                )));
            }
        }

        let primary = &self.rules[..self.rules.len() - 1];
        for (i, first) in primary.iter().enumerate() {
            for second in &primary[i + 1..] {
                if let Some(example) = overlap_example(&first.matcher, &second.matcher) {
                    return Err(Error::OverlappingRules {
                        first: first.kind,
                        second: second.kind,
                        example: example.display().to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Classify one module. Absolute paths under the root are made relative.
    ///
    /// Fails with [`Error::UnresolvableModule`] when no rule accepts it,
    /// which happens for script, markup and JSON files outside every
    /// compile scope.
    pub fn resolve(&self, path: &Path) -> Result<Resolution, Error> {
        let module = self.relative(path);
        let lint = self.pre_rules.iter().any(|m| m.matches(&module));

        let rule = self
            .rules
            .iter()
            .find(|r| r.matcher.matches(&module))
            .ok_or_else(|| Error::UnresolvableModule {
                path: module.clone(),
            })?;

        tracing::trace!(module = %module.display(), rule = rule.kind.as_str(), lint, "resolved module");

        Ok(Resolution {
            module,
            lint,
            rule: rule.kind,
            pipeline: rule.pipeline.clone(),
        })
    }

    /// Classify many modules in parallel, preserving input order.
    #[must_use]
    pub fn resolve_all(&self, paths: &[PathBuf]) -> Vec<Result<Resolution, Error>> {
        paths.par_iter().map(|p| self.resolve(p)).collect()
    }

    fn relative(&self, path: &Path) -> PathBuf {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    }
}

/// `dir` with `.` components dropped. Fails for absolute paths and `..`.
fn scope_dir(field: &str, dir: &Path) -> Result<PathBuf, Error> {
    let mut out = PathBuf::new();
    for component in dir.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => out.push(part),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidChain(format!(
                    "{field} '{}' must be a directory inside the project root",
                    dir.display()
                )));
            }
        }
    }
    Ok(out)
}

/// A path both matchers accept, if one exists among the probe paths.
fn overlap_example(a: &Matcher, b: &Matcher) -> Option<PathBuf> {
    let names: Vec<String> = [&a.test, &b.test]
        .into_iter()
        .chain(a.exclude.iter())
        .chain(b.exclude.iter())
        .flat_map(ModuleTest::probes)
        .collect();

    let dirs: Vec<PathBuf> = std::iter::once(PathBuf::new())
        .chain(a.include_scope.iter().map(Scope::probe_dir))
        .chain(b.include_scope.iter().map(Scope::probe_dir))
        .collect();

    dirs.iter()
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| a.matches(candidate) && b.matches(candidate))
}
