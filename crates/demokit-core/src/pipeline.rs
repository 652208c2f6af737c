//! Transform pipelines and their execution.
//!
//! A [`Pipeline`] is the ordered list of steps a rule applies, listed in
//! execution order. [`PipelineRunner`] runs one against a module's bytes and
//! produces an [`Artifact`].

use base64::Engine as _;
use regex_lite::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use demokit_util::hash::short_hash;

use crate::css;
use crate::entries::EntryDescriptor;
use crate::env::EnvTable;
use crate::error::Error;
use crate::lint::{LintFinding, Linter};
use crate::rules::{Resolution, RuleKind, TransformChain};

/// One transform stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum TransformStep {
    /// Inline as a data URL below `limit` bytes, otherwise copy under `name`.
    UrlInline { limit: u64, name: String },
    /// Type-aware compile using the compiler configuration at `config_file`.
    #[serde(rename_all = "camelCase")]
    TypeCompile { config_file: PathBuf },
    /// Compile Sass to CSS.
    Sass,
    /// Vendor prefixing.
    PostCss,
    /// CSS module semantics; `modules` enables class-name scoping.
    #[serde(rename_all = "camelCase")]
    CssLoader { modules: bool, source_map: bool },
    /// Wrap CSS in a script that injects it into the page.
    StyleInject,
    /// Copy under a content-hashed `name`.
    FileCopy { name: String },
}

impl TransformStep {
    /// Whether the step ends the pipeline by producing an artifact.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::UrlInline { .. } | Self::TypeCompile { .. } | Self::StyleInject | Self::FileCopy { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Pipeline {
    steps: Vec<TransformStep>,
}

impl Pipeline {
    #[must_use]
    pub fn new(steps: Vec<TransformStep>) -> Self {
        Self { steps }
    }

    #[must_use]
    pub fn steps(&self) -> &[TransformStep] {
        &self.steps
    }
}

/// What a pipeline produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Artifact {
    /// Embedded in the referencing module.
    #[serde(rename_all = "camelCase")]
    Inline { data_url: String },
    /// Written to the static output location.
    #[serde(rename_all = "camelCase")]
    File {
        output_path: String,
        #[serde(skip)]
        bytes: Vec<u8>,
    },
    /// An executable module for the browser.
    Script { code: String },
}

/// Result of processing one module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleOutput {
    pub module: PathBuf,
    pub rule: RuleKind,
    pub artifact: Artifact,
    /// Scoped class map of a style module.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub classes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lint: Vec<LintFinding>,
}

/// Compiles script modules. Implementations wrap an external compiler.
pub trait ScriptCompiler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compile `source` of `module`. `Err` carries the compiler's message.
    fn compile(&self, module: &Path, source: &str, config_file: &Path) -> Result<String, String>;
}

/// Compiler that only substitutes build-time constants. Sources are
/// otherwise served as written.
#[derive(Debug, Clone)]
pub struct DefineCompiler {
    env: Arc<EnvTable>,
}

impl DefineCompiler {
    #[must_use]
    pub fn new(env: Arc<EnvTable>) -> Self {
        Self { env }
    }
}

impl ScriptCompiler for DefineCompiler {
    fn name(&self) -> &'static str {
        "define"
    }

    fn compile(&self, _module: &Path, source: &str, _config_file: &Path) -> Result<String, String> {
        Ok(self.env.inject(source))
    }
}

/// Runs pipelines against module sources under `root`.
#[derive(Clone)]
pub struct PipelineRunner {
    root: PathBuf,
    compiler: Arc<dyn ScriptCompiler>,
    linter: Option<Arc<dyn Linter>>,
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("root", &self.root)
            .field("compiler", &self.compiler.name())
            .field("linter", &self.linter.as_ref().map(|l| l.name().to_string()))
            .finish()
    }
}

impl PipelineRunner {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, compiler: Arc<dyn ScriptCompiler>) -> Self {
        Self {
            root: root.into(),
            compiler,
            linter: None,
        }
    }

    #[must_use]
    pub fn with_linter(mut self, linter: Arc<dyn Linter>) -> Self {
        self.linter = Some(linter);
        self
    }

    /// Resolve `path` through `chain`, read it and run its pipeline.
    pub fn process(&self, chain: &TransformChain, path: &Path) -> Result<ModuleOutput, Error> {
        let resolution = chain.resolve(path)?;
        let bytes = std::fs::read(self.root.join(&resolution.module))?;
        self.run(&resolution, bytes)
    }

    /// Run a resolved pipeline on `bytes`.
    pub fn run(&self, resolution: &Resolution, bytes: Vec<u8>) -> Result<ModuleOutput, Error> {
        let lint = if resolution.lint {
            self.lint(&resolution.module)
        } else {
            Vec::new()
        };

        let (artifact, classes) = self.execute(resolution, bytes)?;

        Ok(ModuleOutput {
            module: resolution.module.clone(),
            rule: resolution.rule,
            artifact,
            classes,
            lint,
        })
    }

    /// Compile a bundle entry. Entries are always compiled, whatever
    /// directory they live in.
    pub fn compile_entry(&self, entry: &EntryDescriptor, config_file: &Path) -> Result<String, Error> {
        let source = std::fs::read(self.root.join(&entry.source_path))?;
        self.compile(&entry.source_path, &source, config_file)
    }

    fn execute(
        &self,
        resolution: &Resolution,
        bytes: Vec<u8>,
    ) -> Result<(Artifact, BTreeMap<String, String>), Error> {
        let module = &resolution.module;
        let mut css: Option<String> = None;
        let mut classes = BTreeMap::new();

        for step in resolution.pipeline.steps() {
            match step {
                TransformStep::UrlInline { limit, name } => {
                    let artifact = if (bytes.len() as u64) < *limit {
                        Artifact::Inline {
                            data_url: data_url(module, &bytes),
                        }
                    } else {
                        Artifact::File {
                            output_path: asset_name(name, module, &bytes),
                            bytes,
                        }
                    };
                    return Ok((artifact, classes));
                }
                TransformStep::FileCopy { name } => {
                    let output_path = asset_name(name, module, &bytes);
                    return Ok((Artifact::File { output_path, bytes }, classes));
                }
                TransformStep::TypeCompile { config_file } => {
                    let code = self.compile(module, &bytes, config_file)?;
                    return Ok((Artifact::Script { code }, classes));
                }
                TransformStep::Sass => {
                    let source = take_css(&mut css, &bytes);
                    let path = self.root.join(module);
                    let out = css::compile_sass(&source, &path, &[self.root.as_path()])
                        .map_err(|e| transform_error(module, e))?;
                    css = Some(out);
                }
                TransformStep::PostCss => {
                    let source = take_css(&mut css, &bytes);
                    let out = css::autoprefix(&source, &module.display().to_string())
                        .map_err(|e| transform_error(module, e))?;
                    css = Some(out);
                }
                TransformStep::CssLoader { modules, .. } => {
                    if *modules {
                        let source = take_css(&mut css, &bytes);
                        let out = css::scope_classes(&source, &module.display().to_string())
                            .map_err(|e| transform_error(module, e))?;
                        classes = out.classes;
                        css = Some(out.code);
                    }
                }
                TransformStep::StyleInject => {
                    let source = take_css(&mut css, &bytes);
                    let id = module.to_string_lossy().replace('\\', "/");
                    let code = css::style_inject_module(&id, &source, &classes);
                    return Ok((Artifact::Script { code }, classes));
                }
            }
        }

        Err(Error::Transform {
            path: module.clone(),
            message: "pipeline ended without producing an artifact".to_string(),
        })
    }

    fn compile(&self, module: &Path, bytes: &[u8], config_file: &Path) -> Result<String, Error> {
        let source = String::from_utf8_lossy(bytes);
        let config_file = self.root.join(config_file);
        self.compiler
            .compile(module, &source, &config_file)
            .map_err(|message| Error::Transform {
                path: module.to_path_buf(),
                message,
            })
    }

    fn lint(&self, module: &Path) -> Vec<LintFinding> {
        let Some(linter) = &self.linter else {
            return Vec::new();
        };
        match linter.lint(&self.root.join(module)) {
            Ok(findings) => {
                for finding in &findings {
                    tracing::warn!(module = %module.display(), linter = linter.name(), "{finding}");
                }
                findings
            }
            Err(e) => {
                tracing::warn!(module = %module.display(), linter = linter.name(), error = %e, "lint failed");
                Vec::new()
            }
        }
    }
}

fn take_css(css: &mut Option<String>, bytes: &[u8]) -> String {
    css.take()
        .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned())
}

fn transform_error(module: &Path, e: css::CssError) -> Error {
    Error::Transform {
        path: module.to_path_buf(),
        message: e.to_string(),
    }
}

/// `data:<mime>;base64,<payload>`
#[must_use]
pub fn data_url(module: &Path, bytes: &[u8]) -> String {
    let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{};base64,{payload}", mime_type(module))
}

/// Content type for a module path, by extension.
#[must_use]
pub fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "css" => "text/css",
        "html" => "text/html",
        "js" | "mjs" | "ts" | "tsx" | "jsx" | "scss" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Expand an output name template.
///
/// `[name]` is the file stem, `[ext]` the extension, `[hash]` the full
/// content hash and `[hash:N]` its first `N` characters.
#[must_use]
pub fn asset_name(template: &str, module: &Path, bytes: &[u8]) -> String {
    let stem = module.file_stem().and_then(|s| s.to_str()).unwrap_or("asset");
    let ext = module.extension().and_then(|s| s.to_str()).unwrap_or("bin");
    let named = template.replace("[name]", stem).replace("[ext]", ext);

    let Ok(re) = Regex::new(r"\[hash(?::(\d+))?\]") else {
        return named;
    };
    re.replace_all(&named, |caps: &Captures<'_>| {
        let len = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(usize::MAX);
        short_hash(bytes, len)
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::env::VersionInfo;
    use std::collections::HashMap;

    const NAME: &str = "static/media/[name].[hash:8].[ext]";

    fn runner(root: &Path) -> PipelineRunner {
        let env: HashMap<String, String> = HashMap::new();
        let table = Arc::new(EnvTable::from_env(&env, &VersionInfo::default()));
        PipelineRunner::new(root, Arc::new(DefineCompiler::new(table)))
    }

    fn chain(root: &Path) -> TransformChain {
        TransformChain::standard(root, &ProjectConfig::default()).unwrap()
    }

    fn write(root: &Path, rel: &str, bytes: &[u8]) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_small_image_is_inlined() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "src/dot.png", &[0x89, b'P', b'N', b'G']);
        let out = runner(dir.path()).process(&chain(dir.path()), &path).unwrap();
        assert_eq!(
            out.artifact,
            Artifact::Inline {
                data_url: "data:image/png;base64,iVBORw==".to_string()
            }
        );
    }

    #[test]
    fn test_inline_limit_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = vec![7u8; 10_000];
        let path = write(dir.path(), "src/big.gif", &bytes);
        let out = runner(dir.path()).process(&chain(dir.path()), &path).unwrap();
        let Artifact::File { output_path, bytes: copied } = out.artifact else {
            panic!("expected file artifact");
        };
        assert_eq!(output_path, format!("static/media/big.{}.gif", short_hash(&bytes, 8)));
        assert_eq!(copied, bytes);
    }

    #[test]
    fn test_asset_names_are_deterministic() {
        let a = asset_name(NAME, Path::new("x/logo.png"), b"same");
        let b = asset_name(NAME, Path::new("y/logo.png"), b"same");
        let c = asset_name(NAME, Path::new("x/logo.png"), b"other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("static/media/logo."));
        assert_eq!(a.len(), "static/media/logo.".len() + 8 + ".png".len());
        assert_eq!(asset_name("[hash]", Path::new("a"), b"x").len(), 64);
    }

    #[test]
    fn test_fallback_copies_with_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "src/fonts/f.woff2", b"font");
        let out = runner(dir.path()).process(&chain(dir.path()), &path).unwrap();
        assert_eq!(out.rule, RuleKind::Fallback);
        assert!(matches!(out.artifact, Artifact::File { ref output_path, .. }
            if output_path.starts_with("static/media/f.") && output_path.ends_with(".woff2")));
    }

    #[test]
    fn test_script_gets_env_injected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "src/core/config.ts",
            b"export const key = process.env.__CLIENT_KEY__;",
        );
        let out = runner(dir.path()).process(&chain(dir.path()), &path).unwrap();
        assert_eq!(out.rule, RuleKind::TypedScript);
        assert_eq!(
            out.artifact,
            Artifact::Script {
                code: "export const key = null;".to_string()
            }
        );
    }

    #[test]
    fn test_global_stylesheet_is_injected_without_class_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "src/styles/main.scss", b"$c: red; .a { .b { color: $c; } }");
        let out = runner(dir.path()).process(&chain(dir.path()), &path).unwrap();

        assert_eq!(out.rule, RuleKind::Style);
        assert!(out.classes.is_empty());
        let Artifact::Script { code } = out.artifact else {
            panic!("expected script artifact");
        };
        assert!(code.contains(".a .b"));
        assert!(code.contains("export default {};"));
    }

    #[test]
    fn test_module_stylesheet_scopes_classes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "src/components/Button.module.scss",
            b".button { color: blue; }",
        );
        let out = runner(dir.path()).process(&chain(dir.path()), &path).unwrap();

        assert_eq!(out.rule, RuleKind::StyleModule);
        let scoped = out.classes.get("button").unwrap();
        assert_ne!(scoped, "button");
        let Artifact::Script { code } = out.artifact else {
            panic!("expected script artifact");
        };
        assert!(code.contains(scoped.as_str()));
    }

    #[test]
    fn test_unresolvable_module_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "node_modules/pkg/index.js", b"");
        let err = runner(dir.path()).process(&chain(dir.path()), &path).unwrap_err();
        assert!(matches!(err, Error::UnresolvableModule { path } if path == Path::new("node_modules/pkg/index.js")));
    }

    #[test]
    fn test_sass_error_is_a_transform_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "src/bad.scss", b".a { color: $nope; }");
        let err = runner(dir.path()).process(&chain(dir.path()), &path).unwrap_err();
        assert!(matches!(err, Error::Transform { .. }));
    }

    #[test]
    fn test_compile_entry_outside_compile_scope() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "playground/Card/Card.js",
            b"console.log(process.env.__SF_ENV__);",
        );
        let entry = EntryDescriptor {
            bundle_name: "DemoCard".to_string(),
            source_path: PathBuf::from("playground/Card/Card.js"),
            page: Some("Card".to_string()),
        };
        let code = runner(dir.path())
            .compile_entry(&entry, Path::new("tsconfig.json"))
            .unwrap();
        assert_eq!(code, "console.log(\"build\");");
    }

    #[test]
    fn test_non_terminal_pipeline_is_an_error() {
        let resolution = Resolution {
            module: PathBuf::from("a.scss"),
            lint: false,
            rule: RuleKind::Style,
            pipeline: Pipeline::new(vec![TransformStep::PostCss]),
        };
        let dir = tempfile::tempdir().unwrap();
        let err = runner(dir.path())
            .run(&resolution, b".a{color:red}".to_vec())
            .unwrap_err();
        assert!(matches!(err, Error::Transform { .. }));
    }

    struct FixedLinter;

    impl Linter for FixedLinter {
        fn name(&self) -> &str {
            "fixed"
        }

        fn lint(&self, _path: &Path) -> Result<Vec<LintFinding>, String> {
            Ok(vec![LintFinding {
                line: 1,
                column: 1,
                severity: crate::lint::Severity::Warning,
                message: "no".to_string(),
                rule: None,
            }])
        }
    }

    #[test]
    fn test_lint_findings_attach_only_to_flagged_modules() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path()).with_linter(Arc::new(FixedLinter));
        let chain = chain(dir.path());

        let flagged = write(dir.path(), "src/a.ts", b"let a = 1;");
        let unflagged = write(dir.path(), "demo/b.js", b"let b = 1;");

        assert_eq!(runner.process(&chain, &flagged).unwrap().lint.len(), 1);
        assert!(runner.process(&chain, &unflagged).unwrap().lint.is_empty());
    }
}
