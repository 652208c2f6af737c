//! Stylesheet stages of the style pipelines.
//!
//! `.scss` goes through grass, then lightningcss for vendor prefixes and,
//! for `.module.scss`, class-name scoping. The result is wrapped in a small
//! script that injects a `<style>` element at runtime.

use lightningcss::css_modules;
use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Attribute identifying injected style elements.
pub const STYLE_ATTRIBUTE: &str = "data-demokit-style";

#[derive(Debug, Error)]
pub enum CssError {
    #[error("Sass compile error: {0}")]
    Sass(String),
    #[error("CSS parse error: {0}")]
    Parse(String),
    #[error("CSS transform error: {0}")]
    Transform(String),
    #[error("CSS print error: {0}")]
    Print(String),
}

/// Output of a stylesheet stage.
#[derive(Debug, Clone, Default)]
pub struct CssOutput {
    pub code: String,
    /// Local class name to scoped class name. Empty unless modules are on.
    pub classes: BTreeMap<String, String>,
}

/// Compile Sass source. The file's own directory is a load path so relative
/// `@import`/`@use` work.
pub fn compile_sass(source: &str, path: &Path, load_paths: &[&Path]) -> Result<String, CssError> {
    let mut options = grass::Options::default().style(grass::OutputStyle::Expanded);
    for dir in load_paths {
        options = options.load_path(dir);
    }
    if let Some(parent) = path.parent() {
        options = options.load_path(parent);
    }

    grass::from_string(source.to_string(), &options).map_err(|e| CssError::Sass(e.to_string()))
}

/// Add vendor prefixes for the default browser targets.
pub fn autoprefix(source: &str, filename: &str) -> Result<String, CssError> {
    Ok(process(source, filename, false)?.code)
}

/// Scope class names and return the class map.
pub fn scope_classes(source: &str, filename: &str) -> Result<CssOutput, CssError> {
    process(source, filename, true)
}

fn process(source: &str, filename: &str, modules: bool) -> Result<CssOutput, CssError> {
    let mut parser_options = ParserOptions {
        filename: filename.to_string(),
        ..ParserOptions::default()
    };
    if modules {
        parser_options.css_modules = Some(css_modules::Config {
            pattern: css_modules::Pattern::parse("[hash]_[local]")
                .map_err(|e| CssError::Parse(e.to_string()))?,
            dashed_idents: false,
            animation: Default::default(),
            grid: Default::default(),
            container: Default::default(),
            custom_idents: Default::default(),
            pure: false,
        });
    }

    let mut stylesheet = StyleSheet::parse(source, parser_options)
        .map_err(|e| CssError::Parse(format!("{filename}: {e}")))?;

    let browsers = browser_targets();
    stylesheet
        .minify(MinifyOptions {
            targets: Targets::from(browsers),
            ..Default::default()
        })
        .map_err(|e| CssError::Transform(e.to_string()))?;

    let output = stylesheet
        .to_css(PrinterOptions {
            minify: false,
            targets: Targets::from(browsers),
            ..Default::default()
        })
        .map_err(|e| CssError::Print(e.to_string()))?;

    let classes = output
        .exports
        .map(|exports| {
            exports
                .iter()
                .map(|(local, export)| (local.to_string(), export.name.to_string()))
                .collect()
        })
        .unwrap_or_default();

    Ok(CssOutput {
        code: output.code,
        classes,
    })
}

/// Chrome 80, Firefox 75, Safari 13, Edge 80.
fn browser_targets() -> Browsers {
    Browsers {
        chrome: Some(80 << 16),
        firefox: Some(75 << 16),
        safari: Some(13 << 16),
        edge: Some(80 << 16),
        ..Default::default()
    }
}

/// Script that injects `css` into the document head and default-exports
/// the class map.
///
/// Re-running the module (after a stylesheet update) replaces the element
/// carrying the same `id` instead of adding a second one.
#[must_use]
pub fn style_inject_module(id: &str, css: &str, classes: &BTreeMap<String, String>) -> String {
    let css_literal = serde_json::to_string(css).unwrap_or_else(|_| "\"\"".to_string());
    let id_literal = serde_json::to_string(id).unwrap_or_else(|_| "\"\"".to_string());
    let classes_literal = serde_json::to_string(classes).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"const id = {id_literal};
const css = {css_literal};
let style = document.querySelector(`style[{STYLE_ATTRIBUTE}="${{id}}"]`);
if (!style) {{
  style = document.createElement('style');
  style.setAttribute('{STYLE_ATTRIBUTE}', id);
  document.head.appendChild(style);
}}
style.textContent = css;

export default {classes_literal};
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sass_nesting_and_variables() {
        let scss = "$c: red;\n.a { .b { color: $c; } }";
        let css = compile_sass(scss, Path::new("x.scss"), &[]).unwrap();
        assert!(css.contains(".a .b"));
        assert!(css.contains("red"));
    }

    #[test]
    fn test_sass_error_is_reported() {
        let err = compile_sass(".a { color: $missing; }", Path::new("x.scss"), &[]).unwrap_err();
        assert!(matches!(err, CssError::Sass(_)));
    }

    #[test]
    fn test_sass_resolves_relative_imports() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("_vars.scss"), "$pad: 4px;").unwrap();
        let main = dir.path().join("main.scss");
        let css = compile_sass("@import 'vars';\n.a { padding: $pad; }", &main, &[]).unwrap();
        assert!(css.contains("4px"));
    }

    #[test]
    fn test_autoprefix_keeps_declarations() {
        let css = autoprefix(".a { display: flex; }", "a.css").unwrap();
        assert!(css.contains("flex"));
    }

    #[test]
    fn test_scope_classes_returns_map() {
        let out = scope_classes(".button { color: blue; } .icon { color: red; }", "Button.module.scss")
            .unwrap();
        assert_eq!(out.classes.len(), 2);
        let scoped = &out.classes["button"];
        assert_ne!(scoped, "button");
        assert!(out.code.contains(scoped.as_str()));
    }

    #[test]
    fn test_plain_processing_has_no_class_map() {
        let out = process(".button { color: blue; }", "a.scss", false).unwrap();
        assert!(out.classes.is_empty());
        assert!(out.code.contains(".button"));
    }

    #[test]
    fn test_style_inject_module_escapes_and_exports() {
        let mut classes = BTreeMap::new();
        classes.insert("btn".to_string(), "x1_btn".to_string());
        let js = style_inject_module("src/a.module.scss", ".a::after { content: \"`\"; }", &classes);

        assert!(js.contains(r#"const id = "src/a.module.scss";"#));
        assert!(js.contains(r#"content: \"`\""#));
        assert!(js.contains(r#"export default {"btn":"x1_btn"};"#));
        assert!(js.contains(STYLE_ATTRIBUTE));
    }
}
