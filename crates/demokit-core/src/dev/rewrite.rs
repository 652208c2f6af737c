//! Import specifier rewriting for unbundled serving.
//!
//! Compiled modules reach the browser one file at a time, so their import
//! specifiers have to be URLs the dev server can answer:
//! - relative specifiers (`./logo.png`) become root-absolute
//!   (`/src/logo.png`), which keeps them valid when an entry is served
//!   under its bundle name instead of its source path
//! - asset specifiers get `?import`, so the server answers with a JS module
//!   exporting the asset URL instead of the raw bytes
//!
//! Bare specifiers (`react`) are left alone.

use regex_lite::{Captures, Regex};
use std::path::{Component, Path};
use std::sync::OnceLock;

/// Extensions served as assets rather than as modules.
const ASSET_EXTENSIONS: &[&str] = &[
    "bmp", "gif", "jpg", "jpeg", "png", "svg", "webp", "ico", "woff", "woff2", "ttf", "eot",
    "mp4", "webm", "txt",
];

/// The query that asks the dev server for the module form of an asset.
pub const IMPORT_QUERY: &str = "import";

fn specifier() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(\bfrom\s*|^\s*import\s*|\bimport\s*\(\s*)(['"])([^'"]+)['"]"#).ok()
    })
    .as_ref()
}

/// Rewrite the import specifiers of `code`, the compiled form of the
/// root-relative `module`.
#[must_use]
pub fn rewrite_imports(code: &str, module: &Path) -> String {
    let Some(re) = specifier() else {
        return code.to_string();
    };
    let module_dir = module.parent().unwrap_or(Path::new(""));

    let mut result = String::with_capacity(code.len());
    for line in code.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if is_import_line(trimmed) || is_export_from_line(trimmed) || trimmed.contains("import(") {
            let rewritten = re.replace_all(line, |caps: &Captures| {
                format!(
                    "{}{quote}{}{quote}",
                    &caps[1],
                    rewrite_specifier(&caps[3], module_dir),
                    quote = &caps[2],
                )
            });
            result.push_str(&rewritten);
        } else {
            result.push_str(line);
        }
    }
    result
}

fn is_import_line(trimmed: &str) -> bool {
    trimmed.starts_with("import ") || trimmed.starts_with("import'") || trimmed.starts_with("import\"")
}

fn is_export_from_line(trimmed: &str) -> bool {
    trimmed.starts_with("export ") && trimmed.contains(" from")
}

fn rewrite_specifier(spec: &str, module_dir: &Path) -> String {
    let resolved = if spec.starts_with("./") || spec.starts_with("../") {
        resolve_relative(spec, module_dir).unwrap_or_else(|| spec.to_string())
    } else {
        spec.to_string()
    };

    if is_asset(&resolved) && !resolved.contains('?') {
        format!("{resolved}?{IMPORT_QUERY}")
    } else {
        resolved
    }
}

/// `spec` joined onto `module_dir` as a root-absolute URL path, or `None`
/// when it climbs above the root.
fn resolve_relative(spec: &str, module_dir: &Path) -> Option<String> {
    let mut parts: Vec<String> = module_dir
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    for part in spec.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other.to_string()),
        }
    }
    Some(format!("/{}", parts.join("/")))
}

fn is_asset(spec: &str) -> bool {
    let path = spec.split(['?', '#']).next().unwrap_or(spec);
    path.rsplit_once('.').is_some_and(|(stem, ext)| {
        !stem.is_empty()
            && !ext.contains('/')
            && ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(code: &str) -> String {
        rewrite_imports(code, Path::new("playground/Card/Card.js"))
    }

    #[test]
    fn test_relative_imports_become_root_absolute() {
        assert_eq!(
            rewrite("import { mount } from '../../src/index.ts';"),
            "import { mount } from '/src/index.ts';"
        );
        assert_eq!(rewrite("import \"./Card.scss\";"), "import \"/playground/Card/Card.scss\";");
        assert_eq!(
            rewrite("export { helper } from './helper.js';"),
            "export { helper } from '/playground/Card/helper.js';"
        );
    }

    #[test]
    fn test_asset_imports_get_import_query() {
        assert_eq!(
            rewrite("import logo from './logo.PNG';"),
            "import logo from '/playground/Card/logo.PNG?import';"
        );
        assert_eq!(
            rewrite("import font from '/src/fonts/a.woff2';"),
            "import font from '/src/fonts/a.woff2?import';"
        );
        assert_eq!(
            rewrite("import raw from './logo.svg?raw';"),
            "import raw from '/playground/Card/logo.svg?raw';"
        );
    }

    #[test]
    fn test_dynamic_imports_are_rewritten() {
        assert_eq!(
            rewrite("const icon = await import('./icons/card.svg');"),
            "const icon = await import('/playground/Card/icons/card.svg?import');"
        );
        assert_eq!(
            rewrite("  load(() => import(\"../shared/util.js\"));\n"),
            "  load(() => import(\"/playground/shared/util.js\"));\n"
        );
    }

    #[test]
    fn test_bare_and_unrelated_specifiers_are_untouched() {
        let code = "import React from 'react';\nconst s = './logo.png';\nArray.from('abc');\n";
        assert_eq!(rewrite(code), code);
    }

    #[test]
    fn test_specifier_escaping_the_root_is_kept() {
        let code = "import x from '../../../outside.png';";
        assert_eq!(rewrite(code), "import x from '../../../outside.png?import';");
    }

    #[test]
    fn test_multiline_module_keeps_layout() {
        let code = "import a from './a.js';\n\nconsole.log(a);";
        assert_eq!(
            rewrite(code),
            "import a from '/playground/Card/a.js';\n\nconsole.log(a);"
        );
    }
}
