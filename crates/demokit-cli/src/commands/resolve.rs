use demokit_core::dev::WatchOptions;
use demokit_core::{Resolution, TransformChain};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{fail, load_plan, ErrorJson, JSON_SCHEMA_VERSION};

/// Which modules to classify.
#[derive(Debug, Clone)]
pub struct ResolveAction {
    pub paths: Vec<PathBuf>,
    pub all: bool,
}

#[derive(Serialize)]
struct ResolveJson {
    schema_version: u32,
    ok: bool,
    results: Vec<ResultJson>,
}

#[derive(Serialize)]
struct ResultJson {
    module: PathBuf,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<Resolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorJson>,
}

pub fn run(cwd: &Path, config: Option<&Path>, action: ResolveAction, json: bool) -> Result<()> {
    let plan = load_plan(cwd, config).unwrap_or_else(|e| fail(&e, json));
    let chain = plan.chain();

    let modules = if action.all {
        let watch = WatchOptions::from(&plan.config().watch);
        collect_modules(cwd, &watch)
    } else {
        action.paths
    };

    let results = resolve_modules(&chain, &modules);
    let all_ok = results.iter().all(|r| r.ok);

    if json {
        let doc = ResolveJson {
            schema_version: JSON_SCHEMA_VERSION,
            ok: all_ok,
            results,
        };
        println!("{}", serde_json::to_string_pretty(&doc).into_diagnostic()?);
    } else {
        for result in &results {
            match (&result.resolution, &result.error) {
                (Some(res), _) => {
                    let lint = if res.lint { " (lint)" } else { "" };
                    println!("{:<48} {}{lint}", res.module.display(), res.rule.as_str());
                }
                (None, Some(err)) => {
                    println!("{:<48} error: {}", result.module.display(), err.message);
                }
                (None, None) => {}
            }
        }
    }

    if !all_ok {
        std::process::exit(1);
    }
    Ok(())
}

fn resolve_modules(chain: &TransformChain, modules: &[PathBuf]) -> Vec<ResultJson> {
    modules
        .iter()
        .zip(chain.resolve_all(modules))
        .map(|(module, outcome)| match outcome {
            Ok(resolution) => ResultJson {
                module: resolution.module.clone(),
                ok: true,
                resolution: Some(resolution),
                error: None,
            },
            Err(e) => ResultJson {
                module: module.clone(),
                ok: false,
                resolution: None,
                error: Some(ErrorJson::from(&e)),
            },
        })
        .collect()
}

/// Every file under `root` outside the ignored directories, relative to
/// `root` and sorted.
fn collect_modules(root: &Path, watch: &WatchOptions) -> Vec<PathBuf> {
    let mut modules: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !watch.should_ignore(entry.path()))
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();
    modules.sort();
    tracing::debug!(count = modules.len(), "collected modules");
    modules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_modules_skips_ignored_trees() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::write(root.join("src/index.ts"), "").unwrap();
        std::fs::write(root.join("src/.DS_Store"), "").unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "").unwrap();

        let watch = WatchOptions {
            ignored: vec!["node_modules".to_string()],
            aggregate_timeout: std::time::Duration::from_millis(10),
            poll_interval: std::time::Duration::from_millis(10),
            poll: false,
        };
        let modules = collect_modules(root, &watch);
        assert_eq!(modules, vec![PathBuf::from("src/index.ts")]);
    }
}
