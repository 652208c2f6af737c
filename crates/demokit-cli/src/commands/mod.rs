pub mod dev;
pub mod emit;
pub mod plan;
pub mod resolve;
pub mod version;

use demokit_core::{BuildPlan, ProjectConfig};
use serde::Serialize;
use std::path::Path;

/// Schema version of every `--json` document.
pub const JSON_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
pub struct ErrorJson {
    pub code: &'static str,
    pub message: String,
}

impl From<&demokit_core::Error> for ErrorJson {
    fn from(e: &demokit_core::Error) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FailureJson {
    schema_version: u32,
    ok: bool,
    error: ErrorJson,
}

/// Load the config and validate the whole plan.
pub fn load_plan(cwd: &Path, config: Option<&Path>) -> Result<BuildPlan, demokit_core::Error> {
    let (config_path, project) = ProjectConfig::load(cwd, config)?;
    match &config_path {
        Some(path) => tracing::debug!(config = %path.display(), "loaded config"),
        None => tracing::debug!("no config file, using defaults"),
    }
    BuildPlan::from_environment(cwd.to_path_buf(), project)
}

/// Report a core error and exit with status 1.
///
/// With `json`, a failure document goes to stdout; otherwise the error is
/// rendered as a diagnostic on stderr.
pub fn fail(e: &demokit_core::Error, json: bool) -> ! {
    if json {
        let doc = FailureJson {
            schema_version: JSON_SCHEMA_VERSION,
            ok: false,
            error: ErrorJson::from(e),
        };
        println!(
            "{}",
            serde_json::to_string(&doc).unwrap_or_else(|_| r#"{"ok":false}"#.to_string())
        );
    } else {
        let report = miette::miette!(code = e.code(), "{e}");
        eprintln!("{report:?}");
    }
    std::process::exit(1);
}
