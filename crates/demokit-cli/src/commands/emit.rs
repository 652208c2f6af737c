use demokit_core::plan::EmitReport;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::Path;

use super::{fail, load_plan, JSON_SCHEMA_VERSION};

#[derive(Serialize)]
struct EmitJson<'a> {
    schema_version: u32,
    ok: bool,
    out_dir: &'a Path,
    report: &'a EmitReport,
}

pub fn run(cwd: &Path, config: Option<&Path>, out: &Path, json: bool) -> Result<()> {
    let plan = load_plan(cwd, config).unwrap_or_else(|e| fail(&e, json));

    let out_dir = cwd.join(out);
    let report = plan.emit(&out_dir).unwrap_or_else(|e| fail(&e, json));

    if json {
        let doc = EmitJson {
            schema_version: JSON_SCHEMA_VERSION,
            ok: true,
            out_dir: &out_dir,
            report: &report,
        };
        println!("{}", serde_json::to_string_pretty(&doc).into_diagnostic()?);
    } else {
        for page in &report.html {
            println!("  wrote {}", out_dir.join(page).display());
        }
        for bundle in &report.bundles {
            println!("  wrote {}", out_dir.join(bundle).display());
        }
        println!("  wrote {}", out_dir.join(&report.manifest).display());
    }
    Ok(())
}
