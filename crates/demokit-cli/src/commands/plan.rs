use demokit_core::plan::PlanSummary;
use demokit_core::BuildPlan;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::Path;

use super::{fail, load_plan, JSON_SCHEMA_VERSION};

#[derive(Serialize)]
struct PlanJson<'a> {
    schema_version: u32,
    ok: bool,
    plan: PlanSummary<'a>,
}

pub fn run(cwd: &Path, config: Option<&Path>, json: bool) -> Result<()> {
    let plan = load_plan(cwd, config).unwrap_or_else(|e| fail(&e, json));

    if json {
        let doc = PlanJson {
            schema_version: JSON_SCHEMA_VERSION,
            ok: true,
            plan: plan.summary(),
        };
        println!("{}", serde_json::to_string_pretty(&doc).into_diagnostic()?);
    } else {
        print_human(&plan);
    }
    Ok(())
}

fn print_human(plan: &BuildPlan) {
    println!("Pages ({}):", plan.html().len());
    for page in plan.html() {
        println!(
            "  {:<20} {:<28} -> {}",
            page.page,
            page.output_path,
            page.bundle_url()
        );
    }

    println!();
    println!("Entries ({}):", plan.entries().len());
    for entry in plan.entries().entries() {
        let kind = if entry.page.is_some() { "page" } else { "library" };
        println!(
            "  {:<24} {:<8} {}",
            entry.bundle_name,
            kind,
            entry.source_path.display()
        );
    }

    println!();
    println!("Transform rules:");
    for rule in plan.chain().rules() {
        let steps: Vec<String> = rule
            .pipeline
            .steps()
            .iter()
            .map(|s| format!("{s:?}"))
            .collect();
        println!(
            "  {} {:<14} {}",
            rule.kind.priority(),
            rule.kind.as_str(),
            steps.join(" -> ")
        );
    }

    println!();
    println!("Constants:");
    for (key, value) in plan.env().entries() {
        println!("  {key} = {value}");
    }
}
