use miette::{IntoDiagnostic, Result};
use serde::Serialize;

#[derive(Serialize)]
struct VersionJson {
    name: &'static str,
    version: &'static str,
}

pub fn run(json: bool) -> Result<()> {
    if json {
        let doc = VersionJson {
            name: "demokit",
            version: demokit_core::VERSION,
        };
        println!("{}", serde_json::to_string(&doc).into_diagnostic()?);
    } else {
        println!("demokit {}", demokit_core::VERSION);
    }
    Ok(())
}
