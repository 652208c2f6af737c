//! Static analysis of flagged modules.

use regex_lite::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// Severity reported by the linter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One lint finding. Always surfaced as a warning, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintFinding {
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl std::fmt::Display for LintFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} {}", self.line, self.column, self.message)?;
        if let Some(rule) = &self.rule {
            write!(f, " ({rule})")?;
        }
        Ok(())
    }
}

/// A linter run on modules flagged by the pre-pass.
pub trait Linter: Send + Sync {
    fn name(&self) -> &str;

    /// Lint `path`. `Err` means the linter itself could not run.
    fn lint(&self, path: &Path) -> Result<Vec<LintFinding>, String>;
}

/// Runs the project's eslint with the compact formatter.
#[derive(Debug, Clone)]
pub struct EslintLinter {
    root: PathBuf,
    binary: Option<PathBuf>,
}

impl EslintLinter {
    /// Locate eslint in `node_modules/.bin`, then on `PATH`.
    #[must_use]
    pub fn locate(root: &Path) -> Self {
        let local = root.join("node_modules").join(".bin").join("eslint");
        let binary = if local.is_file() {
            Some(local)
        } else {
            which::which("eslint").ok()
        };
        if binary.is_none() {
            tracing::debug!("eslint not found; lint pass disabled");
        }
        Self {
            root: root.to_path_buf(),
            binary,
        }
    }

    #[must_use]
    pub fn binary(&self) -> Option<&Path> {
        self.binary.as_deref()
    }
}

impl Linter for EslintLinter {
    fn name(&self) -> &str {
        "eslint"
    }

    fn lint(&self, path: &Path) -> Result<Vec<LintFinding>, String> {
        let Some(binary) = &self.binary else {
            return Ok(Vec::new());
        };

        // eslint exits non-zero when it reports errors; only stdout matters.
        let output = Command::new(binary)
            .args(["--format", "compact", "--no-color"])
            .arg(path)
            .current_dir(&self.root)
            .output()
            .map_err(|e| format!("failed to run {}: {e}", binary.display()))?;

        Ok(parse_compact(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn compact_line() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^.*: line (\d+), col (\d+), (Error|Warning) - (.*?)(?: \(([^()]+)\))?$").ok()
    })
    .as_ref()
}

/// Parse eslint's compact format. Summary lines are skipped.
#[must_use]
pub fn parse_compact(output: &str) -> Vec<LintFinding> {
    let Some(re) = compact_line() else {
        return Vec::new();
    };
    output
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line.trim_end())?;
            Some(LintFinding {
                line: caps[1].parse().ok()?,
                column: caps[2].parse().ok()?,
                severity: if &caps[3] == "Error" {
                    Severity::Error
                } else {
                    Severity::Warning
                },
                message: caps[4].to_string(),
                rule: caps.get(5).map(|m| m.as_str().to_string()),
            })
        })
        .collect()
}
