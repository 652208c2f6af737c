//! Compile-time constants injected into client code.
//!
//! References such as `process.env.__CLIENT_KEY__` are replaced textually
//! with JSON literals before a module reaches the browser.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::process::Command;

pub const SF_ENV_KEY: &str = "process.env.__SF_ENV__";
pub const CLIENT_KEY_KEY: &str = "process.env.__CLIENT_KEY__";
pub const VERSION_KEY: &str = "process.env.VERSION";
pub const COMMIT_HASH_KEY: &str = "process.env.COMMIT_HASH";
pub const COMMIT_BRANCH_KEY: &str = "process.env.COMMIT_BRANCH";

/// Default for `SF_ENV` when unset.
pub const DEFAULT_SF_ENV: &str = "build";

const UNKNOWN: &str = "unknown";

/// Read access to environment variables.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Build identity exposed to client code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: String,
    pub commit_hash: String,
    pub commit_branch: String,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            version: UNKNOWN.to_string(),
            commit_hash: UNKNOWN.to_string(),
            commit_branch: UNKNOWN.to_string(),
        }
    }
}

impl VersionInfo {
    /// Version from `package.json`, commit and branch from git. Anything
    /// that cannot be determined is `"unknown"`.
    #[must_use]
    pub fn detect(root: &Path) -> Self {
        let version = package_version(root).unwrap_or_else(|| UNKNOWN.to_string());
        let commit_hash = git(root, &["rev-parse", "HEAD"]).unwrap_or_else(|| UNKNOWN.to_string());
        let commit_branch = git(root, &["rev-parse", "--abbrev-ref", "HEAD"])
            .unwrap_or_else(|| UNKNOWN.to_string());

        Self {
            version,
            commit_hash,
            commit_branch,
        }
    }
}

fn package_version(root: &Path) -> Option<String> {
    let content = std::fs::read_to_string(root.join("package.json")).ok()?;
    let manifest: Value = serde_json::from_str(&content).ok()?;
    manifest.get("version")?.as_str().map(str::to_string)
}

fn git(root: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let out = String::from_utf8(output.stdout).ok()?;
    let out = out.trim();
    (!out.is_empty()).then(|| out.to_string())
}

/// Immutable table of reference → JSON literal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EnvTable {
    values: BTreeMap<String, Value>,
}

impl EnvTable {
    /// Resolve the table once from the environment and build identity.
    ///
    /// Empty variables count as unset. An unset `CLIENT_KEY` becomes `null`.
    #[must_use]
    pub fn from_env(env: &dyn EnvSource, version: &VersionInfo) -> Self {
        let var = |key: &str| env.var(key).filter(|v| !v.is_empty());

        let mut values = BTreeMap::new();
        values.insert(
            SF_ENV_KEY.to_string(),
            Value::String(var("SF_ENV").unwrap_or_else(|| DEFAULT_SF_ENV.to_string())),
        );
        values.insert(
            CLIENT_KEY_KEY.to_string(),
            var("CLIENT_KEY").map_or(Value::Null, Value::String),
        );
        values.insert(VERSION_KEY.to_string(), Value::String(version.version.clone()));
        values.insert(
            COMMIT_HASH_KEY.to_string(),
            Value::String(version.commit_hash.clone()),
        );
        values.insert(
            COMMIT_BRANCH_KEY.to_string(),
            Value::String(version.commit_branch.clone()),
        );

        Self { values }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The literal substituted for `key`.
    #[must_use]
    pub fn literal(&self, key: &str) -> Option<String> {
        self.values.get(key).map(Value::to_string)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Replace every reference in `code` with its literal.
    ///
    /// A reference only matches at identifier boundaries: `process.env.VERSION`
    /// inside `process.env.VERSION_TAG` or `my_process.env.VERSION` is left
    /// alone. Longer keys are tried first. Text inside string literals,
    /// template text and comments is never rewritten, but expressions in a
    /// template's `${...}` holes are.
    #[must_use]
    pub fn inject(&self, code: &str) -> String {
        let mut keys: Vec<(&str, String)> = self
            .values
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_string()))
            .collect();
        keys.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let bytes = code.as_bytes();
        let mut out = String::with_capacity(code.len());
        let mut i = 0;
        let mut copied = 0;

        let mut mode = Mode::Code;
        // Brace depth at which each open `${` hole closes, innermost last.
        let mut holes: Vec<usize> = Vec::new();
        let mut depth = 0usize;

        while i < bytes.len() {
            let b = bytes[i];
            let next = bytes.get(i + 1).copied();
            match mode {
                Mode::Code => match (b, next) {
                    (b'\'', _) | (b'"', _) => mode = Mode::Quoted(b),
                    (b'`', _) => mode = Mode::Template,
                    (b'/', Some(b'/')) => {
                        mode = Mode::LineComment;
                        i += 1;
                    }
                    (b'/', Some(b'*')) => {
                        mode = Mode::BlockComment;
                        i += 1;
                    }
                    (b'{', _) => depth += 1,
                    (b'}', _) if holes.last() == Some(&depth) => {
                        holes.pop();
                        mode = Mode::Template;
                    }
                    (b'}', _) => depth = depth.saturating_sub(1),
                    _ => {
                        if let Some((key, literal)) = key_at(&keys, bytes, i) {
                            out.push_str(&code[copied..i]);
                            out.push_str(literal);
                            i += key.len();
                            copied = i;
                            continue;
                        }
                    }
                },
                Mode::Quoted(quote) => match b {
                    b'\\' => i += 1,
                    b'\n' => mode = Mode::Code,
                    _ if b == quote => mode = Mode::Code,
                    _ => {}
                },
                Mode::Template => match (b, next) {
                    (b'\\', _) => i += 1,
                    (b'`', _) => mode = Mode::Code,
                    (b'$', Some(b'{')) => {
                        holes.push(depth);
                        mode = Mode::Code;
                        i += 1;
                    }
                    _ => {}
                },
                Mode::LineComment => {
                    if b == b'\n' {
                        mode = Mode::Code;
                    }
                }
                Mode::BlockComment => {
                    if b == b'*' && next == Some(b'/') {
                        mode = Mode::Code;
                        i += 1;
                    }
                }
            }
            i += 1;
        }
        out.push_str(&code[copied..]);
        out
    }
}

/// Lexical context of the scan in [`EnvTable::inject`].
#[derive(Debug, Clone, Copy)]
enum Mode {
    Code,
    Quoted(u8),
    Template,
    LineComment,
    BlockComment,
}

/// The longest key starting at `i` on identifier boundaries.
fn key_at<'k>(keys: &'k [(&'k str, String)], bytes: &[u8], i: usize) -> Option<(&'k str, &'k str)> {
    let at_boundary = i == 0 || (!is_ident_byte(bytes[i - 1]) && bytes[i - 1] != b'.');
    if !at_boundary {
        return None;
    }
    keys.iter()
        .find(|(key, _)| {
            bytes[i..].starts_with(key.as_bytes())
                && bytes
                    .get(i + key.len())
                    .map_or(true, |&next| !is_ident_byte(next))
        })
        .map(|(key, literal)| (*key, literal.as_str()))
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}
