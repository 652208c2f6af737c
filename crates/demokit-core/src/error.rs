use std::path::PathBuf;
use thiserror::Error;

use crate::rules::RuleKind;

/// Core error type for demokit operations.
///
/// Every variant maps to a stable SCREAMING_SNAKE_CASE code (see [`Error::code`])
/// used by the CLI's JSON output.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Page registry is empty; at least one page is required")]
    EmptyRegistry,

    #[error("Page id '{id}' must be non-empty and use only ASCII letters, digits, '_' or '-'")]
    InvalidPageId { id: String },

    #[error("Page '{id}' is declared more than once")]
    DuplicatePage { id: String },

    #[error("Bundle name '{name}' is produced by more than one entry")]
    DuplicateBundleName { name: String },

    #[error("HTML output path '{path}' is produced by more than one page")]
    DuplicateOutputPath { path: String },

    #[error("Transform rules {first:?} and {second:?} can both match {example}")]
    OverlappingRules {
        first: RuleKind,
        second: RuleKind,
        example: String,
    },

    #[error("Invalid transform chain: {0}")]
    InvalidChain(String),

    #[error("Page '{page}' is missing its {kind} file at {path}")]
    PageFileMissing {
        page: String,
        kind: &'static str,
        path: PathBuf,
    },

    #[error("No transform rule accepts module {path}")]
    UnresolvableModule { path: PathBuf },

    #[error("Transform of {path} failed: {message}")]
    Transform { path: PathBuf, message: String },
}

impl Error {
    /// Stable error code for machine-readable output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => codes::IO,
            Self::ConfigRead { .. } => codes::CONFIG_READ,
            Self::ConfigParse { .. } => codes::CONFIG_PARSE,
            Self::EmptyRegistry => codes::CONFIG_EMPTY_REGISTRY,
            Self::InvalidPageId { .. } => codes::CONFIG_INVALID_PAGE,
            Self::DuplicatePage { .. } => codes::CONFIG_DUPLICATE_PAGE,
            Self::DuplicateBundleName { .. } => codes::CONFIG_DUPLICATE_BUNDLE,
            Self::DuplicateOutputPath { .. } => codes::CONFIG_DUPLICATE_OUTPUT,
            Self::OverlappingRules { .. } | Self::InvalidChain(_) => {
                codes::CONFIG_OVERLAPPING_RULES
            }
            Self::PageFileMissing { .. } => codes::PAGE_FILE_MISSING,
            Self::UnresolvableModule { .. } => codes::MODULE_UNRESOLVABLE,
            Self::Transform { .. } => codes::TRANSFORM_FAILED,
        }
    }

    /// Whether this error is detected while validating configuration,
    /// before any artifact is produced.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigRead { .. }
                | Self::ConfigParse { .. }
                | Self::EmptyRegistry
                | Self::InvalidPageId { .. }
                | Self::DuplicatePage { .. }
                | Self::DuplicateBundleName { .. }
                | Self::DuplicateOutputPath { .. }
                | Self::OverlappingRules { .. }
                | Self::InvalidChain(_)
                | Self::PageFileMissing { .. }
        )
    }
}

/// Stable error codes.
pub mod codes {
    pub const IO: &str = "IO";
    pub const CONFIG_READ: &str = "CONFIG_READ";
    pub const CONFIG_PARSE: &str = "CONFIG_PARSE";
    pub const CONFIG_EMPTY_REGISTRY: &str = "CONFIG_EMPTY_REGISTRY";
    pub const CONFIG_INVALID_PAGE: &str = "CONFIG_INVALID_PAGE";
    pub const CONFIG_DUPLICATE_PAGE: &str = "CONFIG_DUPLICATE_PAGE";
    pub const CONFIG_DUPLICATE_BUNDLE: &str = "CONFIG_DUPLICATE_BUNDLE";
    pub const CONFIG_DUPLICATE_OUTPUT: &str = "CONFIG_DUPLICATE_OUTPUT";
    pub const CONFIG_OVERLAPPING_RULES: &str = "CONFIG_OVERLAPPING_RULES";
    pub const PAGE_FILE_MISSING: &str = "PAGE_FILE_MISSING";
    pub const MODULE_UNRESOLVABLE: &str = "MODULE_UNRESOLVABLE";
    pub const TRANSFORM_FAILED: &str = "TRANSFORM_FAILED";

}
