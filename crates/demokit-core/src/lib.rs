#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Build orchestration for a multi-page component playground.
//!
//! The crate turns an ordered list of pages into bundle entries and HTML
//! artifacts, classifies every source module through a first-match-wins
//! transform chain, and computes the build-time constants injected into
//! compiled code. The HTTP side of the dev server lives in the CLI crate;
//! [`dev`] holds the transport-independent pieces.

pub mod config;
pub mod css;
pub mod dev;
pub mod entries;
pub mod env;
pub mod error;
pub mod html;
pub mod lint;
pub mod pages;
pub mod pipeline;
pub mod plan;
pub mod rules;

pub use config::ProjectConfig;
pub use entries::{EntryDescriptor, EntryMap};
pub use env::{EnvTable, VersionInfo};
pub use error::Error;
pub use html::{HtmlDescriptor, TemplateContext};
pub use pages::{bundle_name, Page, PageRegistry};
pub use pipeline::{Artifact, ModuleOutput, Pipeline, PipelineRunner, TransformStep};
pub use plan::BuildPlan;
pub use rules::{Resolution, RuleKind, Scope, TransformChain, TransformRule};

/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
