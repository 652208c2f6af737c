#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Shared utilities for demokit.
//!
//! Pure helpers with no logging/tracing dependencies. Logging is owned by
//! the CLI crate.

pub mod fs;
pub mod hash;
