//! Transport-independent parts of the dev server.

pub mod config;
pub mod debounce;
pub mod reload;
pub mod rewrite;

pub use config::{ServerConfig, ServerOverrides, WatchOptions};
pub use debounce::Debouncer;
pub use reload::{client_script, module_url, ReloadMessage, CLIENT_PATH, WS_PATH};
pub use rewrite::rewrite_imports;
