//! Effective dev server and watcher settings.
//!
//! Host and port come from, in order: command-line flags, the `HOST`/`PORT`
//! environment variables, the config file, then the defaults.

use std::path::{Component, Path};
use std::time::Duration;

use crate::config::{ServerSection, WatchSection};
use crate::env::EnvSource;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3020;

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub no_hot: bool,
    pub no_compress: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub hot: bool,
    pub compress: bool,
}

impl ServerConfig {
    /// Combine every settings source.
    ///
    /// An unparsable `PORT` is ignored with a warning.
    #[must_use]
    pub fn resolve(overrides: &ServerOverrides, env: &dyn EnvSource, section: &ServerSection) -> Self {
        let env_host = env.var("HOST").filter(|h| !h.is_empty());
        let env_port = env.var("PORT").and_then(|raw| match raw.parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                tracing::warn!(value = %raw, "ignoring invalid PORT");
                None
            }
        });

        Self {
            host: overrides
                .host
                .clone()
                .or(env_host)
                .or_else(|| section.host.clone())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: overrides
                .port
                .or(env_port)
                .or(section.port)
                .unwrap_or(DEFAULT_PORT),
            hot: section.hot && !overrides.no_hot,
            compress: section.compress && !overrides.no_compress,
        }
    }

    /// `host:port`, with `localhost` mapped to the loopback address.
    #[must_use]
    pub fn bind_address(&self) -> String {
        let host = if self.host == "localhost" {
            "127.0.0.1"
        } else {
            self.host.as_str()
        };
        format!("{host}:{}", self.port)
    }

    /// URL to print for humans.
    #[must_use]
    pub fn display_url(&self) -> String {
        let host = if self.host == "0.0.0.0" {
            "localhost"
        } else {
            self.host.as_str()
        };
        format!("http://{host}:{}", self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    pub ignored: Vec<String>,
    pub aggregate_timeout: Duration,
    pub poll_interval: Duration,
    pub poll: bool,
}

impl From<&WatchSection> for WatchOptions {
    fn from(section: &WatchSection) -> Self {
        Self {
            ignored: section.ignored.clone(),
            aggregate_timeout: Duration::from_millis(section.aggregate_timeout_ms),
            poll_interval: Duration::from_millis(section.poll_interval_ms),
            poll: section.poll,
        }
    }
}

impl WatchOptions {
    /// Whether a change at `path` is ignored: any component names an
    /// ignored directory, or the file name is a dotfile.
    #[must_use]
    pub fn should_ignore(&self, path: &Path) -> bool {
        let in_ignored_dir = path.components().any(|c| match c {
            Component::Normal(name) => name
                .to_str()
                .is_some_and(|name| self.ignored.iter().any(|i| i == name)),
            _ => false,
        });
        let dotfile = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        in_ignored_dir || dotfile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> HashMap<String, String> {
        vars.iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let cfg = ServerConfig::resolve(
            &ServerOverrides::default(),
            &env(&[]),
            &ServerSection::default(),
        );
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 3020);
        assert!(cfg.hot);
        assert!(cfg.compress);
        assert_eq!(cfg.display_url(), "http://localhost:3020");
    }

    #[test]
    fn test_precedence() {
        let section = ServerSection {
            host: Some("config.local".to_string()),
            port: Some(4000),
            ..ServerSection::default()
        };
        let vars = env(&[("HOST", "env.local"), ("PORT", "5000")]);

        let from_config = ServerConfig::resolve(&ServerOverrides::default(), &env(&[]), &section);
        assert_eq!((from_config.host.as_str(), from_config.port), ("config.local", 4000));

        let from_env = ServerConfig::resolve(&ServerOverrides::default(), &vars, &section);
        assert_eq!((from_env.host.as_str(), from_env.port), ("env.local", 5000));

        let overrides = ServerOverrides {
            host: Some("cli.local".to_string()),
            port: Some(6000),
            ..ServerOverrides::default()
        };
        let from_cli = ServerConfig::resolve(&overrides, &vars, &section);
        assert_eq!((from_cli.host.as_str(), from_cli.port), ("cli.local", 6000));
    }

    #[test]
    fn test_invalid_port_env_is_ignored() {
        let cfg = ServerConfig::resolve(
            &ServerOverrides::default(),
            &env(&[("PORT", "http")]),
            &ServerSection::default(),
        );
        assert_eq!(cfg.port, DEFAULT_PORT);
    }

    #[test]
    fn test_flags_disable_hot_and_compress() {
        let overrides = ServerOverrides {
            no_hot: true,
            no_compress: true,
            ..ServerOverrides::default()
        };
        let cfg = ServerConfig::resolve(&overrides, &env(&[]), &ServerSection::default());
        assert!(!cfg.hot);
        assert!(!cfg.compress);
    }

    #[test]
    fn test_bind_address_maps_localhost() {
        let cfg = ServerConfig {
            host: "localhost".to_string(),
            port: 1,
            hot: true,
            compress: true,
        };
        assert_eq!(cfg.bind_address(), "127.0.0.1:1");
    }

    #[test]
    fn test_watch_ignores() {
        let opts = WatchOptions::from(&WatchSection::default());
        assert_eq!(opts.aggregate_timeout, Duration::from_millis(200));
        assert!(opts.should_ignore(Path::new("/p/node_modules/x/index.js")));
        assert!(opts.should_ignore(Path::new("/p/src/.index.ts.swp")));
        assert!(!opts.should_ignore(Path::new("/p/src/index.ts")));
        assert!(!opts.should_ignore(Path::new("/p/src/node_modules_like/a.ts")));
    }
}
