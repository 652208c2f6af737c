//! Live reload protocol.
//!
//! The server pushes JSON messages over a WebSocket. A batch of changes that
//! only touches stylesheets the server has already delivered becomes an
//! `update`: the client re-imports each one that the open page has loaded,
//! which swaps its `<style>` element in place. Anything else, including a
//! Sass partial, becomes a full `reload`.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::css::STYLE_ATTRIBUTE;

/// WebSocket endpoint.
pub const WS_PATH: &str = "/__demokit/ws";
/// Client runtime script.
pub const CLIENT_PATH: &str = "/__demokit/client.js";

const STYLE_EXTENSIONS: &[&str] = &["scss"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadMessage {
    Connected,
    Reload,
    /// Stylesheet module URLs to re-import.
    Update { paths: Vec<String> },
    Error { message: String },
}

impl ReloadMessage {
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"reload"}"#.to_string())
    }

    /// Message for a batch of changed files under `root`.
    ///
    /// `served` tells whether a root-relative module has been delivered to
    /// a client. Partials (`_name.scss`) are only ever compiled into other
    /// sheets, so changing one reloads.
    #[must_use]
    pub fn for_changes(root: &Path, changed: &[PathBuf], served: impl Fn(&Path) -> bool) -> Self {
        let swappable = |path: &Path| {
            let rel = path.strip_prefix(root).unwrap_or(path);
            is_stylesheet(rel) && !is_partial(rel) && served(rel)
        };
        if changed.is_empty() || !changed.iter().all(|p| swappable(p)) {
            return Self::Reload;
        }
        let paths = changed
            .iter()
            .map(|p| module_url(root, p))
            .collect();
        Self::Update { paths }
    }
}

fn is_stylesheet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| STYLE_EXTENSIONS.iter().any(|s| ext.eq_ignore_ascii_case(s)))
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}

/// URL path the dev server serves `path` under.
#[must_use]
pub fn module_url(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let joined = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{}", joined.trim_start_matches('/'))
}

/// Browser side of the protocol.
#[must_use]
pub fn client_script() -> String {
    format!(
        r#"(() => {{
  const proto = location.protocol === 'https:' ? 'wss:' : 'ws:';
  let retries = 0;

  function connect() {{
    const ws = new WebSocket(`${{proto}}//${{location.host}}{WS_PATH}`);
    ws.addEventListener('open', () => {{ retries = 0; }});
    ws.addEventListener('message', (event) => {{
      const msg = JSON.parse(event.data);
      switch (msg.type) {{
        case 'connected':
          console.debug('[demokit] connected');
          break;
        case 'update':
          for (const path of msg.paths) {{
            const id = CSS.escape(path.slice(1));
            if (!document.querySelector(`style[{STYLE_ATTRIBUTE}="${{id}}"]`)) continue;
            import(`${{path}}?t=${{Date.now()}}`).catch(() => location.reload());
          }}
          break;
        case 'reload':
          location.reload();
          break;
        case 'error':
          console.error('[demokit]', msg.message);
          break;
      }}
    }});
    ws.addEventListener('close', () => {{
      if (retries++ < 10) setTimeout(connect, 1000);
    }});
  }}

  connect();
}})();
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_json() {
        assert_eq!(ReloadMessage::Reload.to_json(), r#"{"type":"reload"}"#);
        assert_eq!(ReloadMessage::Connected.to_json(), r#"{"type":"connected"}"#);
        assert_eq!(
            ReloadMessage::Update {
                paths: vec!["/src/a.scss".to_string()]
            }
            .to_json(),
            r#"{"type":"update","paths":["/src/a.scss"]}"#
        );
        assert_eq!(
            ReloadMessage::Error {
                message: "bad \"x\"".to_string()
            }
            .to_json(),
            r#"{"type":"error","message":"bad \"x\""}"#
        );
    }

    fn served(paths: &[&str]) -> impl Fn(&Path) -> bool {
        let paths: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
        move |p: &Path| paths.iter().any(|s| s == p)
    }

    #[test]
    fn test_served_stylesheet_batch_is_update() {
        let root = Path::new("/p");
        let changed = vec![
            PathBuf::from("/p/src/a.scss"),
            PathBuf::from("/p/src/b.module.scss"),
        ];
        assert_eq!(
            ReloadMessage::for_changes(root, &changed, served(&["src/a.scss", "src/b.module.scss"])),
            ReloadMessage::Update {
                paths: vec!["/src/a.scss".to_string(), "/src/b.module.scss".to_string()]
            }
        );
    }

    #[test]
    fn test_mixed_batch_is_reload() {
        let root = Path::new("/p");
        let changed = vec![PathBuf::from("/p/src/a.scss"), PathBuf::from("/p/src/a.ts")];
        let all = served(&["src/a.scss", "src/a.ts"]);
        assert_eq!(ReloadMessage::for_changes(root, &changed, &all), ReloadMessage::Reload);
        assert_eq!(ReloadMessage::for_changes(root, &[], &all), ReloadMessage::Reload);
    }

    #[test]
    fn test_sass_partial_change_is_reload() {
        let root = Path::new("/p");
        let changed = vec![PathBuf::from("/p/src/styles/_vars.scss")];
        assert_eq!(
            ReloadMessage::for_changes(root, &changed, served(&["src/styles/_vars.scss"])),
            ReloadMessage::Reload
        );
    }

    #[test]
    fn test_never_served_stylesheet_is_reload() {
        let root = Path::new("/p");
        let changed = vec![PathBuf::from("/p/src/a.scss"), PathBuf::from("/p/src/other.scss")];
        assert_eq!(
            ReloadMessage::for_changes(root, &changed, served(&["src/a.scss"])),
            ReloadMessage::Reload
        );
    }

    #[test]
    fn test_plain_css_is_reload() {
        let root = Path::new("/p");
        let changed = vec![PathBuf::from("/p/src/reset.css")];
        assert_eq!(
            ReloadMessage::for_changes(root, &changed, served(&["src/reset.css"])),
            ReloadMessage::Reload
        );
    }

    #[test]
    fn test_client_script_targets_endpoint() {
        let script = client_script();
        assert!(script.contains(WS_PATH));
        assert!(script.contains("location.reload()"));
        assert!(script.contains(r#"style[data-demokit-style="${id}"]"#));
    }
}
