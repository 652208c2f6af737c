//! HTML artifact generation and template rendering.
//!
//! Each page gets one descriptor that names its output path, its template
//! and the single chunk it loads. Rendering substitutes the template
//! placeholders and injects the page's bundle script into the body.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::error::Error;
use crate::pages::{Page, PageRegistry};

/// Output path of the index page.
pub const ROOT_OUTPUT_PATH: &str = "index.html";

/// Where generated script tags are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectPosition {
    Body,
}

/// How chunks are selected for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkSelection {
    /// Exactly the declared chunks, never inferred from the module graph.
    Manual,
}

/// Values exposed to a page template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateContext {
    /// Every page id in registry order, for cross-page navigation.
    pub pages: Vec<String>,
    /// The page being rendered.
    pub current: String,
}

/// One HTML document to emit.
#[derive(Debug, Clone, Serialize)]
pub struct HtmlDescriptor {
    pub page: String,
    pub output_path: String,
    pub template_path: PathBuf,
    pub bound_bundle_name: String,
    pub template_context: TemplateContext,
    pub inject: InjectPosition,
    pub chunks: ChunkSelection,
}

/// Output path for `page`: the index page lands at the root, every other
/// page under its lowercased id.
#[must_use]
pub fn output_path(registry: &PageRegistry, page: &Page) -> String {
    if registry.is_index(page) {
        ROOT_OUTPUT_PATH.to_string()
    } else {
        format!("{}/index.html", page.slug())
    }
}

/// URL path a browser uses to reach an output path.
#[must_use]
pub fn url_path(output_path: &str) -> String {
    match output_path.strip_suffix("index.html") {
        Some(dir) => format!("/{dir}"),
        None => format!("/{output_path}"),
    }
}

/// Derive one descriptor per page.
///
/// Ids that differ only by case would share an output directory; that is
/// rejected here.
pub fn generate(registry: &PageRegistry) -> Result<Vec<HtmlDescriptor>, Error> {
    let pages = registry.ids();
    let mut seen = HashSet::new();
    let mut descriptors = Vec::with_capacity(registry.len());

    for page in registry.pages() {
        let output_path = output_path(registry, page);
        if !seen.insert(output_path.clone()) {
            return Err(Error::DuplicateOutputPath { path: output_path });
        }

        descriptors.push(HtmlDescriptor {
            page: page.id.clone(),
            output_path,
            template_path: registry.template_path(page),
            bound_bundle_name: registry.bundle_name(page),
            template_context: TemplateContext {
                pages: pages.clone(),
                current: page.id.clone(),
            },
            inject: InjectPosition::Body,
            chunks: ChunkSelection::Manual,
        });
    }

    Ok(descriptors)
}

/// Extra markup placed next to the bundle script.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Script URL of the live-reload client, when hot reload is on.
    pub reload_client: Option<String>,
}

impl HtmlDescriptor {
    /// URL of this page's bundle.
    #[must_use]
    pub fn bundle_url(&self) -> String {
        format!("/{}.js", self.bound_bundle_name)
    }

    /// Render `template` for this page.
    ///
    /// Placeholders: `<%= pages %>` (JSON array of ids), `<%= page %>`
    /// (current id) and `<%= nav %>` (a link list to every page). The bundle
    /// script goes right before `</body>`, or at the end without one.
    #[must_use]
    pub fn render(&self, template: &str, options: &RenderOptions) -> String {
        let pages_json =
            serde_json::to_string(&self.template_context.pages).unwrap_or_else(|_| "[]".into());

        let mut html = template
            .replace("<%= pages %>", &pages_json)
            .replace("<%= page %>", &self.template_context.current)
            .replace("<%= nav %>", &self.nav_markup());

        let mut tags = String::new();
        if let Some(client) = &options.reload_client {
            let _ = writeln!(tags, r#"<script type="module" src="{client}"></script>"#);
        }
        let _ = writeln!(tags, r#"<script type="module" src="{}"></script>"#, self.bundle_url());

        match html.rfind("</body>") {
            Some(pos) => html.insert_str(pos, &tags),
            None => {
                html.push('\n');
                html.push_str(&tags);
            }
        }

        html
    }

    fn nav_markup(&self) -> String {
        let ctx = &self.template_context;
        let mut nav = String::from("<ul class=\"demokit-nav\">");
        for (i, id) in ctx.pages.iter().enumerate() {
            let href = if i == 0 {
                "/".to_string()
            } else {
                format!("/{}/", id.to_lowercase())
            };
            let current = if *id == ctx.current {
                " aria-current=\"page\""
            } else {
                ""
            };
            let _ = write!(nav, "<li><a href=\"{href}\"{current}>{id}</a></li>");
        }
        nav.push_str("</ul>");
        nav
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryEntry;
    use crate::entries::EntryMap;

    fn registry(ids: &[&str]) -> PageRegistry {
        PageRegistry::new(ids.iter().copied(), "X-", "playground").unwrap()
    }

    #[test]
    fn test_dropin_card_artifacts() {
        let reg = registry(&["Dropin", "Card"]);
        let docs = generate(&reg).unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].output_path, "index.html");
        assert_eq!(docs[0].bound_bundle_name, "X-Dropin");
        assert_eq!(docs[1].output_path, "card/index.html");
        assert_eq!(docs[1].bound_bundle_name, "X-Card");
        assert_eq!(
            docs[1].template_path,
            PathBuf::from("playground/Card/Card.html")
        );
    }

    #[test]
    fn test_exactly_one_root_for_every_ordering() {
        let ids = ["Dropin", "Card", "Voucher"];
        let orderings = [
            ["Dropin", "Card", "Voucher"],
            ["Card", "Voucher", "Dropin"],
            ["Voucher", "Dropin", "Card"],
            ["Card", "Dropin", "Voucher"],
        ];
        for order in orderings {
            let docs = generate(&registry(&order)).unwrap();
            let roots: Vec<_> = docs
                .iter()
                .filter(|d| d.output_path == ROOT_OUTPUT_PATH)
                .collect();
            assert_eq!(roots.len(), 1);
            assert_eq!(roots[0].page, order[0]);
            assert_eq!(docs.len(), ids.len());
        }
    }

    #[test]
    fn test_bound_bundle_matches_entry_map() {
        let reg = registry(&["Dropin", "Card", "QRCode", "Giftcards"]);
        let entries = EntryMap::generate(&reg, &LibraryEntry::default()).unwrap();
        for doc in generate(&reg).unwrap() {
            assert_eq!(
                entries.for_page(&doc.page).unwrap().bundle_name,
                doc.bound_bundle_name
            );
        }
    }

    #[test]
    fn test_case_insensitive_collision_rejected() {
        let reg = registry(&["Dropin", "Card", "card"]);
        let err = generate(&reg).unwrap_err();
        assert!(matches!(err, Error::DuplicateOutputPath { path } if path == "card/index.html"));
    }

    #[test]
    fn test_template_context_carries_all_pages() {
        let docs = generate(&registry(&["Dropin", "Card"])).unwrap();
        for doc in &docs {
            assert_eq!(doc.template_context.pages, vec!["Dropin", "Card"]);
        }
        assert_eq!(docs[1].template_context.current, "Card");
    }

    #[test]
    fn test_render_injects_single_bundle_before_body_end() {
        let docs = generate(&registry(&["Dropin", "Card"])).unwrap();
        let html = docs[1].render(
            "<html><body><main><%= nav %></main></body></html>",
            &RenderOptions::default(),
        );

        assert_eq!(html.matches("<script").count(), 1);
        assert!(html.contains(r#"<script type="module" src="/X-Card.js"></script>"#));
        assert!(!html.contains("X-Dropin.js"));
        let script = html.find("X-Card.js").unwrap();
        assert!(script < html.find("</body>").unwrap());
        assert!(html.contains(r#"<a href="/card/" aria-current="page">Card</a>"#));
        assert!(html.contains(r#"<a href="/">Dropin</a>"#));
    }

    #[test]
    fn test_render_substitutes_pages_and_reload_client() {
        let docs = generate(&registry(&["Dropin", "Card"])).unwrap();
        let html = docs[0].render(
            "<script>var pages = <%= pages %>; var page = '<%= page %>';</script>",
            &RenderOptions {
                reload_client: Some("/__demokit/client.js".to_string()),
            },
        );

        assert!(html.contains(r#"var pages = ["Dropin","Card"];"#));
        assert!(html.contains("var page = 'Dropin';"));
        assert!(html.contains("/__demokit/client.js"));
        assert!(html.trim_end().ends_with(r#"<script type="module" src="/X-Dropin.js"></script>"#));
    }

    #[test]
    fn test_url_path() {
        assert_eq!(url_path("index.html"), "/");
        assert_eq!(url_path("card/index.html"), "/card/");
    }
}
